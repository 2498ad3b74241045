//! Adds this federator's confirmation to outstanding multisig proposals

use crate::chain::contracts::encode_confirm;
use crate::chain::DestinationChain;
use crate::checkpoint::{CheckpointName, CheckpointStore};
use crate::error::FederatorResult;
use crate::tx::TransactionSender;

use ethers::types::U256;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one reconciliation pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Range `[from, to)` of proposal ids inspected
    pub from: u64,
    pub to: u64,
    pub pending: usize,
    pub already_confirmed: usize,
    pub confirmed: Vec<U256>,
}

/// Confirms pending proposals submitted by any federator.
///
/// Confirmations are idempotent per (proposal, owner) and commute across
/// federators, so the pass is safe to repeat after a crash.
pub struct MultisigReconciler {
    destination: Arc<dyn DestinationChain>,
    sender: Arc<dyn TransactionSender>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl MultisigReconciler {
    pub fn new(
        destination: Arc<dyn DestinationChain>,
        sender: Arc<dyn TransactionSender>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            destination,
            sender,
            checkpoints,
        }
    }

    pub async fn reconcile(&self) -> FederatorResult<ReconcileReport> {
        let me = self.sender.address();
        let from = self
            .checkpoints
            .load(CheckpointName::LastTxCount)
            .await?
            .unwrap_or(0);
        let to = self.destination.transaction_count().await?;
        info!("Checking pending transactions from {} to {}", from, to);

        let mut report = ReconcileReport {
            from,
            to,
            ..Default::default()
        };

        if to < from {
            warn!(
                "Multisig transaction count {} is behind checkpoint {}, leaving it untouched",
                to, from
            );
            return Ok(report);
        }
        if to == from {
            return Ok(report);
        }

        let pending = self
            .destination
            .transaction_ids(from, to, true, false)
            .await?;
        report.pending = pending.len();

        for id in pending {
            if self.destination.is_confirmed_by(id, me).await? {
                debug!("MultiSig tx {} already confirmed by {:?}", id, me);
                report.already_confirmed += 1;
                crate::metrics::record_confirmation_skipped();
                continue;
            }

            info!("Confirm MultiSig Tx {}", id);
            let data = encode_confirm(id)?;
            self.sender
                .send(self.destination.multisig_address(), data, U256::zero())
                .await?;
            crate::metrics::record_confirmation_sent();
            report.confirmed.push(id);
        }

        self.checkpoints.save(CheckpointName::LastTxCount, to).await?;
        crate::metrics::record_checkpoint(CheckpointName::LastTxCount, to);

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::contracts::{decode_call, MULTISIG_ABI};
    use crate::chain::MockDestinationChain;
    use crate::checkpoint::MockCheckpointStore;
    use crate::error::FederatorError;
    use crate::tx::MockTransactionSender;
    use ethers::abi::Token;
    use ethers::types::{Address, TransactionReceipt};
    use mockall::predicate::eq;
    use std::sync::Mutex;

    fn me() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn multisig() -> Address {
        Address::repeat_byte(0xc0)
    }

    fn sender_recording(sent: Arc<Mutex<Vec<U256>>>) -> MockTransactionSender {
        let mut sender = MockTransactionSender::new();
        sender.expect_address().return_const(me());
        sender
            .expect_send()
            .withf(|to, _, value| *to == multisig() && value.is_zero())
            .returning(move |_, data, _| {
                let args = decode_call(&MULTISIG_ABI, "confirmTransaction", &data)?;
                if let Some(Token::Uint(id)) = args.into_iter().next() {
                    sent.lock().unwrap().push(id);
                }
                Ok(TransactionReceipt::default())
            });
        sender
    }

    #[tokio::test]
    async fn test_confirms_only_unconfirmed_proposals() {
        let mut destination = MockDestinationChain::new();
        destination.expect_multisig_address().return_const(multisig());
        destination.expect_transaction_count().returning(|| Ok(5));
        destination
            .expect_transaction_ids()
            .with(eq(2u64), eq(5u64), eq(true), eq(false))
            .times(1)
            .returning(|_, _, _, _| Ok(vec![U256::from(2), U256::from(3), U256::from(4)]));
        destination
            .expect_is_confirmed_by()
            .returning(|id, owner| Ok(owner == me() && id == U256::from(3)));

        let mut checkpoints = MockCheckpointStore::new();
        checkpoints
            .expect_load()
            .with(eq(CheckpointName::LastTxCount))
            .returning(|_| Ok(Some(2)));
        checkpoints
            .expect_save()
            .with(eq(CheckpointName::LastTxCount), eq(5u64))
            .times(1)
            .returning(|_, _| Ok(()));

        let sent = Arc::new(Mutex::new(Vec::new()));
        let reconciler = MultisigReconciler::new(
            Arc::new(destination),
            Arc::new(sender_recording(sent.clone())),
            Arc::new(checkpoints),
        );

        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(*sent.lock().unwrap(), vec![U256::from(2), U256::from(4)]);
        assert_eq!(report.confirmed, vec![U256::from(2), U256::from(4)]);
        assert_eq!(report.already_confirmed, 1);
        assert_eq!(report.pending, 3);
    }

    #[tokio::test]
    async fn test_already_confirmed_sends_nothing() {
        let mut destination = MockDestinationChain::new();
        destination.expect_transaction_count().returning(|| Ok(1));
        destination
            .expect_transaction_ids()
            .returning(|_, _, _, _| Ok(vec![U256::zero()]));
        destination.expect_is_confirmed_by().returning(|_, _| Ok(true));

        let mut sender = MockTransactionSender::new();
        sender.expect_address().return_const(me());
        sender.expect_send().never();

        let mut checkpoints = MockCheckpointStore::new();
        checkpoints.expect_load().returning(|_| Ok(None));
        checkpoints
            .expect_save()
            .with(eq(CheckpointName::LastTxCount), eq(1u64))
            .returning(|_, _| Ok(()));

        let reconciler =
            MultisigReconciler::new(Arc::new(destination), Arc::new(sender), Arc::new(checkpoints));
        let report = reconciler.reconcile().await.unwrap();
        assert!(report.confirmed.is_empty());
        assert_eq!(report.already_confirmed, 1);
    }

    #[tokio::test]
    async fn test_failed_confirmation_keeps_checkpoint() {
        let mut destination = MockDestinationChain::new();
        destination.expect_multisig_address().return_const(multisig());
        destination.expect_transaction_count().returning(|| Ok(3));
        destination
            .expect_transaction_ids()
            .returning(|_, _, _, _| Ok(vec![U256::from(1), U256::from(2)]));
        destination.expect_is_confirmed_by().returning(|_, _| Ok(false));

        let mut sender = MockTransactionSender::new();
        sender.expect_address().return_const(me());
        sender
            .expect_send()
            .times(1)
            .returning(|_, _, _| Err(FederatorError::Transaction("boom".to_string())));

        let mut checkpoints = MockCheckpointStore::new();
        checkpoints.expect_load().returning(|_| Ok(Some(1)));
        checkpoints.expect_save().never();

        let reconciler =
            MultisigReconciler::new(Arc::new(destination), Arc::new(sender), Arc::new(checkpoints));
        assert!(reconciler.reconcile().await.is_err());
    }

    #[tokio::test]
    async fn test_empty_range_skips_id_lookup() {
        let mut destination = MockDestinationChain::new();
        destination.expect_transaction_count().returning(|| Ok(4));
        destination.expect_transaction_ids().never();

        let mut sender = MockTransactionSender::new();
        sender.expect_address().return_const(me());

        let mut checkpoints = MockCheckpointStore::new();
        checkpoints.expect_load().returning(|_| Ok(Some(4)));
        checkpoints.expect_save().never();

        let reconciler =
            MultisigReconciler::new(Arc::new(destination), Arc::new(sender), Arc::new(checkpoints));
        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report, ReconcileReport { from: 4, to: 4, ..Default::default() });
    }
}
