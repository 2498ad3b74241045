//! Authoritative duplicate check against the sidechain bridge

use crate::chain::DestinationChain;
use crate::error::FederatorResult;
use crate::events::ResolvedTransfer;

use std::sync::Arc;
use tracing::debug;

/// Asks the sidechain bridge whether a transfer was already applied.
///
/// Never cached: the answer can change between cycles and between sibling
/// federators, so it is queried right before every submission.
pub struct IdempotencyGuard {
    destination: Arc<dyn DestinationChain>,
}

impl IdempotencyGuard {
    pub fn new(destination: Arc<dyn DestinationChain>) -> Self {
        Self { destination }
    }

    pub async fn already_applied(&self, transfer: &ResolvedTransfer) -> FederatorResult<bool> {
        let identity = transfer.identity();
        let processed = self.destination.was_processed(&identity).await?;
        debug!("Transfer {} was processed? {}", identity, processed);
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockDestinationChain;
    use crate::events::TransferEvent;
    use ethers::types::{Address, H256, U256};

    fn transfer() -> ResolvedTransfer {
        ResolvedTransfer {
            event: TransferEvent {
                block_number: 50,
                block_hash: H256::repeat_byte(1),
                tx_hash: H256::repeat_byte(2),
                log_index: 0,
                original_receiver: Address::repeat_byte(3),
                amount: U256::from(5),
                symbol: "X".to_string(),
                token_address: Address::repeat_byte(4),
            },
            mapped_receiver: Address::repeat_byte(5),
        }
    }

    #[tokio::test]
    async fn test_queries_with_identity_tuple() {
        let expected = transfer().identity();
        let mut destination = MockDestinationChain::new();
        destination
            .expect_was_processed()
            .withf(move |identity| *identity == expected)
            .times(1)
            .returning(|_| Ok(true));

        let guard = IdempotencyGuard::new(Arc::new(destination));
        assert!(guard.already_applied(&transfer()).await.unwrap());
    }

    #[tokio::test]
    async fn test_consults_ledger_every_time() {
        let mut destination = MockDestinationChain::new();
        let mut answers = vec![true, false];
        destination
            .expect_was_processed()
            .times(2)
            .returning(move |_| Ok(answers.pop().unwrap()));

        let guard = IdempotencyGuard::new(Arc::new(destination));
        assert!(!guard.already_applied(&transfer()).await.unwrap());
        assert!(guard.already_applied(&transfer()).await.unwrap());
    }
}
