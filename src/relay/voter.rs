//! Turns a transfer event into a multisig proposal on the sidechain

use crate::chain::contracts::{encode_accept_transfer, encode_submit_proposal};
use crate::chain::{DestinationChain, SourceChain};
use crate::error::FederatorResult;
use crate::events::{ResolvedTransfer, TransferEvent};
use crate::tx::TransactionSender;

use ethers::types::{Address, Bytes, TransactionReceipt, U256};
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves receivers and submits accept-transfer proposals
pub struct TransferVoter {
    source: Arc<dyn SourceChain>,
    destination: Arc<dyn DestinationChain>,
    sender: Arc<dyn TransactionSender>,
    /// Sidechain token credited by `acceptTransfer`
    side_token: Address,
}

impl TransferVoter {
    pub fn new(
        source: Arc<dyn SourceChain>,
        destination: Arc<dyn DestinationChain>,
        sender: Arc<dyn TransactionSender>,
        side_token: Address,
    ) -> Self {
        Self {
            source,
            destination,
            sender,
            side_token,
        }
    }

    /// Look up the sidechain receiver registered for the event's receiver
    pub async fn resolve(&self, event: TransferEvent) -> FederatorResult<ResolvedTransfer> {
        let mapped_receiver = self.source.mapped_address(event.original_receiver).await?;
        Ok(ResolvedTransfer {
            event,
            mapped_receiver,
        })
    }

    /// `submitTransaction(bridge, 0, acceptTransfer(...))` calldata for the multisig
    pub fn proposal_calldata(&self, transfer: &ResolvedTransfer) -> FederatorResult<Bytes> {
        let accept = encode_accept_transfer(self.side_token, transfer)?;
        encode_submit_proposal(self.destination.bridge_address(), U256::zero(), &accept)
    }

    /// Submit the transfer as a new multisig proposal
    pub async fn vote(&self, transfer: &ResolvedTransfer) -> FederatorResult<TransactionReceipt> {
        let event = &transfer.event;
        info!(
            "Voting tx {:?}: transferring {} {} to sidechain bridge {:?}",
            event.tx_hash,
            event.amount,
            event.symbol,
            self.destination.bridge_address()
        );

        let data = self.proposal_calldata(transfer)?;
        debug!("Proposal calldata: 0x{}", hex::encode(&data));
        let receipt = self
            .sender
            .send(self.destination.multisig_address(), data, U256::zero())
            .await?;

        info!("Transaction {:?} submitted to multisig", event.tx_hash);
        Ok(receipt)
    }
}
