//! Chain module - ledger capabilities used by the relay loop
//!
//! This module provides:
//! - Multi-RPC provider management with automatic failover
//! - The mainchain read capability (`SourceChain`)
//! - The sidechain bridge and multisig read capability (`DestinationChain`)
//! - ABI encoding for every call the federator issues

pub mod contracts;
pub mod destination;
pub mod provider;
pub mod source;

pub use destination::EthDestinationChain;
pub use provider::{ChainProvider, GasPrice};
pub use source::EthSourceChain;

use crate::error::FederatorResult;
use crate::events::{TransferEvent, TransferIdentity};

use async_trait::async_trait;
use ethers::types::{Address, U256};

/// Read access to the chain the transfers originate from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceChain: Send + Sync {
    /// Current head height
    async fn head_height(&self) -> FederatorResult<u64>;

    /// `Cross` events for `token` in `from_block..=to_block`, in (block, index) order
    async fn cross_events(
        &self,
        from_block: u64,
        to_block: u64,
        token: Address,
    ) -> FederatorResult<Vec<TransferEvent>>;

    /// Sidechain address registered for a mainchain account
    async fn mapped_address(&self, account: Address) -> FederatorResult<Address>;
}

/// Read access to the sidechain bridge and its multisig
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DestinationChain: Send + Sync {
    fn bridge_address(&self) -> Address;

    fn multisig_address(&self) -> Address;

    /// Whether the bridge has already accepted this transfer
    async fn was_processed(&self, identity: &TransferIdentity) -> FederatorResult<bool>;

    /// Number of proposals ever submitted to the multisig
    async fn transaction_count(&self) -> FederatorResult<u64>;

    /// Proposal ids in `[from, to)` matching the pending / executed filters
    async fn transaction_ids(
        &self,
        from: u64,
        to: u64,
        pending: bool,
        executed: bool,
    ) -> FederatorResult<Vec<U256>>;

    /// Whether `owner` has confirmed proposal `id`
    async fn is_confirmed_by(&self, id: U256, owner: Address) -> FederatorResult<bool>;
}
