//! Transaction submission module with nonce management and gas optimization

mod gas;
mod nonce;
mod sender;

pub use sender::{EthTransactionSender, SendConfig};

use crate::error::FederatorResult;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TransactionReceipt, U256};

/// Signs and broadcasts sidechain transactions on behalf of this federator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionSender: Send + Sync {
    /// Signing address, derived once from the private key
    fn address(&self) -> Address;

    /// Sign, broadcast and wait for the receipt of a call to `to`
    async fn send(&self, to: Address, data: Bytes, value: U256)
        -> FederatorResult<TransactionReceipt>;
}
