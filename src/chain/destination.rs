//! Sidechain bridge and multisig reader

use super::contracts::{decode_output, encode_call, token_to_u64, BRIDGE_ABI, MULTISIG_ABI};
use super::{ChainProvider, DestinationChain};
use crate::error::{FederatorError, FederatorResult};
use crate::events::TransferIdentity;

use async_trait::async_trait;
use ethers::abi::{Abi, Token};
use ethers::types::{Address, U256};
use std::sync::Arc;

/// `DestinationChain` backed by the sidechain bridge and multisig contracts
pub struct EthDestinationChain {
    provider: Arc<ChainProvider>,
    bridge: Address,
    multisig: Address,
}

impl EthDestinationChain {
    pub fn new(provider: Arc<ChainProvider>, bridge: Address, multisig: Address) -> Self {
        Self {
            provider,
            bridge,
            multisig,
        }
    }

    /// Call a view function and return its first output
    async fn view(
        &self,
        contract: Address,
        abi: &Abi,
        name: &str,
        args: &[Token],
    ) -> FederatorResult<Token> {
        let data = encode_call(abi, name, args)?;
        let output = self.provider.call(contract, data).await?;
        decode_output(abi, name, &output)?
            .into_iter()
            .next()
            .ok_or_else(|| FederatorError::Contract(format!("{} returned nothing", name)))
    }
}

fn expect_bool(token: Token, name: &str) -> FederatorResult<bool> {
    token
        .into_bool()
        .ok_or_else(|| FederatorError::Contract(format!("{} did not return a bool", name)))
}

#[async_trait]
impl DestinationChain for EthDestinationChain {
    fn bridge_address(&self) -> Address {
        self.bridge
    }

    fn multisig_address(&self) -> Address {
        self.multisig
    }

    async fn was_processed(&self, identity: &TransferIdentity) -> FederatorResult<bool> {
        let token = self
            .view(
                self.bridge,
                &BRIDGE_ABI,
                "transactionWasProcessed",
                &[
                    Token::Uint(U256::from(identity.block_number)),
                    Token::FixedBytes(identity.block_hash.as_bytes().to_vec()),
                    Token::FixedBytes(identity.tx_hash.as_bytes().to_vec()),
                    Token::Address(identity.receiver),
                    Token::Uint(identity.amount),
                    Token::Uint(U256::from(identity.log_index)),
                ],
            )
            .await?;
        expect_bool(token, "transactionWasProcessed")
    }

    async fn transaction_count(&self) -> FederatorResult<u64> {
        let token = self
            .view(self.multisig, &MULTISIG_ABI, "transactionCount", &[])
            .await?;
        token_to_u64(token, "transactionCount")
    }

    async fn transaction_ids(
        &self,
        from: u64,
        to: u64,
        pending: bool,
        executed: bool,
    ) -> FederatorResult<Vec<U256>> {
        let token = self
            .view(
                self.multisig,
                &MULTISIG_ABI,
                "getTransactionIds",
                &[
                    Token::Uint(U256::from(from)),
                    Token::Uint(U256::from(to)),
                    Token::Bool(pending),
                    Token::Bool(executed),
                ],
            )
            .await?;

        token
            .into_array()
            .ok_or_else(|| {
                FederatorError::Contract("getTransactionIds did not return an array".to_string())
            })?
            .into_iter()
            .map(|t| {
                t.into_uint().ok_or_else(|| {
                    FederatorError::Contract("getTransactionIds element is not a uint".to_string())
                })
            })
            .collect()
    }

    async fn is_confirmed_by(&self, id: U256, owner: Address) -> FederatorResult<bool> {
        let token = self
            .view(
                self.multisig,
                &MULTISIG_ABI,
                "confirmations",
                &[Token::Uint(id), Token::Address(owner)],
            )
            .await?;
        expect_bool(token, "confirmations")
    }
}
