//! Transaction sender with retry logic and receipt tracking

use super::gas::GasEstimator;
use super::nonce::NonceManager;
use super::TransactionSender;
use crate::chain::{ChainProvider, GasPrice};
use crate::config::{FederatorConfig, WalletConfig};
use crate::error::{FederatorError, FederatorResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

/// Retry and timeout settings for [`EthTransactionSender`]
#[derive(Debug, Clone)]
pub struct SendConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub send_timeout: Duration,
    pub receipt_timeout: Duration,
}

impl From<&FederatorConfig> for SendConfig {
    fn from(config: &FederatorConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            send_timeout: Duration::from_secs(config.send_timeout_secs),
            receipt_timeout: Duration::from_secs(config.receipt_timeout_secs),
        }
    }
}

/// Parse a hex private key into a wallet
pub fn wallet_from_key(key: &str) -> FederatorResult<LocalWallet> {
    key.trim()
        .trim_start_matches("0x")
        .parse::<LocalWallet>()
        .map_err(|e| FederatorError::Wallet(format!("Invalid private key: {}", e)))
}

/// How a failed `eth_sendRawTransaction` is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BroadcastFailure {
    /// The node already has these exact bytes in its pool
    AlreadyKnown,
    /// The nonce is used; possibly by this very transaction
    NonceTooLow,
    InsufficientFunds,
    Other,
}

fn classify_broadcast_error(error: &FederatorError) -> BroadcastFailure {
    let message = error.to_string().to_lowercase();
    if message.contains("already known")
        || message.contains("known transaction")
        || message.contains("already imported")
    {
        BroadcastFailure::AlreadyKnown
    } else if message.contains("nonce too low") {
        BroadcastFailure::NonceTooLow
    } else if message.contains("insufficient funds") {
        BroadcastFailure::InsufficientFunds
    } else {
        BroadcastFailure::Other
    }
}

/// Hash of a signed transaction, known before any broadcast
fn raw_tx_hash(raw: &Bytes) -> H256 {
    H256::from(ethers::utils::keccak256(raw))
}

/// Sidechain transaction sender with local nonce tracking
pub struct EthTransactionSender {
    provider: Arc<ChainProvider>,
    nonce_manager: NonceManager,
    gas_estimator: GasEstimator,
    wallet: LocalWallet,
    config: SendConfig,
}

impl EthTransactionSender {
    /// Load the wallet from the configured environment variable and sync its nonce
    pub async fn new(
        provider: Arc<ChainProvider>,
        wallet_config: &WalletConfig,
        config: SendConfig,
    ) -> FederatorResult<Self> {
        let key = std::env::var(&wallet_config.private_key_env).map_err(|_| {
            FederatorError::Wallet(format!(
                "No wallet configured. Set {}",
                wallet_config.private_key_env
            ))
        })?;
        let wallet = wallet_from_key(&key)?.with_chain_id(provider.chain_id());
        let address = wallet.address();

        let on_chain_nonce = provider.get_transaction_count(address).await?;
        let nonce_manager = NonceManager::new(address, on_chain_nonce);

        info!("Transaction sender initialized with wallet: {:?}", address);

        Ok(Self {
            provider,
            nonce_manager,
            gas_estimator: GasEstimator::new(),
            wallet,
            config,
        })
    }

    /// Build a fully populated transaction
    async fn build_tx(
        &self,
        to: Address,
        data: Bytes,
        value: U256,
        nonce: u64,
    ) -> FederatorResult<TypedTransaction> {
        let from = self.wallet.address();
        let chain_id = self.provider.chain_id();
        let gas_price = self.gas_estimator.get_gas_price(&self.provider).await?;

        let mut tx: TypedTransaction = match gas_price {
            GasPrice::Legacy(price) => TransactionRequest::new()
                .from(from)
                .to(to)
                .data(data)
                .value(value)
                .nonce(nonce)
                .chain_id(chain_id)
                .gas_price(price)
                .into(),
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => Eip1559TransactionRequest::new()
                .from(from)
                .to(to)
                .data(data)
                .value(value)
                .nonce(nonce)
                .chain_id(chain_id)
                .max_fee_per_gas(max_fee_per_gas)
                .max_priority_fee_per_gas(max_priority_fee_per_gas)
                .into(),
        };

        let estimate = self.provider.estimate_gas(&tx).await?;
        tx.set_gas(self.gas_estimator.buffered_gas_limit(estimate));
        Ok(tx)
    }

    /// Broadcast the same signed bytes until accepted or retries run out.
    ///
    /// A node that already holds the transaction, or has mined it, counts as
    /// an accepted broadcast.
    async fn broadcast_with_retry(&self, raw: Bytes) -> FederatorResult<H256> {
        let tx_hash = raw_tx_hash(&raw);
        let max_attempts = self.config.max_retries;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let result = timeout(
                self.config.send_timeout,
                self.provider.send_raw_transaction(raw.clone()),
            )
            .await
            .unwrap_or_else(|_| {
                Err(FederatorError::Timeout {
                    operation: "send transaction".to_string(),
                })
            });

            let e = match result {
                Ok(hash) => {
                    info!(
                        "Transaction sent: {:?} (attempt {}/{})",
                        hash, attempt, max_attempts
                    );
                    return Ok(hash);
                }
                Err(e) => e,
            };

            match classify_broadcast_error(&e) {
                BroadcastFailure::AlreadyKnown => {
                    info!("Transaction {:?} already known to the node", tx_hash);
                    return Ok(tx_hash);
                }
                BroadcastFailure::NonceTooLow => {
                    if self.provider.get_transaction_receipt(tx_hash).await?.is_some() {
                        info!("Transaction {:?} already mined", tx_hash);
                        return Ok(tx_hash);
                    }
                    warn!("Nonce too low, syncing with chain");
                    let on_chain = self
                        .provider
                        .get_transaction_count(self.wallet.address())
                        .await?;
                    self.nonce_manager.sync(on_chain).await;
                    return Err(FederatorError::Nonce("nonce too low".to_string()));
                }
                BroadcastFailure::InsufficientFunds => {
                    return Err(FederatorError::Wallet(e.to_string()));
                }
                BroadcastFailure::Other if !e.is_retryable() => return Err(e),
                BroadcastFailure::Other => {
                    warn!("Broadcast attempt {}/{} failed: {}", attempt, max_attempts, e);
                    last_error = Some(e);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        Err(last_error
            .unwrap_or_else(|| FederatorError::Transaction("no broadcast attempted".to_string())))
    }

    /// Poll for the receipt of `tx_hash`
    async fn wait_for_receipt(&self, tx_hash: H256) -> FederatorResult<TransactionReceipt> {
        let deadline = Instant::now() + self.config.receipt_timeout;
        let poll = Duration::from_secs(1);

        loop {
            if let Some(receipt) = self.provider.get_transaction_receipt(tx_hash).await? {
                return Ok(receipt);
            }
            if Instant::now() >= deadline {
                return Err(FederatorError::Timeout {
                    operation: format!("receipt of {:?}", tx_hash),
                });
            }
            debug!("Waiting for receipt of {:?}", tx_hash);
            tokio::time::sleep(poll).await;
        }
    }
}

#[async_trait]
impl TransactionSender for EthTransactionSender {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn send(
        &self,
        to: Address,
        data: Bytes,
        value: U256,
    ) -> FederatorResult<TransactionReceipt> {
        let nonce = self.nonce_manager.next_nonce().await;

        let signed = async {
            let tx = self.build_tx(to, data, value, nonce).await?;
            let signature = self
                .wallet
                .sign_transaction(&tx)
                .await
                .map_err(|e| FederatorError::Wallet(e.to_string()))?;
            Ok::<_, FederatorError>(tx.rlp_signed(&signature))
        }
        .await;

        let tx_hash = match signed {
            Ok(raw) => self.broadcast_with_retry(raw).await,
            Err(e) => Err(e),
        };
        let tx_hash = match tx_hash {
            Ok(hash) => hash,
            Err(e) => {
                error!("Failed to send transaction to {:?}: {}", to, e);
                self.nonce_manager.release(nonce).await;
                return Err(e);
            }
        };
        self.nonce_manager.mark_pending(nonce, tx_hash).await;
        debug!(
            "Nonce {} pending, {} transactions in flight",
            nonce,
            self.nonce_manager.pending_count().await
        );

        let receipt = self.wait_for_receipt(tx_hash).await?;
        self.nonce_manager.confirm(nonce).await;

        if receipt.status != Some(U64::from(1)) {
            return Err(FederatorError::TransactionReverted {
                tx_hash: format!("{:?}", tx_hash),
            });
        }

        debug!(
            "Transaction {:?} mined in block {:?}",
            tx_hash, receipt.block_number
        );
        Ok(receipt)
    }
}
