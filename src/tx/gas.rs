//! Gas estimation with safety buffers

use crate::chain::{ChainProvider, GasPrice};
use crate::error::FederatorResult;

use ethers::types::U256;
use tracing::debug;

/// Gas estimator for transactions
pub struct GasEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
    /// Buffer percentage for gas price
    gas_price_buffer_percent: u64,
}

impl GasEstimator {
    pub fn new() -> Self {
        Self {
            gas_limit_buffer_percent: 20,
            gas_price_buffer_percent: 10,
        }
    }

    /// Add the limit buffer to a node estimate
    pub fn buffered_gas_limit(&self, estimate: U256) -> U256 {
        estimate + estimate * self.gas_limit_buffer_percent / 100
    }

    /// Get a buffered gas price, capped at `ceiling`
    pub async fn get_gas_price(&self, provider: &ChainProvider) -> FederatorResult<GasPrice> {
        let gas_price = provider.get_gas_price().await?;
        let buffered = self.apply_price_buffer(gas_price, provider.max_gas_price());
        debug!("Gas price for {}: {:?}", provider.name(), buffered);
        Ok(buffered)
    }

    fn apply_price_buffer(&self, gas_price: GasPrice, ceiling: U256) -> GasPrice {
        let buffer = |v: U256| std::cmp::min(v + v * self.gas_price_buffer_percent / 100, ceiling);
        match gas_price {
            GasPrice::Legacy(price) => GasPrice::Legacy(buffer(price)),
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let max_fee_per_gas = buffer(max_fee_per_gas);
                GasPrice::Eip1559 {
                    max_fee_per_gas,
                    max_priority_fee_per_gas: std::cmp::min(
                        buffer(max_priority_fee_per_gas),
                        max_fee_per_gas,
                    ),
                }
            }
        }
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new()
    }
}
