//! Gas limit and price selection for wallet-submitted transactions

use crate::chain::{ChainProvider, GasPrice};
use crate::error::BridgeResult;

use ethers::types::transaction::eip2718::TypedTransaction;
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
    /// Create a new gas estimator
    pub fn new() -> Self {
        Self {
            gas_limit_buffer_percent: 20,
            gas_price_buffer_percent: 10,
        }
    }

    /// Gas limit for a transaction: the backend-provided limit when present,
    /// otherwise `eth_estimateGas` plus the buffer
    pub async fn gas_limit(
        &self,
        provider: &ChainProvider,
        tx: &TypedTransaction,
        provided: Option<U256>,
    ) -> BridgeResult<U256> {
        if let Some(limit) = provided {
            return Ok(limit);
        }

        let estimate = provider.estimate_gas(tx).await?;
        Ok(self.buffered_limit(estimate))
    }

    fn buffered_limit(&self, estimate: U256) -> U256 {
        estimate + estimate * self.gas_limit_buffer_percent / 100
    }

    /// Get buffered gas price for a chain
    pub async fn get_gas_price(&self, provider: &ChainProvider) -> BridgeResult<GasPrice> {
        let gas_price = self.buffered_price(provider.get_gas_price().await?);
        debug!("Gas price for chain {}: {:?}", provider.chain_id(), gas_price);
        Ok(gas_price)
    }

    fn buffered_price(&self, gas_price: GasPrice) -> GasPrice {
        match gas_price {
            GasPrice::Legacy(price) => {
                let buffer = price * self.gas_price_buffer_percent / 100;
                GasPrice::Legacy(price + buffer)
            }
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let fee_buffer = max_fee_per_gas * self.gas_price_buffer_percent / 100;
                let priority_buffer =
                    max_priority_fee_per_gas * self.gas_price_buffer_percent / 100;
                GasPrice::Eip1559 {
                    max_fee_per_gas: max_fee_per_gas + fee_buffer,
                    max_priority_fee_per_gas: max_priority_fee_per_gas + priority_buffer,
                }
            }
        }
    }

    /// Calculate total cost in wei
    pub fn calculate_cost(gas_limit: U256, gas_price: &GasPrice) -> U256 {
        match gas_price {
            GasPrice::Legacy(price) => gas_limit * *price,
            GasPrice::Eip1559 {
                max_fee_per_gas, ..
            } => gas_limit * *max_fee_per_gas,
        }
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers() {
        let estimator = GasEstimator::new();
        assert_eq!(
            estimator.buffered_limit(U256::from(100_000u64)),
            U256::from(120_000u64)
        );
        assert_eq!(
            estimator.buffered_price(GasPrice::Legacy(U256::from(1_000u64))),
            GasPrice::Legacy(U256::from(1_100u64))
        );
        assert_eq!(
            estimator.buffered_price(GasPrice::Eip1559 {
                max_fee_per_gas: U256::from(200u64),
                max_priority_fee_per_gas: U256::from(10u64),
            }),
            GasPrice::Eip1559 {
                max_fee_per_gas: U256::from(220u64),
                max_priority_fee_per_gas: U256::from(11u64),
            }
        );
    }

    #[test]
    fn test_calculate_cost() {
        let cost = GasEstimator::calculate_cost(
            U256::from(21_000u64),
            &GasPrice::Legacy(U256::from(2u64)),
        );
        assert_eq!(cost, U256::from(42_000u64));
    }
}
