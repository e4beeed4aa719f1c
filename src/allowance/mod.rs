//! Spender allowance checks against the backend allowance service

use crate::backend::AllowanceService;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{AllowanceQuery, AllowanceResult, Token};
use crate::units::parse_units;

use ethers::types::U256;
use std::sync::Arc;
use tracing::debug;

/// Queries and compares on-chain allowances. Never retries; a failed query
/// is returned to the caller as `AllowanceQueryFailed` or `BackendRejected`.
pub struct AllowanceOracle {
    service: Arc<dyn AllowanceService>,
}

impl AllowanceOracle {
    pub fn new(service: Arc<dyn AllowanceService>) -> Self {
        Self { service }
    }

    pub async fn check_allowance(&self, query: &AllowanceQuery) -> BridgeResult<AllowanceResult> {
        let value = self.service.allowance(query).await?;

        let allowed_amount = parse_allowance(&value.value).ok_or_else(|| {
            BridgeError::AllowanceQueryFailed(format!(
                "unparseable allowance value {:?}",
                value.value
            ))
        })?;

        debug!(
            chain_id = query.chain_id,
            token = %query.token_address,
            spender = %query.spender_address,
            allowed = %allowed_amount,
            "Allowance fetched"
        );

        Ok(AllowanceResult { allowed_amount })
    }

    /// Base units required to move `amount` of `token`
    pub fn requirement(token: &Token, amount: &str) -> BridgeResult<U256> {
        parse_units(amount, token.decimals)
    }

    /// True when the allowance covers the required base units
    pub fn covers(result: &AllowanceResult, required: U256) -> bool {
        result.allowed_amount >= required
    }
}

/// Allowances arrive as decimal strings; hex is tolerated for RPC-backed
/// backends that forward raw `eth_call` results.
fn parse_allowance(value: &str) -> Option<U256> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) if !hex.is_empty() => U256::from_str_radix(hex, 16).ok(),
        Some(_) => None,
        None => U256::from_dec_str(value).ok(),
    }
}
