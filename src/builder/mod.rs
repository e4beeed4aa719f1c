//! Construction of unsigned approval and bridge transactions
//!
//! Pure request/response against the backend's transaction-construction
//! service. Nothing here signs or broadcasts.

use crate::backend::{ApprovalRequest, BuildService};
use crate::error::{BridgeError, BridgeResult};
use crate::types::{Token, TxRequest, UnsignedTx};
use crate::units::parse_units;

use std::sync::Arc;
use tracing::debug;

pub struct TransactionBuilder {
    service: Arc<dyn BuildService>,
}

impl TransactionBuilder {
    pub fn new(service: Arc<dyn BuildService>) -> Self {
        Self { service }
    }

    /// Build an ERC-20 approval of `amount` (human units) for `spender`
    pub async fn build_approval(
        &self,
        chain_id: u64,
        owner: &str,
        spender: &str,
        token: &Token,
        amount: &str,
    ) -> BridgeResult<UnsignedTx> {
        validate(chain_id, token, amount)?;

        let request = ApprovalRequest {
            chain_id,
            owner: owner.to_string(),
            spender: spender.to_string(),
            token: token.address.clone(),
            amount: amount.trim().to_string(),
        };

        let tx = self.service.build_approval(&request).await?;
        debug!(chain_id, token = %token.symbol, to = %tx.to, "Approval transaction built");
        check_built(tx)
    }

    /// Build the bridge transaction for a request
    pub async fn build_bridge(&self, request: &TxRequest, token: &Token) -> BridgeResult<UnsignedTx> {
        validate(request.chain_id, token, &request.amount)?;

        let tx = self.service.build_bridge(request).await?;
        debug!(
            chain_id = request.chain_id,
            token = %token.symbol,
            route = ?request.route_id,
            to = %tx.to,
            "Bridge transaction built"
        );
        check_built(tx)
    }
}

fn validate(chain_id: u64, token: &Token, amount: &str) -> BridgeResult<()> {
    if token.chain_id != chain_id {
        return Err(BridgeError::BuildFailed(format!(
            "token {} lives on chain {}, not {}",
            token.symbol, token.chain_id, chain_id
        )));
    }

    let units = parse_units(amount, token.decimals)
        .map_err(|e| BridgeError::BuildFailed(e.to_string()))?;
    if units.is_zero() {
        return Err(BridgeError::BuildFailed("amount must be positive".to_string()));
    }

    Ok(())
}

fn check_built(tx: UnsignedTx) -> BridgeResult<UnsignedTx> {
    if tx.to.trim().is_empty() {
        return Err(BridgeError::BuildFailed(
            "backend returned a transaction without a recipient".to_string(),
        ));
    }
    Ok(tx)
}
