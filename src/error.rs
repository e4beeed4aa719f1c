//! Error types for the bridge orchestrator

use serde::Serialize;
use thiserror::Error;

/// Main error type for bridge operations
///
/// Payloads are plain strings so an error can be cloned into a lifecycle's
/// `Failed` state and serialized into API responses and events.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BridgeError {
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Allowance query failed: {0}")]
    AllowanceQueryFailed(String),

    #[error("Failed to build transaction: {0}")]
    BuildFailed(String),

    #[error("Quote service error: {0}")]
    QuoteServiceError(String),

    #[error("Signer rejected transaction: {0}")]
    SignerRejected(String),

    #[error("Timeout waiting for confirmation of {tx_hash}")]
    ConfirmationTimeout { tx_hash: String },

    #[error("Backend rejected request: {0}")]
    BackendRejected(String),

    #[error("Transaction {tx_hash} reverted")]
    TransactionReverted { tx_hash: String },

    #[error("Invalid amount '{amount}': {reason}")]
    InvalidAmount { amount: String, reason: String },

    #[error("Chain {chain_id} not found")]
    ChainNotFound { chain_id: u64 },

    #[error("Token {address} not found on chain {chain_id}")]
    TokenNotFound { chain_id: u64, address: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Cannot cancel in state {state}: transaction already submitted")]
    CancellationRejected { state: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Stable label used for metrics and lifecycle events
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::CatalogUnavailable(_) => "catalog_unavailable",
            BridgeError::AllowanceQueryFailed(_) => "allowance_query_failed",
            BridgeError::BuildFailed(_) => "build_failed",
            BridgeError::QuoteServiceError(_) => "quote_service_error",
            BridgeError::SignerRejected(_) => "signer_rejected",
            BridgeError::ConfirmationTimeout { .. } => "confirmation_timeout",
            BridgeError::BackendRejected(_) => "backend_rejected",
            BridgeError::TransactionReverted { .. } => "transaction_reverted",
            BridgeError::InvalidAmount { .. } => "invalid_amount",
            BridgeError::ChainNotFound { .. } => "chain_not_found",
            BridgeError::TokenNotFound { .. } => "token_not_found",
            BridgeError::InvalidStateTransition { .. } => "invalid_state_transition",
            BridgeError::CancellationRejected { .. } => "cancellation_rejected",
            BridgeError::Config(_) => "config",
            BridgeError::Transport(_) => "transport",
            BridgeError::Internal(_) => "internal",
        }
    }

    /// Check if a caller may reasonably retry with a fresh lifecycle.
    /// The orchestrator itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::CatalogUnavailable(_)
                | BridgeError::AllowanceQueryFailed(_)
                | BridgeError::QuoteServiceError(_)
                | BridgeError::ConfirmationTimeout { .. }
                | BridgeError::Transport(_)
        )
    }

    /// Errors caused by misusing the lifecycle state machine rather than by
    /// an external collaborator
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidStateTransition { .. } | BridgeError::CancellationRejected { .. }
        )
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels_are_stable() {
        assert_eq!(
            BridgeError::BackendRejected("nope".into()).kind(),
            "backend_rejected"
        );
        assert_eq!(
            BridgeError::ConfirmationTimeout {
                tx_hash: "0xabc".into()
            }
            .kind(),
            "confirmation_timeout"
        );
    }

    #[test]
    fn test_timeout_is_retryable_but_rejection_is_not() {
        assert!(BridgeError::ConfirmationTimeout {
            tx_hash: "0x1".into()
        }
        .is_retryable());
        assert!(!BridgeError::SignerRejected("user denied".into()).is_retryable());
        assert!(!BridgeError::BackendRejected("bad token".into()).is_retryable());
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let json = serde_json::to_value(BridgeError::BuildFailed("no pair".into())).unwrap();
        assert_eq!(json["kind"], "build_failed");
        assert_eq!(json["detail"], "no pair");
    }
}
