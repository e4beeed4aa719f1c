//! Bridge backend service contracts
//!
//! The backend exposes four services (catalog, allowance, transaction
//! construction and quoting). Each is a trait so the core can be driven by
//! the HTTP client in production and by fakes in tests.

mod http;

pub use http::HttpBackend;

use crate::error::{BridgeError, BridgeResult};
use crate::types::{AllowanceQuery, Chain, QuoteRequest, Route, Token, TxRequest, UnsignedTx};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Response envelope shared by every backend endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(result: T) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Unwrap the payload; `success: false` is a `BackendRejected` error
    pub fn into_result(self) -> BridgeResult<T> {
        match (self.success, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(BridgeError::BackendRejected(
                "response missing result".to_string(),
            )),
            (false, _) => Err(BridgeError::BackendRejected(
                self.error.unwrap_or_else(|| "unspecified backend error".to_string()),
            )),
        }
    }
}

/// Allowance value as returned by the backend (big-integer string)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowanceValue {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub chain_id: u64,
    pub owner: String,
    pub spender: String,
    pub token: String,
    /// Human-unit decimal string
    pub amount: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteResult {
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn chains(&self) -> BridgeResult<Vec<Chain>>;

    async fn tokens(&self, chain_id: u64) -> BridgeResult<Vec<Token>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AllowanceService: Send + Sync {
    async fn allowance(&self, query: &AllowanceQuery) -> BridgeResult<AllowanceValue>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BuildService: Send + Sync {
    async fn build_approval(&self, request: &ApprovalRequest) -> BridgeResult<UnsignedTx>;

    async fn build_bridge(&self, request: &TxRequest) -> BridgeResult<UnsignedTx>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteService: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> BridgeResult<QuoteResult>;
}
