//! HTTP client for the bridge backend REST API

use super::{
    AllowanceService, AllowanceValue, ApprovalRequest, BuildService, CatalogService, Envelope,
    QuoteResult, QuoteService,
};
use crate::config::BackendConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{AllowanceQuery, Chain, QuoteRequest, Token, TxRequest, UnsignedTx};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::debug;

/// Bridge backend client. One instance serves every backend trait.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a new backend client
    pub fn new(config: &BackendConfig) -> BridgeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(concat!("hydra-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send a request and unwrap the response envelope.
    ///
    /// Transport and decode failures become `BridgeError::Transport`; callers
    /// re-label them with their own kind. Backend rejections pass through.
    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> BridgeResult<T> {
        let started = Instant::now();
        let result = self.send(request).await;
        let elapsed = started.elapsed();

        crate::metrics::record_backend_request(endpoint, result.is_ok(), elapsed.as_secs_f64());
        debug!(
            endpoint,
            ok = result.is_ok(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Backend request finished"
        );

        result
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> BridgeResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Error statuses may still carry an envelope with a reason
            let body = response.text().await.unwrap_or_default();
            if let Ok(envelope) = serde_json::from_str::<Envelope<serde_json::Value>>(&body) {
                if !envelope.success {
                    return Err(BridgeError::BackendRejected(
                        envelope.error.unwrap_or_else(|| format!("HTTP {}", status)),
                    ));
                }
            }
            return Err(BridgeError::Transport(format!("HTTP {}: {}", status, body)));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| BridgeError::Transport(format!("Invalid response body: {}", e)))?;

        envelope.into_result()
    }
}

/// Re-label transport failures with the calling service's error kind
fn relabel(err: BridgeError, wrap: fn(String) -> BridgeError) -> BridgeError {
    match err {
        BridgeError::Transport(message) => wrap(message),
        other => other,
    }
}

#[async_trait]
impl CatalogService for HttpBackend {
    async fn chains(&self) -> BridgeResult<Vec<Chain>> {
        let request = self.client.get(self.url("chains"));
        self.call("chains", request)
            .await
            .map_err(|e| relabel(e, BridgeError::CatalogUnavailable))
    }

    async fn tokens(&self, chain_id: u64) -> BridgeResult<Vec<Token>> {
        let request = self
            .client
            .get(self.url("tokens"))
            .query(&[("chainId", chain_id)]);
        self.call("tokens", request)
            .await
            .map_err(|e| relabel(e, BridgeError::CatalogUnavailable))
    }
}

#[async_trait]
impl AllowanceService for HttpBackend {
    async fn allowance(&self, query: &AllowanceQuery) -> BridgeResult<AllowanceValue> {
        let chain_id = query.chain_id.to_string();
        let request = self.client.get(self.url("allowance")).query(&[
            ("chainId", chain_id.as_str()),
            ("owner", query.owner_address.as_str()),
            ("spender", query.spender_address.as_str()),
            ("token", query.token_address.as_str()),
        ]);
        self.call("allowance", request)
            .await
            .map_err(|e| relabel(e, BridgeError::AllowanceQueryFailed))
    }
}

#[async_trait]
impl BuildService for HttpBackend {
    async fn build_approval(&self, request: &ApprovalRequest) -> BridgeResult<UnsignedTx> {
        let http = self.client.post(self.url("buildApproval")).json(request);
        self.call("build_approval", http)
            .await
            .map_err(|e| relabel(e, BridgeError::BuildFailed))
    }

    async fn build_bridge(&self, request: &TxRequest) -> BridgeResult<UnsignedTx> {
        let http = self.client.post(self.url("buildBridgeTx")).json(request);
        self.call("build_bridge", http)
            .await
            .map_err(|e| relabel(e, BridgeError::BuildFailed))
    }
}

#[async_trait]
impl QuoteService for HttpBackend {
    async fn quote(&self, request: &QuoteRequest) -> BridgeResult<QuoteResult> {
        let http = self.client.post(self.url("quote")).json(request);
        self.call("quote", http)
            .await
            .map_err(|e| relabel(e, BridgeError::QuoteServiceError))
    }
}
