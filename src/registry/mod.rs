//! Chain and token catalog shared by every lifecycle
//!
//! The catalog is read-only once fetched. A refresh builds a complete new
//! catalog and swaps it in with a single write, so readers never see a
//! half-updated view and a failed refresh keeps the previous one.

use crate::backend::CatalogService;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{Chain, Token};

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Immutable snapshot of supported chains and their tokens
#[derive(Debug, Default)]
pub struct Catalog {
    chains: Vec<Chain>,
    tokens: HashMap<u64, Vec<Token>>,
    fetched_at: Option<DateTime<Utc>>,
}

impl Catalog {
    pub fn is_loaded(&self) -> bool {
        self.fetched_at.is_some()
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn tokens(&self, chain_id: u64) -> &[Token] {
        self.tokens.get(&chain_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn token_count(&self) -> usize {
        self.tokens.values().map(Vec::len).sum()
    }
}

/// Cached view of the backend catalog service
pub struct ChainAssetRegistry {
    service: Arc<dyn CatalogService>,
    catalog: RwLock<Arc<Catalog>>,
    /// Serializes refreshes so concurrent lazy loads fetch once
    refresh_lock: Mutex<()>,
}

impl ChainAssetRegistry {
    pub fn new(service: Arc<dyn CatalogService>) -> Self {
        Self {
            service,
            catalog: RwLock::new(Arc::new(Catalog::default())),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Current catalog snapshot (may be empty if never loaded)
    pub async fn snapshot(&self) -> Arc<Catalog> {
        self.catalog.read().await.clone()
    }

    /// Fetch chains and tokens and atomically replace the cached catalog
    pub async fn refresh(&self) -> BridgeResult<Arc<Catalog>> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch().await
    }

    /// Caller must hold `refresh_lock`
    async fn fetch(&self) -> BridgeResult<Arc<Catalog>> {
        let chains = self.service.chains().await?;
        let mut tokens = HashMap::with_capacity(chains.len());
        for chain in &chains {
            let chain_tokens = self.service.tokens(chain.id).await?;
            debug!("Fetched {} tokens for chain {}", chain_tokens.len(), chain.id);
            tokens.insert(chain.id, chain_tokens);
        }

        let catalog = Arc::new(Catalog {
            chains,
            tokens,
            fetched_at: Some(Utc::now()),
        });

        *self.catalog.write().await = catalog.clone();

        info!(
            "Catalog refreshed: {} chains, {} tokens",
            catalog.chains().len(),
            catalog.token_count()
        );
        crate::metrics::record_catalog_refresh(catalog.chains().len(), catalog.token_count());

        Ok(catalog)
    }

    /// Loaded catalog, fetching it on first use
    async fn loaded(&self) -> BridgeResult<Arc<Catalog>> {
        let current = self.snapshot().await;
        if current.is_loaded() {
            return Ok(current);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have finished a load while we waited
        let current = self.snapshot().await;
        if current.is_loaded() {
            return Ok(current);
        }

        self.fetch().await.map_err(|e| {
            warn!("Catalog load failed: {}", e);
            e
        })
    }

    pub async fn list_chains(&self) -> BridgeResult<Vec<Chain>> {
        Ok(self.loaded().await?.chains().to_vec())
    }

    pub async fn list_tokens(&self, chain_id: u64) -> BridgeResult<Vec<Token>> {
        let catalog = self.loaded().await?;
        if !catalog.chains().iter().any(|c| c.id == chain_id) {
            return Err(BridgeError::ChainNotFound { chain_id });
        }
        Ok(catalog.tokens(chain_id).to_vec())
    }

    pub async fn chain(&self, chain_id: u64) -> BridgeResult<Chain> {
        self.loaded()
            .await?
            .chains()
            .iter()
            .find(|c| c.id == chain_id)
            .cloned()
            .ok_or(BridgeError::ChainNotFound { chain_id })
    }

    /// Look up a token by chain and address (case-insensitive)
    pub async fn token(&self, chain_id: u64, address: &str) -> BridgeResult<Token> {
        self.loaded()
            .await?
            .tokens(chain_id)
            .iter()
            .find(|t| t.has_address(address))
            .cloned()
            .ok_or_else(|| BridgeError::TokenNotFound {
                chain_id,
                address: address.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockCatalogService;

    fn chain(id: u64, name: &str) -> Chain {
        Chain {
            id,
            name: name.to_string(),
            rpc_url: format!("https://{}.example", name),
        }
    }

    fn usdc(chain_id: u64) -> Token {
        Token {
            address: "0x07865c6E87B9F70255377e024ace6630C1Eaa37F".to_string(),
            chain_id,
            symbol: "USDC".to_string(),
            decimals: 6,
        }
    }

    fn mock_catalog() -> MockCatalogService {
        let mut service = MockCatalogService::new();
        service
            .expect_chains()
            .times(1)
            .returning(|| Ok(vec![chain(5, "goerli"), chain(80001, "mumbai")]));
        service
            .expect_tokens()
            .returning(|chain_id| Ok(vec![usdc(chain_id)]));
        service
    }

    #[tokio::test]
    async fn test_lazy_load_fetches_once() {
        let registry = ChainAssetRegistry::new(Arc::new(mock_catalog()));

        let chains = registry.list_chains().await.unwrap();
        assert_eq!(chains.len(), 2);

        // Served from cache; the mock allows a single chains() call
        let tokens = registry.list_tokens(80001).await.unwrap();
        assert_eq!(tokens[0].chain_id, 80001);
        assert!(registry.snapshot().await.is_loaded());
    }

    /// Yields inside `chains()` so concurrent callers interleave
    struct SlowCatalog {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CatalogService for SlowCatalog {
        async fn chains(&self) -> BridgeResult<Vec<Chain>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(vec![chain(5, "goerli")])
        }

        async fn tokens(&self, chain_id: u64) -> BridgeResult<Vec<Token>> {
            Ok(vec![usdc(chain_id)])
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_loads_fetch_once() {
        let service = Arc::new(SlowCatalog {
            calls: Default::default(),
        });
        let registry = ChainAssetRegistry::new(service.clone());

        let (chains, tokens, token) = tokio::join!(
            registry.list_chains(),
            registry.list_tokens(5),
            registry.token(5, "0x07865c6e87b9f70255377e024ace6630c1eaa37f"),
        );
        assert_eq!(chains.unwrap().len(), 1);
        assert_eq!(tokens.unwrap().len(), 1);
        assert_eq!(token.unwrap().symbol, "USDC");
        assert_eq!(service.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_lookup_is_case_insensitive() {
        let registry = ChainAssetRegistry::new(Arc::new(mock_catalog()));
        let token = registry
            .token(5, "0x07865C6E87B9F70255377E024ACE6630C1EAA37F")
            .await
            .unwrap();
        assert_eq!(token.decimals, 6);

        assert!(matches!(
            registry.token(5, "0xdead").await,
            Err(BridgeError::TokenNotFound { .. })
        ));
        assert!(matches!(
            registry.list_tokens(1).await,
            Err(BridgeError::ChainNotFound { chain_id: 1 })
        ));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_catalog() {
        let mut service = MockCatalogService::new();
        let mut calls = 0;
        service.expect_chains().times(2).returning(move || {
            calls += 1;
            if calls == 1 {
                Ok(vec![chain(5, "goerli")])
            } else {
                Err(BridgeError::CatalogUnavailable("connection reset".into()))
            }
        });
        service.expect_tokens().returning(|chain_id| Ok(vec![usdc(chain_id)]));

        let registry = ChainAssetRegistry::new(Arc::new(service));
        registry.refresh().await.unwrap();

        let err = registry.refresh().await.unwrap_err();
        assert!(matches!(err, BridgeError::CatalogUnavailable(_)));

        let chains = registry.list_chains().await.unwrap();
        assert_eq!(chains, vec![chain(5, "goerli")]);
    }

    #[tokio::test]
    async fn test_unavailable_catalog_propagates() {
        let mut service = MockCatalogService::new();
        service
            .expect_chains()
            .returning(|| Err(BridgeError::CatalogUnavailable("timeout".into())));

        let registry = ChainAssetRegistry::new(Arc::new(service));
        assert!(matches!(
            registry.list_chains().await,
            Err(BridgeError::CatalogUnavailable(_))
        ));
        assert!(!registry.snapshot().await.is_loaded());
    }
}
