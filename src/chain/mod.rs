//! Chain module - RPC connections used by the wallet signer
//!
//! This module provides:
//! - Multi-RPC provider management with automatic failover
//! - Per-chain confirmation depth tracking

pub mod finality;
pub mod provider;

pub use finality::{FinalityStatus, FinalityTracker};
pub use provider::{ChainProvider, GasPrice};

use crate::config::Settings;
use crate::error::{BridgeError, BridgeResult};

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Manages connections to all configured chains
pub struct ChainManager {
    /// Chain providers indexed by chain ID
    providers: DashMap<u64, Arc<ChainProvider>>,
    /// Finality trackers indexed by chain ID
    finality_trackers: DashMap<u64, Arc<FinalityTracker>>,
}

impl ChainManager {
    /// Create a chain manager for every enabled chain
    pub fn new(settings: &Settings) -> BridgeResult<Self> {
        let manager = Self::empty();

        for (name, chain_config) in settings.enabled_chains() {
            info!(
                "Initializing chain {} (ID: {})",
                chain_config.name, chain_config.chain_id
            );

            let depth = if chain_config.confirmation_blocks == 0 {
                let recommended = finality::recommended_confirmations(chain_config.chain_id);
                warn!(
                    "Chain {} has no confirmation depth configured, using {}",
                    name, recommended
                );
                recommended
            } else {
                chain_config.confirmation_blocks
            };

            let provider = Arc::new(ChainProvider::new(chain_config.clone())?);
            manager.insert(provider, depth);
        }

        Ok(manager)
    }

    fn empty() -> Self {
        Self {
            providers: DashMap::new(),
            finality_trackers: DashMap::new(),
        }
    }

    fn insert(&self, provider: Arc<ChainProvider>, confirmation_blocks: u64) {
        let chain_id = provider.chain_id();
        let finality = FinalityTracker::new(chain_id, confirmation_blocks, provider.clone());
        self.finality_trackers.insert(chain_id, Arc::new(finality));
        self.providers.insert(chain_id, provider);
    }

    /// Get provider for a specific chain
    pub fn get_provider(&self, chain_id: u64) -> BridgeResult<Arc<ChainProvider>> {
        self.providers
            .get(&chain_id)
            .map(|p| p.clone())
            .ok_or(BridgeError::ChainNotFound { chain_id })
    }

    /// Get finality tracker for a specific chain
    pub fn get_finality_tracker(&self, chain_id: u64) -> BridgeResult<Arc<FinalityTracker>> {
        self.finality_trackers
            .get(&chain_id)
            .map(|f| f.clone())
            .ok_or(BridgeError::ChainNotFound { chain_id })
    }

    /// Health check for all chains
    pub async fn health_check(&self) -> Vec<(u64, bool)> {
        let providers: Vec<_> = self.providers.iter().map(|e| e.value().clone()).collect();
        let mut results = Vec::with_capacity(providers.len());

        for provider in providers {
            let healthy = provider.health_check().await;
            crate::metrics::record_chain_health(provider.chain_id(), healthy);
            results.push((provider.chain_id(), healthy));
        }

        results
    }

    /// Get all connected chain IDs
    pub fn connected_chains(&self) -> Vec<u64> {
        let mut chains: Vec<u64> = self.providers.iter().map(|e| *e.key()).collect();
        chains.sort_unstable();
        chains
    }
}
