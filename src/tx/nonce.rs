//! Nonce management for the wallet signer
//!
//! Several lifecycles may submit from the same wallet at once (e.g. two
//! bridges for different tokens). Nonces are allocated locally so their
//! transactions never collide.

use crate::chain::ChainProvider;
use crate::error::BridgeResult;

use dashmap::DashMap;
use ethers::types::Address;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Per-chain nonce state
#[derive(Debug, Default)]
struct ChainNonceState {
    /// Next nonce to hand out; `None` until synced with the chain
    current: Option<u64>,
    /// Submitted but unconfirmed: nonce -> tx hash
    pending: HashMap<u64, String>,
}

/// Manages nonces across multiple chains
pub struct NonceManager {
    wallet_address: Address,
    chain_state: DashMap<u64, Arc<Mutex<ChainNonceState>>>,
}

impl NonceManager {
    pub fn new(wallet_address: Address) -> Self {
        Self {
            wallet_address,
            chain_state: DashMap::new(),
        }
    }

    fn state(&self, chain_id: u64) -> Arc<Mutex<ChainNonceState>> {
        self.chain_state.entry(chain_id).or_default().value().clone()
    }

    /// Allocate the next nonce, syncing from the chain on first use
    pub async fn get_nonce(&self, provider: &ChainProvider) -> BridgeResult<u64> {
        let chain_id = provider.chain_id();
        let state = self.state(chain_id);
        let mut state = state.lock().await;

        let on_chain = if state.current.is_none() {
            Some(provider.get_transaction_count(self.wallet_address).await?)
        } else {
            None
        };
        let nonce = allocate(&mut state, on_chain);

        debug!("Allocated nonce {} for chain {}", nonce, chain_id);
        Ok(nonce)
    }

    /// Record the hash sent with a nonce
    pub async fn mark_pending(&self, chain_id: u64, nonce: u64, tx_hash: &str) {
        let state = self.state(chain_id);
        let mut state = state.lock().await;
        state.pending.insert(nonce, tx_hash.to_string());
    }

    /// Drop the pending entry for a mined transaction
    pub async fn confirm_hash(&self, chain_id: u64, tx_hash: &str) {
        let state = self.state(chain_id);
        let mut state = state.lock().await;
        state.pending.retain(|_, hash| !hash.eq_ignore_ascii_case(tx_hash));
    }

    /// Release a nonce whose transaction never reached the network
    pub async fn release_nonce(&self, chain_id: u64, nonce: u64) {
        let state = self.state(chain_id);
        let mut state = state.lock().await;
        release(&mut state, nonce);
    }

    /// Forget the local counter so the next allocation re-reads the chain
    pub async fn resync(&self, chain_id: u64) {
        let state = self.state(chain_id);
        let mut state = state.lock().await;
        warn!(
            "Resetting nonce state for chain {} ({} pending)",
            chain_id,
            state.pending.len()
        );
        state.current = None;
    }

    pub async fn pending_count(&self, chain_id: u64) -> usize {
        self.state(chain_id).lock().await.pending.len()
    }
}

fn allocate(state: &mut ChainNonceState, on_chain: Option<u64>) -> u64 {
    let next = match (state.current, on_chain) {
        (Some(local), Some(chain)) => local.max(chain),
        (Some(local), None) => local,
        (None, Some(chain)) => chain,
        (None, None) => 0,
    };
    state.current = Some(next + 1);
    next
}

fn release(state: &mut ChainNonceState, nonce: u64) {
    state.pending.remove(&nonce);
    // Only the most recent allocation can be handed out again
    if state.current == Some(nonce + 1) {
        state.current = Some(nonce);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_sequential() {
        let mut state = ChainNonceState::default();
        assert_eq!(allocate(&mut state, Some(7)), 7);
        assert_eq!(allocate(&mut state, None), 8);
        assert_eq!(allocate(&mut state, None), 9);
        // Chain moved ahead (tx sent elsewhere)
        assert_eq!(allocate(&mut state, Some(15)), 15);
    }

    #[test]
    fn test_release_only_reuses_latest() {
        let mut state = ChainNonceState::default();
        let a = allocate(&mut state, Some(0));
        let b = allocate(&mut state, None);

        release(&mut state, a);
        assert_eq!(state.current, Some(2));

        release(&mut state, b);
        assert_eq!(state.current, Some(1));
        assert_eq!(allocate(&mut state, None), 1);
    }
}
