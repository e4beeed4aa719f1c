//! Confirmation depth tracking for submitted transactions
//!
//! A receipt is only handed to the lifecycle once the block that included it
//! is `confirmation_blocks` deep and the receipt is still present (reorg
//! protection).

use crate::chain::ChainProvider;
use crate::error::BridgeResult;

use ethers::types::{TransactionReceipt, H256};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a single finality poll
#[derive(Debug, Clone)]
pub enum FinalityStatus {
    /// No receipt yet
    Unknown,
    /// Mined, waiting for more confirmations
    Pending { confirmations: u64 },
    /// Deep enough and still included
    Final(TransactionReceipt),
}

/// Tracks finality for transactions on a specific chain
pub struct FinalityTracker {
    chain_id: u64,
    confirmation_blocks: u64,
    provider: Arc<ChainProvider>,
}

impl FinalityTracker {
    pub fn new(chain_id: u64, confirmation_blocks: u64, provider: Arc<ChainProvider>) -> Self {
        Self {
            chain_id,
            confirmation_blocks,
            provider,
        }
    }

    /// Poll the chain once for the receipt and its confirmation depth
    pub async fn poll(&self, tx_hash: H256) -> BridgeResult<FinalityStatus> {
        let receipt = match self.provider.get_transaction_receipt(tx_hash).await? {
            Some(receipt) => receipt,
            None => return Ok(FinalityStatus::Unknown),
        };

        let tx_block = match receipt.block_number {
            Some(block) => block.as_u64(),
            None => return Ok(FinalityStatus::Unknown),
        };

        let current_block = self.provider.get_block_number().await?;
        let confirmations = confirmations(current_block, tx_block);

        if confirmations < self.confirmation_blocks {
            debug!(
                "Transaction {:?} has {} / {} confirmations on chain {}",
                tx_hash, confirmations, self.confirmation_blocks, self.chain_id
            );
            return Ok(FinalityStatus::Pending { confirmations });
        }

        // Verify the transaction is still included
        match self.provider.get_transaction_receipt(tx_hash).await? {
            Some(latest) if latest.block_hash == receipt.block_hash => {
                Ok(FinalityStatus::Final(latest))
            }
            _ => {
                warn!(
                    "Reorg detected: tx {:?} moved or dropped on chain {} (was block {})",
                    tx_hash, self.chain_id, tx_block
                );
                Ok(FinalityStatus::Unknown)
            }
        }
    }
}

/// Confirmations for a tx mined at `tx_block`; the inclusion block counts as one
pub fn confirmations(current_block: u64, tx_block: u64) -> u64 {
    if current_block < tx_block {
        0
    } else {
        current_block - tx_block + 1
    }
}

/// Get recommended confirmation blocks for a chain
pub fn recommended_confirmations(chain_id: u64) -> u64 {
    match chain_id {
        // Ethereum mainnet
        1 => 32,
        // Ethereum testnets
        11155111 | 5 => 12,
        // Polygon mainnet
        137 => 128,
        // Polygon testnets
        80001 | 80002 => 32,
        // Arbitrum
        42161 | 421614 => 64,
        // Optimism
        10 | 11155420 => 64,
        // Base
        8453 | 84532 => 64,
        // Avalanche (instant finality)
        43114 | 43113 => 1,
        // Default conservative
        _ => 64,
    }
}
