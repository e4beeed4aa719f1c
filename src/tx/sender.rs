//! Local-key signer: builds, signs and broadcasts transactions over RPC

use super::gas::GasEstimator;
use super::nonce::NonceManager;
use super::{ExternalSigner, SignerError};
use crate::chain::{ChainManager, FinalityStatus, GasPrice};
use crate::config::WalletConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{LogEntry, ReceiptStatus, TxReceipt, UnsignedTx};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, Bytes, Eip1559TransactionRequest, TransactionReceipt, TransactionRequest, H256, U256,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Signer backed by a local private key
pub struct WalletSigner {
    chain_manager: Arc<ChainManager>,
    nonce_manager: NonceManager,
    gas_estimator: GasEstimator,
    wallet: LocalWallet,
    poll_interval: Duration,
}

impl WalletSigner {
    /// Create a signer with the key from the configured environment variable
    pub fn new(
        chain_manager: Arc<ChainManager>,
        config: &WalletConfig,
        poll_interval: Duration,
    ) -> BridgeResult<Self> {
        let wallet = Self::load_wallet(config)?;
        Ok(Self::with_wallet(chain_manager, wallet, poll_interval))
    }

    pub fn with_wallet(
        chain_manager: Arc<ChainManager>,
        wallet: LocalWallet,
        poll_interval: Duration,
    ) -> Self {
        info!("Wallet signer initialized with address: {:?}", wallet.address());

        Self {
            chain_manager,
            nonce_manager: NonceManager::new(wallet.address()),
            gas_estimator: GasEstimator::new(),
            wallet,
            poll_interval,
        }
    }

    fn load_wallet(config: &WalletConfig) -> BridgeResult<LocalWallet> {
        let key = std::env::var(&config.private_key_env).map_err(|_| {
            BridgeError::Config(format!(
                "No wallet configured. Set {}",
                config.private_key_env
            ))
        })?;

        key.trim()
            .parse::<LocalWallet>()
            .map_err(|e| BridgeError::Config(format!("Invalid private key: {}", e)))
    }

    /// Build the typed transaction for the unsigned payload
    fn build_typed_tx(
        &self,
        chain_id: u64,
        tx: &UnsignedTx,
        nonce: u64,
        gas_price: &GasPrice,
    ) -> Result<TypedTransaction, SignerError> {
        let to: Address = tx
            .to
            .parse()
            .map_err(|e| SignerError::Rejected(format!("invalid recipient {:?}: {}", tx.to, e)))?;
        let data = decode_data(&tx.data)?;
        let value = parse_quantity(&tx.value)
            .ok_or_else(|| SignerError::Rejected(format!("invalid value {:?}", tx.value)))?;

        let typed = match gas_price {
            GasPrice::Legacy(price) => TypedTransaction::Legacy(
                TransactionRequest::new()
                    .from(self.wallet.address())
                    .to(to)
                    .data(data)
                    .value(value)
                    .nonce(nonce)
                    .gas_price(*price)
                    .chain_id(chain_id),
            ),
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => TypedTransaction::Eip1559(
                Eip1559TransactionRequest::new()
                    .from(self.wallet.address())
                    .to(to)
                    .data(data)
                    .value(value)
                    .nonce(nonce)
                    .max_fee_per_gas(*max_fee_per_gas)
                    .max_priority_fee_per_gas(*max_priority_fee_per_gas)
                    .chain_id(chain_id),
            ),
        };

        Ok(typed)
    }

    async fn sign_and_send(
        &self,
        chain_id: u64,
        tx: &UnsignedTx,
        nonce: u64,
    ) -> Result<H256, SignerError> {
        let provider = self.chain_manager.get_provider(chain_id).map_err(transport)?;

        let gas_price = self
            .gas_estimator
            .get_gas_price(&provider)
            .await
            .map_err(transport)?;
        let mut typed = self.build_typed_tx(chain_id, tx, nonce, &gas_price)?;

        let provided_limit = match &tx.gas_limit {
            Some(limit) => Some(parse_quantity(limit).ok_or_else(|| {
                SignerError::Rejected(format!("invalid gas limit {:?}", limit))
            })?),
            None => None,
        };
        let gas_limit = self
            .gas_estimator
            .gas_limit(&provider, &typed, provided_limit)
            .await
            .map_err(transport)?;
        typed.set_gas(gas_limit);

        debug!(
            "Chain {}: nonce {}, gas limit {}, max cost {} wei",
            chain_id,
            nonce,
            gas_limit,
            GasEstimator::calculate_cost(gas_limit, &gas_price)
        );

        let signature = self
            .wallet
            .clone()
            .with_chain_id(chain_id)
            .sign_transaction(&typed)
            .await
            .map_err(|e| SignerError::Rejected(e.to_string()))?;

        provider
            .send_raw_transaction(typed.rlp_signed(&signature))
            .await
            .map_err(transport)
    }
}

#[async_trait]
impl ExternalSigner for WalletSigner {
    fn address(&self) -> String {
        format!("{:?}", self.wallet.address())
    }

    async fn send_transaction(&self, chain_id: u64, tx: UnsignedTx) -> Result<String, SignerError> {
        let provider = self.chain_manager.get_provider(chain_id).map_err(transport)?;
        let nonce = self
            .nonce_manager
            .get_nonce(&provider)
            .await
            .map_err(transport)?;

        match self.sign_and_send(chain_id, &tx, nonce).await {
            Ok(hash) => {
                let tx_hash = format!("{:?}", hash);
                self.nonce_manager.mark_pending(chain_id, nonce, &tx_hash).await;
                crate::metrics::record_tx_submitted(chain_id);
                info!("Transaction sent on chain {}: {} (nonce {})", chain_id, tx_hash, nonce);
                Ok(tx_hash)
            }
            Err(e) => {
                self.nonce_manager.release_nonce(chain_id, nonce).await;
                if e.to_string().contains("nonce too low") {
                    warn!("Nonce too low on chain {}, resyncing", chain_id);
                    self.nonce_manager.resync(chain_id).await;
                }
                Err(e)
            }
        }
    }

    async fn wait_for_receipt(
        &self,
        chain_id: u64,
        tx_hash: &str,
    ) -> Result<TxReceipt, SignerError> {
        let hash: H256 = tx_hash
            .parse()
            .map_err(|e| SignerError::Rejected(format!("invalid tx hash {:?}: {}", tx_hash, e)))?;
        let tracker = self
            .chain_manager
            .get_finality_tracker(chain_id)
            .map_err(transport)?;

        loop {
            match tracker.poll(hash).await {
                Ok(FinalityStatus::Final(receipt)) => {
                    self.nonce_manager.confirm_hash(chain_id, tx_hash).await;
                    debug!(
                        "Chain {}: {} final, {} still pending",
                        chain_id,
                        tx_hash,
                        self.nonce_manager.pending_count(chain_id).await
                    );
                    return Ok(convert_receipt(receipt));
                }
                Ok(FinalityStatus::Pending { .. }) | Ok(FinalityStatus::Unknown) => {}
                Err(e) => warn!("Receipt poll for {} failed: {}", tx_hash, e),
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn transport(err: BridgeError) -> SignerError {
    SignerError::Transport(err.to_string())
}

fn decode_data(data: &str) -> Result<Bytes, SignerError> {
    let trimmed = data.trim();
    let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(hex_str)
        .map(Bytes::from)
        .map_err(|e| SignerError::Rejected(format!("invalid calldata: {}", e)))
}

/// Decimal or 0x-prefixed hex quantity; empty means zero
fn parse_quantity(value: &str) -> Option<U256> {
    let value = value.trim();
    if value.is_empty() {
        return Some(U256::zero());
    }
    match value.strip_prefix("0x") {
        Some("") => Some(U256::zero()),
        Some(hex_str) => U256::from_str_radix(hex_str, 16).ok(),
        None => U256::from_dec_str(value).ok(),
    }
}

fn convert_receipt(receipt: TransactionReceipt) -> TxReceipt {
    let success = receipt.status.map(|s| s.as_u64() == 1);
    let status = match success {
        Some(false) => ReceiptStatus::Failed,
        _ => ReceiptStatus::Confirmed,
    };

    TxReceipt {
        hash: format!("{:?}", receipt.transaction_hash),
        status,
        logs: receipt
            .logs
            .iter()
            .map(|log| LogEntry {
                address: format!("{:?}", log.address),
                topics: log.topics.iter().map(|t| format!("{:?}", t)).collect(),
                data: format!("0x{}", hex::encode(log.data.to_vec())),
            })
            .collect(),
        success,
        block_number: receipt.block_number.map(|b| b.as_u64()),
    }
}
