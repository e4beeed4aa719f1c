//! Transaction signing and broadcast
//!
//! The orchestrator only sees the `ExternalSigner` capability. `WalletSigner`
//! is the local-key implementation used by the service binary, with nonce
//! management and gas selection.

mod gas;
mod nonce;
mod sender;

pub use gas::GasEstimator;
pub use nonce::NonceManager;
pub use sender::WalletSigner;

use crate::error::BridgeError;
use crate::types::{TxReceipt, UnsignedTx};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// The signer declined (user rejected, invalid payload, key error)
    #[error("rejected: {0}")]
    Rejected(String),

    /// The signer could not reach the network
    #[error("transport: {0}")]
    Transport(String),
}

impl From<SignerError> for BridgeError {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::Rejected(message) => BridgeError::SignerRejected(message),
            SignerError::Transport(message) => BridgeError::Transport(message),
        }
    }
}

/// Signing and broadcast capability supplied to the orchestrator
#[async_trait]
pub trait ExternalSigner: Send + Sync {
    /// Address transactions are sent from
    fn address(&self) -> String;

    /// Sign and broadcast, returning the transaction hash. Takes the
    /// transaction by value: it is consumed exactly once.
    async fn send_transaction(&self, chain_id: u64, tx: UnsignedTx) -> Result<String, SignerError>;

    /// Wait until the transaction is mined and final. May wait indefinitely;
    /// callers bound it with a timeout.
    async fn wait_for_receipt(&self, chain_id: u64, tx_hash: &str)
        -> Result<TxReceipt, SignerError>;
}
