//! Shared data model for chains, tokens, routes and transactions
//!
//! Wire shapes follow the bridge backend's JSON (camelCase). Amounts that
//! must be compared are converted to `U256` base units; they are never
//! handled as floating point.

use ethers::types::U256;
use serde::{Deserialize, Serialize};

fn default_decimals() -> u8 {
    18
}

/// A supported chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub rpc_url: String,
}

/// A bridgeable token on a specific chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub address: String,
    pub chain_id: u64,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

impl Token {
    /// Case-insensitive address comparison
    pub fn has_address(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceQuery {
    pub chain_id: u64,
    pub owner_address: String,
    pub spender_address: String,
    pub token_address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowanceResult {
    pub allowed_amount: U256,
}

/// One hop of a bridge route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hop {
    pub protocol: String,
    pub chain_id: u64,
    #[serde(default)]
    pub token_in: String,
    #[serde(default)]
    pub token_out: String,
}

/// A priced path from a source chain to a destination chain.
/// `estimated_output` and `fee` are base-unit integers as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,
    pub chain_from: u64,
    pub chain_to: u64,
    pub estimated_output: String,
    pub fee: String,
    #[serde(default)]
    pub path: Vec<Hop>,
}

impl Route {
    pub fn estimated_output_units(&self) -> Option<U256> {
        U256::from_dec_str(self.estimated_output.trim()).ok()
    }

    pub fn fee_units(&self) -> Option<U256> {
        U256::from_dec_str(self.fee.trim()).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub chain_from: u64,
    pub chain_to: u64,
    pub token: String,
    /// Human-unit decimal string, e.g. "100.5"
    pub amount: String,
}

/// Input to the bridge transaction builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRequest {
    pub chain_id: u64,
    pub from_address: String,
    pub to_address: String,
    pub token_address: String,
    /// Human-unit decimal string
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
}

/// Transaction payload ready for signing. Not `Clone`: a built transaction is
/// handed to the signer exactly once.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTx {
    pub to: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub hash: String,
    pub status: ReceiptStatus,
    pub logs: Vec<LogEntry>,
    /// Explicit execution status reported by the signer, if it knows it
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub block_number: Option<u64>,
}

/// How a receipt should be interpreted by the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptVerdict {
    Succeeded,
    Reverted,
    /// Not enough evidence either way; a mined receipt without logs and
    /// without an explicit success flag lands here
    Indeterminate,
}

impl TxReceipt {
    pub fn verdict(&self) -> ReceiptVerdict {
        if self.status == ReceiptStatus::Failed || self.success == Some(false) {
            return ReceiptVerdict::Reverted;
        }
        if self.status == ReceiptStatus::Confirmed
            && (!self.logs.is_empty() || self.success == Some(true))
        {
            return ReceiptVerdict::Succeeded;
        }
        ReceiptVerdict::Indeterminate
    }
}
