//! On-ledger contract cache types.
//!
//! The sync adapter reconciles on-ledger contract state (token pairs, wipe
//! requests) into these cached documents. Staleness is visible through the
//! sync dates — nothing refreshes in the background.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of managed contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractType {
    Wipe,
    Retire,
}

/// A retire pair between two tokens.
///
/// `available` is tracked locally — the ledger does not report it — and is
/// preserved across pair re-syncs by order-insensitive (base, opposite)
/// identity matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub base: String,
    pub opposite: String,
    pub base_count: i64,
    pub opposite_count: i64,
    #[serde(default)]
    pub base_symbol: String,
    #[serde(default)]
    pub opposite_symbol: String,
    #[serde(default)]
    pub base_decimals: u32,
    #[serde(default)]
    pub opposite_decimals: u32,
    #[serde(default)]
    pub immediately: bool,
    #[serde(default)]
    pub available: bool,
}

/// A retire request pending on a retire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetireRequest {
    /// Account that asked to retire.
    pub user: String,
    pub base: String,
    pub opposite: String,
    pub base_count: i64,
    pub opposite_count: i64,
}

/// The cached view of one contract's on-ledger state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractCache {
    /// Pending wipe-request addresses.
    #[serde(default)]
    pub requests: Vec<String>,
    pub sync_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pairs: Vec<TokenPair>,
    pub pairs_sync_date: Option<DateTime<Utc>>,
    /// Pending retire requests.
    #[serde(default)]
    pub retire_requests: Vec<RetireRequest>,
    pub retire_sync_date: Option<DateTime<Utc>>,
}

/// A managed contract record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub contract_id: String,
    pub owner: String,
    #[serde(default)]
    pub description: String,
    /// Bit string of granted contract permissions (e.g. `"1111"`).
    #[serde(default)]
    pub permissions: String,
    pub topic_id: Option<String>,
    pub contract_type: ContractType,
    #[serde(default)]
    pub cache: ContractCache,
}

/// A typed parameter passed to a contract call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ContractParam {
    Address(String),
    Bool(bool),
    Int64(i64),
    #[serde(rename = "int64[]")]
    Int64Array(Vec<i64>),
}

/// A token record, used for decimal scaling of pair counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub token_id: String,
    pub symbol: String,
    pub decimals: u32,
}
