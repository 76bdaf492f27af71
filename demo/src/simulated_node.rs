//! A scripted stand-in for the contract worker fleet.
//!
//! Answers the handful of contract methods the demo exercises, keeping its
//! own "on-ledger" pair list so re-syncs have something to reconcile.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use verdant_contracts::{
    contract::{ContractParam, TokenPair},
    error::{EngineError, EngineResult},
};
use verdant_sync::{ContractTask, WorkerQueue};

#[derive(Default)]
pub struct SimulatedContractNode {
    pairs: Mutex<Vec<TokenPair>>,
}

impl SimulatedContractNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip a pair's availability on the simulated ledger side.
    pub fn enable_pair(&self, base: &str, opposite: &str) {
        let mut pairs = self.pairs.lock();
        for pair in pairs.iter_mut() {
            if pair.base == base && pair.opposite == opposite {
                pair.available = true;
            }
        }
    }
}

#[async_trait]
impl WorkerQueue for SimulatedContractNode {
    async fn dispatch(&self, task: &ContractTask) -> EngineResult<serde_json::Value> {
        match task.method.as_str() {
            "deploy" => Ok(json!({ "contractId": "0.0.5001", "topicId": "0.0.5002" })),
            "addPair" => {
                let mut params = task.params.iter();
                let base = match params.next() {
                    Some(ContractParam::Address(a)) => a.clone(),
                    _ => return Err(EngineError::transport("addPair: missing base address")),
                };
                let opposite = match params.next() {
                    Some(ContractParam::Address(a)) => a.clone(),
                    _ => return Err(EngineError::transport("addPair: missing opposite address")),
                };
                let base_count = match params.next() {
                    Some(ContractParam::Int64(n)) => *n,
                    _ => 0,
                };
                let opposite_count = match params.next() {
                    Some(ContractParam::Int64(n)) => *n,
                    _ => 0,
                };
                self.pairs.lock().push(TokenPair {
                    base,
                    opposite,
                    base_count,
                    opposite_count,
                    base_symbol: String::new(),
                    opposite_symbol: String::new(),
                    base_decimals: 0,
                    opposite_decimals: 0,
                    immediately: false,
                    available: false,
                });
                Ok(json!({}))
            }
            "getPairs" => serde_json::to_value(self.pairs.lock().clone())
                .map_err(|e| EngineError::transport(e.to_string())),
            "getRequests" => Ok(json!([])),
            "getRetireRequests" => Ok(json!([])),
            "getContractMemo" => Ok(json!("0.0.5002")),
            "getType" => Ok(json!("RETIRE")),
            "permissions" => Ok(json!("1111")),
            other => Err(EngineError::transport(format!(
                "simulated node does not implement '{other}'"
            ))),
        }
    }
}
