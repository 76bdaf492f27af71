//! The contract worker queue.
//!
//! Every on-ledger contract interaction is a `ContractTask` dispatched
//! through the `WorkerQueue` trait. Read-only queries go through the
//! retryable wrapper, which retries a small fixed number of times on
//! transient transport failures. State-mutating calls use plain `dispatch`
//! and execute exactly once — a failed mutation is reported, never retried.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;
use verdant_contracts::{
    contract::ContractParam,
    error::{EngineError, EngineResult},
};

/// Transient-failure retry budget for read-only tasks.
pub const RETRY_ATTEMPTS: u32 = 3;

/// One unit of contract work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractTask {
    pub contract_id: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<ContractParam>,
}

impl ContractTask {
    pub fn new(contract_id: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            contract_id: contract_id.into(),
            method: method.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<ContractParam>) -> Self {
        self.params = params;
        self
    }
}

/// Executes contract tasks against the ledger.
#[async_trait]
pub trait WorkerQueue: Send + Sync {
    /// Execute the task exactly once.
    async fn dispatch(&self, task: &ContractTask) -> EngineResult<serde_json::Value>;

    /// Execute a read-only task, retrying transient `Transport` failures
    /// up to `RETRY_ATTEMPTS` times. Any other error aborts immediately.
    async fn dispatch_retryable(&self, task: &ContractTask) -> EngineResult<serde_json::Value> {
        let mut last = None;
        for attempt in 1..=RETRY_ATTEMPTS {
            match self.dispatch(task).await {
                Ok(value) => return Ok(value),
                Err(err @ EngineError::Transport { .. }) => {
                    warn!(
                        contract_id = %task.contract_id,
                        method = %task.method,
                        attempt,
                        error = %err,
                        "contract query failed, retrying"
                    );
                    last = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last.unwrap_or_else(|| EngineError::transport("contract query failed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Fails with a transport error `failures` times, then succeeds.
    struct FlakyWorker {
        failures: u32,
        attempts: Mutex<u32>,
    }

    #[async_trait]
    impl WorkerQueue for FlakyWorker {
        async fn dispatch(&self, _task: &ContractTask) -> EngineResult<serde_json::Value> {
            let mut attempts = self.attempts.lock();
            *attempts += 1;
            if *attempts <= self.failures {
                Err(EngineError::transport("node unreachable"))
            } else {
                Ok(json!("ok"))
            }
        }
    }

    /// Always fails with a non-transient error.
    struct RejectingWorker {
        attempts: Mutex<u32>,
    }

    #[async_trait]
    impl WorkerQueue for RejectingWorker {
        async fn dispatch(&self, _task: &ContractTask) -> EngineResult<serde_json::Value> {
            *self.attempts.lock() += 1;
            Err(EngineError::permission("not a contract admin"))
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried_within_budget() {
        let worker = FlakyWorker {
            failures: 2,
            attempts: Mutex::new(0),
        };
        let task = ContractTask::new("0.0.500", "getRequests");
        let value = worker.dispatch_retryable(&task).await.unwrap();
        assert_eq!(value, json!("ok"));
        assert_eq!(*worker.attempts.lock(), 3);
    }

    #[tokio::test]
    async fn budget_exhaustion_returns_the_last_error() {
        let worker = FlakyWorker {
            failures: 10,
            attempts: Mutex::new(0),
        };
        let task = ContractTask::new("0.0.500", "getRequests");
        let result = worker.dispatch_retryable(&task).await;
        assert!(matches!(result, Err(EngineError::Transport { .. })));
        assert_eq!(*worker.attempts.lock(), RETRY_ATTEMPTS);
    }

    #[tokio::test]
    async fn non_transient_errors_abort_immediately() {
        let worker = RejectingWorker {
            attempts: Mutex::new(0),
        };
        let task = ContractTask::new("0.0.500", "getRequests");
        let result = worker.dispatch_retryable(&task).await;
        assert!(matches!(result, Err(EngineError::Permission { .. })));
        assert_eq!(*worker.attempts.lock(), 1);
    }
}
