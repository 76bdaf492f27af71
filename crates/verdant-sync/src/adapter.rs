//! Contract cache synchronization.
//!
//! Reconciles on-ledger contract state into locally cached `Contract`
//! documents. Sync calls are idempotent, last-write-wins, and deliberately
//! unserialized — concurrent syncs of the same contract settle on whichever
//! finished last, and the sync dates make staleness visible.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};
use verdant_contracts::{
    contract::{Contract, ContractParam, ContractType, RetireRequest, TokenInfo, TokenPair},
    error::{EngineError, EngineResult},
};

use crate::worker::{ContractTask, WorkerQueue};

/// Durable storage for contract cache documents.
#[async_trait]
pub trait ContractStore: Send + Sync {
    async fn save_contract(&self, contract: &Contract) -> EngineResult<()>;
    async fn load_contract(&self, contract_id: &str) -> EngineResult<Option<Contract>>;
    async fn list_contracts(&self, owner: &str) -> EngineResult<Vec<Contract>>;
}

/// Map-backed contract store.
#[derive(Default)]
pub struct InMemoryContractStore {
    contracts: RwLock<std::collections::HashMap<String, Contract>>,
}

impl InMemoryContractStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContractStore for InMemoryContractStore {
    async fn save_contract(&self, contract: &Contract) -> EngineResult<()> {
        self.contracts
            .write()
            .insert(contract.contract_id.clone(), contract.clone());
        Ok(())
    }

    async fn load_contract(&self, contract_id: &str) -> EngineResult<Option<Contract>> {
        Ok(self.contracts.read().get(contract_id).cloned())
    }

    async fn list_contracts(&self, owner: &str) -> EngineResult<Vec<Contract>> {
        Ok(self
            .contracts
            .read()
            .values()
            .filter(|c| c.owner == owner)
            .cloned()
            .collect())
    }
}

/// Scale a whole-token count into the token's smallest unit.
fn scale_count(count: i64, decimals: u32) -> EngineResult<i64> {
    10i64
        .checked_pow(decimals)
        .and_then(|unit| count.checked_mul(unit))
        .ok_or_else(|| {
            EngineError::validation(format!(
                "count {count} with {decimals} decimals does not fit a 64-bit amount"
            ))
        })
}

/// Order-insensitive (base, opposite) pair identity.
fn is_same_pair(pair: &TokenPair, base: &str, opposite: &str) -> bool {
    (pair.base == base && pair.opposite == opposite)
        || (pair.base == opposite && pair.opposite == base)
}

/// True when the permission bit at `bit` (counted from the right) is set.
pub fn check_permissions(permissions: &str, bit: usize) -> bool {
    permissions
        .chars()
        .rev()
        .nth(bit)
        .map(|c| c == '1')
        .unwrap_or(false)
}

pub struct ContractSyncAdapter {
    store: Arc<dyn ContractStore>,
    worker: Arc<dyn WorkerQueue>,
}

impl ContractSyncAdapter {
    pub fn new(store: Arc<dyn ContractStore>, worker: Arc<dyn WorkerQueue>) -> Self {
        Self { store, worker }
    }

    async fn load(&self, contract_id: &str) -> EngineResult<Contract> {
        self.store
            .load_contract(contract_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("no contract '{contract_id}'")))
    }

    // ── Sync operations ─────────────────────────────────────────────────────

    /// Overwrite the cached wipe-request list with the on-ledger one.
    pub async fn sync_wipe_requests(&self, contract_id: &str) -> EngineResult<Vec<String>> {
        let mut contract = self.load(contract_id).await?;
        let value = self
            .worker
            .dispatch_retryable(&ContractTask::new(contract_id, "getRequests"))
            .await?;
        let requests: Vec<String> = serde_json::from_value(value).map_err(|e| {
            EngineError::transport(format!("malformed wipe-request response: {e}"))
        })?;

        contract.cache.requests = requests.clone();
        contract.cache.sync_date = Some(Utc::now());
        self.store.save_contract(&contract).await?;
        debug!(contract_id = %contract_id, count = requests.len(), "wipe requests synced");
        Ok(requests)
    }

    /// Overwrite the cached retire-request list with the on-ledger one.
    pub async fn sync_retire_requests(
        &self,
        contract_id: &str,
    ) -> EngineResult<Vec<RetireRequest>> {
        let mut contract = self.load(contract_id).await?;
        let value = self
            .worker
            .dispatch_retryable(&ContractTask::new(contract_id, "getRetireRequests"))
            .await?;
        let requests: Vec<RetireRequest> = serde_json::from_value(value).map_err(|e| {
            EngineError::transport(format!("malformed retire-request response: {e}"))
        })?;

        contract.cache.retire_requests = requests.clone();
        contract.cache.retire_sync_date = Some(Utc::now());
        self.store.save_contract(&contract).await?;
        debug!(contract_id = %contract_id, count = requests.len(), "retire requests synced");
        Ok(requests)
    }

    /// Overwrite the cached pair list with the on-ledger one, preserving
    /// each locally tracked `available` flag by order-insensitive identity.
    pub async fn sync_pairs(&self, contract_id: &str) -> EngineResult<Vec<TokenPair>> {
        let mut contract = self.load(contract_id).await?;
        let value = self
            .worker
            .dispatch_retryable(&ContractTask::new(contract_id, "getPairs"))
            .await?;
        let mut pairs: Vec<TokenPair> = serde_json::from_value(value)
            .map_err(|e| EngineError::transport(format!("malformed pair response: {e}")))?;

        for pair in &mut pairs {
            if let Some(local) = contract
                .cache
                .pairs
                .iter()
                .find(|p| is_same_pair(p, &pair.base, &pair.opposite))
            {
                pair.available = local.available;
            }
        }

        contract.cache.pairs = pairs.clone();
        contract.cache.pairs_sync_date = Some(Utc::now());
        self.store.save_contract(&contract).await?;
        debug!(contract_id = %contract_id, count = pairs.len(), "pairs synced");
        Ok(pairs)
    }

    /// Patch one pair's `available` flag in place.
    pub async fn sync_pair_availability(
        &self,
        contract_id: &str,
        base: &str,
        opposite: &str,
        available: bool,
    ) -> EngineResult<TokenPair> {
        let mut contract = self.load(contract_id).await?;
        let pair = contract
            .cache
            .pairs
            .iter_mut()
            .find(|p| is_same_pair(p, base, opposite))
            .ok_or_else(|| {
                EngineError::not_found(format!(
                    "no pair ({base}, {opposite}) on contract '{contract_id}'"
                ))
            })?;
        pair.available = available;
        let patched = pair.clone();
        self.store.save_contract(&contract).await?;
        Ok(patched)
    }

    // ── Contract management ─────────────────────────────────────────────────

    /// Deploy a new contract; state mutation, dispatched exactly once.
    pub async fn create_contract(
        &self,
        owner: &str,
        description: &str,
        contract_type: ContractType,
    ) -> EngineResult<Contract> {
        let value = self
            .worker
            .dispatch(&ContractTask::new("", "deploy"))
            .await?;
        let contract_id = value
            .get("contractId")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| EngineError::transport("deploy response carries no contract id"))?
            .to_string();

        let contract = Contract {
            contract_id: contract_id.clone(),
            owner: owner.to_string(),
            description: description.to_string(),
            // The deploying owner holds every permission.
            permissions: "1111".to_string(),
            topic_id: value
                .get("topicId")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
            contract_type,
            cache: Default::default(),
        };
        self.store.save_contract(&contract).await?;
        info!(contract_id = %contract_id, ?contract_type, "contract created");
        Ok(contract)
    }

    /// Import an existing on-ledger contract: recover its topic from the
    /// contract memo, read type and permissions, and prime the wipe cache.
    pub async fn import_contract(
        &self,
        contract_id: &str,
        owner: &str,
        description: &str,
    ) -> EngineResult<Contract> {
        let memo = self
            .worker
            .dispatch_retryable(&ContractTask::new(contract_id, "getContractMemo"))
            .await?;
        let topic_id = memo.as_str().map(str::to_string);

        let type_value = self
            .worker
            .dispatch_retryable(&ContractTask::new(contract_id, "getType"))
            .await?;
        let contract_type: ContractType = serde_json::from_value(type_value)
            .map_err(|e| EngineError::transport(format!("malformed contract type: {e}")))?;

        let permissions = self
            .worker
            .dispatch_retryable(&ContractTask::new(contract_id, "permissions"))
            .await?
            .as_str()
            .unwrap_or("0")
            .to_string();

        let contract = Contract {
            contract_id: contract_id.to_string(),
            owner: owner.to_string(),
            description: description.to_string(),
            permissions,
            topic_id,
            contract_type,
            cache: Default::default(),
        };
        self.store.save_contract(&contract).await?;

        match contract.contract_type {
            ContractType::Wipe => {
                self.sync_wipe_requests(contract_id).await?;
            }
            ContractType::Retire => {
                self.sync_pairs(contract_id).await?;
                self.sync_retire_requests(contract_id).await?;
            }
        }
        info!(contract_id = %contract_id, "contract imported");
        self.load(contract_id).await
    }

    /// Register a retire pair, scaling token counts by each token's
    /// decimals. State mutation, dispatched exactly once.
    pub async fn add_pair(
        &self,
        contract_id: &str,
        base: &TokenInfo,
        opposite: &TokenInfo,
        base_count: i64,
        opposite_count: i64,
        immediately: bool,
    ) -> EngineResult<TokenPair> {
        let mut contract = self.load(contract_id).await?;

        let base_scaled = scale_count(base_count, base.decimals)?;
        let opposite_scaled = scale_count(opposite_count, opposite.decimals)?;
        self.worker
            .dispatch(
                &ContractTask::new(contract_id, "addPair").with_params(vec![
                    ContractParam::Address(base.token_id.clone()),
                    ContractParam::Address(opposite.token_id.clone()),
                    ContractParam::Int64(base_scaled),
                    ContractParam::Int64(opposite_scaled),
                    ContractParam::Bool(immediately),
                ]),
            )
            .await?;

        let pair = TokenPair {
            base: base.token_id.clone(),
            opposite: opposite.token_id.clone(),
            base_count: base_scaled,
            opposite_count: opposite_scaled,
            base_symbol: base.symbol.clone(),
            opposite_symbol: opposite.symbol.clone(),
            base_decimals: base.decimals,
            opposite_decimals: opposite.decimals,
            immediately,
            available: false,
        };
        contract.cache.pairs.push(pair.clone());
        self.store.save_contract(&contract).await?;
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;

    /// Scripted worker: method name → response, counting dispatches.
    struct ScriptedWorker {
        responses: HashMap<String, serde_json::Value>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedWorker {
        fn new(responses: &[(&str, serde_json::Value)]) -> Self {
            Self {
                responses: responses
                    .iter()
                    .map(|(m, v)| (m.to_string(), v.clone()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl WorkerQueue for ScriptedWorker {
        async fn dispatch(&self, task: &ContractTask) -> EngineResult<serde_json::Value> {
            self.calls.lock().push(task.method.clone());
            self.responses
                .get(&task.method)
                .cloned()
                .ok_or_else(|| EngineError::transport(format!("no response for {}", task.method)))
        }
    }

    fn wipe_contract(contract_id: &str) -> Contract {
        Contract {
            contract_id: contract_id.to_string(),
            owner: "did:owner".to_string(),
            description: String::new(),
            permissions: "1111".to_string(),
            topic_id: None,
            contract_type: ContractType::Wipe,
            cache: Default::default(),
        }
    }

    fn pair(base: &str, opposite: &str, available: bool) -> TokenPair {
        TokenPair {
            base: base.to_string(),
            opposite: opposite.to_string(),
            base_count: 100,
            opposite_count: 100,
            base_symbol: String::new(),
            opposite_symbol: String::new(),
            base_decimals: 0,
            opposite_decimals: 0,
            immediately: false,
            available,
        }
    }

    async fn adapter_with(
        contract: Contract,
        worker: ScriptedWorker,
    ) -> (ContractSyncAdapter, Arc<InMemoryContractStore>) {
        let store = Arc::new(InMemoryContractStore::new());
        store.save_contract(&contract).await.unwrap();
        (
            ContractSyncAdapter::new(store.clone(), Arc::new(worker)),
            store,
        )
    }

    #[tokio::test]
    async fn wipe_sync_overwrites_and_stamps() {
        let worker = ScriptedWorker::new(&[("getRequests", json!(["0.0.7", "0.0.8"]))]);
        let (adapter, store) = adapter_with(wipe_contract("0.0.500"), worker).await;

        let requests = adapter.sync_wipe_requests("0.0.500").await.unwrap();
        assert_eq!(requests, vec!["0.0.7", "0.0.8"]);

        let stored = store.load_contract("0.0.500").await.unwrap().unwrap();
        assert_eq!(stored.cache.requests, requests);
        assert!(stored.cache.sync_date.is_some());
    }

    #[tokio::test]
    async fn pair_sync_preserves_available_order_insensitively() {
        let mut contract = wipe_contract("0.0.500");
        contract.contract_type = ContractType::Retire;
        contract.cache.pairs = vec![pair("0.0.1", "0.0.2", true)];

        // Remote reports the pair with base and opposite swapped.
        let remote = serde_json::to_value(vec![
            pair("0.0.2", "0.0.1", false),
            pair("0.0.3", "0.0.4", false),
        ])
        .unwrap();
        let worker = ScriptedWorker::new(&[("getPairs", remote)]);
        let (adapter, _) = adapter_with(contract, worker).await;

        let pairs = adapter.sync_pairs("0.0.500").await.unwrap();
        assert_eq!(pairs.len(), 2);
        assert!(pairs[0].available, "local flag must survive the merge");
        assert!(!pairs[1].available);
    }

    #[tokio::test]
    async fn availability_patch_is_in_place() {
        let mut contract = wipe_contract("0.0.500");
        contract.cache.pairs = vec![pair("0.0.1", "0.0.2", false), pair("0.0.3", "0.0.4", false)];
        let worker = ScriptedWorker::new(&[]);
        let (adapter, store) = adapter_with(contract, worker).await;

        let patched = adapter
            .sync_pair_availability("0.0.500", "0.0.2", "0.0.1", true)
            .await
            .unwrap();
        assert!(patched.available);

        let stored = store.load_contract("0.0.500").await.unwrap().unwrap();
        assert!(stored.cache.pairs[0].available);
        assert!(!stored.cache.pairs[1].available);

        assert!(matches!(
            adapter
                .sync_pair_availability("0.0.500", "0.0.9", "0.0.1", true)
                .await,
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn add_pair_scales_by_token_decimals() {
        let mut contract = wipe_contract("0.0.500");
        contract.contract_type = ContractType::Retire;
        let worker = ScriptedWorker::new(&[("addPair", json!({}))]);
        let (adapter, _) = adapter_with(contract, worker).await;

        let base = TokenInfo {
            token_id: "0.0.1".to_string(),
            symbol: "CO2".to_string(),
            decimals: 2,
        };
        let opposite = TokenInfo {
            token_id: "0.0.2".to_string(),
            symbol: "CRC".to_string(),
            decimals: 0,
        };
        let pair = adapter
            .add_pair("0.0.500", &base, &opposite, 5, 7, false)
            .await
            .unwrap();

        assert_eq!(pair.base_count, 500);
        assert_eq!(pair.opposite_count, 7);
        assert!(!pair.available);
    }

    #[tokio::test]
    async fn import_recovers_topic_and_primes_wipe_cache() {
        let worker = ScriptedWorker::new(&[
            ("getContractMemo", json!("0.0.900")),
            ("getType", json!("WIPE")),
            ("permissions", json!("1011")),
            ("getRequests", json!(["0.0.7"])),
        ]);
        let store = Arc::new(InMemoryContractStore::new());
        let adapter = ContractSyncAdapter::new(store, Arc::new(worker));

        let contract = adapter
            .import_contract("0.0.500", "did:owner", "imported")
            .await
            .unwrap();

        assert_eq!(contract.topic_id.as_deref(), Some("0.0.900"));
        assert_eq!(contract.contract_type, ContractType::Wipe);
        assert_eq!(contract.permissions, "1011");
        assert_eq!(contract.cache.requests, vec!["0.0.7"]);
    }

    #[tokio::test]
    async fn retire_sync_overwrites_and_stamps() {
        let mut contract = wipe_contract("0.0.500");
        contract.contract_type = ContractType::Retire;
        let remote = json!([{
            "user": "0.0.42",
            "base": "0.0.1",
            "opposite": "0.0.2",
            "base_count": 500,
            "opposite_count": 7
        }]);
        let worker = ScriptedWorker::new(&[("getRetireRequests", remote)]);
        let (adapter, store) = adapter_with(contract, worker).await;

        let requests = adapter.sync_retire_requests("0.0.500").await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].user, "0.0.42");

        let stored = store.load_contract("0.0.500").await.unwrap().unwrap();
        assert_eq!(stored.cache.retire_requests.len(), 1);
        assert!(stored.cache.retire_sync_date.is_some());
        // The wipe-request stamp belongs to its own sync.
        assert!(stored.cache.sync_date.is_none());
    }

    #[tokio::test]
    async fn import_primes_retire_caches() {
        let worker = ScriptedWorker::new(&[
            ("getContractMemo", json!("0.0.900")),
            ("getType", json!("RETIRE")),
            ("permissions", json!("0011")),
            (
                "getPairs",
                serde_json::to_value(vec![pair("0.0.1", "0.0.2", false)]).unwrap(),
            ),
            ("getRetireRequests", json!([])),
        ]);
        let store = Arc::new(InMemoryContractStore::new());
        let adapter = ContractSyncAdapter::new(store, Arc::new(worker));

        let contract = adapter
            .import_contract("0.0.500", "did:owner", "imported")
            .await
            .unwrap();

        assert_eq!(contract.contract_type, ContractType::Retire);
        assert_eq!(contract.cache.pairs.len(), 1);
        assert!(contract.cache.pairs_sync_date.is_some());
        assert!(contract.cache.retire_sync_date.is_some());
    }

    #[tokio::test]
    async fn add_pair_refuses_overflowing_counts() {
        let mut contract = wipe_contract("0.0.500");
        contract.contract_type = ContractType::Retire;
        let worker = ScriptedWorker::new(&[("addPair", json!({}))]);
        let (adapter, _) = adapter_with(contract, worker).await;

        let base = TokenInfo {
            token_id: "0.0.1".to_string(),
            symbol: "CO2".to_string(),
            decimals: 19,
        };
        let opposite = TokenInfo {
            token_id: "0.0.2".to_string(),
            symbol: "CRC".to_string(),
            decimals: 0,
        };
        assert!(matches!(
            adapter.add_pair("0.0.500", &base, &opposite, 1, 1, false).await,
            Err(EngineError::Validation { .. })
        ));
    }

    #[test]
    fn permission_bits_count_from_the_right() {
        assert!(check_permissions("1011", 0));
        assert!(check_permissions("1011", 1));
        assert!(!check_permissions("1011", 2));
        assert!(check_permissions("1011", 3));
        assert!(!check_permissions("1011", 7));
    }
}
