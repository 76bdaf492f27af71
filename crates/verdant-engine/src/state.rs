//! The block state core.
//!
//! All reads and writes against a generated policy's blocks flow through
//! `StateCore`. Writes are serialized per (block, user); the write path is
//! persist-then-notify: nothing is announced until the causing state change
//! is durably stored, and a failed persist suppresses the notification
//! entirely. A block's own failure becomes a `BlockError` event addressed
//! to the requesting user — it never takes the engine down.

use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;
use verdant_blocks::{
    behavior::{BlockServices, Page},
    factory,
    registry::{ComponentRegistry, PolicyInstance},
    tree::BlockNode,
    BlockBehavior, BlockContext,
};
use verdant_contracts::{
    error::{EngineError, EngineResult},
    events::{EngineEvent, ExternalEvent, ExternalEventType},
    policy::Policy,
    user::{GroupAssignment, PolicyUser},
};

use crate::traits::{DocumentQuery, DocumentStore, EventBus};

/// Implements the services a behavior may call, scoped to one policy.
struct EngineServices<'a> {
    store: &'a dyn DocumentStore,
    policy_id: &'a str,
    dry_run: bool,
}

impl EngineServices<'_> {
    fn query_for(&self, node: &BlockNode, user: &PolicyUser, page: Option<Page>) -> DocumentQuery {
        let own_only = node
            .options
            .get("onlyOwnDocuments")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        DocumentQuery {
            policy_id: self.policy_id.to_string(),
            dry_run: self.dry_run,
            owner: own_only.then(|| user.did.clone()),
            tag: node
                .options
                .get("tag")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
            schema: node
                .options
                .get("schema")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
            skip: page.map(|p| p.items_per_page * p.page),
            take: page.map(|p| p.items_per_page),
        }
    }
}

#[async_trait::async_trait]
impl BlockServices for EngineServices<'_> {
    async fn query_documents(
        &self,
        node: &BlockNode,
        user: &PolicyUser,
        page: Option<Page>,
    ) -> EngineResult<Vec<serde_json::Value>> {
        self.store
            .query_documents(&self.query_for(node, user, page))
            .await
    }

    async fn count_documents(&self, node: &BlockNode, user: &PolicyUser) -> EngineResult<u64> {
        self.store
            .count_documents(&self.query_for(node, user, None))
            .await
    }

    async fn save_document(
        &self,
        _node: &BlockNode,
        _user: &PolicyUser,
        document: serde_json::Value,
    ) -> EngineResult<()> {
        self.store
            .save_document(self.policy_id, self.dry_run, &document)
            .await
    }

    async fn assign_role(&self, user: &PolicyUser, role: &str, group: &str) -> EngineResult<()> {
        self.store
            .save_group_assignment(&GroupAssignment {
                policy_id: self.policy_id.to_string(),
                did: user.did.clone(),
                username: user.username.clone(),
                role: role.to_string(),
                group: group.to_string(),
            })
            .await
    }
}

type UserKey = (Uuid, String);

pub struct StateCore {
    registry: Arc<ComponentRegistry>,
    store: Arc<dyn DocumentStore>,
    events: Arc<dyn EventBus>,
    /// One mutex per (block, user); writes to the same pair are serialized.
    locks: DashMap<UserKey, Arc<Mutex<()>>>,
    /// Last announced data hash per (block, user), for change detection.
    data_hashes: DashMap<UserKey, String>,
}

fn hash_value(value: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

impl StateCore {
    pub fn new(
        registry: Arc<ComponentRegistry>,
        store: Arc<dyn DocumentStore>,
        events: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            registry,
            store,
            events,
            locks: DashMap::new(),
            data_hashes: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// The block itself followed by its ancestors, resolved through the
    /// global uuid index.
    pub fn block_parents(&self, block: Uuid) -> EngineResult<Vec<Uuid>> {
        let instance = self.registry.locate(block)?;
        instance.tree.parents(block)
    }

    /// Compute a block's visible output for `user`.
    pub async fn get_block_data(
        &self,
        policy: &Policy,
        block: Uuid,
        user: &PolicyUser,
    ) -> EngineResult<serde_json::Value> {
        let instance = self.registry.instance(&policy.id)?;
        let (node, behavior) = self.resolve(&instance, block, user)?;

        let data = match self.compute_data(&instance, node, &behavior, user).await {
            Ok(data) => data,
            Err(err) => return Err(self.report_block_error(&instance, node, user, err)),
        };

        self.events.publish(EngineEvent::External(ExternalEvent {
            event_type: ExternalEventType::Get,
            policy_id: instance.policy_id.clone(),
            block_uuid: node.uuid,
            block_type: node.block_type.clone(),
            block_tag: node.tag.clone(),
            user_id: user.id.clone(),
            data: serde_json::Value::Null,
        }));
        Ok(data)
    }

    /// Resolve a tag and compute that block's output.
    pub async fn get_block_data_by_tag(
        &self,
        policy: &Policy,
        tag: &str,
        user: &PolicyUser,
    ) -> EngineResult<serde_json::Value> {
        let instance = self.registry.instance(&policy.id)?;
        let block = instance.block_by_tag(tag)?;
        self.get_block_data(policy, block, user).await
    }

    /// Apply a write from `user` to one block.
    ///
    /// The per-(block, user) lock is held across the whole pipeline, so two
    /// writes from the same user to the same block can never interleave.
    pub async fn set_block_data(
        &self,
        policy: &Policy,
        block: Uuid,
        user: &PolicyUser,
        data: serde_json::Value,
    ) -> EngineResult<serde_json::Value> {
        let instance = self.registry.instance(&policy.id)?;
        let (node, behavior) = self.resolve(&instance, block, user)?;

        let lock = self
            .locks
            .entry((block, user.id.clone()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let services = EngineServices {
            store: self.store.as_ref(),
            policy_id: &instance.policy_id,
            dry_run: instance.dry_run,
        };
        let state = self
            .store
            .load_block_state(&instance.policy_id, node.uuid, &user.id)
            .await?;
        let ctx = BlockContext {
            policy_id: &instance.policy_id,
            policy_owner: &instance.owner,
            dry_run: instance.dry_run,
            tree: &instance.tree,
            node,
            state,
            services: &services,
        };

        let output = match behavior.set_data(&ctx, user, data.clone()).await {
            Ok(output) => output,
            Err(err) => return Err(self.report_block_error(&instance, node, user, err)),
        };

        // Persist before anything is announced. A failed persist means no
        // notification at all.
        if let Some(new_state) = &output.new_state {
            self.store
                .save_block_state(&instance.policy_id, node.uuid, &user.id, new_state)
                .await?;
        }

        let target = output.update_block.unwrap_or(node.uuid);
        self.announce_change(&instance, target, user).await;

        if let Some(role) = &output.new_role {
            self.events.publish(EngineEvent::UserInfoUpdated {
                policy_id: instance.policy_id.clone(),
                user_id: user.id.clone(),
                user_role: Some(role.clone()),
            });
        }
        self.events.publish(EngineEvent::External(ExternalEvent {
            event_type: ExternalEventType::Set,
            policy_id: instance.policy_id.clone(),
            block_uuid: node.uuid,
            block_type: node.block_type.clone(),
            block_tag: node.tag.clone(),
            user_id: user.id.clone(),
            data,
        }));
        Ok(output.response)
    }

    /// Drop cached locks and hashes for a destroyed instance.
    pub fn purge_instance(&self, instance: &PolicyInstance) {
        let uuids: Vec<Uuid> = instance.tree.walk().iter().map(|n| n.uuid).collect();
        self.locks.retain(|(uuid, _), _| !uuids.contains(uuid));
        self.data_hashes.retain(|(uuid, _), _| !uuids.contains(uuid));
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn resolve<'a>(
        &self,
        instance: &'a PolicyInstance,
        block: Uuid,
        user: &PolicyUser,
    ) -> EngineResult<(&'a BlockNode, Arc<dyn BlockBehavior>)> {
        let node = instance.tree.node(block)?;
        if !node.is_available(user, &instance.owner, instance.dry_run) {
            return Err(EngineError::permission(format!(
                "user '{}' has no access to block '{}'",
                user.username, node.tag
            )));
        }
        let behavior = factory::behavior(&node.block_type).ok_or_else(|| {
            EngineError::block_runtime(&node.block_type, "no behavior registered")
        })?;
        Ok((node, behavior))
    }

    /// Run a block's read path, persisting any state it recomputed.
    async fn compute_data(
        &self,
        instance: &PolicyInstance,
        node: &BlockNode,
        behavior: &Arc<dyn BlockBehavior>,
        user: &PolicyUser,
    ) -> EngineResult<serde_json::Value> {
        let services = EngineServices {
            store: self.store.as_ref(),
            policy_id: &instance.policy_id,
            dry_run: instance.dry_run,
        };
        let state = self.load_read_state(instance, node, user).await?;
        let ctx = BlockContext {
            policy_id: &instance.policy_id,
            policy_owner: &instance.owner,
            dry_run: instance.dry_run,
            tree: &instance.tree,
            node,
            state,
            services: &services,
        };
        let output = behavior.get_data(&ctx, user).await?;
        if let Some(new_state) = &output.new_state {
            self.store
                .save_block_state(&instance.policy_id, node.uuid, &user.id, new_state)
                .await?;
        }
        Ok(output.data)
    }

    /// A source block reads through its pagination addon's state when one
    /// is attached; every other block reads its own.
    async fn load_read_state(
        &self,
        instance: &PolicyInstance,
        node: &BlockNode,
        user: &PolicyUser,
    ) -> EngineResult<Option<serde_json::Value>> {
        let state_block = node
            .children
            .iter()
            .filter_map(|uuid| instance.tree.get(*uuid))
            .find(|child| child.block_type == "paginationAddon")
            .map(|pager| pager.uuid)
            .unwrap_or(node.uuid);
        self.store
            .load_block_state(&instance.policy_id, state_block, &user.id)
            .await
    }

    /// Re-evaluate `target` for `user` and emit `DataChanged` when its
    /// visible output actually differs. Container-class blocks skip the
    /// comparison (coarse invalidation).
    async fn announce_change(&self, instance: &Arc<PolicyInstance>, target: Uuid, user: &PolicyUser) {
        let node = match instance.tree.get(target) {
            Some(node) => node,
            None => return,
        };
        let behavior = match factory::behavior(&node.block_type) {
            Some(behavior) => behavior,
            None => return,
        };

        let fresh = match self.compute_data(instance, node, &behavior, user).await {
            Ok(fresh) => fresh,
            Err(err) => {
                warn!(
                    block = %node.tag,
                    error = %err,
                    "could not re-evaluate block after write"
                );
                return;
            }
        };

        let changed = if behavior.always_changed() {
            true
        } else {
            let hash = hash_value(&fresh);
            let previous = self
                .data_hashes
                .insert((target, user.id.clone()), hash.clone());
            previous.as_deref() != Some(hash.as_str())
        };

        if changed {
            debug!(block = %node.tag, user = %user.username, "block data changed");
            self.events.publish(EngineEvent::DataChanged {
                policy_id: instance.policy_id.clone(),
                block_uuid: target,
                user_id: user.id.clone(),
                state: fresh,
            });
        }
    }

    /// Convert a block's own failure into an error event for the user.
    fn report_block_error(
        &self,
        instance: &PolicyInstance,
        node: &BlockNode,
        user: &PolicyUser,
        err: EngineError,
    ) -> EngineError {
        if let EngineError::BlockRuntime { reason, .. } = &err {
            self.events.publish(EngineEvent::BlockError {
                policy_id: instance.policy_id.clone(),
                block_type: node.block_type.clone(),
                user_id: user.id.clone(),
                message: reason.clone(),
            });
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{BufferedEventBus, InMemoryStore};
    use serde_json::json;
    use verdant_contracts::{
        block::BlockConfig,
        policy::{Policy, PolicyFilters},
        user::{GroupAssignment, VirtualUser},
    };

    fn sample_policy() -> Policy {
        let mut policy = Policy::new_draft("Carbon", "did:owner");
        policy.config = Some(
            BlockConfig::new("interfaceContainerBlock", "root").with_children(vec![
                BlockConfig::new("interfaceStepBlock", "wizard").with_children(vec![
                    BlockConfig::new("informationBlock", "intro"),
                    BlockConfig::new("informationBlock", "outro"),
                ]),
                BlockConfig::new("policyRolesBlock", "choose_role")
                    .with_options(json!({ "roles": ["Farmer"] })),
                BlockConfig::new("documentsSourceAddon", "list")
                    .with_children(vec![BlockConfig::new("paginationAddon", "pager")]),
                BlockConfig::new("requestVcDocumentBlock", "report")
                    .with_permissions(&["Farmer"])
                    .with_options(json!({ "schema": "#report" })),
            ]),
        );
        policy
    }

    fn farmer(role: Option<&str>) -> PolicyUser {
        PolicyUser {
            id: "did:farmer".into(),
            did: "did:farmer".into(),
            username: "farmer".into(),
            role: role.map(str::to_string),
            group: None,
            is_virtual: false,
        }
    }

    struct Fixture {
        policy: Policy,
        store: Arc<InMemoryStore>,
        bus: Arc<BufferedEventBus>,
        core: StateCore,
    }

    fn fixture() -> Fixture {
        let policy = sample_policy();
        let registry = Arc::new(ComponentRegistry::new());
        registry.generate(&policy).unwrap();
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(BufferedEventBus::new());
        let core = StateCore::new(registry, store.clone(), bus.clone());
        Fixture {
            policy,
            store,
            bus,
            core,
        }
    }

    fn tagged(core: &StateCore, policy: &Policy, tag: &str) -> Uuid {
        core.registry()
            .instance(&policy.id)
            .unwrap()
            .block_by_tag(tag)
            .unwrap()
    }

    #[tokio::test]
    async fn denied_write_mutates_nothing() {
        let f = fixture();
        let report = tagged(&f.core, &f.policy, "report");

        let result = f
            .core
            .set_block_data(&f.policy, report, &farmer(None), json!({ "document": {} }))
            .await;

        assert!(matches!(result, Err(EngineError::Permission { .. })));
        assert!(f.bus.take().is_empty());
        let query = DocumentQuery {
            policy_id: f.policy.id.clone(),
            ..DocumentQuery::default()
        };
        assert_eq!(f.store.count_documents(&query).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn write_persists_before_notifying() {
        let f = fixture();
        let wizard = tagged(&f.core, &f.policy, "wizard");
        let user = farmer(Some("Farmer"));

        f.core
            .set_block_data(&f.policy, wizard, &user, json!({ "action": "next" }))
            .await
            .unwrap();

        let state = f
            .store
            .load_block_state(&f.policy.id, wizard, &user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state, json!({ "index": 1 }));

        let events = f.bus.take();
        assert!(matches!(
            events[0],
            EngineEvent::DataChanged { block_uuid, .. } if block_uuid == wizard
        ));
        assert!(matches!(
            events[1],
            EngineEvent::External(ExternalEvent {
                event_type: ExternalEventType::Set,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn unchanged_write_is_not_announced() {
        let f = fixture();
        let pager = tagged(&f.core, &f.policy, "pager");
        let user = farmer(Some("Farmer"));

        for _ in 0..2 {
            f.core
                .set_block_data(&f.policy, pager, &user, json!({ "page": 2 }))
                .await
                .unwrap();
        }

        let changed = f
            .bus
            .take()
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::DataChanged { .. }))
            .count();
        assert_eq!(changed, 1);
    }

    #[tokio::test]
    async fn pagination_write_reevaluates_the_source() {
        let f = fixture();
        let pager = tagged(&f.core, &f.policy, "pager");
        let list = tagged(&f.core, &f.policy, "list");

        f.core
            .set_block_data(&f.policy, pager, &farmer(None), json!({ "page": 1 }))
            .await
            .unwrap();

        let events = f.bus.take();
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::DataChanged { block_uuid, .. } if *block_uuid == list
        )));
    }

    #[tokio::test]
    async fn role_choice_records_assignment_and_announces_it() {
        let f = fixture();
        let choose = tagged(&f.core, &f.policy, "choose_role");
        let user = farmer(None);

        f.core
            .set_block_data(&f.policy, choose, &user, json!({ "role": "Farmer" }))
            .await
            .unwrap();

        let assignment = f
            .store
            .group_assignment(&f.policy.id, &user.did)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(assignment.role, "Farmer");

        assert!(f.bus.take().iter().any(|e| matches!(
            e,
            EngineEvent::UserInfoUpdated { user_role: Some(role), .. } if role == "Farmer"
        )));
    }

    #[tokio::test]
    async fn block_failure_becomes_an_error_event() {
        let f = fixture();
        let intro = tagged(&f.core, &f.policy, "intro");

        let result = f
            .core
            .set_block_data(&f.policy, intro, &farmer(None), json!({}))
            .await;

        assert!(matches!(result, Err(EngineError::BlockRuntime { .. })));
        assert!(f
            .bus
            .take()
            .iter()
            .any(|e| matches!(e, EngineEvent::BlockError { .. })));
    }

    #[tokio::test]
    async fn ungenerated_policy_is_not_found() {
        let f = fixture();
        let other = Policy::new_draft("Other", "did:owner");
        let result = f
            .core
            .get_block_data(&other, Uuid::new_v4(), &farmer(None))
            .await;
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
    }

    // Store that accepts everything except block-state writes.
    struct FailingStore {
        inner: InMemoryStore,
    }

    #[async_trait::async_trait]
    impl DocumentStore for FailingStore {
        async fn save_policy(&self, policy: &Policy) -> EngineResult<()> {
            self.inner.save_policy(policy).await
        }
        async fn load_policy(&self, id: &str) -> EngineResult<Option<Policy>> {
            self.inner.load_policy(id).await
        }
        async fn list_policies(&self, filters: &PolicyFilters) -> EngineResult<Vec<Policy>> {
            self.inner.list_policies(filters).await
        }
        async fn save_block_state(
            &self,
            _policy_id: &str,
            _block: Uuid,
            _user_id: &str,
            _state: &serde_json::Value,
        ) -> EngineResult<()> {
            Err(EngineError::storage("disk full"))
        }
        async fn load_block_state(
            &self,
            policy_id: &str,
            block: Uuid,
            user_id: &str,
        ) -> EngineResult<Option<serde_json::Value>> {
            self.inner.load_block_state(policy_id, block, user_id).await
        }
        async fn save_document(
            &self,
            policy_id: &str,
            dry_run: bool,
            document: &serde_json::Value,
        ) -> EngineResult<()> {
            self.inner.save_document(policy_id, dry_run, document).await
        }
        async fn query_documents(
            &self,
            query: &DocumentQuery,
        ) -> EngineResult<Vec<serde_json::Value>> {
            self.inner.query_documents(query).await
        }
        async fn count_documents(&self, query: &DocumentQuery) -> EngineResult<u64> {
            self.inner.count_documents(query).await
        }
        async fn save_virtual_user(&self, user: &VirtualUser) -> EngineResult<()> {
            self.inner.save_virtual_user(user).await
        }
        async fn virtual_users(&self, policy_id: &str) -> EngineResult<Vec<VirtualUser>> {
            self.inner.virtual_users(policy_id).await
        }
        async fn set_active_virtual_user(&self, policy_id: &str, did: &str) -> EngineResult<()> {
            self.inner.set_active_virtual_user(policy_id, did).await
        }
        async fn save_group_assignment(&self, assignment: &GroupAssignment) -> EngineResult<()> {
            self.inner.save_group_assignment(assignment).await
        }
        async fn group_assignments(&self, policy_id: &str) -> EngineResult<Vec<GroupAssignment>> {
            self.inner.group_assignments(policy_id).await
        }
        async fn group_assignment(
            &self,
            policy_id: &str,
            did: &str,
        ) -> EngineResult<Option<GroupAssignment>> {
            self.inner.group_assignment(policy_id, did).await
        }
        async fn clear_dry_run(&self, policy_id: &str) -> EngineResult<()> {
            self.inner.clear_dry_run(policy_id).await
        }
    }

    #[tokio::test]
    async fn failed_persist_suppresses_every_notification() {
        let policy = sample_policy();
        let registry = Arc::new(ComponentRegistry::new());
        registry.generate(&policy).unwrap();
        let bus = Arc::new(BufferedEventBus::new());
        let store = Arc::new(FailingStore {
            inner: InMemoryStore::new(),
        });
        let core = StateCore::new(registry, store, bus.clone());

        let wizard = tagged(&core, &policy, "wizard");
        let result = core
            .set_block_data(&policy, wizard, &farmer(None), json!({ "action": "next" }))
            .await;

        assert!(matches!(result, Err(EngineError::Storage { .. })));
        assert!(bus.take().is_empty());
    }
}
