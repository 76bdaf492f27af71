//! In-memory collaborator implementations.
//!
//! Reference implementations of every collaborator trait, suitable for the
//! demo binary, dry-run experimentation and tests. The ledger allocates
//! `0.0.n` style ids from counters; the store keeps everything in maps
//! behind `parking_lot` locks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use uuid::Uuid;
use verdant_contracts::{
    error::{EngineError, EngineResult},
    events::EngineEvent,
    policy::{Policy, PolicyFilters},
    schema::{SchemaDocument, SchemaStatus},
    topic::{Topic, TopicMessage},
    user::{AuthUser, GroupAssignment, VirtualUser},
};

use crate::traits::{
    CredentialIssuer, DocumentQuery, DocumentStore, EventBus, LedgerAccount, LedgerTransport,
    SchemaRegistry, UserDirectory,
};

// ── Ledger ──────────────────────────────────────────────────────────────────

/// Counter-backed ledger. Topic and message ids are `0.0.n`; every send is
/// recorded and can be inspected afterwards.
#[derive(Default)]
pub struct InMemoryLedger {
    next_id: AtomicU64,
    accounts: RwLock<HashMap<String, String>>,
    topics: RwLock<Vec<Topic>>,
    messages: RwLock<HashMap<String, Vec<TopicMessage>>>,
    links: RwLock<Vec<(String, String)>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1000),
            ..Self::default()
        }
    }

    fn allocate(&self) -> String {
        format!("0.0.{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Messages sent to `topic_id`, in send order.
    pub fn messages_on(&self, topic_id: &str) -> Vec<TopicMessage> {
        self.messages
            .read()
            .get(topic_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn links(&self) -> Vec<(String, String)> {
        self.links.read().clone()
    }
}

#[async_trait]
impl LedgerTransport for InMemoryLedger {
    async fn resolve_account(&self, did: &str) -> EngineResult<LedgerAccount> {
        let mut accounts = self.accounts.write();
        let account_id = accounts
            .entry(did.to_string())
            .or_insert_with(|| self.allocate())
            .clone();
        Ok(LedgerAccount {
            account_id,
            did: did.to_string(),
        })
    }

    async fn create_topic(&self, topic: &Topic) -> EngineResult<String> {
        let topic_id = self.allocate();
        let mut recorded = topic.clone();
        recorded.topic_id = topic_id.clone();
        self.topics.write().push(recorded);
        Ok(topic_id)
    }

    async fn send_message(&self, topic_id: &str, message: &TopicMessage) -> EngineResult<String> {
        let message_id = format!("{}@{}", topic_id, self.allocate());
        let mut recorded = message.clone();
        recorded.id = message_id.clone();
        recorded.topic_id = topic_id.to_string();
        self.messages
            .write()
            .entry(topic_id.to_string())
            .or_default()
            .push(recorded);
        Ok(message_id)
    }

    async fn get_message(&self, message_id: &str) -> EngineResult<TopicMessage> {
        self.messages
            .read()
            .values()
            .flatten()
            .find(|m| m.id == message_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("no message '{message_id}'")))
    }

    async fn get_topic_messages(&self, topic_id: &str) -> EngineResult<Vec<TopicMessage>> {
        Ok(self.messages_on(topic_id))
    }

    async fn link_topics(&self, parent: &str, child: &str) -> EngineResult<()> {
        self.links
            .write()
            .push((parent.to_string(), child.to_string()));
        Ok(())
    }
}

// ── Document store ──────────────────────────────────────────────────────────

type StateKey = (String, Uuid, String);

/// Map-backed document store.
#[derive(Default)]
pub struct InMemoryStore {
    policies: RwLock<HashMap<String, Policy>>,
    block_state: RwLock<HashMap<StateKey, serde_json::Value>>,
    documents: RwLock<Vec<(String, bool, serde_json::Value)>>,
    virtual_users: RwLock<HashMap<String, Vec<VirtualUser>>>,
    assignments: RwLock<Vec<GroupAssignment>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn document_matches(document: &serde_json::Value, query: &DocumentQuery) -> bool {
    if let Some(owner) = &query.owner {
        if document.get("owner").and_then(serde_json::Value::as_str) != Some(owner) {
            return false;
        }
    }
    if let Some(tag) = &query.tag {
        if document.get("tag").and_then(serde_json::Value::as_str) != Some(tag) {
            return false;
        }
    }
    if let Some(schema) = &query.schema {
        if document.get("schema").and_then(serde_json::Value::as_str) != Some(schema) {
            return false;
        }
    }
    true
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn save_policy(&self, policy: &Policy) -> EngineResult<()> {
        self.policies
            .write()
            .insert(policy.id.clone(), policy.clone());
        Ok(())
    }

    async fn load_policy(&self, id: &str) -> EngineResult<Option<Policy>> {
        Ok(self.policies.read().get(id).cloned())
    }

    async fn list_policies(&self, filters: &PolicyFilters) -> EngineResult<Vec<Policy>> {
        let mut matched: Vec<Policy> = self
            .policies
            .read()
            .values()
            .filter(|p| filters.matches(p))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.create_date.cmp(&b.create_date));
        Ok(matched)
    }

    async fn save_block_state(
        &self,
        policy_id: &str,
        block: Uuid,
        user_id: &str,
        state: &serde_json::Value,
    ) -> EngineResult<()> {
        self.block_state.write().insert(
            (policy_id.to_string(), block, user_id.to_string()),
            state.clone(),
        );
        Ok(())
    }

    async fn load_block_state(
        &self,
        policy_id: &str,
        block: Uuid,
        user_id: &str,
    ) -> EngineResult<Option<serde_json::Value>> {
        Ok(self
            .block_state
            .read()
            .get(&(policy_id.to_string(), block, user_id.to_string()))
            .cloned())
    }

    async fn save_document(
        &self,
        policy_id: &str,
        dry_run: bool,
        document: &serde_json::Value,
    ) -> EngineResult<()> {
        self.documents
            .write()
            .push((policy_id.to_string(), dry_run, document.clone()));
        Ok(())
    }

    async fn query_documents(&self, query: &DocumentQuery) -> EngineResult<Vec<serde_json::Value>> {
        let documents = self.documents.read();
        let mut matched: Vec<serde_json::Value> = documents
            .iter()
            .filter(|(policy_id, dry_run, document)| {
                policy_id == &query.policy_id
                    && *dry_run == query.dry_run
                    && document_matches(document, query)
            })
            .map(|(_, _, document)| document.clone())
            .collect();

        if let Some(skip) = query.skip {
            matched = matched.split_off((skip as usize).min(matched.len()));
        }
        if let Some(take) = query.take {
            matched.truncate(take as usize);
        }
        Ok(matched)
    }

    async fn count_documents(&self, query: &DocumentQuery) -> EngineResult<u64> {
        let unpaged = DocumentQuery {
            skip: None,
            take: None,
            ..query.clone()
        };
        Ok(self.query_documents(&unpaged).await?.len() as u64)
    }

    async fn save_virtual_user(&self, user: &VirtualUser) -> EngineResult<()> {
        self.virtual_users
            .write()
            .entry(user.policy_id.clone())
            .or_default()
            .push(user.clone());
        Ok(())
    }

    async fn virtual_users(&self, policy_id: &str) -> EngineResult<Vec<VirtualUser>> {
        Ok(self
            .virtual_users
            .read()
            .get(policy_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_active_virtual_user(&self, policy_id: &str, did: &str) -> EngineResult<()> {
        let mut users = self.virtual_users.write();
        let users = users.get_mut(policy_id).ok_or_else(|| {
            EngineError::not_found(format!("policy '{policy_id}' has no virtual users"))
        })?;
        if !users.iter().any(|u| u.did == did) {
            return Err(EngineError::not_found(format!(
                "no virtual user '{did}' in policy '{policy_id}'"
            )));
        }
        for user in users.iter_mut() {
            user.active = user.did == did;
        }
        Ok(())
    }

    async fn save_group_assignment(&self, assignment: &GroupAssignment) -> EngineResult<()> {
        let mut assignments = self.assignments.write();
        assignments.retain(|a| !(a.policy_id == assignment.policy_id && a.did == assignment.did));
        assignments.push(assignment.clone());
        Ok(())
    }

    async fn group_assignments(&self, policy_id: &str) -> EngineResult<Vec<GroupAssignment>> {
        Ok(self
            .assignments
            .read()
            .iter()
            .filter(|a| a.policy_id == policy_id)
            .cloned()
            .collect())
    }

    async fn group_assignment(
        &self,
        policy_id: &str,
        did: &str,
    ) -> EngineResult<Option<GroupAssignment>> {
        Ok(self
            .assignments
            .read()
            .iter()
            .find(|a| a.policy_id == policy_id && a.did == did)
            .cloned())
    }

    async fn clear_dry_run(&self, policy_id: &str) -> EngineResult<()> {
        let virtual_dids: Vec<String> = self
            .virtual_users
            .write()
            .remove(policy_id)
            .unwrap_or_default()
            .into_iter()
            .map(|u| u.did)
            .collect();

        self.documents
            .write()
            .retain(|(id, dry_run, _)| !(id == policy_id && *dry_run));
        self.block_state
            .write()
            .retain(|(id, _, _), _| id != policy_id);
        self.assignments
            .write()
            .retain(|a| !(a.policy_id == policy_id && virtual_dids.contains(&a.did)));
        Ok(())
    }
}

// ── Schema registry ─────────────────────────────────────────────────────────

/// Names of the schemas the engine ships and publishes on every fresh
/// policy topic.
pub const SYSTEM_SCHEMA_NAMES: &[&str] = &["Policy", "StandardRegistry", "UserRole", "MintToken"];

#[derive(Default)]
pub struct InMemorySchemaRegistry {
    schemas: RwLock<HashMap<String, Vec<SchemaDocument>>>,
}

impl InMemorySchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SchemaRegistry for InMemorySchemaRegistry {
    async fn schemas_for_topic(&self, topic_id: &str) -> EngineResult<Vec<SchemaDocument>> {
        Ok(self
            .schemas
            .read()
            .get(topic_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn track_schema(&self, schema: &SchemaDocument) -> EngineResult<()> {
        self.schemas
            .write()
            .entry(schema.topic_id.clone())
            .or_default()
            .push(schema.clone());
        Ok(())
    }

    async fn publish_schema(
        &self,
        schema: &SchemaDocument,
        version: &str,
    ) -> EngineResult<SchemaDocument> {
        let mut schemas = self.schemas.write();
        let tracked = schemas
            .get_mut(&schema.topic_id)
            .and_then(|list| list.iter_mut().find(|s| s.iri == schema.iri))
            .ok_or_else(|| {
                EngineError::not_found(format!(
                    "schema '{}' is not tracked on topic '{}'",
                    schema.iri, schema.topic_id
                ))
            })?;
        tracked.version = version.to_string();
        tracked.status = SchemaStatus::Published;
        Ok(tracked.clone())
    }

    async fn publish_system_schemas(&self, topic_id: &str, owner: &str) -> EngineResult<usize> {
        let mut schemas = self.schemas.write();
        let list = schemas.entry(topic_id.to_string()).or_default();
        for name in SYSTEM_SCHEMA_NAMES {
            list.push(SchemaDocument {
                iri: format!("#system-{}", name.to_lowercase()),
                name: name.to_string(),
                version: "1.0.0".to_string(),
                status: SchemaStatus::Published,
                topic_id: topic_id.to_string(),
                owner: owner.to_string(),
                system: true,
                document: serde_json::Value::Null,
            });
        }
        Ok(SYSTEM_SCHEMA_NAMES.len())
    }
}

// ── Credential issuer ───────────────────────────────────────────────────────

/// Unsigned reference issuer: emits the credential shape without a real
/// proof section.
#[derive(Default)]
pub struct SimpleCredentialIssuer;

#[async_trait]
impl CredentialIssuer for SimpleCredentialIssuer {
    async fn issue_policy_credential(&self, policy: &Policy) -> EngineResult<serde_json::Value> {
        Ok(json!({
            "type": ["VerifiableCredential", "PolicyCredential"],
            "issuer": policy.owner,
            "issuanceDate": chrono::Utc::now().to_rfc3339(),
            "credentialSubject": {
                "id": policy.uuid,
                "name": policy.name,
                "version": policy.version,
                "topicId": policy.topic_id,
                "instanceTopicId": policy.instance_topic_id,
            },
        }))
    }
}

// ── Directory and event bus ─────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<String, AuthUser>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user: AuthUser) {
        self.users.write().insert(user.did.clone(), user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn user_by_did(&self, did: &str) -> EngineResult<Option<AuthUser>> {
        Ok(self.users.read().get(did).cloned())
    }
}

/// Buffering bus: keeps every published event for later inspection.
#[derive(Default)]
pub struct BufferedEventBus {
    events: Mutex<Vec<EngineEvent>>,
}

impl BufferedEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain and return everything published so far.
    pub fn take(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventBus for BufferedEventBus {
    fn publish(&self, event: EngineEvent) {
        self.events.lock().push(event);
    }
}
