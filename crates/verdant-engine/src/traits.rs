//! Collaborator traits for the verdant runtime.
//!
//! These traits define the engine's trust boundary:
//!
//! - `LedgerTransport`  — the external ledger (topics, messages, accounts)
//! - `DocumentStore`    — durable records (policies, state, documents)
//! - `SchemaRegistry`   — schema versioning and publication
//! - `CredentialIssuer` — signed publication credentials
//! - `UserDirectory`    — identity lookup for authenticated users
//! - `EventBus`         — typed fan-out of engine events
//!
//! The lifecycle manager and state core own boxed instances and never reach
//! around them. A transport failure is terminal for the current lifecycle
//! operation; a store failure suppresses the notification that would have
//! followed the write.

use async_trait::async_trait;
use uuid::Uuid;
use verdant_contracts::{
    error::EngineResult,
    events::EngineEvent,
    policy::{Policy, PolicyFilters},
    schema::SchemaDocument,
    topic::{Topic, TopicMessage},
    user::{AuthUser, GroupAssignment, VirtualUser},
};

/// A ledger account resolved for a did.
#[derive(Debug, Clone)]
pub struct LedgerAccount {
    pub account_id: String,
    pub did: String,
}

/// A filter over stored policy documents.
///
/// `dry_run` scopes the query to a policy's dry-run sandbox; sandboxed
/// records never leak into normal reads and are purged as one unit.
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    pub policy_id: String,
    pub dry_run: bool,
    /// Restrict to documents owned by this did.
    pub owner: Option<String>,
    /// Restrict to documents produced by the block with this tag.
    pub tag: Option<String>,
    /// Restrict to documents referencing this schema iri.
    pub schema: Option<String>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

/// The external ledger.
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    /// Resolve the ledger account bound to `did`.
    async fn resolve_account(&self, did: &str) -> EngineResult<LedgerAccount>;

    /// Allocate a new topic and return its id.
    async fn create_topic(&self, topic: &Topic) -> EngineResult<String>;

    /// Send one message to a topic and return the ledger message id.
    async fn send_message(&self, topic_id: &str, message: &TopicMessage) -> EngineResult<String>;

    /// Fetch a single message by its ledger id.
    async fn get_message(&self, message_id: &str) -> EngineResult<TopicMessage>;

    /// Every message on a topic, in send order.
    async fn get_topic_messages(&self, topic_id: &str) -> EngineResult<Vec<TopicMessage>>;

    /// Record the bidirectional link between a policy topic and the
    /// instance topic created for one publication.
    async fn link_topics(&self, parent: &str, child: &str) -> EngineResult<()>;
}

/// Durable storage for every record the engine owns.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn save_policy(&self, policy: &Policy) -> EngineResult<()>;
    async fn load_policy(&self, id: &str) -> EngineResult<Option<Policy>>;
    async fn list_policies(&self, filters: &PolicyFilters) -> EngineResult<Vec<Policy>>;

    /// Persist one block's per-user state.
    async fn save_block_state(
        &self,
        policy_id: &str,
        block: Uuid,
        user_id: &str,
        state: &serde_json::Value,
    ) -> EngineResult<()>;

    async fn load_block_state(
        &self,
        policy_id: &str,
        block: Uuid,
        user_id: &str,
    ) -> EngineResult<Option<serde_json::Value>>;

    async fn save_document(
        &self,
        policy_id: &str,
        dry_run: bool,
        document: &serde_json::Value,
    ) -> EngineResult<()>;

    async fn query_documents(&self, query: &DocumentQuery) -> EngineResult<Vec<serde_json::Value>>;

    async fn count_documents(&self, query: &DocumentQuery) -> EngineResult<u64>;

    async fn save_virtual_user(&self, user: &VirtualUser) -> EngineResult<()>;

    async fn virtual_users(&self, policy_id: &str) -> EngineResult<Vec<VirtualUser>>;

    /// Mark one virtual user active and every other one inactive.
    async fn set_active_virtual_user(&self, policy_id: &str, did: &str) -> EngineResult<()>;

    async fn save_group_assignment(&self, assignment: &GroupAssignment) -> EngineResult<()>;

    async fn group_assignments(&self, policy_id: &str) -> EngineResult<Vec<GroupAssignment>>;

    async fn group_assignment(
        &self,
        policy_id: &str,
        did: &str,
    ) -> EngineResult<Option<GroupAssignment>>;

    /// Drop every sandboxed record of a policy's dry-run: documents, block
    /// state, virtual users and group assignments made under dry-run.
    async fn clear_dry_run(&self, policy_id: &str) -> EngineResult<()>;
}

/// Schema versioning and publication alongside a policy topic.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    /// Every schema tracked on `topic_id`, drafts included.
    async fn schemas_for_topic(&self, topic_id: &str) -> EngineResult<Vec<SchemaDocument>>;

    /// Start tracking a schema on its topic (used by archive import).
    async fn track_schema(&self, schema: &SchemaDocument) -> EngineResult<()>;

    /// Increment and publish one draft schema; returns the published form.
    async fn publish_schema(
        &self,
        schema: &SchemaDocument,
        version: &str,
    ) -> EngineResult<SchemaDocument>;

    /// Publish the engine's system schemas onto a fresh policy topic.
    /// Returns how many were published.
    async fn publish_system_schemas(&self, topic_id: &str, owner: &str) -> EngineResult<usize>;
}

/// Issues the signed credential that accompanies a publication.
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue_policy_credential(&self, policy: &Policy) -> EngineResult<serde_json::Value>;
}

/// Identity lookup for authenticated users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_by_did(&self, did: &str) -> EngineResult<Option<AuthUser>>;
}

/// Typed fan-out of engine events. Publication is fire-and-forget; a slow
/// or absent consumer never blocks the engine.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: EngineEvent);
}
