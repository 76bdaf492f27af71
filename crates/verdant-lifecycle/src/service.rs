//! The lifecycle RPC service surface.
//!
//! One method per verb of the external interface. Methods resolve the
//! acting user, delegate to the lifecycle manager or the state core, and
//! map block-validation refusals into a structured response instead of an
//! error. Async variants spawn the operation and return a task id
//! immediately; progress and the terminal result flow through the task
//! tracker.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::error;
use uuid::Uuid;
use verdant_contracts::{
    error::{EngineError, EngineResult},
    policy::{Policy, PolicyFilters},
    user::{AuthUser, GroupAssignment, VirtualUser},
    validation::ValidationReport,
};
use verdant_engine::{
    traits::{DocumentQuery, DocumentStore, UserDirectory},
    StateCore, UserResolver,
};

use crate::archive::ArchivePreview;
use crate::manager::LifecycleManager;
use crate::notifier::{EmptyNotifier, Notifier, TaskStatus, TaskTracker};

/// Publish / dry-run response: either the transitioned policy or the
/// per-block validation report that refused the transition.
#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub policy: Option<Policy>,
    pub is_valid: bool,
    pub report: Option<ValidationReport>,
}

fn map_transition(result: EngineResult<Policy>) -> EngineResult<TransitionResponse> {
    match result {
        Ok(policy) => Ok(TransitionResponse {
            policy: Some(policy),
            is_valid: true,
            report: None,
        }),
        Err(EngineError::BlockValidation { report }) => Ok(TransitionResponse {
            policy: None,
            is_valid: false,
            report: Some(report),
        }),
        Err(err) => Err(err),
    }
}

pub struct PolicyEngineService {
    manager: Arc<LifecycleManager>,
    state: Arc<StateCore>,
    users: Arc<UserResolver>,
    directory: Arc<dyn UserDirectory>,
    store: Arc<dyn DocumentStore>,
    tracker: Arc<TaskTracker>,
}

impl PolicyEngineService {
    pub fn new(
        manager: Arc<LifecycleManager>,
        state: Arc<StateCore>,
        users: Arc<UserResolver>,
        directory: Arc<dyn UserDirectory>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            manager,
            state,
            users,
            directory,
            store,
            tracker: Arc::new(TaskTracker::new()),
        }
    }

    /// The directory holds the caller's canonical record; requests only
    /// carry a did. Dids the directory does not know keep the identity as
    /// supplied.
    async fn authenticate(&self, auth: &AuthUser) -> EngineResult<AuthUser> {
        Ok(self
            .directory
            .user_by_did(&auth.did)
            .await?
            .unwrap_or_else(|| auth.clone()))
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    pub async fn get_policy(&self, policy_id: &str) -> EngineResult<Policy> {
        self.manager.load(policy_id).await
    }

    /// List policies matching `filters`, paged when `page` and `size` are
    /// both given.
    pub async fn get_policies(
        &self,
        filters: &PolicyFilters,
        page: Option<u64>,
        size: Option<u64>,
    ) -> EngineResult<Vec<Policy>> {
        let policies = self.store.list_policies(filters).await?;
        let skip = match (page, size) {
            (Some(page), Some(size)) => (page * size) as usize,
            _ => 0,
        };
        let take = size.map(|s| s as usize).unwrap_or(usize::MAX);
        Ok(policies.into_iter().skip(skip).take(take).collect())
    }

    pub async fn validate_policy(&self, policy_id: &str) -> EngineResult<ValidationReport> {
        let policy = self.manager.load(policy_id).await?;
        Ok(self.manager.validate(&policy))
    }

    pub fn task_status(&self, task_id: Uuid) -> Option<TaskStatus> {
        self.tracker.status(task_id)
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    pub async fn create_policy(&self, model: Policy, owner: &AuthUser) -> EngineResult<Policy> {
        let owner = self.authenticate(owner).await?;
        self.manager
            .create_policy(model, &owner, &EmptyNotifier)
            .await
    }

    pub fn create_policy_async(self: &Arc<Self>, model: Policy, owner: AuthUser) -> Uuid {
        let (task_id, notifier) = self.tracker.begin();
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let result = async {
                let owner = service.authenticate(&owner).await?;
                service.manager.create_policy(model, &owner, &notifier).await
            }
            .await;
            if let Err(err) = result {
                error!(task_id = %task_id, error = %err, "async create failed");
                notifier.error(&err.to_string());
            }
        });
        task_id
    }

    /// Replace a draft's config and metadata (the SAVE verb of the RPC
    /// surface).
    pub async fn save_policy(
        &self,
        policy_id: &str,
        model: Policy,
        auth: &AuthUser,
    ) -> EngineResult<Policy> {
        let auth = self.authenticate(auth).await?;
        self.manager.update_policy(policy_id, model, &auth).await
    }

    pub async fn publish_policy(
        &self,
        policy_id: &str,
        owner: &AuthUser,
        version: &str,
    ) -> EngineResult<TransitionResponse> {
        let owner = self.authenticate(owner).await?;
        map_transition(
            self.manager
                .publish_policy(policy_id, &owner, version, &EmptyNotifier)
                .await,
        )
    }

    pub fn publish_policy_async(
        self: &Arc<Self>,
        policy_id: String,
        owner: AuthUser,
        version: String,
    ) -> Uuid {
        let (task_id, notifier) = self.tracker.begin();
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let result = async {
                let owner = service.authenticate(&owner).await?;
                service
                    .manager
                    .publish_policy(&policy_id, &owner, &version, &notifier)
                    .await
            }
            .await;
            if let Err(err) = result {
                error!(task_id = %task_id, error = %err, "async publish failed");
                notifier.error(&err.to_string());
            }
        });
        task_id
    }

    pub async fn dry_run_policy(
        &self,
        policy_id: &str,
        owner: &AuthUser,
    ) -> EngineResult<TransitionResponse> {
        let owner = self.authenticate(owner).await?;
        map_transition(self.manager.dry_run_policy(policy_id, &owner).await)
    }

    pub async fn draft_policy(&self, policy_id: &str, owner: &AuthUser) -> EngineResult<Policy> {
        let owner = self.authenticate(owner).await?;
        self.manager.draft_policy(policy_id, &owner).await
    }

    pub async fn restart_dry_run(&self, policy_id: &str, owner: &AuthUser) -> EngineResult<Policy> {
        let owner = self.authenticate(owner).await?;
        self.manager.restart_dry_run(policy_id, &owner).await
    }

    // ── Block data ──────────────────────────────────────────────────────────

    pub async fn get_block_data(
        &self,
        policy_id: &str,
        block: Uuid,
        auth: &AuthUser,
    ) -> EngineResult<serde_json::Value> {
        let auth = self.authenticate(auth).await?;
        let policy = self.manager.load(policy_id).await?;
        let user = self.users.resolve(&policy, &auth).await?;
        self.state.get_block_data(&policy, block, &user).await
    }

    pub async fn get_block_data_by_tag(
        &self,
        policy_id: &str,
        tag: &str,
        auth: &AuthUser,
    ) -> EngineResult<serde_json::Value> {
        let auth = self.authenticate(auth).await?;
        let policy = self.manager.load(policy_id).await?;
        let user = self.users.resolve(&policy, &auth).await?;
        self.state.get_block_data_by_tag(&policy, tag, &user).await
    }

    pub async fn set_block_data(
        &self,
        policy_id: &str,
        block: Uuid,
        auth: &AuthUser,
        data: serde_json::Value,
    ) -> EngineResult<serde_json::Value> {
        let auth = self.authenticate(auth).await?;
        let policy = self.manager.load(policy_id).await?;
        let user = self.users.resolve(&policy, &auth).await?;
        self.state.set_block_data(&policy, block, &user, data).await
    }

    pub async fn set_block_data_by_tag(
        &self,
        policy_id: &str,
        tag: &str,
        auth: &AuthUser,
        data: serde_json::Value,
    ) -> EngineResult<serde_json::Value> {
        let auth = self.authenticate(auth).await?;
        let policy = self.manager.load(policy_id).await?;
        let block = self.state.registry().instance(&policy.id)?.block_by_tag(tag)?;
        let user = self.users.resolve(&policy, &auth).await?;
        self.state.set_block_data(&policy, block, &user, data).await
    }

    /// Resolve a tag to the block uuid it names.
    pub fn get_block_by_tag(&self, policy_id: &str, tag: &str) -> EngineResult<Uuid> {
        self.state.registry().instance(policy_id)?.block_by_tag(tag)
    }

    /// The block itself followed by its ancestors up to the root.
    pub fn get_block_parents(&self, block: Uuid) -> EngineResult<Vec<Uuid>> {
        self.state.block_parents(block)
    }

    // ── Import / export ─────────────────────────────────────────────────────

    pub async fn export_file(&self, policy_id: &str) -> EngineResult<Vec<u8>> {
        self.manager.export_policy(policy_id).await
    }

    /// The ledger coordinates of a published policy, for message-based
    /// import on another instance.
    pub async fn export_message(&self, policy_id: &str) -> EngineResult<serde_json::Value> {
        let policy = self.manager.load(policy_id).await?;
        let message_id = policy.message_id.as_ref().ok_or_else(|| {
            EngineError::validation(format!("policy '{policy_id}' has not been published"))
        })?;
        Ok(json!({
            "id": policy.id,
            "uuid": policy.uuid,
            "name": policy.name,
            "description": policy.description,
            "version": policy.version,
            "owner": policy.owner,
            "messageId": message_id,
        }))
    }

    pub async fn import_file(&self, bytes: &[u8], owner: &AuthUser) -> EngineResult<Policy> {
        let owner = self.authenticate(owner).await?;
        self.manager
            .import_policy(bytes, &owner, &EmptyNotifier)
            .await
    }

    pub fn import_file_async(self: &Arc<Self>, bytes: Vec<u8>, owner: AuthUser) -> Uuid {
        let (task_id, notifier) = self.tracker.begin();
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let result = async {
                let owner = service.authenticate(&owner).await?;
                service.manager.import_policy(&bytes, &owner, &notifier).await
            }
            .await;
            if let Err(err) = result {
                error!(task_id = %task_id, error = %err, "async import failed");
                notifier.error(&err.to_string());
            }
        });
        task_id
    }

    pub async fn import_message(
        &self,
        message_id: &str,
        owner: &AuthUser,
    ) -> EngineResult<Policy> {
        let owner = self.authenticate(owner).await?;
        self.manager
            .import_policy_from_message(message_id, &owner, &EmptyNotifier)
            .await
    }

    pub fn preview_file(&self, bytes: &[u8]) -> EngineResult<ArchivePreview> {
        self.manager.preview_file(bytes)
    }

    pub async fn preview_message(&self, message_id: &str) -> EngineResult<ArchivePreview> {
        self.manager.preview_message(message_id).await
    }

    // ── Dry-run users and roles ─────────────────────────────────────────────

    pub async fn get_virtual_users(
        &self,
        policy_id: &str,
        auth: &AuthUser,
    ) -> EngineResult<Vec<VirtualUser>> {
        let auth = self.authenticate(auth).await?;
        let policy = self.manager.load(policy_id).await?;
        if policy.owner != auth.did {
            return Err(EngineError::permission(format!(
                "user '{}' does not own policy '{policy_id}'",
                auth.username
            )));
        }
        self.users.virtual_users(&policy).await
    }

    pub async fn create_virtual_user(
        &self,
        policy_id: &str,
        auth: &AuthUser,
        username: &str,
    ) -> EngineResult<VirtualUser> {
        let auth = self.authenticate(auth).await?;
        let policy = self.manager.load(policy_id).await?;
        self.users
            .create_virtual_user(&policy, &auth, username)
            .await
    }

    pub async fn set_active_virtual_user(
        &self,
        policy_id: &str,
        auth: &AuthUser,
        did: &str,
    ) -> EngineResult<()> {
        let auth = self.authenticate(auth).await?;
        let policy = self.manager.load(policy_id).await?;
        self.users.set_active_virtual_user(&policy, &auth, did).await
    }

    /// Page through a dry-run sandbox's documents in insertion order.
    /// Returns the page and the unpaged total.
    pub async fn get_virtual_documents(
        &self,
        policy_id: &str,
        auth: &AuthUser,
        schema: Option<&str>,
        page: u64,
        size: u64,
    ) -> EngineResult<(Vec<serde_json::Value>, u64)> {
        let auth = self.authenticate(auth).await?;
        let policy = self.manager.load(policy_id).await?;
        if policy.owner != auth.did {
            return Err(EngineError::permission(format!(
                "user '{}' does not own policy '{policy_id}'",
                auth.username
            )));
        }
        let query = DocumentQuery {
            policy_id: policy.id.clone(),
            dry_run: true,
            schema: schema.map(str::to_string),
            ..DocumentQuery::default()
        };
        let total = self.store.count_documents(&query).await?;
        let documents = self
            .store
            .query_documents(&DocumentQuery {
                skip: Some(page * size),
                take: Some(size),
                ..query
            })
            .await?;
        Ok((documents, total))
    }

    /// Role assignments visible for this policy: the virtual ones under
    /// dry-run, the real ones otherwise.
    pub async fn get_user_roles(&self, policy_id: &str) -> EngineResult<Vec<GroupAssignment>> {
        let policy = self.manager.load(policy_id).await?;
        if policy.is_dry_run() {
            self.users.virtual_role_list(&policy).await
        } else {
            self.users.role_list(&policy).await
        }
    }
}
