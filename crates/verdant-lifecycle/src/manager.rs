//! Policy lifecycle transitions.
//!
//! The manager owns every status transition: create, publish, dry-run,
//! draft revert, dry-run restart, import and export. The publish pipeline
//! follows a strict order; the stored policy record is only rewritten after
//! every ledger send succeeded, so a `Transport` failure leaves no partial
//! published state behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use verdant_blocks::{registry::ComponentRegistry, validators};
use verdant_contracts::{
    error::{EngineError, EngineResult},
    policy::{Policy, PolicyStatus, CODE_VERSION},
    schema::{SchemaDocument, SchemaStatus},
    topic::{MessageAction, MessageType, Topic, TopicKind, TopicMessage},
    user::{AuthUser, UserRole},
    validation::ValidationReport,
    version::{check_version_format, version_compare},
};
use verdant_engine::{
    traits::{CredentialIssuer, DocumentStore, LedgerTransport, SchemaRegistry},
    StateCore, UserResolver,
};

use crate::archive::{self, ArchivePreview};
use crate::notifier::Notifier;

pub struct LifecycleManager {
    registry: Arc<ComponentRegistry>,
    state: Arc<StateCore>,
    store: Arc<dyn DocumentStore>,
    transport: Arc<dyn LedgerTransport>,
    schemas: Arc<dyn SchemaRegistry>,
    issuer: Arc<dyn CredentialIssuer>,
    users: Arc<UserResolver>,
    dry_run_seq: AtomicU64,
}

impl LifecycleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<ComponentRegistry>,
        state: Arc<StateCore>,
        store: Arc<dyn DocumentStore>,
        transport: Arc<dyn LedgerTransport>,
        schemas: Arc<dyn SchemaRegistry>,
        issuer: Arc<dyn CredentialIssuer>,
        users: Arc<UserResolver>,
    ) -> Self {
        Self {
            registry,
            state,
            store,
            transport,
            schemas,
            issuer,
            users,
            dry_run_seq: AtomicU64::new(1),
        }
    }

    pub async fn load(&self, policy_id: &str) -> EngineResult<Policy> {
        self.store
            .load_policy(policy_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("no policy '{policy_id}'")))
    }

    /// Ownership check, both ways: the caller must match the record and the
    /// record must name the caller.
    fn check_owner(policy: &Policy, owner: &AuthUser) -> EngineResult<()> {
        if policy.owner != owner.did || owner.did.is_empty() {
            return Err(EngineError::permission(format!(
                "user '{}' does not own policy '{}'",
                owner.username, policy.id
            )));
        }
        Ok(())
    }

    // ── Create ──────────────────────────────────────────────────────────────

    /// Create a new draft, or update an existing record in place.
    ///
    /// The ownership check runs against the *stored* record when the model's
    /// id names one; the model's own owner field cannot claim a foreign
    /// policy. First creation allocates the policy topic, sends the
    /// CreatePolicy message and publishes the system schemas.
    pub async fn create_policy(
        &self,
        mut model: Policy,
        owner: &AuthUser,
        notifier: &dyn Notifier,
    ) -> EngineResult<Policy> {
        if !model.owner.is_empty() && model.owner != owner.did {
            return Err(EngineError::permission(format!(
                "model owner '{}' does not match user '{}'",
                model.owner, owner.did
            )));
        }
        match self.store.load_policy(&model.id).await? {
            Some(old) => {
                Self::check_owner(&old, owner)?;
                if old.status == PolicyStatus::Publish {
                    return Err(EngineError::validation(format!(
                        "policy '{}' is published and cannot be modified",
                        old.id
                    )));
                }
                model.creator = old.creator;
                model.previous_version = old.previous_version;
                model.create_date = old.create_date;
                model.message_id = old.message_id;
                if model.topic_id.is_none() {
                    model.topic_id = old.topic_id;
                }
            }
            None => model.creator = owner.did.clone(),
        }
        model.owner = owner.did.clone();
        model.status = PolicyStatus::Draft;
        model.version = String::new();
        model.code_version = CODE_VERSION.to_string();

        notifier.start("Resolve ledger account");
        self.transport.resolve_account(&owner.did).await?;
        notifier.completed();

        if model.topic_id.is_none() {
            self.allocate_policy_topic(&mut model, notifier).await?;
        }

        self.store.save_policy(&model).await?;
        info!(policy_id = %model.id, owner = %model.owner, "policy created");
        notifier.result(json!({ "policyId": model.id }));
        Ok(model)
    }

    /// Allocate the policy topic, announce the policy on it and publish the
    /// system schema set.
    async fn allocate_policy_topic(
        &self,
        policy: &mut Policy,
        notifier: &dyn Notifier,
    ) -> EngineResult<()> {
        notifier.start("Create topic");
        let topic_id = self
            .transport
            .create_topic(&Topic {
                topic_id: String::new(),
                kind: TopicKind::PolicyTopic,
                name: policy.name.clone(),
                description: policy.topic_description.clone(),
                owner: policy.owner.clone(),
                policy_id: Some(policy.id.clone()),
                policy_uuid: Some(policy.uuid),
                parent: None,
            })
            .await?;
        self.transport
            .send_message(
                &topic_id,
                &TopicMessage::new(
                    MessageType::Policy,
                    MessageAction::CreatePolicy,
                    self.policy_meta(policy),
                ),
            )
            .await?;
        policy.topic_id = Some(topic_id.clone());
        notifier.completed();

        notifier.start("Publish system schemas");
        let published = self
            .schemas
            .publish_system_schemas(&topic_id, &policy.owner)
            .await?;
        notifier.info(&format!("system schemas published: {published}"));
        notifier.completed();
        Ok(())
    }

    /// Replace a draft's config and metadata in place. Identity, topics and
    /// version history stay untouched; only drafts can be rewritten.
    pub async fn update_policy(
        &self,
        policy_id: &str,
        model: Policy,
        owner: &AuthUser,
    ) -> EngineResult<Policy> {
        let mut policy = self.load(policy_id).await?;
        Self::check_owner(&policy, owner)?;
        if policy.status != PolicyStatus::Draft {
            return Err(EngineError::validation(format!(
                "policy '{policy_id}' is not in draft status"
            )));
        }
        policy.name = model.name;
        policy.description = model.description;
        policy.topic_description = model.topic_description;
        policy.policy_tag = model.policy_tag;
        policy.config = model.config;
        self.store.save_policy(&policy).await?;
        info!(policy_id = %policy.id, "policy updated");
        Ok(policy)
    }

    fn policy_meta(&self, policy: &Policy) -> serde_json::Value {
        json!({
            "id": policy.id,
            "uuid": policy.uuid,
            "name": policy.name,
            "description": policy.description,
            "version": policy.version,
            "owner": policy.owner,
            "topicId": policy.topic_id,
            "instanceTopicId": policy.instance_topic_id,
        })
    }

    // ── Publish ─────────────────────────────────────────────────────────────

    /// Publish `policy_id` at `version`.
    ///
    /// Gate order: ownership, not-already-published, version format,
    /// strictly-greater compare, duplicate (uuid, version), full block
    /// validation. Only then do side effects begin.
    pub async fn publish_policy(
        &self,
        policy_id: &str,
        owner: &AuthUser,
        version: &str,
        notifier: &dyn Notifier,
    ) -> EngineResult<Policy> {
        let mut policy = self.load(policy_id).await?;
        Self::check_owner(&policy, owner)?;

        if policy.status == PolicyStatus::Publish {
            return Err(EngineError::validation(format!(
                "policy '{policy_id}' is already published"
            )));
        }
        if !check_version_format(version) {
            return Err(EngineError::validation(format!(
                "'{version}' is not a valid version"
            )));
        }
        if version_compare(version, &policy.previous_version) <= 0 {
            return Err(EngineError::validation(format!(
                "version '{version}' must be greater than '{}'",
                policy.previous_version
            )));
        }
        let duplicates = self
            .store
            .list_policies(&verdant_contracts::policy::PolicyFilters {
                uuid: Some(policy.uuid),
                version: Some(version.to_string()),
                ..Default::default()
            })
            .await?;
        if !duplicates.is_empty() {
            return Err(EngineError::validation(format!(
                "version '{version}' of this policy was already published"
            )));
        }

        let report = validators::validate_policy(&policy);
        if !report.is_valid() {
            return Err(EngineError::BlockValidation { report });
        }

        // Leaving dry-run: the sandbox and its instance go first.
        if policy.is_dry_run() {
            self.teardown_instance(&policy).await?;
        }

        notifier.start("Resolve ledger account");
        self.transport.resolve_account(&owner.did).await?;
        notifier.completed();

        if policy.topic_id.is_none() {
            self.allocate_policy_topic(&mut policy, notifier).await?;
        }
        // Presence checked or allocated just above.
        let topic_id = policy.topic_id.clone().unwrap_or_default();

        notifier.start("Publish schemas");
        let (published, skipped) = self.publish_draft_schemas(&topic_id).await?;
        notifier.info(&format!("schemas published: {published}, skipped: {skipped}"));
        notifier.completed();

        policy.status = PolicyStatus::Publish;
        policy.version = version.to_string();
        policy.code_version = CODE_VERSION.to_string();

        notifier.start("Generate file");
        if let Some(config) = policy.config.as_mut() {
            config.regenerate_ids();
        }
        let schemas = self.schemas.schemas_for_topic(&topic_id).await?;
        let file = archive::export(&policy, &schemas)?;
        notifier.completed();

        notifier.start("Create instance topic");
        let instance_topic_id = self
            .transport
            .create_topic(&Topic {
                topic_id: String::new(),
                kind: TopicKind::InstancePolicyTopic,
                name: format!("{} ({})", policy.name, version),
                description: policy.topic_description.clone(),
                owner: policy.owner.clone(),
                policy_id: Some(policy.id.clone()),
                policy_uuid: Some(policy.uuid),
                parent: Some(topic_id.clone()),
            })
            .await?;
        policy.instance_topic_id = Some(instance_topic_id.clone());
        notifier.completed();

        notifier.start("Publish policy");
        let mut message = TopicMessage::new(
            MessageType::InstancePolicy,
            MessageAction::PublishPolicy,
            self.policy_meta(&policy),
        )
        .with_attachment(file)
        .with_version(version);
        message.previous_message_id = policy.message_id.clone();
        let message_id = self.transport.send_message(&topic_id, &message).await?;
        policy.message_id = Some(message_id);
        notifier.completed();

        notifier.start("Link topic and policy");
        self.transport
            .link_topics(&topic_id, &instance_topic_id)
            .await?;
        notifier.completed();

        notifier.start("Create VC");
        let credential = self.issuer.issue_policy_credential(&policy).await?;
        self.store
            .save_document(&policy.id, false, &credential)
            .await?;
        notifier.completed();

        notifier.start("Saving in DB");
        policy.previous_version = version.to_string();
        self.store.save_policy(&policy).await?;
        notifier.completed();

        self.registry.generate(&policy)?;
        info!(
            policy_id = %policy.id,
            version = %version,
            topic_id = %topic_id,
            "policy published"
        );
        notifier.result(self.policy_meta(&policy));
        Ok(policy)
    }

    /// Increment and publish every draft schema on the topic; count the
    /// already-published ones as skipped.
    async fn publish_draft_schemas(&self, topic_id: &str) -> EngineResult<(usize, usize)> {
        let mut published = 0;
        let mut skipped = 0;
        for schema in self.schemas.schemas_for_topic(topic_id).await? {
            if schema.system {
                continue;
            }
            match schema.status {
                SchemaStatus::Draft => {
                    let version = if schema.version.is_empty() {
                        "1.0.0"
                    } else {
                        &schema.version
                    };
                    self.schemas.publish_schema(&schema, version).await?;
                    published += 1;
                }
                SchemaStatus::Published => skipped += 1,
            }
        }
        Ok((published, skipped))
    }

    // ── Dry-run ─────────────────────────────────────────────────────────────

    /// Start a dry-run: validate, allocate synthetic topics, generate the
    /// instance and seed one virtual Administrator. Schema publication is
    /// skipped entirely under dry-run.
    pub async fn dry_run_policy(&self, policy_id: &str, owner: &AuthUser) -> EngineResult<Policy> {
        let mut policy = self.load(policy_id).await?;
        Self::check_owner(&policy, owner)?;
        if owner.role != UserRole::StandardRegistry {
            return Err(EngineError::permission(
                "only the standard registry may start a dry-run",
            ));
        }
        if policy.status != PolicyStatus::Draft {
            return Err(EngineError::validation(format!(
                "policy '{policy_id}' is not in draft status"
            )));
        }

        let report = validators::validate_policy(&policy);
        if !report.is_valid() {
            return Err(EngineError::BlockValidation { report });
        }

        let seq = self.dry_run_seq.fetch_add(1, Ordering::Relaxed);
        if policy.topic_id.is_none() {
            policy.topic_id = Some(format!("dry-run.{policy_id}.{seq}"));
        }
        policy.instance_topic_id = Some(format!("dry-run.{policy_id}.{seq}.instance"));
        policy.status = PolicyStatus::DryRun;

        self.store.save_policy(&policy).await?;
        self.registry.generate(&policy)?;
        self.users
            .create_virtual_user(&policy, owner, "Administrator")
            .await?;
        info!(policy_id = %policy.id, "dry-run started");
        Ok(policy)
    }

    /// Reset a running dry-run: purge the sandbox, rebuild the instance and
    /// reseed the Administrator.
    pub async fn restart_dry_run(&self, policy_id: &str, owner: &AuthUser) -> EngineResult<Policy> {
        let policy = self.load(policy_id).await?;
        Self::check_owner(&policy, owner)?;
        if !policy.is_dry_run() {
            return Err(EngineError::validation(format!(
                "policy '{policy_id}' is not in dry-run"
            )));
        }

        self.teardown_instance(&policy).await?;
        self.registry.generate(&policy)?;
        self.users
            .create_virtual_user(&policy, owner, "Administrator")
            .await?;
        info!(policy_id = %policy.id, "dry-run restarted");
        Ok(policy)
    }

    /// Revert a dry-run policy to draft, destroying the instance and the
    /// whole sandbox.
    pub async fn draft_policy(&self, policy_id: &str, owner: &AuthUser) -> EngineResult<Policy> {
        let mut policy = self.load(policy_id).await?;
        Self::check_owner(&policy, owner)?;
        if policy.status == PolicyStatus::Publish {
            return Err(EngineError::validation(format!(
                "policy '{policy_id}' is published and cannot return to draft"
            )));
        }

        self.teardown_instance(&policy).await?;
        policy.status = PolicyStatus::Draft;
        policy.version = String::new();
        policy.instance_topic_id = None;
        self.store.save_policy(&policy).await?;
        info!(policy_id = %policy.id, "policy reverted to draft");
        Ok(policy)
    }

    /// Destroy the runtime instance (if generated) and purge the dry-run
    /// sandbox.
    async fn teardown_instance(&self, policy: &Policy) -> EngineResult<()> {
        if let Ok(instance) = self.registry.instance(&policy.id) {
            self.state.purge_instance(&instance);
        }
        if !self.registry.destroy(&policy.id) {
            warn!(policy_id = %policy.id, "no generated instance to destroy");
        }
        self.store.clear_dry_run(&policy.id).await
    }

    /// Run block validation without any transition.
    pub fn validate(&self, policy: &Policy) -> ValidationReport {
        validators::validate_policy(policy)
    }

    // ── Import / export ─────────────────────────────────────────────────────

    /// Export a policy with the schemas on its topic.
    pub async fn export_policy(&self, policy_id: &str) -> EngineResult<Vec<u8>> {
        let policy = self.load(policy_id).await?;
        let schemas = match &policy.topic_id {
            Some(topic_id) => self
                .schemas
                .schemas_for_topic(topic_id)
                .await?
                .into_iter()
                .filter(|s| !s.system)
                .collect(),
            None => Vec::new(),
        };
        archive::export(&policy, &schemas)
    }

    /// Import an archive as a fresh draft owned by `owner`.
    ///
    /// The imported policy gets a new identity and its own topic; archived
    /// schemas are re-homed onto that topic as drafts, resolving any topic
    /// conflict with the exporting instance.
    pub async fn import_policy(
        &self,
        bytes: &[u8],
        owner: &AuthUser,
        notifier: &dyn Notifier,
    ) -> EngineResult<Policy> {
        let archive = archive::import_bytes(bytes)?;
        let mut policy = archive.policy;
        policy.id = uuid::Uuid::new_v4().to_string();
        policy.uuid = uuid::Uuid::new_v4();
        policy.owner = String::new();
        policy.creator = String::new();
        policy.status = PolicyStatus::Draft;
        policy.version = String::new();
        policy.previous_version = String::new();
        policy.topic_id = None;
        policy.instance_topic_id = None;
        policy.message_id = None;

        let policy = self.create_policy(policy, owner, notifier).await?;
        // create_policy allocated the topic just above.
        let topic_id = policy.topic_id.clone().unwrap_or_default();

        notifier.start("Import schemas");
        for schema in &archive.schemas {
            if schema.system {
                continue;
            }
            let rehomed = SchemaDocument {
                topic_id: topic_id.clone(),
                owner: owner.did.clone(),
                status: SchemaStatus::Draft,
                ..schema.clone()
            };
            self.schemas.track_schema(&rehomed).await?;
        }
        notifier.info(&format!("schemas imported: {}", archive.schemas.len()));
        notifier.completed();
        Ok(policy)
    }

    /// Import from a ledger publish message carrying the archive.
    pub async fn import_policy_from_message(
        &self,
        message_id: &str,
        owner: &AuthUser,
        notifier: &dyn Notifier,
    ) -> EngineResult<Policy> {
        let message = self.transport.get_message(message_id).await?;
        let bytes = message.attachment.ok_or_else(|| {
            EngineError::validation(format!("message '{message_id}' carries no policy archive"))
        })?;
        self.import_policy(&bytes, owner, notifier).await
    }

    /// Preview an archive file. File previews have no topic context, so no
    /// upgrade hints are produced.
    pub fn preview_file(&self, bytes: &[u8]) -> EngineResult<ArchivePreview> {
        let archive = archive::import_bytes(bytes)?;
        Ok(archive::preview(&archive, &[]))
    }

    /// Preview a ledger message's archive, with newer-version hints from the
    /// other publish messages on the same topic.
    pub async fn preview_message(&self, message_id: &str) -> EngineResult<ArchivePreview> {
        let message = self.transport.get_message(message_id).await?;
        let bytes = message.attachment.as_deref().ok_or_else(|| {
            EngineError::validation(format!("message '{message_id}' carries no policy archive"))
        })?;
        let archive = archive::import_bytes(bytes)?;

        let published: Vec<String> = self
            .transport
            .get_topic_messages(&message.topic_id)
            .await?
            .into_iter()
            .filter(|m| m.action == MessageAction::PublishPolicy)
            .filter_map(|m| m.version)
            .collect();
        Ok(archive::preview(&archive, &published))
    }
}
