//! Policy model and lifecycle status.
//!
//! A policy is a versioned tree of blocks representing one workflow
//! definition. The tree itself lives in `config` as declarative block
//! configuration; runtime block instances are rebuilt from it every time the
//! policy is (re)generated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::block::BlockConfig;

/// Version tag of the block-config format written into new policies.
pub const CODE_VERSION: &str = "1.0.0";

/// Lifecycle state of a policy tree.
///
/// `Draft` may transition to `DryRun` or `Publish`. `Publish` is one-way:
/// a published policy never returns to draft; re-publishing with a greater
/// version creates a fresh tree under a new instance topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyStatus {
    Draft,
    DryRun,
    Publish,
}

/// A policy record as persisted in the document store.
///
/// `uuid` identifies the policy lineage across versions; `id` identifies a
/// single stored record. `version` is empty while the policy is in draft;
/// `previous_version` tracks the highest version published from this
/// lineage and gates the next publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Store-assigned record id.
    pub id: String,
    /// Lineage identifier, stable across versions and re-publishes.
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub topic_description: String,
    /// Published version, or empty string in draft.
    #[serde(default)]
    pub version: String,
    /// Highest version already published from this lineage.
    #[serde(default)]
    pub previous_version: String,
    /// DID of the current owner.
    pub owner: String,
    /// DID of the original creator.
    pub creator: String,
    #[serde(default)]
    pub policy_tag: String,
    /// The policy's own ledger topic; allocated on first creation.
    pub topic_id: Option<String>,
    /// Instance topic allocated by publish / dry-run.
    pub instance_topic_id: Option<String>,
    /// Ledger message id of the latest publication.
    pub message_id: Option<String>,
    pub status: PolicyStatus,
    /// Declarative block tree. `None` for an empty policy, which cannot be
    /// published or dry-run.
    pub config: Option<BlockConfig>,
    #[serde(default)]
    pub code_version: String,
    pub create_date: DateTime<Utc>,
}

impl Policy {
    /// Create a fresh draft owned by `owner`.
    pub fn new_draft(name: impl Into<String>, owner: impl Into<String>) -> Self {
        let owner = owner.into();
        Self {
            id: Uuid::new_v4().to_string(),
            uuid: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            topic_description: String::new(),
            version: String::new(),
            previous_version: String::new(),
            owner: owner.clone(),
            creator: owner,
            policy_tag: String::new(),
            topic_id: None,
            instance_topic_id: None,
            message_id: None,
            status: PolicyStatus::Draft,
            config: None,
            code_version: CODE_VERSION.to_string(),
            create_date: Utc::now(),
        }
    }

    /// True when the policy runs in dry-run mode.
    pub fn is_dry_run(&self) -> bool {
        self.status == PolicyStatus::DryRun
    }
}

/// Filters accepted by the policy listing endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFilters {
    pub id: Option<String>,
    pub uuid: Option<Uuid>,
    pub owner: Option<String>,
    pub status: Option<PolicyStatus>,
    pub version: Option<String>,
}

impl PolicyFilters {
    /// True when `policy` satisfies every set filter.
    pub fn matches(&self, policy: &Policy) -> bool {
        if let Some(id) = &self.id {
            if &policy.id != id {
                return false;
            }
        }
        if let Some(uuid) = &self.uuid {
            if &policy.uuid != uuid {
                return false;
            }
        }
        if let Some(owner) = &self.owner {
            if &policy.owner != owner {
                return false;
            }
        }
        if let Some(status) = &self.status {
            if &policy.status != status {
                return false;
            }
        }
        if let Some(version) = &self.version {
            if &policy.version != version {
                return false;
            }
        }
        true
    }
}
