//! Declarative block configuration.
//!
//! A block tree is stored as nested `BlockConfig` values inside the policy
//! record. Runtime block instances are rebuilt from this configuration on
//! every generation — configs are the only persisted form of a block.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capability class of a block type.
///
/// Determines which data contract a block participates in and how the event
/// core treats it (Container blocks use coarse invalidation — they are
/// always considered changed after a write anywhere beneath them).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Container,
    Source,
    Interface,
    Addon,
    Calculate,
    Action,
}

/// Permission sentinel: the policy owner.
pub const ROLE_OWNER: &str = "OWNER";
/// Permission sentinel: any user with an assigned role.
pub const ROLE_ANY: &str = "ANY_ROLE";
/// Permission sentinel: users that have not yet been assigned a role.
pub const ROLE_NONE: &str = "NO_ROLE";

/// One node of the declarative block tree.
///
/// `id` is regenerated on every publish; `tag` is the human-assigned alias
/// that stays stable across id regeneration and is unique per policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockConfig {
    pub id: Uuid,
    /// Block-type tag resolved through the behavior factory
    /// (e.g. `"interfaceContainerBlock"`, `"paginationAddon"`).
    pub block_type: String,
    pub tag: String,
    /// Roles allowed to see and drive this block. Sentinels `OWNER`,
    /// `ANY_ROLE` and `NO_ROLE` are understood alongside policy role names.
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default = "default_active")]
    pub default_active: bool,
    /// Static, type-specific options validated at publish time.
    #[serde(default)]
    pub options: serde_json::Value,
    #[serde(default)]
    pub children: Vec<BlockConfig>,
}

fn default_active() -> bool {
    true
}

impl BlockConfig {
    /// Build a config node with a fresh uuid and no children.
    pub fn new(block_type: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            block_type: block_type.into(),
            tag: tag.into(),
            permissions: Vec::new(),
            default_active: true,
            options: serde_json::Value::Null,
            children: Vec::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: &[&str]) -> Self {
        self.permissions = permissions.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }

    pub fn with_children(mut self, children: Vec<BlockConfig>) -> Self {
        self.children = children;
        self
    }

    /// Visit every node of the subtree rooted at `self`, parents first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a BlockConfig)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Reassign uuids across the whole subtree. Tags are untouched, so
    /// tag-based external references survive regeneration.
    pub fn regenerate_ids(&mut self) {
        self.id = Uuid::new_v4();
        for child in &mut self.children {
            child.regenerate_ids();
        }
    }
}
