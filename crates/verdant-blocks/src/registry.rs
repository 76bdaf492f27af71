//! The process-wide registry of generated policy instances.
//!
//! Generation builds the runtime tree from the stored config and registers
//! every block under its uuid and tag. Lookups against a policy that was
//! never generated (or was destroyed) fail with `NotFound` — a registered
//! uuid is the engine's proof that a request targets live configuration.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;
use verdant_contracts::{
    error::{EngineError, EngineResult},
    policy::Policy,
};

use crate::factory;
use crate::tree::BlockTree;

/// One generated policy: its runtime tree plus the tag index.
#[derive(Debug)]
pub struct PolicyInstance {
    pub policy_id: String,
    pub owner: String,
    pub dry_run: bool,
    pub tree: BlockTree,
    tags: HashMap<String, Uuid>,
}

impl PolicyInstance {
    /// Resolve a tag to the block uuid it names.
    pub fn block_by_tag(&self, tag: &str) -> EngineResult<Uuid> {
        self.tags.get(tag).copied().ok_or_else(|| {
            EngineError::not_found(format!(
                "no block tagged '{tag}' in policy '{}'",
                self.policy_id
            ))
        })
    }
}

#[derive(Default)]
struct RegistryInner {
    instances: HashMap<String, Arc<PolicyInstance>>,
    /// Global uuid index; block uuids are unique across generated policies.
    blocks: HashMap<Uuid, String>,
}

/// Registry of every policy instance generated in this process.
#[derive(Default)]
pub struct ComponentRegistry {
    inner: RwLock<RegistryInner>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register the runtime instance for `policy`.
    ///
    /// Replaces any previously generated instance for the same policy id.
    /// Fails when the config is missing, a block type is unknown, or two
    /// blocks share a tag.
    pub fn generate(&self, policy: &Policy) -> EngineResult<Arc<PolicyInstance>> {
        let config = policy.config.as_ref().ok_or_else(|| {
            EngineError::validation(format!("policy '{}' has no block config", policy.id))
        })?;
        let tree = BlockTree::from_config(config)?;

        let mut tags = HashMap::new();
        for node in tree.walk() {
            if factory::behavior(&node.block_type).is_none() {
                return Err(EngineError::validation(format!(
                    "unknown block type '{}' at tag '{}'",
                    node.block_type, node.tag
                )));
            }
            if tags.insert(node.tag.clone(), node.uuid).is_some() {
                return Err(EngineError::validation(format!(
                    "duplicate block tag '{}'",
                    node.tag
                )));
            }
        }

        let instance = Arc::new(PolicyInstance {
            policy_id: policy.id.clone(),
            owner: policy.owner.clone(),
            dry_run: policy.is_dry_run(),
            tree,
            tags,
        });

        let mut inner = self.inner.write();
        if let Some(previous) = inner.instances.remove(&policy.id) {
            for node in previous.tree.walk() {
                inner.blocks.remove(&node.uuid);
            }
        }
        for node in instance.tree.walk() {
            inner.blocks.insert(node.uuid, policy.id.clone());
        }
        inner.instances.insert(policy.id.clone(), instance.clone());
        info!(
            policy_id = %policy.id,
            blocks = instance.tree.len(),
            dry_run = instance.dry_run,
            "policy instance generated"
        );
        Ok(instance)
    }

    /// Drop a policy's runtime instance. Subsequent lookups fail with
    /// `NotFound`. Returns false when nothing was registered.
    pub fn destroy(&self, policy_id: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.instances.remove(policy_id) {
            Some(instance) => {
                for node in instance.tree.walk() {
                    inner.blocks.remove(&node.uuid);
                }
                debug!(policy_id = %policy_id, "policy instance destroyed");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, policy_id: &str) -> bool {
        self.inner.read().instances.contains_key(policy_id)
    }

    /// The generated instance for `policy_id`.
    pub fn instance(&self, policy_id: &str) -> EngineResult<Arc<PolicyInstance>> {
        self.inner
            .read()
            .instances
            .get(policy_id)
            .cloned()
            .ok_or_else(|| {
                EngineError::not_found(format!("policy '{policy_id}' is not generated"))
            })
    }

    /// Resolve a block uuid across all generated policies.
    pub fn locate(&self, uuid: Uuid) -> EngineResult<Arc<PolicyInstance>> {
        let inner = self.inner.read();
        let policy_id = inner
            .blocks
            .get(&uuid)
            .ok_or_else(|| EngineError::not_found(format!("block '{uuid}' is not registered")))?;
        inner
            .instances
            .get(policy_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("block '{uuid}' is not registered")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verdant_contracts::block::BlockConfig;

    fn sample_policy() -> Policy {
        let mut policy = Policy::new_draft("Carbon", "did:owner");
        policy.config = Some(BlockConfig::new("interfaceContainerBlock", "root").with_children(
            vec![BlockConfig::new("policyRolesBlock", "choose_role")
                .with_options(json!({ "roles": ["Farmer"] }))],
        ));
        policy
    }

    #[test]
    fn generate_then_lookup_by_tag_and_uuid() {
        let registry = ComponentRegistry::new();
        let instance = registry.generate(&sample_policy()).unwrap();

        let uuid = instance.block_by_tag("choose_role").unwrap();
        let located = registry.locate(uuid).unwrap();
        assert_eq!(located.policy_id, instance.policy_id);
    }

    #[test]
    fn destroy_unregisters_every_block() {
        let registry = ComponentRegistry::new();
        let policy = sample_policy();
        let instance = registry.generate(&policy).unwrap();
        let uuid = instance.block_by_tag("root").unwrap();

        assert!(registry.destroy(&policy.id));
        assert!(matches!(
            registry.locate(uuid),
            Err(EngineError::NotFound { .. })
        ));
        assert!(matches!(
            registry.instance(&policy.id),
            Err(EngineError::NotFound { .. })
        ));
        assert!(!registry.destroy(&policy.id));
    }

    #[test]
    fn unknown_block_type_refuses_generation() {
        let registry = ComponentRegistry::new();
        let mut policy = sample_policy();
        policy.config = Some(BlockConfig::new("mysteryBlock", "root"));
        assert!(matches!(
            registry.generate(&policy),
            Err(EngineError::Validation { .. })
        ));
    }

    #[test]
    fn duplicate_tags_refuse_generation() {
        let registry = ComponentRegistry::new();
        let mut policy = sample_policy();
        policy.config = Some(
            BlockConfig::new("interfaceContainerBlock", "root").with_children(vec![
                BlockConfig::new("informationBlock", "twin"),
                BlockConfig::new("informationBlock", "twin"),
            ]),
        );
        assert!(matches!(
            registry.generate(&policy),
            Err(EngineError::Validation { .. })
        ));
    }

    #[test]
    fn regeneration_replaces_old_uuids() {
        let registry = ComponentRegistry::new();
        let mut policy = sample_policy();
        let first = registry.generate(&policy).unwrap();
        let old_uuid = first.block_by_tag("root").unwrap();

        if let Some(config) = policy.config.as_mut() {
            config.regenerate_ids();
        }
        let second = registry.generate(&policy).unwrap();
        let new_uuid = second.block_by_tag("root").unwrap();

        assert_ne!(old_uuid, new_uuid);
        assert!(registry.locate(old_uuid).is_err());
        assert!(registry.locate(new_uuid).is_ok());
    }
}
