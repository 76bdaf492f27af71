//! The runtime block tree.
//!
//! A `BlockTree` is an arena keyed by block uuid. Each node keeps a
//! non-owning handle to its parent and an ordered list of child uuids, so
//! parent traversal never fights the ownership of the tree itself. Trees are
//! immutable once built — configuration changes rebuild the whole tree.

use std::collections::HashMap;

use uuid::Uuid;
use verdant_contracts::{
    block::{BlockConfig, ROLE_ANY, ROLE_NONE, ROLE_OWNER},
    error::{EngineError, EngineResult},
    user::PolicyUser,
};

/// One runtime block instance.
#[derive(Debug, Clone)]
pub struct BlockNode {
    pub uuid: Uuid,
    pub block_type: String,
    pub tag: String,
    pub permissions: Vec<String>,
    pub default_active: bool,
    /// Static, type-specific options from the config.
    pub options: serde_json::Value,
    /// Non-owning handle to the parent; `None` for the root.
    pub parent: Option<Uuid>,
    /// Children in configuration order.
    pub children: Vec<Uuid>,
}

impl BlockNode {
    /// Whether `user` may see and drive this block.
    ///
    /// Virtual users are only admitted under dry-run. An empty permission
    /// list admits everyone; otherwise the sentinels `OWNER`, `ANY_ROLE` and
    /// `NO_ROLE` are checked before literal role names.
    pub fn is_available(&self, user: &PolicyUser, policy_owner: &str, dry_run: bool) -> bool {
        if user.is_virtual && !dry_run {
            return false;
        }
        if self.permissions.is_empty() {
            return true;
        }
        self.permissions.iter().any(|p| match p.as_str() {
            ROLE_OWNER => user.did == policy_owner,
            ROLE_ANY => user.role.is_some(),
            ROLE_NONE => user.role.is_none(),
            role => user.role.as_deref() == Some(role),
        })
    }
}

/// An immutable arena of block nodes rooted at one container.
#[derive(Debug, Clone)]
pub struct BlockTree {
    root: Uuid,
    nodes: HashMap<Uuid, BlockNode>,
}

impl BlockTree {
    /// Build the runtime tree from a declarative config.
    ///
    /// Fails on duplicate uuids — the caller is expected to have run
    /// `regenerate_ids` or structural validation first.
    pub fn from_config(config: &BlockConfig) -> EngineResult<Self> {
        let mut nodes = HashMap::new();
        Self::insert(config, None, &mut nodes)?;
        Ok(Self {
            root: config.id,
            nodes,
        })
    }

    fn insert(
        config: &BlockConfig,
        parent: Option<Uuid>,
        nodes: &mut HashMap<Uuid, BlockNode>,
    ) -> EngineResult<()> {
        let node = BlockNode {
            uuid: config.id,
            block_type: config.block_type.clone(),
            tag: config.tag.clone(),
            permissions: config.permissions.clone(),
            default_active: config.default_active,
            options: config.options.clone(),
            parent,
            children: config.children.iter().map(|c| c.id).collect(),
        };
        if nodes.insert(config.id, node).is_some() {
            return Err(EngineError::validation(format!(
                "duplicate block id '{}' in policy config",
                config.id
            )));
        }
        for child in &config.children {
            Self::insert(child, Some(config.id), nodes)?;
        }
        Ok(())
    }

    pub fn root(&self) -> &BlockNode {
        // The root uuid is inserted in from_config and never removed.
        &self.nodes[&self.root]
    }

    pub fn get(&self, uuid: Uuid) -> Option<&BlockNode> {
        self.nodes.get(&uuid)
    }

    /// Node lookup that fails with `NotFound` for foreign uuids.
    pub fn node(&self, uuid: Uuid) -> EngineResult<&BlockNode> {
        self.nodes
            .get(&uuid)
            .ok_or_else(|| EngineError::not_found(format!("block '{uuid}' does not exist")))
    }

    /// The block itself followed by its ancestors up to the root.
    pub fn parents(&self, uuid: Uuid) -> EngineResult<Vec<Uuid>> {
        let mut chain = Vec::new();
        let mut cursor = Some(self.node(uuid)?);
        while let Some(node) = cursor {
            chain.push(node.uuid);
            cursor = node.parent.and_then(|p| self.nodes.get(&p));
        }
        Ok(chain)
    }

    /// All nodes in depth-first configuration order, parents first.
    pub fn walk(&self) -> Vec<&BlockNode> {
        let mut out = Vec::with_capacity(self.nodes.len());
        self.walk_from(self.root, &mut out);
        out
    }

    fn walk_from<'a>(&'a self, uuid: Uuid, out: &mut Vec<&'a BlockNode>) {
        if let Some(node) = self.nodes.get(&uuid) {
            out.push(node);
            for child in &node.children {
                self.walk_from(*child, out);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verdant_contracts::user::PolicyUser;

    fn sample_config() -> BlockConfig {
        BlockConfig::new("interfaceContainerBlock", "root").with_children(vec![
            BlockConfig::new("policyRolesBlock", "choose_role")
                .with_permissions(&["NO_ROLE"])
                .with_options(json!({ "roles": ["Farmer"] })),
            BlockConfig::new("informationBlock", "welcome").with_permissions(&["ANY_ROLE"]),
        ])
    }

    fn user(role: Option<&str>) -> PolicyUser {
        PolicyUser {
            id: "did:user".into(),
            did: "did:user".into(),
            username: "user".into(),
            role: role.map(str::to_string),
            group: None,
            is_virtual: false,
        }
    }

    #[test]
    fn builds_arena_with_parent_handles() {
        let config = sample_config();
        let tree = BlockTree::from_config(&config).unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.root().tag, "root");

        let child = tree.root().children[0];
        assert_eq!(tree.get(child).unwrap().parent, Some(tree.root().uuid));
    }

    #[test]
    fn parents_chain_starts_at_self() {
        let config = sample_config();
        let tree = BlockTree::from_config(&config).unwrap();
        let child = tree.root().children[1];
        let chain = tree.parents(child).unwrap();
        assert_eq!(chain, vec![child, tree.root().uuid]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut config = sample_config();
        let id = config.id;
        config.children[0].id = id;
        assert!(BlockTree::from_config(&config).is_err());
    }

    #[test]
    fn foreign_uuid_is_not_found() {
        let tree = BlockTree::from_config(&sample_config()).unwrap();
        assert!(matches!(
            tree.node(Uuid::new_v4()),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn permission_sentinels_resolve() {
        let config = sample_config();
        let tree = BlockTree::from_config(&config).unwrap();
        let roles_block = tree.get(tree.root().children[0]).unwrap();
        let info_block = tree.get(tree.root().children[1]).unwrap();

        assert!(roles_block.is_available(&user(None), "did:owner", false));
        assert!(!roles_block.is_available(&user(Some("Farmer")), "did:owner", false));
        assert!(info_block.is_available(&user(Some("Farmer")), "did:owner", false));
        assert!(!info_block.is_available(&user(None), "did:owner", false));
    }

    #[test]
    fn virtual_users_are_rejected_outside_dry_run() {
        let tree = BlockTree::from_config(&sample_config()).unwrap();
        let mut virt = user(Some("Farmer"));
        virt.is_virtual = true;
        let info = tree.get(tree.root().children[1]).unwrap();
        assert!(!info.is_available(&virt, "did:owner", false));
        assert!(info.is_available(&virt, "did:owner", true));
    }
}
