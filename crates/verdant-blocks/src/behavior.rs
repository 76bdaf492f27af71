//! The block behavior contract.
//!
//! A `BlockBehavior` is the stateless logic for one block type. The engine's
//! state core loads the per-(block, user) state, hands it to the behavior
//! through `BlockContext`, and is alone responsible for persisting whatever
//! state the behavior returns — behaviors never write storage directly, so
//! the persist-then-notify ordering is enforced in exactly one place.

use async_trait::async_trait;
use uuid::Uuid;
use verdant_contracts::{
    block::BlockKind,
    error::EngineResult,
    user::PolicyUser,
    validation::BlockValidationResult,
};

use crate::tree::{BlockNode, BlockTree};

/// Paging parameters for source queries.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub items_per_page: u64,
    pub page: u64,
}

/// Engine services a behavior may call while handling a request.
///
/// Implemented by the engine crate over its document store and group
/// assignments. Behaviors see only this trait, never the store itself.
#[async_trait]
pub trait BlockServices: Send + Sync {
    /// Documents matching a source block's configured filters, visible to
    /// `user`, optionally narrowed to one page.
    async fn query_documents(
        &self,
        node: &BlockNode,
        user: &PolicyUser,
        page: Option<Page>,
    ) -> EngineResult<Vec<serde_json::Value>>;

    /// Total number of documents the source block would return unpaged.
    async fn count_documents(&self, node: &BlockNode, user: &PolicyUser) -> EngineResult<u64>;

    /// Persist a document produced by an action block.
    async fn save_document(
        &self,
        node: &BlockNode,
        user: &PolicyUser,
        document: serde_json::Value,
    ) -> EngineResult<()>;

    /// Record a policy role assignment for `user`.
    async fn assign_role(&self, user: &PolicyUser, role: &str, group: &str) -> EngineResult<()>;
}

/// Everything a behavior needs to handle one request.
pub struct BlockContext<'a> {
    pub policy_id: &'a str,
    pub policy_owner: &'a str,
    pub dry_run: bool,
    pub tree: &'a BlockTree,
    /// The block being driven.
    pub node: &'a BlockNode,
    /// This block's persisted state for the acting user, if any.
    pub state: Option<serde_json::Value>,
    pub services: &'a dyn BlockServices,
}

impl BlockContext<'_> {
    /// The parent node, when the block has one.
    pub fn parent(&self) -> Option<&BlockNode> {
        self.node.parent.and_then(|p| self.tree.get(p))
    }
}

/// Result of a read.
pub struct BlockGetOutput {
    /// The visible output returned to the caller.
    pub data: serde_json::Value,
    /// Updated per-user state to persist, when the read recomputed it.
    pub new_state: Option<serde_json::Value>,
}

impl BlockGetOutput {
    pub fn data(data: serde_json::Value) -> Self {
        Self {
            data,
            new_state: None,
        }
    }
}

/// Result of a write.
pub struct BlockSetOutput {
    /// The response returned to the caller.
    pub response: serde_json::Value,
    /// Updated per-user state to persist before any notification.
    pub new_state: Option<serde_json::Value>,
    /// Block whose visible output the write affected. `None` means the
    /// block itself; addons that hold paging state for a parent point here.
    pub update_block: Option<Uuid>,
    /// Set when the write changed the acting user's policy role.
    pub new_role: Option<String>,
}

impl BlockSetOutput {
    pub fn response(response: serde_json::Value) -> Self {
        Self {
            response,
            new_state: None,
            update_block: None,
            new_role: None,
        }
    }

    pub fn with_state(mut self, state: serde_json::Value) -> Self {
        self.new_state = Some(state);
        self
    }
}

/// Stateless logic for one block type.
///
/// Implementations must not hold per-user or per-policy state: one behavior
/// instance serves every generated policy in the process.
#[async_trait]
pub trait BlockBehavior: Send + Sync {
    /// The block-type tag this behavior handles.
    fn block_type(&self) -> &'static str;

    fn kind(&self) -> BlockKind;

    /// Container-class blocks are always treated as changed after a write
    /// anywhere beneath them (coarse invalidation).
    fn always_changed(&self) -> bool {
        matches!(self.kind(), BlockKind::Container)
    }

    /// Compute the block's visible output for `user`.
    async fn get_data(
        &self,
        ctx: &BlockContext<'_>,
        user: &PolicyUser,
    ) -> EngineResult<BlockGetOutput>;

    /// Apply a write from `user`.
    async fn set_data(
        &self,
        ctx: &BlockContext<'_>,
        user: &PolicyUser,
        data: serde_json::Value,
    ) -> EngineResult<BlockSetOutput>;

    /// Publish-time semantic validation of the block's static options.
    fn validate(&self, node: &BlockNode, tree: &BlockTree, result: &mut BlockValidationResult);
}
