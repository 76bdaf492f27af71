//! `paginationAddon` — per-user paging state for a parent source block.

use async_trait::async_trait;
use serde_json::json;
use verdant_contracts::{
    block::BlockKind,
    error::{EngineError, EngineResult},
    user::PolicyUser,
    validation::BlockValidationResult,
};

use crate::behavior::{BlockBehavior, BlockContext, BlockGetOutput, BlockSetOutput};
use crate::tree::{BlockNode, BlockTree};

const DEFAULT_ITEMS_PER_PAGE: u64 = 10;

/// Paging addon. Holds `{ size, itemsPerPage, page }` per user; `size` is
/// recomputed from the parent source's unpaged total on every read, and a
/// write re-evaluates the parent rather than the addon itself.
pub struct PaginationAddon;

impl PaginationAddon {
    /// Default paging state for a fresh user.
    pub fn default_state() -> serde_json::Value {
        json!({
            "size": 0,
            "itemsPerPage": DEFAULT_ITEMS_PER_PAGE,
            "page": 0,
        })
    }
}

#[async_trait]
impl BlockBehavior for PaginationAddon {
    fn block_type(&self) -> &'static str {
        "paginationAddon"
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Addon
    }

    async fn get_data(
        &self,
        ctx: &BlockContext<'_>,
        user: &PolicyUser,
    ) -> EngineResult<BlockGetOutput> {
        let parent = ctx.parent().ok_or_else(|| {
            EngineError::block_runtime(self.block_type(), "pagination addon has no parent")
        })?;
        let size = ctx.services.count_documents(parent, user).await?;

        let mut state = ctx.state.clone().unwrap_or_else(Self::default_state);
        if let Some(obj) = state.as_object_mut() {
            obj.insert("size".to_string(), json!(size));
        }

        Ok(BlockGetOutput {
            data: state.clone(),
            new_state: Some(state),
        })
    }

    async fn set_data(
        &self,
        ctx: &BlockContext<'_>,
        _user: &PolicyUser,
        data: serde_json::Value,
    ) -> EngineResult<BlockSetOutput> {
        let previous = ctx.state.clone().unwrap_or_else(Self::default_state);
        let items_per_page = data
            .get("itemsPerPage")
            .and_then(serde_json::Value::as_u64)
            .or_else(|| previous.get("itemsPerPage").and_then(serde_json::Value::as_u64))
            .unwrap_or(DEFAULT_ITEMS_PER_PAGE);
        let page = data
            .get("page")
            .and_then(serde_json::Value::as_u64)
            .or_else(|| previous.get("page").and_then(serde_json::Value::as_u64))
            .unwrap_or(0);
        let size = previous
            .get("size")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);

        let state = json!({
            "size": size,
            "itemsPerPage": items_per_page,
            "page": page,
        });

        let mut out = BlockSetOutput::response(state.clone()).with_state(state);
        // Paging changes what the parent source shows, not the addon.
        out.update_block = ctx.node.parent;
        Ok(out)
    }

    fn validate(&self, node: &BlockNode, tree: &BlockTree, result: &mut BlockValidationResult) {
        match node.parent.and_then(|p| tree.get(p)) {
            Some(parent) if parent.block_type == "documentsSourceAddon" => {}
            Some(parent) => result.add_error(format!(
                "pagination addon must sit under a documents source, found '{}'",
                parent.block_type
            )),
            None => result.add_error("pagination addon has no parent"),
        }
    }
}
