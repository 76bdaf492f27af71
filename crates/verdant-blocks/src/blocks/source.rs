//! `documentsSourceAddon` — lists stored documents matching the block's
//! filters.

use async_trait::async_trait;
use serde_json::json;
use verdant_contracts::{
    block::BlockKind,
    error::{EngineError, EngineResult},
    user::PolicyUser,
    validation::BlockValidationResult,
};

use crate::behavior::{BlockBehavior, BlockContext, BlockGetOutput, BlockSetOutput, Page};
use crate::tree::{BlockNode, BlockTree};

/// Read-only document listing. When a `paginationAddon` child holds paging
/// state for the acting user, the engine passes that page through the
/// context state; otherwise the full result set is returned.
pub struct DocumentsSourceAddon;

fn page_from_state(state: Option<&serde_json::Value>) -> Option<Page> {
    let state = state?;
    Some(Page {
        items_per_page: state.get("itemsPerPage")?.as_u64()?,
        page: state.get("page")?.as_u64()?,
    })
}

#[async_trait]
impl BlockBehavior for DocumentsSourceAddon {
    fn block_type(&self) -> &'static str {
        "documentsSourceAddon"
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Source
    }

    async fn get_data(
        &self,
        ctx: &BlockContext<'_>,
        user: &PolicyUser,
    ) -> EngineResult<BlockGetOutput> {
        let page = page_from_state(ctx.state.as_ref());
        let documents = ctx.services.query_documents(ctx.node, user, page).await?;
        let total = ctx.services.count_documents(ctx.node, user).await?;

        Ok(BlockGetOutput::data(json!({
            "id": ctx.node.uuid,
            "blockType": self.block_type(),
            "data": documents,
            "total": total,
            "fields": ctx.node.options.get("fields").cloned().unwrap_or_default(),
        })))
    }

    async fn set_data(
        &self,
        ctx: &BlockContext<'_>,
        _user: &PolicyUser,
        _data: serde_json::Value,
    ) -> EngineResult<BlockSetOutput> {
        Err(EngineError::block_runtime(
            self.block_type(),
            format!("block '{}' does not accept data", ctx.node.tag),
        ))
    }

    fn validate(&self, _node: &BlockNode, _tree: &BlockTree, _result: &mut BlockValidationResult) {}
}
