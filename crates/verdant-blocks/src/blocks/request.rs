//! `requestVcDocumentBlock` — accepts a credential document from the user.

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

/// Document intake. The submitted document is stamped with the acting
/// user's did and the block's schema reference, then handed to the store
/// through the services trait.
pub struct RequestVcDocumentBlock;

fn schema_iri(node: &BlockNode) -> Option<&str> {
    node.options.get("schema").and_then(serde_json::Value::as_str)
}

#[async_trait]
impl BlockBehavior for RequestVcDocumentBlock {
    fn block_type(&self) -> &'static str {
        "requestVcDocumentBlock"
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Action
    }

    async fn get_data(
        &self,
        ctx: &BlockContext<'_>,
        _user: &PolicyUser,
    ) -> EngineResult<BlockGetOutput> {
        Ok(BlockGetOutput::data(json!({
            "id": ctx.node.uuid,
            "blockType": self.block_type(),
            "schema": schema_iri(ctx.node),
            "uiMetaData": ctx.node.options.get("uiMetaData").cloned().unwrap_or_default(),
        })))
    }

    async fn set_data(
        &self,
        ctx: &BlockContext<'_>,
        user: &PolicyUser,
        data: serde_json::Value,
    ) -> EngineResult<BlockSetOutput> {
        let document = data.get("document").cloned().ok_or_else(|| {
            EngineError::block_runtime(self.block_type(), "expected a 'document' field")
        })?;

        let record = json!({
            "owner": user.did,
            "group": user.group,
            "schema": schema_iri(ctx.node),
            "tag": ctx.node.tag,
            "document": document,
        });
        ctx.services.save_document(ctx.node, user, record).await?;

        Ok(BlockSetOutput::response(json!({ "status": "submitted" })))
    }

    fn validate(&self, node: &BlockNode, _tree: &BlockTree, result: &mut BlockValidationResult) {
        match schema_iri(node) {
            Some(iri) if !iri.is_empty() => {}
            _ => result.add_error("request block has no schema reference"),
        }
    }
}
