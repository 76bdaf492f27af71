//! `calculateContainerBlock` — aggregates a numeric field over a source's
//! documents.

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

/// Derived-value block. Reads every document its configured source filters
/// admit, extracts `options.field` from each, and reports sum and count.
pub struct CalculateContainerBlock;

fn field_name(node: &BlockNode) -> Option<&str> {
    node.options.get("field").and_then(serde_json::Value::as_str)
}

fn extract(document: &serde_json::Value, field: &str) -> Option<f64> {
    document
        .get("document")
        .unwrap_or(document)
        .get(field)
        .and_then(serde_json::Value::as_f64)
}

#[async_trait]
impl BlockBehavior for CalculateContainerBlock {
    fn block_type(&self) -> &'static str {
        "calculateContainerBlock"
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Calculate
    }

    async fn get_data(
        &self,
        ctx: &BlockContext<'_>,
        user: &PolicyUser,
    ) -> EngineResult<BlockGetOutput> {
        let field = field_name(ctx.node).ok_or_else(|| {
            EngineError::block_runtime(self.block_type(), "no 'field' option configured")
        })?;

        let documents = ctx.services.query_documents(ctx.node, user, None).await?;
        let values: Vec<f64> = documents.iter().filter_map(|d| extract(d, field)).collect();
        let sum: f64 = values.iter().sum();

        Ok(BlockGetOutput::data(json!({
            "id": ctx.node.uuid,
            "blockType": self.block_type(),
            "field": field,
            "sum": sum,
            "count": values.len(),
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

    fn validate(&self, node: &BlockNode, _tree: &BlockTree, result: &mut BlockValidationResult) {
        if field_name(node).map_or(true, str::is_empty) {
            result.add_error("calculate block has no 'field' option");
        }
    }
}
