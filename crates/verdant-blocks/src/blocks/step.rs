//! `interfaceStepBlock` — a wizard over its children, one active at a time.

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

/// Step container. Per-user state is `{ "index": n }`, clamped to the child
/// list. Writes move the cursor with `"action": "next" | "prev"` or an
/// explicit `"index"`.
pub struct InterfaceStepBlock;

fn current_index(state: Option<&serde_json::Value>) -> u64 {
    state
        .and_then(|s| s.get("index"))
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0)
}

#[async_trait]
impl BlockBehavior for InterfaceStepBlock {
    fn block_type(&self) -> &'static str {
        "interfaceStepBlock"
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Container
    }

    async fn get_data(
        &self,
        ctx: &BlockContext<'_>,
        _user: &PolicyUser,
    ) -> EngineResult<BlockGetOutput> {
        let index = current_index(ctx.state.as_ref()).min(ctx.node.children.len() as u64);
        Ok(BlockGetOutput::data(json!({
            "id": ctx.node.uuid,
            "blockType": self.block_type(),
            "index": index,
            "blocks": ctx.node.children,
        })))
    }

    async fn set_data(
        &self,
        ctx: &BlockContext<'_>,
        _user: &PolicyUser,
        data: serde_json::Value,
    ) -> EngineResult<BlockSetOutput> {
        let last = ctx.node.children.len().saturating_sub(1) as u64;
        let index = current_index(ctx.state.as_ref());

        let next = match data.get("action").and_then(serde_json::Value::as_str) {
            Some("next") => index.saturating_add(1).min(last),
            Some("prev") => index.saturating_sub(1),
            _ => match data.get("index").and_then(serde_json::Value::as_u64) {
                Some(explicit) if explicit <= last => explicit,
                Some(explicit) => {
                    return Err(EngineError::block_runtime(
                        self.block_type(),
                        format!("step index {explicit} is out of range (max {last})"),
                    ))
                }
                None => {
                    return Err(EngineError::block_runtime(
                        self.block_type(),
                        "expected an 'action' or 'index' field",
                    ))
                }
            },
        };

        Ok(BlockSetOutput::response(json!({ "index": next }))
            .with_state(json!({ "index": next })))
    }

    fn validate(&self, node: &BlockNode, _tree: &BlockTree, result: &mut BlockValidationResult) {
        if node.children.is_empty() {
            result.add_error("step block has no children to step through");
        }
    }
}
