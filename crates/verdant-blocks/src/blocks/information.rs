//! `informationBlock` — static text from the block options.

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

pub struct InformationBlock;

#[async_trait]
impl BlockBehavior for InformationBlock {
    fn block_type(&self) -> &'static str {
        "informationBlock"
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Interface
    }

    async fn get_data(
        &self,
        ctx: &BlockContext<'_>,
        _user: &PolicyUser,
    ) -> EngineResult<BlockGetOutput> {
        Ok(BlockGetOutput::data(json!({
            "id": ctx.node.uuid,
            "blockType": self.block_type(),
            "title": ctx.node.options.get("title").cloned().unwrap_or_default(),
            "description": ctx.node.options.get("description").cloned().unwrap_or_default(),
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
