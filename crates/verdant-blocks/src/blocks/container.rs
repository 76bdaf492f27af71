//! `interfaceContainerBlock` — groups child blocks into one UI unit.

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

/// Pure grouping block. Its visible output is the list of children the
/// acting user is allowed to see; writes are not part of its contract.
pub struct InterfaceContainerBlock;

#[async_trait]
impl BlockBehavior for InterfaceContainerBlock {
    fn block_type(&self) -> &'static str {
        "interfaceContainerBlock"
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Container
    }

    async fn get_data(
        &self,
        ctx: &BlockContext<'_>,
        user: &PolicyUser,
    ) -> EngineResult<BlockGetOutput> {
        let children: Vec<serde_json::Value> = ctx
            .node
            .children
            .iter()
            .filter_map(|uuid| ctx.tree.get(*uuid))
            .filter(|child| child.is_available(user, ctx.policy_owner, ctx.dry_run))
            .map(|child| {
                json!({
                    "id": child.uuid,
                    "blockType": child.block_type,
                    "tag": child.tag,
                })
            })
            .collect();

        Ok(BlockGetOutput::data(json!({
            "id": ctx.node.uuid,
            "blockType": self.block_type(),
            "uiMetaData": ctx.node.options.get("uiMetaData").cloned().unwrap_or_default(),
            "blocks": children,
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
