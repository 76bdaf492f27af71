//! `policyRolesBlock` — lets a user without a role pick one.

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

/// Role chooser. Options carry the offered role names; a successful write
/// records the group assignment and reports the new role so the engine can
/// notify the user's other sessions.
pub struct PolicyRolesBlock;

fn offered_roles(node: &BlockNode) -> Vec<String> {
    node.options
        .get("roles")
        .and_then(serde_json::Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(serde_json::Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl BlockBehavior for PolicyRolesBlock {
    fn block_type(&self) -> &'static str {
        "policyRolesBlock"
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
            "roles": offered_roles(ctx.node),
            "uiMetaData": ctx.node.options.get("uiMetaData").cloned().unwrap_or_default(),
        })))
    }

    async fn set_data(
        &self,
        ctx: &BlockContext<'_>,
        user: &PolicyUser,
        data: serde_json::Value,
    ) -> EngineResult<BlockSetOutput> {
        let role = data
            .get("role")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                EngineError::block_runtime(self.block_type(), "expected a 'role' field")
            })?;

        if !offered_roles(ctx.node).iter().any(|r| r == role) {
            return Err(EngineError::block_runtime(
                self.block_type(),
                format!("role '{role}' is not offered by block '{}'", ctx.node.tag),
            ));
        }

        let group = data
            .get("group")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("default");
        ctx.services.assign_role(user, role, group).await?;

        let mut out = BlockSetOutput::response(json!({ "role": role, "group": group }));
        out.new_role = Some(role.to_string());
        Ok(out)
    }

    fn validate(&self, node: &BlockNode, _tree: &BlockTree, result: &mut BlockValidationResult) {
        if offered_roles(node).is_empty() {
            result.add_error("roles block offers no roles");
        }
    }
}
