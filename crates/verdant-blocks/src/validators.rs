//! Whole-tree validation.
//!
//! Runs before publish and dry-run. Structural checks (empty config,
//! unknown types, duplicate tags and uuids) land in tree-level errors;
//! each block's behavior then validates its own static options.

use std::collections::HashSet;

use tracing::debug;
use verdant_contracts::{
    policy::Policy,
    validation::{BlockValidationResult, ValidationReport},
};

use crate::factory;
use crate::tree::BlockTree;

/// Validate a policy's block tree and collect the full report.
///
/// Never fails: a broken tree produces a report that refuses publication,
/// not an error.
pub fn validate_policy(policy: &Policy) -> ValidationReport {
    let mut report = ValidationReport::default();

    let config = match &policy.config {
        Some(config) => config,
        None => {
            report.add_error("the policy is empty");
            return report;
        }
    };

    let mut uuids = HashSet::new();
    let mut tags = HashSet::new();
    config.walk(&mut |block| {
        if !uuids.insert(block.id) {
            report.add_error(format!("duplicate block id '{}'", block.id));
        }
        if !tags.insert(block.tag.as_str()) {
            report.add_error(format!("duplicate block tag '{}'", block.tag));
        }
    });

    let tree = match BlockTree::from_config(config) {
        Ok(tree) => tree,
        // Duplicate ids were already reported above.
        Err(_) => return report,
    };

    for node in tree.walk() {
        let mut result = BlockValidationResult::valid(node.uuid, &node.tag, &node.block_type);
        match factory::behavior(&node.block_type) {
            Some(behavior) => behavior.validate(node, &tree, &mut result),
            None => result.add_error(format!("unknown block type '{}'", node.block_type)),
        }
        report.blocks.push(result);
    }

    debug!(
        policy_id = %policy.id,
        valid = report.is_valid(),
        blocks = report.blocks.len(),
        "policy validated"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verdant_contracts::block::BlockConfig;

    fn policy_with(config: BlockConfig) -> Policy {
        let mut policy = Policy::new_draft("Carbon", "did:owner");
        policy.config = Some(config);
        policy
    }

    #[test]
    fn empty_policy_is_invalid() {
        let policy = Policy::new_draft("Carbon", "did:owner");
        let report = validate_policy(&policy);
        assert!(!report.is_valid());
        assert_eq!(report.errors, vec!["the policy is empty".to_string()]);
    }

    #[test]
    fn valid_tree_produces_clean_report() {
        let policy = policy_with(
            BlockConfig::new("interfaceContainerBlock", "root").with_children(vec![
                BlockConfig::new("policyRolesBlock", "choose_role")
                    .with_options(json!({ "roles": ["Farmer"] })),
                BlockConfig::new("requestVcDocumentBlock", "report")
                    .with_options(json!({ "schema": "#report-schema" })),
            ]),
        );
        let report = validate_policy(&policy);
        assert!(report.is_valid());
        assert_eq!(report.blocks.len(), 3);
    }

    #[test]
    fn missing_options_are_block_errors() {
        let policy = policy_with(
            BlockConfig::new("interfaceContainerBlock", "root").with_children(vec![
                BlockConfig::new("policyRolesBlock", "choose_role"),
                BlockConfig::new("requestVcDocumentBlock", "report"),
            ]),
        );
        let report = validate_policy(&policy);
        assert!(!report.is_valid());
        assert_eq!(report.invalid_count(), 2);
    }

    #[test]
    fn misplaced_pagination_is_reported() {
        let policy = policy_with(
            BlockConfig::new("interfaceContainerBlock", "root")
                .with_children(vec![BlockConfig::new("paginationAddon", "pager")]),
        );
        let report = validate_policy(&policy);
        assert!(!report.is_valid());
        let pager = report.blocks.iter().find(|b| b.tag == "pager").unwrap();
        assert!(!pager.is_valid);
    }

    #[test]
    fn duplicate_tags_are_tree_errors() {
        let policy = policy_with(
            BlockConfig::new("interfaceContainerBlock", "root").with_children(vec![
                BlockConfig::new("informationBlock", "twin"),
                BlockConfig::new("informationBlock", "twin"),
            ]),
        );
        let report = validate_policy(&policy);
        assert!(!report.is_valid());
        assert!(report.errors.iter().any(|e| e.contains("duplicate block tag")));
    }
}
