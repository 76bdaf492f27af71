//! Block validation report types.
//!
//! Publish and dry-run run every block's `validate` contract and collect the
//! results here. A report with any invalid block refuses the transition —
//! the caller gets the report back instead of a published policy.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Validation outcome for one block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockValidationResult {
    pub id: Uuid,
    pub tag: String,
    pub block_type: String,
    pub errors: Vec<String>,
    pub is_valid: bool,
}

impl BlockValidationResult {
    pub fn valid(id: Uuid, tag: impl Into<String>, block_type: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into(),
            block_type: block_type.into(),
            errors: Vec::new(),
            is_valid: true,
        }
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.is_valid = false;
    }
}

/// The full structural + semantic validation report for a policy tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Per-block results, in tree walk order.
    pub blocks: Vec<BlockValidationResult>,
    /// Tree-level errors not attributable to one block (duplicate tags,
    /// unknown block types, empty config).
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// True only when every block passed and no tree-level error exists.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.blocks.iter().all(|b| b.is_valid)
    }

    pub fn invalid_count(&self) -> usize {
        self.blocks.iter().filter(|b| !b.is_valid).count() + self.errors.len()
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }
}
