//! Block-type tag to behavior resolution.
//!
//! Behaviors are stateless singletons; the factory hands out shared handles
//! so a generated policy never carries behavior state of its own.

use std::sync::Arc;

use crate::behavior::BlockBehavior;
use crate::blocks::{
    CalculateContainerBlock, DocumentsSourceAddon, InformationBlock, InterfaceContainerBlock,
    InterfaceStepBlock, PaginationAddon, PolicyRolesBlock, RequestVcDocumentBlock,
};

/// Every block-type tag the engine can instantiate.
pub const KNOWN_BLOCK_TYPES: &[&str] = &[
    "interfaceContainerBlock",
    "interfaceStepBlock",
    "policyRolesBlock",
    "informationBlock",
    "requestVcDocumentBlock",
    "documentsSourceAddon",
    "paginationAddon",
    "calculateContainerBlock",
];

/// Resolve a block-type tag to its behavior, or `None` for unknown tags.
pub fn behavior(block_type: &str) -> Option<Arc<dyn BlockBehavior>> {
    let behavior: Arc<dyn BlockBehavior> = match block_type {
        "interfaceContainerBlock" => Arc::new(InterfaceContainerBlock),
        "interfaceStepBlock" => Arc::new(InterfaceStepBlock),
        "policyRolesBlock" => Arc::new(PolicyRolesBlock),
        "informationBlock" => Arc::new(InformationBlock),
        "requestVcDocumentBlock" => Arc::new(RequestVcDocumentBlock),
        "documentsSourceAddon" => Arc::new(DocumentsSourceAddon),
        "paginationAddon" => Arc::new(PaginationAddon),
        "calculateContainerBlock" => Arc::new(CalculateContainerBlock),
        _ => return None,
    };
    Some(behavior)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_known_type_resolves() {
        for block_type in KNOWN_BLOCK_TYPES {
            let b = behavior(block_type).unwrap();
            assert_eq!(b.block_type(), *block_type);
        }
    }

    #[test]
    fn unknown_type_is_none() {
        assert!(behavior("externalDataBlock").is_none());
    }
}
