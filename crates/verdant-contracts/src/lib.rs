//! # verdant-contracts
//!
//! Shared types, schemas, and contracts for the verdant policy engine.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate — only data definitions, the error taxonomy, and small pure
//! helpers (version ordering, schema-set comparison).

pub mod block;
pub mod contract;
pub mod error;
pub mod events;
pub mod policy;
pub mod schema;
pub mod topic;
pub mod user;
pub mod validation;
pub mod version;

#[cfg(test)]
mod tests {
    use super::*;
    use error::EngineError;
    use policy::PolicyStatus;
    use version::{check_version_format, version_compare};

    // ── Version helpers ──────────────────────────────────────────────────────

    #[test]
    fn version_format_accepts_three_part_versions() {
        assert!(check_version_format("1.0.0"));
        assert!(check_version_format("0.9.12"));
        assert!(!check_version_format(""));
        assert!(!check_version_format("one.two.three"));
        assert!(!check_version_format("1.0"));
    }

    #[test]
    fn version_compare_orders_semantically() {
        assert_eq!(version_compare("1.1.0", "1.0.0"), 1);
        assert_eq!(version_compare("1.0.0", "1.0.0"), 0);
        assert_eq!(version_compare("0.9.0", "1.0.0"), -1);
        // Numeric compare, not lexicographic.
        assert_eq!(version_compare("1.10.0", "1.9.0"), 1);
    }

    #[test]
    fn version_compare_treats_empty_previous_as_lowest() {
        // A first publish has no previous version on record.
        assert_eq!(version_compare("1.0.0", ""), 1);
    }

    // ── PolicyStatus serde round-trip ────────────────────────────────────────

    #[test]
    fn policy_status_round_trips() {
        for status in [PolicyStatus::Draft, PolicyStatus::DryRun, PolicyStatus::Publish] {
            let json = serde_json::to_string(&status).unwrap();
            let decoded: PolicyStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(status, decoded);
        }
    }

    // ── Error display messages ───────────────────────────────────────────────

    #[test]
    fn error_permission_display() {
        let err = EngineError::permission("only Standard Registry may impersonate");
        let msg = err.to_string();
        assert!(msg.contains("permission denied"));
        assert!(msg.contains("Standard Registry"));
    }

    #[test]
    fn error_not_found_display() {
        let err = EngineError::not_found("policy 'p1' is not registered");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn error_transport_display() {
        let err = EngineError::transport("topic create rejected");
        let msg = err.to_string();
        assert!(msg.contains("ledger transport failure"));
        assert!(msg.contains("topic create rejected"));
    }
}
