//! Engine event variants.
//!
//! The state core emits these through the injected `EventBus` after every
//! effective change. `DataChanged` is addressed to one user; `External` is
//! the structured audit/integration record; `BlockError` is the block-scoped
//! error path that never crashes the engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What triggered an external event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExternalEventType {
    Get,
    Set,
    Run,
}

/// A structured record for audit/integration consumers, emitted alongside
/// (never instead of) the user-addressed `DataChanged` notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub event_type: ExternalEventType,
    pub policy_id: String,
    pub block_uuid: Uuid,
    pub block_type: String,
    pub block_tag: String,
    /// The acting user.
    pub user_id: String,
    pub data: serde_json::Value,
}

/// Typed events fanned out by the engine's event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A block's visible output changed for one user. Emitted only after
    /// the causing state was durably persisted.
    DataChanged {
        policy_id: String,
        block_uuid: Uuid,
        user_id: String,
        state: serde_json::Value,
    },

    /// A block's own logic failed; addressed to the requesting user.
    BlockError {
        policy_id: String,
        block_type: String,
        user_id: String,
        message: String,
    },

    /// A user's policy role changed (e.g. after joining a group).
    UserInfoUpdated {
        policy_id: String,
        user_id: String,
        user_role: Option<String>,
    },

    /// Structured audit/integration record.
    External(ExternalEvent),
}
