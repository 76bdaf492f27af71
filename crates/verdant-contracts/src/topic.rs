//! Ledger topic and message envelope types.
//!
//! A topic is an append-only message stream identified by a topic id.
//! Messages are immutable; version chaining happens through
//! `previous_message_id`. The engine never talks to a real ledger directly —
//! these types cross the `LedgerTransport` trait boundary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classifies what a topic is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopicKind {
    /// A user's personal root topic.
    UserTopic,
    /// The policy's own topic, allocated on first creation.
    PolicyTopic,
    /// A per-publication instance topic.
    InstancePolicyTopic,
    /// A contract's topic.
    ContractTopic,
}

/// A topic record as tracked by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub topic_id: String,
    pub kind: TopicKind,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub policy_id: Option<String>,
    pub policy_uuid: Option<Uuid>,
    /// Parent topic id, set when two topics are linked bidirectionally.
    pub parent: Option<String>,
}

/// Message payload classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Policy,
    InstancePolicy,
    Schema,
}

/// What the message does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageAction {
    CreatePolicy,
    PublishPolicy,
    PublishSystemSchema,
}

/// An immutable ledger record.
///
/// `attachment` carries the compressed policy archive on publish messages;
/// it is skipped during JSON document serialization of listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicMessage {
    /// Transport-assigned message id.
    pub id: String,
    pub topic_id: String,
    pub message_type: MessageType,
    pub action: MessageAction,
    /// The JSON document describing the subject (e.g. the policy meta).
    pub document: serde_json::Value,
    /// Optional binary attachment (the policy archive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Vec<u8>>,
    pub previous_message_id: Option<String>,
    /// Version carried by publish messages, used for upgrade hints.
    pub version: Option<String>,
}

impl TopicMessage {
    /// Build an unsent message. The transport assigns `id` on send.
    pub fn new(
        message_type: MessageType,
        action: MessageAction,
        document: serde_json::Value,
    ) -> Self {
        Self {
            id: String::new(),
            topic_id: String::new(),
            message_type,
            action,
            document,
            attachment: None,
            previous_message_id: None,
            version: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Vec<u8>) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}
