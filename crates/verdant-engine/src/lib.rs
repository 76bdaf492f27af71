//! # verdant-engine
//!
//! The runtime core of the verdant policy engine.
//!
//! This crate provides:
//! - The collaborator traits (`LedgerTransport`, `DocumentStore`,
//!   `SchemaRegistry`, `CredentialIssuer`, `UserDirectory`, `EventBus`)
//! - The `StateCore` that serializes block writes and enforces the
//!   persist-then-notify ordering
//! - The `UserResolver` that handles dry-run impersonation
//! - In-memory collaborator implementations for demos and tests

pub mod memory;
pub mod state;
pub mod traits;
pub mod users;

pub use state::StateCore;
pub use traits::{
    CredentialIssuer, DocumentQuery, DocumentStore, EventBus, LedgerAccount, LedgerTransport,
    SchemaRegistry, UserDirectory,
};
pub use users::UserResolver;
