//! # verdant-lifecycle
//!
//! Policy lifecycle management for the verdant engine.
//!
//! This crate provides:
//! - The `LifecycleManager` owning every status transition (create,
//!   publish, dry-run, draft revert, restart, import/export)
//! - The gzip policy archive format
//! - Progress notifiers and the async task tracker
//! - The `PolicyEngineService` RPC surface, one method per external verb

pub mod archive;
pub mod manager;
pub mod notifier;
pub mod service;

pub use manager::LifecycleManager;
pub use notifier::{EmptyNotifier, Notifier, TaskTracker};
pub use service::{PolicyEngineService, TransitionResponse};
