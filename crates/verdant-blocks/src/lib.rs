//! # verdant-blocks
//!
//! The block layer of the verdant policy engine.
//!
//! This crate provides:
//! - The runtime block tree (`BlockTree`), rebuilt from declarative
//!   `BlockConfig` on every generation
//! - The `BlockBehavior` trait and one behavior per supported block type
//! - The behavior factory that resolves block-type tags to behaviors
//! - The process-wide `ComponentRegistry` of generated policy instances
//! - Structural and semantic tree validation
//!
//! Behaviors are stateless: all per-user block state lives in the engine's
//! state core and is handed to a behavior through `BlockContext`.

pub mod behavior;
pub mod blocks;
pub mod factory;
pub mod registry;
pub mod tree;
pub mod validators;

pub use behavior::{BlockBehavior, BlockContext, BlockGetOutput, BlockServices, BlockSetOutput};
pub use registry::{ComponentRegistry, PolicyInstance};
pub use tree::{BlockNode, BlockTree};
