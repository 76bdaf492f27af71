//! # verdant-sync
//!
//! Contract synchronization for the verdant engine: a worker queue that
//! carries every on-ledger contract call, and an adapter that reconciles
//! on-ledger pair and wipe-request state into locally cached contract
//! documents.

pub mod adapter;
pub mod worker;

pub use adapter::{ContractStore, ContractSyncAdapter, InMemoryContractStore};
pub use worker::{ContractTask, WorkerQueue, RETRY_ATTEMPTS};
