//! Authoritative rank storage for lineup.
//!
//! This crate is the host side of the ordering protocol: where ranks are
//! persisted, where writes to one scope are serialized, and where a crowded
//! scope gets respaced.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ OrderService                                  │
//! │   scope_items / move_item / insert_item       │
//! │   remove_item / rebalance_scope / subscribe   │
//! │        │                      │               │
//! │        ▼                      ▼               │
//! │   per-scope Mutex         Rebalancer          │
//! │        │                      │               │
//! │        └──────────┬───────────┘               │
//! │                   ▼                           │
//! │        dyn OrderStore                         │
//! │   MemoryOrderStore | SqliteOrderStore         │
//! └───────────────────────────────────────────────┘
//! ```

pub mod constants;
mod error;
mod memory;
mod rebalancer;
mod service;
mod sqlite;
mod store;

pub use error::StoreError;
pub use memory::MemoryOrderStore;
pub use rebalancer::{RebalancePolicy, Rebalancer};
pub use service::{OrderService, ServiceConfig};
pub use sqlite::SqliteOrderStore;
pub use store::OrderStore;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
