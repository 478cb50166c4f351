//! Error types for store and service operations.

use lineup_rank::{Rank, RankError};
use lineup_types::{ItemId, ScopeId};
use thiserror::Error;

/// Errors that can occur while reading or writing ranks.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Target rank is already held by another item in the scope.
    ///
    /// Recoverable: recompute the midpoint against fresh neighbours.
    #[error("rank {rank} already taken in scope {scope_id}")]
    Conflict {
        scope_id: ScopeId,
        rank: Rank,
        holder: Option<ItemId>,
    },

    /// Item not present in the scope.
    #[error("item {item_id} not found in scope {scope_id}")]
    NotFound { scope_id: ScopeId, item_id: ItemId },

    /// Item already present in the scope.
    #[error("item {item_id} already exists in scope {scope_id}")]
    Duplicate { scope_id: ScopeId, item_id: ItemId },

    /// A rebalance batch no longer matches the scope's membership.
    #[error("rebalance batch is stale for scope {scope_id}")]
    StaleBatch { scope_id: ScopeId },

    /// Rank generation failed (including `Exhausted`).
    #[error(transparent)]
    Rank(#[from] RankError),

    /// SQLite error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

