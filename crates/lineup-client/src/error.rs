//! Error types for the client side of the ordering protocol.

use lineup_rank::RankError;
use lineup_store::StoreError;
use lineup_types::ItemId;
use thiserror::Error;

/// Why a request to the host did not produce a committed rank.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The host found the target rank taken, even after its own retry.
    #[error("rank conflict")]
    Conflict,
    /// The moved item (not a neighbour) no longer exists.
    #[error("item not found")]
    NotFound,
    /// No rank fits between the neighbours until the scope is rebalanced.
    #[error("key space exhausted")]
    Exhausted,
    /// No answer within the request deadline.
    #[error("request timed out")]
    Timeout,
    /// The host could not be reached or failed internally.
    #[error("host unavailable: {0}")]
    Unavailable(String),
    /// The host refused the request as malformed or stale.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl From<StoreError> for TransportError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => TransportError::Conflict,
            StoreError::NotFound { .. } => TransportError::NotFound,
            StoreError::Rank(RankError::Exhausted { .. }) => TransportError::Exhausted,
            e @ (StoreError::Duplicate { .. } | StoreError::StaleBatch { .. } | StoreError::Rank(_)) => {
                TransportError::Rejected(e.to_string())
            }
            e @ (StoreError::Sqlite(_) | StoreError::Corrupt(_)) => {
                TransportError::Unavailable(e.to_string())
            }
        }
    }
}

/// Errors from driving a move through a [`Coordinator`](crate::Coordinator).
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("item {0} is not in this view")]
    ItemNotInView(ItemId),

    #[error("item {0} is already in this view")]
    ItemAlreadyInView(ItemId),

    /// The view was closed; nothing further is applied locally.
    #[error("view closed")]
    ViewClosed,

    #[error(transparent)]
    Rank(#[from] RankError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
