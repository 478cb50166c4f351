//! Error types for rank operations.

use thiserror::Error;

/// Errors that can occur while parsing or generating ranks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RankError {
    /// The string is not a valid rank.
    ///
    /// Ranks are non-empty, use only base-62 symbols, and never end in `'0'`.
    #[error("invalid rank {rank:?}: {reason}")]
    Invalid { rank: String, reason: &'static str },

    /// The lower bound does not sort strictly before the upper bound.
    #[error("invalid range: {lower:?} is not below {upper:?}")]
    InvalidRange { lower: String, upper: String },

    /// No key fits between the bounds within the maximum key length.
    ///
    /// Recoverable by rebalancing the scope.
    #[error("rank space exhausted at max key length {max_len}")]
    Exhausted { max_len: usize },
}
