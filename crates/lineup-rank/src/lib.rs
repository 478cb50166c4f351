//! Rank key space for ordered collections.
//!
//! A [`Rank`] is a short base-62 string. Items in one scope sort by their rank
//! byte-wise, so a new item can always be placed between two neighbours by
//! computing a key that sorts strictly between theirs. No sibling is rewritten.
//!
//! # Alphabet
//!
//! ```text
//! 0123456789 ABCDEFGHIJKLMNOPQRSTUVWXYZ abcdefghijklmnopqrstuvwxyz
//! └ pos 0                        pos 31 = 'V'                pos 61 ┘
//! ```
//!
//! ASCII order matches alphabet order, so any store that collates strings
//! byte-wise (SQLite `BINARY`, `BTreeMap<String, _>`) agrees with [`compare`].
//!
//! # Key growth
//!
//! [`KeySpace::midpoint`] only appends a symbol when the bounds are adjacent at
//! every compared position. Keys stay short for ordinary lists, and a key that
//! would exceed [`KeySpace::max_len`] is reported as [`RankError::Exhausted`]
//! so the caller can rebalance the scope with [`KeySpace::spread`].

mod alphabet;
mod error;
mod keyspace;
mod metrics;
mod rank;

pub use alphabet::{BASE, BASE62, MID_SYMBOL};
pub use error::RankError;
pub use keyspace::{DEFAULT_MAX_LEN, KeySpace, midpoint};
pub use metrics::{GapMetrics, gap_metrics};
pub use rank::{Rank, compare};

/// Result type for rank operations.
pub type Result<T> = std::result::Result<T, RankError>;
