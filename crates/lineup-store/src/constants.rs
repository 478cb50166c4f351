//! Tuning defaults for the authoritative side.

/// Buffered events per broadcast channel before slow subscribers lag.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Average neighbour gap (as a fraction of the key space) below which a
/// scope is considered crowded.
///
/// `gap_metrics` reads ten symbols of precision, so anything under roughly
/// 62^-5 means neighbours already share long prefixes.
pub const DEFAULT_MIN_AVERAGE_GAP: f64 = 1e-9;

/// Key length at which a scope is rebalanced proactively.
pub const DEFAULT_REBALANCE_KEY_LEN: usize = 16;

/// Recomputations a move gets after a `Conflict` before it fails.
pub const CONFLICT_RETRIES: usize = 1;
