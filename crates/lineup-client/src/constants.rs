//! Client configuration constants.

use std::time::Duration;

/// Default deadline for one move-item or insert-item round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How many times a move is re-predicted after the host reports `Conflict`.
/// A conflict after the last retry settles as a failure.
pub const DEFAULT_CONFLICT_RETRIES: usize = 1;
