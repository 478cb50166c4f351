//! Client side of lineup: optimistic reordering for an open view.
//!
//! One [`Coordinator`] per open view of a scope. It predicts a rank locally,
//! shows the move at once, and reconciles when the host answers.
//!
//! ```ignore
//! let transport = Arc::new(InProcessTransport::new(service));
//! let coord = Coordinator::open(scope, transport, CoordinatorConfig::default()).await?;
//! match coord.move_item(item, Some(left), Some(right)).await? {
//!     Settlement::RolledBack { error } => show_retry(error),
//!     _ => {}
//! }
//! ```

pub mod constants;
pub mod coordinator;
mod error;
pub mod transport;
pub mod view;

pub use coordinator::{Coordinator, CoordinatorConfig, MoveKind, PendingMove, Settlement, ViewEffect};
pub use error::{CoordinatorError, TransportError};
pub use transport::{InProcessTransport, MoveTransport};
pub use view::{LocalView, Snapshot};
