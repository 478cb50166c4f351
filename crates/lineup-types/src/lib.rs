//! Shared identity, item, and wire types for lineup.
//!
//! A leaf crate over `lineup-rank`: everything both sides of the ordering
//! protocol need to agree on, and nothing that does I/O.
//!
//! # Key Types
//!
//! |------------------------|----------------------------------------------|
//! | Type                   | Purpose                                      |
//! |------------------------|----------------------------------------------|
//! | [`ScopeId`]            | Which ordered list                           |
//! | [`ItemId`]             | Which member of a list                       |
//! | [`RankedEntry`]        | `{id, rank}`, one row of a scope listing     |
//! | [`Orderable`]          | Entry plus scope plus host payload           |
//! | [`MoveIntent`]         | Desired position as resolved rank bounds     |
//! | [`MoveItemRequest`]    | `POST move-item` / `insert-item` body        |
//! | [`OrderEvent`]         | Committed change broadcast to open views     |
//! |------------------------|----------------------------------------------|

pub mod event;
pub mod ids;
pub mod item;
pub mod wire;

pub use event::OrderEvent;
pub use ids::{ItemId, ScopeId};
pub use item::{
    Orderable, RankedEntry, attach_payloads, gap_bounds, insertion_index, is_strictly_ordered,
};
pub use wire::{CommittedRank, InsertItemRequest, MoveIntent, MoveItemRequest, ReassignedRank};

pub use lineup_rank::Rank;
