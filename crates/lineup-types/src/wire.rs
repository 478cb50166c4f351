//! Request/response shapes of the host contract.
//!
//! ```text
//! GET  scope-items(scopeId)                               -> [{id, rank}]
//! POST move-item     {scopeId, itemId, beforeId?, afterId?} -> {rank}
//! POST insert-item   {scopeId, itemId, beforeId?, afterId?} -> {rank}
//! POST remove-item   {scopeId, itemId}                    -> {removed}
//! POST rebalance-scope {scopeId}                          -> [{id, rank}]
//! ```
//!
//! `beforeId` names the item that should end up immediately *before* the
//! moved item (its lower neighbour); `afterId` names the one immediately
//! *after* it. Either may be absent to mean an open end of the scope.

use serde::{Deserialize, Serialize};

use lineup_rank::Rank;

use crate::{ItemId, RankedEntry, ScopeId, gap_bounds};

/// Resolved move target, neighbour ids already turned into ranks.
///
/// `before_rank` is the lower bound, `after_rank` the upper bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveIntent {
    pub item_id: ItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_rank: Option<Rank>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_rank: Option<Rank>,
}

impl MoveIntent {
    /// The bounds of gap `index` in `siblings` (sorted, item excluded).
    pub fn at_gap(item_id: ItemId, siblings: &[RankedEntry], index: usize) -> Self {
        let (lower, upper) = gap_bounds(siblings, index);
        Self {
            item_id,
            before_rank: lower.cloned(),
            after_rank: upper.cloned(),
        }
    }

    /// True when `rank` sorts strictly inside the bounds.
    pub fn admits(&self, rank: &Rank) -> bool {
        self.before_rank.as_ref().is_none_or(|l| l < rank)
            && self.after_rank.as_ref().is_none_or(|u| rank < u)
    }
}

/// `POST move-item` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveItemRequest {
    pub scope_id: ScopeId,
    pub item_id: ItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_id: Option<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_id: Option<ItemId>,
    /// Rank the client already applied locally. The host keeps it when it
    /// still fits; otherwise it commits its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_rank: Option<Rank>,
}

/// `POST insert-item` body. Same placement rules as a move, for an item the
/// scope does not hold yet.
pub type InsertItemRequest = MoveItemRequest;

/// Rank committed by the host for a move or insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedRank {
    pub rank: Rank,
}

/// `POST rebalance-scope` response entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignedRank {
    pub item_id: ItemId,
    pub rank: Rank,
}

impl From<RankedEntry> for ReassignedRank {
    fn from(e: RankedEntry) -> Self {
        Self {
            item_id: e.id,
            rank: e.rank,
        }
    }
}

impl From<ReassignedRank> for RankedEntry {
    fn from(r: ReassignedRank) -> Self {
        RankedEntry::new(r.item_id, r.rank)
    }
}
