//! Change notifications broadcast by the host after committed writes.

use serde::{Deserialize, Serialize};

use lineup_rank::Rank;

use crate::{ItemId, RankedEntry, ScopeId};

/// A committed change to one scope's order.
///
/// Open views reconcile these into their local state; a view never needs to
/// re-fetch the scope for anything but a missed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    /// An item was moved to a new rank.
    RankChanged {
        scope_id: ScopeId,
        item_id: ItemId,
        rank: Rank,
    },
    /// A new item joined the scope.
    ItemInserted {
        scope_id: ScopeId,
        item_id: ItemId,
        rank: Rank,
    },
    /// An item left the scope. Siblings keep their ranks.
    ItemRemoved { scope_id: ScopeId, item_id: ItemId },
    /// Every rank in the scope was reassigned at once.
    ScopeRebalanced {
        scope_id: ScopeId,
        entries: Vec<RankedEntry>,
    },
}

impl OrderEvent {
    /// The scope this event belongs to.
    pub fn scope_id(&self) -> ScopeId {
        match self {
            OrderEvent::RankChanged { scope_id, .. }
            | OrderEvent::ItemInserted { scope_id, .. }
            | OrderEvent::ItemRemoved { scope_id, .. }
            | OrderEvent::ScopeRebalanced { scope_id, .. } => *scope_id,
        }
    }
}
