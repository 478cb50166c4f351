//! Orderable items and their ranked entries.

use serde::{Deserialize, Serialize};

use lineup_rank::Rank;

use crate::{ItemId, ScopeId};

/// One item's position within a scope.
///
/// This is the only shape the ordering core works with; a listing of a
/// scope is a `Vec<RankedEntry>` sorted by rank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RankedEntry {
    pub id: ItemId,
    pub rank: Rank,
}

impl RankedEntry {
    pub fn new(id: ItemId, rank: Rank) -> Self {
        Self { id, rank }
    }
}

/// An item as seen by a host: ordering fields plus an opaque payload.
///
/// The payload (link data, image data, ...) never reaches the ordering core;
/// only [`Orderable::entry`] does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orderable<P = ()> {
    pub id: ItemId,
    pub scope_id: ScopeId,
    pub rank: Rank,
    pub payload: P,
}

impl<P> Orderable<P> {
    pub fn new(id: ItemId, scope_id: ScopeId, rank: Rank, payload: P) -> Self {
        Self {
            id,
            scope_id,
            rank,
            payload,
        }
    }

    /// The ordering-relevant part of this item.
    pub fn entry(&self) -> RankedEntry {
        RankedEntry::new(self.id, self.rank.clone())
    }

    /// Swap the payload, keeping position.
    pub fn map_payload<Q>(self, f: impl FnOnce(P) -> Q) -> Orderable<Q> {
        Orderable {
            id: self.id,
            scope_id: self.scope_id,
            rank: self.rank,
            payload: f(self.payload),
        }
    }
}

/// Re-attach payloads to a ranked listing, in listing order.
///
/// Entries without a matching payload are skipped; the host owns payload
/// lifetime and may not have loaded every item yet.
pub fn attach_payloads<P>(
    scope_id: ScopeId,
    entries: &[RankedEntry],
    mut payload_for: impl FnMut(ItemId) -> Option<P>,
) -> Vec<Orderable<P>> {
    entries
        .iter()
        .filter_map(|e| {
            payload_for(e.id).map(|p| Orderable::new(e.id, scope_id, e.rank.clone(), p))
        })
        .collect()
}

/// Index in `siblings` where an item placed after `before` and ahead of
/// `after` lands. `siblings` is a sorted listing without the placed item.
///
/// The lower neighbour anchors when it is still present, then the upper
/// one; with neither, the item goes to the end. Host and client both place
/// through this, so a prediction and its commit agree on the gap.
pub fn insertion_index(
    siblings: &[RankedEntry],
    before: Option<ItemId>,
    after: Option<ItemId>,
) -> usize {
    let position = |id: ItemId| siblings.iter().position(|e| e.id == id);
    match (before.and_then(position), after.and_then(position)) {
        (Some(i), _) => i + 1,
        (None, Some(j)) => j,
        (None, None) => siblings.len(),
    }
}

/// Ranks on either side of gap `index`; `None` is an open end.
pub fn gap_bounds(siblings: &[RankedEntry], index: usize) -> (Option<&Rank>, Option<&Rank>) {
    let lower = index.checked_sub(1).and_then(|i| siblings.get(i)).map(|e| &e.rank);
    let upper = siblings.get(index).map(|e| &e.rank);
    (lower, upper)
}

/// True when ranks strictly increase along the listing (no ties).
pub fn is_strictly_ordered(entries: &[RankedEntry]) -> bool {
    entries.windows(2).all(|w| w[0].rank < w[1].rank)
}
