//! The order store contract.

use std::collections::HashSet;

use lineup_rank::Rank;
use lineup_types::{ItemId, RankedEntry, ScopeId, is_strictly_ordered};

use crate::{Result, StoreError};

/// A scoped, rank-sorted collection of items.
///
/// Implementations serialize writes within one scope so that [`set_rank`]
/// conflict detection is reliable. All mutation goes through these methods.
///
/// [`set_rank`]: OrderStore::set_rank
pub trait OrderStore: Send + Sync {
    /// All items of a scope in ascending rank order. Unknown scopes are empty.
    fn list_sorted(&self, scope: ScopeId) -> Result<Vec<RankedEntry>>;

    /// Current rank of one item, if it is in the scope.
    fn rank_of(&self, scope: ScopeId, item: ItemId) -> Result<Option<Rank>>;

    /// Add an item at `rank`.
    ///
    /// Fails with `Duplicate` if the item exists, `Conflict` if the rank is taken.
    fn insert(&self, scope: ScopeId, item: ItemId, rank: Rank) -> Result<()>;

    /// Move an existing item to `rank`.
    ///
    /// Fails with `NotFound` if the item is absent, `Conflict` if another
    /// item holds the rank. Setting an item to its own rank is a no-op.
    fn set_rank(&self, scope: ScopeId, item: ItemId, rank: Rank) -> Result<()>;

    /// Remove an item. Siblings keep their ranks. Returns whether it existed.
    fn remove(&self, scope: ScopeId, item: ItemId) -> Result<bool>;

    /// Atomically replace every rank in the scope.
    ///
    /// `entries` must name exactly the scope's current items, in strictly
    /// increasing rank order. Readers observe either the old or the new
    /// assignment, never a mix.
    fn replace_all(&self, scope: ScopeId, entries: &[RankedEntry]) -> Result<()>;

    /// Resolve neighbour ids to their current ranks.
    ///
    /// A named neighbour that is not in the scope yields `NotFound`.
    fn neighbors_of(
        &self,
        scope: ScopeId,
        before: Option<ItemId>,
        after: Option<ItemId>,
    ) -> Result<(Option<Rank>, Option<Rank>)> {
        let resolve = |id: Option<ItemId>| -> Result<Option<Rank>> {
            match id {
                None => Ok(None),
                Some(item_id) => self
                    .rank_of(scope, item_id)?
                    .map(Some)
                    .ok_or(StoreError::NotFound {
                        scope_id: scope,
                        item_id,
                    }),
            }
        };
        Ok((resolve(before)?, resolve(after)?))
    }
}

/// Check a rebalance batch against the scope's current membership.
pub(crate) fn validate_batch(
    scope: ScopeId,
    current: impl IntoIterator<Item = ItemId>,
    entries: &[RankedEntry],
) -> Result<()> {
    let current: HashSet<ItemId> = current.into_iter().collect();
    let proposed: HashSet<ItemId> = entries.iter().map(|e| e.id).collect();
    if current != proposed || proposed.len() != entries.len() || !is_strictly_ordered(entries) {
        return Err(StoreError::StaleBatch { scope_id: scope });
    }
    Ok(())
}
