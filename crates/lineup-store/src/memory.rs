//! In-memory order store.
//!
//! # Concurrency Model
//!
//! - DashMap for per-scope concurrent access
//! - One parking_lot RwLock per scope: writes to a scope are serialized,
//!   scopes never contend with each other
//! - `replace_all` swaps the whole scope under one write guard, so readers
//!   never see a half-renumbered listing
//! - A scope left empty is dropped from the map. Writes that can create a
//!   scope keep its map entry guarded while they run, so a prune never
//!   detaches a scope mid-write

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use lineup_rank::Rank;
use lineup_types::{ItemId, RankedEntry, ScopeId};

use crate::store::validate_batch;
use crate::{OrderStore, Result, StoreError};

/// Ranks of one scope, indexed both ways.
#[derive(Debug, Default, Clone)]
struct ScopeOrder {
    by_rank: BTreeMap<Rank, ItemId>,
    by_item: HashMap<ItemId, Rank>,
}

impl ScopeOrder {
    fn conflict(&self, scope: ScopeId, item: ItemId, rank: &Rank) -> Option<StoreError> {
        match self.by_rank.get(rank) {
            Some(&holder) if holder != item => Some(StoreError::Conflict {
                scope_id: scope,
                rank: rank.clone(),
                holder: Some(holder),
            }),
            _ => None,
        }
    }
}

/// Order store held entirely in memory.
#[derive(Default)]
pub struct MemoryOrderStore {
    scopes: DashMap<ScopeId, Arc<RwLock<ScopeOrder>>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scopes currently holding at least one item.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    fn prune(&self, scope: ScopeId) {
        self.scopes
            .remove_if(&scope, |_, order| order.read().by_item.is_empty());
    }

    fn existing(&self, scope: ScopeId) -> Option<Arc<RwLock<ScopeOrder>>> {
        self.scopes.get(&scope).map(|s| s.clone())
    }
}

impl OrderStore for MemoryOrderStore {
    fn list_sorted(&self, scope: ScopeId) -> Result<Vec<RankedEntry>> {
        let Some(order) = self.existing(scope) else {
            return Ok(Vec::new());
        };
        let order = order.read();
        Ok(order
            .by_rank
            .iter()
            .map(|(rank, &id)| RankedEntry::new(id, rank.clone()))
            .collect())
    }

    fn rank_of(&self, scope: ScopeId, item: ItemId) -> Result<Option<Rank>> {
        Ok(self
            .existing(scope)
            .and_then(|order| order.read().by_item.get(&item).cloned()))
    }

    fn insert(&self, scope: ScopeId, item: ItemId, rank: Rank) -> Result<()> {
        let entry = self.scopes.entry(scope).or_default();
        let mut order = entry.write();
        if order.by_item.contains_key(&item) {
            return Err(StoreError::Duplicate {
                scope_id: scope,
                item_id: item,
            });
        }
        if let Some(err) = order.conflict(scope, item, &rank) {
            return Err(err);
        }
        order.by_rank.insert(rank.clone(), item);
        order.by_item.insert(item, rank);
        Ok(())
    }

    fn set_rank(&self, scope: ScopeId, item: ItemId, rank: Rank) -> Result<()> {
        let not_found = || StoreError::NotFound {
            scope_id: scope,
            item_id: item,
        };
        let order = self.existing(scope).ok_or_else(not_found)?;
        let mut order = order.write();
        let old = order.by_item.get(&item).cloned().ok_or_else(not_found)?;
        if old == rank {
            return Ok(());
        }
        if let Some(err) = order.conflict(scope, item, &rank) {
            return Err(err);
        }
        order.by_rank.remove(&old);
        order.by_rank.insert(rank.clone(), item);
        order.by_item.insert(item, rank);
        Ok(())
    }

    fn remove(&self, scope: ScopeId, item: ItemId) -> Result<bool> {
        let Some(order) = self.existing(scope) else {
            return Ok(false);
        };
        let removed = {
            let mut order = order.write();
            match order.by_item.remove(&item) {
                Some(rank) => {
                    order.by_rank.remove(&rank);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.prune(scope);
        }
        Ok(removed)
    }

    fn replace_all(&self, scope: ScopeId, entries: &[RankedEntry]) -> Result<()> {
        let result = {
            let entry = self.scopes.entry(scope).or_default();
            let mut order = entry.write();
            validate_batch(scope, order.by_item.keys().copied(), entries).map(|()| {
                let mut next = ScopeOrder::default();
                for e in entries {
                    next.by_rank.insert(e.rank.clone(), e.id);
                    next.by_item.insert(e.id, e.rank.clone());
                }
                *order = next;
            })
        };
        if entries.is_empty() || result.is_err() {
            self.prune(scope);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank(s: &str) -> Rank {
        Rank::parse(s).unwrap()
    }

    fn ids(entries: &[RankedEntry]) -> Vec<ItemId> {
        entries.iter().map(|e| e.id).collect()
    }

    #[test]
    fn test_list_sorted_orders_by_rank() {
        let store = MemoryOrderStore::new();
        let scope = ScopeId::new();
        let (a, b, c) = (ItemId::new(), ItemId::new(), ItemId::new());
        store.insert(scope, a, rank("t")).unwrap();
        store.insert(scope, b, rank("m")).unwrap();
        store.insert(scope, c, rank("p")).unwrap();
        assert_eq!(ids(&store.list_sorted(scope).unwrap()), vec![b, c, a]);
    }

    #[test]
    fn test_unknown_scope_is_empty() {
        let store = MemoryOrderStore::new();
        assert!(store.list_sorted(ScopeId::new()).unwrap().is_empty());
        assert_eq!(store.scope_count(), 0);
    }

    #[test]
    fn test_insert_conflict_and_duplicate() {
        let store = MemoryOrderStore::new();
        let scope = ScopeId::new();
        let (a, b) = (ItemId::new(), ItemId::new());
        store.insert(scope, a, rank("m")).unwrap();
        assert!(matches!(
            store.insert(scope, b, rank("m")),
            Err(StoreError::Conflict { holder: Some(h), .. }) if h == a
        ));
        assert!(matches!(
            store.insert(scope, a, rank("q")),
            Err(StoreError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_same_rank_in_other_scope_is_fine() {
        let store = MemoryOrderStore::new();
        store.insert(ScopeId::new(), ItemId::new(), rank("m")).unwrap();
        store.insert(ScopeId::new(), ItemId::new(), rank("m")).unwrap();
        assert_eq!(store.scope_count(), 2);
    }

    #[test]
    fn test_set_rank() {
        let store = MemoryOrderStore::new();
        let scope = ScopeId::new();
        let (a, b) = (ItemId::new(), ItemId::new());
        store.insert(scope, a, rank("m")).unwrap();
        store.insert(scope, b, rank("t")).unwrap();

        store.set_rank(scope, a, rank("w")).unwrap();
        assert_eq!(ids(&store.list_sorted(scope).unwrap()), vec![b, a]);
        assert_eq!(store.rank_of(scope, a).unwrap(), Some(rank("w")));

        // Own rank is a no-op, someone else's is a conflict.
        store.set_rank(scope, a, rank("w")).unwrap();
        assert!(matches!(
            store.set_rank(scope, a, rank("t")),
            Err(StoreError::Conflict { .. })
        ));
        assert!(matches!(
            store.set_rank(scope, ItemId::new(), rank("b")),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_remove_keeps_sibling_ranks() {
        let store = MemoryOrderStore::new();
        let scope = ScopeId::new();
        let (a, b, c) = (ItemId::new(), ItemId::new(), ItemId::new());
        store.insert(scope, a, rank("a")).unwrap();
        store.insert(scope, b, rank("b")).unwrap();
        store.insert(scope, c, rank("c")).unwrap();

        assert!(store.remove(scope, b).unwrap());
        assert!(!store.remove(scope, b).unwrap());
        let listed = store.list_sorted(scope).unwrap();
        assert_eq!(listed, vec![
            RankedEntry::new(a, rank("a")),
            RankedEntry::new(c, rank("c")),
        ]);
    }

    #[test]
    fn test_empty_scope_is_dropped() {
        let store = MemoryOrderStore::new();
        let scope = ScopeId::new();
        let (a, b) = (ItemId::new(), ItemId::new());
        store.insert(scope, a, rank("m")).unwrap();
        store.insert(scope, b, rank("t")).unwrap();

        store.remove(scope, a).unwrap();
        assert_eq!(store.scope_count(), 1);
        store.remove(scope, b).unwrap();
        assert_eq!(store.scope_count(), 0);

        store.replace_all(ScopeId::new(), &[]).unwrap();
        assert!(store
            .replace_all(ScopeId::new(), &[RankedEntry::new(a, rank("m"))])
            .is_err());
        assert_eq!(store.scope_count(), 0);
    }

    #[test]
    fn test_churn_on_one_scope_loses_no_writes() {
        let store = Arc::new(MemoryOrderStore::new());
        let scope = ScopeId::new();
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let r = rank(&format!("{}", n + 1));
                    let mut item = ItemId::new();
                    for _ in 0..200 {
                        store.insert(scope, item, r.clone()).unwrap();
                        assert!(store.remove(scope, item).unwrap());
                        item = ItemId::new();
                    }
                    store.insert(scope, item, r).unwrap();
                    item
                })
            })
            .collect();
        let mut expected: Vec<ItemId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        expected.sort_by_key(|id| store.rank_of(scope, *id).unwrap());

        assert_eq!(ids(&store.list_sorted(scope).unwrap()), expected);
        assert_eq!(store.scope_count(), 1);
    }

    #[test]
    fn test_neighbors_of() {
        let store = MemoryOrderStore::new();
        let scope = ScopeId::new();
        let (a, b) = (ItemId::new(), ItemId::new());
        store.insert(scope, a, rank("m")).unwrap();
        store.insert(scope, b, rank("t")).unwrap();

        let (lo, hi) = store.neighbors_of(scope, Some(a), Some(b)).unwrap();
        assert_eq!((lo, hi), (Some(rank("m")), Some(rank("t"))));
        assert_eq!(store.neighbors_of(scope, None, None).unwrap(), (None, None));
        assert!(matches!(
            store.neighbors_of(scope, Some(ItemId::new()), Some(b)),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_replace_all_swaps_whole_scope() {
        let store = MemoryOrderStore::new();
        let scope = ScopeId::new();
        let (a, b) = (ItemId::new(), ItemId::new());
        store.insert(scope, a, rank("a")).unwrap();
        store.insert(scope, b, rank("aV")).unwrap();

        let batch = vec![RankedEntry::new(a, rank("K")), RankedEntry::new(b, rank("k"))];
        store.replace_all(scope, &batch).unwrap();
        assert_eq!(store.list_sorted(scope).unwrap(), batch);
        assert_eq!(store.rank_of(scope, b).unwrap(), Some(rank("k")));
        assert_eq!(store.rank_of(scope, a).unwrap(), Some(rank("K")));

        let stale = vec![RankedEntry::new(a, rank("K"))];
        assert!(matches!(
            store.replace_all(scope, &stale),
            Err(StoreError::StaleBatch { .. })
        ));
        assert_eq!(store.list_sorted(scope).unwrap(), batch);
    }

    #[test]
    fn test_concurrent_writers_never_tie() {
        let store = Arc::new(MemoryOrderStore::new());
        let scope = ScopeId::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let item = ItemId::new();
                    // Everyone races for the same rank; exactly one wins.
                    store.insert(scope, item, rank("V")).is_ok()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(store.list_sorted(scope).unwrap().len(), 1);
    }
}
