//! Even respacing of a whole scope.
//!
//! Rebalancing is the only write that touches more than one rank. It reads
//! the scope once, assigns `KeySpace::spread(n)` in the existing order, and
//! hands the result to [`OrderStore::replace_all`] as one batch.

use serde::{Deserialize, Serialize};
use tracing::info;

use lineup_rank::{GapMetrics, KeySpace, gap_metrics};
use lineup_types::{RankedEntry, ScopeId};

use crate::constants::{DEFAULT_MIN_AVERAGE_GAP, DEFAULT_REBALANCE_KEY_LEN};
use crate::{OrderStore, Result};

/// When a scope is due for a proactive rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalancePolicy {
    /// Rebalance after a write that leaves the scope unhealthy. When false,
    /// only `Exhausted` or an explicit request triggers one.
    pub proactive: bool,
    /// Trigger when the average neighbour gap drops below this.
    pub min_average_gap: f64,
    /// Trigger when any key reaches this length.
    pub max_key_len: usize,
}

impl Default for RebalancePolicy {
    fn default() -> Self {
        Self {
            proactive: true,
            min_average_gap: DEFAULT_MIN_AVERAGE_GAP,
            max_key_len: DEFAULT_REBALANCE_KEY_LEN,
        }
    }
}

impl RebalancePolicy {
    /// Whether these metrics call for a rebalance.
    pub fn is_due(&self, metrics: &GapMetrics) -> bool {
        if metrics.count == 0 {
            return false;
        }
        let crowded = metrics
            .average_gap
            .is_some_and(|gap| gap < self.min_average_gap);
        crowded || metrics.longest_key >= self.max_key_len
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Rebalancer {
    keyspace: KeySpace,
    policy: RebalancePolicy,
}

impl Rebalancer {
    pub fn new(keyspace: KeySpace, policy: RebalancePolicy) -> Self {
        Self { keyspace, policy }
    }

    pub fn policy(&self) -> &RebalancePolicy {
        &self.policy
    }

    /// Spacing metrics for a sorted listing.
    pub fn health(&self, entries: &[RankedEntry]) -> GapMetrics {
        gap_metrics(entries.iter().map(|e| &e.rank))
    }

    pub fn needs_rebalance(&self, entries: &[RankedEntry]) -> bool {
        self.policy.is_due(&self.health(entries))
    }

    /// New ranks for a sorted listing, same order, evenly spaced.
    pub fn plan(&self, entries: &[RankedEntry]) -> Result<Vec<RankedEntry>> {
        let ranks = self.keyspace.spread(entries.len())?;
        Ok(entries
            .iter()
            .zip(ranks)
            .map(|(e, rank)| RankedEntry::new(e.id, rank))
            .collect())
    }

    /// Respace one scope and commit it as a single batch.
    ///
    /// Callers serialize this against other writes to the scope; the store
    /// rejects the batch with `StaleBatch` if membership moved underneath.
    pub fn run(&self, store: &dyn OrderStore, scope: ScopeId) -> Result<Vec<RankedEntry>> {
        let current = store.list_sorted(scope)?;
        let before = self.health(&current);
        let next = self.plan(&current)?;
        store.replace_all(scope, &next)?;

        let after = self.health(&next);
        info!(
            %scope,
            items = next.len(),
            longest_before = before.longest_key,
            longest_after = after.longest_key,
            "rebalanced scope"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryOrderStore;
    use lineup_rank::{Rank, midpoint};
    use lineup_types::{ItemId, is_strictly_ordered};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn crowded_scope(store: &MemoryOrderStore, scope: ScopeId, n: usize) -> Vec<ItemId> {
        // Every insert lands just above "V", bisecting towards it and
        // growing keys fast.
        let lower = Rank::initial();
        let mut upper = Rank::parse("W").unwrap();
        let first = ItemId::new();
        store.insert(scope, first, lower.clone()).unwrap();
        let mut ids = vec![first];
        for _ in 1..n {
            let rank = midpoint(Some(&lower), Some(&upper)).unwrap();
            let id = ItemId::new();
            store.insert(scope, id, rank.clone()).unwrap();
            ids.push(id);
            upper = rank;
        }
        ids
    }

    #[test]
    fn test_policy_due() {
        let policy = RebalancePolicy::default();
        let short = Rank::parse("V").unwrap();
        assert!(!policy.is_due(&gap_metrics([&short])));

        let long = Rank::parse(&"V".repeat(DEFAULT_REBALANCE_KEY_LEN)).unwrap();
        assert!(policy.is_due(&gap_metrics([&long])));

        let a = Rank::parse("VVVVVVVVVVVV1").unwrap();
        let b = Rank::parse("VVVVVVVVVVVV2").unwrap();
        assert!(policy.is_due(&gap_metrics([&a, &b])));

        assert!(!policy.is_due(&GapMetrics::default()));
    }

    #[test]
    fn test_plan_preserves_order() {
        let rebalancer = Rebalancer::default();
        let entries: Vec<RankedEntry> = ["1", "10001", "100011", "2", "zzzz"]
            .iter()
            .map(|r| RankedEntry::new(ItemId::new(), Rank::parse(r).unwrap()))
            .collect();
        let planned = rebalancer.plan(&entries).unwrap();
        assert_eq!(planned.len(), entries.len());
        assert!(is_strictly_ordered(&planned));
        for (old, new) in entries.iter().zip(&planned) {
            assert_eq!(old.id, new.id);
        }
    }

    #[test]
    fn test_run_respaces_store() {
        let store = MemoryOrderStore::new();
        let scope = ScopeId::new();
        let ids = crowded_scope(&store, scope, 40);
        let before = store.list_sorted(scope).unwrap();
        let order_before: Vec<ItemId> = before.iter().map(|e| e.id).collect();

        let rebalancer = Rebalancer::default();
        let result = rebalancer.run(&store, scope).unwrap();
        let after = store.list_sorted(scope).unwrap();

        assert_eq!(after, result);
        assert_eq!(after.iter().map(|e| e.id).collect::<Vec<_>>(), order_before);
        assert!(is_strictly_ordered(&after));
        assert_eq!(after.len(), ids.len());
        assert!(!rebalancer.needs_rebalance(&after));
        let longest = after.iter().map(|e| e.rank.len()).max().unwrap();
        assert!(longest <= 2);
    }

    #[test]
    fn test_run_empty_scope() {
        let store = MemoryOrderStore::new();
        let result = Rebalancer::default().run(&store, ScopeId::new()).unwrap();
        assert!(result.is_empty());
    }

    /// Flip a scope between its crowded and respaced assignments while
    /// readers list it. Every listing must be one assignment or the other.
    fn assert_readers_see_whole_assignment(store: Arc<dyn OrderStore>) {
        let scope = ScopeId::new();
        let (lower, mut upper) = (Rank::initial(), Rank::parse("W").unwrap());
        store.insert(scope, ItemId::new(), lower.clone()).unwrap();
        for _ in 1..24 {
            let rank = midpoint(Some(&lower), Some(&upper)).unwrap();
            store.insert(scope, ItemId::new(), rank.clone()).unwrap();
            upper = rank;
        }
        let rebalancer = Rebalancer::default();
        let old = store.list_sorted(scope).unwrap();
        let new = rebalancer.plan(&old).unwrap();
        assert_ne!(old, new);

        let done = Arc::new(AtomicBool::new(false));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let (store, done) = (store.clone(), done.clone());
                let (old, new) = (old.clone(), new.clone());
                std::thread::spawn(move || {
                    let mut seen = 0;
                    while !done.load(Ordering::Acquire) || seen == 0 {
                        let listing = store.list_sorted(scope).unwrap();
                        assert!(listing == old || listing == new, "partial listing: {listing:?}");
                        seen += 1;
                    }
                    seen
                })
            })
            .collect();

        for _ in 0..200 {
            store.replace_all(scope, &old).unwrap();
            assert_eq!(rebalancer.run(store.as_ref(), scope).unwrap(), new);
        }
        done.store(true, Ordering::Release);
        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
    }

    #[test]
    fn test_memory_readers_never_see_partial_rebalance() {
        assert_readers_see_whole_assignment(Arc::new(MemoryOrderStore::new()));
    }

    #[test]
    fn test_sqlite_readers_never_see_partial_rebalance() {
        assert_readers_see_whole_assignment(Arc::new(crate::SqliteOrderStore::in_memory().unwrap()));
    }
}
