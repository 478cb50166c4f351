//! Host side of the ordering contract.
//!
//! `OrderService` owns the authoritative write path: it resolves neighbour
//! ids, validates or recomputes ranks, commits through an [`OrderStore`], and
//! broadcasts an [`OrderEvent`] for every committed change.
//!
//! # Write serialization
//!
//! Every write takes the scope's mutex for its whole read-decide-write
//! cycle. Scopes never share a lock, so unrelated lists never contend.
//!
//! ```text
//!   move-item ──► lock(scope) ──► list ──► choose rank ──► set_rank ──► unlock
//!                                  ▲           │ Exhausted      │ Conflict
//!                                  │           ▼                │ (once)
//!                                  └──── rebalance (once) ◄─────┘
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use lineup_rank::{KeySpace, Rank, RankError};
use lineup_types::{
    CommittedRank, InsertItemRequest, ItemId, MoveIntent, MoveItemRequest, OrderEvent,
    RankedEntry, ReassignedRank, ScopeId, insertion_index,
};

use crate::constants::{CONFLICT_RETRIES, EVENT_CHANNEL_CAPACITY};
use crate::rebalancer::{RebalancePolicy, Rebalancer};
use crate::{OrderStore, Result, StoreError};

/// Key space and rebalancing settings for one service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub key_space: KeySpace,
    pub rebalance: RebalancePolicy,
}

/// Outcome of [`OrderService::place`].
struct Placed {
    rank: Rank,
    /// False when the item already sat in the target gap.
    written: bool,
}

/// Whether a placement creates the item or repositions it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Insert,
    Move,
}

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    keyspace: KeySpace,
    rebalancer: Rebalancer,
    /// Write locks for scopes with a write running or queued. An entry is
    /// dropped once nobody holds or waits on it.
    locks: DashMap<ScopeId, Arc<Mutex<()>>>,
    event_tx: broadcast::Sender<OrderEvent>,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self::with_config(store, ServiceConfig::default())
    }

    pub fn with_config(store: Arc<dyn OrderStore>, config: ServiceConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            keyspace: config.key_space,
            rebalancer: Rebalancer::new(config.key_space, config.rebalance),
            locks: DashMap::new(),
            event_tx,
        }
    }

    /// Subscribe to committed changes across all scopes.
    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.event_tx.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub fn rebalancer(&self) -> &Rebalancer {
        &self.rebalancer
    }

    /// Run `write` under the scope's write lock.
    fn locked<T>(&self, scope: ScopeId, write: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self.locks.entry(scope).or_default().clone();
        let result = {
            let _guard = lock.lock();
            write()
        };
        drop(lock);
        // Only the map holds it: no writer is inside or waiting.
        self.locks.remove_if(&scope, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Scopes with a write lock currently allocated.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    /// `GET scope-items`: the scope in ascending rank order.
    pub fn scope_items(&self, scope: ScopeId) -> Result<Vec<RankedEntry>> {
        self.store.list_sorted(scope)
    }

    /// `POST move-item`: reposition an existing item and return its
    /// committed rank.
    #[tracing::instrument(skip(self, req), name = "order.move_item", fields(scope = %req.scope_id, item = %req.item_id))]
    pub fn move_item(&self, req: &MoveItemRequest) -> Result<CommittedRank> {
        self.locked(req.scope_id, || {
            let Placed { rank, written } = self.place(req, Placement::Move)?;
            if !written {
                return Ok(CommittedRank { rank });
            }
            let _ = self.event_tx.send(OrderEvent::RankChanged {
                scope_id: req.scope_id,
                item_id: req.item_id,
                rank: rank.clone(),
            });
            let rank = self.maybe_rebalance(req.scope_id, req.item_id, rank)?;
            Ok(CommittedRank { rank })
        })
    }

    /// `POST insert-item`: add a new item between neighbours, or at the end.
    #[tracing::instrument(skip(self, req), name = "order.insert_item", fields(scope = %req.scope_id, item = %req.item_id))]
    pub fn insert_item(&self, req: &InsertItemRequest) -> Result<CommittedRank> {
        self.locked(req.scope_id, || {
            if self.store.rank_of(req.scope_id, req.item_id)?.is_some() {
                return Err(StoreError::Duplicate {
                    scope_id: req.scope_id,
                    item_id: req.item_id,
                });
            }
            let Placed { rank, .. } = self.place(req, Placement::Insert)?;
            let _ = self.event_tx.send(OrderEvent::ItemInserted {
                scope_id: req.scope_id,
                item_id: req.item_id,
                rank: rank.clone(),
            });
            let rank = self.maybe_rebalance(req.scope_id, req.item_id, rank)?;
            Ok(CommittedRank { rank })
        })
    }

    /// `POST remove-item`. Siblings keep their ranks.
    #[tracing::instrument(skip(self), name = "order.remove_item")]
    pub fn remove_item(&self, scope: ScopeId, item: ItemId) -> Result<bool> {
        self.locked(scope, || {
            let removed = self.store.remove(scope, item)?;
            if removed {
                let _ = self.event_tx.send(OrderEvent::ItemRemoved {
                    scope_id: scope,
                    item_id: item,
                });
            }
            Ok(removed)
        })
    }

    /// `POST rebalance-scope`: respace every rank, returning the new
    /// assignment in order.
    #[tracing::instrument(skip(self), name = "order.rebalance_scope")]
    pub fn rebalance_scope(&self, scope: ScopeId) -> Result<Vec<ReassignedRank>> {
        self.locked(scope, || {
            let entries = self.rebalance_locked(scope)?;
            Ok(entries.into_iter().map(ReassignedRank::from).collect())
        })
    }

    /// Caller holds the scope lock.
    fn rebalance_locked(&self, scope: ScopeId) -> Result<Vec<RankedEntry>> {
        let entries = self.rebalancer.run(self.store.as_ref(), scope)?;
        let _ = self.event_tx.send(OrderEvent::ScopeRebalanced {
            scope_id: scope,
            entries: entries.clone(),
        });
        Ok(entries)
    }

    /// Proactive respacing after a committed write. Returns the item's rank
    /// after any renumbering.
    fn maybe_rebalance(&self, scope: ScopeId, item: ItemId, rank: Rank) -> Result<Rank> {
        if !self.rebalancer.policy().proactive {
            return Ok(rank);
        }
        let listing = self.store.list_sorted(scope)?;
        if !self.rebalancer.needs_rebalance(&listing) {
            return Ok(rank);
        }
        info!(%scope, "spacing unhealthy after write, rebalancing");
        let entries = self.rebalance_locked(scope)?;
        entries
            .into_iter()
            .find(|e| e.id == item)
            .map(|e| e.rank)
            .ok_or(StoreError::NotFound {
                scope_id: scope,
                item_id: item,
            })
    }

    /// Choose and commit a rank. Caller holds the scope lock.
    fn place(&self, req: &MoveItemRequest, placement: Placement) -> Result<Placed> {
        let scope = req.scope_id;
        let item = req.item_id;
        let mut proposal = req.proposed_rank.clone();
        let mut conflicts = 0;
        let mut rebalanced = false;

        loop {
            let listing = self.store.list_sorted(scope)?;
            let current = listing.iter().find(|e| e.id == item).map(|e| e.rank.clone());
            if placement == Placement::Move && current.is_none() {
                return Err(StoreError::NotFound {
                    scope_id: scope,
                    item_id: item,
                });
            }

            let siblings: Vec<RankedEntry> = listing.into_iter().filter(|e| e.id != item).collect();
            let target = match self.choose_rank(req, &siblings, current.as_ref(), proposal.as_ref()) {
                Ok(rank) => rank,
                Err(StoreError::Rank(RankError::Exhausted { max_len })) if !rebalanced => {
                    warn!(%scope, max_len, "key space exhausted between neighbours, rebalancing");
                    self.rebalance_locked(scope)?;
                    rebalanced = true;
                    proposal = None;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if current.as_ref() == Some(&target) {
                debug!(rank = %target, "already in place");
                return Ok(Placed {
                    rank: target,
                    written: false,
                });
            }

            let written = match placement {
                Placement::Move => self.store.set_rank(scope, item, target.clone()),
                Placement::Insert => self.store.insert(scope, item, target.clone()),
            };
            match written {
                Ok(()) => {
                    debug!(rank = %target, "committed");
                    return Ok(Placed {
                        rank: target,
                        written: true,
                    });
                }
                Err(StoreError::Conflict { .. }) if conflicts < CONFLICT_RETRIES => {
                    conflicts += 1;
                    warn!(rank = %target, "rank taken, recomputing against fresh neighbours");
                    proposal = None;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Pick the rank for `req` among `siblings` (sorted, item excluded).
    ///
    /// The gap comes from [`insertion_index`]. Inside it, the item's current
    /// rank wins, then the client's proposal, then a fresh midpoint.
    fn choose_rank(
        &self,
        req: &MoveItemRequest,
        siblings: &[RankedEntry],
        current: Option<&Rank>,
        proposal: Option<&Rank>,
    ) -> Result<Rank> {
        let present = |id: &ItemId| siblings.iter().any(|e| e.id == *id);
        if let Some(before) = req.before_id.filter(|id| !present(id)) {
            warn!(%before, "lower neighbour gone");
        }
        if let Some(after) = req.after_id.filter(|id| !present(id)) {
            warn!(%after, "upper neighbour gone");
        }

        let gap = insertion_index(siblings, req.before_id, req.after_id);
        let intent = MoveIntent::at_gap(req.item_id, siblings, gap);
        let fits = |rank: &Rank| rank.len() <= self.keyspace.max_len && intent.admits(rank);

        if let Some(rank) = current.filter(|r| fits(*r)) {
            return Ok(rank.clone());
        }
        if let Some(rank) = proposal.filter(|r| fits(*r)) {
            return Ok(rank.clone());
        }
        Ok(self
            .keyspace
            .midpoint(intent.before_rank.as_ref(), intent.after_rank.as_ref())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryOrderStore;
    use lineup_types::is_strictly_ordered;

    fn rank(s: &str) -> Rank {
        Rank::parse(s).unwrap()
    }

    fn request(scope: ScopeId, item: ItemId) -> MoveItemRequest {
        MoveItemRequest {
            scope_id: scope,
            item_id: item,
            before_id: None,
            after_id: None,
            proposed_rank: None,
        }
    }

    fn seeded(ranks: &[&str]) -> (OrderService, ScopeId, Vec<ItemId>) {
        let store = Arc::new(MemoryOrderStore::new());
        let scope = ScopeId::new();
        let ids: Vec<ItemId> = ranks
            .iter()
            .map(|r| {
                let id = ItemId::new();
                store.insert(scope, id, rank(r)).unwrap();
                id
            })
            .collect();
        (OrderService::new(store), scope, ids)
    }

    fn order(service: &OrderService, scope: ScopeId) -> Vec<ItemId> {
        service.scope_items(scope).unwrap().iter().map(|e| e.id).collect()
    }

    #[test]
    fn test_insert_between_and_move_to_end() {
        let (service, scope, ids) = seeded(&["m", "t"]);
        let (a, b) = (ids[0], ids[1]);
        let c = ItemId::new();

        let committed = service
            .insert_item(&MoveItemRequest {
                before_id: Some(a),
                after_id: Some(b),
                ..request(scope, c)
            })
            .unwrap();
        assert_eq!(committed.rank, rank("p"));

        let committed = service
            .move_item(&MoveItemRequest {
                before_id: Some(b),
                ..request(scope, a)
            })
            .unwrap();
        assert!(committed.rank > rank("t"));
        assert_eq!(order(&service, scope), vec![c, b, a]);
    }

    #[test]
    fn test_noop_move_keeps_rank() {
        let (service, scope, ids) = seeded(&["a", "m", "t"]);
        let mut events = service.subscribe();
        let committed = service
            .move_item(&MoveItemRequest {
                before_id: Some(ids[0]),
                after_id: Some(ids[2]),
                ..request(scope, ids[1])
            })
            .unwrap();
        assert_eq!(committed.rank, rank("m"));
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn test_write_locks_released_after_writes() {
        let (service, scope, ids) = seeded(&["m", "t"]);
        service
            .move_item(&MoveItemRequest {
                before_id: Some(ids[1]),
                ..request(scope, ids[0])
            })
            .unwrap();
        service.remove_item(scope, ids[1]).unwrap();
        service.rebalance_scope(scope).unwrap();
        assert_eq!(service.active_locks(), 0);
    }

    #[test]
    fn test_proposed_rank_kept_when_it_fits() {
        let (service, scope, ids) = seeded(&["a", "m", "t"]);
        let committed = service
            .move_item(&MoveItemRequest {
                before_id: Some(ids[1]),
                after_id: Some(ids[2]),
                proposed_rank: Some(rank("r")),
                ..request(scope, ids[0])
            })
            .unwrap();
        assert_eq!(committed.rank, rank("r"));

        // A proposal outside the resolved gap is replaced.
        let committed = service
            .move_item(&MoveItemRequest {
                before_id: Some(ids[2]),
                proposed_rank: Some(rank("b")),
                ..request(scope, ids[1])
            })
            .unwrap();
        assert!(committed.rank > rank("t"));
    }

    #[test]
    fn test_missing_neighbour_fallbacks() {
        let (service, scope, ids) = seeded(&["a", "m", "t"]);
        let ghost = ItemId::new();

        // Lower gone: land right before the upper.
        let committed = service
            .move_item(&MoveItemRequest {
                before_id: Some(ghost),
                after_id: Some(ids[1]),
                ..request(scope, ids[2])
            })
            .unwrap();
        assert!(committed.rank > rank("a") && committed.rank < rank("m"));

        // Upper gone: land right after the lower.
        let committed = service
            .move_item(&MoveItemRequest {
                before_id: Some(ids[1]),
                after_id: Some(ghost),
                ..request(scope, ids[0])
            })
            .unwrap();
        assert!(committed.rank > rank("m"));

        // Both gone: append.
        let tail = ItemId::new();
        service
            .insert_item(&MoveItemRequest {
                before_id: Some(ghost),
                after_id: Some(ItemId::new()),
                ..request(scope, tail)
            })
            .unwrap();
        assert_eq!(order(&service, scope).last(), Some(&tail));
    }

    #[test]
    fn test_lower_neighbour_anchors_when_not_adjacent() {
        let (service, scope, ids) = seeded(&["a", "m", "t", "x"]);
        let committed = service
            .move_item(&MoveItemRequest {
                before_id: Some(ids[0]),
                after_id: Some(ids[2]),
                ..request(scope, ids[3])
            })
            .unwrap();
        assert!(committed.rank > rank("a") && committed.rank < rank("m"));
    }

    #[test]
    fn test_move_unknown_item_is_not_found() {
        let (service, scope, _) = seeded(&["m"]);
        assert!(matches!(
            service.move_item(&request(scope, ItemId::new())),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_insert_duplicate() {
        let (service, scope, ids) = seeded(&["m"]);
        assert!(matches!(
            service.insert_item(&request(scope, ids[0])),
            Err(StoreError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_exhausted_triggers_rebalance() {
        let store = Arc::new(MemoryOrderStore::new());
        let scope = ScopeId::new();
        let (a, b) = (ItemId::new(), ItemId::new());
        store.insert(scope, a, rank("V")).unwrap();
        store.insert(scope, b, rank("V1")).unwrap();
        let config = ServiceConfig {
            key_space: KeySpace::new(2),
            rebalance: RebalancePolicy {
                proactive: false,
                ..RebalancePolicy::default()
            },
        };
        let service = OrderService::with_config(store, config);
        let mut events = service.subscribe();

        let c = ItemId::new();
        let committed = service
            .insert_item(&MoveItemRequest {
                before_id: Some(a),
                after_id: Some(b),
                ..request(scope, c)
            })
            .unwrap();

        let listing = service.scope_items(scope).unwrap();
        assert_eq!(listing.iter().map(|e| e.id).collect::<Vec<_>>(), vec![a, c, b]);
        assert!(is_strictly_ordered(&listing));
        assert_eq!(listing[1].rank, committed.rank);
        assert!(matches!(events.try_recv(), Ok(OrderEvent::ScopeRebalanced { .. })));
        assert!(matches!(events.try_recv(), Ok(OrderEvent::ItemInserted { .. })));
    }

    #[test]
    fn test_proactive_rebalance_on_long_keys() {
        let store = Arc::new(MemoryOrderStore::new());
        let scope = ScopeId::new();
        let (a, b) = (ItemId::new(), ItemId::new());
        store.insert(scope, a, rank("V")).unwrap();
        store.insert(scope, b, rank("VVVV")).unwrap();
        let config = ServiceConfig {
            key_space: KeySpace::default(),
            rebalance: RebalancePolicy {
                max_key_len: 4,
                ..RebalancePolicy::default()
            },
        };
        let service = OrderService::with_config(store, config);

        let c = ItemId::new();
        let committed = service
            .insert_item(&MoveItemRequest {
                before_id: Some(b),
                ..request(scope, c)
            })
            .unwrap();
        let listing = service.scope_items(scope).unwrap();
        assert_eq!(listing.iter().map(|e| e.id).collect::<Vec<_>>(), vec![a, b, c]);
        assert!(listing.iter().all(|e| e.rank.len() <= 2));
        assert!(!service.rebalancer().needs_rebalance(&listing));
        assert_eq!(listing[2].rank, committed.rank);
    }

    #[test]
    fn test_remove_and_rebalance_events() {
        let (service, scope, ids) = seeded(&["a", "b", "c"]);
        let mut events = service.subscribe();

        assert!(service.remove_item(scope, ids[1]).unwrap());
        assert!(!service.remove_item(scope, ids[1]).unwrap());
        assert_eq!(
            events.try_recv().unwrap(),
            OrderEvent::ItemRemoved {
                scope_id: scope,
                item_id: ids[1],
            }
        );
        assert!(events.try_recv().is_err());

        let reassigned = service.rebalance_scope(scope).unwrap();
        assert_eq!(
            reassigned.iter().map(|r| r.item_id).collect::<Vec<_>>(),
            vec![ids[0], ids[2]]
        );
        assert!(matches!(events.try_recv(), Ok(OrderEvent::ScopeRebalanced { .. })));
    }

    #[test]
    fn test_concurrent_moves_keep_total_order() {
        let (service, scope, ids) = seeded(&["1", "2", "3", "4", "5", "6", "7", "8"]);
        let service = Arc::new(service);
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let service = service.clone();
                let ids = ids.clone();
                std::thread::spawn(move || {
                    for round in 0..20 {
                        // Everyone keeps moving their item after the same anchor.
                        let req = MoveItemRequest {
                            before_id: Some(ids[(n + round) % ids.len()]),
                            ..request(scope, ids[n])
                        };
                        let _ = service.move_item(&req);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let listing = service.scope_items(scope).unwrap();
        assert_eq!(listing.len(), ids.len());
        assert!(is_strictly_ordered(&listing));
        assert_eq!(service.active_locks(), 0);
    }
}
