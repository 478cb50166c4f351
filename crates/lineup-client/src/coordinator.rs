//! Optimistic move coordination for one open view of a scope.
//!
//! A [`Coordinator`] owns the client's [`LocalView`] and runs the move
//! protocol against a [`MoveTransport`]. Prediction is synchronous, so the
//! view changes the moment a move begins; the round trip happens after.
//!
//! # Move Lifecycle
//!
//! ```text
//! +-----------+  begin_move / begin_insert   +------------------+
//! |   Idle    | ---------------------------> | Applied-Locally  |  PendingMove holds
//! +-----------+   predict midpoint, splice   +--------+---------+  the Snapshot
//!                                                     | revalidate, send
//!                                                     v
//!                                            +------------------+
//!                                            |    Confirming    |
//!                                            +--------+---------+
//!                          settle(Ok)                 |              settle(Err)
//!               +-------------------------------------+----------------------+
//!               v                                                            v
//!   +------------------------+                              +-----------------------+
//!   | Confirmed / Adopted    |                              | RolledBack            |
//!   | snapshot dropped       |                              | snapshot restored     |
//!   +------------------------+                              +-----------------------+
//! ```
//!
//! A second `begin_move` on an item that is still confirming supersedes the
//! first: the item goes back to where the server last had it, the new
//! prediction starts from the current view, and the old ticket settles as
//! [`Settlement::Superseded`] without touching the view.
//!
//! # Rollback
//!
//! When nothing else changed the view since the move was applied, failure
//! restores the snapshot wholesale, so the view is identical to the one
//! before the move. Otherwise only the moved item returns to its last known
//! server position and every other change is kept.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use lineup_rank::{KeySpace, Rank, RankError};
use lineup_types::{
    CommittedRank, ItemId, MoveIntent, MoveItemRequest, OrderEvent, RankedEntry, ScopeId,
    gap_bounds, insertion_index,
};

use crate::constants::{DEFAULT_CONFLICT_RETRIES, DEFAULT_REQUEST_TIMEOUT};
use crate::transport::MoveTransport;
use crate::view::{LocalView, Snapshot};
use crate::{CoordinatorError, TransportError};

/// Per-view protocol settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Deadline for one write round trip. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Re-predictions after a `Conflict` before the move fails.
    pub conflict_retries: usize,
    /// Must match the host's key space for predictions to be accepted as-is.
    pub key_space: KeySpace,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            key_space: KeySpace::default(),
        }
    }
}

/// Which host operation a pending move maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Move,
    Insert,
}

/// An optimistic change that has been applied locally and awaits settlement.
///
/// Returned by [`Coordinator::begin_move`]; hand it back to
/// [`Coordinator::settle`] with the host's answer.
#[derive(Debug, Clone)]
pub struct PendingMove {
    ticket: u64,
    kind: MoveKind,
    scope: ScopeId,
    item: ItemId,
    before_id: Option<ItemId>,
    after_id: Option<ItemId>,
    predicted: Rank,
    snapshot: Snapshot,
    prior_rank: Option<Rank>,
    /// View version right after this move's own last placement.
    applied_version: u64,
}

impl PendingMove {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn kind(&self) -> MoveKind {
        self.kind
    }

    pub fn item(&self) -> ItemId {
        self.item
    }

    /// Rank currently applied to the local view for this move.
    pub fn predicted(&self) -> &Rank {
        &self.predicted
    }

    /// The view as it was before this move.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// The item's rank before this move; `None` for an insert.
    pub fn prior_rank(&self) -> Option<&Rank> {
        self.prior_rank.as_ref()
    }

    /// Request body for the host, carrying the prediction as a proposal.
    pub fn request(&self) -> MoveItemRequest {
        MoveItemRequest {
            scope_id: self.scope,
            item_id: self.item,
            before_id: self.before_id,
            after_id: self.after_id,
            proposed_rank: Some(self.predicted.clone()),
        }
    }
}

/// How a pending move ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The host committed the predicted rank.
    Confirmed { rank: Rank },
    /// The host committed a different rank, now applied locally.
    Adopted { rank: Rank },
    /// The move failed and the view was restored.
    RolledBack { error: TransportError },
    /// A later move on the same item replaced this one.
    Superseded,
    /// The view was closed before the answer arrived.
    Discarded,
}

impl Settlement {
    pub fn is_success(&self) -> bool {
        matches!(self, Settlement::Confirmed { .. } | Settlement::Adopted { .. })
    }
}

/// What a remote change did to the local view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEffect {
    /// One item changed.
    Updated,
    /// The whole listing was replaced.
    Replaced,
    /// Nothing visible changed.
    Ignored,
}

/// Bookkeeping for an item whose move is confirming.
#[derive(Debug)]
struct InFlight {
    ticket: u64,
    /// Where the host last had the item; `None` if it has no row yet.
    restore_to: Option<Rank>,
}

#[derive(Debug)]
struct CoordinatorState {
    view: LocalView,
    in_flight: HashMap<ItemId, InFlight>,
    next_ticket: u64,
    closed: bool,
}

impl CoordinatorState {
    fn is_current(&self, pending: &PendingMove) -> bool {
        self.in_flight
            .get(&pending.item)
            .is_some_and(|f| f.ticket == pending.ticket)
    }

    /// Adopt a full host listing while keeping in-flight items where the
    /// user put them.
    fn rebase(&mut self, entries: Vec<RankedEntry>, keyspace: &KeySpace) {
        for (id, flight) in self.in_flight.iter_mut() {
            flight.restore_to = entries.iter().find(|e| e.id == *id).map(|e| e.rank.clone());
        }
        let kept: HashSet<ItemId> = self.in_flight.keys().copied().collect();
        let previous = self.view.entries().to_vec();

        let mut next: Vec<RankedEntry> = entries.into_iter().filter(|e| !kept.contains(&e.id)).collect();
        next.sort_by(|a, b| a.rank.cmp(&b.rank).then(a.id.cmp(&b.id)));
        let mut stranded = Vec::new();

        for (pos, entry) in previous.iter().enumerate() {
            if !kept.contains(&entry.id) {
                continue;
            }
            // Re-anchor after the closest earlier entry that survived.
            let anchor = previous[..pos]
                .iter()
                .rev()
                .find_map(|p| next.iter().position(|n| n.id == p.id));
            let gap = anchor.map_or(0, |i| i + 1);
            let (lower, upper) = gap_bounds(&next, gap);
            let fits = lower.is_none_or(|l| l < &entry.rank) && upper.is_none_or(|u| &entry.rank < u);
            let rank = if fits {
                Ok(entry.rank.clone())
            } else {
                keyspace.midpoint(lower, upper)
            };
            match rank {
                Ok(rank) => next.insert(gap, RankedEntry::new(entry.id, rank)),
                Err(err) => {
                    warn!(item = %entry.id, %err, "cannot keep in-flight item in place");
                    if let Some(rank) = self.in_flight.get(&entry.id).and_then(|f| f.restore_to.clone()) {
                        stranded.push(RankedEntry::new(entry.id, rank));
                    }
                }
            }
        }

        next.extend(stranded);
        self.view.replace(next);
    }
}

/// Rank for `item` placed between `before` and `after` in `view`.
///
/// Keeps the item's current rank when it already sits in the target gap,
/// which makes a move onto its own neighbours a no-op.
fn predict(
    view: &LocalView,
    keyspace: &KeySpace,
    item: ItemId,
    before: Option<ItemId>,
    after: Option<ItemId>,
) -> Result<Rank, RankError> {
    let siblings = view.siblings_of(item);
    let gap = insertion_index(&siblings, before, after);
    let intent = MoveIntent::at_gap(item, &siblings, gap);

    if let Some(current) = view.rank_of(item).filter(|r| intent.admits(r)) {
        return Ok(current.clone());
    }
    keyspace.midpoint(intent.before_rank.as_ref(), intent.after_rank.as_ref())
}

/// Optimistic move coordinator for one open view of a scope.
///
/// Methods take `&self`; moves on different items may be in flight at the
/// same time on one task. No lock is held across an await.
pub struct Coordinator {
    scope: ScopeId,
    transport: Arc<dyn MoveTransport>,
    config: CoordinatorConfig,
    state: Mutex<CoordinatorState>,
    /// Flips to `true` once, in `close`. Wakes `follow`.
    closed_tx: watch::Sender<bool>,
}

impl Coordinator {
    pub fn new(scope: ScopeId, entries: Vec<RankedEntry>, transport: Arc<dyn MoveTransport>) -> Self {
        Self::with_config(scope, entries, transport, CoordinatorConfig::default())
    }

    pub fn with_config(
        scope: ScopeId,
        entries: Vec<RankedEntry>,
        transport: Arc<dyn MoveTransport>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            scope,
            transport,
            config,
            state: Mutex::new(CoordinatorState {
                view: LocalView::new(scope, entries),
                in_flight: HashMap::new(),
                next_ticket: 1,
                closed: false,
            }),
            closed_tx: watch::Sender::new(false),
        }
    }

    /// Open a view by fetching the scope's current listing.
    pub async fn open(
        scope: ScopeId,
        transport: Arc<dyn MoveTransport>,
        config: CoordinatorConfig,
    ) -> Result<Self, CoordinatorError> {
        let entries = transport.scope_items(scope).await?;
        debug!(%scope, items = entries.len(), "opened view");
        Ok(Self::with_config(scope, entries, transport, config))
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// A copy of the current local view.
    pub fn view(&self) -> LocalView {
        self.state.lock().view.clone()
    }

    pub fn entries(&self) -> Vec<RankedEntry> {
        self.state.lock().view.entries().to_vec()
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.state.lock().view.ids()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    pub fn is_current(&self, pending: &PendingMove) -> bool {
        self.state.lock().is_current(pending)
    }

    /// Predict and apply a move of an item already in the view.
    ///
    /// `before` is the item that should end up immediately before it,
    /// `after` the one immediately after. Fails with `Rank(Exhausted)` when
    /// the neighbours leave no room, without touching the view.
    pub fn begin_move(
        &self,
        item: ItemId,
        before: Option<ItemId>,
        after: Option<ItemId>,
    ) -> Result<PendingMove, CoordinatorError> {
        self.begin(MoveKind::Move, item, before, after)
    }

    /// Predict and apply an insert of an item the view does not hold yet.
    pub fn begin_insert(
        &self,
        item: ItemId,
        before: Option<ItemId>,
        after: Option<ItemId>,
    ) -> Result<PendingMove, CoordinatorError> {
        self.begin(MoveKind::Insert, item, before, after)
    }

    fn begin(
        &self,
        kind: MoveKind,
        item: ItemId,
        before: Option<ItemId>,
        after: Option<ItemId>,
    ) -> Result<PendingMove, CoordinatorError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(CoordinatorError::ViewClosed);
        }
        let present = state.view.contains(item);
        match kind {
            MoveKind::Move if !present => return Err(CoordinatorError::ItemNotInView(item)),
            MoveKind::Insert if present => return Err(CoordinatorError::ItemAlreadyInView(item)),
            _ => {}
        }

        let predicted = predict(&state.view, &self.config.key_space, item, before, after)?;

        let superseded = state.in_flight.get(&item).map(|f| f.restore_to.clone());
        let (snapshot, prior_rank) = match superseded {
            Some(restore_to) => {
                debug!(%item, "superseding in-flight move");
                (state.view.snapshot_with(item, restore_to.as_ref()), restore_to)
            }
            None => (state.view.snapshot(), state.view.rank_of(item).cloned()),
        };

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.in_flight.insert(
            item,
            InFlight {
                ticket,
                restore_to: prior_rank.clone(),
            },
        );
        state.view.place(item, predicted.clone());
        debug!(%item, ticket, rank = %predicted, "applied locally");

        Ok(PendingMove {
            ticket,
            kind,
            scope: self.scope,
            item,
            before_id: before,
            after_id: after,
            predicted,
            snapshot,
            prior_rank,
            applied_version: state.view.version(),
        })
    }

    /// Re-check a prediction against the latest view just before sending.
    ///
    /// Re-predicts when a sibling now holds the rank or it no longer sits
    /// between the requested neighbours. Returns whether the rank changed.
    /// A superseded move is left alone.
    pub fn revalidate(&self, pending: &mut PendingMove) -> Result<bool, CoordinatorError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(CoordinatorError::ViewClosed);
        }
        if !state.is_current(pending) {
            return Ok(false);
        }

        let target = predict(
            &state.view,
            &self.config.key_space,
            pending.item,
            pending.before_id,
            pending.after_id,
        )?;
        if target == pending.predicted && state.view.rank_of(pending.item) == Some(&target) {
            return Ok(false);
        }

        // Only our own placements keep the wholesale rollback valid.
        let untouched = state.view.version() == pending.applied_version;
        state.view.place(pending.item, target.clone());
        if untouched {
            pending.applied_version = state.view.version();
        }
        debug!(item = %pending.item, from = %pending.predicted, to = %target, "re-predicted");
        pending.predicted = target;
        Ok(true)
    }

    /// Apply the host's answer to a pending move.
    pub fn settle(
        &self,
        pending: PendingMove,
        outcome: Result<CommittedRank, TransportError>,
    ) -> Settlement {
        let mut state = self.state.lock();
        if state.closed {
            debug!(item = %pending.item, ticket = pending.ticket, "view closed, discarding answer");
            return Settlement::Discarded;
        }

        match state.in_flight.get(&pending.item).map(|f| f.ticket) {
            Some(ticket) if ticket == pending.ticket => {}
            Some(_) => {
                // The host still applied it; a later rollback must land here.
                if let (Ok(committed), Some(flight)) = (&outcome, state.in_flight.get_mut(&pending.item)) {
                    flight.restore_to = Some(committed.rank.clone());
                }
                debug!(item = %pending.item, ticket = pending.ticket, "superseded");
                return Settlement::Superseded;
            }
            None => return Settlement::Superseded,
        }
        let Some(flight) = state.in_flight.remove(&pending.item) else {
            return Settlement::Superseded;
        };

        match outcome {
            Ok(CommittedRank { rank }) => {
                if rank == pending.predicted && state.view.rank_of(pending.item) == Some(&rank) {
                    debug!(item = %pending.item, %rank, "confirmed");
                    Settlement::Confirmed { rank }
                } else {
                    info!(item = %pending.item, predicted = %pending.predicted, %rank, "host chose a different rank");
                    state.view.place(pending.item, rank.clone());
                    Settlement::Adopted { rank }
                }
            }
            Err(error) => {
                warn!(item = %pending.item, %error, "move failed, rolling back");
                let untouched = state.view.version() == pending.applied_version
                    && flight.restore_to == pending.prior_rank;
                if untouched {
                    state.view.restore(pending.snapshot);
                } else {
                    match flight.restore_to {
                        Some(rank) => state.view.place(pending.item, rank),
                        None => {
                            state.view.remove(pending.item);
                        }
                    }
                }
                Settlement::RolledBack { error }
            }
        }
    }

    /// Reconcile a committed change made by someone else.
    ///
    /// Items with a move in flight keep their optimistic position; the event
    /// only updates where they return to on failure.
    pub fn apply_event(&self, event: &OrderEvent) -> ViewEffect {
        let mut state = self.state.lock();
        if state.closed || event.scope_id() != self.scope {
            return ViewEffect::Ignored;
        }
        match event {
            OrderEvent::RankChanged { item_id, rank, .. }
            | OrderEvent::ItemInserted { item_id, rank, .. } => {
                if let Some(flight) = state.in_flight.get_mut(item_id) {
                    flight.restore_to = Some(rank.clone());
                    return ViewEffect::Ignored;
                }
                if state.view.rank_of(*item_id) == Some(rank) {
                    return ViewEffect::Ignored;
                }
                state.view.place(*item_id, rank.clone());
                ViewEffect::Updated
            }
            OrderEvent::ItemRemoved { item_id, .. } => {
                state.in_flight.remove(item_id);
                if state.view.remove(*item_id) {
                    ViewEffect::Updated
                } else {
                    ViewEffect::Ignored
                }
            }
            OrderEvent::ScopeRebalanced { entries, .. } => {
                state.rebase(entries.clone(), &self.config.key_space);
                ViewEffect::Replaced
            }
        }
    }

    /// Adopt a full listing from the host (scope-items or rebalance-scope).
    pub fn reconcile(&self, entries: Vec<RankedEntry>) -> ViewEffect {
        let mut state = self.state.lock();
        if state.closed {
            return ViewEffect::Ignored;
        }
        state.rebase(entries, &self.config.key_space);
        ViewEffect::Replaced
    }

    /// Tear the view down. Answers that arrive later are discarded.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            info!(scope = %self.scope, pending = state.in_flight.len(), "closing view");
        }
        state.closed = true;
        state.in_flight.clear();
        drop(state);
        self.closed_tx.send_replace(true);
    }

    /// Move an item and drive the request to settlement.
    ///
    /// Recovers from `Exhausted` by rebalancing and from `Conflict` by
    /// refreshing and re-predicting; everything else rolls back.
    pub async fn move_item(
        &self,
        item: ItemId,
        before: Option<ItemId>,
        after: Option<ItemId>,
    ) -> Result<Settlement, CoordinatorError> {
        let pending = match self.begin_move(item, before, after) {
            Err(CoordinatorError::Rank(RankError::Exhausted { .. })) => {
                self.rebalance().await?;
                self.begin_move(item, before, after)?
            }
            other => other?,
        };
        self.drive(pending).await
    }

    /// Insert a new item and drive the request to settlement.
    pub async fn insert_item(
        &self,
        item: ItemId,
        before: Option<ItemId>,
        after: Option<ItemId>,
    ) -> Result<Settlement, CoordinatorError> {
        let pending = match self.begin_insert(item, before, after) {
            Err(CoordinatorError::Rank(RankError::Exhausted { .. })) => {
                self.rebalance().await?;
                self.begin_insert(item, before, after)?
            }
            other => other?,
        };
        self.drive(pending).await
    }

    /// Ask the host to rebalance the scope and adopt the result.
    pub async fn rebalance(&self) -> Result<ViewEffect, CoordinatorError> {
        let reassigned = self.transport.rebalance_scope(self.scope).await?;
        info!(scope = %self.scope, items = reassigned.len(), "adopting rebalanced scope");
        Ok(self.reconcile(reassigned.into_iter().map(RankedEntry::from).collect()))
    }

    /// Fetch the scope and adopt it.
    pub async fn refresh(&self) -> Result<ViewEffect, CoordinatorError> {
        let entries = self.transport.scope_items(self.scope).await?;
        Ok(self.reconcile(entries))
    }

    /// Apply host events until the channel closes or the view does.
    ///
    /// Returns promptly on `close`, even while waiting for an event. A
    /// lagged receiver falls back to a full refresh.
    pub async fn follow(&self, mut events: broadcast::Receiver<OrderEvent>) {
        let mut closed = self.closed_tx.subscribe();
        loop {
            if *closed.borrow_and_update() {
                return;
            }
            let received = tokio::select! {
                _ = closed.changed() => return,
                received = events.recv() => received,
            };
            match received {
                Ok(event) => {
                    self.apply_event(&event);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(scope = %self.scope, missed, "event stream lagged, refreshing");
                    if let Err(err) = self.refresh().await {
                        warn!(scope = %self.scope, %err, "refresh failed");
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    async fn drive(&self, mut pending: PendingMove) -> Result<Settlement, CoordinatorError> {
        let mut conflicts = 0;
        let mut refreshed = false;

        loop {
            match self.revalidate(&mut pending) {
                Ok(_) => {}
                Err(CoordinatorError::Rank(err)) if !refreshed => {
                    refreshed = true;
                    warn!(item = %pending.item, %err, "cannot predict against local view, refreshing");
                    let refresh = match err {
                        RankError::Exhausted { .. } => self.rebalance().await,
                        _ => self.refresh().await,
                    };
                    if let Err(err) = refresh {
                        return self.finish(pending, Err(transport_failure(err))).await;
                    }
                    continue;
                }
                Err(CoordinatorError::Rank(err)) => {
                    return self
                        .finish(pending, Err(TransportError::Rejected(err.to_string())))
                        .await;
                }
                Err(err) => return Err(err),
            }
            if !self.is_current(&pending) {
                return Ok(Settlement::Superseded);
            }

            let outcome = self.send(&pending).await;
            match outcome {
                Err(TransportError::Conflict)
                    if conflicts < self.config.conflict_retries && self.is_current(&pending) =>
                {
                    conflicts += 1;
                    warn!(item = %pending.item, attempt = conflicts, "conflict, refreshing and re-predicting");
                    if let Err(err) = self.refresh().await {
                        return self.finish(pending, Err(transport_failure(err))).await;
                    }
                }
                Err(TransportError::Exhausted) if !refreshed && self.is_current(&pending) => {
                    refreshed = true;
                    if let Err(err) = self.rebalance().await {
                        return self.finish(pending, Err(transport_failure(err))).await;
                    }
                }
                outcome => return self.finish(pending, outcome).await,
            }
        }
    }

    async fn send(&self, pending: &PendingMove) -> Result<CommittedRank, TransportError> {
        let req = pending.request();
        let call = match pending.kind {
            MoveKind::Move => self.transport.move_item(req),
            MoveKind::Insert => self.transport.insert_item(req),
        };
        match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(TransportError::Timeout)),
            None => call.await,
        }
    }

    async fn finish(
        &self,
        pending: PendingMove,
        outcome: Result<CommittedRank, TransportError>,
    ) -> Result<Settlement, CoordinatorError> {
        let item = pending.item;
        let settlement = self.settle(pending, outcome);
        match &settlement {
            Settlement::Discarded => Err(CoordinatorError::ViewClosed),
            Settlement::Adopted { .. } => {
                // Our neighbours may have been renumbered along with us.
                if let Err(err) = self.refresh().await {
                    warn!(%item, %err, "refresh after adopted rank failed");
                }
                Ok(settlement)
            }
            _ => Ok(settlement),
        }
    }
}

fn transport_failure(err: CoordinatorError) -> TransportError {
    match err {
        CoordinatorError::Transport(e) => e,
        other => TransportError::Rejected(other.to_string()),
    }
}
