//! A lineup host over one SQLite database.
//!
//! Reads, removals, and rebalances go straight to the [`OrderService`].
//! Inserts and moves run through a [`Coordinator`] on an in-process
//! transport, so the CLI exercises the same protocol a UI client would.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use lineup_client::{Coordinator, CoordinatorError, InProcessTransport, Settlement, TransportError};
use lineup_store::{OrderService, SqliteOrderStore, StoreError};
use lineup_types::{CommittedRank, ItemId, RankedEntry, ReassignedRank, ScopeId};

use crate::config::LineupConfig;

#[derive(Error, Debug)]
pub enum HostError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error("rolled back: {0}")]
    RolledBack(TransportError),
    #[error("request for {0} did not settle")]
    Unsettled(ItemId),
}

pub type Result<T> = std::result::Result<T, HostError>;

/// Spacing report for `lineup check`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub scope_id: ScopeId,
    pub count: usize,
    pub average_gap: Option<f64>,
    pub min_gap: Option<f64>,
    pub longest_key: usize,
    pub rebalance_due: bool,
}

/// Read a scope argument: a UUID as-is, anything else as a label.
pub fn parse_scope(arg: &str) -> ScopeId {
    ScopeId::parse(arg).unwrap_or_else(|_| ScopeId::named(arg))
}

pub struct Host {
    store: Arc<SqliteOrderStore>,
    service: Arc<OrderService>,
    config: LineupConfig,
}

impl Host {
    pub fn new(store: SqliteOrderStore, config: LineupConfig) -> Self {
        let store = Arc::new(store);
        let service = Arc::new(OrderService::with_config(store.clone(), config.service));
        Self {
            store,
            service,
            config,
        }
    }

    pub fn open(db: impl AsRef<Path>, config: LineupConfig) -> Result<Self> {
        let db = db.as_ref();
        let store = SqliteOrderStore::open(db)?;
        info!(db = %db.display(), "opened order store");
        Ok(Self::new(store, config))
    }

    pub fn service(&self) -> &Arc<OrderService> {
        &self.service
    }

    pub fn config(&self) -> &LineupConfig {
        &self.config
    }

    /// Every scope with at least one item.
    pub fn scopes(&self) -> Result<Vec<ScopeId>> {
        Ok(self.store.scopes()?)
    }

    pub fn list(&self, scope: ScopeId) -> Result<Vec<RankedEntry>> {
        Ok(self.service.scope_items(scope)?)
    }

    pub async fn insert(
        &self,
        scope: ScopeId,
        item: ItemId,
        before: Option<ItemId>,
        after: Option<ItemId>,
    ) -> Result<CommittedRank> {
        let coord = self.coordinator(scope).await?;
        let settlement = coord.insert_item(item, before, after).await?;
        settled(item, settlement)
    }

    pub async fn move_item(
        &self,
        scope: ScopeId,
        item: ItemId,
        before: Option<ItemId>,
        after: Option<ItemId>,
    ) -> Result<CommittedRank> {
        let coord = self.coordinator(scope).await?;
        let settlement = coord.move_item(item, before, after).await?;
        settled(item, settlement)
    }

    pub fn remove(&self, scope: ScopeId, item: ItemId) -> Result<bool> {
        Ok(self.service.remove_item(scope, item)?)
    }

    pub fn rebalance(&self, scope: ScopeId) -> Result<Vec<ReassignedRank>> {
        Ok(self.service.rebalance_scope(scope)?)
    }

    pub fn check(&self, scope: ScopeId) -> Result<HealthReport> {
        let entries = self.service.scope_items(scope)?;
        let rebalancer = self.service.rebalancer();
        let metrics = rebalancer.health(&entries);
        Ok(HealthReport {
            scope_id: scope,
            count: metrics.count,
            average_gap: metrics.average_gap,
            min_gap: metrics.min_gap,
            longest_key: metrics.longest_key,
            rebalance_due: rebalancer.needs_rebalance(&entries),
        })
    }

    async fn coordinator(&self, scope: ScopeId) -> Result<Coordinator> {
        let transport = Arc::new(InProcessTransport::new(self.service.clone()));
        let coord = Coordinator::open(scope, transport, self.config.coordinator).await?;
        debug!(%scope, items = coord.view().len(), "coordinator ready");
        Ok(coord)
    }
}

fn settled(item: ItemId, settlement: Settlement) -> Result<CommittedRank> {
    match settlement {
        Settlement::Confirmed { rank } | Settlement::Adopted { rank } => Ok(CommittedRank { rank }),
        Settlement::RolledBack { error } => Err(HostError::RolledBack(error)),
        Settlement::Superseded | Settlement::Discarded => Err(HostError::Unsettled(item)),
    }
}
