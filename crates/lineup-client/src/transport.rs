//! How a coordinator reaches the host.
//!
//! `MoveTransport` is the client's view of the host contract. A networked
//! host implements it over its wire of choice; [`InProcessTransport`] calls an
//! [`OrderService`] directly, which is what embedded hosts and tests use.

use std::sync::Arc;

use async_trait::async_trait;

use lineup_store::OrderService;
use lineup_types::{
    CommittedRank, InsertItemRequest, MoveItemRequest, RankedEntry, ReassignedRank, ScopeId,
};

use crate::TransportError;

#[async_trait]
pub trait MoveTransport: Send + Sync {
    /// `GET scope-items`.
    async fn scope_items(&self, scope: ScopeId) -> Result<Vec<RankedEntry>, TransportError>;

    /// `POST move-item`.
    async fn move_item(&self, req: MoveItemRequest) -> Result<CommittedRank, TransportError>;

    /// `POST insert-item`.
    async fn insert_item(&self, req: InsertItemRequest) -> Result<CommittedRank, TransportError>;

    /// `POST rebalance-scope`.
    async fn rebalance_scope(&self, scope: ScopeId) -> Result<Vec<ReassignedRank>, TransportError>;
}

/// Transport that calls an in-process [`OrderService`].
#[derive(Clone)]
pub struct InProcessTransport {
    service: Arc<OrderService>,
}

impl InProcessTransport {
    pub fn new(service: Arc<OrderService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<OrderService> {
        &self.service
    }
}

// The service only blocks on its store and never across an await, so the
// calls below run inline on the caller's task.
#[async_trait]
impl MoveTransport for InProcessTransport {
    async fn scope_items(&self, scope: ScopeId) -> Result<Vec<RankedEntry>, TransportError> {
        Ok(self.service.scope_items(scope)?)
    }

    async fn move_item(&self, req: MoveItemRequest) -> Result<CommittedRank, TransportError> {
        Ok(self.service.move_item(&req)?)
    }

    async fn insert_item(&self, req: InsertItemRequest) -> Result<CommittedRank, TransportError> {
        Ok(self.service.insert_item(&req)?)
    }

    async fn rebalance_scope(&self, scope: ScopeId) -> Result<Vec<ReassignedRank>, TransportError> {
        Ok(self.service.rebalance_scope(scope)?)
    }
}
