//! Audit event storage

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use crate::event::{AuditEvent, AuditEventId};

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresAuditStore;

/// Filter for audit queries. Results are ordered newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditQuery {
    pub actor_id: Option<Uuid>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            actor_id: None,
            action: None,
            resource_type: None,
            resource_id: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl AuditQuery {
    /// Whether `event` passes every filter set on this query
    pub fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(actor) = self.actor_id {
            if event.actor_id != Some(actor) {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if &event.action != action {
                return false;
            }
        }
        if let Some(resource_type) = &self.resource_type {
            if event.resource_type.as_ref() != Some(resource_type) {
                return false;
            }
        }
        if let Some(resource_id) = &self.resource_id {
            if event.resource_id.as_ref() != Some(resource_id) {
                return false;
            }
        }
        true
    }
}

/// Append-only audit store
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist an already sanitized event and return its ID
    async fn append(&self, event: AuditEvent) -> Result<AuditEventId>;

    /// Query events, newest first
    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>>;
}

/// Append-only in-memory audit store
///
/// Unbounded by default. With a capacity set, appends past it are rejected
/// with [`AuditError::Storage`]; stored events are never dropped.
pub struct InMemoryAuditStore {
    events: Arc<RwLock<Vec<AuditEvent>>>,
    capacity: Option<usize>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            capacity: None,
        }
    }

    /// Reject appends once `capacity` events are stored
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::with_capacity(capacity.min(1024)))),
            capacity: Some(capacity),
        }
    }

    /// Store sized by [`AuditConfig::store_capacity`]
    pub fn from_config(config: &AuditConfig) -> Self {
        match config.store_capacity {
            Some(capacity) => Self::with_capacity(capacity),
            None => Self::new(),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Snapshot of all stored events, oldest first
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, event: AuditEvent) -> Result<AuditEventId> {
        let id = event.id;
        let mut events = self.events.write().await;

        if let Some(capacity) = self.capacity {
            if events.len() >= capacity {
                warn!(capacity, action = %event.action, "Audit store full, rejecting event");
                return Err(AuditError::Storage(format!(
                    "in-memory audit store is full ({} events)",
                    capacity
                )));
            }
        }

        events.push(event);
        Ok(id)
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        let events = self.events.read().await;

        Ok(events
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }
}
