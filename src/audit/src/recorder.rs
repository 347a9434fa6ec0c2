//! Audit recorder
//!
//! Sanitizes events and hands them to an [`AuditStore`]. Recording methods
//! return `Ok(None)` when the event was suppressed by configuration and
//! `Ok(Some(id))` once it has been persisted.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::AuditConfig;
use crate::context::CallerContext;
use crate::error::Result;
use crate::event::{AuditEvent, AuditEventId, NewAuditEvent, ResourceRef};
use crate::sanitize::{Sanitizer, ValueMap};
use crate::store::{AuditQuery, AuditStore};

/// Action recorded for HTTP requests
pub const HTTP_REQUEST: &str = "HTTP_REQUEST";

/// Resource type recorded for authentication events
pub const AUTHENTICATION: &str = "Authentication";

/// Sanitizing audit recorder
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    sanitizer: Sanitizer,
    config: AuditConfig,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>, config: AuditConfig) -> Self {
        let sanitizer = Sanitizer::new(config.matcher());
        Self {
            store,
            sanitizer,
            config,
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }

    /// Sanitize and persist an event
    ///
    /// Storage failures are logged and returned; callers guarding a business
    /// operation should use [`AuditRecorder::record_best_effort`] instead.
    pub async fn record(&self, event: NewAuditEvent) -> Result<Option<AuditEventId>> {
        if !self.config.enabled {
            debug!(action = %event.action, "Audit disabled, event suppressed");
            return Ok(None);
        }

        let event = event.into_event(&self.sanitizer);
        let action = event.action.clone();
        let actor = event.actor_id;

        match self.store.append(event).await {
            Ok(id) => {
                debug!(%id, %action, actor = ?actor, "Recorded audit event");
                Ok(Some(id))
            }
            Err(e) => {
                error!(%action, actor = ?actor, error = %e, "Failed to record audit event");
                Err(e)
            }
        }
    }

    /// Record an event without ever failing the caller
    pub async fn record_best_effort(&self, event: NewAuditEvent) -> Option<AuditEventId> {
        let action = event.action.clone();
        match self.record(event).await {
            Ok(id) => id,
            Err(e) => {
                warn!(%action, error = %e, "Audit emission failed, continuing");
                None
            }
        }
    }

    /// Record a create/update/delete of a model
    ///
    /// Old and new values are sanitized independently.
    pub async fn record_model_change(
        &self,
        action: &str,
        resource: &ResourceRef,
        ctx: &CallerContext,
        old_values: Option<ValueMap>,
        new_values: Option<ValueMap>,
    ) -> Result<Option<AuditEventId>> {
        if !self.config.log_models {
            return Ok(None);
        }

        let mut event = NewAuditEvent::new(action).context(ctx).resource(resource);
        event.old_values = old_values;
        event.new_values = new_values;

        self.record(event).await
    }

    /// Record a login/logout style event
    pub async fn record_authentication(
        &self,
        action: &str,
        user_id: Option<Uuid>,
        username: Option<&str>,
        success: bool,
        ctx: &CallerContext,
        metadata: Option<ValueMap>,
    ) -> Result<Option<AuditEventId>> {
        if !self.config.log_authentication {
            return Ok(None);
        }

        let mut metadata = metadata.unwrap_or_default();
        metadata.insert("success".into(), Value::Bool(success));
        metadata.insert(
            "username".into(),
            username.map_or(Value::Null, |u| Value::String(u.to_string())),
        );

        let mut message = format!("Authentication {}", action.to_lowercase());
        if let Some(username) = username {
            message.push_str(&format!(" for user {}", username));
        }
        if !success {
            message.push_str(" (failed)");
        }

        let event = NewAuditEvent::new(action)
            .context(ctx)
            .actor(user_id.or(ctx.actor_id))
            .resource_type(AUTHENTICATION)
            .metadata(metadata)
            .message(message);

        self.record(event).await
    }

    /// Record an HTTP request/response pair
    pub async fn record_request(
        &self,
        method: &str,
        path: &str,
        ctx: &CallerContext,
        request_data: Option<ValueMap>,
        response_status: Option<u16>,
        metadata: Option<ValueMap>,
    ) -> Result<Option<AuditEventId>> {
        if !self.config.log_requests {
            return Ok(None);
        }

        let mut event = NewAuditEvent::new(HTTP_REQUEST)
            .context(ctx)
            .request(method, path)
            .metadata(metadata.unwrap_or_default());
        event.request_data = request_data;
        event.response_status = response_status;

        self.record(event).await
    }

    /// Events performed by `actor_id`, newest first
    pub async fn user_activity(
        &self,
        actor_id: Uuid,
        limit: usize,
        offset: usize,
        action_filter: Option<&str>,
    ) -> Result<Vec<AuditEvent>> {
        let query = AuditQuery {
            actor_id: Some(actor_id),
            action: action_filter.map(str::to_string),
            limit,
            offset,
            ..Default::default()
        };
        self.store.query(&query).await
    }

    /// Events touching one resource, newest first
    pub async fn resource_history(
        &self,
        resource_type: &str,
        resource_id: &str,
        limit: usize,
    ) -> Result<Vec<AuditEvent>> {
        let query = AuditQuery {
            resource_type: Some(resource_type.to_string()),
            resource_id: Some(resource_id.to_string()),
            limit,
            ..Default::default()
        };
        self.store.query(&query).await
    }
}
