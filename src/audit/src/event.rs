//! Audit event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::CallerContext;
use crate::sanitize::{Sanitizer, ValueMap};

/// Identifier assigned to a recorded event
pub type AuditEventId = Uuid;

/// A recorded audit event
///
/// Every map on a recorded event has already been sanitized. Events are
/// append-only: no store exposes an update or delete path for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: AuditEventId,

    /// Actor who performed the action
    pub actor_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Action name (e.g. `ROLE_ASSIGNED`, `LOGIN`, `EXPORT_FAILED`)
    pub action: String,

    /// Type of the affected resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    /// ID of the affected resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    /// Human readable representation of the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_repr: Option<String>,

    /// Previous values (updates)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_values: Option<ValueMap>,

    /// New values (creates/updates)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_values: Option<ValueMap>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_data: Option<ValueMap>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,

    /// Free-form metadata
    #[serde(default)]
    pub metadata: ValueMap,

    /// Human readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Recording time
    pub created_at: DateTime<Utc>,
}

/// Reference to the resource a model change applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub repr: String,
}

impl ResourceRef {
    pub fn new(
        resource_type: impl Into<String>,
        resource_id: Option<String>,
        repr: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id,
            repr: repr.into(),
        }
    }
}

/// Unsanitized event under construction
///
/// Built by callers and handed to the recorder, which sanitizes it and
/// stamps the ID and timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewAuditEvent {
    pub action: String,
    pub actor_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub resource_repr: Option<String>,
    pub old_values: Option<ValueMap>,
    pub new_values: Option<ValueMap>,
    pub request_method: Option<String>,
    pub request_path: Option<String>,
    pub request_data: Option<ValueMap>,
    pub response_status: Option<u16>,
    pub metadata: ValueMap,
    pub message: Option<String>,
}

impl NewAuditEvent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }

    /// Copy actor and session details from the caller context
    pub fn context(mut self, ctx: &CallerContext) -> Self {
        self.actor_id = ctx.actor_id;
        self.session_id = ctx.session_id.clone();
        self.ip_address = ctx.ip_address.clone();
        self.user_agent = ctx.user_agent.clone();
        self
    }

    pub fn actor(mut self, actor_id: Option<Uuid>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn resource(mut self, resource: &ResourceRef) -> Self {
        self.resource_type = Some(resource.resource_type.clone());
        self.resource_id = resource.resource_id.clone();
        self.resource_repr = Some(resource.repr.clone());
        self
    }

    pub fn old_values(mut self, values: ValueMap) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn new_values(mut self, values: ValueMap) -> Self {
        self.new_values = Some(values);
        self
    }

    pub fn request(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.request_method = Some(method.into());
        self.request_path = Some(path.into());
        self
    }

    pub fn request_data(mut self, data: ValueMap) -> Self {
        self.request_data = Some(data);
        self
    }

    pub fn response_status(mut self, status: u16) -> Self {
        self.response_status = Some(status);
        self
    }

    pub fn metadata(mut self, metadata: ValueMap) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn metadata_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sanitize every map independently and stamp ID + timestamp
    pub fn into_event(self, sanitizer: &Sanitizer) -> AuditEvent {
        AuditEvent {
            id: Uuid::new_v4(),
            actor_id: self.actor_id,
            session_id: self.session_id,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            action: self.action,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            resource_repr: self.resource_repr,
            old_values: self.old_values.as_ref().map(|m| sanitizer.sanitize_map(m)),
            new_values: self.new_values.as_ref().map(|m| sanitizer.sanitize_map(m)),
            request_method: self.request_method,
            request_path: self.request_path,
            request_data: self.request_data.as_ref().map(|m| sanitizer.sanitize_map(m)),
            response_status: self.response_status,
            metadata: sanitizer.sanitize_map(&self.metadata),
            message: self.message,
            created_at: Utc::now(),
        }
    }
}
