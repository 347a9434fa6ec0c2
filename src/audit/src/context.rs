//! Caller context supplied by the application layer

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who is calling, and from which session.
///
/// Built by the application layer from its request/session state and passed
/// explicitly to the guard, the audit wrapper and mutation operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    /// Authenticated actor, if any
    pub actor_id: Option<Uuid>,

    /// Session identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Client IP address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// Client user agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl CallerContext {
    /// Context for an authenticated actor
    pub fn actor(actor_id: Uuid) -> Self {
        Self {
            actor_id: Some(actor_id),
            ..Default::default()
        }
    }

    /// Context with no authenticated actor
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.actor_id.is_some()
    }
}
