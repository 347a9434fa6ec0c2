//! Audit wrapper for arbitrary async operations
//!
//! An [`AuditWrapper`] is built once per action and applied explicitly at
//! call sites:
//!
//! ```rust
//! use rolegate_audit::{AuditConfig, AuditRecorder, AuditWrapper, CallerContext, InMemoryAuditStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), std::io::Error> {
//! let recorder = Arc::new(AuditRecorder::new(
//!     Arc::new(InMemoryAuditStore::new()),
//!     AuditConfig::default(),
//! ));
//! let export = AuditWrapper::new(recorder, "EXPORT_REPORT").resource_type("Report");
//!
//! let rows = export
//!     .run(&CallerContext::anonymous(), || async { Ok::<_, std::io::Error>(42) })
//!     .await?;
//! assert_eq!(rows, 42);
//! # Ok(())
//! # }
//! ```

use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use crate::context::CallerContext;
use crate::event::NewAuditEvent;
use crate::recorder::AuditRecorder;
use crate::sanitize::ValueMap;

/// Suffix appended to the action name when the operation fails
pub const FAILED_SUFFIX: &str = "_FAILED";

/// Records one audit event per wrapped call, on success or failure
#[derive(Clone)]
pub struct AuditWrapper {
    recorder: Arc<AuditRecorder>,
    action: String,
    resource_type: Option<String>,
}

impl AuditWrapper {
    pub fn new(recorder: Arc<AuditRecorder>, action: impl Into<String>) -> Self {
        Self {
            recorder,
            action: action.into(),
            resource_type: None,
        }
    }

    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Action name recorded when the operation fails
    pub fn failed_action(&self) -> String {
        format!("{}{}", self.action, FAILED_SUFFIX)
    }

    /// Run `operation` and record its outcome
    ///
    /// The operation's result is returned untouched. Audit failures are
    /// logged and never replace or mask it.
    pub async fn run<F, Fut, T, E>(&self, ctx: &CallerContext, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_with_arguments(ctx, ValueMap::new(), operation).await
    }

    /// Like [`AuditWrapper::run`], also recording the call arguments
    ///
    /// Arguments go through the recorder's sanitizer like any metadata.
    pub async fn run_with_arguments<F, Fut, T, E>(
        &self,
        ctx: &CallerContext,
        arguments: ValueMap,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let result = operation().await;

        let event = match &result {
            Ok(_) => self.base_event(&self.action, ctx, arguments),
            Err(e) => self
                .base_event(&self.failed_action(), ctx, arguments)
                .metadata_entry("error", e.to_string())
                .message(format!("Failed to {}: {}", self.action.to_lowercase(), e)),
        };
        self.recorder.record_best_effort(event).await;

        result
    }

    fn base_event(&self, action: &str, ctx: &CallerContext, arguments: ValueMap) -> NewAuditEvent {
        let mut event = NewAuditEvent::new(action)
            .context(ctx)
            .metadata_entry("operation", self.action.clone());

        if let Some(resource_type) = &self.resource_type {
            event = event.resource_type(resource_type.clone());
        }
        if !arguments.is_empty() {
            event = event.metadata_entry("arguments", Value::Object(arguments));
        }

        event
    }
}
