//! Per-request correlation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one engine request, carried into its tracing span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Unique request identifier.
    pub request_id: Uuid,
    /// Shared by a request and the requests it spawns.
    pub correlation_id: Uuid,
    /// The spawning request, if any.
    pub parent_id: Option<Uuid>,
    /// Component handling the request.
    pub component: String,
    /// Operation being performed.
    pub operation: Option<String>,
    /// The acting agent or principal, once known.
    pub subject: Option<String>,
    /// When the request started.
    pub started_at: DateTime<Utc>,
}

impl RequestContext {
    /// A fresh context for `component`.
    #[must_use]
    pub fn new(component: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            request_id: id,
            correlation_id: id,
            parent_id: None,
            component: component.into(),
            operation: None,
            subject: None,
            started_at: Utc::now(),
        }
    }

    /// A context for work done on behalf of this one.
    #[must_use]
    pub fn child(&self, component: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            correlation_id: self.correlation_id,
            parent_id: Some(self.request_id),
            component: component.into(),
            operation: None,
            subject: self.subject.clone(),
            started_at: Utc::now(),
        }
    }

    /// Set the operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Set the subject.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Milliseconds since the request started.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// A span carrying this context's fields.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            correlation_id = %self.correlation_id,
            component = %self.component,
            operation = self.operation.as_deref(),
            subject = self.subject.as_deref(),
        )
    }
}

/// Keeps a request span entered and logs completion on drop.
///
/// Holds an entered span, so keep it off `.await` points; use
/// `tracing::Instrument` with [`RequestContext::span`] in async code.
pub struct RequestGuard {
    context: RequestContext,
    _span: tracing::span::EnteredSpan,
}

impl RequestGuard {
    /// Enter the span of `context`.
    #[must_use]
    pub fn new(context: RequestContext) -> Self {
        let span = context.span().entered();
        tracing::debug!("request started");
        Self {
            context,
            _span: span,
        }
    }

    /// The request context.
    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.context
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        tracing::debug!(elapsed_ms = self.context.elapsed_ms(), "request completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_inherits_correlation() {
        let parent = RequestContext::new("engine")
            .with_operation("authorize")
            .with_subject("agent-7");
        let child = parent.child("policy");

        assert_ne!(child.request_id, parent.request_id);
        assert_eq!(child.correlation_id, parent.correlation_id);
        assert_eq!(child.parent_id, Some(parent.request_id));
        assert_eq!(child.subject.as_deref(), Some("agent-7"));
        assert!(child.operation.is_none());
    }

    #[test]
    fn test_serialization() {
        let ctx = RequestContext::new("engine").with_operation("grant");
        let json = serde_json::to_string(&ctx).unwrap();
        assert!(json.contains("\"component\":\"engine\""));
        let parsed: RequestContext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ctx);
    }

    #[test]
    fn test_guard_exposes_context() {
        let guard = RequestGuard::new(RequestContext::new("engine"));
        assert_eq!(guard.context().component, "engine");
        assert!(guard.context().elapsed_ms() >= 0);
    }
}
