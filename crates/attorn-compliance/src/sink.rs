//! Compliance events and where they go.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Outcome of one compliance check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceEvent {
    /// Token the action was attempted under.
    pub token_id: String,
    /// The action.
    pub action: String,
    /// When the check ran.
    pub timestamp: DateTime<Utc>,
    /// Whether the action was compliant.
    pub compliant: bool,
    /// Violation category, when not compliant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation_type: Option<String>,
    /// Rules broken, when not compliant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violation_rules: Vec<String>,
    /// Human-readable detail, when not compliant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Fire-and-forget destination for compliance events.
pub trait ComplianceSink: Send + Sync + std::fmt::Debug {
    /// Accept one event. Must not block or fail the caller.
    fn emit(&self, event: ComplianceEvent);
}

/// Aggregate counts over recorded events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceStats {
    /// Every recorded check.
    pub total: usize,
    /// Compliant checks.
    pub compliant: usize,
    /// Non-compliant checks.
    pub violations: usize,
    /// Violations by category.
    pub by_type: BTreeMap<String, usize>,
    /// Violations by rule.
    pub by_rule: BTreeMap<String, usize>,
    /// Most recent violation.
    pub last_violation: Option<DateTime<Utc>>,
    /// Most recent compliant check.
    pub last_compliant: Option<DateTime<Utc>>,
}

impl ComplianceStats {
    fn record(&mut self, event: &ComplianceEvent) {
        self.total = self.total.saturating_add(1);
        if event.compliant {
            self.compliant = self.compliant.saturating_add(1);
            self.last_compliant = self.last_compliant.max(Some(event.timestamp));
            return;
        }
        self.violations = self.violations.saturating_add(1);
        self.last_violation = self.last_violation.max(Some(event.timestamp));
        if let Some(kind) = &event.violation_type {
            bump(&mut self.by_type, kind);
        }
        for rule in &event.violation_rules {
            bump(&mut self.by_rule, rule);
        }
    }
}

fn bump(counts: &mut BTreeMap<String, usize>, key: &str) {
    let count = counts.entry(key.to_string()).or_default();
    *count = count.saturating_add(1);
}

#[derive(Debug, Default)]
struct Recorded {
    events: Vec<ComplianceEvent>,
    stats: ComplianceStats,
}

/// Keeps every event in memory with running statistics.
#[derive(Debug, Default)]
pub struct MemoryComplianceSink {
    inner: Mutex<Recorded>,
}

impl MemoryComplianceSink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<ComplianceEvent> {
        self.lock().events.clone()
    }

    /// Events for one token.
    #[must_use]
    pub fn events_for(&self, token_id: &str) -> Vec<ComplianceEvent> {
        self.lock()
            .events
            .iter()
            .filter(|e| e.token_id == token_id)
            .cloned()
            .collect()
    }

    /// Statistics over all events.
    #[must_use]
    pub fn stats(&self) -> ComplianceStats {
        self.lock().stats.clone()
    }

    /// Statistics over one token's events.
    #[must_use]
    pub fn stats_for(&self, token_id: &str) -> ComplianceStats {
        let mut stats = ComplianceStats::default();
        for event in self.lock().events.iter().filter(|e| e.token_id == token_id) {
            stats.record(event);
        }
        stats
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ComplianceSink for MemoryComplianceSink {
    fn emit(&self, event: ComplianceEvent) {
        let mut inner = self.lock();
        inner.stats.record(&event);
        inner.events.push(event);
    }
}

/// Forwards events to an async collector over a bounded channel.
///
/// A full or closed channel drops the event with a warning.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ComplianceEvent>,
}

impl ChannelSink {
    /// A sink and the receiver its collector reads from.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ComplianceEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ComplianceSink for ChannelSink {
    fn emit(&self, event: ComplianceEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!(error = %e, "compliance event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(token: &str, violation: Option<&str>) -> ComplianceEvent {
        ComplianceEvent {
            token_id: token.into(),
            action: "transfer".into(),
            timestamp: Utc::now(),
            compliant: violation.is_none(),
            violation_type: violation.map(Into::into),
            violation_rules: violation.map(|v| vec![format!("{v}-rule")]).unwrap_or_default(),
            detail: None,
        }
    }

    #[test]
    fn test_stats() {
        let sink = MemoryComplianceSink::new();
        sink.emit(event("t1", None));
        sink.emit(event("t1", Some("value_limit")));
        sink.emit(event("t2", Some("value_limit")));
        sink.emit(event("t2", Some("geographic")));

        let stats = sink.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.compliant, 1);
        assert_eq!(stats.violations, 3);
        assert_eq!(stats.by_type["value_limit"], 2);
        assert_eq!(stats.by_rule["geographic-rule"], 1);
        assert!(stats.last_compliant.is_some());

        let t1 = sink.stats_for("t1");
        assert_eq!((t1.total, t1.violations), (2, 1));
        assert_eq!(sink.events_for("t2").len(), 2);
    }

    #[tokio::test]
    async fn test_channel_sink_drops_when_full() {
        let (sink, mut rx) = ChannelSink::new(1);
        sink.emit(event("t1", None));
        sink.emit(event("t2", None));
        assert_eq!(rx.recv().await.unwrap().token_id, "t1");
        assert!(rx.try_recv().is_err());
    }
}
