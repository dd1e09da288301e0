//! Decision logging and enforcement handlers.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::error::PolicyResult;
use crate::model::Decision;

/// Default number of decisions a [`MemoryDecisionLog`] retains.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Records final decisions before enforcement.
pub trait DecisionLog: Send + Sync + std::fmt::Debug {
    /// Record one decision.
    fn record(&self, decision: &Decision);
}

/// Bounded in-memory decision log. The oldest entries are dropped first.
#[derive(Debug)]
pub struct MemoryDecisionLog {
    entries: Mutex<VecDeque<Decision>>,
    capacity: usize,
}

impl Default for MemoryDecisionLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl MemoryDecisionLog {
    /// A log retaining at most `capacity` decisions.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY))),
            capacity,
        }
    }

    /// Retained decisions, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<Decision> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Number of retained decisions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DecisionLog for MemoryDecisionLog {
    fn record(&self, decision: &Decision) {
        info!(
            subject = %decision.subject,
            resource = %decision.resource,
            action = %decision.action,
            effect = %decision.effect,
            policy_id = decision.policy_id.as_deref().unwrap_or("-"),
            rule_id = decision.rule_id.as_deref().unwrap_or("-"),
            "policy decision"
        );
        if self.capacity == 0 {
            return;
        }
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(decision.clone());
    }
}

/// Acts on a logged decision. Handlers run in priority order and the first
/// failure aborts the authorization.
#[async_trait]
pub trait EnforcementHandler: Send + Sync + std::fmt::Debug {
    /// Identifier, for errors and logs.
    fn id(&self) -> &str;

    /// Higher runs first.
    fn priority(&self) -> i32 {
        0
    }

    /// Enforce `decision`.
    ///
    /// # Errors
    ///
    /// Any error aborts enforcement.
    async fn enforce(&self, decision: &Decision) -> PolicyResult<()>;
}
