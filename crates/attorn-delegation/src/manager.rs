//! The delegation manager.
//!
//! Owns the graph of delegations and is the only writer of their status.
//!
//! # Write Serialization
//!
//! Every write takes the graph's writer lock for the whole check-and-insert.
//! A per-principal lock is not enough: two inserts `a -> b` and `b -> a`
//! touch different principals, would each pass an isolated cycle check, and
//! together close a cycle. Reads share the lock and run concurrently.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use attorn_core::{Clock, DelegationId, SystemClock};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::attestation::AttestationService;
use crate::error::{DelegationError, DelegationResult};
use crate::model::{Delegation, DelegationStatus};

/// Default bound on delegation chains.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 5;

/// Delegation manager settings.
#[derive(Debug, Clone)]
pub struct DelegationConfig {
    /// Bound on active delegations per principal and on path length.
    pub max_chain_depth: usize,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    /// From principal to delegate.
    Down,
    /// From delegate to principal.
    Up,
}

#[derive(Debug, Default)]
struct Graph {
    delegations: HashMap<DelegationId, Delegation>,
    by_principal: HashMap<String, Vec<DelegationId>>,
    by_delegate: HashMap<String, Vec<DelegationId>>,
}

impl Graph {
    fn active_from<'a>(&'a self, principal: &str) -> impl Iterator<Item = &'a Delegation> + 'a {
        self.by_principal
            .get(principal)
            .into_iter()
            .flatten()
            .filter_map(|id| self.delegations.get(id))
            .filter(|d| d.is_active())
    }

    fn active_to<'a>(&'a self, delegate: &str) -> impl Iterator<Item = &'a Delegation> + 'a {
        self.by_delegate
            .get(delegate)
            .into_iter()
            .flatten()
            .filter_map(|id| self.delegations.get(id))
            .filter(|d| d.is_active())
    }

    fn next_hops<'a>(&'a self, node: &str, direction: Direction) -> Vec<&'a str> {
        match direction {
            Direction::Down => self
                .active_from(node)
                .map(|d| d.delegate_id.as_str())
                .collect(),
            Direction::Up => self
                .active_to(node)
                .map(|d| d.principal_id.as_str())
                .collect(),
        }
    }

    /// Whether an active path leads from `from` to `target`.
    fn reaches(&self, from: &str, target: &str) -> bool {
        let mut seen = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(node) = queue.pop_front() {
            for next in self.next_hops(node, Direction::Down) {
                if next == target {
                    return true;
                }
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }

    /// Longest active path from `node` in `direction`, in edges.
    ///
    /// Each node is measured once. The active graph is acyclic; a node met
    /// again on the current path counts as a dead end.
    fn longest_path<'a>(
        &'a self,
        node: &'a str,
        direction: Direction,
        memo: &mut HashMap<&'a str, usize>,
        on_path: &mut HashSet<&'a str>,
    ) -> usize {
        if let Some(&depth) = memo.get(node) {
            return depth;
        }
        if !on_path.insert(node) {
            return 0;
        }
        let mut longest = 0usize;
        for next in self.next_hops(node, direction) {
            let depth = self.longest_path(next, direction, memo, on_path);
            longest = longest.max(depth.saturating_add(1));
        }
        on_path.remove(node);
        memo.insert(node, longest);
        longest
    }

    fn longest(&self, node: &str, direction: Direction) -> usize {
        self.longest_path(node, direction, &mut HashMap::new(), &mut HashSet::new())
    }

    fn insert(&mut self, delegation: Delegation) {
        self.by_principal
            .entry(delegation.principal_id.clone())
            .or_default()
            .push(delegation.id.clone());
        self.by_delegate
            .entry(delegation.delegate_id.clone())
            .or_default()
            .push(delegation.id.clone());
        self.delegations.insert(delegation.id.clone(), delegation);
    }

    fn collect(&self, ids: Option<&Vec<DelegationId>>) -> Vec<Delegation> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.delegations.get(id))
            .cloned()
            .collect()
    }
}

/// Creates, tracks and revokes delegations.
#[derive(Debug)]
pub struct DelegationManager {
    config: DelegationConfig,
    graph: RwLock<Graph>,
    attestations: Option<Arc<AttestationService>>,
    clock: Arc<dyn Clock>,
}

impl DelegationManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new(config: DelegationConfig) -> Self {
        Self {
            config,
            graph: RwLock::new(Graph::default()),
            attestations: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Verify each referenced attestation when storing.
    #[must_use]
    pub fn with_attestation_service(mut self, service: Arc<AttestationService>) -> Self {
        self.attestations = Some(service);
        self
    }

    /// Use `clock` for validity checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The configured depth bound.
    #[must_use]
    pub fn max_chain_depth(&self) -> usize {
        self.config.max_chain_depth
    }

    /// Validate and store a delegation.
    ///
    /// # Errors
    ///
    /// Returns the first failed check: self-delegation, depth, cycle,
    /// validity period, then attestations. Nothing is stored on error.
    pub async fn store_delegation(&self, delegation: Delegation) -> DelegationResult<Delegation> {
        let principal = delegation.principal_id.as_str();
        let delegate = delegation.delegate_id.as_str();
        if principal == delegate {
            return Err(DelegationError::SelfDelegation {
                principal: principal.to_string(),
            });
        }

        let max = self.config.max_chain_depth;
        let mut graph = self.graph.write().await;

        if graph.delegations.contains_key(&delegation.id) {
            return Err(DelegationError::AlreadyExists {
                id: delegation.id.clone(),
            });
        }

        if graph.active_from(principal).count() >= max {
            return Err(DelegationError::ChainDepthExceeded {
                principal: principal.to_string(),
                max,
            });
        }

        if graph.reaches(delegate, principal) {
            warn!(principal, delegate, "rejected delegation cycle");
            return Err(DelegationError::CycleDetected {
                principal: principal.to_string(),
                delegate: delegate.to_string(),
            });
        }
        let downstream = graph.longest(delegate, Direction::Down);
        let upstream = graph.longest(principal, Direction::Up);
        if upstream.saturating_add(1).saturating_add(downstream) > max {
            return Err(DelegationError::ChainTooDeep {
                principal: principal.to_string(),
                delegate: delegate.to_string(),
                max,
            });
        }

        delegation.validity.check(self.clock.now())?;

        if delegation.attestations.is_empty() {
            return Err(DelegationError::MissingAttestation);
        }
        if let Some(service) = &self.attestations {
            for id in &delegation.attestations {
                service.verify_attestation(id)?;
            }
        }

        let mut stored = delegation;
        stored.status = DelegationStatus::Active;
        stored.revoked_at = None;
        graph.insert(stored.clone());
        info!(
            delegation_id = %stored.id,
            principal = %stored.principal_id,
            delegate = %stored.delegate_id,
            power_type = %stored.power_type,
            "delegation stored"
        );
        Ok(stored)
    }

    /// Mark a delegation revoked. Revoking an already revoked delegation
    /// returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationError::NotFound`] for an unknown ID.
    pub async fn revoke_delegation(&self, id: &DelegationId) -> DelegationResult<Delegation> {
        let now = self.clock.now();
        let mut graph = self.graph.write().await;
        let delegation = graph
            .delegations
            .get_mut(id)
            .ok_or_else(|| DelegationError::NotFound { id: id.clone() })?;
        if delegation.status == DelegationStatus::Active {
            delegation.status = DelegationStatus::Revoked;
            delegation.revoked_at = Some(now);
            info!(delegation_id = %id, "delegation revoked");
        }
        Ok(delegation.clone())
    }

    /// Fetch a delegation that is inside its validity period.
    ///
    /// The status is returned as stored; callers check
    /// [`Delegation::is_active`].
    ///
    /// # Errors
    ///
    /// Returns [`DelegationError::NotFound`] or
    /// [`DelegationError::NotCurrentlyValid`].
    pub async fn get_delegation(&self, id: &DelegationId) -> DelegationResult<Delegation> {
        let graph = self.graph.read().await;
        let delegation = graph
            .delegations
            .get(id)
            .ok_or_else(|| DelegationError::NotFound { id: id.clone() })?;
        if !delegation.validity.contains(self.clock.now()) {
            return Err(DelegationError::NotCurrentlyValid { id: id.clone() });
        }
        Ok(delegation.clone())
    }

    /// Every delegation granted by `principal`, any status.
    pub async fn delegations_by_principal(&self, principal: &str) -> Vec<Delegation> {
        let graph = self.graph.read().await;
        graph.collect(graph.by_principal.get(principal))
    }

    /// Every delegation received by `delegate`, any status.
    pub async fn delegations_for(&self, delegate: &str) -> Vec<Delegation> {
        let graph = self.graph.read().await;
        graph.collect(graph.by_delegate.get(delegate))
    }

    /// The active chain of authority ending at `delegate`, root first.
    ///
    /// Where several active delegations reach a node, the oldest is
    /// followed.
    pub async fn chain_for(&self, delegate: &str) -> Vec<Delegation> {
        let graph = self.graph.read().await;
        let mut chain = Vec::new();
        let mut seen = HashSet::from([delegate.to_string()]);
        let mut current = delegate.to_string();
        while chain.len() < self.config.max_chain_depth {
            let Some(edge) = graph.active_to(&current).min_by_key(|d| d.created_at) else {
                break;
            };
            if !seen.insert(edge.principal_id.clone()) {
                break;
            }
            current.clone_from(&edge.principal_id);
            chain.push(edge.clone());
        }
        chain.reverse();
        chain
    }

    /// Number of stored delegations, any status.
    pub async fn len(&self) -> usize {
        self.graph.read().await.delegations.len()
    }

    /// Whether no delegation is stored.
    pub async fn is_empty(&self) -> bool {
        self.graph.read().await.delegations.is_empty()
    }
}

impl Default for DelegationManager {
    fn default() -> Self {
        Self::new(DelegationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValidityPeriod;
    use attorn_core::{AttestationId, ManualClock, PowerType};
    use chrono::{Duration, Utc};

    fn delegation(principal: &str, delegate: &str) -> Delegation {
        Delegation::new(
            principal,
            delegate,
            PowerType::financial_transactions(),
            ValidityPeriod::starting(Utc::now(), Duration::days(30)),
        )
        .with_attestations([AttestationId::generate()])
    }

    #[tokio::test]
    async fn test_acyclic_inserts_succeed() {
        let manager = DelegationManager::default();
        for (p, d) in [("a", "b"), ("b", "c"), ("a", "c"), ("c", "d")] {
            manager.store_delegation(delegation(p, d)).await.unwrap();
        }
        assert_eq!(manager.len().await, 4);
    }

    #[tokio::test]
    async fn test_self_delegation_rejected() {
        let manager = DelegationManager::default();
        assert_eq!(
            manager
                .store_delegation(delegation("a", "a"))
                .await
                .unwrap_err()
                .code(),
            "self_delegation"
        );
    }

    #[tokio::test]
    async fn test_cycle_rejected() {
        let manager = DelegationManager::default();
        manager.store_delegation(delegation("a", "b")).await.unwrap();
        manager.store_delegation(delegation("b", "c")).await.unwrap();
        let err = manager
            .store_delegation(delegation("c", "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, DelegationError::CycleDetected { .. }));
        assert_eq!(manager.len().await, 2);
    }

    #[tokio::test]
    async fn test_cycle_found_on_any_branch() {
        let manager = DelegationManager::default();
        // b fans out; only the second branch leads back to a.
        manager.store_delegation(delegation("a", "b")).await.unwrap();
        manager.store_delegation(delegation("b", "x")).await.unwrap();
        manager.store_delegation(delegation("b", "y")).await.unwrap();
        manager.store_delegation(delegation("y", "z")).await.unwrap();
        assert!(matches!(
            manager.store_delegation(delegation("z", "a")).await,
            Err(DelegationError::CycleDetected { .. })
        ));
    }

    #[tokio::test]
    async fn test_revoked_edges_do_not_form_cycles() {
        let manager = DelegationManager::default();
        let ab = manager.store_delegation(delegation("a", "b")).await.unwrap();
        manager.revoke_delegation(&ab.id).await.unwrap();
        assert!(manager.store_delegation(delegation("b", "a")).await.is_ok());
    }

    #[tokio::test]
    async fn test_principal_fan_out_bounded() {
        let manager = DelegationManager::new(DelegationConfig { max_chain_depth: 2 });
        manager.store_delegation(delegation("a", "b")).await.unwrap();
        manager.store_delegation(delegation("a", "c")).await.unwrap();
        assert!(matches!(
            manager.store_delegation(delegation("a", "d")).await,
            Err(DelegationError::ChainDepthExceeded { max: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_path_length_bounded() {
        let manager = DelegationManager::new(DelegationConfig { max_chain_depth: 3 });
        manager.store_delegation(delegation("a", "b")).await.unwrap();
        manager.store_delegation(delegation("b", "c")).await.unwrap();
        manager.store_delegation(delegation("c", "d")).await.unwrap();
        // a -> b -> c -> d -> e would be four edges.
        assert!(matches!(
            manager.store_delegation(delegation("d", "e")).await,
            Err(DelegationError::ChainTooDeep { .. })
        ));
        // Joining two short chains the same way.
        manager.store_delegation(delegation("x", "y")).await.unwrap();
        assert!(matches!(
            manager.store_delegation(delegation("y", "a")).await,
            Err(DelegationError::ChainTooDeep { .. })
        ));
    }

    #[tokio::test]
    async fn test_validity_checked_at_store() {
        let manager = DelegationManager::default();
        let now = Utc::now();
        let long = Delegation::new(
            "a",
            "b",
            PowerType::contract_signing(),
            ValidityPeriod::starting(now, Duration::days(366)),
        )
        .with_attestations([AttestationId::generate()]);
        assert!(matches!(
            manager.store_delegation(long).await,
            Err(DelegationError::InvalidValidityPeriod { .. })
        ));
        let year = Delegation::new(
            "a",
            "b",
            PowerType::contract_signing(),
            ValidityPeriod::starting(now, Duration::days(365)),
        )
        .with_attestations([AttestationId::generate()]);
        assert!(manager.store_delegation(year).await.is_ok());
    }

    #[tokio::test]
    async fn test_attestation_required() {
        let manager = DelegationManager::default();
        let bare = Delegation::new(
            "a",
            "b",
            PowerType::contract_signing(),
            ValidityPeriod::starting(Utc::now(), Duration::days(1)),
        );
        assert!(matches!(
            manager.store_delegation(bare).await,
            Err(DelegationError::MissingAttestation)
        ));
        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_outside_validity_rejected() {
        let clock = Arc::new(ManualClock::starting_now());
        let manager = DelegationManager::default().with_clock(clock.clone());
        let stored = manager.store_delegation(delegation("a", "b")).await.unwrap();
        assert!(manager.get_delegation(&stored.id).await.is_ok());

        clock.advance(Duration::days(31));
        assert!(matches!(
            manager.get_delegation(&stored.id).await,
            Err(DelegationError::NotCurrentlyValid { .. })
        ));
    }

    #[tokio::test]
    async fn test_revoke_is_terminal_and_idempotent() {
        let manager = DelegationManager::default();
        let stored = manager.store_delegation(delegation("a", "b")).await.unwrap();
        let revoked = manager.revoke_delegation(&stored.id).await.unwrap();
        assert_eq!(revoked.status, DelegationStatus::Revoked);
        let again = manager.revoke_delegation(&stored.id).await.unwrap();
        assert_eq!(again.revoked_at, revoked.revoked_at);
        assert!(!manager.get_delegation(&stored.id).await.unwrap().is_active());
        assert!(matches!(
            manager.revoke_delegation(&DelegationId::generate()).await,
            Err(DelegationError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_queries_and_chain() {
        let manager = DelegationManager::default();
        manager.store_delegation(delegation("a", "b")).await.unwrap();
        manager.store_delegation(delegation("b", "c")).await.unwrap();
        manager.store_delegation(delegation("a", "x")).await.unwrap();

        assert_eq!(manager.delegations_by_principal("a").await.len(), 2);
        assert_eq!(manager.delegations_for("c").await.len(), 1);

        let chain = manager.chain_for("c").await;
        let links: Vec<(&str, &str)> = chain
            .iter()
            .map(|d| (d.principal_id.as_str(), d.delegate_id.as_str()))
            .collect();
        assert_eq!(links, vec![("a", "b"), ("b", "c")]);
        assert!(manager.chain_for("a").await.is_empty());
    }

    #[tokio::test]
    async fn test_dense_layers_checked_quickly() {
        // Ten layers of ten principals, every node linked to the whole next
        // layer: 10^9 distinct paths from a root above the first layer.
        let manager = DelegationManager::new(DelegationConfig { max_chain_depth: 12 });
        let node = |layer: usize, i: usize| format!("l{layer}n{i}");
        for layer in 0..9 {
            for i in 0..10 {
                for j in 0..10 {
                    manager
                        .store_delegation(delegation(&node(layer, i), &node(layer + 1, j)))
                        .await
                        .unwrap();
                }
            }
        }

        let check = async {
            for i in 0..10 {
                manager
                    .store_delegation(delegation("root", &node(0, i)))
                    .await
                    .unwrap();
            }
            // Ten edges from root to the last layer, then two above root.
            manager.store_delegation(delegation("r1", "root")).await.unwrap();
            manager.store_delegation(delegation("r2", "r1")).await.unwrap();
            assert!(matches!(
                manager.store_delegation(delegation("r3", "r2")).await,
                Err(DelegationError::ChainTooDeep { max: 12, .. })
            ));
            assert!(matches!(
                manager.store_delegation(delegation(&node(9, 0), "r2")).await,
                Err(DelegationError::CycleDetected { .. })
            ));
        };
        tokio::time::timeout(std::time::Duration::from_secs(10), check)
            .await
            .unwrap();
    }

    fn has_cycle(edges: &[Delegation]) -> bool {
        fn visit(node: &str, edges: &[Delegation], path: &mut Vec<String>) -> bool {
            if path.iter().any(|p| p == node) {
                return true;
            }
            path.push(node.to_string());
            let found = edges
                .iter()
                .filter(|d| d.is_active() && d.principal_id == node)
                .any(|d| visit(&d.delegate_id, edges, path));
            path.pop();
            found
        }
        edges
            .iter()
            .any(|d| visit(&d.principal_id, edges, &mut Vec::new()))
    }

    proptest::proptest! {
        #[test]
        fn prop_stored_graph_stays_acyclic(
            edges in proptest::collection::vec((0u8..6, 0u8..6), 1..40)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let manager = DelegationManager::new(DelegationConfig { max_chain_depth: 4 });
                for (p, d) in edges {
                    let _ = manager
                        .store_delegation(delegation(&format!("n{p}"), &format!("n{d}")))
                        .await;
                }
                let mut stored = Vec::new();
                for n in 0..6 {
                    stored.extend(manager.delegations_by_principal(&format!("n{n}")).await);
                }
                proptest::prop_assert!(!has_cycle(&stored));
                for delegate in 0..6 {
                    let chain = manager.chain_for(&format!("n{delegate}")).await;
                    proptest::prop_assert!(chain.len() <= 4);
                }
                Ok(())
            })?;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_opposite_edges_never_cycle() {
        for _ in 0..20 {
            let manager = Arc::new(DelegationManager::default());
            let forward = {
                let m = Arc::clone(&manager);
                tokio::spawn(async move { m.store_delegation(delegation("p", "q")).await })
            };
            let backward = {
                let m = Arc::clone(&manager);
                tokio::spawn(async move { m.store_delegation(delegation("q", "p")).await })
            };
            let results = [forward.await.unwrap(), backward.await.unwrap()];
            let ok = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(ok, 1, "exactly one of two opposite edges may be stored");
        }
    }
}
