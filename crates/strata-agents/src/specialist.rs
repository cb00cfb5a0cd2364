use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::debug;

use strata_core::error::Result;
use strata_core::types::{AnalysisRequest, ChangeRecord, DirectAnalysis, ImpactResult};

/// A domain expert node in the dependency graph.
///
/// A producer runs [`analyze_direct`](Specialist::analyze_direct) against
/// its own layer; consumers react to the resulting change records through
/// [`analyze_upstream_impact`](Specialist::analyze_upstream_impact). Edges
/// are held by the producer: registering a downstream node makes this node
/// feed its findings to that consumer during a cascade.
pub trait Specialist: Send + Sync + 'static {
    /// Stable identifier, unique within a registry.
    fn name(&self) -> &str;

    /// Human-readable domain label for reports.
    fn domain(&self) -> &str;

    /// Analyze this node's own layer for the requested transition.
    fn analyze_direct(&self, request: AnalysisRequest) -> BoxFuture<'_, Result<DirectAnalysis>>;

    /// Analyze what upstream changes mean for this node's domain.
    ///
    /// An empty `upstream` list yields an empty low-risk result without
    /// touching the reasoning backend.
    fn analyze_upstream_impact(&self, upstream: Vec<ChangeRecord>) -> BoxFuture<'_, Result<ImpactResult>>;

    /// Register a consumer of this node's findings. Registering the same
    /// node name twice leaves a single edge.
    fn register_downstream(&self, node: Arc<dyn Specialist>);

    /// Snapshot of consumers in registration order.
    fn downstream(&self) -> Vec<Arc<dyn Specialist>>;
}

/// Registration-ordered set of downstream consumers, deduplicated by name.
pub struct DownstreamSet {
    owner: String,
    nodes: RwLock<Vec<Arc<dyn Specialist>>>,
}

impl DownstreamSet {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            nodes: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, node: Arc<dyn Specialist>) {
        let mut nodes = self.nodes.write();
        if nodes.iter().any(|existing| existing.name() == node.name()) {
            debug!(producer = %self.owner, consumer = node.name(), "Downstream already registered");
            return;
        }
        debug!(producer = %self.owner, consumer = node.name(), "Downstream registered");
        nodes.push(node);
    }

    pub fn snapshot(&self) -> Vec<Arc<dyn Specialist>> {
        self.nodes.read().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.nodes
            .read()
            .iter()
            .map(|node| node.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::StubSpecialist;
    use super::*;

    #[test]
    fn test_register_is_idempotent_by_name() {
        let set = DownstreamSet::new("producer");
        set.register(Arc::new(StubSpecialist::new("consumer")));
        set.register(Arc::new(StubSpecialist::new("consumer")));

        assert_eq!(set.len(), 1);
        assert_eq!(set.names(), vec!["consumer"]);
    }

    #[test]
    fn test_snapshot_preserves_registration_order() {
        let set = DownstreamSet::new("producer");
        set.register(Arc::new(StubSpecialist::new("b")));
        set.register(Arc::new(StubSpecialist::new("a")));
        set.register(Arc::new(StubSpecialist::new("c")));

        assert_eq!(set.names(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_empty_set() {
        let set = DownstreamSet::new("producer");
        assert!(set.is_empty());
        assert!(set.snapshot().is_empty());
    }
}
