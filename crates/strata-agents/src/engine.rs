use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use strata_core::types::{ChangeRecord, ImpactResult};

use crate::specialist::Specialist;

/// Impact results keyed by consumer name, in registration order.
pub type CascadeResult = IndexMap<String, ImpactResult>;

/// Walks a producer's findings through the dependency graph.
///
/// Consumers run one at a time in registration order. A failing branch is
/// recorded as an error placeholder and never stops its siblings. When a
/// consumer reports onward change records of its own, the walk recurses
/// into that consumer's downstream and nests the results.
pub struct PropagationEngine;

impl PropagationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Cascade `changes` from `producer` through every reachable consumer.
    ///
    /// Returns an empty map when the producer has no downstream nodes. The
    /// producer itself is never re-entered: a consumer edge pointing back
    /// at an ancestor is skipped with a warning instead of looping.
    pub async fn propagate(&self, producer: &dyn Specialist, changes: &[ChangeRecord]) -> CascadeResult {
        let consumers = producer.downstream();
        if consumers.is_empty() {
            debug!(producer = producer.name(), "No downstream consumers to notify");
            return CascadeResult::new();
        }

        info!(
            producer = producer.name(),
            changes = changes.len(),
            consumers = consumers.len(),
            "Propagating changes downstream"
        );

        let mut visited = HashSet::new();
        visited.insert(producer.name().to_string());
        self.fan_out(consumers, changes.to_vec(), &mut visited).await
    }

    fn fan_out<'a>(
        &'a self,
        consumers: Vec<Arc<dyn Specialist>>,
        changes: Vec<ChangeRecord>,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, CascadeResult> {
        Box::pin(async move {
            let mut results = CascadeResult::new();

            for consumer in consumers {
                let name = consumer.name().to_string();
                if visited.contains(&name) {
                    warn!(consumer = %name, "Cycle in dependency graph, skipping revisit");
                    continue;
                }
                visited.insert(name.clone());

                debug!(consumer = %name, changes = changes.len(), "Analyzing upstream impact");
                let mut result = match consumer.analyze_upstream_impact(changes.clone()).await {
                    Ok(result) => result,
                    Err(e) => {
                        error!(consumer = %name, error = %e, "Consumer analysis failed, isolating branch");
                        ImpactResult::from_error(e.to_string())
                    }
                };

                let next = consumer.downstream();
                if !result.changes.is_empty() && !next.is_empty() {
                    let nested = self.fan_out(next, result.changes.clone(), visited).await;
                    result.downstream = nested;
                }

                visited.remove(&name);
                results.insert(name, result);
            }

            results
        })
    }
}

impl Default for PropagationEngine {
    fn default() -> Self {
        Self::new()
    }
}
