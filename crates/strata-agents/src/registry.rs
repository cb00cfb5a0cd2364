use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::info;

use strata_core::error::{Result, StrataError};

use crate::specialist::Specialist;

/// Central lookup of specialist nodes, in registration order.
///
/// The registry tracks nodes; dependency edges live on the producers
/// themselves. Names are unique, and registering a second node under an
/// existing name is refused so wiring mistakes surface at startup instead
/// of silently replacing a live node.
pub struct SpecialistRegistry {
    nodes: RwLock<IndexMap<String, Arc<dyn Specialist>>>,
}

impl SpecialistRegistry {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(IndexMap::new()),
        }
    }

    pub fn register(&self, node: Arc<dyn Specialist>) -> Result<()> {
        let mut nodes = self.nodes.write();
        let name = node.name().to_string();
        if nodes.contains_key(&name) {
            return Err(StrataError::DuplicateSpecialist(name));
        }
        info!(specialist = %name, domain = node.domain(), "Specialist registered");
        nodes.insert(name, node);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Specialist>> {
        self.nodes.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.nodes.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Adjacency snapshot: each node name to its downstream names, both in
    /// registration order.
    pub fn dependency_graph(&self) -> IndexMap<String, Vec<String>> {
        self.nodes
            .read()
            .iter()
            .map(|(name, node)| {
                let consumers = node
                    .downstream()
                    .iter()
                    .map(|consumer| consumer.name().to_string())
                    .collect();
                (name.clone(), consumers)
            })
            .collect()
    }

    /// ASCII rendering of the dependency graph for the CLI.
    pub fn render_graph(&self) -> String {
        let graph = self.dependency_graph();
        let mut out = String::from("Specialist dependency graph:\n");
        out.push_str(&"=".repeat(50));
        out.push_str("\n\n");

        for (name, consumers) in &graph {
            out.push_str(name);
            out.push('\n');
            if consumers.is_empty() {
                out.push_str("  └── (no downstream consumers)\n");
            } else {
                for (i, consumer) in consumers.iter().enumerate() {
                    let branch = if i + 1 == consumers.len() {
                        "  └── "
                    } else {
                        "  ├── "
                    };
                    out.push_str(branch);
                    out.push_str(consumer);
                    out.push('\n');
                }
            }
            out.push('\n');
        }
        out
    }
}

impl Default for SpecialistRegistry {
    fn default() -> Self {
        Self::new()
    }
}
