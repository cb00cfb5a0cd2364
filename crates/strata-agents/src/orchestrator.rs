//! Wires the specialist graph to the reasoning backend and the stores, and
//! drives a full analysis run: root analysis, cache, cascade, report.

use std::sync::Arc;

use tracing::{debug, info, warn};

use strata_core::config::AppConfig;
use strata_core::error::{Result, StrataError};
use strata_core::traits::{ContextSource, ReasoningClient};
use strata_core::types::{AnalysisReport, AnalysisRequest, DirectAnalysis};
use strata_store::{KnowledgeBase, ResponseCache};

use crate::engine::PropagationEngine;
use crate::registry::SpecialistRegistry;
use crate::specialist::Specialist;
use crate::specialists::{
    DatabaseSpecialist, KubernetesSpecialist, OsSpecialist, KUBERNETES_SPECIALIST, OS_SPECIALIST,
};

pub struct Orchestrator {
    registry: SpecialistRegistry,
    engine: PropagationEngine,
    cache: Option<ResponseCache>,
    knowledge: Arc<KnowledgeBase>,
    root: String,
}

impl Orchestrator {
    /// Wire the default graph over the supplied backends: OS feeds
    /// Kubernetes, Kubernetes feeds the databases. `cache` of `None` runs
    /// every root analysis fresh.
    pub fn new(
        config: &AppConfig,
        llm: Arc<dyn ReasoningClient>,
        knowledge: Arc<KnowledgeBase>,
        cache: Option<ResponseCache>,
    ) -> Result<Self> {
        let context: Arc<dyn ContextSource> = knowledge.clone();
        let model = config.model.clone();
        let max_chars = config.analysis.max_context_chars;

        let os: Arc<dyn Specialist> = Arc::new(OsSpecialist::new(
            model.clone(),
            llm.clone(),
            context.clone(),
            max_chars,
        ));
        let kubernetes: Arc<dyn Specialist> = Arc::new(KubernetesSpecialist::new(
            model.clone(),
            llm.clone(),
            context.clone(),
            max_chars,
        ));
        let database: Arc<dyn Specialist> =
            Arc::new(DatabaseSpecialist::new(model, llm, context, max_chars));

        let orchestrator = Self {
            registry: SpecialistRegistry::new(),
            engine: PropagationEngine::new(),
            cache,
            knowledge,
            root: OS_SPECIALIST.to_string(),
        };
        orchestrator.add_specialist(os, None)?;
        orchestrator.add_specialist(kubernetes, Some(OS_SPECIALIST))?;
        orchestrator.add_specialist(database, Some(KUBERNETES_SPECIALIST))?;
        debug!("{}", orchestrator.registry.render_graph());
        Ok(orchestrator)
    }

    /// Register a specialist, optionally as a downstream consumer of
    /// `upstream`. The upstream producer is resolved before anything is
    /// registered, so a bad edge leaves the graph untouched.
    pub fn add_specialist(
        &self,
        node: Arc<dyn Specialist>,
        upstream: Option<&str>,
    ) -> Result<()> {
        let producer = match upstream {
            Some(name) => Some(
                self.registry
                    .lookup(name)
                    .ok_or_else(|| StrataError::SpecialistNotFound(name.to_string()))?,
            ),
            None => None,
        };

        self.registry.register(node.clone())?;
        if let Some(producer) = producer {
            producer.register_downstream(node);
        }
        Ok(())
    }

    /// Run a full analysis: root specialist first (through the cache), then
    /// the cascade across every registered consumer.
    ///
    /// A cache hit skips only the root model call. Propagation always
    /// re-runs, so downstream improvements, failures, and graph changes show
    /// up even for cached transitions.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport> {
        let root = self
            .registry
            .lookup(&self.root)
            .ok_or_else(|| StrataError::SpecialistNotFound(self.root.clone()))?;

        info!(
            root = %self.root,
            layer = %request.layer,
            from = %request.from_version,
            to = %request.to_version,
            "Starting analysis run"
        );

        let key = request.cache_key();
        let mut cache_hit = false;
        let analysis = match self.cache.as_ref().and_then(|c| c.get::<DirectAnalysis>(&key)) {
            Some(cached) => {
                info!(key = %key, "Reusing cached root analysis");
                cache_hit = true;
                cached
            }
            None => {
                let fresh = root.analyze_direct(request.clone()).await?;
                if let Some(cache) = &self.cache {
                    // Parse failures are kept out of the cache so a flaky
                    // reply does not pin garbage until invalidation.
                    if fresh.parse_error.is_none() {
                        cache.put(&key, &fresh);
                    }
                }
                fresh
            }
        };

        let downstream = self.engine.propagate(root.as_ref(), &analysis.changes).await;

        let mut report = AnalysisReport::new(request.clone(), analysis);
        report.downstream_impacts = downstream;
        report.dependency_graph = self.registry.dependency_graph();
        report.cache_hit = cache_hit;
        report.document_sources = match self.knowledge.document_sources() {
            Ok(sources) => sources,
            Err(e) => {
                warn!(error = %e, "Could not list knowledge documents for the report");
                Vec::new()
            }
        };

        info!(
            changes = report.analysis.changes.len(),
            consumers = report.downstream_impacts.len(),
            cache_hit,
            "Analysis run complete"
        );
        Ok(report)
    }

    pub fn registry(&self) -> &SpecialistRegistry {
        &self.registry
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    pub fn root(&self) -> &str {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specialists::DATABASE_SPECIALIST;
    use strata_core::config::{AnalysisConfig, CacheConfig, KnowledgeConfig};
    use strata_core::types::Severity;
    use strata_test_utils::{fixtures, test_model_config, ScriptedClient};

    fn test_config() -> AppConfig {
        AppConfig {
            analysis: AnalysisConfig::default(),
            model: test_model_config(),
            cache: CacheConfig::default(),
            knowledge: KnowledgeConfig::default(),
        }
    }

    fn orchestrator_with(
        client: ScriptedClient,
        cache: Option<ResponseCache>,
    ) -> Orchestrator {
        let knowledge = Arc::new(KnowledgeBase::in_memory(500, 3).unwrap());
        Orchestrator::new(&test_config(), Arc::new(client), knowledge, cache).unwrap()
    }

    fn memory_cache() -> ResponseCache {
        ResponseCache::new(Box::new(
            strata_store::SqliteCacheBackend::in_memory().unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_full_cascade_produces_nested_report() {
        let client = ScriptedClient::new()
            .reply(fixtures::os_direct_reply())
            .reply(fixtures::k8s_impact_reply())
            .reply(fixtures::db_impact_reply());
        let calls = client.call_log();
        let orchestrator = orchestrator_with(client, None);

        let request = AnalysisRequest::new("15-SP6", "15-SP7");
        let report = orchestrator.analyze(&request).await.unwrap();

        assert_eq!(calls.lock().unwrap().len(), 3);
        assert!(!report.cache_hit);
        assert_eq!(report.analysis.changes.len(), 1);

        let k8s = &report.downstream_impacts[KUBERNETES_SPECIALIST];
        assert_eq!(k8s.risk_level, Severity::High);
        let db = &k8s.downstream[DATABASE_SPECIALIST];
        assert_eq!(db.risk_level, Severity::Medium);

        // The graph and provenance sections are filled in.
        assert_eq!(
            report.dependency_graph[OS_SPECIALIST],
            vec![KUBERNETES_SPECIALIST.to_string()]
        );
        assert!(report.document_sources.is_empty());
    }

    #[tokio::test]
    async fn test_second_run_reuses_cached_root_analysis() {
        // Run one: direct + two impacts. Run two: impacts only.
        let client = ScriptedClient::new()
            .reply(fixtures::os_direct_reply())
            .reply(fixtures::k8s_impact_reply())
            .reply(fixtures::db_impact_reply())
            .reply(fixtures::k8s_impact_reply())
            .reply(fixtures::db_impact_reply());
        let calls = client.call_log();
        let orchestrator = orchestrator_with(client, Some(memory_cache()));

        let request = AnalysisRequest::new("15-SP6", "15-SP7");
        let first = orchestrator.analyze(&request).await.unwrap();
        let second = orchestrator.analyze(&request).await.unwrap();

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(calls.lock().unwrap().len(), 5);
        // The cascade still ran on the cached run.
        assert_eq!(
            second.downstream_impacts[KUBERNETES_SPECIALIST].risk_level,
            Severity::High
        );
    }

    #[tokio::test]
    async fn test_different_request_misses_the_cache() {
        let client = ScriptedClient::new()
            .reply(fixtures::os_direct_reply())
            .reply(fixtures::quiet_impact_reply())
            .reply(fixtures::os_direct_reply())
            .reply(fixtures::quiet_impact_reply());
        let calls = client.call_log();
        let orchestrator = orchestrator_with(client, Some(memory_cache()));

        orchestrator
            .analyze(&AnalysisRequest::new("15-SP6", "15-SP7"))
            .await
            .unwrap();
        let other = orchestrator
            .analyze(&AnalysisRequest::new("15-SP5", "15-SP6"))
            .await
            .unwrap();

        assert!(!other.cache_hit);
        assert_eq!(calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_reanalyzes() {
        let client = ScriptedClient::new()
            .reply(fixtures::os_direct_reply())
            .reply(fixtures::k8s_impact_reply())
            .reply(fixtures::db_impact_reply())
            .reply(fixtures::os_direct_reply())
            .reply(fixtures::k8s_impact_reply())
            .reply(fixtures::db_impact_reply());
        let calls = client.call_log();
        let orchestrator = orchestrator_with(client, None);

        let request = AnalysisRequest::new("15-SP6", "15-SP7");
        let first = orchestrator.analyze(&request).await.unwrap();
        let second = orchestrator.analyze(&request).await.unwrap();

        assert!(!first.cache_hit && !second.cache_hit);
        assert_eq!(calls.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_unparseable_root_reply_is_not_cached() {
        let client = ScriptedClient::new()
            .reply("no json here")
            .reply(fixtures::os_direct_reply())
            .reply(fixtures::k8s_impact_reply())
            .reply(fixtures::db_impact_reply());
        let orchestrator = orchestrator_with(client, Some(memory_cache()));

        let request = AnalysisRequest::new("15-SP6", "15-SP7");
        let first = orchestrator.analyze(&request).await.unwrap();

        // No changes to propagate, and the consumers short-circuit for free.
        assert!(first.analysis.parse_error.is_some());
        let k8s = &first.downstream_impacts[KUBERNETES_SPECIALIST];
        assert!(k8s.impacts.is_empty());
        assert_eq!(k8s.risk_level, Severity::Low);

        // The failed reply was not cached, so the next run re-asks the model.
        let second = orchestrator.analyze(&request).await.unwrap();
        assert!(!second.cache_hit);
        assert!(second.analysis.parse_error.is_none());
    }

    #[tokio::test]
    async fn test_add_specialist_rejects_unknown_upstream() {
        let orchestrator = orchestrator_with(ScriptedClient::new(), None);
        let node: Arc<dyn Specialist> = Arc::new(
            crate::specialist::test_support::StubSpecialist::new("network-agent"),
        );

        let err = orchestrator
            .add_specialist(node, Some("no-such-agent"))
            .unwrap_err();
        assert!(matches!(err, StrataError::SpecialistNotFound(_)));
        // The bad edge must not leave the node registered.
        assert!(orchestrator.registry().lookup("network-agent").is_none());
    }

    #[tokio::test]
    async fn test_add_specialist_rejects_duplicate_names() {
        let orchestrator = orchestrator_with(ScriptedClient::new(), None);
        let node: Arc<dyn Specialist> = Arc::new(
            crate::specialist::test_support::StubSpecialist::new(OS_SPECIALIST),
        );

        let err = orchestrator.add_specialist(node, None).unwrap_err();
        assert!(matches!(err, StrataError::DuplicateSpecialist(_)));
    }
}
