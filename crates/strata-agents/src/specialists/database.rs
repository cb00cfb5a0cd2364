use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info};

use strata_core::config::ModelConfig;
use strata_core::error::Result;
use strata_core::traits::{ContextSource, ReasoningClient};
use strata_core::types::{
    AnalysisRequest, ChangeRecord, DirectAnalysis, ImpactResult, ReasoningRequest,
    SpecialistMetadata,
};

use crate::specialist::{DownstreamSet, Specialist};
use crate::specialists::{
    affected_components, format_upstream, grounding_context, impact_from_reply,
    IMPACT_REPLY_FORMAT,
};

pub const DATABASE_SPECIALIST: &str = "database-agent";

const IMPACT_SYSTEM_PROMPT: &str = "You are a senior database reliability engineer responsible \
for the data stores running on this platform: etcd, PostgreSQL, and similar stateful systems. \
Changes in the layers beneath them have been reported below. Identify what they mean for the \
databases: storage and filesystem behavior, I/O scheduling, memory and cgroup limits, unit \
files, client library compatibility.";

const FALLBACK_CONTEXT: &str = "No internal documentation available. Use your general knowledge \
of database operations.";

/// Specialist for the data stores at the bottom of the dependency graph.
pub struct DatabaseSpecialist {
    model: ModelConfig,
    llm: Arc<dyn ReasoningClient>,
    knowledge: Arc<dyn ContextSource>,
    max_context_chars: usize,
    downstream: DownstreamSet,
}

impl DatabaseSpecialist {
    pub fn new(
        model: ModelConfig,
        llm: Arc<dyn ReasoningClient>,
        knowledge: Arc<dyn ContextSource>,
        max_context_chars: usize,
    ) -> Self {
        Self {
            model,
            llm,
            knowledge,
            max_context_chars,
            downstream: DownstreamSet::new(DATABASE_SPECIALIST),
        }
    }
}

impl Specialist for DatabaseSpecialist {
    fn name(&self) -> &str {
        DATABASE_SPECIALIST
    }

    fn domain(&self) -> &str {
        "Database"
    }

    /// The database layer has no transition of its own to analyze. A run
    /// rooted here returns a pointer to the layers that feed it instead of
    /// spending a model call.
    fn analyze_direct(&self, request: AnalysisRequest) -> BoxFuture<'_, Result<DirectAnalysis>> {
        Box::pin(async move {
            info!(
                specialist = DATABASE_SPECIALIST,
                from = %request.from_version,
                to = %request.to_version,
                "Database layer is impact-driven, returning advisory analysis"
            );

            let mut metadata = SpecialistMetadata::new(DATABASE_SPECIALIST, self.domain());
            metadata.confidence = 1.0;

            Ok(DirectAnalysis {
                recommendations: vec![
                    "Database findings are derived from upstream platform changes. Run the \
                     analysis from the OS or Kubernetes layer to cascade impacts here."
                        .to_string(),
                ],
                metadata: Some(metadata),
                ..DirectAnalysis::default()
            })
        })
    }

    fn analyze_upstream_impact(
        &self,
        upstream: Vec<ChangeRecord>,
    ) -> BoxFuture<'_, Result<ImpactResult>> {
        Box::pin(async move {
            if upstream.is_empty() {
                debug!(
                    specialist = DATABASE_SPECIALIST,
                    "No upstream changes, skipping impact analysis"
                );
                return Ok(ImpactResult::empty());
            }

            let components = affected_components(&upstream);
            let query = format!("{} etcd postgresql storage", components.join(" "));
            let context =
                grounding_context(&self.knowledge, query, self.max_context_chars, FALLBACK_CONTEXT)
                    .await;

            let prompt = format!(
                "The following changes were reported in the layers these databases run on:\n\n\
                 {changes}\n\
                 Internal documentation:\n{context}\n\n\
                 Identify the impacts on the database layer.\n\n{format}",
                changes = format_upstream(&upstream),
                context = context,
                format = IMPACT_REPLY_FORMAT,
            );

            let raw = self
                .llm
                .complete(&self.model, ReasoningRequest::new(IMPACT_SYSTEM_PROMPT, prompt))
                .await?;
            Ok(impact_from_reply(DATABASE_SPECIALIST, &raw))
        })
    }

    fn register_downstream(&self, node: Arc<dyn Specialist>) {
        self.downstream.register(node);
    }

    fn downstream(&self) -> Vec<Arc<dyn Specialist>> {
        self.downstream.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::types::Severity;
    use strata_test_utils::{fixtures, test_model_config, ScriptedClient, StaticContext};

    fn db_with(client: ScriptedClient) -> DatabaseSpecialist {
        DatabaseSpecialist::new(
            test_model_config(),
            Arc::new(client),
            Arc::new(StaticContext::empty()),
            2_000,
        )
    }

    #[tokio::test]
    async fn test_direct_analysis_is_advisory_and_free() {
        let client = ScriptedClient::new();
        let calls = client.call_log();
        let db = db_with(client);

        let analysis = db
            .analyze_direct(AnalysisRequest::new("15-SP6", "15-SP7"))
            .await
            .unwrap();

        assert!(analysis.changes.is_empty());
        assert_eq!(analysis.recommendations.len(), 1);
        assert!(analysis.recommendations[0].contains("upstream"));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_impact_parses_reply() {
        let db = db_with(ScriptedClient::new().reply(fixtures::db_impact_reply()));

        let changes = vec![ChangeRecord::new(
            "kubelet",
            "cgroup driver switched to systemd",
            Severity::Medium,
        )];
        let result = db.analyze_upstream_impact(changes).await.unwrap();

        assert_eq!(result.risk_level, Severity::Medium);
        assert_eq!(result.impacts[0].component, "etcd");
        assert!(result.changes.is_empty());
    }
}
