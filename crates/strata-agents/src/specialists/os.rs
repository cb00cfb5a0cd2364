use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use strata_core::config::ModelConfig;
use strata_core::error::Result;
use strata_core::traits::{ContextSource, ReasoningClient};
use strata_core::types::{
    AnalysisRequest, ChangeRecord, DirectAnalysis, ImpactResult, ReasoningRequest,
    SpecialistMetadata,
};
use strata_llm::extract;

use crate::specialist::{DownstreamSet, Specialist};
use crate::specialists::{
    affected_components, format_upstream, grounding_context, impact_from_reply,
    DIRECT_REPLY_FORMAT, IMPACT_REPLY_FORMAT,
};

pub const OS_SPECIALIST: &str = "os-agent";

const DIRECT_SYSTEM_PROMPT: &str = "You are a senior Linux OS compatibility engineer. You analyze \
enterprise Linux release transitions for production platforms: kernel changes, removed or \
deprecated packages, systemd behavior, container runtime and cgroup changes, security policy \
updates. You ground every finding in the provided documentation when it covers the topic, and \
you flag which dependent platform components each change touches.";

const IMPACT_SYSTEM_PROMPT: &str = "You are a senior Linux OS compatibility engineer. Upstream \
platform changes have been reported below your layer. Identify what they mean for the operating \
system: kernel modules, drivers, systemd units, packaging, and runtime configuration.";

const FALLBACK_CONTEXT: &str = "No internal documentation available. Use your general knowledge \
of enterprise Linux distributions.";

/// Root specialist for the operating system layer.
pub struct OsSpecialist {
    model: ModelConfig,
    llm: Arc<dyn ReasoningClient>,
    knowledge: Arc<dyn ContextSource>,
    max_context_chars: usize,
    downstream: DownstreamSet,
}

impl OsSpecialist {
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
            downstream: DownstreamSet::new(OS_SPECIALIST),
        }
    }
}

impl Specialist for OsSpecialist {
    fn name(&self) -> &str {
        OS_SPECIALIST
    }

    fn domain(&self) -> &str {
        "Operating System"
    }

    fn analyze_direct(&self, request: AnalysisRequest) -> BoxFuture<'_, Result<DirectAnalysis>> {
        Box::pin(async move {
            info!(
                specialist = OS_SPECIALIST,
                from = %request.from_version,
                to = %request.to_version,
                workload = %request.workload,
                "Analyzing OS transition"
            );

            let query = format!(
                "{} {} release notes breaking changes removed packages kernel systemd container runtime",
                request.from_version, request.to_version
            );
            let context =
                grounding_context(&self.knowledge, query, self.max_context_chars, FALLBACK_CONTEXT)
                    .await;

            let prompt = format!(
                "Analyze the operating system transition from \"{from}\" to \"{to}\".\n\
                 The platform runs {workload} workloads on these hosts, so call out every change \
                 a {workload} operator must know about before upgrading.\n\n\
                 Internal documentation:\n{context}\n\n{format}",
                from = request.from_version,
                to = request.to_version,
                workload = request.workload,
                context = context,
                format = DIRECT_REPLY_FORMAT,
            );

            let raw = self
                .llm
                .complete(&self.model, ReasoningRequest::new(DIRECT_SYSTEM_PROMPT, prompt))
                .await?;

            let mut analysis = match extract::parse_payload::<DirectAnalysis>(&raw) {
                Ok(analysis) => analysis,
                Err(e) => {
                    warn!(
                        specialist = OS_SPECIALIST,
                        error = %e,
                        "Analysis reply was not valid JSON, retaining raw text"
                    );
                    DirectAnalysis::parse_failure(e.to_string(), raw)
                }
            };

            let mut metadata = SpecialistMetadata::new(OS_SPECIALIST, self.domain());
            metadata.confidence = if analysis.parse_error.is_none() { 0.95 } else { 0.0 };
            metadata.evidence_sources = analysis.evidence_sources.clone();
            analysis.metadata = Some(metadata);

            info!(
                specialist = OS_SPECIALIST,
                changes = analysis.changes.len(),
                severity = %analysis.max_severity(),
                "OS analysis complete"
            );
            Ok(analysis)
        })
    }

    fn analyze_upstream_impact(
        &self,
        upstream: Vec<ChangeRecord>,
    ) -> BoxFuture<'_, Result<ImpactResult>> {
        Box::pin(async move {
            if upstream.is_empty() {
                debug!(specialist = OS_SPECIALIST, "No upstream changes, skipping impact analysis");
                return Ok(ImpactResult::empty());
            }

            let components = affected_components(&upstream);
            let query = format!("{} kernel drivers systemd packages", components.join(" "));
            let context =
                grounding_context(&self.knowledge, query, self.max_context_chars, FALLBACK_CONTEXT)
                    .await;

            let prompt = format!(
                "The following upstream platform changes were reported:\n\n{changes}\n\
                 Internal documentation:\n{context}\n\n\
                 Identify the impacts on the operating system layer.\n\n{format}",
                changes = format_upstream(&upstream),
                context = context,
                format = IMPACT_REPLY_FORMAT,
            );

            let raw = self
                .llm
                .complete(&self.model, ReasoningRequest::new(IMPACT_SYSTEM_PROMPT, prompt))
                .await?;
            Ok(impact_from_reply(OS_SPECIALIST, &raw))
        })
    }

    fn register_downstream(&self, node: Arc<dyn Specialist>) {
        self.downstream.register(node);
    }

    fn downstream(&self) -> Vec<Arc<dyn Specialist>> {
        self.downstream.snapshot()
    }
}
