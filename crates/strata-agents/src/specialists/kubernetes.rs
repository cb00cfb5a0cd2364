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

pub const KUBERNETES_SPECIALIST: &str = "kubernetes-agent";

const DIRECT_SYSTEM_PROMPT: &str = "You are a senior Kubernetes platform engineer. You analyze \
cluster upgrades and host platform transitions: kubelet and container runtime integration, CNI \
and CSI drivers, API deprecations, admission and security policy changes. You ground findings in \
the provided documentation when it covers the topic and flag which dependent components each \
change touches.";

const IMPACT_SYSTEM_PROMPT: &str = "You are a senior Kubernetes platform engineer. Changes in a \
layer Kubernetes depends on have been reported below. Identify what they mean for cluster \
components: kubelet, container runtime, control plane, CNI, CSI, and workloads. Where a change \
forces Kubernetes itself to change, record that as an onward change and flag the components it \
touches in turn.";

const FALLBACK_CONTEXT: &str = "No internal documentation available. Use your general knowledge \
of Kubernetes operations.";

/// Specialist for the Kubernetes layer, usually consuming OS findings.
pub struct KubernetesSpecialist {
    model: ModelConfig,
    llm: Arc<dyn ReasoningClient>,
    knowledge: Arc<dyn ContextSource>,
    max_context_chars: usize,
    downstream: DownstreamSet,
}

impl KubernetesSpecialist {
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
            downstream: DownstreamSet::new(KUBERNETES_SPECIALIST),
        }
    }
}

impl Specialist for KubernetesSpecialist {
    fn name(&self) -> &str {
        KUBERNETES_SPECIALIST
    }

    fn domain(&self) -> &str {
        "Kubernetes"
    }

    fn analyze_direct(&self, request: AnalysisRequest) -> BoxFuture<'_, Result<DirectAnalysis>> {
        Box::pin(async move {
            info!(
                specialist = KUBERNETES_SPECIALIST,
                from = %request.from_version,
                to = %request.to_version,
                "Analyzing Kubernetes transition"
            );

            let query = format!(
                "Kubernetes {} {} upgrade deprecations kubelet container runtime",
                request.from_version, request.to_version
            );
            let context =
                grounding_context(&self.knowledge, query, self.max_context_chars, FALLBACK_CONTEXT)
                    .await;

            let prompt = format!(
                "Analyze the Kubernetes platform transition from \"{from}\" to \"{to}\".\n\n\
                 Internal documentation:\n{context}\n\n{format}",
                from = request.from_version,
                to = request.to_version,
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
                        specialist = KUBERNETES_SPECIALIST,
                        error = %e,
                        "Analysis reply was not valid JSON, retaining raw text"
                    );
                    DirectAnalysis::parse_failure(e.to_string(), raw)
                }
            };

            let mut metadata = SpecialistMetadata::new(KUBERNETES_SPECIALIST, self.domain());
            metadata.confidence = if analysis.parse_error.is_none() { 0.95 } else { 0.0 };
            metadata.evidence_sources = analysis.evidence_sources.clone();
            analysis.metadata = Some(metadata);
            Ok(analysis)
        })
    }

    fn analyze_upstream_impact(
        &self,
        upstream: Vec<ChangeRecord>,
    ) -> BoxFuture<'_, Result<ImpactResult>> {
        Box::pin(async move {
            if upstream.is_empty() {
                debug!(
                    specialist = KUBERNETES_SPECIALIST,
                    "No upstream changes, skipping impact analysis"
                );
                return Ok(ImpactResult::empty());
            }

            info!(
                specialist = KUBERNETES_SPECIALIST,
                upstream = upstream.len(),
                "Assessing upstream impact on Kubernetes"
            );

            let components = affected_components(&upstream);
            let query = format!("Kubernetes {} compatibility", components.join(" "));
            let context =
                grounding_context(&self.knowledge, query, self.max_context_chars, FALLBACK_CONTEXT)
                    .await;

            let prompt = format!(
                "The following changes were reported in a layer this cluster runs on:\n\n{changes}\n\
                 Internal documentation:\n{context}\n\n\
                 Identify the impacts on the Kubernetes layer.\n\n{format}",
                changes = format_upstream(&upstream),
                context = context,
                format = IMPACT_REPLY_FORMAT,
            );

            let raw = self
                .llm
                .complete(&self.model, ReasoningRequest::new(IMPACT_SYSTEM_PROMPT, prompt))
                .await?;
            Ok(impact_from_reply(KUBERNETES_SPECIALIST, &raw))
        })
    }

    fn register_downstream(&self, node: Arc<dyn Specialist>) {
        self.downstream.register(node);
    }

    fn downstream(&self) -> Vec<Arc<dyn Specialist>> {
        self.downstream.snapshot()
    }
}
