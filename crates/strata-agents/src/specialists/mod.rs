use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use strata_core::traits::ContextSource;
use strata_core::types::{ChangeRecord, ImpactResult};
use strata_llm::extract;

mod database;
mod kubernetes;
mod os;

pub use database::{DatabaseSpecialist, DATABASE_SPECIALIST};
pub use kubernetes::{KubernetesSpecialist, KUBERNETES_SPECIALIST};
pub use os::{OsSpecialist, OS_SPECIALIST};

/// Reply shape every consumer asks for when analyzing upstream changes.
/// `changes` is optional and feeds the next layer down.
pub(crate) const IMPACT_REPLY_FORMAT: &str = r#"Respond with a single JSON object, optionally in a ```json fence, shaped exactly like this:
{
  "impacts": [
    {
      "component": "<component in your domain>",
      "description": "<what breaks or changes and why>",
      "severity": "CRITICAL|HIGH|MEDIUM|LOW",
      "required_actions": ["<concrete action>"]
    }
  ],
  "changes": [
    {
      "component": "<component you now consider changed>",
      "change_type": "breaking|behavioral|deprecated",
      "description": "<what downstream layers must know>",
      "severity": "CRITICAL|HIGH|MEDIUM|LOW",
      "metadata": {"affected_components": ["<downstream component>"]}
    }
  ],
  "risk_level": "CRITICAL|HIGH|MEDIUM|LOW"
}
Leave "changes" empty unless a layer below yours genuinely needs to react."#;

/// Reply shape for a root specialist's own-layer analysis.
pub(crate) const DIRECT_REPLY_FORMAT: &str = r#"Respond with a single JSON object, optionally in a ```json fence, shaped exactly like this:
{
  "changes": [
    {
      "component": "<affected component>",
      "change_type": "breaking|behavioral|deprecated",
      "description": "<what changed between the versions>",
      "severity": "CRITICAL|HIGH|MEDIUM|LOW",
      "metadata": {
        "affected_components": ["<component a dependent platform layer should examine>"],
        "evidence": ["<where this is documented>"]
      }
    }
  ],
  "mitigation_steps": [
    {
      "step": "<short title>",
      "action": "<what to do>",
      "priority": "CRITICAL|HIGH|MEDIUM|LOW",
      "timing": "pre-upgrade|during-upgrade|post-upgrade"
    }
  ],
  "recommendations": ["<general advice>"],
  "evidence_sources": ["<document or section consulted>"]
}"#;

/// Render upstream change records as a numbered prompt section.
pub(crate) fn format_upstream(changes: &[ChangeRecord]) -> String {
    let mut out = String::new();
    for (i, change) in changes.iter().enumerate() {
        out.push_str(&format!(
            "{}. [{}] {} ({})\n   {}\n",
            i + 1,
            change.severity,
            change.component,
            change.change_type,
            change.description
        ));
        if !change.metadata.affected_components.is_empty() {
            out.push_str(&format!(
                "   Flagged components: {}\n",
                change.metadata.affected_components.join(", ")
            ));
        }
    }
    out
}

/// Every component the upstream producer flagged, order-preserving and
/// deduplicated, for building the retrieval query.
pub(crate) fn affected_components(changes: &[ChangeRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut components = Vec::new();
    for change in changes {
        let flagged = change
            .metadata
            .affected_components
            .iter()
            .chain(std::iter::once(&change.component));
        for component in flagged {
            if seen.insert(component.to_lowercase()) {
                components.push(component.clone());
            }
        }
    }
    components
}

/// Fetch grounding context for a prompt, falling back to a static line when
/// the store is empty or unavailable.
pub(crate) async fn grounding_context(
    knowledge: &Arc<dyn ContextSource>,
    query: String,
    max_chars: usize,
    fallback: &str,
) -> String {
    match knowledge.context_for(query, max_chars).await {
        Ok(context) if !context.trim().is_empty() => context,
        Ok(_) => fallback.to_string(),
        Err(e) => {
            warn!(error = %e, "Context retrieval failed, continuing without");
            fallback.to_string()
        }
    }
}

/// Parse a consumer impact reply, preserving the raw text when the model
/// ignored the format.
pub(crate) fn impact_from_reply(specialist: &str, raw: &str) -> ImpactResult {
    match extract::parse_payload::<ImpactResult>(raw) {
        Ok(result) => result.normalized(),
        Err(e) => {
            warn!(specialist, error = %e, "Impact reply was not valid JSON, retaining raw text");
            ImpactResult::parse_failure(e.to_string(), raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::types::Severity;

    fn record(component: &str, flagged: &[&str]) -> ChangeRecord {
        let mut record = ChangeRecord::new(component, "desc", Severity::High);
        record.metadata.affected_components = flagged.iter().map(|s| s.to_string()).collect();
        record
    }

    #[test]
    fn test_affected_components_dedupes_case_insensitively() {
        let changes = vec![
            record("cgroup v1", &["kubelet", "container runtime"]),
            record("kernel", &["Kubelet"]),
        ];
        assert_eq!(
            affected_components(&changes),
            vec!["kubelet", "container runtime", "cgroup v1", "kernel"]
        );
    }

    #[test]
    fn test_format_upstream_numbers_and_flags() {
        let text = format_upstream(&[record("cgroup v1", &["kubelet"])]);
        assert!(text.starts_with("1. [HIGH] cgroup v1"));
        assert!(text.contains("Flagged components: kubelet"));
    }

    #[test]
    fn test_impact_from_reply_normalizes_valid_json() {
        let raw = r#"```json
{"impacts": [{"component": "kubelet", "description": "d", "severity": "HIGH",
  "required_actions": ["act"]}], "risk_level": "LOW"}
```"#;
        let result = impact_from_reply("kubernetes-agent", raw);
        // The stated risk_level is recomputed from the impacts.
        assert_eq!(result.risk_level, Severity::High);
        assert_eq!(result.required_actions, vec!["act"]);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_impact_from_reply_keeps_raw_text_on_junk() {
        let result = impact_from_reply("kubernetes-agent", "I'd rather write prose.");
        assert_eq!(result.risk_level, Severity::Unknown);
        assert!(result.error.is_some());
        assert_eq!(result.raw_response.as_deref(), Some("I'd rather write prose."));
    }
}
