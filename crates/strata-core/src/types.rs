use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Severity of a change or impact, ordered from most to least severe.
///
/// `Unknown` marks results whose payload could not be parsed; it never
/// outranks a real severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", from = "String")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Self::Critical,
            "HIGH" => Self::High,
            "MEDIUM" => Self::Medium,
            "LOW" => Self::Low,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Self::Critical => 4,
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
            Self::Unknown => 0,
        }
    }

    /// The most severe value in `iter`, or `Low` when the iterator is empty.
    pub fn most_severe<I: IntoIterator<Item = Severity>>(iter: I) -> Severity {
        iter.into_iter()
            .max_by_key(Severity::rank)
            .unwrap_or(Severity::Low)
    }
}

impl From<String> for Severity {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of a change. Loose labels from reasoning output fold onto
/// this fixed set; anything unrecognized becomes `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ChangeType {
    Breaking,
    Behavioral,
    Deprecated,
    Unknown,
}

impl ChangeType {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "breaking" | "breaking_change" => Self::Breaking,
            "behavioral" | "behavioural" | "behavior_change" => Self::Behavioral,
            "deprecated" | "deprecation" => Self::Deprecated,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breaking => "breaking",
            Self::Behavioral => "behavioral",
            Self::Deprecated => "deprecated",
            Self::Unknown => "unknown",
        }
    }
}

impl From<String> for ChangeType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl Default for ChangeType {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured detail attached to a change record.
///
/// `affected_components` is the hint a producer gives its consumers about
/// which of their components to look at. Everything else the producer emits
/// lands in `extra` untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChangeMetadata {
    #[serde(default, alias = "affected_k8s_components", skip_serializing_if = "Vec::is_empty")]
    pub affected_components: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A single finding produced by a specialist, normalized for handoff to
/// downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeRecord {
    #[serde(default = "default_component")]
    pub component: String,
    #[serde(default)]
    pub change_type: ChangeType,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_change_severity", alias = "impact_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub metadata: ChangeMetadata,
}

impl ChangeRecord {
    pub fn new(component: impl Into<String>, description: impl Into<String>, severity: Severity) -> Self {
        Self {
            component: component.into(),
            change_type: ChangeType::Unknown,
            description: description.into(),
            severity,
            metadata: ChangeMetadata::default(),
        }
    }
}

fn default_component() -> String {
    "unknown".to_string()
}

fn default_change_severity() -> Severity {
    Severity::Medium
}

/// One concrete impact a consumer identified in its own domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Impact {
    #[serde(default = "default_component", alias = "k8s_component")]
    pub component: String,
    #[serde(default, alias = "impact_description")]
    pub description: String,
    #[serde(default = "default_change_severity")]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_actions: Vec<String>,
}

/// Outcome of one consumer's upstream-impact analysis, including anything
/// its own consumers reported further down the graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImpactResult {
    #[serde(default)]
    pub impacts: Vec<Impact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_actions: Vec<String>,
    #[serde(default)]
    pub risk_level: Severity,
    /// Findings in this consumer's domain, normalized for its own downstream.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ChangeRecord>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub downstream: IndexMap<String, ImpactResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl ImpactResult {
    /// Result for a consumer that received no upstream changes.
    pub fn empty() -> Self {
        Self {
            risk_level: Severity::Low,
            ..Self::default()
        }
    }

    /// Placeholder recorded when a consumer's analysis failed outright.
    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Result retained when the model reply could not be parsed.
    pub fn parse_failure(error: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            raw_response: Some(raw.into()),
            ..Self::default()
        }
    }

    /// Recompute the derived fields from `impacts`.
    ///
    /// `risk_level` becomes the most severe impact severity (or `Low` with
    /// no impacts) and `required_actions` the flattened action list.
    pub fn normalized(mut self) -> Self {
        self.risk_level = Severity::most_severe(self.impacts.iter().map(|i| i.severity));
        self.required_actions = self
            .impacts
            .iter()
            .flat_map(|i| i.required_actions.iter().cloned())
            .collect();
        self
    }
}

/// A root analysis request: which upgrade to analyze and for which workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRequest {
    #[serde(default = "default_layer")]
    pub layer: String,
    pub from_version: String,
    pub to_version: String,
    #[serde(default = "default_workload")]
    pub workload: String,
}

impl AnalysisRequest {
    pub fn new(from_version: impl Into<String>, to_version: impl Into<String>) -> Self {
        Self {
            layer: default_layer(),
            from_version: from_version.into(),
            to_version: to_version.into(),
            workload: default_workload(),
        }
    }

    pub fn with_workload(mut self, workload: impl Into<String>) -> Self {
        self.workload = workload.into();
        self
    }

    /// Cache key over the semantic identity of this request. Prompt wording,
    /// model selection, and credentials deliberately do not contribute.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::derive(&self.from_version, &self.to_version, &self.workload)
    }
}

fn default_layer() -> String {
    "OS".to_string()
}

fn default_workload() -> String {
    "Kubernetes".to_string()
}

/// Content-addressed cache key: hex SHA-256 over the request identity.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(source: &str, target: &str, workload: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.trim().as_bytes());
        // Unit separator keeps adjacent segments from colliding.
        hasher.update([0x1f]);
        hasher.update(target.trim().as_bytes());
        hasher.update([0x1f]);
        hasher.update(workload.trim().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// When a mitigation step should be executed relative to the upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum StepTiming {
    PreUpgrade,
    DuringUpgrade,
    PostUpgrade,
}

impl From<String> for StepTiming {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "during-upgrade" | "during_upgrade" => Self::DuringUpgrade,
            "post-upgrade" | "post_upgrade" => Self::PostUpgrade,
            _ => Self::PreUpgrade,
        }
    }
}

impl StepTiming {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreUpgrade => "pre-upgrade",
            Self::DuringUpgrade => "during-upgrade",
            Self::PostUpgrade => "post-upgrade",
        }
    }
}

impl std::fmt::Display for StepTiming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for StepTiming {
    fn default() -> Self {
        Self::PreUpgrade
    }
}

/// One actionable step from the root analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MitigationStep {
    #[serde(default)]
    pub step: String,
    #[serde(default)]
    pub action: String,
    #[serde(default = "default_change_severity")]
    pub priority: Severity,
    #[serde(default)]
    pub timing: StepTiming,
}

/// Provenance attached to a specialist's direct analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecialistMetadata {
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_sources: Vec<String>,
    pub analysis_at: DateTime<Utc>,
}

impl SpecialistMetadata {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            confidence: 0.0,
            evidence_sources: Vec::new(),
            analysis_at: Utc::now(),
        }
    }
}

impl Default for SpecialistMetadata {
    fn default() -> Self {
        Self::new("", "")
    }
}

/// Full structured output of a root specialist's own-layer analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DirectAnalysis {
    #[serde(default, alias = "breaking_changes")]
    pub changes: Vec<ChangeRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mitigation_steps: Vec<MitigationStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SpecialistMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl DirectAnalysis {
    /// Analysis retained when the model reply could not be parsed.
    pub fn parse_failure(error: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            parse_error: Some(error.into()),
            raw_response: Some(raw.into()),
            ..Self::default()
        }
    }

    /// The most severe change severity, or `Low` with no changes.
    pub fn max_severity(&self) -> Severity {
        if self.parse_error.is_some() {
            return Severity::Unknown;
        }
        Severity::most_severe(self.changes.iter().map(|c| c.severity))
    }
}

/// A knowledge base document referenced by a report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSource {
    pub id: i64,
    pub filename: String,
    pub category: String,
}

/// Everything one analysis run produced, ready for rendering or archival.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub request: AnalysisRequest,
    pub analysis: DirectAnalysis,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub downstream_impacts: IndexMap<String, ImpactResult>,
    #[serde(default)]
    pub dependency_graph: IndexMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub document_sources: Vec<DocumentSource>,
    #[serde(default)]
    pub cache_hit: bool,
}

impl AnalysisReport {
    pub fn new(request: AnalysisRequest, analysis: DirectAnalysis) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            request,
            analysis,
            downstream_impacts: IndexMap::new(),
            dependency_graph: IndexMap::new(),
            document_sources: Vec::new(),
            cache_hit: false,
        }
    }
}

/// A single prompt exchange sent to a reasoning backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningRequest {
    pub system: String,
    pub prompt: String,
}

impl ReasoningRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
        }
    }
}
