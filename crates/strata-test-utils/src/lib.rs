//! Mocks and fixtures shared by the Strata crates' test suites.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use strata_core::config::ModelConfig;
use strata_core::error::{Result, StrataError};
use strata_core::traits::{ContextSource, ReasoningClient};
use strata_core::types::ReasoningRequest;

/// A `ModelConfig` suitable for tests that never reach the network.
pub fn test_model_config() -> ModelConfig {
    ModelConfig {
        provider: "anthropic".to_string(),
        model_id: "test-model".to_string(),
        api_key: Some("config-key".to_string()),
        fallback_api_keys: Vec::new(),
        base_url: None,
        max_tokens: 1024,
        temperature: 0.0,
        request_timeout_secs: 5,
    }
}

/// One call observed by a [`ScriptedClient`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub api_key: Option<String>,
    pub system: String,
    pub prompt: String,
}

enum Reply {
    Text(String),
    ReasoningError(String),
}

/// A reasoning client that plays back a queue of canned replies and records
/// every call it receives.
///
/// An exhausted script answers with a reasoning error, so a test that
/// under-provisions replies fails loudly instead of hanging on real I/O.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Reply>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a successful reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.replies
            .lock()
            .expect("script lock")
            .push_back(Reply::Text(text.into()));
        self
    }

    /// Queue a reasoning failure with the given error text.
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.replies
            .lock()
            .expect("script lock")
            .push_back(Reply::ReasoningError(message.into()));
        self
    }

    /// Handle to the call log, usable after the client moves into a `Box`.
    pub fn call_log(&self) -> Arc<Mutex<Vec<RecordedCall>>> {
        Arc::clone(&self.calls)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("call log lock").len()
    }
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ReasoningClient for ScriptedClient {
    fn complete(&self, config: &ModelConfig, request: ReasoningRequest) -> BoxFuture<'_, Result<String>> {
        let api_key = config.api_key.clone();

        Box::pin(async move {
            self.calls.lock().expect("call log lock").push(RecordedCall {
                api_key,
                system: request.system,
                prompt: request.prompt,
            });

            match self.replies.lock().expect("script lock").pop_front() {
                Some(Reply::Text(text)) => Ok(text),
                Some(Reply::ReasoningError(message)) => Err(StrataError::Reasoning(message)),
                None => Err(StrataError::Reasoning("scripted replies exhausted".into())),
            }
        })
    }
}

/// A context source that returns the same snippet for every query.
pub struct StaticContext {
    snippet: String,
}

impl StaticContext {
    pub fn new(snippet: impl Into<String>) -> Self {
        Self {
            snippet: snippet.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new("")
    }
}

impl ContextSource for StaticContext {
    fn context_for(&self, _query: String, max_chars: usize) -> BoxFuture<'_, Result<String>> {
        let snippet: String = self.snippet.chars().take(max_chars).collect();
        Box::pin(async move { Ok(snippet) })
    }
}

/// Canned model replies for cascade scenarios.
pub mod fixtures {
    /// Root OS analysis: one critical cgroup removal flagged for Kubernetes.
    pub fn os_direct_reply() -> String {
        r#"```json
{
  "changes": [
    {
      "component": "cgroup v1",
      "change_type": "breaking_change",
      "description": "cgroup v1 support removed from the kernel; unified hierarchy only",
      "severity": "CRITICAL",
      "metadata": {
        "affected_components": ["kubelet", "container runtime"],
        "evidence": ["Release notes section 4.2"]
      }
    }
  ],
  "mitigation_steps": [
    {
      "step": "Audit cgroup driver configuration",
      "action": "Verify kubelet and containerd both use the systemd cgroup driver",
      "priority": "HIGH",
      "timing": "pre-upgrade"
    }
  ],
  "recommendations": ["Stage the upgrade on a canary node pool first"],
  "evidence_sources": ["Release notes section 4.2"]
}
```"#
            .to_string()
    }

    /// Kubernetes impact reply: one HIGH impact plus an onward finding for
    /// the next layer down.
    pub fn k8s_impact_reply() -> String {
        r#"```json
{
  "impacts": [
    {
      "component": "kubelet",
      "description": "kubelet fails to start against a cgroup v1 hierarchy",
      "severity": "HIGH",
      "required_actions": ["Set cgroupDriver: systemd in the kubelet config"]
    }
  ],
  "changes": [
    {
      "component": "kubelet",
      "change_type": "config_change",
      "description": "cgroup driver switched to systemd",
      "severity": "MEDIUM",
      "metadata": {"affected_components": ["etcd"]}
    }
  ],
  "risk_level": "HIGH"
}
```"#
            .to_string()
    }

    /// Database impact reply with nothing onward.
    pub fn db_impact_reply() -> String {
        r#"```json
{
  "impacts": [
    {
      "component": "etcd",
      "description": "etcd data directory permissions change under the new mount options",
      "severity": "MEDIUM",
      "required_actions": ["Re-check etcd unit file mount flags"]
    }
  ],
  "risk_level": "MEDIUM"
}
```"#
            .to_string()
    }

    /// An impact reply with no findings at all.
    pub fn quiet_impact_reply() -> String {
        r#"```json
{"impacts": [], "risk_level": "LOW"}
```"#
            .to_string()
    }
}
