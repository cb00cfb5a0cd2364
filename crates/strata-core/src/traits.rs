use futures::future::BoxFuture;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::ReasoningRequest;

/// A reasoning backend that turns a prompt into raw model text.
///
/// Implementations are edge clients (Anthropic, OpenAI-compatible) plus the
/// failover wrapper that rotates credentials across them.
pub trait ReasoningClient: Send + Sync + 'static {
    fn complete(&self, config: &ModelConfig, request: ReasoningRequest) -> BoxFuture<'_, Result<String>>;
}

/// Best-effort retrieval of grounding context for a prompt.
///
/// Returns an empty string when nothing relevant is stored; errors are for
/// real backend failures, not empty result sets.
pub trait ContextSource: Send + Sync + 'static {
    fn context_for(&self, query: String, max_chars: usize) -> BoxFuture<'_, Result<String>>;
}

/// Key/value persistence behind the response cache.
pub trait CacheBackend: Send + Sync + 'static {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn store(&self, key: &str, value: &[u8]) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
