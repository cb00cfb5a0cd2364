pub mod extract;
pub mod failover;
pub mod providers;

use strata_core::config::ModelConfig;
use strata_core::traits::ReasoningClient;

pub use failover::{CredentialPool, FailoverClient};
pub use providers::anthropic::AnthropicClient;
pub use providers::openai::OpenAiClient;

/// Create the edge client for the configured provider name.
///
/// Unrecognized providers get the OpenAI-compatible client, since gateways
/// and local servers overwhelmingly speak that dialect behind `base_url`.
pub fn create_client(config: &ModelConfig) -> Box<dyn ReasoningClient> {
    match config.provider.as_str() {
        "anthropic" | "claude" => Box::new(AnthropicClient::new()),
        _ => Box::new(OpenAiClient::new()),
    }
}
