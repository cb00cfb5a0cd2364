use std::sync::Mutex;

use futures::future::BoxFuture;
use tracing::{info, warn};

use strata_core::config::ModelConfig;
use strata_core::error::{Result, StrataError};
use strata_core::traits::ReasoningClient;
use strata_core::types::ReasoningRequest;

/// Error-text markers that mean the active credential is spent rather than
/// the request being malformed. Matched case-insensitively.
const CREDENTIAL_MARKERS: &[&str] = &["rate limit", "quota", "insufficient", "limit exceeded"];

pub fn is_credential_error(e: &StrataError) -> bool {
    match e {
        StrataError::Reasoning(msg) => {
            let msg = msg.to_lowercase();
            CREDENTIAL_MARKERS.iter().any(|marker| msg.contains(marker))
        }
        _ => false,
    }
}

/// Ordered API credentials with one active pointer.
///
/// The pointer only moves forward: a spent credential is never retried
/// within the lifetime of the pool.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    credentials: Vec<String>,
    active: usize,
}

impl CredentialPool {
    pub fn new(primary: Option<String>, fallbacks: Vec<String>) -> Self {
        let mut credentials: Vec<String> = primary.into_iter().collect();
        credentials.extend(fallbacks);
        Self {
            credentials,
            active: 0,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.api_key.clone(), config.fallback_api_keys.clone())
    }

    pub fn active(&self) -> Option<&str> {
        self.credentials.get(self.active).map(String::as_str)
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    /// Move the pointer to the next credential. Returns false once none remain.
    pub fn advance(&mut self) -> bool {
        if self.active + 1 < self.credentials.len() {
            self.active += 1;
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

/// A reasoning client that rotates through a credential pool when a request
/// dies to a quota or rate-limit error.
///
/// One request is attempted per credential, so a pool of N credentials
/// yields at most N attempts. Rotation is permanent across calls. Errors
/// that do not look credential-related surface unchanged on the first
/// attempt.
pub struct FailoverClient {
    inner: Box<dyn ReasoningClient>,
    pool: Mutex<CredentialPool>,
}

impl FailoverClient {
    pub fn new(inner: Box<dyn ReasoningClient>, pool: CredentialPool) -> Self {
        Self {
            inner,
            pool: Mutex::new(pool),
        }
    }

    /// Build the edge client for the configured provider and wrap it with
    /// the configured credentials.
    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(crate::create_client(config), CredentialPool::from_config(config))
    }

    pub fn active_index(&self) -> usize {
        self.pool.lock().map(|pool| pool.active_index()).unwrap_or(0)
    }
}

impl ReasoningClient for FailoverClient {
    fn complete(&self, config: &ModelConfig, request: ReasoningRequest) -> BoxFuture<'_, Result<String>> {
        let config = config.clone();

        Box::pin(async move {
            let mut attempts: u32 = 0;

            loop {
                let mut call_config = config.clone();
                {
                    let pool = self
                        .pool
                        .lock()
                        .map_err(|_| StrataError::Reasoning("credential pool lock poisoned".into()))?;
                    if let Some(credential) = pool.active() {
                        call_config.api_key = Some(credential.to_string());
                    }
                }
                attempts += 1;

                match self.inner.complete(&call_config, request.clone()).await {
                    Ok(text) => return Ok(text),
                    Err(e) if is_credential_error(&e) => {
                        warn!(attempt = attempts, error = %e, "Credential failure on reasoning call");
                        let rotated = {
                            let mut pool = self.pool.lock().map_err(|_| {
                                StrataError::Reasoning("credential pool lock poisoned".into())
                            })?;
                            pool.advance()
                        };
                        if rotated {
                            info!(attempt = attempts, "Switched to fallback credential");
                            continue;
                        }
                        return Err(StrataError::CredentialsExhausted {
                            attempts,
                            last_error: e.to_string(),
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_test_utils::{test_model_config, ScriptedClient};

    fn pool(keys: &[&str]) -> CredentialPool {
        let mut iter = keys.iter().map(|k| k.to_string());
        let primary = iter.next();
        CredentialPool::new(primary, iter.collect())
    }

    #[test]
    fn test_is_credential_error_matches_markers() {
        for msg in [
            "HTTP 429: rate limit exceeded",
            "Quota exhausted for this billing period",
            "HTTP 402: insufficient credits",
            "daily limit exceeded",
        ] {
            assert!(is_credential_error(&StrataError::Reasoning(msg.into())), "{msg}");
        }
    }

    #[test]
    fn test_is_credential_error_ignores_other_failures() {
        assert!(!is_credential_error(&StrataError::Reasoning("HTTP 500: internal".into())));
        assert!(!is_credential_error(&StrataError::ReasoningParse("bad json".into())));
        assert!(!is_credential_error(&StrataError::Config("no key".into())));
    }

    #[test]
    fn test_pool_advance_stops_at_last_credential() {
        let mut pool = pool(&["a", "b"]);
        assert_eq!(pool.active(), Some("a"));
        assert!(pool.advance());
        assert_eq!(pool.active(), Some("b"));
        assert!(!pool.advance());
        assert_eq!(pool.active(), Some("b"));
    }

    #[tokio::test]
    async fn test_first_attempt_success_uses_primary() {
        let inner = ScriptedClient::new().reply("ok");
        let calls = inner.call_log();
        let client = FailoverClient::new(Box::new(inner), pool(&["key-a", "key-b"]));

        let text = client
            .complete(&test_model_config(), ReasoningRequest::new("", "ping"))
            .await
            .unwrap();

        assert_eq!(text, "ok");
        assert_eq!(client.active_index(), 0);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].api_key.as_deref(), Some("key-a"));
    }

    #[tokio::test]
    async fn test_quota_error_rotates_and_succeeds_on_second_attempt() {
        let inner = ScriptedClient::new()
            .fail("HTTP 429: rate limit exceeded")
            .reply("recovered");
        let calls = inner.call_log();
        let client = FailoverClient::new(Box::new(inner), pool(&["key-a", "key-b"]));

        let text = client
            .complete(&test_model_config(), ReasoningRequest::new("", "ping"))
            .await
            .unwrap();

        assert_eq!(text, "recovered");
        // Pointer stays on the fallback for subsequent calls.
        assert_eq!(client.active_index(), 1);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].api_key.as_deref(), Some("key-a"));
        assert_eq!(calls[1].api_key.as_deref(), Some("key-b"));
    }

    #[tokio::test]
    async fn test_rotation_is_permanent_across_calls() {
        let inner = ScriptedClient::new()
            .fail("quota exhausted")
            .reply("first")
            .reply("second");
        let calls = inner.call_log();
        let client = FailoverClient::new(Box::new(inner), pool(&["key-a", "key-b"]));

        client
            .complete(&test_model_config(), ReasoningRequest::new("", "one"))
            .await
            .unwrap();
        client
            .complete(&test_model_config(), ReasoningRequest::new("", "two"))
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        // The second call goes straight to the fallback credential.
        assert_eq!(calls[2].api_key.as_deref(), Some("key-b"));
    }

    #[tokio::test]
    async fn test_single_credential_exhausts_after_one_attempt() {
        let inner = ScriptedClient::new().fail("quota exhausted");
        let calls = inner.call_log();
        let client = FailoverClient::new(Box::new(inner), pool(&["only-key"]));

        let err = client
            .complete(&test_model_config(), ReasoningRequest::new("", "ping"))
            .await
            .unwrap_err();

        match err {
            StrataError::CredentialsExhausted { attempts, last_error } => {
                assert_eq!(attempts, 1);
                assert!(last_error.contains("quota"));
            }
            other => panic!("expected CredentialsExhausted, got {other:?}"),
        }
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_all_credentials_exhausted_counts_every_attempt() {
        let inner = ScriptedClient::new()
            .fail("rate limit")
            .fail("quota")
            .fail("limit exceeded");
        let client = FailoverClient::new(Box::new(inner), pool(&["a", "b", "c"]));

        let err = client
            .complete(&test_model_config(), ReasoningRequest::new("", "ping"))
            .await
            .unwrap_err();

        match err {
            StrataError::CredentialsExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected CredentialsExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_credential_error_surfaces_without_rotation() {
        let inner = ScriptedClient::new().fail("HTTP 500: internal server error");
        let calls = inner.call_log();
        let client = FailoverClient::new(Box::new(inner), pool(&["key-a", "key-b"]));

        let err = client
            .complete(&test_model_config(), ReasoningRequest::new("", "ping"))
            .await
            .unwrap_err();

        assert!(matches!(err, StrataError::Reasoning(_)));
        assert_eq!(client.active_index(), 0);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_pool_passes_config_key_through() {
        let inner = ScriptedClient::new().reply("ok");
        let calls = inner.call_log();
        let client = FailoverClient::new(Box::new(inner), CredentialPool::new(None, vec![]));

        client
            .complete(&test_model_config(), ReasoningRequest::new("", "ping"))
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        // test_model_config carries its own key; an empty pool leaves it alone.
        assert_eq!(calls[0].api_key.as_deref(), Some("config-key"));
    }
}
