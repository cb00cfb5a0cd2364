//! End-to-end runs through the orchestrator: knowledge grounding, the
//! cascade, the on-disk cache, and credential failover working together.

use std::sync::Arc;

use strata_agents::{Orchestrator, DATABASE_SPECIALIST, KUBERNETES_SPECIALIST};
use strata_core::config::{AnalysisConfig, AppConfig, CacheConfig, KnowledgeConfig};
use strata_core::types::{AnalysisRequest, Severity};
use strata_llm::{CredentialPool, FailoverClient};
use strata_store::{KnowledgeBase, ResponseCache, SqliteCacheBackend};
use strata_test_utils::{fixtures, test_model_config, ScriptedClient};

fn test_config() -> AppConfig {
    AppConfig {
        analysis: AnalysisConfig::default(),
        model: test_model_config(),
        cache: CacheConfig::default(),
        knowledge: KnowledgeConfig::default(),
    }
}

#[tokio::test]
async fn test_full_run_grounds_prompts_in_ingested_documents() {
    let knowledge = Arc::new(KnowledgeBase::in_memory(500, 3).expect("open kb"));
    knowledge
        .ingest_text(
            "release-notes.md",
            "os",
            "The 15-SP7 kernel drops cgroup v1 support entirely. \
             Kubelet hosts must move to the systemd cgroup driver.",
        )
        .expect("ingest");

    let client = ScriptedClient::new()
        .reply(fixtures::os_direct_reply())
        .reply(fixtures::k8s_impact_reply())
        .reply(fixtures::db_impact_reply());
    let calls = client.call_log();

    let orchestrator =
        Orchestrator::new(&test_config(), Arc::new(client), knowledge, None).expect("wire graph");
    let report = orchestrator
        .analyze(&AnalysisRequest::new("15-SP6", "15-SP7"))
        .await
        .expect("analysis run");

    // The root prompt carried the retrieved snippet.
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    assert!(calls[0].prompt.contains("drops cgroup v1 support"));

    // Findings cascaded two layers down.
    let k8s = &report.downstream_impacts[KUBERNETES_SPECIALIST];
    assert_eq!(k8s.risk_level, Severity::High);
    assert_eq!(k8s.downstream[DATABASE_SPECIALIST].risk_level, Severity::Medium);

    // And the report names the document that grounded it.
    assert_eq!(report.document_sources.len(), 1);
    assert_eq!(report.document_sources[0].filename, "release-notes.md");
}

#[tokio::test]
async fn test_cache_survives_reopening_the_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache_path = dir.path().join("cache.db");
    let request = AnalysisRequest::new("15-SP6", "15-SP7");

    // First process: full run, root analysis cached on disk.
    {
        let client = ScriptedClient::new()
            .reply(fixtures::os_direct_reply())
            .reply(fixtures::k8s_impact_reply())
            .reply(fixtures::db_impact_reply());
        let cache = ResponseCache::new(Box::new(
            SqliteCacheBackend::open(&cache_path).expect("open cache"),
        ));
        let knowledge = Arc::new(KnowledgeBase::in_memory(500, 3).expect("open kb"));
        let orchestrator =
            Orchestrator::new(&test_config(), Arc::new(client), knowledge, Some(cache))
                .expect("wire graph");

        let report = orchestrator.analyze(&request).await.expect("first run");
        assert!(!report.cache_hit);
    }

    // Second process: only the two impact calls are scripted. If the root
    // analysis were re-requested the script would run dry and fail the run.
    let client = ScriptedClient::new()
        .reply(fixtures::k8s_impact_reply())
        .reply(fixtures::db_impact_reply());
    let calls = client.call_log();
    let cache = ResponseCache::new(Box::new(
        SqliteCacheBackend::open(&cache_path).expect("reopen cache"),
    ));
    let knowledge = Arc::new(KnowledgeBase::in_memory(500, 3).expect("open kb"));
    let orchestrator = Orchestrator::new(&test_config(), Arc::new(client), knowledge, Some(cache))
        .expect("wire graph");

    let report = orchestrator.analyze(&request).await.expect("cached run");
    assert!(report.cache_hit);
    assert_eq!(report.analysis.changes.len(), 1);
    assert_eq!(calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_quota_exhaustion_rotates_to_fallback_credential_mid_run() {
    let scripted = ScriptedClient::new()
        .fail("rate limit exceeded for this key")
        .reply(fixtures::os_direct_reply())
        .reply(fixtures::k8s_impact_reply())
        .reply(fixtures::quiet_impact_reply());
    let calls = scripted.call_log();

    let llm = Arc::new(FailoverClient::new(
        Box::new(scripted),
        CredentialPool::new(Some("primary-key".to_string()), vec!["backup-key".to_string()]),
    ));
    let knowledge = Arc::new(KnowledgeBase::in_memory(500, 3).expect("open kb"));
    let orchestrator =
        Orchestrator::new(&test_config(), llm, knowledge, None).expect("wire graph");

    let report = orchestrator
        .analyze(&AnalysisRequest::new("15-SP6", "15-SP7"))
        .await
        .expect("run succeeds on the fallback key");

    assert_eq!(report.analysis.changes.len(), 1);

    // One failed attempt on the primary key, then everything on the backup.
    let keys: Vec<Option<String>> = calls
        .lock()
        .unwrap()
        .iter()
        .map(|c| c.api_key.clone())
        .collect();
    assert_eq!(
        keys,
        vec![
            Some("primary-key".to_string()),
            Some("backup-key".to_string()),
            Some("backup-key".to_string()),
            Some("backup-key".to_string()),
        ]
    );
}
