use std::env;
use std::fs;
use tempfile::tempdir;

use super::*;

#[test]
fn test_full_config_loading_workflow() {
    env::set_var("AUDITLINE_IT_ES_HOST", "es.internal");
    env::set_var("AUDITLINE_IT_ES_KEY", "c2VjcmV0");

    let dir = tempdir().unwrap();
    let config_content = r#"
audit:
  service-name: kyc-aml-service
  compliance-tag: KYC
  metadata:
    region: ${AUDITLINE_IT_REGION:-eu-west-1}
  sink:
    kind: direct
    endpoint: https://${AUDITLINE_IT_ES_HOST}:9200
    index: kyc-audit
    delivery: detached
    timeout-ms: 1500
    auth:
      api-key: ${AUDITLINE_IT_ES_KEY}
    retry:
      max-attempts: 4
      initial-backoff-ms: 50

# topic stays at its default since it is not used by the direct sink
"#;
    fs::write(dir.path().join(CONFIG_FILE_NAME), config_content).unwrap();

    let loader = ConfigLoader::new(dir.path());
    let config = loader.load().unwrap();

    assert_eq!(config.sink.endpoint.as_deref(), Some("https://es.internal:9200"));
    assert_eq!(config.sink.auth.as_ref().unwrap().api_key.as_deref(), Some("c2VjcmV0"));
    assert_eq!(config.metadata.get("region").map(String::as_str), Some("eu-west-1"));

    assert_eq!(config.sink.delivery, DeliveryMode::Detached);
    assert_eq!(config.sink.timeout_ms, 1500);
    let retry = config.sink.retry.clone().unwrap();
    assert_eq!(retry.max_attempts, 4);
    assert_eq!(retry.initial_backoff_ms, 50);
    assert_eq!(retry.max_backoff_ms, 2000);
    assert_eq!(config.sink.topic, "audit-logs");
    assert!(config.is_active());

    let mut modified = config.clone();
    modified.compliance_tag = "AML".to_string();
    loader.save(&modified).unwrap();

    let reloaded = loader.load().unwrap();
    assert_eq!(reloaded.compliance_tag, "AML");
    assert_eq!(reloaded.sink.index, "kyc-audit");

    env::remove_var("AUDITLINE_IT_ES_HOST");
    env::remove_var("AUDITLINE_IT_ES_KEY");
}

#[test]
fn test_invalid_file_fails_before_use() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "audit:\n  sink:\n    kind: direct\n    index: kyc-audit\n",
    )
    .unwrap();

    let err = ConfigLoader::new(dir.path()).load().unwrap_err();
    assert!(err.to_string().contains("audit.sink.endpoint"));
}
