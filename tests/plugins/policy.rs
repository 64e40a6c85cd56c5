use hivekeep::core::audit::AuditAction;
use hivekeep::core::error::HivekeepError;
use hivekeep::plugins::policy::{
    Environment, MAX_MEMORY_CEILING_BYTES, PolicyManager, Sensitivity, preset, validate_policy,
};
use hivekeep::{Hivekeep, StoreConfig};
use tempfile::tempdir;

#[test]
fn test_presets_are_valid_and_ordered_by_strictness() {
    for env in [
        Environment::Development,
        Environment::Production,
        Environment::Testing,
    ] {
        let policy = preset(env);
        validate_policy(&policy).unwrap();
        assert_eq!(policy.environment, env);
    }

    let prod = preset(Environment::Production);
    let dev = preset(Environment::Development);
    assert!(prod.input.max_param_bytes < dev.input.max_param_bytes);
    assert!(prod.rate_limit.max_requests < dev.rate_limit.max_requests);
    assert_eq!(prod.detection.sensitivity, Sensitivity::High);
    assert!(prod.detection.health_floor > dev.detection.health_floor);
}

#[test]
fn test_out_of_range_values_are_rejected() {
    let mut policy = preset(Environment::Development);
    policy.session.timeout_minutes = 0;
    assert!(matches!(
        validate_policy(&policy),
        Err(HivekeepError::ConfigurationInvalid(_))
    ));

    policy.session.timeout_minutes = 1441;
    assert!(validate_policy(&policy).is_err());

    policy.session.timeout_minutes = 1440;
    validate_policy(&policy).unwrap();

    policy.resources.max_memory_bytes = MAX_MEMORY_CEILING_BYTES + 1;
    assert!(validate_policy(&policy).is_err());

    policy.resources.max_memory_bytes = MAX_MEMORY_CEILING_BYTES;
    policy.detection.poll_interval_ms = 5;
    assert!(validate_policy(&policy).is_err());
}

#[test]
fn test_every_problem_is_reported_together() {
    let mut policy = preset(Environment::Production);
    policy.session.timeout_minutes = 0;
    policy.rate_limit.max_requests = 0;
    let err = validate_policy(&policy).unwrap_err().to_string();
    assert!(err.contains("session.timeout_minutes"));
    assert!(err.contains("rate_limit.max_requests"));
}

#[test]
fn test_update_rejects_invalid_and_keeps_previous() {
    let manager = PolicyManager::for_environment(Environment::Production);
    let mut bad = manager.current();
    bad.resources.max_memory_bytes = 0;
    assert!(manager.update(bad).is_err());
    assert_eq!(manager.current(), preset(Environment::Production));
}

#[test]
fn test_updates_are_visible_through_clones() {
    let manager = PolicyManager::for_environment(Environment::Development);
    let other = manager.clone();
    let mut next = manager.current();
    next.rate_limit.max_requests = 7;
    manager.update(next).unwrap();
    assert_eq!(other.current().rate_limit.max_requests, 7);
}

#[test]
fn test_load_file_accepts_toml_and_json() {
    let tmp = tempdir().unwrap();

    let toml_path = tmp.path().join("policy.toml");
    std::fs::write(&toml_path, toml::to_string(&preset(Environment::Testing)).unwrap()).unwrap();
    let from_toml = PolicyManager::load_file(&toml_path).unwrap();
    assert_eq!(from_toml.environment(), Environment::Testing);
    assert_eq!(from_toml.current(), preset(Environment::Testing));

    let json_path = tmp.path().join("policy.json");
    let mut custom = preset(Environment::Production);
    custom.rate_limit.max_requests = 42;
    std::fs::write(&json_path, serde_json::to_string(&custom).unwrap()).unwrap();
    let from_json = PolicyManager::load_file(&json_path).unwrap();
    assert_eq!(from_json.current().rate_limit.max_requests, 42);

    let yaml_path = tmp.path().join("policy.yaml");
    std::fs::write(&yaml_path, "environment: testing").unwrap();
    assert!(matches!(
        PolicyManager::load_file(&yaml_path),
        Err(HivekeepError::ConfigurationInvalid(_))
    ));

    let invalid_path = tmp.path().join("invalid.json");
    let mut invalid = preset(Environment::Testing);
    invalid.session.timeout_minutes = 5_000;
    std::fs::write(&invalid_path, serde_json::to_string(&invalid).unwrap()).unwrap();
    assert!(PolicyManager::load_file(&invalid_path).is_err());
}

#[test]
fn test_export_import_round_trip() {
    let source = PolicyManager::for_environment(Environment::Production);
    let exported = source.export_policy().unwrap();

    let target = PolicyManager::for_environment(Environment::Development);
    target.import_policy(&exported).unwrap();
    assert_eq!(target.current(), source.current());

    assert!(matches!(
        target.import_policy("{ not json"),
        Err(HivekeepError::ConfigurationInvalid(_))
    ));
    assert_eq!(target.environment(), Environment::Production);
}

#[test]
fn test_policy_update_reaches_gate_and_is_audited() {
    let tmp = tempdir().unwrap();
    let hive = Hivekeep::open(
        StoreConfig::in_dir(tmp.path()),
        PolicyManager::for_environment(Environment::Testing),
    )
    .unwrap();

    let mut tighter = hive.policy.current();
    tighter.input.max_param_bytes = 8;
    hive.update_policy(tighter).unwrap();

    assert_eq!(hive.gate.current_policy().input.max_param_bytes, 8);
    assert!(
        hive.audit
            .entries_after(0)
            .iter()
            .any(|e| e.action == AuditAction::PolicyUpdated)
    );
    assert!(hive.gate.check_identifier("op", "much-too-long-id", "t").is_err());
    hive.shutdown().unwrap();
}
