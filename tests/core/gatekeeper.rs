use hivekeep::core::audit::{AuditAction, AuditTrail, Severity};
use hivekeep::core::crypto;
use hivekeep::core::error::HivekeepError;
use hivekeep::core::gatekeeper::{QueryParam, SignatureTable, ValidationGate, ViolationKind};
use hivekeep::plugins::policy::{Environment, PolicyManager, preset};

fn testing_gate() -> ValidationGate {
    ValidationGate::new(
        PolicyManager::for_environment(Environment::Testing),
        AuditTrail::new(10_000),
    )
    .expect("gate")
}

fn gate_with_rate_limit(max_requests: u32) -> ValidationGate {
    let mut policy = preset(Environment::Testing);
    policy.rate_limit.window_ms = 60_000;
    policy.rate_limit.max_requests = max_requests;
    ValidationGate::new(
        PolicyManager::new(policy).expect("policy"),
        AuditTrail::new(10_000),
    )
    .expect("gate")
}

const HOSTILE: [&str; 6] = [
    "1; DROP TABLE agents",
    "x' OR '1'='1",
    "admin'--",
    "1 UNION SELECT id FROM agents",
    "%27%20or%201=1",
    "name /* comment */",
];

#[test]
fn test_injection_signatures_are_rejected_and_audited_high() {
    let gate = testing_gate();
    for input in HOSTILE {
        let result = gate.validate_query_parameters(
            "SELECT * FROM agents WHERE id = ?1",
            &[QueryParam::from(input)],
            Some("client-7"),
        );
        assert!(!result.accepted, "accepted hostile input {input:?}");
        assert!(result.score < 100);
        assert!(result.has(ViolationKind::InjectionSignature));
        let last = gate.audit().recent(1).remove(0);
        assert_eq!(last.action, AuditAction::InjectionDetected);
        assert_eq!(last.severity, Severity::High);
        assert_eq!(last.source.as_deref(), Some("client-7"));
    }
}

#[test]
fn test_sanitized_output_never_contains_stripped_characters() {
    let gate = testing_gate();
    for input in HOSTILE {
        let result = gate.validate_query_parameters("q", &[QueryParam::from(input)], None);
        let QueryParam::Text(clean) = &result.sanitized[0] else {
            panic!("text parameter should stay text");
        };
        assert!(!clean.contains(['\'', '"', ';', '\\', '-', '`']));
    }
}

#[test]
fn test_clean_parameters_pass_untouched() {
    let gate = testing_gate();
    let params = [
        QueryParam::from("coder"),
        QueryParam::Integer(10),
        QueryParam::Real(0.5),
        QueryParam::Null,
    ];
    let result = gate.validate_query_parameters("q", &params, None);
    assert!(result.accepted);
    assert_eq!(result.score, 100);
    assert_eq!(result.sanitized, params.to_vec());
    assert_eq!(gate.audit().recent(1)[0].action, AuditAction::QueryValidated);
}

#[test]
fn test_oversized_parameter_is_rejected_and_truncated() {
    let gate = testing_gate();
    let long = "a".repeat(1_000);
    let result = gate.validate_query_parameters("q", &[QueryParam::from(long.as_str())], None);
    assert!(!result.accepted);
    assert!(result.has(ViolationKind::Oversized));
    assert_eq!(result.sanitized[0].as_text().map(str::len), Some(256));
}

#[test]
fn test_rate_limit_rejects_the_call_after_the_ceiling() {
    let gate = gate_with_rate_limit(5);
    let now = 1_000_000;
    for i in 0..5 {
        let r = gate.check_rate_limit_at("ip-1", now + i);
        assert!(r.accepted, "call {} within the ceiling", i + 1);
    }
    let over = gate.check_rate_limit_at("ip-1", now + 10);
    assert!(!over.accepted);
    assert_eq!(over.score, 0);
    assert!(over.has(ViolationKind::RateLimitExceeded));

    // Other identifiers have their own window.
    assert!(gate.check_rate_limit_at("ip-2", now + 10).accepted);
    // A new window starts fresh.
    assert!(gate.check_rate_limit_at("ip-1", now + 60_000).accepted);
}

#[test]
fn test_rate_limit_score_degrades_past_half_the_ceiling() {
    let gate = gate_with_rate_limit(10);
    let scores: Vec<u8> = (0..10)
        .map(|i| gate.check_rate_limit_at("ip-3", 5_000 + i).score)
        .collect();
    assert!(scores[..5].iter().all(|s| *s == 100));
    assert!(scores[5] < 100);
    assert_eq!(scores[9], 0);
    assert!(scores.windows(2).all(|w| w[1] <= w[0]));
}

#[test]
fn test_rate_limit_exceeded_is_audited_high() {
    let gate = gate_with_rate_limit(1);
    gate.check_rate_limit_at("ip-4", 1);
    gate.check_rate_limit_at("ip-4", 2);
    let last = gate.audit().recent(1).remove(0);
    assert_eq!(last.action, AuditAction::RateLimitExceeded);
    assert_eq!(last.severity, Severity::High);
    assert_eq!(gate.rate_limit_usage("ip-4"), 2);
    gate.reset_rate_limits();
    assert_eq!(gate.rate_limit_usage("ip-4"), 0);
}

#[test]
fn test_tensor_values_are_clamped_and_non_finite_zeroed() {
    let gate = testing_gate();
    let result = gate.validate_numeric_tensor(&[1.0, 5_000.0, -5_000.0, f32::NAN], Some("agent-x"));
    assert!(result.accepted);
    assert_eq!(result.sanitized, vec![1.0, 1000.0, -1000.0, 0.0]);
    assert!(result.has(ViolationKind::MagnitudeExceeded));
    assert!(result.has(ViolationKind::NonFinite));
    let last = gate.audit().recent(1).remove(0);
    assert_eq!(last.action, AuditAction::TensorViolation);
    assert_eq!(last.details["magnitude_violations"], 2);
}

#[test]
fn test_tensor_over_element_ceiling_is_rejected() {
    let gate = testing_gate();
    let values = vec![0.1f32; 1_001];
    let result = gate.validate_numeric_tensor(&values, None);
    assert!(!result.accepted);
    assert!(result.has(ViolationKind::TooManyElements));
    assert_eq!(result.sanitized.len(), 1_000);
}

fn weights_blob() -> Vec<u8> {
    (0..256)
        .map(|i| (i as f32 * 0.37).sin())
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

#[test]
fn test_blob_with_correct_digest_is_accepted() {
    let gate = testing_gate();
    let blob = weights_blob();
    let result = gate.validate_weight_blob(&blob, &crypto::sha256_hex(&blob), None);
    assert!(result.accepted);
    assert_eq!(result.score, 100);
    assert_eq!(gate.audit().recent(1)[0].action, AuditAction::BlobValidated);
}

#[test]
fn test_any_single_byte_mutation_is_a_critical_rejection() {
    let gate = testing_gate();
    let blob = weights_blob();
    let digest = crypto::sha256_hex(&blob);
    for idx in [0, 1, 511, blob.len() - 1] {
        let mut mutated = blob.clone();
        mutated[idx] ^= 0x01;
        let result = gate.validate_weight_blob(&mutated, &digest, Some("store"));
        assert!(!result.accepted);
        assert_eq!(result.score, 0);
        assert!(result.digest_mismatch());
        let last = gate.audit().recent(1).remove(0);
        assert_eq!(last.action, AuditAction::DigestMismatch);
        assert_eq!(last.severity, Severity::Critical);
    }
}

#[test]
fn test_all_zero_blob_passes_digest_but_is_flagged() {
    let gate = testing_gate();
    let blob = vec![0u8; 4096];
    let result = gate.validate_weight_blob(&blob, &crypto::sha256_hex(&blob), None);
    assert!(result.accepted);
    assert!(result.score < 100);
    assert!(result.has(ViolationKind::UniformValues) || result.has(ViolationKind::ExcessiveZeros));
    assert_eq!(gate.audit().recent(1)[0].action, AuditAction::BlobSuspicious);
}

#[test]
fn test_identifiers_keep_their_dashes() {
    let gate = testing_gate();
    gate.check_identifier("get_agent", "a-1", "tester").expect("plain id");
    let err = gate
        .check_identifier("get_agent", "a'; DROP TABLE agents", "tester")
        .expect_err("hostile id");
    assert!(matches!(err, HivekeepError::ValidationRejected { .. }));
    assert!(gate.check_identifier("get_agent", "  ", "tester").is_err());
}

#[test]
fn test_identifier_checks_charge_the_rate_limit() {
    let gate = gate_with_rate_limit(2);
    gate.check_identifier("op", "a-1", "caller").expect("first");
    gate.check_identifier("op", "a-1", "caller").expect("second");
    let err = gate.check_identifier("op", "a-1", "caller").expect_err("third");
    assert!(matches!(err, HivekeepError::RateLimited { .. }));
    assert!(err.is_recoverable());
}

#[test]
fn test_custom_signatures_extend_the_table() {
    let mut table = SignatureTable::sql_defaults();
    let before = table.len();
    table.push("shell_escape", r"\$\(", 50).expect("pattern");
    assert_eq!(table.len(), before + 1);
    assert!(table.push("broken", r"(", 10).is_err());

    let gate = ValidationGate::with_parts(
        PolicyManager::for_environment(Environment::Testing),
        AuditTrail::default(),
        table,
        crypto::SecretBox::generate().expect("key"),
    );
    let result = gate.validate_query_parameters("q", &[QueryParam::from("$(reboot)")], None);
    assert!(!result.accepted);
    assert_eq!(result.violations[0].field.as_deref(), Some("shell_escape"));
}

/// Runs `f` and asserts it appended exactly one audit entry, returning its action.
fn single_audit_entry<T>(gate: &ValidationGate, f: impl FnOnce() -> T) -> (T, AuditAction) {
    let before = gate.audit().last_seq();
    let out = f();
    let added = gate.audit().entries_after(before);
    assert_eq!(added.len(), 1, "expected one audit entry, got {added:?}");
    (out, added[0].action)
}

#[test]
fn test_gate_encryption_respects_param_ceiling_and_audits_every_outcome() {
    let gate = testing_gate();

    let (sealed, action) = single_audit_entry(&gate, || gate.encrypt("token"));
    let sealed = sealed.expect("encrypt");
    assert_eq!(action, AuditAction::Encrypted);

    let (opened, action) = single_audit_entry(&gate, || gate.decrypt(&sealed));
    assert_eq!(opened.expect("decrypt"), "token");
    assert_eq!(action, AuditAction::Decrypted);

    let (rejected, action) = single_audit_entry(&gate, || gate.encrypt(&"x".repeat(257)));
    assert!(rejected.is_err());
    assert_eq!(action, AuditAction::QueryRejected);

    let (failed, action) = single_audit_entry(&gate, || gate.decrypt("00:11:22"));
    assert!(failed.is_err());
    assert_eq!(action, AuditAction::DecryptFailed);

    let entries = gate.audit().entries_after(0);
    assert!(
        entries
            .iter()
            .all(|e| !e.details.to_string().contains("token")),
        "plaintext must never reach the audit trail"
    );
}

#[test]
fn test_random_vector_is_capped_by_policy_and_audited() {
    let gate = testing_gate();
    let (values, action) = single_audit_entry(&gate, || gate.secure_random_vector(10));
    assert_eq!(values.expect("random").len(), 10);
    assert_eq!(action, AuditAction::RandomIssued);

    let (over, action) = single_audit_entry(&gate, || gate.secure_random_vector(1_001));
    assert!(over.is_err());
    assert_eq!(action, AuditAction::QueryRejected);
}
