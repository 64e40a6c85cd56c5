use hivekeep::core::audit::{AuditAction, AuditTrail, Severity};
use hivekeep::core::gatekeeper::{QueryParam, ValidationGate};
use hivekeep::core::time::{self, HOUR_MS, MINUTE_MS};
use hivekeep::plugins::agents::{AgentType, NewAgent};
use hivekeep::plugins::health::ThreatLevel;
use hivekeep::plugins::monitor::{
    AlertCategory, FixedSampler, MonitorEvent, RECENT_EVENT_LIMIT, ResourceSampler, SecurityMonitor,
    SysinfoSampler, ThreatKind,
};
use hivekeep::plugins::policy::{Environment, PolicyManager};
use hivekeep::{Hivekeep, StoreConfig};
use serde_json::json;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

fn monitor_for(env: Environment, sampler: FixedSampler) -> (AuditTrail, SecurityMonitor) {
    let audit = AuditTrail::new(10_000);
    let monitor = SecurityMonitor::with_sampler(
        audit.clone(),
        PolicyManager::for_environment(env),
        Box::new(sampler),
    );
    (audit, monitor)
}

fn testing_monitor() -> (AuditTrail, SecurityMonitor) {
    monitor_for(Environment::Testing, FixedSampler::default())
}

#[test]
fn test_repeated_source_raises_one_coordinated_attack_alert() {
    let (audit, monitor) = testing_monitor();
    let now = time::now_ms();
    for i in 0..3 {
        audit.record_at(
            now - 1_000 + i,
            AuditAction::RateLimitExceeded,
            Severity::High,
            Some("ip-9"),
            json!({ "count": 101 }),
        );
    }
    let snapshot = monitor.poll_at(now);
    assert_eq!(snapshot.mitigated_threats, 3);
    assert_eq!(snapshot.active_threats, 0);

    let threats = monitor.threats();
    assert_eq!(threats.len(), 3);
    assert!(threats.iter().all(|t| t.kind == ThreatKind::DosAttack && t.mitigated));

    let coordinated: Vec<_> = monitor
        .alerts()
        .into_iter()
        .filter(|a| a.category == AlertCategory::CoordinatedAttack)
        .collect();
    assert_eq!(coordinated.len(), 1);
    assert_eq!(coordinated[0].severity, Severity::High);
    assert!(coordinated[0].message.contains("ip-9"));
    assert_eq!(coordinated[0].details["source"], "ip-9");

    // Still open, so another poll does not duplicate it.
    monitor.poll_at(now + 10);
    let again = monitor
        .alerts()
        .iter()
        .filter(|a| a.category == AlertCategory::CoordinatedAttack)
        .count();
    assert_eq!(again, 1);
}

#[test]
fn test_digest_mismatch_is_unmitigated_and_critical() {
    let (audit, monitor) = testing_monitor();
    let now = time::now_ms();
    audit.record_at(
        now,
        AuditAction::DigestMismatch,
        Severity::Critical,
        Some("agent-store"),
        json!({ "expected": "aa", "actual": "bb" }),
    );
    let snapshot = monitor.poll_at(now);

    let threat = monitor.threats().remove(0);
    assert_eq!(threat.kind, ThreatKind::DataCorruption);
    assert_eq!(threat.severity, Severity::Critical);
    assert!(!threat.mitigated);
    assert!(threat.response.unwrap().contains("manual intervention"));

    assert_eq!(snapshot.active_threats, 1);
    assert_eq!(snapshot.threat_level, ThreatLevel::Critical);
    // One active threat and one unacknowledged critical alert.
    assert_eq!(snapshot.health_score, 75);

    let alerts = monitor.alerts();
    assert!(alerts.iter().any(|a| {
        a.category == AlertCategory::Threat && a.severity == Severity::Critical
    }));
    assert!(alerts.iter().any(|a| a.category == AlertCategory::ThreatLevel));
}

#[test]
fn test_entries_before_monitor_creation_are_not_replayed() {
    let audit = AuditTrail::new(100);
    audit.record(AuditAction::InjectionDetected, Severity::High, Some("old"), json!({}));
    let monitor = SecurityMonitor::with_sampler(
        audit.clone(),
        PolicyManager::for_environment(Environment::Testing),
        Box::new(FixedSampler::default()),
    );
    monitor.poll_once();
    assert!(monitor.threats().is_empty());
}

#[test]
fn test_gate_rejections_become_threats() {
    let (audit, monitor) = testing_monitor();
    let gate = ValidationGate::new(PolicyManager::for_environment(Environment::Testing), audit)
        .unwrap();
    let result = gate.validate_query_parameters(
        "SELECT * FROM agents WHERE id = ?1",
        &[QueryParam::from("1; DROP TABLE agents")],
        Some("client-3"),
    );
    assert!(!result.accepted);
    gate.validate_numeric_tensor(&[5_000.0], Some("client-3"));

    monitor.poll_once();
    let kinds: Vec<ThreatKind> = monitor.threats().iter().map(|t| t.kind).collect();
    assert_eq!(kinds, vec![ThreatKind::SqlInjection, ThreatKind::BufferOverflow]);
    // Injection is High and reaches the alert floor; overflow is Medium and does not.
    let threat_alerts: Vec<_> = monitor
        .alerts()
        .into_iter()
        .filter(|a| a.category == AlertCategory::Threat)
        .collect();
    assert_eq!(threat_alerts.len(), 1);
    assert_eq!(threat_alerts[0].details["kind"], "sql_injection");
}

#[test]
fn test_high_sensitivity_lowers_the_alert_floor() {
    let (_audit, monitor) = monitor_for(Environment::Production, FixedSampler::default());
    monitor.report_threat(
        ThreatKind::BufferOverflow,
        Severity::Medium,
        Some("client-1"),
        "clamped",
        json!({}),
    );
    assert_eq!(monitor.alerts().len(), 1);
}

#[test]
fn test_two_critical_threats_escalate() {
    let (_audit, monitor) = testing_monitor();
    let now = time::now_ms();
    for source in ["a", "b"] {
        monitor.report_threat_at(
            now,
            ThreatKind::DataCorruption,
            Severity::Critical,
            Some(source),
            "digest mismatch",
            json!({}),
        );
    }
    let escalations = monitor
        .alerts()
        .iter()
        .filter(|a| a.category == AlertCategory::ThreatEscalation)
        .count();
    assert_eq!(escalations, 1);
}

#[test]
fn test_acknowledge_and_resolve_are_idempotent() {
    let (_audit, monitor) = testing_monitor();
    assert!(!monitor.acknowledge("missing"));
    assert!(!monitor.resolve("missing"));

    monitor.report_threat(
        ThreatKind::SqlInjection,
        Severity::High,
        Some("client-2"),
        "signature matched",
        json!({}),
    );
    let alert_id = monitor.alerts()[0].id.clone();

    assert!(monitor.acknowledge(&alert_id));
    assert!(monitor.acknowledge(&alert_id));
    assert!(monitor.alerts()[0].acknowledged);

    assert!(monitor.resolve_at(&alert_id, 1_000));
    assert!(monitor.resolve_at(&alert_id, 2_000));
    let alert = monitor.alerts().remove(0);
    assert_eq!(alert.resolved_at, Some(1_000));
    assert!(!alert.is_open());
}

#[test]
fn test_resolved_condition_alert_can_fire_again() {
    let sampler = FixedSampler {
        memory_bytes: 2 * 1024 * 1024 * 1024,
        cpu_percent: 1.0,
    };
    let (_audit, monitor) = monitor_for(Environment::Testing, sampler);
    let now = time::now_ms();
    let snapshot = monitor.poll_at(now);
    assert_eq!(snapshot.health_score, 80);
    monitor.poll_at(now + 1);

    let memory: Vec<_> = monitor
        .alerts()
        .into_iter()
        .filter(|a| a.category == AlertCategory::Memory)
        .collect();
    assert_eq!(memory.len(), 1);

    monitor.resolve_at(&memory[0].id, now + 2);
    monitor.poll_at(now + 3);
    let memory_alerts = monitor
        .alerts()
        .iter()
        .filter(|a| a.category == AlertCategory::Memory)
        .count();
    assert_eq!(memory_alerts, 2);
}

#[test]
fn test_threat_levels_follow_the_window() {
    let (_audit, monitor) = testing_monitor();
    let now = time::now_ms();
    assert_eq!(monitor.threat_level_at(now), ThreatLevel::Low);

    monitor.report_threat_at(now, ThreatKind::DosAttack, Severity::Medium, None, "burst", json!({}));
    assert_eq!(monitor.threat_level_at(now), ThreatLevel::Medium);

    monitor.report_threat_at(now, ThreatKind::SqlInjection, Severity::High, None, "sig", json!({}));
    assert_eq!(monitor.threat_level_at(now), ThreatLevel::High);

    monitor.report_threat_at(now, ThreatKind::SqlInjection, Severity::High, None, "sig", json!({}));
    assert_eq!(monitor.threat_level_at(now), ThreatLevel::Critical);

    // Six minutes later everything has left the 5 minute window.
    assert_eq!(monitor.threat_level_at(now + 6 * 60_000), ThreatLevel::Low);
}

#[test]
fn test_health_score_breaches_floor_and_bottoms_out_at_zero() {
    let sampler = FixedSampler {
        memory_bytes: 1024 * 1024 * 1024,
        cpu_percent: 0.0,
    };
    let (_audit, monitor) = monitor_for(Environment::Development, sampler);
    let now = time::now_ms();
    for _ in 0..4 {
        monitor.report_threat_at(now, ThreatKind::DataCorruption, Severity::Low, None, "x", json!({}));
    }
    let snapshot = monitor.poll_at(now);
    assert_eq!(snapshot.health_score, 40);
    assert!(
        monitor
            .alerts()
            .iter()
            .any(|a| a.category == AlertCategory::HealthScore)
    );

    for _ in 0..20 {
        monitor.report_threat_at(now, ThreatKind::DataCorruption, Severity::Low, None, "x", json!({}));
    }
    assert_eq!(monitor.poll_at(now).health_score, 0);
}

#[test]
fn test_cleanup_drops_entries_past_the_retention_window() {
    let (_audit, monitor) = testing_monitor();
    let now = time::now_ms();
    let old = now - 25 * HOUR_MS;
    monitor.report_threat_at(old, ThreatKind::SqlInjection, Severity::High, None, "old", json!({}));
    monitor.poll_at(old);
    monitor.report_threat_at(now, ThreatKind::DosAttack, Severity::Low, None, "new", json!({}));
    monitor.poll_at(now);

    let report = monitor.cleanup_at(now);
    assert_eq!(report.threats, 1);
    assert_eq!(report.alerts, 1);
    assert_eq!(report.metrics, 1);
    assert_eq!(monitor.threats().len(), 1);
    assert_eq!(monitor.threats()[0].description, "new");
    assert_eq!(monitor.metrics_history().len(), 1);
}

#[test]
fn test_cleanup_follows_policy_retention_hours() {
    let now = time::now_ms();
    let (_audit, testing) = testing_monitor();
    let (_audit, production) = monitor_for(Environment::Production, FixedSampler::default());
    for monitor in [&testing, &production] {
        for (age, label) in [(30 * MINUTE_MS, "recent"), (2 * HOUR_MS, "hours"), (25 * HOUR_MS, "day")] {
            monitor.report_threat_at(now - age, ThreatKind::DosAttack, Severity::Low, None, label, json!({}));
        }
    }

    // Testing keeps one hour, production keeps a week.
    assert_eq!(testing.cleanup_at(now).threats, 2);
    assert_eq!(testing.threats().len(), 1);
    assert_eq!(testing.threats()[0].description, "recent");
    assert_eq!(production.cleanup_at(now).threats, 0);
    assert_eq!(production.threats().len(), 3);
}

#[test]
fn test_sysinfo_sampler_reads_the_current_process() {
    let (memory_bytes, cpu_percent) = SysinfoSampler::new().sample();
    assert!(memory_bytes > 0);
    assert!(cpu_percent >= 0.0);
}

#[test]
fn test_dashboard_caps_recent_events() {
    let (_audit, monitor) = testing_monitor();
    let now = time::now_ms();
    for i in 0..30 {
        monitor.report_threat_at(
            now + i,
            ThreatKind::DosAttack,
            Severity::Low,
            None,
            &format!("burst {i}"),
            json!({}),
        );
    }
    let dashboard = monitor.dashboard_at(now + 100);
    assert_eq!(dashboard.threats.total, 30);
    assert_eq!(dashboard.threats.by_kind["dos_attack"], 30);
    assert_eq!(dashboard.recent_events.len(), RECENT_EVENT_LIMIT);
    match &dashboard.recent_events[0] {
        MonitorEvent::Threat(t) => assert_eq!(t.description, "burst 29"),
        other => panic!("expected newest threat first, got {other:?}"),
    }
    assert!(dashboard.metrics.is_none());
    assert!(!dashboard.running);
}

#[test]
fn test_start_stop_transitions() {
    let (_audit, monitor) = testing_monitor();
    assert!(!monitor.is_running());
    monitor.start().unwrap();
    monitor.start().unwrap();
    assert!(monitor.is_running());

    thread::sleep(Duration::from_millis(350));
    monitor.stop();
    assert!(!monitor.is_running());
    assert!(!monitor.metrics_history().is_empty());

    let polls = monitor.metrics_history().len();
    thread::sleep(Duration::from_millis(250));
    assert_eq!(monitor.metrics_history().len(), polls);
    monitor.stop();
}

#[test]
fn test_store_timings_feed_average_response() {
    let tmp = tempdir().unwrap();
    let hive = Hivekeep::open(
        StoreConfig::in_dir(tmp.path()),
        PolicyManager::for_environment(Environment::Testing),
    )
    .unwrap();
    hive.store
        .save_agent(NewAgent::new("a-1", AgentType::Coder))
        .unwrap();
    hive.store.get_agent("a-1").unwrap();

    let snapshot = hive.monitor.poll_once();
    assert!(snapshot.avg_response_ms.is_some());
    assert!(hive.monitor.latest_metrics().is_some());

    // Nothing new since the last poll.
    assert!(hive.monitor.poll_once().avg_response_ms.is_none());
    hive.shutdown().unwrap();
}
