use hivekeep::core::audit::{AuditAction, AuditTrail, Severity};
use hivekeep::core::crypto::{self, SecretBox};
use hivekeep::core::db::{self, EngineTuning};
use hivekeep::core::error::HivekeepError;
use hivekeep::core::schemas;
use hivekeep::core::time;
use serde_json::json;
use std::thread;
use tempfile::tempdir;

#[test]
fn test_db_connect_creates_parent_dir_and_applies_wal() {
    let tmp = tempdir().expect("tempdir");
    let db_path = tmp.path().join("nested").join("deeper").join("agents.db");

    let conn = db::db_connect(&db_path, &EngineTuning::default()).expect("connect");
    assert!(db_path.parent().unwrap().is_dir());
    assert_eq!(db::journal_mode(&conn).expect("journal mode"), "wal");

    let fk: i64 = conn
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .expect("foreign_keys");
    assert_eq!(fk, 1);
    let temp_store: i64 = conn
        .query_row("PRAGMA temp_store", [], |row| row.get(0))
        .expect("temp_store");
    assert_eq!(temp_store, 2, "temp_store should be MEMORY");
    let cache: i64 = conn
        .query_row("PRAGMA cache_size", [], |row| row.get(0))
        .expect("cache_size");
    assert_eq!(cache, -EngineTuning::default().cache_size_kb);
}

#[test]
fn test_apply_schema_is_idempotent_and_complete() {
    let tmp = tempdir().expect("tempdir");
    let conn = db::db_connect(&db::agent_store_db_path(tmp.path()), &EngineTuning::default())
        .expect("connect");
    db::apply_schema(&conn).expect("first apply");
    db::apply_schema(&conn).expect("second apply");

    let tables = db::table_names(&conn).expect("tables");
    for expected in schemas::EXPECTED_TABLES {
        assert!(tables.contains(&expected.to_string()), "missing table {expected}");
    }
    let indexes = db::index_names(&conn).expect("indexes");
    assert_eq!(indexes.len(), schemas::AGENT_STORE_INDEXES.len());
    assert!(indexes.contains(&"idx_agents_type".to_string()));
}

#[test]
fn test_checkpoint_full_reports_frames() {
    let tmp = tempdir().expect("tempdir");
    let conn = db::db_connect(&tmp.path().join("agents.db"), &EngineTuning::default())
        .expect("connect");
    db::apply_schema(&conn).expect("schema");
    conn.execute(
        "INSERT INTO agent_metrics(agent_id, metric_type, value, recorded_at) VALUES('a', 'm', 1.0, 1)",
        [],
    )
    .expect("insert");
    let report = db::checkpoint_full(&conn).expect("checkpoint");
    assert!(!report.busy);
    assert_eq!(report.log_frames, report.checkpointed_frames);
}

#[test]
fn test_storage_preflight_accepts_writable_dir() {
    let tmp = tempdir().expect("tempdir");
    let dir = tmp.path().join("store");
    db::storage_preflight(&dir).expect("preflight");
    assert!(dir.is_dir());
    assert_eq!(std::fs::read_dir(&dir).expect("read dir").count(), 0);
}

#[test]
fn test_storage_preflight_rejects_dir_under_a_regular_file() {
    let tmp = tempdir().expect("tempdir");
    let blocker = tmp.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").expect("write file");
    let err = db::storage_preflight(&blocker.join("store")).expect_err("unusable dir");
    assert!(matches!(err, HivekeepError::ConfigurationInvalid(_)), "{err:?}");
    assert!(err.to_string().contains("STORAGE_PREFLIGHT_FAILED"));
}

#[test]
fn test_audit_trail_is_shared_between_clones_and_threads() {
    let trail = AuditTrail::new(1_000);
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let trail = trail.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    trail.record(
                        AuditAction::StoreWrite,
                        Severity::Low,
                        Some("worker"),
                        json!({ "t": t, "i": i }),
                    );
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("join");
    }
    assert_eq!(trail.len(), 200);
    assert_eq!(trail.last_seq(), 200);
    let seqs: Vec<u64> = trail.entries_after(0).iter().map(|e| e.seq).collect();
    assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1));
}

#[test]
fn test_audit_trail_bounded_and_queryable() {
    let trail = AuditTrail::new(5);
    for i in 0..8 {
        let severity = if i % 2 == 0 { Severity::High } else { Severity::Low };
        trail.record_at(i * 10, AuditAction::QueryValidated, severity, None, json!({}));
    }
    assert_eq!(trail.len(), 5);
    assert_eq!(trail.entries_after(0).first().map(|e| e.seq), Some(4));
    assert_eq!(trail.entries_after(6).len(), 2);
    assert_eq!(trail.since(60).len(), 2);
    assert_eq!(trail.recent(2)[0].seq, 8);
    assert_eq!(trail.count_by_severity(Severity::High), 2);
}

#[test]
fn test_secret_box_round_trip_and_tamper_detection() {
    let sealed = SecretBox::generate().expect("key");
    let ciphertext = sealed.encrypt("agent coordination secret").expect("encrypt");
    assert_eq!(ciphertext.split(':').count(), 3);
    assert_eq!(
        sealed.decrypt(&ciphertext).expect("decrypt"),
        "agent coordination secret"
    );

    // Flip one hex digit in the body.
    let mut parts: Vec<String> = ciphertext.split(':').map(str::to_string).collect();
    let body = parts[2].clone();
    let first = if body.starts_with('0') { "1" } else { "0" };
    parts[2] = format!("{}{}", first, &body[1..]);
    let tampered = parts.join(":");
    assert!(matches!(
        sealed.decrypt(&tampered),
        Err(HivekeepError::Crypto(_))
    ));

    let other = SecretBox::new(&[7u8; crypto::KEY_LEN]);
    assert!(other.decrypt(&ciphertext).is_err());
    assert!(sealed.decrypt("not-a-ciphertext").is_err());
}

#[test]
fn test_random_helpers_stay_in_range() {
    let values = crypto::secure_random_vector(256).expect("random");
    assert_eq!(values.len(), 256);
    assert!(values.iter().all(|v| (-0.5..=0.5).contains(v)));

    let a = crypto::random_bytes::<16>().expect("bytes");
    let b = crypto::random_bytes::<16>().expect("bytes");
    assert_ne!(a, b);
}

#[test]
fn test_sha256_hex_matches_known_vector() {
    assert_eq!(
        crypto::sha256_hex(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn test_time_helpers() {
    assert_eq!(time::epoch_z(5_000), "5Z");
    assert_eq!(time::new_event_id().len(), 26);
    assert!(time::now_ms() > 1_600_000_000_000);
}
