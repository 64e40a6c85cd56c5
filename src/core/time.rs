//! Shared timestamp and identifier helpers.
//!
//! Every persisted or in-memory timestamp in hivekeep is Unix epoch milliseconds.

use ulid::Ulid;

pub const SECOND_MS: i64 = 1_000;
pub const MINUTE_MS: i64 = 60 * SECOND_MS;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;

/// Returns unix-epoch milliseconds.
pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn epoch_z(ms: i64) -> String {
    format!("{}Z", ms.div_euclid(SECOND_MS))
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}
