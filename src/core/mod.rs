//! Shared primitives for the store and the security layer.
//!
//! Nothing here depends on the agent store. The audit trail and crypto helpers
//! stand alone; the validation gate reads its limits from
//! [`PolicyManager`](crate::plugins::policy::PolicyManager).

pub mod audit;
pub mod crypto;
pub mod db;
pub mod error;
pub mod gatekeeper;
pub mod schemas;
pub mod time;
