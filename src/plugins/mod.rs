//! Subsystems built on the core primitives.

pub mod agents;
pub mod health;
pub mod knowledge;
pub mod monitor;
pub mod policy;
pub mod session;
pub mod weights;
