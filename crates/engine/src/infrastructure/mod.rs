//! Infrastructure implementations.
//!
//! Contains port trait implementations for the engine's collaborators.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod memory_store;
pub mod notifier;
pub mod ports;
pub mod record_locks;
pub mod rules;
pub mod telemetry;
