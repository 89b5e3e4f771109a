//! Layered persistence for per-user table column settings.
//!
//! Loads fall back through the remote table, an in-process cache, a
//! device-local backup, a legacy device-local blob and finally hard-coded
//! defaults. Saves fall back from the remote table to the device-local
//! backup. See [`domain::SettingsOrchestrator`] for the entry point.

pub mod config;
pub mod domain;
pub mod outbound;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
