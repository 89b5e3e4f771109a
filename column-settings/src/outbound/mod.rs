//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **rest**: hosted PostgREST-style database and auth service (`reqwest`)
//! - **persistence**: direct PostgreSQL access using Diesel ORM
//! - **storage**: device-local key-value storage (directory or in-memory)
//! - **static_session**: a session pinned to one configured user
//!
//! Adapters translate between domain types and wire or row representations.
//! They contain no fallback or retry logic.

pub mod persistence;
pub mod rest;
mod static_session;
pub mod storage;

pub use static_session::StaticSessionProvider;
