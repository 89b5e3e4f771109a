//! Device-local key-value storage adapters.
//!
//! - **directory**: one file per key inside a capability-scoped directory
//! - **in_memory**: process-local map for tests and ephemeral sessions

mod directory;
mod in_memory;

pub use directory::DirectoryKeyValueStorage;
pub use in_memory::InMemoryKeyValueStorage;
