//! Reqwest adapters for a PostgREST-style hosted database.
//!
//! The hosted service exposes the preferences table under `/rest/v1/` and
//! the signed-in user under `/auth/v1/user`. Both adapters share one
//! [`RestEndpoint`] describing the base URL and credentials.

mod endpoint;
mod preferences_table;
mod session_provider;

pub use endpoint::RestEndpoint;
pub use preferences_table::RestPreferencesTable;
pub use session_provider::RestSessionProvider;
