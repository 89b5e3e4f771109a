//! Stage-local failures inside the orchestrator.
//!
//! These never cross the orchestrator boundary: they are logged and turned
//! into a failed [`super::FallbackResult`], or logged by the background
//! scheduler.

use crate::domain::RemoteUnavailable;
use crate::domain::ports::KeyValueStorageError;

#[derive(Debug, thiserror::Error)]
pub(super) enum SettingsFailure {
    #[error(transparent)]
    Remote(#[from] RemoteUnavailable),
    #[error("no authenticated session; remote write declined")]
    Declined,
    #[error("device storage failed: {0}")]
    Storage(#[from] KeyValueStorageError),
}
