//! Caller-facing result shape of orchestrated loads and saves.

use serde::Serialize;

/// Tier that satisfied a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingsSource {
    /// Remote table.
    Database,
    /// In-process cache.
    Cache,
    /// Device-local backup copy.
    Backup,
    /// Device-local storage: the legacy blob on load, the backup on save.
    LocalStorage,
    /// Hard-coded defaults; nothing stored was used.
    Defaults,
}

impl SettingsSource {
    /// Stable wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Cache => "cache",
            Self::Backup => "backup",
            Self::LocalStorage => "localStorage",
            Self::Defaults => "defaults",
        }
    }
}

impl std::fmt::Display for SettingsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structurally complete outcome of an orchestrated operation.
///
/// `T` is `Option<TablePreferences>` for loads and `bool` for saves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackResult<T> {
    /// Whether the operation produced a usable outcome.
    pub success: bool,
    /// Loaded data, or whether the save became durable somewhere.
    pub data: T,
    /// Tier that satisfied the request.
    pub source: SettingsSource,
    /// Diagnostic text for unexpected failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Non-blocking notices suitable for a transient banner.
    pub warnings: Vec<String>,
    /// Suggested follow-ups, including scheduled reconciliation.
    pub recovery_actions: Vec<String>,
}

impl<T> FallbackResult<T> {
    /// Transform the payload, keeping source and diagnostics.
    pub fn map_data<U>(self, f: impl FnOnce(T) -> U) -> FallbackResult<U> {
        FallbackResult {
            success: self.success,
            data: f(self.data),
            source: self.source,
            error: self.error,
            warnings: self.warnings,
            recovery_actions: self.recovery_actions,
        }
    }

    pub(super) fn succeeded(data: T, source: SettingsSource) -> Self {
        Self {
            success: true,
            data,
            source,
            error: None,
            warnings: Vec::new(),
            recovery_actions: Vec::new(),
        }
    }

    pub(super) fn failed(data: T, error: String) -> Self {
        Self {
            success: false,
            data,
            source: SettingsSource::Defaults,
            error: Some(error),
            warnings: Vec::new(),
            recovery_actions: Vec::new(),
        }
    }

    pub(super) fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub(super) fn with_recovery(mut self, action: impl Into<String>) -> Self {
        self.recovery_actions.push(action.into());
        self
    }
}
