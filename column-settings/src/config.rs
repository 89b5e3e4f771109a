//! Runtime configuration loaded via OrthoConfig.
//!
//! Every value can come from `COLUMN_SETTINGS_*` environment variables or a
//! configuration file. The remote tier is either a hosted REST endpoint
//! (`api_url` + `api_key`) or a direct PostgreSQL connection
//! (`database_url`); the latter wins when both are set.

use std::path::PathBuf;
use std::time::Duration;

use ortho_config::OrthoConfig;
use reqwest::Url;
use serde::Deserialize;

use crate::domain::{OrchestratorConfig, RetryPolicies, UserId, UserIdValidationError};

const DEFAULT_STORAGE_DIR: &str = ".column-settings";

/// Configuration problems detected after loading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsConfigError {
    /// Neither a REST endpoint nor a database URL was configured.
    #[error("configure COLUMN_SETTINGS_API_URL or COLUMN_SETTINGS_DATABASE_URL")]
    MissingRemote,
    /// The REST endpoint URL did not parse.
    #[error("invalid api_url: {message}")]
    InvalidApiUrl { message: String },
    /// A REST endpoint was configured without its API key.
    #[error("api_url requires COLUMN_SETTINGS_API_KEY")]
    MissingApiKey,
    /// The pinned user id was not a UUID.
    #[error("invalid user_id: {0}")]
    InvalidUserId(#[from] UserIdValidationError),
}

/// Where the remote preferences table lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteTarget {
    /// PostgREST-style hosted database.
    Rest {
        /// Project base URL.
        api_url: Url,
        /// Public API key sent with every request.
        api_key: String,
    },
    /// Direct PostgreSQL connection.
    Postgres {
        /// Connection string.
        database_url: String,
    },
}

/// Configuration for the column settings store and its CLI.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "COLUMN_SETTINGS")]
pub struct SettingsConfig {
    /// Hosted database base URL.
    pub api_url: Option<String>,
    /// Hosted database public API key.
    pub api_key: Option<String>,
    /// Signed-in user's access token for the hosted database.
    pub access_token: Option<String>,
    /// PostgreSQL connection string for direct access.
    pub database_url: Option<String>,
    /// Directory backing device-local storage.
    pub storage_dir: Option<PathBuf>,
    /// Pin the session to this user instead of asking the auth service.
    pub user_id: Option<String>,
    /// Debounce window for remote saves, in milliseconds.
    #[ortho_config(default = 1000)]
    pub debounce_ms: u64,
    /// Cache entry lifetime, in seconds.
    #[ortho_config(default = 300)]
    pub cache_ttl_secs: u64,
    /// Interval between periodic health checks, in seconds.
    #[ortho_config(default = 60)]
    pub health_interval_secs: u64,
    /// HTTP request timeout, in seconds.
    #[ortho_config(default = 10)]
    pub request_timeout_secs: u64,
}

impl SettingsConfig {
    /// Orchestrator tunables derived from this configuration.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            retry: RetryPolicies::default(),
        }
    }

    /// Interval for `watch-health`; never shorter than one second.
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs.max(1))
    }

    /// Per-request HTTP timeout; never shorter than one second.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Directory for device-local storage, defaulting to `./.column-settings`.
    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR))
    }

    /// The pinned user, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsConfigError::InvalidUserId`] when the value is not a
    /// UUID.
    pub fn pinned_user(&self) -> Result<Option<UserId>, SettingsConfigError> {
        self.user_id
            .as_deref()
            .map(UserId::new)
            .transpose()
            .map_err(SettingsConfigError::from)
    }

    /// Resolve the remote tier.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsConfigError`] when no remote is configured, the API
    /// URL is invalid, or the API key is missing.
    pub fn remote_target(&self) -> Result<RemoteTarget, SettingsConfigError> {
        if let Some(database_url) = non_blank(self.database_url.as_deref()) {
            return Ok(RemoteTarget::Postgres {
                database_url: database_url.to_owned(),
            });
        }
        let api_url = non_blank(self.api_url.as_deref()).ok_or(SettingsConfigError::MissingRemote)?;
        let api_url = Url::parse(api_url).map_err(|error| SettingsConfigError::InvalidApiUrl {
            message: error.to_string(),
        })?;
        let api_key = non_blank(self.api_key.as_deref()).ok_or(SettingsConfigError::MissingApiKey)?;
        Ok(RemoteTarget::Rest {
            api_url,
            api_key: api_key.to_owned(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    //! Unit tests for configuration parsing and derivation.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 10] = [
        "COLUMN_SETTINGS_API_URL",
        "COLUMN_SETTINGS_API_KEY",
        "COLUMN_SETTINGS_ACCESS_TOKEN",
        "COLUMN_SETTINGS_DATABASE_URL",
        "COLUMN_SETTINGS_STORAGE_DIR",
        "COLUMN_SETTINGS_USER_ID",
        "COLUMN_SETTINGS_DEBOUNCE_MS",
        "COLUMN_SETTINGS_CACHE_TTL_SECS",
        "COLUMN_SETTINGS_HEALTH_INTERVAL_SECS",
        "COLUMN_SETTINGS_REQUEST_TIMEOUT_SECS",
    ];

    fn env_with(overrides: &[(&'static str, &str)]) -> Vec<(&'static str, Option<String>)> {
        VARS.iter()
            .map(|name| {
                let value = overrides
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| (*value).to_owned());
                (*name, value)
            })
            .collect()
    }

    fn load_from_empty_args() -> SettingsConfig {
        SettingsConfig::load_from_iter([OsString::from("column-settings")])
            .expect("config should load")
    }

    #[rstest]
    fn defaults_are_used_when_missing() {
        let _guard = lock_env(env_with(&[]));

        let config = load_from_empty_args();
        assert_eq!(config.orchestrator_config(), OrchestratorConfig::default());
        assert_eq!(config.health_interval(), Duration::from_secs(60));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.storage_dir(), PathBuf::from(DEFAULT_STORAGE_DIR));
        assert_eq!(config.pinned_user(), Ok(None));
        assert_eq!(config.remote_target(), Err(SettingsConfigError::MissingRemote));
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let user = UserId::random();
        let _guard = lock_env(env_with(&[
            ("COLUMN_SETTINGS_API_URL", "https://db.example.test"),
            ("COLUMN_SETTINGS_API_KEY", "anon-key"),
            ("COLUMN_SETTINGS_USER_ID", user.as_ref()),
            ("COLUMN_SETTINGS_DEBOUNCE_MS", "250"),
            ("COLUMN_SETTINGS_CACHE_TTL_SECS", "30"),
            ("COLUMN_SETTINGS_STORAGE_DIR", "/tmp/column-settings"),
        ]));

        let config = load_from_empty_args();
        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.debounce, Duration::from_millis(250));
        assert_eq!(orchestrator.cache_ttl, Duration::from_secs(30));
        assert_eq!(config.storage_dir(), PathBuf::from("/tmp/column-settings"));
        assert_eq!(config.pinned_user(), Ok(Some(user)));
        assert_eq!(
            config.remote_target(),
            Ok(RemoteTarget::Rest {
                api_url: Url::parse("https://db.example.test").expect("valid url"),
                api_key: "anon-key".to_owned(),
            })
        );
    }

    #[rstest]
    fn database_url_takes_precedence_over_rest() {
        let _guard = lock_env(env_with(&[
            ("COLUMN_SETTINGS_API_URL", "https://db.example.test"),
            ("COLUMN_SETTINGS_DATABASE_URL", "postgres://localhost/settings"),
        ]));

        assert_eq!(
            load_from_empty_args().remote_target(),
            Ok(RemoteTarget::Postgres {
                database_url: "postgres://localhost/settings".to_owned(),
            })
        );
    }

    #[rstest]
    #[case::missing_key(&[("COLUMN_SETTINGS_API_URL", "https://db.example.test")], "API_KEY")]
    #[case::bad_url(
        &[("COLUMN_SETTINGS_API_URL", "not a url"), ("COLUMN_SETTINGS_API_KEY", "k")],
        "invalid api_url"
    )]
    fn incomplete_rest_settings_are_rejected(
        #[case] overrides: &[(&'static str, &str)],
        #[case] expected: &str,
    ) {
        let _guard = lock_env(env_with(overrides));

        let error = load_from_empty_args()
            .remote_target()
            .expect_err("rest settings incomplete");
        assert!(error.to_string().contains(expected), "{error}");
    }

    #[rstest]
    fn malformed_user_ids_are_rejected() {
        let _guard = lock_env(env_with(&[("COLUMN_SETTINGS_USER_ID", "user-42")]));

        assert!(matches!(
            load_from_empty_args().pinned_user(),
            Err(SettingsConfigError::InvalidUserId(_))
        ));
    }
}
