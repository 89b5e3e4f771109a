//! Operator CLI: inspect and edit column settings through the fallback chain.

use std::io::Write;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use ortho_config::OrthoConfig;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use column_settings::config::{RemoteTarget, SettingsConfig};
use column_settings::domain::ports::{PreferencesTable, SessionProvider};
use column_settings::domain::{ColumnConfig, ReportType, SettingsOrchestrator, SettingsPorts};
use column_settings::outbound::StaticSessionProvider;
use column_settings::outbound::persistence::{DbPool, DieselPreferencesTable, PoolConfig};
use column_settings::outbound::rest::{RestEndpoint, RestPreferencesTable, RestSessionProvider};
use column_settings::outbound::storage::DirectoryKeyValueStorage;

#[derive(Debug, Parser)]
#[command(name = "column-settings", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Probe every tier once and print the health report.
    Health,
    /// Load settings for a report through the fallback chain.
    Load {
        /// `MAIN_REPORT` or `PRODUCTS_REPORT`.
        report: ReportType,
        /// Print the full column list merged with the report defaults.
        #[arg(long)]
        resolved: bool,
    },
    /// Save a JSON array of column configurations.
    Save {
        /// `MAIN_REPORT` or `PRODUCTS_REPORT`.
        report: ReportType,
        /// JSON array of `{ "id", "width", "order", "visible" }` objects.
        columns: String,
        /// Comma-separated column ids giving the display order.
        #[arg(long, value_delimiter = ',')]
        order: Option<Vec<String>>,
    },
    /// Replace a report's settings with its defaults.
    Reset {
        /// `MAIN_REPORT` or `PRODUCTS_REPORT`.
        report: ReportType,
    },
    /// Run health checks periodically, printing each report.
    WatchHealth {
        /// Stop after this many reports.
        #[arg(long)]
        count: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing()?;

    let cli = Cli::parse();
    // Settings come from the environment and config files only; the command
    // line belongs to clap.
    let config = SettingsConfig::load_from_iter([std::ffi::OsString::from("column-settings")])
        .map_err(|error| eyre!("failed to load COLUMN_SETTINGS configuration: {error}"))?;
    let orchestrator = build_orchestrator(&config).await?;

    match cli.command {
        Command::Health => emit(&orchestrator.perform_health_check().await)?,
        Command::Load { report, resolved } => {
            if resolved {
                emit(&orchestrator.resolve_columns(report).await)?;
            } else {
                emit(&orchestrator.load_with_fallback(report).await)?;
            }
        }
        Command::Save {
            report,
            columns,
            order,
        } => {
            let columns: Vec<ColumnConfig> =
                serde_json::from_str(&columns).wrap_err("columns must be a JSON array")?;
            let result = orchestrator
                .save_with_fallback(report, columns, order.as_deref())
                .await;
            emit(&result)?;
        }
        Command::Reset { report } => emit(&orchestrator.reset_to_defaults(report).await)?,
        Command::WatchHealth { count } => {
            let mut watch = orchestrator
                .health_monitor()
                .spawn_periodic(config.health_interval());
            let mut seen = 0_usize;
            while let Some(report) = watch.next().await {
                emit(&report)?;
                seen += 1;
                if count.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
        }
    }

    let pending = orchestrator.pending_background_tasks();
    if pending > 0 {
        info!(pending, "waiting for background reconciliation");
    }
    orchestrator.shutdown().await;
    Ok(())
}

/// Install JSON logging on stderr; stdout carries command results.
fn init_tracing() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .try_init()
        .map_err(|error| eyre!("failed to install tracing subscriber: {error}"))
}

async fn build_orchestrator(config: &SettingsConfig) -> Result<SettingsOrchestrator> {
    let storage = Arc::new(
        DirectoryKeyValueStorage::open(config.storage_dir())
            .wrap_err("failed to open device-local storage")?,
    );
    let pinned = config.pinned_user()?;

    let (table, sessions): (Arc<dyn PreferencesTable>, Arc<dyn SessionProvider>) =
        match config.remote_target()? {
            RemoteTarget::Rest { api_url, api_key } => {
                let endpoint = RestEndpoint::new(api_url, api_key)
                    .with_access_token(config.access_token.clone());
                let table = RestPreferencesTable::new(endpoint.clone(), config.request_timeout())?;
                let sessions: Arc<dyn SessionProvider> = match pinned {
                    Some(user) => Arc::new(StaticSessionProvider::new(Some(user))),
                    None => Arc::new(RestSessionProvider::new(
                        endpoint,
                        config.request_timeout(),
                    )?),
                };
                (Arc::new(table), sessions)
            }
            RemoteTarget::Postgres { database_url } => {
                let pool = DbPool::new(
                    PoolConfig::new(database_url)
                        .with_connection_timeout(config.request_timeout()),
                )
                .await
                .wrap_err("failed to build database pool")?;
                (
                    Arc::new(DieselPreferencesTable::new(pool)),
                    Arc::new(StaticSessionProvider::new(pinned)),
                )
            }
        };

    Ok(SettingsOrchestrator::new(
        SettingsPorts::new(table, sessions, storage),
        config.orchestrator_config(),
    ))
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
