// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: configuration, startup, and shutdown

use crate::command_job::CommandJob;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tenure_adapters::{FileLeaseStore, LeaseStore, MemoryLeaseStore, StoreError, TracedLeaseStore};
use tenure_core::{
    ConfigError, ElectorConfig, FencingToken, HolderId, IdGen, JobManagerConfig, Lease, UuidIdGen,
};
use tenure_engine::{Elector, JobManager, ManagerError, StopOutcome};
use thiserror::Error;
use tracing::{info, warn};

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to read config {0}: {1}")]
    ConfigRead(PathBuf, #[source] std::io::Error),

    #[error("Invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid election config: {0}")]
    Election(#[from] ConfigError),

    #[error("Invalid job config: {0}")]
    Job(String),

    #[error("Unknown key `{key}` in [{section}]")]
    UnknownKey { section: &'static str, key: String },

    #[error("Invalid logging config: {0}")]
    Logging(String),

    #[error("Failed to encode config defaults: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("Job manager error: {0}")]
    Manager(#[from] ManagerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// `[job]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobSection {
    pub name: String,
    pub command: String,
    /// Working directory for the command, defaults to the daemon's
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(flatten)]
    pub manager: JobManagerConfig,
}

/// `[store]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreSection {
    /// Process-local table, only useful for a single daemon
    #[default]
    Memory,
    /// JSON table on a filesystem shared by the fleet
    File { path: PathBuf },
}

/// `[logging]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Log file; stderr when unset
    pub path: Option<PathBuf>,
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub filter: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    holder: Option<String>,
    #[serde(default)]
    election: toml::Table,
    job: toml::Table,
    #[serde(default)]
    store: Option<toml::Table>,
    #[serde(default)]
    logging: LoggingSection,
}

/// Daemon configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub holder: HolderId,
    pub election: ElectorConfig,
    pub job: JobSection,
    pub store: StoreSection,
    pub logging: LoggingSection,
}

impl Config {
    /// Read and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self, LifecycleError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LifecycleError::ConfigRead(path.to_path_buf(), e))?;
        Self::parse(&raw)
    }

    /// Parse and validate TOML config text
    pub fn parse(raw: &str) -> Result<Self, LifecycleError> {
        let raw: RawConfig = toml::from_str(raw)?;

        check_keys("election", &raw.election, table_keys(&ElectorConfig::default())?)?;
        let mut job_keys = table_keys(&JobManagerConfig::default())?;
        job_keys.extend(["name", "command", "cwd"].map(String::from));
        check_keys("job", &raw.job, job_keys)?;

        let job: JobSection = toml::Value::Table(raw.job).try_into()?;
        if job.name.trim().is_empty() {
            return Err(LifecycleError::Job("job.name must not be empty".to_string()));
        }
        if job.command.trim().is_empty() {
            return Err(LifecycleError::Job("job.command must not be empty".to_string()));
        }

        let store = match raw.store {
            Some(table) => {
                check_keys("store", &table, ["kind", "path"].map(String::from))?;
                toml::Value::Table(table).try_into()?
            }
            None => StoreSection::default(),
        };

        let mut election = election_config(raw.election)?;
        if election.resource.is_empty() {
            election.resource = job.name.clone();
        }
        election.validate()?;

        let holder = match raw.holder {
            Some(holder) if !holder.trim().is_empty() => HolderId::new(holder),
            _ => UuidIdGen::from_env().next_holder(),
        };

        Ok(Self {
            holder,
            election,
            job,
            store,
            logging: raw.logging,
        })
    }
}

/// Field names a section accepts, taken from its serialized defaults
fn table_keys<T: serde::Serialize>(defaults: &T) -> Result<Vec<String>, LifecycleError> {
    Ok(match toml::Value::try_from(defaults)? {
        toml::Value::Table(table) => table.keys().cloned().collect(),
        _ => Vec::new(),
    })
}

/// Reject the first key a section does not define; a misspelled interval
/// would otherwise fall back to its default without a word
fn check_keys(
    section: &'static str,
    table: &toml::Table,
    known: impl IntoIterator<Item = String>,
) -> Result<(), LifecycleError> {
    let known: Vec<String> = known.into_iter().collect();
    match table.keys().find(|key| !known.contains(key)) {
        Some(key) => Err(LifecycleError::UnknownKey {
            section,
            key: key.clone(),
        }),
        None => Ok(()),
    }
}

/// Build the election config; every interval not given is derived from `ttl`
fn election_config(table: toml::Table) -> Result<ElectorConfig, LifecycleError> {
    let mut base = ElectorConfig::default();
    if let Some(ttl) = table.get("ttl") {
        let mut only_ttl = toml::Table::new();
        only_ttl.insert("ttl".to_string(), ttl.clone());
        let parsed: ElectorConfig = toml::Value::Table(only_ttl).try_into()?;
        base = base.with_ttl(parsed.ttl);
    }

    let mut merged = match toml::Value::try_from(&base)? {
        toml::Value::Table(defaults) => defaults,
        _ => toml::Table::new(),
    };
    merged.extend(table);
    Ok(toml::Value::Table(merged).try_into()?)
}

/// Lease store selected by the `[store]` section
#[derive(Clone)]
pub enum ConfiguredStore {
    Memory(MemoryLeaseStore),
    File(FileLeaseStore),
}

impl ConfiguredStore {
    pub fn from_config(store: &StoreSection) -> Self {
        match store {
            StoreSection::Memory => ConfiguredStore::Memory(MemoryLeaseStore::new()),
            StoreSection::File { path } => ConfiguredStore::File(FileLeaseStore::new(path.clone())),
        }
    }
}

#[async_trait]
impl LeaseStore for ConfiguredStore {
    async fn upsert_if_expired(
        &self,
        resource: &str,
        holder: &HolderId,
        ttl: Duration,
    ) -> Result<Lease, StoreError> {
        match self {
            ConfiguredStore::Memory(s) => s.upsert_if_expired(resource, holder, ttl).await,
            ConfiguredStore::File(s) => s.upsert_if_expired(resource, holder, ttl).await,
        }
    }

    async fn compare_and_swap_renew(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
        ttl: Duration,
    ) -> Result<Lease, StoreError> {
        match self {
            ConfiguredStore::Memory(s) => s.compare_and_swap_renew(resource, holder, token, ttl).await,
            ConfiguredStore::File(s) => s.compare_and_swap_renew(resource, holder, token, ttl).await,
        }
    }

    async fn compare_and_swap_expire(
        &self,
        resource: &str,
        holder: &HolderId,
        token: FencingToken,
    ) -> Result<(), StoreError> {
        match self {
            ConfiguredStore::Memory(s) => s.compare_and_swap_expire(resource, holder, token).await,
            ConfiguredStore::File(s) => s.compare_and_swap_expire(resource, holder, token).await,
        }
    }

    async fn get(&self, resource: &str) -> Result<Option<Lease>, StoreError> {
        match self {
            ConfiguredStore::Memory(s) => s.get(resource).await,
            ConfiguredStore::File(s) => s.get(resource).await,
        }
    }
}

/// Store type used by the daemon (wrapped with tracing)
pub type DaemonStore = TracedLeaseStore<ConfiguredStore>;

/// Daemon state during operation
pub struct DaemonState {
    pub config: Config,
    pub elector: Elector<DaemonStore>,
    pub manager: JobManager,
}

impl DaemonState {
    /// Shut down gracefully: stop the job first, then give up the lease
    pub async fn shutdown(self) -> Result<(), LifecycleError> {
        info!("Shutting down daemon...");

        // 1. Stop the job while the lease is still ours
        match self.manager.shutdown().await? {
            StopOutcome::Idle => info!("no job was running"),
            StopOutcome::Stopped(report) => info!(
                job = %report.job,
                token = report.token.value(),
                outcome = %report.outcome,
                "job stopped"
            ),
            StopOutcome::Abandoned(report) => warn!(
                job = %report.job,
                token = report.token.value(),
                "job did not stop within the grace period"
            ),
        }

        // 2. Step down and release the lease
        self.elector.stop().await;

        info!("Daemon shutdown complete");
        Ok(())
    }
}

/// Start the elector and the job manager
pub async fn startup(config: Config) -> Result<DaemonState, LifecycleError> {
    let store = TracedLeaseStore::new(ConfiguredStore::from_config(&config.store));
    if let StoreSection::File { path } = &config.store {
        info!(path = %path.display(), "using file lease store");
    }

    let elector = Elector::new(config.election.clone(), config.holder.clone(), store)?;
    let manager = JobManager::new(config.job.manager.clone(), elector.subscribe());

    let mut job = CommandJob::new(config.job.name.clone(), config.job.command.clone());
    if let Some(cwd) = &config.job.cwd {
        job = job.with_cwd(cwd);
    }
    manager.start(Arc::new(job)).await?;

    elector.start();
    info!(
        holder = %config.holder,
        resource = %config.election.resource,
        job = %config.job.name,
        "daemon started"
    );

    Ok(DaemonState {
        config,
        elector,
        manager,
    })
}

/// Install the tracing subscriber; keep the guard alive to flush logs
pub fn setup_logging(
    logging: &LoggingSection,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let (writer, guard) = match &logging.path {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| LifecycleError::Logging(format!("not a file: {}", path.display())))?;
            std::fs::create_dir_all(dir)?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let directive = logging.filter.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .map_err(|e| LifecycleError::Logging(e.to_string()))?;

    Ok(guard)
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
