//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global subscriber once at startup
//! - Route background job events to their own file
//! - Tag every request and job with the service environment
//!
//! # Sinks
//! - access log: every event except the `cron` target
//! - cron log: only events logged with `target: "cron"`
//! - stdout: optional, for console runs
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level
//! - Files are opened in append mode and written unbuffered; the guards
//!   sync them to disk on drop

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::Span;
use tracing_subscriber::filter::{filter_fn, EnvFilter, ParseError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, Layer};

use crate::config::constants::{PROJECT_ACCESS_LOG_FILE, PROJECT_CRON_LOG_FILE, PROJECT_NAME};
use crate::config::{Environment, LogSettings};

/// Target that routes an event into the cron log.
pub const CRON_TARGET: &str = "cron";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("global subscriber already installed: {0}")]
    Init(#[from] TryInitError),
}

/// Open log files. Syncs both sinks when dropped.
#[derive(Debug)]
pub struct LogGuards {
    access: Arc<File>,
    cron: Arc<File>,
    root: Span,
}

impl LogGuards {
    /// Span carrying the `env` field; parent of request and job spans.
    pub fn root_span(&self) -> &Span {
        &self.root
    }
}

impl Drop for LogGuards {
    fn drop(&mut self) {
        let _ = self.access.sync_all();
        let _ = self.cron.sync_all();
    }
}

/// `aio_dashboard[<env>]`, the value of the `env` field on every event.
pub fn env_tag(env: Environment) -> String {
    format!("{}[{}]", PROJECT_NAME, env.value())
}

/// Install the global subscriber writing into `log_dir`.
pub fn init_logging(
    log_dir: &Path,
    settings: &LogSettings,
    env: Environment,
) -> Result<LogGuards, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.level)?,
    };
    let guards = open_sinks(log_dir, env)?;

    subscriber(filter, &guards, settings.console).try_init()?;

    tracing::info!(
        dir = %log_dir.display(),
        env = %env,
        console = settings.console,
        "Logging initialized"
    );
    Ok(guards)
}

fn open_sinks(log_dir: &Path, env: Environment) -> Result<LogGuards, LoggingError> {
    fs::create_dir_all(log_dir).map_err(|source| LoggingError::Open {
        path: log_dir.to_path_buf(),
        source,
    })?;
    let access = open_append(&log_dir.join(PROJECT_ACCESS_LOG_FILE))?;
    let cron = open_append(&log_dir.join(PROJECT_CRON_LOG_FILE))?;
    let root = tracing::info_span!("service", env = %env_tag(env));
    Ok(LogGuards {
        access: Arc::new(access),
        cron: Arc::new(cron),
        root,
    })
}

fn open_append(path: &Path) -> Result<File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::Open {
            path: path.to_path_buf(),
            source,
        })
}

fn subscriber(
    filter: EnvFilter,
    guards: &LogGuards,
    console: bool,
) -> impl tracing::Subscriber + Send + Sync + 'static {
    let access = fmt::layer()
        .with_ansi(false)
        .with_writer(Arc::clone(&guards.access))
        .with_filter(filter_fn(|meta| meta.target() != CRON_TARGET));
    let cron = fmt::layer()
        .with_ansi(false)
        .with_writer(Arc::clone(&guards.cron))
        .with_filter(filter_fn(|meta| meta.target() == CRON_TARGET));
    let stdout = console.then(fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(access)
        .with(cron)
        .with(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_tag() {
        assert_eq!(env_tag(Environment::Fat), "aio_dashboard[fat]");
    }

    #[test]
    fn test_cron_events_go_to_their_own_sink() {
        let dir = tempfile::tempdir().unwrap();
        let guards = open_sinks(dir.path(), Environment::Dev).unwrap();
        let sub = subscriber(EnvFilter::new("info"), &guards, false);

        tracing::subscriber::with_default(sub, || {
            let _root = tracing::info_span!("service", env = %env_tag(Environment::Dev)).entered();
            tracing::info!("request served");
            tracing::info!(target: CRON_TARGET, "backup job finished");
            tracing::debug!("filtered out");
        });
        drop(guards);

        let access = fs::read_to_string(dir.path().join(PROJECT_ACCESS_LOG_FILE)).unwrap();
        let cron = fs::read_to_string(dir.path().join(PROJECT_CRON_LOG_FILE)).unwrap();
        assert!(access.contains("request served"), "{access}");
        assert!(access.contains("env=aio_dashboard[dev]"), "{access}");
        assert!(!access.contains("backup job finished"), "{access}");
        assert!(!access.contains("filtered out"), "{access}");
        assert!(cron.contains("backup job finished"), "{cron}");
        assert!(!cron.contains("request served"), "{cron}");
    }

    #[test]
    fn test_sinks_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROJECT_ACCESS_LOG_FILE);
        fs::write(&path, "previous run\n").unwrap();

        let guards = open_sinks(dir.path(), Environment::Pro).unwrap();
        tracing::subscriber::with_default(subscriber(EnvFilter::new("info"), &guards, false), || {
            tracing::info!("next run");
        });

        let access = fs::read_to_string(&path).unwrap();
        assert!(access.starts_with("previous run\n"));
        assert!(access.contains("next run"));
    }
}
