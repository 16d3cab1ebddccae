use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use procon_reconcile::BackoffPolicy;

use crate::controller::ControllerConfig;

/// Default sidecar image for generated workloads.
pub const DEFAULT_PROCESSOR_IMAGE: &str = "ghcr.io/procon-dev/processor:latest";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub workers: usize,
    pub processor_image: String,
    pub resync_interval: Duration,
    /// JSON manifest of functions, streams and processors to load at start.
    pub manifest: Option<PathBuf>,
    pub backoff: BackoffPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let log_level = lookup("PROCON_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let workers = lookup("PROCON_WORKERS")
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("PROCON_WORKERS must be a positive integer")?
            .unwrap_or(procon_reconcile::DEFAULT_WORKERS);
        anyhow::ensure!(workers > 0, "PROCON_WORKERS must be at least 1");

        let processor_image = lookup("PROCON_PROCESSOR_IMAGE")
            .unwrap_or_else(|| DEFAULT_PROCESSOR_IMAGE.to_string());

        let resync_interval = lookup("PROCON_RESYNC_INTERVAL_SECS")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("PROCON_RESYNC_INTERVAL_SECS must be a number of seconds")?
            .map(Duration::from_secs)
            .unwrap_or(procon_reconcile::DEFAULT_RESYNC_INTERVAL);
        anyhow::ensure!(
            !resync_interval.is_zero(),
            "PROCON_RESYNC_INTERVAL_SECS must be greater than zero"
        );

        let manifest = lookup("PROCON_MANIFEST").map(PathBuf::from);

        let mut backoff = BackoffPolicy::default();
        if let Some(base) = lookup("PROCON_BACKOFF_BASE_MS") {
            let millis: u64 = base
                .parse()
                .context("PROCON_BACKOFF_BASE_MS must be a number of milliseconds")?;
            backoff.base = Duration::from_millis(millis);
        }
        if let Some(max) = lookup("PROCON_BACKOFF_MAX_SECS") {
            let secs: u64 = max
                .parse()
                .context("PROCON_BACKOFF_MAX_SECS must be a number of seconds")?;
            backoff.max = Duration::from_secs(secs);
        }

        Ok(Self {
            log_level,
            workers,
            processor_image,
            resync_interval,
            manifest,
            backoff,
        })
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            workers: self.workers,
            backoff: self.backoff.clone(),
            resync_interval: self.resync_interval,
        }
    }
}
