use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::ai::{create_provider, resolve_model};
use crate::provider::{AiJobSource, FixtureSource, JobSource};

pub const DB_FILE: &str = "jobhub.db";
pub const LOG_FILE: &str = "jobhub.log";

#[derive(Debug, Clone)]
pub struct Config {
    pub model: String,
    pub timeout: Duration,
    pub data_dir: PathBuf,
    pub fixture: Option<PathBuf>,
}

impl Config {
    pub fn new(
        model: String,
        timeout_secs: u64,
        data_dir: Option<PathBuf>,
        fixture: Option<PathBuf>,
    ) -> Result<Self> {
        if timeout_secs == 0 {
            return Err(anyhow!("--timeout must be at least 1 second"));
        }
        Ok(Self {
            model,
            timeout: Duration::from_secs(timeout_secs),
            data_dir: data_dir.unwrap_or_else(default_data_dir),
            fixture,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(LOG_FILE)
    }

    /// Builds the job source: a fixture file when configured, a model otherwise.
    pub fn job_source(&self) -> Result<Arc<dyn JobSource>> {
        if let Some(path) = &self.fixture {
            info!(path = %path.display(), "serving jobs from fixture");
            return Ok(Arc::new(FixtureSource::new(path.clone())));
        }
        let spec = resolve_model(&self.model)?;
        let provider = create_provider(&spec, self.timeout)?;
        info!(model = %spec.model_id, "using generative job source");
        Ok(Arc::new(AiJobSource::new(provider)))
    }
}

fn default_data_dir() -> PathBuf {
    // XDG data directory, or the working directory as a last resort
    directories::ProjectDirs::from("", "", "jobhub")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| Path::new(".").to_path_buf())
}
