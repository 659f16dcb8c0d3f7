/// `load_config` module: resolves the pipeline settings from the process environment.
///
/// An optional dotenv-style file is applied first; variables already present in the
/// environment win over the file. Everything is then read through
/// [`SyncConfig::from_env`], so the CLI and the core agree on variable names.
///
/// # Errors
/// Failures are returned as `anyhow::Error` with the offending file or variable in the
/// message. A missing `DESTINATION_S3_BUCKET` is fatal for the whole invocation.
use anyhow::{Context, Result};
use cur_sync_core::config::SyncConfig;
use std::path::Path;
use tracing::{error, info};

pub fn load_config(env_file: Option<&Path>) -> Result<SyncConfig> {
    if let Some(path) = env_file {
        info!(env_file = ?path, "Loading environment file");
        dotenvy::from_path(path)
            .with_context(|| format!("Failed to read environment file {path:?}"))?;
    }

    match SyncConfig::from_env() {
        Ok(config) => {
            config.trace_loaded();
            Ok(config)
        }
        Err(e) => {
            error!(error = %e, "Failed to resolve configuration");
            Err(e.into())
        }
    }
}
