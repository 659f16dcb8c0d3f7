use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::mapping::PathScheme;
use crate::retry::RetryPolicy;

pub const DESTINATION_BUCKET_VAR: &str = "DESTINATION_S3_BUCKET";
pub const JOB_NAME_VAR: &str = "GLUE_JOB_NAME";
pub const DATABASE_NAME_VAR: &str = "DATABASE_NAME";
pub const JOB_DESTINATION_BUCKET_VAR: &str = "GLUE_DESTINATION_BUCKET";
pub const TOPIC_VAR: &str = "SNS_TOPIC";
pub const OUTPUT_PATH_FORMAT_VAR: &str = "OUTPUT_PATH_FORMAT";

/// Resolved pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub destination_bucket: String,
    pub job_name: Option<String>,
    pub database_name: Option<String>,
    pub job_destination_bucket: Option<String>,
    pub topic: Option<String>,
    pub path_scheme: PathScheme,
    pub retry: RetryPolicy,
}

impl SyncConfig {
    pub fn new(destination_bucket: impl Into<String>) -> Self {
        Self {
            destination_bucket: destination_bucket.into(),
            job_name: None,
            database_name: None,
            job_destination_bucket: None,
            topic: None,
            path_scheme: PathScheme::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Resolve settings from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let destination_bucket = get(DESTINATION_BUCKET_VAR).ok_or_else(|| {
            SyncError::Configuration(format!(
                "The environment variable {DESTINATION_BUCKET_VAR} was not set."
            ))
        })?;

        Ok(Self {
            destination_bucket,
            job_name: get(JOB_NAME_VAR),
            database_name: get(DATABASE_NAME_VAR),
            job_destination_bucket: get(JOB_DESTINATION_BUCKET_VAR),
            topic: get(TOPIC_VAR),
            path_scheme: get(OUTPUT_PATH_FORMAT_VAR)
                .as_deref()
                .map(PathScheme::from)
                .unwrap_or_default(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn trace_loaded(&self) {
        info!(
            destination_bucket = %self.destination_bucket,
            database = self.database_name.as_deref().unwrap_or("<none>"),
            job = self.job_name.as_deref().unwrap_or("<none>"),
            notifications = self.topic.is_some(),
            path_scheme = ?self.path_scheme,
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }
}
