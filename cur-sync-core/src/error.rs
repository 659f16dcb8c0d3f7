//! Error types for the reconciliation pipeline.
//!
//! [`BackendError`] is what the client traits in [`crate::contract`] return; it only
//! knows whether a remote call was throttled, hit a missing entity, or failed outright.
//! [`SyncError`] is the pipeline-level taxonomy the orchestrator reports on.

use thiserror::Error;

/// Failure reported by a storage, catalog or notification backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend asked us to slow down (503 / SlowDown / ThrottlingException).
    #[error("throttled: {0}")]
    Throttled(String),

    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-success response.
    #[error("{0}")]
    Failed(String),
}

impl BackendError {
    pub fn is_throttled(&self) -> bool {
        matches!(self, BackendError::Throttled(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }
}

/// A single key rejected by a bulk delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyError {
    pub key: String,
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for KeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {} : {}", self.key, self.code, self.message)
    }
}

/// Pipeline error taxonomy.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A required setting is missing. Fatal to the whole invocation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The event or manifest does not qualify for processing.
    #[error("validation error: {0}")]
    Validation(String),

    /// The manifest object could not be retrieved.
    #[error("failed to fetch s3://{bucket}/{key}: {source}")]
    Fetch {
        bucket: String,
        key: String,
        #[source]
        source: BackendError,
    },

    /// The backend kept throttling until the retry budget ran out.
    #[error("{operation} still throttled after {attempts} attempts: {source}")]
    TransientBackend {
        operation: String,
        attempts: u32,
        #[source]
        source: BackendError,
    },

    /// Any other backend failure.
    #[error("{operation} failed: {source}")]
    PermanentBackend {
        operation: String,
        #[source]
        source: BackendError,
    },

    /// A report part could not be copied to the destination.
    #[error("failed to copy s3://{source_bucket}/{source_key} to s3://{destination_bucket}/{destination_key}: {reason}")]
    CopyFailure {
        source_bucket: String,
        source_key: String,
        destination_bucket: String,
        destination_key: String,
        reason: String,
    },

    /// Stale objects could not all be removed.
    #[error("could not delete {} objects from s3://{bucket}:\n{}", .errors.len(), join_key_errors(.errors))]
    DeleteFailure { bucket: String, errors: Vec<KeyError> },

    /// The manifest content type names a format the catalog does not know.
    #[error("unsupported report format '{0}'")]
    Format(String),

    /// A manifest task died without producing a result.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

fn join_key_errors(errors: &[KeyError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl SyncError {
    /// Wrap a backend error, keeping throttling distinct from hard failures.
    pub fn backend(operation: impl Into<String>, attempts: u32, source: BackendError) -> Self {
        let operation = operation.into();
        if source.is_throttled() {
            SyncError::TransientBackend {
                operation,
                attempts,
                source,
            }
        } else {
            SyncError::PermanentBackend { operation, source }
        }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
