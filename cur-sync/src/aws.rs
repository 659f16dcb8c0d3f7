//! Shared AWS plumbing: SDK configuration and error classification.

use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use cur_sync_core::error::BackendError;

/// Error codes the services use to ask callers to back off.
const THROTTLING_CODES: &[&str] = &[
    "SlowDown",
    "ServiceUnavailable",
    "503",
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
];

/// Error codes for entities that do not exist.
const NOT_FOUND_CODES: &[&str] = &[
    "NoSuchKey",
    "NoSuchBucket",
    "NotFound",
    "EntityNotFoundException",
];

/// Load credentials and region from the default provider chain.
pub async fn sdk_config() -> SdkConfig {
    aws_config::load_defaults(BehaviorVersion::latest()).await
}

/// Map an SDK error onto the backend error the retry policy understands.
pub(crate) fn classify<E>(operation: &str, err: &E) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    let message = format!("{operation}: {}", DisplayErrorContext(err));
    classify_code(err.code(), message)
}

pub(crate) fn classify_code(code: Option<&str>, message: String) -> BackendError {
    match code {
        Some(code) if THROTTLING_CODES.contains(&code) => BackendError::Throttled(message),
        Some(code) if NOT_FOUND_CODES.contains(&code) => BackendError::NotFound(message),
        _ => BackendError::Failed(message),
    }
}

/// Request builders reject missing required fields; treat that as a permanent failure.
pub(crate) fn build_error(what: &str, err: impl std::fmt::Display) -> BackendError {
    BackendError::Failed(format!("invalid {what}: {err}"))
}
