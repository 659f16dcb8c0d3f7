//! # contract: client seams for storage, catalog and notifications
//!
//! The pipeline never talks to a cloud SDK directly. It is written against the three
//! traits in this module, each a single shared, stateless handle that can be used
//! concurrently from many tasks:
//!
//! - [`ObjectStore`]: fetch, copy, list and bulk-delete objects.
//! - [`Catalog`]: databases, tables and downstream job runs.
//! - [`Notifier`]: fire-and-forget messages to a topic.
//!
//! ## Mocking & Testing
//! All three traits carry `mockall::automock` so integration tests can script backend
//! behaviour. Mocks are exported behind the `test-export-mocks` feature.
//!
//! ## Errors
//! Every method returns [`BackendError`]; implementors must map throttling responses
//! to [`BackendError::Throttled`] so the retry policy can recognise them, and missing
//! entities to [`BackendError::NotFound`].

use std::collections::BTreeMap;

use async_trait::async_trait;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{BackendError, KeyError};

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    /// Continuation token for the next page, `None` on the last page.
    pub next: Option<String>,
}

/// Result of a bulk delete call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: Vec<String>,
    pub errors: Vec<KeyError>,
}

/// Object storage operations used by the switchover.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read a whole object into memory.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BackendError>;

    /// Server-side copy of one object.
    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        destination_bucket: &str,
        destination_key: &str,
    ) -> Result<(), BackendError>;

    /// List one page of keys under `prefix`.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ObjectPage, BackendError>;

    /// Delete up to [`crate::switchover::MAX_DELETE_BATCH`] keys in one call.
    async fn delete_objects(
        &self,
        bucket: &str,
        keys: Vec<String>,
    ) -> Result<DeleteOutcome, BackendError>;
}

/// Storage format of a catalog table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Parquet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    pub column_type: String,
}

/// Everything needed to create or update an external table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    pub description: String,
    pub format: TableFormat,
    pub columns: Vec<TableColumn>,
    pub location: String,
    pub input_format: String,
    pub output_format: String,
    pub serde_name: String,
    pub serialization_library: String,
    pub serde_parameters: BTreeMap<String, String>,
    pub parameters: BTreeMap<String, String>,
}

/// Downstream job submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRunRequest {
    pub job_name: String,
    /// Minutes.
    pub timeout: i32,
    pub arguments: BTreeMap<String, String>,
}

/// Schema catalog and job service.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn database_exists(&self, database: &str) -> Result<bool, BackendError>;

    async fn create_database(&self, database: &str) -> Result<(), BackendError>;

    async fn table_exists(&self, database: &str, table: &str) -> Result<bool, BackendError>;

    async fn create_table(
        &self,
        database: &str,
        table: TableDefinition,
    ) -> Result<(), BackendError>;

    async fn update_table(
        &self,
        database: &str,
        table: TableDefinition,
    ) -> Result<(), BackendError>;

    /// Start a job run, returning its run id.
    async fn start_job_run(&self, request: JobRunRequest) -> Result<String, BackendError>;
}

/// Notification channel.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, topic: &str, subject: &str, message: &str)
        -> Result<(), BackendError>;
}
