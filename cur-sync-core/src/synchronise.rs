//! High-level pipeline: orchestrates fetch → map → switchover → catalog → job for a
//! batch of object-created notifications.
//!
//! # Flow
//! - Records whose key sits inside a `<daterange>/<generation id>/` delivery folder are
//!   skipped; only top-level manifests trigger work.
//! - Every remaining record gets its own task (fetch and parse the manifest, build the
//!   key mapping, run the switchover). Tasks are independent: one failing manifest
//!   never stops its siblings.
//! - Results are consumed in completion order. For each successful switchover the
//!   catalog table of the billing period is created or updated, and then the
//!   downstream job is started when one is configured.
//!
//! # Error Handling
//! Every failure is logged, sent to the [`FailureReporter`] and recorded in the
//! [`SynchroniseReport`]. Nothing here returns an error to the caller; configuration
//! problems are caught earlier, while building the [`SyncContext`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::catalog::sync_catalog;
use crate::config::SyncConfig;
use crate::contract::{Catalog, JobRunRequest, ObjectStore};
use crate::error::{Result, SyncError};
use crate::event::{S3Event, S3EventRecord};
use crate::keys::{generation_id_in, is_valid_top_level_manifest};
use crate::manifest::Manifest;
use crate::mapping::{destination_mapping, KeyMapping};
use crate::notify::FailureReporter;
use crate::switchover::{switchover, SwitchoverReport};

/// Downstream job timeout in minutes. A ceiling, not an expected duration.
pub const JOB_TIMEOUT_MINUTES: i32 = 1440;

/// Shared clients and resolved configuration, built once per process.
pub struct SyncContext {
    pub store: Arc<dyn ObjectStore>,
    pub catalog: Arc<dyn Catalog>,
    pub reporter: FailureReporter,
    pub config: SyncConfig,
}

impl SyncContext {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn Catalog>,
        reporter: FailureReporter,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            reporter,
            config,
        }
    }
}

/// Outcome of one invocation.
#[derive(Debug, Default)]
pub struct SynchroniseReport {
    pub manifests: Vec<ManifestReport>,
    pub skipped: Vec<String>,
}

impl SynchroniseReport {
    pub fn succeeded(&self) -> usize {
        self.manifests.iter().filter(|m| m.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.manifests.len() - self.succeeded()
    }
}

#[derive(Debug, Default, Clone)]
pub struct ManifestReport {
    pub manifest_key: String,
    pub generation_id: Option<String>,
    pub copied: usize,
    pub deleted: usize,
    pub table: Option<String>,
    pub job_run_id: Option<String>,
    pub error: Option<String>,
}

/// A manifest whose switchover completed.
#[derive(Debug)]
pub struct ProcessedManifest {
    pub manifest: Manifest,
    pub mapping: KeyMapping,
    pub switchover: SwitchoverReport,
}

/// Run the pipeline for one notification batch.
pub async fn synchronise(ctx: Arc<SyncContext>, event: &S3Event) -> SynchroniseReport {
    info!(
        records = event.records.len(),
        notifications = ctx.reporter.is_enabled(),
        "[SYNC] Received notification batch"
    );
    let mut report = SynchroniseReport::default();
    let mut tasks = JoinSet::new();

    for record in &event.records {
        let location = format!("s3://{}/{}", record.bucket(), record.key());

        if !is_valid_top_level_manifest(record.key()) {
            info!(
                object = %location,
                generation = generation_id_in(record.key()).unwrap_or("-"),
                "[SYNC] Not a top level manifest file, skipping"
            );
            report.skipped.push(location);
            continue;
        }

        if !record.is_object_created() {
            let message = format!(
                "This function was triggered by a non ObjectCreated Put or Post event, {}, for object {}; check the bucket notification setup.",
                record.event_name,
                record.key()
            );
            warn!(event_name = %record.event_name, object = %location, "[SYNC] Ignoring non object-created event");
            ctx.reporter.report(&message).await;
            report.skipped.push(location);
            continue;
        }

        let task_ctx = Arc::clone(&ctx);
        let record = record.clone();
        tasks.spawn(async move {
            let result = process_manifest(&task_ctx, &record).await;
            (location, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let entry = match joined {
            Ok((location, Ok(processed))) => finish_manifest(&ctx, location, processed).await,
            Ok((location, Err(e))) => {
                let message = format!("Failed to process manifest {location}: {e}");
                error!(manifest = %location, error = %e, "[SYNC][ERROR] Manifest processing failed");
                ctx.reporter.report(&message).await;
                ManifestReport {
                    manifest_key: location,
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
            Err(join_err) => {
                let e = SyncError::Unexpected(join_err.to_string());
                let message = format!("A manifest processing task failed: {e}");
                error!(error = %e, "[SYNC][ERROR] Manifest task did not complete");
                ctx.reporter.report(&message).await;
                ManifestReport {
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        };
        report.manifests.push(entry);
    }

    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        skipped = report.skipped.len(),
        "[SYNC] Function completed"
    );
    report
}

/// Fetch, parse, map and switch over a single manifest.
pub async fn process_manifest(ctx: &SyncContext, record: &S3EventRecord) -> Result<ProcessedManifest> {
    let bucket = record.bucket();
    let key = record.key();
    info!(bucket, key, "[SYNC] Processing manifest");

    let manifest = fetch_manifest(ctx, bucket, key).await?;
    if !manifest.billing_period.has_valid_start() {
        return Err(SyncError::Validation(format!(
            "Billing period start of s3://{bucket}/{key} could not be parsed"
        )));
    }
    let mapping = destination_mapping(&manifest, ctx.config.path_scheme)?;

    if mapping.is_empty() {
        return Err(SyncError::Validation(format!(
            "No destination keys produced for s3://{bucket}/{key}"
        )));
    }

    info!(
        generation = %manifest.generation(),
        parts = mapping.len(),
        prefix = mapping.prefix(),
        "[SYNC] Built destination key mapping"
    );

    let switchover = switchover(
        &ctx.store,
        &ctx.config.retry,
        bucket,
        &ctx.config.destination_bucket,
        &mapping,
    )
    .await?;

    Ok(ProcessedManifest {
        manifest,
        mapping,
        switchover,
    })
}

async fn fetch_manifest(ctx: &SyncContext, bucket: &str, key: &str) -> Result<Manifest> {
    let body = ctx
        .config
        .retry
        .run("get_object", || ctx.store.get_object(bucket, key))
        .await
        .map_err(|e| match e {
            SyncError::TransientBackend { source, .. } | SyncError::PermanentBackend { source, .. } => {
                SyncError::Fetch {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    source,
                }
            }
            other => other,
        })?;
    Manifest::from_slice(&body)
}

/// Catalog sync and job trigger for a manifest whose switchover succeeded.
async fn finish_manifest(
    ctx: &SyncContext,
    location: String,
    processed: ProcessedManifest,
) -> ManifestReport {
    let mut entry = ManifestReport {
        manifest_key: location,
        generation_id: Some(processed.manifest.generation()),
        copied: processed.switchover.copied,
        deleted: processed.switchover.deleted,
        ..Default::default()
    };

    let Some(database) = ctx.config.database_name.as_deref() else {
        let message = "No Glue database name defined, cannot create a table.";
        warn!("[CATALOG] {message}");
        ctx.reporter.report(message).await;
        return entry;
    };

    let table = match sync_catalog(
        ctx.catalog.as_ref(),
        &ctx.config.retry,
        database,
        &processed.manifest,
        &ctx.config.destination_bucket,
        processed.mapping.prefix(),
    )
    .await
    {
        Ok(table) => table,
        Err(e) => {
            let message = format!(
                "Failed to create or update the table for billing period {}: {e}",
                processed.manifest.billing_period.start_date()
            );
            error!(database, error = %e, "[CATALOG][ERROR] Catalog sync failed");
            ctx.reporter.report(&message).await;
            entry.error = Some(e.to_string());
            return entry;
        }
    };
    entry.table = Some(table.clone());

    match trigger_job(ctx, database, &table).await {
        Ok(run_id) => entry.job_run_id = run_id,
        Err(e) => {
            error!(table = %table, error = %e, "[JOB][ERROR] Failed to start job");
            ctx.reporter
                .report(&format!("Failed to start job for table {table}: {e}"))
                .await;
            entry.error = Some(e.to_string());
        }
    }

    entry
}

/// Build the downstream job request for a table, if a job is configured.
pub fn job_request(config: &SyncConfig, database: &str, table: &str) -> Option<JobRunRequest> {
    let job_name = config.job_name.as_deref()?;

    let mut arguments = BTreeMap::new();
    arguments.insert("--table".to_string(), table.to_string());
    arguments.insert("--database".to_string(), database.to_string());
    if let Some(bucket) = config.job_destination_bucket.as_deref() {
        arguments.insert("--destination_bucket".to_string(), bucket.to_string());
    }

    Some(JobRunRequest {
        job_name: job_name.to_string(),
        timeout: JOB_TIMEOUT_MINUTES,
        arguments,
    })
}

/// Start the downstream job for `table`. Returns the run id, or `None` when no job is
/// configured.
pub async fn trigger_job(ctx: &SyncContext, database: &str, table: &str) -> Result<Option<String>> {
    let Some(request) = job_request(&ctx.config, database, table) else {
        warn!(table, "[JOB] No job name configured, not running job");
        return Ok(None);
    };

    info!(job = %request.job_name, table, database, "[JOB] Starting job run");
    let run_id = ctx
        .config
        .retry
        .run("start_job_run", || ctx.catalog.start_job_run(request.clone()))
        .await?;
    info!(job = %request.job_name, run_id = %run_id, "[JOB] Successfully started job");
    Ok(Some(run_id))
}
