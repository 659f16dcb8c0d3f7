/// # cur-sync CLI Interface (Module)
///
/// Command parsing and process-level glue for the billing report reconciler. All
/// pipeline logic lives in [`cur-sync-core`]; this module only reads the notification
/// batch, resolves configuration, builds the AWS clients and hands over.
///
/// ## How To Use
/// - From a shell: `cur-sync process --event event.json`, or pipe the event on stdin.
/// - Programmatically: call [`run`] with a constructed [`Cli`].
///
/// [`cur-sync-core`]: ../../cur-sync-core/
use crate::aws::sdk_config;
use crate::glue::GlueCatalog;
use crate::load_config::load_config;
use crate::s3::S3Store;
use crate::sns::SnsNotifier;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cur_sync_core::config::TOPIC_VAR;
use cur_sync_core::event::S3Event;
use cur_sync_core::notify::FailureReporter;
use cur_sync_core::synchronise::{synchronise, SyncContext};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// CLI for cur-sync: keep a tidy copy of billing report deliveries.
#[derive(Parser)]
#[clap(
    name = "cur-sync",
    version,
    about = "Reconcile billing report deliveries into a per-period destination folder and catalog table"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process one object-created notification batch
    Process {
        /// Path to the notification JSON; read from stdin when omitted
        #[clap(long)]
        event: Option<PathBuf>,

        /// Optional dotenv file with the pipeline settings
        #[clap(long)]
        env_file: Option<PathBuf>,
    },
}

async fn read_event(path: Option<&Path>) -> Result<S3Event> {
    let text = match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read event file {path:?}"))?,
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("Failed to read event from stdin")?;
            text
        }
    };
    S3Event::from_json(&text).context("Failed to parse notification event")
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Process { event, env_file } => {
            let event = read_event(event.as_deref()).await?;
            tracing::info!(command = "process", records = event.records.len(), "Event loaded");

            let config = match load_config(env_file.as_deref()) {
                Ok(config) => config,
                Err(e) => {
                    // The topic may still be set even though the config as a whole is not.
                    if let Some(topic) = std::env::var(TOPIC_VAR).ok().filter(|t| !t.is_empty()) {
                        let sdk = sdk_config().await;
                        FailureReporter::new(Arc::new(SnsNotifier::new(&sdk)), Some(topic))
                            .report(&e.to_string())
                            .await;
                    }
                    return Err(e);
                }
            };

            let sdk = sdk_config().await;
            let reporter = FailureReporter::new(Arc::new(SnsNotifier::new(&sdk)), config.topic.clone());
            let ctx = Arc::new(SyncContext::new(
                Arc::new(S3Store::new(&sdk)),
                Arc::new(GlueCatalog::new(&sdk)),
                reporter,
                config,
            ));

            let report = synchronise(ctx, &event).await;
            tracing::info!(
                command = "process",
                succeeded = report.succeeded(),
                failed = report.failed(),
                skipped = report.skipped.len(),
                "Processing complete"
            );
            for manifest in &report.manifests {
                tracing::info!(
                    manifest = %manifest.manifest_key,
                    copied = manifest.copied,
                    deleted = manifest.deleted,
                    table = manifest.table.as_deref().unwrap_or("-"),
                    job_run = manifest.job_run_id.as_deref().unwrap_or("-"),
                    error = manifest.error.as_deref().unwrap_or("-"),
                    "Manifest outcome"
                );
            }
            Ok(())
        }
    }
}
