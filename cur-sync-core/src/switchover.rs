//! Copy-then-delete switchover of a billing period's destination folder.
//!
//! 1. Copy every part of the new generation into the destination folder, all copies
//!    in flight at once. Results are consumed in completion order and the first
//!    failure wins: the switchover stops waiting, and copies still in flight are
//!    detached rather than cancelled.
//! 2. Only once every copy succeeded, list the folder and delete everything that is
//!    not a destination key of the new mapping, at most [`MAX_DELETE_BATCH`] keys per
//!    call.
//!
//! The destination folder therefore never goes through a moment where the new
//! generation is only partially present and the old one already gone.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::contract::ObjectStore;
use crate::error::{Result, SyncError};
use crate::keys::folder_prefix;
use crate::mapping::KeyMapping;
use crate::retry::RetryPolicy;

/// Bulk delete limit of the storage backend.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Result of copying one report part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    pub source_key: String,
    pub destination_key: String,
    pub result: std::result::Result<(), String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwitchoverReport {
    pub copied: usize,
    pub deleted: usize,
}

/// Run both phases for one mapping.
pub async fn switchover<S>(
    store: &Arc<S>,
    retry: &RetryPolicy,
    source_bucket: &str,
    destination_bucket: &str,
    mapping: &KeyMapping,
) -> Result<SwitchoverReport>
where
    S: ObjectStore + ?Sized + 'static,
{
    let copied = copy_all(store, retry, source_bucket, destination_bucket, mapping).await?;
    info!(
        copied,
        prefix = mapping.prefix(),
        "[COPY] All report parts copied"
    );

    let keep = mapping.destination_keys();
    let stale = stale_keys(store.as_ref(), retry, destination_bucket, mapping.prefix(), &keep).await?;
    let deleted = delete_in_batches(store.as_ref(), retry, destination_bucket, &stale).await?;
    info!(
        deleted,
        prefix = mapping.prefix(),
        "[DELETE] Removed stale objects"
    );

    Ok(SwitchoverReport { copied, deleted })
}

/// Copy every mapping entry concurrently. Returns the number of copied parts.
pub async fn copy_all<S>(
    store: &Arc<S>,
    retry: &RetryPolicy,
    source_bucket: &str,
    destination_bucket: &str,
    mapping: &KeyMapping,
) -> Result<usize>
where
    S: ObjectStore + ?Sized + 'static,
{
    let mut copies = JoinSet::new();

    for (source_key, destination_key) in mapping.entries() {
        info!(
            "[COPY] s3://{}/{} -> s3://{}/{}",
            source_bucket, source_key, destination_bucket, destination_key
        );
        let store = Arc::clone(store);
        let retry = retry.clone();
        let source_bucket = source_bucket.to_string();
        let destination_bucket = destination_bucket.to_string();
        let source_key = source_key.clone();
        let destination_key = destination_key.clone();

        copies.spawn(async move {
            let result = retry
                .run("copy_object", || {
                    store.copy_object(
                        &source_bucket,
                        &source_key,
                        &destination_bucket,
                        &destination_key,
                    )
                })
                .await
                .map_err(|e| e.to_string());
            CopyOutcome {
                source_key,
                destination_key,
                result,
            }
        });
    }

    let mut copied = 0;
    while let Some(joined) = copies.join_next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(join_err) => {
                copies.detach_all();
                return Err(SyncError::Unexpected(format!(
                    "copy task did not complete: {join_err}"
                )));
            }
        };

        match outcome.result {
            Ok(()) => {
                debug!(destination = %outcome.destination_key, "[COPY] Copied");
                copied += 1;
            }
            Err(reason) => {
                error!(
                    source = %outcome.source_key,
                    destination = %outcome.destination_key,
                    in_flight = copies.len(),
                    "[COPY] Copy failed, abandoning remaining results"
                );
                // in-flight copies keep running, their results are dropped
                copies.detach_all();
                return Err(SyncError::CopyFailure {
                    source_bucket: source_bucket.to_string(),
                    source_key: outcome.source_key,
                    destination_bucket: destination_bucket.to_string(),
                    destination_key: outcome.destination_key,
                    reason,
                });
            }
        }
    }

    Ok(copied)
}

/// Every key under `prefix/` that is not in `keep`, across all listing pages.
pub async fn stale_keys<S>(
    store: &S,
    retry: &RetryPolicy,
    bucket: &str,
    prefix: &str,
    keep: &HashSet<String>,
) -> Result<Vec<String>>
where
    S: ObjectStore + ?Sized,
{
    let prefix = folder_prefix(prefix);
    let mut stale = Vec::new();
    let mut continuation: Option<String> = None;

    loop {
        let token = continuation.take();
        let page = retry
            .run("list_objects", || store.list_objects(bucket, &prefix, token.clone()))
            .await?;

        stale.extend(page.keys.into_iter().filter(|key| !keep.contains(key)));

        match page.next {
            Some(next) => continuation = Some(next),
            None => break,
        }
    }

    debug!(bucket, prefix = %prefix, stale = stale.len(), "[DELETE] Listed stale objects");
    Ok(stale)
}

/// Delete `keys` in chunks of at most [`MAX_DELETE_BATCH`]. Any rejected key fails
/// the whole operation with the per-key detail.
pub async fn delete_in_batches<S>(
    store: &S,
    retry: &RetryPolicy,
    bucket: &str,
    keys: &[String],
) -> Result<usize>
where
    S: ObjectStore + ?Sized,
{
    let mut deleted = 0;

    for chunk in keys.chunks(MAX_DELETE_BATCH) {
        let outcome = retry
            .run("delete_objects", || store.delete_objects(bucket, chunk.to_vec()))
            .await?;

        if !outcome.errors.is_empty() {
            error!(
                bucket,
                rejected = outcome.errors.len(),
                deleted = outcome.deleted.len(),
                "[DELETE] Batch delete partially failed"
            );
            return Err(SyncError::DeleteFailure {
                bucket: bucket.to_string(),
                errors: outcome.errors,
            });
        }
        deleted += outcome.deleted.len();
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{DeleteOutcome, MockObjectStore, ObjectPage};
    use crate::error::{BackendError, KeyError};
    use crate::manifest::tests::SAMPLE;
    use crate::manifest::Manifest;
    use crate::mapping::{destination_mapping, PathScheme};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    fn fast() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    fn mapping_for(keys: &[&str]) -> KeyMapping {
        let mut manifest = Manifest::from_json(SAMPLE).unwrap();
        manifest.report_keys = keys.iter().map(|k| k.to_string()).collect();
        destination_mapping(&manifest, PathScheme::BillingPeriod).unwrap()
    }

    /// Copies that take a scripted amount of time, or fail straight away.
    #[derive(Default)]
    struct ScriptedStore {
        delays: HashMap<String, Duration>,
        failing: HashSet<String>,
        finished: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStore for ScriptedStore {
        async fn get_object(&self, _: &str, _: &str) -> std::result::Result<Vec<u8>, BackendError> {
            unimplemented!()
        }

        async fn copy_object(
            &self,
            _: &str,
            source_key: &str,
            _: &str,
            _: &str,
        ) -> std::result::Result<(), BackendError> {
            if self.failing.contains(source_key) {
                return Err(BackendError::Failed("AccessDenied".into()));
            }
            if let Some(delay) = self.delays.get(source_key) {
                tokio::time::sleep(*delay).await;
            }
            self.finished.lock().unwrap().push(source_key.to_string());
            Ok(())
        }

        async fn list_objects(
            &self,
            _: &str,
            _: &str,
            _: Option<String>,
        ) -> std::result::Result<ObjectPage, BackendError> {
            unimplemented!()
        }

        async fn delete_objects(
            &self,
            _: &str,
            _: Vec<String>,
        ) -> std::result::Result<DeleteOutcome, BackendError> {
            unimplemented!()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn copy_results_are_consumed_in_completion_order() {
        let store = Arc::new(ScriptedStore {
            delays: HashMap::from([
                ("src/a.csv".to_string(), Duration::from_secs(30)),
                ("src/b.csv".to_string(), Duration::from_secs(10)),
                ("src/c.csv".to_string(), Duration::from_secs(20)),
            ]),
            ..Default::default()
        });
        let mapping = mapping_for(&["src/a.csv", "src/b.csv", "src/c.csv"]);

        let copied = copy_all(&store, &fast(), "src-bucket", "dest", &mapping).await.unwrap();

        assert_eq!(copied, 3);
        assert_eq!(
            *store.finished.lock().unwrap(),
            vec!["src/b.csv", "src/c.csv", "src/a.csv"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_copy_failure_returns_without_waiting_and_leaves_copies_running() {
        let store = Arc::new(ScriptedStore {
            delays: HashMap::from([("src/slow.csv".to_string(), Duration::from_secs(60))]),
            failing: HashSet::from(["src/bad.csv".to_string()]),
            ..Default::default()
        });
        // The slow copy is submitted first; the failure still wins.
        let mapping = mapping_for(&["src/slow.csv", "src/bad.csv"]);
        let started = tokio::time::Instant::now();

        let err = copy_all(&store, &fast(), "src-bucket", "dest", &mapping)
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(60));
        match err {
            SyncError::CopyFailure {
                source_key,
                destination_key,
                ..
            } => {
                assert_eq!(source_key, "src/bad.csv");
                assert!(destination_key.ends_with("/bad.csv"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(store.finished.lock().unwrap().is_empty());

        // Detached, not aborted: the slow copy still completes.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(*store.finished.lock().unwrap(), vec!["src/slow.csv"]);
    }

    #[tokio::test]
    async fn throttled_copy_is_retried() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let mut store = MockObjectStore::new();
        store.expect_copy_object().returning(move |_, _, _, _| {
            let mut n = counter.lock().unwrap();
            *n += 1;
            if *n < 3 {
                Err(BackendError::Throttled("SlowDown".into()))
            } else {
                Ok(())
            }
        });

        let copied = copy_all(&Arc::new(store), &fast(), "src", "dest", &mapping_for(&["src/a.csv"]))
            .await
            .unwrap();
        assert_eq!(copied, 1);
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn copy_throttled_past_the_budget_is_a_copy_failure() {
        let mut store = MockObjectStore::new();
        store
            .expect_copy_object()
            .times(3)
            .returning(|_, _, _, _| Err(BackendError::Throttled("SlowDown".into())));

        let err = copy_all(&Arc::new(store), &fast(), "src", "dest", &mapping_for(&["src/a.csv"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::CopyFailure { ref reason, .. } if reason.contains("3 attempts")));
    }

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("p/k-{i}")).collect()
    }

    #[tokio::test]
    async fn delete_batches_never_exceed_the_limit() {
        for size in [0usize, 1, 1000, 1001, 2500] {
            let batches = Arc::new(Mutex::new(Vec::new()));
            let seen = batches.clone();
            let mut store = MockObjectStore::new();
            store.expect_delete_objects().returning(move |_, keys| {
                seen.lock().unwrap().push(keys.len());
                Ok(DeleteOutcome {
                    deleted: keys,
                    errors: vec![],
                })
            });

            let deleted = delete_in_batches(&store, &fast(), "dest", &keys(size))
                .await
                .unwrap();
            assert_eq!(deleted, size);

            let batches = batches.lock().unwrap();
            assert!(batches.iter().all(|b| *b <= MAX_DELETE_BATCH && *b > 0));
            assert_eq!(batches.iter().sum::<usize>(), size);
            assert_eq!(batches.len(), size.div_ceil(MAX_DELETE_BATCH));
        }
    }

    #[tokio::test]
    async fn partial_delete_failure_carries_key_detail() {
        let mut store = MockObjectStore::new();
        store.expect_delete_objects().returning(|_, mut keys| {
            let rejected = keys.pop().unwrap();
            Ok(DeleteOutcome {
                deleted: keys,
                errors: vec![KeyError {
                    key: rejected,
                    code: "AccessDenied".into(),
                    message: "Access Denied".into(),
                }],
            })
        });

        let err = delete_in_batches(&store, &fast(), "dest", &keys(3))
            .await
            .unwrap_err();
        match err {
            SyncError::DeleteFailure { bucket, errors } => {
                assert_eq!(bucket, "dest");
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].key, "p/k-2");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn throttled_delete_batch_is_retried() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let mut store = MockObjectStore::new();
        store.expect_delete_objects().returning(move |_, keys| {
            let mut n = counter.lock().unwrap();
            *n += 1;
            if *n == 1 {
                Err(BackendError::Throttled("SlowDown".into()))
            } else {
                Ok(DeleteOutcome {
                    deleted: keys,
                    errors: vec![],
                })
            }
        });

        assert_eq!(
            delete_in_batches(&store, &fast(), "dest", &keys(2)).await.unwrap(),
            2
        );
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn stale_keys_follow_pagination_and_skip_mapping_keys() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .withf(|bucket, prefix, token| bucket == "dest" && prefix == "p/" && token.is_none())
            .returning(|_, _, _| {
                Ok(ObjectPage {
                    keys: vec!["p/new-1.csv".into(), "p/old-1.csv".into()],
                    next: Some("page-2".into()),
                })
            });
        store
            .expect_list_objects()
            .withf(|_, _, token| token.as_deref() == Some("page-2"))
            .returning(|_, _, _| {
                Ok(ObjectPage {
                    keys: vec!["p/old-2.csv".into(), "p/new-2.csv".into()],
                    next: None,
                })
            });

        let keep: HashSet<String> = ["p/new-1.csv", "p/new-2.csv"]
            .into_iter()
            .map(String::from)
            .collect();
        let stale = stale_keys(&store, &fast(), "dest", "p", &keep).await.unwrap();
        assert_eq!(stale, vec!["p/old-1.csv".to_string(), "p/old-2.csv".to_string()]);
    }

    #[tokio::test]
    async fn stale_keys_empty_or_identical_listing_deletes_nothing() {
        let keep: HashSet<String> = ["p/a".to_string(), "p/b".to_string()].into();

        let mut empty = MockObjectStore::new();
        empty
            .expect_list_objects()
            .returning(|_, _, _| Ok(ObjectPage::default()));
        assert!(stale_keys(&empty, &fast(), "d", "p", &keep).await.unwrap().is_empty());

        let mut identical = MockObjectStore::new();
        identical.expect_list_objects().returning(|_, _, _| {
            Ok(ObjectPage {
                keys: vec!["p/a".into(), "p/b".into()],
                next: None,
            })
        });
        assert!(stale_keys(&identical, &fast(), "d", "p", &keep)
            .await
            .unwrap()
            .is_empty());
    }
}
