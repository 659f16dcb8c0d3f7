//! [`ObjectStore`] backed by `aws-sdk-s3`.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::debug;

use cur_sync_core::contract::{DeleteOutcome, ObjectPage, ObjectStore};
use cur_sync_core::error::{BackendError, KeyError};

use crate::aws::{build_error, classify};

/// Unreserved URI characters stay as they are; everything else is escaped.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// `bucket/key` with every key segment percent-encoded, as CopyObject expects.
pub(crate) fn copy_source(bucket: &str, key: &str) -> String {
    let encoded = key
        .split('/')
        .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/");
    format!("{bucket}/{encoded}")
}

#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(sdk: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BackendError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify("GetObject", &e))?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| BackendError::Failed(format!("GetObject body s3://{bucket}/{key}: {e}")))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        destination_bucket: &str,
        destination_key: &str,
    ) -> Result<(), BackendError> {
        self.client
            .copy_object()
            .copy_source(copy_source(source_bucket, source_key))
            .bucket(destination_bucket)
            .key(destination_key)
            .send()
            .await
            .map_err(|e| classify("CopyObject", &e))?;
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ObjectPage, BackendError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|e| classify("ListObjectsV2", &e))?;

        let keys = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect::<Vec<_>>();
        let next = match output.is_truncated() {
            Some(true) => output.next_continuation_token().map(str::to_string),
            _ => None,
        };
        debug!(bucket, prefix, keys = keys.len(), more = next.is_some(), "Listed page");

        Ok(ObjectPage { keys, next })
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: Vec<String>,
    ) -> Result<DeleteOutcome, BackendError> {
        if keys.is_empty() {
            return Ok(DeleteOutcome::default());
        }

        let objects = keys
            .into_iter()
            .map(|key| {
                ObjectIdentifier::builder()
                    .key(key)
                    .build()
                    .map_err(|e| build_error("object identifier", e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(false)
            .build()
            .map_err(|e| build_error("delete request", e))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| classify("DeleteObjects", &e))?;

        Ok(DeleteOutcome {
            deleted: output
                .deleted()
                .iter()
                .filter_map(|d| d.key().map(str::to_string))
                .collect(),
            errors: output
                .errors()
                .iter()
                .map(|e| KeyError {
                    key: e.key().unwrap_or_default().to_string(),
                    code: e.code().unwrap_or_default().to_string(),
                    message: e.message().unwrap_or_default().to_string(),
                })
                .collect(),
        })
    }
}
