//! Object-created notification batch, as delivered by the storage bucket.
//!
//! Only the fields the pipeline reads are modelled; everything else in a record is
//! ignored on deserialization.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3EventRecord {
    pub event_name: String,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Object {
    pub key: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl S3EventRecord {
    pub fn new(event_name: &str, bucket: &str, key: &str) -> Self {
        Self {
            event_name: event_name.to_string(),
            s3: S3Entity {
                bucket: S3Bucket {
                    name: bucket.to_string(),
                },
                object: S3Object {
                    key: key.to_string(),
                    size: None,
                },
            },
        }
    }

    pub fn bucket(&self) -> &str {
        &self.s3.bucket.name
    }

    pub fn key(&self) -> &str {
        &self.s3.object.key
    }

    /// `ObjectCreated:Put` or `ObjectCreated:Post`, with or without the `s3:` prefix.
    pub fn is_object_created(&self) -> bool {
        let name = self
            .event_name
            .strip_prefix("s3:")
            .unwrap_or(&self.event_name);
        matches!(name, "ObjectCreated:Put" | "ObjectCreated:Post")
    }
}

impl S3Event {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
