//! Report manifest model and parser.
//!
//! A manifest describes one generation (delivery attempt) of a billing report: its
//! columns, storage format and the physical parts that make up the dataset. It is
//! fetched once per notification, parsed, and never mutated afterwards.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SyncError};

/// Column type used when the manifest does not declare one.
pub const DEFAULT_COLUMN_TYPE: &str = "string";

/// One report generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(rename = "assemblyId", alias = "generationId")]
    pub generation_id: Uuid,
    pub account: String,
    pub columns: Vec<Column>,
    pub charset: String,
    pub compression: Compression,
    pub content_type: String,
    pub report_id: String,
    pub report_name: String,
    pub billing_period: BillingPeriod,
    pub bucket: String,
    pub report_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_artifact_keys: Option<Vec<ArtifactKey>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub category: String,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<String>,
}

impl Column {
    /// `<category>/<name>`, the name the column gets in the catalog.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.category, self.name)
    }

    /// Catalog (Hive) type for the declared report type. Unknown or missing types
    /// fall back to [`DEFAULT_COLUMN_TYPE`].
    pub fn catalog_type(&self) -> String {
        let declared = self
            .column_type
            .as_deref()
            .map(|t| t.trim().to_ascii_lowercase());
        match declared.as_deref() {
            Some("bigdecimal" | "optionalbigdecimal") => "double",
            Some("datetime" | "optionaldatetime") => "timestamp",
            _ => DEFAULT_COLUMN_TYPE,
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Compression {
    Gzip,
    Zip,
    None,
    Parquet,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::Gzip => "gzip",
            Compression::Zip => "zip",
            Compression::None => "none",
            Compression::Parquet => "parquet",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    #[serde(with = "manifest_time")]
    pub start: DateTime<Utc>,
    #[serde(with = "manifest_time")]
    pub end: DateTime<Utc>,
}

impl BillingPeriod {
    /// `yyyy-MM-dd` of the period start. Doubles as the catalog table name.
    pub fn start_date(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn start_year(&self) -> i32 {
        self.start.year()
    }

    pub fn start_month(&self) -> u32 {
        self.start.month()
    }

    /// False when the start timestamp failed to parse.
    pub fn has_valid_start(&self) -> bool {
        self.start != DateTime::<Utc>::MIN_UTC
    }
}

/// Auxiliary artifact shipped alongside the report. Older manifests list bare keys,
/// newer ones an `{artifactType, name}` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtifactKey {
    Path(String),
    #[serde(rename_all = "camelCase")]
    Typed { artifact_type: String, name: String },
}

impl ArtifactKey {
    pub fn key(&self) -> &str {
        match self {
            ArtifactKey::Path(p) => p,
            ArtifactKey::Typed { name, .. } => name,
        }
    }
}

impl Manifest {
    /// Parse a manifest body. Missing mandatory fields, an empty body, invalid UTF-8
    /// or malformed JSON are all validation failures.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(body)
            .map_err(|e| SyncError::Validation(format!("manifest is not valid UTF-8: {e}")))?;
        Self::from_json(text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(SyncError::Validation("manifest body is empty".to_string()));
        }
        serde_json::from_str(text)
            .map_err(|e| SyncError::Validation(format!("invalid manifest: {e}")))
    }

    pub fn generation(&self) -> String {
        self.generation_id.hyphenated().to_string()
    }
}

/// Serde adapter for the manifest's `yyyyMMdd'T'HHmmss.fffZ` timestamps.
///
/// Values that do not match the layout deserialize to [`DateTime::<Utc>::MIN_UTC`]
/// instead of failing the whole manifest.
pub mod manifest_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

    pub fn format(value: &DateTime<Utc>) -> String {
        value.format(FORMAT).to_string()
    }

    pub fn parse(value: &str) -> DateTime<Utc> {
        match NaiveDateTime::parse_from_str(value, FORMAT) {
            Ok(naive) => naive.and_utc(),
            Err(e) => {
                tracing::warn!(value, error = %e, "Unparseable manifest timestamp, using minimum value");
                DateTime::<Utc>::MIN_UTC
            }
        }
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(parse(&raw))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) const SAMPLE: &str = r#"{
        "assemblyId": "eb3c690f-eeaa-4781-b701-4fd32f8ab19f",
        "account": "123456789012",
        "columns": [
            {"category": "identity", "name": "LineItemId"},
            {"category": "lineItem", "name": "UnblendedCost", "type": "OptionalBigDecimal"}
        ],
        "charset": "UTF-8",
        "compression": "GZIP",
        "contentType": "text/csv",
        "reportId": "a1b2c3",
        "reportName": "GzipDetailedDaily",
        "billingPeriod": {"start": "20181001T000000.000Z", "end": "20181101T000000.000Z"},
        "bucket": "billing-delivery",
        "reportKeys": [
            "123456789012/GzipDetailedDaily/20181001-20181101/eb3c690f-eeaa-4781-b701-4fd32f8ab19f/GzipDetailedDaily-1.csv.gz"
        ],
        "additionalArtifactKeys": [
            {"artifactType": "RedshiftCommands", "name": "123456789012/GzipDetailedDaily/20181001-20181101/eb3c690f-eeaa-4781-b701-4fd32f8ab19f/GzipDetailedDaily-RedshiftCommands.sql"}
        ]
    }"#;

    #[test]
    fn parses_delivered_manifest() {
        let manifest = Manifest::from_json(SAMPLE).unwrap();
        assert_eq!(manifest.generation(), "eb3c690f-eeaa-4781-b701-4fd32f8ab19f");
        assert_eq!(manifest.account, "123456789012");
        assert_eq!(manifest.compression, Compression::Gzip);
        assert_eq!(manifest.columns.len(), 2);
        assert_eq!(manifest.columns[0].catalog_type(), "string");
        assert_eq!(manifest.columns[1].catalog_type(), "double");
        assert_eq!(manifest.columns[1].qualified_name(), "lineItem/UnblendedCost");
        assert_eq!(manifest.billing_period.start_date(), "2018-10-01");
        assert_eq!(manifest.report_keys.len(), 1);
        let artifacts = manifest.additional_artifact_keys.as_ref().unwrap();
        assert!(artifacts[0].key().ends_with("RedshiftCommands.sql"));
    }

    #[test]
    fn report_types_map_to_catalog_types() {
        let column = |t: &str| Column {
            category: "lineItem".into(),
            name: "X".into(),
            column_type: Some(t.into()),
        };
        assert_eq!(column("DateTime").catalog_type(), "timestamp");
        assert_eq!(column("OptionalBigDecimal").catalog_type(), "double");
        assert_eq!(column("BigDecimal").catalog_type(), "double");
        assert_eq!(column("String").catalog_type(), "string");
        assert_eq!(column("OptionalString").catalog_type(), "string");
        assert_eq!(column("Interval").catalog_type(), "string");
        assert_eq!(column("SomethingNew").catalog_type(), "string");
        assert_eq!(column("  ").catalog_type(), "string");
    }

    #[test]
    fn missing_mandatory_field_is_a_validation_error() {
        let mut value: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
        value.as_object_mut().unwrap().remove("reportKeys");
        let err = Manifest::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, SyncError::Validation(ref m) if m.contains("reportKeys")));
    }

    #[test]
    fn artifact_keys_are_optional_and_accept_bare_paths() {
        let mut value: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
        value.as_object_mut().unwrap().remove("additionalArtifactKeys");
        let manifest = Manifest::from_json(&value.to_string()).unwrap();
        assert!(manifest.additional_artifact_keys.is_none());

        value["additionalArtifactKeys"] = serde_json::json!(["a/b/c.sql"]);
        let manifest = Manifest::from_json(&value.to_string()).unwrap();
        assert_eq!(
            manifest.additional_artifact_keys.unwrap(),
            vec![ArtifactKey::Path("a/b/c.sql".into())]
        );
    }

    #[test]
    fn empty_or_non_utf8_body_is_rejected() {
        assert!(matches!(Manifest::from_slice(b"  "), Err(SyncError::Validation(_))));
        assert!(matches!(
            Manifest::from_slice(&[0xff, 0xfe, 0x00]),
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn timestamp_round_trip() {
        let instant = Utc.with_ymd_and_hms(2018, 10, 1, 0, 0, 0).unwrap();
        assert_eq!(manifest_time::format(&instant), "20181001T000000.000Z");
        assert_eq!(manifest_time::parse("20181001T000000.000Z"), instant);

        let json = serde_json::to_string(&BillingPeriod {
            start: instant,
            end: instant,
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"start":"20181001T000000.000Z","end":"20181001T000000.000Z"}"#
        );
    }

    #[test]
    fn malformed_timestamp_becomes_minimum_value() {
        assert_eq!(
            manifest_time::parse("2018-10-01T00:00:00Z"),
            DateTime::<Utc>::MIN_UTC
        );
        let mut value: serde_json::Value = serde_json::from_str(SAMPLE).unwrap();
        value["billingPeriod"]["start"] = serde_json::json!("yesterday");
        let manifest = Manifest::from_json(&value.to_string()).unwrap();
        assert_eq!(manifest.billing_period.start, DateTime::<Utc>::MIN_UTC);
        assert!(!manifest.billing_period.has_valid_start());
        assert!(Manifest::from_json(SAMPLE).unwrap().billing_period.has_valid_start());
    }

    #[test]
    fn generation_id_alias_is_accepted() {
        let text = SAMPLE.replace("assemblyId", "generationId");
        let manifest = Manifest::from_json(&text).unwrap();
        assert_eq!(manifest.generation(), "eb3c690f-eeaa-4781-b701-4fd32f8ab19f");
    }
}
