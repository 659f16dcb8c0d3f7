//! Catalog synchronizer: one external table per billing period.
//!
//! The table is named after the billing period start (`yyyy-MM-dd`) and points at the
//! destination folder of that period. Running the sync again for a new generation
//! updates the table in place, so column drift between deliveries is picked up.

use std::collections::BTreeMap;

use tracing::info;

use crate::contract::{Catalog, TableColumn, TableDefinition, TableFormat};
use crate::error::{Result, SyncError};
use crate::manifest::Manifest;
use crate::retry::RetryPolicy;

/// Storage format derived from a manifest content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportFormat {
    Csv,
    Parquet,
    Unknown(String),
}

impl ReportFormat {
    /// Use the final `/` segment of the content type, e.g. `text/csv` -> csv.
    pub fn from_content_type(content_type: &str) -> Self {
        let suffix = content_type
            .rsplit('/')
            .next()
            .unwrap_or(content_type)
            .trim()
            .to_lowercase();
        match suffix.as_str() {
            "csv" => ReportFormat::Csv,
            "parquet" => ReportFormat::Parquet,
            _ => ReportFormat::Unknown(suffix),
        }
    }

    fn table_format(&self) -> Result<TableFormat> {
        match self {
            ReportFormat::Csv => Ok(TableFormat::Csv),
            ReportFormat::Parquet => Ok(TableFormat::Parquet),
            ReportFormat::Unknown(other) => Err(SyncError::Format(other.clone())),
        }
    }
}

fn params<const N: usize>(pairs: [(&str, &str); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Build the table definition for a manifest. Fails with [`SyncError::Format`] for
/// content types that are neither csv nor parquet.
pub fn table_definition(
    manifest: &Manifest,
    destination_bucket: &str,
    destination_prefix: &str,
) -> Result<TableDefinition> {
    let format = ReportFormat::from_content_type(&manifest.content_type).table_format()?;
    let name = manifest.billing_period.start_date();

    let columns = manifest
        .columns
        .iter()
        .map(|c| TableColumn {
            name: c.qualified_name(),
            column_type: c.catalog_type(),
        })
        .collect();

    let location = format!(
        "s3://{}/{}",
        destination_bucket,
        destination_prefix.trim_end_matches('/')
    );

    let definition = match format {
        TableFormat::Csv => TableDefinition {
            description: name.clone(),
            name,
            format,
            columns,
            location,
            input_format: "org.apache.hadoop.mapred.TextInputFormat".to_string(),
            output_format: "org.apache.hadoop.hive.ql.io.HiveIgnoreKeyTextOutputFormat"
                .to_string(),
            serde_name: "OpenCSVSerde".to_string(),
            serialization_library: "org.apache.hadoop.hive.serde2.OpenCSVSerde".to_string(),
            serde_parameters: params([
                ("escapeChar", "\\"),
                ("quoteChar", "\""),
                ("separatorChar", ","),
            ]),
            parameters: params([
                ("EXTERNAL", "TRUE"),
                ("skip.header.line.count", "1"),
                ("columnsOrdered", "true"),
                ("compressionType", manifest.compression.as_str()),
                ("classification", "csv"),
            ]),
        },
        TableFormat::Parquet => TableDefinition {
            description: name.clone(),
            name,
            format,
            columns,
            location,
            input_format: "org.apache.hadoop.hive.ql.io.parquet.MapredParquetInputFormat"
                .to_string(),
            output_format: "org.apache.hadoop.hive.ql.io.parquet.MapredParquetOutputFormat"
                .to_string(),
            serde_name: "ParquetHiveSerDe".to_string(),
            serialization_library:
                "org.apache.hadoop.hive.ql.io.parquet.serde.ParquetHiveSerDe".to_string(),
            serde_parameters: params([("serialization.format", "1")]),
            parameters: params([
                ("EXTERNAL", "TRUE"),
                ("columnsOrdered", "true"),
                ("classification", "parquet"),
            ]),
        },
    };

    Ok(definition)
}

/// Ensure the database and the billing period table exist and match the manifest.
/// Returns the table name.
pub async fn sync_catalog<C>(
    catalog: &C,
    retry: &RetryPolicy,
    database: &str,
    manifest: &Manifest,
    destination_bucket: &str,
    destination_prefix: &str,
) -> Result<String>
where
    C: Catalog + ?Sized,
{
    // Resolve the format before touching the catalog at all.
    let definition = table_definition(manifest, destination_bucket, destination_prefix)?;
    let table = definition.name.clone();

    let exists = retry
        .run("get_database", || catalog.database_exists(database))
        .await?;
    if exists {
        info!(database, "[CATALOG] Database already exists");
    } else {
        retry
            .run("create_database", || catalog.create_database(database))
            .await?;
        info!(database, "[CATALOG] Created database");
    }

    let table_exists = retry
        .run("get_table", || catalog.table_exists(database, &table))
        .await?;

    if table_exists {
        retry
            .run("update_table", || catalog.update_table(database, definition.clone()))
            .await?;
        info!(database, table = %table, columns = definition.columns.len(), "[CATALOG] Updated table");
    } else {
        retry
            .run("create_table", || catalog.create_table(database, definition.clone()))
            .await?;
        info!(database, table = %table, columns = definition.columns.len(), "[CATALOG] Created table");
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockCatalog;
    use crate::manifest::tests::SAMPLE;
    use std::time::Duration;

    fn manifest(content_type: &str) -> Manifest {
        let mut m = Manifest::from_json(SAMPLE).unwrap();
        m.content_type = content_type.to_string();
        m
    }

    fn fast() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1))
    }

    #[test]
    fn format_comes_from_content_type_suffix() {
        assert_eq!(ReportFormat::from_content_type("text/csv"), ReportFormat::Csv);
        assert_eq!(ReportFormat::from_content_type("application/Parquet"), ReportFormat::Parquet);
        assert_eq!(ReportFormat::from_content_type("csv"), ReportFormat::Csv);
        assert_eq!(
            ReportFormat::from_content_type("application/json"),
            ReportFormat::Unknown("json".into())
        );
    }

    #[test]
    fn csv_definition() {
        let def = table_definition(&manifest("text/csv"), "dest", "accountid=1/billingperiod=2018-10-01").unwrap();
        assert_eq!(def.name, "2018-10-01");
        assert_eq!(def.format, TableFormat::Csv);
        assert_eq!(def.location, "s3://dest/accountid=1/billingperiod=2018-10-01");
        assert_eq!(def.parameters["skip.header.line.count"], "1");
        assert_eq!(def.parameters["compressionType"], "gzip");
        assert_eq!(def.serde_parameters["separatorChar"], ",");
        assert_eq!(def.columns[0].name, "identity/LineItemId");
        assert_eq!(def.columns[0].column_type, "string");
    }

    #[test]
    fn parquet_definition_has_no_header_skip() {
        let def = table_definition(&manifest("application/parquet"), "dest", "p").unwrap();
        assert_eq!(def.format, TableFormat::Parquet);
        assert!(!def.parameters.contains_key("skip.header.line.count"));
        assert_eq!(def.parameters["classification"], "parquet");
        assert_eq!(def.columns.len(), 2);
    }

    #[tokio::test]
    async fn unknown_format_touches_nothing() {
        let mut catalog = MockCatalog::new();
        catalog.expect_database_exists().never();
        catalog.expect_create_database().never();
        catalog.expect_table_exists().never();
        catalog.expect_create_table().never();
        catalog.expect_update_table().never();

        let err = sync_catalog(&catalog, &fast(), "billing", &manifest("text/xml"), "dest", "p")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Format(ref f) if f == "xml"));
    }

    #[tokio::test]
    async fn creates_database_and_table_on_first_run() {
        let mut catalog = MockCatalog::new();
        catalog.expect_database_exists().returning(|_| Ok(false));
        catalog
            .expect_create_database()
            .withf(|db| db == "billing")
            .times(1)
            .returning(|_| Ok(()));
        catalog.expect_table_exists().returning(|_, _| Ok(false));
        catalog
            .expect_create_table()
            .withf(|db, def| db == "billing" && def.name == "2018-10-01")
            .times(1)
            .returning(|_, _| Ok(()));
        catalog.expect_update_table().never();

        let table = sync_catalog(&catalog, &fast(), "billing", &manifest("text/csv"), "dest", "p")
            .await
            .unwrap();
        assert_eq!(table, "2018-10-01");
    }

    #[tokio::test]
    async fn updates_existing_table() {
        let mut catalog = MockCatalog::new();
        catalog.expect_database_exists().returning(|_| Ok(true));
        catalog.expect_create_database().never();
        catalog.expect_table_exists().returning(|_, _| Ok(true));
        catalog.expect_create_table().never();
        catalog
            .expect_update_table()
            .times(1)
            .returning(|_, _| Ok(()));

        sync_catalog(&catalog, &fast(), "billing", &manifest("text/csv"), "dest", "p")
            .await
            .unwrap();
    }
}
