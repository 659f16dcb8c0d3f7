//! [`Catalog`] backed by `aws-sdk-glue`: databases, tables and job runs.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_glue::types::{Column, DatabaseInput, SerDeInfo, StorageDescriptor, TableInput};
use aws_sdk_glue::Client;

use cur_sync_core::contract::{Catalog, JobRunRequest, TableDefinition};
use cur_sync_core::error::BackendError;

use crate::aws::{build_error, classify};

const TABLE_TYPE: &str = "EXTERNAL_TABLE";

#[derive(Clone)]
pub struct GlueCatalog {
    client: Client,
}

impl GlueCatalog {
    pub fn new(sdk: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk),
        }
    }
}

fn table_input(table: TableDefinition) -> Result<TableInput, BackendError> {
    let columns = table
        .columns
        .into_iter()
        .map(|c| {
            Column::builder()
                .name(c.name)
                .r#type(c.column_type)
                .build()
                .map_err(|e| build_error("column", e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let serde_info = SerDeInfo::builder()
        .name(table.serde_name)
        .serialization_library(table.serialization_library)
        .set_parameters(Some(table.serde_parameters.into_iter().collect::<HashMap<_, _>>()))
        .build();

    let storage = StorageDescriptor::builder()
        .set_columns(Some(columns))
        .location(table.location)
        .input_format(table.input_format)
        .output_format(table.output_format)
        .serde_info(serde_info)
        .build();

    TableInput::builder()
        .name(table.name)
        .description(table.description)
        .table_type(TABLE_TYPE)
        .set_parameters(Some(table.parameters.into_iter().collect::<HashMap<_, _>>()))
        .storage_descriptor(storage)
        .build()
        .map_err(|e| build_error("table input", e))
}

#[async_trait]
impl Catalog for GlueCatalog {
    async fn database_exists(&self, database: &str) -> Result<bool, BackendError> {
        match self.client.get_database().name(database).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = classify("GetDatabase", &e);
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn create_database(&self, database: &str) -> Result<(), BackendError> {
        let input = DatabaseInput::builder()
            .name(database)
            .build()
            .map_err(|e| build_error("database input", e))?;
        self.client
            .create_database()
            .database_input(input)
            .send()
            .await
            .map_err(|e| classify("CreateDatabase", &e))?;
        Ok(())
    }

    async fn table_exists(&self, database: &str, table: &str) -> Result<bool, BackendError> {
        match self
            .client
            .get_table()
            .database_name(database)
            .name(table)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = classify("GetTable", &e);
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn create_table(
        &self,
        database: &str,
        table: TableDefinition,
    ) -> Result<(), BackendError> {
        self.client
            .create_table()
            .database_name(database)
            .table_input(table_input(table)?)
            .send()
            .await
            .map_err(|e| classify("CreateTable", &e))?;
        Ok(())
    }

    async fn update_table(
        &self,
        database: &str,
        table: TableDefinition,
    ) -> Result<(), BackendError> {
        self.client
            .update_table()
            .database_name(database)
            .table_input(table_input(table)?)
            .send()
            .await
            .map_err(|e| classify("UpdateTable", &e))?;
        Ok(())
    }

    async fn start_job_run(&self, request: JobRunRequest) -> Result<String, BackendError> {
        let output = self
            .client
            .start_job_run()
            .job_name(&request.job_name)
            .timeout(request.timeout)
            .set_arguments(Some(request.arguments.into_iter().collect::<HashMap<_, _>>()))
            .send()
            .await
            .map_err(|e| classify("StartJobRun", &e))?;

        output
            .job_run_id()
            .map(str::to_string)
            .ok_or_else(|| BackendError::Failed(format!("StartJobRun for {} returned no run id", request.job_name)))
    }
}
