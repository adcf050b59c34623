use log::debug;

use crate::db::Session;
use crate::error::DbResult;
use crate::introspect::SchemaIntrospector;
use crate::models::{
    OverviewDefinition, OverviewEntry, SchemaMetadata, SchemaResource, TableInfoReport,
    TableLookup,
};

pub const SAMPLE_ROWS: usize = 5;

/// Composes catalog lookups into the reports handed to clients.
pub struct Reporter<'s> {
    introspector: SchemaIntrospector<'s>,
}

impl<'s> Reporter<'s> {
    pub fn new(session: &'s mut Session) -> Self {
        Self {
            introspector: SchemaIntrospector::new(session),
        }
    }

    /// Every base table with either its DDL or, when `detailed`, its column
    /// report (which itself carries the DDL).
    pub async fn schema_overview(&mut self, detailed: bool) -> DbResult<Vec<OverviewEntry>> {
        let tables = self.introspector.list_tables().await?;

        let mut entries = Vec::with_capacity(tables.len());
        for table in tables {
            let definition = if detailed {
                OverviewDefinition::Columns(
                    self.introspector.describe_columns(&table.name, true).await?,
                )
            } else {
                OverviewDefinition::Ddl(table.sql)
            };
            entries.push(OverviewEntry {
                name: table.name,
                definition,
            });
        }
        Ok(entries)
    }

    pub async fn schema_resource(&mut self) -> DbResult<SchemaResource> {
        let tables = self.introspector.list_tables().await?;
        let text = tables
            .iter()
            .map(|t| t.sql.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let table_names: Vec<String> = tables.into_iter().map(|t| t.name).collect();

        Ok(SchemaResource {
            text,
            metadata: SchemaMetadata {
                title: "Database Schema".to_string(),
                description: "Schema definition for all tables in the database".to_string(),
                table_count: table_names.len(),
                table_names,
            },
        })
    }

    /// Sample, row count and columns for one table.
    ///
    /// Existence is probed first so a missing table costs a single round-trip.
    pub async fn table_report(&mut self, table_name: &str) -> DbResult<TableLookup> {
        if !self.introspector.table_exists(table_name).await? {
            debug!("Table '{table_name}' not found");
            return Ok(TableLookup::Missing {
                table_name: table_name.to_string(),
            });
        }

        let sample_data = self.introspector.sample_rows(table_name, SAMPLE_ROWS).await?;
        let row_count = self.introspector.row_count(table_name).await?;
        let columns = self.introspector.describe_columns(table_name, false).await?;

        Ok(TableLookup::Found(TableInfoReport {
            table_name: table_name.to_string(),
            columns,
            row_count,
            sample_data,
        }))
    }
}
