//! Report shapes. Field names here are the JSON contract seen by clients.

use serde::Serialize;

use crate::db::Row;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDefinition {
    pub name: String,
    /// Creation statement exactly as the catalog reports it.
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnReport {
    pub table_name: String,
    pub columns: Vec<ColumnDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

/// One table in the schema overview.
///
/// `definition` holds the raw DDL in the simple overview and the column
/// report in the detailed one; both serialize under the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverviewEntry {
    pub name: String,
    pub definition: OverviewDefinition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OverviewDefinition {
    Ddl(String),
    Columns(ColumnReport),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfoReport {
    pub table_name: String,
    pub columns: ColumnReport,
    pub row_count: u64,
    pub sample_data: Vec<Row>,
}

/// Outcome of a table report. A missing table is an expected answer, not a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum TableLookup {
    Found(TableInfoReport),
    Missing { table_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMetadata {
    pub title: String,
    pub description: String,
    pub table_count: usize,
    pub table_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaResource {
    pub text: String,
    pub metadata: SchemaMetadata,
}
