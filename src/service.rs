use futures::FutureExt;
use log::{error, info};
use serde::Serialize;
use std::sync::Arc;

use crate::config::ConnectionConfig;
use crate::db::{with_session, Driver};
use crate::error::{DbError, DbResult};
use crate::guard::run_guarded;
use crate::models::{SchemaResource, TableLookup};
use crate::report::Reporter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

/// The `{content, isError?}` envelope every tool call answers with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResult {
    pub content: Vec<Content>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: Some(true),
        }
    }

    /// Pretty-printed JSON (two-space indent) as the text payload.
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string_pretty(value) {
            Ok(text) => Self::text(text),
            Err(e) => Self::error(format!("Error: failed to serialize result: {e}")),
        }
    }

    pub fn is_error(&self) -> bool {
        self.is_error == Some(true)
    }

    /// Text of the first content block.
    pub fn text_content(&self) -> &str {
        match self.content.first() {
            Some(Content::Text { text }) => text,
            None => "",
        }
    }
}

/// The four operations exposed to clients. Each call opens its own session
/// and closes it before returning.
#[derive(Clone)]
pub struct DatabaseService {
    driver: Arc<dyn Driver>,
    config: Arc<ConnectionConfig>,
}

impl DatabaseService {
    pub fn new(driver: Arc<dyn Driver>, config: ConnectionConfig) -> Self {
        Self {
            driver,
            config: Arc::new(config),
        }
    }

    pub async fn get_schema_overview(&self, detailed: bool) -> ToolResult {
        let result = with_session(self.driver.as_ref(), &self.config, move |session| {
            async move { Reporter::new(session).schema_overview(detailed).await }.boxed()
        })
        .await;

        match result {
            Ok(entries) => {
                info!("Schema overview: {} tables (detailed={detailed})", entries.len());
                ToolResult::json(&entries)
            }
            Err(e) => {
                error!("Failed to fetch schema: {e}");
                ToolResult::error(format!("Error fetching schema: {e}"))
            }
        }
    }

    pub async fn get_schema_resource(&self) -> DbResult<SchemaResource> {
        with_session(self.driver.as_ref(), &self.config, |session| {
            async move { Reporter::new(session).schema_resource().await }.boxed()
        })
        .await
    }

    pub async fn run_guarded_query(&self, sql: &str) -> ToolResult {
        match run_guarded(self.driver.as_ref(), &self.config, sql).await {
            Ok(rows) => ToolResult::json(&rows),
            Err(e) => {
                if !matches!(e, DbError::ReadOnlyViolation) {
                    error!("Query failed: {e}");
                }
                ToolResult::error(format!("Error: {e}"))
            }
        }
    }

    pub async fn get_table_info(&self, table_name: &str) -> ToolResult {
        let table = table_name.to_string();
        let result = with_session(self.driver.as_ref(), &self.config, move |session| {
            async move { Reporter::new(session).table_report(&table).await }.boxed()
        })
        .await;

        match result {
            Ok(TableLookup::Found(report)) => ToolResult::json(&report),
            Ok(TableLookup::Missing { table_name }) => {
                ToolResult::error(format!("Error: {}", DbError::not_found(table_name)))
            }
            Err(e) => {
                error!("Failed to build table info for '{table_name}': {e}");
                ToolResult::error(format!("Error: {e}"))
            }
        }
    }
}
