use log::debug;
use serde_json::Value;

use crate::db::{quote_identifier, Row, Session};
use crate::error::{DbError, DbResult};
use crate::models::{ColumnDefinition, ColumnReport, TableDefinition};

const LIST_BASE_TABLES: &str = "SELECT TABLE_NAME AS name \
     FROM information_schema.tables \
     WHERE table_schema = ? AND table_type = 'BASE TABLE'";

const DESCRIBE_COLUMNS: &str = "SELECT COLUMN_NAME AS name, COLUMN_TYPE AS type, \
     IS_NULLABLE, COLUMN_DEFAULT, COLUMN_KEY \
     FROM information_schema.columns \
     WHERE table_schema = ? AND table_name = ? \
     ORDER BY ORDINAL_POSITION";

const TABLE_EXISTS: &str = "SELECT TABLE_NAME \
     FROM information_schema.tables \
     WHERE table_schema = ? AND table_name = ?";

/// Catalog queries for the schema a session is bound to.
///
/// Every call goes to the database; nothing is remembered between calls.
pub struct SchemaIntrospector<'s> {
    session: &'s mut Session,
}

impl<'s> SchemaIntrospector<'s> {
    pub fn new(session: &'s mut Session) -> Self {
        Self { session }
    }

    async fn catalog(&mut self, sql: &str, params: &[&str]) -> DbResult<Vec<Row>> {
        self.session
            .fetch(sql, params)
            .await
            .map_err(DbError::into_catalog)
    }

    /// Base tables (no views) with their creation statements, in the order
    /// the catalog enumerates them.
    pub async fn list_tables(&mut self) -> DbResult<Vec<TableDefinition>> {
        let database = self.session.database().to_string();
        let rows = self.catalog(LIST_BASE_TABLES, &[database.as_str()]).await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            let name = required_str(row, "name")?;
            let sql = self.table_definition(&name).await?;
            tables.push(TableDefinition { name, sql });
        }
        debug!("Listed {} tables in '{database}'", tables.len());
        Ok(tables)
    }

    pub async fn table_definition(&mut self, table_name: &str) -> DbResult<String> {
        let sql = format!("SHOW CREATE TABLE {}", quote_identifier(table_name));
        let rows = self.catalog(&sql, &[]).await?;
        let row = rows
            .first()
            .ok_or_else(|| DbError::decode(format!("no definition returned for '{table_name}'")))?;
        required_str(row, "Create Table")
    }

    /// Column metadata for one table. An unknown table yields an empty column
    /// list rather than an error.
    pub async fn describe_columns(
        &mut self,
        table_name: &str,
        include_definition: bool,
    ) -> DbResult<ColumnReport> {
        let database = self.session.database().to_string();
        let rows = self
            .catalog(DESCRIBE_COLUMNS, &[database.as_str(), table_name])
            .await?;
        let columns = rows
            .iter()
            .map(column_from_row)
            .collect::<DbResult<Vec<_>>>()?;

        let definition = if include_definition {
            Some(self.table_definition(table_name).await?)
        } else {
            None
        };

        Ok(ColumnReport {
            table_name: table_name.to_string(),
            columns,
            definition,
        })
    }

    pub async fn table_exists(&mut self, table_name: &str) -> DbResult<bool> {
        let database = self.session.database().to_string();
        let rows = self.catalog(TABLE_EXISTS, &[database.as_str(), table_name]).await?;
        Ok(!rows.is_empty())
    }

    /// Up to `limit` rows in whatever order the storage engine hands them out.
    pub async fn sample_rows(&mut self, table_name: &str, limit: usize) -> DbResult<Vec<Row>> {
        let sql = format!(
            "SELECT * FROM {} LIMIT {limit}",
            quote_identifier(table_name)
        );
        self.catalog(&sql, &[]).await
    }

    pub async fn row_count(&mut self, table_name: &str) -> DbResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) AS count FROM {}",
            quote_identifier(table_name)
        );
        let rows = self.catalog(&sql, &[]).await?;
        rows.first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_u64)
            .ok_or_else(|| DbError::decode(format!("no row count returned for '{table_name}'")))
    }
}

fn required_str(row: &Row, key: &str) -> DbResult<String> {
    row.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DbError::decode(format!("missing '{key}'")))
}

fn flag(row: &Row, key: &str, expected: &str) -> bool {
    row.get(key).and_then(Value::as_str) == Some(expected)
}

fn column_from_row(row: &Row) -> DbResult<ColumnDefinition> {
    Ok(ColumnDefinition {
        name: required_str(row, "name")?,
        column_type: required_str(row, "type")?,
        not_null: flag(row, "IS_NULLABLE", "NO"),
        default_value: match row.get("COLUMN_DEFAULT") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        },
        is_primary_key: flag(row, "COLUMN_KEY", "PRI"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_column_from_row() {
        let col = column_from_row(&row(json!({
            "name": "id",
            "type": "int",
            "IS_NULLABLE": "NO",
            "COLUMN_DEFAULT": null,
            "COLUMN_KEY": "PRI"
        })))
        .unwrap();
        assert_eq!(col.name, "id");
        assert_eq!(col.column_type, "int");
        assert!(col.not_null);
        assert!(col.is_primary_key);
        assert_eq!(col.default_value, None);
    }

    #[test]
    fn test_column_flags_and_default() {
        let col = column_from_row(&row(json!({
            "name": "status",
            "type": "varchar(16)",
            "IS_NULLABLE": "YES",
            "COLUMN_DEFAULT": "active",
            "COLUMN_KEY": "MUL"
        })))
        .unwrap();
        assert!(!col.not_null);
        assert!(!col.is_primary_key);
        assert_eq!(col.default_value.as_deref(), Some("active"));
    }

    #[test]
    fn test_column_missing_type_is_decode_error() {
        let err = column_from_row(&row(json!({"name": "id"}))).unwrap_err();
        assert!(matches!(err, DbError::Decode { .. }));
    }
}
