use async_trait::async_trait;
use bigdecimal::BigDecimal;
use futures::future::BoxFuture;
use log::{debug, warn};
use serde_json::{json, Value};
use sqlx::mysql::types::MySqlTime;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, Connection as _, Decode, MySql, Row as _, Type, TypeInfo};

use crate::config::ConnectionConfig;
use crate::error::{DbError, DbResult};

/// One result row, keyed by column label in result-set order.
pub type Row = serde_json::Map<String, Value>;

/// Opens sessions against the target database.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> DbResult<Box<dyn Connection>>;
}

/// A single open database session.
#[async_trait]
pub trait Connection: Send {
    /// Run a statement with positional `?` parameters and collect every row.
    async fn fetch(&mut self, sql: &str, params: &[&str]) -> DbResult<Vec<Row>>;

    async fn close(&mut self) -> DbResult<()>;
}

/// A connection scoped to one operation, together with the schema it targets.
///
/// Sessions only exist inside [`with_session`], which owns the close. A
/// session dropped before that close (the operation panicked, or the caller
/// stopped polling) hands its connection to a background task that closes it.
pub struct Session {
    conn: Option<Box<dyn Connection>>,
    database: String,
}

impl Session {
    pub fn database(&self) -> &str {
        &self.database
    }

    pub async fn fetch(&mut self, sql: &str, params: &[&str]) -> DbResult<Vec<Row>> {
        debug!("Executing: {sql} {params:?}");
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DbError::connection("session already closed"))?;
        conn.fetch(sql, params).await
    }

    async fn close(&mut self) -> DbResult<()> {
        match self.conn.take() {
            Some(mut conn) => conn.close().await,
            None => Ok(()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        warn!("Session to {} dropped before close", self.database);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = conn.close().await {
                        warn!("Failed to close abandoned session: {e}");
                    }
                });
            }
            Err(_) => warn!("No runtime to close abandoned session; dropping connection"),
        }
    }
}

/// Open a session, run `op` on it, and close it again.
///
/// The close runs whether `op` succeeded or failed. A failing close is logged
/// and never replaces the result of `op`.
pub async fn with_session<T, F>(
    driver: &dyn Driver,
    config: &ConnectionConfig,
    op: F,
) -> DbResult<T>
where
    F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, DbResult<T>>,
{
    let conn = driver.connect(config).await?;
    debug!(
        "Opened session to {}:{}/{}",
        config.host, config.port, config.database
    );
    let mut session = Session {
        conn: Some(conn),
        database: config.database.clone(),
    };

    let result = op(&mut session).await;

    if let Err(e) = session.close().await {
        warn!("Failed to close database session: {e}");
    }
    debug!("Closed session to {}", config.database);
    result
}

/// Wrap an identifier in backticks, doubling any embedded backtick.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Production driver: one fresh `sqlx` MySQL connection per session.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlDriver;

#[async_trait]
impl Driver for MySqlDriver {
    async fn connect(&self, config: &ConnectionConfig) -> DbResult<Box<dyn Connection>> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(|e| DbError::connection(e.to_string()))?;
        Ok(Box::new(MySqlSession { conn: Some(conn) }))
    }
}

struct MySqlSession {
    conn: Option<MySqlConnection>,
}

#[async_trait]
impl Connection for MySqlSession {
    async fn fetch(&mut self, sql: &str, params: &[&str]) -> DbResult<Vec<Row>> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DbError::connection("connection already closed"))?;

        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(*param);
        }
        let rows = query
            .fetch_all(conn)
            .await
            .map_err(|e| DbError::query(driver_message(e)))?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn close(&mut self) -> DbResult<()> {
        match self.conn.take() {
            Some(conn) => conn
                .close()
                .await
                .map_err(|e| DbError::connection(e.to_string())),
            None => Ok(()),
        }
    }
}

/// The server's own message for database errors, the driver's rendering otherwise.
fn driver_message(err: sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().to_string(),
        other => other.to_string(),
    }
}

fn get<'r, T>(row: &'r MySqlRow, index: usize) -> Option<Option<T>>
where
    T: Decode<'r, MySql> + Type<MySql>,
{
    row.try_get::<Option<T>, _>(index).ok()
}

/// Text columns, falling back to raw bytes: depending on the charset MySQL
/// reports some information_schema columns as VARBINARY. Types with no
/// decoder of their own (GEOMETRY, SET on some servers) also land here and
/// come out as lossy text rather than null.
fn text_value(row: &MySqlRow, index: usize) -> Value {
    if let Some(v) = get::<String>(row, index) {
        return json!(v);
    }
    match raw_bytes(row, index) {
        Some(v) => json!(v.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())),
        None => Value::Null,
    }
}

/// The column's bytes as sent on the wire, whatever its declared type.
fn raw_bytes(row: &MySqlRow, index: usize) -> Option<Option<Vec<u8>>> {
    row.try_get_unchecked::<Option<Vec<u8>>, _>(index).ok()
}

/// BIT(n) arrives as a big-endian byte string of ceil(n/8) bytes.
fn bit_value(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

fn decode_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    let decoded = match type_name {
        "NULL" => Some(Value::Null),
        "BOOLEAN" => get::<bool>(row, index).map(|v| json!(v)),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "YEAR" => {
            get::<i64>(row, index)
                .map(|v| json!(v))
                .or_else(|| get::<u64>(row, index).map(|v| json!(v)))
        }
        t if t.ends_with("UNSIGNED") => get::<u64>(row, index).map(|v| json!(v)),
        "FLOAT" => get::<f32>(row, index)
            .map(|v| json!(v))
            .or_else(|| get::<f64>(row, index).map(|v| json!(v))),
        "DOUBLE" | "REAL" => get::<f64>(row, index).map(|v| json!(v)),
        // String keeps the full precision.
        "DECIMAL" | "NUMERIC" => {
            get::<BigDecimal>(row, index).map(|v| json!(v.map(|d| d.to_string())))
        }
        "DATE" => get::<chrono::NaiveDate>(row, index).map(|v| json!(v.map(|d| d.to_string()))),
        // Intervals outside 00:00-24:00 only fit MySqlTime.
        "TIME" => get::<chrono::NaiveTime>(row, index)
            .map(|v| json!(v.map(|t| t.to_string())))
            .or_else(|| get::<MySqlTime>(row, index).map(|v| json!(v.map(|t| t.to_string())))),
        "BIT" => raw_bytes(row, index).map(|v| json!(v.map(|bytes| bit_value(&bytes)))),
        "DATETIME" => get::<chrono::NaiveDateTime>(row, index)
            .map(|v| json!(v.map(|d| d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))),
        "TIMESTAMP" => get::<chrono::DateTime<chrono::Utc>>(row, index)
            .map(|v| json!(v.map(|d| d.to_rfc3339()))),
        "JSON" => get::<Value>(row, index).map(|v| v.unwrap_or(Value::Null)),
        _ => None,
    };
    decoded.unwrap_or_else(|| text_value(row, index))
}

fn row_to_json(row: &MySqlRow) -> Row {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = decode_value(row, i, column.type_info().name());
        out.insert(column.name().to_string(), value);
    }
    out
}
