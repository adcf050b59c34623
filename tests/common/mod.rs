//! In-memory stand-in for the MySQL driver.
//!
//! Answers the catalog and data statements the server issues from a fixed set
//! of tables, and records every connect, close and statement so tests can
//! assert on the traffic.

#![allow(dead_code)]

use async_trait::async_trait;
use mcp_server_mysql_schema::config::ConnectionConfig;
use mcp_server_mysql_schema::db::{Connection, Driver, Row};
use mcp_server_mysql_schema::error::{DbError, DbResult};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct FakeColumn {
    pub name: &'static str,
    pub column_type: &'static str,
    pub nullable: bool,
    pub default: Option<&'static str>,
    pub key: &'static str,
}

#[derive(Debug, Clone)]
pub struct FakeTable {
    pub name: String,
    pub ddl: String,
    pub is_view: bool,
    pub columns: Vec<FakeColumn>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Recorder {
    connects: AtomicUsize,
    closes: AtomicUsize,
    statements: Mutex<Vec<Statement>>,
}

impl Recorder {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().unwrap().clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements().into_iter().map(|s| s.sql).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeDriver {
    tables: Arc<Vec<FakeTable>>,
    recorder: Arc<Recorder>,
    connect_error: Option<String>,
    fail_on: Option<(String, String)>,
    fail_close: bool,
    query_rows: Vec<Row>,
}

impl FakeDriver {
    pub fn new(tables: Vec<FakeTable>) -> Self {
        Self {
            tables: Arc::new(tables),
            ..Self::default()
        }
    }

    pub fn recorder(&self) -> Arc<Recorder> {
        self.recorder.clone()
    }

    pub fn refusing_connections(mut self, message: &str) -> Self {
        self.connect_error = Some(message.to_string());
        self
    }

    /// Fail any statement containing `needle` with the given driver message.
    pub fn failing_on(mut self, needle: &str, message: &str) -> Self {
        self.fail_on = Some((needle.to_string(), message.to_string()));
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Rows returned for statements that are not catalog lookups.
    pub fn answering(mut self, rows: Vec<Row>) -> Self {
        self.query_rows = rows;
        self
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn connect(&self, config: &ConnectionConfig) -> DbResult<Box<dyn Connection>> {
        self.recorder.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.connect_error {
            return Err(DbError::connection(message.clone()));
        }
        Ok(Box::new(FakeConnection {
            driver: self.clone(),
            database: config.database.clone(),
            closed: false,
        }))
    }
}

struct FakeConnection {
    driver: FakeDriver,
    database: String,
    closed: bool,
}

impl FakeConnection {
    fn table(&self, name: &str) -> Option<&FakeTable> {
        self.driver.tables.iter().find(|t| t.name == name)
    }

    fn missing(&self, name: &str) -> DbError {
        DbError::query(format!("Table '{}.{}' doesn't exist", self.database, name))
    }

    fn answer(&self, sql: &str, params: &[&str]) -> DbResult<Vec<Row>> {
        let in_database = params.first() == Some(&self.database.as_str());

        if sql.contains("information_schema.tables") && sql.contains("BASE TABLE") {
            if !in_database {
                return Ok(vec![]);
            }
            return Ok(self
                .driver
                .tables
                .iter()
                .filter(|t| !t.is_view)
                .map(|t| row(json!({ "name": t.name })))
                .collect());
        }
        if sql.contains("information_schema.tables") {
            return Ok(match (in_database, self.table(params[1])) {
                (true, Some(t)) => vec![row(json!({ "TABLE_NAME": t.name }))],
                _ => vec![],
            });
        }
        if sql.contains("information_schema.columns") {
            let columns = match (in_database, self.table(params[1])) {
                (true, Some(t)) => t.columns.clone(),
                _ => vec![],
            };
            return Ok(columns
                .iter()
                .map(|c| {
                    row(json!({
                        "name": c.name,
                        "type": c.column_type,
                        "IS_NULLABLE": if c.nullable { "YES" } else { "NO" },
                        "COLUMN_DEFAULT": c.default,
                        "COLUMN_KEY": c.key,
                    }))
                })
                .collect());
        }
        if let Some(ident) = sql.strip_prefix("SHOW CREATE TABLE ") {
            let name = unquote(ident);
            let table = self.table(&name).ok_or_else(|| self.missing(&name))?;
            return Ok(vec![row(json!({ "Table": table.name, "Create Table": table.ddl }))]);
        }
        if let Some(ident) = sql.strip_prefix("SELECT COUNT(*) AS count FROM ") {
            let name = unquote(ident);
            let table = self.table(&name).ok_or_else(|| self.missing(&name))?;
            return Ok(vec![row(json!({ "count": table.rows.len() }))]);
        }
        if let Some(rest) = sql.strip_prefix("SELECT * FROM ") {
            if let Some((ident, limit)) = rest.rsplit_once(" LIMIT ") {
                let name = unquote(ident);
                let limit: usize = limit.parse().map_err(|_| DbError::query("bad limit"))?;
                let table = self.table(&name).ok_or_else(|| self.missing(&name))?;
                return Ok(table.rows.iter().take(limit).cloned().collect());
            }
        }
        Ok(self.driver.query_rows.clone())
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn fetch(&mut self, sql: &str, params: &[&str]) -> DbResult<Vec<Row>> {
        assert!(!self.closed, "statement issued on a closed connection: {sql}");
        self.driver
            .recorder
            .statements
            .lock()
            .unwrap()
            .push(Statement {
                sql: sql.to_string(),
                params: params.iter().map(|p| p.to_string()).collect(),
            });

        if let Some((needle, message)) = &self.driver.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(DbError::query(message.clone()));
            }
        }
        self.answer(sql, params)
    }

    async fn close(&mut self) -> DbResult<()> {
        assert!(!self.closed, "connection closed twice");
        self.closed = true;
        self.driver.recorder.closes.fetch_add(1, Ordering::SeqCst);
        if self.driver.fail_close {
            return Err(DbError::connection("Lost connection to MySQL server during query"));
        }
        Ok(())
    }
}

fn unquote(ident: &str) -> String {
    ident
        .trim()
        .strip_prefix('`')
        .and_then(|s| s.strip_suffix('`'))
        .unwrap_or(ident)
        .replace("``", "`")
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

pub const USERS_DDL: &str = "CREATE TABLE `users` (\n  `id` int NOT NULL,\n  `name` varchar(255) NOT NULL,\n  `email` varchar(255) DEFAULT NULL,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

pub const ORDERS_DDL: &str = "CREATE TABLE `orders` (\n  `id` bigint unsigned NOT NULL AUTO_INCREMENT,\n  `user_id` int NOT NULL,\n  `status` varchar(16) NOT NULL DEFAULT 'new',\n  PRIMARY KEY (`id`),\n  KEY `user_id` (`user_id`)\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

pub fn users_table() -> FakeTable {
    FakeTable {
        name: "users".into(),
        ddl: USERS_DDL.into(),
        is_view: false,
        columns: vec![
            FakeColumn { name: "id", column_type: "int", nullable: false, default: None, key: "PRI" },
            FakeColumn { name: "name", column_type: "varchar(255)", nullable: false, default: None, key: "" },
            FakeColumn { name: "email", column_type: "varchar(255)", nullable: true, default: None, key: "" },
        ],
        rows: (1..=7)
            .map(|i| row(json!({ "id": i, "name": format!("user{i}"), "email": null })))
            .collect(),
    }
}

pub fn orders_table() -> FakeTable {
    FakeTable {
        name: "orders".into(),
        ddl: ORDERS_DDL.into(),
        is_view: false,
        columns: vec![
            FakeColumn { name: "id", column_type: "bigint unsigned", nullable: false, default: None, key: "PRI" },
            FakeColumn { name: "user_id", column_type: "int", nullable: false, default: None, key: "MUL" },
            FakeColumn { name: "status", column_type: "varchar(16)", nullable: false, default: Some("new"), key: "" },
        ],
        rows: vec![],
    }
}

pub fn active_users_view() -> FakeTable {
    FakeTable {
        name: "active_users".into(),
        ddl: "CREATE VIEW `active_users` AS select 1".into(),
        is_view: true,
        columns: vec![],
        rows: vec![],
    }
}

pub fn shop_driver() -> FakeDriver {
    FakeDriver::new(vec![users_table(), orders_table(), active_users_view()])
}

pub fn shop_config() -> ConnectionConfig {
    ConnectionConfig::new("localhost", "app", "secret", "shop")
}
