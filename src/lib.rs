//! MySQL schema MCP server.
//!
//! Exposes a database's catalog metadata and a SELECT-only query tool to MCP
//! clients over JSON-RPC 2.0 on stdio. Every request opens its own database
//! session and closes it before answering.

pub mod config;
pub mod db;
pub mod error;
pub mod guard;
pub mod introspect;
pub mod models;
pub mod report;
pub mod rpc;
pub mod server;
pub mod service;

pub use config::ConnectionConfig;
pub use error::{DbError, DbResult};
pub use service::{DatabaseService, ToolResult};
