//! MySQL Schema MCP Server
//!
//! Serves schema introspection and read-only queries for one MySQL database
//! over the Model Context Protocol (JSON-RPC 2.0 over stdio).
//!
//! # Tools
//!
//! - `getSchema` - every table's DDL, or column details when `detailed`
//! - `query` - SELECT statements only
//! - `tableInfo` - columns, row count and a 5-row sample for one table
//!
//! The `schema://main` resource returns all DDL joined together.
//!
//! Connection settings are read from `DB_*` variables, flags, or a TOML file.
//! A `.env` file in the working directory (or the one named by
//! `--envpath=<file>`) is loaded first.

use clap::Parser;
use log::{error, info};
use mcp_server_mysql_schema::config::{self, Args};
use mcp_server_mysql_schema::server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries the protocol.
    env_logger::init();

    let envpath = config::envpath_arg(std::env::args());
    match config::load_env_file(envpath.as_deref()) {
        Ok(Some(path)) => info!("Loaded environment from {}", path.display()),
        Ok(None) => {}
        Err(e) => {
            error!("{e}");
            return Err(e.into());
        }
    }

    let args = Args::parse();
    let config = config::load(&args).map_err(|e| {
        error!("{e}");
        e
    })?;
    server::run(config).await
}
