use log::{debug, error, info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::config::ConnectionConfig;
use crate::db::MySqlDriver;
use crate::error::DbError;
use crate::rpc::{
    InitializeResult, JsonRpcRequest, JsonRpcResponse, ListChangedCapability,
    QueryArguments, ReadResourceParams, Resource, ResourcesList, SchemaArguments,
    ServerCapabilities, ServerInfo, TableInfoArguments, Tool, ToolCallParams, ToolsList,
    CONNECTION_FAILED, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR,
    QUERY_FAILED,
};
use crate::service::DatabaseService;

pub const PROTOCOL_VERSION: &str = "2025-03-26";
pub const SCHEMA_RESOURCE_URI: &str = "schema://main";

/// Map a DbError to a JSON-RPC error response with appropriate error codes.
fn db_error_to_response(id: Option<serde_json::Value>, err: DbError) -> JsonRpcResponse {
    let code = match &err {
        DbError::Connection { .. } => CONNECTION_FAILED,
        DbError::Query { .. } | DbError::Catalog { .. } | DbError::Execution { .. } => QUERY_FAILED,
        DbError::NotFound { .. } | DbError::ReadOnlyViolation => INVALID_PARAMS,
        DbError::Decode { .. } => INTERNAL_ERROR,
    };
    JsonRpcResponse::error(id, code, format!("Error reading schema: {err}"))
}

macro_rules! dispatch_tool {
    ($id:expr, $arguments:expr, $args_type:ty, $handler:expr) => {{
        let args: $args_type = match serde_json::from_value($arguments) {
            Ok(a) => a,
            Err(e) => return JsonRpcResponse::error($id, INVALID_PARAMS, format!("Invalid arguments: {e}")),
        };
        let result = $handler(args).await;
        JsonRpcResponse::success($id, json!(result))
    }};
}

pub async fn run(config: ConnectionConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Server config: host={}, port={}, user={}, database={}",
        config.host, config.port, config.user, config.database
    );
    let service = DatabaseService::new(Arc::new(MySqlDriver), config);
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    info!("MCP MySQL schema server started and ready to accept requests");
    serve(&service, stdin, stdout).await?;
    info!("MCP MySQL schema server shutdown complete");
    Ok(())
}

/// Read newline-delimited JSON-RPC messages until EOF, answering each request
/// on `writer`. Lines that are not UTF-8 or not JSON get a parse error and the
/// loop carries on; only a failing reader or writer ends it early.
pub async fn serve<R, W>(service: &DatabaseService, mut reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                info!("stdin closed - client disconnected, shutting down server");
                break;
            }
            Ok(_) => {
                let line = match std::str::from_utf8(&buf) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Discarding message that is not valid UTF-8: {e}");
                        let response = JsonRpcResponse::error(None, PARSE_ERROR, "Parse error");
                        send(&mut writer, response).await?;
                        continue;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                debug!("Received message (len={}): {}", line.len(), line.trim_end());
                let response = match serde_json::from_str::<JsonRpcRequest>(line) {
                    Ok(request) => {
                        debug!("Parsed request: method={}, id={:?}", request.method, request.id);
                        if request.is_notification() {
                            debug!("Received notification: {}", request.method);
                            continue;
                        }
                        handle_request(request, service).await
                    }
                    Err(e) => {
                        warn!("Failed to parse request: {e}");
                        JsonRpcResponse::error(None, PARSE_ERROR, "Parse error")
                    }
                };
                send(&mut writer, response).await?;
            }
            Err(e) => {
                warn!("Error reading from stdin: {e} (error kind: {:?})", e.kind());
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    break;
                }
                return Err(e);
            }
        }
    }
    Ok(())
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, response: JsonRpcResponse) -> std::io::Result<()> {
    match serde_json::to_string(&response) {
        Ok(response_str) => write_response(writer, &response_str).await,
        Err(e) => {
            error!("Failed to serialize response: {e}");
            let fallback = JsonRpcResponse::error(response.id, INTERNAL_ERROR, "Internal error");
            match serde_json::to_string(&fallback) {
                Ok(error_str) => write_response(writer, &error_str).await,
                Err(_) => Ok(()),
            }
        }
    }
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &str) -> std::io::Result<()> {
    writer.write_all(response.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

fn tool_definitions() -> Vec<Tool> {
    vec![
        Tool {
            name: "getSchema".to_string(),
            description: "List every table in the database with its CREATE TABLE statement, or with per-column details when `detailed` is true".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "detailed": {
                        "type": "boolean",
                        "default": false,
                        "description": "Return column details (type, nullability, default, primary key) instead of raw DDL"
                    }
                }
            }),
        },
        Tool {
            name: "query".to_string(),
            description: "Execute a SELECT query on the database (read-only)".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sql": {
                        "type": "string",
                        "description": "SELECT statement to execute"
                    }
                },
                "required": ["sql"]
            }),
        },
        Tool {
            name: "tableInfo".to_string(),
            description: "Columns, row count and up to 5 sample rows for one table".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "tableName": {
                        "type": "string",
                        "description": "Name of the table to inspect"
                    }
                },
                "required": ["tableName"]
            }),
        },
    ]
}

pub async fn handle_request(request: JsonRpcRequest, service: &DatabaseService) -> JsonRpcResponse {
    match request.method.as_str() {
        "initialize" => {
            debug!("Handling initialize request with params: {:?}", request.params);
            JsonRpcResponse::success(
                request.id,
                json!(InitializeResult {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    capabilities: ServerCapabilities {
                        tools: Some(ListChangedCapability { list_changed: false }),
                        resources: Some(ListChangedCapability { list_changed: false }),
                    },
                    server_info: ServerInfo {
                        name: env!("CARGO_PKG_NAME").to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    },
                }),
            )
        }
        "ping" => JsonRpcResponse::success(request.id, json!({})),
        "tools/list" => {
            debug!("Listing available tools");
            JsonRpcResponse::success(request.id, json!(ToolsList { tools: tool_definitions() }))
        }
        "tools/call" => {
            let params = match request.params {
                Some(params) => params,
                None => return JsonRpcResponse::error(request.id, INVALID_PARAMS, "Missing parameters"),
            };
            let tool_params = match serde_json::from_value::<ToolCallParams>(params) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(
                        request.id,
                        INVALID_PARAMS,
                        format!("Invalid tool call parameters: {e}"),
                    )
                }
            };
            let id = request.id;
            let arguments = tool_params.arguments.unwrap_or_else(|| json!({}));
            debug!("Handling tool call: {}", tool_params.name);

            match tool_params.name.as_str() {
                "getSchema" => dispatch_tool!(id, arguments, SchemaArguments, |args: SchemaArguments| {
                    service.get_schema_overview(args.detailed)
                }),
                "query" => dispatch_tool!(id, arguments, QueryArguments, |args: QueryArguments| async move {
                    service.run_guarded_query(&args.sql).await
                }),
                "tableInfo" => dispatch_tool!(id, arguments, TableInfoArguments, |args: TableInfoArguments| async move {
                    service.get_table_info(&args.table_name).await
                }),
                _ => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Unknown tool: {}", tool_params.name)),
            }
        }
        "resources/list" => JsonRpcResponse::success(
            request.id,
            json!(ResourcesList {
                resources: vec![Resource {
                    uri: SCHEMA_RESOURCE_URI.to_string(),
                    name: "schema".to_string(),
                    description: "Schema definition for all tables in the database".to_string(),
                    mime_type: "text/plain".to_string(),
                }],
            }),
        ),
        "resources/read" => {
            let params = match request
                .params
                .map(serde_json::from_value::<ReadResourceParams>)
            {
                Some(Ok(p)) => p,
                Some(Err(e)) => {
                    return JsonRpcResponse::error(request.id, INVALID_PARAMS, format!("Invalid parameters: {e}"))
                }
                None => return JsonRpcResponse::error(request.id, INVALID_PARAMS, "Missing parameters"),
            };
            if params.uri != SCHEMA_RESOURCE_URI {
                return JsonRpcResponse::error(
                    request.id,
                    INVALID_PARAMS,
                    format!("Unknown resource: {}", params.uri),
                );
            }

            match service.get_schema_resource().await {
                Ok(resource) => JsonRpcResponse::success(
                    request.id,
                    json!({
                        "contents": [{
                            "uri": params.uri,
                            "mimeType": "text/plain",
                            "text": resource.text,
                            "metadata": resource.metadata,
                        }]
                    }),
                ),
                Err(e) => {
                    error!("Failed to read schema resource: {e}");
                    db_error_to_response(request.id, e)
                }
            }
        }
        _ => {
            warn!("Unknown method: {}", request.method);
            JsonRpcResponse::error(request.id, METHOD_NOT_FOUND, format!("Method not found: {}", request.method))
        }
    }
}
