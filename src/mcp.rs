/**
 * MCPプロトコル実装モジュール
 *
 * 概要:
 *   JSON-RPC 2.0ベースのMCPプロトコルを実装し、
 *   initialize、tools/list、tools/callなどのメソッドを提供する。
 *
 * 主な仕様:
 *   - STDIO経由でJSON-RPCリクエスト/レスポンスを処理
 *   - ツール定義は各ツールの ParamSchema から生成する
 *   - パラメータ検証エラーは invalid_params、単一操作の実行エラーは isError 付きの結果
 *   - バルクの部分失敗は通常の結果として返す（各アイテムの error キーで判断）
 */
use std::sync::Arc;

use anyhow::Result;
use jsonrpc_core::{Error as JsonRpcError, ErrorCode, IoHandler, Params, Value};
use serde::Serialize;
use serde_json::{json, Map};
use tracing::{error, warn};

use crate::bulk::{NormalizeError, ToolReply};
use crate::plugin::PluginError;
use crate::tools::{self, fills, nodes, status, variables, ToolContext};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/**
 * MCP Initialize レスポンス
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// プロトコルバージョン
    pub protocol_version: String,
    /// サーバー情報
    pub server_info: ServerInfo,
    /// サーバー機能
    pub capabilities: ServerCapabilities,
}

/**
 * サーバー情報
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    pub list_changed: bool,
}

/**
 * MCP Tool定義
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/**
 * 呼び出し失敗の分類
 */
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("arguments must be a JSON object")]
    ArgumentsNotObject,
}

/**
 * MCPサーバー構築
 *
 * 引数:
 *   name: サーバー名
 *   ctx: ツールハンドラー共有の依存関係
 *
 * 戻り値:
 *   Result<IoHandler> - JSON-RPCハンドラー
 */
pub fn build_server(name: String, ctx: Arc<ToolContext>) -> Result<IoHandler> {
    let mut io = IoHandler::new();
    let server_name = name.clone();

    // initialize メソッド
    io.add_method("initialize", move |params: Params| {
        let name = server_name.clone();
        async move {
            let params_value: Value = params.parse().unwrap_or(Value::Null);

            // camelCase/snake_case両対応
            let protocol_version = params_value
                .get("protocolVersion")
                .or_else(|| params_value.get("protocol_version"))
                .and_then(|v| v.as_str())
                .ok_or_else(|| JsonRpcError::invalid_params("missing protocolVersion"))?;

            let client_name = params_value
                .get("clientInfo")
                .or_else(|| params_value.get("client_info"))
                .and_then(|ci| ci.get("name"))
                .and_then(|n| n.as_str())
                .unwrap_or("unknown");

            tracing::debug!(
                protocol_version = %protocol_version,
                client_name = %client_name,
                "MCP initialize called"
            );

            let result = InitializeResult {
                protocol_version: PROTOCOL_VERSION.to_string(),
                server_info: ServerInfo {
                    name,
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
                capabilities: ServerCapabilities {
                    tools: ToolsCapability { list_changed: false },
                },
            };

            serde_json::to_value(result)
                .map_err(|e| internal_error(format!("JSON serialization error: {}", e)))
        }
    });

    // initialized 通知（空実装）
    for method in ["initialized", "notifications/initialized"] {
        io.add_notification(method, |_params: Params| {
            tracing::debug!("MCP initialized notification received");
        });
    }

    // tools/list メソッド
    io.add_method("tools/list", |_params: Params| async move {
        let tools = get_all_tools();
        tracing::debug!(tool_count = tools.len(), "tools/list called");
        Ok::<_, JsonRpcError>(json!({ "tools": tools }))
    });

    // tools/call メソッド
    io.add_method("tools/call", move |params: Params| {
        let ctx = ctx.clone();
        async move {
            let params_value: Value = params.parse()?;

            let tool_name = params_value
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| JsonRpcError::invalid_params("missing tool name"))?;

            let arguments = params_value.get("arguments").cloned().unwrap_or(Value::Null);

            tracing::debug!(tool_name = %tool_name, "tools/call called");

            let reply = match handle_tool_call(&ctx, tool_name, arguments).await {
                Ok(reply) => reply,
                Err(e) => tool_error(tool_name, e)?,
            };
            serde_json::to_value(reply)
                .map_err(|e| internal_error(format!("JSON serialization error: {}", e)))
        }
    });

    Ok(io)
}

fn internal_error(message: String) -> JsonRpcError {
    JsonRpcError {
        code: ErrorCode::InternalError,
        message,
        data: None,
    }
}

/**
 * ツール呼び出しの失敗を振り分ける
 *
 * 引数・パラメータの誤りとプラグイン未接続は JSON-RPC エラー、
 * 操作そのものの失敗は isError 付きの結果にする。
 */
fn tool_error(tool_name: &str, e: anyhow::Error) -> Result<ToolReply, JsonRpcError> {
    if let Some(normalize) = e.downcast_ref::<NormalizeError>() {
        warn!(tool_name = %tool_name, error = %normalize, "パラメータ検証エラー");
        return Err(JsonRpcError::invalid_params(normalize.to_string()));
    }
    if let Some(call) = e.downcast_ref::<CallError>() {
        warn!(tool_name = %tool_name, error = %call, "ツール呼び出しエラー");
        return Err(JsonRpcError::invalid_params(call.to_string()));
    }
    if let Some(plugin) = e.downcast_ref::<PluginError>() {
        warn!(tool_name = %tool_name, error = %plugin, "プラグイン接続エラー");
        return Err(internal_error(format!("{e:#}")));
    }
    error!(tool_name = %tool_name, error = %format!("{e:#}"), "ツール実行エラー");
    Ok(ToolReply::error(format!("Error: {e:#}")))
}

/**
 * すべてのツール定義を取得
 */
fn get_all_tools() -> Vec<Tool> {
    tools::catalogue()
        .into_iter()
        .map(|spec| Tool {
            name: spec.name.to_string(),
            description: spec.description.to_string(),
            input_schema: spec.schema.to_input_schema(),
        })
        .collect()
}

/**
 * ツールコールを処理
 *
 * 引数:
 *   ctx: ツールハンドラー共有の依存関係
 *   name: ツール名
 *   arguments: 引数（JSON Value。null は空オブジェクト扱い）
 */
async fn handle_tool_call(ctx: &ToolContext, name: &str, arguments: Value) -> Result<ToolReply> {
    let arguments: Map<String, Value> = match arguments {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        _ => return Err(CallError::ArgumentsNotObject.into()),
    };

    match name {
        nodes::NAME => nodes::call(ctx, &arguments).await,
        fills::NAME => fills::call(ctx, &arguments).await,
        variables::NAME => variables::call(ctx, &arguments).await,
        status::NAME => status::call(ctx, &arguments).await,
        _ => {
            error!(tool_name = %name, "Unknown tool");
            Err(CallError::UnknownTool(name.to_string()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::plugin::InMemoryPlugin;

    fn server() -> IoHandler {
        server_with(Arc::new(InMemoryPlugin::new("Test")))
    }

    fn server_with(plugin: Arc<InMemoryPlugin>) -> IoHandler {
        let ctx = ToolContext::new(plugin, Settings::default());
        build_server("figma-mcp".into(), Arc::new(ctx)).unwrap()
    }

    async fn request(io: &IoHandler, method: &str, params: Value) -> Value {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let response = io.handle_request(&body.to_string()).await.unwrap();
        serde_json::from_str(&response).unwrap()
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let io = server();
        let response = request(
            &io,
            "initialize",
            json!({ "protocolVersion": "2024-11-05", "clientInfo": { "name": "test" } }),
        )
        .await;
        assert_eq!(response["result"]["serverInfo"]["name"], "figma-mcp");
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn tools_list_publishes_generated_schemas() {
        let io = server();
        let response = request(&io, "tools/list", json!({})).await;
        let tools = response["result"]["tools"].as_array().unwrap();
        let nodes_tool = tools.iter().find(|t| t["name"] == nodes::NAME).unwrap();
        let schema = &nodes_tool["inputSchema"];
        assert_eq!(schema["required"], json!(["operation"]));
        assert!(schema["properties"]["operation"]["enum"].is_array());
        assert!(schema["properties"]["nodeId"]["oneOf"].is_array());
    }

    #[tokio::test]
    async fn unknown_parameter_is_invalid_params() {
        let io = server();
        let response = request(
            &io,
            "tools/call",
            json!({ "name": status::NAME, "arguments": { "operation": "status", "foo": 1 } }),
        )
        .await;
        assert_eq!(response["error"]["code"], -32602);
        let message = response["error"]["message"].as_str().unwrap();
        assert!(message.contains("foo"));
        assert!(message.contains("operation"));
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_params() {
        let io = server();
        let response = request(&io, "tools/call", json!({ "name": "figma_magic", "arguments": {} })).await;
        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn single_operation_failure_is_an_error_result() {
        let io = server();
        let response = request(
            &io,
            "tools/call",
            json!({ "name": nodes::NAME, "arguments": { "operation": "get", "nodeId": "9:9" } }),
        )
        .await;
        assert_eq!(response["result"]["isError"], true);
        assert!(response["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Node not found"));
    }

    #[tokio::test]
    async fn single_item_validation_failure_is_invalid_params() {
        let io = server();
        let response = request(
            &io,
            "tools/call",
            json!({ "name": nodes::NAME, "arguments": { "operation": "update", "nodeId": "1:1" } }),
        )
        .await;
        assert_eq!(response["error"]["code"], -32602);
        assert!(response["error"]["message"].as_str().unwrap().contains("at least one"));
    }

    #[tokio::test]
    async fn disconnected_plugin_is_a_transport_error() {
        let plugin = Arc::new(InMemoryPlugin::new("Test"));
        plugin.set_connected(false);
        let io = server_with(plugin);
        let response = request(
            &io,
            "tools/call",
            json!({ "name": nodes::NAME, "arguments": { "operation": "get", "nodeId": "1:1" } }),
        )
        .await;
        assert_eq!(response["error"]["code"], -32603);
        assert!(response["error"]["message"].as_str().unwrap().contains("not connected"));
    }

    #[tokio::test]
    async fn bulk_call_round_trip() {
        let io = server();
        let response = request(
            &io,
            "tools/call",
            json!({
                "name": nodes::NAME,
                "arguments": { "operation": "create_ellipse", "name": ["a", "b"] }
            }),
        )
        .await;
        assert_eq!(response["result"]["isError"], false);
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let items: Value = serde_json::from_str(text).unwrap();
        assert_eq!(items[1]["name"], "b");
        assert_eq!(items[1]["type"], "ELLIPSE");
    }
}
