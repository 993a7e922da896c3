/**
 * figma-mcp メインエントリーポイント
 *
 * 概要:
 *   RustベースのMCPサーバー。STDIO経由でJSON-RPC通信を行い、
 *   Figmaプラグインへのノード・塗り・変数操作ツールを提供する。
 *   各ツールはスカラー値でも配列値でも呼び出せ、配列の場合はバルク操作として展開される。
 *
 * 主な仕様:
 *   - STDIO経由でJSON-RPCリクエスト/レスポンスを処理
 *   - 設定は環境変数から読み込む（config.rs参照）
 *   - stderr にログを出力（tracing-subscriber）
 *   - MCPプロトコル（initialize、tools/list、tools/call）を実装
 *
 * 制限事項:
 *   - 実プラグインとのWebSocket接続は未実装。InMemoryPlugin をスタブとして使う
 */
use std::env;
use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Context;
use tracing::Level;

mod bulk;
mod config;
mod mcp;
mod plugin;
mod tools;

use config::Settings;
use plugin::InMemoryPlugin;
use tools::ToolContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stderr ログ（ANSIカラーコードを無効化、環境変数で制御可能）
    let log_level = env::var("RUST_LOG")
        .unwrap_or_else(|_| "WARN".to_string())
        .parse::<Level>()
        .unwrap_or(Level::WARN);

    let use_ansi = env::var("TERM").is_ok()
        && env::var("NO_COLOR").is_err()
        && std::io::stderr().is_terminal();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(log_level)
        .with_ansi(use_ansi)
        .with_target(false)
        .compact()
        .init();

    let settings = Settings::from_env().context("設定の読み込みに失敗しました")?;
    let name = settings.server_name.clone();

    tracing::debug!(
        server = %name,
        max_bulk_items = settings.max_bulk_items,
        default_fail_fast = settings.default_fail_fast,
        "Starting figma-mcp server (STDIO)."
    );

    // ツール初期化
    let plugin = Arc::new(InMemoryPlugin::new(settings.document_name.clone()));
    let ctx = Arc::new(ToolContext::new(plugin, settings));
    tools::register_all(&ctx).await?;

    // MCPサーバー構築
    let io = mcp::build_server(name.clone(), ctx).context("MCPサーバーの構築に失敗しました")?;

    // STDIOサーバー起動
    tracing::debug!(server = %name, "MCP server ready. Listening for JSON-RPC requests on STDIO.");

    let server = jsonrpc_stdio_server::ServerBuilder::new(io).build();

    server.await;

    tracing::debug!("MCP server shutting down.");
    Ok(())
}
