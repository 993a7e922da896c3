/**
 * プラグイン状態ツール（figma_plugin_status）
 *
 * 概要:
 *   Figmaプラグインとの接続状態を返す。クライアントは起動直後に
 *   {operation: "status"} を繰り返し呼び、connected が true になるのを待つ。
 *
 * 主な仕様:
 *   - status: connected / pluginId / documentName / nodeCount
 *   - ping: プラグインまで往復し、所要時間を返す
 *   - バルク対象のパラメータはない
 */
use std::time::Instant;

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{finish, parse_item, ToolContext};
use crate::bulk::{self, ParamConfig, ParamSchema, ToolReply, FAIL_FAST, OPERATION};
use crate::plugin::PluginRequest;

pub const NAME: &str = "figma_plugin_status";
pub const DESCRIPTION: &str = "Report whether the Figma plugin is connected, or ping it.";

const OPERATIONS: &[&str] = &["status", "ping"];

pub fn schema() -> ParamSchema {
    ParamSchema::new()
        .param(OPERATION, ParamConfig::string().required().one_of(OPERATIONS))
        .param(FAIL_FAST, ParamConfig::boolean())
}

fn allowed_params(_operation: &str) -> &'static [&'static str] {
    &[]
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
enum StatusOperation {
    Status,
    Ping,
}

async fn run(ctx: &ToolContext, operation: StatusOperation) -> Result<Value> {
    match operation {
        StatusOperation::Status => ctx.send(PluginRequest::Status).await,
        StatusOperation::Ping => {
            let started = Instant::now();
            ctx.send(PluginRequest::Ping).await?;
            let elapsed = started.elapsed();
            Ok(json!({ "pong": true, "latencyMs": elapsed.as_secs_f64() * 1000.0 }))
        }
    }
}

pub async fn call(ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolReply> {
    debug!(function = "figma_plugin_status", "プラグイン状態を確認します");
    let schema = schema();
    let dispatched = bulk::dispatch(
        args,
        &ctx.plan(&schema, &[]),
        parse_item::<StatusOperation>,
        |operation, _| run(ctx, operation),
    )
    .await?;
    finish(args, dispatched, allowed_params)
}
