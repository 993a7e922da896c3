/**
 * ツールモジュール統合
 *
 * 概要:
 *   すべてのMCPツール（nodes、fills、variables、status）を統合し、
 *   ハンドラーが共有する ToolContext を提供する。
 *
 * 主な仕様:
 *   - ToolContext はプラグイン接続と設定を保持し、mainで構築して渡す
 *   - catalogue() で tools/list 用の定義を返す
 *   - register_all() で起動時にプラグインの状態を確認する
 */
pub mod fills;
pub mod nodes;
pub mod status;
pub mod variables;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::bulk::{parameter_warnings, DispatchPlan, Dispatched, ParamSchema, ToolReply, FAIL_FAST, OPERATION};
use crate::config::Settings;
use crate::plugin::{PluginBridge, PluginRequest};

/// すべての操作で許可されるパラメータ
pub const COMMON_PARAMS: &[&str] = &[OPERATION, FAIL_FAST];

/**
 * ハンドラー共有の依存関係
 */
pub struct ToolContext {
    plugin: Arc<dyn PluginBridge>,
    settings: Settings,
}

impl ToolContext {
    pub fn new(plugin: Arc<dyn PluginBridge>, settings: Settings) -> Self {
        Self { plugin, settings }
    }

    pub fn plan<'a>(&self, schema: &'a ParamSchema, bulk_params: &'a [&'static str]) -> DispatchPlan<'a> {
        DispatchPlan {
            schema,
            bulk_params,
            max_items: self.settings.max_bulk_items,
            default_fail_fast: self.settings.default_fail_fast,
        }
    }

    /// プラグインへメッセージを送り、応答を待つ
    pub async fn send(&self, request: PluginRequest) -> Result<Value> {
        let kind = request.kind();
        self.plugin
            .send(request)
            .await
            .with_context(|| format!("{kind} failed"))
    }
}

/**
 * tools/list に載せるツール定義
 */
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: ParamSchema,
}

pub fn catalogue() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: nodes::NAME,
            description: nodes::DESCRIPTION,
            schema: nodes::schema(),
        },
        ToolSpec {
            name: fills::NAME,
            description: fills::DESCRIPTION,
            schema: fills::schema(),
        },
        ToolSpec {
            name: variables::NAME,
            description: variables::DESCRIPTION,
            schema: variables::schema(),
        },
        ToolSpec {
            name: status::NAME,
            description: status::DESCRIPTION,
            schema: status::schema(),
        },
    ]
}

/**
 * 起動時の初期化
 *
 * プラグインに接続できなくても起動は続ける（ツール呼び出し時にエラーを返す）。
 */
pub async fn register_all(ctx: &ToolContext) -> Result<()> {
    match ctx.send(PluginRequest::Status).await {
        Ok(status) => {
            let connected = status.get("connected").cloned().unwrap_or_default();
            debug!(connected = %connected, tools = catalogue().len(), "figma tools registered");
        }
        Err(e) => warn!(error = %e, "プラグインの状態を取得できませんでした"),
    }
    Ok(())
}

/**
 * ディスパッチ結果を返却形式に包み、操作に関係ないパラメータの警告を付ける
 */
pub(crate) fn finish(
    args: &Map<String, Value>,
    dispatched: Dispatched,
    allowed: fn(&str) -> &'static [&'static str],
) -> Result<ToolReply> {
    let warnings = args
        .get(OPERATION)
        .and_then(Value::as_str)
        .map(|operation| parameter_warnings(args, operation, allowed(operation), COMMON_PARAMS))
        .unwrap_or_default();
    Ok(dispatched.into_reply()?.with_warnings(&warnings))
}

/// 単一アイテムを型付きパラメータへ変換する（serdeによるスキーマ検証）
pub(crate) fn parse_item<T: serde::de::DeserializeOwned>(item: &Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(item.clone())).context("invalid operation parameters")
}

/// #RRGGBB / #RRGGBBAA / #RGB 形式の色指定
pub fn is_hex_color(value: &Value) -> bool {
    value.as_str().is_some_and(|s| {
        s.strip_prefix('#').is_some_and(|hex| {
            matches!(hex.len(), 3 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit())
        })
    })
}

pub fn is_positive(value: &Value) -> bool {
    value.as_f64().is_some_and(|n| n > 0.0)
}
