/**
 * バルク操作ディスパッチ
 *
 * 概要:
 *   1回のツール呼び出しでスカラー値・配列値のどちらも受け付け、
 *   配列の場合は複数の独立した操作に展開して順番に実行する。
 *
 * 処理の流れ:
 *   生の引数 → normalize → is_bulk
 *     単一: 1件に展開 → 検証 → 実行（失敗は呼び出しエラー）
 *     バルク: expand → execute_bulk（失敗はアイテムごとに記録）
 *
 * 主な仕様:
 *   - failFast は制御パラメータとして取り除き、アイテムには渡さない
 *   - バルク件数が上限を超える場合はディスパッチ前にエラー
 */
pub mod error;
pub mod execute;
pub mod expand;
pub mod normalize;
pub mod response;

use std::future::Future;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

pub use error::NormalizeError;
pub use execute::{execute_bulk, BulkItemResult, BulkOptions};
pub use expand::{expand, expand_to, is_bulk, target_length, OperationItem};
pub use normalize::{normalize, ParamConfig, ParamSchema, ScalarType};
pub use response::{parameter_warnings, ToolReply};

/// 全ツール共通の制御パラメータ
pub const FAIL_FAST: &str = "failFast";
pub const OPERATION: &str = "operation";

/**
 * 1ツール分のディスパッチ設定
 */
#[derive(Debug, Clone)]
pub struct DispatchPlan<'a> {
    pub schema: &'a ParamSchema,
    pub bulk_params: &'a [&'static str],
    pub max_items: usize,
    pub default_fail_fast: bool,
}

/**
 * ディスパッチ結果
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Dispatched {
    Single(Value),
    Bulk(Vec<BulkItemResult>),
}

impl Dispatched {
    pub fn into_reply(self) -> anyhow::Result<ToolReply> {
        ToolReply::payload(&self)
    }
}

/**
 * 生の引数を検証し、単一またはバルクとして実行する
 *
 * 引数:
 *   raw: ツール呼び出しの arguments
 *   plan: パラメータ宣言とバルク設定
 *   parse: アイテムを型付きパラメータへ変換する（検証）
 *   op: 型付きパラメータを受け取る非同期操作
 *
 * 戻り値:
 *   Result<Dispatched> - 単一結果またはアイテムごとの結果列
 *
 * エラー:
 *   NormalizeError（設定エラー）、単一実行時の検証・実行エラー
 */
pub async fn dispatch<T, P, F, Fut>(
    raw: &Map<String, Value>,
    plan: &DispatchPlan<'_>,
    parse: P,
    mut op: F,
) -> anyhow::Result<Dispatched>
where
    P: Fn(&OperationItem) -> anyhow::Result<T>,
    F: FnMut(T, usize) -> Fut,
    Fut: Future<Output = anyhow::Result<Value>>,
{
    let mut args = normalize(raw, plan.schema)?;

    let fail_fast = args
        .remove(FAIL_FAST)
        .and_then(|v| v.as_bool())
        .unwrap_or(plan.default_fail_fast);
    let operation = args.get(OPERATION).and_then(Value::as_str).map(str::to_string);

    let eligible: Vec<&str> = plan
        .bulk_params
        .iter()
        .copied()
        .filter(|name| !plan.schema.get(name).is_some_and(ParamConfig::is_array_only))
        .collect();

    if !is_bulk(&args, &eligible) {
        debug!(operation = ?operation, "単一操作として実行します");
        let item = expand_to(&args, &eligible, 1)
            .pop()
            .unwrap_or_default();
        let params = parse(&item).map_err(|e| NormalizeError::InvalidOperation {
            message: format!("{e:#}"),
        })?;
        return Ok(Dispatched::Single(op(params, 0).await?));
    }

    let target = target_length(&args, &eligible);
    if target > plan.max_items {
        return Err(NormalizeError::TooManyItems {
            requested: target,
            limit: plan.max_items,
        }
        .into());
    }

    debug!(operation = ?operation, items = target, fail_fast, "バルク操作として実行します");
    let items = expand(&args, &eligible, plan.schema);
    let options = BulkOptions { operation, fail_fast };
    let results = execute_bulk(items, parse, op, &options).await;
    let failed = results.iter().filter(|result| result.is_failure()).count();
    debug!(completed = results.len(), failed, "バルク操作が終了しました");
    Ok(Dispatched::Bulk(results))
}
