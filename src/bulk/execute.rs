/**
 * バルク実行
 *
 * 概要:
 *   展開済みアイテムを1件ずつ順番に検証・実行し、結果を入力順に集める。
 *
 * 主な仕様:
 *   - 並列実行はしない。アイテム i+1 は i の完了後に開始する
 *   - 検証失敗と実行失敗は同じくエラーレコードとして記録する
 *   - エラーレコードには1始まりのindexと識別用コンテキストを付ける
 *   - fail_fast の場合は最初の失敗で打ち切る（失敗アイテムまでを返す）
 */
use std::future::Future;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::expand::OperationItem;

/// エラーレコードに付ける識別フィールドの優先順
pub const CONTEXT_FIELDS: [&str; 6] = [
    "nodeId",
    "operation",
    "componentId",
    "styleId",
    "variableId",
    "collectionId",
];

#[derive(Debug, Clone, Default)]
pub struct BulkOptions {
    pub operation: Option<String>,
    pub fail_fast: bool,
}

/**
 * 1アイテム分の失敗記録
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkItemError {
    pub error: String,
    /// 1始まりの位置
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(flatten)]
    pub context: Map<String, Value>,
}

/**
 * 1アイテム分の結果。成功時はペイロードをそのまま展開して出力する
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BulkItemResult {
    Success(Value),
    Failure(BulkItemError),
}

impl BulkItemResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, BulkItemResult::Failure(_))
    }
}

/// 失敗記録を作る。識別フィールドが operation の場合は operation 欄に入れる
fn failure_record(item: &OperationItem, index: usize, error: &anyhow::Error, options: &BulkOptions) -> BulkItemError {
    let mut operation = options.operation.clone();
    let mut context = Map::new();

    let found = CONTEXT_FIELDS
        .iter()
        .find_map(|field| item.get(*field).map(|value| (*field, value)));
    if let Some((field, value)) = found {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if field == "operation" {
            operation.get_or_insert(text);
        } else {
            context.insert(field.to_string(), Value::String(text));
        }
    }

    BulkItemError {
        error: format!("Error: {error:#}"),
        index: index + 1,
        operation,
        context,
    }
}

/**
 * アイテム列を順番に実行する
 *
 * 引数:
 *   items: 展開済みアイテム
 *   parse: アイテムの検証（型付きパラメータへの変換）
 *   op: アイテムごとの非同期操作。引数は検証済みパラメータと0始まりのindex
 *   options: 操作名とfail_fast
 *
 * 戻り値:
 *   Vec<BulkItemResult> - 入力順。fail_fast時は失敗アイテムまで
 */
pub async fn execute_bulk<T, P, F, Fut>(
    items: Vec<OperationItem>,
    parse: P,
    mut op: F,
    options: &BulkOptions,
) -> Vec<BulkItemResult>
where
    P: Fn(&OperationItem) -> anyhow::Result<T>,
    F: FnMut(T, usize) -> Fut,
    Fut: Future<Output = anyhow::Result<Value>>,
{
    let total = items.len();
    let mut results = Vec::with_capacity(total);

    for (index, item) in items.iter().enumerate() {
        let outcome = match parse(item) {
            Ok(params) => op(params, index).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(payload) => {
                debug!(index = index + 1, total, "バルクアイテム成功");
                results.push(BulkItemResult::Success(payload));
            }
            Err(e) => {
                let record = failure_record(item, index, &e, options);
                warn!(
                    index = record.index,
                    total,
                    operation = ?record.operation,
                    error = %record.error,
                    "バルクアイテム失敗"
                );
                results.push(BulkItemResult::Failure(record));
                if options.fail_fast {
                    debug!(completed = index + 1, total, "fail_fastにより中断しました");
                    break;
                }
            }
        }
    }

    results
}
