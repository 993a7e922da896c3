/**
 * バルク判定と展開
 *
 * 概要:
 *   正規化済み引数から、単一操作かバルク操作かを判定し、
 *   バルクの場合は展開対象パラメータを共通の長さ（target length）に揃えて
 *   アイテムごとの引数セットを作る。
 *
 * 主な仕様:
 *   - 長さ2以上の配列が1つでもあればバルク。1要素配列は単一扱い
 *   - target = max(1, 長さ2以上の配列の最大長)
 *   - スカラーと1要素配列は全位置にブロードキャスト
 *   - 長い配列は先頭targetで切り詰め、短い配列は循環させる
 *   - 配列専用パラメータ（allow_single == Some(false)）は配列のままコピー
 */
use serde_json::{Map, Value};

use super::normalize::ParamSchema;

/// 1アイテム分の引数セット
pub type OperationItem = Map<String, Value>;

fn bulk_len(value: &Value) -> Option<usize> {
    value.as_array().map(Vec::len).filter(|len| *len > 1)
}

/// 展開対象パラメータのいずれかが長さ2以上の配列ならtrue
pub fn is_bulk(args: &Map<String, Value>, eligible: &[&str]) -> bool {
    eligible
        .iter()
        .filter_map(|name| args.get(*name))
        .any(|value| bulk_len(value).is_some())
}

pub fn target_length(args: &Map<String, Value>, eligible: &[&str]) -> usize {
    eligible
        .iter()
        .filter_map(|name| args.get(*name))
        .filter_map(bulk_len)
        .max()
        .unwrap_or(1)
}

/// 位置 `index` の値を取り出す（ブロードキャスト／循環／切り詰め）
fn value_at(value: &Value, index: usize) -> Value {
    match value.as_array() {
        Some(items) if items.is_empty() => Value::Array(Vec::new()),
        Some(items) => items[index % items.len()].clone(),
        None => value.clone(),
    }
}

/**
 * 引数をアイテム列に展開する
 *
 * 引数:
 *   args: 正規化済み引数
 *   eligible: バルク展開対象のパラメータ名
 *   schema: 配列専用パラメータの判定に使う
 *
 * 戻り値:
 *   Vec<OperationItem> - 長さは target_length と一致する
 */
pub fn expand(args: &Map<String, Value>, eligible: &[&str], schema: &ParamSchema) -> Vec<OperationItem> {
    let expandable: Vec<&str> = eligible
        .iter()
        .copied()
        .filter(|name| !schema.get(name).is_some_and(|c| c.is_array_only()))
        .collect();
    let target = target_length(args, &expandable);
    expand_to(args, &expandable, target)
}

/// 指定した長さに展開する。`eligible` は配列専用パラメータを含まないこと
pub fn expand_to(args: &Map<String, Value>, eligible: &[&str], target: usize) -> Vec<OperationItem> {
    (0..target)
        .map(|index| {
            args.iter()
                .map(|(key, value)| {
                    let value = if eligible.contains(&key.as_str()) {
                        // index < target なので長い配列は先頭targetで切り詰められる
                        value_at(value, index)
                    } else {
                        value.clone()
                    };
                    (key.clone(), value)
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::normalize::{ParamConfig, ScalarType};
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn column(items: &[OperationItem], key: &str) -> Vec<Value> {
        items.iter().map(|item| item[key].clone()).collect()
    }

    #[test]
    fn single_element_array_is_not_bulk() {
        let a = args(json!({ "nodeId": ["abc"] }));
        assert!(!is_bulk(&a, &["nodeId"]));
        assert_eq!(target_length(&a, &["nodeId"]), 1);
    }

    #[test]
    fn only_eligible_parameters_drive_detection() {
        let a = args(json!({ "nodeId": "a", "tags": ["x", "y"] }));
        assert!(!is_bulk(&a, &["nodeId"]));
        assert!(is_bulk(&a, &["nodeId", "tags"]));
    }

    #[test]
    fn shorter_arrays_cycle_to_target() {
        let a = args(json!({ "color": ["#F00", "#0F0", "#00F"], "nodeId": ["a", "b"] }));
        let items = expand(&a, &["color", "nodeId"], &ParamSchema::new());
        assert_eq!(items.len(), 3);
        assert_eq!(column(&items, "nodeId"), vec![json!("a"), json!("b"), json!("a")]);
        assert_eq!(column(&items, "color"), vec![json!("#F00"), json!("#0F0"), json!("#00F")]);
    }

    #[test]
    fn cyclic_expansion_law() {
        let source = json!([10, 20, 30]);
        let a = args(json!({ "x": source.clone(), "y": [1, 2, 3, 4, 5, 6, 7] }));
        let items = expand(&a, &["x", "y"], &ParamSchema::new());
        let xs = column(&items, "x");
        assert_eq!(xs.len(), 7);
        for (i, x) in xs.iter().enumerate() {
            assert_eq!(x, &source[i % 3]);
        }
    }

    #[test]
    fn scalars_and_singletons_broadcast() {
        let a = args(json!({ "nodeId": ["a", "b", "c"], "width": 100, "height": [50], "operation": "update" }));
        let items = expand(&a, &["nodeId", "width", "height"], &ParamSchema::new());
        assert_eq!(column(&items, "width"), vec![json!(100); 3]);
        assert_eq!(column(&items, "height"), vec![json!(50); 3]);
        assert_eq!(column(&items, "operation"), vec![json!("update"); 3]);
    }

    #[test]
    fn single_path_unwraps_promoted_arrays() {
        let a = args(json!({ "nodeId": ["abc"], "x": 5 }));
        let items = expand(&a, &["nodeId", "x"], &ParamSchema::new());
        assert_eq!(items, vec![args(json!({ "nodeId": "abc", "x": 5 }))]);
    }

    #[test]
    fn array_only_parameters_are_copied_verbatim() {
        let schema = ParamSchema::new()
            .param("nodeId", ParamConfig::array(ScalarType::String).allow_single(true))
            .param("stops", ParamConfig::array(ScalarType::Number).allow_single(false));
        let a = args(json!({ "nodeId": ["a", "b"], "stops": [0, 0.5, 1] }));
        let items = expand(&a, &["nodeId", "stops"], &schema);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item["stops"] == json!([0, 0.5, 1])));
    }

    #[test]
    fn longer_arrays_truncate_to_target() {
        let a = args(json!({ "x": [1, 2, 3, 4, 5], "y": [7, 8] }));
        let items = expand_to(&a, &["x", "y"], 3);
        assert_eq!(column(&items, "x"), vec![json!(1), json!(2), json!(3)]);
        assert_eq!(column(&items, "y"), vec![json!(7), json!(8), json!(7)]);
    }

    #[test]
    fn expanded_lengths_agree() {
        let a = args(json!({ "a": [1, 2], "b": [1, 2, 3, 4], "c": [1, 2, 3, 4, 5] }));
        let items = expand(&a, &["a", "b"], &ParamSchema::new());
        assert_eq!(items.len(), 4);
        // c は展開対象外なので配列のまま
        assert!(items.iter().all(|item| item["c"] == json!([1, 2, 3, 4, 5])));
    }
}
