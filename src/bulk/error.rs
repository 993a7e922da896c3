/**
 * バルク処理コアのエラー定義
 *
 * 概要:
 *   パラメータ正規化・バルク展開の段階で発生する設定エラーを表す。
 *   いずれもディスパッチ前に発生し、呼び出し全体を失敗させる。
 *
 * 主な仕様:
 *   - 未知パラメータは許可リストと一緒に報告する
 *   - パラメータ名を必ずメッセージに含める
 */
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NormalizeError {
    /// 宣言されていないパラメータが渡された
    #[error("Unknown parameter(s): {}. Valid parameters: {}", unknown.join(", "), allowed.join(", "))]
    UnknownParameters {
        unknown: Vec<String>,
        allowed: Vec<String>,
    },

    /// 必須パラメータがない
    #[error("Missing required parameter '{name}'")]
    MissingParameter { name: String },

    /// どの変換フェーズでも期待型にできなかった
    #[error("Invalid value for parameter '{name}': expected {expected}, received {received}")]
    InvalidParameter {
        name: String,
        expected: String,
        received: String,
    },

    /// 配列要素がすべて検証で除外された
    #[error("Parameter '{name}' has no valid {item} elements")]
    EmptyArray { name: String, item: String },

    /// 単一操作のアイテムが操作ごとの要件を満たさない
    #[error("{message}")]
    InvalidOperation { message: String },

    /// バルク件数が上限を超えた
    #[error("Bulk operation of {requested} items exceeds the limit of {limit}")]
    TooManyItems { requested: usize, limit: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_parameters_lists_both_sides() {
        let err = NormalizeError::UnknownParameters {
            unknown: vec!["foo".into()],
            allowed: vec!["bar".into(), "baz".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("foo"));
        assert!(msg.contains("bar, baz"));
    }

    #[test]
    fn invalid_parameter_names_the_parameter() {
        let err = NormalizeError::InvalidParameter {
            name: "width".into(),
            expected: "number".into(),
            received: "\"wide\"".into(),
        };
        assert!(err.to_string().contains("'width'"));
    }
}
