/**
 * パラメータ正規化
 *
 * 概要:
 *   エージェントから届く生の引数（数値の文字列、JSON文字列化された配列、
 *   配列であるべき単一値など）を、宣言されたParamConfigの形に揃える。
 *
 * 主な仕様:
 *   - 未宣言のキーは即座に拒否する（閉じたスキーマ）
 *   - 各パラメータは 直接一致 → JSON文字列パース → 型変換 → 単一値の配列昇格
 *     → 最終検証 の順に試し、最初に成功したものを採用する
 *   - 配列は要素ごとに検証し、不正な要素は除外する。全要素が除外された場合はエラー
 *   - null は未指定として扱う
 */
use std::collections::BTreeMap;

use serde_json::{json, Map, Number, Value};

use super::error::NormalizeError;

/// 単一値に適用するカスタム検証関数
pub type Validator = fn(&Value) -> bool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    String,
    Number,
    Boolean,
}

impl ScalarType {
    pub fn name(self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Number => "number",
            ScalarType::Boolean => "boolean",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            ScalarType::String => value.is_string(),
            ScalarType::Number => value.as_f64().is_some_and(f64::is_finite),
            ScalarType::Boolean => value.is_boolean(),
        }
    }

    /// 型変換。数値・真偽値は文字列から、文字列は有限の数値・真偽値から
    fn coerce(self, value: &Value) -> Option<Value> {
        match self {
            ScalarType::String => match value {
                Value::Number(n) if n.as_f64().is_some_and(f64::is_finite) => Some(Value::String(n.to_string())),
                Value::Bool(b) => Some(Value::String(b.to_string())),
                _ => None,
            },
            ScalarType::Number => parse_number(value.as_str()?.trim()),
            ScalarType::Boolean => parse_bool(value.as_str()?).map(Value::Bool),
        }
    }
}

/// 期待する型。配列の場合は要素型を必ず持つ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedType {
    Scalar(ScalarType),
    Array(ScalarType),
}

impl ExpectedType {
    fn describe(self) -> String {
        match self {
            ExpectedType::Scalar(t) => t.name().to_string(),
            ExpectedType::Array(t) => format!("array of {}", t.name()),
        }
    }
}

/**
 * パラメータ宣言
 *
 * allow_single:
 *   Some(true)  単一値を1要素配列に昇格する
 *   Some(false) 配列専用。バルク展開せず配列のまま各アイテムへコピーする
 *   None        未指定（昇格しないが展開対象にはなる）
 */
#[derive(Debug, Clone)]
pub struct ParamConfig {
    pub expected: ExpectedType,
    pub allow_single: Option<bool>,
    pub validator: Option<Validator>,
    pub choices: Option<&'static [&'static str]>,
    pub required: bool,
    pub description: &'static str,
}

impl ParamConfig {
    fn new(expected: ExpectedType) -> Self {
        Self {
            expected,
            allow_single: None,
            validator: None,
            choices: None,
            required: false,
            description: "",
        }
    }

    pub fn string() -> Self {
        Self::new(ExpectedType::Scalar(ScalarType::String))
    }

    pub fn number() -> Self {
        Self::new(ExpectedType::Scalar(ScalarType::Number))
    }

    pub fn boolean() -> Self {
        Self::new(ExpectedType::Scalar(ScalarType::Boolean))
    }

    pub fn array(item: ScalarType) -> Self {
        Self::new(ExpectedType::Array(item))
    }

    pub fn allow_single(mut self, allow: bool) -> Self {
        self.allow_single = Some(allow);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn one_of(mut self, choices: &'static [&'static str]) -> Self {
        self.choices = Some(choices);
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// バルク展開の対象外（配列のままコピー）かどうか
    pub fn is_array_only(&self) -> bool {
        matches!(self.expected, ExpectedType::Array(_)) && self.allow_single == Some(false)
    }

    fn accepts(&self, value: &Value) -> bool {
        if let Some(choices) = self.choices {
            if !value.as_str().is_some_and(|s| choices.contains(&s)) {
                return false;
            }
        }
        self.validator.map_or(true, |validate| validate(value))
    }

    /// 要素1つを要素型へ揃える（直接一致、だめなら文字列からの変換）
    fn coerce_element(&self, item: ScalarType, value: &Value) -> Option<Value> {
        let candidate = if item.matches(value) {
            value.clone()
        } else {
            item.coerce(value)?
        };
        self.accepts(&candidate).then_some(candidate)
    }
}

/// ツールごとのパラメータ宣言一覧
#[derive(Debug, Clone, Default)]
pub struct ParamSchema {
    params: BTreeMap<&'static str, ParamConfig>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: &'static str, config: ParamConfig) -> Self {
        self.params.insert(name, config);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamConfig> {
        self.params.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.params.keys().copied()
    }

    /// tools/list 用の JSON Schema を生成する
    pub fn to_input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for (name, config) in &self.params {
            let mut schema = match config.expected {
                ExpectedType::Scalar(t) => item_schema(t, config.choices),
                ExpectedType::Array(t) => {
                    let item = item_schema(t, config.choices);
                    let array = json!({ "type": "array", "items": item.clone() });
                    if config.allow_single == Some(true) {
                        json!({ "oneOf": [item, array] })
                    } else {
                        array
                    }
                }
            };
            if !config.description.is_empty() {
                schema["description"] = Value::String(config.description.to_string());
            }
            properties.insert((*name).to_string(), schema);
            if config.required {
                required.push(Value::String((*name).to_string()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        })
    }
}

fn item_schema(item: ScalarType, choices: Option<&'static [&'static str]>) -> Value {
    match choices {
        Some(choices) => json!({ "type": item.name(), "enum": choices }),
        None => json!({ "type": item.name() }),
    }
}

/**
 * 生の引数を正規化する
 *
 * 引数:
 *   raw: ツール呼び出しの arguments
 *   schema: パラメータ宣言
 *
 * 戻り値:
 *   Result<Map<String, Value>> - 宣言済みパラメータのみを含む正規化済み引数
 *
 * エラー:
 *   未知パラメータ、必須パラメータ欠落、どのフェーズでも変換できない値
 */
pub fn normalize(
    raw: &Map<String, Value>,
    schema: &ParamSchema,
) -> Result<Map<String, Value>, NormalizeError> {
    let mut unknown: Vec<String> = raw
        .keys()
        .filter(|key| schema.get(key).is_none())
        .cloned()
        .collect();
    if !unknown.is_empty() {
        unknown.sort();
        return Err(NormalizeError::UnknownParameters {
            unknown,
            allowed: schema.names().map(str::to_string).collect(),
        });
    }

    let mut normalized = Map::new();
    for (name, config) in &schema.params {
        match raw.get(*name) {
            None | Some(Value::Null) => {
                if config.required {
                    return Err(NormalizeError::MissingParameter {
                        name: (*name).to_string(),
                    });
                }
            }
            Some(value) => {
                let value = normalize_value(name, value, config)?;
                normalized.insert((*name).to_string(), value);
            }
        }
    }
    Ok(normalized)
}

fn normalize_value(name: &str, value: &Value, config: &ParamConfig) -> Result<Value, NormalizeError> {
    // 1. 直接一致
    if let Some(found) = direct_match(name, value, config)? {
        return Ok(found);
    }

    // 2. JSON文字列のパース
    if let Some(parsed) = parse_json_string(value) {
        if let Some(found) = direct_match(name, &parsed, config)? {
            return Ok(found);
        }
    }

    match config.expected {
        // 3. 型変換
        ExpectedType::Scalar(t) => {
            if let Some(coerced) = t.coerce(value) {
                if config.accepts(&coerced) {
                    return Ok(coerced);
                }
            }
        }
        // 4. 単一値の配列昇格
        ExpectedType::Array(item) => {
            if config.allow_single == Some(true) && !value.is_array() && !value.is_object() {
                if let Some(element) = config.coerce_element(item, value) {
                    return Ok(Value::Array(vec![element]));
                }
            }
        }
    }

    // 5. 最終検証
    Err(NormalizeError::InvalidParameter {
        name: name.to_string(),
        expected: config.expected.describe(),
        received: describe_received(value),
    })
}

fn direct_match(name: &str, value: &Value, config: &ParamConfig) -> Result<Option<Value>, NormalizeError> {
    match config.expected {
        ExpectedType::Scalar(t) => Ok((t.matches(value) && config.accepts(value)).then(|| value.clone())),
        ExpectedType::Array(item) => {
            let Some(elements) = value.as_array() else {
                return Ok(None);
            };
            let kept: Vec<Value> = elements
                .iter()
                .filter_map(|element| config.coerce_element(item, element))
                .collect();
            if kept.is_empty() {
                return Err(NormalizeError::EmptyArray {
                    name: name.to_string(),
                    item: item.name().to_string(),
                });
            }
            if kept.len() < elements.len() {
                tracing::debug!(
                    parameter = %name,
                    dropped = elements.len() - kept.len(),
                    "不正な配列要素を除外しました"
                );
            }
            Ok(Some(Value::Array(kept)))
        }
    }
}

fn parse_json_string(value: &Value) -> Option<Value> {
    let text = value.as_str()?.trim();
    let bracketed = (text.starts_with('[') && text.ends_with(']'))
        || (text.starts_with('{') && text.ends_with('}'));
    if !bracketed {
        return None;
    }
    serde_json::from_str(text).ok()
}

fn parse_number(text: &str) -> Option<Value> {
    if text.is_empty() {
        return None;
    }
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }
    let float = text.parse::<f64>().ok().filter(|f| f.is_finite())?;
    Number::from_f64(float).map(Value::Number)
}

/// 真偽値の固定語彙（大文字小文字は区別しない）
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn describe_received(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() > 60 {
        let head: String = text.chars().take(57).collect();
        format!("{head}...")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn node_schema() -> ParamSchema {
        ParamSchema::new()
            .param(
                "nodeId",
                ParamConfig::array(ScalarType::String).allow_single(true),
            )
            .param("width", ParamConfig::number())
            .param("visible", ParamConfig::boolean())
            .param("x", ParamConfig::array(ScalarType::Number).allow_single(true))
    }

    #[test]
    fn promotes_single_string_to_array() {
        let out = normalize(&args(json!({ "nodeId": "abc" })), &node_schema()).unwrap();
        assert_eq!(out["nodeId"], json!(["abc"]));
    }

    #[test]
    fn already_normalized_values_are_unchanged() {
        let input = args(json!({ "nodeId": ["a", "b"], "width": 12.5, "visible": false }));
        let out = normalize(&input, &node_schema()).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn parses_json_encoded_arrays() {
        let out = normalize(&args(json!({ "x": "[1, 2, 3]" })), &node_schema()).unwrap();
        assert_eq!(out["x"], json!([1, 2, 3]));
    }

    #[test]
    fn coerces_numeric_and_boolean_strings() {
        let out = normalize(
            &args(json!({ "width": " 42 ", "visible": "YES" })),
            &node_schema(),
        )
        .unwrap();
        assert_eq!(out["width"], json!(42));
        assert_eq!(out["visible"], json!(true));

        let out = normalize(&args(json!({ "width": "1.5", "visible": "off" })), &node_schema()).unwrap();
        assert_eq!(out["width"], json!(1.5));
        assert_eq!(out["visible"], json!(false));
    }

    #[test]
    fn stringifies_numbers_and_booleans_for_string_params() {
        let schema = ParamSchema::new()
            .param("label", ParamConfig::string())
            .param("value", ParamConfig::array(ScalarType::String).allow_single(true));
        let out = normalize(&args(json!({ "label": 3, "value": 8 })), &schema).unwrap();
        assert_eq!(out["label"], json!("3"));
        assert_eq!(out["value"], json!(["8"]));

        let out = normalize(&args(json!({ "value": [true, 1.5, "x", {}] })), &schema).unwrap();
        assert_eq!(out["value"], json!(["true", "1.5", "x"]));
    }

    #[test]
    fn json_encoded_object_string_is_not_an_array() {
        let err = normalize(&args(json!({ "x": "{\"a\": 1}" })), &node_schema()).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::InvalidParameter {
                name: "x".into(),
                expected: "array of number".into(),
                received: "\"{\\\"a\\\": 1}\"".into(),
            }
        );

        // 文字列の配列なら元の文字列のまま1要素に昇格する
        let out = normalize(&args(json!({ "nodeId": "{\"id\": \"1:2\"}" })), &node_schema()).unwrap();
        assert_eq!(out["nodeId"], json!(["{\"id\": \"1:2\"}"]));
    }

    #[test]
    fn rejects_non_finite_and_unknown_vocabulary() {
        let err = normalize(&args(json!({ "width": "Infinity" })), &node_schema()).unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidParameter { ref name, .. } if name == "width"));

        let err = normalize(&args(json!({ "visible": "maybe" })), &node_schema()).unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidParameter { ref name, .. } if name == "visible"));
    }

    #[test]
    fn drops_invalid_elements_but_keeps_valid_ones() {
        let out = normalize(&args(json!({ "x": [1, "two", "3", null] })), &node_schema()).unwrap();
        assert_eq!(out["x"], json!([1, 3]));
    }

    #[test]
    fn array_with_no_valid_elements_is_an_error() {
        let err = normalize(&args(json!({ "x": ["a", "b"] })), &node_schema()).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::EmptyArray {
                name: "x".into(),
                item: "number".into()
            }
        );
    }

    #[test]
    fn unknown_parameters_are_rejected_with_allowed_list() {
        let schema = ParamSchema::new().param("bar", ParamConfig::string());
        let err = normalize(&args(json!({ "foo": 1 })), &schema).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::UnknownParameters {
                unknown: vec!["foo".into()],
                allowed: vec!["bar".into()],
            }
        );
    }

    #[test]
    fn missing_required_parameter() {
        let schema = ParamSchema::new().param("operation", ParamConfig::string().required());
        let err = normalize(&Map::new(), &schema).unwrap_err();
        assert_eq!(err, NormalizeError::MissingParameter { name: "operation".into() });

        let err = normalize(&args(json!({ "operation": null })), &schema).unwrap_err();
        assert_eq!(err, NormalizeError::MissingParameter { name: "operation".into() });
    }

    #[test]
    fn scalar_is_rejected_without_allow_single() {
        let schema = ParamSchema::new().param("ids", ParamConfig::array(ScalarType::String));
        let err = normalize(&args(json!({ "ids": "abc" })), &schema).unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidParameter { .. }));
    }

    #[test]
    fn validator_and_choices_apply_after_coercion() {
        fn positive(v: &Value) -> bool {
            v.as_f64().is_some_and(|n| n > 0.0)
        }
        let schema = ParamSchema::new()
            .param("size", ParamConfig::number().validator(positive))
            .param("mode", ParamConfig::string().one_of(&["fast", "slow"]));

        assert!(normalize(&args(json!({ "size": "-3" })), &schema).is_err());
        assert_eq!(normalize(&args(json!({ "size": "3" })), &schema).unwrap()["size"], json!(3));
        assert!(normalize(&args(json!({ "mode": "medium" })), &schema).is_err());
        assert!(normalize(&args(json!({ "mode": "slow" })), &schema).is_ok());
    }

    #[test]
    fn input_schema_marks_promotable_arrays() {
        let schema = node_schema().to_input_schema();
        assert!(schema["properties"]["nodeId"]["oneOf"].is_array());
        assert_eq!(schema["properties"]["width"]["type"], "number");
        assert_eq!(schema["additionalProperties"], false);
    }

    #[test]
    fn bool_vocabulary() {
        for t in ["true", "1", "yes", "ON"] {
            assert_eq!(parse_bool(t), Some(true));
        }
        for f in ["FALSE", "0", "no", "off"] {
            assert_eq!(parse_bool(f), Some(false));
        }
        assert_eq!(parse_bool("y"), None);
    }
}
