/**
 * レスポンス整形
 *
 * 概要:
 *   単一結果またはバルク結果を MCP の tools/call 返却形式
 *   （content配列 + isError）に包む。
 *
 * 主な仕様:
 *   - ペイロードはインデント付きJSONのテキストブロック
 *   - 操作に関係ないパラメータの警告は2つ目のテキストブロックとして付ける
 *   - バルクの部分失敗でも isError は false（各アイテムの error キーで判断する）
 */
use serde::Serialize;
use serde_json::{Map, Value};

/**
 * テキストコンテンツ
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl TextContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text",
            text: text.into(),
        }
    }
}

/**
 * tools/call の返却値
 */
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolReply {
    pub content: Vec<TextContent>,
    pub is_error: bool,
}

impl ToolReply {
    /// ペイロードを整形済みJSONで包む
    pub fn payload<T: Serialize>(payload: &T) -> anyhow::Result<Self> {
        let text = serde_json::to_string_pretty(payload)?;
        Ok(Self {
            content: vec![TextContent::text(text)],
            is_error: false,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![TextContent::text(message)],
            is_error: true,
        }
    }

    pub fn with_warnings(mut self, warnings: &[String]) -> Self {
        if !warnings.is_empty() {
            let lines: Vec<String> = warnings.iter().map(|w| format!("- {w}")).collect();
            self.content
                .push(TextContent::text(format!("Warnings:\n{}", lines.join("\n"))));
        }
        self
    }
}

/**
 * 操作に関係ないパラメータを警告として列挙する
 *
 * 引数:
 *   args: 呼び出しの引数
 *   operation: 選択された操作
 *   allowed: その操作で使うパラメータ
 *   common: すべての操作で許可されるパラメータ（operation、failFastなど）
 */
pub fn parameter_warnings(
    args: &Map<String, Value>,
    operation: &str,
    allowed: &[&str],
    common: &[&str],
) -> Vec<String> {
    args.keys()
        .filter(|key| !allowed.contains(&key.as_str()) && !common.contains(&key.as_str()))
        .map(|key| format!("Parameter '{key}' is not used by operation '{operation}'"))
        .collect()
}
