/**
 * サーバー設定
 *
 * 概要:
 *   環境変数から実行時設定を読み込む。main で一度だけ構築し、
 *   ToolContext 経由でハンドラーへ渡す。
 *
 * 主な仕様:
 *   - MCP_NAME: サーバー名（デフォルト: figma-mcp）
 *   - FIGMA_MCP_FAIL_FAST: failFast省略時のデフォルト（true/false/1/0/yes/no/on/off）
 *   - FIGMA_MCP_MAX_BULK_ITEMS: 1回のバルク呼び出しの最大件数（デフォルト: 100）
 *   - FIGMA_MCP_DOCUMENT: スタブプラグインのドキュメント名
 */
use thiserror::Error;

use crate::bulk::normalize::parse_bool;

pub const DEFAULT_SERVER_NAME: &str = "figma-mcp";
pub const DEFAULT_MAX_BULK_ITEMS: usize = 100;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("環境変数 {name} の値が不正です: {value}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub server_name: String,
    pub default_fail_fast: bool,
    pub max_bulk_items: usize,
    pub document_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_string(),
            default_fail_fast: false,
            max_bulk_items: DEFAULT_MAX_BULK_ITEMS,
            document_name: "Untitled".to_string(),
        }
    }
}

impl Settings {
    /**
     * 環境変数から設定を読み込む
     *
     * エラー:
     *   数値・真偽値として解釈できない値がある場合
     */
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の取得関数から読み込む（テスト用に環境変数を差し替えられる）
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Some(name) = lookup("MCP_NAME").filter(|s| !s.trim().is_empty()) {
            settings.server_name = name;
        }

        if let Some(raw) = lookup("FIGMA_MCP_FAIL_FAST") {
            settings.default_fail_fast = parse_bool(&raw).ok_or(ConfigError::InvalidValue {
                name: "FIGMA_MCP_FAIL_FAST",
                value: raw.clone(),
            })?;
        }

        if let Some(raw) = lookup("FIGMA_MCP_MAX_BULK_ITEMS") {
            settings.max_bulk_items = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: "FIGMA_MCP_MAX_BULK_ITEMS",
                    value: raw.clone(),
                })?;
        }

        if let Some(name) = lookup("FIGMA_MCP_DOCUMENT") {
            settings.document_name = name;
        }

        Ok(settings)
    }
}
