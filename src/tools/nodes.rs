/**
 * ノード操作ツール（figma_nodes）
 *
 * 概要:
 *   矩形・楕円・フレームの作成、位置やサイズの更新、削除、取得を行う。
 *   nodeId や x/y/width/height などは配列で渡すとバルク操作になる。
 *
 * 主な仕様:
 *   - operation ごとに型付きパラメータ（NodeOperation）へ変換して検証する
 *   - update は変更項目が1つ以上必要
 *   - 幅・高さは正の数のみ
 */
use anyhow::{bail, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{finish, is_hex_color, is_positive, parse_item, ToolContext};
use crate::bulk::{self, ParamConfig, ParamSchema, ScalarType, ToolReply, FAIL_FAST, OPERATION};
use crate::plugin::{NodePatch, NodeSpec, NodeType, PluginRequest};

pub const NAME: &str = "figma_nodes";
pub const DESCRIPTION: &str = "Create, update, delete or inspect Figma nodes. Array values for nodeId, name, x, y, width, height, fillColor or parentId run one operation per element.";

const OPERATIONS: &[&str] = &[
    "create_rectangle",
    "create_ellipse",
    "create_frame",
    "update",
    "delete",
    "get",
];

const BULK_PARAMS: &[&str] = &["nodeId", "name", "x", "y", "width", "height", "fillColor", "parentId"];

pub fn schema() -> ParamSchema {
    ParamSchema::new()
        .param(
            OPERATION,
            ParamConfig::string()
                .required()
                .one_of(OPERATIONS)
                .describe("Operation to perform"),
        )
        .param(
            FAIL_FAST,
            ParamConfig::boolean().describe("Stop a bulk call at the first failing item"),
        )
        .param(
            "nodeId",
            ParamConfig::array(ScalarType::String)
                .allow_single(true)
                .describe("Target node id(s)"),
        )
        .param("name", ParamConfig::array(ScalarType::String).allow_single(true))
        .param("x", ParamConfig::array(ScalarType::Number).allow_single(true))
        .param("y", ParamConfig::array(ScalarType::Number).allow_single(true))
        .param(
            "width",
            ParamConfig::array(ScalarType::Number)
                .allow_single(true)
                .validator(is_positive),
        )
        .param(
            "height",
            ParamConfig::array(ScalarType::Number)
                .allow_single(true)
                .validator(is_positive),
        )
        .param(
            "fillColor",
            ParamConfig::array(ScalarType::String)
                .allow_single(true)
                .validator(is_hex_color)
                .describe("Solid fill as hex color, e.g. #FF0000"),
        )
        .param(
            "parentId",
            ParamConfig::array(ScalarType::String)
                .allow_single(true)
                .describe("Frame to create the node in"),
        )
}

fn allowed_params(operation: &str) -> &'static [&'static str] {
    match operation {
        "create_rectangle" | "create_ellipse" | "create_frame" => {
            &["name", "x", "y", "width", "height", "fillColor", "parentId"]
        }
        "update" => &["nodeId", "name", "x", "y", "width", "height"],
        "delete" | "get" => &["nodeId"],
        _ => &[],
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShape {
    pub name: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub fill_color: Option<String>,
    pub parent_id: Option<String>,
}

impl CreateShape {
    fn into_spec(self, node_type: NodeType) -> NodeSpec {
        NodeSpec {
            node_type,
            name: self.name,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            fill_color: self.fill_color,
            parent_id: self.parent_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNode {
    pub node_id: String,
    pub name: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRef {
    pub node_id: String,
}

/**
 * 1アイテム分のノード操作
 */
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum NodeOperation {
    CreateRectangle(CreateShape),
    CreateEllipse(CreateShape),
    CreateFrame(CreateShape),
    Update(UpdateNode),
    Delete(NodeRef),
    Get(NodeRef),
}

fn parse(item: &Map<String, Value>) -> Result<NodeOperation> {
    let operation: NodeOperation = parse_item(item)?;
    if let NodeOperation::Update(update) = &operation {
        let unchanged = update.name.is_none()
            && update.x.is_none()
            && update.y.is_none()
            && update.width.is_none()
            && update.height.is_none();
        if unchanged {
            bail!("update requires at least one of name, x, y, width, height");
        }
    }
    Ok(operation)
}

async fn run(ctx: &ToolContext, operation: NodeOperation) -> Result<Value> {
    let request = match operation {
        NodeOperation::CreateRectangle(shape) => PluginRequest::CreateNode(shape.into_spec(NodeType::Rectangle)),
        NodeOperation::CreateEllipse(shape) => PluginRequest::CreateNode(shape.into_spec(NodeType::Ellipse)),
        NodeOperation::CreateFrame(shape) => PluginRequest::CreateNode(shape.into_spec(NodeType::Frame)),
        NodeOperation::Update(update) => PluginRequest::UpdateNode(NodePatch {
            node_id: update.node_id,
            name: update.name,
            x: update.x,
            y: update.y,
            width: update.width,
            height: update.height,
        }),
        NodeOperation::Delete(node) => PluginRequest::DeleteNode { node_id: node.node_id },
        NodeOperation::Get(node) => PluginRequest::GetNode { node_id: node.node_id },
    };
    ctx.send(request).await
}

/**
 * figma_nodes を実行
 *
 * 引数:
 *   ctx: プラグイン接続と設定
 *   args: ツール呼び出しの arguments
 *
 * 戻り値:
 *   Result<ToolReply> - 単一結果、またはアイテムごとの結果列
 */
pub async fn call(ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolReply> {
    debug!(function = "figma_nodes", "ノード操作を実行します");
    let schema = schema();
    let dispatched = bulk::dispatch(args, &ctx.plan(&schema, BULK_PARAMS), parse, |operation, _| {
        run(ctx, operation)
    })
    .await?;
    finish(args, dispatched, allowed_params)
}
