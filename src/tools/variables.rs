/**
 * 変数ツール（figma_variables）
 *
 * 概要:
 *   デザイン変数の作成と、ノードのプロパティへのバインド／解除を行う。
 *
 * 主な仕様:
 *   - バインド可否は BINDING_RULES（ノード種別 × 変数型 → プロパティ）で判定する
 *   - value は文字列で受け取り、variableType に応じて変換する
 *     （COLOR: #RRGGBB、FLOAT: 数値、BOOLEAN: true/false、STRING: そのまま）
 *   - nodeId / variableId / property / name / value を配列で渡すとバルク操作になる
 */
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{finish, is_hex_color, parse_item, ToolContext};
use crate::bulk::normalize::parse_bool;
use crate::bulk::{self, ParamConfig, ParamSchema, ScalarType, ToolReply, FAIL_FAST, OPERATION};
use crate::plugin::{NodeType, PluginRequest, VariableSpec, VariableType};

pub const NAME: &str = "figma_variables";
pub const DESCRIPTION: &str = "Create design variables and bind or unbind them on node properties. Arrays of nodeId, variableId, property, name or value run one operation per element.";

const OPERATIONS: &[&str] = &["create", "bind", "unbind"];
const VARIABLE_TYPES: &[&str] = &["COLOR", "FLOAT", "STRING", "BOOLEAN"];
const BULK_PARAMS: &[&str] = &["nodeId", "variableId", "property", "name", "value"];

const SHAPE_COLOR: &[&str] = &["fills", "strokes"];
const VISIBILITY: &[&str] = &["visible"];

/// ノード種別 × 変数型 ごとのバインド可能なプロパティ
pub const BINDING_RULES: &[(NodeType, VariableType, &[&str])] = &[
    (NodeType::Rectangle, VariableType::Color, SHAPE_COLOR),
    (
        NodeType::Rectangle,
        VariableType::Float,
        &["width", "height", "opacity", "cornerRadius", "strokeWeight"],
    ),
    (NodeType::Rectangle, VariableType::Boolean, VISIBILITY),
    (NodeType::Ellipse, VariableType::Color, SHAPE_COLOR),
    (
        NodeType::Ellipse,
        VariableType::Float,
        &["width", "height", "opacity", "strokeWeight"],
    ),
    (NodeType::Ellipse, VariableType::Boolean, VISIBILITY),
    (NodeType::Frame, VariableType::Color, SHAPE_COLOR),
    (
        NodeType::Frame,
        VariableType::Float,
        &[
            "width",
            "height",
            "opacity",
            "cornerRadius",
            "strokeWeight",
            "itemSpacing",
            "paddingLeft",
            "paddingRight",
            "paddingTop",
            "paddingBottom",
        ],
    ),
    (NodeType::Frame, VariableType::Boolean, VISIBILITY),
    (NodeType::Text, VariableType::Color, &["fills"]),
    (
        NodeType::Text,
        VariableType::Float,
        &["fontSize", "letterSpacing", "lineHeight", "opacity"],
    ),
    (
        NodeType::Text,
        VariableType::String,
        &["characters", "fontFamily", "fontStyle"],
    ),
    (NodeType::Text, VariableType::Boolean, VISIBILITY),
];

pub fn bindable_properties(node_type: NodeType, variable_type: VariableType) -> &'static [&'static str] {
    BINDING_RULES
        .iter()
        .find(|(n, v, _)| *n == node_type && *v == variable_type)
        .map(|(_, _, properties)| *properties)
        .unwrap_or(&[])
}

pub fn can_bind(node_type: NodeType, variable_type: VariableType, property: &str) -> bool {
    bindable_properties(node_type, variable_type).contains(&property)
}

pub fn schema() -> ParamSchema {
    ParamSchema::new()
        .param(OPERATION, ParamConfig::string().required().one_of(OPERATIONS))
        .param(FAIL_FAST, ParamConfig::boolean())
        .param("nodeId", ParamConfig::array(ScalarType::String).allow_single(true))
        .param("variableId", ParamConfig::array(ScalarType::String).allow_single(true))
        .param(
            "property",
            ParamConfig::array(ScalarType::String)
                .allow_single(true)
                .describe("Node property, e.g. fills, width, visible"),
        )
        .param("name", ParamConfig::array(ScalarType::String).allow_single(true))
        .param(
            "value",
            ParamConfig::array(ScalarType::String)
                .allow_single(true)
                .describe("Initial value (text, number or boolean), interpreted by variableType"),
        )
        .param("collectionId", ParamConfig::string())
        .param(
            "variableType",
            ParamConfig::string().one_of(VARIABLE_TYPES),
        )
}

fn allowed_params(operation: &str) -> &'static [&'static str] {
    match operation {
        "create" => &["name", "value", "collectionId", "variableType"],
        "bind" => &["nodeId", "variableId", "property"],
        "unbind" => &["nodeId", "property"],
        _ => &[],
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum VariableOperation {
    Create {
        name: String,
        collection_id: String,
        variable_type: VariableType,
        value: String,
    },
    Bind {
        node_id: String,
        variable_id: String,
        property: String,
    },
    Unbind {
        node_id: String,
        property: String,
    },
}

/// 文字列の値を変数型に合わせて変換する
fn typed_value(variable_type: VariableType, raw: &str) -> Result<Value> {
    let value = match variable_type {
        VariableType::Color => {
            let color = Value::String(raw.trim().to_ascii_uppercase());
            if !is_hex_color(&color) {
                bail!("'{raw}' is not a hex color");
            }
            color
        }
        VariableType::Float => {
            let number: f64 = raw.trim().parse().with_context(|| format!("'{raw}' is not a number"))?;
            serde_json::Number::from_f64(number)
                .map(Value::Number)
                .ok_or_else(|| anyhow!("'{raw}' is not a finite number"))?
        }
        VariableType::Boolean => {
            Value::Bool(parse_bool(raw).ok_or_else(|| anyhow!("'{raw}' is not a boolean"))?)
        }
        VariableType::String => Value::String(raw.to_string()),
    };
    Ok(value)
}

fn field<T: serde::de::DeserializeOwned>(record: &Value, key: &str) -> Result<T> {
    let value = record
        .get(key)
        .cloned()
        .ok_or_else(|| anyhow!("plugin reply has no '{key}'"))?;
    Ok(serde_json::from_value(value)?)
}

async fn run(ctx: &ToolContext, operation: VariableOperation) -> Result<Value> {
    match operation {
        VariableOperation::Create {
            name,
            collection_id,
            variable_type,
            value,
        } => {
            let value = typed_value(variable_type, &value)?;
            ctx.send(PluginRequest::CreateVariable(VariableSpec {
                name,
                collection_id,
                variable_type,
                value,
            }))
            .await
        }
        VariableOperation::Bind {
            node_id,
            variable_id,
            property,
        } => {
            let node = ctx.send(PluginRequest::GetNode { node_id: node_id.clone() }).await?;
            let variable = ctx
                .send(PluginRequest::GetVariable {
                    variable_id: variable_id.clone(),
                })
                .await?;
            let node_type: NodeType = field(&node, "type")?;
            let variable_type: VariableType = field(&variable, "resolvedType")?;

            if !can_bind(node_type, variable_type, &property) {
                let allowed = bindable_properties(node_type, variable_type);
                bail!(
                    "Cannot bind {variable_type:?} variable to '{property}' on {node_type:?} node. Bindable properties: {}",
                    if allowed.is_empty() { "none".to_string() } else { allowed.join(", ") }
                );
            }

            ctx.send(PluginRequest::BindVariable {
                node_id,
                variable_id,
                property,
            })
            .await
        }
        VariableOperation::Unbind { node_id, property } => {
            ctx.send(PluginRequest::UnbindVariable { node_id, property }).await
        }
    }
}

pub async fn call(ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolReply> {
    debug!(function = "figma_variables", "変数操作を実行します");
    let schema = schema();
    let dispatched = bulk::dispatch(
        args,
        &ctx.plan(&schema, BULK_PARAMS),
        parse_item::<VariableOperation>,
        |operation, _| run(ctx, operation),
    )
    .await?;
    finish(args, dispatched, allowed_params)
}
