/**
 * 塗りつぶしツール（figma_fills）
 *
 * 概要:
 *   ノードの塗りを単色に置き換える、または塗りをすべて外す。
 *   nodeId / color / opacity を配列で渡すとバルク操作になる。
 */
use anyhow::Result;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{finish, is_hex_color, parse_item, ToolContext};
use crate::bulk::{self, ParamConfig, ParamSchema, ScalarType, ToolReply, FAIL_FAST, OPERATION};
use crate::plugin::PluginRequest;

pub const NAME: &str = "figma_fills";
pub const DESCRIPTION: &str = "Set a solid fill on nodes or clear their fills. Arrays of nodeId, color or opacity fan out into one operation per element.";

const OPERATIONS: &[&str] = &["set_solid", "clear"];
const BULK_PARAMS: &[&str] = &["nodeId", "color", "opacity"];

fn is_unit_interval(value: &Value) -> bool {
    value.as_f64().is_some_and(|n| (0.0..=1.0).contains(&n))
}

pub fn schema() -> ParamSchema {
    ParamSchema::new()
        .param(OPERATION, ParamConfig::string().required().one_of(OPERATIONS))
        .param(FAIL_FAST, ParamConfig::boolean())
        .param(
            "nodeId",
            ParamConfig::array(ScalarType::String).allow_single(true).required(),
        )
        .param(
            "color",
            ParamConfig::array(ScalarType::String)
                .allow_single(true)
                .validator(is_hex_color)
                .describe("Hex color, e.g. #1E90FF"),
        )
        .param(
            "opacity",
            ParamConfig::array(ScalarType::Number)
                .allow_single(true)
                .validator(is_unit_interval)
                .describe("0 to 1, defaults to 1"),
        )
}

fn allowed_params(operation: &str) -> &'static [&'static str] {
    match operation {
        "set_solid" => &["nodeId", "color", "opacity"],
        "clear" => &["nodeId"],
        _ => &[],
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum FillOperation {
    SetSolid {
        node_id: String,
        color: String,
        opacity: Option<f64>,
    },
    Clear {
        node_id: String,
    },
}

async fn run(ctx: &ToolContext, operation: FillOperation) -> Result<Value> {
    let request = match operation {
        FillOperation::SetSolid { node_id, color, opacity } => PluginRequest::SetSolidFill {
            node_id,
            color: color.to_ascii_uppercase(),
            opacity: opacity.unwrap_or(1.0),
        },
        FillOperation::Clear { node_id } => PluginRequest::ClearFills { node_id },
    };
    ctx.send(request).await
}

pub async fn call(ctx: &ToolContext, args: &Map<String, Value>) -> Result<ToolReply> {
    debug!(function = "figma_fills", "塗りを変更します");
    let schema = schema();
    let dispatched = bulk::dispatch(
        args,
        &ctx.plan(&schema, BULK_PARAMS),
        parse_item::<FillOperation>,
        |operation, _| run(ctx, operation),
    )
    .await?;
    finish(args, dispatched, allowed_params)
}
