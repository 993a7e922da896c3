/**
 * Figmaプラグインとの接続
 *
 * 概要:
 *   ツールハンドラーがFigmaプラグインへ送るメッセージの型と、
 *   送信先を抽象化する PluginBridge トレイトを定義する。
 *   InMemoryPlugin はプラグイン未接続時・テスト用のスタブで、
 *   ドキュメントをメモリ上に保持してメッセージを処理する。
 *
 * 主な仕様:
 *   - メッセージは {id, type, payload} 形式（typeはSCREAMING_SNAKE_CASE）
 *   - ドキュメント状態はプラグイン側が正とし、この層ではロックしない
 *   - 未接続時は Status 以外のメッセージをエラーにする
 *
 * 制限事項:
 *   - WebSocket経由の実プラグイン接続は未実装。SDK導入時に PluginBridge を実装する
 */
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Rectangle,
    Ellipse,
    Frame,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableType {
    Color,
    Float,
    String,
    Boolean,
}

/**
 * ノード作成内容
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub node_type: NodeType,
    pub name: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub fill_color: Option<String>,
    pub parent_id: Option<String>,
}

/**
 * ノード更新内容。None の項目は変更しない
 */
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    pub node_id: String,
    pub name: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableSpec {
    pub name: String,
    pub collection_id: String,
    pub variable_type: VariableType,
    pub value: Value,
}

/**
 * プラグインへ送るメッセージ
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum PluginRequest {
    CreateNode(NodeSpec),
    UpdateNode(NodePatch),
    DeleteNode { node_id: String },
    GetNode { node_id: String },
    SetSolidFill { node_id: String, color: String, opacity: f64 },
    ClearFills { node_id: String },
    CreateVariable(VariableSpec),
    GetVariable { variable_id: String },
    BindVariable { node_id: String, variable_id: String, property: String },
    UnbindVariable { node_id: String, property: String },
    Status,
    Ping,
}

impl PluginRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            PluginRequest::CreateNode(_) => "CREATE_NODE",
            PluginRequest::UpdateNode(_) => "UPDATE_NODE",
            PluginRequest::DeleteNode { .. } => "DELETE_NODE",
            PluginRequest::GetNode { .. } => "GET_NODE",
            PluginRequest::SetSolidFill { .. } => "SET_SOLID_FILL",
            PluginRequest::ClearFills { .. } => "CLEAR_FILLS",
            PluginRequest::CreateVariable(_) => "CREATE_VARIABLE",
            PluginRequest::GetVariable { .. } => "GET_VARIABLE",
            PluginRequest::BindVariable { .. } => "BIND_VARIABLE",
            PluginRequest::UnbindVariable { .. } => "UNBIND_VARIABLE",
            PluginRequest::Status => "STATUS",
            PluginRequest::Ping => "PING",
        }
    }
}

/**
 * 送信用の封筒。id で応答を対応付ける
 */
#[derive(Debug, Clone, Serialize)]
pub struct PluginMessage {
    pub id: Uuid,
    #[serde(flatten)]
    pub request: PluginRequest,
}

impl PluginMessage {
    pub fn new(request: PluginRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
        }
    }
}

/// プラグインとの通信そのものの失敗
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PluginError {
    #[error("Figma plugin is not connected")]
    NotConnected,
}

/**
 * プラグインへの送信口
 *
 * ツールハンドラーはこのトレイト越しにのみドキュメントへ触れる。
 */
pub trait PluginBridge: Send + Sync {
    fn send(&self, request: PluginRequest) -> BoxFuture<'_, Result<Value>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paint {
    pub color: String,
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub fills: Vec<Paint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub bound_variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableRecord {
    pub id: String,
    pub name: String,
    pub collection_id: String,
    pub resolved_type: VariableType,
    pub value: Value,
}

#[derive(Debug, Default)]
struct Document {
    nodes: BTreeMap<String, NodeRecord>,
    variables: BTreeMap<String, VariableRecord>,
    next_id: u64,
}

impl Document {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("1:{}", self.next_id)
    }

    fn node_mut(&mut self, node_id: &str) -> Result<&mut NodeRecord> {
        self.nodes
            .get_mut(node_id)
            .ok_or_else(|| anyhow!("Node not found: {node_id}"))
    }
}

/**
 * メモリ上のドキュメントを持つスタブプラグイン
 */
pub struct InMemoryPlugin {
    session_id: Uuid,
    document_name: String,
    connected: AtomicBool,
    document: Mutex<Document>,
}

impl InMemoryPlugin {
    pub fn new(document_name: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            document_name: document_name.into(),
            connected: AtomicBool::new(true),
            document: Mutex::new(Document::default()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn node(&self, node_id: &str) -> Option<NodeRecord> {
        self.lock().ok()?.nodes.get(node_id).cloned()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Document>> {
        self.document
            .lock()
            .map_err(|_| anyhow!("プラグインのドキュメント状態が破損しています"))
    }

    fn handle(&self, request: PluginRequest) -> Result<Value> {
        if !self.is_connected() && request != PluginRequest::Status {
            return Err(PluginError::NotConnected.into());
        }

        let mut doc = self.lock()?;
        let value = match request {
            PluginRequest::CreateNode(spec) => {
                if let Some(parent_id) = &spec.parent_id {
                    let parent = doc
                        .nodes
                        .get(parent_id)
                        .ok_or_else(|| anyhow!("Parent node not found: {parent_id}"))?;
                    if parent.node_type != NodeType::Frame {
                        bail!("Parent node {parent_id} is not a FRAME");
                    }
                }
                let id = doc.allocate_id();
                let record = NodeRecord {
                    name: spec.name.unwrap_or_else(|| default_name(spec.node_type).to_string()),
                    id: id.clone(),
                    node_type: spec.node_type,
                    x: spec.x.unwrap_or(0.0),
                    y: spec.y.unwrap_or(0.0),
                    width: spec.width.unwrap_or(100.0),
                    height: spec.height.unwrap_or(100.0),
                    fills: spec
                        .fill_color
                        .map(|color| vec![Paint { color, opacity: 1.0 }])
                        .unwrap_or_default(),
                    parent_id: spec.parent_id,
                    bound_variables: BTreeMap::new(),
                };
                let value = serde_json::to_value(&record)?;
                doc.nodes.insert(id, record);
                value
            }
            PluginRequest::UpdateNode(patch) => {
                let node = doc.node_mut(&patch.node_id)?;
                if let Some(name) = patch.name {
                    node.name = name;
                }
                node.x = patch.x.unwrap_or(node.x);
                node.y = patch.y.unwrap_or(node.y);
                node.width = patch.width.unwrap_or(node.width);
                node.height = patch.height.unwrap_or(node.height);
                serde_json::to_value(&*node)?
            }
            PluginRequest::DeleteNode { node_id } => {
                if doc.nodes.remove(&node_id).is_none() {
                    bail!("Node not found: {node_id}");
                }
                doc.nodes
                    .retain(|_, node| node.parent_id.as_deref() != Some(node_id.as_str()));
                json!({ "nodeId": node_id, "deleted": true })
            }
            PluginRequest::GetNode { node_id } => serde_json::to_value(&*doc.node_mut(&node_id)?)?,
            PluginRequest::SetSolidFill { node_id, color, opacity } => {
                let node = doc.node_mut(&node_id)?;
                node.fills = vec![Paint { color, opacity }];
                json!({ "nodeId": node_id, "fills": node.fills })
            }
            PluginRequest::ClearFills { node_id } => {
                let node = doc.node_mut(&node_id)?;
                let cleared = node.fills.len();
                node.fills.clear();
                json!({ "nodeId": node_id, "cleared": cleared })
            }
            PluginRequest::CreateVariable(spec) => {
                let id = format!("VariableID:{}", doc.allocate_id());
                let record = VariableRecord {
                    id: id.clone(),
                    name: spec.name,
                    collection_id: spec.collection_id,
                    resolved_type: spec.variable_type,
                    value: spec.value,
                };
                let value = serde_json::to_value(&record)?;
                doc.variables.insert(id, record);
                value
            }
            PluginRequest::GetVariable { variable_id } => {
                let variable = doc
                    .variables
                    .get(&variable_id)
                    .ok_or_else(|| anyhow!("Variable not found: {variable_id}"))?;
                serde_json::to_value(variable)?
            }
            PluginRequest::BindVariable { node_id, variable_id, property } => {
                if !doc.variables.contains_key(&variable_id) {
                    bail!("Variable not found: {variable_id}");
                }
                let node = doc.node_mut(&node_id)?;
                node.bound_variables.insert(property.clone(), variable_id.clone());
                json!({ "nodeId": node_id, "variableId": variable_id, "property": property })
            }
            PluginRequest::UnbindVariable { node_id, property } => {
                let node = doc.node_mut(&node_id)?;
                let Some(variable_id) = node.bound_variables.remove(&property) else {
                    bail!("Property '{property}' of node {node_id} is not bound to a variable");
                };
                json!({ "nodeId": node_id, "variableId": variable_id, "property": property, "unbound": true })
            }
            PluginRequest::Status => json!({
                "connected": self.is_connected(),
                "pluginId": self.session_id,
                "documentName": self.document_name,
                "nodeCount": doc.nodes.len(),
            }),
            PluginRequest::Ping => json!({ "pong": true }),
        };
        Ok(value)
    }
}

fn default_name(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::Rectangle => "Rectangle",
        NodeType::Ellipse => "Ellipse",
        NodeType::Frame => "Frame",
        NodeType::Text => "Text",
    }
}

impl PluginBridge for InMemoryPlugin {
    fn send(&self, request: PluginRequest) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let message = PluginMessage::new(request);
            debug!(
                message_id = %message.id,
                kind = message.request.kind(),
                "プラグインへメッセージを送信します"
            );
            self.handle(message.request)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(name: &str) -> PluginRequest {
        PluginRequest::CreateNode(NodeSpec {
            node_type: NodeType::Rectangle,
            name: Some(name.into()),
            x: Some(10.0),
            y: None,
            width: None,
            height: Some(40.0),
            fill_color: Some("#FF0000".into()),
            parent_id: None,
        })
    }

    #[test]
    fn message_wire_format() {
        let message = PluginMessage::new(PluginRequest::DeleteNode { node_id: "1:2".into() });
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "DELETE_NODE");
        assert_eq!(value["payload"]["nodeId"], "1:2");
        assert!(value["id"].is_string());

        let status = serde_json::to_value(PluginMessage::new(PluginRequest::Status)).unwrap();
        assert_eq!(status["type"], "STATUS");
    }

    #[tokio::test]
    async fn create_then_update_node() {
        let plugin = InMemoryPlugin::new("Test");
        let created = plugin.send(rect("Box")).await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["width"], 100.0);
        assert_eq!(created["fills"][0]["color"], "#FF0000");

        let updated = plugin
            .send(PluginRequest::UpdateNode(NodePatch {
                node_id: id.clone(),
                width: Some(250.0),
                ..NodePatch::default()
            }))
            .await
            .unwrap();
        assert_eq!(updated["width"], 250.0);
        assert_eq!(updated["height"], 40.0);
        assert_eq!(plugin.node(&id).unwrap().name, "Box");
    }

    #[tokio::test]
    async fn deleting_frame_removes_children() {
        let plugin = InMemoryPlugin::new("Test");
        let frame = plugin
            .send(PluginRequest::CreateNode(NodeSpec {
                node_type: NodeType::Frame,
                name: None,
                x: None,
                y: None,
                width: None,
                height: None,
                fill_color: None,
                parent_id: None,
            }))
            .await
            .unwrap();
        let frame_id = frame["id"].as_str().unwrap().to_string();

        let mut child = rect("Child");
        if let PluginRequest::CreateNode(spec) = &mut child {
            spec.parent_id = Some(frame_id.clone());
        }
        let child = plugin.send(child).await.unwrap();
        let child_id = child["id"].as_str().unwrap().to_string();

        plugin
            .send(PluginRequest::DeleteNode { node_id: frame_id })
            .await
            .unwrap();
        assert!(plugin.node(&child_id).is_none());
    }

    #[tokio::test]
    async fn missing_node_is_an_error() {
        let plugin = InMemoryPlugin::new("Test");
        let err = plugin
            .send(PluginRequest::GetNode { node_id: "9:9".into() })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("9:9"));
    }

    #[tokio::test]
    async fn disconnected_plugin_only_answers_status() {
        let plugin = InMemoryPlugin::new("Test");
        plugin.set_connected(false);
        let err = plugin.send(PluginRequest::Ping).await.unwrap_err();
        assert_eq!(err.downcast_ref::<PluginError>(), Some(&PluginError::NotConnected));
        let status = plugin.send(PluginRequest::Status).await.unwrap();
        assert_eq!(status["connected"], false);
    }
}
