//! Core types for workflow documents
//!
//! These types define the persisted workflow document (nodes, connections,
//! metadata) and the transient UI state that travels with it in editor
//! snapshots. Field names serialize in camelCase so the JSON shape matches
//! the exchange format.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::{canvas, document};
use crate::registry::{node_spec, NodeTypeSpec};

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for a connection
pub type ConnectionId = String;

/// Unique identifier for a node group
pub type GroupId = String;

/// Timestamp type used throughout the document
pub type Timestamp = DateTime<Utc>;

/// Generate a fresh identifier with a readable prefix
pub fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

/// Current time, never earlier than `previous`
pub(crate) fn advance(previous: Timestamp) -> Timestamp {
    Utc::now().max(previous)
}

/// The closed set of node types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Start,
    End,
    Decision,
    Merge,
    Task,
    Process,
    Manual,
    Delay,
    Database,
    Document,
    Comment,
}

impl NodeType {
    /// Every node type, in registry order
    pub const ALL: [NodeType; 11] = [
        NodeType::Start,
        NodeType::End,
        NodeType::Decision,
        NodeType::Merge,
        NodeType::Task,
        NodeType::Process,
        NodeType::Manual,
        NodeType::Delay,
        NodeType::Database,
        NodeType::Document,
        NodeType::Comment,
    ];

    /// Wire name of this type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Decision => "decision",
            Self::Merge => "merge",
            Self::Task => "task",
            Self::Process => "process",
            Self::Manual => "manual",
            Self::Delay => "delay",
            Self::Database => "database",
            Self::Document => "document",
            Self::Comment => "comment",
        }
    }

    /// Registry defaults for this type
    pub fn spec(&self) -> &'static NodeTypeSpec {
        node_spec(*self)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown node type name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown node type '{0}'")]
pub struct UnknownNodeType(pub String);

impl FromStr for NodeType {
    type Err = UnknownNodeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownNodeType(s.to_string()))
    }
}

/// Rendering style of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
    Thick,
    Thin,
    Animated,
}

impl ConnectionStyle {
    /// SVG dash pattern, if any
    pub fn dash_pattern(&self) -> Option<&'static str> {
        match self {
            Self::Dashed | Self::Animated => Some("10,5"),
            Self::Dotted => Some("2,4"),
            Self::Solid | Self::Thick | Self::Thin => None,
        }
    }

    /// Stroke width in pixels
    pub fn stroke_width(&self) -> f64 {
        match self {
            Self::Thick => 4.0,
            Self::Thin => 1.0,
            _ => 2.0,
        }
    }
}

/// A point in document coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Width and height of a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

fn default_timestamp() -> Timestamp {
    Utc::now()
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Deserialize a present field (including `null`) as `Some(..)`
///
/// Used for patch fields where `null` means "clear the override" and an
/// absent field means "leave unchanged".
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A node placed on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier, never reused
    pub id: NodeId,
    /// Node type (resolves geometry and color defaults)
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Top-left corner in document coordinates
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<String>,
    /// Locked nodes refuse drag, layout and align
    #[serde(default, skip_serializing_if = "is_false")]
    pub locked: bool,
    /// Weak back-reference to a group owned by the grouping collaborator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(default = "default_timestamp")]
    pub created_at: Timestamp,
    #[serde(default = "default_timestamp")]
    pub updated_at: Timestamp,
}

impl Node {
    /// Effective size, falling back to the type registry
    pub fn size(&self) -> Size {
        let spec = self.node_type.spec();
        Size {
            width: self.width.unwrap_or(spec.width),
            height: self.height.unwrap_or(spec.height),
        }
    }

    /// Effective fill color
    pub fn fill_color(&self) -> &str {
        self.color.as_deref().unwrap_or(self.node_type.spec().color)
    }

    /// Effective stroke color
    pub fn outline_color(&self) -> &str {
        self.stroke_color
            .as_deref()
            .unwrap_or(self.node_type.spec().stroke_color)
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// Caller-supplied fields for a new node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDraft {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    /// Defaults to the type's default label
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub stroke_color: Option<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub group_id: Option<GroupId>,
}

impl NodeDraft {
    /// Draft a node of the given type at a position
    pub fn new(node_type: NodeType, x: f64, y: f64) -> Self {
        Self {
            node_type,
            x,
            y,
            width: None,
            height: None,
            label: None,
            color: None,
            stroke_color: None,
            locked: false,
            group_id: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_colors(mut self, color: impl Into<String>, stroke: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self.stroke_color = Some(stroke.into());
        self
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    /// Turn the draft into a node with a fresh id
    pub(crate) fn into_node(self, now: Timestamp) -> Node {
        let label = self
            .label
            .unwrap_or_else(|| self.node_type.spec().default_label.to_string());
        Node {
            id: new_id("node"),
            node_type: self.node_type,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            label,
            color: self.color,
            stroke_color: self.stroke_color,
            locked: self.locked,
            group_id: self.group_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update merged into an existing node
///
/// `None` leaves a field unchanged. For optional node fields the inner
/// `Option` is the new value, so `Some(None)` clears an override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub width: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub height: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub color: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Option<GroupId>>,
}

impl NodePatch {
    /// Patch that moves a node
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn x(x: f64) -> Self {
        Self {
            x: Some(x),
            ..Self::default()
        }
    }

    pub fn y(y: f64) -> Self {
        Self {
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn locked(locked: bool) -> Self {
        Self {
            locked: Some(locked),
            ..Self::default()
        }
    }

    pub fn group(group_id: Option<GroupId>) -> Self {
        Self {
            group_id: Some(group_id),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether the patch changes the node's position
    pub fn moves(&self) -> bool {
        self.x.is_some() || self.y.is_some()
    }

    /// Merge this patch into a node
    pub fn apply(&self, node: &mut Node) {
        if let Some(node_type) = self.node_type {
            node.node_type = node_type;
        }
        if let Some(x) = self.x {
            node.x = x;
        }
        if let Some(y) = self.y {
            node.y = y;
        }
        if let Some(width) = self.width {
            node.width = width;
        }
        if let Some(height) = self.height {
            node.height = height;
        }
        if let Some(label) = &self.label {
            node.label = label.clone();
        }
        if let Some(color) = &self.color {
            node.color = color.clone();
        }
        if let Some(stroke) = &self.stroke_color {
            node.stroke_color = stroke.clone();
        }
        if let Some(locked) = self.locked {
            node.locked = locked;
        }
        if let Some(group_id) = &self.group_id {
            node.group_id = group_id.clone();
        }
    }

    /// The patch that restores `node`'s current values for every field this patch touches
    pub fn inverse_for(&self, node: &Node) -> NodePatch {
        NodePatch {
            node_type: self.node_type.map(|_| node.node_type),
            x: self.x.map(|_| node.x),
            y: self.y.map(|_| node.y),
            width: self.width.map(|_| node.width),
            height: self.height.map(|_| node.height),
            label: self.label.as_ref().map(|_| node.label.clone()),
            color: self.color.as_ref().map(|_| node.color.clone()),
            stroke_color: self.stroke_color.as_ref().map(|_| node.stroke_color.clone()),
            locked: self.locked.map(|_| node.locked),
            group_id: self.group_id.as_ref().map(|_| node.group_id.clone()),
        }
    }
}

fn default_connection_color() -> String {
    document::CONNECTION_COLOR.to_string()
}

/// A directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    /// Source node id
    pub from: NodeId,
    /// Target node id
    pub to: NodeId,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub style: ConnectionStyle,
    #[serde(default = "default_connection_color")]
    pub color: String,
    /// Overrides the global curved-rendering default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curved: Option<bool>,
    #[serde(default = "default_timestamp")]
    pub created_at: Timestamp,
}

/// Caller-supplied fields for a new connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDraft {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub style: Option<ConnectionStyle>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub curved: Option<bool>,
}

impl ConnectionDraft {
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: None,
            style: None,
            color: None,
            curved: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_style(mut self, style: ConnectionStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub(crate) fn into_connection(self, now: Timestamp) -> Connection {
        Connection {
            id: new_id("conn"),
            from: self.from,
            to: self.to,
            label: self.label.unwrap_or_default(),
            style: self.style.unwrap_or_default(),
            color: self.color.unwrap_or_else(default_connection_color),
            curved: self.curved,
            created_at: now,
        }
    }
}

/// Partial update merged into an existing connection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<ConnectionStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub curved: Option<Option<bool>>,
}

impl ConnectionPatch {
    /// Whether the patch changes either endpoint
    pub fn rewires(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    pub fn apply(&self, connection: &mut Connection) {
        if let Some(from) = &self.from {
            connection.from = from.clone();
        }
        if let Some(to) = &self.to {
            connection.to = to.clone();
        }
        if let Some(label) = &self.label {
            connection.label = label.clone();
        }
        if let Some(style) = self.style {
            connection.style = style;
        }
        if let Some(color) = &self.color {
            connection.color = color.clone();
        }
        if let Some(curved) = self.curved {
            connection.curved = curved;
        }
    }
}

fn default_zoom() -> f64 {
    canvas::DEFAULT_ZOOM
}

/// Document metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetadata {
    #[serde(default = "default_timestamp")]
    pub created_at: Timestamp,
    /// Refreshed on every mutation
    #[serde(default = "default_timestamp")]
    pub updated_at: Timestamp,
    #[serde(default = "default_zoom")]
    pub zoom_level: f64,
    #[serde(default)]
    pub canvas_offset: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_at: Option<Timestamp>,
}

impl WorkflowMetadata {
    fn fresh(now: Timestamp) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            zoom_level: canvas::DEFAULT_ZOOM,
            canvas_offset: Position::default(),
            exported_at: None,
            imported_at: None,
        }
    }
}

impl Default for WorkflowMetadata {
    fn default() -> Self {
        Self::fresh(Utc::now())
    }
}

fn new_workflow_id() -> String {
    new_id("workflow")
}

fn default_name() -> String {
    document::DEFAULT_NAME.to_string()
}

fn default_version() -> String {
    document::FORMAT_VERSION.to_string()
}

/// The workflow document: the root aggregate owned by the graph store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDocument {
    #[serde(default = "new_workflow_id")]
    pub id: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Insertion order is z-order
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub metadata: WorkflowMetadata,
}

impl WorkflowDocument {
    /// Create a new empty document with a fresh id
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_workflow_id(),
            name: name.into(),
            version: default_version(),
            nodes: Vec::new(),
            connections: Vec::new(),
            metadata: WorkflowMetadata::fresh(now),
        }
    }

    /// Find a node by ID
    pub fn find_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Position of a node in document order
    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    /// Find a connection by ID
    pub fn find_connection(&self, id: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id == id)
    }

    pub fn connection_index(&self, id: &str) -> Option<usize> {
        self.connections.iter().position(|c| c.id == id)
    }

    /// The connection for an ordered (from, to) pair, if any
    pub fn connection_between(&self, from: &str, to: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.from == from && c.to == to)
    }

    /// Connections coming into a node
    pub fn incoming<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.to == node_id)
    }

    /// Connections going out of a node
    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.from == node_id)
    }

    /// Connections touching a node at either end
    pub fn incident<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections
            .iter()
            .filter(move |c| c.from == node_id || c.to == node_id)
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.find_node(id).is_some()
    }

    pub(crate) fn touch(&mut self) -> Timestamp {
        let now = advance(self.metadata.updated_at);
        self.metadata.updated_at = now;
        now
    }
}

impl Default for WorkflowDocument {
    fn default() -> Self {
        Self::new(document::DEFAULT_NAME)
    }
}

fn default_theme() -> String {
    "light".to_string()
}

fn default_true() -> bool {
    true
}

/// Transient UI state (not part of the persisted document)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    #[serde(default)]
    pub selected_nodes: Vec<NodeId>,
    #[serde(default)]
    pub selected_connections: Vec<ConnectionId>,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "default_true")]
    pub grid_visible: bool,
    #[serde(default)]
    pub snap_to_grid: bool,
    #[serde(default)]
    pub is_panning: bool,
    #[serde(default)]
    pub is_connecting: bool,
    #[serde(default)]
    pub connecting_from: Option<NodeId>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            selected_nodes: Vec::new(),
            selected_connections: Vec::new(),
            theme: default_theme(),
            grid_visible: true,
            snap_to_grid: false,
            is_panning: false,
            is_connecting: false,
            connecting_from: None,
        }
    }
}

/// Partial update of UI flags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiPatch {
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub grid_visible: Option<bool>,
    #[serde(default)]
    pub snap_to_grid: Option<bool>,
    #[serde(default)]
    pub is_panning: Option<bool>,
    #[serde(default)]
    pub is_connecting: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub connecting_from: Option<Option<NodeId>>,
}

impl UiPatch {
    pub fn apply(&self, ui: &mut UiState) {
        if let Some(theme) = &self.theme {
            ui.theme = theme.clone();
        }
        if let Some(grid) = self.grid_visible {
            ui.grid_visible = grid;
        }
        if let Some(snap) = self.snap_to_grid {
            ui.snap_to_grid = snap;
        }
        if let Some(panning) = self.is_panning {
            ui.is_panning = panning;
        }
        if let Some(connecting) = self.is_connecting {
            ui.is_connecting = connecting;
        }
        if let Some(from) = &self.connecting_from {
            ui.connecting_from = from.clone();
        }
    }
}

/// Full editor state: the document plus UI state
///
/// Snapshots of this type are handed to subscribers behind an `Arc`, so
/// readers can never mutate the store's copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorState {
    pub workflow: WorkflowDocument,
    #[serde(default)]
    pub ui: UiState,
}
