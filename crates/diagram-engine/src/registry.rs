//! Node type registry
//!
//! Static table mapping each node type to its default geometry, colors,
//! shape and palette category. Every component that reads node geometry
//! falls back to these values when a node carries no explicit override.

use serde::{Deserialize, Serialize};

use crate::types::NodeType;

/// Shape drawn for a node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeShape {
    Circle,
    Diamond,
    Rectangle,
    Process,
    Trapezoid,
    Delay,
    Cylinder,
    Document,
    Note,
}

/// Palette category of a node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Flow control (start, end, decision, merge)
    Flow,
    /// Process steps
    Process,
    /// Data stores and documents
    Data,
    /// Free-form annotations
    Annotation,
}

/// Defaults for a node type
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeSpec {
    pub node_type: NodeType,
    pub width: f64,
    pub height: f64,
    pub color: &'static str,
    pub stroke_color: &'static str,
    pub shape: NodeShape,
    pub category: NodeCategory,
    pub default_label: &'static str,
}

const fn spec(
    node_type: NodeType,
    width: f64,
    height: f64,
    color: &'static str,
    stroke_color: &'static str,
    shape: NodeShape,
    category: NodeCategory,
    default_label: &'static str,
) -> NodeTypeSpec {
    NodeTypeSpec {
        node_type,
        width,
        height,
        color,
        stroke_color,
        shape,
        category,
        default_label,
    }
}

static NODE_TYPES: [NodeTypeSpec; 11] = [
    spec(NodeType::Start, 80.0, 80.0, "#4CAF50", "#2E7D32", NodeShape::Circle, NodeCategory::Flow, "Start"),
    spec(NodeType::End, 80.0, 80.0, "#F44336", "#C62828", NodeShape::Circle, NodeCategory::Flow, "End"),
    spec(NodeType::Decision, 100.0, 100.0, "#FFC107", "#F57C00", NodeShape::Diamond, NodeCategory::Flow, "Decision"),
    spec(NodeType::Merge, 30.0, 30.0, "#9E9E9E", "#616161", NodeShape::Circle, NodeCategory::Flow, ""),
    spec(NodeType::Task, 120.0, 60.0, "#2196F3", "#1565C0", NodeShape::Rectangle, NodeCategory::Process, "Task"),
    spec(NodeType::Process, 140.0, 70.0, "#9C27B0", "#7B1FA2", NodeShape::Process, NodeCategory::Process, "Process"),
    spec(NodeType::Manual, 120.0, 70.0, "#00BCD4", "#0097A7", NodeShape::Trapezoid, NodeCategory::Process, "Manual"),
    spec(NodeType::Delay, 100.0, 60.0, "#607D8B", "#455A64", NodeShape::Delay, NodeCategory::Process, "Delay"),
    spec(NodeType::Database, 100.0, 80.0, "#FF9800", "#F57C00", NodeShape::Cylinder, NodeCategory::Data, "Database"),
    spec(NodeType::Document, 120.0, 80.0, "#795548", "#5D4037", NodeShape::Document, NodeCategory::Data, "Document"),
    spec(NodeType::Comment, 150.0, 100.0, "#FFEB3B", "#FBC02D", NodeShape::Note, NodeCategory::Annotation, "Note"),
];

/// Look up the defaults for a node type
pub fn node_spec(node_type: NodeType) -> &'static NodeTypeSpec {
    // NODE_TYPES is ordered like NodeType's variants
    &NODE_TYPES[node_type as usize]
}

/// All registered node type specs, in palette order
pub fn all_specs() -> &'static [NodeTypeSpec] {
    &NODE_TYPES
}

/// Node types in a palette category
pub fn types_in_category(category: NodeCategory) -> Vec<NodeType> {
    NODE_TYPES
        .iter()
        .filter(|s| s.category == category)
        .map(|s| s.node_type)
        .collect()
}
