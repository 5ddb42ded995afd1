//! Import validation for workflow documents
//!
//! Checks run on the raw JSON value before it is deserialized, so a bad
//! file is reported field by field instead of as one serde error. All
//! findings are collected (not just the first); any finding rejects the
//! whole import.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::types::{NodeType, WorkflowDocument};

/// Validation finding with location context
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The document root is not a JSON object
    NotAnObject,
    /// `nodes` is missing or not an array
    NodesNotArray,
    /// `connections` is missing or not an array
    ConnectionsNotArray,
    /// An entry of `nodes` is not an object
    NodeNotObject { index: usize },
    /// A node has no string id
    NodeMissingId { index: usize },
    /// Two nodes share an id
    DuplicateNodeId { node_id: String },
    /// A node type outside the allowed set
    UnknownNodeType { node_id: String, node_type: String },
    /// `x` or `y` is missing or not a number
    NonNumericCoordinate { node_id: String, axis: &'static str },
    /// An entry of `connections` is not an object
    ConnectionNotObject { index: usize },
    /// A connection lacks `id`, `from` or `to`
    ConnectionMissingField { index: usize, field: &'static str },
    /// A connection endpoint names no node in the document
    UnknownNode { connection_id: String, node_id: String },
    /// A connection from a node to itself
    SelfLoop { connection_id: String },
    /// A second connection for the same ordered pair
    DuplicateConnection {
        connection_id: String,
        from: String,
        to: String,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "workflow must be a JSON object"),
            Self::NodesNotArray => write!(f, "nodes must be an array"),
            Self::ConnectionsNotArray => write!(f, "connections must be an array"),
            Self::NodeNotObject { index } => write!(f, "node #{} is not an object", index),
            Self::NodeMissingId { index } => write!(f, "node #{} has no id", index),
            Self::DuplicateNodeId { node_id } => write!(f, "duplicate node id '{}'", node_id),
            Self::UnknownNodeType { node_id, node_type } => {
                write!(f, "Unknown node type '{}' for node '{}'", node_type, node_id)
            }
            Self::NonNumericCoordinate { node_id, axis } => {
                write!(f, "node '{}' has a non-numeric {} coordinate", node_id, axis)
            }
            Self::ConnectionNotObject { index } => {
                write!(f, "connection #{} is not an object", index)
            }
            Self::ConnectionMissingField { index, field } => {
                write!(f, "connection #{} is missing '{}'", index, field)
            }
            Self::UnknownNode {
                connection_id,
                node_id,
            } => {
                write!(
                    f,
                    "Connection '{}' references unknown node '{}'",
                    connection_id, node_id
                )
            }
            Self::SelfLoop { connection_id } => {
                write!(f, "Connection '{}' connects a node to itself", connection_id)
            }
            Self::DuplicateConnection {
                connection_id,
                from,
                to,
            } => {
                write!(
                    f,
                    "Connection '{}' duplicates an existing {} -> {} connection",
                    connection_id, from, to
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a raw JSON document before import
///
/// Returns all validation errors found (not just the first).
pub fn validate_document_value(value: &Value) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let Some(root) = value.as_object() else {
        errors.push(ValidationError::NotAnObject);
        return errors;
    };

    let node_ids = validate_nodes(root, &mut errors);
    validate_connections(root, node_ids.as_ref(), &mut errors);
    errors
}

/// Returns the set of node ids, or `None` when `nodes` is unusable
fn validate_nodes(root: &Map<String, Value>, errors: &mut Vec<ValidationError>) -> Option<HashSet<String>> {
    let Some(nodes) = root.get("nodes").and_then(Value::as_array) else {
        errors.push(ValidationError::NodesNotArray);
        return None;
    };

    let mut ids = HashSet::new();
    for (index, node) in nodes.iter().enumerate() {
        let Some(node) = node.as_object() else {
            errors.push(ValidationError::NodeNotObject { index });
            continue;
        };
        let Some(id) = node.get("id").and_then(Value::as_str).filter(|id| !id.is_empty()) else {
            errors.push(ValidationError::NodeMissingId { index });
            continue;
        };
        if !ids.insert(id.to_string()) {
            errors.push(ValidationError::DuplicateNodeId {
                node_id: id.to_string(),
            });
        }

        let node_type = node.get("type").and_then(Value::as_str).unwrap_or_default();
        if node_type.parse::<NodeType>().is_err() {
            errors.push(ValidationError::UnknownNodeType {
                node_id: id.to_string(),
                node_type: node_type.to_string(),
            });
        }

        for axis in ["x", "y"] {
            if !node.get(axis).is_some_and(Value::is_number) {
                errors.push(ValidationError::NonNumericCoordinate {
                    node_id: id.to_string(),
                    axis,
                });
            }
        }
    }
    Some(ids)
}

fn validate_connections(
    root: &Map<String, Value>,
    node_ids: Option<&HashSet<String>>,
    errors: &mut Vec<ValidationError>,
) {
    let Some(connections) = root.get("connections").and_then(Value::as_array) else {
        errors.push(ValidationError::ConnectionsNotArray);
        return;
    };

    let mut pairs = HashSet::new();
    for (index, connection) in connections.iter().enumerate() {
        let Some(connection) = connection.as_object() else {
            errors.push(ValidationError::ConnectionNotObject { index });
            continue;
        };

        let field = |name: &'static str| connection.get(name).and_then(Value::as_str);
        for name in ["id", "from", "to"] {
            if field(name).is_none() {
                errors.push(ValidationError::ConnectionMissingField { index, field: name });
            }
        }
        let (Some(id), Some(from), Some(to)) = (field("id"), field("from"), field("to")) else {
            continue;
        };

        check_edge(id, from, to, node_ids, &mut pairs, errors);
    }
}

fn check_edge(
    id: &str,
    from: &str,
    to: &str,
    node_ids: Option<&HashSet<String>>,
    pairs: &mut HashSet<(String, String)>,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(node_ids) = node_ids {
        for endpoint in [from, to] {
            if !node_ids.contains(endpoint) {
                errors.push(ValidationError::UnknownNode {
                    connection_id: id.to_string(),
                    node_id: endpoint.to_string(),
                });
            }
        }
    }
    if from == to {
        errors.push(ValidationError::SelfLoop {
            connection_id: id.to_string(),
        });
    } else if !pairs.insert((from.to_string(), to.to_string())) {
        errors.push(ValidationError::DuplicateConnection {
            connection_id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }
}

/// Validate the graph invariants of an already-typed document
pub fn validate_document(document: &WorkflowDocument) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut ids = HashSet::new();
    for node in &document.nodes {
        if !ids.insert(node.id.clone()) {
            errors.push(ValidationError::DuplicateNodeId {
                node_id: node.id.clone(),
            });
        }
    }

    let mut pairs = HashSet::new();
    for connection in &document.connections {
        check_edge(
            &connection.id,
            &connection.from,
            &connection.to,
            Some(&ids),
            &mut pairs,
            &mut errors,
        );
    }
    errors
}
