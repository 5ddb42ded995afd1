//! Diagram Engine - the editing core of the Flowplan workflow designer
//!
//! This crate holds everything a front end needs to edit a workflow
//! diagram without owning any rendering:
//!
//! - `GraphStore`: single source of truth for nodes, connections and selection
//! - `EventBus`: synchronous domain events for every committed change
//! - `CommandHistory`: bounded undo/redo over store mutations
//! - `LayoutEngine`: level-based auto-layout, alignment and distribution
//! - Grouping, import validation, JSON exchange, autosave and metrics
//!
//! # Architecture
//!
//! The store commits each mutation as a new immutable snapshot, then
//! notifies subscribers and emits the matching event. Collaborators hold
//! an `Arc<GraphStore>` and listen on its bus; `Editor` wires them up.
//!
//! # Example
//!
//! ```ignore
//! use diagram_engine::{Editor, LayoutMode, NodeDraft, NodeType};
//!
//! let editor = Editor::default();
//! editor.history().add_node(NodeDraft::new(NodeType::Start, 0.0, 0.0));
//! editor.layout().auto_layout(LayoutMode::Vertical);
//! ```

pub mod config;
pub mod constants;
pub mod editor;
pub mod error;
pub mod events;
pub mod exchange;
pub mod geometry;
pub mod groups;
pub mod layout;
pub mod metrics;
pub mod registry;
pub mod storage;
pub mod store;
pub mod types;
pub mod undo;
pub mod validation;

// Re-export key types
pub use config::{ConfigError, EditorConfig};
pub use editor::Editor;
pub use error::{EngineError, Result};
pub use events::{DomainEvent, EventBus, EventKind, EventSink, NoticeLevel};
pub use geometry::Rect;
pub use groups::{GroupError, GroupManager, NodeGroup};
pub use layout::{Alignment, Direction, LayoutConfig, LayoutEngine, LayoutMode};
pub use metrics::WorkflowMetrics;
pub use registry::{node_spec, NodeTypeSpec};
pub use storage::{Autosaver, FileStorage, MemoryStorage, StorageError, WorkflowStorage};
pub use store::{GraphStore, Snapshot};
pub use types::{
    Connection, ConnectionDraft, ConnectionPatch, ConnectionStyle, EditorState, Node, NodeDraft,
    NodePatch, NodeType, Position, UiState, WorkflowDocument,
};
pub use undo::{Command, CommandHistory};
pub use validation::ValidationError;
