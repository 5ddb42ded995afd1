//! Domain events and the event bus
//!
//! Every store mutation emits one typed `DomainEvent`. Collaborators
//! (renderers, history, grouping, autosave) listen on the bus instead of
//! calling each other directly.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::groups::NodeGroup;
use crate::types::{Connection, ConnectionId, EditorState, GroupId, Node, NodeId, Position};

/// Trait for receiving domain events
///
/// Implemented by the bus itself so a bus can forward into another sink,
/// and by the null/collecting sinks used in tests.
pub trait EventSink: Send + Sync {
    /// Deliver an event
    fn send(&self, event: &DomainEvent);
}

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Events emitted by the editing core
///
/// Serialized adjacently tagged: the kind under `type`, the data under
/// `payload`, so node payloads keep their own `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum DomainEvent {
    /// A node was appended to the document
    NodeAdded(Node),

    /// A node was updated (payload is the merged node)
    NodeUpdated(Node),

    /// A node and its incident connections were removed
    #[serde(rename_all = "camelCase")]
    NodeDeleted { node_id: NodeId, node: Node },

    /// A drag gesture finished; the store already holds the new position
    #[serde(rename_all = "camelCase")]
    NodeMoved {
        node_id: NodeId,
        from: Position,
        to: Position,
    },

    ConnectionAdded(Connection),

    ConnectionUpdated(Connection),

    #[serde(rename_all = "camelCase")]
    ConnectionDeleted {
        connection_id: ConnectionId,
        connection: Connection,
    },

    #[serde(rename_all = "camelCase")]
    SelectionChanged {
        selected_nodes: Vec<NodeId>,
        selected_connections: Vec<ConnectionId>,
    },

    /// The whole state was replaced or document metadata changed
    StateChanged(Arc<EditorState>),

    /// A mutation was rejected for a user-meaningful reason
    Error { message: String },

    /// Informational feedback for the user
    Notice { level: NoticeLevel, message: String },

    #[serde(rename_all = "camelCase")]
    WorkflowLoaded { workflow_id: String },

    #[serde(rename_all = "camelCase")]
    WorkflowSaved { saved_at: DateTime<Utc> },

    WorkflowExported { format: String, filename: String },

    GroupCreated(NodeGroup),

    #[serde(rename_all = "camelCase")]
    GroupDeleted { group_id: GroupId },

    #[serde(rename_all = "camelCase")]
    HistoryChanged { can_undo: bool, can_redo: bool },
}

/// Discriminant of a `DomainEvent`, used to register listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    NodeAdded,
    NodeUpdated,
    NodeDeleted,
    NodeMoved,
    ConnectionAdded,
    ConnectionUpdated,
    ConnectionDeleted,
    SelectionChanged,
    StateChanged,
    Error,
    Notice,
    WorkflowLoaded,
    WorkflowSaved,
    WorkflowExported,
    GroupCreated,
    GroupDeleted,
    HistoryChanged,
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NodeAdded(_) => EventKind::NodeAdded,
            Self::NodeUpdated(_) => EventKind::NodeUpdated,
            Self::NodeDeleted { .. } => EventKind::NodeDeleted,
            Self::NodeMoved { .. } => EventKind::NodeMoved,
            Self::ConnectionAdded(_) => EventKind::ConnectionAdded,
            Self::ConnectionUpdated(_) => EventKind::ConnectionUpdated,
            Self::ConnectionDeleted { .. } => EventKind::ConnectionDeleted,
            Self::SelectionChanged { .. } => EventKind::SelectionChanged,
            Self::StateChanged(_) => EventKind::StateChanged,
            Self::Error { .. } => EventKind::Error,
            Self::Notice { .. } => EventKind::Notice,
            Self::WorkflowLoaded { .. } => EventKind::WorkflowLoaded,
            Self::WorkflowSaved { .. } => EventKind::WorkflowSaved,
            Self::WorkflowExported { .. } => EventKind::WorkflowExported,
            Self::GroupCreated(_) => EventKind::GroupCreated,
            Self::GroupDeleted { .. } => EventKind::GroupDeleted,
            Self::HistoryChanged { .. } => EventKind::HistoryChanged,
        }
    }

    /// Create an error event
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Create a notice event
    pub fn notice(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self::Notice {
            level,
            message: message.into(),
        }
    }
}

/// Callback registered on the bus
pub type Listener = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

/// Handle returned by `EventBus::on`, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    /// `None` listens to every event
    kind: Option<EventKind>,
    once: bool,
    callback: Listener,
}

impl Registration {
    fn matches(&self, kind: EventKind) -> bool {
        self.kind.map_or(true, |k| k == kind)
    }
}

/// Synchronous publish/subscribe register
///
/// Listeners run in registration order on the emitting thread. The
/// listener list is snapshotted before dispatch, so a listener may
/// register, unregister or emit again without deadlocking.
pub struct EventBus {
    listeners: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn register(&self, kind: Option<EventKind>, once: bool, callback: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(Registration {
            id,
            kind,
            once,
            callback,
        });
        id
    }

    /// Listen for one kind of event
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        self.register(Some(kind), false, Arc::new(listener))
    }

    /// Listen for the next event of one kind only
    pub fn once<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        self.register(Some(kind), true, Arc::new(listener))
    }

    /// Listen for every event
    pub fn on_any<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        self.register(None, false, Arc::new(listener))
    }

    /// Forward every event into a sink
    pub fn attach(&self, sink: Arc<dyn EventSink>) -> ListenerId {
        self.on_any(move |event| sink.send(event))
    }

    /// Unregister a listener. Returns false if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }

    /// Remove listeners for one kind, or all listeners when `kind` is `None`
    pub fn clear(&self, kind: Option<EventKind>) {
        let mut listeners = self.listeners.lock();
        match kind {
            Some(kind) => listeners.retain(|r| r.kind != Some(kind)),
            None => listeners.clear(),
        }
    }

    /// Number of listeners that would receive an event of this kind
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.lock().iter().filter(|r| r.matches(kind)).count()
    }

    /// Deliver an event to every matching listener
    pub fn emit(&self, event: &DomainEvent) {
        let kind = event.kind();
        let targets: Vec<Listener> = {
            let mut listeners = self.listeners.lock();
            let targets = listeners
                .iter()
                .filter(|r| r.matches(kind))
                .map(|r| Arc::clone(&r.callback))
                .collect();
            listeners.retain(|r| !(r.once && r.matches(kind)));
            targets
        };

        for listener in targets {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                log::error!("Event listener for {:?} panicked", kind);
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn send(&self, event: &DomainEvent) {
        self.emit(event);
    }
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: &DomainEvent) {}
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }

    /// Kinds of the collected events, in order
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(DomainEvent::kind).collect()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: &DomainEvent) {
        self.events.lock().push(event.clone());
    }
}
