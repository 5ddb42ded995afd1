//! Graph store: the single source of truth for the workflow document
//!
//! Every mutation runs as one transaction: the next state is computed on a
//! private copy, checked, and only then swapped in as a new immutable
//! snapshot. After the swap, state subscribers are called with the
//! snapshot and then the matching domain event goes out on the bus.
//! Rejected mutations leave the current snapshot untouched.

use std::convert::Infallible;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::constants::{canvas, document, editing};
use crate::events::{DomainEvent, EventBus};
use crate::geometry::{self, Rect};
use crate::types::{
    Connection, ConnectionDraft, ConnectionPatch, EditorState, Node,
    NodeDraft, NodeId, NodePatch, Position, UiPatch, UiState, WorkflowDocument,
};

/// Immutable view of the editor state handed to readers and subscribers
pub type Snapshot = Arc<EditorState>;

/// Callback invoked with the new snapshot after every mutation
pub type StateCallback = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// Handle returned by `GraphStore::subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// What the bus hears about a committed mutation
enum Emit {
    Event(DomainEvent),
    /// `StateChanged` carrying the committed snapshot
    StateChanged,
    /// Subscribers only
    Silent,
}

/// Why a mutation was refused
enum Rejection {
    /// Unknown id: caller misuse, logged only
    Missing { what: &'static str, id: String },
    /// Invariant violation the user should hear about
    Invalid(String),
}

impl Rejection {
    fn node(id: &str) -> Self {
        Self::Missing {
            what: "Node",
            id: id.to_string(),
        }
    }

    fn connection(id: &str) -> Self {
        Self::Missing {
            what: "Connection",
            id: id.to_string(),
        }
    }
}

/// Owner of the workflow document and selection state
pub struct GraphStore {
    state: RwLock<Snapshot>,
    subscribers: Mutex<Vec<(SubscriptionId, StateCallback)>>,
    next_subscription: AtomicU64,
    bus: Arc<EventBus>,
    min_zoom: f64,
    max_zoom: f64,
}

impl GraphStore {
    /// Create a store holding a fresh, empty document
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            state: RwLock::new(Arc::new(EditorState::default())),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            bus,
            min_zoom: canvas::MIN_ZOOM,
            max_zoom: canvas::MAX_ZOOM,
        }
    }

    /// Override the zoom clamp used by `set_viewport`
    pub fn with_zoom_limits(mut self, min_zoom: f64, max_zoom: f64) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom.max(min_zoom);
        self
    }

    /// The bus this store emits on
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    fn commit<T, E>(
        &self,
        op: &str,
        mutate: impl FnOnce(&mut EditorState) -> Result<(T, Emit), E>,
    ) -> Result<T, E> {
        let (value, emit, snapshot) = {
            let mut current = self.state.write();
            let mut next = EditorState::clone(&current);
            let (value, emit) = mutate(&mut next)?;
            let snapshot = Arc::new(next);
            *current = Arc::clone(&snapshot);
            (value, emit, snapshot)
        };
        log::debug!("{} committed", op);

        self.notify(&snapshot);
        match emit {
            Emit::Event(event) => self.bus.emit(&event),
            Emit::StateChanged => self.bus.emit(&DomainEvent::StateChanged(snapshot)),
            Emit::Silent => {}
        }
        Ok(value)
    }

    fn transact<T>(
        &self,
        op: &str,
        mutate: impl FnOnce(&mut EditorState) -> Result<(T, Emit), Rejection>,
    ) -> Option<T> {
        match self.commit(op, mutate) {
            Ok(value) => Some(value),
            Err(Rejection::Missing { what, id }) => {
                log::warn!("{}: {} not found: {}", op, what, id);
                None
            }
            Err(Rejection::Invalid(message)) => {
                log::warn!("{} rejected: {}", op, message);
                self.bus.emit(&DomainEvent::error(message));
                None
            }
        }
    }

    fn infallible<T>(
        &self,
        op: &str,
        mutate: impl FnOnce(&mut EditorState) -> (T, Emit),
    ) -> T {
        match self.commit::<T, Infallible>(op, |state| Ok(mutate(state))) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    fn notify(&self, snapshot: &Snapshot) {
        let subscribers: Vec<StateCallback> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in subscribers {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(snapshot))).is_err() {
                log::error!("State subscriber panicked");
            }
        }
    }

    /// Register an observer called with the new snapshot after every mutation
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove an observer. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    // =========================================================================
    // Whole-state operations
    // =========================================================================

    /// Current snapshot (shared, immutable)
    pub fn get_state(&self) -> Snapshot {
        Arc::clone(&self.state.read())
    }

    /// Copy of the workflow document
    pub fn get_workflow(&self) -> WorkflowDocument {
        self.state.read().workflow.clone()
    }

    /// Copy of the UI state
    pub fn get_ui_state(&self) -> UiState {
        self.state.read().ui.clone()
    }

    /// Replace the whole state atomically
    ///
    /// Connections that break the graph invariants and selection entries
    /// that point at missing items are dropped before the swap.
    pub fn set_state(&self, state: EditorState) {
        self.infallible("set_state", move |current| {
            let mut state = state;
            sanitize(&mut state);
            state.workflow.touch();
            *current = state;
            ((), Emit::StateChanged)
        })
    }

    /// Replace the state with a fresh, empty document
    pub fn reset(&self) {
        self.infallible("reset", |current| {
            *current = EditorState::default();
            ((), Emit::StateChanged)
        })
    }

    /// Rename the workflow; a blank name falls back to the default
    pub fn rename_workflow(&self, name: &str) -> String {
        let name = match name.trim() {
            "" => document::DEFAULT_NAME.to_string(),
            trimmed => trimmed.to_string(),
        };
        self.infallible("rename_workflow", move |state| {
            state.workflow.name = name.clone();
            state.workflow.touch();
            (name, Emit::StateChanged)
        })
    }

    /// Store zoom level and pan offset; zoom is clamped to the store's limits
    pub fn set_viewport(&self, zoom: f64, offset: Position) -> f64 {
        let zoom = if zoom.is_finite() {
            zoom.clamp(self.min_zoom, self.max_zoom)
        } else {
            canvas::DEFAULT_ZOOM
        };
        self.infallible("set_viewport", move |state| {
            state.workflow.metadata.zoom_level = zoom;
            state.workflow.metadata.canvas_offset = offset;
            state.workflow.touch();
            (zoom, Emit::StateChanged)
        })
    }

    // =========================================================================
    // Node operations
    // =========================================================================

    /// Append a node built from a draft
    pub fn add_node(&self, draft: NodeDraft) -> Node {
        self.infallible("add_node", |state| {
            let now = state.workflow.touch();
            let node = draft.into_node(now);
            state.workflow.nodes.push(node.clone());
            (node.clone(), Emit::Event(DomainEvent::NodeAdded(node)))
        })
    }

    /// Merge a patch into an existing node
    pub fn update_node(&self, id: &str, patch: &NodePatch) -> Option<Node> {
        self.transact("update_node", |state| {
            let now = state.workflow.touch();
            let node = state
                .workflow
                .nodes
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or_else(|| Rejection::node(id))?;
            patch.apply(node);
            node.updated_at = now.max(node.updated_at);
            let node = node.clone();
            Ok((node.clone(), Emit::Event(DomainEvent::NodeUpdated(node))))
        })
    }

    /// Remove a node, its incident connections and its selection entry
    pub fn delete_node(&self, id: &str) -> Option<Node> {
        self.transact("delete_node", |state| {
            let index = state.workflow.node_index(id).ok_or_else(|| Rejection::node(id))?;
            let node = state.workflow.nodes.remove(index);
            state.workflow.connections.retain(|c| c.from != id && c.to != id);
            state.ui.selected_nodes.retain(|n| n != id);
            prune_connection_selection(state);
            state.workflow.touch();
            let event = DomainEvent::NodeDeleted {
                node_id: node.id.clone(),
                node: node.clone(),
            };
            Ok((node, Emit::Event(event)))
        })
    }

    /// Re-insert a previously deleted node with its original id
    pub(crate) fn restore_node(&self, node: Node, index: Option<usize>) -> Option<Node> {
        self.transact("restore_node", move |state| {
            if state.workflow.has_node(&node.id) {
                return Err(Rejection::Invalid(format!("Node {} already exists", node.id)));
            }
            let at = index.map_or(state.workflow.nodes.len(), |i| i.min(state.workflow.nodes.len()));
            state.workflow.nodes.insert(at, node.clone());
            state.workflow.touch();
            Ok((node.clone(), Emit::Event(DomainEvent::NodeAdded(node))))
        })
    }

    pub fn get_node(&self, id: &str) -> Option<Node> {
        self.state.read().workflow.find_node(id).cloned()
    }

    pub fn get_nodes(&self) -> Vec<Node> {
        self.state.read().workflow.nodes.clone()
    }

    /// Topmost node whose shape contains the point
    pub fn find_node_at(&self, point: Position) -> Option<Node> {
        let state = self.state.read();
        geometry::hit_test(&state.workflow.nodes, point).cloned()
    }

    /// Copy nodes at an offset; the copies become the node selection
    pub fn duplicate_nodes(&self, ids: &[NodeId]) -> Vec<Node> {
        let originals: Vec<Node> = {
            let state = self.state.read();
            ids.iter()
                .filter_map(|id| state.workflow.find_node(id).cloned())
                .collect()
        };
        if originals.is_empty() {
            return Vec::new();
        }

        let copies: Vec<Node> = originals
            .into_iter()
            .map(|original| {
                let mut draft = NodeDraft::new(
                    original.node_type,
                    original.x + editing::DUPLICATE_OFFSET,
                    original.y + editing::DUPLICATE_OFFSET,
                )
                .with_label(format!("{}{}", original.label, editing::DUPLICATE_SUFFIX));
                draft.width = original.width;
                draft.height = original.height;
                draft.color = original.color;
                draft.stroke_color = original.stroke_color;
                self.add_node(draft)
            })
            .collect();

        let copy_ids: Vec<NodeId> = copies.iter().map(|n| n.id.clone()).collect();
        self.select_nodes(&copy_ids, false);
        copies
    }

    /// Flip a node's lock flag, returning the new value
    pub fn toggle_lock(&self, id: &str) -> Option<bool> {
        let locked = self.get_node(id).map(|n| !n.locked);
        match locked {
            Some(locked) => self.update_node(id, &NodePatch::locked(locked)).map(|n| n.locked),
            None => {
                log::warn!("toggle_lock: Node not found: {}", id);
                None
            }
        }
    }

    /// Unlock every selected node if any is locked, otherwise lock them all
    pub fn toggle_lock_selected(&self) -> Option<bool> {
        let selected = self.get_selected_nodes();
        if selected.is_empty() {
            return None;
        }
        let lock = !selected.iter().any(|n| n.locked);
        for node in &selected {
            self.update_node(&node.id, &NodePatch::locked(lock));
        }
        Some(lock)
    }

    // =========================================================================
    // Connection operations
    // =========================================================================

    /// Append a connection after checking endpoints, self-loops and duplicates
    pub fn add_connection(&self, draft: ConnectionDraft) -> Option<Connection> {
        self.transact("add_connection", |state| {
            check_endpoints(&state.workflow, &draft.from, &draft.to, None)?;
            let now = state.workflow.touch();
            let connection = draft.into_connection(now);
            state.workflow.connections.push(connection.clone());
            Ok((
                connection.clone(),
                Emit::Event(DomainEvent::ConnectionAdded(connection)),
            ))
        })
    }

    /// Merge a patch into a connection; changed endpoints are re-checked
    pub fn update_connection(&self, id: &str, patch: &ConnectionPatch) -> Option<Connection> {
        self.transact("update_connection", |state| {
            let index = state
                .workflow
                .connection_index(id)
                .ok_or_else(|| Rejection::connection(id))?;
            let mut connection = state.workflow.connections[index].clone();
            patch.apply(&mut connection);
            if patch.rewires() {
                check_endpoints(&state.workflow, &connection.from, &connection.to, Some(id))?;
            }
            state.workflow.connections[index] = connection.clone();
            state.workflow.touch();
            Ok((
                connection.clone(),
                Emit::Event(DomainEvent::ConnectionUpdated(connection)),
            ))
        })
    }

    /// Swap a connection's endpoints
    pub fn reverse_connection(&self, id: &str) -> Option<Connection> {
        let Some(connection) = self.get_connection(id) else {
            log::warn!("reverse_connection: Connection not found: {}", id);
            return None;
        };
        let patch = ConnectionPatch {
            from: Some(connection.to),
            to: Some(connection.from),
            ..ConnectionPatch::default()
        };
        self.update_connection(id, &patch)
    }

    pub fn delete_connection(&self, id: &str) -> Option<Connection> {
        self.transact("delete_connection", |state| {
            let index = state
                .workflow
                .connection_index(id)
                .ok_or_else(|| Rejection::connection(id))?;
            let connection = state.workflow.connections.remove(index);
            state.ui.selected_connections.retain(|c| c != id);
            state.workflow.touch();
            let event = DomainEvent::ConnectionDeleted {
                connection_id: connection.id.clone(),
                connection: connection.clone(),
            };
            Ok((connection, Emit::Event(event)))
        })
    }

    /// Re-insert a previously deleted connection with its original id
    pub(crate) fn restore_connection(
        &self,
        connection: Connection,
        index: Option<usize>,
    ) -> Option<Connection> {
        self.transact("restore_connection", move |state| {
            if state.workflow.find_connection(&connection.id).is_some() {
                return Err(Rejection::Invalid(format!(
                    "Connection {} already exists",
                    connection.id
                )));
            }
            check_endpoints(&state.workflow, &connection.from, &connection.to, None)?;
            let len = state.workflow.connections.len();
            state
                .workflow
                .connections
                .insert(index.map_or(len, |i| i.min(len)), connection.clone());
            state.workflow.touch();
            Ok((
                connection.clone(),
                Emit::Event(DomainEvent::ConnectionAdded(connection)),
            ))
        })
    }

    pub fn get_connection(&self, id: &str) -> Option<Connection> {
        self.state.read().workflow.find_connection(id).cloned()
    }

    pub fn get_connections(&self) -> Vec<Connection> {
        self.state.read().workflow.connections.clone()
    }

    // =========================================================================
    // Selection and UI state
    // =========================================================================

    /// Select one node, replacing or extending the node selection
    pub fn select_node(&self, id: &str, additive: bool) -> bool {
        self.transact("select_node", |state| {
            if !state.workflow.has_node(id) {
                return Err(Rejection::node(id));
            }
            let ui = &mut state.ui;
            if !additive {
                ui.selected_nodes.clear();
            }
            if !ui.selected_nodes.iter().any(|n| n == id) {
                ui.selected_nodes.push(id.to_string());
            }
            ui.selected_connections.clear();
            Ok(((), selection_event(ui)))
        })
        .is_some()
    }

    /// Select one connection, replacing or extending the connection selection
    pub fn select_connection(&self, id: &str, additive: bool) -> bool {
        self.transact("select_connection", |state| {
            if state.workflow.find_connection(id).is_none() {
                return Err(Rejection::connection(id));
            }
            let ui = &mut state.ui;
            if !additive {
                ui.selected_connections.clear();
            }
            if !ui.selected_connections.iter().any(|c| c == id) {
                ui.selected_connections.push(id.to_string());
            }
            ui.selected_nodes.clear();
            Ok(((), selection_event(ui)))
        })
        .is_some()
    }

    /// Select several nodes at once; unknown ids are skipped
    ///
    /// Returns the size of the resulting node selection.
    pub fn select_nodes(&self, ids: &[NodeId], additive: bool) -> usize {
        self.infallible("select_nodes", |state| {
            let mut selected = if additive {
                std::mem::take(&mut state.ui.selected_nodes)
            } else {
                Vec::new()
            };
            for id in ids {
                if state.workflow.has_node(id) && !selected.contains(id) {
                    selected.push(id.clone());
                }
            }
            state.ui.selected_nodes = selected;
            state.ui.selected_connections.clear();
            (state.ui.selected_nodes.len(), selection_event(&state.ui))
        })
    }

    /// Marquee selection: every node whose bounds intersect the rectangle
    pub fn select_nodes_in_rect(&self, rect: Rect, additive: bool) -> usize {
        let rect = rect.normalized();
        let hits: Vec<NodeId> = {
            let state = self.state.read();
            state
                .workflow
                .nodes
                .iter()
                .filter(|n| geometry::node_bounds(n).intersects(&rect))
                .map(|n| n.id.clone())
                .collect()
        };
        self.select_nodes(&hits, additive)
    }

    pub fn select_all(&self) -> usize {
        let ids: Vec<NodeId> = self.state.read().workflow.nodes.iter().map(|n| n.id.clone()).collect();
        self.select_nodes(&ids, false)
    }

    pub fn clear_selection(&self) {
        self.infallible("clear_selection", |state| {
            state.ui.selected_nodes.clear();
            state.ui.selected_connections.clear();
            ((), selection_event(&state.ui))
        })
    }

    /// Selected nodes that still exist, in selection order
    pub fn get_selected_nodes(&self) -> Vec<Node> {
        let state = self.state.read();
        state
            .ui
            .selected_nodes
            .iter()
            .filter_map(|id| state.workflow.find_node(id).cloned())
            .collect()
    }

    pub fn get_selected_connections(&self) -> Vec<Connection> {
        let state = self.state.read();
        state
            .ui
            .selected_connections
            .iter()
            .filter_map(|id| state.workflow.find_connection(id).cloned())
            .collect()
    }

    /// Update UI flags; notifies subscribers but emits no domain event
    pub fn update_ui_state(&self, patch: &UiPatch) {
        self.infallible("update_ui_state", |state| {
            patch.apply(&mut state.ui);
            ((), Emit::Silent)
        })
    }
}

fn selection_event(ui: &UiState) -> Emit {
    Emit::Event(DomainEvent::SelectionChanged {
        selected_nodes: ui.selected_nodes.clone(),
        selected_connections: ui.selected_connections.clone(),
    })
}

fn prune_connection_selection(state: &mut EditorState) {
    let workflow = &state.workflow;
    state
        .ui
        .selected_connections
        .retain(|id| workflow.find_connection(id).is_some());
}

/// Check the connection invariants for a (from, to) pair
///
/// `ignore` names a connection that should not count as a duplicate of
/// itself when its endpoints are being rewritten.
fn check_endpoints(
    workflow: &WorkflowDocument,
    from: &str,
    to: &str,
    ignore: Option<&str>,
) -> Result<(), Rejection> {
    if !workflow.has_node(from) || !workflow.has_node(to) {
        return Err(Rejection::Invalid(
            "Connection endpoints must reference existing nodes".to_string(),
        ));
    }
    if from == to {
        return Err(Rejection::Invalid("Cannot connect a node to itself".to_string()));
    }
    let duplicate = workflow
        .connections
        .iter()
        .any(|c| c.from == from && c.to == to && Some(c.id.as_str()) != ignore);
    if duplicate {
        return Err(Rejection::Invalid("Connection already exists".to_string()));
    }
    Ok(())
}

/// Drop anything in a replacement state that would break the graph invariants
fn sanitize(state: &mut EditorState) {
    let mut seen: Vec<(String, String)> = Vec::new();
    let mut kept: Vec<Connection> = Vec::with_capacity(state.workflow.connections.len());
    for connection in std::mem::take(&mut state.workflow.connections) {
        let pair = (connection.from.clone(), connection.to.clone());
        let valid = connection.from != connection.to
            && state.workflow.has_node(&connection.from)
            && state.workflow.has_node(&connection.to)
            && !seen.contains(&pair);
        if valid {
            seen.push(pair);
            kept.push(connection);
        } else {
            log::warn!("Dropping invalid connection {} on load", connection.id);
        }
    }
    state.workflow.connections = kept;

    let workflow = &state.workflow;
    state.ui.selected_nodes.retain(|id| workflow.has_node(id));
    state
        .ui
        .selected_connections
        .retain(|id| workflow.find_connection(id).is_some());
}
