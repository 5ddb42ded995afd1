//! Auto-layout, alignment and distribution
//!
//! Level assignment and position planning are pure functions over a node
//! and connection set. `LayoutEngine` reads the current document, plans,
//! and writes each position back through `GraphStore::update_node`.
//! Locked nodes are never written.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::layout;
use crate::events::{DomainEvent, NoticeLevel};
use crate::store::GraphStore;
use crate::types::{Connection, Node, NodeId, NodePatch};

/// Spacing used by the layouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    /// Offset of the first row/column from the origin
    pub padding: f64,
    pub horizontal_spacing: f64,
    pub vertical_spacing: f64,
    pub grid_cell_width: f64,
    pub grid_cell_height: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            padding: layout::PADDING,
            horizontal_spacing: layout::HORIZONTAL_SPACING,
            vertical_spacing: layout::VERTICAL_SPACING,
            grid_cell_width: layout::GRID_CELL_WIDTH,
            grid_cell_height: layout::GRID_CELL_HEIGHT,
        }
    }
}

/// Which auto-layout to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    /// Levels as rows, top to bottom
    Vertical,
    /// Levels as columns, left to right
    Horizontal,
    /// Square-ish grid in document order, ignoring connections
    Grid,
}

impl fmt::Display for LayoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertical => "vertical",
            Self::Horizontal => "horizontal",
            Self::Grid => "grid",
        })
    }
}

impl FromStr for LayoutMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vertical" => Ok(Self::Vertical),
            "horizontal" => Ok(Self::Horizontal),
            "grid" => Ok(Self::Grid),
            other => Err(format!("Unknown layout mode '{}'", other)),
        }
    }
}

/// Edge or center to align selected nodes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alignment {
    Left,
    Right,
    Top,
    Bottom,
    CenterH,
    CenterV,
}

/// Axis for distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Horizontal,
    Vertical,
}

/// Level number -> node ids, in traversal order
pub type Levels = BTreeMap<usize, Vec<NodeId>>;

/// A planned top-left position for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub node_id: NodeId,
    pub x: f64,
    pub y: f64,
}

/// Result of applying a layout operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutOutcome {
    /// Nodes written through the store
    pub moved: usize,
    /// Locked nodes left in place
    pub skipped_locked: usize,
}

/// Assign every node a level by breadth-first traversal
///
/// Roots are the nodes without incoming connections, in document order;
/// a fully cyclic graph uses its first node as the only root. The first
/// level at which a node is reached wins. Nodes no root reaches share
/// one extra level after the deepest one.
pub fn compute_levels(nodes: &[Node], connections: &[Connection]) -> Levels {
    let mut levels = Levels::new();
    if nodes.is_empty() {
        return levels;
    }

    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut indegree = vec![0usize; nodes.len()];
    for connection in connections {
        if let (Some(&from), Some(&to)) = (
            index.get(connection.from.as_str()),
            index.get(connection.to.as_str()),
        ) {
            children[from].push(to);
            indegree[to] += 1;
        }
    }

    let mut queue: VecDeque<(usize, usize)> = (0..nodes.len())
        .filter(|&i| indegree[i] == 0)
        .map(|i| (i, 0))
        .collect();
    if queue.is_empty() {
        queue.push_back((0, 0));
    }

    let mut visited = vec![false; nodes.len()];
    while let Some((i, level)) = queue.pop_front() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        levels.entry(level).or_default().push(nodes[i].id.clone());
        for &child in &children[i] {
            if !visited[child] {
                queue.push_back((child, level + 1));
            }
        }
    }

    let unreached: Vec<NodeId> = nodes
        .iter()
        .zip(&visited)
        .filter(|(_, seen)| !**seen)
        .map(|(n, _)| n.id.clone())
        .collect();
    if !unreached.is_empty() {
        let next = levels.keys().next_back().map_or(0, |deepest| deepest + 1);
        levels.insert(next, unreached);
    }
    levels
}

fn by_id(nodes: &[Node]) -> HashMap<&str, &Node> {
    nodes.iter().map(|n| (n.id.as_str(), n)).collect()
}

/// Levels as rows: left to right within a row, rows stacked downward
pub fn plan_vertical(nodes: &[Node], levels: &Levels, config: &LayoutConfig) -> Vec<Placement> {
    let lookup = by_id(nodes);
    let mut placements = Vec::with_capacity(nodes.len());
    let mut y = config.padding;

    for ids in levels.values() {
        let mut x = config.padding;
        let mut row_height: f64 = 0.0;
        for node in ids.iter().filter_map(|id| lookup.get(id.as_str())) {
            let size = node.size();
            placements.push(Placement {
                node_id: node.id.clone(),
                x,
                y,
            });
            x += size.width + config.horizontal_spacing;
            row_height = row_height.max(size.height);
        }
        y += row_height + config.vertical_spacing;
    }
    placements
}

/// Levels as columns: top to bottom within a column, columns left to right
pub fn plan_horizontal(nodes: &[Node], levels: &Levels, config: &LayoutConfig) -> Vec<Placement> {
    let lookup = by_id(nodes);
    let mut placements = Vec::with_capacity(nodes.len());
    let mut x = config.padding;

    for ids in levels.values() {
        let mut y = config.padding;
        let mut column_width: f64 = 0.0;
        for node in ids.iter().filter_map(|id| lookup.get(id.as_str())) {
            let size = node.size();
            placements.push(Placement {
                node_id: node.id.clone(),
                x,
                y,
            });
            y += size.height + config.vertical_spacing;
            column_width = column_width.max(size.width);
        }
        x += column_width + config.horizontal_spacing;
    }
    placements
}

/// Row-major grid with `ceil(sqrt(n))` columns
pub fn plan_grid(nodes: &[Node], config: &LayoutConfig) -> Vec<Placement> {
    if nodes.is_empty() {
        return Vec::new();
    }
    let columns = (nodes.len() as f64).sqrt().ceil() as usize;
    nodes
        .iter()
        .enumerate()
        .map(|(i, node)| Placement {
            node_id: node.id.clone(),
            x: config.padding + (i % columns) as f64 * config.grid_cell_width,
            y: config.padding + (i / columns) as f64 * config.grid_cell_height,
        })
        .collect()
}

/// Plan an alignment of `nodes` (at least two)
pub fn plan_alignment(nodes: &[Node], alignment: Alignment) -> Vec<Placement> {
    if nodes.len() < 2 {
        return Vec::new();
    }
    let count = nodes.len() as f64;
    let place = |node: &Node, x: f64, y: f64| Placement {
        node_id: node.id.clone(),
        x,
        y,
    };

    match alignment {
        Alignment::Left => {
            let min_x = nodes.iter().map(|n| n.x).fold(f64::INFINITY, f64::min);
            nodes.iter().map(|n| place(n, min_x, n.y)).collect()
        }
        Alignment::Right => {
            let max_x = nodes
                .iter()
                .map(|n| n.x + n.size().width)
                .fold(f64::NEG_INFINITY, f64::max);
            nodes
                .iter()
                .map(|n| place(n, max_x - n.size().width, n.y))
                .collect()
        }
        Alignment::Top => {
            let min_y = nodes.iter().map(|n| n.y).fold(f64::INFINITY, f64::min);
            nodes.iter().map(|n| place(n, n.x, min_y)).collect()
        }
        Alignment::Bottom => {
            let max_y = nodes
                .iter()
                .map(|n| n.y + n.size().height)
                .fold(f64::NEG_INFINITY, f64::max);
            nodes
                .iter()
                .map(|n| place(n, n.x, max_y - n.size().height))
                .collect()
        }
        Alignment::CenterH => {
            let mean = nodes.iter().map(|n| n.x + n.size().width / 2.0).sum::<f64>() / count;
            nodes
                .iter()
                .map(|n| place(n, mean - n.size().width / 2.0, n.y))
                .collect()
        }
        Alignment::CenterV => {
            let mean = nodes.iter().map(|n| n.y + n.size().height / 2.0).sum::<f64>() / count;
            nodes
                .iter()
                .map(|n| place(n, n.x, mean - n.size().height / 2.0))
                .collect()
        }
    }
}

/// Plan an even distribution of `nodes` (at least three)
///
/// The first and last node along the axis stay put; interior nodes land
/// at equal fractions of the distance between them.
pub fn plan_distribution(nodes: &[Node], direction: Direction) -> Vec<Placement> {
    if nodes.len() < 3 {
        return Vec::new();
    }
    let axis = |n: &Node| match direction {
        Direction::Horizontal => n.x,
        Direction::Vertical => n.y,
    };

    let mut sorted: Vec<&Node> = nodes.iter().collect();
    sorted.sort_by(|a, b| axis(a).total_cmp(&axis(b)));

    let start = axis(sorted[0]);
    let span = axis(sorted[sorted.len() - 1]) - start;
    let step = span / (sorted.len() - 1) as f64;

    sorted[1..sorted.len() - 1]
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let position = start + step * (i + 1) as f64;
            let (x, y) = match direction {
                Direction::Horizontal => (position, node.y),
                Direction::Vertical => (node.x, position),
            };
            Placement {
                node_id: node.id.clone(),
                x,
                y,
            }
        })
        .collect()
}

/// Applies layouts to the store's current document
pub struct LayoutEngine {
    store: Arc<GraphStore>,
    config: LayoutConfig,
}

impl LayoutEngine {
    pub fn new(store: Arc<GraphStore>, config: LayoutConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.store.bus().emit(&DomainEvent::notice(level, message));
    }

    /// Level assignment for the current document
    pub fn levels(&self) -> Levels {
        let workflow = self.store.get_workflow();
        compute_levels(&workflow.nodes, &workflow.connections)
    }

    /// Run one of the auto-layouts over every node
    pub fn auto_layout(&self, mode: LayoutMode) -> LayoutOutcome {
        let workflow = self.store.get_workflow();
        if workflow.nodes.is_empty() {
            self.notice(NoticeLevel::Info, "No nodes to layout");
            return LayoutOutcome::default();
        }

        let placements = match mode {
            LayoutMode::Vertical => {
                let levels = compute_levels(&workflow.nodes, &workflow.connections);
                plan_vertical(&workflow.nodes, &levels, &self.config)
            }
            LayoutMode::Horizontal => {
                let levels = compute_levels(&workflow.nodes, &workflow.connections);
                plan_horizontal(&workflow.nodes, &levels, &self.config)
            }
            LayoutMode::Grid => plan_grid(&workflow.nodes, &self.config),
        };

        let outcome = self.apply(&placements);
        log::info!(
            "{} layout moved {} nodes ({} locked)",
            mode,
            outcome.moved,
            outcome.skipped_locked
        );
        self.notice(NoticeLevel::Success, format!("{} layout complete", capitalize(mode)));
        outcome
    }

    pub fn auto_layout_vertical(&self) -> LayoutOutcome {
        self.auto_layout(LayoutMode::Vertical)
    }

    pub fn auto_layout_horizontal(&self) -> LayoutOutcome {
        self.auto_layout(LayoutMode::Horizontal)
    }

    pub fn auto_layout_grid(&self) -> LayoutOutcome {
        self.auto_layout(LayoutMode::Grid)
    }

    /// Align the selected nodes (needs at least two)
    pub fn align_nodes(&self, alignment: Alignment) -> LayoutOutcome {
        let selected = self.store.get_selected_nodes();
        if selected.len() < 2 {
            self.notice(NoticeLevel::Info, "Select at least 2 nodes to align");
            return LayoutOutcome::default();
        }
        let outcome = self.apply(&plan_alignment(&selected, alignment));
        self.notice(
            NoticeLevel::Success,
            format!("Aligned {} nodes", selected.len()),
        );
        outcome
    }

    /// Distribute the selected nodes evenly (needs at least three)
    pub fn distribute_nodes(&self, direction: Direction) -> LayoutOutcome {
        let selected = self.store.get_selected_nodes();
        if selected.len() < 3 {
            self.notice(NoticeLevel::Info, "Select at least 3 nodes to distribute");
            return LayoutOutcome::default();
        }
        let outcome = self.apply(&plan_distribution(&selected, direction));
        self.notice(
            NoticeLevel::Success,
            format!("Distributed {} nodes", selected.len()),
        );
        outcome
    }

    fn apply(&self, placements: &[Placement]) -> LayoutOutcome {
        let mut outcome = LayoutOutcome::default();
        for placement in placements {
            match self.store.get_node(&placement.node_id) {
                Some(node) if node.locked => outcome.skipped_locked += 1,
                Some(_) => {
                    let patch = NodePatch::position(placement.x, placement.y);
                    if self.store.update_node(&placement.node_id, &patch).is_some() {
                        outcome.moved += 1;
                    }
                }
                None => log::warn!("Layout target {} disappeared", placement.node_id),
            }
        }
        outcome
    }
}

fn capitalize(mode: LayoutMode) -> String {
    let name = mode.to_string();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBus, EventKind, VecEventSink};
    use crate::types::{ConnectionDraft, NodeDraft, NodeType, Position};

    fn setup() -> (Arc<GraphStore>, LayoutEngine, Arc<VecEventSink>) {
        let bus = Arc::new(EventBus::new());
        let sink = Arc::new(VecEventSink::new());
        bus.attach(sink.clone());
        let store = Arc::new(GraphStore::new(bus));
        let engine = LayoutEngine::new(Arc::clone(&store), LayoutConfig::default());
        (store, engine, sink)
    }

    fn add(store: &GraphStore, node_type: NodeType, x: f64, y: f64) -> Node {
        store.add_node(NodeDraft::new(node_type, x, y))
    }

    fn link(store: &GraphStore, from: &Node, to: &Node) {
        store
            .add_connection(ConnectionDraft::new(from.id.clone(), to.id.clone()))
            .unwrap();
    }

    fn level_of(levels: &Levels, id: &str) -> Option<usize> {
        levels
            .iter()
            .find(|(_, ids)| ids.iter().any(|i| i == id))
            .map(|(level, _)| *level)
    }

    fn positions(store: &GraphStore) -> Vec<Position> {
        store.get_nodes().iter().map(Node::position).collect()
    }

    #[test]
    fn test_linear_chain_vertical() {
        let (store, engine, _sink) = setup();
        let a = add(&store, NodeType::Start, 500.0, 500.0);
        let b = add(&store, NodeType::Task, 0.0, 0.0);
        let c = add(&store, NodeType::End, 300.0, 10.0);
        link(&store, &a, &b);
        link(&store, &b, &c);

        let levels = engine.levels();
        assert_eq!(level_of(&levels, &a.id), Some(0));
        assert_eq!(level_of(&levels, &b.id), Some(1));
        assert_eq!(level_of(&levels, &c.id), Some(2));

        let outcome = engine.auto_layout_vertical();
        assert_eq!(outcome.moved, 3);

        let a = store.get_node(&a.id).unwrap();
        let b = store.get_node(&b.id).unwrap();
        let c = store.get_node(&c.id).unwrap();
        assert!(a.y < b.y && b.y < c.y);
        assert_eq!((a.x, a.y), (100.0, 100.0));
        // Start is 80 tall: 100 + 80 + 120
        assert_eq!(b.y, 300.0);
        // Task is 60 tall: 300 + 60 + 120
        assert_eq!(c.y, 480.0);
    }

    #[test]
    fn test_vertical_rows_advance_by_width() {
        let (store, engine, _sink) = setup();
        let root = add(&store, NodeType::Decision, 0.0, 0.0);
        let left = add(&store, NodeType::Task, 0.0, 0.0);
        let right = add(&store, NodeType::Task, 0.0, 0.0);
        link(&store, &root, &left);
        link(&store, &root, &right);

        engine.auto_layout_vertical();
        let left = store.get_node(&left.id).unwrap();
        let right = store.get_node(&right.id).unwrap();
        assert_eq!(left.y, right.y);
        assert_eq!(right.x - left.x, 120.0 + 150.0);
    }

    #[test]
    fn test_layout_is_idempotent() {
        let (store, engine, _sink) = setup();
        let a = add(&store, NodeType::Start, 0.0, 0.0);
        let b = add(&store, NodeType::Decision, 10.0, 10.0);
        let c = add(&store, NodeType::Task, 20.0, 20.0);
        let d = add(&store, NodeType::End, 30.0, 30.0);
        link(&store, &a, &b);
        link(&store, &b, &c);
        link(&store, &b, &d);
        link(&store, &c, &b);

        engine.auto_layout_vertical();
        let first = positions(&store);
        engine.auto_layout_vertical();
        assert_eq!(positions(&store), first);
    }

    #[test]
    fn test_levels_are_deterministic() {
        let (store, engine, _sink) = setup();
        let nodes: Vec<Node> = (0..6)
            .map(|i| add(&store, NodeType::Task, i as f64, 0.0))
            .collect();
        link(&store, &nodes[0], &nodes[2]);
        link(&store, &nodes[1], &nodes[2]);
        link(&store, &nodes[2], &nodes[3]);
        link(&store, &nodes[1], &nodes[4]);
        link(&store, &nodes[4], &nodes[3]);

        let first = engine.levels();
        for _ in 0..5 {
            assert_eq!(engine.levels(), first);
        }
        assert_eq!(first[&0], vec![nodes[0].id.clone(), nodes[1].id.clone(), nodes[5].id.clone()]);
        assert_eq!(level_of(&first, &nodes[3].id), Some(2));
    }

    #[test]
    fn test_cyclic_graph_uses_first_node_as_root() {
        let (store, engine, _sink) = setup();
        let a = add(&store, NodeType::Task, 0.0, 0.0);
        let b = add(&store, NodeType::Task, 0.0, 0.0);
        let c = add(&store, NodeType::Task, 0.0, 0.0);
        link(&store, &b, &c);
        link(&store, &c, &a);
        link(&store, &a, &b);

        let levels = engine.levels();
        assert_eq!(levels[&0], vec![a.id.clone()]);
        assert_eq!(levels[&1], vec![b.id.clone()]);
        assert_eq!(levels[&2], vec![c.id.clone()]);
    }

    #[test]
    fn test_unreached_nodes_share_trailing_level() {
        let (store, engine, _sink) = setup();
        let root = add(&store, NodeType::Start, 0.0, 0.0);
        let x = add(&store, NodeType::Task, 0.0, 0.0);
        let y = add(&store, NodeType::Task, 0.0, 0.0);
        let z = add(&store, NodeType::Task, 0.0, 0.0);
        // x -> y -> z -> x has no root of its own
        link(&store, &x, &y);
        link(&store, &y, &z);
        link(&store, &z, &x);

        let levels = engine.levels();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[&0], vec![root.id.clone()]);
        assert_eq!(levels[&1], vec![x.id.clone(), y.id.clone(), z.id.clone()]);
    }

    #[test]
    fn test_horizontal_columns() {
        let (store, engine, _sink) = setup();
        let a = add(&store, NodeType::Start, 0.0, 0.0);
        let b = add(&store, NodeType::Task, 0.0, 0.0);
        link(&store, &a, &b);

        engine.auto_layout_horizontal();
        let a = store.get_node(&a.id).unwrap();
        let b = store.get_node(&b.id).unwrap();
        assert_eq!((a.x, a.y), (100.0, 100.0));
        assert_eq!((b.x, b.y), (100.0 + 80.0 + 150.0, 100.0));
    }

    #[test]
    fn test_grid_layout() {
        let (store, engine, _sink) = setup();
        for i in 0..5 {
            add(&store, NodeType::Task, i as f64 * 7.0, 3.0);
        }
        engine.auto_layout_grid();

        let expected = vec![
            Position::new(100.0, 100.0),
            Position::new(300.0, 100.0),
            Position::new(500.0, 100.0),
            Position::new(100.0, 250.0),
            Position::new(300.0, 250.0),
        ];
        assert_eq!(positions(&store), expected);
    }

    #[test]
    fn test_layout_skips_locked_nodes() {
        let (store, engine, _sink) = setup();
        let locked = store.add_node(NodeDraft::new(NodeType::Task, 7.0, 9.0).locked());
        add(&store, NodeType::Task, 0.0, 0.0);

        let outcome = engine.auto_layout_grid();
        assert_eq!(outcome, LayoutOutcome { moved: 1, skipped_locked: 1 });
        assert_eq!(store.get_node(&locked.id).unwrap().position(), Position::new(7.0, 9.0));
    }

    #[test]
    fn test_empty_layout_is_informational_noop() {
        let (store, engine, sink) = setup();
        let before = store.get_state();
        assert_eq!(engine.auto_layout_vertical(), LayoutOutcome::default());
        assert!(Arc::ptr_eq(&before, &store.get_state()));
        match sink.events().as_slice() {
            [DomainEvent::Notice { level, message }] => {
                assert_eq!(*level, NoticeLevel::Info);
                assert_eq!(message, "No nodes to layout");
            }
            other => panic!("Expected one notice, got {:?}", other),
        }
    }

    #[test]
    fn test_align_left_keeps_locked_node() {
        let (store, engine, _sink) = setup();
        let locked = store.add_node(NodeDraft::new(NodeType::Task, 50.0, 50.0).locked());
        let free = add(&store, NodeType::Task, 200.0, 120.0);
        store.select_nodes(&[locked.id.clone(), free.id.clone()], false);

        let outcome = engine.align_nodes(Alignment::Left);
        assert_eq!(outcome.skipped_locked, 1);
        assert_eq!(store.get_node(&locked.id).unwrap().position(), Position::new(50.0, 50.0));
        assert_eq!(store.get_node(&free.id).unwrap().position(), Position::new(50.0, 120.0));
    }

    #[test]
    fn test_align_right_and_center() {
        let (store, engine, _sink) = setup();
        let task = add(&store, NodeType::Task, 0.0, 0.0);
        let start = add(&store, NodeType::Start, 100.0, 200.0);
        store.select_nodes(&[task.id.clone(), start.id.clone()], false);

        engine.align_nodes(Alignment::Right);
        // Right edge is max(0 + 120, 100 + 80) = 180
        assert_eq!(store.get_node(&task.id).unwrap().x, 60.0);
        assert_eq!(store.get_node(&start.id).unwrap().x, 100.0);

        engine.align_nodes(Alignment::CenterV);
        let task = store.get_node(&task.id).unwrap();
        let start = store.get_node(&start.id).unwrap();
        assert_eq!(task.y + 30.0, start.y + 40.0);
    }

    #[test]
    fn test_align_needs_two_nodes() {
        let (store, engine, sink) = setup();
        let only = add(&store, NodeType::Task, 10.0, 10.0);
        store.select_node(&only.id, false);
        sink.clear();

        assert_eq!(engine.align_nodes(Alignment::Top), LayoutOutcome::default());
        assert_eq!(sink.kinds(), vec![EventKind::Notice]);
    }

    #[test]
    fn test_distribute_horizontal() {
        let (store, engine, _sink) = setup();
        let a = add(&store, NodeType::Task, 0.0, 0.0);
        let c = add(&store, NodeType::Task, 300.0, 0.0);
        let b = add(&store, NodeType::Task, 20.0, 0.0);
        let d = add(&store, NodeType::Task, 40.0, 0.0);
        store.select_all();

        let outcome = engine.distribute_nodes(Direction::Horizontal);
        assert_eq!(outcome.moved, 2);
        assert_eq!(store.get_node(&a.id).unwrap().x, 0.0);
        assert_eq!(store.get_node(&b.id).unwrap().x, 100.0);
        assert_eq!(store.get_node(&d.id).unwrap().x, 200.0);
        assert_eq!(store.get_node(&c.id).unwrap().x, 300.0);
    }

    #[test]
    fn test_distribute_needs_three_nodes() {
        let (store, engine, _sink) = setup();
        add(&store, NodeType::Task, 0.0, 0.0);
        add(&store, NodeType::Task, 10.0, 0.0);
        store.select_all();
        assert_eq!(engine.distribute_nodes(Direction::Vertical), LayoutOutcome::default());
    }

    #[test]
    fn test_alignment_names() {
        assert_eq!(serde_json::to_string(&Alignment::CenterH).unwrap(), "\"center-h\"");
        assert_eq!("grid".parse::<LayoutMode>(), Ok(LayoutMode::Grid));
        assert!("radial".parse::<LayoutMode>().is_err());
    }
}
