//! Node groups - named, colored sets of nodes drawn behind their members
//!
//! Groups live outside the workflow document. The only persisted link is
//! `Node::group_id`, so after a load the groups are rebuilt from the
//! nodes. A group that drops below two members is dissolved.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::groups;
use crate::events::{DomainEvent, EventKind, ListenerId, NoticeLevel};
use crate::geometry::{self, Rect};
use crate::store::GraphStore;
use crate::types::{new_id, GroupId, NodeId, NodePatch};

/// A group of nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    /// Unique identifier for this group
    pub id: GroupId,
    /// Human-readable name for the group
    pub name: String,
    /// Fill color of the group background
    pub color: String,
    /// Member nodes, in the order they joined
    pub node_ids: Vec<NodeId>,
    /// Whether the group is currently collapsed
    #[serde(default)]
    pub collapsed: bool,
}

impl NodeGroup {
    /// Create a group with a fresh id
    pub fn new(name: impl Into<String>, node_ids: Vec<NodeId>) -> Self {
        Self {
            id: new_id("group"),
            name: name.into(),
            color: groups::DEFAULT_COLOR.to_string(),
            node_ids,
            collapsed: false,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.node_ids.iter().any(|id| id == node_id)
    }
}

/// Errors from group operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GroupError {
    #[error("Select at least {min} nodes to create a group (found {found})")]
    TooFewNodes { found: usize, min: usize },

    #[error("Group '{0}' not found")]
    NotFound(GroupId),

    #[error("Group name cannot be empty")]
    EmptyName,
}

/// Owner of the editor's node groups
pub struct GroupManager {
    store: Arc<GraphStore>,
    groups: Mutex<Vec<NodeGroup>>,
    /// Groups dissolved by a member deletion, kept so an undo can revive
    /// them with their name and color
    dissolved: Mutex<Vec<NodeGroup>>,
}

impl GroupManager {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self {
            store,
            groups: Mutex::new(Vec::new()),
            dissolved: Mutex::new(Vec::new()),
        }
    }

    /// Follow node deletions and document loads
    pub fn attach(self: &Arc<Self>) -> Vec<ListenerId> {
        let bus = self.store.bus();

        let manager = Arc::downgrade(self);
        let deleted = bus.on(EventKind::NodeDeleted, move |event| {
            if let (Some(manager), DomainEvent::NodeDeleted { node_id, .. }) = (manager.upgrade(), event) {
                manager.handle_node_deleted(node_id);
            }
        });

        let manager = Arc::downgrade(self);
        let added = bus.on(EventKind::NodeAdded, move |event| {
            if let (Some(manager), DomainEvent::NodeAdded(node)) = (manager.upgrade(), event) {
                if let Some(group_id) = &node.group_id {
                    manager.handle_node_rejoined(&node.id, group_id);
                }
            }
        });

        let manager = Arc::downgrade(self);
        let loaded = bus.on(EventKind::WorkflowLoaded, move |_| {
            if let Some(manager) = manager.upgrade() {
                manager.load_groups();
            }
        });

        vec![deleted, added, loaded]
    }

    /// All groups, in creation order
    pub fn groups(&self) -> Vec<NodeGroup> {
        self.groups.lock().clone()
    }

    pub fn get_group(&self, group_id: &str) -> Option<NodeGroup> {
        self.groups.lock().iter().find(|g| g.id == group_id).cloned()
    }

    /// Group the given nodes, or the current node selection when `None`
    ///
    /// Unknown ids are ignored. Nodes already in another group move to the
    /// new one.
    pub fn create_group(
        &self,
        node_ids: Option<&[NodeId]>,
        name: Option<&str>,
        color: Option<&str>,
    ) -> Result<NodeGroup, GroupError> {
        let candidates: Vec<NodeId> = match node_ids {
            Some(ids) => ids.to_vec(),
            None => self.store.get_ui_state().selected_nodes,
        };
        let mut members: Vec<NodeId> = Vec::with_capacity(candidates.len());
        for id in candidates {
            if self.store.get_node(&id).is_some() && !members.contains(&id) {
                members.push(id);
            }
        }
        if members.len() < groups::MIN_MEMBERS {
            self.store.bus().emit(&DomainEvent::notice(
                NoticeLevel::Error,
                format!("Select at least {} nodes to create a group", groups::MIN_MEMBERS),
            ));
            return Err(GroupError::TooFewNodes {
                found: members.len(),
                min: groups::MIN_MEMBERS,
            });
        }

        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(groups::DEFAULT_NAME);
        let group = NodeGroup::new(name, members.clone())
            .with_color(color.unwrap_or(groups::DEFAULT_COLOR));

        let emptied: Vec<GroupId> = {
            let mut all = self.groups.lock();
            for other in all.iter_mut() {
                other.node_ids.retain(|id| !members.contains(id));
            }
            let emptied = all
                .iter()
                .filter(|g| g.node_ids.len() < groups::MIN_MEMBERS)
                .map(|g| g.id.clone())
                .collect();
            all.push(group.clone());
            emptied
        };
        for group_id in emptied {
            self.dissolve(&group_id);
        }

        for id in &members {
            self.store.update_node(id, &NodePatch::group(Some(group.id.clone())));
        }

        log::info!("Created group {} with {} nodes", group.id, members.len());
        let bus = self.store.bus();
        bus.emit(&DomainEvent::GroupCreated(group.clone()));
        bus.emit(&DomainEvent::notice(
            NoticeLevel::Success,
            format!("Group \"{}\" created with {} nodes", group.name, members.len()),
        ));
        Ok(group)
    }

    /// Remove a group and clear its members' back-references
    pub fn delete_group(&self, group_id: &str) -> Result<NodeGroup, GroupError> {
        self.dissolve(group_id)
            .ok_or_else(|| GroupError::NotFound(group_id.to_string()))
    }

    fn dissolve(&self, group_id: &str) -> Option<NodeGroup> {
        let group = {
            let mut all = self.groups.lock();
            let index = all.iter().position(|g| g.id == group_id)?;
            all.remove(index)
        };

        // Members that joined another group in the meantime keep that link
        for node in self.store.get_nodes() {
            if node.group_id.as_deref() == Some(group_id) {
                self.store.update_node(&node.id, &NodePatch::group(None));
            }
        }

        log::info!("Deleted group {}", group_id);
        self.store.bus().emit(&DomainEvent::GroupDeleted {
            group_id: group_id.to_string(),
        });
        Some(group)
    }

    pub fn rename_group(&self, group_id: &str, name: &str) -> Result<(), GroupError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GroupError::EmptyName);
        }
        self.modify(group_id, |group| group.name = name.to_string())
    }

    pub fn recolor_group(&self, group_id: &str, color: &str) -> Result<(), GroupError> {
        self.modify(group_id, |group| group.color = color.to_string())
    }

    fn modify(&self, group_id: &str, change: impl FnOnce(&mut NodeGroup)) -> Result<(), GroupError> {
        let mut all = self.groups.lock();
        let group = all
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| GroupError::NotFound(group_id.to_string()))?;
        change(group);
        Ok(())
    }

    /// Make the group's members the node selection
    pub fn select_group_nodes(&self, group_id: &str) -> Result<usize, GroupError> {
        let group = self
            .get_group(group_id)
            .ok_or_else(|| GroupError::NotFound(group_id.to_string()))?;
        Ok(self.store.select_nodes(&group.node_ids, false))
    }

    /// Padded bounding rectangle around the group's members
    pub fn group_bounds(&self, group_id: &str) -> Option<Rect> {
        let group = self.get_group(group_id)?;
        let state = self.store.get_state();
        let members = state
            .workflow
            .nodes
            .iter()
            .filter(|n| group.contains_node(&n.id));
        geometry::bounding_box(members).map(|rect| rect.inflate(groups::PADDING))
    }

    /// Rebuild groups from the nodes' group ids
    ///
    /// Group metadata is not persisted, so rebuilt groups get numbered
    /// names and the default color. Ids with fewer than two members are
    /// skipped.
    pub fn load_groups(&self) {
        let nodes = self.store.get_nodes();
        let mut found: Vec<(GroupId, Vec<NodeId>)> = Vec::new();
        for node in &nodes {
            let Some(group_id) = &node.group_id else {
                continue;
            };
            match found.iter_mut().find(|(id, _)| id == group_id) {
                Some((_, members)) => members.push(node.id.clone()),
                None => found.push((group_id.clone(), vec![node.id.clone()])),
            }
        }

        let rebuilt: Vec<NodeGroup> = found
            .into_iter()
            .filter(|(_, members)| members.len() >= groups::MIN_MEMBERS)
            .enumerate()
            .map(|(i, (id, node_ids))| NodeGroup {
                id,
                name: format!("Group {}", i + 1),
                color: groups::DEFAULT_COLOR.to_string(),
                node_ids,
                collapsed: false,
            })
            .collect();

        log::debug!("Rebuilt {} groups from document", rebuilt.len());
        *self.groups.lock() = rebuilt;
        self.dissolved.lock().clear();
    }

    /// Drop a deleted node from its groups, dissolving any that get too small
    pub fn handle_node_deleted(&self, node_id: &str) {
        let emptied: Vec<GroupId> = {
            let mut all = self.groups.lock();
            all.iter_mut()
                .filter_map(|group| {
                    let before = group.node_ids.len();
                    group.node_ids.retain(|id| id != node_id);
                    let shrank = group.node_ids.len() != before;
                    (shrank && group.node_ids.len() < groups::MIN_MEMBERS).then(|| group.id.clone())
                })
                .collect()
        };
        for group_id in emptied {
            if let Some(group) = self.dissolve(&group_id) {
                let mut dissolved = self.dissolved.lock();
                dissolved.retain(|g| g.id != group.id);
                dissolved.push(group);
                if dissolved.len() > groups::DISSOLVED_MEMORY {
                    dissolved.remove(0);
                }
            }
        }
    }

    /// A node carrying a group id came back (typically through undo)
    ///
    /// Joins the live group, or revives a dissolved one once the document
    /// holds enough members for it.
    pub fn handle_node_rejoined(&self, node_id: &str, group_id: &str) {
        {
            let mut all = self.groups.lock();
            if let Some(group) = all.iter_mut().find(|g| g.id == group_id) {
                if !group.contains_node(node_id) {
                    group.node_ids.push(node_id.to_string());
                }
                return;
            }
        }

        let members: Vec<NodeId> = self
            .store
            .get_nodes()
            .into_iter()
            .filter(|n| n.group_id.as_deref() == Some(group_id))
            .map(|n| n.id)
            .collect();
        if members.len() < groups::MIN_MEMBERS {
            return;
        }

        let previous = {
            let mut dissolved = self.dissolved.lock();
            dissolved
                .iter()
                .position(|g| g.id == group_id)
                .map(|i| dissolved.remove(i))
        };
        let group = match previous {
            Some(previous) => NodeGroup {
                node_ids: members,
                ..previous
            },
            None => NodeGroup {
                id: group_id.to_string(),
                name: groups::DEFAULT_NAME.to_string(),
                color: groups::DEFAULT_COLOR.to_string(),
                node_ids: members,
                collapsed: false,
            },
        };

        log::info!("Revived group {} with {} nodes", group.id, group.node_ids.len());
        self.groups.lock().push(group.clone());
        self.store.bus().emit(&DomainEvent::GroupCreated(group));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBus, VecEventSink};
    use crate::types::{Node, NodeDraft, NodeType};

    fn setup() -> (Arc<GraphStore>, Arc<GroupManager>, Arc<VecEventSink>) {
        let bus = Arc::new(EventBus::new());
        let sink = Arc::new(VecEventSink::new());
        bus.attach(sink.clone());
        let store = Arc::new(GraphStore::new(bus));
        let manager = Arc::new(GroupManager::new(Arc::clone(&store)));
        manager.attach();
        (store, manager, sink)
    }

    fn add(store: &GraphStore, x: f64, y: f64) -> Node {
        store.add_node(NodeDraft::new(NodeType::Task, x, y))
    }

    #[test]
    fn test_create_group_from_selection() {
        let (store, manager, sink) = setup();
        let a = add(&store, 0.0, 0.0);
        let b = add(&store, 200.0, 0.0);
        store.select_nodes(&[a.id.clone(), b.id.clone()], false);

        let group = manager.create_group(None, Some("Billing"), None).unwrap();
        assert!(group.id.starts_with("group-"));
        assert_eq!(group.name, "Billing");
        assert_eq!(group.color, "#E3F2FD");
        assert_eq!(group.node_ids, vec![a.id.clone(), b.id.clone()]);
        assert_eq!(store.get_node(&a.id).unwrap().group_id, Some(group.id.clone()));
        assert!(sink.kinds().contains(&EventKind::GroupCreated));
    }

    #[test]
    fn test_create_group_needs_two_nodes() {
        let (store, manager, _sink) = setup();
        let a = add(&store, 0.0, 0.0);
        let err = manager
            .create_group(Some(&[a.id.clone(), "node-missing".into()]), None, None)
            .unwrap_err();
        assert_eq!(err, GroupError::TooFewNodes { found: 1, min: 2 });
        assert!(manager.groups().is_empty());
    }

    #[test]
    fn test_delete_group_clears_membership() {
        let (store, manager, _sink) = setup();
        let a = add(&store, 0.0, 0.0);
        let b = add(&store, 200.0, 0.0);
        let group = manager.create_group(Some(&[a.id.clone(), b.id.clone()]), None, None).unwrap();

        manager.delete_group(&group.id).unwrap();
        assert!(store.get_nodes().iter().all(|n| n.group_id.is_none()));
        assert_eq!(
            manager.delete_group(&group.id),
            Err(GroupError::NotFound(group.id.clone()))
        );
    }

    #[test]
    fn test_node_deletion_dissolves_small_group() {
        let (store, manager, sink) = setup();
        let a = add(&store, 0.0, 0.0);
        let b = add(&store, 200.0, 0.0);
        let c = add(&store, 400.0, 0.0);
        let group = manager
            .create_group(Some(&[a.id.clone(), b.id.clone(), c.id.clone()]), None, None)
            .unwrap();

        store.delete_node(&c.id);
        assert_eq!(manager.get_group(&group.id).unwrap().node_ids.len(), 2);

        store.delete_node(&b.id);
        assert!(manager.get_group(&group.id).is_none());
        assert_eq!(store.get_node(&a.id).unwrap().group_id, None);
        assert!(sink.kinds().contains(&EventKind::GroupDeleted));
    }

    #[test]
    fn test_regrouping_moves_members() {
        let (store, manager, _sink) = setup();
        let a = add(&store, 0.0, 0.0);
        let b = add(&store, 100.0, 0.0);
        let c = add(&store, 200.0, 0.0);
        let first = manager.create_group(Some(&[a.id.clone(), b.id.clone()]), None, None).unwrap();
        let second = manager.create_group(Some(&[b.id.clone(), c.id.clone()]), None, None).unwrap();

        assert!(manager.get_group(&first.id).is_none());
        assert_eq!(store.get_node(&a.id).unwrap().group_id, None);
        assert_eq!(store.get_node(&b.id).unwrap().group_id, Some(second.id.clone()));
    }

    #[test]
    fn test_load_groups_from_document() {
        let (store, manager, _sink) = setup();
        let a = add(&store, 0.0, 0.0);
        let b = add(&store, 100.0, 0.0);
        let lone = add(&store, 200.0, 0.0);
        store.update_node(&a.id, &NodePatch::group(Some("group-x".into())));
        store.update_node(&b.id, &NodePatch::group(Some("group-x".into())));
        store.update_node(&lone.id, &NodePatch::group(Some("group-y".into())));

        store.bus().emit(&DomainEvent::WorkflowLoaded {
            workflow_id: store.get_workflow().id,
        });

        let groups = manager.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, "group-x");
        assert_eq!(groups[0].name, "Group 1");
        assert_eq!(groups[0].node_ids, vec![a.id, b.id]);
    }

    #[test]
    fn test_rename_select_and_bounds() {
        let (store, manager, _sink) = setup();
        let a = add(&store, 0.0, 0.0);
        let b = add(&store, 200.0, 100.0);
        let group = manager.create_group(Some(&[a.id.clone(), b.id.clone()]), None, None).unwrap();

        assert_eq!(manager.rename_group(&group.id, "   "), Err(GroupError::EmptyName));
        manager.rename_group(&group.id, "Checkout").unwrap();
        manager.recolor_group(&group.id, "#FFEBEE").unwrap();
        let renamed = manager.get_group(&group.id).unwrap();
        assert_eq!((renamed.name.as_str(), renamed.color.as_str()), ("Checkout", "#FFEBEE"));

        store.clear_selection();
        assert_eq!(manager.select_group_nodes(&group.id), Ok(2));

        // Members span (0,0)-(320,160); 20 padding on every side
        assert_eq!(
            manager.group_bounds(&group.id),
            Some(Rect::new(-20.0, -20.0, 360.0, 200.0))
        );
    }

    #[test]
    fn test_rejoined_member_revives_dissolved_group() {
        let (store, manager, _sink) = setup();
        let a = add(&store, 0.0, 0.0);
        let b = add(&store, 200.0, 0.0);
        let group = manager
            .create_group(Some(&[a.id.clone(), b.id.clone()]), Some("Billing"), Some("#FFEE00"))
            .unwrap();
        let b = store.get_node(&b.id).unwrap();

        store.delete_node(&b.id);
        assert!(manager.groups().is_empty());

        store.update_node(&a.id, &NodePatch::group(Some(group.id.clone())));
        store.restore_node(b.clone(), None);

        let revived = manager.get_group(&group.id).unwrap();
        assert_eq!(revived.name, "Billing");
        assert_eq!(revived.color, "#FFEE00");
        assert_eq!(revived.node_ids, vec![a.id.clone(), b.id.clone()]);
    }

    #[test]
    fn test_rejoined_member_joins_live_group() {
        let (store, manager, _sink) = setup();
        let nodes: Vec<Node> = (0..3).map(|i| add(&store, i as f64 * 200.0, 0.0)).collect();
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();
        let group = manager.create_group(Some(&ids), None, None).unwrap();
        let c = store.get_node(&ids[2]).unwrap();

        store.delete_node(&c.id);
        assert_eq!(manager.get_group(&group.id).unwrap().node_ids.len(), 2);

        store.restore_node(c, None);
        assert_eq!(manager.get_group(&group.id).unwrap().node_ids, ids);
    }
}
