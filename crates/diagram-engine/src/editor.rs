//! Editor session: wires the store and its collaborators together
//!
//! One `Editor` lives for one editing session. It owns the event bus, the
//! graph store and every collaborator that watches them, and hands out
//! shared handles so a front end can drive each piece directly.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EditorConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::exchange;
use crate::groups::GroupManager;
use crate::layout::LayoutEngine;
use crate::metrics::WorkflowMetrics;
use crate::storage::{Autosaver, FileStorage, MemoryStorage, WorkflowStorage};
use crate::store::GraphStore;
use crate::types::{Position, WorkflowDocument};
use crate::undo::CommandHistory;

/// The assembled editing core
pub struct Editor {
    config: EditorConfig,
    bus: Arc<EventBus>,
    store: Arc<GraphStore>,
    history: Arc<CommandHistory>,
    layout: Arc<LayoutEngine>,
    groups: Arc<GroupManager>,
    autosaver: Option<Arc<Autosaver>>,
}

impl Editor {
    /// Build an editor from configuration
    ///
    /// Autosave goes to `autosave.path` when set, otherwise to memory.
    pub fn new(config: EditorConfig) -> Self {
        let storage: Option<Arc<dyn WorkflowStorage>> = if config.autosave.enabled {
            Some(match &config.autosave.path {
                Some(dir) => Arc::new(
                    FileStorage::new(dir)
                        .with_compression(config.autosave.compress)
                        .with_quota(config.autosave.quota_bytes),
                ),
                None => Arc::new(MemoryStorage::new()),
            })
        } else {
            None
        };
        Self::with_storage(config, storage)
    }

    /// Build an editor with an explicit autosave backend (or none)
    pub fn with_storage(config: EditorConfig, storage: Option<Arc<dyn WorkflowStorage>>) -> Self {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(
            GraphStore::new(Arc::clone(&bus))
                .with_zoom_limits(config.canvas.min_zoom, config.canvas.max_zoom),
        );

        let history = Arc::new(CommandHistory::with_capacity(
            Arc::clone(&store),
            config.history.capacity,
        ));
        history.attach();

        let layout = Arc::new(LayoutEngine::new(Arc::clone(&store), config.layout.clone()));

        let groups = Arc::new(GroupManager::new(Arc::clone(&store)));
        groups.attach();

        let autosaver = storage.map(|storage| {
            let saver = Arc::new(Autosaver::with_interval(
                Arc::clone(&store),
                storage,
                Duration::from_millis(config.autosave.interval_ms),
            ));
            saver.attach();
            saver
        });

        log::info!(
            "Editor ready (history capacity {}, autosave {})",
            config.history.capacity,
            if autosaver.is_some() { "on" } else { "off" }
        );

        Self {
            config,
            bus,
            store,
            history,
            layout,
            groups,
            autosaver,
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn history(&self) -> &Arc<CommandHistory> {
        &self.history
    }

    pub fn layout(&self) -> &Arc<LayoutEngine> {
        &self.layout
    }

    pub fn groups(&self) -> &Arc<GroupManager> {
        &self.groups
    }

    pub fn autosaver(&self) -> Option<&Arc<Autosaver>> {
        self.autosaver.as_ref()
    }

    /// Start over with an empty, named document
    pub fn new_workflow(&self, name: &str) -> WorkflowDocument {
        self.store.reset();
        self.history.clear();
        self.store.rename_workflow(name);
        self.store
            .set_viewport(self.config.canvas.default_zoom, Position::default());
        self.store.get_workflow()
    }

    /// Import a JSON document, replacing the current one
    pub fn open_json(&self, text: &str) -> Result<WorkflowDocument> {
        let workflow = exchange::import_json(&self.store, text)?;
        self.history.clear();
        Ok(workflow)
    }

    pub fn open_file(&self, path: impl AsRef<Path>) -> Result<WorkflowDocument> {
        let workflow = exchange::import_from_file(&self.store, path)?;
        self.history.clear();
        Ok(workflow)
    }

    pub fn export_json(&self) -> Result<String> {
        exchange::export_json(&self.store)
    }

    /// Restore the autosaved document, if autosave is on and one exists
    pub fn restore_autosave(&self) -> Result<bool> {
        match &self.autosaver {
            Some(saver) => {
                let restored = saver.restore()?;
                if restored {
                    self.history.clear();
                }
                Ok(restored)
            }
            None => Ok(false),
        }
    }

    pub fn metrics(&self) -> WorkflowMetrics {
        WorkflowMetrics::compute(&self.store.get_state().workflow)
    }

    /// Stop background work and write out any unsaved change
    pub fn shutdown(&self) -> Result<()> {
        if let Some(saver) = &self.autosaver {
            saver.detach();
            if saver.is_enabled() && saver.has_pending() {
                saver.save_now()?;
            }
        }
        Ok(())
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, VecEventSink};
    use crate::layout::LayoutMode;
    use crate::types::{ConnectionDraft, NodeDraft, NodeType};

    #[test]
    fn test_history_records_through_editor() {
        let editor = Editor::default();
        let node = editor
            .history()
            .add_node(NodeDraft::new(NodeType::Task, 0.0, 0.0));
        assert!(editor.store().get_node(&node.id).is_some());

        assert!(editor.history().undo());
        assert!(editor.store().get_nodes().is_empty());
        assert!(editor.history().redo());
        assert_eq!(editor.store().get_node(&node.id), Some(node));
    }

    #[test]
    fn test_collaborators_share_the_bus() {
        let editor = Editor::default();
        let sink = Arc::new(VecEventSink::new());
        editor.bus().attach(sink.clone());

        let store = editor.store();
        let a = store.add_node(NodeDraft::new(NodeType::Start, 0.0, 0.0));
        let b = store.add_node(NodeDraft::new(NodeType::End, 0.0, 0.0));
        store.add_connection(ConnectionDraft::new(a.id.clone(), b.id.clone()));

        let group = editor
            .groups()
            .create_group(Some(&[a.id.clone(), b.id.clone()]), None, None)
            .unwrap();
        editor.layout().auto_layout(LayoutMode::Vertical);

        assert_eq!(store.get_node(&b.id).unwrap().y, 300.0);
        assert!(sink.kinds().contains(&EventKind::GroupCreated));

        store.delete_node(&a.id);
        assert!(editor.groups().get_group(&group.id).is_none());
    }

    #[test]
    fn test_new_workflow_resets_history() {
        let mut config = EditorConfig::default();
        config.canvas.default_zoom = 1.5;
        let editor = Editor::new(config);
        editor
            .history()
            .add_node(NodeDraft::new(NodeType::Task, 0.0, 0.0));
        assert!(editor.history().can_undo());

        let workflow = editor.new_workflow("Fresh");
        assert_eq!(workflow.name, "Fresh");
        assert_eq!(workflow.metadata.zoom_level, 1.5);
        assert!(workflow.nodes.is_empty());
        assert!(!editor.history().can_undo());
    }

    #[test]
    fn test_autosave_restore_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EditorConfig::default();
        config.autosave.path = Some(dir.path().to_path_buf());
        config.autosave.compress = true;

        let first = Editor::new(config.clone());
        let node = first
            .store()
            .add_node(NodeDraft::new(NodeType::Decision, 5.0, 5.0));
        first.shutdown().unwrap();

        let second = Editor::new(config);
        assert!(second.restore_autosave().unwrap());
        assert_eq!(second.store().get_node(&node.id), Some(node));
    }

    #[test]
    fn test_autosave_disabled() {
        let mut config = EditorConfig::default();
        config.autosave.enabled = false;
        let editor = Editor::new(config);
        assert!(editor.autosaver().is_none());
        assert!(!editor.restore_autosave().unwrap());
        editor.shutdown().unwrap();
    }

    #[test]
    fn test_open_and_metrics() {
        let editor = Editor::default();
        let text = r#"{
            "name": "Imported",
            "nodes": [
                {"id": "s", "type": "start", "x": 0, "y": 0},
                {"id": "e", "type": "end", "x": 0, "y": 200}
            ],
            "connections": [{"id": "c", "from": "s", "to": "e"}]
        }"#;
        let workflow = editor.open_json(text).unwrap();
        assert_eq!(workflow.name, "Imported");

        let metrics = editor.metrics();
        assert_eq!(metrics.total_nodes, 2);
        assert_eq!(metrics.longest_path, 2);
        assert!(editor.export_json().unwrap().contains("\"exportedAt\""));
    }

    #[test]
    fn test_undo_delete_restores_dissolved_group() {
        let editor = Editor::default();
        let store = editor.store();
        let a = store.add_node(NodeDraft::new(NodeType::Task, 0.0, 0.0));
        let b = store.add_node(NodeDraft::new(NodeType::Task, 200.0, 0.0));
        store.add_connection(ConnectionDraft::new(a.id.clone(), b.id.clone()));
        let group = editor
            .groups()
            .create_group(Some(&[a.id.clone(), b.id.clone()]), Some("Review"), None)
            .unwrap();

        let flatten = |mut doc: WorkflowDocument| {
            let epoch = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH;
            doc.metadata.updated_at = epoch;
            for node in &mut doc.nodes {
                node.updated_at = epoch;
            }
            doc
        };
        let before = flatten(store.get_workflow());

        editor.history().delete_node(&a.id).unwrap();
        assert!(editor.groups().groups().is_empty());
        assert_eq!(store.get_node(&b.id).unwrap().group_id, None);

        assert!(editor.history().undo());
        assert_eq!(flatten(store.get_workflow()), before);
        let revived = editor.groups().get_group(&group.id).unwrap();
        assert_eq!(revived.name, "Review");
        assert_eq!(revived.node_ids.len(), 2);

        assert!(editor.history().redo());
        assert!(editor.groups().groups().is_empty());
        assert!(editor.history().undo());
        assert_eq!(flatten(store.get_workflow()), before);
    }
}
