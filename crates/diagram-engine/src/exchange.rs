//! JSON export and import of workflow documents
//!
//! Imports are validated in full before anything reaches the store: a
//! document with any finding is rejected and the current state is left
//! untouched.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};

use crate::constants::document;
use crate::error::{EngineError, Result};
use crate::events::{DomainEvent, NoticeLevel};
use crate::store::GraphStore;
use crate::types::{EditorState, WorkflowDocument};
use crate::validation::validate_document_value;

/// The current workflow, stamped for export
pub fn export_document(store: &GraphStore) -> WorkflowDocument {
    let mut workflow = store.get_workflow();
    workflow.version = document::FORMAT_VERSION.to_string();
    workflow.metadata.exported_at = Some(Utc::now());
    workflow
}

/// Pretty-printed JSON of the current workflow
pub fn export_json(store: &GraphStore) -> Result<String> {
    Ok(serde_json::to_string_pretty(&export_document(store))?)
}

/// Write the workflow into `dir` under a generated file name
pub fn export_to_file(store: &GraphStore, dir: impl AsRef<Path>) -> Result<PathBuf> {
    let json = export_json(store)?;
    let name = store.get_workflow().name;
    let filename = generate_filename(&name, "json", Utc::now().date_naive());
    let path = dir.as_ref().join(&filename);
    std::fs::write(&path, json)?;

    log::info!("Exported workflow to {:?}", path);
    let bus = store.bus();
    bus.emit(&DomainEvent::WorkflowExported {
        format: "json".to_string(),
        filename,
    });
    bus.emit(&DomainEvent::notice(
        NoticeLevel::Success,
        "Workflow exported successfully",
    ));
    Ok(path)
}

/// Validate and load a JSON document into the store
///
/// The UI flags survive the import; the selection does not.
pub fn import_json(store: &GraphStore, text: &str) -> Result<WorkflowDocument> {
    match parse_document(text) {
        Ok(mut workflow) => {
            let now = Utc::now();
            workflow.metadata.imported_at = Some(now);
            workflow.metadata.updated_at = now;

            let mut ui = store.get_ui_state();
            ui.selected_nodes.clear();
            ui.selected_connections.clear();
            ui.is_connecting = false;
            ui.connecting_from = None;

            store.set_state(EditorState {
                workflow: workflow.clone(),
                ui,
            });
            log::info!(
                "Imported workflow {} ({} nodes, {} connections)",
                workflow.id,
                workflow.nodes.len(),
                workflow.connections.len()
            );

            let bus = store.bus();
            bus.emit(&DomainEvent::WorkflowLoaded {
                workflow_id: workflow.id.clone(),
            });
            bus.emit(&DomainEvent::notice(
                NoticeLevel::Success,
                "Workflow imported successfully",
            ));
            Ok(workflow)
        }
        Err(err) => {
            log::warn!("Rejected workflow import: {}", err);
            store
                .bus()
                .emit(&DomainEvent::error(format!("Error importing workflow: {}", err)));
            Err(err)
        }
    }
}

/// Read a file and import it
pub fn import_from_file(store: &GraphStore, path: impl AsRef<Path>) -> Result<WorkflowDocument> {
    let text = std::fs::read_to_string(path.as_ref())?;
    import_json(store, &text)
}

/// Parse and validate a document without touching any store
pub fn parse_document(text: &str) -> Result<WorkflowDocument> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let errors = validate_document_value(&value);
    if !errors.is_empty() {
        return Err(EngineError::InvalidDocument(errors));
    }
    Ok(serde_json::from_value(value)?)
}

/// File name for an export: `<name>_<YYYY-MM-DD>.<ext>`
///
/// Anything but ASCII letters and digits becomes `_`, and the name is
/// lowercased.
pub fn generate_filename(name: &str, extension: &str, date: NaiveDate) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}.{}", stem, date.format("%Y-%m-%d"), extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBus, EventKind, VecEventSink};
    use crate::types::{ConnectionDraft, NodeDraft, NodeType};
    use std::sync::Arc;

    fn setup() -> (GraphStore, Arc<VecEventSink>) {
        let bus = Arc::new(EventBus::new());
        let sink = Arc::new(VecEventSink::new());
        bus.attach(sink.clone());
        (GraphStore::new(bus), sink)
    }

    fn populate(store: &GraphStore) {
        let a = store.add_node(NodeDraft::new(NodeType::Start, 0.0, 0.0));
        let b = store.add_node(NodeDraft::new(NodeType::Task, 0.0, 150.0).with_label("Review"));
        store.add_connection(ConnectionDraft::new(a.id, b.id).with_label("go"));
        store.rename_workflow("Order Flow");
    }

    #[test]
    fn test_export_stamps_metadata() {
        let (store, _sink) = setup();
        populate(&store);
        let json = export_json(&store).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["version"], "1.0");
        assert!(value["metadata"]["exportedAt"].is_string());
        assert_eq!(value["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(value["connections"][0]["label"], "go");
    }

    #[test]
    fn test_import_replaces_document() {
        let (source, _) = setup();
        populate(&source);
        let json = export_json(&source).unwrap();

        let (target, sink) = setup();
        let stale = target.add_node(NodeDraft::new(NodeType::Comment, 0.0, 0.0));
        target.select_node(&stale.id, false);
        sink.clear();

        let imported = import_json(&target, &json).unwrap();
        let workflow = target.get_workflow();
        assert_eq!(workflow.id, source.get_workflow().id);
        assert_eq!(workflow.name, "Order Flow");
        assert_eq!(workflow.nodes, source.get_nodes());
        assert!(workflow.metadata.imported_at.is_some());
        assert_eq!(imported.id, workflow.id);
        assert!(target.get_ui_state().selected_nodes.is_empty());
        assert_eq!(
            sink.kinds(),
            vec![EventKind::StateChanged, EventKind::WorkflowLoaded, EventKind::Notice]
        );
    }

    #[test]
    fn test_invalid_import_leaves_state_untouched() {
        let (store, sink) = setup();
        populate(&store);
        let before = store.get_state();
        sink.clear();

        let bad = r#"{"nodes": [{"id": "a", "type": "start", "x": 0, "y": 0}],
                      "connections": [{"id": "c", "from": "a", "to": "ghost"}]}"#;
        let err = import_json(&store, bad).unwrap_err();
        assert_eq!(err.validation_errors().len(), 1);
        assert!(Arc::ptr_eq(&before, &store.get_state()));
        assert_eq!(sink.kinds(), vec![EventKind::Error]);

        let err = import_json(&store, "{not json").unwrap_err();
        assert!(matches!(err, EngineError::Serialization(_)));
    }

    #[test]
    fn test_minimal_document_gets_defaults() {
        let doc = parse_document(
            r#"{"nodes": [{"id": "a", "type": "task", "x": 1, "y": 2}], "connections": []}"#,
        )
        .unwrap();
        assert!(doc.id.starts_with("workflow-"));
        assert_eq!(doc.name, "Untitled Workflow");
        assert_eq!(doc.metadata.zoom_level, 1.0);
        assert_eq!(doc.nodes[0].label, "");
    }

    #[test]
    fn test_generate_filename() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            generate_filename("Order Flow v2!", "json", date),
            "order_flow_v2__2024-03-09.json"
        );
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (store, sink) = setup();
        populate(&store);

        let path = export_to_file(&store, dir.path()).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("order_flow_"));
        assert!(sink.kinds().contains(&EventKind::WorkflowExported));

        let (target, _) = setup();
        import_from_file(&target, &path).unwrap();
        assert_eq!(target.get_nodes(), store.get_nodes());

        assert!(matches!(
            import_from_file(&target, dir.path().join("missing.json")),
            Err(EngineError::Io(_))
        ));
    }
}
