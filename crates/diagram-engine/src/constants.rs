//! Engine-wide constants
//!
//! Single source of truth for the editor's magic numbers and defaults.

/// Document defaults
pub mod document {
    /// Name given to new and unnamed workflows
    pub const DEFAULT_NAME: &str = "Untitled Workflow";
    /// Version string written into exported documents
    pub const FORMAT_VERSION: &str = "1.0";
    /// Default stroke color for connections
    pub const CONNECTION_COLOR: &str = "#666";
}

/// Undo/redo history
pub mod history {
    /// Maximum number of commands kept on the undo stack
    pub const CAPACITY: usize = 50;
}

/// Auto-layout spacing (document units)
pub mod layout {
    pub const PADDING: f64 = 100.0;
    pub const HORIZONTAL_SPACING: f64 = 150.0;
    pub const VERTICAL_SPACING: f64 = 120.0;
    /// Grid layout cell size
    pub const GRID_CELL_WIDTH: f64 = 200.0;
    pub const GRID_CELL_HEIGHT: f64 = 150.0;
}

/// Canvas viewport limits
pub mod canvas {
    pub const MIN_ZOOM: f64 = 0.1;
    pub const MAX_ZOOM: f64 = 3.0;
    pub const DEFAULT_ZOOM: f64 = 1.0;
}

/// Editing gestures handled by the core
pub mod editing {
    /// Offset applied to duplicated nodes
    pub const DUPLICATE_OFFSET: f64 = 50.0;
    /// Suffix appended to duplicated node labels
    pub const DUPLICATE_SUFFIX: &str = " (Copy)";
}

/// Node grouping
pub mod groups {
    /// Groups with fewer members are dissolved
    pub const MIN_MEMBERS: usize = 2;
    pub const DEFAULT_NAME: &str = "New Group";
    pub const DEFAULT_COLOR: &str = "#E3F2FD";
    /// Padding around member nodes when computing group bounds
    pub const PADDING: f64 = 20.0;
    /// Dissolved groups remembered for revival on undo
    pub const DISSOLVED_MEMORY: usize = 50;
}

/// Autosave persistence
pub mod autosave {
    /// Debounce interval after the last change
    pub const INTERVAL_MS: u64 = 5000;
    /// File name used by the file-backed storage
    pub const FILE_NAME: &str = "autosave.json";
}

/// Configuration file
pub mod config {
    pub const FILE_NAME: &str = "flowplan.json";
}
