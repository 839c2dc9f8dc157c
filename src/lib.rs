//! candy_annotate - bounding box labeling for normal/defect inspection images
//!
//! Editor core for a two-class annotation tool: coordinate transforms, a box
//! model with size invariants, per-image undo/redo, a pointer interaction
//! state machine, a backend-agnostic draw list, debounced saving, polling
//! of long-running backend tasks and dataset maintenance calls.
//!
//! Everything is synchronous and clock-driven: the host feeds input events
//! and calls [`AnnotatorApp::tick`] with the current time.

pub mod app;
pub mod batch;
pub mod config;
pub mod constants;
pub mod error;
pub mod files;
pub mod history;
pub mod interaction;
pub mod keybindings;
#[cfg(not(target_arch = "wasm32"))]
pub mod logging;
pub mod model;
pub mod persistence;
pub mod render;
pub mod session;
pub mod store;
pub mod tasks;
pub mod viewport;

pub use app::{AnnotatorApp, KeyOutcome, TaskUpdate, TickReport};
pub use config::{AppConfig, ConfigError, LogLevel};
pub use error::{BoxError, StoreError, StoreResult};
pub use files::{FileFilter, FileList, FolderStats};
pub use history::HistoryStack;
pub use interaction::{CursorGlyph, Effects, Interaction, PointerButton, PointerEvent};
pub use keybindings::{EditorCommand, FocusTarget, KeyBindings, KeyCode, KeyEvent, Modifiers};
pub use model::{
    BoundingBox, ClassId, ExtractFramesRequest, ExtractFramesSummary, FilterBoxesRequest,
    FilterBoxesSummary, ImageDimensions, LabelSource, NormalizedBox,
};
pub use persistence::SaveScheduler;
pub use render::{DrawCommand, Scene};
pub use session::{EditorSession, ImageToken};
#[cfg(not(target_arch = "wasm32"))]
pub use store::HttpStore;
pub use store::{AnnotationStore, ExportSummary, MemoryStore};
pub use tasks::{
    AbortHandle, DetectorModel, TaskId, TaskKind, TaskOutcome, TaskPoller, TaskProgress,
    TaskTarget,
};
pub use viewport::Viewport;
