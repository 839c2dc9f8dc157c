//! Global constants for the annotation editor.

use std::time::Duration;

/// Smallest width or height (image pixels) a box may have.
pub const MIN_BOX_SIZE: f32 = 10.0;

/// Distance (image units) within which a pointer grabs a box border.
pub const RESIZE_EDGE_THRESHOLD: f32 = 15.0;

/// Two clicks on the same box within this window toggle its class.
pub const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(300);

/// Maximum number of undo entries kept per image.
pub const HISTORY_LIMIT: usize = 50;

/// Viewport scale bounds.
pub const MIN_SCALE: f32 = 0.1;
pub const MAX_SCALE: f32 = 10.0;

/// Scale multiplier for one wheel tick towards the user (zoom in).
pub const WHEEL_ZOOM_IN: f32 = 1.1;

/// Scale multiplier for one wheel tick away from the user (zoom out).
pub const WHEEL_ZOOM_OUT: f32 = 0.9;

/// Toolbar zoom step factors.
pub const TOOLBAR_ZOOM_IN: f32 = 1.2;
pub const TOOLBAR_ZOOM_OUT: f32 = 0.8;

/// Quiet period after the last edit before annotations are written back.
pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Interval between progress requests for a running backend task.
pub const TASK_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Side length (screen pixels) of the resize handles drawn on the selected box.
pub const HANDLE_SIZE: f32 = 8.0;

/// Stroke widths for box outlines.
pub const STROKE_WIDTH: f32 = 2.0;
pub const SELECTED_STROKE_WIDTH: f32 = 4.0;

/// Label chip geometry (screen pixels).
pub const LABEL_HEIGHT: f32 = 20.0;
pub const LABEL_WIDTH: f32 = 60.0;
pub const LABEL_WIDTH_WITH_CONFIDENCE: f32 = 90.0;
pub const LABEL_FONT_SIZE: f32 = 12.0;

/// Dash pattern (on, off) of the rectangle being drawn.
pub const DRAW_DASH: [f32; 2] = [5.0, 5.0];

/// Default confidence threshold for auto-labeling.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;

/// Default perceptual-hash distance for duplicate detection.
pub const DEFAULT_DUPLICATE_THRESHOLD: u32 = 5;

/// Largest meaningful hash distance (64-bit hashes).
pub const MAX_DUPLICATE_THRESHOLD: u32 = 64;

/// Default pixel standard deviation below which an image counts as blank.
pub const DEFAULT_BLANK_STD_THRESHOLD: f32 = 25.0;

/// Default accepted box side range (pixels) when filtering extreme boxes.
pub const DEFAULT_FILTER_MIN_SIZE: u32 = 50;
pub const DEFAULT_FILTER_MAX_SIZE: u32 = 800;

/// Default frame extraction: one frame every 2 seconds, at most 100 per video.
pub const DEFAULT_FRAME_INTERVAL_SECS: u32 = 2;
pub const DEFAULT_MAX_FRAMES: u32 = 100;
