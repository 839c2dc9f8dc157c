//! Pointer interaction state for the annotation canvas.
//!
//! The editor is always in exactly one [`Interaction`]. Pointer events are
//! reduced against it by [`crate::EditorSession::handle_pointer`], which
//! returns [`Effects`] telling the host what to do next.

use std::time::Duration;

use web_time::Instant;

use crate::constants::DOUBLE_CLICK_WINDOW;
use crate::keybindings::Modifiers;
use crate::model::{BoundingBox, EdgeSet};

/// Pointer button that triggered an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerButton {
    #[default]
    Primary,
    Middle,
    Secondary,
}

/// Phase of a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Down,
    Move,
    Up,
}

/// A pointer event in screen (canvas) coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub x: f32,
    pub y: f32,
    pub button: PointerButton,
    pub modifiers: Modifiers,
    pub time: Instant,
}

impl PointerEvent {
    pub fn new(kind: PointerKind, x: f32, y: f32, time: Instant) -> Self {
        Self {
            kind,
            x,
            y,
            button: PointerButton::Primary,
            modifiers: Modifiers::NONE,
            time,
        }
    }

    pub fn down(x: f32, y: f32, time: Instant) -> Self {
        Self::new(PointerKind::Down, x, y, time)
    }

    pub fn moved(x: f32, y: f32, time: Instant) -> Self {
        Self::new(PointerKind::Move, x, y, time)
    }

    pub fn up(x: f32, y: f32, time: Instant) -> Self {
        Self::new(PointerKind::Up, x, y, time)
    }

    pub fn with_button(mut self, button: PointerButton) -> Self {
        self.button = button;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Middle button or Ctrl-click starts a pan.
    pub fn is_pan_gesture(&self) -> bool {
        self.button == PointerButton::Middle || self.modifiers.ctrl
    }
}

/// Cursor glyph the host should display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorGlyph {
    #[default]
    Crosshair,
    Move,
    Grabbing,
    ResizeNs,
    ResizeEw,
    ResizeNesw,
    ResizeNwse,
}

impl CursorGlyph {
    /// Resize glyph for a set of grabbed edges.
    pub fn for_edges(edges: EdgeSet) -> Self {
        match (edges.north, edges.south, edges.east, edges.west) {
            (true, false, true, false) | (false, true, false, true) => CursorGlyph::ResizeNesw,
            (true, false, false, true) | (false, true, true, false) => CursorGlyph::ResizeNwse,
            (true, _, _, _) | (_, true, _, _) => CursorGlyph::ResizeNs,
            (_, _, true, _) | (_, _, _, true) => CursorGlyph::ResizeEw,
            _ => CursorGlyph::Crosshair,
        }
    }

    /// CSS cursor name.
    pub fn css_name(&self) -> &'static str {
        match self {
            CursorGlyph::Crosshair => "crosshair",
            CursorGlyph::Move => "move",
            CursorGlyph::Grabbing => "grabbing",
            CursorGlyph::ResizeNs => "ns-resize",
            CursorGlyph::ResizeEw => "ew-resize",
            CursorGlyph::ResizeNesw => "nesw-resize",
            CursorGlyph::ResizeNwse => "nwse-resize",
        }
    }
}

/// What the host should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Effects {
    /// Canvas needs to be re-rendered
    pub redraw: bool,
    /// Annotations changed and should be scheduled for saving
    pub persist: bool,
    /// New cursor glyph, if it changed
    pub cursor: Option<CursorGlyph>,
}

impl Effects {
    pub const NONE: Effects = Effects {
        redraw: false,
        persist: false,
        cursor: None,
    };

    pub fn redraw() -> Self {
        Self {
            redraw: true,
            ..Self::NONE
        }
    }

    pub fn redraw_and_persist() -> Self {
        Self {
            redraw: true,
            persist: true,
            cursor: None,
        }
    }

    pub fn with_cursor(mut self, cursor: CursorGlyph) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Combine two effect sets.
    pub fn merge(self, other: Effects) -> Self {
        Self {
            redraw: self.redraw || other.redraw,
            persist: self.persist || other.persist,
            cursor: other.cursor.or(self.cursor),
        }
    }
}

/// Current pointer interaction.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Interaction {
    /// Nothing in progress
    #[default]
    Idle,
    /// Dragging the whole image
    Panning {
        /// Screen position at pointer-down
        start: (f32, f32),
        /// Viewport offset at pointer-down
        start_offset: (f32, f32),
    },
    /// Rubber-banding a new box (image space)
    Drawing {
        start: (f32, f32),
        current: (f32, f32),
    },
    /// Moving a box
    Dragging {
        index: usize,
        /// Image point of the previous pointer event
        last: (f32, f32),
        /// Annotation set before the drag began
        before: Vec<BoundingBox>,
    },
    /// Moving one or two borders of the selected box
    Resizing {
        index: usize,
        edges: EdgeSet,
        /// Annotation set before the resize began
        before: Vec<BoundingBox>,
    },
}

impl Interaction {
    pub fn is_idle(&self) -> bool {
        matches!(self, Interaction::Idle)
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self, Interaction::Drawing { .. })
    }

    /// Name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Interaction::Idle => "Idle",
            Interaction::Panning { .. } => "Panning",
            Interaction::Drawing { .. } => "Drawing",
            Interaction::Dragging { .. } => "Dragging",
            Interaction::Resizing { .. } => "Resizing",
        }
    }

    /// Rectangle being drawn, as (start, current) image points.
    pub fn drawing_rect(&self) -> Option<((f32, f32), (f32, f32))> {
        match self {
            Interaction::Drawing { start, current } => Some((*start, *current)),
            _ => None,
        }
    }
}

/// Detects two clicks on the same box in quick succession.
#[derive(Debug, Clone)]
pub struct ClickTracker {
    last: Option<(usize, Instant)>,
    window: Duration,
}

impl Default for ClickTracker {
    fn default() -> Self {
        Self::new(DOUBLE_CLICK_WINDOW)
    }
}

impl ClickTracker {
    pub fn new(window: Duration) -> Self {
        Self { last: None, window }
    }

    /// Register a click on box `index`. Returns true when it completes a
    /// double click, in which case the tracker is cleared so a third click
    /// starts over.
    pub fn register(&mut self, index: usize, at: Instant) -> bool {
        if let Some((last_index, last_at)) = self.last {
            if last_index == index && at.saturating_duration_since(last_at) < self.window {
                self.last = None;
                return true;
            }
        }
        self.last = Some((index, at));
        false
    }

    /// Forget the previous click.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
