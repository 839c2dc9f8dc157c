//! Editing session for a single image.
//!
//! [`EditorSession`] owns everything that belongs to the image currently on
//! the canvas: its boxes, selection, viewport, undo history and the pointer
//! interaction in progress. Every input method mutates the session
//! synchronously and returns [`Effects`]; nothing here performs I/O.

use crate::config::EditorConfig;
use crate::constants::{TOOLBAR_ZOOM_IN, TOOLBAR_ZOOM_OUT};
use crate::history::HistoryStack;
use crate::interaction::{
    ClickTracker, CursorGlyph, Effects, Interaction, PointerButton, PointerEvent, PointerKind,
};
use crate::model::{
    BoundingBox, ClassId, ImageDimensions, LabelSource, SaveRequest, StoredAnnotations,
    denormalize_all, hit_test,
};
use crate::viewport::Viewport;

/// Identity of one loaded image.
///
/// The generation changes on every load, so reloading the same file yields
/// a distinct token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageToken {
    pub name: String,
    pub generation: u64,
}

/// The image currently being edited.
#[derive(Debug, Clone)]
struct LoadedImage {
    token: ImageToken,
    dims: ImageDimensions,
    label_source: LabelSource,
}

/// Editor state for the image on the canvas.
#[derive(Debug)]
pub struct EditorSession {
    image: Option<LoadedImage>,
    generation: u64,
    annotations: Vec<BoundingBox>,
    selection: Option<usize>,
    viewport: Viewport,
    container: (f32, f32),
    interaction: Interaction,
    history: HistoryStack<Vec<BoundingBox>>,
    clicks: ClickTracker,
    active_class: ClassId,
    show_labels: bool,
    cursor: CursorGlyph,
    options: EditorConfig,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl EditorSession {
    /// Create an empty session.
    pub fn new(options: EditorConfig) -> Self {
        Self {
            image: None,
            generation: 0,
            annotations: Vec::new(),
            selection: None,
            viewport: Viewport::identity(),
            container: (0.0, 0.0),
            interaction: Interaction::Idle,
            history: HistoryStack::new(options.history_limit),
            clicks: ClickTracker::new(options.double_click_window()),
            active_class: options.default_class,
            show_labels: options.show_labels,
            cursor: CursorGlyph::Crosshair,
            options,
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Start editing a new image.
    ///
    /// Converts the stored boxes to pixel space with the decoded image size,
    /// resets history and selection, fits the viewport and returns the new
    /// image token.
    pub fn load(
        &mut self,
        name: impl Into<String>,
        dims: ImageDimensions,
        stored: StoredAnnotations,
    ) -> ImageToken {
        self.generation += 1;
        let token = ImageToken {
            name: name.into(),
            generation: self.generation,
        };

        self.annotations = denormalize_all(&stored.annotations, dims);
        self.selection = None;
        self.interaction = Interaction::Idle;
        self.history.reset();
        self.clicks.reset();
        self.image = Some(LoadedImage {
            token: token.clone(),
            dims,
            label_source: stored.label_source,
        });
        self.fit_viewport();

        log::info!(
            "🖼️ Loaded {} ({}x{}, {} boxes, source {:?}, generation {})",
            token.name,
            dims.width,
            dims.height,
            self.annotations.len(),
            stored.label_source,
            token.generation
        );
        token
    }

    /// Drop the current image (e.g. after it was deleted).
    pub fn unload(&mut self) {
        if let Some(image) = self.image.take() {
            log::debug!("Unloaded {}", image.token.name);
        }
        self.annotations.clear();
        self.selection = None;
        self.interaction = Interaction::Idle;
        self.history.reset();
        self.clicks.reset();
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn token(&self) -> Option<&ImageToken> {
        self.image.as_ref().map(|image| &image.token)
    }

    pub fn image_name(&self) -> Option<&str> {
        self.token().map(|token| token.name.as_str())
    }

    pub fn dimensions(&self) -> Option<ImageDimensions> {
        self.image.as_ref().map(|image| image.dims)
    }

    pub fn label_source(&self) -> LabelSource {
        self.image
            .as_ref()
            .map(|image| image.label_source)
            .unwrap_or_default()
    }

    pub fn annotations(&self) -> &[BoundingBox] {
        &self.annotations
    }

    pub fn selection(&self) -> Option<usize> {
        self.selection
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn active_class(&self) -> ClassId {
        self.active_class
    }

    pub fn show_labels(&self) -> bool {
        self.show_labels
    }

    pub fn cursor(&self) -> CursorGlyph {
        self.cursor
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &HistoryStack<Vec<BoundingBox>> {
        &self.history
    }

    /// Grab distance for borders, in image units.
    pub fn edge_threshold(&self) -> f32 {
        if self.options.scale_edge_threshold_with_zoom {
            self.options.edge_threshold / self.viewport.scale
        } else {
            self.options.edge_threshold
        }
    }

    /// Snapshot of the current boxes ready for the save endpoint.
    ///
    /// `None` without an image or when the image has a zero dimension.
    pub fn save_request(&self) -> Option<SaveRequest> {
        let image = self.image.as_ref()?;
        if image.dims.is_empty() {
            log::warn!(
                "Not saving {}: image is {}x{}",
                image.token.name,
                image.dims.width,
                image.dims.height
            );
            return None;
        }
        Some(SaveRequest::from_pixels(
            image.token.name.clone(),
            &self.annotations,
            image.dims,
        ))
    }

    // =========================================================================
    // Simple state changes
    // =========================================================================

    /// Class used for new boxes.
    pub fn set_active_class(&mut self, class: ClassId) -> Effects {
        if self.active_class == class {
            return Effects::NONE;
        }
        self.active_class = class;
        log::debug!("🏷️ Active class: {}", class.name());
        // The in-progress rectangle is drawn in the active class color
        if self.interaction.is_drawing() {
            Effects::redraw()
        } else {
            Effects::NONE
        }
    }

    pub fn set_show_labels(&mut self, show: bool) -> Effects {
        if self.show_labels == show {
            return Effects::NONE;
        }
        self.show_labels = show;
        Effects::redraw()
    }

    pub fn toggle_labels(&mut self) -> Effects {
        self.set_show_labels(!self.show_labels)
    }

    /// Select a box by index (e.g. from a side list). Out-of-range clears.
    pub fn select(&mut self, index: Option<usize>) -> Effects {
        let index = index.filter(|&i| i < self.annotations.len());
        if self.selection == index {
            return Effects::NONE;
        }
        self.selection = index;
        Effects::redraw()
    }

    // =========================================================================
    // Viewport
    // =========================================================================

    /// Record the canvas size; refits if an image is loaded.
    pub fn set_container_size(&mut self, width: f32, height: f32) -> Effects {
        self.container = (width, height);
        if self.image.is_some() {
            self.fit_viewport();
            Effects::redraw()
        } else {
            Effects::NONE
        }
    }

    /// Fit the whole image into the canvas.
    pub fn fit_to_screen(&mut self) -> Effects {
        if self.image.is_none() {
            return Effects::NONE;
        }
        self.fit_viewport();
        Effects::redraw()
    }

    fn fit_viewport(&mut self) {
        if let Some(image) = &self.image {
            let (cw, ch) = self.container;
            self.viewport = if cw > 0.0 && ch > 0.0 {
                Viewport::fit_to_container(image.dims, cw, ch)
            } else {
                Viewport::identity()
            };
        }
    }

    /// Wheel zoom anchored at the cursor.
    pub fn handle_wheel(&mut self, sx: f32, sy: f32, delta_y: f32) -> Effects {
        if self.image.is_none() {
            return Effects::NONE;
        }
        self.viewport.zoom_wheel(sx, sy, delta_y);
        Effects::redraw()
    }

    /// Toolbar zoom in, anchored at the canvas center.
    pub fn zoom_in(&mut self) -> Effects {
        self.zoom_center(TOOLBAR_ZOOM_IN)
    }

    /// Toolbar zoom out, anchored at the canvas center.
    pub fn zoom_out(&mut self) -> Effects {
        self.zoom_center(TOOLBAR_ZOOM_OUT)
    }

    fn zoom_center(&mut self, factor: f32) -> Effects {
        if self.image.is_none() {
            return Effects::NONE;
        }
        let (cw, ch) = self.container;
        self.viewport.zoom_at(cw / 2.0, ch / 2.0, factor);
        Effects::redraw()
    }

    // =========================================================================
    // Box edits
    // =========================================================================

    /// Delete the selected box. Returns `None` when nothing is selected.
    pub fn delete_selected(&mut self) -> Option<Effects> {
        let index = self.selection?;
        Some(self.delete_box(index))
    }

    /// Delete a box by index.
    pub fn delete_box(&mut self, index: usize) -> Effects {
        if index >= self.annotations.len() {
            return Effects::NONE;
        }
        self.history.checkpoint(self.annotations.clone());
        let removed = self.annotations.remove(index);
        self.selection = None;
        self.clicks.reset();
        log::debug!("🗑️ Deleted {} box at index {}", removed.class_id.name(), index);
        Effects::redraw_and_persist()
    }

    /// Flip a box between Normal and Defect.
    pub fn toggle_class(&mut self, index: usize) -> Effects {
        if index >= self.annotations.len() {
            return Effects::NONE;
        }
        self.history.checkpoint(self.annotations.clone());
        let bbox = &mut self.annotations[index];
        bbox.toggle_class();
        log::debug!("🔄 Box {} is now {}", index, bbox.class_id.name());
        Effects::redraw_and_persist()
    }

    /// Restore the previous snapshot.
    pub fn undo(&mut self) -> Effects {
        if !self.interaction.is_idle() || !self.history.can_undo() {
            return Effects::NONE;
        }
        match self.history.undo(self.annotations.clone()) {
            Some(previous) => {
                self.annotations = previous;
                self.selection = None;
                self.clicks.reset();
                Effects::redraw_and_persist()
            }
            None => Effects::NONE,
        }
    }

    /// Re-apply the most recently undone snapshot.
    pub fn redo(&mut self) -> Effects {
        if !self.interaction.is_idle() || !self.history.can_redo() {
            return Effects::NONE;
        }
        match self.history.redo(self.annotations.clone()) {
            Some(next) => {
                self.annotations = next;
                self.selection = None;
                self.clicks.reset();
                Effects::redraw_and_persist()
            }
            None => Effects::NONE,
        }
    }

    /// Abort an in-progress rectangle without creating a box.
    pub fn cancel_drawing(&mut self) -> Effects {
        if self.interaction.is_drawing() {
            self.interaction = Interaction::Idle;
            log::trace!("Drawing cancelled");
            Effects::redraw()
        } else {
            Effects::NONE
        }
    }

    // =========================================================================
    // Pointer input
    // =========================================================================

    /// Reduce one pointer event against the current interaction.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> Effects {
        if self.image.is_none() {
            return Effects::NONE;
        }
        let effects = match event.kind {
            PointerKind::Down => self.pointer_down(&event),
            PointerKind::Move => self.pointer_move(&event),
            PointerKind::Up => self.pointer_up(&event),
        };
        self.update_cursor(effects)
    }

    fn pointer_down(&mut self, event: &PointerEvent) -> Effects {
        // A lost pointer-up leaves an interaction open; close it first
        let mut pending = Effects::NONE;
        if !self.interaction.is_idle() {
            log::debug!(
                "Pointer down while {}; finishing it first",
                self.interaction.name()
            );
            pending = self.pointer_up(event);
        }

        // Secondary button is left to the host (context menu)
        if event.button == PointerButton::Secondary {
            return pending;
        }

        let (ix, iy) = self.viewport.to_image_space(event.x, event.y);

        // 1. Pan gesture
        if event.is_pan_gesture() {
            self.interaction = Interaction::Panning {
                start: (event.x, event.y),
                start_offset: (self.viewport.offset_x, self.viewport.offset_y),
            };
            return pending.merge(Effects::NONE.with_cursor(CursorGlyph::Grabbing));
        }

        // 2. Border of the selected box
        if let Some(index) = self.selection {
            if let Some(bbox) = self.annotations.get(index) {
                let edges = bbox.edges_near(ix, iy, self.edge_threshold());
                if !edges.is_empty() {
                    self.interaction = Interaction::Resizing {
                        index,
                        edges,
                        before: self.annotations.clone(),
                    };
                    return pending
                        .merge(Effects::redraw().with_cursor(CursorGlyph::for_edges(edges)));
                }
            }
        }

        // 3. Inside a box (top-most wins)
        if let Some(index) = hit_test(&self.annotations, ix, iy) {
            if self.clicks.register(index, event.time) {
                return pending.merge(self.toggle_class(index));
            }
            self.selection = Some(index);
            self.interaction = Interaction::Dragging {
                index,
                last: (ix, iy),
                before: self.annotations.clone(),
            };
            return pending.merge(Effects::redraw().with_cursor(CursorGlyph::Move));
        }

        // 4. Empty canvas
        self.selection = None;
        self.clicks.reset();
        self.interaction = Interaction::Drawing {
            start: (ix, iy),
            current: (ix, iy),
        };
        pending.merge(Effects::redraw())
    }

    fn pointer_move(&mut self, event: &PointerEvent) -> Effects {
        let (ix, iy) = self.viewport.to_image_space(event.x, event.y);
        if self.interaction.is_idle() {
            return Effects::NONE.with_cursor(self.hover_cursor(ix, iy));
        }

        match &mut self.interaction {
            Interaction::Panning {
                start,
                start_offset,
            } => {
                self.viewport.offset_x = start_offset.0 + (event.x - start.0);
                self.viewport.offset_y = start_offset.1 + (event.y - start.1);
                Effects::redraw()
            }
            Interaction::Resizing { index, edges, .. } => match self.annotations.get_mut(*index) {
                Some(bbox) => {
                    bbox.resize_edge(*edges, ix, iy);
                    Effects::redraw()
                }
                None => Effects::NONE,
            },
            Interaction::Dragging { index, last, .. } => match self.annotations.get_mut(*index) {
                Some(bbox) => {
                    bbox.move_by(ix - last.0, iy - last.1);
                    *last = (ix, iy);
                    Effects::redraw()
                }
                None => Effects::NONE,
            },
            Interaction::Drawing { current, .. } => {
                *current = (ix, iy);
                Effects::redraw()
            }
            Interaction::Idle => Effects::NONE,
        }
    }

    fn pointer_up(&mut self, event: &PointerEvent) -> Effects {
        let (ix, iy) = self.viewport.to_image_space(event.x, event.y);

        match std::mem::take(&mut self.interaction) {
            Interaction::Idle => Effects::NONE,
            Interaction::Panning { .. } => Effects::NONE.with_cursor(CursorGlyph::Crosshair),
            Interaction::Resizing { before, .. } | Interaction::Dragging { before, .. } => {
                if before != self.annotations {
                    self.history.checkpoint(before);
                }
                Effects::redraw_and_persist()
            }
            Interaction::Drawing { start, .. } => {
                match BoundingBox::from_corners(self.active_class, start.0, start.1, ix, iy) {
                    Ok(bbox) => {
                        self.history.checkpoint(self.annotations.clone());
                        log::debug!(
                            "➕ Created {} box ({:.1}, {:.1}) {:.1}x{:.1}",
                            bbox.class_id.name(),
                            bbox.x,
                            bbox.y,
                            bbox.width,
                            bbox.height
                        );
                        self.annotations.push(bbox);
                        Effects::redraw_and_persist()
                    }
                    Err(e) => {
                        log::trace!("Discarded drawn box: {e}");
                        Effects::redraw()
                    }
                }
            }
        }
    }

    /// Cursor glyph for a hovering pointer. Never mutates boxes.
    fn hover_cursor(&self, ix: f32, iy: f32) -> CursorGlyph {
        let threshold = self.edge_threshold();
        for bbox in self.annotations.iter().rev() {
            let edges = bbox.edges_near(ix, iy, threshold);
            if !edges.is_empty() {
                return CursorGlyph::for_edges(edges);
            }
        }
        if hit_test(&self.annotations, ix, iy).is_some() {
            CursorGlyph::Move
        } else {
            CursorGlyph::Crosshair
        }
    }

    /// Only report cursor changes.
    fn update_cursor(&mut self, mut effects: Effects) -> Effects {
        if let Some(cursor) = effects.cursor {
            if cursor == self.cursor {
                effects.cursor = None;
            } else {
                self.cursor = cursor;
            }
        }
        effects
    }
}
