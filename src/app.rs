//! Annotator application controller.
//!
//! Wires the editing session to the store:
//! - File list loading, filtering and navigation
//! - Debounced saving of edits, explicit save
//! - Image deletion
//! - Backend task start, polling and abort
//! - Extreme-box filtering and frame extraction
//!
//! The controller is driven by the host. Input events are forwarded to
//! [`AnnotatorApp`] methods and [`AnnotatorApp::tick`] is called from the
//! host's timer or frame loop.

use web_time::Instant;

use crate::config::AppConfig;
use crate::error::{StoreError, StoreResult};
use crate::files::FileList;
use crate::interaction::{Effects, PointerEvent};
use crate::keybindings::{EditorCommand, KeyEvent};
use crate::model::{
    ExtractFramesRequest, ExtractFramesSummary, FilterBoxesRequest, FilterBoxesSummary,
    ImageDimensions,
};
use crate::persistence::{FlushReport, SaveScheduler, flush_all, flush_due, run_job};
use crate::render::{RenderInput, Scene, render};
use crate::session::{EditorSession, ImageToken};
use crate::store::AnnotationStore;
use crate::tasks::{AbortHandle, PollStatus, TaskId, TaskKind, TaskOutcome, TaskPoller, TaskProgress};

// ============================================================================
// Results reported to the host
// ============================================================================

/// What a key press did.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    /// No binding matched
    Ignored,
    /// Handled inside the editor
    Handled(Effects),
    /// Another image was opened
    Opened(ImageToken),
    /// Annotations were saved explicitly
    Saved,
    /// Nothing selected: the host should confirm deleting this image,
    /// then call [`AnnotatorApp::delete_current_image`]
    ConfirmDeleteImage(String),
}

/// State change of the running task during a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
    Progress(TaskProgress),
    Finished(TaskOutcome),
}

/// What happened during one [`AnnotatorApp::tick`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Debounced saves sent this tick
    pub saves: FlushReport,
    /// Task progress or completion
    pub task: Option<TaskUpdate>,
    /// The canvas should be redrawn
    pub redraw: bool,
}

#[derive(Debug)]
struct RunningTask {
    kind: TaskKind,
    poller: TaskPoller,
    abort: AbortHandle,
}

// ============================================================================
// Application
// ============================================================================

/// The annotator: one store, one file list, one editing session.
#[derive(Debug)]
pub struct AnnotatorApp<S: AnnotationStore> {
    store: S,
    config: AppConfig,
    files: FileList,
    session: EditorSession,
    saves: SaveScheduler,
    task: Option<RunningTask>,
    canvas: (f32, f32),
}

impl<S: AnnotationStore> AnnotatorApp<S> {
    pub fn new(store: S, config: AppConfig) -> Self {
        let session = EditorSession::new(config.editor.clone());
        let saves = SaveScheduler::new().with_debounce(config.timing.save_debounce());
        Self {
            store,
            config,
            files: FileList::new(),
            session,
            saves,
            task: None,
            canvas: (0.0, 0.0),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn files(&self) -> &FileList {
        &self.files
    }

    /// File list for filter and selection changes.
    pub fn files_mut(&mut self) -> &mut FileList {
        &mut self.files
    }

    pub fn session(&self) -> &EditorSession {
        &self.session
    }

    pub fn saves(&self) -> &SaveScheduler {
        &self.saves
    }

    /// Progress of the running task, if any report arrived yet.
    pub fn task_progress(&self) -> Option<&TaskProgress> {
        self.task.as_ref().and_then(|t| t.poller.last_progress())
    }

    pub fn task_running(&self) -> bool {
        self.task.is_some()
    }

    /// Earliest time [`Self::tick`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let task = self.task.as_ref().and_then(|t| t.poller.next_deadline());
        match (self.saves.next_deadline(), task) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // =========================================================================
    // Images
    // =========================================================================

    /// Reload the image list from the store.
    pub fn refresh(&mut self) -> StoreResult<()> {
        let listing = self.store.list_images()?;
        log::info!(
            "Loaded {} images in {} folders",
            listing.images.len(),
            listing.folders.len()
        );
        self.files.replace(listing);
        Ok(())
    }

    /// Open an image for editing.
    ///
    /// A pending save for the same image is sent first so the fetched
    /// annotations include it.
    pub fn open_image(&mut self, name: &str) -> StoreResult<ImageToken> {
        if let Some(job) = self.saves.take(name) {
            log::debug!("Flushing pending save of {} before reopening", name);
            if let Err(e) = run_job(&self.store, &mut self.files, &job.request) {
                log::warn!("Save of {} before reopening failed: {}", name, e);
            }
        }

        let bytes = self.store.get_image(name)?;
        let dims = ImageDimensions::from_encoded(&bytes)?;
        let stored = self.store.get_annotations(name)?;
        Ok(self.session.load(name, dims, stored))
    }

    /// Move through the filtered list. Returns `None` at either end.
    pub fn navigate(&mut self, delta: isize) -> StoreResult<Option<ImageToken>> {
        let Some(target) = self
            .files
            .neighbor(self.session.image_name(), delta)
            .map(str::to_string)
        else {
            return Ok(None);
        };
        self.open_image(&target).map(Some)
    }

    /// Delete the image on the canvas and open the one that took its place.
    pub fn delete_current_image(&mut self) -> StoreResult<Option<ImageToken>> {
        let Some(name) = self.session.image_name().map(str::to_string) else {
            return Ok(None);
        };
        self.saves.cancel(&name);
        self.store.delete_image(&name)?;
        log::info!("Deleted image {}", name);

        let removed_index = self.files.remove(&name);
        self.session.unload();
        let next = match removed_index {
            Some(index) => self.files.after_removal(index),
            None => self.files.neighbor(None, 0),
        }
        .map(str::to_string);

        match next {
            Some(next) => self.open_image(&next).map(Some),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Input
    // =========================================================================

    /// The canvas was resized.
    pub fn set_canvas_size(&mut self, width: f32, height: f32) -> Effects {
        self.canvas = (width, height);
        self.session.set_container_size(width, height)
    }

    pub fn handle_pointer(&mut self, event: PointerEvent) -> Effects {
        let effects = self.session.handle_pointer(event);
        self.apply(effects, event.time)
    }

    pub fn handle_wheel(&mut self, x: f32, y: f32, delta_y: f32) -> Effects {
        self.session.handle_wheel(x, y, delta_y)
    }

    pub fn zoom_in(&mut self) -> Effects {
        self.session.zoom_in()
    }

    pub fn zoom_out(&mut self) -> Effects {
        self.session.zoom_out()
    }

    /// Dispatch a key press through the configured bindings.
    pub fn handle_key(&mut self, event: &KeyEvent, now: Instant) -> StoreResult<KeyOutcome> {
        let Some(command) = self.config.keybindings.command_for(event) else {
            return Ok(KeyOutcome::Ignored);
        };

        let effects = match command {
            EditorCommand::PreviousImage | EditorCommand::NextImage => {
                let delta = if command == EditorCommand::NextImage { 1 } else { -1 };
                return Ok(match self.navigate(delta)? {
                    Some(token) => KeyOutcome::Opened(token),
                    None => KeyOutcome::Handled(Effects::NONE),
                });
            }
            EditorCommand::Delete => match self.session.delete_selected() {
                Some(effects) => effects,
                None => {
                    return Ok(match self.session.image_name() {
                        Some(name) => KeyOutcome::ConfirmDeleteImage(name.to_string()),
                        None => KeyOutcome::Handled(Effects::NONE),
                    });
                }
            },
            EditorCommand::Save => {
                self.save_now()?;
                return Ok(KeyOutcome::Saved);
            }
            EditorCommand::SelectClass(class) => self.session.set_active_class(class),
            EditorCommand::Undo => self.session.undo(),
            EditorCommand::Redo => self.session.redo(),
            EditorCommand::CancelDrawing => self.session.cancel_drawing(),
            EditorCommand::ToggleLabels => self.session.toggle_labels(),
            EditorCommand::FitToScreen => self.session.fit_to_screen(),
        };
        Ok(KeyOutcome::Handled(self.apply(effects, now)))
    }

    /// Schedule a save when the effects ask for one.
    fn apply(&mut self, effects: Effects, now: Instant) -> Effects {
        if effects.persist {
            if let (Some(token), Some(request)) =
                (self.session.token().cloned(), self.session.save_request())
            {
                self.saves.schedule(token, request, now);
            }
        }
        effects
    }

    // =========================================================================
    // Saving
    // =========================================================================

    /// Save the current image immediately, bypassing the debounce.
    pub fn save_now(&mut self) -> StoreResult<()> {
        let Some(request) = self.session.save_request() else {
            return Ok(());
        };
        self.saves.cancel(&request.filename);
        run_job(&self.store, &mut self.files, &request)?;
        log::info!("Saved {}", request.filename);
        Ok(())
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    /// Start a backend task. A task already being polled is abandoned.
    pub fn start_task(&mut self, kind: TaskKind, now: Instant) -> StoreResult<TaskId> {
        if let Some(previous) = self.task.take() {
            log::warn!(
                "Starting {} while {} is running; no longer polling {}",
                kind.name(),
                previous.kind.name(),
                previous.poller.id()
            );
            previous.abort.abort();
        }

        let id = self.store.start_task(&kind)?;
        log::info!("Started {} as task {}", kind.name(), id);
        let abort = AbortHandle::new();
        let poller = TaskPoller::new(id.clone(), &kind, abort.signal(), now)
            .with_interval(self.config.timing.task_poll_interval());
        self.task = Some(RunningTask {
            kind,
            poller,
            abort,
        });
        Ok(id)
    }

    /// Stop polling the running task. Reported as cancelled on the next tick.
    pub fn cancel_task(&mut self) -> bool {
        match &self.task {
            Some(task) => {
                task.abort.abort();
                true
            }
            None => false,
        }
    }

    /// Pick up labels and files changed on the server side.
    fn reload_from_store(&mut self) -> bool {
        if let Err(e) = self.refresh() {
            log::warn!("Failed to reload image list: {}", e);
            return false;
        }
        let Some(current) = self.session.image_name().map(str::to_string) else {
            return false;
        };
        let target = if self.files.get(&current).is_some() {
            Some(current)
        } else {
            self.session.unload();
            self.files.neighbor(None, 0).map(str::to_string)
        };
        if let Some(target) = target {
            if let Err(e) = self.open_image(&target) {
                log::warn!("Failed to reopen {}: {}", target, e);
            }
        }
        true
    }

    // =========================================================================
    // Dataset maintenance
    // =========================================================================

    /// Drop boxes of extreme size on the server, then reload.
    ///
    /// Pending saves are sent first so the filter sees the latest edits.
    pub fn filter_boxes(
        &mut self,
        request: &FilterBoxesRequest,
    ) -> StoreResult<FilterBoxesSummary> {
        request
            .validate()
            .map_err(|message| StoreError::status(400, message))?;
        let flushed = flush_all(&mut self.saves, &self.store, &mut self.files);
        if !flushed.failed.is_empty() {
            log::warn!("Filtering with {} unsaved images", flushed.failed.len());
        }

        let summary = self.store.filter_boxes(request)?;
        log::info!(
            "🔷 Filtered {}/{} boxes in {}/{} files",
            summary.filtered_boxes,
            summary.total_boxes,
            summary.modified_files,
            summary.total_files
        );
        self.reload_from_store();
        Ok(summary)
    }

    /// Extract video frames on the server, then reload the image list.
    pub fn extract_frames(
        &mut self,
        request: &ExtractFramesRequest,
    ) -> StoreResult<ExtractFramesSummary> {
        let summary = self.store.extract_frames(request)?;
        log::info!(
            "📹 Extracted {} frames from {} videos",
            summary.total_frames,
            summary.videos_processed
        );
        if let Err(e) = self.refresh() {
            log::warn!("Failed to reload image list: {}", e);
        }
        Ok(summary)
    }

    // =========================================================================
    // Timers
    // =========================================================================

    /// Run due saves and poll the running task.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport {
            saves: flush_due(&mut self.saves, &self.store, &mut self.files, now),
            ..TickReport::default()
        };

        let status = match self.task.as_mut() {
            Some(task) => task.poller.poll(&self.store, now),
            None => PollStatus::Waiting,
        };
        match status {
            PollStatus::Waiting => {}
            PollStatus::Progress(progress) => {
                report.task = Some(TaskUpdate::Progress(progress));
            }
            PollStatus::Finished(outcome) => {
                self.task = None;
                if matches!(outcome, TaskOutcome::Completed(_)) {
                    report.redraw = self.reload_from_store();
                }
                report.task = Some(TaskUpdate::Finished(outcome));
            }
        }
        report
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Draw list for the current canvas.
    pub fn render(&self) -> Scene {
        render(&RenderInput::from_session(&self.session, self.canvas))
    }
}
