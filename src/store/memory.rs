//! In-process store.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::io::Cursor;

use crate::error::{StoreError, StoreResult};
use crate::model::{
    ExtractFramesRequest, ExtractFramesSummary, FilterBoxesRequest, FilterBoxesSummary,
    ImageDimensions, ImageEntry, ImageListing, LabelSource, NormalizedBox, SaveRequest,
    StoredAnnotations,
};
use crate::tasks::{TaskId, TaskKind, TaskProgress, TaskStatus};

use super::{AnnotationStore, ExportSummary};

/// Size of the blank frames produced by frame extraction.
const FRAME_DIMS: ImageDimensions = ImageDimensions {
    width: 64,
    height: 48,
};

#[derive(Debug, Clone)]
struct StoredImage {
    bytes: Vec<u8>,
    labels: StoredAnnotations,
}

/// Store that keeps images and labels in memory.
///
/// Interior mutability keeps the `&self` trait signature. Failures can be
/// switched on to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    images: RefCell<BTreeMap<String, StoredImage>>,
    /// Video name -> duration in seconds
    videos: RefCell<BTreeMap<String, u32>>,
    saves: RefCell<Vec<SaveRequest>>,
    started: RefCell<Vec<TaskKind>>,
    tasks: RefCell<HashMap<TaskId, VecDeque<TaskProgress>>>,
    task_script: RefCell<Option<Vec<TaskProgress>>>,
    next_task: Cell<u64>,
    progress_requests: Cell<usize>,
    offline: Cell<bool>,
    fail_saves: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an image from encoded bytes.
    pub fn insert_image(&self, name: impl Into<String>, bytes: Vec<u8>, labels: StoredAnnotations) {
        self.images
            .borrow_mut()
            .insert(name.into(), StoredImage { bytes, labels });
    }

    /// Add a blank grayscale PNG of the given size.
    pub fn insert_blank(
        &self,
        name: impl Into<String>,
        dims: ImageDimensions,
        labels: StoredAnnotations,
    ) -> StoreResult<()> {
        let img = image::GrayImage::new(dims.width, dims.height);
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png)?;
        self.insert_image(name, bytes.into_inner(), labels);
        Ok(())
    }

    /// Builder form of [`Self::insert_blank`].
    pub fn with_blank(
        self,
        name: impl Into<String>,
        dims: ImageDimensions,
        labels: StoredAnnotations,
    ) -> StoreResult<Self> {
        self.insert_blank(name, dims, labels)?;
        Ok(self)
    }

    /// Add a video that frame extraction will pick up.
    pub fn insert_video(&self, name: impl Into<String>, duration_secs: u32) {
        self.videos.borrow_mut().insert(name.into(), duration_secs);
    }

    /// Every request fails with a transport error while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.set(offline);
    }

    /// Save requests fail with a server error while set.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.set(fail);
    }

    /// Progress reports handed out by the next started task.
    pub fn set_task_script(&self, script: Vec<TaskProgress>) {
        *self.task_script.borrow_mut() = Some(script);
    }

    /// Register a task with scripted progress and return its id.
    pub fn push_task_progress(&self, script: Vec<TaskProgress>) -> TaskId {
        let id = self.allocate_task_id();
        self.tasks
            .borrow_mut()
            .insert(id.clone(), script.into_iter().collect());
        id
    }

    /// Save requests received so far, oldest first.
    pub fn saves(&self) -> Vec<SaveRequest> {
        self.saves.borrow().clone()
    }

    /// Tasks started so far.
    pub fn started_tasks(&self) -> Vec<TaskKind> {
        self.started.borrow().clone()
    }

    /// Number of progress requests served.
    pub fn progress_requests(&self) -> usize {
        self.progress_requests.get()
    }

    /// Stored boxes of one image.
    pub fn annotations_of(&self, name: &str) -> Option<Vec<NormalizedBox>> {
        self.images
            .borrow()
            .get(name)
            .map(|image| image.labels.annotations.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.images.borrow().contains_key(name)
    }

    fn allocate_task_id(&self) -> TaskId {
        let n = self.next_task.get() + 1;
        self.next_task.set(n);
        TaskId(format!("task-{n}"))
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.get() {
            Err(StoreError::transport("store is offline"))
        } else {
            Ok(())
        }
    }
}

impl AnnotationStore for MemoryStore {
    fn list_images(&self) -> StoreResult<ImageListing> {
        self.check_online()?;
        let images = self.images.borrow();
        let entries: Vec<ImageEntry> = images
            .iter()
            .map(|(name, image)| ImageEntry {
                name: name.clone(),
                labeled: !image.labels.annotations.is_empty(),
                label_source: image.labels.label_source,
            })
            .collect();
        let folders: BTreeSet<String> = entries
            .iter()
            .map(|e| e.folder().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        Ok(ImageListing {
            images: entries,
            folders: folders.into_iter().collect(),
        })
    }

    fn get_image(&self, name: &str) -> StoreResult<Vec<u8>> {
        self.check_online()?;
        self.images
            .borrow()
            .get(name)
            .map(|image| image.bytes.clone())
            .ok_or_else(|| StoreError::not_found(name))
    }

    fn get_annotations(&self, name: &str) -> StoreResult<StoredAnnotations> {
        self.check_online()?;
        self.images
            .borrow()
            .get(name)
            .map(|image| image.labels.clone())
            .ok_or_else(|| StoreError::not_found(name))
    }

    fn save_annotations(&self, request: &SaveRequest) -> StoreResult<()> {
        self.check_online()?;
        if self.fail_saves.get() {
            return Err(StoreError::status(500, "save rejected"));
        }
        let mut images = self.images.borrow_mut();
        let image = images
            .get_mut(&request.filename)
            .ok_or_else(|| StoreError::not_found(&request.filename))?;
        image.labels = StoredAnnotations {
            annotations: request.annotations.clone(),
            label_source: if request.annotations.is_empty() {
                LabelSource::None
            } else {
                LabelSource::Manual
            },
        };
        self.saves.borrow_mut().push(request.clone());
        Ok(())
    }

    fn delete_image(&self, name: &str) -> StoreResult<()> {
        self.check_online()?;
        self.images
            .borrow_mut()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(name))
    }

    fn start_task(&self, task: &TaskKind) -> StoreResult<TaskId> {
        self.check_online()?;
        task.validate()
            .map_err(|message| StoreError::status(400, message))?;
        self.started.borrow_mut().push(task.clone());
        let script = self.task_script.borrow_mut().take().unwrap_or_else(|| {
            vec![TaskProgress {
                status: TaskStatus::Completed,
                ..TaskProgress::default()
            }]
        });
        Ok(self.push_task_progress(script))
    }

    fn task_progress(&self, id: &TaskId) -> StoreResult<TaskProgress> {
        self.check_online()?;
        let mut tasks = self.tasks.borrow_mut();
        let queue = tasks
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.to_string()))?;
        self.progress_requests.set(self.progress_requests.get() + 1);
        // The last report sticks once the script runs out
        let progress = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        progress.ok_or_else(|| StoreError::decode(format!("task {id} has no progress")))
    }

    fn export_dataset(&self, files: Option<&[String]>) -> StoreResult<ExportSummary> {
        self.check_online()?;
        let images = self.images.borrow();
        let exported = images
            .iter()
            .filter(|(name, _)| files.is_none_or(|files| files.iter().any(|f| f == *name)))
            .filter(|(_, image)| !image.labels.annotations.is_empty())
            .count();
        Ok(ExportSummary {
            exported,
            output_dir: "memory".to_string(),
        })
    }

    fn filter_boxes(&self, request: &FilterBoxesRequest) -> StoreResult<FilterBoxesSummary> {
        self.check_online()?;
        request
            .validate()
            .map_err(|message| StoreError::status(400, message))?;

        let mut summary = FilterBoxesSummary {
            backup_path: Some("memory/labels_backup".to_string()),
            ..FilterBoxesSummary::default()
        };
        let mut images = self.images.borrow_mut();
        for (name, image) in images.iter_mut() {
            if !request.covers(name) || image.labels.annotations.is_empty() {
                continue;
            }
            let dims = ImageDimensions::from_encoded(&image.bytes)?;
            let before = image.labels.annotations.len();
            image.labels.annotations.retain(|n| {
                let b = n.to_pixels(dims);
                request.keeps(b.width, b.height)
            });
            let removed = before - image.labels.annotations.len();

            summary.total_files += 1;
            summary.total_boxes += before;
            if removed > 0 {
                summary.modified_files += 1;
                summary.filtered_boxes += removed;
            }
        }
        Ok(summary)
    }

    fn extract_frames(
        &self,
        request: &ExtractFramesRequest,
    ) -> StoreResult<ExtractFramesSummary> {
        self.check_online()?;
        request
            .validate()
            .map_err(|message| StoreError::status(400, message))?;

        let videos = self.videos.borrow().clone();
        let mut summary = ExtractFramesSummary::default();
        for (video, duration) in &videos {
            let stem = video.rsplit_once('.').map_or(video.as_str(), |(stem, _)| stem);
            let frames = duration.div_ceil(request.interval).min(request.max_frames);
            for i in 0..frames {
                self.insert_blank(
                    format!("{stem}/frame_{i:04}.png"),
                    FRAME_DIMS,
                    StoredAnnotations::default(),
                )?;
            }
            summary.total_frames += frames as usize;
            summary.videos_processed += 1;
        }
        Ok(summary)
    }
}
