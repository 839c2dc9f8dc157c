//! Access to the image and annotation backend.
//!
//! [`AnnotationStore`] is the seam between the editor and wherever images
//! live. [`HttpStore`] talks to the labeling server; [`MemoryStore`] keeps
//! everything in process and is used by tests and dry runs.

#[cfg(not(target_arch = "wasm32"))]
mod http;
pub mod memory;

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::model::{
    ExtractFramesRequest, ExtractFramesSummary, FilterBoxesRequest, FilterBoxesSummary,
    ImageListing, SaveRequest, StoredAnnotations,
};
use crate::tasks::{TaskId, TaskKind, TaskProgress};

#[cfg(not(target_arch = "wasm32"))]
pub use http::HttpStore;
pub use memory::MemoryStore;

/// Result of a dataset export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    /// Number of image/label pairs written
    #[serde(default)]
    pub exported: usize,
    /// Directory the dataset was written to
    #[serde(default)]
    pub output_dir: String,
}

/// Backend holding images, their annotations and long-running tasks.
///
/// All calls are synchronous. Image names are relative paths such as
/// `lot3/img_0001.jpg`.
pub trait AnnotationStore {
    /// List every image with its label state.
    fn list_images(&self) -> StoreResult<ImageListing>;

    /// Fetch the encoded image bytes.
    fn get_image(&self, name: &str) -> StoreResult<Vec<u8>>;

    /// Fetch the stored annotations in normalized form.
    fn get_annotations(&self, name: &str) -> StoreResult<StoredAnnotations>;

    /// Replace the annotations of one image.
    fn save_annotations(&self, request: &SaveRequest) -> StoreResult<()>;

    /// Delete an image together with its labels.
    fn delete_image(&self, name: &str) -> StoreResult<()>;

    /// Start a backend task and return its id.
    fn start_task(&self, task: &TaskKind) -> StoreResult<TaskId>;

    /// Current progress of a task.
    fn task_progress(&self, id: &TaskId) -> StoreResult<TaskProgress>;

    /// Export labeled images as a training dataset. `None` exports everything.
    fn export_dataset(&self, files: Option<&[String]>) -> StoreResult<ExportSummary>;

    /// Drop boxes of extreme size from the targeted images' labels.
    fn filter_boxes(&self, request: &FilterBoxesRequest) -> StoreResult<FilterBoxesSummary>;

    /// Extract frames from the uploaded videos into new images.
    fn extract_frames(&self, request: &ExtractFramesRequest)
    -> StoreResult<ExtractFramesSummary>;
}

impl<S: AnnotationStore + ?Sized> AnnotationStore for &S {
    fn list_images(&self) -> StoreResult<ImageListing> {
        (**self).list_images()
    }

    fn get_image(&self, name: &str) -> StoreResult<Vec<u8>> {
        (**self).get_image(name)
    }

    fn get_annotations(&self, name: &str) -> StoreResult<StoredAnnotations> {
        (**self).get_annotations(name)
    }

    fn save_annotations(&self, request: &SaveRequest) -> StoreResult<()> {
        (**self).save_annotations(request)
    }

    fn delete_image(&self, name: &str) -> StoreResult<()> {
        (**self).delete_image(name)
    }

    fn start_task(&self, task: &TaskKind) -> StoreResult<TaskId> {
        (**self).start_task(task)
    }

    fn task_progress(&self, id: &TaskId) -> StoreResult<TaskProgress> {
        (**self).task_progress(id)
    }

    fn export_dataset(&self, files: Option<&[String]>) -> StoreResult<ExportSummary> {
        (**self).export_dataset(files)
    }

    fn filter_boxes(&self, request: &FilterBoxesRequest) -> StoreResult<FilterBoxesSummary> {
        (**self).filter_boxes(request)
    }

    fn extract_frames(
        &self,
        request: &ExtractFramesRequest,
    ) -> StoreResult<ExtractFramesSummary> {
        (**self).extract_frames(request)
    }
}
