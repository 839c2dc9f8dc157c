//! Data models for the annotation editor.

mod bbox;
mod wire;

pub use bbox::{BoundingBox, ClassId, EdgeSet, hit_test};
pub use wire::{
    ExtractFramesRequest, ExtractFramesSummary, FilterBoxesRequest, FilterBoxesSummary,
    ImageDimensions, ImageEntry, ImageListing, LabelSource, NormalizedBox, SaveRequest,
    StoredAnnotations, denormalize_all, normalize_all,
};
