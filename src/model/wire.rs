//! Wire types exchanged with the labeling backend.
//!
//! Stored boxes use the normalized center format (fractions of the decoded
//! image size). Saves are captured in that format so a pending save does not
//! depend on the session; the HTTP store turns them back into pixel boxes
//! for the save route.

use serde::{Deserialize, Serialize};

use super::bbox::{BoundingBox, ClassId};
use crate::constants::{
    DEFAULT_FILTER_MAX_SIZE, DEFAULT_FILTER_MIN_SIZE, DEFAULT_FRAME_INTERVAL_SECS,
    DEFAULT_MAX_FRAMES,
};

/// Decoded image size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Read the dimensions from encoded image bytes without a full decode.
    pub fn from_encoded(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let (width, height) = image::ImageReader::new(std::io::Cursor::new(bytes))
            .with_guessed_format()?
            .into_dimensions()?;
        Ok(Self { width, height })
    }

    pub fn width_f32(&self) -> f32 {
        self.width as f32
    }

    pub fn height_f32(&self) -> f32 {
        self.height as f32
    }

    /// Zero width or height; nothing can be normalized against it.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A box in the normalized center format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub class: ClassId,
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl NormalizedBox {
    /// Convert a pixel-space box using the decoded image size.
    ///
    /// Returns `None` for an image with a zero dimension.
    pub fn from_pixels(bbox: &BoundingBox, dims: ImageDimensions) -> Option<Self> {
        if dims.is_empty() {
            return None;
        }
        let img_w = dims.width_f32();
        let img_h = dims.height_f32();
        Some(Self {
            class: bbox.class_id,
            x_center: (bbox.x + bbox.width / 2.0) / img_w,
            y_center: (bbox.y + bbox.height / 2.0) / img_h,
            width: bbox.width / img_w,
            height: bbox.height / img_h,
            confidence: bbox.confidence,
        })
    }

    /// Convert back to pixel space.
    ///
    /// No minimum-size check is applied: boxes coming from disk or a detector
    /// are kept as they are.
    pub fn to_pixels(&self, dims: ImageDimensions) -> BoundingBox {
        let width = self.width * dims.width_f32();
        let height = self.height * dims.height_f32();
        BoundingBox {
            class_id: self.class,
            x: self.x_center * dims.width_f32() - width / 2.0,
            y: self.y_center * dims.height_f32() - height / 2.0,
            width,
            height,
            confidence: self.confidence,
        }
    }
}

/// Convert a whole pixel-space set for transmission.
///
/// An image with a zero dimension yields no boxes.
pub fn normalize_all(boxes: &[BoundingBox], dims: ImageDimensions) -> Vec<NormalizedBox> {
    if dims.is_empty() && !boxes.is_empty() {
        log::warn!(
            "Cannot normalize {} boxes against a {}x{} image",
            boxes.len(),
            dims.width,
            dims.height
        );
    }
    boxes
        .iter()
        .filter_map(|b| NormalizedBox::from_pixels(b, dims))
        .collect()
}

/// Convert a received set to pixel space.
pub fn denormalize_all(boxes: &[NormalizedBox], dims: ImageDimensions) -> Vec<BoundingBox> {
    boxes.iter().map(|b| b.to_pixels(dims)).collect()
}

/// Who produced the labels currently stored for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LabelSource {
    Ai,
    Manual,
    Unknown,
    #[default]
    None,
}

impl LabelSource {
    pub fn name(&self) -> &'static str {
        match self {
            LabelSource::Ai => "AI",
            LabelSource::Manual => "Manual",
            LabelSource::Unknown => "Unknown",
            LabelSource::None => "",
        }
    }
}

/// One image known to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub name: String,
    #[serde(default)]
    pub labeled: bool,
    #[serde(default, deserialize_with = "nullable_source")]
    pub label_source: LabelSource,
}

impl ImageEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labeled: false,
            label_source: LabelSource::None,
        }
    }

    /// Folder part of the name, empty for top-level images.
    pub fn folder(&self) -> &str {
        self.name
            .rsplit_once('/')
            .map(|(folder, _)| folder)
            .unwrap_or("")
    }
}

fn nullable_source<'de, D>(deserializer: D) -> Result<LabelSource, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<LabelSource>::deserialize(deserializer)?.unwrap_or_default())
}

/// Response of the image listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageListing {
    #[serde(default)]
    pub images: Vec<ImageEntry>,
    #[serde(default)]
    pub folders: Vec<String>,
}

/// Annotations stored for one image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredAnnotations {
    #[serde(default)]
    pub annotations: Vec<NormalizedBox>,
    #[serde(default, deserialize_with = "nullable_source")]
    pub label_source: LabelSource,
}

/// Body of a save request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRequest {
    pub filename: String,
    pub annotations: Vec<NormalizedBox>,
    pub image_width: u32,
    pub image_height: u32,
}

impl SaveRequest {
    /// Build a save request from pixel-space boxes.
    pub fn from_pixels(
        filename: impl Into<String>,
        boxes: &[BoundingBox],
        dims: ImageDimensions,
    ) -> Self {
        Self {
            filename: filename.into(),
            annotations: normalize_all(boxes, dims),
            image_width: dims.width,
            image_height: dims.height,
        }
    }

    pub fn dimensions(&self) -> ImageDimensions {
        ImageDimensions::new(self.image_width, self.image_height)
    }
}

/// Body of the extreme-box filter: drop boxes whose width or height in
/// pixels falls outside `[min_size, max_size]`.
///
/// Targets either explicit images or a folder (`""` = every folder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterBoxesRequest {
    pub min_size: u32,
    pub max_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

impl Default for FilterBoxesRequest {
    fn default() -> Self {
        Self::new(DEFAULT_FILTER_MIN_SIZE, DEFAULT_FILTER_MAX_SIZE)
    }
}

impl FilterBoxesRequest {
    /// Filter every image.
    pub fn new(min_size: u32, max_size: u32) -> Self {
        Self {
            min_size,
            max_size,
            images: None,
            folder: Some(String::new()),
        }
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = Some(images);
        self.folder = None;
        self
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.images = None;
        self.folder = Some(folder.into());
        self
    }

    /// Reject an empty or inverted size range.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_size == 0 || self.max_size <= self.min_size {
            return Err(format!(
                "Invalid size range {}..{}: need 0 < min < max",
                self.min_size, self.max_size
            ));
        }
        Ok(())
    }

    /// Whether `name` is one of the targeted images.
    pub fn covers(&self, name: &str) -> bool {
        if let Some(images) = &self.images {
            return images.iter().any(|image| image == name);
        }
        match self.folder.as_deref() {
            None | Some("") => true,
            Some(folder) => name
                .strip_prefix(folder)
                .is_some_and(|rest| rest.starts_with('/')),
        }
    }

    /// Whether a box of this pixel size survives the filter.
    pub fn keeps(&self, width: f32, height: f32) -> bool {
        let (min, max) = (self.min_size as f32, self.max_size as f32);
        width >= min && height >= min && width <= max && height <= max
    }
}

/// Result of the extreme-box filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterBoxesSummary {
    /// Label files that lost at least one box
    #[serde(default)]
    pub modified_files: usize,
    /// Label files examined
    #[serde(default)]
    pub total_files: usize,
    #[serde(default)]
    pub filtered_boxes: usize,
    #[serde(default)]
    pub total_boxes: usize,
    /// Where the labels were copied before filtering
    #[serde(default)]
    pub backup_path: Option<String>,
}

/// Body of the frame extraction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractFramesRequest {
    /// Seconds between extracted frames
    pub interval: u32,
    /// Upper bound of frames taken from one video
    pub max_frames: u32,
}

impl Default for ExtractFramesRequest {
    fn default() -> Self {
        Self {
            interval: DEFAULT_FRAME_INTERVAL_SECS,
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }
}

impl ExtractFramesRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.interval == 0 {
            return Err("Frame interval must be at least 1 second".to_string());
        }
        if self.max_frames == 0 {
            return Err("Max frames must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Result of frame extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractFramesSummary {
    #[serde(default)]
    pub total_frames: usize,
    #[serde(default)]
    pub videos_processed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.001;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_normalize_uses_image_dimensions() {
        let dims = ImageDimensions::new(1000, 800);
        let bbox = BoundingBox::new(ClassId::Normal, 100.0, 200.0, 300.0, 400.0).unwrap();
        let n = NormalizedBox::from_pixels(&bbox, dims).unwrap();
        assert!(approx_eq(n.x_center, 0.25));
        assert!(approx_eq(n.y_center, 0.5));
        assert!(approx_eq(n.width, 0.3));
        assert!(approx_eq(n.height, 0.5));
        assert_eq!(n.class, ClassId::Normal);
        assert!(n.confidence.is_none());
    }

    #[test]
    fn test_zero_dimension_is_not_normalized() {
        let bbox = BoundingBox::new(ClassId::Normal, 10.0, 10.0, 50.0, 50.0).unwrap();
        assert!(NormalizedBox::from_pixels(&bbox, ImageDimensions::new(0, 800)).is_none());
        assert!(NormalizedBox::from_pixels(&bbox, ImageDimensions::new(1000, 0)).is_none());
        assert!(normalize_all(&[bbox], ImageDimensions::new(0, 0)).is_empty());
    }

    #[test]
    fn test_denormalize_restores_pixels() {
        let dims = ImageDimensions::new(1000, 800);
        let n = NormalizedBox {
            class: ClassId::Defect,
            x_center: 0.25,
            y_center: 0.5,
            width: 0.3,
            height: 0.5,
            confidence: Some(0.9),
        };
        let b = n.to_pixels(dims);
        assert!(approx_eq(b.x, 100.0));
        assert!(approx_eq(b.y, 200.0));
        assert!(approx_eq(b.width, 300.0));
        assert!(approx_eq(b.height, 400.0));
        assert_eq!(b.confidence, Some(0.9));
    }

    #[test]
    fn test_save_request_json_shape() {
        let dims = ImageDimensions::new(1000, 800);
        let bbox = BoundingBox::new(ClassId::Defect, 0.0, 0.0, 100.0, 80.0).unwrap();
        let req = SaveRequest::from_pixels("a/b.jpg", &[bbox], dims);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["filename"], "a/b.jpg");
        assert_eq!(json["image_width"], 1000);
        assert_eq!(json["image_height"], 800);
        assert_eq!(json["annotations"][0]["class"], 1);
        assert!(json["annotations"][0].get("confidence").is_none());
    }

    #[test]
    fn test_listing_parses_backend_json() {
        let json = r#"{
            "images": [
                {"name": "lot1/a.jpg", "labeled": true, "label_source": "ai"},
                {"name": "b.jpg", "labeled": false, "label_source": null},
                {"name": "c.jpg", "labeled": true, "label_source": "manual"}
            ],
            "folders": ["lot1"]
        }"#;
        let listing: ImageListing = serde_json::from_str(json).unwrap();
        assert_eq!(listing.images.len(), 3);
        assert_eq!(listing.images[0].label_source, LabelSource::Ai);
        assert_eq!(listing.images[1].label_source, LabelSource::None);
        assert_eq!(listing.images[2].label_source, LabelSource::Manual);
        assert_eq!(listing.images[0].folder(), "lot1");
        assert_eq!(listing.images[1].folder(), "");
        assert_eq!(listing.folders, vec!["lot1".to_string()]);
    }

    #[test]
    fn test_stored_annotations_with_confidence() {
        let json = r#"{
            "annotations": [
                {"class": 1, "x_center": 0.5, "y_center": 0.5, "width": 0.1, "height": 0.2, "confidence": 0.87}
            ],
            "label_source": "ai"
        }"#;
        let stored: StoredAnnotations = serde_json::from_str(json).unwrap();
        assert_eq!(stored.annotations[0].class, ClassId::Defect);
        assert_eq!(stored.annotations[0].confidence, Some(0.87));
        assert_eq!(stored.label_source, LabelSource::Ai);
    }

    #[test]
    fn test_filter_request_validation() {
        assert!(FilterBoxesRequest::default().validate().is_ok());
        assert!(FilterBoxesRequest::new(0, 800).validate().is_err());
        assert!(FilterBoxesRequest::new(800, 800).validate().is_err());
        assert!(FilterBoxesRequest::new(900, 50).validate().is_err());
    }

    #[test]
    fn test_filter_request_json_and_targets() {
        let all = FilterBoxesRequest::new(50, 800);
        let json = serde_json::to_value(&all).unwrap();
        assert_eq!(json["min_size"], 50);
        assert_eq!(json["max_size"], 800);
        assert_eq!(json["folder"], "");
        assert!(json.get("images").is_none());
        assert!(all.covers("lot1/a.jpg"));

        let lot1 = FilterBoxesRequest::new(50, 800).with_folder("lot1");
        assert!(lot1.covers("lot1/a.jpg"));
        assert!(!lot1.covers("lot10/a.jpg"));
        assert!(!lot1.covers("a.jpg"));

        let picked = FilterBoxesRequest::new(50, 800).with_images(vec!["b.jpg".into()]);
        let json = serde_json::to_value(&picked).unwrap();
        assert_eq!(json["images"][0], "b.jpg");
        assert!(json.get("folder").is_none());
        assert!(picked.covers("b.jpg"));
        assert!(!picked.covers("a.jpg"));
    }

    #[test]
    fn test_filter_keeps_range_inclusive() {
        let request = FilterBoxesRequest::new(50, 800);
        assert!(request.keeps(50.0, 800.0));
        assert!(request.keeps(350.0, 350.0));
        assert!(!request.keeps(49.0, 350.0));
        assert!(!request.keeps(350.0, 801.0));
    }

    #[test]
    fn test_summaries_parse_backend_json() {
        let json = r#"{"modified_files": 2, "total_files": 5, "filtered_boxes": 3,
                       "total_boxes": 12, "backup_path": "labels_backup"}"#;
        let summary: FilterBoxesSummary = serde_json::from_str(json).unwrap();
        assert_eq!(summary.filtered_boxes, 3);
        assert_eq!(summary.backup_path.as_deref(), Some("labels_backup"));

        let json = r#"{"total_frames": 40, "videos_processed": 2}"#;
        let summary: ExtractFramesSummary = serde_json::from_str(json).unwrap();
        assert_eq!(summary.total_frames, 40);
        assert_eq!(summary.videos_processed, 2);
    }

    #[test]
    fn test_extract_request_validation() {
        assert!(ExtractFramesRequest::default().validate().is_ok());
        let zero_interval = ExtractFramesRequest {
            interval: 0,
            max_frames: 10,
        };
        assert!(zero_interval.validate().is_err());
        let zero_frames = ExtractFramesRequest {
            interval: 2,
            max_frames: 0,
        };
        assert!(zero_frames.validate().is_err());
    }

    #[test]
    fn test_dimensions_from_encoded_png() {
        let img = image::RgbImage::new(37, 21);
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
        let dims = ImageDimensions::from_encoded(&bytes).unwrap();
        assert_eq!(dims, ImageDimensions::new(37, 21));
    }
}
