//! Operations over many images at once.
//!
//! Each image is handled independently. A failure is recorded and the batch
//! moves on to the next image.

use crate::model::{ImageDimensions, SaveRequest};
use crate::store::AnnotationStore;

/// Summary of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Images processed successfully
    pub succeeded: Vec<String>,
    /// Images that failed, with the error message
    pub failed: Vec<(String, String)>,
    /// Boxes changed across all successful images
    pub boxes_touched: usize,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Progress callback: `(done, total, name)`.
pub type ProgressFn<'a> = dyn FnMut(usize, usize, &str) + 'a;

/// Flip Normal and Defect on every box of every named image.
pub fn swap_classes<S: AnnotationStore + ?Sized>(
    store: &S,
    names: &[String],
    mut progress: Option<&mut ProgressFn<'_>>,
) -> BatchReport {
    let mut report = BatchReport::default();
    for (i, name) in names.iter().enumerate() {
        match swap_one(store, name) {
            Ok(count) => {
                report.boxes_touched += count;
                report.succeeded.push(name.clone());
            }
            Err(e) => {
                log::warn!("Failed to swap classes of {}: {}", name, e);
                report.failed.push((name.clone(), e.to_string()));
            }
        }
        if let Some(progress) = progress.as_deref_mut() {
            progress(i + 1, names.len(), name);
        }
    }
    log::info!(
        "Swapped classes of {} boxes in {} images ({} failed)",
        report.boxes_touched,
        report.succeeded.len(),
        report.failed.len()
    );
    report
}

fn swap_one<S: AnnotationStore + ?Sized>(
    store: &S,
    name: &str,
) -> crate::error::StoreResult<usize> {
    let stored = store.get_annotations(name)?;
    if stored.annotations.is_empty() {
        return Ok(0);
    }
    let dims = ImageDimensions::from_encoded(&store.get_image(name)?)?;
    let mut annotations = stored.annotations;
    for bbox in &mut annotations {
        bbox.class = bbox.class.toggled();
    }
    let count = annotations.len();
    store.save_annotations(&SaveRequest {
        filename: name.to_string(),
        annotations,
        image_width: dims.width,
        image_height: dims.height,
    })?;
    Ok(count)
}

/// Delete every named image.
pub fn delete_images<S: AnnotationStore + ?Sized>(
    store: &S,
    names: &[String],
    mut progress: Option<&mut ProgressFn<'_>>,
) -> BatchReport {
    let mut report = BatchReport::default();
    for (i, name) in names.iter().enumerate() {
        match store.delete_image(name) {
            Ok(()) => report.succeeded.push(name.clone()),
            Err(e) => {
                log::warn!("Failed to delete {}: {}", name, e);
                report.failed.push((name.clone(), e.to_string()));
            }
        }
        if let Some(progress) = progress.as_deref_mut() {
            progress(i + 1, names.len(), name);
        }
    }
    log::info!(
        "Deleted {} images ({} failed)",
        report.succeeded.len(),
        report.failed.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassId, LabelSource, NormalizedBox, StoredAnnotations};
    use crate::store::MemoryStore;

    fn labels(classes: &[ClassId]) -> StoredAnnotations {
        StoredAnnotations {
            annotations: classes
                .iter()
                .map(|&class| NormalizedBox {
                    class,
                    x_center: 0.5,
                    y_center: 0.5,
                    width: 0.25,
                    height: 0.25,
                    confidence: Some(0.9),
                })
                .collect(),
            label_source: LabelSource::Ai,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_swap_classes() {
        let store = MemoryStore::new();
        let dims = ImageDimensions::new(64, 48);
        store
            .insert_blank("a.png", dims, labels(&[ClassId::Normal, ClassId::Defect]))
            .unwrap();
        store.insert_blank("b.png", dims, labels(&[])).unwrap();

        let report = swap_classes(&store, &names(&["a.png", "b.png", "missing.png"]), None);
        assert_eq!(report.succeeded, names(&["a.png", "b.png"]));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "missing.png");
        assert_eq!(report.boxes_touched, 2);

        let boxes = store.annotations_of("a.png").unwrap();
        assert_eq!(boxes[0].class, ClassId::Defect);
        assert_eq!(boxes[1].class, ClassId::Normal);
        // Empty images are not rewritten
        assert_eq!(store.saves().len(), 1);
        assert_eq!(store.saves()[0].image_width, 64);
    }

    #[test]
    fn test_delete_images_with_progress() {
        let store = MemoryStore::new();
        let dims = ImageDimensions::new(8, 8);
        store.insert_blank("a.png", dims, labels(&[])).unwrap();
        store.insert_blank("b.png", dims, labels(&[])).unwrap();

        let mut seen = Vec::new();
        let mut on_progress = |done: usize, total: usize, name: &str| {
            seen.push(format!("{done}/{total} {name}"));
        };
        let report = delete_images(
            &store,
            &names(&["a.png", "x.png", "b.png"]),
            Some(&mut on_progress),
        );
        assert_eq!(report.processed(), 3);
        assert!(!report.is_success());
        assert!(!store.contains("a.png"));
        assert!(!store.contains("b.png"));
        assert_eq!(seen, vec!["1/3 a.png", "2/3 x.png", "3/3 b.png"]);
    }
}
