//! Bounding box model in image pixel space.

use serde::{Deserialize, Serialize};

use crate::constants::MIN_BOX_SIZE;
use crate::error::BoxError;

/// Classification attached to every box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum ClassId {
    /// Good part (class 0)
    #[default]
    Normal,
    /// Defective part (class 1)
    Defect,
}

impl ClassId {
    /// Get the display name for this class.
    pub fn name(&self) -> &'static str {
        match self {
            ClassId::Normal => "Normal",
            ClassId::Defect => "Defect",
        }
    }

    /// The other class.
    pub fn toggled(self) -> Self {
        match self {
            ClassId::Normal => ClassId::Defect,
            ClassId::Defect => ClassId::Normal,
        }
    }

    /// Numeric class index used on the wire.
    pub fn index(self) -> u8 {
        match self {
            ClassId::Normal => 0,
            ClassId::Defect => 1,
        }
    }

    /// Get all classes.
    pub fn all() -> &'static [ClassId] {
        &[ClassId::Normal, ClassId::Defect]
    }
}

impl From<ClassId> for u8 {
    fn from(class: ClassId) -> Self {
        class.index()
    }
}

impl TryFrom<u8> for ClassId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ClassId::Normal),
            1 => Ok(ClassId::Defect),
            other => Err(format!("unknown class id {other}")),
        }
    }
}

/// Which borders of a box are grabbed during a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgeSet {
    pub north: bool,
    pub south: bool,
    pub east: bool,
    pub west: bool,
}

impl EdgeSet {
    pub const NORTH: EdgeSet = EdgeSet {
        north: true,
        south: false,
        east: false,
        west: false,
    };
    pub const SOUTH: EdgeSet = EdgeSet {
        north: false,
        south: true,
        east: false,
        west: false,
    };
    pub const EAST: EdgeSet = EdgeSet {
        north: false,
        south: false,
        east: true,
        west: false,
    };
    pub const WEST: EdgeSet = EdgeSet {
        north: false,
        south: false,
        east: false,
        west: true,
    };

    /// True when no border is grabbed.
    pub fn is_empty(&self) -> bool {
        !(self.north || self.south || self.east || self.west)
    }

    /// Combine two edge sets.
    pub fn union(self, other: EdgeSet) -> EdgeSet {
        EdgeSet {
            north: self.north || other.north,
            south: self.south || other.south,
            east: self.east || other.east,
            west: self.west || other.west,
        }
    }

    /// True when exactly one vertical and one horizontal border are grabbed.
    pub fn is_corner(&self) -> bool {
        (self.north || self.south) && (self.east || self.west)
    }
}

/// An axis-aligned box in image pixels (top-left origin).
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub class_id: ClassId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detector score, present only on machine-generated boxes.
    pub confidence: Option<f32>,
}

impl BoundingBox {
    /// Create a box, rejecting anything smaller than the minimum size.
    pub fn new(
        class_id: ClassId,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<Self, BoxError> {
        if !(x.is_finite() && y.is_finite() && width.is_finite() && height.is_finite()) {
            return Err(BoxError::invalid_coordinates(format!(
                "({x}, {y}, {width}, {height})"
            )));
        }
        if width < MIN_BOX_SIZE || height < MIN_BOX_SIZE {
            return Err(BoxError::too_small(width, height, MIN_BOX_SIZE));
        }
        Ok(Self {
            class_id,
            x,
            y,
            width,
            height,
            confidence: None,
        })
    }

    /// Create a box from two arbitrary corner points.
    pub fn from_corners(
        class_id: ClassId,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    ) -> Result<Self, BoxError> {
        Self::new(
            class_id,
            x1.min(x2),
            y1.min(y2),
            (x2 - x1).abs(),
            (y2 - y1).abs(),
        )
    }

    /// Attach a detector confidence.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Check if a point lies inside the box (borders included).
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }

    /// Find the borders within `threshold` of a point.
    ///
    /// The point must lie inside the box grown by `threshold` on every side.
    /// When both opposite borders qualify (thin boxes) only the nearer one is
    /// returned, so a resize never drags both sides of an axis at once.
    pub fn edges_near(&self, x: f32, y: f32, threshold: f32) -> EdgeSet {
        let in_band_x = x > self.x - threshold && x < self.right() + threshold;
        let in_band_y = y > self.y - threshold && y < self.bottom() + threshold;
        if !(in_band_x && in_band_y) {
            return EdgeSet::default();
        }

        let dn = (y - self.y).abs();
        let ds = (y - self.bottom()).abs();
        let dw = (x - self.x).abs();
        let de = (x - self.right()).abs();

        let mut edges = EdgeSet::default();
        match (dn < threshold, ds < threshold) {
            (true, true) => {
                if dn <= ds {
                    edges.north = true;
                } else {
                    edges.south = true;
                }
            }
            (n, s) => {
                edges.north = n;
                edges.south = s;
            }
        }
        match (dw < threshold, de < threshold) {
            (true, true) => {
                if dw <= de {
                    edges.west = true;
                } else {
                    edges.east = true;
                }
            }
            (w, e) => {
                edges.west = w;
                edges.east = e;
            }
        }
        edges
    }

    /// Move the grabbed borders to the given point.
    ///
    /// Each grabbed border moves independently; the opposite border stays
    /// fixed and the size stops at the minimum instead of flipping.
    pub fn resize_edge(&mut self, edges: EdgeSet, x: f32, y: f32) {
        if edges.north {
            let bottom = self.bottom();
            self.height = (bottom - y).max(MIN_BOX_SIZE);
            self.y = bottom - self.height;
        }
        if edges.south {
            self.height = (y - self.y).max(MIN_BOX_SIZE);
        }
        if edges.west {
            let right = self.right();
            self.width = (right - x).max(MIN_BOX_SIZE);
            self.x = right - self.width;
        }
        if edges.east {
            self.width = (x - self.x).max(MIN_BOX_SIZE);
        }
    }

    /// Translate the box. Boxes may leave the image bounds.
    pub fn move_by(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
    }

    /// Flip between Normal and Defect.
    pub fn toggle_class(&mut self) {
        self.class_id = self.class_id.toggled();
    }

    /// Check the box satisfies the minimum size.
    pub fn is_valid(&self) -> bool {
        self.width >= MIN_BOX_SIZE && self.height >= MIN_BOX_SIZE
    }
}

/// Index of the top-most box containing a point (last in order wins).
pub fn hit_test(boxes: &[BoundingBox], x: f32, y: f32) -> Option<usize> {
    boxes.iter().rposition(|b| b.contains(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.001;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn sample() -> BoundingBox {
        BoundingBox::new(ClassId::Normal, 100.0, 100.0, 100.0, 50.0).unwrap()
    }

    #[test]
    fn test_new_rejects_small_boxes() {
        assert!(matches!(
            BoundingBox::new(ClassId::Normal, 0.0, 0.0, 9.9, 50.0),
            Err(BoxError::TooSmall { .. })
        ));
        assert!(BoundingBox::new(ClassId::Normal, 0.0, 0.0, 50.0, 9.0).is_err());
        assert!(BoundingBox::new(ClassId::Normal, 0.0, 0.0, 10.0, 10.0).is_ok());
    }

    #[test]
    fn test_new_rejects_nan() {
        assert!(matches!(
            BoundingBox::new(ClassId::Normal, f32::NAN, 0.0, 20.0, 20.0),
            Err(BoxError::InvalidCoordinates { .. })
        ));
    }

    #[test]
    fn test_from_corners_normalizes() {
        let b = BoundingBox::from_corners(ClassId::Defect, 150.0, 80.0, 50.0, 20.0).unwrap();
        assert_eq!(b.x, 50.0);
        assert_eq!(b.y, 20.0);
        assert_eq!(b.width, 100.0);
        assert_eq!(b.height, 60.0);
        assert_eq!(b.class_id, ClassId::Defect);
        assert!(b.confidence.is_none());
    }

    #[test]
    fn test_contains_is_inclusive() {
        let b = sample();
        assert!(b.contains(100.0, 100.0));
        assert!(b.contains(200.0, 150.0));
        assert!(!b.contains(200.1, 150.0));
        assert!(!b.contains(99.9, 120.0));
    }

    #[test]
    fn test_edges_near_single_edges() {
        let b = sample();
        assert_eq!(b.edges_near(150.0, 105.0, 15.0), EdgeSet::NORTH);
        assert_eq!(b.edges_near(150.0, 148.0, 15.0), EdgeSet::SOUTH);
        assert_eq!(b.edges_near(95.0, 125.0, 15.0), EdgeSet::WEST);
        assert_eq!(b.edges_near(210.0, 125.0, 15.0), EdgeSet::EAST);
    }

    #[test]
    fn test_edges_near_corner() {
        let b = sample();
        let edges = b.edges_near(198.0, 148.0, 15.0);
        assert!(edges.south && edges.east);
        assert!(!edges.north && !edges.west);
        assert!(edges.is_corner());
    }

    #[test]
    fn test_edges_near_ignores_distant_points() {
        let b = sample();
        // Aligned with the top border but far to the right
        assert!(b.edges_near(400.0, 100.0, 15.0).is_empty());
        // Deep inside
        assert!(b.edges_near(150.0, 125.0, 10.0).is_empty());
    }

    #[test]
    fn test_edges_near_thin_box_picks_nearer() {
        let b = BoundingBox::new(ClassId::Normal, 0.0, 0.0, 100.0, 12.0).unwrap();
        assert_eq!(b.edges_near(50.0, 2.0, 15.0), EdgeSet::NORTH);
        assert_eq!(b.edges_near(50.0, 10.0, 15.0), EdgeSet::SOUTH);
    }

    #[test]
    fn test_resize_north_keeps_bottom() {
        let mut b = sample();
        b.resize_edge(EdgeSet::NORTH, 150.0, 80.0);
        assert!(approx_eq(b.y, 80.0));
        assert!(approx_eq(b.bottom(), 150.0));
        assert!(approx_eq(b.height, 70.0));
    }

    #[test]
    fn test_resize_clamps_at_minimum() {
        let mut b = sample();
        b.resize_edge(EdgeSet::NORTH, 150.0, 400.0);
        assert!(approx_eq(b.height, MIN_BOX_SIZE));
        assert!(approx_eq(b.bottom(), 150.0));

        let mut b = sample();
        b.resize_edge(EdgeSet::EAST, 0.0, 120.0);
        assert!(approx_eq(b.width, MIN_BOX_SIZE));
        assert!(approx_eq(b.x, 100.0));

        let mut b = sample();
        b.resize_edge(EdgeSet::WEST, 500.0, 120.0);
        assert!(approx_eq(b.width, MIN_BOX_SIZE));
        assert!(approx_eq(b.right(), 200.0));

        let mut b = sample();
        b.resize_edge(EdgeSet::SOUTH, 120.0, -50.0);
        assert!(approx_eq(b.height, MIN_BOX_SIZE));
        assert!(approx_eq(b.y, 100.0));
    }

    #[test]
    fn test_resize_corner_moves_both_axes() {
        let mut b = sample();
        b.resize_edge(EdgeSet::SOUTH.union(EdgeSet::EAST), 300.0, 260.0);
        assert!(approx_eq(b.x, 100.0));
        assert!(approx_eq(b.y, 100.0));
        assert!(approx_eq(b.width, 200.0));
        assert!(approx_eq(b.height, 160.0));
    }

    #[test]
    fn test_toggle_class_keeps_geometry_and_confidence() {
        let mut b = sample().with_confidence(0.87);
        let before = b.clone();
        b.toggle_class();
        assert_eq!(b.class_id, ClassId::Defect);
        assert_eq!(b.x, before.x);
        assert_eq!(b.width, before.width);
        assert_eq!(b.confidence, Some(0.87));
        b.toggle_class();
        assert_eq!(b, before);
    }

    #[test]
    fn test_move_by_allows_leaving_image() {
        let mut b = sample();
        b.move_by(-300.0, -300.0);
        assert_eq!(b.x, -200.0);
        assert_eq!(b.y, -200.0);
        assert_eq!(b.width, 100.0);
    }

    #[test]
    fn test_hit_test_prefers_last() {
        let boxes = vec![
            BoundingBox::new(ClassId::Normal, 0.0, 0.0, 100.0, 100.0).unwrap(),
            BoundingBox::new(ClassId::Defect, 50.0, 50.0, 100.0, 100.0).unwrap(),
        ];
        assert_eq!(hit_test(&boxes, 75.0, 75.0), Some(1));
        assert_eq!(hit_test(&boxes, 10.0, 10.0), Some(0));
        assert_eq!(hit_test(&boxes, 500.0, 500.0), None);
    }

    #[test]
    fn test_class_id_serde_as_integer() {
        assert_eq!(serde_json::to_string(&ClassId::Defect).unwrap(), "1");
        let class: ClassId = serde_json::from_str("0").unwrap();
        assert_eq!(class, ClassId::Normal);
        assert!(serde_json::from_str::<ClassId>("7").is_err());
    }
}
