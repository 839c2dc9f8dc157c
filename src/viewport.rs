//! Screen ↔ image coordinate transform.
//!
//! Screen coordinates are canvas pixels relative to the canvas top-left.
//! Image coordinates are pixels of the decoded image. The mapping is
//! `screen = image * scale + offset` on both axes.

use crate::constants::{MAX_SCALE, MIN_SCALE, WHEEL_ZOOM_IN, WHEEL_ZOOM_OUT};
use crate::model::ImageDimensions;

/// Pan/zoom state of the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Viewport {
    /// Create a viewport with the given scale (clamped) and offset.
    pub fn new(scale: f32, offset_x: f32, offset_y: f32) -> Self {
        Self {
            scale: clamp_scale(scale),
            offset_x,
            offset_y,
        }
    }

    /// Scale 1, no offset.
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }

    /// Fit an image inside a container, preserving aspect ratio and centering it.
    pub fn fit_to_container(image: ImageDimensions, container_w: f32, container_h: f32) -> Self {
        if image.width == 0 || image.height == 0 || container_w <= 0.0 || container_h <= 0.0 {
            log::warn!(
                "Cannot fit {}x{} image into {}x{} container",
                image.width,
                image.height,
                container_w,
                container_h
            );
            return Self::identity();
        }

        let scale_x = container_w / image.width_f32();
        let scale_y = container_h / image.height_f32();
        let scale = clamp_scale(scale_x.min(scale_y));

        let offset_x = (container_w - image.width_f32() * scale) / 2.0;
        let offset_y = (container_h - image.height_f32() * scale) / 2.0;

        log::debug!(
            "Fit {}x{} into {}x{}: scale={:.4} offset=({:.1}, {:.1})",
            image.width,
            image.height,
            container_w,
            container_h,
            scale,
            offset_x,
            offset_y
        );

        Self {
            scale,
            offset_x,
            offset_y,
        }
    }

    /// Convert a screen point to image space.
    pub fn to_image_space(&self, sx: f32, sy: f32) -> (f32, f32) {
        (
            (sx - self.offset_x) / self.scale,
            (sy - self.offset_y) / self.scale,
        )
    }

    /// Convert an image point to screen space.
    pub fn to_screen_space(&self, ix: f32, iy: f32) -> (f32, f32) {
        (
            ix * self.scale + self.offset_x,
            iy * self.scale + self.offset_y,
        )
    }

    /// Multiply the scale by `factor`, keeping the image point under
    /// (`sx`, `sy`) fixed on screen.
    ///
    /// The resulting scale is clamped to the allowed range; the anchor is
    /// preserved for the clamped value.
    pub fn zoom_at(&mut self, sx: f32, sy: f32, factor: f32) {
        let new_scale = clamp_scale(self.scale * factor);
        if new_scale == self.scale {
            return;
        }

        // Image-space point under cursor (before zoom)
        let (ix, iy) = self.to_image_space(sx, sy);

        self.scale = new_scale;
        self.offset_x = sx - ix * new_scale;
        self.offset_y = sy - iy * new_scale;
        log::trace!("Zoom at ({sx}, {sy}) -> scale {new_scale:.4}");
    }

    /// Apply one wheel tick at the cursor.
    pub fn zoom_wheel(&mut self, sx: f32, sy: f32, delta_y: f32) {
        let factor = if delta_y > 0.0 {
            WHEEL_ZOOM_OUT
        } else {
            WHEEL_ZOOM_IN
        };
        self.zoom_at(sx, sy, factor);
    }

    /// Shift the image by a screen-space delta.
    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.offset_x += dx;
        self.offset_y += dy;
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::identity()
    }
}

fn clamp_scale(scale: f32) -> f32 {
    if scale.is_finite() {
        scale.clamp(MIN_SCALE, MAX_SCALE)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.001;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_identity_viewport() {
        let v = Viewport::identity();
        assert_eq!(v.scale, 1.0);
        assert_eq!(v.to_image_space(12.0, 34.0), (12.0, 34.0));
    }

    #[test]
    fn test_round_trip() {
        let v = Viewport::new(2.5, 40.0, -13.0);
        let (ix, iy) = v.to_image_space(321.0, 123.0);
        let (sx, sy) = v.to_screen_space(ix, iy);
        assert!(approx_eq(sx, 321.0));
        assert!(approx_eq(sy, 123.0));
    }

    #[test]
    fn test_fit_landscape_image() {
        let v = Viewport::fit_to_container(ImageDimensions::new(1000, 800), 500.0, 500.0);
        assert!(approx_eq(v.scale, 0.5));
        assert!(approx_eq(v.offset_x, 0.0));
        assert!(approx_eq(v.offset_y, 50.0));
    }

    #[test]
    fn test_fit_clamps_scale() {
        let v = Viewport::fit_to_container(ImageDimensions::new(10, 10), 1000.0, 1000.0);
        assert_eq!(v.scale, MAX_SCALE);
        assert!(approx_eq(v.offset_x, 450.0));

        let v = Viewport::fit_to_container(ImageDimensions::new(100_000, 100_000), 100.0, 100.0);
        assert_eq!(v.scale, MIN_SCALE);
    }

    #[test]
    fn test_fit_degenerate_container() {
        let v = Viewport::fit_to_container(ImageDimensions::new(100, 100), 0.0, 100.0);
        assert_eq!(v, Viewport::identity());
    }

    #[test]
    fn test_zoom_at_preserves_anchor() {
        let mut v = Viewport::new(1.0, 50.0, 30.0);
        let before = v.to_image_space(150.0, 120.0);
        v.zoom_at(150.0, 120.0, 2.0);
        let after = v.to_image_space(150.0, 120.0);
        assert!(approx_eq(v.scale, 2.0));
        assert!(approx_eq(before.0, after.0));
        assert!(approx_eq(before.1, after.1));
    }

    #[test]
    fn test_zoom_clamped_at_max() {
        let mut v = Viewport::new(9.5, 0.0, 0.0);
        v.zoom_at(100.0, 100.0, 1.1);
        assert_eq!(v.scale, MAX_SCALE);
        v.zoom_at(100.0, 100.0, 1.1);
        assert_eq!(v.scale, MAX_SCALE);
    }

    #[test]
    fn test_wheel_direction() {
        let mut v = Viewport::identity();
        v.zoom_wheel(0.0, 0.0, -100.0);
        assert!(approx_eq(v.scale, 1.1));

        let mut v = Viewport::identity();
        v.zoom_wheel(0.0, 0.0, 100.0);
        assert!(approx_eq(v.scale, 0.9));
    }

    #[test]
    fn test_pan_by() {
        let mut v = Viewport::new(1.0, 10.0, 20.0);
        v.pan_by(5.0, -10.0);
        assert_eq!(v.scale, 1.0);
        assert_eq!(v.offset_x, 15.0);
        assert_eq!(v.offset_y, 10.0);
    }
}
