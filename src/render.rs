//! Canvas display list.
//!
//! [`render`] turns editor state into a flat list of [`DrawCommand`]s in
//! screen space. It never mutates anything, so the host can call it after
//! every event and replay the scene on whatever surface it owns.

use crate::constants::{
    DRAW_DASH, HANDLE_SIZE, LABEL_FONT_SIZE, LABEL_HEIGHT, LABEL_WIDTH,
    LABEL_WIDTH_WITH_CONFIDENCE, SELECTED_STROKE_WIDTH, STROKE_WIDTH,
};
use crate::model::{BoundingBox, ClassId, ImageDimensions};
use crate::session::EditorSession;
use crate::viewport::Viewport;

/// RGBA color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };

    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color from 8-bit channels.
    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::new(
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
            1.0,
        )
    }

    /// Same color with an 8-bit alpha.
    pub fn with_alpha8(self, alpha: u8) -> Self {
        Self {
            a: f32::from(alpha) / 255.0,
            ..self
        }
    }

    /// `#rrggbb` or `#rrggbbaa` for canvas hosts.
    pub fn to_css(&self) -> String {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        if self.a >= 1.0 {
            format!(
                "#{:02x}{:02x}{:02x}",
                channel(self.r),
                channel(self.g),
                channel(self.b)
            )
        } else {
            format!(
                "#{:02x}{:02x}{:02x}{:02x}",
                channel(self.r),
                channel(self.g),
                channel(self.b),
                channel(self.a)
            )
        }
    }

    /// Stroke color for a class.
    pub fn for_class(class: ClassId) -> Self {
        match class {
            ClassId::Normal => Self::from_rgb8(0x10, 0xb9, 0x81),
            ClassId::Defect => Self::from_rgb8(0xef, 0x44, 0x44),
        }
    }
}

/// Alpha of the fill drawn inside the selected box.
const SELECTED_FILL_ALPHA: u8 = 0x20;

/// Screen-space rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Square of side `size` centered on a point.
    pub fn centered(cx: f32, cy: f32, size: f32) -> Self {
        Self::new(cx - size / 2.0, cy - size / 2.0, size, size)
    }
}

/// One drawing primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// Clear the whole canvas
    Clear { width: f32, height: f32 },
    /// Draw the current image into a screen rectangle
    Image { rect: Rect },
    FillRect { rect: Rect, color: Color },
    StrokeRect {
        rect: Rect,
        color: Color,
        width: f32,
        /// Dash pattern (on, off), solid when `None`
        dash: Option<[f32; 2]>,
    },
    /// Text with its baseline starting at `position`
    Text {
        text: String,
        position: (f32, f32),
        color: Color,
        size: f32,
    },
}

/// Ordered display list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub commands: Vec<DrawCommand>,
}

impl Scene {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    fn push(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }
}

/// Everything the renderer reads.
#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    pub canvas: (f32, f32),
    pub image: Option<ImageDimensions>,
    pub annotations: &'a [BoundingBox],
    pub selection: Option<usize>,
    pub viewport: Viewport,
    /// In-progress rectangle as (start, current) image points
    pub drawing: Option<((f32, f32), (f32, f32))>,
    pub active_class: ClassId,
    pub show_labels: bool,
}

impl<'a> RenderInput<'a> {
    /// Collect render input from a session.
    pub fn from_session(session: &'a EditorSession, canvas: (f32, f32)) -> Self {
        Self {
            canvas,
            image: session.dimensions(),
            annotations: session.annotations(),
            selection: session.selection(),
            viewport: session.viewport(),
            drawing: session.interaction().drawing_rect(),
            active_class: session.active_class(),
            show_labels: session.show_labels(),
        }
    }
}

/// Build the display list for one frame.
pub fn render(input: &RenderInput<'_>) -> Scene {
    let mut scene = Scene::default();
    scene.push(DrawCommand::Clear {
        width: input.canvas.0,
        height: input.canvas.1,
    });

    let Some(dims) = input.image else {
        return scene;
    };
    let v = input.viewport;

    let (ix, iy) = v.to_screen_space(0.0, 0.0);
    scene.push(DrawCommand::Image {
        rect: Rect::new(
            ix,
            iy,
            dims.width_f32() * v.scale,
            dims.height_f32() * v.scale,
        ),
    });

    for (index, bbox) in input.annotations.iter().enumerate() {
        draw_box(
            &mut scene,
            bbox,
            &v,
            input.selection == Some(index),
            input.show_labels,
        );
    }

    if let Some((start, current)) = input.drawing {
        let (x, y) = v.to_screen_space(start.0.min(current.0), start.1.min(current.1));
        scene.push(DrawCommand::StrokeRect {
            rect: Rect::new(
                x,
                y,
                (current.0 - start.0).abs() * v.scale,
                (current.1 - start.1).abs() * v.scale,
            ),
            color: Color::for_class(input.active_class),
            width: STROKE_WIDTH,
            dash: Some(DRAW_DASH),
        });
    }

    scene
}

fn draw_box(scene: &mut Scene, bbox: &BoundingBox, v: &Viewport, selected: bool, labels: bool) {
    let color = Color::for_class(bbox.class_id);
    let (x, y) = v.to_screen_space(bbox.x, bbox.y);
    let w = bbox.width * v.scale;
    let h = bbox.height * v.scale;
    let rect = Rect::new(x, y, w, h);

    if selected {
        scene.push(DrawCommand::FillRect {
            rect,
            color: color.with_alpha8(SELECTED_FILL_ALPHA),
        });
    }

    scene.push(DrawCommand::StrokeRect {
        rect,
        color,
        width: if selected {
            SELECTED_STROKE_WIDTH
        } else {
            STROKE_WIDTH
        },
        dash: None,
    });

    if selected {
        // Four corners, then four edge midpoints
        let handles = [
            (x, y),
            (x + w, y),
            (x, y + h),
            (x + w, y + h),
            (x + w / 2.0, y),
            (x + w / 2.0, y + h),
            (x, y + h / 2.0),
            (x + w, y + h / 2.0),
        ];
        for (hx, hy) in handles {
            scene.push(DrawCommand::FillRect {
                rect: Rect::centered(hx, hy, HANDLE_SIZE),
                color,
            });
        }
    }

    if labels {
        let (text, chip_width) = match bbox.confidence {
            Some(conf) => (
                format!("{} {}%", bbox.class_id.name(), (conf * 100.0).round() as i32),
                LABEL_WIDTH_WITH_CONFIDENCE,
            ),
            None => (bbox.class_id.name().to_string(), LABEL_WIDTH),
        };
        scene.push(DrawCommand::FillRect {
            rect: Rect::new(x, y - LABEL_HEIGHT, chip_width, LABEL_HEIGHT),
            color,
        });
        scene.push(DrawCommand::Text {
            text,
            position: (x + 5.0, y - 6.0),
            color: Color::WHITE,
            size: LABEL_FONT_SIZE,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(boxes: &'a [BoundingBox]) -> RenderInput<'a> {
        RenderInput {
            canvas: (800.0, 600.0),
            image: Some(ImageDimensions::new(1000, 800)),
            annotations: boxes,
            selection: None,
            viewport: Viewport::new(0.5, 10.0, 20.0),
            drawing: None,
            active_class: ClassId::Normal,
            show_labels: false,
        }
    }

    fn boxes() -> Vec<BoundingBox> {
        vec![
            BoundingBox::new(ClassId::Normal, 100.0, 100.0, 200.0, 100.0).unwrap(),
            BoundingBox::new(ClassId::Defect, 400.0, 300.0, 100.0, 100.0)
                .unwrap()
                .with_confidence(0.876),
        ]
    }

    #[test]
    fn test_class_colors() {
        assert_eq!(Color::for_class(ClassId::Normal).to_css(), "#10b981");
        assert_eq!(Color::for_class(ClassId::Defect).to_css(), "#ef4444");
        assert_eq!(
            Color::for_class(ClassId::Defect).with_alpha8(0x20).to_css(),
            "#ef444420"
        );
    }

    #[test]
    fn test_empty_canvas_only_clears() {
        let mut inp = input(&[]);
        inp.image = None;
        let scene = render(&inp);
        assert_eq!(
            scene.commands,
            vec![DrawCommand::Clear {
                width: 800.0,
                height: 600.0
            }]
        );
    }

    #[test]
    fn test_image_and_boxes_in_screen_space() {
        let b = boxes();
        let scene = render(&input(&b));
        assert_eq!(scene.len(), 4);
        assert_eq!(
            scene.commands[1],
            DrawCommand::Image {
                rect: Rect::new(10.0, 20.0, 500.0, 400.0)
            }
        );
        assert_eq!(
            scene.commands[2],
            DrawCommand::StrokeRect {
                rect: Rect::new(60.0, 70.0, 100.0, 50.0),
                color: Color::for_class(ClassId::Normal),
                width: STROKE_WIDTH,
                dash: None,
            }
        );
    }

    #[test]
    fn test_selected_box_has_fill_and_handles() {
        let b = boxes();
        let mut inp = input(&b);
        inp.selection = Some(0);
        let scene = render(&inp);

        let fills = scene
            .commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::FillRect { .. }))
            .count();
        // Translucent fill plus eight handles
        assert_eq!(fills, 9);
        assert!(scene.commands.iter().any(|c| matches!(
            c,
            DrawCommand::StrokeRect { width, .. } if *width == SELECTED_STROKE_WIDTH
        )));
    }

    #[test]
    fn test_labels_with_confidence() {
        let b = boxes();
        let mut inp = input(&b);
        inp.show_labels = true;
        let scene = render(&inp);

        let texts: Vec<&str> = scene
            .commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Normal", "Defect 88%"]);

        assert!(scene.commands.contains(&DrawCommand::FillRect {
            rect: Rect::new(
                210.0,
                170.0 - LABEL_HEIGHT,
                LABEL_WIDTH_WITH_CONFIDENCE,
                LABEL_HEIGHT,
            ),
            color: Color::for_class(ClassId::Defect),
        }));
    }

    #[test]
    fn test_drawing_rect_is_dashed_in_active_class() {
        let mut inp = input(&[]);
        inp.active_class = ClassId::Defect;
        inp.drawing = Some(((200.0, 200.0), (100.0, 100.0)));
        let scene = render(&inp);
        assert_eq!(
            scene.commands.last(),
            Some(&DrawCommand::StrokeRect {
                rect: Rect::new(60.0, 70.0, 50.0, 50.0),
                color: Color::for_class(ClassId::Defect),
                width: STROKE_WIDTH,
                dash: Some(DRAW_DASH),
            })
        );
    }

    #[test]
    fn test_render_is_idempotent() {
        let b = boxes();
        let mut inp = input(&b);
        inp.selection = Some(1);
        inp.show_labels = true;
        assert_eq!(render(&inp), render(&inp));
    }
}
