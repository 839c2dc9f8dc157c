//! Property-Based Tests
//!
//! Invariants of the editor core checked over generated inputs:
//! - Coordinate transforms invert each other and zoom keeps its anchor
//! - Boxes never shrink below the minimum size
//! - Undo/redo restore exact snapshots and history stays bounded

use candy_annotate::constants::{HISTORY_LIMIT, MAX_SCALE, MIN_BOX_SIZE, MIN_SCALE};
use candy_annotate::model::{EdgeSet, StoredAnnotations, denormalize_all, normalize_all};
use candy_annotate::{BoundingBox, ClassId, EditorSession, ImageDimensions, PointerEvent, Viewport};
use proptest::prelude::*;
use web_time::Instant;

const CANVAS: (f32, f32) = (1000.0, 800.0);

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() <= 1e-3 * a.abs().max(b.abs()).max(10.0)
}

/// Session with a blank 1000x800 image fitted 1:1 into the canvas.
fn empty_session() -> EditorSession {
    let mut session = EditorSession::default();
    session.set_container_size(CANVAS.0, CANVAS.1);
    session.load(
        "img.png",
        ImageDimensions::new(1000, 800),
        StoredAnnotations::default(),
    );
    session
}

/// Draw a box inside grid cell `cell` (10 x 8 cells of 100 px).
fn draw_in_cell(session: &mut EditorSession, cell: usize, w: f32, h: f32, t: Instant) {
    let x = (cell % 10) as f32 * 100.0 + 5.0;
    let y = (cell / 10) as f32 * 100.0 + 5.0;
    session.handle_pointer(PointerEvent::down(x, y, t));
    session.handle_pointer(PointerEvent::moved(x + w, y + h, t));
    session.handle_pointer(PointerEvent::up(x + w, y + h, t));
}

fn edge_set() -> impl Strategy<Value = EdgeSet> {
    (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(north, south, east, west)| EdgeSet {
            north,
            south,
            east,
            west,
        },
    )
}

// ============================================================================
// Coordinate Properties
// ============================================================================

/// Property: image -> screen -> image returns the original point
#[test]
fn proptest_transform_round_trip() {
    proptest!(|(
        scale in MIN_SCALE..MAX_SCALE,
        ox in -1000f32..1000.0,
        oy in -1000f32..1000.0,
        sx in -500f32..2000.0,
        sy in -500f32..2000.0
    )| {
        let viewport = Viewport::new(scale, ox, oy);
        let (ix, iy) = viewport.to_image_space(sx, sy);
        let (bx, by) = viewport.to_screen_space(ix, iy);
        prop_assert!(close(bx, sx), "x: {} vs {}", bx, sx);
        prop_assert!(close(by, sy), "y: {} vs {}", by, sy);
    });
}

/// Property: zooming keeps the image point under the cursor fixed
#[test]
fn proptest_zoom_keeps_anchor() {
    proptest!(|(
        scale in MIN_SCALE..MAX_SCALE,
        ox in -500f32..500.0,
        oy in -500f32..500.0,
        sx in 0f32..1000.0,
        sy in 0f32..800.0,
        factor in 0.5f32..2.0
    )| {
        let mut viewport = Viewport::new(scale, ox, oy);
        let before = viewport.to_image_space(sx, sy);
        viewport.zoom_at(sx, sy, factor);
        let after = viewport.to_image_space(sx, sy);
        prop_assert!(viewport.scale >= MIN_SCALE && viewport.scale <= MAX_SCALE);
        prop_assert!(close(before.0, after.0), "x: {} vs {}", before.0, after.0);
        prop_assert!(close(before.1, after.1), "y: {} vs {}", before.1, after.1);
    });
}

/// Property: pixel -> normalized -> pixel keeps the box
#[test]
fn proptest_normalized_round_trip() {
    proptest!(|(
        img_w in 16u32..4000,
        img_h in 16u32..4000,
        fx in 0f32..0.9,
        fy in 0f32..0.9,
        fw in 0.01f32..1.0,
        fh in 0.01f32..1.0
    )| {
        let dims = ImageDimensions::new(img_w, img_h);
        let w = (fw * img_w as f32).max(MIN_BOX_SIZE);
        let h = (fh * img_h as f32).max(MIN_BOX_SIZE);
        let bbox = BoundingBox::new(ClassId::Defect, fx * img_w as f32, fy * img_h as f32, w, h)
            .unwrap();
        let restored = denormalize_all(&normalize_all(&[bbox.clone()], dims), dims);
        prop_assert_eq!(restored.len(), 1);
        let r = &restored[0];
        prop_assert_eq!(r.class_id, ClassId::Defect);
        prop_assert!(close(r.x, bbox.x) && close(r.y, bbox.y));
        prop_assert!(close(r.width, bbox.width) && close(r.height, bbox.height));
    });
}

// ============================================================================
// Box Size Properties
// ============================================================================

/// Property: resizing never produces a box below the minimum size
#[test]
fn proptest_resize_keeps_minimum() {
    proptest!(|(
        x in -100f32..1000.0,
        y in -100f32..1000.0,
        w in MIN_BOX_SIZE..500.0,
        h in MIN_BOX_SIZE..500.0,
        edges in edge_set(),
        px in -2000f32..2000.0,
        py in -2000f32..2000.0
    )| {
        let mut bbox = BoundingBox::new(ClassId::Normal, x, y, w, h).unwrap();
        bbox.resize_edge(edges, px, py);
        prop_assert!(bbox.width >= MIN_BOX_SIZE, "width {}", bbox.width);
        prop_assert!(bbox.height >= MIN_BOX_SIZE, "height {}", bbox.height);
        prop_assert!(bbox.is_valid());
    });
}

/// Property: drawing a rectangle thinner than the minimum adds nothing
#[test]
fn proptest_small_draw_adds_nothing() {
    proptest!(|(
        small in -9.9f32..9.9,
        large in -300f32..300.0,
        swap in any::<bool>()
    )| {
        let mut session = empty_session();
        let t = Instant::now();
        let (dx, dy) = if swap { (large, small) } else { (small, large) };
        session.handle_pointer(PointerEvent::down(500.0, 400.0, t));
        session.handle_pointer(PointerEvent::moved(500.0 + dx, 400.0 + dy, t));
        let effects = session.handle_pointer(PointerEvent::up(500.0 + dx, 400.0 + dy, t));
        prop_assert!(session.annotations().is_empty());
        prop_assert!(!effects.persist);
        prop_assert!(!session.can_undo());
    });
}

// ============================================================================
// History Properties
// ============================================================================

/// Property: N undos after N edits restore the loaded state
#[test]
fn proptest_undo_restores_loaded_state() {
    proptest!(ProptestConfig::with_cases(64), |(
        sizes in prop::collection::vec((10.5f32..90.0, 10.5f32..90.0), 1..=HISTORY_LIMIT)
    )| {
        let mut session = empty_session();
        let loaded = session.annotations().to_vec();
        let t = Instant::now();
        for (cell, (w, h)) in sizes.iter().enumerate() {
            draw_in_cell(&mut session, cell, *w, *h, t);
        }
        prop_assert_eq!(session.annotations().len(), sizes.len());

        for _ in 0..sizes.len() {
            prop_assert!(session.undo().persist);
        }
        prop_assert_eq!(session.annotations(), loaded.as_slice());
        prop_assert!(!session.can_undo());
    });
}

/// Property: undo followed by redo is a no-op
#[test]
fn proptest_undo_redo_identity() {
    proptest!(ProptestConfig::with_cases(64), |(
        sizes in prop::collection::vec((10.5f32..90.0, 10.5f32..90.0), 1..20),
        steps in 1usize..20
    )| {
        let mut session = empty_session();
        let t = Instant::now();
        for (cell, (w, h)) in sizes.iter().enumerate() {
            draw_in_cell(&mut session, cell, *w, *h, t);
        }
        let edited = session.annotations().to_vec();
        let steps = steps.min(sizes.len());
        for _ in 0..steps {
            session.undo();
        }
        for _ in 0..steps {
            session.redo();
        }
        prop_assert_eq!(session.annotations(), edited.as_slice());
        prop_assert!(!session.can_redo());
    });
}

/// Property: history depth never exceeds the limit
#[test]
fn proptest_history_bounded() {
    proptest!(ProptestConfig::with_cases(16), |(edits in HISTORY_LIMIT..80usize)| {
        let mut session = empty_session();
        let t = Instant::now();
        for cell in 0..edits {
            draw_in_cell(&mut session, cell, 50.0, 50.0, t);
        }
        prop_assert_eq!(session.annotations().len(), edits);
        prop_assert!(session.history().undo_count() <= HISTORY_LIMIT);

        let mut undone = 0;
        while session.undo().persist {
            undone += 1;
        }
        prop_assert_eq!(undone, HISTORY_LIMIT);
        prop_assert_eq!(session.annotations().len(), edits - HISTORY_LIMIT);
    });
}
