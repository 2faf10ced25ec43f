//! Annotation data model.
//!
//! This module provides the paint types drawn over the backing image:
//! - Shape paints (rectangle, ellipse, arrow, line) and the crop selection
//! - Freehand brush and highlighter strokes
//! - Text boxes with an edit caret
//! - Blur (pixelation) regions with their one-shot committed cache
//!
//! A paint is a tagged variant plus a shared envelope: `can_draw` flips to
//! true once the geometry has nonzero extent, `is_committed` once the paint
//! has been finalized into the history.

use std::fmt;

use tiny_skia::Pixmap;

// ============================================================================
// Core Geometry Types
// ============================================================================

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A normalized RGBA color with channels in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Same color with a different alpha.
    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }
}

/// Resolve an effective `(x, y, w, h)` rectangle from two anchor points.
///
/// In center-anchored mode `from` is the rectangle's center and the area is
/// doubled; otherwise the rectangle spans the two corners.
pub fn resolve_rect(from: Point, to: Point, center_at_from: bool) -> (f32, f32, f32, f32) {
    let dx = (from.x - to.x).abs();
    let dy = (from.y - to.y).abs();
    if center_at_from {
        (from.x - dx, from.y - dy, dx * 2.0, dy * 2.0)
    } else {
        (from.x.min(to.x), from.y.min(to.y), dx, dy)
    }
}

// ============================================================================
// Paint Variants
// ============================================================================

/// Which geometric shape a [`ShapePaint`] draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
    Arrow,
    Line,
}

/// Whether a closed shape is stroked or filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShapeOperation {
    #[default]
    Stroke,
    Fill,
}

/// A two-anchor shape: rectangle, ellipse, arrow or straight line.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapePaint {
    pub kind: ShapeKind,
    pub color: Rgba,
    /// Stroke width in image pixels
    pub stroke_width: f32,
    pub operation: ShapeOperation,
    /// Anchor placed on pointer-down
    pub from: Point,
    /// Anchor tracking the pointer
    pub to: Point,
    /// When true, `from` is the shape's center instead of a corner
    pub should_center_at_from: bool,
}

impl ShapePaint {
    /// Resolved `(x, y, w, h)` honoring the center-anchored mode.
    pub fn rect(&self) -> (f32, f32, f32, f32) {
        resolve_rect(self.from, self.to, self.should_center_at_from)
    }
}

/// A freehand stroke: an ordered point sequence.
///
/// Used by both the brush and the highlighter; the highlighter variant
/// overrides alpha, width and caps at render time.
#[derive(Debug, Clone, PartialEq)]
pub struct BrushPaint {
    pub color: Rgba,
    pub stroke_width: f32,
    pub points: Vec<Point>,
}

/// Edit state of a text paint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    /// Caret visible, keystrokes mutate the buffer
    Edit,
    /// Finalized; further keystrokes are inert
    Done,
}

/// A wrapped text box anchored to a bounding rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPaint {
    pub color: Rgba,
    /// Font size in points
    pub size: f32,
    /// Font family name
    pub font: String,
    pub text: String,
    /// Caret position as a character index into `text`
    pub cursor: usize,
    pub from: Point,
    pub to: Point,
    pub mode: TextMode,
}

impl TextPaint {
    /// Bounding rectangle of the text box.
    pub fn rect(&self) -> (f32, f32, f32, f32) {
        resolve_rect(self.from, self.to, false)
    }

    /// Byte offset of the caret into the text buffer.
    pub fn cursor_byte_offset(&self) -> usize {
        self.text
            .char_indices()
            .nth(self.cursor)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }
}

/// A pixelation region. `cached` is populated exactly once, on commit.
#[derive(Clone)]
pub struct BlurPaint {
    pub from: Point,
    pub to: Point,
    /// Pixelated sub-surface computed on commit and blitted on every
    /// subsequent redraw. Never recomputed: the averaging pass is
    /// irreversible and expensive.
    pub cached: Option<Pixmap>,
}

impl BlurPaint {
    pub fn rect(&self) -> (f32, f32, f32, f32) {
        resolve_rect(self.from, self.to, false)
    }
}

impl fmt::Debug for BlurPaint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlurPaint")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("cached", &self.cached.is_some())
            .finish()
    }
}

impl PartialEq for BlurPaint {
    fn eq(&self, other: &Self) -> bool {
        // Cache contents are derived data; identity is the region
        self.from == other.from && self.to == other.to
    }
}

// ============================================================================
// Paint Envelope
// ============================================================================

/// The variant payload of a [`Paint`].
#[derive(Debug, Clone, PartialEq)]
pub enum PaintBody {
    Brush(BrushPaint),
    Highlighter(BrushPaint),
    Shape(ShapePaint),
    Text(TextPaint),
    Blur(BlurPaint),
    /// Crop selection; rendered as an overlay while pending, never committed
    /// as a drawable paint.
    Crop(ShapePaint),
}

/// One user-drawn annotation with its shared envelope flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Paint {
    /// True once the geometry has nonzero extent and can be rendered
    pub can_draw: bool,
    /// True once finalized into the committed history
    pub is_committed: bool,
    pub body: PaintBody,
}

impl Paint {
    pub fn new(body: PaintBody) -> Self {
        let mut paint = Self {
            can_draw: false,
            is_committed: false,
            body,
        };
        paint.refresh_can_draw();
        paint
    }

    /// A short label for logging.
    pub fn kind_name(&self) -> &'static str {
        match &self.body {
            PaintBody::Brush(_) => "brush",
            PaintBody::Highlighter(_) => "highlighter",
            PaintBody::Shape(s) => match s.kind {
                ShapeKind::Rectangle => "rectangle",
                ShapeKind::Ellipse => "ellipse",
                ShapeKind::Arrow => "arrow",
                ShapeKind::Line => "line",
            },
            PaintBody::Text(_) => "text",
            PaintBody::Blur(_) => "blur",
            PaintBody::Crop(_) => "crop",
        }
    }

    /// Recompute `can_draw` from the current geometry.
    ///
    /// Shapes, blur and crop need nonzero extent after resolving the two
    /// anchors; a brush needs at least one point; text needs a non-empty
    /// string.
    pub fn refresh_can_draw(&mut self) {
        self.can_draw = match &self.body {
            PaintBody::Brush(b) | PaintBody::Highlighter(b) => !b.points.is_empty(),
            PaintBody::Shape(s) => {
                let (_, _, w, h) = s.rect();
                match s.kind {
                    // A line/arrow only needs length in one axis
                    ShapeKind::Line | ShapeKind::Arrow => w > 0.0 || h > 0.0,
                    ShapeKind::Rectangle | ShapeKind::Ellipse => w > 0.0 && h > 0.0,
                }
            }
            PaintBody::Text(t) => !t.text.is_empty(),
            PaintBody::Blur(b) => {
                let (_, _, w, h) = b.rect();
                w > 0.0 && h > 0.0
            }
            PaintBody::Crop(s) => {
                let (_, _, w, h) = s.rect();
                w > 0.0 && h > 0.0
            }
        };
    }

    /// Update the tracking anchor while the paint is being dragged.
    ///
    /// For shapes, blur and crop this moves `to`; for a brush it appends a
    /// point; text boxes resize their bounding rectangle. `center_at_from`
    /// reflects whether the center-anchor modifier is held.
    pub fn update_to(&mut self, to: Point, center_at_from: bool) {
        match &mut self.body {
            PaintBody::Brush(b) | PaintBody::Highlighter(b) => b.points.push(to),
            PaintBody::Shape(s) => {
                s.to = to;
                s.should_center_at_from = center_at_from;
            }
            PaintBody::Text(t) => t.to = to,
            PaintBody::Blur(b) => b.to = to,
            PaintBody::Crop(s) => {
                s.to = to;
                s.should_center_at_from = center_at_from;
            }
        }
        self.refresh_can_draw();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_rect_corners() {
        let (x, y, w, h) = resolve_rect(Point::new(10.0, 20.0), Point::new(4.0, 26.0), false);
        assert_eq!((x, y, w, h), (4.0, 20.0, 6.0, 6.0));
    }

    #[test]
    fn test_resolve_rect_centered_doubles_area() {
        let (x, y, w, h) = resolve_rect(Point::new(10.0, 10.0), Point::new(13.0, 12.0), true);
        assert_eq!((x, y), (7.0, 8.0));
        assert_eq!((w, h), (6.0, 4.0));
    }

    #[test]
    fn test_shape_zero_extent_cannot_draw() {
        let p = Paint::new(PaintBody::Shape(ShapePaint {
            kind: ShapeKind::Rectangle,
            color: Rgba::new(1.0, 0.0, 0.0, 1.0),
            stroke_width: 2.0,
            operation: ShapeOperation::Stroke,
            from: Point::new(5.0, 5.0),
            to: Point::new(5.0, 5.0),
            should_center_at_from: false,
        }));
        assert!(!p.can_draw);
    }

    #[test]
    fn test_shape_becomes_drawable_after_drag() {
        let mut p = Paint::new(PaintBody::Shape(ShapePaint {
            kind: ShapeKind::Rectangle,
            color: Rgba::new(1.0, 0.0, 0.0, 1.0),
            stroke_width: 2.0,
            operation: ShapeOperation::Stroke,
            from: Point::new(5.0, 5.0),
            to: Point::new(5.0, 5.0),
            should_center_at_from: false,
        }));
        p.update_to(Point::new(9.0, 11.0), false);
        assert!(p.can_draw);
    }

    #[test]
    fn test_single_point_brush_is_drawable() {
        let p = Paint::new(PaintBody::Brush(BrushPaint {
            color: Rgba::new(0.0, 0.0, 1.0, 1.0),
            stroke_width: 4.0,
            points: vec![Point::new(1.0, 1.0)],
        }));
        assert!(p.can_draw);
    }

    #[test]
    fn test_empty_text_cannot_draw() {
        let mut p = Paint::new(PaintBody::Text(TextPaint {
            color: Rgba::new(0.0, 0.0, 0.0, 1.0),
            size: 16.0,
            font: "sans-serif".into(),
            text: String::new(),
            cursor: 0,
            from: Point::new(0.0, 0.0),
            to: Point::new(100.0, 40.0),
            mode: TextMode::Edit,
        }));
        assert!(!p.can_draw);

        if let PaintBody::Text(t) = &mut p.body {
            t.text.push('a');
        }
        p.refresh_can_draw();
        assert!(p.can_draw);
    }

    #[test]
    fn test_cursor_byte_offset_multibyte() {
        let t = TextPaint {
            color: Rgba::new(0.0, 0.0, 0.0, 1.0),
            size: 16.0,
            font: "sans-serif".into(),
            text: "aé b".into(),
            cursor: 2,
            from: Point::new(0.0, 0.0),
            to: Point::new(10.0, 10.0),
            mode: TextMode::Edit,
        };
        // 'a' is 1 byte, 'é' is 2 bytes
        assert_eq!(t.cursor_byte_offset(), 3);
    }
}
