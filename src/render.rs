//! Flattened rendering of the annotation stack.
//!
//! Every mutation rebuilds the rendering surface in full: clear to
//! transparent, blit the backing image, draw committed paints oldest first,
//! then the pending paint on top. Nothing is patched incrementally; the only
//! state a render reads back later is the committed blur cache, which is
//! produced once at commit time (see [`pixelate_region`]) and merely blitted
//! here.

use cosmic_text::{Attrs, Family, FontSystem, Metrics, Shaping, SwashCache, SwashContent, Wrap};
use tiny_skia::{
    Color, FillRule, LineCap, LineJoin, Paint as SkiaPaint, PathBuilder, Pixmap, PixmapPaint,
    Rect, Shader, Stroke, StrokeDash, Transform,
};

use crate::annotation::{BlurPaint, BrushPaint, Paint, PaintBody, Rgba, ShapeKind, ShapePaint,
    TextMode, TextPaint};
use crate::error::Error;
use crate::history::PaintHistory;

/// Pixelation block size in logical pixels before device scaling.
const BLUR_BLOCK_SIZE: f32 = 12.0;
/// Fixed highlighter alpha, independent of the configured opacity.
const HIGHLIGHTER_ALPHA: f32 = 0.4;
/// Highlighter width multiplier over the configured stroke width.
const HIGHLIGHTER_WIDTH_FACTOR: f32 = 3.0;

/// Shaping and rasterization state for text paints.
///
/// Owned by the session and threaded through renders; building a
/// `FontSystem` scans system fonts and is too expensive to redo per frame.
pub struct TextEngine {
    font_system: FontSystem,
    swash_cache: SwashCache,
}

impl TextEngine {
    pub fn new() -> Self {
        Self {
            font_system: FontSystem::new(),
            swash_cache: SwashCache::new(),
        }
    }
}

impl Default for TextEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Caret placement reported to the input-method collaborator, in image
/// coordinates. `y` is the caret baseline (bottom of the caret line).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaretReport {
    pub x: f32,
    pub y: f32,
    pub height: f32,
}

fn to_color(c: Rgba) -> Color {
    Color::from_rgba8(
        (c.r.clamp(0.0, 1.0) * 255.0) as u8,
        (c.g.clamp(0.0, 1.0) * 255.0) as u8,
        (c.b.clamp(0.0, 1.0) * 255.0) as u8,
        (c.a.clamp(0.0, 1.0) * 255.0) as u8,
    )
}

fn solid_paint(c: Rgba) -> SkiaPaint<'static> {
    SkiaPaint {
        shader: Shader::SolidColor(to_color(c)),
        anti_alias: true,
        ..SkiaPaint::default()
    }
}

/// Rebuild the full rendering surface from the backing image and history.
///
/// Returns the flattened surface plus, when the pending paint is a text box
/// in edit mode, the caret placement for the input-method collaborator.
/// Allocation failure of the base surface is the one fatal error here.
pub fn render_state(
    backing: &Pixmap,
    history: &PaintHistory,
    fonts: &mut TextEngine,
) -> Result<(Pixmap, Option<CaretReport>), Error> {
    let width = backing.width();
    let height = backing.height();
    let mut surface = Pixmap::new(width, height).ok_or(Error::SurfaceAlloc { width, height })?;

    // Transparent clear is implicit in a fresh pixmap; blit the base layer.
    surface.draw_pixmap(
        0,
        0,
        backing.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );

    let mut caret = None;
    for paint in history.iter_committed() {
        render_paint(&mut surface, paint, fonts, &mut caret);
    }
    if let Some(pending) = history.pending() {
        render_paint(&mut surface, pending, fonts, &mut caret);
    }

    Ok((surface, caret))
}

/// Dispatch over the paint variant; skips paints with no extent.
fn render_paint(
    surface: &mut Pixmap,
    paint: &Paint,
    fonts: &mut TextEngine,
    caret: &mut Option<CaretReport>,
) {
    if !paint.can_draw {
        return;
    }
    match &paint.body {
        PaintBody::Brush(brush) => render_brush(surface, brush),
        PaintBody::Highlighter(brush) => render_highlighter(surface, brush),
        PaintBody::Shape(shape) => render_shape(surface, shape),
        PaintBody::Text(text) => {
            if let Some(report) = render_text(surface, text, fonts) {
                *caret = Some(report);
            }
        }
        PaintBody::Blur(blur) => render_blur(surface, blur, paint.is_committed),
        PaintBody::Crop(shape) => render_crop_overlay(surface, shape),
    }
}

fn render_shape(surface: &mut Pixmap, shape: &ShapePaint) {
    match shape.kind {
        ShapeKind::Rectangle => render_shape_rectangle(surface, shape),
        ShapeKind::Ellipse => render_shape_ellipse(surface, shape),
        ShapeKind::Arrow => render_shape_arrow(surface, shape),
        ShapeKind::Line => render_shape_line(surface, shape),
    }
}

fn stroke_or_fill(surface: &mut Pixmap, path: &tiny_skia::Path, shape: &ShapePaint) {
    let paint = solid_paint(shape.color);
    match shape.operation {
        crate::annotation::ShapeOperation::Stroke => {
            let stroke = Stroke {
                width: shape.stroke_width,
                ..Stroke::default()
            };
            surface.stroke_path(path, &paint, &stroke, Transform::identity(), None);
        }
        crate::annotation::ShapeOperation::Fill => {
            surface.fill_path(path, &paint, FillRule::Winding, Transform::identity(), None);
        }
    }
}

fn render_shape_rectangle(surface: &mut Pixmap, shape: &ShapePaint) {
    let (x, y, w, h) = shape.rect();
    let Some(rect) = Rect::from_xywh(x, y, w, h) else {
        return;
    };
    let mut pb = PathBuilder::new();
    pb.push_rect(rect);
    if let Some(path) = pb.finish() {
        stroke_or_fill(surface, &path, shape);
    }
}

fn render_shape_ellipse(surface: &mut Pixmap, shape: &ShapePaint) {
    let dx = (shape.from.x - shape.to.x).abs();
    let dy = (shape.from.y - shape.to.y).abs();

    // Centered mode uses the full anchor span as radii; corner mode uses the
    // midpoint and half-spans, matching the rectangle resolution.
    let (cx, cy, rx, ry) = if shape.should_center_at_from {
        (shape.from.x, shape.from.y, dx, dy)
    } else {
        (
            (shape.from.x + shape.to.x) / 2.0,
            (shape.from.y + shape.to.y) / 2.0,
            dx / 2.0,
            dy / 2.0,
        )
    };

    let Some(rect) = Rect::from_xywh(cx - rx, cy - ry, rx * 2.0, ry * 2.0) else {
        return;
    };
    let mut pb = PathBuilder::new();
    pb.push_oval(rect);
    if let Some(path) = pb.finish() {
        stroke_or_fill(surface, &path, shape);
    }
}

fn render_shape_line(surface: &mut Pixmap, shape: &ShapePaint) {
    let mut pb = PathBuilder::new();
    pb.move_to(shape.from.x, shape.from.y);
    pb.line_to(shape.to.x, shape.to.y);
    let Some(path) = pb.finish() else {
        return;
    };
    let stroke = Stroke {
        width: shape.stroke_width,
        line_cap: LineCap::Round,
        ..Stroke::default()
    };
    surface.stroke_path(&path, &solid_paint(shape.color), &stroke, Transform::identity(), None);
}

/// Arrow: shaft from `from` toward `to`, shortened by the projected length
/// of the head, plus a filled triangular head scaled with the stroke width.
/// A zero-length vector renders nothing.
fn render_shape_arrow(surface: &mut Pixmap, shape: &ShapePaint) {
    let ftx = shape.to.x - shape.from.x;
    let fty = shape.to.y - shape.from.y;
    let ftn = (ftx * ftx + fty * fty).sqrt();
    if ftn < f32::EPSILON {
        return;
    }

    let head_r = 20.0;
    let scaling = shape.stroke_width / 4.0;

    // Head wing angles at 150 and 210 degrees off the shaft direction
    let alpha = std::f32::consts::PI / 6.0;
    let xa = head_r * (5.0 * alpha).cos();
    let ya = head_r * (5.0 * alpha).sin();
    let xb = head_r * (7.0 * alpha).cos();
    let yb = head_r * (7.0 * alpha).sin();
    let shaft_len = (ftn - xa.abs() * scaling).max(0.0);

    let (dir_x, dir_y) = (ftx / ftn, fty / ftn);
    let rotate = |x: f32, y: f32| -> (f32, f32) {
        (x * dir_x - y * dir_y, x * dir_y + y * dir_x)
    };

    // Shaft
    let mut pb = PathBuilder::new();
    pb.move_to(shape.from.x, shape.from.y);
    pb.line_to(
        shape.from.x + dir_x * shaft_len,
        shape.from.y + dir_y * shaft_len,
    );
    if let Some(path) = pb.finish() {
        let stroke = Stroke {
            width: shape.stroke_width,
            ..Stroke::default()
        };
        surface.stroke_path(&path, &solid_paint(shape.color), &stroke, Transform::identity(), None);
    }

    // Head triangle anchored at `to`
    let (wx1, wy1) = rotate(xa * scaling, ya * scaling);
    let (wx2, wy2) = rotate(xb * scaling, yb * scaling);
    let mut pb = PathBuilder::new();
    pb.move_to(shape.to.x, shape.to.y);
    pb.line_to(shape.to.x + wx1, shape.to.y + wy1);
    pb.line_to(shape.to.x + wx2, shape.to.y + wy2);
    pb.close();
    if let Some(path) = pb.finish() {
        surface.fill_path(
            &path,
            &solid_paint(shape.color),
            FillRule::Winding,
            Transform::identity(),
            None,
        );
    }
}

fn polyline_path(points: &[crate::annotation::Point]) -> Option<tiny_skia::Path> {
    let mut pb = PathBuilder::new();
    pb.move_to(points[0].x, points[0].y);
    for p in &points[1..] {
        pb.line_to(p.x, p.y);
    }
    pb.finish()
}

fn render_brush(surface: &mut Pixmap, brush: &BrushPaint) {
    if brush.points.is_empty() {
        return;
    }

    // A click without movement still leaves a visible mark
    if brush.points.len() == 1 {
        let p = brush.points[0];
        if let Some(rect) = Rect::from_xywh(p.x, p.y, brush.stroke_width, brush.stroke_width) {
            surface.fill_rect(rect, &solid_paint(brush.color), Transform::identity(), None);
        }
        return;
    }

    if let Some(path) = polyline_path(&brush.points) {
        let stroke = Stroke {
            width: brush.stroke_width,
            line_join: LineJoin::Bevel,
            ..Stroke::default()
        };
        surface.stroke_path(&path, &solid_paint(brush.color), &stroke, Transform::identity(), None);
    }
}

/// Highlighter: same polyline as the brush, but wide, semi-transparent,
/// square caps and round joins. Alpha is fixed regardless of settings.
fn render_highlighter(surface: &mut Pixmap, brush: &BrushPaint) {
    if brush.points.is_empty() {
        return;
    }
    let color = brush.color.with_alpha(HIGHLIGHTER_ALPHA);

    if brush.points.len() == 1 {
        let p = brush.points[0];
        let w = brush.stroke_width * HIGHLIGHTER_WIDTH_FACTOR;
        if let Some(rect) = Rect::from_xywh(p.x, p.y, w, w) {
            surface.fill_rect(rect, &solid_paint(color), Transform::identity(), None);
        }
        return;
    }

    if let Some(path) = polyline_path(&brush.points) {
        let stroke = Stroke {
            width: brush.stroke_width * HIGHLIGHTER_WIDTH_FACTOR,
            line_cap: LineCap::Square,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        surface.stroke_path(&path, &solid_paint(color), &stroke, Transform::identity(), None);
    }
}

/// Lay out and paint a text box into an off-screen surface clipped to its
/// bounding rectangle, then blit it. In edit mode also draws the bounding
/// frame and caret, and reports the caret placement.
fn render_text(surface: &mut Pixmap, text: &TextPaint, fonts: &mut TextEngine) -> Option<CaretReport> {
    let (x, y, w, h) = text.rect();
    let (bw, bh) = (w.max(1.0).ceil() as u32, h.max(1.0).ceil() as u32);
    let Some(mut layer) = Pixmap::new(bw, bh) else {
        log::warn!("unable to allocate {bw}x{bh} text layer");
        return None;
    };

    let px = text.size.max(1.0);
    let metrics = Metrics::new(px, (px * 1.2).max(px + 2.0));
    let mut buffer = cosmic_text::Buffer::new(&mut fonts.font_system, metrics);
    buffer.set_metrics_and_size(
        &mut fonts.font_system,
        metrics,
        Some(w.max(1.0)),
        Some(h.max(1.0)),
    );
    buffer.set_wrap(&mut fonts.font_system, Wrap::WordOrGlyph);
    let attrs = Attrs::new().family(Family::Name(&text.font));
    buffer.set_text(
        &mut fonts.font_system,
        &text.text,
        &attrs,
        Shaping::Advanced,
        None,
    );
    buffer.shape_until_scroll(&mut fonts.font_system, true);

    paint_glyphs(&buffer, fonts, &mut layer, text.color);

    let mut report = None;
    if text.mode == TextMode::Edit {
        // Semi-transparent bounding frame on the main surface
        if let Some(rect) = Rect::from_xywh(x, y, w, h) {
            let mut pb = PathBuilder::new();
            pb.push_rect(rect);
            if let Some(path) = pb.finish() {
                let stroke = Stroke {
                    width: 5.0,
                    ..Stroke::default()
                };
                surface.stroke_path(
                    &path,
                    &solid_paint(Rgba::new(0.5, 0.5, 0.5, 0.3)),
                    &stroke,
                    Transform::identity(),
                    None,
                );
            }
        }

        let (cx, cy, ch) = caret_position(&buffer, text);
        let mut pb = PathBuilder::new();
        pb.move_to(cx, cy);
        pb.line_to(cx, cy + ch);
        if let Some(path) = pb.finish() {
            let stroke = Stroke::default();
            layer.stroke_path(
                &path,
                &solid_paint(Rgba::new(0.3, 0.3, 0.3, 1.0)),
                &stroke,
                Transform::identity(),
                None,
            );
        }
        report = Some(CaretReport {
            x: x + cx,
            y: y + cy + ch,
            height: ch,
        });
    }

    surface.draw_pixmap(
        x.floor() as i32,
        y.floor() as i32,
        layer.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );

    report
}

/// Rasterize shaped glyphs into the text layer with src-over compositing.
///
/// Grayscale masks take the paint color at the mask's coverage; color glyphs
/// (emoji) keep their own pixels.
fn paint_glyphs(
    buffer: &cosmic_text::Buffer,
    fonts: &mut TextEngine,
    layer: &mut Pixmap,
    color: Rgba,
) {
    let lw = layer.width() as i32;
    let lh = layer.height() as i32;

    let runs: Vec<_> = buffer.layout_runs().collect();
    for run in &runs {
        for glyph in run.glyphs.iter() {
            let pg = glyph.physical((0.0, 0.0), 1.0);
            let Some(img) = fonts
                .swash_cache
                .get_image(&mut fonts.font_system, pg.cache_key)
            else {
                continue;
            };
            let gw = img.placement.width as i32;
            let gh = img.placement.height as i32;
            if gw == 0 || gh == 0 {
                continue;
            }
            let left = pg.x + img.placement.left;
            let top = run.line_y as i32 + pg.y - img.placement.top;

            for row in 0..gh {
                let y = top + row;
                if y < 0 || y >= lh {
                    continue;
                }
                for col in 0..gw {
                    let x = left + col;
                    if x < 0 || x >= lw {
                        continue;
                    }
                    let (r, g, b, a) = match img.content {
                        SwashContent::Mask | SwashContent::SubpixelMask => {
                            let coverage =
                                img.data[(row * gw + col) as usize] as f32 / 255.0;
                            (color.r, color.g, color.b, color.a * coverage)
                        }
                        SwashContent::Color => {
                            let i = ((row * gw + col) * 4) as usize;
                            (
                                img.data[i] as f32 / 255.0,
                                img.data[i + 1] as f32 / 255.0,
                                img.data[i + 2] as f32 / 255.0,
                                img.data[i + 3] as f32 / 255.0,
                            )
                        }
                    };
                    if a <= 0.0 {
                        continue;
                    }
                    blend_pixel(layer, x as u32, y as u32, r, g, b, a);
                }
            }
        }
    }
}

/// Src-over blend of a straight-alpha color onto a premultiplied pixmap.
fn blend_pixel(pm: &mut Pixmap, x: u32, y: u32, r: f32, g: f32, b: f32, a: f32) {
    let w = pm.width();
    let i = ((y * w + x) * 4) as usize;
    let data = pm.data_mut();
    let inv = 1.0 - a;
    data[i] = (r * a * 255.0 + data[i] as f32 * inv) as u8;
    data[i + 1] = (g * a * 255.0 + data[i + 1] as f32 * inv) as u8;
    data[i + 2] = (b * a * 255.0 + data[i + 2] as f32 * inv) as u8;
    data[i + 3] = (a * 255.0 + data[i + 3] as f32 * inv) as u8;
}

/// Caret `(x, top, height)` within the text layer, from the shaped layout.
fn caret_position(buffer: &cosmic_text::Buffer, text: &TextPaint) -> (f32, f32, f32) {
    let cursor_byte = text.cursor_byte_offset();
    let line_height = text.size.max(1.0) * 1.2;

    let mut last_end = (0.0f32, 0.0f32, line_height);
    for run in buffer.layout_runs() {
        for glyph in run.glyphs {
            if (glyph.start..glyph.end).contains(&cursor_byte) {
                return (glyph.x, run.line_top, run.line_height);
            }
            last_end = (glyph.x + glyph.w, run.line_top, run.line_height);
        }
    }
    last_end
}

/// Blur region: a committed paint blits its cached pixelation; a pending one
/// draws only a translucent placeholder so pointer-moves stay cheap.
fn render_blur(surface: &mut Pixmap, blur: &BlurPaint, is_committed: bool) {
    let (x, y, w, h) = blur.rect();

    if is_committed {
        match &blur.cached {
            Some(cached) => {
                surface.draw_pixmap(
                    x.floor() as i32,
                    y.floor() as i32,
                    cached.as_ref(),
                    &PixmapPaint::default(),
                    Transform::identity(),
                    None,
                );
            }
            None => {
                // Commit populates the cache; a missing one means the region
                // was degenerate at commit time.
                log::warn!("committed blur at ({x:.1},{y:.1}) has no cached surface");
            }
        }
        return;
    }

    if let Some(rect) = Rect::from_xywh(x, y, w, h) {
        surface.fill_rect(
            rect,
            &solid_paint(Rgba::new(0.0, 0.5, 1.0, 0.5)),
            Transform::identity(),
            None,
        );
    }
}

/// Crop selection overlay: darkens everything outside the resolved crop
/// rectangle (even-odd fill between the image rect and the crop rect), plus
/// a solid white border and a dashed black inner border.
fn render_crop_overlay(surface: &mut Pixmap, shape: &ShapePaint) {
    let (x, y, w, h) = shape.rect();
    let image_w = surface.width() as f32;
    let image_h = surface.height() as f32;

    let Some(outer) = Rect::from_xywh(0.0, 0.0, image_w, image_h) else {
        return;
    };
    let Some(inner) = Rect::from_xywh(x, y, w, h) else {
        return;
    };

    let mut pb = PathBuilder::new();
    pb.push_rect(outer);
    pb.push_rect(inner);
    if let Some(path) = pb.finish() {
        surface.fill_path(
            &path,
            &solid_paint(Rgba::new(0.0, 0.0, 0.0, 0.5)),
            FillRule::EvenOdd,
            Transform::identity(),
            None,
        );
    }

    let mut pb = PathBuilder::new();
    pb.push_rect(inner);
    if let Some(path) = pb.finish() {
        let stroke = Stroke {
            width: 2.0,
            ..Stroke::default()
        };
        surface.stroke_path(
            &path,
            &solid_paint(Rgba::new(1.0, 1.0, 1.0, 1.0)),
            &stroke,
            Transform::identity(),
            None,
        );

        let dashed = Stroke {
            width: 2.0,
            dash: StrokeDash::new(vec![5.0, 5.0], 0.0),
            ..Stroke::default()
        };
        surface.stroke_path(
            &path,
            &solid_paint(Rgba::new(0.0, 0.0, 0.0, 1.0)),
            &dashed,
            Transform::identity(),
            None,
        );
    }
}

/// Pixelate a region of an already-rendered surface: non-reversible privacy
/// redaction. Partitions the region into blocks whose side scales with the
/// display's device scale (minimum 4 px), replaces each with its average
/// color, and returns the region-sized sub-surface to be cached on the
/// committed blur paint. Runs exactly once per commit.
///
/// The region and the surface are both in image pixels; `device_scale`
/// only coarsens the block size so the apparent block stays the same on a
/// HiDPI display.
///
/// Returns `None` when the region clamps to nothing.
pub fn pixelate_region(
    src: &Pixmap,
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    device_scale: f32,
) -> Option<Pixmap> {
    let sw = src.width() as i32;
    let sh = src.height() as i32;

    let start_x = (x as i32).clamp(0, sw);
    let start_y = (y as i32).clamp(0, sh);
    let end_x = ((x + w) as i32).clamp(0, sw);
    let end_y = ((y + h) as i32).clamp(0, sh);
    if end_x <= start_x || end_y <= start_y {
        return None;
    }

    let block = ((BLUR_BLOCK_SIZE * device_scale) as i32).max(4);

    let out_w = (w as u32).max(1);
    let out_h = (h as u32).max(1);
    let mut out = Pixmap::new(out_w, out_h)?;

    let src_data = src.data();
    let stride = sw as usize * 4;
    // Offset of the clamped area inside the output surface
    let off_x = start_x - x as i32;
    let off_y = start_y - y as i32;

    let mut by = start_y;
    while by < end_y {
        let block_end_y = (by + block).min(end_y);
        let mut bx = start_x;
        while bx < end_x {
            let block_end_x = (bx + block).min(end_x);

            let mut sum = [0u64; 4];
            let mut count = 0u64;
            for row in by..block_end_y {
                let base = row as usize * stride;
                for col in bx..block_end_x {
                    let i = base + col as usize * 4;
                    sum[0] += src_data[i] as u64;
                    sum[1] += src_data[i + 1] as u64;
                    sum[2] += src_data[i + 2] as u64;
                    sum[3] += src_data[i + 3] as u64;
                    count += 1;
                }
            }

            if count > 0 {
                let avg = [
                    (sum[0] / count) as u8,
                    (sum[1] / count) as u8,
                    (sum[2] / count) as u8,
                    (sum[3] / count) as u8,
                ];
                let out_stride = out_w as usize * 4;
                let out_data = out.data_mut();
                for row in by..block_end_y {
                    let oy = row - start_y + off_y;
                    if oy < 0 || oy >= out_h as i32 {
                        continue;
                    }
                    let base = oy as usize * out_stride;
                    for col in bx..block_end_x {
                        let ox = col - start_x + off_x;
                        if ox < 0 || ox >= out_w as i32 {
                            continue;
                        }
                        let i = base + ox as usize * 4;
                        out_data[i..i + 4].copy_from_slice(&avg);
                    }
                }
            }

            bx = block_end_x;
        }
        by = block_end_y;
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Point, ShapeOperation};

    fn solid_pixmap(w: u32, h: u32, rgba: [u8; 4]) -> Pixmap {
        let mut pm = Pixmap::new(w, h).unwrap();
        for px in pm.data_mut().chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        pm
    }

    fn pixel(pm: &Pixmap, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * pm.width() + x) * 4) as usize;
        pm.data()[i..i + 4].try_into().unwrap()
    }

    #[test]
    fn test_render_blits_backing_image() {
        let backing = solid_pixmap(10, 8, [10, 20, 30, 255]);
        let history = PaintHistory::new();
        let mut fonts = TextEngine::new();

        let (surface, caret) = render_state(&backing, &history, &mut fonts).unwrap();
        assert_eq!((surface.width(), surface.height()), (10, 8));
        assert_eq!(pixel(&surface, 5, 4), [10, 20, 30, 255]);
        assert!(caret.is_none());
    }

    #[test]
    fn test_filled_rectangle_covers_pixels() {
        let backing = solid_pixmap(20, 20, [0, 0, 0, 255]);
        let mut history = PaintHistory::new();
        let mut paint = Paint::new(PaintBody::Shape(ShapePaint {
            kind: ShapeKind::Rectangle,
            color: Rgba::new(1.0, 0.0, 0.0, 1.0),
            stroke_width: 1.0,
            operation: ShapeOperation::Fill,
            from: Point::new(4.0, 4.0),
            to: Point::new(12.0, 12.0),
            should_center_at_from: false,
        }));
        paint.refresh_can_draw();
        history.set_pending(paint);
        history.commit_pending();

        let mut fonts = TextEngine::new();
        let (surface, _) = render_state(&backing, &history, &mut fonts).unwrap();
        assert_eq!(pixel(&surface, 8, 8), [255, 0, 0, 255]);
        assert_eq!(pixel(&surface, 1, 1), [0, 0, 0, 255]);
    }

    #[test]
    fn test_pending_blur_draws_placeholder_not_pixelation() {
        let backing = solid_pixmap(20, 20, [200, 200, 200, 255]);
        let mut history = PaintHistory::new();
        history.set_pending(Paint::new(PaintBody::Blur(BlurPaint {
            from: Point::new(2.0, 2.0),
            to: Point::new(18.0, 18.0),
            cached: None,
        })));

        let mut fonts = TextEngine::new();
        let (surface, _) = render_state(&backing, &history, &mut fonts).unwrap();
        // Translucent blue placeholder over gray, not an averaged gray block
        let px = pixel(&surface, 10, 10);
        assert!(px[2] > px[0], "expected blue-tinted placeholder, got {px:?}");
    }

    #[test]
    fn test_pixelate_region_averages_blocks() {
        // Halves aligned to the 12px block grid: each block is uniform, so
        // averaging keeps the halves distinct while flattening any detail
        // inside a block.
        let mut src = Pixmap::new(24, 24).unwrap();
        {
            let data = src.data_mut();
            for y in 0..24u32 {
                for x in 0..24u32 {
                    let i = ((y * 24 + x) * 4) as usize;
                    let v = if x < 12 { 40 } else { 200 };
                    data[i] = v;
                    data[i + 1] = v;
                    data[i + 2] = v;
                    data[i + 3] = 255;
                }
            }
        }

        let out = pixelate_region(&src, 0.0, 0.0, 24.0, 24.0, 1.0).unwrap();
        assert_eq!((out.width(), out.height()), (24, 24));
        assert_eq!(pixel(&out, 2, 2), [40, 40, 40, 255]);
        assert_eq!(pixel(&out, 13, 13), [200, 200, 200, 255]);
    }

    #[test]
    fn test_pixelate_region_stays_in_image_pixels_on_hidpi() {
        let src = solid_pixmap(16, 16, [90, 90, 90, 255]);
        let out = pixelate_region(&src, 5.0, 5.0, 10.0, 10.0, 2.0).unwrap();
        // Device scale coarsens the block size but never the geometry:
        // the cache matches the image-space region exactly.
        assert_eq!((out.width(), out.height()), (10, 10));
        assert_eq!(pixel(&out, 0, 0), [90, 90, 90, 255]);
        assert_eq!(pixel(&out, 9, 9), [90, 90, 90, 255]);
    }

    #[test]
    fn test_pixelate_region_outside_bounds_is_none() {
        let src = solid_pixmap(8, 8, [1, 2, 3, 255]);
        assert!(pixelate_region(&src, 50.0, 50.0, 4.0, 4.0, 1.0).is_none());
        assert!(pixelate_region(&src, 0.0, 0.0, 0.0, 0.0, 1.0).is_none());
    }

    #[test]
    fn test_crop_overlay_darkens_outside_only() {
        let backing = solid_pixmap(20, 20, [200, 200, 200, 255]);
        let mut history = PaintHistory::new();
        let mut paint = Paint::new(PaintBody::Crop(ShapePaint {
            kind: ShapeKind::Rectangle,
            color: Rgba::new(0.0, 0.0, 0.0, 1.0),
            stroke_width: 1.0,
            operation: ShapeOperation::Stroke,
            from: Point::new(5.0, 5.0),
            to: Point::new(15.0, 15.0),
            should_center_at_from: false,
        }));
        paint.refresh_can_draw();
        history.set_pending(paint);

        let mut fonts = TextEngine::new();
        let (surface, _) = render_state(&backing, &history, &mut fonts).unwrap();
        let outside = pixel(&surface, 1, 1);
        let inside = pixel(&surface, 10, 10);
        assert!(outside[0] < 150, "outside should be darkened: {outside:?}");
        assert_eq!(inside, [200, 200, 200, 255]);
    }
}
