//! The editing session context.
//!
//! All editor state lives in one explicit [`Session`] value handed to every
//! operation: backing image, paint history, viewport, live tool settings and
//! the derived rendering surface with its caches. Input events mutate the
//! history, every mutation rebuilds the rendering surface in full, and the
//! rebuild invalidates the enhancement and upscale preview caches.

use tiny_skia::{Color, IntRect, Pixmap, PixmapPaint, Transform};

use crate::annotation::{
    BlurPaint, BrushPaint, Paint, PaintBody, Point, Rgba, ShapeKind, ShapeOperation, ShapePaint,
    TextMode, TextPaint,
};
use crate::color::parse_hex_color;
use crate::config::{Config, CropSettings, ToolSettings};
use crate::enhance::{EnhanceCache, Enhancer};
use crate::error::Error;
use crate::history::{CommitOutcome, PaintHistory};
use crate::render::{CaretReport, TextEngine, pixelate_region, render_state};
use crate::scale::extract_viewport;
use crate::upscale_cmd::{UpscaleCache, UpscaleCommand};
use crate::viewport::{RenderPlan, Viewport};

/// Default bounding box handed to a fresh text paint so the caret has room
/// before any character is typed.
const TEXT_BOX_DEFAULT_W: f32 = 300.0;
const TEXT_BOX_DEFAULT_H: f32 = 60.0;

/// The active drawing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaintMode {
    #[default]
    Brush,
    Highlighter,
    Rectangle,
    Ellipse,
    Arrow,
    Line,
    Text,
    Blur,
    Crop,
}

/// A character-level edit applied to the pending text paint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEdit {
    /// Insert a character at the caret
    Insert(char),
    /// Delete the character before the caret
    Backspace,
    /// Move the caret one character left
    CursorLeft,
    /// Move the caret one character right
    CursorRight,
    /// Finalize editing; further edits are inert for this paint
    Done,
}

/// Everything one open image's editing state consists of.
pub struct Session {
    backing: Pixmap,
    history: PaintHistory,
    viewport: Viewport,
    fonts: TextEngine,
    surface: Pixmap,
    caret: Option<CaretReport>,

    mode: PaintMode,
    color: Rgba,
    settings: ToolSettings,
    crop_settings: CropSettings,
    device_scale: f32,
    canvas_w: u32,
    canvas_h: u32,

    enhance_cache: EnhanceCache,
    upscale_cache: UpscaleCache,
    upscale_command: Option<UpscaleCommand>,
}

impl Session {
    /// Start a session over a decoded backing image.
    pub fn new(
        backing: Pixmap,
        canvas_w: u32,
        canvas_h: u32,
        config: &Config,
        device_scale: f32,
    ) -> Result<Self, Error> {
        let viewport = Viewport::fit(backing.width(), backing.height(), canvas_w, canvas_h);
        let color = parse_hex_color(&config.tools.custom_color)
            .filter(|c| c.a > 0.0)
            .unwrap_or(Rgba::new(1.0, 0.0, 0.0, 1.0));
        let upscale_command = config.upscale_command.as_deref().and_then(|template| {
            match UpscaleCommand::new(template) {
                Ok(command) => Some(command),
                Err(err) => {
                    log::warn!("ignoring configured upscale command: {err}");
                    None
                }
            }
        });

        let mut session = Self {
            surface: backing.clone(),
            backing,
            history: PaintHistory::new(),
            viewport,
            fonts: TextEngine::new(),
            caret: None,
            mode: PaintMode::default(),
            color,
            settings: config.tools.clone(),
            crop_settings: config.crop,
            device_scale: device_scale.max(1.0),
            canvas_w,
            canvas_h,
            enhance_cache: EnhanceCache::new(),
            upscale_cache: UpscaleCache::new(),
            upscale_command,
        };
        session.rebuild()?;
        Ok(session)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn backing(&self) -> &Pixmap {
        &self.backing
    }

    /// The flattened rendering surface from the last rebuild.
    pub fn surface(&self) -> &Pixmap {
        &self.surface
    }

    /// Caret placement when a text paint is being edited, in image
    /// coordinates. Use [`Session::caret_screen`] for the input-method
    /// collaborator.
    pub fn caret(&self) -> Option<CaretReport> {
        self.caret
    }

    /// Screen-space caret rectangle `(x, y, w, h)` for the input-method
    /// collaborator, with `y` at the caret top. Follows the viewport, so it
    /// stays anchored under pan and zoom.
    pub fn caret_screen(&self) -> Option<(f32, f32, f32, f32)> {
        let caret = self.caret?;
        let (x, y) = self
            .viewport
            .image_to_screen(caret.x, caret.y - caret.height);
        let scale = self.viewport.effective_scale();
        Some((x, y, scale, caret.height * scale))
    }

    pub fn history(&self) -> &PaintHistory {
        &self.history
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn mode(&self) -> PaintMode {
        self.mode
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    pub fn upscale_cache(&self) -> &UpscaleCache {
        &self.upscale_cache
    }

    pub fn upscale_cache_mut(&mut self) -> &mut UpscaleCache {
        &mut self.upscale_cache
    }

    // ========================================================================
    // Tool selection and settings
    // ========================================================================

    /// Switch the active tool, finalizing any live pending paint first.
    pub fn set_mode(&mut self, mode: PaintMode) -> Result<(), Error> {
        if self.mode != mode {
            self.commit_state()?;
            log::debug!("paint mode -> {mode:?}");
            self.mode = mode;
        }
        Ok(())
    }

    pub fn set_color(&mut self, color: Rgba) {
        self.color = color;
    }

    /// Nudge the stroke width; a live pending paint picks the change up
    /// immediately.
    pub fn adjust_line_size(&mut self, delta: f32) -> Result<(), Error> {
        self.settings.adjust_line_size(delta);
        let width = self.settings.line_size;
        let mut changed = false;
        if let Some(pending) = self.history.pending_mut() {
            match &mut pending.body {
                PaintBody::Brush(b) | PaintBody::Highlighter(b) => {
                    b.stroke_width = width;
                    changed = true;
                }
                PaintBody::Shape(s) => {
                    s.stroke_width = width;
                    changed = true;
                }
                _ => {}
            }
        }
        if changed {
            self.rebuild()?;
        }
        Ok(())
    }

    /// Nudge the text size; a live pending text box resizes immediately.
    pub fn adjust_text_size(&mut self, delta: f32) -> Result<(), Error> {
        self.settings.adjust_text_size(delta);
        let size = self.settings.text_size;
        let mut changed = false;
        if let Some(pending) = self.history.pending_mut() {
            if let PaintBody::Text(t) = &mut pending.body {
                t.size = size;
                changed = true;
            }
        }
        if changed {
            self.rebuild()?;
        }
        Ok(())
    }

    // ========================================================================
    // Pointer input
    // ========================================================================

    /// Begin a paint at a screen position.
    pub fn pointer_down(&mut self, sx: f32, sy: f32) -> Result<(), Error> {
        // Starting a new paint finalizes whatever was live
        self.commit_state()?;

        let p = self.viewport.screen_to_image(
            sx,
            sy,
            self.backing.width(),
            self.backing.height(),
        );

        let body = match self.mode {
            PaintMode::Brush => PaintBody::Brush(self.new_brush(p)),
            PaintMode::Highlighter => PaintBody::Highlighter(self.new_brush(p)),
            PaintMode::Rectangle => PaintBody::Shape(self.new_shape(ShapeKind::Rectangle, p)),
            PaintMode::Ellipse => PaintBody::Shape(self.new_shape(ShapeKind::Ellipse, p)),
            PaintMode::Arrow => PaintBody::Shape(self.new_shape(ShapeKind::Arrow, p)),
            PaintMode::Line => PaintBody::Shape(self.new_shape(ShapeKind::Line, p)),
            PaintMode::Text => PaintBody::Text(TextPaint {
                color: self.color,
                size: self.settings.text_size,
                font: self.settings.text_font.clone(),
                text: String::new(),
                cursor: 0,
                from: p,
                to: Point::new(p.x + TEXT_BOX_DEFAULT_W, p.y + TEXT_BOX_DEFAULT_H),
                mode: TextMode::Edit,
            }),
            PaintMode::Blur => PaintBody::Blur(BlurPaint {
                from: p,
                to: p,
                cached: None,
            }),
            PaintMode::Crop => PaintBody::Crop(ShapePaint {
                kind: ShapeKind::Rectangle,
                color: Rgba::new(0.0, 0.0, 0.0, 1.0),
                stroke_width: 1.0,
                operation: ShapeOperation::Stroke,
                from: p,
                to: p,
                should_center_at_from: false,
            }),
        };

        self.history.set_pending(Paint::new(body));
        self.rebuild()
    }

    /// Track the pointer while the primary button is held.
    ///
    /// `center_at_from` reflects the center-anchor modifier for shapes.
    pub fn pointer_motion(
        &mut self,
        sx: f32,
        sy: f32,
        center_at_from: bool,
    ) -> Result<(), Error> {
        let p = self.viewport.screen_to_image(
            sx,
            sy,
            self.backing.width(),
            self.backing.height(),
        );
        let crop_settings = self.crop_settings;

        let Some(pending) = self.history.pending_mut() else {
            return Ok(());
        };
        let p = match &pending.body {
            // The crop drag honors the configured aspect constraint
            PaintBody::Crop(s) => crop_settings.constrain(s.from, p),
            _ => p,
        };
        pending.update_to(p, center_at_from);
        self.rebuild()
    }

    /// Release the pointer, finalizing drag-shaped paints.
    ///
    /// Text stays pending for keyboard editing and crop stays pending until
    /// [`Session::apply_crop`] or a mode switch.
    pub fn pointer_up(&mut self, sx: f32, sy: f32, center_at_from: bool) -> Result<(), Error> {
        self.pointer_motion(sx, sy, center_at_from)?;
        let stays_pending = matches!(
            self.history.pending().map(|p| &p.body),
            None | Some(PaintBody::Text(_)) | Some(PaintBody::Crop(_))
        );
        if stays_pending {
            Ok(())
        } else {
            self.commit_state()
        }
    }

    fn new_brush(&self, p: Point) -> BrushPaint {
        BrushPaint {
            color: self.color,
            stroke_width: self.settings.line_size,
            points: vec![p],
        }
    }

    fn new_shape(&self, kind: ShapeKind, p: Point) -> ShapePaint {
        ShapePaint {
            kind,
            color: if self.settings.fill_shape {
                self.color.with_alpha(self.settings.fill_alpha())
            } else {
                self.color
            },
            stroke_width: self.settings.line_size,
            operation: if self.settings.fill_shape
                && matches!(kind, ShapeKind::Rectangle | ShapeKind::Ellipse)
            {
                ShapeOperation::Fill
            } else {
                ShapeOperation::Stroke
            },
            from: p,
            to: p,
            should_center_at_from: false,
        }
    }

    // ========================================================================
    // Text editing
    // ========================================================================

    /// Apply a character-level edit to the pending text paint, if any.
    pub fn text_edit(&mut self, edit: TextEdit) -> Result<(), Error> {
        let Some(pending) = self.history.pending_mut() else {
            return Ok(());
        };
        let PaintBody::Text(t) = &mut pending.body else {
            return Ok(());
        };
        if t.mode == TextMode::Done {
            return Ok(());
        }

        match edit {
            TextEdit::Insert(c) => {
                let at = t.cursor_byte_offset();
                t.text.insert(at, c);
                t.cursor += 1;
            }
            TextEdit::Backspace => {
                if t.cursor > 0 {
                    t.cursor -= 1;
                    let at = t.cursor_byte_offset();
                    t.text.remove(at);
                }
            }
            TextEdit::CursorLeft => {
                t.cursor = t.cursor.saturating_sub(1);
            }
            TextEdit::CursorRight => {
                t.cursor = (t.cursor + 1).min(t.text.chars().count());
            }
            TextEdit::Done => {
                t.mode = TextMode::Done;
            }
        }
        pending.refresh_can_draw();
        self.rebuild()
    }

    // ========================================================================
    // History transitions
    // ========================================================================

    /// Finalize the pending paint, if any.
    ///
    /// A pending crop selection is discarded rather than committed: it never
    /// enters the visible stack. A pending blur gets its one-shot pixelation
    /// computed here, from a render of everything beneath it.
    pub fn commit_state(&mut self) -> Result<(), Error> {
        if self.history.pending().is_none() {
            return Ok(());
        }
        let is_crop = matches!(
            self.history.pending().map(|p| &p.body),
            Some(PaintBody::Crop(_))
        );
        if is_crop {
            // A crop selection never enters the visible stack
            self.history.discard_pending();
            return self.rebuild();
        }
        let is_blur = matches!(
            self.history.pending().map(|p| &p.body),
            Some(PaintBody::Blur(_))
        );
        if is_blur {
            return self.commit_blur();
        }

        match self.history.commit_pending() {
            CommitOutcome::Empty => Ok(()),
            _ => self.rebuild(),
        }
    }

    /// Commit a pending blur: render the stack without it, pixelate the
    /// covered region and cache the result on the paint. The averaging runs
    /// exactly once; redraws blit the cache.
    fn commit_blur(&mut self) -> Result<(), Error> {
        let Some(mut paint) = self.history.discard_pending() else {
            return Ok(());
        };
        let PaintBody::Blur(blur) = &mut paint.body else {
            self.history.set_pending(paint);
            return Ok(());
        };

        let (beneath, _) = render_state(&self.backing, &self.history, &mut self.fonts)?;
        let (x, y, w, h) = blur.rect();
        match pixelate_region(&beneath, x, y, w, h, self.device_scale) {
            Some(cached) => {
                log::debug!("blur committed at ({x:.1},{y:.1}) {w:.1}x{h:.1}");
                blur.cached = Some(cached);
                self.history.push_committed(paint);
            }
            None => {
                log::debug!("discarding zero-extent blur");
            }
        }
        self.rebuild()
    }

    pub fn undo(&mut self) -> Result<(), Error> {
        if self.history.undo() {
            self.rebuild()?;
        }
        Ok(())
    }

    pub fn redo(&mut self) -> Result<(), Error> {
        if self.history.redo() {
            self.rebuild()?;
        }
        Ok(())
    }

    /// Drop every paint, committed or not.
    pub fn clear(&mut self) -> Result<(), Error> {
        self.history.clear();
        self.rebuild()
    }

    // ========================================================================
    // Crop transform
    // ========================================================================

    /// Destructively replace the backing image with the pending crop
    /// selection.
    ///
    /// A selection that resolves to nothing after clamping leaves all state
    /// untouched except the discarded selection itself. Otherwise the crop
    /// drops every paint and cache and resets the viewport: prior paints are
    /// positioned against the old geometry and cannot be kept.
    pub fn apply_crop(&mut self) -> Result<(), Error> {
        let Some(PaintBody::Crop(shape)) = self.history.pending().map(|p| &p.body) else {
            return Ok(());
        };
        let (x, y, w, h) = shape.rect();

        let iw = self.backing.width() as f32;
        let ih = self.backing.height() as f32;
        let x0 = x.max(0.0);
        let y0 = y.max(0.0);
        let x1 = (x + w).min(iw);
        let y1 = (y + h).min(ih);

        if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
            log::debug!("discarding zero-area crop selection");
            self.history.discard_pending();
            return self.rebuild();
        }

        let rect = IntRect::from_xywh(
            x0 as i32,
            y0 as i32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        )
        .ok_or_else(|| Error::InvalidGeometry {
            message: format!("crop rectangle {x0},{y0} {}x{}", x1 - x0, y1 - y0),
        })?;
        // Deep copy; the old backing buffer is dropped with the session state
        let cropped = self.backing.clone_rect(rect).ok_or(Error::SurfaceAlloc {
            width: rect.width(),
            height: rect.height(),
        })?;

        log::info!(
            "cropping {}x{} -> {}x{}",
            self.backing.width(),
            self.backing.height(),
            cropped.width(),
            cropped.height()
        );
        self.backing = cropped;
        self.history.clear();
        self.viewport = Viewport::fit(
            self.backing.width(),
            self.backing.height(),
            self.canvas_w,
            self.canvas_h,
        );
        self.rebuild()
    }

    // ========================================================================
    // Viewport
    // ========================================================================

    pub fn screen_to_image(&self, sx: f32, sy: f32) -> Point {
        self.viewport
            .screen_to_image(sx, sy, self.backing.width(), self.backing.height())
    }

    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.viewport.pan_by(dx, dy);
    }

    /// Zoom by `steps` notches anchored at the cursor.
    pub fn zoom_at(&mut self, cursor_x: f32, cursor_y: f32, steps: i32) {
        self.viewport.zoom_at(cursor_x, cursor_y, steps);
    }

    pub fn reset_viewport(&mut self) {
        self.viewport.reset();
    }

    /// The canvas was resized; refit the base scale, keeping zoom and pan.
    pub fn resize_canvas(&mut self, canvas_w: u32, canvas_h: u32) {
        self.canvas_w = canvas_w;
        self.canvas_h = canvas_h;
        let refit = Viewport::fit(
            self.backing.width(),
            self.backing.height(),
            canvas_w,
            canvas_h,
        );
        self.viewport.base_scale = refit.base_scale;
    }

    /// Decide the render path for this frame and produce the upscaled view
    /// when the plan calls for one.
    pub fn present(&self) -> (RenderPlan, Option<Pixmap>) {
        let plan = self.viewport.plan_frame(
            self.surface.width(),
            self.surface.height(),
            self.canvas_w,
            self.canvas_h,
        );
        let view = match plan {
            RenderPlan::Direct { .. } => None,
            RenderPlan::Upscaled {
                region: (x, y, w, h),
                factor,
                ..
            } => extract_viewport(&self.surface, x, y, w, h, factor),
        };
        (plan, view)
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Flatten for export: the rendering surface composited over an opaque
    /// dark background, so exports match the preview. Commits any live
    /// pending paint first.
    pub fn export(&mut self) -> Result<Pixmap, Error> {
        self.commit_state()?;
        flatten(&self.surface)
    }

    /// Export at upscaled quality. Prefers a result the asynchronous upscale
    /// worker already delivered for the current surface; otherwise runs the
    /// configured command synchronously, falling back to the plain flattened
    /// surface when no command is configured or the run fails. Commits any
    /// live pending paint first, which drops a now-stale worker result.
    pub fn export_upscaled(&mut self) -> Result<Pixmap, Error> {
        self.commit_state()?;
        if let Some(result) = self.upscale_cache.get() {
            log::debug!("export: using delivered upscale result");
            return Ok(result.clone());
        }
        let flat = flatten(&self.surface)?;
        match &self.upscale_command {
            Some(command) => Ok(command.run(&flat).unwrap_or(flat)),
            None => Ok(flat),
        }
    }

    /// Export with an enhancement pass, falling back to the plain flattened
    /// surface when the collaborator fails.
    pub fn export_enhanced(
        &mut self,
        enhancer: &mut dyn Enhancer,
        preset: &str,
    ) -> Result<Pixmap, Error> {
        self.commit_state()?;
        let flat = flatten(&self.surface)?;
        match self
            .enhance_cache
            .get_or_enhance(enhancer, &flat, preset)
        {
            Some(enhanced) => Ok(enhanced.clone()),
            None => Ok(flat),
        }
    }

    // ========================================================================
    // Rebuild
    // ========================================================================

    /// Regenerate the rendering surface from scratch and drop every cache
    /// derived from the previous one.
    fn rebuild(&mut self) -> Result<(), Error> {
        let (surface, caret) = render_state(&self.backing, &self.history, &mut self.fonts)?;
        self.surface = surface;
        self.caret = caret;
        self.enhance_cache.invalidate();
        self.upscale_cache.invalidate();
        Ok(())
    }
}

/// Composite a surface over an opaque dark background.
fn flatten(surface: &Pixmap) -> Result<Pixmap, Error> {
    let width = surface.width();
    let height = surface.height();
    let mut flat = Pixmap::new(width, height).ok_or(Error::SurfaceAlloc { width, height })?;
    flat.fill(Color::from_rgba8(51, 51, 51, 255));
    flat.draw_pixmap(
        0,
        0,
        surface.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
    Ok(flat)
}
