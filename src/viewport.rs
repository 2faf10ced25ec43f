//! Viewport state: zoom, pan, coordinate mapping and render-path selection.
//!
//! The screen-to-image mapping `image = (screen - pan) / (base_scale * zoom)`
//! drives both drawing input and the upscaler placement, so it lives in one
//! place. `base_scale` is the fit-to-window ratio computed once at load and
//! after a crop; zoom and pan are the only mutable parts.

use crate::annotation::Point;

/// Minimum zoom level (10%).
pub const ZOOM_MIN: f32 = 0.1;
/// Maximum zoom level (1000%).
pub const ZOOM_MAX: f32 = 10.0;
/// Multiplicative zoom step per scroll notch.
pub const ZOOM_STEP: f32 = 1.1;

/// Above this zoom the viewport switches from a direct nearest-neighbor blit
/// to the windowed EPX upscaler.
const SCALE2X_ZOOM_THRESHOLD: f32 = 1.5;

/// How a frame should be painted to the screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderPlan {
    /// Blit the full rendering surface at `scale` with nearest-neighbor
    /// sampling, translated by the pan offset.
    Direct { scale: f32 },
    /// Run the viewport extractor on `region` (image coordinates) at the
    /// power-of-two `factor`, then blit the result at `(draw_x, draw_y)`
    /// scaled by `final_scale` so it reconstitutes the apparent size.
    Upscaled {
        region: (i32, i32, i32, i32),
        factor: u32,
        draw_x: f32,
        draw_y: f32,
        final_scale: f32,
    },
}

/// Pan/zoom transform over the rendering surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Fit-to-window ratio, fixed between crops
    pub base_scale: f32,
    /// Current zoom level (1.0 = 100%)
    pub zoom: f32,
    /// Pan offset in screen pixels
    pub pan_x: f32,
    pub pan_y: f32,
}

impl Viewport {
    /// Create a viewport with the given base scale and identity zoom/pan.
    pub fn new(base_scale: f32) -> Self {
        Self {
            base_scale,
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }

    /// Fit an image into a canvas, computing the base scale.
    pub fn fit(image_w: u32, image_h: u32, canvas_w: u32, canvas_h: u32) -> Self {
        let sx = canvas_w as f32 / image_w.max(1) as f32;
        let sy = canvas_h as f32 / image_h.max(1) as f32;
        Self::new(sx.min(sy))
    }

    /// Combined screen-pixels-per-image-pixel scale.
    pub fn effective_scale(&self) -> f32 {
        self.base_scale * self.zoom
    }

    /// Map a screen position to image coordinates, clamped to the image.
    pub fn screen_to_image(&self, sx: f32, sy: f32, image_w: u32, image_h: u32) -> Point {
        let scale = self.effective_scale();
        let x = (sx - self.pan_x) / scale;
        let y = (sy - self.pan_y) / scale;
        Point::new(
            x.clamp(0.0, image_w as f32),
            y.clamp(0.0, image_h as f32),
        )
    }

    /// Map an image position to screen coordinates (inverse of
    /// [`Viewport::screen_to_image`], without clamping).
    pub fn image_to_screen(&self, ix: f32, iy: f32) -> (f32, f32) {
        let scale = self.effective_scale();
        (ix * scale + self.pan_x, iy * scale + self.pan_y)
    }

    /// Accumulate a screen-space drag delta into the pan offset.
    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    /// Apply one multiplicative zoom step anchored at the cursor.
    ///
    /// Solves for the pan offset that keeps the image point under the cursor
    /// fixed in screen space across the zoom change. `steps` is positive to
    /// zoom in, negative to zoom out.
    pub fn zoom_at(&mut self, cursor_x: f32, cursor_y: f32, steps: i32) {
        let old_zoom = self.zoom;
        let factor = ZOOM_STEP.powi(steps);
        self.zoom = (self.zoom * factor).clamp(ZOOM_MIN, ZOOM_MAX);

        if self.zoom != old_zoom {
            let ratio = self.zoom / old_zoom;
            self.pan_x = cursor_x - (cursor_x - self.pan_x) * ratio;
            self.pan_y = cursor_y - (cursor_y - self.pan_y) * ratio;
        }
    }

    /// Reset zoom and pan to identity (after a crop, or on demand).
    pub fn reset(&mut self) {
        self.zoom = 1.0;
        self.pan_x = 0.0;
        self.pan_y = 0.0;
    }

    /// Decide how the current frame should reach the screen.
    ///
    /// Below the zoom threshold a plain nearest-neighbor blit of the full
    /// rendering surface is cheapest and good enough. Above it, the visible
    /// image-space rectangle (padded to avoid edge gaps) goes through the
    /// EPX extractor at the next power-of-two factor, capped at 8.
    pub fn plan_frame(
        &self,
        image_w: u32,
        image_h: u32,
        canvas_w: u32,
        canvas_h: u32,
    ) -> RenderPlan {
        let scale = self.effective_scale();

        if self.zoom <= SCALE2X_ZOOM_THRESHOLD {
            return RenderPlan::Direct { scale };
        }

        let mut factor = 2u32;
        while (factor as f32) < scale && factor < crate::scale::MAX_SCALE_FACTOR {
            factor *= 2;
        }

        // Visible image-space rectangle, padded for edge pixels
        let inv = 1.0 / scale;
        let mut x = ((-self.pan_x) * inv) as i32;
        let mut y = ((-self.pan_y) * inv) as i32;
        let mut w = (canvas_w as f32 * inv) as i32 + 2;
        let mut h = (canvas_h as f32 * inv) as i32 + 2;

        if x < 0 {
            x = 0;
        }
        if y < 0 {
            y = 0;
        }
        if x + w > image_w as i32 {
            w = image_w as i32 - x;
        }
        if y + h > image_h as i32 {
            h = image_h as i32 - y;
        }

        if w <= 0 || h <= 0 {
            // Nothing of the image is visible; the direct path handles it
            return RenderPlan::Direct { scale };
        }

        RenderPlan::Upscaled {
            region: (x, y, w, h),
            factor,
            draw_x: self.pan_x + x as f32 * scale,
            draw_y: self.pan_y + y as f32 * scale,
            final_scale: scale / factor as f32,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1.0)
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
    fn test_screen_image_round_trip() {
        let mut vp = Viewport::new(0.5);
        vp.zoom = 2.0;
        vp.pan_x = 30.0;
        vp.pan_y = -10.0;

        let p = vp.screen_to_image(130.0, 90.0, 1000, 1000);
        let (sx, sy) = vp.image_to_screen(p.x, p.y);
        assert!(approx_eq(sx, 130.0));
        assert!(approx_eq(sy, 90.0));
    }

    #[test]
    fn test_screen_to_image_clamps() {
        let vp = Viewport::new(1.0);
        let p = vp.screen_to_image(-50.0, 5000.0, 100, 100);
        assert_eq!(p.x, 0.0);
        assert_eq!(p.y, 100.0);
    }

    #[test]
    fn test_zoom_at_keeps_cursor_point_fixed() {
        let mut vp = Viewport::new(0.8);
        vp.pan_x = 12.0;
        vp.pan_y = 34.0;

        let (cx, cy) = (200.0, 150.0);
        let before = vp.screen_to_image(cx, cy, 4000, 4000);
        vp.zoom_at(cx, cy, 1);
        let after = vp.screen_to_image(cx, cy, 4000, 4000);

        assert!(approx_eq(before.x, after.x));
        assert!(approx_eq(before.y, after.y));

        vp.zoom_at(cx, cy, -1);
        let back = vp.screen_to_image(cx, cy, 4000, 4000);
        assert!(approx_eq(before.x, back.x));
        assert!(approx_eq(before.y, back.y));
    }

    #[test]
    fn test_zoom_clamped_to_range() {
        let mut vp = Viewport::new(1.0);
        vp.zoom_at(0.0, 0.0, 1000);
        assert!(approx_eq(vp.zoom, ZOOM_MAX));
        vp.zoom_at(0.0, 0.0, -10000);
        assert!(approx_eq(vp.zoom, ZOOM_MIN));
    }

    #[test]
    fn test_plan_low_zoom_is_direct() {
        let vp = Viewport::new(1.0);
        match vp.plan_frame(800, 600, 800, 600) {
            RenderPlan::Direct { scale } => assert!(approx_eq(scale, 1.0)),
            other => panic!("expected direct plan, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_high_zoom_uses_extractor() {
        let mut vp = Viewport::new(1.0);
        vp.zoom = 3.0;

        match vp.plan_frame(800, 600, 800, 600) {
            RenderPlan::Upscaled {
                region,
                factor,
                final_scale,
                ..
            } => {
                // effective scale 3.0 -> next power of two is 4
                assert_eq!(factor, 4);
                assert!(approx_eq(final_scale, 0.75));
                let (x, y, w, h) = region;
                assert!(x >= 0 && y >= 0);
                assert!(w > 0 && h > 0);
                assert!(x + w <= 800 && y + h <= 600);
            }
            other => panic!("expected upscaled plan, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_factor_capped_at_eight() {
        let mut vp = Viewport::new(2.0);
        vp.zoom = 10.0;
        match vp.plan_frame(800, 600, 400, 300) {
            RenderPlan::Upscaled { factor, .. } => assert_eq!(factor, 8),
            other => panic!("expected upscaled plan, got {other:?}"),
        }
    }
}
