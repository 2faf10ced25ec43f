//! skrawl - raster annotation editor core
//!
//! A library for annotating a static raster image: shapes, text, freehand
//! strokes, privacy blur and destructive crop, with an edge-preserving
//! viewport upscaler for crisp high-zoom display. Windowing, clipboard and
//! file I/O are left to the embedding application.

mod annotation;
mod color;
mod config;
mod enhance;
mod error;
mod history;
mod render;
mod scale;
mod session;
mod upscale_cmd;
mod viewport;

pub use annotation::{
    BlurPaint, BrushPaint, Paint, PaintBody, Point, Rgba, ShapeKind, ShapeOperation, ShapePaint,
    TextMode, TextPaint, resolve_rect,
};
pub use color::parse_hex_color;
pub use config::{
    CONFIG_VERSION, Config, CropSettings, LINE_SIZE_MAX, LINE_SIZE_MIN, TEXT_SIZE_MAX,
    TEXT_SIZE_MIN, TRANSPARENCY_MAX, TRANSPARENCY_MIN, ToolSettings,
};
pub use enhance::{EnhanceCache, Enhancer};
pub use error::Error;
pub use history::{CommitOutcome, PaintHistory};
pub use render::{CaretReport, TextEngine, pixelate_region, render_state};
pub use scale::{extract_viewport, scale2x, scale2x_threshold, scale3x, scale_nx};
pub use session::{PaintMode, Session, TextEdit};
pub use upscale_cmd::{
    INPUT_TOKEN, OUTPUT_TOKEN, UpscaleCache, UpscaleCommand, UpscaleRequest, load_png, save_png,
};
pub use viewport::{RenderPlan, Viewport, ZOOM_MAX, ZOOM_MIN};
