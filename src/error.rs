//! Error types for core editor operations.

use thiserror::Error;

/// Errors that can occur in the annotation pipeline.
///
/// Everything here is recoverable: a failed transform means the caller keeps
/// showing or saving the untransformed data. The single session-fatal case is
/// [`Error::SurfaceAlloc`] for the base rendering surface.
#[derive(Error, Debug)]
pub enum Error {
    /// Surface or pixel buffer allocation failed
    #[error("surface allocation failed ({width}x{height})")]
    SurfaceAlloc {
        /// Requested width in pixels
        width: u32,
        /// Requested height in pixels
        height: u32,
    },

    /// A shape or crop resolved to a non-positive extent
    #[error("invalid geometry: {message}")]
    InvalidGeometry {
        /// Description of the degenerate geometry
        message: String,
    },

    /// Source pixel data does not match the expected 32-bit RGBA layout
    #[error("unsupported pixel format: {message}")]
    UnsupportedFormat {
        /// Description of the format mismatch
        message: String,
    },

    /// An external collaborator (enhancer, upscale command) failed
    #[error("external process failed: {message}")]
    ExternalProcess {
        /// Description of the failure
        message: String,
    },

    /// I/O error while managing collaborator temp files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// PNG encode/decode error at the collaborator boundary
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration (de)serialization error
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}
