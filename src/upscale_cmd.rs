//! External upscale-command collaborator.
//!
//! The user supplies a shell command template with `%INPUT%` and `%OUTPUT%`
//! placeholders. The core owns only token substitution, the temp-file
//! lifecycle and failure interpretation: a non-zero exit, a spawn failure or
//! a missing output file all degrade to "use the unmodified image".
//!
//! The command may run in the background; results are delivered back with
//! the generation stamp of the request, and [`UpscaleCache`] silently drops
//! a result whose generation is no longer current.

use std::path::Path;

use image::ImageEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use tiny_skia::Pixmap;

use crate::error::Error;

/// Placeholder replaced by the input temp-file path.
pub const INPUT_TOKEN: &str = "%INPUT%";
/// Placeholder replaced by the output temp-file path.
pub const OUTPUT_TOKEN: &str = "%OUTPUT%";

/// A validated upscale command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpscaleCommand {
    template: String,
}

impl UpscaleCommand {
    /// Validate that the template names both placeholders.
    pub fn new(template: &str) -> Result<Self, Error> {
        if !template.contains(INPUT_TOKEN) || !template.contains(OUTPUT_TOKEN) {
            return Err(Error::ExternalProcess {
                message: format!(
                    "upscale command must contain {INPUT_TOKEN} and {OUTPUT_TOKEN}: '{template}'"
                ),
            });
        }
        Ok(Self {
            template: template.to_string(),
        })
    }

    /// Run the command synchronously against `surface`.
    ///
    /// Any failure is logged and collapses to `None` so callers fall back to
    /// the unmodified surface. Temp files live in a throwaway directory that
    /// is removed on every path out of here.
    pub fn run(&self, surface: &Pixmap) -> Option<Pixmap> {
        match self.run_inner(surface) {
            Ok(result) => Some(result),
            Err(err) => {
                log::warn!("upscale command failed: {err}");
                None
            }
        }
    }

    fn run_inner(&self, surface: &Pixmap) -> Result<Pixmap, Error> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input.png");
        let output = dir.path().join("output.png");
        save_png(surface, &input)?;

        // Every occurrence of a token is substituted, not just the first
        let command_line = self
            .template
            .replace(INPUT_TOKEN, &input.to_string_lossy())
            .replace(OUTPUT_TOKEN, &output.to_string_lossy());
        log::info!("running upscale command: {command_line}");

        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(&command_line)
            .status()?;
        if !status.success() {
            return Err(Error::ExternalProcess {
                message: format!("upscale command exited with {status}"),
            });
        }
        if !output.exists() {
            return Err(Error::ExternalProcess {
                message: "upscale command produced no output file".to_string(),
            });
        }
        load_png(&output)
    }
}

/// A stamped request handed to whatever runs the command off-thread.
#[derive(Debug, Clone)]
pub struct UpscaleRequest {
    pub generation: u64,
    pub command: UpscaleCommand,
}

impl UpscaleRequest {
    /// Execute the request, yielding `(generation, result)` for delivery
    /// back to the session's [`UpscaleCache`].
    pub fn execute(&self, surface: &Pixmap) -> (u64, Option<Pixmap>) {
        (self.generation, self.command.run(surface))
    }
}

/// Single-slot cache for an upscale result that may arrive late.
///
/// The session bumps the generation on every content change; a delivered
/// result is accepted only if its generation is still current.
#[derive(Debug, Default)]
pub struct UpscaleCache {
    generation: u64,
    slot: Option<Pixmap>,
}

impl UpscaleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The generation any new request must carry.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stamp a new request against the current content.
    pub fn request(&self, command: UpscaleCommand) -> UpscaleRequest {
        UpscaleRequest {
            generation: self.generation,
            command,
        }
    }

    /// Deliver a completed result. Returns whether it was accepted.
    pub fn accept(&mut self, generation: u64, result: Option<Pixmap>) -> bool {
        if generation != self.generation {
            log::debug!(
                "discarding stale upscale result (generation {generation}, current {})",
                self.generation
            );
            return false;
        }
        self.slot = result;
        self.slot.is_some()
    }

    /// The cached result, if one is current.
    pub fn get(&self) -> Option<&Pixmap> {
        self.slot.as_ref()
    }

    /// Drop the cached result and advance the generation so in-flight
    /// requests become stale. Called on every content change.
    pub fn invalidate(&mut self) {
        self.slot = None;
        self.generation += 1;
    }
}

/// Encode a surface as PNG with maximum lossless compression.
///
/// The premultiplied surface is converted back to straight alpha first,
/// since PNG stores unassociated alpha.
pub fn save_png(surface: &Pixmap, path: &Path) -> Result<(), Error> {
    let mut rgba = Vec::with_capacity(surface.data().len());
    for px in surface.pixels() {
        let c = px.demultiply();
        rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }

    let file = std::fs::File::create(path)?;
    let writer = std::io::BufWriter::new(file);
    let encoder = PngEncoder::new_with_quality(writer, CompressionType::Best, FilterType::Adaptive);
    encoder.write_image(
        &rgba,
        surface.width(),
        surface.height(),
        image::ExtendedColorType::Rgba8,
    )?;
    Ok(())
}

/// Decode a PNG into a premultiplied surface.
pub fn load_png(path: &Path) -> Result<Pixmap, Error> {
    let img = image::open(path)?.to_rgba8();
    let (width, height) = img.dimensions();
    let mut surface = Pixmap::new(width, height).ok_or(Error::SurfaceAlloc { width, height })?;

    let data = surface.data_mut();
    for (i, px) in img.pixels().enumerate() {
        let a = px[3] as u32;
        let j = i * 4;
        data[j] = (px[0] as u32 * a / 255) as u8;
        data[j + 1] = (px[1] as u32 * a / 255) as u8;
        data[j + 2] = (px[2] as u32 * a / 255) as u8;
        data[j + 3] = px[3];
    }
    Ok(surface)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_pixmap(w: u32, h: u32, rgba: [u8; 4]) -> Pixmap {
        let mut pm = Pixmap::new(w, h).unwrap();
        for px in pm.data_mut().chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        pm
    }

    #[test]
    fn test_template_requires_both_tokens() {
        assert!(UpscaleCommand::new("upscaler %INPUT% %OUTPUT%").is_ok());
        assert!(UpscaleCommand::new("upscaler %INPUT%").is_err());
        assert!(UpscaleCommand::new("upscaler %OUTPUT%").is_err());
        assert!(UpscaleCommand::new("upscaler").is_err());
    }

    #[test]
    fn test_copy_command_round_trips_surface() {
        let surface = solid_pixmap(6, 4, [255, 0, 0, 255]);
        let command = UpscaleCommand::new("cp %INPUT% %OUTPUT%").unwrap();

        let result = command.run(&surface).unwrap();
        assert_eq!((result.width(), result.height()), (6, 4));
        assert_eq!(result.data(), surface.data());
    }

    #[test]
    fn test_failed_command_yields_none() {
        let surface = solid_pixmap(2, 2, [0, 0, 0, 255]);

        // Non-zero exit
        let command = UpscaleCommand::new("false # %INPUT% %OUTPUT%").unwrap();
        assert!(command.run(&surface).is_none());

        // Success but no output produced
        let command = UpscaleCommand::new("true # %INPUT% %OUTPUT%").unwrap();
        assert!(command.run(&surface).is_none());
    }

    #[test]
    fn test_cache_rejects_stale_generation() {
        let mut cache = UpscaleCache::new();
        let generation = cache.generation();
        let result = solid_pixmap(2, 2, [1, 2, 3, 255]);

        // Content changed while the request was in flight
        cache.invalidate();
        assert!(!cache.accept(generation, Some(result.clone())));
        assert!(cache.get().is_none());

        // A fresh request against the new generation is accepted
        assert!(cache.accept(cache.generation(), Some(result)));
        assert!(cache.get().is_some());
    }

    #[test]
    fn test_png_round_trip_preserves_pixels() {
        let surface = solid_pixmap(3, 3, [10, 20, 30, 255]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.png");

        save_png(&surface, &path).unwrap();
        let loaded = load_png(&path).unwrap();
        assert_eq!(loaded.data(), surface.data());
    }
}
