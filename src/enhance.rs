//! Enhancement collaborator boundary.
//!
//! The enhancer itself lives outside the crate; the core only defines the
//! call shape and keeps at most one cached result, tagged with the preset
//! that produced it. The cache is dropped on every rebuild of the rendering
//! surface, since its content is derived from stale pixels after that.

use tiny_skia::Pixmap;

use crate::error::Error;

/// Transforms a flattened rendering surface into an enhanced variant,
/// selected by a preset identifier.
pub trait Enhancer {
    fn enhance(&mut self, surface: &Pixmap, preset: &str) -> Result<Pixmap, Error>;
}

/// Single-slot enhanced-surface cache.
#[derive(Debug, Default)]
pub struct EnhanceCache {
    slot: Option<(String, Pixmap)>,
}

impl EnhanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached surface for `preset`, if one is current.
    pub fn get(&self, preset: &str) -> Option<&Pixmap> {
        match &self.slot {
            Some((cached_preset, surface)) if cached_preset == preset => Some(surface),
            _ => None,
        }
    }

    /// Fetch the cached surface for `preset`, or run the enhancer and cache
    /// its result. A collaborator failure is logged and surfaces as `None`;
    /// the caller keeps using the unenhanced surface.
    pub fn get_or_enhance(
        &mut self,
        enhancer: &mut dyn Enhancer,
        surface: &Pixmap,
        preset: &str,
    ) -> Option<&Pixmap> {
        let hit = matches!(&self.slot, Some((p, _)) if p == preset);
        if !hit {
            match enhancer.enhance(surface, preset) {
                Ok(enhanced) => {
                    log::info!("enhanced surface cached for preset '{preset}'");
                    self.slot = Some((preset.to_string(), enhanced));
                }
                Err(err) => {
                    log::warn!("enhancement failed for preset '{preset}': {err}");
                    self.slot = None;
                    return None;
                }
            }
        }
        self.slot.as_ref().map(|(_, s)| s)
    }

    /// Drop the cached surface. Called whenever the rendering surface is
    /// rebuilt.
    pub fn invalidate(&mut self) {
        if self.slot.take().is_some() {
            log::debug!("enhance cache invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingEnhancer {
        calls: usize,
    }

    impl Enhancer for CountingEnhancer {
        fn enhance(&mut self, surface: &Pixmap, _preset: &str) -> Result<Pixmap, Error> {
            self.calls += 1;
            Ok(surface.clone())
        }
    }

    struct FailingEnhancer;

    impl Enhancer for FailingEnhancer {
        fn enhance(&mut self, _surface: &Pixmap, preset: &str) -> Result<Pixmap, Error> {
            Err(Error::ExternalProcess {
                message: format!("no such preset '{preset}'"),
            })
        }
    }

    #[test]
    fn test_cache_runs_enhancer_once_per_preset() {
        let surface = Pixmap::new(4, 4).unwrap();
        let mut enhancer = CountingEnhancer { calls: 0 };
        let mut cache = EnhanceCache::new();

        assert!(cache.get_or_enhance(&mut enhancer, &surface, "vivid").is_some());
        assert!(cache.get_or_enhance(&mut enhancer, &surface, "vivid").is_some());
        assert_eq!(enhancer.calls, 1);

        // A different preset evicts the slot
        assert!(cache.get_or_enhance(&mut enhancer, &surface, "mono").is_some());
        assert_eq!(enhancer.calls, 2);
        assert!(cache.get("vivid").is_none());
    }

    #[test]
    fn test_invalidate_forces_recompute() {
        let surface = Pixmap::new(4, 4).unwrap();
        let mut enhancer = CountingEnhancer { calls: 0 };
        let mut cache = EnhanceCache::new();

        cache.get_or_enhance(&mut enhancer, &surface, "vivid");
        cache.invalidate();
        assert!(cache.get("vivid").is_none());
        cache.get_or_enhance(&mut enhancer, &surface, "vivid");
        assert_eq!(enhancer.calls, 2);
    }

    #[test]
    fn test_failure_falls_back_to_none() {
        let surface = Pixmap::new(4, 4).unwrap();
        let mut cache = EnhanceCache::new();
        assert!(cache
            .get_or_enhance(&mut FailingEnhancer, &surface, "vivid")
            .is_none());
    }
}
