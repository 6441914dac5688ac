use anyhow::Result;

use crate::detect::result::Detection;
use crate::raster::PixelArray;

/// Detector backend trait.
///
/// A backend receives the full HWC 3-band pixel array of the raster and a
/// confidence threshold in `[0, 1]`, and returns pixel-space boxes. The core
/// never looks at the model format behind it.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection, keeping only boxes with `confidence > confidence_threshold`.
    fn predict(&mut self, image: &PixelArray, confidence_threshold: f32)
        -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
