use std::path::Path;

use anyhow::{Context, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::raster::PixelArray;

/// Deterministic backend returning a fixed detection list.
///
/// Used by tests and for replaying detections exported by another tool: the
/// model reference is then a JSON array of
/// `{"bbox": [x1, y1, x2, y2], "class_id": 0, "confidence": 0.9}` entries.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    detections: Vec<Detection>,
}

impl StubBackend {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let detections: Vec<Detection> =
            serde_json::from_str(json).context("invalid stub detection list")?;
        Ok(Self::new(detections))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read stub detections {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("in {}", path.display()))
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn predict(
        &mut self,
        _image: &PixelArray,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>> {
        Ok(self
            .detections
            .iter()
            .filter(|d| d.confidence > confidence_threshold)
            .cloned()
            .collect())
    }
}
