//! Sprout census
//!
//! Turns object detections on a georeferenced orthophoto into vector polygons
//! and a small set of spatial-distribution statistics.
//!
//! # Pipeline
//!
//! 1. `raster`: read three bands, the affine transform and the CRS, then release the file.
//! 2. `detect`: run a detector backend over the HWC pixel array.
//! 3. `projector`: pixel boxes -> axis-aligned rectangles in the raster CRS.
//! 4. `area`: reproject to an estimated UTM zone, measure m², drop tiny detections.
//! 5. `metrics` + `coverage`: distribution statistics and surveyed hectares.
//! 6. `pipeline`: assemble the `MetricsRecord`, reproject to the publishing CRS.
//! 7. `export`: write `detections.geojson` and `metrics.json`.
//!
//! A run is single-threaded and holds no state between invocations.

use anyhow::{Context, Result};
use geo::Polygon;

pub mod area;
pub mod config;
pub mod coverage;
pub mod crs;
pub mod detect;
pub mod export;
pub mod metrics;
pub mod pipeline;
pub mod projector;
pub mod raster;
pub mod ui;

pub use config::SurveyConfig;
pub use crs::{CoordTransformer, Crs};
pub use detect::{BackendRegistry, Detection, DetectorBackend, PixelBox, StubBackend};
pub use metrics::{AreaDistribution, MetricsRecord};
pub use pipeline::{Pipeline, PipelineSettings, SurveyOutput};
pub use projector::AffineTransform;
pub use raster::{GeoTiffSource, InMemoryRaster, PixelArray, RasterData, RasterSource};

// -------------------- Geo Detections --------------------

/// A detection after projection into world coordinates.
///
/// `area_m2` stays `None` until the area normalizer has measured the polygon
/// in a metric CRS.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoDetection {
    pub geometry: Polygon<f64>,
    pub class_id: u32,
    pub confidence: f32,
    pub area_m2: Option<f64>,
}

/// An ordered set of geo detections sharing one CRS.
///
/// Order follows the detector output for traceability only.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionLayer {
    /// `None` when the raster carried no georeferencing CRS.
    pub crs: Option<Crs>,
    pub detections: Vec<GeoDetection>,
}

impl DetectionLayer {
    pub fn new(crs: Option<Crs>, detections: Vec<GeoDetection>) -> Self {
        Self { crs, detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Measured areas in layer order. Unmeasured detections are skipped.
    pub fn areas(&self) -> Vec<f64> {
        self.detections.iter().filter_map(|d| d.area_m2).collect()
    }

    /// Reproject every geometry into `target`, keeping attributes.
    ///
    /// An empty layer is relabelled without touching the transformer, so a
    /// raster without CRS and without detections still publishes cleanly.
    pub fn reproject(self, target: Crs) -> Result<Self> {
        if self.detections.is_empty() {
            return Ok(Self::new(Some(target), Vec::new()));
        }
        let source = self
            .crs
            .context("cannot reproject detections: source CRS is unknown")?;
        let transformer = CoordTransformer::new(source, target)?;
        let detections = self
            .detections
            .into_iter()
            .map(|det| {
                Ok(GeoDetection {
                    geometry: transformer.transform_polygon(&det.geometry)?,
                    ..det
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(Some(target), detections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{coord, Rect};

    fn square(x: f64, y: f64, side: f64) -> Polygon<f64> {
        Rect::new(coord! { x: x, y: y }, coord! { x: x + side, y: y + side }).to_polygon()
    }

    #[test]
    fn areas_skip_unmeasured_detections() {
        let layer = DetectionLayer::new(
            None,
            vec![
                GeoDetection {
                    geometry: square(0.0, 0.0, 1.0),
                    class_id: 0,
                    confidence: 0.9,
                    area_m2: Some(4.0),
                },
                GeoDetection {
                    geometry: square(2.0, 0.0, 1.0),
                    class_id: 0,
                    confidence: 0.8,
                    area_m2: None,
                },
            ],
        );
        assert_eq!(layer.areas(), vec![4.0]);
        assert_eq!(layer.len(), 2);
    }

    #[test]
    fn empty_layer_reprojects_without_source_crs() -> Result<()> {
        let layer = DetectionLayer::default().reproject(Crs::WGS84)?;
        assert_eq!(layer.crs, Some(Crs::WGS84));
        assert!(layer.is_empty());
        Ok(())
    }

    #[test]
    fn non_empty_layer_without_crs_fails_to_reproject() {
        let layer = DetectionLayer::new(
            None,
            vec![GeoDetection {
                geometry: square(0.0, 0.0, 1.0),
                class_id: 1,
                confidence: 0.5,
                area_m2: None,
            }],
        );
        assert!(layer.reproject(Crs::WGS84).is_err());
    }
}
