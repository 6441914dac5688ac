//! Stage sequencing and the run output contract.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::area::{self, MIN_DETECTION_AREA_M2};
use crate::coverage;
use crate::crs::Crs;
use crate::detect::DetectorBackend;
use crate::export::{self, DETECTIONS_FILE, METRICS_FILE};
use crate::metrics::MetricsRecord;
use crate::projector::project_box;
use crate::raster::RasterData;
use crate::ui::Ui;
use crate::{DetectionLayer, GeoDetection};

/// Knobs for one run. Validation happens in `SurveyConfig`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineSettings {
    pub confidence: f32,
    /// Ground sample distance, metres per pixel side.
    pub gsd_m: f64,
    pub min_detection_area_m2: f64,
    /// CRS of the published vector file.
    pub publish_crs: Crs,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            gsd_m: 0.05,
            min_detection_area_m2: MIN_DETECTION_AREA_M2,
            publish_crs: Crs::WGS84,
        }
    }
}

/// Detect, project, measure, summarize, publish.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run every stage over an already loaded raster.
    ///
    /// Nothing is written here; see [`SurveyOutput::write`].
    pub fn run(
        &self,
        raster: &RasterData,
        detector: &mut dyn DetectorBackend,
        ui: &Ui,
    ) -> Result<SurveyOutput> {
        let settings = &self.settings;

        let detections = {
            let _stage = ui.stage("Detect sprouts");
            detector
                .predict(&raster.pixels, settings.confidence)
                .with_context(|| format!("{} detector failed", detector.name()))?
        };
        log::info!(
            "detect: {} raw detections at confidence > {}",
            detections.len(),
            settings.confidence
        );

        let layer = {
            let _stage = ui.stage("Project boxes");
            let geo = detections
                .into_iter()
                .map(|det| GeoDetection {
                    geometry: project_box(&det.bbox, &raster.transform),
                    class_id: det.class_id,
                    confidence: det.confidence,
                    area_m2: None,
                })
                .collect();
            DetectionLayer::new(raster.crs, geo)
        };
        log::info!("project: {} polygons", layer.len());

        let layer = {
            let _stage = ui.stage("Measure areas");
            area::normalize(layer, settings.min_detection_area_m2)?
        };

        let metrics = {
            let _stage = ui.stage("Compute metrics");
            let total_area_ha = coverage::total_area_ha(&raster.pixels, settings.gsd_m);
            MetricsRecord::assemble(&layer.areas(), total_area_ha)
        };
        log::info!(
            "metrics: {} detections, {:.4} ha, {:.2} per ha",
            metrics.total_detections,
            metrics.total_area_ha,
            metrics.detections_per_ha
        );

        let layer = {
            let _stage = ui.stage("Reproject for publishing");
            layer
                .reproject(settings.publish_crs)
                .with_context(|| format!("reprojection to {} failed", settings.publish_crs))?
        };

        Ok(SurveyOutput { layer, metrics })
    }
}

/// Result of a run, held in memory until written.
#[derive(Clone, Debug, PartialEq)]
pub struct SurveyOutput {
    /// Survivors of the area filter, in the publishing CRS.
    pub layer: DetectionLayer,
    pub metrics: MetricsRecord,
}

/// Where [`SurveyOutput::write`] put the artifacts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPaths {
    pub detections: PathBuf,
    pub metrics: PathBuf,
}

impl SurveyOutput {
    /// Create `output_dir` and write `detections.geojson` and `metrics.json`.
    pub fn write(&self, output_dir: &Path) -> Result<OutputPaths> {
        if output_dir.exists() && !output_dir.is_dir() {
            return Err(anyhow!(
                "output path {} exists and is not a directory",
                output_dir.display()
            ));
        }
        fs::create_dir_all(output_dir).with_context(|| {
            format!("failed to create output directory {}", output_dir.display())
        })?;

        let paths = OutputPaths {
            detections: output_dir.join(DETECTIONS_FILE),
            metrics: output_dir.join(METRICS_FILE),
        };
        export::write_detections(&paths.detections, &self.layer)?;
        export::write_metrics(&paths.metrics, &self.metrics)?;
        Ok(paths)
    }
}
