use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::area::MIN_DETECTION_AREA_M2;
use crate::crs::{Crs, EPSG_WGS84};
use crate::pipeline::PipelineSettings;

const DEFAULT_OUTPUT_DIR: &str = "results";
const DEFAULT_MODEL: &str = "./runs/detect/eucalipto/v5/weights/best.onnx";
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_GSD_M: f64 = 0.05;
const DEFAULT_PUBLISH_EPSG: u32 = EPSG_WGS84;
#[cfg(feature = "backend-tract")]
pub const DEFAULT_BACKEND: &str = "tract";
#[cfg(not(feature = "backend-tract"))]
pub const DEFAULT_BACKEND: &str = "stub";

const RASTER_EXTENSIONS: [&str; 2] = ["tif", "tiff"];

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SurveyConfigFile {
    output_dir: Option<PathBuf>,
    model: Option<PathBuf>,
    backend: Option<String>,
    detection: Option<DetectionConfigFile>,
    area: Option<AreaConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectionConfigFile {
    confidence: Option<f32>,
    gsd: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AreaConfigFile {
    min_detection_area_m2: Option<f64>,
    publish_epsg: Option<u32>,
}

/// Settings for one survey run after defaults, file, environment and flags.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyConfig {
    pub source: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub model: PathBuf,
    pub backend: String,
    pub confidence: f32,
    pub gsd_m: f64,
    pub min_detection_area_m2: f64,
    pub publish_epsg: u32,
}

/// Command-line values; `None` keeps the lower layers.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub model: Option<PathBuf>,
    pub backend: Option<String>,
    pub confidence: Option<f32>,
    pub gsd_m: Option<f64>,
    pub min_detection_area_m2: Option<f64>,
    pub publish_epsg: Option<u32>,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            source: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            model: PathBuf::from(DEFAULT_MODEL),
            backend: DEFAULT_BACKEND.to_string(),
            confidence: DEFAULT_CONFIDENCE,
            gsd_m: DEFAULT_GSD_M,
            min_detection_area_m2: MIN_DETECTION_AREA_M2,
            publish_epsg: DEFAULT_PUBLISH_EPSG,
        }
    }
}

impl SurveyConfig {
    /// Defaults, then `SPROUT_CONFIG`, then `SPROUT_*` variables.
    ///
    /// Not validated: flags still have to be applied.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SPROUT_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty());
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn from_file(file: SurveyConfigFile) -> Self {
        let defaults = Self::default();
        let detection = file.detection.unwrap_or_default();
        let area = file.area.unwrap_or_default();
        Self {
            source: None,
            output_dir: file.output_dir.unwrap_or(defaults.output_dir),
            model: file.model.unwrap_or(defaults.model),
            backend: file.backend.unwrap_or(defaults.backend),
            confidence: detection.confidence.unwrap_or(defaults.confidence),
            gsd_m: detection.gsd.unwrap_or(defaults.gsd_m),
            min_detection_area_m2: area
                .min_detection_area_m2
                .unwrap_or(defaults.min_detection_area_m2),
            publish_epsg: area.publish_epsg.unwrap_or(defaults.publish_epsg),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(dir) = env_value("SPROUT_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(model) = env_value("SPROUT_MODEL") {
            self.model = PathBuf::from(model);
        }
        if let Some(backend) = env_value("SPROUT_BACKEND") {
            self.backend = backend;
        }
        if let Some(conf) = env_value("SPROUT_CONFIDENCE") {
            self.confidence = conf
                .parse()
                .map_err(|_| anyhow!("SPROUT_CONFIDENCE must be a number between 0 and 1"))?;
        }
        if let Some(gsd) = env_value("SPROUT_GSD") {
            self.gsd_m = gsd
                .parse()
                .map_err(|_| anyhow!("SPROUT_GSD must be a number of metres per pixel"))?;
        }
        if let Some(min_area) = env_value("SPROUT_MIN_AREA_M2") {
            self.min_detection_area_m2 = min_area
                .parse()
                .map_err(|_| anyhow!("SPROUT_MIN_AREA_M2 must be a number of square metres"))?;
        }
        if let Some(epsg) = env_value("SPROUT_PUBLISH_EPSG") {
            self.publish_epsg = epsg
                .trim_start_matches("EPSG:")
                .parse()
                .map_err(|_| anyhow!("SPROUT_PUBLISH_EPSG must be an integer EPSG code"))?;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(source) = overrides.source {
            self.source = Some(source);
        }
        if let Some(dir) = overrides.output_dir {
            self.output_dir = dir;
        }
        if let Some(model) = overrides.model {
            self.model = model;
        }
        if let Some(backend) = overrides.backend {
            self.backend = backend;
        }
        if let Some(conf) = overrides.confidence {
            self.confidence = conf;
        }
        if let Some(gsd) = overrides.gsd_m {
            self.gsd_m = gsd;
        }
        if let Some(min_area) = overrides.min_detection_area_m2 {
            self.min_detection_area_m2 = min_area;
        }
        if let Some(epsg) = overrides.publish_epsg {
            self.publish_epsg = epsg;
        }
    }

    /// Reject bad inputs before any raster is opened or output written.
    pub fn validate(&self) -> Result<()> {
        let source = self
            .source
            .as_deref()
            .ok_or_else(|| anyhow!("no source raster given"))?;
        validate_source(source)?;
        if !self.model.is_file() {
            return Err(anyhow!(
                "model file not found: {}",
                self.model.display()
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(anyhow!(
                "confidence must be between 0 and 1, got {}",
                self.confidence
            ));
        }
        if !self.gsd_m.is_finite() || self.gsd_m <= 0.0 {
            return Err(anyhow!("gsd must be greater than zero, got {}", self.gsd_m));
        }
        if !self.min_detection_area_m2.is_finite() || self.min_detection_area_m2 < 0.0 {
            return Err(anyhow!(
                "minimum detection area must be zero or more, got {}",
                self.min_detection_area_m2
            ));
        }
        Crs::from_epsg(self.publish_epsg)
            .map_err(|e| anyhow!("invalid publish CRS: {}", e))?;
        Ok(())
    }

    pub fn publish_crs(&self) -> Result<Crs> {
        Crs::from_epsg(self.publish_epsg)
    }

    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        Ok(PipelineSettings {
            confidence: self.confidence,
            gsd_m: self.gsd_m,
            min_detection_area_m2: self.min_detection_area_m2,
            publish_crs: self.publish_crs()?,
        })
    }
}

/// The source must be an existing `.tif`/`.tiff` file (any case).
pub fn validate_source(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(anyhow!("source raster not found: {}", path.display()));
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if RASTER_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(anyhow!(
            "source raster must be a .tif or .tiff file: {}",
            path.display()
        )),
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_config_file(path: &Path) -> Result<SurveyConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
