//! sprout_census - detect sprouts on an orthophoto and summarize their spread
//!
//! This binary:
//! 1. Layers defaults, `SPROUT_CONFIG`, `SPROUT_*` variables and flags
//! 2. Validates the source raster, model and numeric settings
//! 3. Loads the raster and runs the selected detector backend
//! 4. Writes `detections.geojson` and `metrics.json` once every stage succeeded

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use sprout_census::config::ConfigOverrides;
use sprout_census::ui::Ui;
use sprout_census::{BackendRegistry, GeoTiffSource, Pipeline, RasterSource, SurveyConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Orthophoto to survey (.tif / .tiff).
    #[arg(long, value_name = "PATH", required_unless_present = "list_backends")]
    source: Option<PathBuf>,
    /// Directory for detections.geojson and metrics.json.
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
    /// Model reference for the detector backend.
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,
    /// Minimum detector confidence, 0..=1.
    #[arg(long)]
    conf: Option<f32>,
    /// Ground sample distance in metres per pixel.
    #[arg(long)]
    gsd: Option<f64>,
    /// Detector backend name.
    #[arg(long)]
    backend: Option<String>,
    /// Detections at or below this area (m²) are dropped.
    #[arg(long, value_name = "M2")]
    min_area_m2: Option<f64>,
    /// EPSG code of the published vector file.
    #[arg(long, value_name = "CODE")]
    publish_epsg: Option<u32>,
    /// Stage output: auto, plain, pretty or quiet.
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
    /// List available detector backends and exit.
    #[arg(long)]
    list_backends: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let registry = BackendRegistry::builtin();
    if args.list_backends {
        let default = registry.default_name();
        for name in registry.list() {
            if default == Some(name.as_str()) {
                println!("{name} (default)");
            } else {
                println!("{name}");
            }
        }
        return Ok(());
    }

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_flag(&args.ui, is_tty, !stdout_is_tty)?;

    let mut cfg = SurveyConfig::load()?;
    cfg.apply_overrides(ConfigOverrides {
        source: args.source,
        output_dir: args.output,
        model: args.model,
        backend: args.backend,
        confidence: args.conf,
        gsd_m: args.gsd,
        min_detection_area_m2: args.min_area_m2,
        publish_epsg: args.publish_epsg,
    });
    cfg.validate()?;
    registry.ensure_registered(&cfg.backend)?;
    let settings = cfg.pipeline_settings()?;
    let source = cfg
        .source
        .clone()
        .context("no source raster given")?;

    let mut detector = {
        let _stage = ui.stage("Load detector");
        let mut detector = registry.create(&cfg.backend, &cfg.model)?;
        detector
            .warm_up()
            .with_context(|| format!("{} backend warm-up failed", detector.name()))?;
        detector
    };
    log::info!(
        "detector backend: {} ({})",
        detector.name(),
        cfg.model.display()
    );

    let raster = {
        let _stage = ui.stage("Read raster");
        GeoTiffSource::open(&source)?.load()?
    };

    let output = Pipeline::new(settings).run(&raster, detector.as_mut(), &ui)?;

    let paths = {
        let _stage = ui.stage("Write outputs");
        output.write(&cfg.output_dir)?
    };

    println!(
        "Done: detections saved to '{}' and metrics to '{}'.",
        paths.detections.display(),
        paths.metrics.display()
    );
    Ok(())
}
