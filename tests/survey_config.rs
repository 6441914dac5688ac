use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use sprout_census::config::{ConfigOverrides, SurveyConfig};
use sprout_census::Crs;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SPROUT_CONFIG",
        "SPROUT_OUTPUT_DIR",
        "SPROUT_MODEL",
        "SPROUT_CONFIDENCE",
        "SPROUT_GSD",
        "SPROUT_MIN_AREA_M2",
        "SPROUT_PUBLISH_EPSG",
        "SPROUT_BACKEND",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "output_dir": "survey_out",
        "model": "models/replay.json",
        "backend": "stub",
        "detection": { "confidence": 0.35, "gsd": 0.1 },
        "area": { "min_detection_area_m2": 2.0, "publish_epsg": 4674 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SPROUT_CONFIG", file.path());
    std::env::set_var("SPROUT_GSD", "0.02");
    std::env::set_var("SPROUT_PUBLISH_EPSG", "EPSG:4326");
    std::env::set_var("SPROUT_BACKEND", "   ");

    let cfg = SurveyConfig::load().expect("load config");

    assert_eq!(cfg.output_dir, PathBuf::from("survey_out"));
    assert_eq!(cfg.model, PathBuf::from("models/replay.json"));
    assert_eq!(cfg.backend, "stub");
    assert_eq!(cfg.confidence, 0.35);
    assert_eq!(cfg.gsd_m, 0.02);
    assert_eq!(cfg.min_detection_area_m2, 2.0);
    assert_eq!(cfg.publish_epsg, 4326);

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = "output_dir = \"toml_out\"\n\n[detection]\nconfidence = 0.8\n";
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("SPROUT_CONFIG", file.path());

    let cfg = SurveyConfig::load().expect("load config");
    assert_eq!(cfg.output_dir, PathBuf::from("toml_out"));
    assert_eq!(cfg.confidence, 0.8);
    assert_eq!(cfg.gsd_m, 0.05);

    clear_env();
}

#[test]
fn unparsable_env_numbers_are_errors() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SPROUT_CONFIDENCE", "high");
    assert!(SurveyConfig::load().is_err());

    clear_env();
}

#[test]
fn flags_win_and_validation_checks_every_input() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    std::env::set_var("SPROUT_CONFIDENCE", "0.9");

    let dir = tempfile::tempdir().expect("temp dir");
    let source = dir.path().join("ortho.TIF");
    let model = dir.path().join("replay.json");
    std::fs::write(&source, b"").expect("write source");
    std::fs::write(&model, b"[]").expect("write model");

    let mut cfg = SurveyConfig::load().expect("load config");
    cfg.apply_overrides(ConfigOverrides {
        source: Some(source.clone()),
        model: Some(model.clone()),
        confidence: Some(0.6),
        ..ConfigOverrides::default()
    });
    assert_eq!(cfg.confidence, 0.6);
    cfg.validate().expect("valid config");
    let settings = cfg.pipeline_settings().expect("settings");
    assert_eq!(settings.publish_crs, Crs::WGS84);

    let rejected = [
        ConfigOverrides {
            confidence: Some(1.5),
            ..ConfigOverrides::default()
        },
        ConfigOverrides {
            gsd_m: Some(0.0),
            ..ConfigOverrides::default()
        },
        ConfigOverrides {
            gsd_m: Some(f64::NAN),
            ..ConfigOverrides::default()
        },
        ConfigOverrides {
            min_detection_area_m2: Some(-1.0),
            ..ConfigOverrides::default()
        },
        ConfigOverrides {
            publish_epsg: Some(1),
            ..ConfigOverrides::default()
        },
        ConfigOverrides {
            model: Some(dir.path().join("missing.onnx")),
            ..ConfigOverrides::default()
        },
        ConfigOverrides {
            source: Some(model.clone()),
            ..ConfigOverrides::default()
        },
    ];
    for overrides in rejected {
        let mut bad = cfg.clone();
        let label = format!("{overrides:?}");
        bad.apply_overrides(overrides);
        assert!(bad.validate().is_err(), "accepted {label}");
    }

    let mut no_source = SurveyConfig::default();
    no_source.model = model;
    assert!(no_source.validate().is_err());

    clear_env();
}
