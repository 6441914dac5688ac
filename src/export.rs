//! Vector and summary writers.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use geo::orient::{Direction, Orient};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue};
use serde::Serialize;

use crate::crs::EPSG_WGS84;
use crate::metrics::MetricsRecord;
use crate::DetectionLayer;

pub const DETECTIONS_FILE: &str = "detections.geojson";
pub const METRICS_FILE: &str = "metrics.json";

const JSON_INDENT: &[u8] = b"    ";

/// Build the GeoJSON collection for `layer`.
///
/// One feature per detection with `class`, `confidence` and `area` (m²)
/// properties. Exteriors are wound counter-clockwise. A non-WGS 84 layer
/// carries the legacy named `crs` member.
pub fn feature_collection(layer: &DetectionLayer) -> FeatureCollection {
    let features = layer
        .detections
        .iter()
        .map(|det| {
            let mut properties = JsonObject::new();
            properties.insert("class".to_string(), JsonValue::from(det.class_id));
            properties.insert(
                "confidence".to_string(),
                JsonValue::from(f64::from(det.confidence)),
            );
            properties.insert(
                "area".to_string(),
                det.area_m2.map_or(JsonValue::Null, JsonValue::from),
            );
            let polygon = det.geometry.orient(Direction::Default);
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&polygon))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let foreign_members = layer
        .crs
        .filter(|crs| crs.epsg() != EPSG_WGS84)
        .map(|crs| {
            let mut members = JsonObject::new();
            members.insert(
                "crs".to_string(),
                serde_json::json!({
                    "type": "name",
                    "properties": { "name": crs.urn() }
                }),
            );
            members
        });

    FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    }
}

/// Write `layer` as a GeoJSON FeatureCollection.
pub fn write_detections(path: &Path, layer: &DetectionLayer) -> Result<()> {
    let collection = feature_collection(layer);
    write_json(path, &collection)?;
    log::info!(
        "export: wrote {} features to {}",
        collection.features.len(),
        path.display()
    );
    Ok(())
}

/// Write the run summary as indented JSON.
pub fn write_metrics(path: &Path, record: &MetricsRecord) -> Result<()> {
    write_json(path, record)?;
    log::info!("export: wrote metrics to {}", path.display());
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(JSON_INDENT);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| anyhow!("failed to encode {}: {}", path.display(), e))?;
    buf.push(b'\n');
    fs::write(path, buf).with_context(|| format!("failed to write {}", path.display()))
}
