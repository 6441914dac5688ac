//! Ground-area measurement in an estimated UTM zone.

use anyhow::{anyhow, Context, Result};
use geo::{Area, Polygon};

use crate::crs::estimate_utm_crs;
use crate::DetectionLayer;

/// Detections at or below this many square metres are treated as noise.
pub const MIN_DETECTION_AREA_M2: f64 = 1.0;

/// Reproject `layer` into its UTM zone, record each polygon's area in m² and
/// drop detections with `area <= min_area_m2`.
///
/// An empty layer is returned as-is: there is no extent to pick a zone from.
/// Attributes of the survivors are untouched and their order is kept.
pub fn normalize(layer: DetectionLayer, min_area_m2: f64) -> Result<DetectionLayer> {
    if layer.is_empty() {
        log::debug!("area normalizer: no detections, skipping UTM estimation");
        return Ok(layer);
    }
    let source = layer
        .crs
        .ok_or_else(|| anyhow!("cannot estimate a UTM zone: raster has no CRS"))?;

    let geometries: Vec<Polygon<f64>> =
        layer.detections.iter().map(|d| d.geometry.clone()).collect();
    let utm = estimate_utm_crs(&geometries, source)
        .with_context(|| format!("UTM estimation from {source} failed"))?;
    log::info!("area normalizer: {} -> {}", source, utm);

    let projected = layer.reproject(utm)?;
    let total = projected.len();
    let detections: Vec<_> = projected
        .detections
        .into_iter()
        .enumerate()
        .filter_map(|(index, mut det)| {
            let area = det.geometry.unsigned_area();
            if area > min_area_m2 {
                det.area_m2 = Some(area);
                Some(det)
            } else {
                log::debug!(
                    "area normalizer: dropping detection #{} ({:.3} m² <= {} m²)",
                    index,
                    area,
                    min_area_m2
                );
                None
            }
        })
        .collect();

    log::info!(
        "area normalizer: kept {} of {} detections above {} m²",
        detections.len(),
        total,
        min_area_m2
    );
    Ok(DetectionLayer::new(Some(utm), detections))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::GeoDetection;
    use geo::{coord, Rect};

    fn det(x: f64, y: f64, w: f64, h: f64, class_id: u32, confidence: f32) -> GeoDetection {
        GeoDetection {
            geometry: Rect::new(coord! { x: x, y: y }, coord! { x: x + w, y: y + h })
                .to_polygon(),
            class_id,
            confidence,
            area_m2: None,
        }
    }

    #[test]
    fn drops_detections_at_or_below_threshold() -> Result<()> {
        let utm = Crs::from_epsg(32723)?;
        let layer = DetectionLayer::new(
            Some(utm),
            vec![
                det(500_000.0, 8_250_000.0, 0.5, 0.5, 0, 0.9),
                det(500_010.0, 8_250_000.0, 2.0, 2.0, 1, 0.7),
                det(500_020.0, 8_250_000.0, 1.0, 1.0, 0, 0.8),
                det(500_030.0, 8_250_000.0, 1.5, 1.0, 3, 0.6),
            ],
        );

        let out = normalize(layer, MIN_DETECTION_AREA_M2)?;
        assert_eq!(out.crs, Some(utm));
        assert_eq!(out.len(), 2);

        assert_eq!(out.detections[0].class_id, 1);
        assert_eq!(out.detections[0].confidence, 0.7);
        assert!((out.detections[0].area_m2.unwrap() - 4.0).abs() < 1e-6);
        assert_eq!(out.detections[1].class_id, 3);
        assert_eq!(out.detections[1].confidence, 0.6);
        assert!((out.detections[1].area_m2.unwrap() - 1.5).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn geographic_input_is_measured_in_metres() -> Result<()> {
        // ~0.0001° square near the equator: about 11.1 m x 11.1 m.
        let layer = DetectionLayer::new(
            Some(Crs::WGS84),
            vec![det(-45.0, 0.0, 0.0001, 0.0001, 0, 0.9)],
        );
        let out = normalize(layer, MIN_DETECTION_AREA_M2)?;
        assert_eq!(out.crs.map(|c| c.epsg()), Some(32623));
        let area = out.detections[0].area_m2.unwrap();
        assert!((120.0..126.0).contains(&area), "area={area}");
        Ok(())
    }

    #[test]
    fn empty_input_short_circuits_even_without_crs() -> Result<()> {
        let out = normalize(DetectionLayer::default(), MIN_DETECTION_AREA_M2)?;
        assert!(out.is_empty());
        assert!(out.crs.is_none());
        Ok(())
    }

    #[test]
    fn missing_crs_on_non_empty_input_is_fatal() {
        let layer = DetectionLayer::new(None, vec![det(0.0, 0.0, 10.0, 10.0, 0, 0.9)]);
        assert!(normalize(layer, MIN_DETECTION_AREA_M2).is_err());
    }
}
