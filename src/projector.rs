//! Pixel boxes to world-space rectangles.

use geo::{coord, Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::detect::PixelBox;

/// Six-parameter affine map from pixel `(col, row)` to world `(x, y)`.
///
/// Coefficients follow the GDAL/rasterio `Affine(a, b, c, d, e, f)` order:
/// `x = a*col + b*row + c` and `y = d*col + e*row + f`. North-up rasters have
/// `b = d = 0` and a negative `e`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl AffineTransform {
    /// Pixel space: world coordinates equal pixel coordinates.
    pub const IDENTITY: AffineTransform = AffineTransform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 0.0,
        e: 1.0,
        f: 0.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// North-up transform with the top-left corner at `(west, north)`.
    pub fn from_origin(west: f64, north: f64, x_size: f64, y_size: f64) -> Self {
        Self::new(x_size, 0.0, west, 0.0, -y_size, north)
    }

    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// Same mapping with the pixel origin moved by `(dx, dy)` pixels.
    pub fn offset_by_pixels(&self, dx: f64, dy: f64) -> Self {
        let (c, f) = self.apply(dx, dy);
        Self { c, f, ..*self }
    }
}

/// Map one pixel box to an axis-aligned rectangle in the transform's space.
///
/// Both corners go through the transform unchanged; the rectangle is then
/// rebuilt from per-axis min/max, so row-flipping (north-up) and unflipped
/// transforms give the same well-formed polygon.
pub fn project_box(bbox: &PixelBox, transform: &AffineTransform) -> Polygon<f64> {
    let (lon_min, lat_max) = transform.apply(bbox.x1, bbox.y1);
    let (lon_max, lat_min) = transform.apply(bbox.x2, bbox.y2);
    Rect::new(
        coord! { x: lon_min, y: lat_min },
        coord! { x: lon_max, y: lat_max },
    )
    .to_polygon()
}

/// Project every box, preserving order. Nothing is dropped here.
pub fn project_boxes<'a>(
    boxes: impl IntoIterator<Item = &'a PixelBox>,
    transform: &AffineTransform,
) -> Vec<Polygon<f64>> {
    boxes
        .into_iter()
        .map(|bbox| project_box(bbox, transform))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, BoundingRect};

    fn extent(poly: &Polygon<f64>) -> (f64, f64, f64, f64) {
        let r = poly.bounding_rect().unwrap();
        (r.min().x, r.min().y, r.max().x, r.max().y)
    }

    #[test]
    fn identity_transform_keeps_pixel_extent() {
        let bbox = PixelBox::new(0.0, 0.0, 10.0, 10.0).unwrap();
        let poly = project_box(&bbox, &AffineTransform::IDENTITY);
        assert_eq!(extent(&poly), (0.0, 0.0, 10.0, 10.0));
        assert_eq!(poly.exterior().0.len(), 5);
    }

    #[test]
    fn north_up_transform_flips_rows() {
        let t = AffineTransform::from_origin(500_000.0, 8_250_000.0, 0.05, 0.05);
        let bbox = PixelBox::new(0.0, 0.0, 10.0, 20.0).unwrap();
        let (min_x, min_y, max_x, max_y) = extent(&project_box(&bbox, &t));
        assert_eq!(min_x, 500_000.0);
        assert!((max_x - 500_000.5).abs() < 1e-6);
        assert_eq!(max_y, 8_250_000.0);
        assert!((min_y - 8_249_999.0).abs() < 1e-6);
    }

    #[test]
    fn projected_rectangle_area_matches_scaled_box() {
        let t = AffineTransform::from_origin(0.0, 0.0, 0.5, 0.25);
        let bbox = PixelBox::new(4.0, 4.0, 8.0, 12.0).unwrap();
        let poly = project_box(&bbox, &t);
        assert!((poly.unsigned_area() - 2.0 * 2.0).abs() < 1e-12);
    }

    #[test]
    fn project_boxes_preserves_order_and_count() {
        let boxes = vec![
            PixelBox::new(0.0, 0.0, 0.1, 0.1).unwrap(),
            PixelBox::new(5.0, 5.0, 6.0, 6.0).unwrap(),
        ];
        let polys = project_boxes(&boxes, &AffineTransform::IDENTITY);
        assert_eq!(polys.len(), 2);
        assert_eq!(extent(&polys[1]).0, 5.0);
    }

    #[test]
    fn offset_moves_origin_only() {
        let t = AffineTransform::from_origin(10.0, 20.0, 2.0, 2.0).offset_by_pixels(1.0, 1.0);
        assert_eq!(t.apply(0.0, 0.0), (12.0, 18.0));
        assert_eq!(t.a, 2.0);
        assert_eq!(t.e, -2.0);
    }
}
