//! Surveyed area from the raw pixel array.

use crate::raster::PixelArray;

pub const SQUARE_METERS_PER_HECTARE: f64 = 10_000.0;

/// Pixels whose three band values sum to more than zero.
///
/// Bands are widened before summing, so `[255, 255, 255]` stays valid.
pub fn valid_pixel_count(pixels: &PixelArray) -> u64 {
    pixels
        .pixels()
        .filter(|[r, g, b]| u16::from(*r) + u16::from(*g) + u16::from(*b) > 0)
        .count() as u64
}

/// Hectares covered by valid pixels at `gsd_m` metres per pixel side.
pub fn total_area_ha(pixels: &PixelArray, gsd_m: f64) -> f64 {
    let valid = valid_pixel_count(pixels);
    let area_ha = valid as f64 * gsd_m * gsd_m / SQUARE_METERS_PER_HECTARE;
    log::info!(
        "coverage: {} of {} pixels valid, {:.4} ha at {} m/px",
        valid,
        u64::from(pixels.width()) * u64::from(pixels.height()),
        area_ha,
        gsd_m
    );
    area_ha
}
