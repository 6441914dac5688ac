//! Raster sources.
//!
//! A source exposes three things: band data, the pixel-to-world affine
//! transform and the CRS. `RasterSource::load` reads all three and drops the
//! source, so any file handle is released before detection starts.

mod geotiff;
mod normalize;

use anyhow::{anyhow, Result};

use crate::crs::Crs;
use crate::projector::AffineTransform;

pub use geotiff::GeoTiffSource;

/// Bands read by default: red, green, blue (1-based, GDAL style).
pub const RGB_BANDS: [usize; 3] = [1, 2, 3];

/// Height x width x 3 pixel array, row-major, 8 bits per sample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelArray {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelArray {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("pixel array dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "pixel array length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Uniform image, every pixel set to `rgb`.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let count = width as usize * height as usize;
        let data = rgb.iter().copied().cycle().take(count * 3).collect();
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Pixels in row-major order as `[r, g, b]` triples.
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data.chunks_exact(3).map(|p| [p[0], p[1], p[2]])
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) -> Result<()> {
        if x >= self.width || y >= self.height {
            return Err(anyhow!(
                "pixel ({x}, {y}) outside {}x{}",
                self.width,
                self.height
            ));
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        self.data[i..i + 3].copy_from_slice(&rgb);
        Ok(())
    }
}

/// Everything a run needs from the raster, detached from the file.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterData {
    pub pixels: PixelArray,
    pub transform: AffineTransform,
    /// `None` when the raster is not georeferenced to a known CRS.
    pub crs: Option<Crs>,
}

/// Raster source collaborator.
pub trait RasterSource {
    /// Read three bands (1-based indices) into an HWC pixel array.
    fn read_bands(&mut self, bands: [usize; 3]) -> Result<PixelArray>;

    fn transform(&self) -> AffineTransform;

    fn crs(&self) -> Option<Crs>;

    /// Read RGB, transform and CRS, then release the source.
    fn load(mut self) -> Result<RasterData>
    where
        Self: Sized,
    {
        let pixels = self.read_bands(RGB_BANDS)?;
        Ok(RasterData {
            pixels,
            transform: self.transform(),
            crs: self.crs(),
        })
    }
}

/// Source backed by an in-memory three-band image.
#[derive(Clone, Debug)]
pub struct InMemoryRaster {
    pixels: PixelArray,
    transform: AffineTransform,
    crs: Option<Crs>,
}

impl InMemoryRaster {
    pub fn new(pixels: PixelArray, transform: AffineTransform, crs: Option<Crs>) -> Self {
        Self {
            pixels,
            transform,
            crs,
        }
    }
}

impl RasterSource for InMemoryRaster {
    fn read_bands(&mut self, bands: [usize; 3]) -> Result<PixelArray> {
        normalize::select_bands(
            self.pixels.as_slice(),
            self.pixels.width(),
            self.pixels.height(),
            3,
            bands,
            |v| v,
        )
    }

    fn transform(&self) -> AffineTransform {
        self.transform
    }

    fn crs(&self) -> Option<Crs> {
        self.crs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_array_validates_length() {
        assert!(PixelArray::new(2, 2, vec![0; 12]).is_ok());
        assert!(PixelArray::new(2, 2, vec![0; 11]).is_err());
    }

    #[test]
    fn filled_and_set_pixel() -> Result<()> {
        let mut img = PixelArray::filled(3, 2, [1, 2, 3]);
        assert_eq!(img.pixels().count(), 6);
        assert!(img.pixels().all(|p| p == [1, 2, 3]));
        img.set_pixel(2, 1, [9, 8, 7])?;
        assert_eq!(img.pixel(2, 1), Some([9, 8, 7]));
        assert_eq!(img.pixel(3, 0), None);
        assert!(img.set_pixel(0, 2, [0, 0, 0]).is_err());
        Ok(())
    }

    #[test]
    fn in_memory_source_reorders_bands() -> Result<()> {
        let pixels = PixelArray::new(1, 1, vec![10, 20, 30])?;
        let mut source = InMemoryRaster::new(pixels, AffineTransform::IDENTITY, None);
        let bgr = source.read_bands([3, 2, 1])?;
        assert_eq!(bgr.as_slice(), &[30, 20, 10]);

        let data = source.load()?;
        assert_eq!(data.pixels.as_slice(), &[10, 20, 30]);
        assert_eq!(data.transform, AffineTransform::IDENTITY);
        assert!(data.crs.is_none());
        Ok(())
    }
}
