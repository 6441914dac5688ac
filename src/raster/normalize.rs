use anyhow::{anyhow, Result};

use super::PixelArray;

/// Pick three 1-based bands out of a chunky `channels`-sample image.
pub(crate) fn select_bands<T: Copy>(
    samples: &[T],
    width: u32,
    height: u32,
    channels: usize,
    bands: [usize; 3],
    to_u8: impl Fn(T) -> u8,
) -> Result<PixelArray> {
    if let Some(bad) = bands.iter().find(|&&b| b == 0 || b > channels) {
        return Err(anyhow!(
            "band {} out of range: raster has {} bands",
            bad,
            channels
        ));
    }
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(channels))
        .ok_or_else(|| anyhow!("raster dimensions overflow"))?;
    if samples.len() != expected {
        return Err(anyhow!(
            "raster length mismatch: expected {}, got {}",
            expected,
            samples.len()
        ));
    }

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for pixel in samples.chunks_exact(channels) {
        for band in bands {
            rgb.push(to_u8(pixel[band - 1]));
        }
    }
    PixelArray::new(width, height, rgb)
}

/// 16-bit sample to 8 bits. Non-zero stays non-zero so nodata is preserved.
pub(crate) fn u16_to_u8(value: u16) -> u8 {
    if value == 0 {
        return 0;
    }
    ((value as u32 + 128) / 257).clamp(1, 255) as u8
}
