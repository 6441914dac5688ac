use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::ColorType;

use super::normalize::{select_bands, u16_to_u8};
use super::{PixelArray, RasterSource};
use crate::crs::Crs;
use crate::projector::AffineTransform;

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;

const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

/// GeoTIFF file source.
///
/// Header, georeferencing tags and CRS are read on `open`; pixel data is
/// decoded by `read_bands`. Chunky 8- and 16-bit RGB and RGBA images are
/// accepted; alpha is ignored.
pub struct GeoTiffSource {
    path: PathBuf,
    decoder: Decoder<BufReader<File>>,
    width: u32,
    height: u32,
    channels: usize,
    transform: AffineTransform,
    crs: Option<Crs>,
}

impl GeoTiffSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open raster {}", path.display()))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .with_context(|| format!("failed to read GeoTIFF header {}", path.display()))?;

        let (width, height) = decoder.dimensions()?;
        let (channels, bit_depth) = match decoder.colortype()? {
            ColorType::RGB(bits) => (3, bits),
            ColorType::RGBA(bits) => (4, bits),
            other => {
                return Err(anyhow!(
                    "unsupported raster layout {:?} in {}: expected RGB or RGBA",
                    other,
                    path.display()
                ))
            }
        };
        if !matches!(bit_depth, 8 | 16) {
            return Err(anyhow!(
                "unsupported bit depth {} in {}: expected 8 or 16",
                bit_depth,
                path.display()
            ));
        }

        let geo_keys = read_u16_tag(&mut decoder, TAG_GEO_KEY_DIRECTORY)?
            .map(|dir| GeoKeys::parse(&dir))
            .unwrap_or_default();
        let transform = transform_from_tags(
            read_f64_tag(&mut decoder, TAG_MODEL_PIXEL_SCALE)?,
            read_f64_tag(&mut decoder, TAG_MODEL_TIEPOINT)?,
            read_f64_tag(&mut decoder, TAG_MODEL_TRANSFORMATION)?,
            geo_keys.pixel_is_point(),
        )
        .with_context(|| format!("invalid georeferencing in {}", path.display()))?;
        let crs = geo_keys
            .epsg()
            .map(Crs::from_epsg)
            .transpose()
            .with_context(|| format!("raster CRS of {}", path.display()))?;

        match crs {
            Some(crs) => log::info!(
                "raster {}: {}x{}, {} bands, {} bit, {}",
                path.display(),
                width,
                height,
                channels,
                bit_depth,
                crs
            ),
            None => log::warn!(
                "raster {}: {}x{} has no CRS; coordinates stay in raster space",
                path.display(),
                width,
                height
            ),
        }

        Ok(Self {
            path: path.to_path_buf(),
            decoder,
            width,
            height,
            channels,
            transform,
            crs,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl RasterSource for GeoTiffSource {
    fn read_bands(&mut self, bands: [usize; 3]) -> Result<PixelArray> {
        let image = self
            .decoder
            .read_image()
            .with_context(|| format!("failed to decode raster {}", self.path.display()))?;
        match image {
            DecodingResult::U8(samples) => {
                select_bands(&samples, self.width, self.height, self.channels, bands, |v| v)
            }
            DecodingResult::U16(samples) => select_bands(
                &samples,
                self.width,
                self.height,
                self.channels,
                bands,
                u16_to_u8,
            ),
            _ => Err(anyhow!(
                "unsupported sample format in {}: expected unsigned 8- or 16-bit",
                self.path.display()
            )),
        }
    }

    fn transform(&self) -> AffineTransform {
        self.transform
    }

    fn crs(&self) -> Option<Crs> {
        self.crs
    }
}

fn read_f64_tag(decoder: &mut Decoder<BufReader<File>>, code: u16) -> Result<Option<Vec<f64>>> {
    decoder
        .find_tag(Tag::from_u16_exhaustive(code))?
        .map(|value| value.into_f64_vec())
        .transpose()
        .with_context(|| format!("malformed TIFF tag {code}"))
}

fn read_u16_tag(decoder: &mut Decoder<BufReader<File>>, code: u16) -> Result<Option<Vec<u16>>> {
    decoder
        .find_tag(Tag::from_u16_exhaustive(code))?
        .map(|value| value.into_u16_vec())
        .transpose()
        .with_context(|| format!("malformed TIFF tag {code}"))
}

/// The GeoKeyDirectory entries this reader cares about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct GeoKeys {
    raster_type: Option<u16>,
    geographic_type: Option<u16>,
    projected_type: Option<u16>,
}

impl GeoKeys {
    /// Parse `[version, revision, minor, count, (id, location, count, value)*]`.
    /// Keys whose value lives in another tag (location != 0) are skipped.
    fn parse(dir: &[u16]) -> Self {
        let mut keys = Self::default();
        let Some(&count) = dir.get(3) else {
            return keys;
        };
        for entry in dir[4..].chunks_exact(4).take(count as usize) {
            let (id, location, value) = (entry[0], entry[1], entry[3]);
            if location != 0 {
                continue;
            }
            match id {
                KEY_RASTER_TYPE => keys.raster_type = Some(value),
                KEY_GEOGRAPHIC_TYPE => keys.geographic_type = Some(value),
                KEY_PROJECTED_CS_TYPE => keys.projected_type = Some(value),
                _ => {}
            }
        }
        keys
    }

    /// Projected CRS wins over geographic; user-defined codes are ignored.
    fn epsg(&self) -> Option<u32> {
        let known = |code: &u16| *code != 0 && *code != USER_DEFINED;
        self.projected_type
            .filter(known)
            .or(self.geographic_type.filter(known))
            .map(u32::from)
    }

    fn pixel_is_point(&self) -> bool {
        self.raster_type == Some(RASTER_PIXEL_IS_POINT)
    }
}

/// Affine transform from ModelTransformation, or ModelPixelScale + ModelTiepoint.
///
/// No georeferencing at all yields the identity (raster space).
fn transform_from_tags(
    scale: Option<Vec<f64>>,
    tiepoint: Option<Vec<f64>>,
    matrix: Option<Vec<f64>>,
    pixel_is_point: bool,
) -> Result<AffineTransform> {
    let transform = match (matrix, scale, tiepoint) {
        (Some(m), _, _) => {
            if m.len() < 16 {
                return Err(anyhow!(
                    "ModelTransformation has {} values, expected 16",
                    m.len()
                ));
            }
            AffineTransform::new(m[0], m[1], m[3], m[4], m[5], m[7])
        }
        (None, Some(s), Some(t)) => {
            if s.len() < 2 || t.len() < 6 {
                return Err(anyhow!(
                    "ModelPixelScale/ModelTiepoint too short ({} / {} values)",
                    s.len(),
                    t.len()
                ));
            }
            let (sx, sy) = (s[0], s[1]);
            AffineTransform::new(sx, 0.0, t[3] - t[0] * sx, 0.0, -sy, t[4] + t[1] * sy)
        }
        (None, None, Some(_)) => {
            return Err(anyhow!(
                "tiepoint-only georeferencing has no affine transform"
            ))
        }
        (None, _, None) => return Ok(AffineTransform::IDENTITY),
    };
    Ok(if pixel_is_point {
        transform.offset_by_pixels(-0.5, -0.5)
    } else {
        transform
    })
}
