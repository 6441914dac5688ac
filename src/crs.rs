//! Coordinate reference systems and reprojection.
//!
//! CRSs are identified by EPSG code. PROJ strings come from the EPSG
//! registry bundled by `crs-definitions`, so any code it carries (geographic,
//! UTM, national grids, polyconic) can be read and published.

use std::fmt;

use anyhow::{anyhow, Result};
use geo::{BoundingRect, Coord, MapCoords, Polygon, Rect};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use serde::{Deserialize, Serialize};

pub const EPSG_WGS84: u32 = 4326;

const UTM_ZONE_COUNT: u32 = 60;

/// An EPSG-coded CRS with a known PROJ definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Crs {
    epsg: u32,
}

impl Crs {
    pub const WGS84: Crs = Crs { epsg: EPSG_WGS84 };

    /// Look `epsg` up in the registry and check the projection can be built.
    pub fn from_epsg(epsg: u32) -> Result<Self> {
        let crs = Self { epsg };
        crs.proj()?;
        Ok(crs)
    }

    /// WGS 84 / UTM zone `zone` (1..=60), northern or southern hemisphere.
    pub fn utm(zone: u32, north: bool) -> Result<Self> {
        if !(1..=UTM_ZONE_COUNT).contains(&zone) {
            return Err(anyhow!("UTM zone {zone} out of range 1..=60"));
        }
        let base = if north { 32600 } else { 32700 };
        Self::from_epsg(base + zone)
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// True when coordinates are longitude/latitude degrees.
    pub fn is_geographic(&self) -> bool {
        proj_string(self.epsg).is_some_and(|definition| {
            definition
                .split_whitespace()
                .filter_map(|param| param.strip_prefix("+proj="))
                .any(|name| matches!(name, "longlat" | "latlong" | "lonlat" | "latlon"))
        })
    }

    /// OGC URN, as used by the legacy GeoJSON `crs` member.
    pub fn urn(&self) -> String {
        format!("urn:ogc:def:crs:EPSG::{}", self.epsg)
    }

    fn proj(&self) -> Result<Proj> {
        let definition = proj_string(self.epsg)
            .ok_or_else(|| anyhow!("EPSG:{} not in the EPSG registry", self.epsg))?;
        Proj::from_proj_string(definition)
            .map_err(|e| anyhow!("EPSG:{} not supported ({definition}): {e:?}", self.epsg))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

impl TryFrom<u32> for Crs {
    type Error = anyhow::Error;

    fn try_from(epsg: u32) -> Result<Self> {
        Self::from_epsg(epsg)
    }
}

impl From<Crs> for u32 {
    fn from(crs: Crs) -> Self {
        crs.epsg
    }
}

fn proj_string(epsg: u32) -> Option<&'static str> {
    let code = u16::try_from(epsg).ok()?;
    crs_definitions::from_code(code).map(|def| def.proj4)
}

/// Point and polygon reprojection between two CRSs.
pub struct CoordTransformer {
    source: Crs,
    target: Crs,
    /// `None` when source and target are the same CRS.
    projs: Option<(Proj, Proj)>,
}

impl fmt::Debug for CoordTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordTransformer")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl CoordTransformer {
    pub fn new(source: Crs, target: Crs) -> Result<Self> {
        let projs = if source == target {
            None
        } else {
            Some((source.proj()?, target.proj()?))
        };
        Ok(Self {
            source,
            target,
            projs,
        })
    }

    /// Transform one coordinate pair. Geographic CRSs are in degrees.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let Some((source_proj, target_proj)) = &self.projs else {
            return Ok((x, y));
        };

        let mut point = if self.source.is_geographic() {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        transform(source_proj, target_proj, &mut point).map_err(|e| {
            anyhow!(
                "transform {} -> {} failed at ({x}, {y}): {e:?}",
                self.source,
                self.target
            )
        })?;

        if self.target.is_geographic() {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }

    pub fn transform_polygon(&self, polygon: &Polygon<f64>) -> Result<Polygon<f64>> {
        polygon.try_map_coords(|c| -> Result<Coord<f64>> {
            let (x, y) = self.transform(c.x, c.y)?;
            Ok(Coord { x, y })
        })
    }
}

/// Pick the WGS 84 UTM zone containing the centre of `polygons`.
///
/// The total bounds are taken to WGS 84 corner by corner and the centre of
/// the resulting extent decides zone and hemisphere (equator counts as north).
pub fn estimate_utm_crs(polygons: &[Polygon<f64>], source: Crs) -> Result<Crs> {
    let bounds = polygons
        .iter()
        .filter_map(|p| p.bounding_rect())
        .reduce(|acc, r| {
            Rect::new(
                Coord {
                    x: acc.min().x.min(r.min().x),
                    y: acc.min().y.min(r.min().y),
                },
                Coord {
                    x: acc.max().x.max(r.max().x),
                    y: acc.max().y.max(r.max().y),
                },
            )
        })
        .ok_or_else(|| anyhow!("cannot estimate a UTM zone for an empty geometry set"))?;

    let to_lonlat = CoordTransformer::new(source, Crs::WGS84)?;
    let corners = [
        (bounds.min().x, bounds.min().y),
        (bounds.min().x, bounds.max().y),
        (bounds.max().x, bounds.min().y),
        (bounds.max().x, bounds.max().y),
    ];
    let mut lon = (f64::INFINITY, f64::NEG_INFINITY);
    let mut lat = (f64::INFINITY, f64::NEG_INFINITY);
    for (x, y) in corners {
        let (lo, la) = to_lonlat.transform(x, y)?;
        lon = (lon.0.min(lo), lon.1.max(lo));
        lat = (lat.0.min(la), lat.1.max(la));
    }
    let center_lon = (lon.0 + lon.1) / 2.0;
    let center_lat = (lat.0 + lat.1) / 2.0;
    if !center_lon.is_finite() || !center_lat.is_finite() {
        return Err(anyhow!(
            "cannot estimate a UTM zone: bounds do not map to valid WGS 84 coordinates"
        ));
    }

    Crs::utm(utm_zone(center_lon), center_lat >= 0.0)
}

/// Standard 6° UTM zone for a longitude, clamped to 1..=60.
pub fn utm_zone(lon: f64) -> u32 {
    let zone = ((lon + 180.0) / 6.0).floor() as i64 + 1;
    zone.clamp(1, UTM_ZONE_COUNT as i64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    #[test]
    fn registry_codes_resolve() {
        for code in [
            4326, 4674, 4269, 3857, 32601, 32660, 32723, 31983, 29193, 2154, 32198,
        ] {
            assert!(Crs::from_epsg(code).is_ok(), "EPSG:{code}");
        }
        assert!(Crs::from_epsg(1).is_err());
        assert!(Crs::from_epsg(70_000).is_err());
        // Brazil Polyconic is registered but has no proj4rs implementation.
        let err = Crs::from_epsg(5880).unwrap_err().to_string();
        assert!(err.contains("EPSG:5880 not supported"), "{err}");
    }

    #[test]
    fn geographic_flag_follows_projection() -> Result<()> {
        for code in [4326, 4674, 4269] {
            assert!(Crs::from_epsg(code)?.is_geographic(), "EPSG:{code}");
        }
        for code in [3857, 32723, 29193, 2154] {
            assert!(!Crs::from_epsg(code)?.is_geographic(), "EPSG:{code}");
        }
        Ok(())
    }

    #[test]
    fn sad69_utm_lands_near_wgs84_utm() -> Result<()> {
        // SAD69 and WGS 84 differ by tens of metres in Brazil.
        let sad69 = CoordTransformer::new(Crs::from_epsg(29193)?, Crs::WGS84)?;
        let wgs84 = CoordTransformer::new(Crs::from_epsg(32723)?, Crs::WGS84)?;
        let (lon_a, lat_a) = sad69.transform(500_000.0, 8_250_000.0)?;
        let (lon_b, lat_b) = wgs84.transform(500_000.0, 8_250_000.0)?;
        assert!((lon_a - lon_b).abs() < 0.01, "{lon_a} vs {lon_b}");
        assert!((lat_a - lat_b).abs() < 0.01, "{lat_a} vs {lat_b}");
        assert!((lon_b + 45.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn lambert93_extent_gets_a_utm_zone() -> Result<()> {
        // Around Paris in RGF93 / Lambert-93.
        let poly = Rect::new(
            coord! { x: 652_000.0, y: 6_862_000.0 },
            coord! { x: 652_100.0, y: 6_862_100.0 },
        )
        .to_polygon();
        let crs = estimate_utm_crs(&[poly], Crs::from_epsg(2154)?)?;
        assert_eq!(crs.epsg(), 32631);
        Ok(())
    }

    #[test]
    fn estimating_from_nothing_fails() {
        assert!(estimate_utm_crs(&[], Crs::WGS84).is_err());
    }

    #[test]
    fn crs_serializes_as_epsg_code() -> Result<()> {
        let crs: Crs = serde_json::from_str("31983")?;
        assert_eq!(crs.to_string(), "EPSG:31983");
        assert_eq!(serde_json::to_string(&crs)?, "31983");
        assert!(serde_json::from_str::<Crs>("1").is_err());
        Ok(())
    }
}
