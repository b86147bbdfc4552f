//! Coordinate reference system identifiers and GDAL-backed reprojection.

pub mod epsg;

use crate::{Error, Result};

/// An EPSG coordinate system code, e.g. `4326` for WGS84.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Epsg(i32);

impl Epsg {
    pub const fn new(code: i32) -> Self {
        Epsg(code)
    }

    pub const fn code(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for Epsg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl From<i32> for Epsg {
    fn from(code: i32) -> Self {
        Epsg(code)
    }
}

#[cfg(feature = "gdal")]
pub struct SpatialReference {
    srs: gdal::spatial_ref::SpatialRef,
}

#[cfg(feature = "gdal")]
impl SpatialReference {
    pub fn from_epsg(epsg: Epsg) -> Result<Self> {
        let mut srs = gdal::spatial_ref::SpatialRef::from_epsg(epsg.code() as u32)?;
        srs.set_axis_mapping_strategy(gdal::spatial_ref::AxisMappingStrategy::TraditionalGisOrder);
        Ok(SpatialReference { srs })
    }

    pub fn from_definition(def: &str) -> Result<Self> {
        if def.is_empty() {
            return Err(Error::InvalidArgument("Empty projection definition".into()));
        }

        let mut srs = gdal::spatial_ref::SpatialRef::from_definition(def)?;
        srs.set_axis_mapping_strategy(gdal::spatial_ref::AxisMappingStrategy::TraditionalGisOrder);
        Ok(SpatialReference { srs })
    }

    pub fn to_wkt(&self) -> Result<String> {
        Ok(self.srs.to_wkt()?)
    }

    pub fn epsg_cs(&self) -> Option<Epsg> {
        self.srs.auth_code().ok().map(Epsg::new)
    }

    pub fn inner(&self) -> &gdal::spatial_ref::SpatialRef {
        &self.srs
    }
}

/// Single-shot helper: WKT projection string for an EPSG code.
#[cfg(feature = "gdal")]
pub fn projection_from_epsg(epsg: Epsg) -> Result<String> {
    SpatialReference::from_epsg(epsg)?.to_wkt()
}

/// Single-shot helper: EPSG code matching a projection definition (WKT or proj string), if any.
#[cfg(feature = "gdal")]
pub fn projection_to_epsg(projection: &str) -> Option<Epsg> {
    SpatialReference::from_definition(projection).ok()?.epsg_cs()
}

/// Reprojects a `geo_types` geometry from one EPSG code to another.
/// A no-op (clone) when source and destination codes are equal.
#[cfg(feature = "gdal")]
pub fn reproject_geometry(
    geom: &geo_types::Geometry<f64>,
    source: Epsg,
    destination: Epsg,
) -> Result<geo_types::Geometry<f64>> {
    if source == destination {
        return Ok(geom.clone());
    }

    let src = SpatialReference::from_epsg(source)?;
    let dst = SpatialReference::from_epsg(destination)?;
    let transform = gdal::spatial_ref::CoordTransform::new(src.inner(), dst.inner())?;

    reproject_with_transform(geom, &transform)
}

#[cfg(feature = "gdal")]
fn reproject_with_transform(
    geom: &geo_types::Geometry<f64>,
    transform: &gdal::spatial_ref::CoordTransform,
) -> Result<geo_types::Geometry<f64>> {
    use geo_types::{Coord, Geometry, LineString, MultiPolygon, Point, Polygon};

    let transform_coords = |coords: &[Coord<f64>]| -> Result<Vec<Coord<f64>>> {
        let mut xs: Vec<f64> = coords.iter().map(|c| c.x).collect();
        let mut ys: Vec<f64> = coords.iter().map(|c| c.y).collect();
        let mut zs: Vec<f64> = vec![0.0; xs.len()];
        transform.transform_coords(&mut xs, &mut ys, &mut zs)?;
        Ok(xs.into_iter().zip(ys).map(|(x, y)| Coord { x, y }).collect())
    };

    let transform_ring = |ring: &LineString<f64>| -> Result<LineString<f64>> { Ok(LineString::new(transform_coords(ring.0.as_slice())?)) };

    let transform_polygon = |poly: &Polygon<f64>| -> Result<Polygon<f64>> {
        let exterior = transform_ring(poly.exterior())?;
        let interiors = poly.interiors().iter().map(transform_ring).collect::<Result<Vec<_>>>()?;
        Ok(Polygon::new(exterior, interiors))
    };

    match geom {
        Geometry::Point(p) => {
            let coords = transform_coords(&[p.0])?;
            Ok(Geometry::Point(Point(coords[0])))
        }
        Geometry::Polygon(poly) => Ok(Geometry::Polygon(transform_polygon(poly)?)),
        Geometry::MultiPolygon(polys) => {
            let polys = polys.iter().map(transform_polygon).collect::<Result<Vec<_>>>()?;
            Ok(Geometry::MultiPolygon(MultiPolygon::new(polys)))
        }
        other => Err(Error::InvalidArgument(format!(
            "Reprojection is only supported for Point/Polygon/MultiPolygon geometries, got {other:?}"
        ))),
    }
}

#[cfg(all(test, feature = "gdal"))]
mod tests {
    use super::*;

    #[test]
    fn epsg_display() {
        assert_eq!(Epsg::new(4326).to_string(), "EPSG:4326");
    }

    #[test]
    fn same_crs_reprojection_is_noop() {
        let geom = geo_types::Geometry::Point(geo_types::Point::new(1.0, 2.0));
        let result = reproject_geometry(&geom, epsg::WGS84, epsg::WGS84).unwrap();
        assert_eq!(geom, result);
    }
}
