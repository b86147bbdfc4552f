//! Spatial predicates used to derive and maintain the connector's bipartite graph edges
//! (`contains`/`intersects` between a raster's footprint polygon and a vector's geometry).

use geo_types::Geometry;

use crate::{Error, Result};

#[cfg(feature = "geos")]
fn to_geos(geom: &Geometry<f64>) -> Result<geos::Geometry> {
    geos::Geometry::try_from(geom.clone()).map_err(|err| Error::GeosError(err.to_string()))
}

/// True if `container` fully contains `contained` (used for raster-contains-vector and
/// vector-contains-raster-footprint edge derivation).
#[cfg(feature = "geos")]
pub fn contains(container: &Geometry<f64>, contained: &Geometry<f64>) -> Result<bool> {
    let a = to_geos(container)?;
    let b = to_geos(contained)?;
    a.contains(&b).map_err(|err| Error::GeosError(err.to_string()))
}

/// True if `a` and `b` share any interior or boundary point.
#[cfg(feature = "geos")]
pub fn intersects(a: &Geometry<f64>, b: &Geometry<f64>) -> Result<bool> {
    let ga = to_geos(a)?;
    let gb = to_geos(b)?;
    ga.intersects(&gb).map_err(|err| Error::GeosError(err.to_string()))
}

/// True if the geometry is non-null and topologically valid. Used to reject malformed
/// geometries before they are admitted into the connector (see invariant on null/invalid
/// geometry rejection).
#[cfg(feature = "geos")]
pub fn is_valid(geom: &Geometry<f64>) -> Result<bool> {
    let g = to_geos(geom)?;
    g.is_valid().map_err(|err| Error::GeosError(err.to_string()))
}

/// Geometric intersection of `a` and `b`, used to clip a vector's footprint to a
/// raster's bounds before computing its pixel-space envelope.
#[cfg(feature = "geos")]
pub fn intersection(a: &Geometry<f64>, b: &Geometry<f64>) -> Result<Geometry<f64>> {
    let ga = to_geos(a)?;
    let gb = to_geos(b)?;
    let result = ga.intersection(&gb).map_err(|err| Error::GeosError(err.to_string()))?;
    Geometry::<f64>::try_from(result).map_err(|err| Error::GeosError(err.to_string()))
}

/// World-space `(min_x, min_y, max_x, max_y)` of every coordinate in `geom`, or `None`
/// for an empty/unsupported geometry.
pub fn bounding_box(geom: &Geometry<f64>) -> Option<(f64, f64, f64, f64)> {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    let mut any = false;
    let mut visit = |x: f64, y: f64| {
        any = true;
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    };

    match geom {
        Geometry::Point(p) => visit(p.x(), p.y()),
        Geometry::LineString(ls) => ls.coords().for_each(|c| visit(c.x, c.y)),
        Geometry::Polygon(poly) => {
            poly.exterior().coords().for_each(|c| visit(c.x, c.y));
            for interior in poly.interiors() {
                interior.coords().for_each(|c| visit(c.x, c.y));
            }
        }
        Geometry::MultiPolygon(mp) => {
            for poly in &mp.0 {
                poly.exterior().coords().for_each(|c| visit(c.x, c.y));
            }
        }
        _ => {}
    }

    any.then_some((min_x, min_y, max_x, max_y))
}

pub fn is_null(geom: &Geometry<f64>) -> bool {
    match geom {
        Geometry::Polygon(p) => p.exterior().0.is_empty(),
        Geometry::MultiPolygon(mp) => mp.0.is_empty(),
        Geometry::Point(_) => false,
        Geometry::LineString(ls) => ls.0.is_empty(),
        _ => false,
    }
}

#[cfg(all(test, feature = "geos"))]
mod tests {
    use super::*;
    use geo_types::{LineString, Polygon};

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
        Geometry::Polygon(Polygon::new(
            LineString::from(vec![(x0, y0), (x0, y1), (x1, y1), (x1, y0), (x0, y0)]),
            vec![],
        ))
    }

    #[test]
    fn outer_square_contains_inner_square() {
        let outer = square(0.0, 0.0, 10.0, 10.0);
        let inner = square(2.0, 2.0, 4.0, 4.0);
        assert!(contains(&outer, &inner).unwrap());
        assert!(!contains(&inner, &outer).unwrap());
    }

    #[test]
    fn overlapping_squares_intersect_but_neither_contains() {
        let a = square(0.0, 0.0, 5.0, 5.0);
        let b = square(3.0, 3.0, 8.0, 8.0);
        assert!(intersects(&a, &b).unwrap());
        assert!(!contains(&a, &b).unwrap());
    }

    #[test]
    fn disjoint_squares_do_not_intersect() {
        let a = square(0.0, 0.0, 1.0, 1.0);
        let b = square(10.0, 10.0, 11.0, 11.0);
        assert!(!intersects(&a, &b).unwrap());
    }

    #[test]
    fn empty_polygon_is_null() {
        let empty = Geometry::Polygon(Polygon::new(LineString::new(vec![]), vec![]));
        assert!(is_null(&empty));
    }

    #[test]
    fn intersection_of_overlapping_squares_is_the_overlap_region() {
        let a = square(0.0, 0.0, 5.0, 5.0);
        let b = square(3.0, 3.0, 8.0, 8.0);
        let result = intersection(&a, &b).unwrap();
        let (min_x, min_y, max_x, max_y) = bounding_box(&result).unwrap();
        assert_eq!((min_x, min_y, max_x, max_y), (3.0, 3.0, 5.0, 5.0));
    }

    #[test]
    fn bounding_box_of_polygon_matches_its_corners() {
        let poly = square(1.0, 2.0, 9.0, 10.0);
        assert_eq!(bounding_box(&poly), Some((1.0, 2.0, 9.0, 10.0)));
    }
}
