use crate::{Columns, GeoTransform, Point, RasterSize, Rows};

/// The size of a single raster cell in world units (projection dependent).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CellSize {
    x: f64,
    y: f64,
}

impl CellSize {
    pub const fn new(x: f64, y: f64) -> Self {
        CellSize { x, y }
    }

    pub const fn square(size: f64) -> Self {
        CellSize { x: size, y: size }
    }

    pub const fn x(&self) -> f64 {
        self.x
    }

    pub const fn y(&self) -> f64 {
        self.y
    }
}

/// Everything needed to place a raster's pixels in world space: the projection it is
/// stored in, its pixel dimensions, the affine transform mapping pixel to world
/// coordinates, and the nodata sentinel value (if any).
#[derive(Clone, PartialEq)]
pub struct GeoReference {
    projection: String,
    raster_size: RasterSize,
    geo_transform: GeoTransform,
    nodata: Option<f64>,
}

impl GeoReference {
    pub fn new(projection: String, raster_size: RasterSize, geo_transform_coefficients: [f64; 6], nodata: Option<f64>) -> Self {
        GeoReference {
            projection,
            raster_size,
            geo_transform: GeoTransform::new(geo_transform_coefficients),
            nodata,
        }
    }

    pub fn with_transform(projection: String, raster_size: RasterSize, geo_transform: GeoTransform, nodata: Option<f64>) -> Self {
        GeoReference {
            projection,
            raster_size,
            geo_transform,
            nodata,
        }
    }

    pub fn projection(&self) -> &str {
        &self.projection
    }

    pub fn set_projection(&mut self, projection: String) {
        self.projection = projection;
    }

    pub fn raster_size(&self) -> RasterSize {
        self.raster_size
    }

    pub fn set_raster_size(&mut self, size: RasterSize) {
        self.raster_size = size;
    }

    pub fn rows(&self) -> Rows {
        self.raster_size.rows
    }

    pub fn columns(&self) -> Columns {
        self.raster_size.cols
    }

    pub fn geo_transform(&self) -> GeoTransform {
        self.geo_transform
    }

    pub fn cell_size(&self) -> CellSize {
        CellSize::new(self.geo_transform.cell_size_x(), self.geo_transform.cell_size_y())
    }

    pub fn top_left(&self) -> Point {
        self.geo_transform.top_left()
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<f64>) {
        self.nodata = nodata;
    }

    pub fn nodata_as<T: num::NumCast>(&self) -> crate::Result<Option<T>> {
        match self.nodata {
            Some(v) => Ok(Some(num::NumCast::from(v).ok_or_else(|| {
                crate::Error::InvalidArgument(format!("Nodata value {v} does not fit in requested type"))
            })?)),
            None => Ok(None),
        }
    }

    /// World-space bounding rectangle of this raster's footprint (top-left to bottom-right,
    /// accounting for the sign of the cell size on either axis).
    pub fn bounding_rect(&self) -> crate::Rect<f64> {
        let bottom_right = self
            .geo_transform
            .apply(self.raster_size.cols.count() as f64, self.raster_size.rows.count() as f64);
        crate::Rect::from_points(self.top_left(), bottom_right)
    }
}

impl std::fmt::Debug for GeoReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GeoReference(size: {}, projection: {}, nodata: {:?})",
            self.raster_size, self.projection, self.nodata
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_rect_matches_raster_size() {
        let georef = GeoReference::new(
            "EPSG:4326".to_string(),
            RasterSize::with_rows_cols(Rows(2), Columns(3)),
            [0.0, 1.0, 0.0, 10.0, 0.0, -1.0],
            Some(-9999.0),
        );

        let rect = georef.bounding_rect();
        assert_eq!(rect.top_left(), Point::new(0.0, 10.0));
        assert_eq!(rect.bottom_right(), Point::new(3.0, 8.0));
    }
}
