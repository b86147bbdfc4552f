//! Burn-value rasterization of vector geometries into a raster band, grounded in GDAL's
//! `gdal_rasterize` utility (`GDALRasterize`), the same low-level entry point the workspace's
//! vector-translate helpers use for `ogr2ogr`-equivalent operations.

use gdal::vector::LayerAccess;

use crate::{Error, GeoReference, RasterSize, Result, raster::reader::RasterBand};

const BURN_FIELD: &str = "burn_value";

/// One polygon to burn, paired with the value written into every pixel it covers.
pub struct BurnFeature<'a> {
    pub geometry: &'a geo_types::Geometry<f64>,
    pub value: f64,
}

/// Rasterizes `features` into a single band sized to `georeference`, using GDAL's rasterize
/// algorithm with the default merge strategy (`replace`): where multiple input polygons
/// overlap a pixel, the later feature in `features` wins.
pub fn rasterize(features: &[BurnFeature], georeference: &GeoReference, background: f64) -> Result<RasterBand> {
    let mem_vector_ds = build_memory_vector_layer(features, georeference.projection())?;
    let mut target_ds = create_memory_raster(georeference, background)?;

    let mut usage_error: std::ffi::c_int = 0;
    let mut options = gdal::cpl::CslStringList::new();
    options.add_string("-a")?;
    options.add_string(BURN_FIELD)?;
    unsafe {
        let rasterize_options = gdal_sys::GDALRasterizeOptionsNew(options.as_ptr(), std::ptr::null_mut());
        if rasterize_options.is_null() {
            return Err(Error::InvalidArgument("Failed to create rasterize options".to_string()));
        }

        gdal_sys::GDALRasterize(
            std::ptr::null_mut(),
            target_ds.c_dataset(),
            mem_vector_ds.c_dataset(),
            rasterize_options,
            &mut usage_error,
        );
        gdal_sys::GDALRasterizeOptionsFree(rasterize_options);
    }

    if usage_error != 0 {
        return Err(Error::InvalidArgument("Vector rasterize: invalid arguments".to_string()));
    }

    let size = georeference.raster_size();
    let rasterband = target_ds.rasterband(1)?;
    let buffer = rasterband.read_as::<f64>(
        (0, 0),
        (size.cols.count() as usize, size.rows.count() as usize),
        (size.cols.count() as usize, size.rows.count() as usize),
        None,
    )?;

    Ok(RasterBand::new(
        crate::RasterWindow::new(0, 0, size.rows, size.cols),
        buffer.data().to_vec(),
    ))
}

fn build_memory_vector_layer(features: &[BurnFeature], projection: &str) -> Result<gdal::Dataset> {
    let driver = gdal::DriverManager::get_driver_by_name("Memory")?;
    let mut ds = driver.create_vector_only("")?;

    let srs = if projection.is_empty() {
        None
    } else {
        Some(gdal::spatial_ref::SpatialRef::from_definition(projection)?)
    };

    let mut layer = ds.create_layer(gdal::vector::LayerOptions {
        name: "burn",
        srs: srs.as_ref(),
        ty: gdal_sys::OGRwkbGeometryType::wkbMultiPolygon,
        ..Default::default()
    })?;
    layer.create_defn_fields(&[(BURN_FIELD, gdal_sys::OGRFieldType::OFTReal)])?;

    for feature in features {
        let wkt = geo_wkt(feature.geometry);
        let geom = gdal::vector::Geometry::from_wkt(&wkt)?;
        layer.create_feature_fields(geom, &[BURN_FIELD], &[gdal::vector::FieldValue::RealValue(feature.value)])?;
    }

    drop(layer);
    Ok(ds)
}

fn create_memory_raster(georeference: &GeoReference, background: f64) -> Result<gdal::Dataset> {
    let size = georeference.raster_size();
    let driver = gdal::DriverManager::get_driver_by_name("MEM")?;
    let mut ds = driver.create_with_band_type::<f64, _>("", size.cols.count() as usize, size.rows.count() as usize, 1)?;

    ds.set_geo_transform(&georeference.geo_transform().coefficients())?;
    ds.set_projection(georeference.projection())?;

    let mut rasterband = ds.rasterband(1)?;
    rasterband.set_no_data_value(Some(background))?;
    let fill = vec![background; size.cell_count()];
    let buffer = gdal::raster::Buffer::new((size.cols.count() as usize, size.rows.count() as usize), fill);
    rasterband.write((0, 0), (size.cols.count() as usize, size.rows.count() as usize), &buffer)?;

    Ok(ds)
}

fn geo_wkt(geom: &geo_types::Geometry<f64>) -> String {
    use geo_types::Geometry;
    use std::fmt::Write;

    fn ring_wkt(ring: &geo_types::LineString<f64>) -> String {
        let mut s = String::from("(");
        for (i, c) in ring.0.iter().enumerate() {
            if i > 0 {
                s.push(',');
            }
            write!(s, "{} {}", c.x, c.y).ok();
        }
        s.push(')');
        s
    }

    fn polygon_wkt(poly: &geo_types::Polygon<f64>) -> String {
        let mut s = String::from("(");
        s.push_str(&ring_wkt(poly.exterior()));
        for interior in poly.interiors() {
            s.push(',');
            s.push_str(&ring_wkt(interior));
        }
        s.push(')');
        s
    }

    match geom {
        Geometry::Polygon(poly) => format!("POLYGON {}", polygon_wkt(poly)),
        Geometry::MultiPolygon(polys) => {
            let parts: Vec<String> = polys.iter().map(polygon_wkt).collect();
            format!("MULTIPOLYGON ({})", parts.join(","))
        }
        other => {
            log::warn!("Unsupported geometry type for rasterization burn feature: {other:?}");
            "MULTIPOLYGON EMPTY".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Columns, Rows};

    #[test]
    fn geo_wkt_for_simple_polygon() {
        let poly = geo_types::Polygon::new(
            geo_types::LineString::from(vec![(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)]),
            vec![],
        );
        let wkt = geo_wkt(&geo_types::Geometry::Polygon(poly));
        assert!(wkt.starts_with("POLYGON"));
    }

    #[test]
    fn raster_size_matches_georeference() {
        let georef = GeoReference::new(
            "EPSG:4326".to_string(),
            RasterSize::with_rows_cols(Rows(2), Columns(2)),
            [0.0, 1.0, 0.0, 2.0, 0.0, -1.0],
            Some(0.0),
        );
        assert_eq!(georef.raster_size().cell_count(), 4);
    }
}
