use std::path::Path;

use gdal::raster::{GdalType, RasterCreationOptions};
use num::NumCast;

use crate::{
    ArrayDataType, Columns, Error, GeoReference, RasterSize, RasterWindow, Result, Rows,
    raster::reader::{RasterBand, RasterDataset, RasterDatasetWriter, RasterFormat},
};

/// GDAL-backed implementation of [`RasterDataset`]/[`RasterDatasetWriter`].
/// This is the only module in the workspace allowed to call into the `gdal`/`gdal-sys`
/// crates directly; everything above the [`RasterDataset`] boundary is codec-agnostic.
pub struct GdalRasterDataset {
    dataset: gdal::Dataset,
    georeference: GeoReference,
}

fn read_georeference(dataset: &gdal::Dataset, band_index: usize) -> Result<GeoReference> {
    let (width, height) = dataset.raster_size();
    let nodata = dataset.rasterband(band_index)?.no_data_value();
    Ok(GeoReference::new(
        dataset.projection(),
        RasterSize::with_rows_cols(Rows(height as i32), Columns(width as i32)),
        dataset.geo_transform()?,
        nodata,
    ))
}

impl RasterDataset for GdalRasterDataset {
    fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let dataset = gdal::Dataset::open(path).map_err(|err| {
            if !path.exists() {
                Error::InvalidPath(path.to_path_buf())
            } else {
                Error::Runtime(format!("Failed to open raster dataset {}: {err}", path.display()))
            }
        })?;
        let georeference = read_georeference(&dataset, 1)?;
        Ok(GdalRasterDataset { dataset, georeference })
    }

    fn georeference(&self) -> &GeoReference {
        &self.georeference
    }

    fn band_count(&self) -> usize {
        self.dataset.raster_count()
    }

    fn data_type(&self, band: usize) -> Result<ArrayDataType> {
        gdal_type_to_array_data_type(self.dataset.rasterband(band)?.band_type())
    }

    fn read_window(&self, band: usize, window: RasterWindow) -> Result<RasterBand> {
        let size = self.georeference.raster_size();
        let nodata = self.georeference.nodata().unwrap_or(0.0);

        let mut data = vec![nodata; window.size().cell_count()];
        if let Some(clamped) = window.clamped_to(size) {
            let rasterband = self.dataset.rasterband(band)?;
            let buffer = rasterband.read_as::<f64>(
                (clamped.col_offset as isize, clamped.row_offset as isize),
                (clamped.cols.count() as usize, clamped.rows.count() as usize),
                (clamped.cols.count() as usize, clamped.rows.count() as usize),
                None,
            )?;

            let dst_cols = window.cols.count();
            let row_in_window = clamped.row_offset - window.row_offset;
            let col_in_window = clamped.col_offset - window.col_offset;
            for row in 0..clamped.rows.count() {
                let src_start = (row as usize) * clamped.cols.count() as usize;
                let src_row = &buffer.data()[src_start..src_start + clamped.cols.count() as usize];
                let dst_start = ((row_in_window + row) * dst_cols + col_in_window) as usize;
                data[dst_start..dst_start + clamped.cols.count() as usize].copy_from_slice(src_row);
            }
        }

        Ok(RasterBand::new(window, data))
    }
}

pub struct GdalRasterDatasetWriter {
    dataset: gdal::Dataset,
    dtype: ArrayDataType,
}

impl RasterDatasetWriter for GdalRasterDatasetWriter {
    fn create(path: impl AsRef<Path>, georeference: &GeoReference, band_count: usize, dtype: ArrayDataType) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let format = RasterFormat::guess_from_path(path);
        let driver = gdal::DriverManager::get_driver_by_name(format.gdal_driver_name())?;
        let (rows, cols) = (georeference.rows().count() as usize, georeference.columns().count() as usize);

        let options = RasterCreationOptions::from_iter(["COMPRESS=DEFLATE"]);
        let mut dataset = create_with_dtype(&driver, path, cols, rows, band_count, dtype, &options)?;

        dataset.set_geo_transform(&georeference.geo_transform().coefficients())?;
        dataset.set_projection(georeference.projection())?;
        if let Some(nodata) = georeference.nodata() {
            for band in 1..=band_count {
                dataset.rasterband(band)?.set_no_data_value(Some(nodata))?;
            }
        }

        Ok(GdalRasterDatasetWriter { dataset, dtype })
    }

    fn write_window(&mut self, band: usize, window: RasterWindow, data: &RasterBand) -> Result<()> {
        write_with_dtype(&mut self.dataset, band, window, data, self.dtype)
    }
}

fn gdal_type_to_array_data_type(dtype: gdal::raster::GdalDataType) -> Result<ArrayDataType> {
    use gdal::raster::GdalDataType::*;
    match dtype {
        UInt8 => Ok(ArrayDataType::Uint8),
        UInt16 => Ok(ArrayDataType::Uint16),
        UInt32 => Ok(ArrayDataType::Uint32),
        UInt64 => Ok(ArrayDataType::Uint64),
        Int8 => Ok(ArrayDataType::Int8),
        Int16 => Ok(ArrayDataType::Int16),
        Int32 => Ok(ArrayDataType::Int32),
        Int64 => Ok(ArrayDataType::Int64),
        Float32 => Ok(ArrayDataType::Float32),
        Float64 => Ok(ArrayDataType::Float64),
        other => Err(Error::Runtime(format!("Unsupported GDAL data type: {other:?}"))),
    }
}

fn create_with_dtype(
    driver: &gdal::Driver,
    path: &Path,
    cols: usize,
    rows: usize,
    bands: usize,
    dtype: ArrayDataType,
    options: &RasterCreationOptions,
) -> Result<gdal::Dataset> {
    macro_rules! create_as {
        ($t:ty) => {
            driver.create_with_band_type_with_options::<$t, _>(path, cols, rows, bands, options)?
        };
    }

    Ok(match dtype {
        ArrayDataType::Uint8 => create_as!(u8),
        ArrayDataType::Int8 => create_as!(i8),
        ArrayDataType::Uint16 => create_as!(u16),
        ArrayDataType::Int16 => create_as!(i16),
        ArrayDataType::Uint32 => create_as!(u32),
        ArrayDataType::Int32 => create_as!(i32),
        ArrayDataType::Uint64 => create_as!(u64),
        ArrayDataType::Int64 => create_as!(i64),
        ArrayDataType::Float32 => create_as!(f32),
        ArrayDataType::Float64 => create_as!(f64),
    })
}

fn write_with_dtype(dataset: &mut gdal::Dataset, band: usize, window: RasterWindow, data: &RasterBand, dtype: ArrayDataType) -> Result<()> {
    fn write_band_as<T: GdalType + NumCast + num::Zero + Copy>(
        dataset: &mut gdal::Dataset,
        band: usize,
        window: RasterWindow,
        data: &RasterBand,
    ) -> Result<()> {
        let converted: Vec<T> = data.data.iter().map(|&v| NumCast::from(v).unwrap_or_else(T::zero)).collect();
        let size = (window.cols.count() as usize, window.rows.count() as usize);
        let buffer = gdal::raster::Buffer::new(size, converted);
        dataset
            .rasterband(band)?
            .write((window.col_offset as isize, window.row_offset as isize), size, &buffer)?;
        Ok(())
    }

    match dtype {
        ArrayDataType::Uint8 => write_band_as::<u8>(dataset, band, window, data),
        ArrayDataType::Int8 => write_band_as::<i8>(dataset, band, window, data),
        ArrayDataType::Uint16 => write_band_as::<u16>(dataset, band, window, data),
        ArrayDataType::Int16 => write_band_as::<i16>(dataset, band, window, data),
        ArrayDataType::Uint32 => write_band_as::<u32>(dataset, band, window, data),
        ArrayDataType::Int32 => write_band_as::<i32>(dataset, band, window, data),
        ArrayDataType::Uint64 => write_band_as::<u64>(dataset, band, window, data),
        ArrayDataType::Int64 => write_band_as::<i64>(dataset, band, window, data),
        ArrayDataType::Float32 => write_band_as::<f32>(dataset, band, window, data),
        ArrayDataType::Float64 => write_band_as::<f64>(dataset, band, window, data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guess_format_from_extension() {
        assert_eq!(RasterFormat::guess_from_path("foo.tif"), RasterFormat::GeoTiff);
        assert_eq!(RasterFormat::guess_from_path("foo.unknown"), RasterFormat::Unknown);
    }
}
