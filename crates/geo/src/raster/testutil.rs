//! In-memory fake raster dataset, so unit tests for cutters, drivers, and label makers
//! never need to touch the filesystem or a real GDAL build. `create`/`open_read_only`
//! still go through real file I/O, using a tiny private binary format instead of GDAL's
//! GeoTIFF codec, so a full cut/label-make pass can be exercised against a tempdir.

use std::io::{Read, Write};
use std::path::Path;

use crate::{
    ArrayDataType, Error, GeoReference, GeoTransform, RasterSize, RasterWindow, Result,
    raster::reader::{RasterBand, RasterDataset, RasterDatasetWriter},
    rastersize::{Columns, Rows},
};

/// A raster held entirely in memory, one flat `f64` buffer per band, row-major.
#[derive(Debug, Clone)]
pub struct MemoryRasterDataset {
    georeference: GeoReference,
    dtype: ArrayDataType,
    bands: Vec<Vec<f64>>,
    /// Set only for datasets obtained through [`RasterDatasetWriter::create`]; every
    /// `write_window` call flushes the whole dataset back to this path so a later
    /// `open_read_only` on the same path sees the write.
    path: Option<std::path::PathBuf>,
}

impl MemoryRasterDataset {
    pub fn new(georeference: GeoReference, dtype: ArrayDataType, band_count: usize) -> Self {
        let cell_count = georeference.raster_size().cell_count();
        let nodata = georeference.nodata().unwrap_or(0.0);
        MemoryRasterDataset {
            georeference,
            dtype,
            bands: vec![vec![nodata; cell_count]; band_count],
            path: None,
        }
    }

    /// Builds a single-band dataset pre-filled with `data`, row-major over the
    /// georeference's full raster size.
    pub fn with_band_data(georeference: GeoReference, dtype: ArrayDataType, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), georeference.raster_size().cell_count());
        MemoryRasterDataset {
            georeference,
            dtype,
            bands: vec![data],
            path: None,
        }
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;

        let projection = self.georeference.projection().as_bytes();
        file.write_all(&(projection.len() as u32).to_le_bytes())?;
        file.write_all(projection)?;

        let size = self.georeference.raster_size();
        file.write_all(&size.rows.count().to_le_bytes())?;
        file.write_all(&size.cols.count().to_le_bytes())?;

        for coefficient in self.georeference.geo_transform().coefficients() {
            file.write_all(&coefficient.to_le_bytes())?;
        }

        match self.georeference.nodata() {
            Some(value) => {
                file.write_all(&[1u8])?;
                file.write_all(&value.to_le_bytes())?;
            }
            None => file.write_all(&[0u8])?,
        }

        file.write_all(&[self.dtype as u8])?;
        file.write_all(&(self.bands.len() as u32).to_le_bytes())?;
        for band in &self.bands {
            for value in band {
                file.write_all(&value.to_le_bytes())?;
            }
        }
        Ok(())
    }

    fn read_from(path: &Path) -> Result<Self> {
        let mut file = std::fs::File::open(path)?;

        let mut u32_buf = [0u8; 4];
        let mut i32_buf = [0u8; 4];
        let mut f64_buf = [0u8; 8];

        file.read_exact(&mut u32_buf)?;
        let projection_len = u32::from_le_bytes(u32_buf) as usize;
        let mut projection_bytes = vec![0u8; projection_len];
        file.read_exact(&mut projection_bytes)?;
        let projection = String::from_utf8(projection_bytes).map_err(|e| Error::InvalidArgument(e.to_string()))?;

        file.read_exact(&mut i32_buf)?;
        let rows = Rows(i32::from_le_bytes(i32_buf));
        file.read_exact(&mut i32_buf)?;
        let cols = Columns(i32::from_le_bytes(i32_buf));

        let mut coefficients = [0.0f64; 6];
        for coefficient in &mut coefficients {
            file.read_exact(&mut f64_buf)?;
            *coefficient = f64::from_le_bytes(f64_buf);
        }

        let mut has_nodata = [0u8; 1];
        file.read_exact(&mut has_nodata)?;
        let nodata = if has_nodata[0] == 1 {
            file.read_exact(&mut f64_buf)?;
            Some(f64::from_le_bytes(f64_buf))
        } else {
            None
        };

        let mut dtype_buf = [0u8; 1];
        file.read_exact(&mut dtype_buf)?;
        let dtype = array_data_type_from_u8(dtype_buf[0])?;

        file.read_exact(&mut u32_buf)?;
        let band_count = u32::from_le_bytes(u32_buf) as usize;

        let georeference = GeoReference::with_transform(projection, RasterSize::with_rows_cols(rows, cols), GeoTransform::new(coefficients), nodata);
        let cell_count = georeference.raster_size().cell_count();

        let mut bands = Vec::with_capacity(band_count);
        for _ in 0..band_count {
            let mut band = Vec::with_capacity(cell_count);
            for _ in 0..cell_count {
                file.read_exact(&mut f64_buf)?;
                band.push(f64::from_le_bytes(f64_buf));
            }
            bands.push(band);
        }

        Ok(MemoryRasterDataset {
            georeference,
            dtype,
            bands,
            path: None,
        })
    }
}

fn array_data_type_from_u8(tag: u8) -> Result<ArrayDataType> {
    match tag {
        0 => Ok(ArrayDataType::Int8),
        1 => Ok(ArrayDataType::Uint8),
        2 => Ok(ArrayDataType::Int16),
        3 => Ok(ArrayDataType::Uint16),
        4 => Ok(ArrayDataType::Int32),
        5 => Ok(ArrayDataType::Uint32),
        6 => Ok(ArrayDataType::Int64),
        7 => Ok(ArrayDataType::Uint64),
        8 => Ok(ArrayDataType::Float32),
        9 => Ok(ArrayDataType::Float64),
        other => Err(Error::InvalidArgument(format!("unknown ArrayDataType tag {other}"))),
    }
}

impl RasterDataset for MemoryRasterDataset {
    fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::InvalidPath(path.to_path_buf()));
        }
        Self::read_from(path)
    }

    fn georeference(&self) -> &GeoReference {
        &self.georeference
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn data_type(&self, band: usize) -> Result<ArrayDataType> {
        if band == 0 || band > self.bands.len() {
            return Err(Error::InvalidArgument(format!("band index {band} out of range")));
        }
        Ok(self.dtype)
    }

    fn read_window(&self, band: usize, window: RasterWindow) -> Result<RasterBand> {
        let plane = self
            .bands
            .get(band.wrapping_sub(1))
            .ok_or_else(|| Error::InvalidArgument(format!("band index {band} out of range")))?;

        let size = self.georeference.raster_size();
        let nodata = self.georeference.nodata().unwrap_or(0.0);
        let mut data = vec![nodata; window.size().cell_count()];

        if let Some(clamped) = window.clamped_to(size) {
            let src_cols = size.cols.count();
            let dst_cols = window.cols.count();
            let row_in_window = clamped.row_offset - window.row_offset;
            let col_in_window = clamped.col_offset - window.col_offset;

            for row in 0..clamped.rows.count() {
                let src_row = clamped.row_offset + row;
                let src_start = (src_row * src_cols + clamped.col_offset) as usize;
                let src_slice = &plane[src_start..src_start + clamped.cols.count() as usize];

                let dst_start = ((row_in_window + row) * dst_cols + col_in_window) as usize;
                data[dst_start..dst_start + clamped.cols.count() as usize].copy_from_slice(src_slice);
            }
        }

        Ok(RasterBand::new(window, data))
    }
}

impl RasterDatasetWriter for MemoryRasterDataset {
    fn create(path: impl AsRef<Path>, georeference: &GeoReference, band_count: usize, dtype: ArrayDataType) -> Result<Self> {
        let mut dataset = MemoryRasterDataset::new(georeference.clone(), dtype, band_count);
        dataset.path = Some(path.as_ref().to_path_buf());
        dataset.write_to(path.as_ref())?;
        Ok(dataset)
    }

    fn write_window(&mut self, band: usize, window: RasterWindow, data: &RasterBand) -> Result<()> {
        let size = self.georeference.raster_size();
        let plane = self
            .bands
            .get_mut(band.wrapping_sub(1))
            .ok_or_else(|| Error::InvalidArgument(format!("band index {band} out of range")))?;

        let Some(clamped) = window.clamped_to(size) else {
            return Ok(());
        };

        let src_cols = window.cols.count();
        let dst_cols = size.cols.count();
        let row_in_window = clamped.row_offset - window.row_offset;
        let col_in_window = clamped.col_offset - window.col_offset;

        for row in 0..clamped.rows.count() {
            let src_start = ((row_in_window + row) * src_cols + col_in_window) as usize;
            let src_slice = &data.data[src_start..src_start + clamped.cols.count() as usize];

            let dst_row = clamped.row_offset + row;
            let dst_start = (dst_row * dst_cols + clamped.col_offset) as usize;
            plane[dst_start..dst_start + clamped.cols.count() as usize].copy_from_slice(src_slice);
        }

        if let Some(path) = self.path.clone() {
            self.write_to(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Columns, Rows};

    fn test_georeference() -> GeoReference {
        GeoReference::new(
            "EPSG:4326".to_string(),
            crate::RasterSize::with_rows_cols(Rows(4), Columns(4)),
            [0.0, 1.0, 0.0, 4.0, 0.0, -1.0],
            Some(-9999.0),
        )
    }

    #[test]
    fn round_trips_a_written_window() {
        let mut ds = MemoryRasterDataset::new(test_georeference(), ArrayDataType::Float32, 1);
        let window = RasterWindow::new(1, 1, Rows(2), Columns(2));
        let band = RasterBand::new(window, vec![1.0, 2.0, 3.0, 4.0]);
        ds.write_window(1, window, &band).unwrap();

        let read_back = ds.read_window(1, window).unwrap();
        assert_eq!(read_back.data, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn read_outside_bounds_returns_nodata_fill() {
        let ds = MemoryRasterDataset::new(test_georeference(), ArrayDataType::Float32, 1);
        let window = RasterWindow::new(-1, -1, Rows(2), Columns(2));
        let read = ds.read_window(1, window).unwrap();
        assert!(read.data.iter().all(|&v| v == -9999.0));
    }

    #[test]
    fn unknown_band_errors() {
        let ds = MemoryRasterDataset::new(test_georeference(), ArrayDataType::Float32, 1);
        assert!(ds.data_type(2).is_err());
    }
}
