use std::path::Path;

#[cfg(feature = "gdal")]
pub mod gdal;

use crate::{ArrayDataType, GeoReference, RasterWindow, Result};

/// A rectangular band of pixel data read from (or about to be written to) a raster.
/// Values are always carried as `f64`; the backing codec casts to/from the on-disk
/// storage type (see [`ArrayDataType`]) and preserves the georeference's nodata sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBand {
    pub window: RasterWindow,
    pub data: Vec<f64>,
}

impl RasterBand {
    pub fn new(window: RasterWindow, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), window.size().cell_count());
        RasterBand { window, data }
    }

    pub fn filled(window: RasterWindow, value: f64) -> Self {
        RasterBand {
            data: vec![value; window.size().cell_count()],
            window,
        }
    }
}

/// Read-only access to a raster file's bands and georeference.
/// This is the only boundary through which cutters, label makers, and drivers touch
/// actual pixel bytes; everything above it is codec-agnostic.
pub trait RasterDataset {
    fn open_read_only(path: impl AsRef<Path>) -> Result<Self>
    where
        Self: Sized;

    fn georeference(&self) -> &GeoReference;
    fn band_count(&self) -> usize;
    fn data_type(&self, band: usize) -> Result<ArrayDataType>;

    /// Reads a window of one band (1-based index). Areas of the window outside the
    /// raster bounds are filled with the georeference's nodata value (or 0.0 if unset).
    fn read_window(&self, band: usize, window: RasterWindow) -> Result<RasterBand>;

    fn read_full_band(&self, band: usize) -> Result<RasterBand> {
        let size = self.georeference().raster_size();
        self.read_window(band, RasterWindow::new(0, 0, size.rows, size.cols))
    }
}

/// Write access, used by cutters to materialize child rasters and by label makers to
/// write label planes.
pub trait RasterDatasetWriter: Sized {
    fn create(path: impl AsRef<Path>, georeference: &GeoReference, band_count: usize, dtype: ArrayDataType) -> Result<Self>;

    fn write_window(&mut self, band: usize, window: RasterWindow, data: &RasterBand) -> Result<()>;

    fn write_full_band(&mut self, band: usize, data: &RasterBand) -> Result<()> {
        self.write_window(band, data.window, data)
    }
}

/// Raster file formats recognized by the GDAL-backed adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    GeoTiff,
    Png,
    Vrt,
    GeoPackage,
    Unknown,
}

impl RasterFormat {
    pub fn guess_from_path(path: impl AsRef<Path>) -> RasterFormat {
        let path = path.as_ref();
        match path.extension().map(|e| e.to_string_lossy().to_lowercase()) {
            Some(ext) if ext == "tif" || ext == "tiff" => RasterFormat::GeoTiff,
            Some(ext) if ext == "png" => RasterFormat::Png,
            Some(ext) if ext == "vrt" => RasterFormat::Vrt,
            Some(ext) if ext == "gpkg" => RasterFormat::GeoPackage,
            _ => RasterFormat::Unknown,
        }
    }

    #[cfg(feature = "gdal")]
    pub fn gdal_driver_name(&self) -> &'static str {
        match self {
            RasterFormat::GeoTiff => "GTiff",
            RasterFormat::Png => "PNG",
            RasterFormat::Vrt => "VRT",
            RasterFormat::GeoPackage => "GPKG",
            RasterFormat::Unknown => "GTiff",
        }
    }
}
