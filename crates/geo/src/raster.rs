//! Raster codec contract: the narrow boundary through which the rest of the workspace
//! reads and writes pixel data, independent of the backing file format.

pub mod reader;
#[cfg(feature = "gdal")]
pub mod rasterize;
pub mod testutil;

pub use reader::{RasterBand, RasterDataset, RasterDatasetWriter, RasterFormat};

#[cfg(feature = "gdal")]
pub use reader::gdal::{GdalRasterDataset, GdalRasterDatasetWriter};

pub use testutil::MemoryRasterDataset;
