pub type Result<T = ()> = std::result::Result<T, Error>;

mod arraydatatype;
mod cell;
pub mod crs;
mod error;
mod georeference;
mod geotransform;
mod nodata;
mod point;
pub mod raster;
mod rastersize;
mod rect;
pub mod vector;

#[doc(inline)]
pub use crs::Epsg;
#[doc(inline)]
pub use {
    arraydatatype::ArrayDataType,
    cell::{Cell, CellIterator},
    error::Error,
    georeference::{CellSize, GeoReference},
    geotransform::GeoTransform,
    nodata::Nodata,
    point::Point,
    rastersize::{Columns, RasterSize, RasterWindow, Rows},
    rect::Rect,
};
