pub use error::Error;
pub type Result<T = ()> = std::result::Result<T, Error>;

pub mod cast;
pub mod duration;
mod error;
pub mod fs;
#[cfg(feature = "gdal")]
pub mod gdalinterop;
