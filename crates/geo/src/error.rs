use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Path not found: {}", .0.display())]
    InvalidPath(PathBuf),
    #[cfg(feature = "gdal")]
    #[error("Gdal error: {0}")]
    GdalError(#[from] gdal::errors::GdalError),
    #[error("Geos error: {0}")]
    GeosError(String),
    #[error("Invalid string: {0}")]
    InvalidString(#[from] std::ffi::NulError),
    #[error("Invalid number: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Json error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[cfg(feature = "geos")]
impl From<geos::Error> for Error {
    fn from(err: geos::Error) -> Self {
        Error::GeosError(err.to_string())
    }
}
