pub mod geojson;
#[cfg(feature = "geos")]
pub mod geom;
pub mod schema;

#[doc(inline)]
pub use schema::{Attributes, Field, FieldInfo, FieldType, Schema};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VectorFormat {
    Memory,
    Csv,
    Tab,
    ShapeFile,
    Xlsx,
    GeoJson,
    GeoPackage,
    PostgreSQL,
    Wfs,
    Vrt,
    Parquet,
    Arrow,
    Unknown,
}

impl VectorFormat {
    /// Given a file path, guess the vector format based on the file extension.
    pub fn guess_from_path(file_path: &std::path::Path) -> VectorFormat {
        let ext = file_path.extension().map(|ext| ext.to_string_lossy().to_lowercase());

        if let Some(ext) = ext {
            match ext.as_ref() {
                "csv" => return VectorFormat::Csv,
                "tab" => return VectorFormat::Tab,
                "shp" | "dbf" => return VectorFormat::ShapeFile,
                "xlsx" => return VectorFormat::Xlsx,
                "json" | "geojson" => return VectorFormat::GeoJson,
                "gpkg" => return VectorFormat::GeoPackage,
                "vrt" => return VectorFormat::Vrt,
                "parquet" => return VectorFormat::Parquet,
                "arrow" | "arrows" => return VectorFormat::Arrow,
                _ => {}
            }
        }

        let path = file_path.to_string_lossy();
        if path.starts_with("postgresql://") || path.starts_with("pg:") {
            VectorFormat::PostgreSQL
        } else if path.starts_with("wfs:") {
            VectorFormat::Wfs
        } else {
            VectorFormat::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn vectorformat_guess_from_path() {
        assert_eq!(VectorFormat::guess_from_path(Path::new("test.csv")), VectorFormat::Csv);
        assert_eq!(VectorFormat::guess_from_path(Path::new("test.shp")), VectorFormat::ShapeFile);
        assert_eq!(VectorFormat::guess_from_path(Path::new("test.geojson")), VectorFormat::GeoJson);
        assert_eq!(VectorFormat::guess_from_path(Path::new("test.gpkg")), VectorFormat::GeoPackage);
        assert_eq!(VectorFormat::guess_from_path(Path::new("test")), VectorFormat::Unknown);
    }
}
