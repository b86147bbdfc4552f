//! Single-band `uint8` class-index labels (§4.6, categorical variant). Burn order follows
//! `task_vector_classes` so that later classes overwrite earlier ones at overlaps, matching
//! the GDAL rasterize "replace" merge algorithm used for a single `rasterize()` call.

use geo::raster::rasterize::{BurnFeature, rasterize};
use geo::raster::{RasterDataset, RasterDatasetWriter};
use geo::vector::schema::Field;
use geo::{ArrayDataType, Epsg};
use graph::FeatureName;

use crate::connector::Connector;
use crate::labelmaker::{LabelMaker, resolve_targets};
use crate::{Error, Result};

pub const LABEL_TYPE: &str = "categorical";
const TYPE_COLUMN: &str = "type";

pub struct CategoricalLabelMaker;

impl<D, W> LabelMaker<D, W> for CategoricalLabelMaker
where
    D: RasterDataset,
    W: RasterDatasetWriter,
{
    fn label_type(&self) -> &str {
        LABEL_TYPE
    }

    fn make_labels(&self, connector: &mut Connector, raster_names: Option<&[FeatureName]>) -> Result<()> {
        let classes: Vec<String> = connector
            .attrs()
            .task_vector_classes
            .iter()
            .filter(|c| Some(c.as_str()) != connector.attrs().background_class.as_deref())
            .cloned()
            .collect();
        let all_classes = connector.attrs().all_vector_classes();

        for v in connector.vectors().rows() {
            if let Some(value) = v.attributes.get(TYPE_COLUMN).and_then(Field::as_str)
                && !all_classes.iter().any(|c| c == value)
            {
                return Err(Error::InvalidArgument(format!("vector '{}' has type '{value}' outside all_vector_classes", v.name)));
            }
        }

        let targets = resolve_targets(connector, raster_names);
        std::fs::create_dir_all(connector.labels_dir())?;

        for raster_name in &targets {
            let orig_epsg = raster_orig_epsg(connector, raster_name)?;
            let raster_path = connector.rasters_dir().join(raster_name.as_str());
            let dataset = D::open_read_only(&raster_path)?;
            let georeference = dataset.georeference().clone();

            let mut feature_geoms = Vec::new();
            for vector_name in connector.vectors_intersecting_raster(raster_name)? {
                let row = connector.vectors().get(&vector_name).ok_or_else(|| Error::UnknownKey(vector_name.clone()))?;
                let Some(class_name) = row.attributes.get(TYPE_COLUMN).and_then(Field::as_str) else {
                    continue;
                };
                let Some(class_index) = classes.iter().position(|c| c == class_name) else {
                    continue;
                };
                let geometry = geo::crs::reproject_geometry(&row.geometry, connector.crs_epsg(), orig_epsg)?;
                feature_geoms.push((class_index, geometry));
            }
            feature_geoms.sort_by_key(|(class_index, _)| *class_index);

            let features: Vec<BurnFeature> = feature_geoms
                .iter()
                .map(|(class_index, geometry)| BurnFeature {
                    geometry,
                    value: (*class_index + 1) as f64,
                })
                .collect();

            let band = rasterize(&features, &georeference, 0.0)?;
            let label_path = connector.labels_dir().join(raster_name.as_str());
            let mut writer = W::create(&label_path, &georeference, 1, ArrayDataType::Uint8)?;
            writer.write_full_band(1, &band)?;
        }

        connector.attrs_mut().label_type = Some(LABEL_TYPE.to_string());
        Ok(())
    }

    fn delete_labels(&self, connector: &mut Connector, raster_names: Option<&[FeatureName]>) -> Result<()> {
        let targets = match raster_names {
            Some(names) => names.to_vec(),
            None => connector.rasters().names().cloned().collect(),
        };
        for raster_name in targets {
            let path = connector.labels_dir().join(raster_name.as_str());
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

fn raster_orig_epsg(connector: &Connector, raster_name: &FeatureName) -> Result<Epsg> {
    let row = connector.rasters().get(raster_name).ok_or_else(|| Error::UnknownKey(raster_name.clone()))?;
    let code = row
        .attributes
        .get("orig_crs_epsg_code")
        .and_then(Field::as_i64)
        .ok_or_else(|| Error::SchemaMismatch("orig_crs_epsg_code".to_string()))?;
    Ok(Epsg::new(code as i32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph::FeatureName;

    #[test]
    fn label_type_is_categorical() {
        let maker = CategoricalLabelMaker;
        assert_eq!(<CategoricalLabelMaker as LabelMaker<geo::raster::MemoryRasterDataset, geo::raster::MemoryRasterDataset>>::label_type(&maker), "categorical");
    }

    #[test]
    fn rejects_vectors_with_type_outside_all_vector_classes() {
        use crate::table::Row;
        use geo::vector::schema::Attributes;
        use geo_types::{Geometry, LineString, Polygon};

        let mut connector = Connector::from_scratch(std::env::temp_dir().join("categorical-unused"), Epsg::new(4326));
        connector.attrs_mut().task_vector_classes = vec!["building".to_string()];
        connector.attrs_mut().background_class = Some("background".to_string());

        let mut attrs = Attributes::new();
        attrs.insert(TYPE_COLUMN.to_string(), Field::String("road".to_string()));
        let geom = Geometry::Polygon(Polygon::new(LineString::from(vec![(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)]), vec![]));
        connector
            .add_to_vectors::<geo::raster::MemoryRasterDataset, geo::raster::MemoryRasterDataset>(vec![Row::new("v1", geom, attrs)], Epsg::new(4326), None)
            .unwrap();

        let maker = CategoricalLabelMaker;
        let result = LabelMaker::<geo::raster::MemoryRasterDataset, geo::raster::MemoryRasterDataset>::make_labels(&maker, &mut connector, Some(&[FeatureName::from("r1")]));
        assert!(result.is_err());
    }
}
