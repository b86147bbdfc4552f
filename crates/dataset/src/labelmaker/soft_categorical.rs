//! Multi-band `float32` per-class probability labels (§4.6, soft-categorical variant).
//! Each task class gets its own burned-probability band; an optional leading background
//! band is derived as `1 - sum(other bands)` rather than burned directly.

use geo::raster::rasterize::{BurnFeature, rasterize};
use geo::raster::{RasterBand, RasterDataset, RasterDatasetWriter};
use geo::vector::schema::Field;
use geo::{ArrayDataType, Epsg};
use graph::FeatureName;

use crate::connector::Connector;
use crate::labelmaker::{LabelMaker, resolve_targets};
use crate::{Error, Result};

pub const LABEL_TYPE: &str = "soft-categorical";

pub struct SoftCategoricalLabelMaker {
    pub add_background_band: bool,
}

impl SoftCategoricalLabelMaker {
    pub fn new(add_background_band: bool) -> Self {
        SoftCategoricalLabelMaker { add_background_band }
    }

    fn probability_column(class: &str) -> String {
        format!("prob_of_class_{class}")
    }
}

impl<D, W> LabelMaker<D, W> for SoftCategoricalLabelMaker
where
    D: RasterDataset,
    W: RasterDatasetWriter,
{
    fn label_type(&self) -> &str {
        LABEL_TYPE
    }

    fn make_labels(&self, connector: &mut Connector, raster_names: Option<&[FeatureName]>) -> Result<()> {
        let classes = connector.attrs().task_vector_classes.clone();
        let columns: Vec<String> = classes.iter().map(|c| Self::probability_column(c)).collect();

        for v in connector.vectors().rows() {
            for column in &columns {
                if v.attributes.get(column).and_then(Field::as_f64).is_none() {
                    return Err(Error::SchemaMismatch(column.clone()));
                }
            }
        }

        let targets = resolve_targets(connector, raster_names);
        std::fs::create_dir_all(connector.labels_dir())?;

        for raster_name in &targets {
            let orig_epsg = raster_orig_epsg(connector, raster_name)?;
            let raster_path = connector.rasters_dir().join(raster_name.as_str());
            let dataset = D::open_read_only(&raster_path)?;
            let georeference = dataset.georeference().clone();

            let mut class_bands = Vec::with_capacity(classes.len());
            for (class, column) in classes.iter().zip(&columns) {
                let mut features = Vec::new();
                for vector_name in connector.vectors_intersecting_raster(raster_name)? {
                    let row = connector.vectors().get(&vector_name).ok_or_else(|| Error::UnknownKey(vector_name.clone()))?;
                    let Some(prob) = row.attributes.get(column).and_then(Field::as_f64) else {
                        continue;
                    };
                    let geometry = geo::crs::reproject_geometry(&row.geometry, connector.crs_epsg(), orig_epsg)?;
                    features.push((geometry, prob));
                }
                let burn_features: Vec<BurnFeature> = features.iter().map(|(geometry, prob)| BurnFeature { geometry, value: *prob }).collect();
                let band = rasterize(&burn_features, &georeference, 0.0)?;
                class_bands.push((class.clone(), band));
            }

            let band_count = if self.add_background_band { classes.len() + 1 } else { classes.len() };
            let label_path = connector.labels_dir().join(raster_name.as_str());
            let mut writer = W::create(&label_path, &georeference, band_count, ArrayDataType::Float32)?;

            let band_offset = if self.add_background_band {
                let background = background_band(&class_bands);
                writer.write_full_band(1, &background)?;
                1
            } else {
                0
            };
            for (index, (_, band)) in class_bands.iter().enumerate() {
                writer.write_full_band(band_offset + index + 1, band)?;
            }
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

fn background_band(class_bands: &[(String, RasterBand)]) -> RasterBand {
    let window = class_bands[0].1.window;
    let mut data = vec![1.0; window.size().cell_count()];
    for (_, band) in class_bands {
        for (bg, value) in data.iter_mut().zip(&band.data) {
            *bg -= value;
        }
    }
    RasterBand::new(window, data)
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
    use geo::RasterWindow;

    #[test]
    fn background_band_is_one_minus_sum_of_class_bands() {
        let window = RasterWindow::new(0, 0, 1, 2);
        let a = RasterBand::new(window, vec![0.3, 0.0]);
        let b = RasterBand::new(window, vec![0.4, 0.2]);
        let bg = background_band(&[("a".to_string(), a), ("b".to_string(), b)]);
        assert_eq!(bg.data, vec![0.3, 0.8]);
    }

    #[test]
    fn probability_column_name_matches_class() {
        assert_eq!(SoftCategoricalLabelMaker::probability_column("road"), "prob_of_class_road");
    }
}
