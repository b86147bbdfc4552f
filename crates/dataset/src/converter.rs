//! Class combine/remove converter (C8): copies a filtered/relabeled vector set plus the
//! rasters it touches from a source connector into a target connector, merging or
//! dropping classes and renormalizing probability columns as it goes (§4.7).

use std::collections::{HashMap, HashSet};

use geo::raster::{RasterDataset, RasterDatasetWriter};
use geo::vector::schema::Field;
use graph::FeatureName;

use crate::connector::Connector;
use crate::labelmaker::{LabelMaker, categorical, soft_categorical};
use crate::table::Row;
use crate::{Error, Result};

const TYPE_COLUMN: &str = "type";
const ORIG_TYPE_COLUMN: &str = "orig_type";
const MOST_LIKELY_CLASS_COLUMN: &str = "most_likely_class";
const PROB_PREFIX: &str = "prob_of_class_";

/// One entry of the `classes` configuration: a single class kept as-is, or several
/// classes merged under one new name.
#[derive(Debug, Clone)]
pub enum ClassGroup {
    Single(String),
    Merge(Vec<String>),
}

impl ClassGroup {
    fn members(&self) -> &[String] {
        match self {
            ClassGroup::Single(name) => std::slice::from_ref(name),
            ClassGroup::Merge(names) => names,
        }
    }
}

/// Configuration for one combine/remove pass (§4.7).
pub struct ClassConverter {
    pub classes: Vec<ClassGroup>,
    pub new_class_names: Option<Vec<String>>,
    pub class_separator: String,
    pub new_background_class: Option<String>,
    pub remove_rasters: bool,
}

impl ClassConverter {
    pub fn new(classes: Vec<ClassGroup>) -> Self {
        ClassConverter {
            classes,
            new_class_names: None,
            class_separator: "+".to_string(),
            new_background_class: None,
            remove_rasters: false,
        }
    }

    fn group_names(&self) -> Vec<String> {
        match &self.new_class_names {
            Some(names) => names.clone(),
            None => self.classes.iter().map(|g| g.members().join(&self.class_separator)).collect(),
        }
    }

    fn classes_to_keep(&self) -> Vec<String> {
        self.classes.iter().flat_map(|g| g.members().iter().cloned()).collect()
    }

    /// Old class name -> its new group name.
    fn rename_map(&self) -> HashMap<String, String> {
        let group_names = self.group_names();
        let mut map = HashMap::new();
        for (group, new_name) in self.classes.iter().zip(group_names.iter()) {
            for member in group.members() {
                map.insert(member.clone(), new_name.clone());
            }
        }
        map
    }

    fn validate(&self, source: &Connector) -> Result<()> {
        let classes_to_keep = self.classes_to_keep();
        let mut seen = HashSet::new();
        for class in &classes_to_keep {
            if !seen.insert(class) {
                return Err(Error::InvalidArgument(format!("class '{class}' listed more than once")));
            }
        }
        let all_classes: HashSet<String> = source.attrs().all_vector_classes().into_iter().collect();
        for class in &classes_to_keep {
            if !all_classes.contains(class) {
                return Err(Error::InvalidArgument(format!("class '{class}' is not in source.all_vector_classes")));
            }
        }
        if let Some(bg) = &self.new_background_class {
            let group_names = self.group_names();
            if !group_names.contains(bg) {
                return Err(Error::InvalidArgument(format!("new_background_class '{bg}' is not among new_class_names")));
            }
        }
        Ok(())
    }

    /// §4.7 steps 1-7.
    pub fn convert<D, W>(&self, source: &Connector, target: &mut Connector, label_maker: Option<&dyn LabelMaker<D, W>>) -> Result<()>
    where
        D: RasterDataset,
        W: RasterDatasetWriter,
    {
        self.validate(source)?;
        let classes_to_keep: HashSet<String> = self.classes_to_keep().into_iter().collect();
        let rename = self.rename_map();

        let group_names = self.group_names();
        target.attrs_mut().task_vector_classes = group_names.iter().filter(|c| Some(c.as_str()) != self.new_background_class.as_deref()).cloned().collect();
        target.attrs_mut().background_class = self.new_background_class.clone();

        let is_soft = source.attrs().label_type.as_deref() == Some(soft_categorical::LABEL_TYPE);
        let transformed = if is_soft {
            transform_soft_categorical(source, &classes_to_keep, &rename, &group_names)
        } else {
            transform_categorical(source, &classes_to_keep, &rename)
        };

        let rasters_in_target_before: HashSet<FeatureName> = target.rasters().names().cloned().collect();

        let new_to_target: Vec<Row> = transformed.into_iter().filter(|row| target.vectors().get(&row.name).is_none()).collect();
        let added_vector_names: Vec<FeatureName> = new_to_target.iter().map(|r| r.name.clone()).collect();
        if !new_to_target.is_empty() {
            target.add_to_vectors::<D, W>(new_to_target, target.crs_epsg(), None)?;
        }

        copy_rasters::<D, W>(source, target, &added_vector_names, self.remove_rasters)?;

        if let Some(label_maker) = label_maker {
            let mut affected = HashSet::new();
            for v in &added_vector_names {
                for r in target.rasters_intersecting_vector(v)? {
                    if rasters_in_target_before.contains(&r) {
                        affected.insert(r);
                    }
                }
            }
            let affected: Vec<FeatureName> = affected.into_iter().collect();
            label_maker.delete_labels(target, Some(&affected))?;
            label_maker.make_labels(target, None)?;
        }

        Ok(())
    }
}

/// §4.7.3 categorical: keep rows whose `type` is kept, rewrite to the new group name,
/// and stash the original under `orig_type` for diagnostics.
fn transform_categorical(source: &Connector, classes_to_keep: &HashSet<String>, rename: &HashMap<String, String>) -> Vec<Row> {
    source
        .vectors()
        .rows()
        .filter_map(|row| {
            let class = row.attributes.get(TYPE_COLUMN).and_then(Field::as_str)?;
            if !classes_to_keep.contains(class) {
                return None;
            }
            let new_class = rename.get(class).cloned().unwrap_or_else(|| class.to_string());
            let mut row = row.clone();
            row.attributes.insert(ORIG_TYPE_COLUMN.to_string(), Field::String(class.to_string()));
            row.attributes.insert(TYPE_COLUMN.to_string(), Field::String(new_class));
            Some(row)
        })
        .collect()
}

fn probability_column(class: &str) -> String {
    format!("{PROB_PREFIX}{class}")
}

/// §4.7.3 soft-categorical: drop non-kept prob columns, drop now-zero rows, renormalize,
/// sum kept members into each new group's column, then recompute `most_likely_class`.
/// Ties are joined in `group_names` (the `classes`/`new_class_names` declaration order),
/// not alphabetically.
fn transform_soft_categorical(source: &Connector, classes_to_keep: &HashSet<String>, rename: &HashMap<String, String>, group_names: &[String]) -> Vec<Row> {
    let kept_columns: Vec<String> = classes_to_keep.iter().map(|c| probability_column(c)).collect();

    source
        .vectors()
        .rows()
        .filter_map(|row| {
            let probs: Vec<(String, f64)> = kept_columns
                .iter()
                .filter_map(|col| row.attributes.get(col).and_then(Field::as_f64).map(|p| (col.clone(), p)))
                .collect();
            let total: f64 = probs.iter().map(|(_, p)| p).sum();
            if total <= 0.0 {
                return None;
            }

            let mut row = row.clone();
            for col in &kept_columns {
                row.attributes.remove(col);
            }

            let mut group_sums: HashMap<String, f64> = HashMap::new();
            for (col, prob) in &probs {
                let class = col.strip_prefix(PROB_PREFIX).unwrap_or(col);
                let new_name = rename.get(class).cloned().unwrap_or_else(|| class.to_string());
                *group_sums.entry(new_name).or_insert(0.0) += prob / total;
            }
            for (group, sum) in &group_sums {
                row.attributes.insert(probability_column(group), Field::Float(*sum));
            }

            let best = group_sums.values().fold(f64::NEG_INFINITY, |acc, v| acc.max(*v));
            let winners: Vec<&str> = group_names
                .iter()
                .filter(|name| group_sums.get(name.as_str()).is_some_and(|v| (v - best).abs() < 1e-9))
                .map(|name| name.as_str())
                .collect();
            row.attributes.insert(MOST_LIKELY_CLASS_COLUMN.to_string(), Field::String(winners.join(",")));

            Some(row)
        })
        .collect()
}

/// §4.7 step 5: copy source raster files byte-for-byte into target's raster directories,
/// restricted to rasters intersecting a newly added vector when `remove_rasters` is set.
fn copy_rasters<D, W>(source: &Connector, target: &mut Connector, added_vectors: &[FeatureName], remove_rasters: bool) -> Result<()>
where
    D: RasterDataset,
    W: RasterDatasetWriter,
{
    let candidates: Vec<FeatureName> = if remove_rasters {
        let mut kept = HashSet::new();
        for v in added_vectors {
            for r in source.rasters_intersecting_vector(v)? {
                kept.insert(r);
            }
        }
        kept.into_iter().collect()
    } else {
        source.rasters().names().cloned().collect()
    };

    let mut new_rows = Vec::new();
    for raster_name in &candidates {
        if target.rasters().get(raster_name).is_some() {
            continue;
        }
        let Some(row) = source.rasters().get(raster_name) else { continue };
        for (dir_name, dir) in source.raster_data_dirs() {
            let from = dir.join(raster_name.as_str());
            if !from.exists() {
                continue;
            }
            let to_dir = target.data_dir().join(dir_name);
            std::fs::create_dir_all(&to_dir)?;
            std::fs::copy(&from, to_dir.join(raster_name.as_str()))?;
        }
        new_rows.push(row.clone());
    }

    if !new_rows.is_empty() {
        target.add_to_rasters::<D, W>(new_rows, target.crs_epsg(), None)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Epsg;
    use geo::raster::MemoryRasterDataset;
    use geo::vector::schema::Attributes;
    use geo_types::{Geometry, LineString, Polygon};

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
        Geometry::Polygon(Polygon::new(
            LineString::from(vec![(x0, y0), (x0, y1), (x1, y1), (x1, y0), (x0, y0)]),
            vec![],
        ))
    }

    #[test]
    fn rejects_duplicate_classes_to_keep() {
        let converter = ClassConverter::new(vec![ClassGroup::Single("building".to_string()), ClassGroup::Single("building".to_string())]);
        let source = Connector::from_scratch(std::env::temp_dir().join("conv-unused"), Epsg::new(4326));
        assert!(converter.validate(&source).is_err());
    }

    #[test]
    fn rejects_classes_outside_all_vector_classes() {
        let converter = ClassConverter::new(vec![ClassGroup::Single("road".to_string())]);
        let mut source = Connector::from_scratch(std::env::temp_dir().join("conv-unused2"), Epsg::new(4326));
        source.attrs_mut().task_vector_classes = vec!["building".to_string()];
        assert!(converter.validate(&source).is_err());
    }

    #[test]
    fn categorical_transform_renames_kept_rows_and_stamps_orig_type() {
        let mut source = Connector::from_scratch(std::env::temp_dir().join("conv-unused3"), Epsg::new(4326));
        let mut attrs = Attributes::new();
        attrs.insert(TYPE_COLUMN.to_string(), Field::String("house".to_string()));
        source
            .add_to_vectors::<MemoryRasterDataset, MemoryRasterDataset>(vec![Row::new("v1", square(0.0, 0.0, 1.0, 1.0), attrs)], Epsg::new(4326), None)
            .unwrap();

        let mut classes_to_keep = HashSet::new();
        classes_to_keep.insert("house".to_string());
        let mut rename = HashMap::new();
        rename.insert("house".to_string(), "building".to_string());

        let rows = transform_categorical(&source, &classes_to_keep, &rename);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].attributes.get(TYPE_COLUMN).and_then(Field::as_str), Some("building"));
        assert_eq!(rows[0].attributes.get(ORIG_TYPE_COLUMN).and_then(Field::as_str), Some("house"));
    }

    #[test]
    fn soft_categorical_transform_drops_zero_rows_and_renormalizes() {
        let mut source = Connector::from_scratch(std::env::temp_dir().join("conv-unused4"), Epsg::new(4326));
        let mut attrs = Attributes::new();
        attrs.insert(probability_column("a"), Field::Float(0.2));
        attrs.insert(probability_column("b"), Field::Float(0.2));
        source
            .add_to_vectors::<MemoryRasterDataset, MemoryRasterDataset>(vec![Row::new("v1", square(0.0, 0.0, 1.0, 1.0), attrs)], Epsg::new(4326), None)
            .unwrap();

        let mut classes_to_keep = HashSet::new();
        classes_to_keep.insert("a".to_string());
        let rename = HashMap::new();
        let group_names = vec!["a".to_string()];

        let rows = transform_soft_categorical(&source, &classes_to_keep, &rename, &group_names);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].attributes.get(&probability_column("a")).and_then(Field::as_f64), Some(1.0));
        assert!(rows[0].attributes.get(&probability_column("b")).is_none());
    }

    #[test]
    fn soft_categorical_tie_break_follows_group_declaration_order_not_alphabetical() {
        let mut source = Connector::from_scratch(std::env::temp_dir().join("conv-unused5"), Epsg::new(4326));
        let mut attrs = Attributes::new();
        attrs.insert(probability_column("zeta"), Field::Float(0.5));
        attrs.insert(probability_column("alpha"), Field::Float(0.5));
        source
            .add_to_vectors::<MemoryRasterDataset, MemoryRasterDataset>(vec![Row::new("v1", square(0.0, 0.0, 1.0, 1.0), attrs)], Epsg::new(4326), None)
            .unwrap();

        let mut classes_to_keep = HashSet::new();
        classes_to_keep.insert("zeta".to_string());
        classes_to_keep.insert("alpha".to_string());
        let rename = HashMap::new();
        // Declared with "zeta" before "alpha": the tie must join in this order, not
        // alphabetically (which would put "alpha" first).
        let group_names = vec!["zeta".to_string(), "alpha".to_string()];

        let rows = transform_soft_categorical(&source, &classes_to_keep, &rename, &group_names);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].attributes.get(MOST_LIKELY_CLASS_COLUMN).and_then(Field::as_str), Some("zeta,alpha"));
    }
}
