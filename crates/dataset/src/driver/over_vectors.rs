//! Iterate-over-vectors driver (§4.5.2): for each target vector, selects candidate
//! source rasters that contain it and haven't been cut for it yet, cuts them, and
//! records the result so later runs don't reselect an already-cut raster.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use geo::raster::{RasterDataset, RasterDatasetWriter};
use graph::FeatureName;

use crate::connector::Connector;
use crate::cutter::RasterCutter;
use crate::driver::children_to_rows;
use crate::driver::over_rasters::{merge_missing_vectors, rasters_pre_existing_and_newly_intersecting};
use crate::driver::predicate::VectorFilterPredicate;
use crate::driver::selector::RasterSelector;
use crate::labelmaker::LabelMaker;
use crate::table::Row;
use crate::{Error, Result};

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct State {
    cut_rasters: HashMap<FeatureName, Vec<FeatureName>>,
}

/// Persistent state is `cut_rasters`, a per-vector list of source rasters already cut
/// for it (§4.5.2, OQ-3 — a `Map` shape, unlike the raster driver's `Set`).
pub struct VectorIterationDriver<C> {
    pub driver_name: String,
    pub raster_cutter: C,
    pub raster_selector: RasterSelector,
    pub vector_filter_predicate: VectorFilterPredicate,
    cut_rasters: HashMap<FeatureName, Vec<FeatureName>>,
    call_counter: u64,
}

impl<C> VectorIterationDriver<C> {
    pub fn new(driver_name: impl Into<String>, raster_cutter: C, raster_selector: RasterSelector, vector_filter_predicate: VectorFilterPredicate) -> Self {
        VectorIterationDriver {
            driver_name: driver_name.into(),
            raster_cutter,
            raster_selector,
            vector_filter_predicate,
            cut_rasters: HashMap::new(),
            call_counter: 0,
        }
    }

    pub fn cut_rasters(&self) -> &HashMap<FeatureName, Vec<FeatureName>> {
        &self.cut_rasters
    }

    fn state_path(connector_dir: &Path, driver_name: &str) -> PathBuf {
        connector_dir.join(format!("{driver_name}.json"))
    }

    pub fn load_state(&mut self, connector_dir: &Path) -> Result<()> {
        let path = Self::state_path(connector_dir, &self.driver_name);
        if !path.exists() {
            return Ok(());
        }
        let contents = std::fs::read_to_string(&path)?;
        let state: State = serde_json::from_str(&contents).map_err(Error::Json)?;
        self.cut_rasters = state.cut_rasters;
        Ok(())
    }

    pub fn save_state(&self, connector_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(connector_dir)?;
        let path = Self::state_path(connector_dir, &self.driver_name);
        let state = State { cut_rasters: self.cut_rasters.clone() };
        std::fs::write(path, serde_json::to_string_pretty(&state).map_err(Error::Json)?)?;
        Ok(())
    }

    /// §4.5.2 steps 1-4. Returns the names of the child rasters appended to `target`.
    pub fn run<D, W>(&mut self, source: &Connector, target: &mut Connector, label_maker: Option<&dyn LabelMaker<D, W>>) -> Result<Vec<FeatureName>>
    where
        D: RasterDataset,
        W: RasterDatasetWriter,
        C: RasterCutter<D, W>,
    {
        if source.crs_epsg() != target.crs_epsg() {
            return Err(Error::CrsMismatch {
                source: source.crs_epsg().code(),
                target: target.crs_epsg().code(),
            });
        }

        let rasters_in_target_before: HashSet<FeatureName> = target.rasters().names().cloned().collect();
        let added_vectors = merge_missing_vectors::<D, W>(source, target)?;

        let target_vectors: Vec<FeatureName> = target.vectors().names().cloned().collect();
        let mut pending = Vec::new();
        for v in &target_vectors {
            if !self.vector_filter_predicate.test(v, source, target) {
                continue;
            }

            let already_cut: HashSet<FeatureName> = self.cut_rasters.get(v).cloned().unwrap_or_default().into_iter().collect();
            let candidates: Vec<FeatureName> = source
                .rasters_containing_vector(v)?
                .into_iter()
                .filter(|r| !already_cut.contains(r))
                .collect();
            let already_have_count = target.rasters_containing_vector(v)?.len() as i64 + already_cut.len() as i64;

            self.call_counter += 1;
            let chosen = self.raster_selector.select(already_have_count, &candidates, self.call_counter);

            for r in chosen {
                let children = self.raster_cutter.cut(&r, Some(v), source, target)?;
                let mut r_covers_v = false;
                for child in &children {
                    target.add_raster_to_graph(&child.name, &child.geometry)?;
                    for w in target.vectors_contained_in_raster(&child.name)? {
                        if &w == v {
                            r_covers_v = true;
                        }
                        self.cut_rasters.entry(w).or_default().push(r.clone());
                    }
                }
                if !r_covers_v {
                    self.cut_rasters.entry(v.clone()).or_default().push(r.clone());
                }
                pending.extend(children);
            }
        }

        let mut appended = Vec::with_capacity(pending.len());
        for child in &pending {
            appended.push(child.name.clone());
        }
        let rows: Vec<Row> = children_to_rows(pending);
        target.rasters_mut().append(rows);

        if let Some(label_maker) = label_maker
            && !added_vectors.is_empty()
        {
            let affected = rasters_pre_existing_and_newly_intersecting(target, &added_vectors, &rasters_in_target_before)?;
            label_maker.recompute_labels(target, &affected)?;
        }

        for names in self.cut_rasters.values_mut() {
            names.sort();
            names.dedup();
        }

        Ok(appended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cutter::around_vector::AroundVectorCutter;
    use geo::raster::MemoryRasterDataset;
    use geo::vector::schema::Attributes;
    use geo::{Columns, Epsg, Rows};
    use geo_types::{Geometry, LineString, Polygon};

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
        Geometry::Polygon(Polygon::new(
            LineString::from(vec![(x0, y0), (x0, y1), (x1, y1), (x1, y0), (x0, y0)]),
            vec![],
        ))
    }

    #[test]
    fn refuses_to_run_across_mismatched_crs() {
        let source = Connector::from_scratch(std::env::temp_dir().join("vdriver-src-unused"), Epsg::new(4326));
        let mut target = Connector::from_scratch(std::env::temp_dir().join("vdriver-tgt-unused"), Epsg::new(31370));
        let mut driver = VectorIterationDriver::new(
            "vectors",
            AroundVectorCutter::centered((Rows(8), Columns(8))),
            RasterSelector::Random { target_raster_count: 1, seed: 0 },
            VectorFilterPredicate::AlwaysTrue,
        );
        let result = driver.run::<MemoryRasterDataset, MemoryRasterDataset>(&source, &mut target, None);
        assert!(matches!(result, Err(Error::CrsMismatch { .. })));
    }

    #[test]
    fn skips_vectors_the_predicate_rejects() {
        let mut source = Connector::from_scratch(std::env::temp_dir().join("vdriver-src-skip"), Epsg::new(4326));
        source
            .add_to_vectors::<MemoryRasterDataset, MemoryRasterDataset>(vec![Row::new("p1", square(0.0, 0.0, 1.0, 1.0), Attributes::new())], Epsg::new(4326), None)
            .unwrap();
        let mut target = Connector::from_scratch(std::env::temp_dir().join("vdriver-tgt-skip"), Epsg::new(4326));
        let mut driver = VectorIterationDriver::new(
            "vectors",
            AroundVectorCutter::centered((Rows(8), Columns(8))),
            RasterSelector::Random { target_raster_count: 1, seed: 0 },
            VectorFilterPredicate::OnlyThisVector(FeatureName::from("nonexistent")),
        );
        let appended = driver.run::<MemoryRasterDataset, MemoryRasterDataset>(&source, &mut target, None).unwrap();
        assert!(appended.is_empty());
        assert!(target.vectors().contains(&FeatureName::from("p1")));
    }
}
