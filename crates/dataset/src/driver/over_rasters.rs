//! Iterate-over-rasters driver (§4.5.1): cuts every source raster a filter predicate
//! admits, appending children to a target connector and replaying label recompute for
//! whatever pre-existing target raster now intersects a newly merged source vector.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use geo::raster::{RasterDataset, RasterDatasetWriter};
use graph::FeatureName;

use crate::connector::Connector;
use crate::cutter::RasterCutter;
use crate::driver::children_to_rows;
use crate::driver::predicate::RasterFilterPredicate;
use crate::labelmaker::LabelMaker;
use crate::table::Row;
use crate::{Error, Result};

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct State {
    cut_rasters: HashSet<FeatureName>,
}

/// Persistent state is `cut_rasters`, the set of source rasters already processed
/// (§4.5.1, OQ-3). `raster_cutter`/`raster_filter_predicate` are the driver's runtime
/// configuration and are reconstructed by the caller, not round-tripped through JSON.
pub struct RasterIterationDriver<C> {
    pub driver_name: String,
    pub raster_cutter: C,
    pub raster_filter_predicate: RasterFilterPredicate,
    cut_rasters: HashSet<FeatureName>,
}

impl<C> RasterIterationDriver<C> {
    pub fn new(driver_name: impl Into<String>, raster_cutter: C, raster_filter_predicate: RasterFilterPredicate) -> Self {
        RasterIterationDriver {
            driver_name: driver_name.into(),
            raster_cutter,
            raster_filter_predicate,
            cut_rasters: HashSet::new(),
        }
    }

    pub fn cut_rasters(&self) -> &HashSet<FeatureName> {
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

    /// §4.5.1 steps 2-7 (state save is left to the caller, who also owns `save()` on the
    /// target connector — see §5 "atomic at the granularity of a single `cut()` call").
    /// Returns the names of the child rasters appended to `target`.
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

        let source_rasters: Vec<FeatureName> = source.rasters().names().cloned().collect();
        let mut pending = Vec::new();
        for raster_name in &source_rasters {
            if !self.raster_filter_predicate.test(raster_name, &self.cut_rasters) {
                continue;
            }
            let children = self.raster_cutter.cut(raster_name, None, source, target)?;
            pending.extend(children);
            self.cut_rasters.insert(raster_name.clone());
        }

        let mut appended = Vec::with_capacity(pending.len());
        for child in &pending {
            target.add_raster_to_graph(&child.name, &child.geometry)?;
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

        Ok(appended)
    }
}

pub(crate) fn merge_missing_vectors<D, W>(source: &Connector, target: &mut Connector) -> Result<Vec<FeatureName>>
where
    D: RasterDataset,
    W: RasterDatasetWriter,
{
    let missing: Vec<Row> = source.vectors().rows().filter(|row| target.vectors().get(&row.name).is_none()).cloned().collect();
    if missing.is_empty() {
        return Ok(Vec::new());
    }
    target.add_to_vectors::<D, W>(missing, source.crs_epsg(), None)
}

pub(crate) fn rasters_pre_existing_and_newly_intersecting(target: &Connector, added_vectors: &[FeatureName], pre_existing: &HashSet<FeatureName>) -> Result<Vec<FeatureName>> {
    let mut affected = HashSet::new();
    for v in added_vectors {
        for r in target.rasters_intersecting_vector(v)? {
            if pre_existing.contains(&r) {
                affected.insert(r);
            }
        }
    }
    Ok(affected.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cutter::grid::GridCutter;
    use geo::raster::MemoryRasterDataset;
    use geo::vector::schema::Attributes;
    use geo::Epsg;
    use geo_types::{Geometry, LineString, Polygon};

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
        Geometry::Polygon(Polygon::new(
            LineString::from(vec![(x0, y0), (x0, y1), (x1, y1), (x1, y0), (x0, y0)]),
            vec![],
        ))
    }

    #[test]
    fn refuses_to_run_across_mismatched_crs() {
        let source = Connector::from_scratch(std::env::temp_dir().join("driver-src-unused"), Epsg::new(4326));
        let mut target = Connector::from_scratch(std::env::temp_dir().join("driver-tgt-unused"), Epsg::new(31370));
        let mut driver = RasterIterationDriver::new("rasters", GridCutter::square(10), RasterFilterPredicate::AlwaysTrue);
        let result = driver.run::<MemoryRasterDataset, MemoryRasterDataset>(&source, &mut target, None);
        assert!(matches!(result, Err(Error::CrsMismatch { .. })));
    }

    #[test]
    fn merges_source_vectors_missing_from_target() {
        let mut source = Connector::from_scratch(std::env::temp_dir().join("driver-src-merge"), Epsg::new(4326));
        source
            .add_to_vectors::<MemoryRasterDataset, MemoryRasterDataset>(vec![Row::new("p1", square(0.0, 0.0, 1.0, 1.0), Attributes::new())], Epsg::new(4326), None)
            .unwrap();
        let mut target = Connector::from_scratch(std::env::temp_dir().join("driver-tgt-merge"), Epsg::new(4326));

        let added = merge_missing_vectors::<MemoryRasterDataset, MemoryRasterDataset>(&source, &mut target).unwrap();
        assert_eq!(added, vec![FeatureName::from("p1")]);
        assert!(target.vectors().contains(&FeatureName::from("p1")));
    }
}
