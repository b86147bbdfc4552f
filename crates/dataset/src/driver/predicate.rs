//! Filter predicates composed freely by the two dataset-derivation drivers (§4.5).
//! Modeled as tagged enums rather than trait objects so driver state round-trips
//! through `serde` with its default externally-tagged representation.

use std::collections::{HashMap, HashSet};

use geo::vector::schema::Field;
use graph::FeatureName;

use crate::connector::Connector;

/// Which table a [`VectorFilterPredicate::RowCondition`] reads its column from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TableSide {
    Source,
    Target,
}

/// Gate on which source rasters the iterate-over-rasters driver bothers to cut.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum RasterFilterPredicate {
    AlwaysTrue,
    /// True iff `raster_name` is not already a member of the driver's `cut_rasters` set.
    RastersNotPreviouslyCutOnly,
}

impl RasterFilterPredicate {
    pub fn test(&self, raster_name: &FeatureName, cut_rasters: &HashSet<FeatureName>) -> bool {
        match self {
            RasterFilterPredicate::AlwaysTrue => true,
            RasterFilterPredicate::RastersNotPreviouslyCutOnly => !cut_rasters.contains(raster_name),
        }
    }
}

/// Gate on which target vectors the iterate-over-vectors driver visits.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum VectorFilterPredicate {
    AlwaysTrue,
    /// True iff `target.vectors[v].raster_count < target_raster_count`.
    IsVectorMissingRasters { target_raster_count: i64 },
    OnlyThisVector(FeatureName),
    RowCondition { column: String, equals: Field, side: TableSide },
}

impl VectorFilterPredicate {
    pub fn test(&self, vector_name: &FeatureName, source: &Connector, target: &Connector) -> bool {
        match self {
            VectorFilterPredicate::AlwaysTrue => true,
            VectorFilterPredicate::IsVectorMissingRasters { target_raster_count } => {
                let raster_count_col = &target.attrs().raster_count_col_name;
                target
                    .vectors()
                    .get(vector_name)
                    .and_then(|row| row.attributes.get(raster_count_col))
                    .and_then(Field::as_i64)
                    .map(|count| count < *target_raster_count)
                    .unwrap_or(true)
            }
            VectorFilterPredicate::OnlyThisVector(name) => vector_name == name,
            VectorFilterPredicate::RowCondition { column, equals, side } => {
                let table = match side {
                    TableSide::Source => source.vectors(),
                    TableSide::Target => target.vectors(),
                };
                table.get(vector_name).and_then(|row| row.attributes.get(column)) == Some(equals)
            }
        }
    }
}

/// Per-vector history the iterate-over-vectors driver checks candidates against; kept
/// here (rather than on [`VectorFilterPredicate`]) since predicates only ever read it.
pub type CutRastersByVector = HashMap<FeatureName, Vec<FeatureName>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Row;
    use geo::Epsg;
    use geo::vector::schema::Attributes;
    use geo_types::{Geometry, LineString, Polygon};

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
        Geometry::Polygon(Polygon::new(
            LineString::from(vec![(x0, y0), (x0, y1), (x1, y1), (x1, y0), (x0, y0)]),
            vec![],
        ))
    }

    #[test]
    fn rasters_not_previously_cut_only_excludes_seen_names() {
        let mut cut = HashSet::new();
        cut.insert(FeatureName::from("r1"));
        let pred = RasterFilterPredicate::RastersNotPreviouslyCutOnly;
        assert!(!pred.test(&FeatureName::from("r1"), &cut));
        assert!(pred.test(&FeatureName::from("r2"), &cut));
    }

    #[test]
    fn is_vector_missing_rasters_compares_against_raster_count() {
        let mut target = Connector::from_scratch(std::env::temp_dir().join("pred-unused"), Epsg::new(4326));
        target
            .add_to_vectors::<geo::raster::MemoryRasterDataset, geo::raster::MemoryRasterDataset>(
                vec![Row::new("v1", square(0.0, 0.0, 1.0, 1.0), Attributes::new())],
                Epsg::new(4326),
                None,
            )
            .unwrap();
        let source = Connector::from_scratch(std::env::temp_dir().join("pred-unused-src"), Epsg::new(4326));

        let pred = VectorFilterPredicate::IsVectorMissingRasters { target_raster_count: 1 };
        assert!(pred.test(&FeatureName::from("v1"), &source, &target));
    }

    #[test]
    fn only_this_vector_matches_exactly_one_name() {
        let pred = VectorFilterPredicate::OnlyThisVector(FeatureName::from("v1"));
        let source = Connector::from_scratch(std::env::temp_dir().join("pred-unused-src2"), Epsg::new(4326));
        let target = Connector::from_scratch(std::env::temp_dir().join("pred-unused-tgt2"), Epsg::new(4326));
        assert!(pred.test(&FeatureName::from("v1"), &source, &target));
        assert!(!pred.test(&FeatureName::from("v2"), &source, &target));
    }
}
