//! Dataset-derivation drivers (C6): orchestrate a single-raster cutter (C5) across a
//! whole source connector, appending the produced children to a target connector and
//! keeping its graph/labels in sync. Two instantiations share the row/graph bookkeeping
//! in this module and differ only in what they iterate over (§4.5).

pub mod over_rasters;
pub mod over_vectors;
pub mod predicate;
pub mod selector;

use geo::vector::schema::{Attributes, Field};

use crate::connector::ORIG_CRS_EPSG_FIELD;
use crate::cutter::CutChild;
use crate::table::Row;

pub use over_rasters::RasterIterationDriver;
pub use over_vectors::VectorIterationDriver;

/// Turns cutter output into append-ready rows, stamping each with the `orig_crs_epsg_code`
/// column every target rasters table carries (§6 "Table schemas on disk").
pub(crate) fn children_to_rows(children: Vec<CutChild>) -> Vec<Row> {
    children
        .into_iter()
        .map(|child| {
            let mut attrs = Attributes::new();
            attrs.insert(ORIG_CRS_EPSG_FIELD.to_string(), Field::Integer(child.orig_crs_epsg.code() as i64));
            Row::new(child.name, child.geometry, attrs)
        })
        .collect()
}
