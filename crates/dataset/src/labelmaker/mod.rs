//! Label maker interface (C7): turns the vectors intersecting a raster into a pixel
//! label plane for that raster, parameterized by the raster codec (`D`/`W`) so the trait
//! stays usable with both the GDAL-backed codec and the in-memory test double.

pub mod categorical;
pub mod soft_categorical;

use geo::raster::{RasterDataset, RasterDatasetWriter};
use graph::FeatureName;

use crate::connector::Connector;
use crate::Result;

/// Abstract label-writing strategy. `raster_names = None` means "every raster without an
/// existing label"; a writer must set `connector.attrs().label_type` to its own
/// [`LabelMaker::label_type`] after a successful [`LabelMaker::make_labels`] (§4.6).
pub trait LabelMaker<D, W>
where
    D: RasterDataset,
    W: RasterDatasetWriter,
{
    fn label_type(&self) -> &str;

    fn make_labels(&self, connector: &mut Connector, raster_names: Option<&[FeatureName]>) -> Result<()>;

    fn delete_labels(&self, connector: &mut Connector, raster_names: Option<&[FeatureName]>) -> Result<()>;

    /// `delete ∘ make`, the standard way drivers keep labels in sync after a vector add/drop.
    fn recompute_labels(&self, connector: &mut Connector, raster_names: &[FeatureName]) -> Result<()> {
        if raster_names.is_empty() {
            return Ok(());
        }
        self.delete_labels(connector, Some(raster_names))?;
        self.make_labels(connector, Some(raster_names))
    }
}

/// Every raster lacking a same-named file under `connector.labels_dir()` — the default
/// target set for `make_labels(connector, None)`.
pub(crate) fn rasters_without_labels(connector: &Connector) -> Vec<FeatureName> {
    let labels_dir = connector.labels_dir();
    connector
        .rasters()
        .names()
        .filter(|name| !labels_dir.join(name.as_str()).exists())
        .cloned()
        .collect()
}

pub(crate) fn resolve_targets(connector: &Connector, raster_names: Option<&[FeatureName]>) -> Vec<FeatureName> {
    match raster_names {
        Some(names) => names.to_vec(),
        None => rasters_without_labels(connector),
    }
}
