//! Single-raster cutter contract (C5): slices one source raster into child rasters,
//! mirroring the cut across every parallel raster data directory (`rasters`, `labels`,
//! …) the connector tracks. [`grid`] and [`around_vector`] provide the two concrete
//! window-placement algorithms; this module holds the materialization logic they share.

pub mod around_vector;
pub mod grid;

use std::collections::HashMap;
use std::path::Path;

use geo::raster::{RasterDataset, RasterDatasetWriter};
use geo::{Epsg, GeoReference, GeoTransform, Rect, RasterWindow};
use geo_types::Geometry;
use graph::FeatureName;

use crate::connector::Connector;
use crate::{Error, Result};

/// One child raster produced by a cut, ready to be appended to the target rasters table.
#[derive(Debug, Clone)]
pub struct CutChild {
    pub name: FeatureName,
    pub geometry: Geometry<f64>,
    pub orig_crs_epsg: Epsg,
}

/// Shared contract for the two cutter variants. `vector_name` is `None` for the grid
/// cutter and `Some` for the around-vector cutter, which needs to know which vector's
/// footprint to center/clip windows against.
pub trait RasterCutter<D, W>
where
    D: RasterDataset,
    W: RasterDatasetWriter,
{
    fn cut(&self, raster_name: &FeatureName, vector_name: Option<&FeatureName>, source: &Connector, target: &Connector) -> Result<Vec<CutChild>>;
}

fn child_file_name(dir: &Path, name: &FeatureName) -> std::path::PathBuf {
    dir.join(name.as_str())
}

fn sub_georeference(georeference: &GeoReference, window: RasterWindow) -> GeoReference {
    let transform = georeference.geo_transform();
    let top_left = transform.apply(window.col_offset as f64, window.row_offset as f64);
    let new_transform = GeoTransform::new([
        top_left.x(),
        transform.cell_size_x(),
        0.0,
        top_left.y(),
        0.0,
        transform.cell_size_y(),
    ]);
    GeoReference::with_transform(georeference.projection().to_string(), window.size(), new_transform, georeference.nodata())
}

/// Materializes one `(window, new_name)` triple across every one of the connector's
/// `raster_data_dirs`, per §4.4: the rasters directory must exist, later directories
/// (labels, …) are skipped silently if the source file is absent there.
///
/// Returns the child's footprint reprojected into the connector's CRS plus the EPSG code
/// of the raster's own (original) CRS.
pub(crate) fn cut_window<D, W>(
    raster_name: &FeatureName,
    window: RasterWindow,
    new_name: &FeatureName,
    connector: &Connector,
    bands: Option<&HashMap<String, Vec<usize>>>,
) -> Result<CutChild>
where
    D: RasterDataset,
    W: RasterDatasetWriter,
{
    let dirs = connector.raster_data_dirs();
    let mut reference_footprint: Option<Rect<f64>> = None;
    let mut orig_epsg: Option<Epsg> = None;

    for (index, (dir_name, dir_path)) in dirs.iter().enumerate() {
        let source_path = dir_path.join(raster_name.as_str());
        if !source_path.exists() {
            if index == 0 {
                return Err(Error::InvalidArgument(format!("source raster '{raster_name}' missing from '{dir_name}'")));
            }
            continue;
        }

        let dataset = D::open_read_only(&source_path)?;
        let georeference = dataset.georeference();
        let child_georeference = sub_georeference(georeference, window);
        let footprint = child_georeference.bounding_rect();

        match &reference_footprint {
            None => reference_footprint = Some(footprint),
            Some(reference) => {
                if !rects_agree(reference, &footprint) {
                    return Err(Error::InconsistentCutParallelDirs(new_name.to_string()));
                }
            }
        }

        let epsg = geo::crs::projection_to_epsg(georeference.projection()).ok_or_else(|| {
            Error::InvalidArgument(format!("cannot resolve EPSG code for raster '{raster_name}' projection"))
        })?;
        match orig_epsg {
            None => orig_epsg = Some(epsg),
            Some(existing) if existing != epsg => return Err(Error::InconsistentCutParallelDirs(new_name.to_string())),
            _ => {}
        }

        let band_count = dataset.band_count();
        let selected_bands: Vec<usize> = match bands.and_then(|b| b.get(*dir_name)) {
            Some(selected) => selected.clone(),
            None => (1..=band_count).collect(),
        };

        let mut writer = W::create(child_file_name(dir_path, new_name), &child_georeference, selected_bands.len(), dataset.data_type(1)?)?;
        let destination_window = RasterWindow::new(0, 0, window.rows, window.cols);
        for (dest_band, source_band) in selected_bands.into_iter().enumerate() {
            let data = dataset.read_window(source_band, window)?;
            writer.write_window(dest_band + 1, destination_window, &data)?;
        }
    }

    let footprint = reference_footprint.ok_or_else(|| Error::InvalidArgument(format!("no data produced while cutting '{raster_name}'")))?;
    let orig_epsg = orig_epsg.ok_or_else(|| Error::InvalidArgument(format!("no data produced while cutting '{raster_name}'")))?;

    let geometry = Geometry::Polygon(footprint.into());
    let geometry = geo::crs::reproject_geometry(&geometry, orig_epsg, connector.crs_epsg())?;

    Ok(CutChild {
        name: new_name.clone(),
        geometry,
        orig_crs_epsg: orig_epsg,
    })
}

fn rects_agree(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    const EPS: f64 = 1e-6;
    (a.top_left().x() - b.top_left().x()).abs() < EPS
        && (a.top_left().y() - b.top_left().y()).abs() < EPS
        && (a.bottom_right().x() - b.bottom_right().x()).abs() < EPS
        && (a.bottom_right().y() - b.bottom_right().y()).abs() < EPS
}
