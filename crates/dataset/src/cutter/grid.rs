//! Regular non-overlapping tiling (§4.4.1): splits a source raster into
//! `floor(width / cols) x floor(height / rows)` tiles aligned to its top-left corner.

use std::collections::HashMap;
use std::path::Path;

use geo::raster::{RasterDataset, RasterDatasetWriter};
use geo::{Columns, RasterSize, RasterWindow, Rows};
use graph::FeatureName;

use crate::Result;
use crate::connector::Connector;
use crate::cutter::{CutChild, RasterCutter, cut_window};

/// `new_raster_size` is the size (in pixels) of every tile; `bands` maps a raster data
/// directory name (`"rasters"`, `"labels"`, …) to the 1-based band indices to copy.
pub struct GridCutter {
    pub new_raster_size: (Rows, Columns),
    pub bands: Option<HashMap<String, Vec<usize>>>,
}

impl GridCutter {
    pub fn new(new_raster_size: (Rows, Columns)) -> Self {
        GridCutter {
            new_raster_size,
            bands: None,
        }
    }

    pub fn square(size: i32) -> Self {
        GridCutter::new((Rows(size), Columns(size)))
    }
}

fn stem(raster_name: &FeatureName) -> String {
    Path::new(raster_name.as_str())
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| raster_name.to_string())
}

/// Pure windowing math, split out from the I/O-performing [`RasterCutter::cut`] impl so
/// it can be unit tested without a real (or fake) raster file on disk.
pub(crate) fn grid_windows(size: RasterSize, tile_size: (Rows, Columns), raster_name: &FeatureName) -> Vec<(RasterWindow, FeatureName)> {
    let (tile_rows, tile_cols) = tile_size;
    let num_rows = size.rows.count() / tile_rows.count().max(1);
    let num_cols = size.cols.count() / tile_cols.count().max(1);

    if size.rows.count() % tile_rows.count().max(1) != 0 || size.cols.count() % tile_cols.count().max(1) != 0 {
        log::warn!("grid cutter: raster '{raster_name}' size {size} is not evenly divisible by tile size ({tile_rows}, {tile_cols}); trailing pixels are dropped");
    }

    let stem = stem(raster_name);
    let mut windows = Vec::with_capacity((num_rows * num_cols) as usize);
    for row_index in 0..num_rows {
        for col_index in 0..num_cols {
            let window = RasterWindow::new(row_index * tile_rows.count(), col_index * tile_cols.count(), tile_rows, tile_cols);
            windows.push((window, FeatureName::from(format!("{stem}_{row_index}_{col_index}.tif"))));
        }
    }
    windows
}

impl<D, W> RasterCutter<D, W> for GridCutter
where
    D: RasterDataset,
    W: RasterDatasetWriter,
{
    fn cut(&self, raster_name: &FeatureName, _vector_name: Option<&FeatureName>, source: &Connector, _target: &Connector) -> Result<Vec<CutChild>> {
        let source_path = source.rasters_dir().join(raster_name.as_str());
        let dataset = D::open_read_only(&source_path)?;
        let windows = grid_windows(dataset.georeference().raster_size(), self.new_raster_size, raster_name);

        let mut children = Vec::with_capacity(windows.len());
        for (window, new_name) in windows {
            children.push(cut_window::<D, W>(raster_name, window, &new_name, source, self.bands.as_ref())?);
        }
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiles_an_exactly_divisible_raster() {
        let windows = grid_windows(RasterSize::with_rows_cols(Rows(4), Columns(4)), (Rows(2), Columns(2)), &FeatureName::from("scene.tif"));
        assert_eq!(windows.len(), 4);
        let names: Vec<String> = windows.iter().map(|(_, n)| n.to_string()).collect();
        assert!(names.contains(&"scene_0_0.tif".to_string()));
        assert!(names.contains(&"scene_1_1.tif".to_string()));
        let (first_window, _) = &windows[0];
        assert_eq!(first_window.row_offset, 0);
        assert_eq!(first_window.col_offset, 0);
    }

    #[test]
    fn drops_trailing_pixels_when_not_evenly_divisible() {
        let windows = grid_windows(RasterSize::with_rows_cols(Rows(5), Columns(5)), (Rows(2), Columns(2)), &FeatureName::from("scene.tif"));
        assert_eq!(windows.len(), 4);
    }

    #[test]
    fn offsets_advance_by_tile_size() {
        let windows = grid_windows(RasterSize::with_rows_cols(Rows(6), Columns(4)), (Rows(2), Columns(2)), &FeatureName::from("scene.tif"));
        let window_1_0 = windows.iter().find(|(_, n)| n.as_str() == "scene_1_0.tif").unwrap();
        assert_eq!(window_1_0.0.row_offset, 2);
        assert_eq!(window_1_0.0.col_offset, 0);
    }
}
