//! Window placement centered on (or randomized around) a single vector's footprint
//! (§4.4.2). Three modes share the same envelope/grid math and differ only in how the
//! grid's origin is chosen.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use geo::raster::{RasterDataset, RasterDatasetWriter};
use geo::{Columns, RasterSize, RasterWindow, Rows};
use geo_types::Geometry;
use graph::FeatureName;
use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::connector::Connector;
use crate::cutter::{CutChild, RasterCutter, cut_window};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Random,
    Centered,
    Variable,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "random" => Ok(Mode::Random),
            "centered" => Ok(Mode::Centered),
            "variable" => Ok(Mode::Variable),
            other => Err(Error::UnknownMode(other.to_string())),
        }
    }
}

/// Pixel-space envelope `(min_row, max_row, min_col, max_col)` of a (possibly clipped)
/// vector footprint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PixelEnvelope {
    pub min_row: f64,
    pub max_row: f64,
    pub min_col: f64,
    pub max_col: f64,
}

impl PixelEnvelope {
    pub fn centroid_row(&self) -> f64 {
        (self.min_row + self.max_row) / 2.0
    }

    pub fn centroid_col(&self) -> f64 {
        (self.min_col + self.max_col) / 2.0
    }
}

pub struct AroundVectorCutter {
    pub mode: Mode,
    /// Required for `random`/`centered`.
    pub new_raster_size: Option<(Rows, Columns)>,
    /// Required for `variable`.
    pub min_new_raster_size: Option<(Rows, Columns)>,
    /// Required for `variable`.
    pub scaling_factor: Option<f64>,
    pub random_seed: u64,
    pub bands: Option<HashMap<String, Vec<usize>>>,
    /// Seeded once from `random_seed` at construction and never reseeded: successive
    /// `cut()` calls on the same instance keep advancing this state (§9 "Randomness" —
    /// reproducibility requires one cutter instance per logical run).
    rng: RefCell<StdRng>,
}

impl AroundVectorCutter {
    pub fn random(new_raster_size: (Rows, Columns), random_seed: u64) -> Self {
        AroundVectorCutter {
            mode: Mode::Random,
            new_raster_size: Some(new_raster_size),
            min_new_raster_size: None,
            scaling_factor: None,
            random_seed,
            bands: None,
            rng: RefCell::new(StdRng::seed_from_u64(random_seed)),
        }
    }

    pub fn centered(new_raster_size: (Rows, Columns)) -> Self {
        AroundVectorCutter {
            mode: Mode::Centered,
            new_raster_size: Some(new_raster_size),
            min_new_raster_size: None,
            scaling_factor: None,
            random_seed: 0,
            bands: None,
            rng: RefCell::new(StdRng::seed_from_u64(0)),
        }
    }

    pub fn variable(min_new_raster_size: (Rows, Columns), scaling_factor: f64) -> Self {
        AroundVectorCutter {
            mode: Mode::Variable,
            new_raster_size: None,
            min_new_raster_size: Some(min_new_raster_size),
            scaling_factor: Some(scaling_factor),
            random_seed: 0,
            bands: None,
            rng: RefCell::new(StdRng::seed_from_u64(0)),
        }
    }
}

/// §4.4.2 step 3: choose the window size for one cut.
pub(crate) fn window_size(mode: Mode, envelope: PixelEnvelope, new_raster_size: Option<(Rows, Columns)>, min_new_raster_size: Option<(Rows, Columns)>, scaling_factor: Option<f64>) -> Result<(Rows, Columns)> {
    match mode {
        Mode::Random | Mode::Centered => {
            new_raster_size.ok_or_else(|| Error::InvalidArgument("new_raster_size is required for random/centered mode".to_string()))
        }
        Mode::Variable => {
            let min_size = min_new_raster_size.ok_or_else(|| Error::InvalidArgument("min_new_raster_size is required for variable mode".to_string()))?;
            let scale = scaling_factor.ok_or_else(|| Error::InvalidArgument("scaling_factor is required for variable mode".to_string()))?;
            let rows = ((envelope.max_row - envelope.min_row) * scale).ceil().max(min_size.0.count() as f64) as i32;
            let cols = ((envelope.max_col - envelope.min_col) * scale).ceil().max(min_size.1.count() as f64) as i32;
            Ok((Rows(rows.max(1)), Columns(cols.max(1))))
        }
    }
}

/// §4.4.2 step 4: minimal grid covering the envelope with the chosen window size.
pub(crate) fn grid_dims(envelope: PixelEnvelope, window: (Rows, Columns)) -> (i32, i32) {
    let num_rows = ((envelope.max_row - envelope.min_row) / window.0.count() as f64).ceil().max(1.0) as i32;
    let num_cols = ((envelope.max_col - envelope.min_col) / window.1.count() as f64).ceil().max(1.0) as i32;
    (num_rows, num_cols)
}

/// §4.4.2 step 5: the top-left corner (in pixel space) of the placed grid.
pub(crate) fn grid_origin(mode: Mode, envelope: PixelEnvelope, window: (Rows, Columns), grid: (i32, i32), raster_size: RasterSize, rng: &mut StdRng) -> (i32, i32) {
    let (window_rows, window_cols) = window;
    let (num_rows, num_cols) = grid;
    let span_rows = window_rows.count() * num_rows;
    let span_cols = window_cols.count() * num_cols;

    match mode {
        Mode::Random => {
            let row_low = (envelope.max_row as i32 - span_rows).max(0);
            let row_high = (envelope.min_row as i32).min(raster_size.rows.count() - span_rows);
            let col_low = (envelope.max_col as i32 - span_cols).max(0);
            let col_high = (envelope.min_col as i32).min(raster_size.cols.count() - span_cols);

            let row_off = if row_high > row_low { rng.random_range(row_low..=row_high) } else { row_low };
            let col_off = if col_high > col_low { rng.random_range(col_low..=col_high) } else { col_low };
            (row_off, col_off)
        }
        Mode::Centered | Mode::Variable => {
            let row_off = (envelope.centroid_row() - span_rows as f64 / 2.0).round() as i32;
            let col_off = (envelope.centroid_col() - span_cols as f64 / 2.0).round() as i32;
            (row_off, col_off)
        }
    }
}

fn rect_intersects_envelope(row_offset: i32, col_offset: i32, rows: Rows, cols: Columns, envelope: PixelEnvelope) -> bool {
    let row_start = row_offset as f64;
    let row_end = (row_offset + rows.count()) as f64;
    let col_start = col_offset as f64;
    let col_end = (col_offset + cols.count()) as f64;
    row_start < envelope.max_row && row_end > envelope.min_row && col_start < envelope.max_col && col_end > envelope.min_col
}

fn stem(raster_name: &FeatureName) -> String {
    Path::new(raster_name.as_str())
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| raster_name.to_string())
}

/// §4.4.2 steps 2, 6, 7 combined: emit the final `(window, name)` pairs for one source
/// raster/vector pair, given the already-computed pixel envelope.
pub(crate) fn place_windows(cutter: &AroundVectorCutter, raster_name: &FeatureName, vector_name: &FeatureName, envelope: PixelEnvelope, raster_size: RasterSize) -> Result<Vec<(RasterWindow, FeatureName)>> {
    let mut rng = cutter.rng.borrow_mut();
    let window = window_size(cutter.mode, envelope, cutter.new_raster_size, cutter.min_new_raster_size, cutter.scaling_factor)?;
    let grid = grid_dims(envelope, window);
    let (origin_row, origin_col) = grid_origin(cutter.mode, envelope, window, grid, raster_size, &mut *rng);

    let stem = stem(raster_name);
    let (num_rows, num_cols) = grid;
    let mut windows = Vec::new();
    for row_idx in 0..num_rows {
        for col_idx in 0..num_cols {
            let row_offset = origin_row + row_idx * window.0.count();
            let col_offset = origin_col + col_idx * window.1.count();
            if !rect_intersects_envelope(row_offset, col_offset, window.0, window.1, envelope) {
                continue;
            }
            let name = if num_rows == 1 && num_cols == 1 {
                FeatureName::from(format!("{stem}_{vector_name}.tif"))
            } else {
                FeatureName::from(format!("{stem}_{vector_name}_{row_idx}_{col_idx}.tif"))
            };
            windows.push((RasterWindow::new(row_offset, col_offset, window.0, window.1), name));
        }
    }
    Ok(windows)
}

/// §4.4.2 step 1-2: reproject the vector into the raster's native CRS, clip it to the
/// raster footprint if necessary, and convert its bounds to a pixel-space envelope.
fn vector_pixel_envelope(georeference: &geo::GeoReference, vector_geom_in_raster_crs: &Geometry<f64>) -> Result<PixelEnvelope> {
    let footprint: Geometry<f64> = Geometry::Polygon(georeference.bounding_rect().into());
    let clipped = if geo::vector::geom::contains(&footprint, vector_geom_in_raster_crs)? {
        vector_geom_in_raster_crs.clone()
    } else {
        geo::vector::geom::intersection(&footprint, vector_geom_in_raster_crs)?
    };

    let (min_x, min_y, max_x, max_y) = geo::vector::geom::bounding_box(&clipped)
        .ok_or_else(|| Error::InvalidArgument("vector footprint does not intersect raster bounds".to_string()))?;

    let inverse = georeference.geo_transform().invert()?;
    let corners = [
        inverse.apply(min_x, min_y),
        inverse.apply(min_x, max_y),
        inverse.apply(max_x, min_y),
        inverse.apply(max_x, max_y),
    ];
    let min_row = corners.iter().map(|p| p.y()).fold(f64::INFINITY, f64::min);
    let max_row = corners.iter().map(|p| p.y()).fold(f64::NEG_INFINITY, f64::max);
    let min_col = corners.iter().map(|p| p.x()).fold(f64::INFINITY, f64::min);
    let max_col = corners.iter().map(|p| p.x()).fold(f64::NEG_INFINITY, f64::max);

    Ok(PixelEnvelope { min_row, max_row, min_col, max_col })
}

impl<D, W> RasterCutter<D, W> for AroundVectorCutter
where
    D: RasterDataset,
    W: RasterDatasetWriter,
{
    fn cut(&self, raster_name: &FeatureName, vector_name: Option<&FeatureName>, source: &Connector, _target: &Connector) -> Result<Vec<CutChild>> {
        let vector_name = vector_name.ok_or_else(|| Error::InvalidArgument("around-vector cutter requires a vector name".to_string()))?;
        let vector_geom = source
            .vector_geometry(vector_name)
            .ok_or_else(|| Error::UnknownKey(vector_name.clone()))?;

        let source_path = source.rasters_dir().join(raster_name.as_str());
        let dataset = D::open_read_only(&source_path)?;
        let georeference = dataset.georeference();

        let orig_epsg = geo::crs::projection_to_epsg(georeference.projection())
            .ok_or_else(|| Error::InvalidArgument(format!("cannot resolve EPSG code for raster '{raster_name}' projection")))?;
        let vector_in_raster_crs = geo::crs::reproject_geometry(&vector_geom, source.crs_epsg(), orig_epsg)?;

        let envelope = vector_pixel_envelope(georeference, &vector_in_raster_crs)?;
        let windows = place_windows(self, raster_name, vector_name, envelope, georeference.raster_size())?;

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

    fn envelope(min_row: f64, max_row: f64, min_col: f64, max_col: f64) -> PixelEnvelope {
        PixelEnvelope { min_row, max_row, min_col, max_col }
    }

    #[test]
    fn mode_parses_from_str() {
        assert_eq!(Mode::from_str("random").unwrap(), Mode::Random);
        assert_eq!(Mode::from_str("centered").unwrap(), Mode::Centered);
        assert_eq!(Mode::from_str("variable").unwrap(), Mode::Variable);
        assert!(Mode::from_str("bogus").is_err());
    }

    #[test]
    fn variable_window_size_scales_with_envelope_and_respects_floor() {
        let env = envelope(0.0, 10.0, 0.0, 2.0);
        let size = window_size(Mode::Variable, env, None, Some((Rows(8), Columns(8))), Some(2.0)).unwrap();
        assert_eq!(size.0, Rows(20));
        assert_eq!(size.1, Columns(8));
    }

    #[test]
    fn random_mode_requires_new_raster_size() {
        let env = envelope(0.0, 10.0, 0.0, 10.0);
        assert!(window_size(Mode::Random, env, None, None, None).is_err());
    }

    #[test]
    fn grid_dims_covers_envelope_exactly_when_divisible() {
        let env = envelope(0.0, 20.0, 0.0, 10.0);
        assert_eq!(grid_dims(env, (Rows(10), Columns(10))), (2, 1));
    }

    #[test]
    fn centered_origin_centers_grid_on_envelope_centroid() {
        let env = envelope(10.0, 20.0, 10.0, 20.0);
        let mut rng = StdRng::seed_from_u64(0);
        let (row, col) = grid_origin(Mode::Centered, env, (Rows(10), Columns(10)), (1, 1), RasterSize::with_rows_cols(Rows(100), Columns(100)), &mut rng);
        assert_eq!(row, 10);
        assert_eq!(col, 10);
    }

    #[test]
    fn random_origin_stays_within_computed_bounds() {
        let env = envelope(40.0, 45.0, 40.0, 45.0);
        let size = RasterSize::with_rows_cols(Rows(100), Columns(100));
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (row, col) = grid_origin(Mode::Random, env, (Rows(10), Columns(10)), (1, 1), size, &mut rng);
            assert!(row <= 40 && row + 10 >= 45);
            assert!(col <= 40 && col + 10 >= 45);
        }
    }

    #[test]
    fn random_mode_keeps_advancing_rng_across_calls_on_the_same_instance() {
        let env = envelope(40.0, 45.0, 40.0, 45.0);
        let size = RasterSize::with_rows_cols(Rows(100), Columns(100));
        let cutter = AroundVectorCutter::random((Rows(10), Columns(10)), 42);
        let mut origins = Vec::new();
        for i in 0..5 {
            let windows = place_windows(&cutter, &FeatureName::from("scene.tif"), &FeatureName::from(format!("v{i}")), env, size).unwrap();
            let (row_offset, col_offset) = (windows[0].0.row_offset, windows[0].0.col_offset);
            origins.push((row_offset, col_offset));
        }
        assert!(origins.windows(2).any(|pair| pair[0] != pair[1]), "successive calls on one cutter instance must not keep reseeding the same RNG state: {origins:?}");
    }

    #[test]
    fn single_cell_grid_names_without_row_col_suffix() {
        let env = envelope(0.0, 5.0, 0.0, 5.0);
        let cutter = AroundVectorCutter::centered((Rows(10), Columns(10)));
        let windows = place_windows(&cutter, &FeatureName::from("scene.tif"), &FeatureName::from("v1"), env, RasterSize::with_rows_cols(Rows(100), Columns(100))).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].1.as_str(), "scene_v1.tif");
    }
}
