//! Subcommand implementations. One function per `dscli` verb, each a thin wrapper around
//! the `dataset` crate's public API — this binary owns argv parsing and progress bars only,
//! never dataset semantics (§6 "No CLI and no environment variables are part of the core").

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use dataset::connector::Connector;
use dataset::converter::{ClassConverter, ClassGroup};
use dataset::cutter::around_vector::{AroundVectorCutter, Mode};
use dataset::cutter::grid::GridCutter;
use dataset::driver::predicate::{RasterFilterPredicate, VectorFilterPredicate};
use dataset::driver::selector::RasterSelector;
use dataset::driver::{RasterIterationDriver, VectorIterationDriver};
use dataset::labelmaker::LabelMaker;
use dataset::labelmaker::categorical::CategoricalLabelMaker;
use dataset::labelmaker::soft_categorical::SoftCategoricalLabelMaker;
use dataset::Row;
use geo::raster::{GdalRasterDataset, GdalRasterDatasetWriter};
use geo::vector::schema::Field;
use geo::{Columns, Epsg, Rows};
use graph::FeatureName;
use indicatif::{ProgressBar, ProgressStyle};

/// Loads a GeoJSON FeatureCollection into append-ready [`Row`]s, pulling each row's key
/// out of `name_field` and dropping it from the carried attributes (the connector re-adds
/// it under the table's own index field name on save).
fn rows_from_geojson(path: &Path, name_field: &str) -> Result<Vec<Row>> {
    let (_, features) = geo::vector::geojson::read(path).with_context(|| format!("reading {}", path.display()))?;
    features
        .into_iter()
        .map(|mut feature| {
            let name = feature
                .attributes
                .remove(name_field)
                .and_then(|f| f.as_str().map(str::to_string))
                .ok_or_else(|| anyhow!("feature missing '{name_field}' property"))?;
            Ok(Row::new(name, feature.geometry, feature.attributes))
        })
        .collect()
}

fn progress_bar(len: u64, message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len}") {
        bar.set_style(style.progress_chars("##-"));
    }
    bar.set_message(message);
    bar
}

pub fn init(data_dir: PathBuf, epsg: i32) -> Result<()> {
    let connector = Connector::from_scratch(data_dir, Epsg::new(epsg));
    connector.save()?;
    log::info!("initialized empty connector at '{}'", connector.data_dir().display());
    Ok(())
}

pub fn info(data_dir: PathBuf) -> Result<()> {
    let connector = Connector::from_data_dir(data_dir)?;
    println!("data_dir:        {}", connector.data_dir().display());
    println!("crs:             {}", connector.crs_epsg());
    println!("rasters:         {}", connector.rasters().len());
    println!("vectors:         {}", connector.vectors().len());
    println!("task classes:    {:?}", connector.attrs().task_vector_classes);
    println!("background:      {:?}", connector.attrs().background_class);
    println!("label_type:      {:?}", connector.attrs().label_type);
    Ok(())
}

pub fn add_vectors(data_dir: PathBuf, input: PathBuf, epsg: i32, name_field: String) -> Result<()> {
    let mut connector = Connector::from_data_dir(&data_dir)?;
    let rows = rows_from_geojson(&input, &name_field)?;
    let added = connector.add_to_vectors::<GdalRasterDataset, GdalRasterDatasetWriter>(rows, Epsg::new(epsg), None)?;
    connector.save()?;
    log::info!("added {} vectors", added.len());
    Ok(())
}

pub fn add_rasters(data_dir: PathBuf, input: PathBuf, epsg: i32, orig_crs: i32, name_field: String) -> Result<()> {
    let mut connector = Connector::from_data_dir(&data_dir)?;
    let mut rows = rows_from_geojson(&input, &name_field)?;
    for row in &mut rows {
        row.attributes.entry("orig_crs_epsg_code".to_string()).or_insert(Field::Integer(orig_crs as i64));
    }
    let added = connector.add_to_rasters::<GdalRasterDataset, GdalRasterDatasetWriter>(rows, Epsg::new(epsg), None)?;
    connector.save()?;
    log::info!("added {} rasters", added.len());
    Ok(())
}

pub fn drop_vectors(data_dir: PathBuf, names: Vec<String>) -> Result<()> {
    let mut connector = Connector::from_data_dir(&data_dir)?;
    let names: Vec<FeatureName> = names.into_iter().map(FeatureName::from).collect();
    connector.drop_vectors::<GdalRasterDataset, GdalRasterDatasetWriter>(&names, None)?;
    connector.save()?;
    log::info!("dropped {} vectors", names.len());
    Ok(())
}

pub fn drop_rasters(data_dir: PathBuf, names: Vec<String>, keep_on_disk: bool) -> Result<()> {
    let mut connector = Connector::from_data_dir(&data_dir)?;
    let names: Vec<FeatureName> = names.into_iter().map(FeatureName::from).collect();
    connector.drop_rasters::<GdalRasterDataset, GdalRasterDatasetWriter>(&names, !keep_on_disk, None)?;
    connector.save()?;
    log::info!("dropped {} rasters", names.len());
    Ok(())
}

pub fn cut_grid(source: PathBuf, target: PathBuf, tile_size: i32, driver_name: String) -> Result<()> {
    let source_connector = Connector::from_data_dir(&source)?;
    let mut target_connector = open_or_create_target(&target, source_connector.crs_epsg())?;

    let mut driver = RasterIterationDriver::new(driver_name, GridCutter::square(tile_size), RasterFilterPredicate::RastersNotPreviouslyCutOnly);
    driver.load_state(&target_connector.connector_dir())?;

    let bar = progress_bar(source_connector.rasters().len() as u64, "cutting grid tiles");
    let appended = driver.run::<GdalRasterDataset, GdalRasterDatasetWriter>(&source_connector, &mut target_connector, no_label_maker())?;
    bar.finish_with_message(format!("{} child rasters produced", appended.len()));

    target_connector.save()?;
    driver.save_state(&target_connector.connector_dir())?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cut_around_vector(
    source: PathBuf,
    target: PathBuf,
    mode: String,
    tile_size: Option<i32>,
    min_tile_size: Option<i32>,
    scaling_factor: Option<f64>,
    seed: u64,
    target_raster_count: i64,
    driver_name: String,
) -> Result<()> {
    let source_connector = Connector::from_data_dir(&source)?;
    let mut target_connector = open_or_create_target(&target, source_connector.crs_epsg())?;

    let mode: Mode = mode.parse().map_err(|e: dataset::Error| anyhow!(e))?;
    let cutter = match mode {
        Mode::Random => AroundVectorCutter::random(square_size(tile_size.ok_or_else(|| anyhow!("--tile-size is required for random mode"))?), seed),
        Mode::Centered => AroundVectorCutter::centered(square_size(tile_size.ok_or_else(|| anyhow!("--tile-size is required for centered mode"))?)),
        Mode::Variable => AroundVectorCutter::variable(
            square_size(min_tile_size.ok_or_else(|| anyhow!("--min-tile-size is required for variable mode"))?),
            scaling_factor.ok_or_else(|| anyhow!("--scaling-factor is required for variable mode"))?,
        ),
    };

    let mut driver = VectorIterationDriver::new(
        driver_name,
        cutter,
        RasterSelector::Random { target_raster_count, seed },
        VectorFilterPredicate::IsVectorMissingRasters { target_raster_count },
    );
    driver.load_state(&target_connector.connector_dir())?;

    let bar = progress_bar(source_connector.vectors().len() as u64, "cutting around vectors");
    let appended = driver.run::<GdalRasterDataset, GdalRasterDatasetWriter>(&source_connector, &mut target_connector, no_label_maker())?;
    bar.finish_with_message(format!("{} child rasters produced", appended.len()));

    target_connector.save()?;
    driver.save_state(&target_connector.connector_dir())?;
    Ok(())
}

fn square_size(size: i32) -> (Rows, Columns) {
    (Rows(size), Columns(size))
}

/// Every driver/converter entry point threads the label-regeneration hook through; `dscli`
/// always leaves it to an explicit `make-labels` call rather than inferring one.
fn no_label_maker() -> Option<&'static dyn LabelMaker<GdalRasterDataset, GdalRasterDatasetWriter>> {
    None
}

fn open_or_create_target(target: &Path, crs_epsg: Epsg) -> Result<Connector> {
    if target.join("connector").join("attrs.json").exists() {
        Ok(Connector::from_data_dir(target)?)
    } else {
        Ok(Connector::from_scratch(target, crs_epsg))
    }
}

pub fn make_labels(data_dir: PathBuf, label_type: String, add_background_band: bool) -> Result<()> {
    let mut connector = Connector::from_data_dir(&data_dir)?;
    match label_type.as_str() {
        "categorical" => {
            let maker = CategoricalLabelMaker;
            LabelMaker::<GdalRasterDataset, GdalRasterDatasetWriter>::make_labels(&maker, &mut connector, None)?;
        }
        "soft-categorical" => {
            let maker = SoftCategoricalLabelMaker::new(add_background_band);
            LabelMaker::<GdalRasterDataset, GdalRasterDatasetWriter>::make_labels(&maker, &mut connector, None)?;
        }
        other => return Err(anyhow!("unknown label type '{other}', expected 'categorical' or 'soft-categorical'")),
    }
    connector.save()?;
    Ok(())
}

pub fn combine_classes(source: PathBuf, target: PathBuf, classes: String, new_background_class: Option<String>, remove_rasters: bool) -> Result<()> {
    let source_connector = Connector::from_data_dir(&source)?;
    let mut target_connector = open_or_create_target(&target, source_connector.crs_epsg())?;

    let groups: Vec<ClassGroup> = classes
        .split(',')
        .map(|group| {
            let members: Vec<String> = group.split('+').map(str::to_string).collect();
            if members.len() == 1 {
                ClassGroup::Single(members.into_iter().next().expect("split always yields at least one segment"))
            } else {
                ClassGroup::Merge(members)
            }
        })
        .collect();

    let mut converter = ClassConverter::new(groups);
    converter.new_background_class = new_background_class;
    converter.remove_rasters = remove_rasters;

    converter.convert::<GdalRasterDataset, GdalRasterDatasetWriter>(&source_connector, &mut target_connector, no_label_maker())?;
    target_connector.save()?;
    Ok(())
}
