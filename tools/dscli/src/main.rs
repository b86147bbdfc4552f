use std::path::PathBuf;

use clap::{Parser, Subcommand};
use env_logger::{Env, TimestampPrecision};
use indicatif::{MultiProgress, ProgressBar};
use indicatif_log_bridge::LogWrapper;

mod commands;

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser, Debug)]
#[clap(name = "dscli", about = "Build and derive computer-vision datasets from raster/vector catalogs")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,

    /// Location of `proj.db`; defaults to GDAL's own search path when unset.
    #[arg(long = "proj-db", global = true)]
    pub proj_db: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty connector catalog at `data-dir`.
    Init {
        #[arg(long = "data-dir")]
        data_dir: PathBuf,
        #[arg(long = "epsg")]
        epsg: i32,
    },
    /// Print a summary of a connector's tables, graph size and attrs.
    Info {
        #[arg(long = "data-dir")]
        data_dir: PathBuf,
    },
    /// Add vector features (from a GeoJSON file) to a connector's vector table.
    AddVectors {
        #[arg(long = "data-dir")]
        data_dir: PathBuf,
        #[arg(long = "input")]
        input: PathBuf,
        #[arg(long = "epsg")]
        epsg: i32,
        #[arg(long = "name-field", default_value = "vector_name")]
        name_field: String,
    },
    /// Add raster features (from a GeoJSON footprint file) to a connector's raster table.
    AddRasters {
        #[arg(long = "data-dir")]
        data_dir: PathBuf,
        #[arg(long = "input")]
        input: PathBuf,
        #[arg(long = "epsg")]
        epsg: i32,
        #[arg(long = "orig-crs")]
        orig_crs: i32,
        #[arg(long = "name-field", default_value = "raster_name")]
        name_field: String,
    },
    /// Drop vectors by name, pruning their graph edges and recomputing affected labels.
    DropVectors {
        #[arg(long = "data-dir")]
        data_dir: PathBuf,
        #[arg(long = "name", required = true)]
        names: Vec<String>,
    },
    /// Drop rasters by name, pruning their graph edges and (by default) deleting the files.
    DropRasters {
        #[arg(long = "data-dir")]
        data_dir: PathBuf,
        #[arg(long = "name", required = true)]
        names: Vec<String>,
        #[arg(long = "keep-on-disk")]
        keep_on_disk: bool,
    },
    /// Cut every source raster into a regular grid of tiles.
    CutGrid {
        #[arg(long = "source")]
        source: PathBuf,
        #[arg(long = "target")]
        target: PathBuf,
        #[arg(long = "tile-size")]
        tile_size: i32,
        #[arg(long = "driver-name", default_value = "grid")]
        driver_name: String,
    },
    /// Cut tiles centered on (or randomized around) each under-represented target vector.
    CutAroundVector {
        #[arg(long = "source")]
        source: PathBuf,
        #[arg(long = "target")]
        target: PathBuf,
        #[arg(long = "mode", value_name = "random|centered|variable")]
        mode: String,
        #[arg(long = "tile-size")]
        tile_size: Option<i32>,
        #[arg(long = "min-tile-size")]
        min_tile_size: Option<i32>,
        #[arg(long = "scaling-factor")]
        scaling_factor: Option<f64>,
        #[arg(long = "seed", default_value = "0")]
        seed: u64,
        #[arg(long = "target-raster-count", default_value = "1")]
        target_raster_count: i64,
        #[arg(long = "driver-name", default_value = "around_vector")]
        driver_name: String,
    },
    /// (Re)generate pixel labels for rasters that don't have any yet.
    MakeLabels {
        #[arg(long = "data-dir")]
        data_dir: PathBuf,
        #[arg(long = "label-type", value_name = "categorical|soft-categorical")]
        label_type: String,
        #[arg(long = "add-background-band")]
        add_background_band: bool,
    },
    /// Combine or drop vector classes, producing a derived connector with renormalized labels.
    CombineClasses {
        #[arg(long = "source")]
        source: PathBuf,
        #[arg(long = "target")]
        target: PathBuf,
        /// Comma-separated class groups, '+' joins merged members, e.g. "building,road+track".
        #[arg(long = "classes")]
        classes: String,
        #[arg(long = "new-background-class")]
        new_background_class: Option<String>,
        #[arg(long = "remove-rasters")]
        remove_rasters: bool,
    },
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    let logger = env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .build();
    let multi = MultiProgress::new();
    let level = logger.filter();
    LogWrapper::new(multi.clone(), logger).try_init().expect("logger is only installed once");
    log::set_max_level(level);

    let gdal_config = inf::gdalinterop::Config {
        debug_logging: log::log_enabled!(log::Level::Debug),
        proj_db_search_location: opt.proj_db.clone().unwrap_or_default(),
    };
    gdal_config.apply()?;

    let spinner = multi.add(ProgressBar::new_spinner());
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));

    match opt.command {
        Command::Init { data_dir, epsg } => commands::init(data_dir, epsg),
        Command::Info { data_dir } => commands::info(data_dir),
        Command::AddVectors { data_dir, input, epsg, name_field } => commands::add_vectors(data_dir, input, epsg, name_field),
        Command::AddRasters { data_dir, input, epsg, orig_crs, name_field } => commands::add_rasters(data_dir, input, epsg, orig_crs, name_field),
        Command::DropVectors { data_dir, names } => commands::drop_vectors(data_dir, names),
        Command::DropRasters { data_dir, names, keep_on_disk } => commands::drop_rasters(data_dir, names, keep_on_disk),
        Command::CutGrid { source, target, tile_size, driver_name } => commands::cut_grid(source, target, tile_size, driver_name),
        Command::CutAroundVector { source, target, mode, tile_size, min_tile_size, scaling_factor, seed, target_raster_count, driver_name } => {
            commands::cut_around_vector(source, target, mode, tile_size, min_tile_size, scaling_factor, seed, target_raster_count, driver_name)
        }
        Command::MakeLabels { data_dir, label_type, add_background_band } => commands::make_labels(data_dir, label_type, add_background_band),
        Command::CombineClasses { source, target, classes, new_background_class, remove_rasters } => {
            commands::combine_classes(source, target, classes, new_background_class, remove_rasters)
        }
    }?;

    spinner.finish_and_clear();
    Ok(())
}
