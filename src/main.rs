pub mod config;
pub mod convert;
pub mod crs;
pub mod error;
pub mod geofile;
use crate::config::Config;
use crate::convert::batch::convert_directory;
use clap::Parser;
use std::path::PathBuf;

/// Convert railway shapefiles into simplified GeoJSON for web maps.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML config file. Built in defaults are used when omitted.
    #[arg(short, long)]
    config_filepath: Option<PathBuf>,

    /// Directory holding the input shapefiles.
    #[arg(short, long)]
    input_dir: Option<PathBuf>,

    /// Directory the GeoJSON files are written to.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Simplification tolerance in units of the target CRS, an area for visvalingam_preserve.
    #[arg(short, long)]
    tolerance: Option<f64>,
}

fn load_config(args: Args) -> anyhow::Result<Config> {
    let mut config = match &args.config_filepath {
        Some(config_filepath) => Config::from_yaml_file(config_filepath)?,
        None => Config::default(),
    };
    if let Some(input_dir) = args.input_dir {
        config.input_dir = input_dir;
    }
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    if let Some(tolerance) = args.tolerance {
        config.simplify_tolerance = tolerance;
    }
    Ok(config)
}

fn try_main() -> anyhow::Result<()> {
    let args = Args::try_parse()?;
    let settings = load_config(args)?.resolve()?;

    log::info!("--- Railway GeoJSON converter ---");
    log::info!("Expects National Land Numerical Information railway (N02) shapefiles");
    log::debug!("{:?}", settings);

    let report = convert_directory(&settings)?;
    if !report.failed.is_empty() {
        log::warn!(
            "{} files could not be converted: {:?}",
            report.failed.len(),
            report
                .failed
                .iter()
                .map(|(path, _)| path)
                .collect::<Vec<_>>()
        );
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = try_main() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1)
    }
}
