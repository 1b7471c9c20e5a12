//! Create Masks
//!
//! Builds the requested masks over a grid and prints a summary of each.
//! Run with: cargo run --release --bin create_masks -- --grid grid.json --masks NH land 'NH&land'

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use climate_masks::data::{load_fraction_field, load_grid_json};
use climate_masks::logging::{init_logging, LogConfig};
use climate_masks::utils::{save_masks_csv, OverwritePolicy, StdinPrompter};
use climate_masks::{FractionFields, MaskConfig, MaskRegistry, TableRegionCatalog};

#[derive(Parser, Debug)]
#[command(name = "create_masks", about = "Build boolean masks over a climate grid")]
struct Cli {
    /// Grid JSON with `coords`, optional `variables` and `attrs`
    #[arg(long)]
    grid: PathBuf,

    /// Mask names, e.g. `NH`, `land`, `NH&land`, `tropics|SH`
    #[arg(long, num_args = 1.., required = true)]
    masks: Vec<String>,

    /// Land fraction table (`lat, lon, value`)
    #[arg(long)]
    land_frac: Option<PathBuf>,

    /// Ocean fraction table (`lat, lon, value`)
    #[arg(long)]
    ocean_frac: Option<PathBuf>,

    /// Region table (`number, abbrev`); needs `--region-cells`
    #[arg(long, requires = "region_cells")]
    regions: Option<PathBuf>,

    /// Region cell table (`lat, lon, region`)
    #[arg(long, requires = "regions")]
    region_cells: Option<PathBuf>,

    /// JSON configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the masks as a long-format CSV
    #[arg(long)]
    output: Option<PathBuf>,

    /// Overrides `output.overwrite` from the configuration
    #[arg(long, value_enum)]
    overwrite: Option<OverwritePolicy>,

    /// Level for this crate's events
    #[arg(long)]
    log_level: Option<String>,
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => MaskConfig::load(path)?,
        None => MaskConfig::default(),
    };

    let mut log_config = LogConfig {
        mode: climate_masks::LogMode::Standalone,
        ..config.logging.clone()
    };
    if let Some(level) = &cli.log_level {
        log_config = log_config.with_package_level(level);
    }
    init_logging(&log_config)?;

    let grid = load_grid_json(&cli.grid)?;
    let land = cli.land_frac.as_deref().map(load_fraction_field).transpose()?;
    let ocean = cli.ocean_frac.as_deref().map(load_fraction_field).transpose()?;

    let catalog = match (&cli.regions, &cli.region_cells) {
        (Some(regions), Some(cells)) => {
            TableRegionCatalog::load(&config.region_catalog_name, regions, cells)?
        }
        _ => TableRegionCatalog::empty(&config.region_catalog_name),
    };

    let registry = MaskRegistry::from_config(&config, &catalog)
        .context("Invalid mask configuration")?;

    let mut fractions = FractionFields::none();
    if let Some(land) = &land {
        fractions = fractions.with_land(land);
    }
    if let Some(ocean) = &ocean {
        fractions = fractions.with_ocean(ocean);
    }

    let masks = registry
        .create_masks(&grid, cli.masks.as_slice(), fractions)
        .context("Failed to create masks")?;

    println!("Created {} masks", masks.len());
    for (key, mask) in &masks {
        println!();
        println!("{}", key);
        println!("  dims:        {:?}", mask.dims());
        println!("  shape:       {:?}", mask.shape());
        println!("  selected:    {} / {}", mask.count_true(), mask.values().len());
        println!("  type:        {}", mask.provenance().mask_type());
        println!("  description: {}", mask.provenance().mask_description());
    }

    if let Some(path) = &cli.output {
        let policy = cli.overwrite.unwrap_or(config.output.overwrite);
        if save_masks_csv(&masks, path, policy, &mut StdinPrompter)? {
            println!();
            println!("Saved masks to {}", path.display());
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
