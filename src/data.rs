//! Data Loading
//!
//! Loads the inputs of the masking core from disk:
//! - grids (coordinates plus optional variables) from JSON
//! - fraction fields from `lat, lon, value` tables
//! - region catalogs from a regions table (`number, abbrev`) and a cell
//!   table (`lat, lon, region`)
//!
//! Tables are read with Polars, from CSV or Parquet depending on the file
//! extension.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use polars::prelude::*;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::{debug, info};

use crate::grid::{label_key, Attrs, Coordinate, Field, Grid, LabeledArray};
use crate::masking::{RegionCatalog, TableRegionCatalog};

#[derive(Debug, Deserialize)]
struct GridFile {
    coords: Vec<CoordFile>,
    #[serde(default)]
    variables: BTreeMap<String, VariableFile>,
    #[serde(default)]
    attrs: Attrs,
}

#[derive(Debug, Deserialize)]
struct CoordFile {
    name: String,
    values: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct VariableFile {
    dims: Vec<String>,
    /// Row-major values; `null` becomes NaN
    values: Vec<Option<f64>>,
    #[serde(default)]
    attrs: Attrs,
}

/// Load a grid from JSON
///
/// ```json
/// {
///   "coords": [{"name": "lat", "values": [-45, 45]}, {"name": "lon", "values": [0, 180]}],
///   "variables": {"tas": {"dims": ["lat", "lon"], "values": [1, 2, 3, null], "attrs": {}}},
///   "attrs": {"source": "model"}
/// }
/// ```
pub fn load_grid_json(path: &Path) -> Result<Grid> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read grid file: {:?}", path))?;
    let file: GridFile = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse grid JSON: {:?}", path))?;

    let coords = file
        .coords
        .into_iter()
        .map(|c| Coordinate::new(c.name, c.values))
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid coordinates in {:?}", path))?;

    let mut grid = Grid::new(coords.clone()).with_context(|| format!("Invalid grid in {:?}", path))?;
    for (name, variable) in file.variables {
        let var_coords = variable
            .dims
            .iter()
            .map(|dim| {
                coords
                    .iter()
                    .find(|c| c.name() == dim)
                    .cloned()
                    .with_context(|| format!("Variable '{}' uses unknown dimension '{}'", name, dim))
            })
            .collect::<Result<Vec<_>>>()?;
        let values = variable
            .values
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        let field = LabeledArray::from_vec(var_coords, values)
            .with_context(|| format!("Invalid values for variable '{}'", name))?
            .with_attrs(variable.attrs);
        grid = grid.with_variable(&name, field)?;
    }
    for (key, value) in file.attrs {
        grid = grid.with_attr(&key, value);
    }

    info!(
        path = %path.display(),
        dims = ?grid.coords().iter().map(Coordinate::name).collect::<Vec<_>>(),
        variables = grid.variable_count(),
        "loaded grid"
    );
    Ok(grid)
}

/// Read a CSV or Parquet table
pub fn read_table(path: &Path) -> Result<DataFrame> {
    let is_parquet = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));

    if is_parquet {
        LazyFrame::scan_parquet(path, Default::default())
            .with_context(|| format!("Failed to scan parquet: {:?}", path))?
            .collect()
            .with_context(|| format!("Failed to load parquet: {:?}", path))
    } else {
        CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.into()))
            .with_context(|| format!("Failed to create CSV reader: {:?}", path))?
            .finish()
            .with_context(|| format!("Failed to load CSV: {:?}", path))
    }
}

fn f64_column(df: &DataFrame, name: &str, path: &Path) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .with_context(|| format!("Column '{}' not found in {:?}", name, path))?
        .cast(&DataType::Float64)
        .with_context(|| format!("Column '{}' in {:?} is not numeric", name, path))?;
    Ok(column.f64()?.into_iter().collect())
}

/// Sorted unique labels, nulls skipped
fn unique_labels(values: &[Option<f64>]) -> Vec<f64> {
    let mut labels: Vec<f64> = values.iter().flatten().copied().filter(|v| !v.is_nan()).collect();
    labels.sort_by(f64::total_cmp);
    labels.dedup_by(|a, b| label_key(*a) == label_key(*b));
    labels
}

/// Load a fraction field over (`lat`, `lon`) from a `lat, lon, value` table
///
/// Cells not listed in the table are NaN.
pub fn load_fraction_field(path: &Path) -> Result<Field> {
    let df = read_table(path)?;
    let lats = f64_column(&df, "lat", path)?;
    let lons = f64_column(&df, "lon", path)?;
    let values = f64_column(&df, "value", path)?;

    let lat = Coordinate::new("lat", unique_labels(&lats))?;
    let lon = Coordinate::new("lon", unique_labels(&lons))?;
    let lat_pos: FxHashMap<u64, usize> = lat.values().iter().enumerate().map(|(i, &v)| (label_key(v), i)).collect();
    let lon_pos: FxHashMap<u64, usize> = lon.values().iter().enumerate().map(|(i, &v)| (label_key(v), i)).collect();

    let mut data = vec![f64::NAN; lat.len() * lon.len()];
    for ((la, lo), value) in lats.iter().zip(&lons).zip(&values) {
        if let (Some(la), Some(lo)) = (la, lo) {
            if let (Some(&i), Some(&j)) = (lat_pos.get(&label_key(*la)), lon_pos.get(&label_key(*lo))) {
                data[i * lon.len() + j] = value.unwrap_or(f64::NAN);
            }
        }
    }

    debug!(path = %path.display(), rows = df.height(), "loaded fraction field");
    Ok(LabeledArray::from_vec(vec![lat, lon], data)?)
}

impl TableRegionCatalog {
    /// Load a catalog from a regions table and a cell table
    ///
    /// Regions are ordered by `number`; a cell's `region` holds a region
    /// number, or null for cells outside every region.
    pub fn load(name: &str, regions_path: &Path, cells_path: &Path) -> Result<Self> {
        let regions = read_table(regions_path)?;
        let numbers = regions
            .column("number")
            .with_context(|| format!("Column 'number' not found in {:?}", regions_path))?
            .cast(&DataType::Int64)
            .with_context(|| format!("Column 'number' in {:?} is not an integer", regions_path))?;
        let numbers = numbers.i64()?;
        let abbrev_column = regions
            .column("abbrev")
            .with_context(|| format!("Column 'abbrev' not found in {:?}", regions_path))?
            .str()
            .with_context(|| format!("Column 'abbrev' in {:?} is not string type", regions_path))?;

        let mut entries: Vec<(i64, String)> = numbers
            .into_iter()
            .zip(abbrev_column)
            .filter_map(|(number, abbrev)| Some((number?, abbrev?.to_string())))
            .collect();
        entries.sort_by_key(|(number, _)| *number);
        if let Some(pair) = entries.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            bail!(
                "Region number {} appears more than once in {:?} ({} and {})",
                pair[0].0,
                regions_path,
                pair[0].1,
                pair[1].1
            );
        }

        let index_of: FxHashMap<i64, usize> = entries
            .iter()
            .enumerate()
            .map(|(i, (number, _))| (*number, i))
            .collect();
        let abbrevs: Vec<String> = entries.into_iter().map(|(_, abbrev)| abbrev).collect();

        let cells = read_table(cells_path)?;
        let lats = f64_column(&cells, "lat", cells_path)?;
        let lons = f64_column(&cells, "lon", cells_path)?;
        let region_numbers = f64_column(&cells, "region", cells_path)?;

        let mut table = Vec::with_capacity(cells.height());
        for ((la, lo), region) in lats.iter().zip(&lons).zip(&region_numbers) {
            let (Some(la), Some(lo), Some(region)) = (la, lo, region) else {
                continue;
            };
            if region.fract() != 0.0 {
                bail!("Cell ({}, {}) has non-integer region number {} in {:?}", la, lo, region, cells_path);
            }
            let index = index_of
                .get(&(*region as i64))
                .with_context(|| format!("Cell ({}, {}) refers to unknown region number {}", la, lo, region))?;
            table.push((*la, *lo, *index));
        }

        let catalog = TableRegionCatalog::from_cells(name, abbrevs, table)?;
        info!(
            catalog = name,
            regions = catalog.abbrevs().len(),
            cells = catalog.cell_count(),
            "loaded region catalog"
        );
        Ok(catalog)
    }
}
