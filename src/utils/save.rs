//! Saving masks
//!
//! Masks are exported as long-format tables: one row per cell with the mask
//! key, one column per dimension and the boolean value. Existing files are
//! handled by an `OverwritePolicy`.

use std::fs::{self, File};
use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::registry::MaskSet;

/// What to do when the output file already exists
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    Always,
    #[default]
    Never,
    /// Ask through a `Prompter`
    Prompt,
}

/// Yes/no confirmation source for `OverwritePolicy::Prompt`
pub trait Prompter {
    fn confirm(&mut self, message: &str) -> Result<bool>;
}

/// Asks on stderr and reads the answer from stdin; only `y` confirms
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn confirm(&mut self, message: &str) -> Result<bool> {
        eprint!("{}\nOverwrite? (y/n): ", message);
        io::stderr().flush().ok();

        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("Failed to read overwrite answer")?;
        Ok(answer.trim().eq_ignore_ascii_case("y"))
    }
}

/// Whether `path` may be written under `policy`
///
/// Creates missing parent directories when writing is allowed.
pub fn check_filepath(
    path: &Path,
    policy: OverwritePolicy,
    prompter: &mut dyn Prompter,
) -> Result<bool> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());

    let write = if path.exists() {
        let location = parent.map(|p| p.display().to_string()).unwrap_or_default();
        let allowed = match policy {
            OverwritePolicy::Always => true,
            OverwritePolicy::Never => false,
            OverwritePolicy::Prompt => {
                prompter.confirm(&format!("File {} already exists at {}.", name, location))?
            }
        };
        if allowed {
            info!(file = %name, location = %location, "file will be overwritten");
        } else {
            info!(
                file = %name,
                location = %location,
                "file already exists; change the file name or allow overwriting"
            );
        }
        allowed
    } else {
        true
    };

    if let Some(parent) = parent.filter(|p| write && !p.exists()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        info!(directory = %parent.display(), file = %name, "created directory");
    }

    Ok(write)
}

/// Names of every dimension used by any mask, in order of first appearance
fn dimension_names(masks: &MaskSet) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for mask in masks.values() {
        for dim in mask.dims() {
            if !names.iter().any(|n| n == dim) {
                names.push(dim.to_string());
            }
        }
    }
    names
}

/// Long-format table of every mask cell
///
/// Columns: `mask`, one `f64` column per dimension (null where a mask lacks
/// the dimension) and `value`.
pub fn masks_to_dataframe(masks: &MaskSet) -> Result<DataFrame> {
    let dims = dimension_names(masks);
    let rows: usize = masks.values().map(|m| m.values().len()).sum();

    let mut keys: Vec<&str> = Vec::with_capacity(rows);
    let mut labels: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(rows); dims.len()];
    let mut values: Vec<bool> = Vec::with_capacity(rows);

    for (key, mask) in masks {
        let axes: Vec<Option<usize>> = dims.iter().map(|d| mask.values().axis_of(d)).collect();
        for (index, &value) in mask.values().data().indexed_iter() {
            keys.push(key);
            for (column, axis) in labels.iter_mut().zip(&axes) {
                column.push(axis.map(|a| mask.coords()[a].values()[index[a]]));
            }
            values.push(value);
        }
    }

    let mut columns = vec![Column::from(Series::new("mask".into(), keys))];
    for (dim, column) in dims.iter().zip(labels) {
        columns.push(Column::from(Series::new(dim.as_str().into(), column)));
    }
    columns.push(Column::from(Series::new("value".into(), values)));

    DataFrame::new(columns).context("Failed to build mask table")
}

/// One row per (mask, attribute) pair, `mask_name` included
pub fn provenance_table(masks: &MaskSet) -> Result<DataFrame> {
    let mut keys = Vec::new();
    let mut attributes = Vec::new();
    let mut values = Vec::new();

    for (key, mask) in masks {
        let provenance = mask.provenance();
        keys.push(key.clone());
        attributes.push(crate::mask::MASK_NAME.to_string());
        values.push(provenance.mask_name().to_string());

        for (attribute, value) in provenance.attributes() {
            keys.push(key.clone());
            attributes.push(attribute.to_string());
            values.push(value.to_string());
        }
    }

    DataFrame::new(vec![
        Column::from(Series::new("mask".into(), keys)),
        Column::from(Series::new("attribute".into(), attributes)),
        Column::from(Series::new("value".into(), values)),
    ])
    .context("Failed to build provenance table")
}

/// Write `masks_to_dataframe` as CSV if `policy` allows it
///
/// Returns whether the file was written.
pub fn save_masks_csv(
    masks: &MaskSet,
    path: &Path,
    policy: OverwritePolicy,
    prompter: &mut dyn Prompter,
) -> Result<bool> {
    if !check_filepath(path, policy, prompter)? {
        return Ok(false);
    }

    let mut df = masks_to_dataframe(masks)?;
    let mut file =
        File::create(path).with_context(|| format!("Failed to create file: {:?}", path))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)
        .with_context(|| format!("Failed to write CSV: {:?}", path))?;

    debug!(path = %path.display(), rows = df.height(), "saved masks");
    Ok(true)
}
