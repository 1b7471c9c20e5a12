//! Peripheral helpers around the masking core
//!
//! - Save: overwrite policy and table export of built masks
//! - Realization: `r<N>` ids from CMIP variant labels

pub mod realization;
pub mod save;

pub use realization::{extract_realization, extract_realization_number};
pub use save::{
    check_filepath, masks_to_dataframe, provenance_table, save_masks_csv, OverwritePolicy,
    Prompter, StdinPrompter,
};
