//! Error taxonomy for the masking core
//!
//! Every builder, combinator and alignment helper returns `MaskError`.
//! File loading, configuration and the CLI layer use `anyhow` on top of it.

use thiserror::Error;

use crate::alignment::Join;

/// Failures raised by mask construction, combination and alignment
#[derive(Debug, Error)]
pub enum MaskError {
    /// Wrong kind of value for a parameter
    #[error("{what} must be {expected}, got {found}")]
    InvalidType {
        what: String,
        expected: String,
        found: String,
    },

    /// Coordinate or value outside its declared domain
    #[error("all {what} values must be within ({min}, {max}). Found invalid values: {values:?}")]
    OutOfRange {
        what: String,
        min: f64,
        max: f64,
        values: Vec<f64>,
    },

    #[error("invalid range_mode '{0}'. Must be one of [inclusive, exclusive, inclusive_min, inclusive_max]")]
    InvalidRangeMode(String),

    #[error("range must contain exactly two elements (min, max), got {0}")]
    InvalidRangeTuple(usize),

    /// Neither of two mutually exclusive optional inputs was supplied
    #[error("to create the {target} mask provide either '{first}' or '{second}'")]
    MissingInput {
        target: String,
        first: String,
        second: String,
    },

    #[error("region '{abbrev}' is not in the {catalog} region catalog")]
    UnknownRegion { abbrev: String, catalog: String },

    #[error("mask '{name}' is not implemented: {reason}")]
    UnknownMask { name: String, reason: String },

    #[error("at least one mask must be provided")]
    EmptyInput,

    /// Shape/broadcast failure while folding masks with AND/OR
    #[error("error combining masks by {method}: {source}\nmask elements:\n{diagnostics}")]
    CombinationError {
        method: String,
        diagnostics: String,
        #[source]
        source: Box<MaskError>,
    },

    #[error("condition dtype is {found} but should be boolean")]
    NotBooleanCondition { found: String },

    #[error("mask dtype is {found} but should be a float (weights)")]
    NotFloatWeights { found: String },

    #[error("input arrays are not aligned according to join='{join}': {detail}")]
    AlignmentError { join: Join, detail: String },

    #[error("{what} is not broadcastable to the data shape: {detail}")]
    NotBroadcastable { what: String, detail: String },

    #[error("coordinate '{0}' not found")]
    MissingCoordinate(String),

    #[error("invalid coordinate '{name}': {detail}")]
    InvalidCoordinate { name: String, detail: String },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Context wrapper naming the mask (or compound expression) being built
    #[error("failed to create mask '{mask}': {source}")]
    InMask {
        mask: String,
        #[source]
        source: Box<MaskError>,
    },
}

impl MaskError {
    /// Wrap this error with the name of the mask being built
    pub fn in_mask(self, mask: &str) -> Self {
        MaskError::InMask {
            mask: mask.to_string(),
            source: Box::new(self),
        }
    }

    /// Innermost error below any `InMask` wrappers
    pub fn root_cause(&self) -> &MaskError {
        match self {
            MaskError::InMask { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, MaskError>;
