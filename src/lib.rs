//! Climate Masks
//!
//! Boolean masks over gridded climate data: latitude bands, land/ocean
//! fraction thresholds and catalog regions, combined with `&` / `|` into
//! compound masks that carry merged, human-readable provenance.
//!
//! Layout:
//! - `grid`: labeled arrays and datasets the masks are built over
//! - `mask`: the mask value type and its provenance
//! - `masking/`: builders (coordinate, surface type, region), combination,
//!   compatibility checks and mask application
//! - `registry`: mask-name resolution and orchestration
//! - `alignment`: arithmetic that refuses misaligned coordinates
//! - `data`, `config`, `logging`, `utils/`: loading, configuration and export

pub mod error;
pub mod grid;
pub mod mask;
pub mod masking;
pub mod registry;
pub mod alignment;
pub mod config;
pub mod logging;
pub mod data;
pub mod utils;

// Re-export commonly used types
pub use error::{MaskError, Result};
pub use grid::{AttrValue, Attrs, Coordinate, Field, Grid, LabeledArray};
pub use mask::{Mask, MaskKind, Provenance};
pub use masking::*;
pub use registry::{
    AtomicMaskSpec, CompoundMaskSpec, CustomMaskSpec, FractionFields, LatitudeBand, MaskRegistry,
    MaskRequest, MaskSet,
};
pub use alignment::{
    add_with_alignment, broadcast_with_alignment, check_alignment, divide_with_alignment,
    ensure_data_array, is_aligned, multiply_with_alignment, operation_with_alignment,
    power_with_alignment, subtract_with_alignment, ArithmeticOp, Join,
};
pub use config::MaskConfig;
pub use logging::{init_logging, LogConfig, LogMode};
