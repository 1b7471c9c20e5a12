//! Mask builders and combinators
//!
//! Each builder lives in its own module; the registry in `crate::registry`
//! dispatches mask names onto them.

pub mod coord;
pub mod surface;
pub mod region;
pub mod combine;
pub mod compat;

pub use coord::{
    create_coord_mask, create_latitude_mask, create_longitude_mask, fix_lon_coord,
    resolve_range, validate_selection, CoordMaskOptions, CoordSelection, RangeMode, ValidRange,
};
pub use surface::{
    boolean_mask, create_land_mask, create_sea_mask, threshold_float_mask,
    DEFAULT_FRACTION_THRESHOLD,
};
pub use region::{create_region_mask, RegionCatalog, TableRegionCatalog};
pub use combine::{combine_masks, intersection_of_masks, merge_attributes, union_of_masks, CombineOp};
pub use compat::{apply_mask, is_float_mask_compatible, is_where_compatible, TypedArray, WeightCheck};
