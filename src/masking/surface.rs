//! Surface-Type Masks (land / sea)
//!
//! Thresholds a fractional coverage field. When only the complementary
//! field is available the target fraction is `1 - complementary`; sea ice
//! is not accounted for.

use tracing::{debug, error};

use crate::error::{MaskError, Result};
use crate::grid::{Field, LabeledArray};
use crate::mask::{Mask, MaskKind, Provenance};

pub const DEFAULT_FRACTION_THRESHOLD: f64 = 0.8;

/// Numeric values to booleans (non-zero is true, NaN is true)
pub fn boolean_mask(field: &Field) -> LabeledArray<bool> {
    field.map(|&v| v != 0.0)
}

/// True where the value is strictly above `threshold`
pub fn threshold_float_mask(field: &Field, threshold: f64) -> LabeledArray<bool> {
    field.map(|&v| v > threshold)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceType {
    Land,
    Sea,
}

impl SurfaceType {
    fn label(&self) -> &'static str {
        match self {
            SurfaceType::Land => "land",
            SurfaceType::Sea => "sea",
        }
    }

    fn complement(&self) -> SurfaceType {
        match self {
            SurfaceType::Land => SurfaceType::Sea,
            SurfaceType::Sea => SurfaceType::Land,
        }
    }
}

fn create_surface_mask(
    surface: SurfaceType,
    fraction_threshold: f64,
    same_frac: Option<&Field>,
    complement_frac: Option<&Field>,
) -> Result<Mask> {
    let fraction = match (same_frac, complement_frac) {
        (Some(same), _) => same.first_along("time")?,
        (None, Some(complement)) => {
            debug!(
                surface = surface.label(),
                "no {} fraction provided, using 1 - {} fraction",
                surface.label(),
                surface.complement().label()
            );
            complement.first_along("time")?.map(|&v| 1.0 - v)
        }
        (None, None) => {
            let err = MaskError::MissingInput {
                target: surface.label().to_string(),
                first: format!("{}_frac_data", surface.label()),
                second: format!("{}_frac_data", surface.complement().label()),
            };
            error!("{}", err);
            return Err(err);
        }
    };

    let values = threshold_float_mask(&fraction, fraction_threshold);
    let provenance = Provenance::new(
        &format!("{}_surface_mask", surface.label()),
        MaskKind::SurfaceType,
        format!(
            "A mask indicating the presence of {} surface type based on a fraction threshold of {:.1} %.",
            surface.label(),
            fraction_threshold * 100.0
        ),
    )
    .with_extra("fraction_threshold", fraction_threshold);

    Ok(Mask::new(values, provenance))
}

/// Land mask from land fraction, or from `1 - sea fraction` when land is absent
pub fn create_land_mask(
    fraction_threshold: f64,
    land_frac: Option<&Field>,
    sea_frac: Option<&Field>,
) -> Result<Mask> {
    create_surface_mask(SurfaceType::Land, fraction_threshold, land_frac, sea_frac)
}

/// Sea mask from sea fraction, or from `1 - land fraction` when sea is absent
pub fn create_sea_mask(
    fraction_threshold: f64,
    sea_frac: Option<&Field>,
    land_frac: Option<&Field>,
) -> Result<Mask> {
    create_surface_mask(SurfaceType::Sea, fraction_threshold, sea_frac, land_frac)
}
