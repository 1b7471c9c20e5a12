//! Mask compatibility checks and mask application
//!
//! Conditions and weights arrive as `TypedArray` so their element type can be
//! checked at runtime before they are broadcast onto data.

use tracing::{debug, error};

use crate::error::{MaskError, Result};
use crate::grid::{broadcast_coords, zip_with, Coordinate, Field, Grid, LabeledArray};
use crate::mask::{Mask, MASK_DESCRIPTION, MASK_TYPE};

/// Labeled array with its element type known only at runtime
#[derive(Debug, Clone, PartialEq)]
pub enum TypedArray {
    Bool(LabeledArray<bool>),
    Float(Field),
    Int(LabeledArray<i64>),
}

impl TypedArray {
    pub fn dtype_name(&self) -> &'static str {
        match self {
            TypedArray::Bool(_) => "bool",
            TypedArray::Float(_) => "float64",
            TypedArray::Int(_) => "int64",
        }
    }

    pub fn coords(&self) -> &[Coordinate] {
        match self {
            TypedArray::Bool(a) => a.coords(),
            TypedArray::Float(a) => a.coords(),
            TypedArray::Int(a) => a.coords(),
        }
    }
}

impl From<LabeledArray<bool>> for TypedArray {
    fn from(a: LabeledArray<bool>) -> Self {
        TypedArray::Bool(a)
    }
}

impl From<Field> for TypedArray {
    fn from(a: Field) -> Self {
        TypedArray::Float(a)
    }
}

impl From<LabeledArray<i64>> for TypedArray {
    fn from(a: LabeledArray<i64>) -> Self {
        TypedArray::Int(a)
    }
}

impl From<&Mask> for TypedArray {
    fn from(mask: &Mask) -> Self {
        TypedArray::Bool(mask.values().clone())
    }
}

/// Optional value-range check applied to weights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightCheck {
    pub check_range: bool,
    pub min_value: f64,
    pub max_value: f64,
}

impl Default for WeightCheck {
    fn default() -> Self {
        Self {
            check_range: true,
            min_value: 0.0,
            max_value: 1.0,
        }
    }
}

impl WeightCheck {
    pub fn unchecked() -> Self {
        Self {
            check_range: false,
            ..Self::default()
        }
    }
}

/// Either fail with `err` or log it and report incompatibility
fn reject(err: MaskError, exit_on_error: bool) -> Result<bool> {
    error!("{}", err);
    if exit_on_error {
        Err(err)
    } else {
        Ok(false)
    }
}

fn check_broadcast(data: &Field, other: &TypedArray, what: &str) -> Result<()> {
    broadcast_coords(data.coords(), other.coords())
        .map(|_| ())
        .map_err(|e| MaskError::NotBroadcastable {
            what: what.to_string(),
            detail: e.to_string(),
        })
}

/// Whether `cond` can be used to mask `data`: boolean and broadcastable
///
/// # Errors
/// With `exit_on_error`, `NotBooleanCondition` or `NotBroadcastable`;
/// otherwise failures are logged and `Ok(false)` is returned.
pub fn is_where_compatible(data: &Field, cond: &TypedArray, exit_on_error: bool) -> Result<bool> {
    if !matches!(cond, TypedArray::Bool(_)) {
        let err = MaskError::NotBooleanCondition {
            found: cond.dtype_name().to_string(),
        };
        return reject(err, exit_on_error);
    }
    debug!("condition is a boolean array");

    if let Err(err) = check_broadcast(data, cond, "condition") {
        return reject(err, exit_on_error);
    }
    debug!("condition is broadcastable to the data shape");

    Ok(true)
}

/// Whether `weights` can weight `data`: float, broadcastable and optionally in range
///
/// # Errors
/// With `exit_on_error`, `NotFloatWeights`, `NotBroadcastable` or `OutOfRange`;
/// otherwise failures are logged and `Ok(false)` is returned.
pub fn is_float_mask_compatible(
    data: &Field,
    weights: &TypedArray,
    check: WeightCheck,
    exit_on_error: bool,
) -> Result<bool> {
    let TypedArray::Float(values) = weights else {
        let err = MaskError::NotFloatWeights {
            found: weights.dtype_name().to_string(),
        };
        return reject(err, exit_on_error);
    };
    debug!("mask is a float array (weights)");

    if let Err(err) = check_broadcast(data, weights, "mask") {
        return reject(err, exit_on_error);
    }

    if check.check_range {
        // NaN fails the comparison, as it would elementwise
        let invalid: Vec<f64> = values
            .data()
            .iter()
            .copied()
            .filter(|v| !(*v >= check.min_value && *v <= check.max_value))
            .collect();
        if !invalid.is_empty() {
            let err = MaskError::OutOfRange {
                what: "mask".to_string(),
                min: check.min_value,
                max: check.max_value,
                values: invalid,
            };
            return reject(err, exit_on_error);
        }
        debug!(min = check.min_value, max = check.max_value, "all mask values within range");
    }

    Ok(true)
}

/// Keep `data` where `mask` is true and NaN elsewhere, as a one-variable dataset
///
/// The dataset `comment` attribute gets `. Masked using: <mask_type>` appended
/// to the data's own comment, and `mask_description` is copied from the mask.
pub fn apply_mask(data: &Field, var: &str, mask: &Mask) -> Result<Grid> {
    let masked = zip_with(data, mask.values(), |&v, &keep| if keep { v } else { f64::NAN })
        .map_err(|e| {
            error!(mask = mask.name(), "error applying mask: {}", e);
            e.in_mask(mask.name())
        })?;

    let comment = data
        .attrs()
        .get("comment")
        .map(|c| c.to_string())
        .unwrap_or_default();
    let mask_type = mask
        .provenance()
        .get(MASK_TYPE)
        .map(|t| t.to_string())
        .unwrap_or_default();

    Ok(Grid::from_field(var, masked)
        .with_attr("comment", format!("{}. Masked using: {}", comment, mask_type))
        .with_attr(MASK_DESCRIPTION, mask.provenance().mask_description().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::{MaskKind, Provenance};

    fn lat() -> Coordinate {
        Coordinate::new("lat", vec![-45.0, 0.0, 45.0]).unwrap()
    }

    fn data() -> Field {
        LabeledArray::from_vec(vec![lat()], vec![1.0, 2.0, 3.0])
            .unwrap()
            .with_attr("comment", "Surface temperature")
    }

    fn weights(values: &[f64]) -> TypedArray {
        TypedArray::Float(LabeledArray::from_vec(vec![lat()], values.to_vec()).unwrap())
    }

    #[test]
    fn test_where_requires_boolean() {
        let cond = weights(&[1.0, 0.0, 1.0]);
        let err = is_where_compatible(&data(), &cond, true).unwrap_err();
        assert!(matches!(err, MaskError::NotBooleanCondition { ref found } if found == "float64"));
        assert!(!is_where_compatible(&data(), &cond, false).unwrap());
    }

    #[test]
    fn test_where_requires_broadcastable() {
        let other = Coordinate::new("lat", vec![0.0, 10.0]).unwrap();
        let cond = TypedArray::Bool(LabeledArray::from_vec(vec![other], vec![true, false]).unwrap());
        assert!(matches!(
            is_where_compatible(&data(), &cond, true),
            Err(MaskError::NotBroadcastable { .. })
        ));

        let lon = Coordinate::new("lon", vec![0.0, 90.0]).unwrap();
        let cond = TypedArray::Bool(LabeledArray::from_vec(vec![lon], vec![true, false]).unwrap());
        assert!(is_where_compatible(&data(), &cond, true).unwrap());
    }

    #[test]
    fn test_float_mask_checks() {
        assert!(is_float_mask_compatible(&data(), &weights(&[0.0, 0.5, 1.0]), WeightCheck::default(), true).unwrap());

        let err = is_float_mask_compatible(&data(), &weights(&[0.0, 1.5, f64::NAN]), WeightCheck::default(), true)
            .unwrap_err();
        match err {
            MaskError::OutOfRange { values, .. } => {
                assert_eq!(values.len(), 2);
                assert_eq!(values[0], 1.5);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(is_float_mask_compatible(&data(), &weights(&[0.0, 1.5, 2.0]), WeightCheck::unchecked(), true).unwrap());

        let ints = TypedArray::Int(LabeledArray::from_vec(vec![lat()], vec![0, 1, 1]).unwrap());
        assert!(matches!(
            is_float_mask_compatible(&data(), &ints, WeightCheck::default(), true),
            Err(MaskError::NotFloatWeights { .. })
        ));
        assert!(!is_float_mask_compatible(&data(), &ints, WeightCheck::default(), false).unwrap());
    }

    #[test]
    fn test_apply_mask() {
        let mask = Mask::new(
            LabeledArray::from_vec(vec![lat()], vec![true, false, true]).unwrap(),
            Provenance::new("lat_mask", MaskKind::Coord("lat".to_string()), "southern and northern"),
        );
        let ds = apply_mask(&data(), "tas", &mask).unwrap();

        let tas = ds.variable("tas").unwrap();
        let values: Vec<f64> = tas.data().iter().copied().collect();
        assert_eq!(values[0], 1.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 3.0);

        assert_eq!(
            ds.attrs().get("comment").map(|c| c.to_string()),
            Some("Surface temperature. Masked using: lat_mask".to_string())
        );
        assert_eq!(
            ds.attrs().get(MASK_DESCRIPTION).map(|c| c.to_string()),
            Some("southern and northern".to_string())
        );
    }
}
