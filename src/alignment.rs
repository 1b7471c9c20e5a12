//! Alignment-Checked Arithmetic
//!
//! Arithmetic on labeled arrays that refuses to silently drop or reorder
//! labels. Operands are first aligned under a `Join` policy (default
//! `Exact`, which fails whenever shared coordinates differ), then combined
//! elementwise with broadcasting by dimension name.
//!
//! Join policies:
//! - `Exact`: shared coordinates must be identical
//! - `Inner`: keep labels present in every operand
//! - `Outer`: keep labels present in any operand (sorted), missing cells NaN
//! - `Left` / `Right`: use the first / last operand's labels
//! - `Override`: same lengths required, first operand's labels win

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{MaskError, Result};
use crate::grid::{broadcast_coords, label_key, zip_with, Coordinate, Field, Grid, LabeledArray};

/// How operands with differing coordinate labels are reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Join {
    #[default]
    Exact,
    Inner,
    Outer,
    Left,
    Right,
    Override,
}

impl Join {
    pub fn as_str(&self) -> &'static str {
        match self {
            Join::Exact => "exact",
            Join::Inner => "inner",
            Join::Outer => "outer",
            Join::Left => "left",
            Join::Right => "right",
            Join::Override => "override",
        }
    }
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Join {
    type Err = MaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exact" => Ok(Join::Exact),
            "inner" => Ok(Join::Inner),
            "outer" => Ok(Join::Outer),
            "left" => Ok(Join::Left),
            "right" => Ok(Join::Right),
            "override" => Ok(Join::Override),
            other => Err(MaskError::InvalidType {
                what: "join".to_string(),
                expected: "one of exact, inner, outer, left, right, override".to_string(),
                found: format!("'{}'", other),
            }),
        }
    }
}

/// Elementwise arithmetic operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

impl ArithmeticOp {
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            ArithmeticOp::Add => a + b,
            ArithmeticOp::Subtract => a - b,
            ArithmeticOp::Multiply => a * b,
            ArithmeticOp::Divide => a / b,
            ArithmeticOp::Power => a.powf(b),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Subtract => "subtract",
            ArithmeticOp::Multiply => "multiply",
            ArithmeticOp::Divide => "divide",
            ArithmeticOp::Power => "power",
        }
    }
}

fn alignment_error(join: Join, detail: String) -> MaskError {
    MaskError::AlignmentError { join, detail }
}

/// Target labels for one dimension given every operand's coordinate for it
fn joined_coordinate(name: &str, coords: &[&Coordinate], join: Join) -> Result<Coordinate> {
    let (first, rest) = coords
        .split_first()
        .ok_or_else(|| alignment_error(join, format!("no operand carries dimension '{}'", name)))?;

    match join {
        Join::Exact => {
            if let Some(other) = rest.iter().find(|c| **c != *first) {
                return Err(alignment_error(
                    join,
                    format!(
                        "indexes along dimension '{}' are not equal ({} vs {} labels)",
                        name,
                        first.len(),
                        other.len()
                    ),
                ));
            }
            Ok((*first).clone())
        }
        Join::Inner => {
            let shared: Vec<f64> = first
                .values()
                .iter()
                .copied()
                .filter(|&v| rest.iter().all(|c| c.position(v).is_some()))
                .collect();
            Coordinate::new(name, shared)
        }
        Join::Outer => {
            let mut seen = FxHashSet::default();
            let mut union: Vec<f64> = coords
                .iter()
                .flat_map(|c| c.values().iter().copied())
                .filter(|&v| seen.insert(label_key(v)))
                .collect();
            union.sort_by(f64::total_cmp);
            Coordinate::new(name, union)
        }
        Join::Left => Ok((*first).clone()),
        Join::Right => Ok((*coords[coords.len() - 1]).clone()),
        Join::Override => {
            if let Some(other) = rest.iter().find(|c| c.len() != first.len()) {
                return Err(alignment_error(
                    join,
                    format!(
                        "dimension '{}' has {} labels in the first operand but {} in another",
                        name,
                        first.len(),
                        other.len()
                    ),
                ));
            }
            Ok((*first).clone())
        }
    }
}

/// Align all operands under `join`
///
/// Returns copies whose shared dimensions carry identical labels. Cells
/// introduced by reindexing are NaN.
///
/// # Errors
/// `AlignmentError` when the operands cannot be aligned under `join`.
pub fn check_alignment(fields: &[&Field], join: Join) -> Result<Vec<Field>> {
    // dimension name -> coordinates from every operand carrying it
    let mut by_dim: IndexMap<&str, Vec<&Coordinate>> = IndexMap::new();
    for field in fields {
        for coord in field.coords() {
            by_dim.entry(coord.name()).or_default().push(coord);
        }
    }

    let mut targets = Vec::with_capacity(by_dim.len());
    for (name, coords) in &by_dim {
        targets.push(joined_coordinate(name, coords, join).map_err(|e| match e {
            MaskError::InvalidCoordinate { name, detail } => {
                alignment_error(join, format!("dimension '{}': {}", name, detail))
            }
            other => other,
        })?);
    }

    let aligned = fields
        .iter()
        .map(|field| -> Result<Field> {
            let mut out = (*field).clone();
            for target in &targets {
                let differs = out.coord(target.name()).is_some_and(|c| c != target);
                if differs {
                    out = if join == Join::Override {
                        out.with_coord(target.clone())?
                    } else {
                        out.reindex(target, f64::NAN)?
                    };
                }
            }
            Ok(out)
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(operands = fields.len(), join = %join, "aligned operands");
    Ok(aligned)
}

/// Whether the operands can be aligned under `join`
pub fn is_aligned(fields: &[&Field], join: Join) -> bool {
    match check_alignment(fields, join) {
        Ok(_) => true,
        Err(e) => {
            debug!(join = %join, "align failed: {}", e);
            false
        }
    }
}

/// Align operands, then fold them left to right with `op`
pub fn operation_with_alignment(fields: &[&Field], op: ArithmeticOp, join: Join) -> Result<Field> {
    let aligned = check_alignment(fields, join).map_err(|e| {
        error!(operation = op.name(), join = %join, "{}", e);
        e
    })?;

    let mut iter = aligned.into_iter();
    let first = iter.next().ok_or(MaskError::EmptyInput)?;
    iter.try_fold(first, |acc, next| {
        zip_with(&acc, &next, |&a, &b| op.apply(a, b))
    })
}

pub fn add_with_alignment(fields: &[&Field], join: Join) -> Result<Field> {
    operation_with_alignment(fields, ArithmeticOp::Add, join)
}

pub fn multiply_with_alignment(fields: &[&Field], join: Join) -> Result<Field> {
    operation_with_alignment(fields, ArithmeticOp::Multiply, join)
}

pub fn subtract_with_alignment(a: &Field, b: &Field, join: Join) -> Result<Field> {
    operation_with_alignment(&[a, b], ArithmeticOp::Subtract, join)
}

pub fn divide_with_alignment(a: &Field, b: &Field, join: Join) -> Result<Field> {
    operation_with_alignment(&[a, b], ArithmeticOp::Divide, join)
}

/// `a` raised elementwise to the power `b`
pub fn power_with_alignment(a: &Field, b: &Field, join: Join) -> Result<Field> {
    operation_with_alignment(&[a, b], ArithmeticOp::Power, join)
}

/// Align, then broadcast every operand onto the union of dimensions
pub fn broadcast_with_alignment(fields: &[&Field], join: Join) -> Result<Vec<Field>> {
    let aligned = check_alignment(fields, join)?;

    let mut coords: Vec<Coordinate> = Vec::new();
    for field in &aligned {
        coords = broadcast_coords(&coords, field.coords())?;
    }

    aligned
        .iter()
        .map(|field| {
            let data = field.broadcast_to(&coords)?;
            Ok(LabeledArray::new(coords.clone(), data)?.with_attrs(field.attrs().clone()))
        })
        .collect()
}

/// The single data variable of a dataset
///
/// # Errors
/// `InvalidType` when the dataset holds zero or several variables.
pub fn ensure_data_array(grid: &Grid) -> Result<Field> {
    let mut variables = grid.variables();
    match (variables.next(), variables.next()) {
        (Some((name, field)), None) => {
            debug!(variable = name, "dataset reduced to its only variable");
            Ok(field.clone())
        }
        _ => Err(MaskError::InvalidType {
            what: "dataset".to_string(),
            expected: "exactly one data variable".to_string(),
            found: format!("{} variables", grid.variable_count()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn field(lat: &[f64], values: &[f64]) -> Field {
        LabeledArray::from_vec(vec![Coordinate::new("lat", lat.to_vec()).unwrap()], values.to_vec()).unwrap()
    }

    fn values(f: &Field) -> Vec<f64> {
        f.data().iter().copied().collect()
    }

    #[test]
    fn test_exact_join_rejects_different_labels() {
        let a = field(&[0.0, 1.0], &[1.0, 2.0]);
        let b = field(&[0.0, 2.0], &[1.0, 2.0]);
        assert!(!is_aligned(&[&a, &b], Join::Exact));
        let err = add_with_alignment(&[&a, &b], Join::Exact).unwrap_err();
        assert!(matches!(err, MaskError::AlignmentError { join: Join::Exact, .. }));
        assert!(err.to_string().contains("join='exact'"));
    }

    #[test]
    fn test_variadic_add_and_multiply() {
        let a = field(&[0.0, 1.0], &[1.0, 2.0]);
        let b = field(&[0.0, 1.0], &[3.0, 4.0]);
        let c = field(&[0.0, 1.0], &[5.0, 6.0]);
        assert_eq!(values(&add_with_alignment(&[&a, &b, &c], Join::Exact).unwrap()), vec![9.0, 12.0]);
        assert_eq!(values(&multiply_with_alignment(&[&a, &b, &c], Join::Exact).unwrap()), vec![15.0, 48.0]);
    }

    #[test]
    fn test_binary_operations() {
        let a = field(&[0.0, 1.0], &[2.0, 9.0]);
        let b = field(&[0.0, 1.0], &[4.0, 0.5]);
        assert_eq!(values(&subtract_with_alignment(&a, &b, Join::Exact).unwrap()), vec![-2.0, 8.5]);
        assert_eq!(values(&divide_with_alignment(&a, &b, Join::Exact).unwrap()), vec![0.5, 18.0]);
        let p = power_with_alignment(&a, &b, Join::Exact).unwrap();
        assert_relative_eq!(values(&p)[0], 16.0);
        assert_relative_eq!(values(&p)[1], 3.0);
    }

    #[test]
    fn test_inner_and_outer_joins() {
        let a = field(&[0.0, 1.0, 2.0], &[1.0, 2.0, 3.0]);
        let b = field(&[2.0, 1.0, 5.0], &[10.0, 20.0, 30.0]);

        let inner = add_with_alignment(&[&a, &b], Join::Inner).unwrap();
        assert_eq!(inner.coord("lat").unwrap().values(), &[1.0, 2.0]);
        assert_eq!(values(&inner), vec![22.0, 13.0]);

        let outer = add_with_alignment(&[&a, &b], Join::Outer).unwrap();
        assert_eq!(outer.coord("lat").unwrap().values(), &[0.0, 1.0, 2.0, 5.0]);
        let out = values(&outer);
        assert!(out[0].is_nan());
        assert_eq!(out[1], 22.0);
        assert!(out[3].is_nan());
    }

    #[test]
    fn test_left_right_override() {
        let a = field(&[0.0, 1.0], &[1.0, 2.0]);
        let b = field(&[1.0, 7.0], &[10.0, 20.0]);

        let left = add_with_alignment(&[&a, &b], Join::Left).unwrap();
        assert_eq!(left.coord("lat").unwrap().values(), &[0.0, 1.0]);
        assert!(values(&left)[0].is_nan());
        assert_eq!(values(&left)[1], 12.0);

        let right = add_with_alignment(&[&a, &b], Join::Right).unwrap();
        assert_eq!(right.coord("lat").unwrap().values(), &[1.0, 7.0]);

        let overridden = add_with_alignment(&[&a, &b], Join::Override).unwrap();
        assert_eq!(overridden.coord("lat").unwrap().values(), &[0.0, 1.0]);
        assert_eq!(values(&overridden), vec![11.0, 22.0]);

        let short = field(&[0.0], &[1.0]);
        assert!(!is_aligned(&[&a, &short], Join::Override));
    }

    #[test]
    fn test_broadcast_with_alignment() {
        let a = field(&[0.0, 1.0], &[1.0, 2.0]);
        let lon = Coordinate::new("lon", vec![0.0, 90.0, 180.0]).unwrap();
        let b = LabeledArray::from_vec(vec![lon], vec![1.0, 2.0, 3.0]).unwrap();

        let out = broadcast_with_alignment(&[&a, &b], Join::Exact).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].dims(), vec!["lat", "lon"]);
        assert_eq!(out[1].shape(), &[2, 3]);
        assert_eq!(values(&out[1])[5], 3.0);
    }

    #[test]
    fn test_ensure_data_array() {
        let a = field(&[0.0, 1.0], &[1.0, 2.0]);
        let single = Grid::from_field("tas", a.clone());
        assert_eq!(ensure_data_array(&single).unwrap(), a);

        let double = single.with_variable("pr", a).unwrap();
        assert!(ensure_data_array(&double).is_err());
    }

    #[test]
    fn test_join_parsing() {
        assert_eq!("outer".parse::<Join>().unwrap(), Join::Outer);
        assert_eq!(Join::default(), Join::Exact);
        assert!("sideways".parse::<Join>().is_err());
    }
}
