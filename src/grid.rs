//! Labeled Grids
//!
//! Minimal labeled-array model the masking core works on:
//! - `Coordinate`: a named, ordered sequence of unique numeric labels
//! - `LabeledArray<T>`: an `ndarray` buffer with one coordinate per axis
//! - `Grid`: a dataset of shared coordinates plus named float variables
//!
//! Binary operations broadcast by dimension name: the result carries the
//! union of both operands' dimensions, and dimensions present in both must
//! carry the same label set. When the order differs, the second operand is
//! reordered onto the first's labels.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use ndarray::{ArrayD, Axis, IxDyn, Zip};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{MaskError, Result};

/// Attribute value attached to arrays and masks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Number(f64),
    Text(String),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            AttrValue::Number(_) => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Number(n) => write!(f, "{}", n),
            AttrValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Number(n)
    }
}

pub type Attrs = BTreeMap<String, AttrValue>;

/// Hash key for a coordinate label (`-0.0` and `0.0` share a key)
pub(crate) fn label_key(value: f64) -> u64 {
    (value + 0.0).to_bits()
}

/// Named, ordered coordinate labels for one dimension
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    name: String,
    values: Vec<f64>,
}

impl Coordinate {
    /// Create a coordinate, rejecting NaN and duplicate labels
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        let name = name.into();
        let mut seen = FxHashSet::default();

        for &value in &values {
            if value.is_nan() {
                return Err(MaskError::InvalidCoordinate {
                    name,
                    detail: "NaN is not a valid label".to_string(),
                });
            }
            if !seen.insert(label_key(value)) {
                return Err(MaskError::InvalidCoordinate {
                    name,
                    detail: format!("duplicate label {}", value),
                });
            }
        }

        Ok(Self { name, values })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Position of an exact label match
    pub fn position(&self, value: f64) -> Option<usize> {
        self.values.iter().position(|&v| v == value)
    }
}

/// N-dimensional array with one named coordinate per axis
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledArray<T> {
    coords: Vec<Coordinate>,
    data: ArrayD<T>,
    attrs: Attrs,
}

/// Float-valued labeled array (data variables, fraction fields, weights)
pub type Field = LabeledArray<f64>;

impl<T: Clone> LabeledArray<T> {
    pub fn new(coords: Vec<Coordinate>, data: ArrayD<T>) -> Result<Self> {
        check_unique_dims(&coords)?;

        let expected: Vec<usize> = coords.iter().map(Coordinate::len).collect();
        if data.shape() != expected.as_slice() {
            return Err(MaskError::ShapeMismatch(format!(
                "data shape {:?} does not match coordinate lengths {:?} for dims {:?}",
                data.shape(),
                expected,
                coords.iter().map(Coordinate::name).collect::<Vec<_>>()
            )));
        }

        Ok(Self {
            coords,
            data,
            attrs: Attrs::new(),
        })
    }

    /// Build from row-major values
    pub fn from_vec(coords: Vec<Coordinate>, values: Vec<T>) -> Result<Self> {
        let shape: Vec<usize> = coords.iter().map(Coordinate::len).collect();
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values)
            .map_err(|e| MaskError::ShapeMismatch(e.to_string()))?;
        Self::new(coords, data)
    }

    pub fn filled(coords: Vec<Coordinate>, value: T) -> Result<Self> {
        let shape: Vec<usize> = coords.iter().map(Coordinate::len).collect();
        Self::new(coords, ArrayD::from_elem(IxDyn(&shape), value))
    }

    pub fn with_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn dims(&self) -> Vec<&str> {
        self.coords.iter().map(Coordinate::name).collect()
    }

    pub fn coords(&self) -> &[Coordinate] {
        &self.coords
    }

    pub fn coord(&self, dim: &str) -> Option<&Coordinate> {
        self.coords.iter().find(|c| c.name() == dim)
    }

    pub fn has_dim(&self, dim: &str) -> bool {
        self.axis_of(dim).is_some()
    }

    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.coords.iter().position(|c| c.name() == dim)
    }

    pub fn data(&self) -> &ArrayD<T> {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Elementwise map keeping coordinates and attributes
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> LabeledArray<U> {
        LabeledArray {
            coords: self.coords.clone(),
            data: self.data.map(f),
            attrs: self.attrs.clone(),
        }
    }

    /// Drop `dim` by keeping its first slice; arrays without `dim` come back unchanged
    pub fn first_along(&self, dim: &str) -> Result<Self> {
        let Some(axis) = self.axis_of(dim) else {
            return Ok(self.clone());
        };
        if self.coords[axis].is_empty() {
            return Err(MaskError::ShapeMismatch(format!(
                "cannot take the first slice of empty dimension '{}'",
                dim
            )));
        }

        let data = self.data.index_axis(Axis(axis), 0).to_owned();
        let mut coords = self.coords.clone();
        coords.remove(axis);

        Ok(Self {
            coords,
            data,
            attrs: self.attrs.clone(),
        })
    }

    /// Reorder values along `target`'s dimension to follow its labels,
    /// using `fill` for labels this array does not have
    pub fn reindex(&self, target: &Coordinate, fill: T) -> Result<Self> {
        let axis = self
            .axis_of(target.name())
            .ok_or_else(|| MaskError::MissingCoordinate(target.name().to_string()))?;
        let source = &self.coords[axis];
        let mapping: Vec<Option<usize>> = target
            .values()
            .iter()
            .map(|&v| source.position(v))
            .collect();

        let mut shape = self.shape().to_vec();
        shape[axis] = target.len();

        let data = ArrayD::from_shape_fn(IxDyn(&shape), |idx| match mapping[idx[axis]] {
            Some(pos) => {
                let mut src = idx.clone();
                src[axis] = pos;
                self.data[src].clone()
            }
            None => fill.clone(),
        });

        let mut coords = self.coords.clone();
        coords[axis] = target.clone();

        Ok(Self {
            coords,
            data,
            attrs: self.attrs.clone(),
        })
    }

    /// Reorder along `target`'s dimension; `target` must hold exactly our labels
    pub fn reordered(&self, target: &Coordinate) -> Result<Self> {
        let axis = self
            .axis_of(target.name())
            .ok_or_else(|| MaskError::MissingCoordinate(target.name().to_string()))?;
        let source = &self.coords[axis];
        let positions = target
            .values()
            .iter()
            .map(|&v| source.position(v))
            .collect::<Option<Vec<usize>>>()
            .filter(|p| p.len() == source.len())
            .ok_or_else(|| MaskError::NotBroadcastable {
                what: format!("dimension '{}'", target.name()),
                detail: "label sets differ".to_string(),
            })?;

        let mut coords = self.coords.clone();
        coords[axis] = target.clone();

        Ok(Self {
            coords,
            data: self.data.select(Axis(axis), &positions),
            attrs: self.attrs.clone(),
        })
    }

    /// Replace the labels of an existing dimension (lengths must agree)
    pub fn with_coord(&self, coord: Coordinate) -> Result<Self> {
        let axis = self
            .axis_of(coord.name())
            .ok_or_else(|| MaskError::MissingCoordinate(coord.name().to_string()))?;
        if self.coords[axis].len() != coord.len() {
            return Err(MaskError::ShapeMismatch(format!(
                "dimension '{}' has {} labels, replacement has {}",
                coord.name(),
                self.coords[axis].len(),
                coord.len()
            )));
        }

        let mut out = self.clone();
        out.coords[axis] = coord;
        Ok(out)
    }

    /// Broadcast onto `target` dimensions (a superset of ours, same labels on shared dims)
    pub fn broadcast_to(&self, target: &[Coordinate]) -> Result<ArrayD<T>> {
        let mut positions = Vec::with_capacity(self.coords.len());
        for coord in &self.coords {
            let pos = target
                .iter()
                .position(|t| t.name() == coord.name())
                .ok_or_else(|| MaskError::NotBroadcastable {
                    what: format!("dimension '{}'", coord.name()),
                    detail: "dimension is missing from the broadcast target".to_string(),
                })?;
            if target[pos] != *coord {
                return Err(MaskError::NotBroadcastable {
                    what: format!("dimension '{}'", coord.name()),
                    detail: "coordinate labels differ from the broadcast target".to_string(),
                });
            }
            positions.push(pos);
        }

        // Permute our axes into target order, then insert the missing ones
        let mut order: Vec<usize> = (0..positions.len()).collect();
        order.sort_by_key(|&i| positions[i]);
        let present: FxHashSet<usize> = positions.iter().copied().collect();

        let mut view = self.data.view().permuted_axes(order);
        for t_axis in 0..target.len() {
            if !present.contains(&t_axis) {
                view = view.insert_axis(Axis(t_axis));
            }
        }

        let shape: Vec<usize> = target.iter().map(Coordinate::len).collect();
        let broadcast = view
            .broadcast(IxDyn(&shape))
            .ok_or_else(|| MaskError::NotBroadcastable {
                what: format!("array with dims {:?}", self.dims()),
                detail: format!("cannot broadcast shape {:?} to {:?}", self.shape(), shape),
            })?;

        Ok(broadcast.to_owned())
    }
}

fn check_unique_dims(coords: &[Coordinate]) -> Result<()> {
    let mut seen = FxHashSet::default();
    for coord in coords {
        if !seen.insert(coord.name()) {
            return Err(MaskError::InvalidCoordinate {
                name: coord.name().to_string(),
                detail: "dimension appears more than once".to_string(),
            });
        }
    }
    Ok(())
}

/// Union of dimensions in order of first appearance
///
/// Dimensions present on both sides must carry identical labels.
pub fn broadcast_coords(a: &[Coordinate], b: &[Coordinate]) -> Result<Vec<Coordinate>> {
    let mut out = a.to_vec();
    for coord in b {
        match out.iter().find(|o| o.name() == coord.name()) {
            Some(existing) if existing != coord => {
                return Err(MaskError::NotBroadcastable {
                    what: format!("dimension '{}'", coord.name()),
                    detail: format!(
                        "labels differ ({} vs {} values)",
                        existing.len(),
                        coord.len()
                    ),
                });
            }
            Some(_) => {}
            None => out.push(coord.clone()),
        }
    }
    Ok(out)
}

/// `b` with every dimension shared with `a` in `a`'s label order
///
/// Dimensions whose label sets differ are left alone for
/// `broadcast_coords` to reject.
fn match_label_order<'b, A: Clone, B: Clone>(
    a: &LabeledArray<A>,
    b: &'b LabeledArray<B>,
) -> Result<Cow<'b, LabeledArray<B>>> {
    let mut out = Cow::Borrowed(b);
    for coord in a.coords() {
        let same_set = match out.coord(coord.name()) {
            Some(other) if other != coord => {
                other.len() == coord.len()
                    && coord.values().iter().all(|&v| other.position(v).is_some())
            }
            _ => false,
        };
        if same_set {
            let reordered = out.reordered(coord)?;
            out = Cow::Owned(reordered);
        }
    }
    Ok(out)
}

/// Elementwise combination broadcasting by dimension name; attrs follow `a`
pub fn zip_with<A: Clone, B: Clone, C>(
    a: &LabeledArray<A>,
    b: &LabeledArray<B>,
    f: impl Fn(&A, &B) -> C,
) -> Result<LabeledArray<C>> {
    let b = match_label_order(a, b)?;
    let coords = broadcast_coords(a.coords(), b.coords())?;
    let left = a.broadcast_to(&coords)?;
    let right = b.broadcast_to(&coords)?;
    let data = Zip::from(&left).and(&right).map_collect(|x, y| f(x, y));

    Ok(LabeledArray {
        coords,
        data,
        attrs: a.attrs.clone(),
    })
}

/// Anything mask builders can look coordinates up on
pub trait CoordSource {
    fn coordinate(&self, dim: &str) -> Result<&Coordinate>;
}

impl<T: Clone> CoordSource for LabeledArray<T> {
    fn coordinate(&self, dim: &str) -> Result<&Coordinate> {
        self.coord(dim)
            .ok_or_else(|| MaskError::MissingCoordinate(dim.to_string()))
    }
}

impl CoordSource for Grid {
    fn coordinate(&self, dim: &str) -> Result<&Coordinate> {
        self.coord(dim)
    }
}

/// Dataset: shared coordinates plus named float variables
#[derive(Debug, Clone, Default)]
pub struct Grid {
    coords: Vec<Coordinate>,
    variables: BTreeMap<String, Field>,
    attrs: Attrs,
}

impl Grid {
    pub fn new(coords: Vec<Coordinate>) -> Result<Self> {
        check_unique_dims(&coords)?;
        Ok(Self {
            coords,
            variables: BTreeMap::new(),
            attrs: Attrs::new(),
        })
    }

    /// Dataset holding a single variable, coordinates taken from it
    pub fn from_field(name: &str, field: Field) -> Self {
        let mut variables = BTreeMap::new();
        let coords = field.coords().to_vec();
        variables.insert(name.to_string(), field);
        Self {
            coords,
            variables,
            attrs: Attrs::new(),
        }
    }

    /// Add a variable; its dimensions must agree with (or extend) the grid's
    pub fn with_variable(mut self, name: &str, field: Field) -> Result<Self> {
        self.coords = broadcast_coords(&self.coords, field.coords())?;
        self.variables.insert(name.to_string(), field);
        Ok(self)
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn coords(&self) -> &[Coordinate] {
        &self.coords
    }

    pub fn coord(&self, name: &str) -> Result<&Coordinate> {
        self.coords
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| MaskError::MissingCoordinate(name.to_string()))
    }

    pub fn has_coord(&self, name: &str) -> bool {
        self.coords.iter().any(|c| c.name() == name)
    }

    pub fn variable(&self, name: &str) -> Option<&Field> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }
}
