//! Masks and their provenance
//!
//! A `Mask` is a boolean `LabeledArray` plus an immutable `Provenance`
//! record. Builders attach provenance at construction; the combinator
//! produces a new provenance value instead of editing its inputs.

use std::fmt;

use crate::grid::{AttrValue, Attrs, Coordinate, LabeledArray};

pub const MASK_NAME: &str = "mask_name";
pub const MASK_TYPE: &str = "mask_type";
pub const MASK_DESCRIPTION: &str = "mask_description";

/// Kind of mask a builder produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskKind {
    /// Coordinate mask along the named coordinate (`lat_mask`, `lon_mask`, ...)
    Coord(String),
    SurfaceType,
    Region,
    Global,
}

impl MaskKind {
    /// Value stored in the `mask_type` attribute
    pub fn type_label(&self) -> String {
        match self {
            MaskKind::Coord(coord_name) => format!("{}_mask", coord_name),
            MaskKind::SurfaceType => "surface_type_mask".to_string(),
            MaskKind::Region => "region_mask".to_string(),
            MaskKind::Global => "global_mask".to_string(),
        }
    }
}

/// Human-readable provenance carried by every mask
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    mask_name: String,
    mask_type: AttrValue,
    mask_description: AttrValue,
    extra: Attrs,
}

impl Provenance {
    pub fn new(mask_name: &str, kind: MaskKind, description: impl Into<String>) -> Self {
        Self {
            mask_name: mask_name.to_string(),
            mask_type: AttrValue::Text(kind.type_label()),
            mask_description: AttrValue::Text(description.into()),
            extra: Attrs::new(),
        }
    }

    /// Rebuild provenance from a merged attribute map (mask_name excluded)
    pub(crate) fn from_merged(mask_name: String, mut attrs: Attrs) -> Self {
        let mask_type = attrs
            .remove(MASK_TYPE)
            .unwrap_or_else(|| AttrValue::Text(String::new()));
        let mask_description = attrs
            .remove(MASK_DESCRIPTION)
            .unwrap_or_else(|| AttrValue::Text(String::new()));
        Self {
            mask_name,
            mask_type,
            mask_description,
            extra: attrs,
        }
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn with_name(mut self, mask_name: &str) -> Self {
        self.mask_name = mask_name.to_string();
        self
    }

    pub fn mask_name(&self) -> &str {
        &self.mask_name
    }

    pub fn mask_type(&self) -> &AttrValue {
        &self.mask_type
    }

    pub fn mask_description(&self) -> &AttrValue {
        &self.mask_description
    }

    pub fn extra(&self) -> &Attrs {
        &self.extra
    }

    /// Every attribute except `mask_name`, in a stable order
    pub fn attributes(&self) -> Vec<(&str, &AttrValue)> {
        let mut out = vec![
            (MASK_TYPE, &self.mask_type),
            (MASK_DESCRIPTION, &self.mask_description),
        ];
        out.extend(self.extra.iter().map(|(k, v)| (k.as_str(), v)));
        out
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        match key {
            MASK_TYPE => Some(&self.mask_type),
            MASK_DESCRIPTION => Some(&self.mask_description),
            _ => self.extra.get(key),
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", MASK_NAME, self.mask_name)?;
        for (key, value) in self.attributes() {
            write!(f, "; {}: {}", key, value)?;
        }
        Ok(())
    }
}

/// Boolean mask with provenance
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    values: LabeledArray<bool>,
    provenance: Provenance,
}

impl Mask {
    pub fn new(values: LabeledArray<bool>, provenance: Provenance) -> Self {
        Self { values, provenance }
    }

    pub fn values(&self) -> &LabeledArray<bool> {
        &self.values
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn name(&self) -> &str {
        self.provenance.mask_name()
    }

    pub fn dims(&self) -> Vec<&str> {
        self.values.dims()
    }

    pub fn coords(&self) -> &[Coordinate] {
        self.values.coords()
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    /// Number of selected cells
    pub fn count_true(&self) -> usize {
        self.values.data().iter().filter(|&&v| v).count()
    }

    /// Same values under a new `mask_name`
    pub fn renamed(&self, mask_name: &str) -> Self {
        Self {
            values: self.values.clone(),
            provenance: self.provenance.clone().with_name(mask_name),
        }
    }

    /// Logical NOT, provenance unchanged
    pub fn negated(&self) -> Self {
        Self {
            values: self.values.map(|v| !v),
            provenance: self.provenance.clone(),
        }
    }

    /// One-line description of shape and attributes for diagnostics
    pub fn diagnostic(&self) -> String {
        format!(
            "{}: dims {:?}, shape {:?}, attrs [{}]",
            self.name(),
            self.dims(),
            self.shape(),
            self.provenance
        )
    }
}
