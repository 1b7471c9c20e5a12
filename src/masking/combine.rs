//! Mask Combination
//!
//! Folds masks with AND (intersection) or OR (union) left to right and
//! merges their provenance. Attributes with one value across all inputs
//! are kept verbatim; differing values are listed per input mask name.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{MaskError, Result};
use crate::grid::{zip_with, AttrValue, Attrs};
use crate::mask::{Mask, Provenance, MASK_NAME};

/// Logical operator joining masks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineOp {
    Intersection,
    Union,
}

impl CombineOp {
    /// Operator character in mask-name expressions
    pub fn symbol(&self) -> char {
        match self {
            CombineOp::Intersection => '&',
            CombineOp::Union => '|',
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CombineOp::Intersection => "intersection",
            CombineOp::Union => "union",
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '&' => Some(CombineOp::Intersection),
            '|' => Some(CombineOp::Union),
            _ => None,
        }
    }

    fn apply(&self, a: bool, b: bool) -> bool {
        match self {
            CombineOp::Intersection => a && b,
            CombineOp::Union => a || b,
        }
    }
}

impl fmt::Display for CombineOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Logical AND of all masks
pub fn intersection_of_masks(masks: &[&Mask]) -> Result<Mask> {
    combine_masks(masks, CombineOp::Intersection)
}

/// Logical OR of all masks
pub fn union_of_masks(masks: &[&Mask]) -> Result<Mask> {
    combine_masks(masks, CombineOp::Union)
}

/// Fold `masks` with `op`, broadcasting by dimension name
pub fn combine_masks(masks: &[&Mask], op: CombineOp) -> Result<Mask> {
    let (first, rest) = masks.split_first().ok_or_else(|| {
        error!("no masks to combine by {}", op);
        MaskError::EmptyInput
    })?;

    let mut values = first.values().clone();
    for mask in rest {
        values = zip_with(&values, mask.values(), |&a, &b| op.apply(a, b)).map_err(|source| {
            let diagnostics = masks
                .iter()
                .map(|m| format!("  {}", m.diagnostic()))
                .collect::<Vec<_>>()
                .join("\n");
            error!(method = op.label(), %source, "failed to combine masks");
            MaskError::CombinationError {
                method: op.label().to_string(),
                diagnostics,
                source: Box::new(source),
            }
        })?;
    }

    let symbol = op.symbol().to_string();
    let name = masks
        .iter()
        .map(|m| m.name())
        .collect::<Vec<_>>()
        .join(symbol.as_str());
    let provenance = Provenance::from_merged(name, merge_attributes(masks, op));

    debug!(mask = provenance.mask_name(), method = op.label(), inputs = masks.len(), "combined masks");
    Ok(Mask::new(values.with_attrs(Attrs::new()), provenance))
}

/// Merge provenance attributes of `masks` (mask_name excluded)
pub fn merge_attributes(masks: &[&Mask], op: CombineOp) -> Attrs {
    // attribute -> (mask name -> value), both in first-seen order
    let mut collected: IndexMap<&str, IndexMap<&str, &AttrValue>> = IndexMap::new();
    for mask in masks {
        for (key, value) in mask.provenance().attributes() {
            if key == MASK_NAME {
                continue;
            }
            collected.entry(key).or_default().insert(mask.name(), value);
        }
    }

    collected
        .into_iter()
        .map(|(key, per_mask)| {
            let mut values = per_mask.values();
            let merged = match values.next() {
                Some(first) if values.all(|v| v == first) => (*first).clone(),
                _ => {
                    let listed = per_mask
                        .iter()
                        .map(|(name, value)| format!("{}: {}", name, value))
                        .collect::<Vec<_>>()
                        .join(",\n");
                    AttrValue::Text(format!("{} of:\n{}", op.label(), listed))
                }
            };
            (key.to_string(), merged)
        })
        .collect()
}
