//! Coordinate Masks
//!
//! Validation of candidate coordinate values, resolution of (min, max)
//! ranges against a dimension's labels, and construction of boolean masks
//! along one dimension.
//!
//! Range modes: `inclusive`, `inclusive_min` and `inclusive_max` are accepted
//! but resolve exactly like `exclusive` (open interval), with a warning.
//! Cell-boundary handling for those modes is not implemented.

use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{MaskError, Result};
use crate::grid::{label_key, CoordSource, Coordinate, Field, LabeledArray};
use crate::mask::{Mask, MaskKind, Provenance};

/// How range endpoints are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeMode {
    Inclusive,
    #[default]
    Exclusive,
    InclusiveMin,
    InclusiveMax,
}

impl RangeMode {
    pub const ALL: [RangeMode; 4] = [
        RangeMode::Inclusive,
        RangeMode::Exclusive,
        RangeMode::InclusiveMin,
        RangeMode::InclusiveMax,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RangeMode::Inclusive => "inclusive",
            RangeMode::Exclusive => "exclusive",
            RangeMode::InclusiveMin => "inclusive_min",
            RangeMode::InclusiveMax => "inclusive_max",
        }
    }
}

impl FromStr for RangeMode {
    type Err = MaskError;

    fn from_str(s: &str) -> Result<Self> {
        RangeMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| {
                error!(range_mode = s, "invalid range mode");
                MaskError::InvalidRangeMode(s.to_string())
            })
    }
}

impl fmt::Display for RangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed interval of values a coordinate may take
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidRange {
    pub min: f64,
    pub max: f64,
}

impl ValidRange {
    pub const LATITUDE: ValidRange = ValidRange { min: -90.0, max: 90.0 };
    pub const LONGITUDE: ValidRange = ValidRange { min: 0.0, max: 360.0 };

    /// Boundary values are valid
    pub fn contains(&self, value: f64) -> bool {
        !(value < self.min || value > self.max)
    }
}

/// Requested coordinate values: explicit labels or a (min, max) range
#[derive(Debug, Clone, PartialEq)]
pub enum CoordSelection {
    Values(Vec<f64>),
    Range(f64, f64),
}

impl CoordSelection {
    /// Range from a slice that must hold exactly two bounds
    pub fn range(bounds: &[f64]) -> Result<Self> {
        match bounds {
            [min, max] => Ok(CoordSelection::Range(*min, *max)),
            other => Err(MaskError::InvalidRangeTuple(other.len())),
        }
    }

    /// Parse a JSON selection: `[v1, v2, ...]`, `{"values": [...]}` or `{"range": [min, max]}`
    pub fn from_json(value: &Value, what: &str) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(CoordSelection::Values(numbers(items, what)?)),
            Value::Object(map) => {
                if let Some(range) = map.get("range") {
                    let Value::Array(items) = range else {
                        return Err(MaskError::InvalidType {
                            what: format!("{} range", what),
                            expected: "a [min, max] pair".to_string(),
                            found: json_kind(range).to_string(),
                        });
                    };
                    if items.len() != 2 {
                        return Err(MaskError::InvalidRangeTuple(items.len()));
                    }
                    Self::range(&numbers(items, what)?)
                } else if let Some(Value::Array(items)) = map.get("values") {
                    Ok(CoordSelection::Values(numbers(items, what)?))
                } else {
                    Err(MaskError::InvalidType {
                        what: what.to_string(),
                        expected: "an object with a 'range' or 'values' entry".to_string(),
                        found: format!("object with keys {:?}", map.keys().collect::<Vec<_>>()),
                    })
                }
            }
            other => Err(MaskError::InvalidType {
                what: what.to_string(),
                expected: "a numeric sequence or a {\"range\": [min, max]} pair".to_string(),
                found: json_kind(other).to_string(),
            }),
        }
    }
}

impl fmt::Display for CoordSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordSelection::Values(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            CoordSelection::Range(min, max) => write!(f, "({}, {})", min, max),
        }
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn numbers(items: &[Value], what: &str) -> Result<Vec<f64>> {
    items
        .iter()
        .map(|item| {
            item.as_f64().ok_or_else(|| MaskError::InvalidType {
                what: what.to_string(),
                expected: "numeric values".to_string(),
                found: json_kind(item).to_string(),
            })
        })
        .collect()
}

/// Reject explicit values outside `valid`; ranges are not checked value by value
pub fn validate_selection(
    selection: &CoordSelection,
    valid: ValidRange,
    coord_name: &str,
) -> Result<()> {
    let CoordSelection::Values(values) = selection else {
        return Ok(());
    };

    let bad: Vec<f64> = values
        .iter()
        .copied()
        .filter(|&v| !valid.contains(v))
        .collect();
    if !bad.is_empty() {
        error!(
            coord = coord_name,
            min = valid.min,
            max = valid.max,
            invalid = ?bad,
            "coordinate values outside valid range"
        );
        return Err(MaskError::OutOfRange {
            what: coord_name.to_string(),
            min: valid.min,
            max: valid.max,
            values: bad,
        });
    }
    Ok(())
}

/// Coordinate labels falling inside `(min, max)`
///
/// Every mode currently resolves to the open interval; non-exclusive modes
/// log a warning.
pub fn resolve_range(
    bounds: (f64, f64),
    coord: &Coordinate,
    valid: ValidRange,
    mode: RangeMode,
) -> Vec<f64> {
    if mode != RangeMode::Exclusive {
        warn!(
            range_mode = %mode,
            dim = coord.name(),
            domain_min = valid.min,
            domain_max = valid.max,
            "inclusive range modes are not yet implemented, using exclusive mode instead"
        );
    }

    let (min, max) = bounds;
    coord
        .values()
        .iter()
        .copied()
        .filter(|&v| v > min && v < max)
        .collect()
}

/// Dimension, domain and range handling for one coordinate mask
#[derive(Debug, Clone, PartialEq)]
pub struct CoordMaskOptions {
    pub dim: String,
    pub valid_range: ValidRange,
    pub range_mode: RangeMode,
}

impl CoordMaskOptions {
    pub fn latitude() -> Self {
        Self {
            dim: "lat".to_string(),
            valid_range: ValidRange::LATITUDE,
            range_mode: RangeMode::Exclusive,
        }
    }

    pub fn longitude() -> Self {
        Self {
            dim: "lon".to_string(),
            valid_range: ValidRange::LONGITUDE,
            range_mode: RangeMode::Exclusive,
        }
    }

    pub fn with_range_mode(mut self, range_mode: RangeMode) -> Self {
        self.range_mode = range_mode;
        self
    }

    pub fn with_dim(mut self, dim: &str) -> Self {
        self.dim = dim.to_string();
        self
    }
}

/// Boolean mask along `options.dim` selecting the requested labels
///
/// Membership is tested against the resolved label set, not by comparing
/// each label to the range again.
pub fn create_coord_mask<S: CoordSource + ?Sized>(
    data: &S,
    selection: &CoordSelection,
    options: &CoordMaskOptions,
    coord_name: &str,
    mask_name: &str,
) -> Result<Mask> {
    validate_selection(selection, options.valid_range, coord_name)?;
    let coord = data.coordinate(&options.dim)?;

    let targets = match selection {
        CoordSelection::Values(values) => values.clone(),
        CoordSelection::Range(min, max) => {
            resolve_range((*min, *max), coord, options.valid_range, options.range_mode)
        }
    };
    let target_keys: FxHashSet<u64> = targets.iter().map(|&v| label_key(v)).collect();
    let selected: Vec<bool> = coord
        .values()
        .iter()
        .map(|&v| target_keys.contains(&label_key(v)))
        .collect();

    let values = LabeledArray::from_vec(vec![coord.clone()], selected)?;
    let provenance = Provenance::new(
        mask_name,
        MaskKind::Coord(coord_name.to_string()),
        format!(
            "Mask for {} values {} along dimension '{}' with range mode '{}'.",
            coord_name, selection, options.dim, options.range_mode
        ),
    );

    debug!(
        mask = mask_name,
        dim = %options.dim,
        selected = targets.len(),
        "created coordinate mask"
    );
    Ok(Mask::new(values, provenance))
}

/// Latitude mask on `lat` with domain [-90, 90]
pub fn create_latitude_mask<S: CoordSource + ?Sized>(
    data: &S,
    latitudes: &CoordSelection,
    mask_name: &str,
    range_mode: RangeMode,
) -> Result<Mask> {
    let options = CoordMaskOptions::latitude().with_range_mode(range_mode);
    create_coord_mask(data, latitudes, &options, "lat", mask_name)
}

/// Longitude mask on `lon` with domain [0, 360]
pub fn create_longitude_mask<S: CoordSource + ?Sized>(
    data: &S,
    longitudes: &CoordSelection,
    mask_name: &str,
    range_mode: RangeMode,
) -> Result<Mask> {
    let options = CoordMaskOptions::longitude().with_range_mode(range_mode);
    create_coord_mask(data, longitudes, &options, "lon", mask_name)
}

/// Shift `lon` labels from -180..180 to 0..360
pub fn fix_lon_coord(field: &Field) -> Result<Field> {
    let lon = field
        .coord("lon")
        .ok_or_else(|| MaskError::MissingCoordinate("lon".to_string()))?;
    let shifted: Vec<f64> = lon
        .values()
        .iter()
        .map(|&v| if v < 0.0 { v + 360.0 } else { v })
        .collect();
    field.with_coord(Coordinate::new("lon", shifted)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lat_field() -> Field {
        let lat = Coordinate::new("lat", vec![-90.0, -60.0, -30.0, 0.0, 30.0, 60.0, 90.0]).unwrap();
        LabeledArray::filled(vec![lat], 1.0).unwrap()
    }

    fn selected(mask: &Mask) -> Vec<bool> {
        mask.values().data().iter().copied().collect()
    }

    #[test]
    fn test_exclusive_excludes_endpoints_on_grid() {
        let field = lat_field();
        let coord = field.coord("lat").unwrap();
        let resolved = resolve_range((30.0, 90.0), coord, ValidRange::LATITUDE, RangeMode::Exclusive);
        assert_eq!(resolved, vec![60.0]);
    }

    #[test]
    fn test_all_modes_match_exclusive() {
        let field = lat_field();
        let coord = field.coord("lat").unwrap();
        let exclusive = resolve_range((-60.0, 30.0), coord, ValidRange::LATITUDE, RangeMode::Exclusive);
        for mode in RangeMode::ALL {
            let resolved = resolve_range((-60.0, 30.0), coord, ValidRange::LATITUDE, mode);
            assert_eq!(resolved, exclusive, "mode {}", mode);
        }
    }

    #[test]
    fn test_range_mode_parsing() {
        assert_eq!("inclusive_max".parse::<RangeMode>().unwrap(), RangeMode::InclusiveMax);
        let err = "half_open".parse::<RangeMode>().unwrap_err();
        assert!(matches!(err, MaskError::InvalidRangeMode(ref m) if m == "half_open"));
    }

    #[test]
    fn test_out_of_range_lists_every_offender() {
        let err = create_latitude_mask(
            &lat_field(),
            &CoordSelection::Values(vec![0.0, 95.0, -91.0, 90.0]),
            "bad",
            RangeMode::Exclusive,
        )
        .unwrap_err();

        match err {
            MaskError::OutOfRange { values, .. } => assert_eq!(values, vec![95.0, -91.0]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_boundary_values_are_valid() {
        let mask = create_latitude_mask(
            &lat_field(),
            &CoordSelection::Values(vec![-90.0, 90.0]),
            "poles",
            RangeMode::Exclusive,
        )
        .unwrap();
        assert_eq!(selected(&mask), vec![true, false, false, false, false, false, true]);
    }

    #[test]
    fn test_range_mask_provenance() {
        let mask = create_latitude_mask(
            &lat_field(),
            &CoordSelection::Range(0.0, 90.0),
            "NH",
            RangeMode::Exclusive,
        )
        .unwrap();

        assert_eq!(selected(&mask), vec![false, false, false, false, true, true, false]);
        assert_eq!(mask.name(), "NH");
        assert_eq!(mask.provenance().mask_type().to_string(), "lat_mask");
        assert_eq!(
            mask.provenance().mask_description().to_string(),
            "Mask for lat values (0, 90) along dimension 'lat' with range mode 'exclusive'."
        );
    }

    #[test]
    fn test_selection_from_json() {
        assert_eq!(
            CoordSelection::from_json(&json!([10, 20.5]), "lon").unwrap(),
            CoordSelection::Values(vec![10.0, 20.5])
        );
        assert_eq!(
            CoordSelection::from_json(&json!({"range": [300, 350]}), "lon").unwrap(),
            CoordSelection::Range(300.0, 350.0)
        );
        assert!(matches!(
            CoordSelection::from_json(&json!({"range": [1, 2, 3]}), "lon"),
            Err(MaskError::InvalidRangeTuple(3))
        ));
        assert!(matches!(
            CoordSelection::from_json(&json!("north"), "lon"),
            Err(MaskError::InvalidType { .. })
        ));
        assert!(matches!(
            CoordSelection::from_json(&json!([1, "x"]), "lon"),
            Err(MaskError::InvalidType { .. })
        ));
    }

    #[test]
    fn test_fix_lon_coord() {
        let lon = Coordinate::new("lon", vec![-90.0, 0.0, 90.0]).unwrap();
        let field = LabeledArray::from_vec(vec![lon], vec![1.0, 2.0, 3.0]).unwrap();
        let fixed = fix_lon_coord(&field).unwrap();
        assert_eq!(fixed.coord("lon").unwrap().values(), &[270.0, 0.0, 90.0]);
    }
}
