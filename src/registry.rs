//! Mask Registry
//!
//! Maps requested mask names onto builders and returns every mask built.
//!
//! Name grammar:
//! - atom: `global`, a latitude band preset, `land`, `ocean`, a region
//!   abbreviation from the catalog, or a configured custom mask
//! - compound: atoms joined by exactly one operator, `a&b[&c...]` (AND) or
//!   `a|b[|c...]` (OR); no nesting, no mixing
//!
//! Top-level atoms are built first and may use the supplied fraction
//! fields. AND-compounds are built next, then OR-compounds; atoms a compound
//! needs that were not requested on their own are built without fraction
//! fields. Each compound is stored under its full expression.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;
use smallvec::SmallVec;
use tracing::{debug, error, info};

use crate::config::{CustomMaskConfig, MaskConfig};
use crate::error::{MaskError, Result};
use crate::grid::{Field, Grid, LabeledArray};
use crate::mask::{Mask, MaskKind, Provenance};
use crate::masking::coord::json_kind;
use crate::masking::{
    combine_masks, create_coord_mask, create_land_mask, create_latitude_mask, create_region_mask,
    create_sea_mask, validate_selection, CombineOp, CoordMaskOptions, CoordSelection, RangeMode,
    RegionCatalog, ValidRange, DEFAULT_FRACTION_THRESHOLD,
};

/// Masks in build order, keyed by the name they were requested under
pub type MaskSet = IndexMap<String, Mask>;

/// Preset latitude bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LatitudeBand {
    NhPolar,
    NhMidlat,
    NhTropics,
    Tropics,
    ShPolar,
    ShMidlat,
    ShTropics,
}

impl LatitudeBand {
    pub const ALL: [LatitudeBand; 7] = [
        LatitudeBand::NhPolar,
        LatitudeBand::NhMidlat,
        LatitudeBand::NhTropics,
        LatitudeBand::Tropics,
        LatitudeBand::ShPolar,
        LatitudeBand::ShMidlat,
        LatitudeBand::ShTropics,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LatitudeBand::NhPolar => "NH_polar",
            LatitudeBand::NhMidlat => "NH_midlat",
            LatitudeBand::NhTropics => "NH_tropics",
            LatitudeBand::Tropics => "tropics",
            LatitudeBand::ShPolar => "SH_polar",
            LatitudeBand::ShMidlat => "SH_midlat",
            LatitudeBand::ShTropics => "SH_tropics",
        }
    }

    /// (min, max) latitude bounds
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            LatitudeBand::NhPolar => (60.0, 90.0),
            LatitudeBand::NhMidlat => (30.0, 60.0),
            LatitudeBand::NhTropics => (0.0, 30.0),
            LatitudeBand::Tropics => (-30.0, 30.0),
            LatitudeBand::ShPolar => (-90.0, -60.0),
            LatitudeBand::ShMidlat => (-60.0, -30.0),
            LatitudeBand::ShTropics => (-30.0, 0.0),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|band| band.name() == name)
    }
}

/// User-defined atomic coordinate mask
#[derive(Debug, Clone, PartialEq)]
pub struct CustomMaskSpec {
    pub name: String,
    pub selection: CoordSelection,
    pub options: CoordMaskOptions,
}

impl CustomMaskSpec {
    /// Validate a configured custom mask
    ///
    /// # Errors
    /// `InvalidType`, `InvalidRangeTuple`, `InvalidRangeMode` or `OutOfRange`
    /// for a malformed selection.
    pub fn from_config(config: &CustomMaskConfig) -> Result<Self> {
        let what = format!("selection of custom mask '{}'", config.name);
        let selection = CoordSelection::from_json(&config.selection, &what)?;
        let range_mode = match &config.range_mode {
            Some(mode) => mode.parse::<RangeMode>()?,
            None => RangeMode::default(),
        };
        let valid_range = match config.valid_range {
            Some((min, max)) => ValidRange { min, max },
            None => default_valid_range(&config.dim),
        };

        validate_selection(&selection, valid_range, &config.dim)
            .map_err(|e| e.in_mask(&config.name))?;

        Ok(Self {
            name: config.name.clone(),
            selection,
            options: CoordMaskOptions {
                dim: config.dim.clone(),
                valid_range,
                range_mode,
            },
        })
    }
}

fn default_valid_range(dim: &str) -> ValidRange {
    match dim {
        "lat" => ValidRange::LATITUDE,
        "lon" => ValidRange::LONGITUDE,
        _ => ValidRange {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        },
    }
}

/// Catalog entry for an atomic mask name
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicMaskSpec {
    Global,
    LatitudeBand(LatitudeBand),
    Land,
    Ocean,
    Region(String),
    Custom(CustomMaskSpec),
}

/// `a&b&c` or `a|b|c`
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundMaskSpec {
    pub expression: String,
    pub operator: CombineOp,
    pub operand_names: SmallVec<[String; 4]>,
}

impl CompoundMaskSpec {
    /// Parse an expression holding exactly one kind of operator
    pub fn parse(expression: &str) -> Result<Self> {
        let has_and = expression.contains('&');
        let has_or = expression.contains('|');

        let operator = match (has_and, has_or) {
            (true, false) => CombineOp::Intersection,
            (false, true) => CombineOp::Union,
            (true, true) => {
                return Err(MaskError::UnknownMask {
                    name: expression.to_string(),
                    reason: "combination masks cannot mix '&' and '|'".to_string(),
                })
            }
            (false, false) => {
                return Err(MaskError::UnknownMask {
                    name: expression.to_string(),
                    reason: "not an implemented mask and not a combination mask".to_string(),
                })
            }
        };

        Ok(Self {
            expression: expression.to_string(),
            operator,
            operand_names: expression
                .split(operator.symbol())
                .map(str::to_string)
                .collect(),
        })
    }
}

impl fmt::Display for CompoundMaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.expression, self.operator)
    }
}

/// A parsed mask request
#[derive(Debug, Clone, PartialEq)]
pub enum MaskRequest {
    Atomic { name: String, spec: AtomicMaskSpec },
    Compound(CompoundMaskSpec),
}

/// Optional fraction fields for `land` / `ocean`
#[derive(Debug, Clone, Copy, Default)]
pub struct FractionFields<'a> {
    pub land: Option<&'a Field>,
    pub ocean: Option<&'a Field>,
}

impl<'a> FractionFields<'a> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_land(mut self, land: &'a Field) -> Self {
        self.land = Some(land);
        self
    }

    pub fn with_ocean(mut self, ocean: &'a Field) -> Self {
        self.ocean = Some(ocean);
        self
    }
}

/// Resolves mask names against the built-in catalog, a region catalog and
/// configured custom masks
pub struct MaskRegistry<'a> {
    regions: &'a dyn RegionCatalog,
    fraction_threshold: f64,
    preset_range_mode: RangeMode,
    custom_masks: IndexMap<String, CustomMaskSpec>,
}

impl<'a> MaskRegistry<'a> {
    pub fn new(regions: &'a dyn RegionCatalog) -> Self {
        Self {
            regions,
            fraction_threshold: DEFAULT_FRACTION_THRESHOLD,
            preset_range_mode: RangeMode::Exclusive,
            custom_masks: IndexMap::new(),
        }
    }

    /// Registry configured from a `MaskConfig`
    pub fn from_config(config: &MaskConfig, regions: &'a dyn RegionCatalog) -> Result<Self> {
        let mut registry = Self::new(regions)
            .with_fraction_threshold(config.fraction_threshold)
            .with_preset_range_mode(config.preset_range_mode);
        for custom in &config.custom_masks {
            registry = registry.with_custom_mask(CustomMaskSpec::from_config(custom)?)?;
        }
        Ok(registry)
    }

    pub fn with_fraction_threshold(mut self, fraction_threshold: f64) -> Self {
        self.fraction_threshold = fraction_threshold;
        self
    }

    pub fn with_preset_range_mode(mut self, range_mode: RangeMode) -> Self {
        self.preset_range_mode = range_mode;
        self
    }

    /// Register a custom atomic mask
    ///
    /// # Errors
    /// `InvalidType` if the name is taken by a built-in atom or holds an operator.
    pub fn with_custom_mask(mut self, spec: CustomMaskSpec) -> Result<Self> {
        let reserved = self.lookup_builtin(&spec.name).is_some();
        if reserved || spec.name.contains(['&', '|']) || spec.name.is_empty() {
            let err = MaskError::InvalidType {
                what: format!("custom mask name '{}'", spec.name),
                expected: "a non-empty name unused by built-in masks and free of '&' and '|'"
                    .to_string(),
                found: if reserved {
                    "a built-in mask name".to_string()
                } else {
                    "an invalid name".to_string()
                },
            };
            error!("{}", err);
            return Err(err);
        }
        self.custom_masks.insert(spec.name.clone(), spec);
        Ok(self)
    }

    pub fn fraction_threshold(&self) -> f64 {
        self.fraction_threshold
    }

    pub fn region_catalog(&self) -> &dyn RegionCatalog {
        self.regions
    }

    /// Every atomic mask name this registry can build
    pub fn implemented_masks(&self) -> Vec<String> {
        let mut names = vec!["global".to_string()];
        names.extend(LatitudeBand::ALL.iter().map(|b| b.name().to_string()));
        names.push("land".to_string());
        names.push("ocean".to_string());
        names.extend(self.regions.abbrevs().iter().cloned());
        names.extend(self.custom_masks.keys().cloned());
        names
    }

    fn lookup_builtin(&self, name: &str) -> Option<AtomicMaskSpec> {
        match name {
            "global" => Some(AtomicMaskSpec::Global),
            "land" => Some(AtomicMaskSpec::Land),
            "ocean" => Some(AtomicMaskSpec::Ocean),
            _ => LatitudeBand::from_name(name)
                .map(AtomicMaskSpec::LatitudeBand)
                .or_else(|| {
                    self.regions
                        .index_of(name)
                        .map(|_| AtomicMaskSpec::Region(name.to_string()))
                }),
        }
    }

    /// Catalog entry for an atomic name
    pub fn lookup(&self, name: &str) -> Option<AtomicMaskSpec> {
        self.lookup_builtin(name).or_else(|| {
            self.custom_masks
                .get(name)
                .cloned()
                .map(AtomicMaskSpec::Custom)
        })
    }

    /// Parse one requested name
    pub fn parse(&self, name: &str) -> Result<MaskRequest> {
        match self.lookup(name) {
            Some(spec) => Ok(MaskRequest::Atomic {
                name: name.to_string(),
                spec,
            }),
            None => CompoundMaskSpec::parse(name).map(MaskRequest::Compound),
        }
    }

    /// Build one atomic mask
    pub fn build_atom(
        &self,
        grid: &Grid,
        name: &str,
        spec: &AtomicMaskSpec,
        fractions: FractionFields<'_>,
    ) -> Result<Mask> {
        match spec {
            AtomicMaskSpec::Global => global_mask(grid),
            AtomicMaskSpec::LatitudeBand(band) => {
                let (min, max) = band.bounds();
                create_latitude_mask(
                    grid,
                    &CoordSelection::Range(min, max),
                    name,
                    self.preset_range_mode,
                )
            }
            AtomicMaskSpec::Land => {
                create_land_mask(self.fraction_threshold, fractions.land, fractions.ocean)
            }
            AtomicMaskSpec::Ocean => {
                create_sea_mask(self.fraction_threshold, fractions.ocean, fractions.land)
            }
            AtomicMaskSpec::Region(abbrev) => create_region_mask(grid, self.regions, abbrev),
            AtomicMaskSpec::Custom(custom) => {
                create_coord_mask(grid, &custom.selection, &custom.options, &custom.options.dim, &custom.name)
            }
        }
    }

    fn build_named(
        &self,
        grid: &Grid,
        name: &str,
        spec: &AtomicMaskSpec,
        fractions: FractionFields<'_>,
    ) -> Result<Mask> {
        info!(mask = name, "attempting to create mask");
        let mask = self
            .build_atom(grid, name, spec, fractions)
            .map_err(|e| e.in_mask(name))?;
        info!(mask = name, "created mask");
        Ok(mask)
    }

    fn build_compound(
        &self,
        grid: &Grid,
        compound: &CompoundMaskSpec,
        created: &mut MaskSet,
    ) -> Result<()> {
        info!(mask = %compound.expression, "attempting to create mask");

        for operand in &compound.operand_names {
            if created.contains_key(operand) {
                continue;
            }
            let spec = self.lookup(operand).ok_or_else(|| {
                MaskError::UnknownMask {
                    name: operand.clone(),
                    reason: format!("not implemented (in combination mask '{}')", compound.expression),
                }
                .in_mask(&compound.expression)
            })?;
            let mask = self
                .build_named(grid, operand, &spec, FractionFields::none())
                .map_err(|e| e.in_mask(&compound.expression))?;
            created.insert(operand.clone(), mask);
        }

        let combined = {
            let operands: SmallVec<[&Mask; 4]> = compound
                .operand_names
                .iter()
                .filter_map(|name| created.get(name))
                .collect();
            combine_masks(&operands, compound.operator)
                .map_err(|e| e.in_mask(&compound.expression))?
                .renamed(&compound.expression)
        };

        debug!(mask = %compound.expression, selected = combined.count_true(), "combined mask");
        info!(mask = %compound.expression, "created mask");
        created.insert(compound.expression.clone(), combined);
        Ok(())
    }

    /// Build every requested mask
    ///
    /// Returns all atoms and compounds built, in build order. Any failure
    /// aborts the call and names the offending mask.
    pub fn create_masks<S: AsRef<str>>(
        &self,
        grid: &Grid,
        names: &[S],
        fractions: FractionFields<'_>,
    ) -> Result<MaskSet> {
        let mut created = MaskSet::new();
        let mut and_masks: Vec<CompoundMaskSpec> = Vec::new();
        let mut or_masks: Vec<CompoundMaskSpec> = Vec::new();

        for name in names {
            let name = name.as_ref();
            match self.parse(name) {
                Ok(MaskRequest::Atomic { name, spec }) => {
                    if !created.contains_key(&name) {
                        let mask = self.build_named(grid, &name, &spec, fractions)?;
                        created.insert(name, mask);
                    }
                }
                Ok(MaskRequest::Compound(compound)) => match compound.operator {
                    CombineOp::Intersection => and_masks.push(compound),
                    CombineOp::Union => or_masks.push(compound),
                },
                Err(e) => {
                    error!("{}", e);
                    return Err(e);
                }
            }
        }

        for compound in and_masks.iter().chain(or_masks.iter()) {
            if created.contains_key(&compound.expression) {
                continue;
            }
            self.build_compound(grid, compound, &mut created).map_err(|e| {
                error!("{}", e);
                e
            })?;
        }

        Ok(created)
    }

    /// `create_masks` for a loosely typed JSON request list
    ///
    /// # Errors
    /// `InvalidType` if the request is not an array or any entry is not a
    /// string; nothing is built in that case.
    pub fn create_masks_from_json(
        &self,
        grid: &Grid,
        request: &Value,
        fractions: FractionFields<'_>,
    ) -> Result<MaskSet> {
        let Value::Array(entries) = request else {
            return Err(MaskError::InvalidType {
                what: "mask request".to_string(),
                expected: "a list of mask names".to_string(),
                found: json_kind(request).to_string(),
            });
        };

        let names = entries
            .iter()
            .map(|entry| {
                entry.as_str().ok_or_else(|| {
                    let err = MaskError::InvalidType {
                        what: format!("mask '{}'", entry),
                        expected: "a string".to_string(),
                        found: json_kind(entry).to_string(),
                    };
                    error!("{}", err);
                    err
                })
            })
            .collect::<Result<Vec<&str>>>()?;

        self.create_masks(grid, &names, fractions)
    }
}

/// All-true mask over the grid's `lat`
fn global_mask(grid: &Grid) -> Result<Mask> {
    let lat = grid.coord("lat")?;
    let values = LabeledArray::filled(vec![lat.clone()], true)?;
    Ok(Mask::new(
        values,
        Provenance::new(
            "global_mask",
            MaskKind::Global,
            "A global mask including all ds lats.",
        ),
    ))
}
