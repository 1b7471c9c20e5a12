//! Region Masks
//!
//! Regions come from an external catalog (AR6 by default): an ordered list
//! of abbreviations plus a per-cell region index over a lat/lon grid. The
//! index of a cell is the position of its region in the abbreviation list.

use rustc_hash::FxHashMap;
use tracing::{debug, error};

use crate::error::{MaskError, Result};
use crate::grid::{label_key, CoordSource, LabeledArray};
use crate::mask::{Mask, MaskKind, Provenance};

/// External source of region abbreviations and per-cell region indices
pub trait RegionCatalog {
    /// Catalog name used in mask names (e.g. "AR6")
    fn name(&self) -> &str;

    /// Region abbreviations in index order
    fn abbrevs(&self) -> &[String];

    /// Per-cell region index over (`lat`, `lon`); `None` where no region applies
    fn region_index(&self, grid: &dyn CoordSource) -> Result<LabeledArray<Option<usize>>>;

    fn index_of(&self, abbrev: &str) -> Option<usize> {
        self.abbrevs().iter().position(|a| a == abbrev)
    }
}

/// Region catalog backed by an explicit (lat, lon) → region table
#[derive(Debug, Clone, Default)]
pub struct TableRegionCatalog {
    name: String,
    abbrevs: Vec<String>,
    cells: FxHashMap<(u64, u64), usize>,
}

impl TableRegionCatalog {
    /// Catalog without any regions
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            abbrevs: Vec::new(),
            cells: FxHashMap::default(),
        }
    }

    /// Build from `(lat, lon, region_index)` cells
    pub fn from_cells(
        name: &str,
        abbrevs: Vec<String>,
        cells: impl IntoIterator<Item = (f64, f64, usize)>,
    ) -> Result<Self> {
        let mut table = FxHashMap::default();
        for (lat, lon, index) in cells {
            if index >= abbrevs.len() {
                return Err(MaskError::InvalidType {
                    what: format!("region index at ({}, {})", lat, lon),
                    expected: format!("an index below {}", abbrevs.len()),
                    found: index.to_string(),
                });
            }
            table.insert((label_key(lat), label_key(lon)), index);
        }

        debug!(catalog = name, regions = abbrevs.len(), cells = table.len(), "built region catalog");
        Ok(Self {
            name: name.to_string(),
            abbrevs,
            cells: table,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

impl RegionCatalog for TableRegionCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn abbrevs(&self) -> &[String] {
        &self.abbrevs
    }

    fn region_index(&self, grid: &dyn CoordSource) -> Result<LabeledArray<Option<usize>>> {
        let lat = grid.coordinate("lat")?;
        let lon = grid.coordinate("lon")?;

        let mut indices = Vec::with_capacity(lat.len() * lon.len());
        for &la in lat.values() {
            for &lo in lon.values() {
                indices.push(self.cells.get(&(label_key(la), label_key(lo))).copied());
            }
        }

        LabeledArray::from_vec(vec![lat.clone(), lon.clone()], indices)
    }
}

/// Mask selecting the cells of one catalog region
pub fn create_region_mask(
    data: &dyn CoordSource,
    catalog: &dyn RegionCatalog,
    region_abbrev: &str,
) -> Result<Mask> {
    let index = catalog.index_of(region_abbrev).ok_or_else(|| {
        error!(
            region = region_abbrev,
            catalog = catalog.name(),
            "region not in catalog"
        );
        MaskError::UnknownRegion {
            abbrev: region_abbrev.to_string(),
            catalog: catalog.name().to_string(),
        }
    })?;

    let regions = catalog.region_index(data)?;
    let values = regions.map(|cell| *cell == Some(index));

    let provenance = Provenance::new(
        &format!("{}_{}_mask", catalog.name(), region_abbrev),
        MaskKind::Region,
        format!(
            "A mask indicating the presence of the {} region '{}'.",
            catalog.name(),
            region_abbrev
        ),
    );
    Ok(Mask::new(values, provenance))
}
