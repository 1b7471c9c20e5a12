//! Masking Integration Tests
//!
//! Runs the full pipeline on small files: grid JSON, fraction and region
//! tables are loaded from disk, masks are built through the registry,
//! applied to data and exported.

use std::fs;
use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use climate_masks::data::{load_fraction_field, load_grid_json};
use climate_masks::utils::{masks_to_dataframe, save_masks_csv, OverwritePolicy, Prompter};
use climate_masks::{
    add_with_alignment, apply_mask, check_alignment, ensure_data_array, is_where_compatible,
    FractionFields, Join, MaskConfig, MaskError, MaskRegistry, TableRegionCatalog, TypedArray,
};

// lat [-45, 15, 45] x lon [0, 180]
const GRID_JSON: &str = r#"{
    "coords": [
        {"name": "lat", "values": [-45, 15, 45]},
        {"name": "lon", "values": [0, 180]}
    ],
    "variables": {
        "tas": {
            "dims": ["lat", "lon"],
            "values": [1, 2, 3, 4, 5, 6],
            "attrs": {"comment": "Surface air temperature"}
        }
    },
    "attrs": {"source_id": "test-model"}
}"#;

const LAND_CSV: &str = "lat,lon,value
-45,0,0.1
-45,180,0.9
15,0,0.95
15,180,0.0
45,0,1.0
45,180,0.5
";

const REGIONS_CSV: &str = "number,abbrev\n1,WAF\n0,NEU\n";
const CELLS_CSV: &str = "lat,lon,region\n45,0,0\n45,180,0\n15,0,1\n";

struct Fixture {
    tmp: tempfile::TempDir,
    grid: PathBuf,
    land: PathBuf,
    regions: PathBuf,
    cells: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, contents: &str| {
            let path = dir.path().join(name);
            fs::write(&path, contents).unwrap();
            path
        };
        Self {
            grid: write("grid.json", GRID_JSON),
            land: write("sftlf.csv", LAND_CSV),
            regions: write("regions.csv", REGIONS_CSV),
            cells: write("cells.csv", CELLS_CSV),
            tmp: dir,
        }
    }

    fn dir(&self) -> &Path {
        self.tmp.path()
    }
}

struct Decline;

impl Prompter for Decline {
    fn confirm(&mut self, _message: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
}

fn selected(mask: &climate_masks::Mask) -> Vec<bool> {
    mask.values().data().iter().copied().collect()
}

#[test]
fn test_full_pipeline_from_files() {
    let fx = Fixture::new();
    let grid = load_grid_json(&fx.grid).unwrap();
    let land = load_fraction_field(&fx.land).unwrap();
    let catalog = TableRegionCatalog::load("AR6", &fx.regions, &fx.cells).unwrap();
    let registry = MaskRegistry::from_config(&MaskConfig::default(), &catalog).unwrap();

    let masks = registry
        .create_masks(
            &grid,
            &["land", "NH_midlat&land", "NEU|WAF"],
            FractionFields::none().with_land(&land),
        )
        .unwrap();

    let keys: Vec<&str> = masks.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["land", "NH_midlat", "NH_midlat&land", "NEU", "WAF", "NEU|WAF"]);

    assert_eq!(selected(&masks["land"]), vec![false, true, true, false, true, false]);
    assert_eq!(masks["NH_midlat"].dims(), vec!["lat"]);

    let midlat_land = &masks["NH_midlat&land"];
    assert_eq!(midlat_land.dims(), vec!["lat", "lon"]);
    assert_eq!(selected(midlat_land), vec![false, false, false, false, true, false]);
    assert_eq!(midlat_land.name(), "NH_midlat&land");

    let regions = &masks["NEU|WAF"];
    assert_eq!(regions.count_true(), 3);
    assert_eq!(masks["NEU"].name(), "AR6_NEU_mask");
    assert_eq!(
        regions.provenance().mask_type().to_string(),
        "region_mask",
        "identical attributes are kept as-is"
    );
}

#[test]
fn test_compound_provenance_lists_each_operand() {
    let fx = Fixture::new();
    let grid = load_grid_json(&fx.grid).unwrap();
    let land = load_fraction_field(&fx.land).unwrap();
    let catalog = TableRegionCatalog::empty("AR6");
    let registry = MaskRegistry::new(&catalog);

    let masks = registry
        .create_masks(&grid, &["land", "NH_midlat&land"], FractionFields::none().with_land(&land))
        .unwrap();

    assert_eq!(
        masks["NH_midlat&land"].provenance().mask_type().to_string(),
        "intersection of:\nNH_midlat: lat_mask,\nland_surface_mask: surface_type_mask"
    );
}

#[test]
fn test_apply_combined_mask_to_data() {
    let fx = Fixture::new();
    let grid = load_grid_json(&fx.grid).unwrap();
    let land = load_fraction_field(&fx.land).unwrap();
    let catalog = TableRegionCatalog::empty("AR6");
    let registry = MaskRegistry::new(&catalog);
    let masks = registry
        .create_masks(&grid, &["land", "NH_midlat&land"], FractionFields::none().with_land(&land))
        .unwrap();

    let tas = ensure_data_array(&grid).unwrap();
    let mask = &masks["NH_midlat&land"];
    assert!(is_where_compatible(&tas, &TypedArray::from(mask), true).unwrap());

    let masked = apply_mask(&tas, "tas", mask).unwrap();
    let values: Vec<f64> = masked.variable("tas").unwrap().data().iter().copied().collect();
    assert_eq!(values.iter().filter(|v| v.is_nan()).count(), 5);
    assert_relative_eq!(values[4], 5.0);

    let comment = masked.attrs().get("comment").unwrap().to_string();
    assert!(comment.starts_with("Surface air temperature. Masked using: intersection of:"));
}

#[test]
fn test_unknown_region_in_compound_names_the_request() {
    let fx = Fixture::new();
    let grid = load_grid_json(&fx.grid).unwrap();
    let catalog = TableRegionCatalog::load("AR6", &fx.regions, &fx.cells).unwrap();
    let registry = MaskRegistry::new(&catalog);

    let err = registry
        .create_masks(&grid, &["NEU&XYZ"], FractionFields::none())
        .unwrap_err();
    assert!(matches!(err.root_cause(), MaskError::UnknownMask { name, .. } if name == "XYZ"));
    assert!(err.to_string().contains("NEU&XYZ"));
}

#[test]
fn test_config_file_drives_registry() {
    let fx = Fixture::new();
    let config_path = fx.dir().join("masks.json");
    fs::write(
        &config_path,
        r#"{
            "fraction_threshold": 0.5,
            "custom_masks": [{"name": "east", "dim": "lon", "selection": [180]}]
        }"#,
    )
    .unwrap();

    let config = MaskConfig::load(&config_path).unwrap();
    let grid = load_grid_json(&fx.grid).unwrap();
    let land = load_fraction_field(&fx.land).unwrap();
    let catalog = TableRegionCatalog::empty(&config.region_catalog_name);
    let registry = MaskRegistry::from_config(&config, &catalog).unwrap();

    let masks = registry
        .create_masks(&grid, &["land", "east"], FractionFields::none().with_land(&land))
        .unwrap();
    // 0.5 is not strictly above the threshold
    assert_eq!(selected(&masks["land"]), vec![false, true, true, false, true, false]);
    assert_eq!(selected(&masks["east"]), vec![false, true]);
}

#[test]
fn test_export_respects_overwrite_policy() {
    let fx = Fixture::new();
    let grid = load_grid_json(&fx.grid).unwrap();
    let catalog = TableRegionCatalog::empty("AR6");
    let registry = MaskRegistry::new(&catalog);
    let masks = registry
        .create_masks(&grid, &["global", "tropics"], FractionFields::none())
        .unwrap();

    let df = masks_to_dataframe(&masks).unwrap();
    assert_eq!(df.height(), 6);

    let out = fx.dir().join("out").join("masks.csv");
    assert!(save_masks_csv(&masks, &out, OverwritePolicy::Never, &mut Decline).unwrap());
    let first = fs::read_to_string(&out).unwrap();
    assert!(first.starts_with("mask,lat,value"));

    assert!(!save_masks_csv(&masks, &out, OverwritePolicy::Prompt, &mut Decline).unwrap());
    assert!(save_masks_csv(&masks, &out, OverwritePolicy::Always, &mut Decline).unwrap());
}

#[test]
fn test_arithmetic_on_loaded_fields() {
    let fx = Fixture::new();
    let land = load_fraction_field(&fx.land).unwrap();
    let ocean = land.map(|v| 1.0 - v);

    let total = add_with_alignment(&[&land, &ocean], Join::Exact).unwrap();
    for value in total.data().iter() {
        assert_relative_eq!(*value, 1.0);
    }

    let grid = load_grid_json(&fx.grid).unwrap();
    let tas = ensure_data_array(&grid).unwrap();
    assert!(check_alignment(&[&tas, &land], Join::Exact).is_ok());
}

#[test]
fn test_descending_latitude_grid_combines_with_sorted_fraction() {
    let fx = Fixture::new();
    let grid_path = fx.dir().join("descending.json");
    fs::write(
        &grid_path,
        r#"{"coords": [{"name": "lat", "values": [75, 45, -45]}, {"name": "lon", "values": [0, 180]}]}"#,
    )
    .unwrap();
    let land_path = fx.dir().join("sftlf_polar.csv");
    fs::write(
        &land_path,
        "lat,lon,value\n75,0,0.9\n75,180,0.1\n45,0,0.95\n45,180,0.9\n-45,0,1.0\n-45,180,0.0\n",
    )
    .unwrap();

    let grid = load_grid_json(&grid_path).unwrap();
    let land = load_fraction_field(&land_path).unwrap();
    assert_eq!(land.coord("lat").unwrap().values(), &[-45.0, 45.0, 75.0]);

    let catalog = TableRegionCatalog::empty("AR6");
    let registry = MaskRegistry::new(&catalog);
    let masks = registry
        .create_masks(&grid, &["land", "NH_polar&land"], FractionFields::none().with_land(&land))
        .unwrap();

    let polar_land = &masks["NH_polar&land"];
    assert_eq!(polar_land.dims(), vec!["lat", "lon"]);
    assert_eq!(polar_land.values().coord("lat").unwrap().values(), &[75.0, 45.0, -45.0]);
    assert_eq!(selected(polar_land), vec![true, false, false, false, false, false]);
}
