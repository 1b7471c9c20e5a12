use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use climate_masks::{
    combine_masks, CombineOp, Coordinate, FractionFields, Grid, LabeledArray, MaskRegistry,
    TableRegionCatalog,
};

// =============================================================================
// Fixtures
// =============================================================================

/// Regular grid with `step` degree spacing
fn make_grid(step: f64) -> Grid {
    let lat: Vec<f64> = (0..)
        .map(|i| -90.0 + step / 2.0 + i as f64 * step)
        .take_while(|&v| v < 90.0)
        .collect();
    let lon: Vec<f64> = (0..)
        .map(|i| step / 2.0 + i as f64 * step)
        .take_while(|&v| v < 360.0)
        .collect();
    Grid::new(vec![
        Coordinate::new("lat", lat).unwrap(),
        Coordinate::new("lon", lon).unwrap(),
    ])
    .unwrap()
}

/// Land fraction varying smoothly with position
fn make_land_fraction(grid: &Grid) -> LabeledArray<f64> {
    let lat = grid.coord("lat").unwrap().clone();
    let lon = grid.coord("lon").unwrap().clone();
    let values = lat
        .values()
        .iter()
        .flat_map(|&la| lon.values().iter().map(move |&lo| (la.to_radians().cos() * lo.to_radians().sin()).abs()))
        .collect();
    LabeledArray::from_vec(vec![lat, lon], values).unwrap()
}

/// Four quadrant regions covering the grid
fn make_catalog(grid: &Grid) -> TableRegionCatalog {
    let lat = grid.coord("lat").unwrap();
    let lon = grid.coord("lon").unwrap();
    let cells = lat.values().iter().flat_map(|&la| {
        lon.values().iter().map(move |&lo| {
            let index = usize::from(la > 0.0) * 2 + usize::from(lo > 180.0);
            (la, lo, index)
        })
    });
    let abbrevs = ["SWQ", "SEQ", "NWQ", "NEQ"].map(String::from).to_vec();
    TableRegionCatalog::from_cells("QUAD", abbrevs, cells.collect::<Vec<_>>()).unwrap()
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_create_masks(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_masks");

    for step in [2.5, 1.0] {
        let grid = make_grid(step);
        let land = make_land_fraction(&grid);
        let catalog = make_catalog(&grid);
        let registry = MaskRegistry::new(&catalog);
        let requests = ["land", "NH_midlat", "tropics", "NH_midlat&land", "NEQ|SEQ"];

        group.bench_with_input(BenchmarkId::new("mixed_request", step), &step, |b, _| {
            b.iter(|| {
                registry
                    .create_masks(
                        black_box(&grid),
                        black_box(&requests[..]),
                        FractionFields::none().with_land(&land),
                    )
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_combine(c: &mut Criterion) {
    let grid = make_grid(1.0);
    let land = make_land_fraction(&grid);
    let catalog = make_catalog(&grid);
    let registry = MaskRegistry::new(&catalog);
    let masks = registry
        .create_masks(
            &grid,
            &["land", "NH_polar", "NEQ"],
            FractionFields::none().with_land(&land),
        )
        .unwrap();
    let operands: Vec<_> = masks.values().collect();

    c.bench_function("combine_broadcast_intersection", |b| {
        b.iter(|| combine_masks(black_box(&operands), CombineOp::Intersection).unwrap())
    });
}

criterion_group!(benches, bench_create_masks, bench_combine);
criterion_main!(benches);
