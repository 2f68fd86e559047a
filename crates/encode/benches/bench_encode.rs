use std::hint::black_box;
use std::time::Instant;

use curvecast_common::{GeometryKind, ProductBase, RayOptions};
use curvecast_encode::CellEncoder;
use curvecast_world::{Population, reference_world};

fn bench_encode(kind: GeometryKind, max_cells: usize, iterations: usize) {
    let options = RayOptions {
        max_cells,
        ..RayOptions::default()
    };
    let mut world = match reference_world(kind, Population::with_seed(7)) {
        Ok(world) => world,
        Err(e) => {
            println!("  {kind}: skipped ({e})");
            return;
        }
    };
    let root = world.root();
    let encoder = CellEncoder::new(&options);

    // first pass materializes the cells
    let first = encoder.encode(world.as_mut(), root);
    let cells = first.as_ref().map(|f| f.stats.cells).unwrap_or(0);
    let transforms = first.as_ref().map(|f| f.stats.transforms).unwrap_or(0);

    let start = Instant::now();
    for _ in 0..iterations {
        let _ = black_box(encoder.encode(world.as_mut(), black_box(root)));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  {kind} ({cells} cells, {transforms} transforms, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn main() {
    println!("=== Cell-Graph Encoder Benchmarks ===\n");

    println!("Closed-form geometries:");
    bench_encode(GeometryKind::Euclidean, 512, 100);
    bench_encode(GeometryKind::Euclidean, 2048, 20);
    bench_encode(GeometryKind::Hyperbolic, 512, 100);
    bench_encode(GeometryKind::Hyperbolic, 2048, 20);
    bench_encode(GeometryKind::Spherical, 2048, 100);
    bench_encode(GeometryKind::Product(ProductBase::Hyperbolic), 2048, 20);

    println!("\nStep-based geometries:");
    bench_encode(GeometryKind::Nil, 512, 100);
    bench_encode(GeometryKind::Nil, 2048, 20);
    bench_encode(GeometryKind::Stretched, 2048, 100);

    println!("\n=== Done ===");
}
