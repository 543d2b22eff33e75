//! Example: Tiled GEMV and GEMM on matrices larger than the array
//!
//! A 256x128 GEMV needs 8 output tiles x 16 input tiles. The GEMM sweeps
//! every output column under each (M tile, K tile) pair.
//!
//! Run with: cargo run --example tiled_large

use tiled_npu::testgen::{compare_exact, VectorGenerator};
use tiled_npu::{ExecutionMode, GemmLayer, GemvLayer, NpuConfig, TiledEngine, TilingStrategy};

fn main() {
    println!("=== Tiled Large Matrix Example ===\n");

    let config = NpuConfig::default();
    let mut gen = VectorGenerator::new(700);

    // GEMV: input 128, output 256
    let (input_dim, output_dim) = (128, 256);
    let input = gen.random_i8(input_dim);
    let weights = gen.random_i8(output_dim * input_dim);
    let mut layer = GemvLayer::from_parts(input_dim, output_dim, weights, input).unwrap();

    let schedule = TilingStrategy::new(config.geometry())
        .tile_gemv(output_dim, input_dim)
        .unwrap();
    println!("GEMV {}x{}", output_dim, input_dim);
    println!("  Tiles: {} ({} sweeps)", schedule.len(), schedule.sweeps());
    for tile in schedule.tiles.iter().take(3) {
        println!("    {}", tile);
    }
    println!("    ...");

    let mut golden = layer.clone();
    golden.compute_reference().unwrap();

    for mode in [ExecutionMode::Functional, ExecutionMode::CycleAccurate] {
        let mut engine = TiledEngine::new(&config, mode).unwrap();
        let report = engine.run_layer(&mut layer).unwrap();
        let verdict = match compare_exact("gemv", &layer.output, &golden.output) {
            Ok(()) => "match".to_string(),
            Err(e) => e.to_string(),
        };
        println!(
            "  {:>14}: {} tiles, {} cycles, {}",
            mode, report.tiles_issued, report.cycles, verdict
        );
    }

    // GEMM: 70x20 @ 20x5
    let (m, k, n) = (70, 20, 5);
    let a = gen.random_i8(m * k);
    let b = gen.random_i8(k * n);
    let mut golden = GemmLayer::from_parts(m, k, n, a.clone(), b.clone()).unwrap();
    golden.compute_reference().unwrap();

    let mut engine = TiledEngine::new(&config, ExecutionMode::CycleAccurate).unwrap();
    let (c, report) = engine.gemm(&a, &b, m, k, n).unwrap();
    println!("\nGEMM {}x{} @ {}x{}", m, k, k, n);
    println!("  Tiles: {}, cycles: {}", report.tiles_issued, report.cycles);
    println!("  Matches golden: {}", c == golden.c);
}
