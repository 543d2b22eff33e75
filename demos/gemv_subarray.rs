//! Example: GEMV on a single sub-array
//!
//! Runs the identity-like and all-127 patterns through one 32x8 tile and
//! compares against the golden model.
//!
//! Run with: cargo run --example gemv_subarray

use tiled_npu::{ExecutionMode, GemvLayer, NpuConfig, TiledEngine};

fn main() {
    println!("=== GEMV Sub-array Example ===\n");

    let config = NpuConfig::default();
    print!("{}\n\n", config);
    let mut engine = TiledEngine::new(&config, ExecutionMode::CycleAccurate).unwrap();

    // Example 1: row r picks input[r % 8]
    println!("Example 1: Identity-like weights");
    let mut layer = GemvLayer::subarray();
    for (i, x) in layer.input.iter_mut().enumerate() {
        *x = i as i8 + 1;
    }
    for r in 0..layer.output_dim {
        layer.set_weight(r, r % layer.input_dim, 1);
    }

    let mut golden = layer.clone();
    golden.compute_reference().unwrap();
    let report = engine.run_layer(&mut layer).unwrap();

    println!("  Input:  {:?}", layer.input);
    println!("  Output: {:?}", &layer.output[..16]);
    println!("  Matches golden: {}", layer.output == golden.output);
    println!("  Tiles: {}, cycles: {}\n", report.tiles_issued, report.cycles);

    // Example 2: stress the accumulator with INT8_MAX everywhere
    println!("Example 2: All 127");
    let mut layer = GemvLayer::subarray();
    layer.input.fill(127);
    layer.weights.fill(127);
    engine.run_layer(&mut layer).unwrap();
    println!("  output[0] = {} (127 * 127 * 8 = {})", layer.output[0], 127 * 127 * 8);
}
