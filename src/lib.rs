//! Tiled INT8 NPU model
//!
//! A cycle-level model of a tiled GEMV/GEMM accelerator built around a
//! 32x8 spatial reduction array of INT8 MAC units, together with the golden
//! reference model and the hex-vector verification flow used to prove the
//! two agree bit for bit.
//!
//! # Example
//!
//! ```rust
//! use tiled_npu::{ExecutionMode, GemvLayer, NpuConfig, TiledEngine};
//!
//! let config = NpuConfig::default(); // 32x8 sub-array, 2-cycle buffers
//! let mut engine = TiledEngine::new(&config, ExecutionMode::CycleAccurate).unwrap();
//!
//! let mut layer = GemvLayer::new(64, 256).unwrap();
//! layer.weights.fill(1);
//! layer.input.fill(2);
//! let report = engine.run_layer(&mut layer).unwrap();
//!
//! assert!(layer.output.iter().all(|&y| y == 128));
//! assert_eq!(report.tiles_issued, 8 * 8);
//! ```

pub mod lexer;
pub mod hexio;
pub mod mac;
pub mod array;
pub mod buffer;
pub mod controller;
pub mod executor;
pub mod tiling;
pub mod engine;
pub mod reference;
pub mod testgen;
pub mod regs;
pub mod npu;
pub mod suite;
pub mod hardware;
pub mod error;

pub use array::{ArrayDrive, ReductionArray};
pub use controller::{
    AccumulatorSite, TileCommand, TileController, TileOperands, TileOutcome, TileState,
};
pub use engine::{ExecutionReport, TiledEngine};
pub use error::{NpuError, NpuResult};
pub use executor::{ExecutionMode, TileExecutor};
pub use hardware::{ArrayGeometry, NpuConfig};
pub use mac::{ref_mac, MacDrive, MacUnit};
pub use npu::Npu;
pub use reference::{GemmLayer, GemvLayer};
pub use suite::{RunReport, SuiteOptions, TestSuite};
pub use tiling::{TileOp, TileSchedule, TilingStrategy};

/// Tiled GEMV on a fresh engine: `output[o] = sum_i weights[o][i] * input[i]`
pub fn gemv(
    weights: &[i8],
    input: &[i8],
    input_dim: usize,
    output_dim: usize,
    config: &NpuConfig,
    mode: ExecutionMode,
) -> NpuResult<Vec<i32>> {
    let mut engine = TiledEngine::new(config, mode)?;
    let (output, _) = engine.gemv(weights, input, input_dim, output_dim)?;
    Ok(output)
}

/// Tiled GEMM on a fresh engine: `C = A @ B`
pub fn gemm(
    a: &[i8],
    b: &[i8],
    (m, k, n): (usize, usize, usize),
    config: &NpuConfig,
    mode: ExecutionMode,
) -> NpuResult<Vec<i32>> {
    let mut engine = TiledEngine::new(config, mode)?;
    let (c, _) = engine.gemm(a, b, m, k, n)?;
    Ok(c)
}
