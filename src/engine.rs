//! Tiled GEMV/GEMM engine
//!
//! Owns the full logical operands, walks a [`TileSchedule`], copies each
//! tile's zero-padded slice into the executor and copies the partial result
//! back out. The executor never sees more than one tile.

use serde::{Deserialize, Serialize};

use crate::controller::{AccumulatorSite, TileCommand, TileOperands};
use crate::error::{NpuError, NpuResult};
use crate::executor::{executor_for, ExecutionMode, TileExecutor};
use crate::hardware::{gather_tile, NpuConfig};
use crate::reference::{GemmLayer, GemvLayer};
use crate::tiling::{TileSchedule, TilingStrategy};

/// Counters from one product
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub tiles_issued: usize,
    pub sweeps: usize,
    /// Controller cycles; zero in functional mode
    pub cycles: u64,
}

impl ExecutionReport {
    fn absorb(&mut self, other: ExecutionReport) {
        self.tiles_issued += other.tiles_issued;
        self.sweeps += other.sweeps;
        self.cycles += other.cycles;
    }
}

/// Drives a tile executor over whole products
pub struct TiledEngine {
    executor: Box<dyn TileExecutor>,
    tiler: TilingStrategy,
    /// Running totals across every product run on this engine
    totals: ExecutionReport,
}

impl TiledEngine {
    pub fn new(config: &NpuConfig, mode: ExecutionMode) -> NpuResult<Self> {
        config.validate()?;
        let executor = executor_for(mode, config)?;
        Ok(Self::with_executor(executor))
    }

    pub fn with_executor(executor: Box<dyn TileExecutor>) -> Self {
        let tiler = TilingStrategy::new(executor.geometry());
        Self {
            executor,
            tiler,
            totals: ExecutionReport::default(),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.executor.mode()
    }

    pub fn totals(&self) -> ExecutionReport {
        self.totals
    }

    /// `output[o] = sum_i weights[o][i] * input[i]` for an
    /// `output_dim x input_dim` row-major weight matrix
    pub fn gemv(
        &mut self,
        weights: &[i8],
        input: &[i8],
        input_dim: usize,
        output_dim: usize,
    ) -> NpuResult<(Vec<i32>, ExecutionReport)> {
        let schedule = self.tiler.tile_gemv(output_dim, input_dim)?;
        check_len("weights", weights.len(), output_dim * input_dim)?;
        check_len("input", input.len(), input_dim)?;
        self.run_gemv_schedule(&schedule, weights, input)
    }

    /// Tiled evaluation of a layer, bias included; fills `layer.output`
    pub fn run_layer(&mut self, layer: &mut GemvLayer) -> NpuResult<ExecutionReport> {
        check_len("bias", layer.bias.len(), layer.output_dim)?;
        let (mut output, report) =
            self.gemv(&layer.weights, &layer.input, layer.input_dim, layer.output_dim)?;
        for (out, bias) in output.iter_mut().zip(&layer.bias) {
            *out = out.wrapping_add(*bias);
        }
        layer.output = output;
        Ok(report)
    }

    /// `C = A @ B` with A `m x k` and B `k x n`, both row-major
    pub fn gemm(
        &mut self,
        a: &[i8],
        b: &[i8],
        m: usize,
        k: usize,
        n: usize,
    ) -> NpuResult<(Vec<i32>, ExecutionReport)> {
        let schedule = self.tiler.tile_gemm(m, k, n)?;
        check_len("A", a.len(), m * k)?;
        check_len("B", b.len(), k * n)?;
        self.run_gemm_schedule(&schedule, a, b)
    }

    /// Tiled evaluation of a GEMM layer; fills `layer.c`
    pub fn run_gemm_layer(&mut self, layer: &mut GemmLayer) -> NpuResult<ExecutionReport> {
        let (c, report) = self.gemm(&layer.a, &layer.b, layer.m, layer.k, layer.n)?;
        layer.c = c;
        Ok(report)
    }

    fn run_gemv_schedule(
        &mut self,
        schedule: &TileSchedule,
        weights: &[i8],
        input: &[i8],
    ) -> NpuResult<(Vec<i32>, ExecutionReport)> {
        let geometry = schedule.geometry;
        let (m, k) = (schedule.m, schedule.k);
        let mut output = vec![0i32; m];
        let mut report = ExecutionReport::default();

        for tile in &schedule.tiles {
            let w_tile = gather_tile(
                weights,
                m,
                k,
                tile.row_range.0,
                tile.k_range.0,
                geometry.rows,
                geometry.cols,
            );
            let x_tile = gather_tile(input, 1, k, 0, tile.k_range.0, 1, geometry.cols);

            let outcome = self.executor.execute(
                TileOperands {
                    weights: &w_tile,
                    input: &x_tile,
                    partial: &[],
                },
                TileCommand {
                    clear: tile.is_first_k,
                    site: AccumulatorSite::Array,
                },
            )?;
            log::debug!("tile {} -> {} cycles", tile, outcome.cycles);

            report.tiles_issued += 1;
            report.cycles += outcome.cycles;
            if tile.is_first_k {
                report.sweeps += 1;
            }
            if tile.is_last_k {
                output[tile.row_range.0..tile.row_range.1]
                    .copy_from_slice(&outcome.output[..tile.rows()]);
            }
        }

        self.totals.absorb(report);
        Ok((output, report))
    }

    fn run_gemm_schedule(
        &mut self,
        schedule: &TileSchedule,
        a: &[i8],
        b: &[i8],
    ) -> NpuResult<(Vec<i32>, ExecutionReport)> {
        let geometry = schedule.geometry;
        let (m, k, n) = (schedule.m, schedule.k, schedule.n);
        let mut c = vec![0i32; m * n];
        let mut report = ExecutionReport::default();

        // The A slab only changes when the (M tile, K tile) pair does.
        let mut slab_key = None;
        let mut a_tile = Vec::new();

        for tile in &schedule.tiles {
            let col = tile
                .column
                .ok_or_else(|| NpuError::dimension("GEMM tile without an output column"))?;
            let key = (tile.coord.row_tile, tile.coord.col_tile);
            if slab_key != Some(key) {
                a_tile = gather_tile(
                    a,
                    m,
                    k,
                    tile.row_range.0,
                    tile.k_range.0,
                    geometry.rows,
                    geometry.cols,
                );
                slab_key = Some(key);
            }

            let mut b_slice = vec![0i8; geometry.cols];
            for kk in tile.k_range.0..tile.k_range.1 {
                b_slice[kk - tile.k_range.0] = b[kk * n + col];
            }
            let mut partial = vec![0i32; geometry.rows];
            for row in tile.row_range.0..tile.row_range.1 {
                partial[row - tile.row_range.0] = c[row * n + col];
            }

            let outcome = self.executor.execute(
                TileOperands {
                    weights: &a_tile,
                    input: &b_slice,
                    partial: &partial,
                },
                TileCommand {
                    clear: tile.is_first_k,
                    site: AccumulatorSite::OutputBuffer,
                },
            )?;
            log::debug!("tile {} -> {} cycles", tile, outcome.cycles);

            report.tiles_issued += 1;
            report.cycles += outcome.cycles;
            if tile.is_first_k {
                report.sweeps += 1;
            }
            for row in tile.row_range.0..tile.row_range.1 {
                c[row * n + col] = outcome.output[row - tile.row_range.0];
            }
        }

        self.totals.absorb(report);
        Ok((c, report))
    }
}

fn check_len(name: &str, got: usize, expected: usize) -> NpuResult<()> {
    if got != expected {
        return Err(NpuError::shape(
            format!("{} of {} elements", name, expected),
            format!("{} elements", got),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::ArrayGeometry;

    fn patterned(len: usize, mul: i8, offset: i8) -> Vec<i8> {
        (0..len).map(|i| (i as i8).wrapping_mul(mul).wrapping_add(offset)).collect()
    }

    #[test]
    fn test_gemv_matches_reference_both_modes() {
        let (input_dim, output_dim) = (20, 70);
        let weights = patterned(input_dim * output_dim, 37, -3);
        let input = patterned(input_dim, 11, 5);
        let mut layer =
            GemvLayer::from_parts(input_dim, output_dim, weights.clone(), input.clone()).unwrap();
        layer.compute_reference().unwrap();

        for mode in [ExecutionMode::Functional, ExecutionMode::CycleAccurate] {
            let mut engine = TiledEngine::new(&NpuConfig::default(), mode).unwrap();
            let (output, report) = engine.gemv(&weights, &input, input_dim, output_dim).unwrap();
            assert_eq!(output, layer.output, "mode {}", mode);
            // ceil(70/32) = 3 output tiles, ceil(20/8) = 3 input tiles
            assert_eq!(report.tiles_issued, 9);
            assert_eq!(report.sweeps, 3);
        }
    }

    #[test]
    fn test_cycle_counts() {
        let config = NpuConfig::default();
        let mut engine = TiledEngine::new(&config, ExecutionMode::CycleAccurate).unwrap();
        let (_, report) = engine.gemv(&vec![1; 64 * 16], &vec![1; 16], 16, 64).unwrap();
        assert_eq!(report.tiles_issued, 4);
        assert_eq!(report.cycles, 4 * config.cycles_per_tile());

        let mut functional = TiledEngine::new(&config, ExecutionMode::Functional).unwrap();
        let (_, report) = functional.gemv(&vec![1; 64 * 16], &vec![1; 16], 16, 64).unwrap();
        assert_eq!(report.cycles, 0);
    }

    #[test]
    fn test_run_layer_adds_bias() {
        let mut engine =
            TiledEngine::new(&NpuConfig::default(), ExecutionMode::CycleAccurate).unwrap();
        let mut layer = GemvLayer::new(12, 40).unwrap();
        layer.weights.fill(1);
        layer.input.fill(2);
        layer.bias = (0..40).collect();
        engine.run_layer(&mut layer).unwrap();
        for (o, value) in layer.output.iter().enumerate() {
            assert_eq!(*value, 24 + o as i32);
        }
    }

    #[test]
    fn test_run_layer_rejects_bias_before_issuing() {
        let mut engine =
            TiledEngine::new(&NpuConfig::new(4, 4), ExecutionMode::CycleAccurate).unwrap();
        let mut layer = GemvLayer::new(4, 4).unwrap();
        layer.bias = vec![0; 2];
        let result = engine.run_layer(&mut layer);
        assert!(matches!(result, Err(NpuError::ShapeMismatch { .. })));
        assert_eq!(engine.totals(), ExecutionReport::default());
        assert_eq!(layer.output, vec![0; 4]);
    }

    #[test]
    fn test_gemm_matches_reference_both_modes() {
        let (m, k, n) = (9, 13, 4);
        let a = patterned(m * k, 29, 1);
        let b = patterned(k * n, -17, 9);
        let mut layer = GemmLayer::from_parts(m, k, n, a.clone(), b.clone()).unwrap();
        layer.compute_reference().unwrap();

        let config = NpuConfig::new(4, 4);
        for mode in [ExecutionMode::Functional, ExecutionMode::CycleAccurate] {
            let mut engine = TiledEngine::new(&config, mode).unwrap();
            let (c, report) = engine.gemm(&a, &b, m, k, n).unwrap();
            assert_eq!(c, layer.c, "mode {}", mode);
            // 3 M tiles x 4 K tiles x 4 columns
            assert_eq!(report.tiles_issued, 48);
            assert_eq!(report.sweeps, 12);
        }
    }

    #[test]
    fn test_engine_reused_across_products() {
        let mut engine =
            TiledEngine::new(&NpuConfig::new(4, 2), ExecutionMode::CycleAccurate).unwrap();
        let (first, _) = engine.gemv(&[1; 12], &[1, 2, 3], 3, 4).unwrap();
        let (second, _) = engine.gemv(&[1; 12], &[1, 1, 1], 3, 4).unwrap();
        assert_eq!(first, vec![6; 4]);
        assert_eq!(second, vec![3; 4]);
        assert_eq!(engine.totals().tiles_issued, 4);
    }

    #[test]
    fn test_length_checks() {
        let mut engine =
            TiledEngine::new(&NpuConfig::default(), ExecutionMode::Functional).unwrap();
        assert!(engine.gemv(&[0; 10], &[0; 4], 4, 3).is_err());
        assert!(engine.gemm(&[0; 4], &[0; 3], 2, 2, 2).is_err());
        assert_eq!(
            TilingStrategy::new(ArrayGeometry::default()).geometry(),
            ArrayGeometry::default()
        );
    }
}
