//! Golden reference model
//!
//! Direct nested-loop products with no tiling. These are the ground truth
//! the tiled engine is checked against. All accumulation wraps at 32 bits
//! like the hardware accumulators.

use serde::{Deserialize, Serialize};

use crate::error::{NpuError, NpuResult};
use crate::hardware::{SUBARRAY_COLS, SUBARRAY_ROWS};
use crate::mac::ref_mac;

/// A fully connected layer evaluated as a matrix-vector product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GemvLayer {
    pub input_dim: usize,
    pub output_dim: usize,
    /// `output_dim x input_dim`, row-major
    pub weights: Vec<i8>,
    pub input: Vec<i8>,
    pub output: Vec<i32>,
    pub bias: Vec<i32>,
}

impl GemvLayer {
    /// Zero-initialised layer
    pub fn new(input_dim: usize, output_dim: usize) -> NpuResult<Self> {
        if input_dim == 0 || output_dim == 0 {
            return Err(NpuError::dimension(format!(
                "GEMV layer needs nonzero dims, got input={} output={}",
                input_dim, output_dim
            )));
        }
        Ok(Self {
            input_dim,
            output_dim,
            weights: vec![0; output_dim * input_dim],
            input: vec![0; input_dim],
            output: vec![0; output_dim],
            bias: vec![0; output_dim],
        })
    }

    /// Layer sized to exactly one sub-array invocation
    pub fn subarray() -> Self {
        Self {
            input_dim: SUBARRAY_COLS,
            output_dim: SUBARRAY_ROWS,
            weights: vec![0; SUBARRAY_ROWS * SUBARRAY_COLS],
            input: vec![0; SUBARRAY_COLS],
            output: vec![0; SUBARRAY_ROWS],
            bias: vec![0; SUBARRAY_ROWS],
        }
    }

    /// Build a layer from existing buffers, checking their lengths
    pub fn from_parts(
        input_dim: usize,
        output_dim: usize,
        weights: Vec<i8>,
        input: Vec<i8>,
    ) -> NpuResult<Self> {
        let mut layer = Self::new(input_dim, output_dim)?;
        if weights.len() != output_dim * input_dim {
            return Err(NpuError::shape(
                format!("{} weights ({}x{})", output_dim * input_dim, output_dim, input_dim),
                weights.len().to_string(),
            ));
        }
        if input.len() != input_dim {
            return Err(NpuError::shape(format!("{} inputs", input_dim), input.len().to_string()));
        }
        layer.weights = weights;
        layer.input = input;
        Ok(layer)
    }

    pub fn with_bias(mut self, bias: Vec<i32>) -> NpuResult<Self> {
        if bias.len() != self.output_dim {
            return Err(NpuError::shape(
                format!("{} bias values", self.output_dim),
                bias.len().to_string(),
            ));
        }
        self.bias = bias;
        Ok(self)
    }

    pub fn weight(&self, o: usize, i: usize) -> i8 {
        self.weights[o * self.input_dim + i]
    }

    pub fn set_weight(&mut self, o: usize, i: usize, value: i8) {
        self.weights[o * self.input_dim + i] = value;
    }

    /// `output[o] = bias[o] + sum_i weights[o][i] * input[i]`
    pub fn compute_reference(&mut self) -> NpuResult<()> {
        check_len("weights", self.weights.len(), self.output_dim * self.input_dim)?;
        check_len("input", self.input.len(), self.input_dim)?;
        check_len("bias", self.bias.len(), self.output_dim)?;
        check_len("output", self.output.len(), self.output_dim)?;

        for o in 0..self.output_dim {
            let mut sum = 0i32;
            for i in 0..self.input_dim {
                ref_mac(self.input[i], self.weight(o, i), &mut sum);
            }
            self.output[o] = sum.wrapping_add(self.bias[o]);
        }
        Ok(())
    }
}

/// Operands and result of `C = A @ B`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GemmLayer {
    pub m: usize,
    pub k: usize,
    pub n: usize,
    /// M x K, row-major
    pub a: Vec<i8>,
    /// K x N, row-major
    pub b: Vec<i8>,
    /// M x N, row-major
    pub c: Vec<i32>,
}

impl GemmLayer {
    pub fn new(m: usize, k: usize, n: usize) -> NpuResult<Self> {
        if m == 0 || k == 0 || n == 0 {
            return Err(NpuError::dimension(format!(
                "GEMM needs nonzero dims, got M={} K={} N={}",
                m, k, n
            )));
        }
        Ok(Self {
            m,
            k,
            n,
            a: vec![0; m * k],
            b: vec![0; k * n],
            c: vec![0; m * n],
        })
    }

    pub fn from_parts(m: usize, k: usize, n: usize, a: Vec<i8>, b: Vec<i8>) -> NpuResult<Self> {
        let mut layer = Self::new(m, k, n)?;
        if a.len() != m * k {
            return Err(NpuError::shape(
                format!("A of {}x{}", m, k),
                format!("{} elements", a.len()),
            ));
        }
        if b.len() != k * n {
            return Err(NpuError::shape(
                format!("B of {}x{}", k, n),
                format!("{} elements", b.len()),
            ));
        }
        layer.a = a;
        layer.b = b;
        Ok(layer)
    }

    /// `C[m][n] = sum_k A[m][k] * B[k][n]`
    pub fn compute_reference(&mut self) -> NpuResult<()> {
        check_len("A", self.a.len(), self.m * self.k)?;
        check_len("B", self.b.len(), self.k * self.n)?;
        check_len("C", self.c.len(), self.m * self.n)?;

        for row in 0..self.m {
            for col in 0..self.n {
                let mut sum = 0i32;
                for kk in 0..self.k {
                    ref_mac(self.a[row * self.k + kk], self.b[kk * self.n + col], &mut sum);
                }
                self.c[row * self.n + col] = sum;
            }
        }
        Ok(())
    }
}

/// Software-tiled GEMV straight into `output`, same loop order as the
/// hardware schedule. Independent of the array model.
pub fn gemv_tiled(
    input: &[i8],
    weights: &[i8],
    output: &mut [i32],
    (input_dim, output_dim): (usize, usize),
    (tile_rows, tile_cols): (usize, usize),
) -> NpuResult<()> {
    check_tile(tile_rows, tile_cols)?;
    check_len("weights", weights.len(), output_dim * input_dim)?;
    check_len("input", input.len(), input_dim)?;
    if output.len() < output_dim {
        return Err(NpuError::shape(
            format!("output of at least {} elements", output_dim),
            format!("{} elements", output.len()),
        ));
    }
    output[..output_dim].fill(0);

    for o_tile in (0..output_dim).step_by(tile_rows) {
        let o_end = (o_tile + tile_rows).min(output_dim);
        for i_tile in (0..input_dim).step_by(tile_cols) {
            let i_end = (i_tile + tile_cols).min(input_dim);
            for o in o_tile..o_end {
                for i in i_tile..i_end {
                    ref_mac(weights[o * input_dim + i], input[i], &mut output[o]);
                }
            }
        }
    }
    Ok(())
}

/// Software-tiled GEMM straight into `c`: M tiles, then K tiles, then all N
pub fn gemm_tiled(
    a: &[i8],
    b: &[i8],
    c: &mut [i32],
    (m, k, n): (usize, usize, usize),
    (tile_m, tile_k): (usize, usize),
) -> NpuResult<()> {
    check_tile(tile_m, tile_k)?;
    check_len("A", a.len(), m * k)?;
    check_len("B", b.len(), k * n)?;
    if c.len() < m * n {
        return Err(NpuError::shape(
            format!("C of at least {} elements", m * n),
            format!("{} elements", c.len()),
        ));
    }
    c[..m * n].fill(0);

    for m_tile in (0..m).step_by(tile_m) {
        let m_end = (m_tile + tile_m).min(m);
        for k_tile in (0..k).step_by(tile_k) {
            let k_end = (k_tile + tile_k).min(k);
            for col in 0..n {
                for row in m_tile..m_end {
                    for kk in k_tile..k_end {
                        ref_mac(a[row * k + kk], b[kk * n + col], &mut c[row * n + col]);
                    }
                }
            }
        }
    }
    Ok(())
}

fn check_tile(rows: usize, cols: usize) -> NpuResult<()> {
    if rows == 0 || cols == 0 {
        return Err(NpuError::dimension(format!("tile of {}x{} is empty", rows, cols)));
    }
    Ok(())
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
