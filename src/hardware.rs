//! Hardware parameters of the modelled accelerator
//!
//! These mirror the RTL parameters of the GEMV sub-array design: a 32x8
//! reduction array of INT8 MAC units with INT32 accumulators, fed from
//! buffers with a fixed read latency.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NpuError, NpuResult};

pub const INPUT_WIDTH: u32 = 8;
pub const WEIGHT_WIDTH: u32 = 8;
pub const OUTPUT_WIDTH: u32 = 32;

/// Output vector length of one sub-array invocation
pub const SUBARRAY_ROWS: usize = 32;
/// Input vector length of one sub-array invocation
pub const SUBARRAY_COLS: usize = 8;

pub const PE_ARRAY_ROWS: usize = 2;
pub const PE_ARRAY_COLS: usize = 2;
pub const NUM_LARGE_ARRAYS: usize = 4;

/// Multiply stage + accumulate stage
pub const MAC_LATENCY: u32 = 2;
/// MAC pipeline plus the array's output register
pub const ARRAY_LATENCY: u32 = MAC_LATENCY + 1;
pub const BUFFER_READ_LATENCY: u32 = 2;

/// Capacity of the streamed MAC test vector
pub const MAC_STREAM_CAPACITY: usize = 512;

/// Rows x columns of one spatial reduction array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayGeometry {
    pub rows: usize,
    pub cols: usize,
}

impl ArrayGeometry {
    pub fn new(rows: usize, cols: usize) -> NpuResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(NpuError::dimension(format!(
                "array geometry must be nonzero, got {}x{}",
                rows, cols
            )));
        }
        Ok(Self { rows, cols })
    }

    pub fn macs(&self) -> usize {
        self.rows * self.cols
    }

    /// Number of row tiles needed to cover `m` outputs
    pub fn row_tiles(&self, m: usize) -> usize {
        m.div_ceil(self.rows)
    }

    /// Number of column tiles needed to cover a reduction of depth `k`
    pub fn col_tiles(&self, k: usize) -> usize {
        k.div_ceil(self.cols)
    }
}

impl Default for ArrayGeometry {
    fn default() -> Self {
        Self {
            rows: SUBARRAY_ROWS,
            cols: SUBARRAY_COLS,
        }
    }
}

/// Full accelerator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpuConfig {
    /// Sub-array rows (output vector length)
    pub subarray_rows: usize,
    /// Sub-array columns (input vector length)
    pub subarray_cols: usize,
    pub pe_array_rows: usize,
    pub pe_array_cols: usize,
    pub num_large_arrays: usize,
    /// Read latency of the weight/input buffers in cycles
    pub buffer_read_latency: u32,
    /// Capacity of the streamed MAC test vector
    pub mac_stream_capacity: usize,
}

impl NpuConfig {
    pub fn new(subarray_rows: usize, subarray_cols: usize) -> Self {
        Self {
            subarray_rows,
            subarray_cols,
            ..Self::default()
        }
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> NpuResult<Self> {
        let config: NpuConfig =
            toml::from_str(source).map_err(|e| NpuError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> NpuResult<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|e| NpuError::io(path, e))?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> NpuResult<()> {
        if self.subarray_rows == 0 || self.subarray_cols == 0 {
            return Err(NpuError::config("sub-array geometry must be nonzero"));
        }
        if self.buffer_read_latency == 0 {
            return Err(NpuError::config("buffer read latency must be at least 1 cycle"));
        }
        if self.mac_stream_capacity == 0 {
            return Err(NpuError::config("MAC stream capacity must be nonzero"));
        }
        Ok(())
    }

    pub fn geometry(&self) -> ArrayGeometry {
        ArrayGeometry {
            rows: self.subarray_rows,
            cols: self.subarray_cols,
        }
    }

    pub fn total_pe_units(&self) -> usize {
        self.pe_array_rows * self.pe_array_cols * self.num_large_arrays
    }

    pub fn total_macs(&self) -> usize {
        self.total_pe_units() * self.subarray_rows * self.subarray_cols
    }

    /// Cycles one tile spends in the controller, start edge through DONE
    pub fn cycles_per_tile(&self) -> u64 {
        // IDLE(start) + LOAD + LOAD_WAIT + COMPUTE + WAIT + STORE + DONE
        let load_wait = u64::from(self.buffer_read_latency - 1);
        4 + load_wait + u64::from(ARRAY_LATENCY) + 1
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for NpuConfig {
    fn default() -> Self {
        Self {
            subarray_rows: SUBARRAY_ROWS,
            subarray_cols: SUBARRAY_COLS,
            pe_array_rows: PE_ARRAY_ROWS,
            pe_array_cols: PE_ARRAY_COLS,
            num_large_arrays: NUM_LARGE_ARRAYS,
            buffer_read_latency: BUFFER_READ_LATENCY,
            mac_stream_capacity: MAC_STREAM_CAPACITY,
        }
    }
}

impl std::fmt::Display for NpuConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Sub-array size: {} x {} (rows x cols)",
            self.subarray_rows, self.subarray_cols
        )?;
        writeln!(f, "PE Array: {} x {}", self.pe_array_rows, self.pe_array_cols)?;
        writeln!(f, "Large Arrays: {}", self.num_large_arrays)?;
        writeln!(f, "Total MACs: {}", self.total_macs())?;
        write!(
            f,
            "Data types: INT{} input/weight, INT{} accumulator",
            INPUT_WIDTH, OUTPUT_WIDTH
        )
    }
}

/// Coordinate of a tile in the logical output/reduction space
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TileCoord {
    /// Tile index along M
    pub row_tile: usize,
    /// Tile index along K
    pub col_tile: usize,
    /// First output row covered
    pub start_row: usize,
    /// First reduction column covered
    pub start_col: usize,
}

impl TileCoord {
    pub fn new(row_tile: usize, col_tile: usize, geometry: ArrayGeometry) -> Self {
        Self {
            row_tile,
            col_tile,
            start_row: row_tile * geometry.rows,
            start_col: col_tile * geometry.cols,
        }
    }
}

/// Copy a `rows x cols` window starting at (`row0`, `col0`) of a row-major
/// `src_rows x src_cols` matrix into a zero-padded `tile_rows x tile_cols`
/// block. Elements outside the source are left at zero.
pub fn gather_tile<T: Copy + Default>(
    src: &[T],
    src_rows: usize,
    src_cols: usize,
    row0: usize,
    col0: usize,
    tile_rows: usize,
    tile_cols: usize,
) -> Vec<T> {
    let mut tile = vec![T::default(); tile_rows * tile_cols];
    let row_end = (row0 + tile_rows).min(src_rows);
    let col_end = (col0 + tile_cols).min(src_cols);
    for r in row0..row_end {
        for c in col0..col_end {
            tile[(r - row0) * tile_cols + (c - col0)] = src[r * src_cols + c];
        }
    }
    tile
}
