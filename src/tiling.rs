//! Tiling strategy for the reduction array
//!
//! Breaks a logical product into tiles that fit the R x C array.
//!
//! For GEMV with an M x K weight matrix:
//! - output tiles step through M by R (outer loop)
//! - reduction tiles step through K by C (inner loop), accumulating
//!
//! For GEMM C = A @ B with A M x K and B K x N, every (M tile, K tile) pair
//! runs all N columns before the K tile advances, so one weight slab is
//! reused across the whole N sweep.
//!
//! Loop order is about reload locality only. What matters for correctness
//! is that each output tile's sweep is cleared on its first K tile and
//! never again.

use serde::{Deserialize, Serialize};

use crate::error::{NpuError, NpuResult};
use crate::hardware::{ArrayGeometry, TileCoord};

/// Tiling strategy bound to one array geometry
pub struct TilingStrategy {
    geometry: ArrayGeometry,
}

impl TilingStrategy {
    pub fn new(geometry: ArrayGeometry) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> ArrayGeometry {
        self.geometry
    }

    /// Schedule for `output[m] = sum_k weights[m][k] * input[k]`
    pub fn tile_gemv(&self, m: usize, k: usize) -> NpuResult<TileSchedule> {
        self.check_dims(&[("M", m), ("K", k)])?;
        let m_tiles = self.geometry.row_tiles(m);
        let k_tiles = self.geometry.col_tiles(k);

        let mut tiles = Vec::with_capacity(m_tiles * k_tiles);
        for i in 0..m_tiles {
            for kk in 0..k_tiles {
                tiles.push(self.tile(i, kk, k_tiles, m, k, None));
            }
        }

        Ok(TileSchedule {
            kind: ProductKind::Gemv,
            m,
            k,
            n: 1,
            geometry: self.geometry,
            tiles,
        })
    }

    /// Schedule for `C[m][n] = sum_k A[m][k] * B[k][n]`
    pub fn tile_gemm(&self, m: usize, k: usize, n: usize) -> NpuResult<TileSchedule> {
        self.check_dims(&[("M", m), ("K", k), ("N", n)])?;
        let m_tiles = self.geometry.row_tiles(m);
        let k_tiles = self.geometry.col_tiles(k);

        let mut tiles = Vec::with_capacity(m_tiles * k_tiles * n);
        for i in 0..m_tiles {
            for kk in 0..k_tiles {
                for col in 0..n {
                    tiles.push(self.tile(i, kk, k_tiles, m, k, Some(col)));
                }
            }
        }

        Ok(TileSchedule {
            kind: ProductKind::Gemm,
            m,
            k,
            n,
            geometry: self.geometry,
            tiles,
        })
    }

    fn tile(
        &self,
        i: usize,
        kk: usize,
        k_tiles: usize,
        m: usize,
        k: usize,
        column: Option<usize>,
    ) -> TileOp {
        let coord = TileCoord::new(i, kk, self.geometry);
        TileOp {
            coord,
            row_range: (coord.start_row, (coord.start_row + self.geometry.rows).min(m)),
            k_range: (coord.start_col, (coord.start_col + self.geometry.cols).min(k)),
            column,
            is_first_k: kk == 0,
            is_last_k: kk == k_tiles - 1,
        }
    }

    fn check_dims(&self, dims: &[(&str, usize)]) -> NpuResult<()> {
        for (name, value) in dims {
            if *value == 0 {
                return Err(NpuError::dimension(format!("{} must be nonzero", name)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductKind {
    Gemv,
    Gemm,
}

/// Ordered list of tiles to issue for one product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileSchedule {
    pub kind: ProductKind,
    pub m: usize,
    pub k: usize,
    pub n: usize,
    pub geometry: ArrayGeometry,
    pub tiles: Vec<TileOp>,
}

impl TileSchedule {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Number of sweeps, i.e. tiles that clear
    pub fn sweeps(&self) -> usize {
        self.tiles.iter().filter(|t| t.is_first_k).count()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// One tile issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileOp {
    pub coord: TileCoord,
    /// Output rows covered, clipped to M
    pub row_range: (usize, usize),
    /// Reduction indices covered, clipped to K
    pub k_range: (usize, usize),
    /// GEMM output column; `None` for GEMV
    pub column: Option<usize>,
    /// First tile of its sweep: clears the accumulator
    pub is_first_k: bool,
    /// Last tile of its sweep: result is final
    pub is_last_k: bool,
}

impl TileOp {
    pub fn rows(&self) -> usize {
        self.row_range.1 - self.row_range.0
    }

    pub fn depth(&self) -> usize {
        self.k_range.1 - self.k_range.0
    }
}

impl std::fmt::Display for TileOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "out[{}:{}]{} += W[{}:{}, {}:{}]{}",
            self.row_range.0,
            self.row_range.1,
            self.column.map(|n| format!("[{}]", n)).unwrap_or_default(),
            self.row_range.0,
            self.row_range.1,
            self.k_range.0,
            self.k_range.1,
            if self.is_first_k { " (clear)" } else { "" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_tile() {
        let tiler = TilingStrategy::new(ArrayGeometry::default());
        let schedule = tiler.tile_gemv(32, 8).unwrap();
        assert_eq!(schedule.len(), 1);
        let tile = schedule.tiles[0];
        assert!(tile.is_first_k && tile.is_last_k);
        assert_eq!(tile.row_range, (0, 32));
        assert_eq!(tile.k_range, (0, 8));
    }

    #[test]
    fn test_gemv_order_and_clears() {
        let tiler = TilingStrategy::new(ArrayGeometry::default());
        // 8 output tiles x 16 input tiles
        let schedule = tiler.tile_gemv(256, 128).unwrap();
        assert_eq!(schedule.len(), 128);
        assert_eq!(schedule.sweeps(), 8);

        // K is the inner loop
        assert_eq!(schedule.tiles[0].coord.col_tile, 0);
        assert_eq!(schedule.tiles[1].coord.col_tile, 1);
        assert_eq!(schedule.tiles[15].coord.row_tile, 0);
        assert!(schedule.tiles[15].is_last_k);
        assert_eq!(schedule.tiles[16].coord.row_tile, 1);
        assert!(schedule.tiles[16].is_first_k);
    }

    #[test]
    fn test_edge_tiles_are_clipped() {
        let tiler = TilingStrategy::new(ArrayGeometry::default());
        let schedule = tiler.tile_gemv(33, 10).unwrap();
        assert_eq!(schedule.len(), 4);
        let last = schedule.tiles[3];
        assert_eq!(last.row_range, (32, 33));
        assert_eq!(last.k_range, (8, 10));
        assert_eq!(last.rows(), 1);
        assert_eq!(last.depth(), 2);
    }

    #[test]
    fn test_gemm_n_innermost() {
        let tiler = TilingStrategy::new(ArrayGeometry::new(2, 2).unwrap());
        let schedule = tiler.tile_gemm(4, 4, 3).unwrap();
        // 2 M tiles x 2 K tiles x 3 columns
        assert_eq!(schedule.len(), 12);
        assert_eq!(schedule.sweeps(), 6);

        let columns: Vec<_> = schedule.tiles[..6].iter().map(|t| t.column).collect();
        assert_eq!(columns, vec![Some(0), Some(1), Some(2), Some(0), Some(1), Some(2)]);
        assert!(schedule.tiles[..3].iter().all(|t| t.is_first_k));
        assert!(schedule.tiles[3..6].iter().all(|t| t.is_last_k && !t.is_first_k));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let tiler = TilingStrategy::new(ArrayGeometry::default());
        assert!(tiler.tile_gemv(0, 8).is_err());
        assert!(tiler.tile_gemm(4, 4, 0).is_err());
    }
}
