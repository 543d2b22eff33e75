//! Spatial reduction array
//!
//! An R x C grid of MAC units. Every unit in column `c` sees the shared
//! `input[c]`; unit `(r, c)` sees its private `weight[r * C + c]`. Each row's
//! C accumulators are reduced combinationally and captured in an output
//! register, so `valid_out` fires exactly `ARRAY_LATENCY` edges after the
//! edge that sampled `enable`.

use crate::error::{NpuError, NpuResult};
use crate::hardware::{ArrayGeometry, ARRAY_LATENCY};
use crate::mac::{MacDrive, MacUnit};

/// Signals presented to the array for one clock edge
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayDrive<'a> {
    pub enable: bool,
    pub clear_acc: bool,
    /// Shared input vector, length C (ignored unless `enable`)
    pub input: &'a [i8],
    /// Row-major R x C weights (ignored unless `enable`)
    pub weights: &'a [i8],
}

impl<'a> ArrayDrive<'a> {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn clear() -> Self {
        Self {
            clear_acc: true,
            ..Self::default()
        }
    }

    pub fn compute(input: &'a [i8], weights: &'a [i8]) -> Self {
        Self {
            enable: true,
            clear_acc: false,
            input,
            weights,
        }
    }
}

/// Fixed-size grid of MAC units with a per-row reducer
#[derive(Debug, Clone)]
pub struct ReductionArray {
    geometry: ArrayGeometry,
    macs: Vec<MacUnit>,
    output: Vec<i32>,
    /// Bit `i` set: an enable sampled `i + 1` edges ago is still in flight
    valid_pipe: u32,
    valid_out: bool,
}

impl ReductionArray {
    pub fn new(geometry: ArrayGeometry) -> Self {
        Self {
            geometry,
            macs: vec![MacUnit::new(); geometry.macs()],
            output: vec![0; geometry.rows],
            valid_pipe: 0,
            valid_out: false,
        }
    }

    pub fn geometry(&self) -> ArrayGeometry {
        self.geometry
    }

    /// Advance one clock edge
    pub fn tick(&mut self, drive: ArrayDrive<'_>) -> NpuResult<()> {
        let ArrayGeometry { rows, cols } = self.geometry;
        if drive.enable && !drive.clear_acc {
            if drive.input.len() != cols {
                return Err(NpuError::shape(
                    format!("input vector of {}", cols),
                    drive.input.len().to_string(),
                ));
            }
            if drive.weights.len() != rows * cols {
                return Err(NpuError::shape(
                    format!("weight tile of {}", rows * cols),
                    drive.weights.len().to_string(),
                ));
            }
        }

        // The output register samples the row sums before the MACs move.
        let row_sums = self.row_sums();
        let out_fires = self.valid_pipe & (1 << (ARRAY_LATENCY - 2)) != 0;

        for r in 0..rows {
            for c in 0..cols {
                let mac_drive = if drive.clear_acc {
                    MacDrive::clear()
                } else if drive.enable {
                    MacDrive::enabled(drive.input[c], drive.weights[r * cols + c])
                } else {
                    MacDrive::default()
                };
                self.macs[r * cols + c].tick(mac_drive);
            }
        }

        if out_fires {
            self.output = row_sums;
        }
        self.valid_out = out_fires;

        let mask = (1u32 << (ARRAY_LATENCY - 1)) - 1;
        if drive.clear_acc {
            self.valid_pipe = 0;
        } else {
            self.valid_pipe = ((self.valid_pipe << 1) | u32::from(drive.enable)) & mask;
        }
        Ok(())
    }

    /// Combinational reduction of each row's accumulators
    pub fn row_sums(&self) -> Vec<i32> {
        self.macs
            .chunks(self.geometry.cols)
            .map(|row| {
                row.iter()
                    .fold(0i32, |sum, mac| sum.wrapping_add(mac.accumulator()))
            })
            .collect()
    }

    /// Registered output vector, stable from `valid_out` until the next result
    pub fn output(&self) -> &[i32] {
        &self.output
    }

    pub fn valid_out(&self) -> bool {
        self.valid_out
    }

    /// True while any enabled sample has not reached the output register
    pub fn in_flight(&self) -> bool {
        self.valid_pipe != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_weights(geometry: ArrayGeometry) -> Vec<i8> {
        let mut weights = vec![0i8; geometry.macs()];
        for r in 0..geometry.rows {
            weights[r * geometry.cols + r % geometry.cols] = 1;
        }
        weights
    }

    #[test]
    fn test_valid_out_latency() {
        let geometry = ArrayGeometry::default();
        let mut array = ReductionArray::new(geometry);
        let input = [1i8, 2, 3, 4, 5, 6, 7, 8];
        let weights = identity_weights(geometry);

        array.tick(ArrayDrive::compute(&input, &weights)).unwrap();
        let mut fired_on = None;
        for edge in 2..=6u32 {
            array.tick(ArrayDrive::idle()).unwrap();
            if array.valid_out() {
                assert!(fired_on.is_none(), "valid_out must be a single pulse");
                fired_on = Some(edge);
            }
        }
        assert_eq!(fired_on, Some(ARRAY_LATENCY));
        for r in 0..geometry.rows {
            assert_eq!(array.output()[r], i32::from(input[r % 8]));
        }
    }

    #[test]
    fn test_back_to_back_enables() {
        let geometry = ArrayGeometry::new(2, 2).unwrap();
        let mut array = ReductionArray::new(geometry);
        let weights = [1i8, 1, 1, 1];
        let inputs = [[1i8, 1], [2, 2], [3, 3]];
        let mut seen = Vec::new();

        for edge in 1..=6u32 {
            let drive = match inputs.get(edge as usize - 1) {
                Some(input) => ArrayDrive::compute(input, &weights),
                None => ArrayDrive::idle(),
            };
            array.tick(drive).unwrap();
            if array.valid_out() {
                seen.push((edge, array.output().to_vec()));
            }
        }

        // Running sums after each enable: 2, 2+4, 2+4+6
        assert_eq!(
            seen,
            vec![(3, vec![2, 2]), (4, vec![6, 6]), (5, vec![12, 12])]
        );
    }

    #[test]
    fn test_clear_flushes_valid() {
        let geometry = ArrayGeometry::new(1, 1).unwrap();
        let mut array = ReductionArray::new(geometry);
        array.tick(ArrayDrive::compute(&[3], &[3])).unwrap();
        array.tick(ArrayDrive::clear()).unwrap();
        for _ in 0..4 {
            array.tick(ArrayDrive::idle()).unwrap();
            assert!(!array.valid_out());
        }
        assert_eq!(array.row_sums(), vec![0]);
    }

    #[test]
    fn test_rejects_short_input() {
        let mut array = ReductionArray::new(ArrayGeometry::default());
        let weights = vec![0i8; 256];
        assert!(array.tick(ArrayDrive::compute(&[1, 2], &weights)).is_err());
    }
}
