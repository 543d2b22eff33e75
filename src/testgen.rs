//! Test vector generation and exact comparison
//!
//! Vectors come from a seeded ChaCha8 stream so every run with the same
//! seed regenerates the same hex files.

use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{NpuError, NpuResult};
use crate::hexio::dump_hex_file;
use crate::mac::ref_mac;

/// Reproducible INT8 vector source
#[derive(Debug, Clone)]
pub struct VectorGenerator {
    rng: ChaCha8Rng,
    seed: u64,
}

impl VectorGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// `len` values uniform over the full INT8 range
    pub fn random_i8(&mut self, len: usize) -> Vec<i8> {
        (0..len).map(|_| self.rng.gen::<i8>()).collect()
    }

    pub fn random_i8_in(&mut self, len: usize, low: i8, high: i8) -> Vec<i8> {
        (0..len).map(|_| self.rng.gen_range(low..=high)).collect()
    }
}

/// One-shot random vector for `seed`
pub fn generate_random_i8(len: usize, seed: u64) -> Vec<i8> {
    VectorGenerator::new(seed).random_i8(len)
}

/// `start, start+1, ...` wrapping at the INT8 boundary
pub fn sequential_i8(len: usize, start: i8) -> Vec<i8> {
    (0..len).map(|i| start.wrapping_add(i as i8)).collect()
}

/// Fail on the first element where `tiled` and `direct` differ
pub fn compare_exact(case: &str, tiled: &[i32], direct: &[i32]) -> NpuResult<()> {
    if tiled.len() != direct.len() {
        return Err(NpuError::LengthMismatch {
            case: case.to_string(),
            tiled: tiled.len(),
            direct: direct.len(),
        });
    }
    match tiled.iter().zip(direct).position(|(t, d)| t != d) {
        Some(index) => Err(NpuError::Mismatch {
            case: case.to_string(),
            index,
            tiled: tiled[index],
            direct: direct[index],
        }),
        None => Ok(()),
    }
}

/// One streamed MAC operation and the accumulator value it must produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacOp {
    pub clear: bool,
    pub input: i8,
    pub weight: i8,
    pub expected: i32,
}

/// Fixed-capacity stream of MAC operations for the MAC testbench
#[derive(Debug, Clone)]
pub struct MacStream {
    ops: Vec<MacOp>,
    capacity: usize,
    acc: i32,
}

pub const MAC_INPUT_FILE: &str = "mac_test_input.hex";
pub const MAC_WEIGHT_FILE: &str = "mac_test_weight.hex";
pub const MAC_CLEAR_FILE: &str = "mac_test_clear.hex";
pub const MAC_EXPECTED_FILE: &str = "mac_test_expected.hex";

impl MacStream {
    pub fn new(capacity: usize) -> Self {
        Self {
            ops: Vec::with_capacity(capacity),
            capacity,
            acc: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ops(&self) -> &[MacOp] {
        &self.ops
    }

    /// Append an operation. A clear resets the running accumulator before
    /// the product is added. When full the op is dropped and the running
    /// value is left untouched.
    pub fn push(&mut self, clear: bool, input: i8, weight: i8) -> NpuResult<i32> {
        if self.ops.len() >= self.capacity {
            log::error!("MAC test ops overflow, dropping ({}, {})", input, weight);
            return Err(NpuError::CapacityOverflow {
                capacity: self.capacity,
            });
        }
        if clear {
            self.acc = 0;
        }
        ref_mac(input, weight, &mut self.acc);
        self.ops.push(MacOp {
            clear,
            input,
            weight,
            expected: self.acc,
        });
        Ok(self.acc)
    }

    /// Write the four MAC testbench files into `dir`
    pub fn dump(&self, dir: impl AsRef<Path>) -> NpuResult<()> {
        let dir = dir.as_ref();
        let inputs: Vec<i8> = self.ops.iter().map(|op| op.input).collect();
        let weights: Vec<i8> = self.ops.iter().map(|op| op.weight).collect();
        let clears: Vec<u8> = self.ops.iter().map(|op| u8::from(op.clear)).collect();
        let expected: Vec<i32> = self.ops.iter().map(|op| op.expected).collect();

        dump_hex_file(dir.join(MAC_INPUT_FILE), &inputs)?;
        dump_hex_file(dir.join(MAC_WEIGHT_FILE), &weights)?;
        dump_hex_file(dir.join(MAC_CLEAR_FILE), &clears)?;
        dump_hex_file(dir.join(MAC_EXPECTED_FILE), &expected)?;
        log::info!("MAC test vectors: {} operations", self.ops.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_reproducible() {
        assert_eq!(generate_random_i8(64, 42), generate_random_i8(64, 42));
        assert_ne!(generate_random_i8(64, 42), generate_random_i8(64, 1042));
    }

    #[test]
    fn test_range_bounds() {
        let mut gen = VectorGenerator::new(7);
        let values = gen.random_i8_in(256, -3, 3);
        assert!(values.iter().all(|v| (-3..=3).contains(v)));
    }

    #[test]
    fn test_sequential_wraps() {
        assert_eq!(sequential_i8(4, 126), vec![126, 127, -128, -127]);
    }

    #[test]
    fn test_compare_exact_reports_first_mismatch() {
        assert!(compare_exact("ok", &[1, 2, 3], &[1, 2, 3]).is_ok());
        match compare_exact("case", &[1, 9, 7], &[1, 2, 3]) {
            Err(NpuError::Mismatch {
                index,
                tiled,
                direct,
                ..
            }) => assert_eq!((index, tiled, direct), (1, 9, 2)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            compare_exact("len", &[1], &[1, 2]),
            Err(NpuError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_mac_stream_running_value() {
        let mut stream = MacStream::new(8);
        assert_eq!(stream.push(true, 10, 5).unwrap(), 50);
        assert_eq!(stream.push(false, -3, 4).unwrap(), 38);
        assert_eq!(stream.push(true, 2, 2).unwrap(), 4);
        assert_eq!(stream.len(), 3);
    }

    #[test]
    fn test_mac_stream_overflow_drops_op() {
        let mut stream = MacStream::new(2);
        stream.push(true, 1, 1).unwrap();
        stream.push(false, 1, 1).unwrap();
        let err = stream.push(false, 1, 1).unwrap_err();
        assert!(matches!(err, NpuError::CapacityOverflow { capacity: 2 }));
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.ops()[1].expected, 2);
    }
}
