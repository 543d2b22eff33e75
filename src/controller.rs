//! Per-tile controller state machine
//!
//! Sequences one tile through the reduction array:
//!
//! ```text
//! IDLE -> LOAD -> LOAD_WAIT -> COMPUTE -> WAIT -> STORE -> DONE -> IDLE
//! ```
//!
//! Every wait is a fixed number of cycles: LOAD_WAIT covers the buffer read
//! latency and WAIT covers the array latency. The controller is tile-local;
//! K-dimension sweeps are driven by an upstream loop that invokes it once
//! per tile with the right clear flag.

use serde::{Deserialize, Serialize};

use crate::array::{ArrayDrive, ReductionArray};
use crate::buffer::TileBuffer;
use crate::error::{NpuError, NpuResult};
use crate::hardware::{ArrayGeometry, NpuConfig, ARRAY_LATENCY};

/// Where partial sums live between the K tiles of one output tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccumulatorSite {
    /// The array's MAC accumulators carry the sweep; the array is cleared
    /// on the first K tile only and STORE overwrites the output buffer.
    Array,
    /// The array computes a fresh partial every tile; STORE overwrites the
    /// output buffer on the first K tile and adds to it otherwise.
    OutputBuffer,
}

/// Controller states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileState {
    Idle,
    Load,
    /// Remaining cycles of buffer read latency
    LoadWait { remaining: u32 },
    Compute,
    /// Cycles spent waiting for `valid_out`
    Wait { elapsed: u32 },
    Store,
    Done,
}

/// Handshake outputs seen by the upstream scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStatus {
    pub busy: bool,
    pub done: bool,
}

/// One tile's operands, already zero-padded to the array geometry
#[derive(Debug, Clone, Copy)]
pub struct TileOperands<'a> {
    /// Row-major R x C weights
    pub weights: &'a [i8],
    /// Length-C input slice
    pub input: &'a [i8],
    /// Length-R running partial sums; read only for `AccumulatorSite::OutputBuffer`
    pub partial: &'a [i32],
}

/// Per-invocation command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCommand {
    /// This tile starts an accumulation sweep
    pub clear: bool,
    pub site: AccumulatorSite,
}

/// Result of running one tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileOutcome {
    /// Length-R output vector as written by STORE
    pub output: Vec<i32>,
    /// Cycles from the start edge through DONE (0 when not cycle-accurate)
    pub cycles: u64,
}

/// Tile controller driving one reduction array
#[derive(Debug, Clone)]
pub struct TileController {
    state: TileState,
    clear_latched: bool,
    site: AccumulatorSite,
    read_latency: u32,
    array: ReductionArray,
    weight_buf: TileBuffer<i8>,
    input_buf: TileBuffer<i8>,
    output_buf: Vec<i32>,
    cycle: u64,
}

impl TileController {
    pub fn new(config: &NpuConfig) -> NpuResult<Self> {
        config.validate()?;
        let geometry = config.geometry();
        Ok(Self {
            state: TileState::Idle,
            clear_latched: false,
            site: AccumulatorSite::Array,
            read_latency: config.buffer_read_latency,
            array: ReductionArray::new(geometry),
            weight_buf: TileBuffer::new(geometry.macs(), config.buffer_read_latency),
            input_buf: TileBuffer::new(geometry.cols, config.buffer_read_latency),
            output_buf: vec![0; geometry.rows],
            cycle: 0,
        })
    }

    pub fn geometry(&self) -> ArrayGeometry {
        self.array.geometry()
    }

    pub fn state(&self) -> TileState {
        self.state
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            busy: !matches!(self.state, TileState::Idle | TileState::Done),
            done: self.state == TileState::Done,
        }
    }

    pub fn array(&self) -> &ReductionArray {
        &self.array
    }

    pub fn output_buffer(&self) -> &[i32] {
        &self.output_buf
    }

    /// Copy one tile's operands into the buffers. Only legal while idle.
    pub fn load_tile(
        &mut self,
        operands: TileOperands<'_>,
        site: AccumulatorSite,
    ) -> NpuResult<()> {
        if self.state != TileState::Idle {
            return Err(NpuError::ControllerBusy);
        }
        let ArrayGeometry { rows, cols } = self.geometry();
        if operands.weights.len() != rows * cols {
            return Err(NpuError::shape(
                format!("{}x{} weight tile", rows, cols),
                format!("{} elements", operands.weights.len()),
            ));
        }
        if operands.input.len() != cols {
            return Err(NpuError::shape(
                format!("input slice of {}", cols),
                format!("{} elements", operands.input.len()),
            ));
        }
        if site == AccumulatorSite::OutputBuffer && operands.partial.len() != rows {
            return Err(NpuError::shape(
                format!("partial sums of {}", rows),
                format!("{} elements", operands.partial.len()),
            ));
        }
        // Nothing is latched until every operand has been checked
        self.weight_buf.fill(operands.weights);
        self.input_buf.fill(operands.input);
        if site == AccumulatorSite::OutputBuffer {
            self.output_buf.copy_from_slice(operands.partial);
        }
        self.site = site;
        Ok(())
    }

    /// Advance one clock edge with the given handshake inputs
    pub fn tick(&mut self, start: bool, clear: bool) -> NpuResult<ControllerStatus> {
        let mut clear_acc = false;
        let mut compute_operands = None;

        let next = match self.state {
            TileState::Idle => {
                if start {
                    self.clear_latched = clear;
                    TileState::Load
                } else {
                    TileState::Idle
                }
            }
            TileState::Load => {
                self.weight_buf.request();
                self.input_buf.request();
                // clear_acc wins over enable in the MACs, so it goes out here,
                // ahead of the COMPUTE enable.
                clear_acc = match self.site {
                    AccumulatorSite::Array => self.clear_latched,
                    AccumulatorSite::OutputBuffer => true,
                };
                if self.read_latency > 1 {
                    TileState::LoadWait {
                        remaining: self.read_latency - 1,
                    }
                } else {
                    TileState::Compute
                }
            }
            TileState::LoadWait { remaining } => {
                if remaining > 1 {
                    TileState::LoadWait {
                        remaining: remaining - 1,
                    }
                } else {
                    TileState::Compute
                }
            }
            TileState::Compute => {
                let weights = self.weight_buf.read_port().ok_or(NpuError::BufferNotReady)?;
                let input = self.input_buf.read_port().ok_or(NpuError::BufferNotReady)?;
                compute_operands = Some((input.to_vec(), weights.to_vec()));
                TileState::Wait { elapsed: 0 }
            }
            TileState::Wait { elapsed } => {
                let elapsed = elapsed + 1;
                if self.array.valid_out() {
                    if elapsed != ARRAY_LATENCY {
                        return Err(NpuError::LatencyViolation {
                            expected: ARRAY_LATENCY,
                            observed: elapsed,
                        });
                    }
                    TileState::Store
                } else if elapsed >= ARRAY_LATENCY {
                    return Err(NpuError::LatencyViolation {
                        expected: ARRAY_LATENCY,
                        observed: elapsed,
                    });
                } else {
                    TileState::Wait { elapsed }
                }
            }
            TileState::Store => {
                let result = self.array.output();
                match (self.site, self.clear_latched) {
                    (AccumulatorSite::Array, _) | (AccumulatorSite::OutputBuffer, true) => {
                        self.output_buf.copy_from_slice(result);
                    }
                    (AccumulatorSite::OutputBuffer, false) => {
                        for (acc, partial) in self.output_buf.iter_mut().zip(result) {
                            *acc = acc.wrapping_add(*partial);
                        }
                    }
                }
                TileState::Done
            }
            TileState::Done => TileState::Idle,
        };

        if start && !matches!(self.state, TileState::Idle) {
            log::warn!("start ignored in {:?}: tiles are not cancellable", self.state);
        }

        let drive = match (&compute_operands, clear_acc) {
            (Some((input, weights)), _) => ArrayDrive::compute(input, weights),
            (None, true) => ArrayDrive::clear(),
            (None, false) => ArrayDrive::idle(),
        };
        self.array.tick(drive)?;
        self.weight_buf.tick();
        self.input_buf.tick();

        if next != self.state {
            log::trace!("cycle {}: {:?} -> {:?}", self.cycle, self.state, next);
        }
        self.state = next;
        self.cycle += 1;
        Ok(self.status())
    }

    /// Run one tile to completion: load, pulse start, tick through DONE
    pub fn run_tile(
        &mut self,
        operands: TileOperands<'_>,
        command: TileCommand,
    ) -> NpuResult<TileOutcome> {
        self.load_tile(operands, command.site)?;
        let start_cycle = self.cycle;

        let mut status = self.tick(true, command.clear)?;
        while !status.done {
            status = self.tick(false, false)?;
        }
        // DONE lasts one cycle before returning to IDLE
        self.tick(false, false)?;

        Ok(TileOutcome {
            output: self.output_buf.clone(),
            cycles: self.cycle - start_cycle,
        })
    }
}
