//! Tile executors
//!
//! The tiling engine issues tiles through [`TileExecutor`]. Two executors
//! exist and they must agree on every number:
//!
//! - [`FunctionalExecutor`]: one synchronous call per tile, no timing.
//! - [`CycleAccurateExecutor`]: the tile controller, buffers and reduction
//!   array stepped edge by edge; reports exact cycle counts.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::controller::{AccumulatorSite, TileCommand, TileController, TileOperands, TileOutcome};
use crate::error::{NpuError, NpuResult};
use crate::hardware::{ArrayGeometry, NpuConfig};

/// Which executor a caller needs. Timing-dependent checks require
/// `CycleAccurate`; the two are not interchangeable for those.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    Functional,
    CycleAccurate,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "functional" | "func" => Ok(ExecutionMode::Functional),
            "cycle" | "cycle-accurate" => Ok(ExecutionMode::CycleAccurate),
            other => Err(format!("Unknown execution mode: {}", other)),
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Functional => write!(f, "functional"),
            ExecutionMode::CycleAccurate => write!(f, "cycle-accurate"),
        }
    }
}

/// Something that can run one tile of the reduction array
pub trait TileExecutor {
    fn geometry(&self) -> ArrayGeometry;

    fn mode(&self) -> ExecutionMode;

    fn execute(
        &mut self,
        operands: TileOperands<'_>,
        command: TileCommand,
    ) -> NpuResult<TileOutcome>;
}

/// Build the executor for `mode`
pub fn executor_for(mode: ExecutionMode, config: &NpuConfig) -> NpuResult<Box<dyn TileExecutor>> {
    Ok(match mode {
        ExecutionMode::Functional => Box::new(FunctionalExecutor::new(config.geometry())?),
        ExecutionMode::CycleAccurate => Box::new(CycleAccurateExecutor::new(config)?),
    })
}

/// Numeric-only model of the array: one accumulator per output row
#[derive(Debug, Clone)]
pub struct FunctionalExecutor {
    geometry: ArrayGeometry,
    acc: Vec<i32>,
}

impl FunctionalExecutor {
    pub fn new(geometry: ArrayGeometry) -> NpuResult<Self> {
        let geometry = ArrayGeometry::new(geometry.rows, geometry.cols)?;
        Ok(Self {
            geometry,
            acc: vec![0; geometry.rows],
        })
    }

    fn dot_rows(&self, operands: &TileOperands<'_>) -> Vec<i32> {
        operands
            .weights
            .chunks(self.geometry.cols)
            .map(|row| {
                row.iter().zip(operands.input).fold(0i32, |sum, (&w, &x)| {
                    sum.wrapping_add(i32::from(w) * i32::from(x))
                })
            })
            .collect()
    }
}

impl TileExecutor for FunctionalExecutor {
    fn geometry(&self) -> ArrayGeometry {
        self.geometry
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Functional
    }

    fn execute(
        &mut self,
        operands: TileOperands<'_>,
        command: TileCommand,
    ) -> NpuResult<TileOutcome> {
        let ArrayGeometry { rows, cols } = self.geometry;
        if operands.weights.len() != rows * cols || operands.input.len() != cols {
            return Err(NpuError::shape(
                format!("{}x{} tile with {} inputs", rows, cols, cols),
                format!("{} weights, {} inputs", operands.weights.len(), operands.input.len()),
            ));
        }
        let partial = self.dot_rows(&operands);

        let output = match command.site {
            AccumulatorSite::Array => {
                if command.clear {
                    self.acc.fill(0);
                }
                for (acc, p) in self.acc.iter_mut().zip(&partial) {
                    *acc = acc.wrapping_add(*p);
                }
                self.acc.clone()
            }
            AccumulatorSite::OutputBuffer if command.clear => partial,
            AccumulatorSite::OutputBuffer => {
                if operands.partial.len() != rows {
                    return Err(NpuError::shape(
                        format!("partial sums of {}", rows),
                        format!("{} elements", operands.partial.len()),
                    ));
                }
                operands
                    .partial
                    .iter()
                    .zip(&partial)
                    .map(|(acc, p)| acc.wrapping_add(*p))
                    .collect()
            }
        };

        Ok(TileOutcome { output, cycles: 0 })
    }
}

/// Cycle-level executor built on [`TileController`]
#[derive(Debug, Clone)]
pub struct CycleAccurateExecutor {
    controller: TileController,
}

impl CycleAccurateExecutor {
    pub fn new(config: &NpuConfig) -> NpuResult<Self> {
        Ok(Self {
            controller: TileController::new(config)?,
        })
    }

    pub fn controller(&self) -> &TileController {
        &self.controller
    }
}

impl TileExecutor for CycleAccurateExecutor {
    fn geometry(&self) -> ArrayGeometry {
        self.controller.geometry()
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::CycleAccurate
    }

    fn execute(
        &mut self,
        operands: TileOperands<'_>,
        command: TileCommand,
    ) -> NpuResult<TileOutcome> {
        self.controller.run_tile(operands, command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_both(weights: &[i8], input: &[i8], commands: &[TileCommand]) -> (Vec<i32>, Vec<i32>) {
        let config = NpuConfig::new(2, 2);
        let mut functional = executor_for(ExecutionMode::Functional, &config).unwrap();
        let mut cycle = executor_for(ExecutionMode::CycleAccurate, &config).unwrap();
        let mut last = (Vec::new(), Vec::new());
        let mut partial_f = vec![0; 2];
        let mut partial_c = vec![0; 2];
        for &command in commands {
            let f = functional
                .execute(TileOperands { weights, input, partial: &partial_f }, command)
                .unwrap();
            let c = cycle
                .execute(TileOperands { weights, input, partial: &partial_c }, command)
                .unwrap();
            partial_f = f.output.clone();
            partial_c = c.output.clone();
            last = (f.output, c.output);
        }
        last
    }

    #[test]
    fn test_modes_agree_array_site() {
        let commands = [
            TileCommand { clear: true, site: AccumulatorSite::Array },
            TileCommand { clear: false, site: AccumulatorSite::Array },
        ];
        let (functional, cycle) = run_both(&[1, -2, 3, 4], &[5, 6], &commands);
        assert_eq!(functional, vec![-14, 78]);
        assert_eq!(functional, cycle);
    }

    #[test]
    fn test_modes_agree_output_buffer_site() {
        let commands = [
            TileCommand { clear: true, site: AccumulatorSite::OutputBuffer },
            TileCommand { clear: false, site: AccumulatorSite::OutputBuffer },
            TileCommand { clear: false, site: AccumulatorSite::OutputBuffer },
        ];
        let (functional, cycle) = run_both(&[1, 1, 1, 1], &[-128, -128], &commands);
        assert_eq!(functional, vec![-768, -768]);
        assert_eq!(functional, cycle);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("cycle".parse::<ExecutionMode>(), Ok(ExecutionMode::CycleAccurate));
        assert_eq!("Functional".parse::<ExecutionMode>(), Ok(ExecutionMode::Functional));
        assert!("fast".parse::<ExecutionMode>().is_err());
    }
}
