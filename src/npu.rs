//! Register-driven accelerator front end
//!
//! Owns the control registers, a byte-addressed scratch memory and a
//! tiled engine. Writing `CONTROL.start` runs one product to completion:
//!
//! - `DIM_N <= 1`: GEMV, weights `M x K` at `WEIGHT_BASE`, input `K` at `INPUT_BASE`
//! - `DIM_N > 1`: GEMM, A `M x K` at `WEIGHT_BASE`, B `K x N` at `INPUT_BASE`
//!
//! Results are little-endian `i32` at `OUTPUT_BASE`.

use crate::engine::{ExecutionReport, TiledEngine};
use crate::error::{NpuError, NpuResult};
use crate::executor::ExecutionMode;
use crate::hardware::NpuConfig;
use crate::regs::{Reg, RegisterFile, CONTROL_CLEAR, CONTROL_START, STATUS_BUSY, STATUS_DONE};

pub struct Npu {
    regs: RegisterFile,
    memory: Vec<u8>,
    engine: TiledEngine,
    units: usize,
    last_report: Option<ExecutionReport>,
}

impl Npu {
    pub fn new(config: &NpuConfig, mode: ExecutionMode, memory_size: usize) -> NpuResult<Self> {
        let engine = TiledEngine::new(config, mode)?;
        let units = config.total_pe_units();
        let mut regs = RegisterFile::new();
        // All units enabled out of reset
        regs.write(Reg::UnitEnable, unit_mask(units));
        Ok(Self {
            regs,
            memory: vec![0; memory_size],
            engine,
            units,
            last_report: None,
        })
    }

    pub fn read_reg(&self, reg: Reg) -> u32 {
        self.regs.read(reg)
    }

    /// Bus write. `CONTROL` is interpreted; every other register is stored.
    pub fn write_reg(&mut self, reg: Reg, value: u32) -> NpuResult<()> {
        match reg {
            Reg::Status => Err(NpuError::register("STATUS is read-only")),
            Reg::Control => self.write_control(value),
            _ => {
                self.regs.write(reg, value);
                Ok(())
            }
        }
    }

    pub fn busy(&self) -> bool {
        self.regs.is_set(Reg::Status, STATUS_BUSY)
    }

    pub fn done(&self) -> bool {
        self.regs.is_set(Reg::Status, STATUS_DONE)
    }

    pub fn last_report(&self) -> Option<ExecutionReport> {
        self.last_report
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn write_i8(&mut self, addr: u32, values: &[i8]) -> NpuResult<()> {
        let range = self.region(addr, values.len(), "write")?;
        for (byte, value) in self.memory[range].iter_mut().zip(values) {
            *byte = *value as u8;
        }
        Ok(())
    }

    pub fn read_i8(&self, addr: u32, len: usize) -> NpuResult<Vec<i8>> {
        let range = self.region(addr, len, "read")?;
        Ok(self.memory[range].iter().map(|b| *b as i8).collect())
    }

    pub fn read_i32(&self, addr: u32, len: usize) -> NpuResult<Vec<i32>> {
        let range = self.region(addr, len * 4, "read")?;
        Ok(self.memory[range]
            .chunks_exact(4)
            .map(|w| i32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect())
    }

    fn write_i32(&mut self, addr: u32, values: &[i32]) -> NpuResult<()> {
        let range = self.region(addr, values.len() * 4, "write")?;
        for (word, value) in self.memory[range].chunks_exact_mut(4).zip(values) {
            word.copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    fn region(&self, addr: u32, len: usize, what: &str) -> NpuResult<std::ops::Range<usize>> {
        let start = addr as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.memory.len() => Ok(start..end),
            _ => Err(NpuError::register(format!(
                "{} of {} bytes at {:#x} exceeds {} bytes of memory",
                what,
                len,
                addr,
                self.memory.len()
            ))),
        }
    }

    fn write_control(&mut self, value: u32) -> NpuResult<()> {
        // start and clear are pulses; only the remaining bits are stored
        self.regs.write(Reg::Control, value & !(CONTROL_START | CONTROL_CLEAR));

        if value & CONTROL_CLEAR != 0 {
            self.regs.clear_bits(Reg::Status, STATUS_DONE);
        }
        if value & CONTROL_START == 0 {
            return Ok(());
        }
        if self.busy() {
            log::warn!("start written while busy, ignored");
            return Ok(());
        }

        self.regs.clear_bits(Reg::Status, STATUS_DONE);
        self.regs.set_bits(Reg::Status, STATUS_BUSY);
        let result = self.launch();
        self.regs.clear_bits(Reg::Status, STATUS_BUSY);

        let report = result?;
        self.last_report = Some(report);
        self.regs.set_bits(Reg::Status, STATUS_DONE);
        Ok(())
    }

    fn launch(&mut self) -> NpuResult<ExecutionReport> {
        let enable = self.regs.read(Reg::UnitEnable);
        if enable == 0 {
            return Err(NpuError::register("UNIT_ENABLE mask is zero"));
        }
        if enable & !unit_mask(self.units) != 0 {
            return Err(NpuError::register(format!(
                "UNIT_ENABLE {:#x} selects units beyond the {} present",
                enable, self.units
            )));
        }

        let m = self.regs.read(Reg::DimM) as usize;
        let k = self.regs.read(Reg::DimK) as usize;
        let n = self.regs.read(Reg::DimN) as usize;
        if m == 0 || k == 0 {
            return Err(NpuError::dimension(format!("DIM_M={} DIM_K={}", m, k)));
        }

        let weight_base = self.regs.read(Reg::WeightBase);
        let input_base = self.regs.read(Reg::InputBase);
        let output_base = self.regs.read(Reg::OutputBase);

        let (output, report) = if n <= 1 {
            log::info!("GEMV M={} K={}", m, k);
            let weights = self.read_i8(weight_base, m * k)?;
            let input = self.read_i8(input_base, k)?;
            self.engine.gemv(&weights, &input, k, m)?
        } else {
            log::info!("GEMM M={} K={} N={}", m, k, n);
            let a = self.read_i8(weight_base, m * k)?;
            let b = self.read_i8(input_base, k * n)?;
            self.engine.gemm(&a, &b, m, k, n)?
        };

        self.write_i32(output_base, &output)?;
        log::debug!("{} tiles, {} cycles", report.tiles_issued, report.cycles);
        Ok(report)
    }
}

fn unit_mask(units: usize) -> u32 {
    if units >= 32 {
        u32::MAX
    } else {
        (1u32 << units) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn npu() -> Npu {
        Npu::new(&NpuConfig::default(), ExecutionMode::CycleAccurate, 4096).unwrap()
    }

    fn program(npu: &mut Npu, m: u32, k: u32, n: u32) {
        npu.write_reg(Reg::DimM, m).unwrap();
        npu.write_reg(Reg::DimK, k).unwrap();
        npu.write_reg(Reg::DimN, n).unwrap();
        npu.write_reg(Reg::WeightBase, 0x000).unwrap();
        npu.write_reg(Reg::InputBase, 0x400).unwrap();
        npu.write_reg(Reg::OutputBase, 0x800).unwrap();
    }

    #[test]
    fn test_gemv_through_registers() {
        let mut npu = npu();
        program(&mut npu, 40, 12, 1);
        npu.write_i8(0x000, &vec![2; 40 * 12]).unwrap();
        npu.write_i8(0x400, &vec![-3; 12]).unwrap();

        npu.write_reg(Reg::Control, CONTROL_START).unwrap();
        assert!(npu.done());
        assert!(!npu.busy());
        assert_eq!(npu.read_i32(0x800, 40).unwrap(), vec![-72; 40]);
        // 2 M tiles x 2 K tiles
        assert_eq!(npu.last_report().unwrap().tiles_issued, 4);

        npu.write_reg(Reg::Control, CONTROL_CLEAR).unwrap();
        assert!(!npu.done());
        assert_eq!(npu.read_reg(Reg::Control), 0);
    }

    #[test]
    fn test_gemm_through_registers() {
        let mut npu = npu();
        program(&mut npu, 2, 2, 2);
        npu.write_i8(0x000, &[1, 2, 3, 4]).unwrap();
        npu.write_i8(0x400, &[5, 6, 7, 8]).unwrap();
        npu.write_reg(Reg::Control, CONTROL_START).unwrap();
        assert_eq!(npu.read_i32(0x800, 4).unwrap(), vec![19, 22, 43, 50]);
    }

    #[test]
    fn test_zero_unit_mask_rejected() {
        let mut npu = npu();
        program(&mut npu, 4, 4, 1);
        npu.write_reg(Reg::UnitEnable, 0).unwrap();
        assert!(npu.write_reg(Reg::Control, CONTROL_START).is_err());
        assert!(!npu.busy());
        assert!(!npu.done());
    }

    #[test]
    fn test_bad_regions_and_dims() {
        let mut npu = npu();
        program(&mut npu, 0, 4, 1);
        assert!(npu.write_reg(Reg::Control, CONTROL_START).is_err());

        program(&mut npu, 64, 64, 1);
        npu.write_reg(Reg::OutputBase, 4000).unwrap();
        assert!(npu.write_reg(Reg::Control, CONTROL_START).is_err());

        assert!(npu.write_i8(4095, &[1, 2]).is_err());
        assert!(npu.write_reg(Reg::Status, 0).is_err());
    }
}
