//! Control register store
//!
//! A plain word-addressed get/set store. Nothing here has side effects;
//! the handshake (start, clear, busy, done) is interpreted by [`crate::npu::Npu`].

use serde::{Deserialize, Serialize};

use crate::error::{NpuError, NpuResult};

pub const CONTROL_START: u32 = 1 << 0;
pub const CONTROL_CLEAR: u32 = 1 << 1;
pub const STATUS_BUSY: u32 = 1 << 0;
pub const STATUS_DONE: u32 = 1 << 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reg {
    DimM,
    DimK,
    DimN,
    InputBase,
    WeightBase,
    OutputBase,
    UnitEnable,
    Control,
    Status,
}

impl Reg {
    pub const ALL: [Reg; 9] = [
        Reg::DimM,
        Reg::DimK,
        Reg::DimN,
        Reg::InputBase,
        Reg::WeightBase,
        Reg::OutputBase,
        Reg::UnitEnable,
        Reg::Control,
        Reg::Status,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Byte offset on the control bus
    pub fn offset(self) -> u32 {
        (self.index() as u32) * 4
    }

    pub fn from_offset(offset: u32) -> Option<Reg> {
        if offset % 4 != 0 {
            return None;
        }
        Self::ALL.get((offset / 4) as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Reg::DimM => "DIM_M",
            Reg::DimK => "DIM_K",
            Reg::DimN => "DIM_N",
            Reg::InputBase => "INPUT_BASE",
            Reg::WeightBase => "WEIGHT_BASE",
            Reg::OutputBase => "OUTPUT_BASE",
            Reg::UnitEnable => "UNIT_ENABLE",
            Reg::Control => "CONTROL",
            Reg::Status => "STATUS",
        }
    }
}

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFile {
    values: [u32; 9],
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, reg: Reg) -> u32 {
        self.values[reg.index()]
    }

    pub fn write(&mut self, reg: Reg, value: u32) {
        log::trace!("{} <= {:#010x}", reg, value);
        self.values[reg.index()] = value;
    }

    pub fn read_offset(&self, offset: u32) -> NpuResult<u32> {
        let reg = Reg::from_offset(offset)
            .ok_or_else(|| NpuError::register(format!("no register at offset {:#x}", offset)))?;
        Ok(self.read(reg))
    }

    pub fn write_offset(&mut self, offset: u32, value: u32) -> NpuResult<()> {
        let reg = Reg::from_offset(offset)
            .ok_or_else(|| NpuError::register(format!("no register at offset {:#x}", offset)))?;
        self.write(reg, value);
        Ok(())
    }

    pub fn set_bits(&mut self, reg: Reg, mask: u32) {
        let value = self.read(reg) | mask;
        self.write(reg, value);
    }

    pub fn clear_bits(&mut self, reg: Reg, mask: u32) {
        let value = self.read(reg) & !mask;
        self.write(reg, value);
    }

    pub fn is_set(&self, reg: Reg, mask: u32) -> bool {
        self.read(reg) & mask != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_round_trip() {
        for reg in Reg::ALL {
            assert_eq!(Reg::from_offset(reg.offset()), Some(reg));
        }
        assert_eq!(Reg::from_offset(0x02), None);
        assert_eq!(Reg::from_offset(0x40), None);
    }

    #[test]
    fn test_get_set() {
        let mut regs = RegisterFile::new();
        regs.write(Reg::DimM, 64);
        regs.write_offset(Reg::DimK.offset(), 16).unwrap();
        assert_eq!(regs.read(Reg::DimM), 64);
        assert_eq!(regs.read_offset(0x04).unwrap(), 16);
        assert!(regs.read_offset(0x03).is_err());
    }

    #[test]
    fn test_bit_helpers() {
        let mut regs = RegisterFile::new();
        regs.set_bits(Reg::Status, STATUS_BUSY | STATUS_DONE);
        regs.clear_bits(Reg::Status, STATUS_BUSY);
        assert!(regs.is_set(Reg::Status, STATUS_DONE));
        assert!(!regs.is_set(Reg::Status, STATUS_BUSY));
    }
}
