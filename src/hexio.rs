//! Fixed-width ASCII hex vector files
//!
//! One two's-complement value per line, uppercase on output, 2 digits for
//! 8-bit values and 8 digits for 32-bit values. This is the exchange format
//! between the reference model and the RTL testbenches (`$readmemh`).

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::error::{NpuError, NpuResult};
use crate::lexer::HexScanner;

/// A value with a fixed hex encoding width
pub trait HexWord: Copy {
    const BITS: u32;

    fn to_bits(self) -> u32;

    fn from_bits(bits: u32) -> Self;

    fn digits() -> usize {
        (Self::BITS as usize).div_ceil(4)
    }
}

impl HexWord for i8 {
    const BITS: u32 = 8;

    fn to_bits(self) -> u32 {
        u32::from(self as u8)
    }

    fn from_bits(bits: u32) -> Self {
        bits as u8 as i8
    }
}

impl HexWord for u8 {
    const BITS: u32 = 8;

    fn to_bits(self) -> u32 {
        u32::from(self)
    }

    fn from_bits(bits: u32) -> Self {
        bits as u8
    }
}

impl HexWord for i32 {
    const BITS: u32 = 32;

    fn to_bits(self) -> u32 {
        self as u32
    }

    fn from_bits(bits: u32) -> Self {
        bits as i32
    }
}

/// Serialize values, one fixed-width uppercase word per line
pub fn encode_hex<T: HexWord>(values: &[T]) -> String {
    let mut out = String::with_capacity(values.len() * (T::digits() + 1));
    for value in values {
        // Writing to a String cannot fail
        let _ = writeln!(out, "{:0width$X}", value.to_bits(), width = T::digits());
    }
    out
}

pub fn write_hex<T: HexWord, W: Write>(writer: &mut W, values: &[T]) -> io::Result<()> {
    writer.write_all(encode_hex(values).as_bytes())
}

/// Parse up to `max_len` values (all values when `None`)
pub fn parse_hex<T: HexWord>(source: &str, max_len: Option<usize>) -> NpuResult<Vec<T>> {
    let limit = max_len.unwrap_or(usize::MAX);
    let mut values = Vec::new();

    for token in HexScanner::new(source) {
        if values.len() >= limit {
            break;
        }
        let word = token
            .map_err(|(line, text)| NpuError::hex(line, format!("unexpected text '{}'", text)))?;
        let bits = u64::from_str_radix(word.text, 16)
            .map_err(|e| NpuError::hex(word.line, format!("'{}': {}", word.text, e)))?;
        if bits >> T::BITS != 0 {
            return Err(NpuError::hex(
                word.line,
                format!("'{}' does not fit in {} bits", word.text, T::BITS),
            ));
        }
        values.push(T::from_bits(bits as u32));
    }

    Ok(values)
}

/// Write `values` to `path`, replacing any existing file
pub fn dump_hex_file<T: HexWord>(path: impl AsRef<Path>, values: &[T]) -> NpuResult<()> {
    let path = path.as_ref();
    let mut file = fs::File::create(path).map_err(|e| NpuError::io(path, e))?;
    write_hex(&mut file, values).map_err(|e| NpuError::io(path, e))?;
    log::info!("Dumped {} elements to {}", values.len(), path.display());
    Ok(())
}

/// Read up to `len` values from `path`. The result may be shorter when the
/// file holds fewer values; callers compare lengths themselves.
pub fn load_hex_file<T: HexWord>(path: impl AsRef<Path>, len: usize) -> NpuResult<Vec<T>> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|e| NpuError::io(path, e))?;
    parse_hex(&source, Some(len))
}

/// Load a whole file without a length cap
pub fn load_all_hex<T: HexWord>(path: impl AsRef<Path>) -> NpuResult<Vec<T>> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|e| NpuError::io(path, e))?;
    parse_hex(&source, None)
}
