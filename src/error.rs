//! Error types for the tiled NPU model and its verification driver

use std::path::PathBuf;
use thiserror::Error;

/// Result type for model and verification operations
pub type NpuResult<T> = Result<T, NpuError>;

/// Errors raised by the NPU model, the tiling engine and the verifier
#[derive(Debug, Error)]
pub enum NpuError {
    #[error("Mismatch in {case} at [{index}]: tiled={tiled}, direct={direct}")]
    Mismatch {
        case: String,
        index: usize,
        tiled: i32,
        direct: i32,
    },

    #[error("Length mismatch in {case}: tiled has {tiled} elements, direct has {direct}")]
    LengthMismatch {
        case: String,
        tiled: usize,
        direct: usize,
    },

    #[error("Operation buffer full ({capacity} entries), operation dropped")]
    CapacityOverflow { capacity: usize },

    #[error("Cannot open file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hex parse error on line {line}: {message}")]
    HexParse { line: usize, message: String },

    #[error("Shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    #[error("Invalid dimension: {message}")]
    InvalidDimension { message: String },

    #[error("Tile controller is busy")]
    ControllerBusy,

    #[error("valid_out arrived after {observed} wait cycles, expected exactly {expected}")]
    LatencyViolation { expected: u32, observed: u32 },

    #[error("Buffer read data not valid in COMPUTE")]
    BufferNotReady,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Register error: {message}")]
    Register { message: String },
}

impl NpuError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        NpuError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn hex(line: usize, msg: impl Into<String>) -> Self {
        NpuError::HexParse {
            line,
            message: msg.into(),
        }
    }

    pub fn shape(expected: impl Into<String>, got: impl Into<String>) -> Self {
        NpuError::ShapeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn dimension(msg: impl Into<String>) -> Self {
        NpuError::InvalidDimension {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        NpuError::Config {
            message: msg.into(),
        }
    }

    pub fn register(msg: impl Into<String>) -> Self {
        NpuError::Register {
            message: msg.into(),
        }
    }

    /// Numeric mismatches abort the whole verification run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NpuError::Mismatch { .. } | NpuError::LengthMismatch { .. }
        )
    }
}
