//! Error types for interval coding and sequential decoding.

use std::fmt;

use thiserror::Error;

/// Session state of an [`ArithmeticCodec`](crate::ArithmeticCodec).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// No session has been started on the current buffer.
    Idle,
    /// An encoder session is active.
    Encoding,
    /// A decoder session is active.
    Decoding,
    /// The last session was stopped.
    Stopped,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Idle => "idle",
            Mode::Encoding => "encoding",
            Mode::Decoding => "decoding",
            Mode::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Error variants for coding operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid alphabet size, probability or distribution.
    #[error("invalid model configuration: {0}")]
    ModelConfig(String),

    /// An operation was invoked in the wrong codec state.
    #[error("`{op}` is not allowed while the codec is {mode}")]
    Mode {
        /// The rejected operation.
        op: &'static str,
        /// State the codec was in.
        mode: Mode,
    },

    /// Encoder output exceeded the buffer capacity.
    #[error("code buffer overflow: capacity of {capacity} bytes exceeded")]
    BufferOverflow {
        /// Buffer capacity in bytes.
        capacity: usize,
    },

    /// The received value lies outside every symbol interval.
    #[error("decoder desynchronized near byte {position}")]
    DecodeDesync {
        /// Read position in the code buffer.
        position: usize,
    },

    /// The received value lies inside the overlap of two bit intervals.
    #[error("value near byte {position} falls inside an overlapped interval")]
    AmbiguousDecode {
        /// Read position in the code buffer.
        position: usize,
    },

    /// The sequential decoder ran out of arena nodes while expanding a block.
    #[error("node budget of {capacity} exhausted in block starting at bit {offset}")]
    NodeBudgetExceeded {
        /// Arena capacity.
        capacity: usize,
        /// Received-block offset of the failed block.
        offset: usize,
    },

    /// Every candidate path was eliminated.
    #[error("no candidate survived at bit {offset}")]
    NoSurvivor {
        /// Received-block offset where the frontier emptied.
        offset: usize,
    },

    /// Raw bit field with a width outside `1..=20` or a value that does not fit.
    #[error("invalid raw bit field: {bits} bits for value {data}")]
    BitField {
        /// Value to be written.
        data: u32,
        /// Field width.
        bits: u32,
    },

    /// An I/O error occurred while reading or writing a code buffer.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for coding operations.
pub type Result<T> = std::result::Result<T, Error>;
