//! Error types for the nextion-bridge library.

use thiserror::Error;

/// The main error type for bridge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// The configured serial port could not be opened.
    #[error("serial port {port} unavailable: {source}")]
    PortUnavailable {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    /// No serial ports are present on this host.
    #[error("no serial ports found")]
    NoPorts,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Query timed out waiting for the panel's reply.
    #[error("query timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A handler is already registered for this opcode.
    #[error("handler already registered for opcode 0x{opcode:02x}")]
    DuplicateHandler { opcode: u8 },

    /// Channel closed (transport or controller shut down).
    #[error("channel closed")]
    ChannelClosed,
}

/// Frame-specific errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Payload shorter than its opcode requires.
    #[error("frame 0x{opcode:02x} truncated: expected {expected} payload bytes, got {got}")]
    Truncated {
        opcode: u8,
        expected: usize,
        got: usize,
    },

    /// No terminator seen within the maximum frame size.
    #[error("no terminator within {max} bytes, discarded {discarded} bytes")]
    Overflow { discarded: usize, max: usize },
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;
