//! Protocol error type

use thiserror::Error;

/// Error produced while decoding a wire frame.
///
/// Every variant maps to `-EINVAL` on the wire; the distinction only
/// matters for logging on the server side.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// The frame is shorter than the layout for its command requires.
    #[error("frame too short: need {need} bytes, got {got}")]
    Truncated {
        /// Bytes required by the declared command.
        need: usize,
        /// Bytes actually available.
        got: usize,
    },

    /// The command tag is not part of the protocol.
    #[error("unknown command tag {0}")]
    UnknownCommand(u8),

    /// A field holds a value outside its enumerated range.
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: i64,
    },
}

/// Specialized `Result` for protocol operations.
pub type ProtoResult<T> = Result<T, ProtoError>;
