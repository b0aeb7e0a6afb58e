//! Protocol error types

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Element length prefix is not a decimal number
    #[error("Invalid element length: {0:?}")]
    InvalidLength(String),

    /// Element was followed by something other than ',' or ';'
    #[error("Invalid element terminator: {0:?}")]
    InvalidTerminator(char),

    /// Element value is not valid UTF-8
    #[error("Instruction is not valid UTF-8")]
    InvalidUtf8,

    /// Instruction exceeds the maximum encoded length
    #[error("Instruction too long: {size} bytes exceeds maximum of {max} bytes")]
    TooLong { size: usize, max: usize },

    /// Instruction has more elements than allowed
    #[error("Too many elements in instruction (maximum {max})")]
    TooManyElements { max: usize },

    /// Instruction has no opcode
    #[error("Instruction has an empty opcode")]
    Empty,

    /// Connection identifier is malformed
    #[error("Invalid connection identifier: {0:?}")]
    InvalidConnectionId(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
