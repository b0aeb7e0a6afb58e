//! pw-protocol: Text instruction protocol for the Portway gateway
//!
//! This crate defines the instruction type exchanged between users and the
//! gateway, the tokio codec for its textual wire grammar, the numeric
//! status codes carried by `error` and `ack`, and the connection identifier
//! used to join shared sessions.

pub mod codec;
pub mod connection_id;
pub mod error;
pub mod instruction;
pub mod status;

pub use codec::{InstructionCodec, MAX_ELEMENTS, MAX_INSTRUCTION_LENGTH};
pub use connection_id::{ConnectionId, CONNECTION_ID_LENGTH, CONNECTION_ID_PREFIX};
pub use error::ProtocolError;
pub use instruction::Instruction;
pub use status::ProtocolStatus;
