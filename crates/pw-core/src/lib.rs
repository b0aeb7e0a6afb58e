//! pw-core: Session and resource management for the Portway gateway
//!
//! This crate holds everything a backend needs to host one shared session:
//! the client session with its user list and broadcast socket, the
//! recycling index pools behind layer, buffer and stream handles, the
//! socket abstraction, and the shared error and configuration types used by
//! the gateway daemon.

pub mod client;
pub mod config;
pub mod error;
pub mod pidfile;
pub mod pool;
pub mod socket;
pub mod time;

pub use client::{
    BroadcastSocket, ClientHandler, ClientSession, ClientState, Layer, LogLevel, StreamHandler, User,
    UserId,
};
pub use error::GatewayError;
pub use pool::IndexPool;
pub use socket::{Socket, Transport, TransportSocket};
