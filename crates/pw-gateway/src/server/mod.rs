//! TCP front end

mod listener;

pub use listener::GatewayServer;
