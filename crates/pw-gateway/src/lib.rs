//! pw-gateway: Routes users to shared remote-access sessions
//!
//! The gateway accepts user connections, reads each one's `select`
//! instruction and either starts a new backend for the requested protocol
//! or attaches the user to the running backend named by a connection id.
//! Backends run as isolated tasks, each hosting one client session that
//! any number of users may share.

pub mod backend;
pub mod plugins;
pub mod registry;
pub mod router;
pub mod server;
pub mod state;

pub use registry::ProcessRegistry;
pub use router::{route_connection, RouteOutcome};
pub use server::GatewayServer;
pub use state::GatewayState;
