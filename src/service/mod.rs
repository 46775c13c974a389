//! Hosting sessions: the registry, the per-session threads, the protocol and
//! its TCP transport.

mod host;
mod protocol;
mod server;
mod worker;

pub use host::{HostConfig, SessionHost};
pub use protocol::{BaselineEntry, Reply, Request, SessionInfo};
pub use server::{serve, serve_until};
