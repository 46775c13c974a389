//! Remotely driven LLVM optimization sessions.
//!
//! A session owns one module loaded from a benchmark. Callers apply batches of
//! optimization passes to it and observe cost functions such as instruction
//! count or object code size, compared against `-O0`, `-O3` and `-Oz`
//! baselines computed when the session starts.

pub mod actions;
pub mod cli;
pub mod config;
pub mod cost;
pub mod error;
pub mod service;
pub mod session;
pub mod target;
pub mod version;

pub use actions::{ActionId, LlvmAction};
pub use cost::{BaselineCosts, BaselinePolicy, CostFunction};
pub use error::{ErrorKind, GymError, Result};
pub use service::{HostConfig, Reply, Request, SessionHost};
pub use session::{CompilationSession, CostRepresentation, Observation, SessionId, SessionOptions};
