//! Shared plumbing for the llgym binaries: logging setup and phase timing.

pub mod logger;
pub mod profiler;

pub use logger::init_logging;
pub use profiler::{PhaseTiming, Profiler};
