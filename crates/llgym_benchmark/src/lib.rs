//! Benchmark collaborator for llgym sessions.
//!
//! A benchmark is a named LLVM program: a URI plus either bitcode, textual IR
//! or a path to one of those. This crate owns every step that turns raw
//! program bytes into a verified `inkwell` module so that the session core
//! never parses program text itself.

pub mod benchmark;
pub mod error;
pub mod factory;
pub mod uri;

pub use benchmark::{Benchmark, ProgramSource};
pub use error::BenchmarkError;
pub use factory::BenchmarkFactory;
pub use uri::{BenchmarkUri, resolve_uri_protocol};
