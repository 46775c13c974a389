use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use inkwell::context::Context;
use inkwell::memory_buffer::MemoryBuffer;
use inkwell::module::Module;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::error::BenchmarkError;
use crate::uri::BenchmarkUri;

const BITCODE_MAGIC: [u8; 4] = [b'B', b'C', 0xC0, 0xDE];
const BITCODE_WRAPPER_MAGIC: [u8; 4] = [0xDE, 0xC0, 0x17, 0x0B];

/// Where the program of a benchmark comes from.
#[derive(Debug, Clone)]
pub enum ProgramSource {
    Bitcode(Arc<[u8]>),
    Ir(Arc<str>),
    File(PathBuf),
}

/// A named program that can be loaded into an LLVM context.
///
/// Benchmarks are cheap to clone and hold no LLVM state, so they can be handed
/// to whichever thread owns the context the module should live in.
#[derive(Debug, Clone)]
pub struct Benchmark {
    uri: BenchmarkUri,
    program: ProgramSource,
}

impl Benchmark {
    pub fn new(uri: BenchmarkUri, program: ProgramSource) -> Self {
        Self { uri, program }
    }

    /// Reference a bitcode or IR file on disk. The file is read on [`load`](Self::load).
    pub fn from_file(uri: BenchmarkUri, path: impl AsRef<Path>) -> Result<Self, BenchmarkError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(BenchmarkError::FileNotFound(path.to_path_buf()));
        }
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Ok(Self::new(uri, ProgramSource::File(path)))
    }

    /// Wrap raw file contents, detecting bitcode by its magic number.
    pub fn from_file_contents(uri: BenchmarkUri, data: &[u8]) -> Self {
        if is_bitcode(data) {
            Self::from_bitcode(uri, data)
        } else {
            Self::from_ir(uri, &String::from_utf8_lossy(data))
        }
    }

    pub fn from_bitcode(uri: BenchmarkUri, bitcode: &[u8]) -> Self {
        Self::new(uri, ProgramSource::Bitcode(Arc::from(bitcode)))
    }

    pub fn from_ir(uri: BenchmarkUri, ir: &str) -> Self {
        Self::new(uri, ProgramSource::Ir(Arc::from(ir)))
    }

    /// A benchmark named after the SHA-1 of its contents: `benchmark://file-v0/<sha1>`.
    pub fn anonymous(data: &[u8]) -> Self {
        let digest = format!("{:x}", Sha1::digest(data));
        let uri = BenchmarkUri::new("benchmark", "file", 0, Some(digest));
        Self::from_file_contents(uri, data)
    }

    pub fn uri(&self) -> &BenchmarkUri {
        &self.uri
    }

    pub fn program(&self) -> &ProgramSource {
        &self.program
    }

    /// Parse the program into `context` and run the LLVM verifier over it.
    pub fn load<'ctx>(&self, context: &'ctx Context) -> Result<Module<'ctx>, BenchmarkError> {
        let name = self.uri.to_string();
        let module = match &self.program {
            ProgramSource::Bitcode(bitcode) => parse_bitcode(context, bitcode, &name)?,
            ProgramSource::Ir(ir) => parse_ir(context, ir.as_bytes(), &name)?,
            ProgramSource::File(path) => {
                let data = fs::read(path).map_err(|err| BenchmarkError::Read {
                    path: path.clone(),
                    reason: err.to_string(),
                })?;
                if is_bitcode(&data) {
                    parse_bitcode(context, &data, &name)?
                } else {
                    parse_ir(context, &data, &name)?
                }
            }
        };

        module
            .verify()
            .map_err(|err| BenchmarkError::Verification {
                uri: name.clone(),
                reason: err.to_string(),
            })?;

        debug!(benchmark = %name, "loaded benchmark module");
        Ok(module)
    }
}

fn is_bitcode(data: &[u8]) -> bool {
    data.starts_with(&BITCODE_MAGIC) || data.starts_with(&BITCODE_WRAPPER_MAGIC)
}

fn parse_bitcode<'ctx>(
    context: &'ctx Context,
    bitcode: &[u8],
    name: &str,
) -> Result<Module<'ctx>, BenchmarkError> {
    let buffer = MemoryBuffer::create_from_memory_range_copy(bitcode, name);
    Module::parse_bitcode_from_buffer(&buffer, context).map_err(|err| BenchmarkError::Parse {
        uri: name.to_string(),
        reason: err.to_string(),
    })
}

fn parse_ir<'ctx>(
    context: &'ctx Context,
    ir: &[u8],
    name: &str,
) -> Result<Module<'ctx>, BenchmarkError> {
    let buffer = MemoryBuffer::create_from_memory_range_copy(ir, name);
    context
        .create_module_from_ir(buffer)
        .map_err(|err| BenchmarkError::Parse {
            uri: name.to_string(),
            reason: err.to_string(),
        })
}
