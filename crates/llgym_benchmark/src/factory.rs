use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::benchmark::Benchmark;
use crate::error::BenchmarkError;
use crate::uri::BenchmarkUri;

const BENCHMARK_EXTENSIONS: [&str; 2] = ["bc", "ll"];

/// Thread-safe registry of benchmarks, keyed by their canonical URI.
#[derive(Debug, Default)]
pub struct BenchmarkFactory {
    benchmarks: RwLock<BTreeMap<String, Benchmark>>,
}

impl BenchmarkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `benchmark`, replacing any previous benchmark with the same URI.
    pub fn add_benchmark(&self, benchmark: Benchmark) {
        let key = benchmark.uri().to_string();
        debug!(benchmark = %key, "registered benchmark");
        self.benchmarks.write().insert(key, benchmark);
    }

    pub fn add_bitcode_file(&self, uri: &str, path: impl AsRef<Path>) -> Result<(), BenchmarkError> {
        let uri: BenchmarkUri = uri.parse()?;
        self.add_benchmark(Benchmark::from_file(uri, path)?);
        Ok(())
    }

    /// Register every `*.bc` and `*.ll` file directly inside `dir` as
    /// `{dataset}/{file stem}`. Returns how many benchmarks were added.
    pub fn add_directory(&self, dataset: &str, dir: impl AsRef<Path>) -> Result<usize, BenchmarkError> {
        let dataset: BenchmarkUri = dataset.parse()?;
        let dir = dir.as_ref();
        let mut added = 0;

        for extension in BENCHMARK_EXTENSIONS {
            let pattern = dir.join(format!("*.{extension}"));
            let pattern = pattern.to_string_lossy();
            let entries = glob::glob(&pattern).map_err(|err| BenchmarkError::Pattern {
                pattern: pattern.to_string(),
                reason: err.to_string(),
            })?;

            for path in entries.flatten() {
                let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                    continue;
                };
                let benchmark = Benchmark::from_file(dataset.with_name(stem), &path)?;
                self.add_benchmark(benchmark);
                added += 1;
            }
        }

        info!(dataset = %dataset.dataset(), directory = %dir.display(), added, "registered dataset");
        Ok(added)
    }

    /// Look up a benchmark. The URI is normalised first, so `cBench-v0/crc32`
    /// and `benchmark://cBench-v0/crc32` name the same benchmark.
    pub fn get(&self, uri: &str) -> Result<Benchmark, BenchmarkError> {
        let key = uri.parse::<BenchmarkUri>()?.to_string();
        self.benchmarks
            .read()
            .get(&key)
            .cloned()
            .ok_or(BenchmarkError::NotFound(key))
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.get(uri).is_ok()
    }

    pub fn uris(&self) -> Vec<String> {
        self.benchmarks.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.benchmarks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.benchmarks.read().is_empty()
    }
}
