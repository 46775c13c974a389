use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BenchmarkError;

pub const DEFAULT_PROTOCOL: &str = "benchmark";

/// Prefix `uri` with the default `benchmark://` protocol if it has none.
pub fn resolve_uri_protocol(uri: &str) -> String {
    if uri.contains("://") {
        uri.to_string()
    } else {
        format!("{DEFAULT_PROTOCOL}://{uri}")
    }
}

/// A parsed `{protocol}://{dataset}-v{version}[/{name}]` benchmark URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BenchmarkUri {
    protocol: String,
    dataset_name: String,
    version: u32,
    name: Option<String>,
}

impl BenchmarkUri {
    pub fn new(
        protocol: impl Into<String>,
        dataset_name: impl Into<String>,
        version: u32,
        name: Option<String>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            dataset_name: dataset_name.into(),
            version,
            name,
        }
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The two-part dataset prefix, e.g. `benchmark://cBench-v0`.
    pub fn dataset(&self) -> String {
        format!("{}://{}-v{}", self.protocol, self.dataset_name, self.version)
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self.clone()
        }
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

impl FromStr for BenchmarkUri {
    type Err = BenchmarkError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| BenchmarkError::InvalidUri {
            uri: raw.to_string(),
            reason,
        };

        let resolved = resolve_uri_protocol(raw.trim());
        let (protocol, rest) = resolved
            .split_once("://")
            .ok_or_else(|| invalid("missing protocol separator"))?;
        if protocol.is_empty() || !protocol.chars().all(is_identifier_char) {
            return Err(invalid("protocol must be a non-empty identifier"));
        }

        let (dataset, name) = match rest.split_once('/') {
            Some((dataset, name)) => (dataset, Some(name)),
            None => (rest, None),
        };

        let (dataset_name, version) = dataset
            .rsplit_once("-v")
            .ok_or_else(|| invalid("dataset is missing a `-v<N>` version suffix"))?;
        if dataset_name.is_empty() || !dataset_name.chars().all(is_identifier_char) {
            return Err(invalid("dataset name must be a non-empty identifier"));
        }
        if version.is_empty() || !version.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("dataset version must be numeric"));
        }
        let version = version
            .parse::<u32>()
            .map_err(|_| invalid("dataset version out of range"))?;

        let name = name.filter(|name| !name.is_empty());
        if name.is_some_and(|name| name.chars().any(char::is_whitespace)) {
            return Err(invalid("benchmark name must not contain whitespace"));
        }

        Ok(Self {
            protocol: protocol.to_string(),
            dataset_name: dataset_name.to_string(),
            version,
            name: name.map(str::to_string),
        })
    }
}

impl fmt::Display for BenchmarkUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dataset())?;
        if let Some(name) = &self.name {
            write!(f, "/{name}")?;
        }
        Ok(())
    }
}

impl Serialize for BenchmarkUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BenchmarkUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_uri() {
        let uri: BenchmarkUri = "benchmark://cBench-v0/crc32".parse().unwrap();
        assert_eq!(uri.protocol(), "benchmark");
        assert_eq!(uri.dataset_name(), "cBench");
        assert_eq!(uri.version(), 0);
        assert_eq!(uri.name(), Some("crc32"));
        assert_eq!(uri.dataset(), "benchmark://cBench-v0");
        assert_eq!(uri.to_string(), "benchmark://cBench-v0/crc32");
    }

    #[test]
    fn applies_default_protocol() {
        assert_eq!(resolve_uri_protocol("cBench-v1/qsort"), "benchmark://cBench-v1/qsort");
        assert_eq!(resolve_uri_protocol("generator://csmith-v0"), "generator://csmith-v0");

        let uri: BenchmarkUri = "npb-v0/20".parse().unwrap();
        assert_eq!(uri.to_string(), "benchmark://npb-v0/20");
    }

    #[test]
    fn dataset_only_uris_allow_a_trailing_slash() {
        let bare: BenchmarkUri = "benchmark://llvm-stress-v0".parse().unwrap();
        let slashed: BenchmarkUri = "benchmark://llvm-stress-v0/".parse().unwrap();
        assert_eq!(bare, slashed);
        assert_eq!(bare.dataset_name(), "llvm-stress");
        assert_eq!(bare.name(), None);
    }

    #[test]
    fn nested_benchmark_names_are_kept_whole() {
        let uri: BenchmarkUri = "benchmark://github-v0/a/b/c.bc".parse().unwrap();
        assert_eq!(uri.name(), Some("a/b/c.bc"));
    }

    #[test]
    fn rejects_malformed_uris() {
        for raw in [
            "benchmark://cBench/crc32",
            "benchmark://-v0/crc32",
            "benchmark://cBench-vX/crc32",
            "bench mark://cBench-v0",
            "benchmark://cBench-v0/has space",
        ] {
            assert!(
                matches!(raw.parse::<BenchmarkUri>(), Err(BenchmarkError::InvalidUri { .. })),
                "{raw} should be rejected"
            );
        }
    }
}
