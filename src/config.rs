use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::BaseDirs;
use llgym_benchmark::BenchmarkFactory;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::service::HostConfig;
use crate::session::SessionOptions;

pub const CONFIG_ENV: &str = "LLGYM_CONFIG";
pub const LISTEN_ENV: &str = "LLGYM_LISTEN";
pub const WORKING_DIR_ENV: &str = "LLGYM_WORKING_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub listen: String,
    /// Parent directory of session working areas. Defaults to the temp dir.
    pub working_dir: Option<PathBuf>,
    pub request_timeout_ms: u64,
    pub session_start_timeout_ms: u64,
    pub max_sessions: usize,
    /// Fallback tracing filter when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
    /// Dataset URI (e.g. `benchmark://cbench-v1`) to a directory of `.bc`/`.ll` files.
    pub datasets: BTreeMap<String, PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let host = HostConfig::default();
        Self {
            listen: "127.0.0.1:5025".to_string(),
            working_dir: None,
            request_timeout_ms: duration_ms(host.request_timeout),
            session_start_timeout_ms: duration_ms(host.start_timeout),
            max_sessions: host.max_sessions,
            log_filter: None,
            datasets: BTreeMap::new(),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl ServiceConfig {
    /// Load the configuration.
    ///
    /// The file is `path` if given, else `$LLGYM_CONFIG`, else
    /// `~/.llgym/config.yaml` when it exists. Environment overrides are
    /// applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = if path.extension().is_some_and(|ext| ext == "toml") {
            Self::from_toml(&raw, path)?
        } else {
            serde_yaml::from_str(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        };
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    #[cfg(feature = "toml-config")]
    fn from_toml(raw: &str, path: &Path) -> Result<Self> {
        toml::from_str(raw).with_context(|| format!("failed to parse config file {}", path.display()))
    }

    #[cfg(not(feature = "toml-config"))]
    fn from_toml(_raw: &str, path: &Path) -> Result<Self> {
        anyhow::bail!(
            "{} is a TOML config but llgym was built without the `toml-config` feature",
            path.display()
        )
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from `lookup`, which maps an environment variable name
    /// to its value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(listen) = lookup(LISTEN_ENV).filter(|value| !value.is_empty()) {
            self.listen = listen;
        }
        if let Some(dir) = lookup(WORKING_DIR_ENV).filter(|value| !value.is_empty()) {
            self.working_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            session: SessionOptions {
                working_root: self.working_dir.clone(),
            },
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            start_timeout: Duration::from_millis(self.session_start_timeout_ms),
            max_sessions: self.max_sessions,
        }
    }

    /// Register every configured dataset with `factory`.
    pub fn register_datasets(&self, factory: &BenchmarkFactory) -> Result<usize> {
        let mut total = 0;
        for (dataset, dir) in &self.datasets {
            let added = factory
                .add_directory(dataset, dir)
                .with_context(|| format!("failed to register dataset `{dataset}` from {}", dir.display()))?;
            total += added;
        }
        if total > 0 {
            info!(datasets = self.datasets.len(), benchmarks = total, "registered datasets");
        }
        Ok(total)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(".llgym").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("llgym.yaml");
        fs::write(&path, "listen: 0.0.0.0:6000\nmax_sessions: 4\n")?;

        let config = ServiceConfig::from_file(&path)?;
        assert_eq!(config.listen, "0.0.0.0:6000");
        assert_eq!(config.max_sessions, 4);
        assert_eq!(config.request_timeout_ms, ServiceConfig::default().request_timeout_ms);

        let host = config.host_config();
        assert_eq!(host.max_sessions, 4);
        assert_eq!(host.request_timeout, Duration::from_secs(300));
        Ok(())
    }

    #[test]
    fn overrides_replace_listen_and_working_dir() {
        let mut config = ServiceConfig::default();
        config.apply_overrides(|key| match key {
            LISTEN_ENV => Some("127.0.0.1:7000".into()),
            WORKING_DIR_ENV => Some("/var/tmp/llgym".into()),
            _ => None,
        });
        assert_eq!(config.listen, "127.0.0.1:7000");
        assert_eq!(config.host_config().session.working_root, Some(PathBuf::from("/var/tmp/llgym")));
    }

    #[test]
    fn registers_dataset_directories() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("add.ll"), "define i32 @add(i32 %a) {\n  ret i32 %a\n}\n")?;

        let mut config = ServiceConfig::default();
        config.datasets.insert("benchmark://unit-v0".into(), dir.path().to_path_buf());

        let factory = BenchmarkFactory::new();
        assert_eq!(config.register_datasets(&factory)?, 1);
        assert!(factory.contains("unit-v0/add"));
        Ok(())
    }

    #[cfg(not(feature = "toml-config"))]
    #[test]
    fn toml_requires_feature() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("llgym.toml");
        fs::write(&path, "listen = \"127.0.0.1:1\"\n")?;
        assert!(ServiceConfig::from_file(&path).is_err());
        Ok(())
    }
}
