//! YAML configuration: clusters, schema registries, API timeout, cache TTL.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
    #[serde(default, rename = "schema-registries")]
    pub schema_registries: Vec<SchemaRegistryConfig>,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterConfig {
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub selected: bool,
}

impl ClusterConfig {
    pub fn bootstrap_servers(&self) -> &str {
        self.properties.get("bootstrap.servers").map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaRegistryConfig {
    pub name: String,
    #[serde(rename = "schema.registry.url")]
    pub url: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub selected: bool,
}

/// Timeout in seconds; zero or negative falls back to the default.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiConfig {
    #[serde(default)]
    pub timeout: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    #[serde(default)]
    pub ttl: i64,
}

impl Config {
    /// `CINDER_CONFIG`, else `$HOME/.config/cinder/config.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(p) = std::env::var("CINDER_CONFIG") {
            return Some(PathBuf::from(p));
        }
        std::env::var("HOME")
            .ok()
            .map(|home| Path::new(&home).join(".config").join("cinder").join("config.yaml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let cfg = Self::parse(&raw).with_context(|| format!("parsing config file {}", path.display()))?;
        debug!(path = %path.display(), clusters = cfg.clusters.len(), "config loaded");
        Ok(cfg)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let expanded = expand_env(raw);
        let cfg: Config = serde_yaml::from_str(&expanded).context("invalid yaml")?;
        Ok(cfg)
    }

    pub fn api_timeout(&self) -> Duration {
        if let Some(secs) = env_secs("CINDER_API_TIMEOUT_SECS") {
            return secs;
        }
        if self.api.timeout <= 0 {
            DEFAULT_API_TIMEOUT
        } else {
            Duration::from_secs(self.api.timeout as u64)
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        if let Some(secs) = env_secs("CINDER_CACHE_TTL_SECS") {
            return secs;
        }
        if self.cache.ttl <= 0 {
            DEFAULT_CACHE_TTL
        } else {
            Duration::from_secs(self.cache.ttl as u64)
        }
    }

    pub fn selected_cluster(&self) -> Option<&ClusterConfig> {
        self.clusters.iter().find(|c| c.selected).or_else(|| self.clusters.first())
    }

    pub fn selected_registry(&self) -> Option<&SchemaRegistryConfig> {
        self.schema_registries.iter().find(|r| r.selected)
    }

    pub fn cluster(&self, name: &str) -> Option<&ClusterConfig> {
        self.clusters.iter().find(|c| c.name == name)
    }
}

fn env_secs(var: &str) -> Option<Duration> {
    let raw = std::env::var(var).ok()?;
    match raw.parse::<u64>() {
        Ok(0) | Err(_) => {
            warn!(var, value = %raw, "ignoring invalid duration override");
            None
        }
        Ok(n) => Some(Duration::from_secs(n)),
    }
}

/// Replace `$VAR` and `${VAR}` with environment values; unknown variables
/// expand to the empty string.
pub fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let mut name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for n in chars.by_ref() {
                if n == '}' {
                    break;
                }
                name.push(n);
            }
        } else {
            while let Some(&n) = chars.peek() {
                if n.is_ascii_alphanumeric() || n == '_' {
                    name.push(n);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                out.push('$');
                continue;
            }
        }
        out.push_str(&std::env::var(&name).unwrap_or_default());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
clusters:
  - name: local
    properties:
      bootstrap.servers: localhost:9092
  - name: prod
    selected: true
    properties:
      bootstrap.servers: ${CINDER_TEST_BOOTSTRAP}
schema-registries:
  - name: sr
    schema.registry.url: http://localhost:8081
api:
  timeout: 3
"#;

    #[test]
    fn parses_clusters_and_expands_env() {
        std::env::set_var("CINDER_TEST_BOOTSTRAP", "kafka-1:9093");
        let cfg = Config::parse(SAMPLE).expect("parse");
        assert_eq!(cfg.clusters.len(), 2);
        let sel = cfg.selected_cluster().expect("selected");
        assert_eq!(sel.name, "prod");
        assert_eq!(sel.bootstrap_servers(), "kafka-1:9093");
        assert_eq!(cfg.schema_registries[0].url, "http://localhost:8081");
        assert!(cfg.selected_registry().is_none());
    }

    #[test]
    fn non_positive_timeout_falls_back_to_default() {
        let cfg = Config { api: ApiConfig { timeout: -4 }, ..Default::default() };
        assert_eq!(cfg.api_timeout(), DEFAULT_API_TIMEOUT);
        let cfg = Config::default();
        assert_eq!(cfg.cache_ttl(), DEFAULT_CACHE_TTL);
    }

    #[test]
    fn expand_env_leaves_lone_dollar() {
        assert_eq!(expand_env("cost: 5$"), "cost: 5$");
        assert_eq!(expand_env("${CINDER_SURELY_UNSET_VAR}x"), "x");
    }
}
