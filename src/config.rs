//! Exporter configuration.
//!
//! Global settings come from the YAML file (and CLI flags applied on top by
//! `main`). A list of device entries overrides them per host. Everything is
//! validated and compiled in [`Config::from_yaml`]; afterwards
//! [`Config::resolve`] is infallible.

use crate::dynamic_labels;
use crate::secret::SecretString;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Feature toggles as written in the file. Unset toggles inherit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeatureOverrides {
    pub interfaces: Option<bool>,
    pub inventory: Option<bool>,
    pub nat64: Option<bool>,
    pub neighbors: Option<bool>,
}

/// Resolved set of enabled collectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub interfaces: bool,
    pub inventory: bool,
    pub nat64: bool,
    pub neighbors: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            interfaces: true,
            inventory: false,
            nat64: false,
            neighbors: false,
        }
    }
}

impl Features {
    /// Apply `overrides` field by field
    pub fn with(self, overrides: &FeatureOverrides) -> Self {
        Self {
            interfaces: overrides.interfaces.unwrap_or(self.interfaces),
            inventory: overrides.inventory.unwrap_or(self.inventory),
            nat64: overrides.nat64.unwrap_or(self.nat64),
            neighbors: overrides.neighbors.unwrap_or(self.neighbors),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct FileConfig {
    debug: bool,
    legacy_ciphers: bool,
    timeout: u64,
    batch_size: usize,
    username: Option<String>,
    #[serde(alias = "Password")]
    password: Option<SecretString>,
    key_file: Option<PathBuf>,
    dynamic_labels: bool,
    description_regex: Option<String>,
    features: FeatureOverrides,
    devices: Vec<DeviceFile>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            debug: false,
            legacy_ciphers: false,
            timeout: DEFAULT_TIMEOUT_SECS,
            batch_size: DEFAULT_BATCH_SIZE,
            username: None,
            password: None,
            key_file: None,
            dynamic_labels: true,
            description_regex: None,
            features: FeatureOverrides::default(),
            devices: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeviceFile {
    host: String,
    #[serde(default)]
    host_pattern: bool,
    username: Option<String>,
    #[serde(alias = "Password")]
    password: Option<SecretString>,
    key_file: Option<PathBuf>,
    legacy_ciphers: Option<bool>,
    timeout: Option<u64>,
    batch_size: Option<usize>,
    features: Option<FeatureOverrides>,
    description_regex: Option<String>,
}

#[derive(Debug, Clone)]
enum HostMatcher {
    Exact(String),
    Pattern(Regex),
}

impl HostMatcher {
    fn matches(&self, host: &str) -> bool {
        match self {
            HostMatcher::Exact(h) => h == host,
            HostMatcher::Pattern(re) => re.is_match(host),
        }
    }
}

/// Per-device override entry, compiled
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    matcher: HostMatcher,
    username: Option<String>,
    password: Option<SecretString>,
    key_file: Option<PathBuf>,
    legacy_ciphers: Option<bool>,
    timeout: Option<Duration>,
    batch_size: Option<usize>,
    features: FeatureOverrides,
    description_regex: Option<Regex>,
}

impl DeviceEntry {
    fn compile(raw: DeviceFile) -> ConfigResult<Self> {
        if raw.host.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "device entry without host".to_string(),
            ));
        }

        let matcher = if raw.host_pattern {
            HostMatcher::Pattern(compile_pattern("host pattern", &raw.host)?)
        } else {
            HostMatcher::Exact(raw.host)
        };

        Ok(Self {
            matcher,
            username: raw.username,
            password: raw.password,
            key_file: raw.key_file,
            legacy_ciphers: raw.legacy_ciphers,
            timeout: raw.timeout.map(Duration::from_secs),
            batch_size: raw.batch_size,
            features: raw.features.unwrap_or_default(),
            description_regex: raw
                .description_regex
                .as_deref()
                .map(compile_description_regex)
                .transpose()?,
        })
    }

    /// Host for exact entries, `None` for pattern entries
    pub fn host(&self) -> Option<&str> {
        match &self.matcher {
            HostMatcher::Exact(h) => Some(h),
            HostMatcher::Pattern(_) => None,
        }
    }
}

fn compile_pattern(what: &str, pattern: &str) -> ConfigResult<Regex> {
    Regex::new(pattern)
        .map_err(|e| ConfigError::InvalidConfig(format!("invalid {} {:?}: {}", what, pattern, e)))
}

/// Named groups become interface labels, so they must be usable as such
fn compile_description_regex(pattern: &str) -> ConfigResult<Regex> {
    let re = compile_pattern("description regex", pattern)?;
    dynamic_labels::check_keys(&re).map_err(|reason| {
        ConfigError::InvalidConfig(format!("invalid description regex {:?}: {}", pattern, reason))
    })?;
    Ok(re)
}

/// Global settings plus device overrides
#[derive(Debug, Clone)]
pub struct Config {
    pub debug: bool,
    pub legacy_ciphers: bool,
    pub timeout: Duration,
    pub batch_size: usize,
    pub username: String,
    pub password: Option<SecretString>,
    pub key_file: Option<PathBuf>,
    pub dynamic_labels: bool,
    pub description_regex: Option<Regex>,
    pub features: Features,
    devices: Vec<DeviceEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            legacy_ciphers: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            batch_size: DEFAULT_BATCH_SIZE,
            username: String::new(),
            password: None,
            key_file: None,
            dynamic_labels: true,
            description_regex: None,
            features: Features::default(),
            devices: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> ConfigResult<Self> {
        // An empty document deserializes to unit, not to the defaults
        let raw: FileConfig = if text.trim().is_empty() {
            FileConfig::default()
        } else {
            serde_yaml::from_str(text)?
        };

        let devices = raw
            .devices
            .into_iter()
            .map(DeviceEntry::compile)
            .collect::<ConfigResult<Vec<_>>>()?;

        Ok(Self {
            debug: raw.debug,
            legacy_ciphers: raw.legacy_ciphers,
            timeout: Duration::from_secs(raw.timeout),
            batch_size: raw.batch_size,
            username: raw.username.unwrap_or_default(),
            password: raw.password,
            key_file: raw.key_file,
            dynamic_labels: raw.dynamic_labels,
            description_regex: raw
                .description_regex
                .as_deref()
                .map(compile_description_regex)
                .transpose()?,
            features: Features::default().with(&raw.features),
            devices,
        })
    }

    /// Set the global description regex from a flag value
    pub fn set_description_regex(&mut self, pattern: &str) -> ConfigResult<()> {
        self.description_regex = Some(compile_description_regex(pattern)?);
        Ok(())
    }

    /// Hosts of all exact (non-pattern) device entries, in declaration order
    pub fn hosts(&self) -> Vec<String> {
        self.devices
            .iter()
            .filter_map(DeviceEntry::host)
            .map(str::to_string)
            .collect()
    }

    /// First device entry matching `host`, in declaration order
    fn find_device(&self, host: &str) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.matcher.matches(host))
    }

    /// Effective settings for `host`. Unknown hosts get the global settings.
    pub fn resolve(&self, host: &str) -> EffectiveConfig {
        let mut effective = EffectiveConfig {
            debug: self.debug,
            legacy_ciphers: self.legacy_ciphers,
            timeout: self.timeout,
            batch_size: self.batch_size,
            username: self.username.clone(),
            password: self.password.clone(),
            key_file: self.key_file.clone(),
            features: self.features,
            description_regex: self.description_regex.clone(),
        };

        if let Some(device) = self.find_device(host) {
            if let Some(username) = &device.username {
                effective.username = username.clone();
            }
            if let Some(password) = &device.password {
                effective.password = Some(password.clone());
            }
            if let Some(key_file) = &device.key_file {
                effective.key_file = Some(key_file.clone());
            }
            if let Some(legacy_ciphers) = device.legacy_ciphers {
                effective.legacy_ciphers = legacy_ciphers;
            }
            if let Some(timeout) = device.timeout {
                effective.timeout = timeout;
            }
            if let Some(batch_size) = device.batch_size {
                effective.batch_size = batch_size;
            }
            if let Some(re) = &device.description_regex {
                effective.description_regex = Some(re.clone());
            }
            effective.features = effective.features.with(&device.features);
        }

        if !self.dynamic_labels {
            effective.description_regex = None;
        }

        effective
    }
}

/// Fully resolved settings for one device
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub debug: bool,
    pub legacy_ciphers: bool,
    pub timeout: Duration,
    pub batch_size: usize,
    pub username: String,
    pub password: Option<SecretString>,
    pub key_file: Option<PathBuf>,
    pub features: Features,
    /// Pattern for dynamic interface labels, `None` when disabled
    pub description_regex: Option<Regex>,
}

/// Split a `host[:port]` target. IPv6 literals need brackets to carry a port.
pub fn split_target(target: &str) -> ConfigResult<(String, u16)> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ConfigError::InvalidConfig("empty target".to_string()));
    }

    let invalid_port =
        |port: &str| ConfigError::InvalidConfig(format!("invalid port {:?} in target {:?}", port, target));

    if let Some(rest) = target.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| ConfigError::InvalidConfig(format!("unterminated '[' in target {:?}", target)))?;
        return match tail.strip_prefix(':') {
            Some(port) => Ok((host.to_string(), port.parse().map_err(|_| invalid_port(port))?)),
            None if tail.is_empty() => Ok((host.to_string(), DEFAULT_SSH_PORT)),
            None => Err(invalid_port(tail)),
        };
    }

    match target.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            Ok((host.to_string(), port.parse().map_err(|_| invalid_port(port))?))
        }
        _ => Ok((target.to_string(), DEFAULT_SSH_PORT)),
    }
}

#[cfg(test)]
impl Config {
    pub fn devices(&self) -> &[DeviceEntry] {
        &self.devices
    }
}
