//! Model options and environment configuration.
//!
//! [`ModelOptions::default()`] holds the built-in defaults. [`Config::from_env`]
//! overlays `DOCMAP_*` environment variables on top of them.

use std::env;
use std::time::Duration;

use docmap_engine::Throughput;

/// Default attribute holding the expiry instant.
pub const DEFAULT_TTL_ATTRIBUTE: &str = "ttl";

/// Wait-for-active polling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitForActive {
    pub enabled: bool,
    /// Give up after this long
    pub timeout: Duration,
    /// Delay between polls
    pub frequency: Duration,
}

impl Default for WaitForActive {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_millis(180_000),
            frequency: Duration::from_millis(1_000),
        }
    }
}

/// Which parts of an existing table are brought in line with the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateTargets {
    pub ttl: bool,
    pub indexes: bool,
    pub throughput: bool,
}

impl UpdateTargets {
    pub fn all() -> Self {
        Self {
            ttl: true,
            indexes: true,
            throughput: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn any(&self) -> bool {
        self.ttl || self.indexes || self.throughput
    }

    /// Whether the update-table step has work to do.
    pub fn table(&self) -> bool {
        self.indexes || self.throughput
    }
}

/// Item expiry settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlOptions {
    /// Date attribute stored in seconds
    pub attribute: String,
    /// Lifetime added to the write time
    pub ttl: Duration,
    /// Return expired items flagged instead of dropping them
    pub return_expired: bool,
}

impl TtlOptions {
    /// Shorthand: a lifetime on the default `ttl` attribute.
    pub fn from_millis(ttl: u64) -> Self {
        Self {
            attribute: DEFAULT_TTL_ATTRIBUTE.to_string(),
            ttl: Duration::from_millis(ttl),
            return_expired: false,
        }
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = attribute.into();
        self
    }

    pub fn returning_expired(mut self) -> Self {
        self.return_expired = true;
        self
    }
}

/// Table-level options of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelOptions {
    /// Prepended to the model name to form the table name
    pub prefix: String,
    /// Appended to the model name to form the table name
    pub suffix: String,
    /// Create the table when it does not exist
    pub create: bool,
    pub update: UpdateTargets,
    pub wait_for_active: WaitForActive,
    pub throughput: Throughput,
    pub ttl: Option<TtlOptions>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            suffix: String::new(),
            create: true,
            update: UpdateTargets::none(),
            wait_for_active: WaitForActive::default(),
            throughput: Throughput::default(),
            ttl: None,
        }
    }
}

impl ModelOptions {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn with_update(mut self, update: UpdateTargets) -> Self {
        self.update = update;
        self
    }

    pub fn with_wait_for_active(mut self, wait_for_active: WaitForActive) -> Self {
        self.wait_for_active = wait_for_active;
        self
    }

    pub fn with_throughput(mut self, throughput: Throughput) -> Self {
        self.throughput = throughput;
        self
    }

    pub fn with_ttl(mut self, ttl: TtlOptions) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Full table name for a model name.
    pub fn table_name(&self, name: &str) -> String {
        format!("{}{}{}", self.prefix, name, self.suffix)
    }
}

/// Model defaults loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub table_prefix: String,
    pub table_suffix: String,
    pub create: bool,
    pub update: UpdateTargets,
    pub wait_for_active: WaitForActive,
}

impl Config {
    /// Load configuration from the environment, reading `.env` first.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ModelOptions::default();

        let table_prefix = lookup("DOCMAP_TABLE_PREFIX").unwrap_or(defaults.prefix);
        let table_suffix = lookup("DOCMAP_TABLE_SUFFIX").unwrap_or(defaults.suffix);

        let create = match lookup("DOCMAP_CREATE") {
            Some(value) => parse_bool("DOCMAP_CREATE", &value)?,
            None => defaults.create,
        };

        let update = match lookup("DOCMAP_UPDATE") {
            Some(value) => parse_update(&value)?,
            None => defaults.update,
        };

        let mut wait_for_active = defaults.wait_for_active;
        if let Some(value) = lookup("DOCMAP_WAIT_FOR_ACTIVE") {
            wait_for_active.enabled = parse_bool("DOCMAP_WAIT_FOR_ACTIVE", &value)?;
        }
        if let Some(value) = lookup("DOCMAP_WAIT_TIMEOUT_MS") {
            wait_for_active.timeout = parse_millis("DOCMAP_WAIT_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("DOCMAP_WAIT_FREQUENCY_MS") {
            wait_for_active.frequency = parse_millis("DOCMAP_WAIT_FREQUENCY_MS", &value)?;
        }

        Ok(Self {
            table_prefix,
            table_suffix,
            create,
            update,
            wait_for_active,
        })
    }

    /// Model options with these settings and built-in defaults elsewhere.
    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            prefix: self.table_prefix.clone(),
            suffix: self.table_suffix.clone(),
            create: self.create,
            update: self.update,
            wait_for_active: self.wait_for_active,
            ..ModelOptions::default()
        }
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var,
            value: value.to_string(),
        }),
    }
}

fn parse_millis(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidNumber {
            var,
            value: value.to_string(),
        })
}

/// `true`/`false`, or a comma-separated list of `ttl`, `indexes`, `throughput`.
fn parse_update(value: &str) -> Result<UpdateTargets, ConfigError> {
    if let Ok(all) = parse_bool("DOCMAP_UPDATE", value) {
        return Ok(if all {
            UpdateTargets::all()
        } else {
            UpdateTargets::none()
        });
    }
    let mut targets = UpdateTargets::none();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part {
            "ttl" => targets.ttl = true,
            "indexes" => targets.indexes = true,
            "throughput" => targets.throughput = true,
            other => return Err(ConfigError::InvalidUpdateTarget(other.to_string())),
        }
    }
    Ok(targets)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a boolean, got {value:?}")]
    InvalidBool { var: &'static str, value: String },

    #[error("{var} must be a number of milliseconds, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("Invalid DOCMAP_UPDATE target {0:?}")]
    InvalidUpdateTarget(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.model_options(), ModelOptions::default());
    }

    #[test]
    fn overlays_variables() {
        let config = Config::from_lookup(lookup(&[
            ("DOCMAP_TABLE_PREFIX", "dev_"),
            ("DOCMAP_CREATE", "false"),
            ("DOCMAP_UPDATE", "ttl, indexes"),
            ("DOCMAP_WAIT_TIMEOUT_MS", "500"),
        ]))
        .unwrap();
        let options = config.model_options();
        assert_eq!(options.table_name("Cat"), "dev_Cat");
        assert!(!options.create);
        assert!(options.update.ttl && options.update.indexes && !options.update.throughput);
        assert_eq!(options.wait_for_active.timeout, Duration::from_millis(500));
        assert_eq!(options.wait_for_active.frequency, Duration::from_millis(1_000));
    }

    #[test]
    fn update_accepts_booleans() {
        let config = Config::from_lookup(lookup(&[("DOCMAP_UPDATE", "true")])).unwrap();
        assert_eq!(config.update, UpdateTargets::all());
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("DOCMAP_CREATE", "maybe")])),
            Err(ConfigError::InvalidBool { var: "DOCMAP_CREATE", .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("DOCMAP_WAIT_FREQUENCY_MS", "soon")])),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("DOCMAP_UPDATE", "ttl,schema")])),
            Err(ConfigError::InvalidUpdateTarget(target)) if target == "schema"
        ));
    }
}
