//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `blebridge.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use blebridge_app::config::CentralConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Platform collaborator selection.
    pub platform: PlatformConfig,
    /// Scan window and target selection.
    pub scan: ScanConfig,
    /// Deadlines of the operation catalog.
    pub central: CentralConfig,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Which platform collaborator to drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Simulated peripherals.
    #[default]
    Virtual,
    /// The host Bluetooth adapter.
    Btleplug,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "virtual" => Ok(Self::Virtual),
            "btleplug" => Ok(Self::Btleplug),
            other => Err(ConfigError::Validation(format!("unknown backend {other:?}"))),
        }
    }
}

/// Platform configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub backend: Backend,
}

/// Scan configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// How long to scan before picking a device, in seconds.
    pub duration_secs: u64,
    /// Only report devices advertising one of these services.
    pub service_uuids: Vec<Uuid>,
    /// Identifier of the device to explore. The strongest signal wins when unset.
    pub target: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "blebridged=info,blebridge=info".to_string(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            duration_secs: 5,
            service_uuids: Vec::new(),
            target: None,
        }
    }
}

impl Config {
    /// Load configuration from `blebridge.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// result fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("blebridge.toml")?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(val) = var("BLEBRIDGE_BACKEND") {
            self.platform.backend = val.parse()?;
        }
        if let Some(val) = var("BLEBRIDGE_SCAN_SECS") {
            if let Ok(secs) = val.parse() {
                self.scan.duration_secs = secs;
            }
        }
        if let Some(val) = var("BLEBRIDGE_TARGET") {
            self.scan.target = Some(val).filter(|t| !t.is_empty());
        }
        if let Some(val) = var("BLEBRIDGE_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.duration_secs == 0 {
            return Err(ConfigError::Validation(
                "scan duration must be non-zero".to_string(),
            ));
        }
        let central = &self.central;
        if central.read_timeout_ms == 0 || central.write_timeout_ms == 0 || central.notify_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "central timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The scan window.
    #[must_use]
    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan.duration_secs)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
