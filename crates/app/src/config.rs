//! Operation catalog configuration.

use std::time::Duration;

use serde::Deserialize;

/// Deadlines applied by [`Central`](crate::services::central::Central).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CentralConfig {
    /// Deadline for a characteristic read, in milliseconds.
    pub read_timeout_ms: u64,
    /// Deadline for a characteristic write with response, in milliseconds.
    pub write_timeout_ms: u64,
    /// Deadline for enabling or disabling notifications, in milliseconds.
    pub notify_timeout_ms: u64,
}

impl CentralConfig {
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    #[must_use]
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            notify_timeout_ms: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_gatt_deadlines_to_five_seconds() {
        let config = CentralConfig::default();
        assert_eq!(config.read_timeout(), Duration::from_secs(5));
        assert_eq!(config.write_timeout(), Duration::from_secs(5));
        assert_eq!(config.notify_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn should_parse_partial_toml_with_defaults() {
        let config: CentralConfig = toml::from_str("read_timeout_ms = 250").unwrap();
        assert_eq!(config.read_timeout(), Duration::from_millis(250));
        assert_eq!(config.write_timeout_ms, 5000);
    }
}
