use std::time::Duration;

use serde_derive::Deserialize;

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeouts for establishing and keeping peer connections alive.
///
/// A zero duration means "unset"; call [`Config::apply_defaults`] before use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bound on the whole handshake exchange
    pub handshake_timeout: Duration,
    /// Bound on each read once the connection is established
    pub read_timeout: Duration,
    /// Bound on each write once the connection is established
    pub write_timeout: Duration,
}

impl Config {
    pub fn apply_defaults(mut self) -> Self {
        if self.handshake_timeout.is_zero() {
            self.handshake_timeout = DEFAULT_HANDSHAKE_TIMEOUT;
        }
        if self.read_timeout.is_zero() {
            self.read_timeout = DEFAULT_READ_TIMEOUT;
        }
        if self.write_timeout.is_zero() {
            self.write_timeout = DEFAULT_WRITE_TIMEOUT;
        }
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_config_gets_defaults() {
        let config = Config::default().apply_defaults();
        assert_eq!(config.handshake_timeout, DEFAULT_HANDSHAKE_TIMEOUT);
        assert_eq!(config.read_timeout, DEFAULT_READ_TIMEOUT);
        assert_eq!(config.write_timeout, DEFAULT_WRITE_TIMEOUT);
    }

    #[test]
    fn test_set_fields_are_kept() {
        let config = Config::default()
            .with_read_timeout(Duration::from_millis(250))
            .apply_defaults();
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.handshake_timeout, DEFAULT_HANDSHAKE_TIMEOUT);
    }

    #[test]
    fn test_apply_defaults_is_idempotent() {
        let once = Config::default().apply_defaults();
        assert_eq!(once.apply_defaults(), once);
    }
}
