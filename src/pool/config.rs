//! Pool configuration.

use std::time::Duration;

use crate::error::SqlPoolError;

/// Default idle lifetime before the sweep closes a connection.
pub const DEFAULT_ALIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default interval at which a waiting acquirer re-checks the pool.
pub const DEFAULT_ACQUIRE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration shared by both pool variants.
///
/// Construct with [`PoolConfig::new`] and the builder methods, then the pool
/// constructors call [`PoolConfig::validate`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Upper bound on live plus in-creation connections.
    pub max_conn: usize,

    /// Log every executed statement at debug level.
    pub debug: bool,

    /// How often the cooperative pool sweeps idle connections. Zero disables the sweep.
    pub sweep_period: Duration,

    /// Idle time after which the sweep closes a connection.
    pub alive_timeout: Duration,

    /// How long a waiting acquirer sleeps between checks when nothing wakes it.
    pub acquire_poll_interval: Duration,

    /// Give up waiting for a connection after this long. `None` waits until the
    /// pool is destroyed.
    pub acquire_timeout: Option<Duration>,

    /// Cap on concurrent connection attempts in the cooperative pool. Defaults to
    /// `max_conn`.
    pub max_concurrent_creates: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_conn: 1,
            debug: false,
            sweep_period: Duration::ZERO,
            alive_timeout: DEFAULT_ALIVE_TIMEOUT,
            acquire_poll_interval: DEFAULT_ACQUIRE_POLL_INTERVAL,
            acquire_timeout: None,
            max_concurrent_creates: None,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_conn(mut self, max_conn: usize) -> Self {
        self.max_conn = max_conn;
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn sweep_period(mut self, period: Duration) -> Self {
        self.sweep_period = period;
        self
    }

    /// Sweep period in seconds; anything not strictly positive disables the sweep.
    #[must_use]
    pub fn sweep_period_secs(mut self, secs: f64) -> Self {
        self.sweep_period = if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        };
        self
    }

    #[must_use]
    pub fn alive_timeout(mut self, timeout: Duration) -> Self {
        self.alive_timeout = timeout;
        self
    }

    #[must_use]
    pub fn acquire_poll_interval(mut self, interval: Duration) -> Self {
        self.acquire_poll_interval = interval;
        self
    }

    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn max_concurrent_creates(mut self, limit: usize) -> Self {
        self.max_concurrent_creates = Some(limit);
        self
    }

    #[must_use]
    pub fn sweep_enabled(&self) -> bool {
        !self.sweep_period.is_zero()
    }

    pub(crate) fn create_limit(&self) -> usize {
        self.max_concurrent_creates.unwrap_or(self.max_conn)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `SqlPoolError::ConfigError` describing the first invalid setting.
    pub fn validate(&self) -> Result<(), SqlPoolError> {
        if self.max_conn == 0 {
            return Err(SqlPoolError::ConfigError(
                "max_conn must be at least 1".to_string(),
            ));
        }
        if self.acquire_poll_interval.is_zero() {
            return Err(SqlPoolError::ConfigError(
                "acquire_poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_creates == Some(0) {
            return Err(SqlPoolError::ConfigError(
                "max_concurrent_creates must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_conn, 1);
        assert!(!config.debug);
        assert!(!config.sweep_enabled());
        assert_eq!(config.alive_timeout, Duration::from_secs(60));
        assert_eq!(config.acquire_poll_interval, Duration::from_secs(1));
        assert_eq!(config.create_limit(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn non_positive_sweep_period_disables_sweep() {
        assert!(!PoolConfig::new().sweep_period_secs(0.0).sweep_enabled());
        assert!(!PoolConfig::new().sweep_period_secs(-5.0).sweep_enabled());
        let config = PoolConfig::new().sweep_period_secs(1.5);
        assert_eq!(config.sweep_period, Duration::from_millis(1500));
    }

    #[test]
    fn rejects_invalid_settings() {
        assert!(PoolConfig::new().max_conn(0).validate().is_err());
        assert!(
            PoolConfig::new()
                .acquire_poll_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(PoolConfig::new().max_concurrent_creates(0).validate().is_err());
        assert_eq!(PoolConfig::new().max_conn(4).create_limit(), 4);
        assert_eq!(
            PoolConfig::new()
                .max_conn(4)
                .max_concurrent_creates(2)
                .create_limit(),
            2
        );
    }
}
