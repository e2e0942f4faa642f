//! Address pool tuning.

use std::time::Duration;

use super::errors::ConfigError;
use super::types::Lifetimes;

/// Lifetimes and timers of the address pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Valid lifetime handed to the kernel on install and on every refresh.
    pub valid_lifetime: Duration,
    /// Preferred lifetime; zero keeps managed addresses out of the kernel's
    /// own source address selection.
    pub preferred_lifetime: Duration,
    /// Period of the background refresher.
    pub refresh_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            valid_lifetime: Duration::from_secs(90),
            preferred_lifetime: Duration::ZERO,
            refresh_interval: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    /// Short timers for tests.
    pub fn for_testing() -> Self {
        Self {
            valid_lifetime: Duration::from_secs(30),
            preferred_lifetime: Duration::ZERO,
            refresh_interval: Duration::from_secs(10),
        }
    }

    /// Lifetimes for an install or refresh.
    pub fn lifetimes(&self) -> Lifetimes {
        Lifetimes {
            valid: self.valid_lifetime,
            preferred: self.preferred_lifetime,
        }
    }

    /// Reject settings under which refreshed addresses would still expire.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid = self.valid_lifetime.as_secs();
        if valid == 0 {
            return Err(ConfigError::ZeroValidLifetime);
        }
        let preferred = self.preferred_lifetime.as_secs();
        if preferred > valid {
            return Err(ConfigError::PreferredExceedsValid { preferred, valid });
        }
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::ZeroRefreshInterval);
        }
        if self.refresh_interval >= self.valid_lifetime {
            return Err(ConfigError::RefreshTooSlow {
                refresh: self.refresh_interval.as_secs(),
                valid,
            });
        }
        Ok(())
    }
}
