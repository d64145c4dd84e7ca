//! Client configuration
//!
//! [`Config`] carries the timeouts the engine wraps around every cluster RPC,
//! the policy for transactions dropped while still active, and the size of
//! the blocking worker's runtime.
//!
//! ```ignore
//! use keyspan_core::{Config, DropCheck};
//! use std::time::Duration;
//!
//! let config = Config::default()
//!     .request_timeout(Duration::from_secs(5))
//!     .drop_check(DropCheck::Panic);
//!
//! let config = Config::from_toml_str(r#"
//!     request_timeout_ms = 5000
//!     drop_check = "panic"
//! "#)?;
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

/// What to do when an active transaction is dropped without commit/rollback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropCheck {
    /// Panic (only if the thread is not already panicking)
    Panic,
    /// Log at `error` level
    #[default]
    Warn,
    /// Say nothing
    None,
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Deadline for a single cluster RPC, in milliseconds
    pub request_timeout_ms: u64,
    /// How long a pessimistic lock request waits for a conflicting lock
    pub lock_wait_timeout_ms: u64,
    /// Deadline for connecting to one endpoint
    pub connect_timeout_ms: u64,
    /// Policy for transactions dropped while active
    pub drop_check: DropCheck,
    /// Runtime threads owned by each blocking worker
    pub worker_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            request_timeout_ms: 2000,
            lock_wait_timeout_ms: 1000,
            connect_timeout_ms: 3000,
            drop_check: DropCheck::Warn,
            worker_threads: 1,
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text
    ///
    /// Missing fields take their defaults; unknown fields are rejected.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".into()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::Config("connect_timeout_ms must be positive".into()));
        }
        if self.worker_threads == 0 {
            return Err(Error::Config("worker_threads must be at least 1".into()));
        }
        Ok(())
    }

    /// Set the per-RPC deadline
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the pessimistic lock wait
    pub fn lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the per-endpoint connect deadline
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the drop policy for active transactions
    pub fn drop_check(mut self, check: DropCheck) -> Self {
        self.drop_check = check;
        self
    }

    /// Set the blocking worker's runtime size
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Per-RPC deadline
    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Pessimistic lock wait
    pub fn lock_wait_duration(&self) -> Duration {
        Duration::from_millis(self.lock_wait_timeout_ms)
    }

    /// Per-endpoint connect deadline
    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
