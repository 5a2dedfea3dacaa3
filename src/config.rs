//! Configuration types for the unlock backend

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Top-level configuration
///
/// Every field has a serde default, so an empty TOML file (or no file at
/// all) yields a fully working configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Unlock job and rate-limiting settings
    #[serde(default)]
    pub unlock: UnlockConfig,

    /// External tool paths
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// HTTP server configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the API server (default: "0.0.0.0:8080")
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// Unlock job behavior configuration (quotas, windows, limits)
///
/// One window duration governs the request quota, the password-failure
/// tally, and terminal-job retention, matching the shared 15-minute window
/// of the service contract.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnlockConfig {
    /// Window for rate limiting, failure tracking, and job retention
    /// in seconds (default: 900 = 15 minutes)
    #[serde(default = "default_rate_window", with = "duration_serde")]
    pub rate_window: Duration,

    /// Maximum start requests per client per window (default: 30)
    #[serde(default = "default_max_requests")]
    pub max_requests_per_window: u32,

    /// Consecutive incorrect-password attempts per client before further
    /// starts are rejected (default: 10)
    #[serde(default = "default_max_password_failures")]
    pub max_password_failures: u32,

    /// Upload size ceiling in bytes (default: 100 MiB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Interval between background reap sweeps in seconds (default: 60)
    #[serde(default = "default_reap_interval", with = "duration_serde")]
    pub reap_interval: Duration,
}

impl Default for UnlockConfig {
    fn default() -> Self {
        Self {
            rate_window: default_rate_window(),
            max_requests_per_window: default_max_requests(),
            max_password_failures: default_max_password_failures(),
            max_upload_bytes: default_max_upload_bytes(),
            reap_interval: default_reap_interval(),
        }
    }
}

/// External tool paths
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Explicit path to the qpdf binary (None = discover via PATH)
    #[serde(default)]
    pub qpdf_path: Option<PathBuf>,
}

impl Config {
    /// Validate quotas and windows, returning `Error::Config` on the first
    /// invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.unlock.rate_window.is_zero() {
            return Err(Error::Config {
                message: "rate window must be greater than zero".into(),
                key: Some("unlock.rate_window".into()),
            });
        }
        if self.unlock.max_requests_per_window == 0 {
            return Err(Error::Config {
                message: "request quota must be greater than zero".into(),
                key: Some("unlock.max_requests_per_window".into()),
            });
        }
        if self.unlock.max_password_failures == 0 {
            return Err(Error::Config {
                message: "password failure cap must be greater than zero".into(),
                key: Some("unlock.max_password_failures".into()),
            });
        }
        if self.unlock.max_upload_bytes == 0 {
            return Err(Error::Config {
                message: "upload size ceiling must be greater than zero".into(),
                key: Some("unlock.max_upload_bytes".into()),
            });
        }
        if self.unlock.reap_interval.is_zero() {
            return Err(Error::Config {
                message: "reap interval must be greater than zero".into(),
                key: Some("unlock.reap_interval".into()),
            });
        }
        Ok(())
    }
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_rate_window() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_max_requests() -> u32 {
    30
}

fn default_max_password_failures() -> u32 {
    10
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_reap_interval() -> Duration {
    Duration::from_secs(60)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
