// src/config.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::core::models::TargetType;
use crate::logging::get_data_dir;

/// Process settings. Built once in `main` and handed to whatever needs it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub scanner: ScannerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// `sqlite://<directory>` holding the database file, or `sqlite::memory:`.
    pub uri: String,
    pub name: String,
    pub max_connections: u32,
}

impl DatabaseSettings {
    /// The URL handed to the SQLite driver: `<uri>/<name>.db`, except for
    /// in-memory databases which are used as given.
    pub fn connection_url(&self) -> String {
        if self.uri.contains(":memory:") {
            self.uri.clone()
        } else {
            format!("{}/{}.db", self.uri.trim_end_matches('/'), self.name)
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            uri: format!("sqlite://{}", get_data_dir().display()),
            name: "vanguard".to_string(),
            max_connections: 5,
        }
    }
}

/// Polling budgets of the scan executors, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerSettings {
    pub web_scan_timeout: u64,
    pub web_check_interval: u64,
    pub network_scan_timeout: u64,
    pub network_check_interval: u64,
    pub ip_range_timeout_per_ip: u64,
    pub ip_range_check_interval: u64,
    pub ip_range_max_timeout: u64,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            web_scan_timeout: 2700,
            web_check_interval: 45,
            network_scan_timeout: 2700,
            network_check_interval: 45,
            ip_range_timeout_per_ip: 1800,
            ip_range_check_interval: 60,
            ip_range_max_timeout: 86400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTiming {
    pub timeout: Duration,
    pub check_interval: Duration,
}

impl ScannerSettings {
    /// Timeout and polling interval for a scan of `category`. IP ranges get
    /// the per-IP budget times `host_count`, capped at the range maximum.
    pub fn timing(&self, category: TargetType, host_count: u64) -> ScanTiming {
        let (timeout, interval) = match category {
            TargetType::Url => (self.web_scan_timeout, self.web_check_interval),
            TargetType::Ip => (self.network_scan_timeout, self.network_check_interval),
            TargetType::IpRange => (
                self.ip_range_timeout_per_ip
                    .saturating_mul(host_count.max(1))
                    .min(self.ip_range_max_timeout),
                self.ip_range_check_interval,
            ),
        };
        ScanTiming {
            timeout: Duration::from_secs(timeout),
            check_interval: Duration::from_secs(interval),
        }
    }
}

impl Settings {
    pub const ENV_PREFIX: &'static str = "VANGUARD_";

    /// Defaults, then the TOML file, then `VANGUARD_` variables
    /// (`VANGUARD_DATABASE__NAME` sets `database.name`).
    pub fn figment(config_path: Option<&Path>) -> Figment {
        let file = config_path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
    }

    pub fn load(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(config_path).extract()
    }
}

fn default_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}
