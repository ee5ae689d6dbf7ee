use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::decoder::DEFAULT_UNIT_PREFIX;
use crate::metrics::{Aggregator, RevenueBasis};

const CONFIG_FILE_NAME: &str = "dashboard_config.json";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    pub backend_url: String,
    /// Machines to watch. Empty means "whatever the backend lists".
    pub devices: Vec<String>,
    pub refresh_interval_secs: u64,
    pub unit_prefix: String,
    pub revenue_basis: RevenueBasis,
    pub numeric_default: i64,
    pub db_path: PathBuf,
    pub report_dir: Option<PathBuf>,
    pub simulate: bool,
    pub snapshot_retention: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend_url: "http://localhost:3000".to_string(),
            devices: Vec::new(),
            refresh_interval_secs: 30,
            unit_prefix: DEFAULT_UNIT_PREFIX.to_string(),
            revenue_basis: RevenueBasis::Sales,
            numeric_default: 0,
            db_path: PathBuf::from("./dashboard_cache.db"),
            report_dir: None,
            simulate: false,
            snapshot_retention: 50,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();

        let backend_url = lookup("BACKEND_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.backend_url);
        let devices = lookup("DEVICES")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let revenue_basis = match lookup("REVENUE_BASIS") {
            Some(raw) => raw.parse().map_err(anyhow::Error::msg)?,
            None => defaults.revenue_basis,
        };

        Ok(Config {
            backend_url,
            devices,
            refresh_interval_secs: parse_or(&lookup, "REFRESH_INTERVAL_SECS", defaults.refresh_interval_secs),
            unit_prefix: lookup("UNIT_PREFIX").unwrap_or(defaults.unit_prefix),
            revenue_basis,
            numeric_default: parse_or(&lookup, "NUMERIC_DEFAULT", defaults.numeric_default),
            db_path: lookup("DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            report_dir: lookup("REPORT_DIR").map(PathBuf::from),
            simulate: lookup("SIMULATE").is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes")),
            snapshot_retention: parse_or(&lookup, "SNAPSHOT_RETENTION", defaults.snapshot_retention),
        })
    }

    pub fn aggregator(&self) -> Aggregator {
        Aggregator::new(self.numeric_default, self.revenue_basis)
    }

    fn get_config_file_path() -> PathBuf {
        let config_dir = env::var("CONFIG_DIR").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(config_dir).join(CONFIG_FILE_NAME)
    }

    /// Env config, overridden by the config file when one exists.
    pub fn load() -> Result<Self> {
        let path = Self::get_config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Self::from_env()
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure the directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }

    pub fn save_to_file(&self) -> Result<()> {
        self.save_to(&Self::get_config_file_path())
    }
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {key} value {raw:?}, using default");
            default
        }),
        None => default,
    }
}
