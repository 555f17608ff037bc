//! Station configuration: defaults, optional JSON file, environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compensation::{check_factor, DEFAULT_FACTOR};
use crate::error::{Result, StationError};
use crate::forecast::ForecastRequest;
use crate::hue::SensorIdMap;
use crate::reader::{SettleOptions, MIN_SETTLE_PASSES};
use crate::sensors::{IioBme280, ThermalZone};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HueConfig {
    pub base_url: String,
    pub username: String,
    pub sensors: SensorIdMap,
}

impl Default for HueConfig {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.0.11".to_string(),
            username: String::new(),
            sensors: SensorIdMap::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub bind: String,
    pub baseline_days: i64,
    pub table_rows: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            baseline_days: crate::transform::DEFAULT_BASELINE_DAYS,
            table_rows: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub db_path: PathBuf,
    pub factor: f64,
    pub settle_passes: usize,
    pub settle_pause_ms: u64,
    pub thermal_zone: PathBuf,
    pub iio_device: PathBuf,
    pub hue: HueConfig,
    pub forecast: ForecastRequest,
    /// SQLite file holding forecast responses between invocations.
    pub forecast_cache: PathBuf,
    pub dashboard: DashboardConfig,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("enviro.db"),
            factor: DEFAULT_FACTOR,
            settle_passes: MIN_SETTLE_PASSES,
            settle_pause_ms: 100,
            thermal_zone: PathBuf::from(ThermalZone::DEFAULT_PATH),
            iio_device: PathBuf::from(IioBme280::DEFAULT_DEVICE),
            hue: HueConfig::default(),
            forecast: ForecastRequest::default(),
            forecast_cache: PathBuf::from("forecast_cache.db"),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl StationConfig {
    /// Defaults, overlaid by `path` if given, then by `STATION_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| StationError::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| StationError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(db) = lookup("STATION_DB") {
            self.db_path = PathBuf::from(db);
        }
        if let Some(factor) = lookup("STATION_FACTOR") {
            self.factor = factor
                .trim()
                .parse()
                .map_err(|_| StationError::Config(format!("STATION_FACTOR: {:?}", factor)))?;
        }
        if let Some(url) = lookup("STATION_HUE_URL") {
            self.hue.base_url = url;
        }
        if let Some(user) = lookup("STATION_HUE_USER") {
            self.hue.username = user;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        check_factor(self.factor)?;
        if self.dashboard.baseline_days <= 0 {
            return Err(StationError::Config(format!(
                "baseline_days must be positive, got {}",
                self.dashboard.baseline_days
            )));
        }
        Ok(())
    }

    pub fn settle(&self) -> SettleOptions {
        SettleOptions {
            passes: self.settle_passes.max(MIN_SETTLE_PASSES),
            pause: Duration::from_millis(self.settle_pause_ms),
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.db_path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }
}
