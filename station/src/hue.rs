//! Remote sensor directory served by a Hue bridge.
//!
//! The bridge answers `GET /api/<username>/sensors` with a map keyed by the
//! numeric sensor id (as a string). Temperature sensors report
//! `state.temperature` in hundredths of a degree.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StationError};
use crate::http::{BlockingHttp, HttpGet};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteState {
    #[serde(default)]
    pub temperature: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteSensor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: RemoteState,
}

pub type Directory = HashMap<String, RemoteSensor>;

pub trait SensorDirectory {
    fn fetch(&self) -> Result<Directory>;
}

/// Directory ids of the three auxiliary sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorIdMap {
    pub bathroom: u32,
    pub closet: u32,
    pub staircase: u32,
}

impl Default for SensorIdMap {
    fn default() -> Self {
        Self {
            bathroom: 25,
            closet: 53,
            staircase: 62,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuxiliaryTemps {
    pub bathroom: f64,
    pub closet: f64,
    pub staircase: f64,
}

/// Temperature of sensor `id` in Celsius.
pub fn temperature_of(directory: &Directory, id: u32) -> Result<f64> {
    let sensor = directory.get(&id.to_string()).ok_or_else(|| {
        StationError::RemoteSource(format!("sensor {} missing from directory response", id))
    })?;
    let scaled = sensor.state.temperature.ok_or_else(|| {
        StationError::RemoteSource(format!("sensor {} reports no temperature", id))
    })?;
    Ok(scaled as f64 / 100.0)
}

impl SensorIdMap {
    /// All three or nothing.
    pub fn resolve(&self, directory: &Directory) -> Result<AuxiliaryTemps> {
        Ok(AuxiliaryTemps {
            bathroom: temperature_of(directory, self.bathroom)?,
            closet: temperature_of(directory, self.closet)?,
            staircase: temperature_of(directory, self.staircase)?,
        })
    }
}

pub struct HueBridge<H: HttpGet = BlockingHttp> {
    http: H,
    url: String,
}

impl HueBridge {
    pub fn new(base_url: &str, username: &str) -> Result<Self> {
        let http = BlockingHttp::new(Duration::from_secs(10))
            .map_err(|e| StationError::RemoteSource(e.to_string()))?;
        Ok(Self::with_http(http, base_url, username))
    }
}

impl<H: HttpGet> HueBridge<H> {
    pub fn with_http(http: H, base_url: &str, username: &str) -> Self {
        Self {
            http,
            url: format!("{}/api/{}/sensors", base_url.trim_end_matches('/'), username),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl<H: HttpGet> SensorDirectory for HueBridge<H> {
    fn fetch(&self) -> Result<Directory> {
        let body = self
            .http
            .get(&self.url)
            .map_err(|e| StationError::RemoteSource(format!("hue bridge: {}", e)))?;
        serde_json::from_str(&body)
            .map_err(|e| StationError::RemoteSource(format!("hue bridge: bad response: {}", e)))
    }
}
