//! Local hardware seams: the heat proxy and the environment sensor.
//!
//! Both concrete sources read plain sysfs attribute files, so the kernel
//! drivers own the bus access.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, StationError};

/// Supplies the temperature of the heat source warming the local sensor.
pub trait HeatProxySource {
    fn proxy_temperature(&mut self) -> Result<f64>;
}

/// Co-located temperature/humidity/pressure sensor.
pub trait EnvironmentSensor {
    /// Raw (uncompensated) temperature, Celsius.
    fn temperature(&mut self) -> Result<f64>;
    /// Relative humidity, percent.
    fn humidity(&mut self) -> Result<f64>;
    /// Pressure, hPa.
    fn pressure(&mut self) -> Result<f64>;
}

fn read_scaled(path: &Path, scale: f64) -> Result<f64> {
    let text = fs::read_to_string(path)
        .map_err(|e| StationError::SensorRead(format!("{}: {}", path.display(), e)))?;
    let raw: f64 = text.trim().parse().map_err(|_| {
        StationError::SensorRead(format!("{}: invalid value {:?}", path.display(), text.trim()))
    })?;
    let value = raw * scale;
    if !value.is_finite() {
        return Err(StationError::SensorRead(format!(
            "{}: non-finite value {}",
            path.display(),
            raw
        )));
    }
    Ok(value)
}

/// CPU thermal zone reported in millidegrees.
pub struct ThermalZone {
    path: PathBuf,
}

impl ThermalZone {
    pub const DEFAULT_PATH: &'static str = "/sys/class/thermal/thermal_zone0/temp";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HeatProxySource for ThermalZone {
    fn proxy_temperature(&mut self) -> Result<f64> {
        read_scaled(&self.path, 1.0 / 1000.0)
    }
}

/// BME280 bound to the kernel IIO driver.
///
/// Temperature is exposed in m°C, humidity in milli-percent and pressure in
/// kPa.
pub struct IioBme280 {
    device: PathBuf,
}

impl IioBme280 {
    pub const DEFAULT_DEVICE: &'static str = "/sys/bus/iio/devices/iio:device0";

    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self { device: device.into() }
    }
}

impl EnvironmentSensor for IioBme280 {
    fn temperature(&mut self) -> Result<f64> {
        read_scaled(&self.device.join("in_temp_input"), 1.0 / 1000.0)
    }

    fn humidity(&mut self) -> Result<f64> {
        read_scaled(&self.device.join("in_humidityrelative_input"), 1.0 / 1000.0)
    }

    fn pressure(&mut self) -> Result<f64> {
        read_scaled(&self.device.join("in_pressure_input"), 10.0)
    }
}
