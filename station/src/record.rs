//! Weather record entity and the fixed variable catalogue.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StationError};

/// Named numeric fields of a [`WeatherRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Variable {
    LivingRoomTemp,
    BathroomTemp,
    ClosetTemp,
    StaircaseTemp,
    Humidity,
    Pressure,
}

/// Grouping used by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Temperature,
    Environmental,
}

impl Variable {
    /// Variables that take part in unpivoting, in output order.
    pub const TIDY: [Variable; 5] = [
        Variable::LivingRoomTemp,
        Variable::BathroomTemp,
        Variable::ClosetTemp,
        Variable::Humidity,
        Variable::Pressure,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Variable::LivingRoomTemp => "livingRoomTemp",
            Variable::BathroomTemp => "bathroomTemp",
            Variable::ClosetTemp => "closetTemp",
            Variable::StaircaseTemp => "staircaseTemp",
            Variable::Humidity => "humidity",
            Variable::Pressure => "pressure",
        }
    }

    pub fn from_name(name: &str) -> Option<Variable> {
        match name {
            "livingRoomTemp" => Some(Variable::LivingRoomTemp),
            "bathroomTemp" => Some(Variable::BathroomTemp),
            "closetTemp" => Some(Variable::ClosetTemp),
            "staircaseTemp" => Some(Variable::StaircaseTemp),
            "humidity" => Some(Variable::Humidity),
            "pressure" => Some(Variable::Pressure),
            _ => None,
        }
    }

    /// Static classification table. The staircase sensor has no category
    /// and is left out of grouped views.
    pub const fn category(self) -> Option<Category> {
        match self {
            Variable::LivingRoomTemp | Variable::BathroomTemp | Variable::ClosetTemp => {
                Some(Category::Temperature)
            }
            Variable::Humidity | Variable::Pressure => Some(Category::Environmental),
            Variable::StaircaseTemp => None,
        }
    }
}

/// One sampling event. Built once per cycle, written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherRecord {
    /// Compensated local reading, Celsius.
    pub living_room_temp: f64,
    pub bathroom_temp: f64,
    pub closet_temp: f64,
    pub staircase_temp: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
    /// Pressure, hPa.
    pub pressure: f64,
    pub record_date: DateTime<Local>,
}

impl WeatherRecord {
    pub fn value(&self, variable: Variable) -> f64 {
        match variable {
            Variable::LivingRoomTemp => self.living_room_temp,
            Variable::BathroomTemp => self.bathroom_temp,
            Variable::ClosetTemp => self.closet_temp,
            Variable::StaircaseTemp => self.staircase_temp,
            Variable::Humidity => self.humidity,
            Variable::Pressure => self.pressure,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for variable in [
            Variable::LivingRoomTemp,
            Variable::BathroomTemp,
            Variable::ClosetTemp,
            Variable::StaircaseTemp,
            Variable::Humidity,
            Variable::Pressure,
        ] {
            let value = self.value(variable);
            if !value.is_finite() {
                return Err(StationError::DataIntegrity(format!(
                    "{} is not finite: {}",
                    variable.name(),
                    value
                )));
            }
        }
        if !(0.0..=100.0).contains(&self.humidity) {
            return Err(StationError::DataIntegrity(format!(
                "humidity out of range: {}",
                self.humidity
            )));
        }
        if self.pressure <= 0.0 {
            return Err(StationError::DataIntegrity(format!(
                "pressure must be positive: {}",
                self.pressure
            )));
        }
        Ok(())
    }
}
