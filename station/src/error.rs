//! Error taxonomy shared by the write and read paths.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StationError>;

/// Every failure is scoped to the current cycle or request. Nothing in this
/// crate retries except the forecast client.
#[derive(Debug, Error)]
pub enum StationError {
    /// Local sensor or heat proxy unreachable, or returned an invalid value.
    #[error("sensor read failed: {0}")]
    SensorRead(String),

    /// Remote sensor directory unreachable or missing an expected sensor.
    #[error("remote source failed: {0}")]
    RemoteSource(String),

    /// A record with a missing, non-finite or out-of-range field.
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    /// Arithmetic that would otherwise produce NaN or infinity.
    #[error("computation error: {0}")]
    Computation(String),

    /// Persistence layer failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid configuration or a second cycle started while one is running.
    #[error("configuration error: {0}")]
    Config(String),
}

impl StationError {
    /// Sensor and remote failures may succeed on the next scheduled cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, StationError::SensorRead(_) | StationError::RemoteSource(_))
    }
}

impl From<rusqlite::Error> for StationError {
    fn from(e: rusqlite::Error) -> Self {
        StationError::Storage(e.to_string())
    }
}
