//! Process-wide handles for the write path.
//!
//! Built once at start-up and dropped on every exit path; dropping releases
//! the store connection and the cycle lock.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::compensation::SensorCompensator;
use crate::config::StationConfig;
use crate::error::{Result, StationError};
use crate::hue::{HueBridge, SensorDirectory};
use crate::reader::MultiSourceReader;
use crate::record::WeatherRecord;
use crate::sensors::{EnvironmentSensor, HeatProxySource, IioBme280, ThermalZone};
use crate::store::{RecordStore, SqliteStore};

/// Exclusive marker file held for the duration of a cycle.
#[derive(Debug)]
pub struct CycleLock {
    path: PathBuf,
}

impl CycleLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(_) => Ok(Self {
                path: path.to_path_buf(),
            }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StationError::Config(format!(
                "cycle already running (remove {} if stale)",
                path.display()
            ))),
            Err(e) => Err(StationError::Config(format!("{}: {}", path.display(), e))),
        }
    }
}

impl Drop for CycleLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            error!("Failed to release lock {}: {err}", self.path.display());
        }
    }
}

pub struct StationContext {
    config: StationConfig,
    store: Box<dyn RecordStore>,
    sensor: Box<dyn EnvironmentSensor>,
    proxy: Box<dyn HeatProxySource>,
    directory: Box<dyn SensorDirectory>,
    compensator: SensorCompensator,
    // declared last so it is released after the store
    _lock: Option<CycleLock>,
}

impl StationContext {
    /// Hardware-backed context: sysfs sensors, Hue bridge, SQLite store.
    pub fn open(config: StationConfig) -> Result<Self> {
        let lock = CycleLock::acquire(&config.lock_path())?;
        let store = SqliteStore::open(&config.db_path)?;
        let sensor = IioBme280::new(&config.iio_device);
        let proxy = ThermalZone::new(&config.thermal_zone);
        let directory = HueBridge::new(&config.hue.base_url, &config.hue.username)?;
        info!("station context ready, store {}", config.db_path.display());
        Self::with_parts(
            config,
            Box::new(store),
            Box::new(sensor),
            Box::new(proxy),
            Box::new(directory),
            Some(lock),
        )
    }

    pub fn with_parts(
        config: StationConfig,
        store: Box<dyn RecordStore>,
        sensor: Box<dyn EnvironmentSensor>,
        proxy: Box<dyn HeatProxySource>,
        directory: Box<dyn SensorDirectory>,
        lock: Option<CycleLock>,
    ) -> Result<Self> {
        config.validate()?;
        let compensator = SensorCompensator::new(config.factor)?;
        Ok(Self {
            config,
            store,
            sensor,
            proxy,
            directory,
            compensator,
            _lock: lock,
        })
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// Reads one record and, unless `dry_run`, writes it. A failure at any
    /// step leaves the store untouched.
    pub fn run_cycle(&mut self, dry_run: bool) -> Result<WeatherRecord> {
        let mut reader = MultiSourceReader {
            sensor: self.sensor.as_mut(),
            proxy: self.proxy.as_mut(),
            directory: self.directory.as_ref(),
            ids: self.config.hue.sensors,
            settle: self.config.settle(),
        };
        let record = reader.read_cycle(&mut self.compensator)?;
        if dry_run {
            warn!("dry run, record not stored");
        } else {
            self.store.write(&record)?;
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::tests::{full_directory, FakeDirectory, FakeSensor, FixedProxy};
    use crate::store::{MemoryStore, RecordQuery};

    fn context(directory: FakeDirectory) -> anyhow::Result<StationContext> {
        let config = StationConfig {
            settle_pause_ms: 0,
            ..StationConfig::default()
        };
        Ok(StationContext::with_parts(
            config,
            Box::new(MemoryStore::new()),
            Box::new(FakeSensor::steady(21.0)),
            Box::new(FixedProxy(21.0)),
            Box::new(directory),
            None,
        )?)
    }

    #[test]
    fn cycle_writes_one_record() -> anyhow::Result<()> {
        let mut ctx = context(full_directory())?;
        let record = ctx.run_cycle(false)?;
        let stored = ctx.store().read(&RecordQuery::default())?;
        assert_eq!(stored, vec![record]);
        Ok(())
    }

    #[test]
    fn dry_run_writes_nothing() -> anyhow::Result<()> {
        let mut ctx = context(full_directory())?;
        ctx.run_cycle(true)?;
        assert!(ctx.store().read(&RecordQuery::default())?.is_empty());
        Ok(())
    }

    #[test]
    fn failed_cycle_writes_nothing() -> anyhow::Result<()> {
        let mut ctx = context(FakeDirectory(vec![(25, 2050)]))?;
        assert!(matches!(
            ctx.run_cycle(false),
            Err(StationError::RemoteSource(_))
        ));
        assert!(ctx.store().read(&RecordQuery::default())?.is_empty());
        Ok(())
    }

    #[test]
    fn lock_is_exclusive_and_released_on_drop() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("enviro.db.lock");
        let first = CycleLock::acquire(&path)?;
        assert!(matches!(
            CycleLock::acquire(&path),
            Err(StationError::Config(_))
        ));
        drop(first);
        assert!(!path.exists());
        let _again = CycleLock::acquire(&path)?;
        Ok(())
    }

    #[test]
    fn zero_factor_rejected_at_construction() {
        let config = StationConfig {
            factor: 0.0,
            ..StationConfig::default()
        };
        let built = StationContext::with_parts(
            config,
            Box::new(MemoryStore::new()),
            Box::new(FakeSensor::steady(21.0)),
            Box::new(FixedProxy(21.0)),
            Box::new(full_directory()),
            None,
        );
        assert!(matches!(built, Err(StationError::Config(_))));
    }
}
