//! Assembles one complete [`WeatherRecord`] per sampling cycle.

use std::thread;
use std::time::Duration;

use chrono::Local;
use log::debug;

use crate::compensation::SensorCompensator;
use crate::error::Result;
use crate::hue::{SensorDirectory, SensorIdMap};
use crate::record::WeatherRecord;
use crate::sensors::{EnvironmentSensor, HeatProxySource};

/// Fewest local passes per cycle; only the last pass is kept.
pub const MIN_SETTLE_PASSES: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct SettleOptions {
    pub passes: usize,
    pub pause: Duration,
}

impl Default for SettleOptions {
    fn default() -> Self {
        Self {
            passes: MIN_SETTLE_PASSES,
            pause: Duration::from_millis(100),
        }
    }
}

/// Sensors and remote directory used for one cycle.
pub struct MultiSourceReader<'a> {
    pub sensor: &'a mut dyn EnvironmentSensor,
    pub proxy: &'a mut dyn HeatProxySource,
    pub directory: &'a dyn SensorDirectory,
    pub ids: SensorIdMap,
    pub settle: SettleOptions,
}

struct LocalReading {
    temperature: f64,
    humidity: f64,
    pressure: f64,
}

impl MultiSourceReader<'_> {
    fn local_pass(&mut self, compensator: &mut SensorCompensator) -> Result<LocalReading> {
        let temperature = compensator.read(&mut *self.proxy, &mut *self.sensor)?;
        let humidity = self.sensor.humidity()?;
        let pressure = self.sensor.pressure()?;
        Ok(LocalReading {
            temperature,
            humidity,
            pressure,
        })
    }

    /// Reads every source and builds a validated record stamped with the
    /// capture time. Any failed read aborts the cycle before a record
    /// exists. The record is not persisted here.
    pub fn read_cycle(&mut self, compensator: &mut SensorCompensator) -> Result<WeatherRecord> {
        let directory = self.directory.fetch()?;
        let remote = self.ids.resolve(&directory)?;

        let passes = self.settle.passes.max(MIN_SETTLE_PASSES);
        let mut local = self.local_pass(compensator)?;
        for pass in 1..passes {
            thread::sleep(self.settle.pause);
            local = self.local_pass(compensator)?;
            debug!("settle pass {}: {:.2}", pass, local.temperature);
        }

        let record = WeatherRecord {
            living_room_temp: local.temperature,
            bathroom_temp: remote.bathroom,
            closet_temp: remote.closet,
            staircase_temp: remote.staircase,
            humidity: local.humidity,
            pressure: local.pressure,
            record_date: Local::now(),
        };
        record.validate()?;
        Ok(record)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::StationError;
    use crate::hue::{Directory, RemoteSensor, RemoteState};
    use approx::assert_relative_eq;

    pub(crate) struct FakeSensor {
        pub temperatures: Vec<f64>,
        pub reads: usize,
        pub fail_humidity: bool,
    }

    impl FakeSensor {
        pub(crate) fn steady(temperature: f64) -> Self {
            Self {
                temperatures: vec![temperature],
                reads: 0,
                fail_humidity: false,
            }
        }
    }

    impl EnvironmentSensor for FakeSensor {
        fn temperature(&mut self) -> Result<f64> {
            let t = self.temperatures[self.reads.min(self.temperatures.len() - 1)];
            self.reads += 1;
            Ok(t)
        }

        fn humidity(&mut self) -> Result<f64> {
            if self.fail_humidity {
                return Err(StationError::SensorRead("humidity register".into()));
            }
            Ok(40.0 + self.reads as f64)
        }

        fn pressure(&mut self) -> Result<f64> {
            Ok(1012.5)
        }
    }

    pub(crate) struct FixedProxy(pub f64);

    impl HeatProxySource for FixedProxy {
        fn proxy_temperature(&mut self) -> Result<f64> {
            Ok(self.0)
        }
    }

    pub(crate) struct FakeDirectory(pub Vec<(u32, i64)>);

    impl SensorDirectory for FakeDirectory {
        fn fetch(&self) -> Result<Directory> {
            Ok(self
                .0
                .iter()
                .map(|&(id, temperature)| {
                    let sensor = RemoteSensor {
                        name: None,
                        state: RemoteState {
                            temperature: Some(temperature),
                        },
                    };
                    (id.to_string(), sensor)
                })
                .collect())
        }
    }

    pub(crate) fn full_directory() -> FakeDirectory {
        FakeDirectory(vec![(25, 2050), (53, 1800), (62, 1625)])
    }

    fn fast() -> SettleOptions {
        SettleOptions {
            passes: 3,
            pause: Duration::ZERO,
        }
    }

    #[test]
    fn builds_complete_record() -> anyhow::Result<()> {
        let mut sensor = FakeSensor::steady(22.0);
        let mut proxy = FixedProxy(22.0);
        let directory = full_directory();
        let mut reader = MultiSourceReader {
            sensor: &mut sensor,
            proxy: &mut proxy,
            directory: &directory,
            ids: SensorIdMap::default(),
            settle: fast(),
        };
        let mut compensator = SensorCompensator::new(2.25)?;
        let record = reader.read_cycle(&mut compensator)?;

        assert_eq!(record.living_room_temp, 22.0);
        assert_eq!(record.bathroom_temp, 20.5);
        assert_eq!(record.closet_temp, 18.0);
        assert_eq!(record.staircase_temp, 16.25);
        assert_eq!(record.pressure, 1012.5);
        Ok(())
    }

    #[test]
    fn keeps_only_final_pass() -> anyhow::Result<()> {
        let mut sensor = FakeSensor {
            temperatures: vec![30.0, 26.0, 24.0, 23.0],
            reads: 0,
            fail_humidity: false,
        };
        let mut proxy = FixedProxy(45.0);
        let directory = full_directory();
        let mut reader = MultiSourceReader {
            sensor: &mut sensor,
            proxy: &mut proxy,
            directory: &directory,
            ids: SensorIdMap::default(),
            settle: SettleOptions {
                passes: 1,
                pause: Duration::ZERO,
            },
        };
        let mut compensator = SensorCompensator::new(2.25)?;
        let record = reader.read_cycle(&mut compensator)?;

        // passes below the minimum are raised to three
        assert_eq!(sensor.reads, 3);
        assert_relative_eq!(record.living_room_temp, 24.0 - (45.0 - 24.0) / 2.25, epsilon = 1e-12);
        assert_eq!(record.humidity, 43.0);
        Ok(())
    }

    #[test]
    fn missing_remote_sensor_aborts_cycle() -> anyhow::Result<()> {
        let mut sensor = FakeSensor::steady(22.0);
        let mut proxy = FixedProxy(40.0);
        let directory = FakeDirectory(vec![(25, 2050), (62, 1625)]);
        let mut reader = MultiSourceReader {
            sensor: &mut sensor,
            proxy: &mut proxy,
            directory: &directory,
            ids: SensorIdMap::default(),
            settle: fast(),
        };
        let mut compensator = SensorCompensator::new(2.25)?;
        let result = reader.read_cycle(&mut compensator);

        assert!(matches!(result, Err(StationError::RemoteSource(_))));
        assert_eq!(sensor.reads, 0);
        Ok(())
    }

    #[test]
    fn local_failure_aborts_cycle() -> anyhow::Result<()> {
        let mut sensor = FakeSensor::steady(22.0);
        sensor.fail_humidity = true;
        let mut proxy = FixedProxy(40.0);
        let directory = full_directory();
        let mut reader = MultiSourceReader {
            sensor: &mut sensor,
            proxy: &mut proxy,
            directory: &directory,
            ids: SensorIdMap::default(),
            settle: fast(),
        };
        let mut compensator = SensorCompensator::new(2.25)?;
        assert!(matches!(
            reader.read_cycle(&mut compensator),
            Err(StationError::SensorRead(_))
        ));
        Ok(())
    }
}
