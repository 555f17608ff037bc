//! Self-heating compensation for the local temperature sensor.
//!
//! The sensor sits next to the CPU, so its raw reading drifts towards the
//! CPU temperature. The correction pushes the reading away from a smoothed
//! CPU temperature by `(avg_proxy - raw) / factor`.

use log::debug;

use crate::error::{Result, StationError};
use crate::sensors::{EnvironmentSensor, HeatProxySource};
use crate::stats::mean;

pub const WINDOW_SIZE: usize = 5;
pub const DEFAULT_FACTOR: f64 = 2.25;

/// Fixed-capacity FIFO of the most recent samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlidingWindow<const N: usize> {
    samples: [f64; N],
    /// Slot holding the oldest sample, overwritten by the next push.
    head: usize,
}

impl<const N: usize> SlidingWindow<N> {
    const NON_EMPTY: () = assert!(N > 0, "SlidingWindow needs at least one slot");

    /// Every slot starts at `sample`, so the first average is not dragged
    /// towards zero.
    ///
    /// A zero-capacity window is rejected at compile time:
    ///
    /// ```compile_fail
    /// let _ = station_core::compensation::SlidingWindow::<0>::seeded(1.0);
    /// ```
    pub fn seeded(sample: f64) -> Self {
        let () = Self::NON_EMPTY;
        Self {
            samples: [sample; N],
            head: 0,
        }
    }

    pub fn push(&mut self, sample: f64) {
        self.samples[self.head] = sample;
        self.head = (self.head + 1) % N;
    }

    pub fn average(&self) -> f64 {
        mean(&self.samples).unwrap_or_default()
    }

    /// Samples from oldest to newest.
    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples[self.head..]
            .iter()
            .chain(&self.samples[..self.head])
            .copied()
    }
}

pub fn check_factor(factor: f64) -> Result<f64> {
    if factor.is_finite() && factor > 0.0 {
        Ok(factor)
    } else {
        Err(StationError::Config(format!(
            "compensation factor must be positive, got {}",
            factor
        )))
    }
}

/// Pushes `proxy_sample` into `window` and corrects `raw_temp` against the
/// new window average.
pub fn compensate(
    raw_temp: f64,
    proxy_sample: f64,
    mut window: SlidingWindow<WINDOW_SIZE>,
    factor: f64,
) -> Result<(f64, SlidingWindow<WINDOW_SIZE>)> {
    let factor = check_factor(factor)?;
    window.push(proxy_sample);
    let avg_proxy = window.average();
    Ok((raw_temp - (avg_proxy - raw_temp) / factor, window))
}

/// Carries the proxy window across passes of a reading cycle.
#[derive(Debug, Clone)]
pub struct SensorCompensator {
    factor: f64,
    window: Option<SlidingWindow<WINDOW_SIZE>>,
}

impl SensorCompensator {
    pub fn new(factor: f64) -> Result<Self> {
        Ok(Self {
            factor: check_factor(factor)?,
            window: None,
        })
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn window(&self) -> Option<&SlidingWindow<WINDOW_SIZE>> {
        self.window.as_ref()
    }

    /// Corrects one raw reading. The first proxy sample seen seeds the
    /// whole window.
    pub fn apply(&mut self, raw_temp: f64, proxy_sample: f64) -> Result<f64> {
        let window = self
            .window
            .unwrap_or_else(|| SlidingWindow::seeded(proxy_sample));
        let (compensated, window) = compensate(raw_temp, proxy_sample, window, self.factor)?;
        self.window = Some(window);
        Ok(compensated)
    }

    /// One pass: sample the proxy, read the raw temperature, correct it.
    /// Either read failing leaves the window untouched.
    pub fn read(
        &mut self,
        proxy: &mut dyn HeatProxySource,
        sensor: &mut dyn EnvironmentSensor,
    ) -> Result<f64> {
        let proxy_sample = proxy.proxy_temperature()?;
        let raw_temp = sensor.temperature()?;
        let compensated = self.apply(raw_temp, proxy_sample)?;
        debug!(
            "raw={:.2} proxy={:.2} compensated={:.2}",
            raw_temp, proxy_sample, compensated
        );
        Ok(compensated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn no_bias_is_exact() -> anyhow::Result<()> {
        for factor in [0.5, 1.0, 2.25, 7.0] {
            for t in [-3.7, 0.0, 21.3, 48.312] {
                let (out, _) = compensate(t, t, SlidingWindow::seeded(t), factor)?;
                assert_eq!(out, t);
            }
        }
        Ok(())
    }

    #[test]
    fn window_forgets_seed_after_five_samples() {
        for seed in [0.0, 35.0, 80.5] {
            let mut window = SlidingWindow::<WINDOW_SIZE>::seeded(seed);
            for _ in 0..WINDOW_SIZE {
                window.push(52.7);
            }
            assert_eq!(window.average(), 52.7);
        }
    }

    #[test]
    fn window_is_fifo() {
        let mut window = SlidingWindow::<3>::seeded(1.0);
        window.push(2.0);
        window.push(3.0);
        assert_eq!(window.samples().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
        window.push(4.0);
        assert_eq!(window.samples().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn single_slot_window_tracks_latest() {
        let mut window = SlidingWindow::<1>::seeded(10.0);
        window.push(12.5);
        assert_eq!(window.average(), 12.5);
        assert_eq!(window.samples().collect::<Vec<_>>(), vec![12.5]);
    }

    #[test]
    fn correction_formula() -> anyhow::Result<()> {
        // avg proxy 45, raw 27: 27 - (45 - 27) / 2.25 = 19
        let (out, window) = compensate(27.0, 45.0, SlidingWindow::seeded(45.0), 2.25)?;
        assert_relative_eq!(out, 19.0, epsilon = 1e-12);
        assert_eq!(window.average(), 45.0);
        Ok(())
    }

    #[test]
    fn zero_factor_is_config_error() {
        assert!(matches!(
            compensate(20.0, 40.0, SlidingWindow::seeded(40.0), 0.0),
            Err(StationError::Config(_))
        ));
        assert!(SensorCompensator::new(0.0).is_err());
        assert!(SensorCompensator::new(-1.0).is_err());
        assert!(SensorCompensator::new(f64::NAN).is_err());
    }

    #[test]
    fn compensator_seeds_from_first_sample() -> anyhow::Result<()> {
        let mut c = SensorCompensator::new(DEFAULT_FACTOR)?;
        assert!(c.window().is_none());
        c.apply(25.0, 50.0)?;
        assert_eq!(c.window().map(|w| w.average()), Some(50.0));

        // 50,50,50,50,60 -> average 52
        let out = c.apply(25.0, 60.0)?;
        assert_relative_eq!(out, 25.0 - 27.0 / DEFAULT_FACTOR, epsilon = 1e-12);
        Ok(())
    }
}
