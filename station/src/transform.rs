//! Read-path transformations over an immutable snapshot of records.
//!
//! Nothing here mutates its input or keeps state between calls. An empty
//! snapshot yields empty vectors and `None`, never an error; the only
//! failure is a deviation against a zero baseline.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, Duration, Local, LocalResult, NaiveDate, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StationError};
use crate::record::{Category, Variable, WeatherRecord};
use crate::stats::mean;

pub const DEFAULT_BASELINE_DAYS: i64 = 30;

/// One `(recordDate, variable, value)` row of an unpivoted record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TidyObservation {
    pub record_date: DateTime<Local>,
    pub variable: Variable,
    pub value: f64,
}

/// Unpivots every record into one observation per tidy variable.
pub fn normalize(records: &[WeatherRecord]) -> Vec<TidyObservation> {
    records
        .iter()
        .flat_map(|record| {
            Variable::TIDY.iter().map(move |&variable| TidyObservation {
                record_date: record.record_date,
                variable,
                value: record.value(variable),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryPartition {
    pub temperature: Vec<TidyObservation>,
    pub environmental: Vec<TidyObservation>,
}

pub fn partition(observations: &[TidyObservation]) -> CategoryPartition {
    let mut out = CategoryPartition::default();
    for obs in observations {
        match obs.variable.category() {
            Some(Category::Temperature) => out.temperature.push(*obs),
            Some(Category::Environmental) => out.environmental.push(*obs),
            None => {}
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Day,
    Week,
}

fn local_midnight(date: NaiveDate) -> DateTime<Local> {
    let naive = date.and_time(NaiveTime::default());
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(earliest, _) => earliest,
        // midnight skipped by a DST jump
        LocalResult::None => Local
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .unwrap_or_else(|| Local.from_utc_datetime(&naive)),
    }
}

impl Frequency {
    /// Local midnight of the day, or of the Monday starting the ISO week.
    pub fn bucket_start(self, t: DateTime<Local>) -> DateTime<Local> {
        let date = t.date_naive();
        let start = match self {
            Frequency::Day => date,
            Frequency::Week => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
        };
        local_midnight(start)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalAggregate {
    pub variable: Variable,
    pub bucket_start: DateTime<Local>,
    pub mean_value: f64,
    pub sample_count: usize,
}

/// Mean per (variable, bucket). Buckets without observations are absent.
/// Ordered by bucket start, then variable name.
pub fn interval_means(
    observations: &[TidyObservation],
    frequency: Frequency,
) -> Vec<IntervalAggregate> {
    let mut groups: BTreeMap<(DateTime<Local>, &'static str), (Variable, Vec<f64>)> =
        BTreeMap::new();
    for obs in observations {
        let key = (frequency.bucket_start(obs.record_date), obs.variable.name());
        groups
            .entry(key)
            .or_insert_with(|| (obs.variable, Vec::new()))
            .1
            .push(obs.value);
    }

    groups
        .into_iter()
        .filter_map(|((bucket_start, _), (variable, values))| {
            Some(IntervalAggregate {
                variable,
                bucket_start,
                mean_value: mean(&values)?,
                sample_count: values.len(),
            })
        })
        .collect()
}

/// Mean of `variable` over records no older than `window` before the latest
/// record. Time based, so uneven cadence weights by sample density.
pub fn rolling_baseline(
    records: &[WeatherRecord],
    variable: Variable,
    window: Duration,
) -> Option<f64> {
    let latest = records.iter().map(|r| r.record_date).max()?;
    // a window reaching past the representable range covers everything
    let cutoff = latest.checked_sub_signed(window);
    let values: Vec<f64> = records
        .iter()
        .filter(|r| cutoff.map_or(true, |c| r.record_date >= c))
        .map(|r| r.value(variable))
        .collect();
    mean(&values)
}

/// Value at the record with the greatest `recordDate`, whatever the
/// snapshot's order.
pub fn current_value(records: &[WeatherRecord], variable: Variable) -> Option<f64> {
    records
        .iter()
        .max_by_key(|r| r.record_date)
        .map(|r| r.value(variable))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Above => "above",
            Direction::Below => "below",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Deviation {
    pub figure: f64,
    pub descriptor: Direction,
}

impl fmt::Display for Deviation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}% {}", self.figure.abs(), self.descriptor.as_str())
    }
}

/// Percentage change of `current` against `baseline`. Zero counts as below.
pub fn percentage_deviation(current: f64, baseline: f64) -> Result<Deviation> {
    if baseline == 0.0 {
        return Err(StationError::Computation(
            "deviation against a zero baseline".to_string(),
        ));
    }
    let figure = (current - baseline) / baseline * 100.0;
    if !figure.is_finite() {
        return Err(StationError::Computation(format!(
            "deviation of {} against {} is not finite",
            current, baseline
        )));
    }
    let descriptor = if figure <= 0.0 {
        Direction::Below
    } else {
        Direction::Above
    };
    Ok(Deviation { figure, descriptor })
}

/// Records captured at or after `cutoff`, in snapshot order.
pub fn since(records: &[WeatherRecord], cutoff: DateTime<Local>) -> Vec<WeatherRecord> {
    records
        .iter()
        .filter(|r| r.record_date >= cutoff)
        .cloned()
        .collect()
}

/// Start of the previous local day; the "last day" view begins here.
pub fn last_day_cutoff(now: DateTime<Local>) -> DateTime<Local> {
    local_midnight(now.date_naive() - Duration::days(1))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableSummary {
    pub variable: Variable,
    pub current: Option<f64>,
    pub baseline: Option<f64>,
    pub deviation: Option<Deviation>,
}

/// Current value, baseline and deviation for every tidy variable.
pub fn summarize(records: &[WeatherRecord], window: Duration) -> Vec<VariableSummary> {
    Variable::TIDY
        .iter()
        .map(|&variable| {
            let current = current_value(records, variable);
            let baseline = rolling_baseline(records, variable, window);
            let deviation = match (current, baseline) {
                (Some(c), Some(b)) => percentage_deviation(c, b).ok(),
                _ => None,
            };
            VariableSummary {
                variable,
                current,
                baseline,
                deviation,
            }
        })
        .collect()
}
