//! Core data models for the host monitor

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of numeric features per sample
pub const NUM_FEATURES: usize = 3;

/// Feature column order shared by training and scoring
pub const FEATURE_COLUMNS: [&str; NUM_FEATURES] = ["cpu_percent", "memory_percent", "disk_percent"];

/// A sample as produced by the sampler, before the store assigns an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub disk_percent: Option<f64>,
}

impl NewSample {
    pub fn new(
        timestamp: DateTime<Utc>,
        cpu_percent: Option<f64>,
        memory_percent: Option<f64>,
        disk_percent: Option<f64>,
    ) -> Self {
        Self {
            timestamp,
            cpu_percent,
            memory_percent,
            disk_percent,
        }
    }

    /// Metric values in feature column order
    pub fn features(&self) -> [Option<f64>; NUM_FEATURES] {
        [self.cpu_percent, self.memory_percent, self.disk_percent]
    }

    /// Find the first present value that is not a finite percentage
    pub fn first_invalid(&self) -> Option<(&'static str, f64)> {
        self.features()
            .into_iter()
            .zip(FEATURE_COLUMNS)
            .find_map(|(value, column)| match value {
                Some(v) if !is_valid_percent(v) => Some((column, v)),
                _ => None,
            })
    }
}

/// One persisted collection tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub disk_percent: Option<f64>,
}

impl Sample {
    pub fn features(&self) -> [Option<f64>; NUM_FEATURES] {
        [self.cpu_percent, self.memory_percent, self.disk_percent]
    }
}

/// Imputed `[cpu, memory, disk]` triple
pub type FeatureVector = [f64; NUM_FEATURES];

/// Binary detector output, encoded as -1 / +1 on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum AnomalyLabel {
    Anomaly,
    Normal,
}

impl AnomalyLabel {
    pub fn as_i8(self) -> i8 {
        match self {
            AnomalyLabel::Anomaly => -1,
            AnomalyLabel::Normal => 1,
        }
    }

    pub fn is_anomaly(self) -> bool {
        self == AnomalyLabel::Anomaly
    }
}

impl From<AnomalyLabel> for i8 {
    fn from(label: AnomalyLabel) -> Self {
        label.as_i8()
    }
}

impl TryFrom<i8> for AnomalyLabel {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(AnomalyLabel::Anomaly),
            1 => Ok(AnomalyLabel::Normal),
            other => Err(format!("invalid anomaly label {other}, expected -1 or 1")),
        }
    }
}

impl fmt::Display for AnomalyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i8())
    }
}

/// Scoring output handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub disk_percent: Option<f64>,
    pub anomaly: AnomalyLabel,
}

impl LabeledSample {
    pub fn new(sample: &Sample, anomaly: AnomalyLabel) -> Self {
        Self {
            timestamp: sample.timestamp,
            cpu_percent: sample.cpu_percent,
            memory_percent: sample.memory_percent,
            disk_percent: sample.disk_percent,
            anomaly,
        }
    }
}

/// Half-open instant range `[start, end)` used to filter store queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Build a range from UTC calendar days, inclusive of both `start` and `end`.
    ///
    /// The end day is normalized to midnight of the following day so that a
    /// single-day range covers the whole day.
    pub fn from_days(start: NaiveDate, end: NaiveDate) -> Self {
        Self::from_days_in(start, end, &Utc)
    }

    /// Build a range from calendar days in `tz`, inclusive of both ends
    pub fn from_days_in<Tz: TimeZone>(start: NaiveDate, end: NaiveDate, tz: &Tz) -> Self {
        let end_exclusive = end.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
        Self {
            start: start_of_day(start, tz),
            end: start_of_day(end_exclusive, tz),
        }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp < self.end
    }
}

/// First instant of `day` in `tz`.
///
/// A day whose midnight falls in a DST gap starts at its first valid hour.
fn start_of_day<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = day.and_time(NaiveTime::MIN);
    (0..24)
        .find_map(|hour| {
            midnight
                .checked_add_signed(chrono::Duration::hours(hour))
                .and_then(|local| tz.from_local_datetime(&local).earliest())
        })
        .map(|start| start.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}

/// Check a value is a finite percentage in [0, 100]
pub fn is_valid_percent(value: f64) -> bool {
    value.is_finite() && (0.0..=100.0).contains(&value)
}
