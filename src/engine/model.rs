use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// One raw telemetry reading for a compressor line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: DateTime<Utc>,
    pub current: f64,
    #[serde(default)]
    pub voltage: Option<f64>,
}

impl Sample {
    pub fn new(time: DateTime<Utc>, current: f64) -> Self {
        Self {
            time,
            current,
            voltage: None,
        }
    }

    pub fn with_voltage(mut self, voltage: f64) -> Self {
        self.voltage = Some(voltage);
        self
    }
}

/// Per-compressor thresholds and nameplate data. Immutable for the duration
/// of one rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressorProfile {
    pub id: i64,
    pub line: i32,
    pub alias: Option<String>,
    pub serial: Option<String>,
    pub voltage: Option<f64>,
    pub nominal_hp: f64,
    pub load_threshold_amp: f64,
    pub noload_threshold_amp: f64,
    pub hysteresis_band_amp: f64,
}

impl CompressorProfile {
    /// Rejects thresholds that would silently misclassify samples.
    pub fn validate(&self) -> Result<()> {
        let label = format!("compressor {} line {}", self.id, self.line);
        let all_finite = [
            self.nominal_hp,
            self.load_threshold_amp,
            self.noload_threshold_amp,
            self.hysteresis_band_amp,
        ]
        .iter()
        .all(|v| v.is_finite());

        if !all_finite {
            return Err(AppError::Config(format!(
                "{label}: thresholds and nominal HP must be finite numbers"
            )));
        }
        if self.noload_threshold_amp < 0.0 {
            return Err(AppError::Config(format!(
                "{label}: no-load threshold {} A is negative",
                self.noload_threshold_amp
            )));
        }
        if self.load_threshold_amp <= self.noload_threshold_amp {
            return Err(AppError::Config(format!(
                "{label}: load threshold {} A must exceed no-load threshold {} A",
                self.load_threshold_amp, self.noload_threshold_amp
            )));
        }
        if self.hysteresis_band_amp < 0.0 {
            return Err(AppError::Config(format!(
                "{label}: hysteresis band {} A is negative",
                self.hysteresis_band_amp
            )));
        }
        if self.nominal_hp < 0.0 {
            return Err(AppError::Config(format!(
                "{label}: nominal HP {} is negative",
                self.nominal_hp
            )));
        }
        Ok(())
    }
}

/// Billing-relevant part of a client record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: i64,
    pub name: String,
    pub rate_usd_per_kwh: Option<f64>,
    /// Whether the UI should blur raw kWh figures. Passed through untouched.
    #[serde(default)]
    pub mask_energy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingState {
    Load,
    NoLoad,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassifiedSample {
    pub time: DateTime<Utc>,
    pub state: OperatingState,
}

/// One chart point. `avg_value` is `None` for a window with no samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalBucket {
    pub bucket_start: DateTime<Utc>,
    pub avg_value: Option<f64>,
    pub sample_count: usize,
}

impl IntervalBucket {
    pub fn empty(bucket_start: DateTime<Utc>) -> Self {
        Self {
            bucket_start,
            avg_value: None,
            sample_count: 0,
        }
    }
}

/// Which sample field a chart series averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    #[default]
    Current,
    Voltage,
}

impl Measurement {
    pub fn value_of(self, sample: &Sample) -> Option<f64> {
        match self {
            Measurement::Current => Some(sample.current),
            Measurement::Voltage => sample.voltage,
        }
    }
}

impl std::str::FromStr for Measurement {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "current" => Ok(Measurement::Current),
            "voltage" => Ok(Measurement::Voltage),
            other => Err(AppError::InvalidInput(format!(
                "unknown measurement '{}', expected 'current' or 'voltage'",
                other
            ))),
        }
    }
}

/// Round half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
