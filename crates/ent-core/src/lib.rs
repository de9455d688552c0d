#![deny(missing_docs)]
#![doc = "Core data model, constants and error taxonomy for battery entropy profiling."]

use std::ops::Range;

use serde::{Deserialize, Serialize};

pub mod constants;
pub mod errors;
pub mod provenance;

pub use constants::{ELECTRON_COUNT, FARADAY, KELVIN_OFFSET};
pub use errors::{EntError, ErrorInfo};
pub use provenance::{RunProvenance, SchemaVersion};

/// One row of a bench-test log expressed in canonical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Sample {
    /// Elapsed time since the start of the log (hours).
    pub elapsed_time_h: f64,
    /// Cell current (A). Zero marks the relaxation part of a SOC.
    pub current_a: f64,
    /// Cell voltage (V).
    pub voltage_v: f64,
    /// Thermocouple temperature (°C).
    pub temperature_c: f64,
    /// Accumulated capacity (Ah).
    pub capacity_ah: f64,
    /// Loop counter, incremented once per SOC.
    pub cycle_count: i64,
    /// Step counter compared against `cycle_count` to locate SOC boundaries.
    pub cyc_count: i64,
    /// Step-state flag; zero marks the first row of a temperature step.
    pub plateau_marker: i64,
}

impl Sample {
    /// Temperature of the sample in kelvin.
    pub fn temperature_k(&self) -> f64 {
        self.temperature_c + KELVIN_OFFSET
    }

    /// Returns true when no current flows through the cell.
    pub fn is_relaxing(&self) -> bool {
        self.current_a == 0.0
    }
}

/// Time-ordered sequence of samples loaded from a bench-test device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RawLog {
    samples: Vec<Sample>,
}

impl RawLog {
    /// Wraps the provided samples without validation.
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Wraps the provided samples, rejecting logs whose time column decreases.
    pub fn from_ordered(samples: Vec<Sample>) -> Result<Self, EntError> {
        let log = Self::new(samples);
        log.validate_time_order()?;
        Ok(log)
    }

    /// Checks that `elapsed_time_h` never decreases.
    pub fn validate_time_order(&self) -> Result<(), EntError> {
        for (idx, pair) in self.samples.windows(2).enumerate() {
            if pair[1].elapsed_time_h < pair[0].elapsed_time_h {
                return Err(EntError::Config(
                    ErrorInfo::new("raw_log.unordered", "samples are not time-ordered")
                        .with_context("row", idx + 1)
                        .with_context("previous_h", pair[0].elapsed_time_h)
                        .with_context("current_h", pair[1].elapsed_time_h),
                ));
            }
        }
        Ok(())
    }

    /// Number of samples in the log.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true when the log holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Borrow the underlying samples.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Consumes the log and returns its samples.
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    /// Copies a contiguous row range into a new log.
    pub fn slice(&self, range: Range<usize>) -> RawLog {
        RawLog::new(self.samples[range].to_vec())
    }

    /// Last sample of the log, if any.
    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Elapsed time column (hours).
    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.elapsed_time_h).collect()
    }

    /// Voltage column (V).
    pub fn voltages(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.voltage_v).collect()
    }

    /// Capacity span `max - min` (Ah), `None` for an empty log.
    pub fn capacity_span(&self) -> Option<f64> {
        let max = self.max_capacity()?;
        let min = self
            .samples
            .iter()
            .map(|s| s.capacity_ah)
            .fold(f64::INFINITY, f64::min);
        Some(max - min)
    }

    /// Maximum capacity reached in the log (Ah), `None` for an empty log.
    pub fn max_capacity(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(
            self.samples
                .iter()
                .map(|s| s.capacity_ah)
                .fold(f64::NEG_INFINITY, f64::max),
        )
    }

    /// `cycle_count` of the final row; this is the number of SOCs in an entropy log.
    pub fn final_cycle_count(&self) -> Option<i64> {
        self.samples.last().map(|s| s.cycle_count)
    }
}

impl FromIterator<Sample> for RawLog {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        RawLog::new(iter.into_iter().collect())
    }
}

/// Direction of the SOC sweep recorded in an entropy log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    /// Cell is charged between SOCs.
    #[default]
    Charge,
    /// Cell is discharged between SOCs.
    Discharge,
}

impl TestType {
    /// Label used in experiment titles.
    pub fn label(&self) -> &'static str {
        match self {
            TestType::Charge => "Charge",
            TestType::Discharge => "Discharge",
        }
    }

    /// State of charge reached after accumulating `capacity` out of `max_capacity`.
    pub fn state_of_charge(&self, capacity: f64, max_capacity: f64) -> f64 {
        let fraction = capacity / max_capacity;
        match self {
            TestType::Charge => fraction,
            TestType::Discharge => 1.0 - fraction,
        }
    }
}
