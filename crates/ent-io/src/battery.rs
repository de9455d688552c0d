use ent_core::{EntError, ErrorInfo};
use ent_fit::stat::{linear_regression, mean, sample_std, LinearRegression};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::BatterySpec;
use crate::impedance::{load_spectrum, resistances, Impedance};
use crate::parser::{load_log, LoadOptions};

fn missing_file(code: &str, battery: &str) -> EntError {
    EntError::Config(
        ErrorInfo::new(code, "battery has no file configured for this measurement")
            .with_context("battery", battery),
    )
}

/// Capacity measured in the battery's reference performance test (Ah).
pub fn rpt_capacity(battery: &BatterySpec) -> Result<f64, EntError> {
    let path = battery
        .rpt_file
        .as_ref()
        .ok_or_else(|| missing_file("battery.no_rpt", &battery.name))?;
    let opts = LoadOptions {
        format: battery.rpt_format,
        ..LoadOptions::default()
    };
    let log = load_log(path, &opts)?;
    let capacity = log.capacity_span().ok_or_else(|| {
        EntError::InsufficientData(
            ErrorInfo::new("battery.empty_rpt", "RPT log holds no samples")
                .with_context("battery", &battery.name),
        )
    })?;
    debug!(battery = %battery.name, capacity, "RPT capacity");
    Ok(capacity)
}

/// Characteristic resistances from the battery's EIS spectrum.
pub fn battery_impedance(battery: &BatterySpec) -> Result<Impedance, EntError> {
    let path = battery
        .impedance_file
        .as_ref()
        .ok_or_else(|| missing_file("battery.no_impedance", &battery.name))?;
    let spectrum = load_spectrum(path)?;
    resistances(&spectrum).map_err(|err| err.with_context("battery", &battery.name))
}

/// Spread of RPT capacities within a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityStats {
    /// Capacity of each cell, in group order (Ah).
    pub capacities: Vec<f64>,
    /// Sample standard deviation (ddof = 1).
    pub std_dev: f64,
    /// Mean capacity.
    pub mean: f64,
}

/// Set of cells compared together.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryGroup {
    batteries: Vec<BatterySpec>,
}

impl BatteryGroup {
    /// Groups the given cells; at least one is required.
    pub fn new(batteries: Vec<BatterySpec>) -> Result<Self, EntError> {
        if batteries.is_empty() {
            return Err(EntError::Config(ErrorInfo::new(
                "group.empty",
                "a battery group needs at least one battery",
            )));
        }
        Ok(Self { batteries })
    }

    /// Cells in the group.
    pub fn batteries(&self) -> &[BatterySpec] {
        &self.batteries
    }

    /// Cell masses (g).
    pub fn masses(&self) -> Vec<f64> {
        self.batteries.iter().map(|b| b.mass_g).collect()
    }

    /// RPT capacity of every cell.
    pub fn capacities(&self) -> Result<Vec<f64>, EntError> {
        self.batteries.iter().map(rpt_capacity).collect()
    }

    /// Capacity mean and sample standard deviation.
    pub fn capacity_stats(&self) -> Result<CapacityStats, EntError> {
        let capacities = self.capacities()?;
        Ok(capacity_stats(capacities))
    }

    /// Mean of each resistance across the group.
    pub fn mean_impedance(&self) -> Result<Impedance, EntError> {
        let values = self
            .batteries
            .iter()
            .map(battery_impedance)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(mean_impedance(&values))
    }

    /// OLS fit of cell mass against RPT capacity.
    pub fn capacity_mass_regression(&self) -> Result<LinearRegression, EntError> {
        let capacities = self.capacities()?;
        capacity_mass_regression(&capacities, &self.masses())
    }
}

/// Mean and sample standard deviation of `capacities`.
pub fn capacity_stats(capacities: Vec<f64>) -> CapacityStats {
    CapacityStats {
        std_dev: sample_std(&capacities),
        mean: mean(&capacities),
        capacities,
    }
}

/// Element-wise mean of several impedance triples.
pub fn mean_impedance(values: &[Impedance]) -> Impedance {
    let column = |f: fn(&Impedance) -> f64| mean(&values.iter().map(f).collect::<Vec<_>>());
    Impedance {
        r_hf_mohm: column(|i| i.r_hf_mohm),
        r_mf_mohm: column(|i| i.r_mf_mohm),
        r_t_mohm: column(|i| i.r_t_mohm),
    }
}

/// Regresses `masses` on `capacities`.
pub fn capacity_mass_regression(
    capacities: &[f64],
    masses: &[f64],
) -> Result<LinearRegression, EntError> {
    linear_regression(capacities, masses).ok_or_else(|| {
        EntError::InsufficientData(
            ErrorInfo::new(
                "group.regression",
                "regression needs two cells with distinct capacities",
            )
            .with_context("cells", capacities.len()),
        )
    })
}
