use std::fs;
use std::path::{Path, PathBuf};

use ent_core::{EntError, ErrorInfo, TestType};
use ent_fit::{stable_hash_string, FitOpts, RunOpts};
use serde::{Deserialize, Serialize};

use crate::experiment::Experiment;
use crate::parser::LogFormat;
use crate::serde::{from_yaml_slice, io_error};

fn config_error(code: &str, message: impl Into<String>) -> EntError {
    EntError::Config(ErrorInfo::new(code, message))
}

/// Column mapping of one Basytec channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel name (for example `CH00`).
    pub name: String,
    /// Thermocouple column.
    pub temperature_column: String,
    /// Cell voltage column.
    pub voltage_column: String,
}

/// Rig an experiment was recorded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Setup {
    /// Workstation channels log millivolts.
    Workstation,
    /// Thermal-bath channels log volts.
    #[default]
    ThermalBath,
}

impl Setup {
    /// Factor converting the logged voltage column to volts.
    pub fn voltage_scale(&self) -> f64 {
        match self {
            Setup::Workstation => 1e-3,
            Setup::ThermalBath => 1.0,
        }
    }
}

/// Catalog entry for one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatterySpec {
    /// Cell name used in titles and references.
    pub name: String,
    /// Nominal capacity (mAh).
    pub nominal_capacity_mah: f64,
    /// Cell mass (g).
    pub mass_g: f64,
    /// Resistance measured with the Hioki meter (mΩ), zero when unmeasured.
    #[serde(default)]
    pub hioki_resistance_mohm: f64,
    /// Reference performance test log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpt_file: Option<PathBuf>,
    /// Format of the RPT log; sniffed when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpt_format: Option<LogFormat>,
    /// EIS spectrum (`.mpt`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impedance_file: Option<PathBuf>,
}

/// Catalog entry for one entropy experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSpec {
    /// Experiment name, the first word of the title.
    pub name: String,
    /// Sweep direction.
    pub test_type: TestType,
    /// Rig the log was recorded on.
    #[serde(default)]
    pub setup: Setup,
    /// Referenced battery name.
    pub battery: String,
    /// Referenced channel name.
    pub channel: String,
    /// Dwell time at each temperature level (minutes).
    pub time_step_min: f64,
    /// Temperature levels per SOC, reference included.
    pub number_temperature_level: usize,
    /// Reference temperature (°C).
    pub temp_ref_c: f64,
    /// Temperature programme of one SOC (°C).
    pub temperature_steps_c: Vec<f64>,
    /// Basytec log of the experiment.
    pub log_file: PathBuf,
    /// Header line override for the log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_row: Option<usize>,
}

/// Typed catalog of batteries, channels and experiments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Known cells.
    #[serde(default)]
    pub batteries: Vec<BatterySpec>,
    /// Known Basytec channel mappings.
    #[serde(default)]
    pub channels: Vec<Channel>,
    /// Known experiments.
    #[serde(default)]
    pub experiments: Vec<ExperimentSpec>,
    /// Fit settings shared by every experiment.
    #[serde(default)]
    pub fitting: FitOpts,
    /// Run settings shared by every experiment.
    #[serde(default)]
    pub run: RunOpts,
    /// Directory relative paths were resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Loads a catalog from YAML and resolves its relative paths against the
/// catalog's directory.
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Catalog, EntError> {
    let catalog_path = path.as_ref();
    let bytes = fs::read(catalog_path).map_err(|err| io_error("catalog_read", catalog_path, err))?;
    let mut catalog: Catalog = from_yaml_slice(&bytes)
        .map_err(|err| err.with_context("path", catalog_path.display()))?;
    let base_dir = catalog_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    catalog.resolve_paths(&base_dir);
    catalog.base_dir = base_dir;
    catalog.validate()?;
    Ok(catalog)
}

fn resolve(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

impl Catalog {
    fn resolve_paths(&mut self, base: &Path) {
        for battery in &mut self.batteries {
            if let Some(path) = battery.rpt_file.as_mut() {
                resolve(base, path);
            }
            if let Some(path) = battery.impedance_file.as_mut() {
                resolve(base, path);
            }
        }
        for experiment in &mut self.experiments {
            resolve(base, &mut experiment.log_file);
        }
    }

    /// Checks name uniqueness, experiment references and fit settings.
    pub fn validate(&self) -> Result<(), EntError> {
        let mut names: Vec<(&str, &str)> = Vec::new();
        names.extend(self.batteries.iter().map(|b| ("battery", b.name.as_str())));
        names.extend(self.channels.iter().map(|c| ("channel", c.name.as_str())));
        names.extend(self.experiments.iter().map(|e| ("experiment", e.name.as_str())));
        for (idx, (kind, name)) in names.iter().enumerate() {
            if names[..idx].contains(&(*kind, *name)) {
                return Err(config_error("catalog.duplicate", "duplicate catalog entry")
                    .with_context("kind", kind)
                    .with_context("name", name));
            }
        }
        for experiment in &self.experiments {
            self.battery(&experiment.battery)
                .map_err(|err| err.with_context("experiment", &experiment.name))?;
            self.channel(&experiment.channel)
                .map_err(|err| err.with_context("experiment", &experiment.name))?;
            if experiment.number_temperature_level < 2 {
                return Err(config_error(
                    "catalog.level_count",
                    "an experiment needs at least two temperature levels",
                )
                .with_context("experiment", &experiment.name));
            }
        }
        self.fitting.validate()
    }

    /// Battery named `name`.
    pub fn battery(&self, name: &str) -> Result<&BatterySpec, EntError> {
        self.batteries
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| config_error("catalog.unknown_battery", "unknown battery").with_context("name", name))
    }

    /// Channel named `name`.
    pub fn channel(&self, name: &str) -> Result<&Channel, EntError> {
        self.channels
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| config_error("catalog.unknown_channel", "unknown channel").with_context("name", name))
    }

    /// Experiment named `name` with its battery and channel resolved.
    pub fn experiment(&self, name: &str) -> Result<Experiment, EntError> {
        let spec = self
            .experiments
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| {
                config_error("catalog.unknown_experiment", "unknown experiment")
                    .with_context("name", name)
            })?;
        Ok(Experiment {
            spec: spec.clone(),
            battery: self.battery(&spec.battery)?.clone(),
            channel: self.channel(&spec.channel)?.clone(),
        })
    }

    /// Batteries named in `names`, in the given order.
    pub fn batteries_named(&self, names: &[String]) -> Result<Vec<BatterySpec>, EntError> {
        names.iter().map(|name| self.battery(name).cloned()).collect()
    }

    /// Stable hash of the catalog contents.
    pub fn config_hash(&self) -> Result<String, EntError> {
        stable_hash_string(self)
    }
}
