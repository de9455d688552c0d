use ent_core::{EntError, RawLog};
use ent_fit::{run_experiment, stable_hash_string, ExperimentReport, ExperimentRun, FitOpts, RunOpts};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{BatterySpec, Channel, ExperimentSpec};
use crate::parser::{LoadOptions, LogFormat};

/// Experiment resolved from the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    /// Catalog entry.
    pub spec: ExperimentSpec,
    /// Cell under test.
    pub battery: BatterySpec,
    /// Channel the cell was wired to.
    pub channel: Channel,
}

/// One point of the programmed temperature profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfilePoint {
    /// Time since the start of the experiment (h).
    pub time_h: f64,
    /// Programmed temperature (°C).
    pub temperature_c: f64,
}

/// Analysis of one experiment, ready for export.
#[derive(Debug, Clone)]
pub struct ExperimentOutcome {
    /// Per-SOC results.
    pub run: ExperimentRun,
    /// JSON report including the entropy table.
    pub report: ExperimentReport,
}

impl Experiment {
    /// `"{name} {Charge|Discharge}_{battery} ({time_step}min_{temp_ref}C)"`.
    pub fn title(&self) -> String {
        format!(
            "{} {}_{} ({}min_{}C)",
            self.spec.name,
            self.spec.test_type.label(),
            self.battery.name,
            self.spec.time_step_min,
            self.spec.temp_ref_c
        )
    }

    /// Options for reading the experiment's Basytec log.
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            format: Some(LogFormat::Basytec),
            header_row: self.spec.header_row,
            channel: Some(self.channel.clone()),
            setup: self.spec.setup,
        }
    }

    /// Reads the experiment log.
    pub fn load_log(&self) -> Result<RawLog, EntError> {
        crate::parser::load_log(&self.spec.log_file, &self.load_options())
    }

    /// Programmed temperature profile: two points per temperature step for
    /// every SOC in `log`.
    pub fn expected_temperature_profile(&self, log: &RawLog) -> Vec<ProfilePoint> {
        let soc_count = log.final_cycle_count().unwrap_or(0).max(0) as usize;
        let step_h = self.spec.time_step_min / 60.0;
        let mut points = Vec::with_capacity(soc_count * self.spec.temperature_steps_c.len() * 2);
        let mut start = 0.0;
        for _ in 0..soc_count {
            for temperature_c in &self.spec.temperature_steps_c {
                points.push(ProfilePoint {
                    time_h: start,
                    temperature_c: *temperature_c,
                });
                start += step_h;
                points.push(ProfilePoint {
                    time_h: start,
                    temperature_c: *temperature_c,
                });
            }
        }
        points
    }

    /// Runs the entropy pipeline on an already loaded log.
    pub fn analyze_log(
        &self,
        log: &RawLog,
        fit: &FitOpts,
        opts: &RunOpts,
    ) -> Result<ExperimentOutcome, EntError> {
        let title = self.title();
        info!(experiment = %title, "starting entropy analysis");
        let run = run_experiment(log, self.spec.number_temperature_level, fit, opts)
            .map_err(|err| err.with_context("experiment", &self.spec.name))?;
        let config_hash = stable_hash_string(&(&self.spec, fit))?;
        let report = ExperimentReport::new(
            title,
            self.spec.test_type,
            max_capacity(log),
            &run,
            config_hash,
        )?;
        Ok(ExperimentOutcome { run, report })
    }

    /// Loads the log and runs the entropy pipeline.
    pub fn analyze(&self, fit: &FitOpts, opts: &RunOpts) -> Result<ExperimentOutcome, EntError> {
        let log = self.load_log()?;
        self.analyze_log(&log, fit, opts)
    }
}

/// Maximum capacity reached in the experiment (Ah).
pub fn max_capacity(log: &RawLog) -> Option<f64> {
    log.max_capacity()
}
