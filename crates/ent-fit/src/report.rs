use std::collections::BTreeMap;

use chrono::Utc;
use ent_core::{EntError, RunProvenance, SchemaVersion, TestType};
use serde::{Deserialize, Serialize};

use crate::entropy::EntropyRecord;
use crate::fit::ModelKind;
use crate::hash::stable_hash_string;
use crate::pipeline::{ExperimentRun, SkippedSoc};

/// Column names of the exported entropy table, in order.
pub const ENTROPY_TABLE_HEADER: [&str; 17] = [
    "Capacity",
    "OCV",
    "Entropy bestfit",
    "Bestfit method",
    "Entropy raw data",
    "Entropy method 1",
    "Error method 1",
    "Enthalpy method 1",
    "Entropy method 2",
    "Error method 2",
    "Enthalpy method 2",
    "Entropy method 3",
    "Error method 3",
    "Enthalpy method 3",
    "Entropy method 4",
    "Error method 4",
    "Enthalpy method 4",
];

/// Flattened entropy table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntropyRow {
    /// SOC index.
    pub soc_index: usize,
    /// State of charge derived from the capacity and the experiment's maximum capacity.
    pub state_of_charge: Option<f64>,
    /// Capacity at the end of the relaxation window (Ah).
    pub capacity_ah: f64,
    /// Reference voltage (V).
    pub reference_voltage_v: f64,
    /// Entropy of the best-fitting model.
    pub best_fit_entropy: Option<f64>,
    /// Id of the best-fitting model.
    pub best_fit: Option<u8>,
    /// Model-free entropy.
    pub raw_entropy: Option<f64>,
    /// Entropy per model, id order.
    pub entropy: [Option<f64>; 4],
    /// Entropy error per model, id order.
    pub error: [Option<f64>; 4],
    /// Enthalpy per model, id order.
    pub enthalpy: [Option<f64>; 4],
}

impl EntropyRow {
    /// Flattens a record, placing it on the state-of-charge axis when the
    /// experiment's maximum capacity is known.
    pub fn from_record(record: &EntropyRecord, test_type: TestType, max_capacity: Option<f64>) -> Self {
        let mut entropy = [None; 4];
        let mut error = [None; 4];
        let mut enthalpy = [None; 4];
        for (slot, kind) in ModelKind::ALL.iter().enumerate() {
            if let Some(outcome) = record.model(*kind) {
                entropy[slot] = outcome.entropy();
                error[slot] = outcome.error();
                enthalpy[slot] = outcome.enthalpy();
            }
        }
        let state_of_charge = max_capacity
            .filter(|max| *max != 0.0)
            .map(|max| test_type.state_of_charge(record.capacity_ah, max));
        Self {
            soc_index: record.soc_index,
            state_of_charge,
            capacity_ah: record.capacity_ah,
            reference_voltage_v: record.reference_voltage_v,
            best_fit_entropy: record.best_fit_entropy(),
            best_fit: record.best_fit.map(|kind| kind.id()),
            raw_entropy: record.raw_entropy,
            entropy,
            error,
            enthalpy,
        }
    }

    /// Cell values in [`ENTROPY_TABLE_HEADER`] order.
    pub fn values(&self) -> Vec<Option<f64>> {
        let mut values = vec![
            Some(self.capacity_ah),
            Some(self.reference_voltage_v),
            self.best_fit_entropy,
            self.best_fit.map(f64::from),
            self.raw_entropy,
        ];
        for slot in 0..4 {
            values.push(self.entropy[slot]);
            values.push(self.error[slot]);
            values.push(self.enthalpy[slot]);
        }
        values
    }
}

/// Model excluded from selection for one SOC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFailure {
    /// SOC index.
    pub soc_index: usize,
    /// Model id.
    pub model: u8,
    /// Failure that excluded the model.
    pub error: EntError,
}

/// JSON summary of an experiment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    /// Experiment title used for exported file names.
    pub title: String,
    /// Sweep direction.
    pub test_type: TestType,
    /// Maximum capacity seen in the log (Ah).
    pub max_capacity_ah: Option<f64>,
    /// Entropy table rows in SOC order.
    pub rows: Vec<EntropyRow>,
    /// SOCs that could not be analysed.
    pub skipped: Vec<SkippedSoc>,
    /// Models excluded from best-fit selection.
    pub model_failures: Vec<ModelFailure>,
    /// Provenance metadata.
    pub provenance: RunProvenance,
}

impl ExperimentReport {
    /// Assembles the report and hashes the entropy table.
    pub fn new(
        title: impl Into<String>,
        test_type: TestType,
        max_capacity_ah: Option<f64>,
        run: &ExperimentRun,
        config_hash: impl Into<String>,
    ) -> Result<Self, EntError> {
        let rows: Vec<EntropyRow> = run
            .analyses
            .iter()
            .map(|analysis| EntropyRow::from_record(&analysis.record, test_type, max_capacity_ah))
            .collect();
        let model_failures = run
            .analyses
            .iter()
            .flat_map(|analysis| {
                analysis.record.failed_models().filter_map(|outcome| {
                    outcome.failure.clone().map(|error| ModelFailure {
                        soc_index: analysis.record.soc_index,
                        model: outcome.kind.id(),
                        error,
                    })
                })
            })
            .collect();
        let table_hash = stable_hash_string(&rows)?;
        Ok(Self {
            title: title.into(),
            test_type,
            max_capacity_ah,
            rows,
            skipped: run.skipped.clone(),
            model_failures,
            provenance: provenance(config_hash.into(), table_hash),
        })
    }
}

fn provenance(config_hash: String, table_hash: String) -> RunProvenance {
    let mut versions = BTreeMap::new();
    versions.insert("ent-fit".to_string(), env!("CARGO_PKG_VERSION").to_string());
    RunProvenance {
        schema: SchemaVersion::default(),
        config_hash,
        table_hash,
        created_at: Utc::now().to_rfc3339(),
        tool_versions: versions,
    }
}
