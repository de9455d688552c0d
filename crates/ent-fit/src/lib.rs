#![deny(missing_docs)]
#![doc = "SOC segmentation, relaxation-voltage fitting and entropy/enthalpy estimation."]

/// Entropy and enthalpy estimation from fitted models.
pub mod entropy;
/// Relaxation-voltage models, fit datasets and MSE scoring.
pub mod fit;
/// Canonical hashing helpers.
pub mod hash;
/// Least-squares solvers backing the relaxation-voltage models.
pub mod lsq;
/// Per-SOC analysis and the experiment-level driver.
pub mod pipeline;
/// Relaxation filtering and temperature plateau location.
pub mod plateau;
/// Entropy table rows and the experiment report.
pub mod report;
/// SOC segmentation of raw logs.
pub mod segment;
/// Statistical helpers.
pub mod stat;

pub use entropy::{
    enthalpy, estimate_model, raw_data_entropy, select_best_fit, EntropyRecord, ModelEstimate,
    ModelOutcome,
};
pub use fit::{build_fit_dataset, fit_model, mean_squared_error, FitDataset, FitOpts, ModelFit, ModelKind};
pub use hash::{stable_hash_string, to_canonical_json_bytes};
pub use pipeline::{analyze_soc, run_experiment, ExperimentRun, RunOpts, SkippedSoc, SocAnalysis};
pub use plateau::{
    filter_relaxation, locate_plateaus, plateau_levels, PlateauLayout, PlateauLevels, PlateauSpan,
    RelaxationWindow, TemperaturePlateau,
};
pub use report::{EntropyRow, ExperimentReport, ModelFailure, ENTROPY_TABLE_HEADER};
pub use segment::{find_boundaries, segment_socs, SocWindow};
