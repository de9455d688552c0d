use ent_core::{EntError, ErrorInfo, RawLog};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::entropy::{estimate_model, raw_data_entropy, EntropyRecord, ModelOutcome};
use crate::fit::{build_fit_dataset, fit_model, FitOpts, ModelFit, ModelKind};
use crate::plateau::{locate_plateaus, plateau_levels, PlateauLayout, PlateauLevels, RelaxationWindow};
use crate::segment::{segment_socs, SocWindow};

fn pool_error(err: impl ToString) -> EntError {
    EntError::Config(ErrorInfo::new("pipeline.thread_pool", err.to_string()))
}

fn default_concurrency() -> usize {
    1
}

/// Options governing an experiment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOpts {
    /// Worker threads used to analyse SOCs in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Write one CSV per SOC window next to the entropy table.
    #[serde(default)]
    pub export_soc_windows: bool,
}

impl Default for RunOpts {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            export_soc_windows: false,
        }
    }
}

/// Everything computed for one SOC.
#[derive(Debug, Clone, PartialEq)]
pub struct SocAnalysis {
    /// Source rows of the SOC.
    pub window: SocWindow,
    /// Zero-current rows the models were fitted on.
    pub relaxation: RelaxationWindow,
    /// Plateau boundaries within the relaxation window.
    pub layout: PlateauLayout,
    /// Plateau temperatures, voltages and offsets.
    pub levels: PlateauLevels,
    /// Fitted models in id order; `None` where the model failed.
    pub fits: Vec<Option<ModelFit>>,
    /// Entropy table row.
    pub record: EntropyRecord,
}

impl SocAnalysis {
    /// Fit of `kind`, if it succeeded.
    pub fn fit(&self, kind: ModelKind) -> Option<&ModelFit> {
        self.fits
            .iter()
            .flatten()
            .find(|fit| fit.kind == kind)
    }
}

/// Runs plateau location, the four model fits and the estimates for one SOC.
///
/// Model failures are recorded in the returned record; only failures that
/// leave no plateaus to work with are returned as errors.
pub fn analyze_soc(
    window: &SocWindow,
    level_count: usize,
    opts: &FitOpts,
) -> Result<SocAnalysis, EntError> {
    let relaxation = RelaxationWindow::from_soc(window);
    let last = relaxation.rows.last().copied().ok_or_else(|| {
        EntError::InsufficientData(
            ErrorInfo::new("soc.no_relaxation", "SOC has no zero-current rows")
                .with_context("soc", window.index),
        )
    })?;
    let layout = locate_plateaus(&relaxation, level_count)?;
    let levels = plateau_levels(&relaxation, &layout, opts)?;
    let capacity_ah = last.capacity_ah.abs();
    let reference_voltage_v = last.voltage_v;
    let dataset = build_fit_dataset(&relaxation, &layout, opts);

    let mut fits = Vec::with_capacity(ModelKind::ALL.len());
    let mut outcomes = Vec::with_capacity(ModelKind::ALL.len());
    for kind in ModelKind::ALL {
        let attempt = dataset
            .as_ref()
            .map_err(Clone::clone)
            .and_then(|dataset| fit_model(kind, &relaxation, &layout, dataset, opts))
            .and_then(|fit| {
                let estimate = estimate_model(&fit, &levels, reference_voltage_v, opts)?;
                Ok((fit, estimate))
            });
        match attempt {
            Ok((fit, estimate)) => {
                outcomes.push(ModelOutcome::success(&fit, estimate));
                fits.push(Some(fit));
            }
            Err(err) => {
                let err = err.with_context("soc", window.index);
                warn!(soc = window.index, model = kind.id(), error = %err, "model excluded");
                outcomes.push(ModelOutcome::failed(kind, err));
                fits.push(None);
            }
        }
    }

    let record = EntropyRecord::new(
        window.index,
        capacity_ah,
        reference_voltage_v,
        levels.reference_temperature(),
        raw_data_entropy(&levels),
        outcomes,
    );
    info!(
        soc = window.index,
        best_fit = ?record.best_fit.map(|kind| kind.id()),
        entropy = ?record.best_fit_entropy(),
        "SOC analysed"
    );
    Ok(SocAnalysis {
        window: window.clone(),
        relaxation,
        layout,
        levels,
        fits,
        record,
    })
}

/// SOC that could not be analysed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSoc {
    /// SOC index.
    pub soc_index: usize,
    /// Failure that stopped the analysis.
    pub error: EntError,
}

/// Result of analysing every SOC of an experiment log.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExperimentRun {
    /// Successfully analysed SOCs, in SOC order.
    pub analyses: Vec<SocAnalysis>,
    /// SOCs that were skipped, in SOC order.
    pub skipped: Vec<SkippedSoc>,
}

impl ExperimentRun {
    /// Entropy table rows in SOC order.
    pub fn records(&self) -> Vec<EntropyRecord> {
        self.analyses.iter().map(|a| a.record.clone()).collect()
    }

    /// Number of SOCs found by segmentation.
    pub fn soc_count(&self) -> usize {
        self.analyses.len() + self.skipped.len()
    }
}

/// Segments `log` and analyses every SOC.
///
/// Segmentation failures abort the run. Per-SOC failures are logged and
/// collected in [`ExperimentRun::skipped`]. Results are merged in SOC order
/// whatever the worker count.
pub fn run_experiment(
    log: &RawLog,
    level_count: usize,
    fit: &FitOpts,
    opts: &RunOpts,
) -> Result<ExperimentRun, EntError> {
    fit.validate()?;
    let windows = segment_socs(log)?;
    info!(
        rows = log.len(),
        socs = windows.len(),
        workers = opts.concurrency.max(1),
        "analysing experiment"
    );
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.concurrency.max(1))
        .build()
        .map_err(pool_error)?;

    let mut ordered: Vec<(usize, Result<SocAnalysis, EntError>)> = pool.install(|| {
        windows
            .par_iter()
            .enumerate()
            .map(|(index, window)| (index, analyze_soc(window, level_count, fit)))
            .collect()
    });
    ordered.sort_by_key(|(index, _)| *index);

    let mut run = ExperimentRun::default();
    for (index, result) in ordered {
        match result {
            Ok(analysis) => run.analyses.push(analysis),
            Err(error) => {
                warn!(soc = index, error = %error, "skipping SOC");
                run.skipped.push(SkippedSoc {
                    soc_index: index,
                    error,
                });
            }
        }
    }
    info!(
        analysed = run.analyses.len(),
        skipped = run.skipped.len(),
        "experiment complete"
    );
    Ok(run)
}
