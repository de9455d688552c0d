use ent_core::{EntError, ErrorInfo};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::lsq::{levenberg_marquardt, polyfit, polyval, CurveModel, SolverOpts};
use crate::plateau::{PlateauLayout, PlateauSpan, RelaxationWindow};
use crate::stat::percentile_index;

fn fit_error(code: &str, message: impl Into<String>) -> EntError {
    EntError::DegenerateFit(ErrorInfo::new(code, message))
}

fn default_max_evaluations() -> usize {
    800_000
}

fn default_x_tolerance() -> f64 {
    1e-10
}

fn default_head_start() -> f64 {
    0.5
}

fn default_head_end() -> f64 {
    0.9
}

fn default_tail_start() -> f64 {
    0.5
}

fn default_mse_start() -> f64 {
    0.4
}

fn default_mse_end() -> f64 {
    0.9
}

fn default_plateau_fraction() -> f64 {
    0.9
}

fn default_plateau_width() -> usize {
    6
}

/// Windowing and solver settings shared by every relaxation fit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FitOpts {
    /// Sweep budget for the nonlinear models.
    #[serde(default = "default_max_evaluations")]
    pub max_evaluations: usize,
    /// Relative step tolerance for the nonlinear models.
    #[serde(default = "default_x_tolerance")]
    pub x_tolerance: f64,
    /// Start of the reference-plateau cut, as a fraction of its length.
    #[serde(default = "default_head_start")]
    pub head_start: f64,
    /// End (exclusive) of the reference-plateau cut.
    #[serde(default = "default_head_end")]
    pub head_end: f64,
    /// Start of the reference-tail cut; the cut runs to the final sample.
    #[serde(default = "default_tail_start")]
    pub tail_start: f64,
    /// Start of the per-plateau residual window used for the MSE.
    #[serde(default = "default_mse_start")]
    pub mse_start: f64,
    /// End (exclusive) of the per-plateau residual window used for the MSE.
    #[serde(default = "default_mse_end")]
    pub mse_end: f64,
    /// Position of the trailing average within each plateau.
    #[serde(default = "default_plateau_fraction")]
    pub plateau_fraction: f64,
    /// Number of samples in the trailing average.
    #[serde(default = "default_plateau_width")]
    pub plateau_width: usize,
}

impl Default for FitOpts {
    fn default() -> Self {
        Self {
            max_evaluations: default_max_evaluations(),
            x_tolerance: default_x_tolerance(),
            head_start: default_head_start(),
            head_end: default_head_end(),
            tail_start: default_tail_start(),
            mse_start: default_mse_start(),
            mse_end: default_mse_end(),
            plateau_fraction: default_plateau_fraction(),
            plateau_width: default_plateau_width(),
        }
    }
}

impl FitOpts {
    /// Checks that every window fraction lies in `[0, 1]` and is ordered.
    pub fn validate(&self) -> Result<(), EntError> {
        let windows = [
            ("head", self.head_start, self.head_end),
            ("tail", self.tail_start, 1.0),
            ("mse", self.mse_start, self.mse_end),
            ("plateau", 0.0, self.plateau_fraction),
        ];
        for (name, start, end) in windows {
            if !(0.0..=1.0).contains(&start) || !(0.0..=1.0).contains(&end) || start >= end {
                return Err(EntError::Config(
                    ErrorInfo::new("fit_opts.window", "fit window fractions are out of order")
                        .with_context("window", name)
                        .with_context("start", start)
                        .with_context("end", end),
                ));
            }
        }
        if self.plateau_width == 0 || self.max_evaluations == 0 {
            return Err(EntError::Config(ErrorInfo::new(
                "fit_opts.zero",
                "plateau_width and max_evaluations must be positive",
            )));
        }
        Ok(())
    }

    fn solver(&self) -> SolverOpts {
        SolverOpts {
            max_evaluations: self.max_evaluations,
            x_tolerance: self.x_tolerance,
        }
    }
}

/// The four candidate relaxation-voltage models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// `V = a + b·ln(t)`
    LogLinear,
    /// `V = a·exp(-b·t) + c`
    Exponential,
    /// `V = a·ln(t)² + b·ln(t) + c`
    LogQuadratic,
    /// `V = a·t/(b + t) + c`
    Hyperbolic,
}

impl ModelKind {
    /// Every model in id order.
    pub const ALL: [ModelKind; 4] = [
        ModelKind::LogLinear,
        ModelKind::Exponential,
        ModelKind::LogQuadratic,
        ModelKind::Hyperbolic,
    ];

    /// One-based model id used in exported tables.
    pub fn id(&self) -> u8 {
        match self {
            ModelKind::LogLinear => 1,
            ModelKind::Exponential => 2,
            ModelKind::LogQuadratic => 3,
            ModelKind::Hyperbolic => 4,
        }
    }

    /// Model for a one-based id.
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(usize::from(id).checked_sub(1)?).copied()
    }

    /// Number of fitted coefficients.
    pub fn parameter_count(&self) -> usize {
        match self {
            ModelKind::LogLinear => 2,
            _ => 3,
        }
    }

    fn uses_log_time(&self) -> bool {
        matches!(self, ModelKind::LogLinear | ModelKind::LogQuadratic)
    }

    /// Predicted voltage at `t` for coefficients `[a, b, (c)]`.
    pub fn evaluate(&self, coefficients: &[f64], t: f64) -> f64 {
        match self {
            ModelKind::LogLinear => polyval(coefficients, t.ln()),
            ModelKind::Exponential => ExponentialDecay.value(t, coefficients),
            ModelKind::LogQuadratic => {
                polyval(&[coefficients[2], coefficients[1], coefficients[0]], t.ln())
            }
            ModelKind::Hyperbolic => HyperbolicRise.value(t, coefficients),
        }
    }
}

struct ExponentialDecay;

impl CurveModel for ExponentialDecay {
    fn parameter_count(&self) -> usize {
        3
    }

    fn value(&self, t: f64, p: &[f64]) -> f64 {
        p[0] * (-p[1] * t).exp() + p[2]
    }

    fn gradient(&self, t: f64, p: &[f64], out: &mut [f64]) {
        let decay = (-p[1] * t).exp();
        out[0] = decay;
        out[1] = -p[0] * t * decay;
        out[2] = 1.0;
    }
}

struct HyperbolicRise;

impl CurveModel for HyperbolicRise {
    fn parameter_count(&self) -> usize {
        3
    }

    fn value(&self, t: f64, p: &[f64]) -> f64 {
        p[0] * t / (p[1] + t) + p[2]
    }

    fn gradient(&self, t: f64, p: &[f64], out: &mut [f64]) {
        let denom = p[1] + t;
        out[0] = t / denom;
        out[1] = -p[0] * t / (denom * denom);
        out[2] = 1.0;
    }
}

/// Time/voltage points the models are fitted against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitDataset {
    /// Elapsed time (h).
    pub time_h: Vec<f64>,
    /// Voltage (V).
    pub voltage_v: Vec<f64>,
}

impl FitDataset {
    /// Number of points.
    pub fn len(&self) -> usize {
        self.time_h.len()
    }

    /// Returns true when no points were selected.
    pub fn is_empty(&self) -> bool {
        self.time_h.is_empty()
    }
}

fn cut(span: PlateauSpan, start: f64, end: f64) -> std::ops::Range<usize> {
    let len = span.len();
    span.start + percentile_index(len, start)..span.start + percentile_index(len, end)
}

/// Concatenates the late part of the reference plateau with the late part of
/// the reference tail.
pub fn build_fit_dataset(
    relax: &RelaxationWindow,
    layout: &PlateauLayout,
    opts: &FitOpts,
) -> Result<FitDataset, EntError> {
    let head = layout
        .plateaus
        .first()
        .copied()
        .ok_or_else(|| fit_error("dataset.no_plateau", "layout holds no plateaus"))?;
    let samples = relax.rows.samples();
    let ranges = [
        cut(head, opts.head_start, opts.head_end),
        cut(layout.reference_tail, opts.tail_start, 1.0),
    ];
    let mut dataset = FitDataset {
        time_h: Vec::new(),
        voltage_v: Vec::new(),
    };
    for range in ranges {
        for sample in &samples[range] {
            dataset.time_h.push(sample.elapsed_time_h);
            dataset.voltage_v.push(sample.voltage_v);
        }
    }
    if dataset.is_empty() {
        return Err(fit_error("dataset.empty", "reference cuts selected no samples")
            .with_context("soc", relax.soc_index));
    }
    Ok(dataset)
}

/// Solves for the coefficients of `kind` against `dataset`.
pub fn fit_coefficients(
    kind: ModelKind,
    dataset: &FitDataset,
    opts: &FitOpts,
) -> Result<(Vec<f64>, usize), EntError> {
    if dataset.len() < kind.parameter_count() {
        return Err(fit_error("fit.points", "fewer fit points than parameters")
            .with_context("model", kind.id())
            .with_context("points", dataset.len()));
    }
    if kind.uses_log_time() {
        if let Some(t) = dataset.time_h.iter().find(|t| **t <= 0.0) {
            return Err(fit_error("fit.log_time", "logarithmic model needs positive times")
                .with_context("model", kind.id())
                .with_context("time_h", t));
        }
    }
    let first_t = dataset.time_h[0];
    let last_t = dataset.time_h[dataset.len() - 1];
    let first_v = dataset.voltage_v[0];
    let last_v = dataset.voltage_v[dataset.len() - 1];

    match kind {
        ModelKind::LogLinear | ModelKind::LogQuadratic => {
            let ln_t: Vec<f64> = dataset.time_h.iter().map(|t| t.ln()).collect();
            let mut coefficients = polyfit(&ln_t, &dataset.voltage_v, kind.parameter_count() - 1)?;
            // polyfit is ascending; keep [a, b, c] as written in the model form
            if kind == ModelKind::LogQuadratic {
                coefficients.reverse();
            }
            Ok((coefficients, 1))
        }
        ModelKind::Exponential => {
            let initial = [first_v - last_v, 2.3 / last_t, last_v];
            solve_nonlinear(kind, &ExponentialDecay, dataset, &initial, opts)
        }
        ModelKind::Hyperbolic => {
            let initial = [last_v, first_t, first_v];
            solve_nonlinear(kind, &HyperbolicRise, dataset, &initial, opts)
        }
    }
}

fn solve_nonlinear(
    kind: ModelKind,
    model: &dyn CurveModel,
    dataset: &FitDataset,
    initial: &[f64],
    opts: &FitOpts,
) -> Result<(Vec<f64>, usize), EntError> {
    if initial.iter().any(|v| !v.is_finite()) {
        return Err(fit_error("fit.initial_guess", "initial guess is not finite")
            .with_context("model", kind.id()));
    }
    let report = levenberg_marquardt(
        model,
        &dataset.time_h,
        &dataset.voltage_v,
        initial,
        &opts.solver(),
    )
    .map_err(|err| err.with_context("model", kind.id()))?;
    Ok((report.parameters, report.evaluations))
}

/// One fitted model evaluated over a whole relaxation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFit {
    /// Model that was fitted.
    pub kind: ModelKind,
    /// Coefficients `[a, b, (c)]`.
    pub coefficients: Vec<f64>,
    /// Predicted voltage at every relaxation sample.
    pub predicted: Vec<f64>,
    /// Raw minus predicted voltage at every relaxation sample.
    pub residual: Vec<f64>,
    /// Degrees-of-freedom normalised residual error over the plateau windows.
    pub mse: f64,
    /// Model sweeps spent by the solver (1 for closed-form fits).
    pub evaluations: usize,
}

/// Fits `kind`, predicts the full relaxation series and scores the fit.
pub fn fit_model(
    kind: ModelKind,
    relax: &RelaxationWindow,
    layout: &PlateauLayout,
    dataset: &FitDataset,
    opts: &FitOpts,
) -> Result<ModelFit, EntError> {
    let (coefficients, evaluations) = fit_coefficients(kind, dataset, opts)?;
    let predicted: Vec<f64> = relax
        .rows
        .samples()
        .iter()
        .map(|s| kind.evaluate(&coefficients, s.elapsed_time_h))
        .collect();
    let residual: Vec<f64> = relax
        .rows
        .samples()
        .iter()
        .zip(predicted.iter())
        .map(|(s, p)| s.voltage_v - p)
        .collect();
    let mse = mean_squared_error(&residual, &layout.plateaus, kind.parameter_count(), opts)
        .map_err(|err| err.with_context("model", kind.id()))?;
    if !mse.is_finite() {
        return Err(EntError::FitDivergence(
            ErrorInfo::new("fit.non_finite_mse", "model prediction is not finite on the plateaus")
                .with_context("model", kind.id())
                .with_context("soc", relax.soc_index),
        ));
    }
    debug!(
        soc = relax.soc_index,
        model = kind.id(),
        mse,
        evaluations,
        "model fitted"
    );
    Ok(ModelFit {
        kind,
        coefficients,
        predicted,
        residual,
        mse,
        evaluations,
    })
}

/// `Σr² / (n - p)` over the `[mse_start, mse_end)` window of every plateau.
pub fn mean_squared_error(
    residual: &[f64],
    plateaus: &[PlateauSpan],
    parameter_count: usize,
    opts: &FitOpts,
) -> Result<f64, EntError> {
    let mut total = 0.0;
    let mut points = 0usize;
    for span in plateaus {
        let range = cut(*span, opts.mse_start, opts.mse_end);
        points += range.len();
        total += residual[range].iter().map(|r| r * r).sum::<f64>();
    }
    if points <= parameter_count {
        return Err(fit_error("mse.degrees_of_freedom", "too few residual points for the model")
            .with_context("points", points)
            .with_context("parameters", parameter_count));
    }
    Ok(total / (points - parameter_count) as f64)
}
