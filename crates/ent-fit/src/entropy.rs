use ent_core::{EntError, ErrorInfo, ELECTRON_COUNT, FARADAY};
use serde::{Deserialize, Serialize};

use crate::fit::{FitOpts, ModelFit, ModelKind};
use crate::plateau::{trailing_mean, PlateauLevels};
use crate::stat::{linear_regression, mean, population_std};

/// Entropy and enthalpy derived from one fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEstimate {
    /// Model the estimate was derived from.
    pub kind: ModelKind,
    /// Trailing-mean residual at every plateau (V).
    pub residual_at_plateau: Vec<f64>,
    /// `-nF·residual_k/ΔT_k` for every non-reference plateau (J/mol/K).
    pub entropy_per_level: Vec<f64>,
    /// Mean of `entropy_per_level` (J/mol/K).
    pub entropy: f64,
    /// Population standard deviation of `entropy_per_level`.
    pub error: f64,
    /// `entropy·T_ref - nF·V_ref` (J/mol).
    pub enthalpy: f64,
}

/// Derives the entropy coefficient implied by `fit` at each plateau.
pub fn estimate_model(
    fit: &ModelFit,
    levels: &PlateauLevels,
    reference_voltage: f64,
    opts: &FitOpts,
) -> Result<ModelEstimate, EntError> {
    if levels.plateaus.len() < 2 {
        return Err(EntError::InsufficientData(
            ErrorInfo::new("entropy.levels", "entropy needs a reference and one other plateau")
                .with_context("levels", levels.plateaus.len()),
        ));
    }
    let mut residual_at_plateau = Vec::with_capacity(levels.plateaus.len());
    for plateau in &levels.plateaus {
        let value = trailing_mean(
            &fit.residual,
            plateau.span,
            opts.plateau_fraction,
            opts.plateau_width,
        )
        .map_err(|err| err.with_context("model", fit.kind.id()))?;
        residual_at_plateau.push(value);
    }
    let entropy_per_level: Vec<f64> = residual_at_plateau
        .iter()
        .zip(levels.delta_temperature.iter())
        .skip(1)
        .map(|(residual, delta)| -ELECTRON_COUNT * FARADAY * residual / delta)
        .collect();
    let entropy = mean(&entropy_per_level);
    Ok(ModelEstimate {
        kind: fit.kind,
        residual_at_plateau,
        error: population_std(&entropy_per_level),
        enthalpy: enthalpy(entropy, levels.reference_temperature(), reference_voltage),
        entropy,
        entropy_per_level,
    })
}

/// `ΔH = T·ΔS - nF·V`.
pub fn enthalpy(entropy: f64, temperature_k: f64, voltage_v: f64) -> f64 {
    entropy * temperature_k - ELECTRON_COUNT * FARADAY * voltage_v
}

/// `F × slope` of plateau voltage against plateau temperature, without any model.
///
/// `None` when every plateau sits at the same temperature.
pub fn raw_data_entropy(levels: &PlateauLevels) -> Option<f64> {
    linear_regression(&levels.temperatures(), &levels.voltages())
        .map(|fit| ELECTRON_COUNT * FARADAY * fit.slope)
}

/// Picks the model with the smallest finite MSE; ties go to the lowest id.
///
/// `mses[i]` belongs to `ModelKind::ALL[i]`; `None` marks a failed model.
pub fn select_best_fit(mses: &[Option<f64>]) -> Option<ModelKind> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, mse) in mses.iter().enumerate() {
        let Some(value) = mse.filter(|v| v.is_finite()) else {
            continue;
        };
        match best {
            Some((_, current)) if value >= current => {}
            _ => best = Some((idx, value)),
        }
    }
    best.and_then(|(idx, _)| ModelKind::ALL.get(idx).copied())
}

/// Outcome of one model for one SOC, as carried in the entropy table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutcome {
    /// Model the outcome belongs to.
    pub kind: ModelKind,
    /// Fit quality, absent when the model failed.
    pub mse: Option<f64>,
    /// Estimated entropy and enthalpy, absent when the model failed.
    pub estimate: Option<ModelEstimate>,
    /// Failure that excluded the model from selection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<EntError>,
}

impl ModelOutcome {
    /// Outcome of a model that fitted and estimated cleanly.
    pub fn success(fit: &ModelFit, estimate: ModelEstimate) -> Self {
        Self {
            kind: fit.kind,
            mse: Some(fit.mse),
            estimate: Some(estimate),
            failure: None,
        }
    }

    /// Outcome of a model that failed.
    pub fn failed(kind: ModelKind, error: EntError) -> Self {
        Self {
            kind,
            mse: None,
            estimate: None,
            failure: Some(error),
        }
    }

    /// Entropy, if the model succeeded.
    pub fn entropy(&self) -> Option<f64> {
        self.estimate.as_ref().map(|e| e.entropy)
    }

    /// Entropy error, if the model succeeded.
    pub fn error(&self) -> Option<f64> {
        self.estimate.as_ref().map(|e| e.error)
    }

    /// Enthalpy, if the model succeeded.
    pub fn enthalpy(&self) -> Option<f64> {
        self.estimate.as_ref().map(|e| e.enthalpy)
    }
}

/// Entropy table row for one SOC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntropyRecord {
    /// SOC the row describes.
    pub soc_index: usize,
    /// `|capacity|` at the end of the relaxation window (Ah).
    pub capacity_ah: f64,
    /// Last relaxation voltage (V).
    pub reference_voltage_v: f64,
    /// Reference plateau temperature (K).
    pub reference_temperature_k: f64,
    /// Model-free entropy, absent when the plateau temperatures coincide.
    pub raw_entropy: Option<f64>,
    /// Lowest-MSE model, absent when every model failed.
    pub best_fit: Option<ModelKind>,
    /// One outcome per model in id order.
    pub models: Vec<ModelOutcome>,
}

impl EntropyRecord {
    /// Builds the row and selects the best fit from the model outcomes.
    pub fn new(
        soc_index: usize,
        capacity_ah: f64,
        reference_voltage_v: f64,
        reference_temperature_k: f64,
        raw_entropy: Option<f64>,
        models: Vec<ModelOutcome>,
    ) -> Self {
        let mses: Vec<Option<f64>> = models.iter().map(|m| m.mse).collect();
        Self {
            soc_index,
            capacity_ah,
            reference_voltage_v,
            reference_temperature_k,
            raw_entropy,
            best_fit: select_best_fit(&mses),
            models,
        }
    }

    /// Outcome for `kind`.
    pub fn model(&self, kind: ModelKind) -> Option<&ModelOutcome> {
        self.models.iter().find(|m| m.kind == kind)
    }

    /// Entropy of the best-fitting model.
    pub fn best_fit_entropy(&self) -> Option<f64> {
        self.best_fit
            .and_then(|kind| self.model(kind))
            .and_then(ModelOutcome::entropy)
    }

    /// Models that were excluded from selection.
    pub fn failed_models(&self) -> impl Iterator<Item = &ModelOutcome> {
        self.models.iter().filter(|m| m.failure.is_some())
    }
}
