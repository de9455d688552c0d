use ent_core::{EntError, ErrorInfo, RawLog};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fit::FitOpts;
use crate::segment::SocWindow;
use crate::stat::{mean, percentile_index};

fn insufficient(code: &str, message: impl Into<String>) -> EntError {
    EntError::InsufficientData(ErrorInfo::new(code, message))
}

/// Zero-current rows of a SOC window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaxationWindow {
    /// SOC the window was extracted from.
    pub soc_index: usize,
    /// Relaxation samples in time order.
    pub rows: RawLog,
    /// Row offset of each relaxation sample within its SOC window.
    pub soc_offsets: Vec<usize>,
}

impl RelaxationWindow {
    /// Extracts the rows of `soc` where the current is exactly zero.
    pub fn from_soc(soc: &SocWindow) -> Self {
        let (rows, soc_offsets) = filter_relaxation(&soc.rows);
        Self {
            soc_index: soc.index,
            rows,
            soc_offsets,
        }
    }

    /// Number of relaxation samples.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when the SOC never rested.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Keeps the `current == 0` rows of `log`, returning them with their row offsets.
pub fn filter_relaxation(log: &RawLog) -> (RawLog, Vec<usize>) {
    let mut offsets = Vec::new();
    let mut samples = Vec::new();
    for (idx, sample) in log.samples().iter().enumerate() {
        if sample.is_relaxing() {
            offsets.push(idx);
            samples.push(*sample);
        }
    }
    (RawLog::new(samples), offsets)
}

/// Inclusive range of relaxation positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateauSpan {
    /// First position of the span.
    pub start: usize,
    /// Last position of the span (inclusive).
    pub end: usize,
}

impl PlateauSpan {
    /// Number of samples covered by the span.
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    /// Spans always hold at least one sample.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Borrow the part of `values` covered by the span.
    pub fn slice<'a>(&self, values: &'a [f64]) -> &'a [f64] {
        &values[self.start..=self.end]
    }
}

/// Plateau boundaries of one relaxation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateauLayout {
    /// Positions flagged as the first row of a temperature step.
    pub markers: Vec<usize>,
    /// One span per configured temperature level; index 0 is the reference level.
    pub plateaus: Vec<PlateauSpan>,
    /// Final return to the reference temperature, running to the last sample.
    pub reference_tail: PlateauSpan,
}

/// Locates the configured temperature plateaus within a relaxation window.
///
/// With `M` markers and `N` levels, plateau `k` spans markers `M-N-1+k` to
/// `M-N+k` inclusive and the reference tail starts at the last marker, so
/// `M >= N + 1` markers are required. Markers are collected in position order,
/// so consecutive spans share their boundary marker and never overlap.
pub fn locate_plateaus(
    relax: &RelaxationWindow,
    level_count: usize,
) -> Result<PlateauLayout, EntError> {
    if level_count < 2 {
        return Err(EntError::Config(
            ErrorInfo::new(
                "plateau.level_count",
                "at least two temperature levels are required",
            )
            .with_context("configured", level_count),
        ));
    }
    let markers: Vec<usize> = relax
        .rows
        .samples()
        .iter()
        .enumerate()
        .filter(|(_, sample)| sample.plateau_marker == 0)
        .map(|(idx, _)| idx)
        .collect();
    if markers.len() < level_count + 1 {
        return Err(EntError::InsufficientData(
            ErrorInfo::new(
                "plateau.markers",
                "relaxation window has fewer plateau markers than configured",
            )
            .with_context("soc", relax.soc_index)
            .with_context("markers", markers.len())
            .with_context("required", level_count + 1),
        ));
    }
    let base = markers.len() - level_count - 1;
    let plateaus: Vec<PlateauSpan> = (0..level_count)
        .map(|k| PlateauSpan {
            start: markers[base + k],
            end: markers[base + k + 1],
        })
        .collect();
    let reference_tail = PlateauSpan {
        start: markers[markers.len() - 1],
        end: relax.len() - 1,
    };
    debug!(
        soc = relax.soc_index,
        markers = markers.len(),
        ?plateaus,
        "located temperature plateaus"
    );
    Ok(PlateauLayout {
        markers,
        plateaus,
        reference_tail,
    })
}

/// Mean of the `width` samples ending at the `fraction` point of `span`.
pub fn trailing_mean(
    values: &[f64],
    span: PlateauSpan,
    fraction: f64,
    width: usize,
) -> Result<f64, EntError> {
    let idx = percentile_index(span.len(), fraction);
    if idx < width {
        return Err(EntError::InsufficientData(
            ErrorInfo::new(
                "plateau.too_short",
                "plateau window is too short for trailing averaging",
            )
            .with_context("span_len", span.len())
            .with_context("width", width),
        ));
    }
    let window = &span.slice(values)[idx - width..idx];
    Ok(mean(window))
}

/// Mean temperature and voltage of one plateau.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperaturePlateau {
    /// Position range of the plateau within the relaxation window.
    pub span: PlateauSpan,
    /// Mean temperature near the end of the plateau (K).
    pub temperature_k: f64,
    /// Mean voltage near the end of the plateau (V).
    pub voltage_v: f64,
}

/// Plateau levels of a SOC together with their offsets from the reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateauLevels {
    /// One entry per configured level; index 0 is the reference.
    pub plateaus: Vec<TemperaturePlateau>,
    /// `T[0] - T[k]` for every level.
    pub delta_temperature: Vec<f64>,
}

impl PlateauLevels {
    /// Plateau temperatures (K).
    pub fn temperatures(&self) -> Vec<f64> {
        self.plateaus.iter().map(|p| p.temperature_k).collect()
    }

    /// Plateau voltages (V).
    pub fn voltages(&self) -> Vec<f64> {
        self.plateaus.iter().map(|p| p.voltage_v).collect()
    }

    /// Reference (first) plateau temperature (K).
    pub fn reference_temperature(&self) -> f64 {
        self.plateaus.first().map(|p| p.temperature_k).unwrap_or(f64::NAN)
    }
}

/// Computes mean temperature and voltage for every plateau of `layout`.
pub fn plateau_levels(
    relax: &RelaxationWindow,
    layout: &PlateauLayout,
    opts: &FitOpts,
) -> Result<PlateauLevels, EntError> {
    let temperatures: Vec<f64> = relax.rows.samples().iter().map(|s| s.temperature_k()).collect();
    let voltages = relax.rows.voltages();
    let mut plateaus = Vec::with_capacity(layout.plateaus.len());
    for (level, span) in layout.plateaus.iter().copied().enumerate() {
        let temperature_k =
            trailing_mean(&temperatures, span, opts.plateau_fraction, opts.plateau_width)
                .map_err(|err| err.with_context("soc", relax.soc_index).with_context("level", level))?;
        let voltage_v = trailing_mean(&voltages, span, opts.plateau_fraction, opts.plateau_width)
            .map_err(|err| err.with_context("soc", relax.soc_index).with_context("level", level))?;
        plateaus.push(TemperaturePlateau {
            span,
            temperature_k,
            voltage_v,
        });
    }

    let reference = plateaus
        .first()
        .map(|p| p.temperature_k)
        .ok_or_else(|| {
            insufficient("plateau.empty_layout", "layout holds no plateaus")
                .with_context("soc", relax.soc_index)
        })?;
    let delta_temperature: Vec<f64> = plateaus
        .iter()
        .map(|p| reference - p.temperature_k)
        .collect();
    if let Some(level) = delta_temperature.iter().skip(1).position(|d| *d == 0.0) {
        return Err(EntError::InsufficientData(
            ErrorInfo::new(
                "plateau.flat_temperature",
                "temperature level does not differ from the reference",
            )
            .with_context("soc", relax.soc_index)
            .with_context("level", level + 1),
        ));
    }
    Ok(PlateauLevels {
        plateaus,
        delta_temperature,
    })
}
