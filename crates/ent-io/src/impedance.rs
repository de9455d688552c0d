use std::path::Path;

use ent_core::{EntError, ErrorInfo};
use ent_fit::stat::mean;
use serde::{Deserialize, Serialize};

use crate::parser::{read_text, Table};

const RE_COLUMN: &str = "Re(Z)/Ohm";
const IM_COLUMN: &str = "-Im(Z)/Ohm";
const FREQ_COLUMN: &str = "freq/Hz";
// |−Im(Z)| below this counts as a real-axis crossing (Ω).
const REAL_AXIS_BAND: f64 = 0.001;
const MID_FREQUENCY_HZ: (f64, f64) = (0.08, 0.30);

fn insufficient(code: &str, message: impl Into<String>) -> EntError {
    EntError::InsufficientData(ErrorInfo::new(code, message))
}

/// One row of an EIS spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpedancePoint {
    /// Excitation frequency (Hz).
    pub freq_hz: f64,
    /// Real part (Ω).
    pub re_ohm: f64,
    /// Negated imaginary part (Ω).
    pub neg_im_ohm: f64,
}

/// Characteristic resistances of a cell (mΩ).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Impedance {
    /// High-frequency resistance.
    pub r_hf_mohm: f64,
    /// Mid-frequency resistance.
    pub r_mf_mohm: f64,
    /// Total resistance.
    pub r_t_mohm: f64,
}

/// Parses a Biologic EIS export.
pub fn parse_spectrum(text: &str, header_row: Option<usize>) -> Result<Vec<ImpedancePoint>, EntError> {
    let table = Table::parse(text, b'\t', RE_COLUMN, header_row)?;
    let freq = table.numbers(FREQ_COLUMN, 1.0)?;
    let re = table.numbers(RE_COLUMN, 1.0)?;
    let im = table.numbers(IM_COLUMN, 1.0)?;
    Ok(freq
        .into_iter()
        .zip(re)
        .zip(im)
        .map(|((freq_hz, re_ohm), neg_im_ohm)| ImpedancePoint {
            freq_hz,
            re_ohm,
            neg_im_ohm,
        })
        .collect())
}

/// Reads a Biologic EIS export from disk.
pub fn load_spectrum(path: &Path) -> Result<Vec<ImpedancePoint>, EntError> {
    let text = read_text(path)?;
    parse_spectrum(&text, None).map_err(|err| err.with_context("path", path.display()))
}

/// Derives `R_hf`, `R_mf` and `R_t` from a spectrum.
///
/// Rows with a zero real or imaginary part are dropped first. `R_hf` averages
/// the real part where the curve crosses the real axis, `R_mf` takes the real
/// part at the smallest `-Im(Z)` between 80 and 300 mHz, and `R_t` is the
/// real part of the last remaining row.
pub fn resistances(spectrum: &[ImpedancePoint]) -> Result<Impedance, EntError> {
    let valid: Vec<&ImpedancePoint> = spectrum
        .iter()
        .filter(|p| p.re_ohm != 0.0 && p.neg_im_ohm != 0.0)
        .collect();

    let crossings: Vec<f64> = valid
        .iter()
        .filter(|p| p.neg_im_ohm.abs() < REAL_AXIS_BAND)
        .map(|p| p.re_ohm)
        .collect();
    if crossings.is_empty() {
        return Err(insufficient("impedance.r_hf", "spectrum never crosses the real axis"));
    }
    let r_hf = mean(&crossings);

    let mut r_mf: Option<(f64, f64)> = None;
    for point in valid
        .iter()
        .filter(|p| p.freq_hz > MID_FREQUENCY_HZ.0 && p.freq_hz < MID_FREQUENCY_HZ.1)
    {
        match r_mf {
            Some((min_im, _)) if point.neg_im_ohm >= min_im => {}
            _ => r_mf = Some((point.neg_im_ohm, point.re_ohm)),
        }
    }
    let (_, r_mf) = r_mf.ok_or_else(|| {
        insufficient("impedance.r_mf", "no rows in the mid-frequency band")
            .with_context("band_hz", format!("{:?}", MID_FREQUENCY_HZ))
    })?;

    let r_t = valid
        .last()
        .map(|p| p.re_ohm)
        .ok_or_else(|| insufficient("impedance.empty", "spectrum has no usable rows"))?;

    Ok(Impedance {
        r_hf_mohm: r_hf * 1e3,
        r_mf_mohm: r_mf * 1e3,
        r_t_mohm: r_t * 1e3,
    })
}
