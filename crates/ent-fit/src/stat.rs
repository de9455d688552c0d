use serde::{Deserialize, Serialize};

/// Ordinary least squares line `y = slope·x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    /// Fitted slope.
    pub slope: f64,
    /// Fitted intercept.
    pub intercept: f64,
    /// Coefficient of determination.
    pub r_squared: f64,
}

/// Arithmetic mean, `NaN` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (ddof = 0), `NaN` for an empty slice.
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Sample standard deviation (ddof = 1), `NaN` below two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Fits `ys` against `xs` by ordinary least squares.
///
/// Returns `None` when fewer than two points are supplied or every `x` is
/// identical (slope undefined).
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Option<LinearRegression> {
    let len = xs.len().min(ys.len());
    if len < 2 {
        return None;
    }
    let xs = &xs[..len];
    let ys = &ys[..len];
    let mean_x = mean(xs);
    let mean_y = mean(ys);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    // A constant response is explained perfectly by a flat line.
    let r_squared = if syy == 0.0 {
        1.0
    } else {
        (sxy * sxy) / (sxx * syy)
    };
    Some(LinearRegression {
        slope,
        intercept,
        r_squared,
    })
}

/// Integer index at `fraction` of a window of `len` samples (`floor(fraction·len)`).
pub fn percentile_index(len: usize, fraction: f64) -> usize {
    ((fraction * len as f64).floor() as usize).min(len)
}
