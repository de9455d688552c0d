use ent_core::{EntError, ErrorInfo};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

const LAMBDA_INITIAL: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-15;
const LAMBDA_MAX: f64 = 1e20;
// Steps taken under heavier damping than this are too short to signal convergence.
const LAMBDA_GAUSS_NEWTON: f64 = 1.0;
const DIAG_FLOOR: f64 = 1e-12;

fn degenerate(code: &str, message: impl Into<String>) -> EntError {
    EntError::DegenerateFit(ErrorInfo::new(code, message))
}

fn divergence(code: &str, message: impl Into<String>) -> EntError {
    EntError::FitDivergence(ErrorInfo::new(code, message))
}

/// Least-squares polynomial of `degree` through `(x, y)`.
///
/// Coefficients are returned in ascending order (`c0 + c1·x + c2·x² ...`).
/// Columns are scaled to unit norm before the SVD solve.
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Result<Vec<f64>, EntError> {
    let terms = degree + 1;
    if x.len() != y.len() {
        return Err(degenerate("polyfit.shape", "x and y lengths differ")
            .with_context("x", x.len())
            .with_context("y", y.len()));
    }
    if x.len() < terms {
        return Err(degenerate("polyfit.points", "fewer points than coefficients")
            .with_context("points", x.len())
            .with_context("coefficients", terms));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(degenerate("polyfit.non_finite", "input contains non-finite values"));
    }

    let mut design = DMatrix::from_fn(x.len(), terms, |row, col| x[row].powi(col as i32));
    let mut scales = vec![1.0; terms];
    for (col, scale) in scales.iter_mut().enumerate() {
        let norm = design.column(col).norm();
        if norm > 0.0 {
            *scale = norm;
            design.column_mut(col).unscale_mut(norm);
        }
    }
    let rhs = DVector::from_column_slice(y);
    let svd = design.svd(true, true);
    let solution = svd
        .solve(&rhs, f64::EPSILON * x.len() as f64)
        .map_err(|msg| degenerate("polyfit.svd", msg))?;
    Ok(solution
        .iter()
        .zip(scales.iter())
        .map(|(coef, scale)| coef / scale)
        .collect())
}

/// Evaluates an ascending-order polynomial at `x`.
pub fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Differentiable model `f(x; p)` fitted by [`levenberg_marquardt`].
pub trait CurveModel {
    /// Number of free parameters.
    fn parameter_count(&self) -> usize;
    /// Model value at `x`.
    fn value(&self, x: f64, params: &[f64]) -> f64;
    /// Partial derivatives `∂f/∂p_j` at `x`, written into `out`.
    fn gradient(&self, x: f64, params: &[f64], out: &mut [f64]);
}

/// Budget and tolerance for the Levenberg-Marquardt solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOpts {
    /// Maximum number of model sweeps (residual and Jacobian evaluations).
    pub max_evaluations: usize,
    /// Relative step size below which an undamped step counts as converged.
    pub x_tolerance: f64,
}

/// Outcome of a converged nonlinear fit.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverReport {
    /// Fitted parameters.
    pub parameters: Vec<f64>,
    /// Final sum of squared residuals.
    pub sse: f64,
    /// Model sweeps consumed.
    pub evaluations: usize,
    /// Accepted steps.
    pub iterations: usize,
}

fn sum_squares<M: CurveModel + ?Sized>(model: &M, x: &[f64], y: &[f64], params: &[f64]) -> f64 {
    x.iter()
        .zip(y.iter())
        .map(|(xi, yi)| {
            let r = yi - model.value(*xi, params);
            r * r
        })
        .sum()
}

/// Minimises `Σ (y - f(x; p))²` from `initial` with Marquardt-scaled damping.
///
/// Fails with `FitDivergence` when the sweep budget runs out or the starting
/// point is non-finite.
pub fn levenberg_marquardt<M: CurveModel + ?Sized>(
    model: &M,
    x: &[f64],
    y: &[f64],
    initial: &[f64],
    opts: &SolverOpts,
) -> Result<SolverReport, EntError> {
    let count = model.parameter_count();
    if initial.len() != count {
        return Err(degenerate("lm.initial", "initial guess has the wrong length")
            .with_context("expected", count)
            .with_context("got", initial.len()));
    }
    if x.len() != y.len() || x.len() < count {
        return Err(degenerate("lm.points", "fewer points than parameters")
            .with_context("points", x.len().min(y.len()))
            .with_context("parameters", count));
    }

    let mut params = DVector::from_column_slice(initial);
    let mut sse = sum_squares(model, x, y, params.as_slice());
    let mut evaluations = 1;
    let mut iterations = 0;
    if !sse.is_finite() {
        return Err(divergence("lm.initial_non_finite", "initial guess gives a non-finite residual")
            .with_context("initial", format!("{initial:?}")));
    }

    let mut lambda = LAMBDA_INITIAL;
    let mut jacobian = DMatrix::<f64>::zeros(x.len(), count);
    let mut residual = DVector::<f64>::zeros(x.len());
    let mut row = vec![0.0; count];

    loop {
        if sse == 0.0 {
            break;
        }
        if evaluations >= opts.max_evaluations {
            return Err(exhausted(evaluations, sse));
        }
        for (i, (xi, yi)) in x.iter().zip(y.iter()).enumerate() {
            residual[i] = yi - model.value(*xi, params.as_slice());
            model.gradient(*xi, params.as_slice(), &mut row);
            for (j, value) in row.iter().enumerate() {
                jacobian[(i, j)] = *value;
            }
        }
        evaluations += 1;
        let jtj = jacobian.tr_mul(&jacobian);
        let jtr = jacobian.tr_mul(&residual);
        if jtj.iter().chain(jtr.iter()).any(|v| !v.is_finite()) {
            return Err(divergence("lm.non_finite_jacobian", "Jacobian became non-finite")
                .with_context("evaluations", evaluations));
        }

        let mut converged = false;
        loop {
            if evaluations >= opts.max_evaluations {
                return Err(exhausted(evaluations, sse));
            }
            let mut damped = jtj.clone();
            for j in 0..count {
                damped[(j, j)] += lambda * jtj[(j, j)].max(DIAG_FLOOR);
            }
            let step = match damped.cholesky() {
                Some(factor) => factor.solve(&jtr),
                None => {
                    lambda *= 10.0;
                    if lambda > LAMBDA_MAX {
                        converged = true;
                        break;
                    }
                    continue;
                }
            };
            let candidate = &params + &step;
            let candidate_sse = sum_squares(model, x, y, candidate.as_slice());
            evaluations += 1;
            if candidate_sse.is_finite() && candidate_sse < sse {
                let small = step.norm() <= opts.x_tolerance * (params.norm() + opts.x_tolerance);
                converged = small && lambda <= LAMBDA_GAUSS_NEWTON;
                params = candidate;
                sse = candidate_sse;
                iterations += 1;
                lambda = (lambda / 10.0).max(LAMBDA_MIN);
                break;
            }
            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                // No descent direction left: the iterate is stationary.
                converged = true;
                break;
            }
        }
        if converged {
            break;
        }
    }

    if params.iter().any(|v| !v.is_finite()) {
        return Err(divergence("lm.non_finite_parameters", "parameters became non-finite"));
    }
    debug!(evaluations, iterations, sse, "levenberg-marquardt converged");
    Ok(SolverReport {
        parameters: params.iter().copied().collect(),
        sse,
        evaluations,
        iterations,
    })
}

fn exhausted(evaluations: usize, sse: f64) -> EntError {
    divergence("lm.budget", "solver did not converge within the evaluation budget")
        .with_context("evaluations", evaluations)
        .with_context("sse", sse)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Line;

    impl CurveModel for Line {
        fn parameter_count(&self) -> usize {
            2
        }

        fn value(&self, x: f64, p: &[f64]) -> f64 {
            p[0] + p[1] * x
        }

        fn gradient(&self, x: f64, _p: &[f64], out: &mut [f64]) {
            out[0] = 1.0;
            out[1] = x;
        }
    }

    #[test]
    fn polyfit_matches_exact_quadratic() {
        let x: Vec<f64> = (1..20).map(|i| i as f64 * 0.3).collect();
        let y: Vec<f64> = x.iter().map(|v| 1.5 - 0.25 * v + 0.125 * v * v).collect();
        let coef = polyfit(&x, &y, 2).expect("fit");
        assert!((coef[0] - 1.5).abs() < 1e-9);
        assert!((coef[1] + 0.25).abs() < 1e-9);
        assert!((coef[2] - 0.125).abs() < 1e-9);
        assert!((polyval(&coef, 2.0) - (1.5 - 0.5 + 0.5)).abs() < 1e-9);
    }

    #[test]
    fn polyfit_rejects_too_few_points() {
        let err = polyfit(&[1.0, 2.0], &[1.0, 2.0], 2).expect_err("underdetermined");
        assert!(matches!(err, EntError::DegenerateFit(_)));
    }

    #[test]
    fn lm_solves_linear_problem() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 - 0.5 * v).collect();
        let opts = SolverOpts {
            max_evaluations: 1_000,
            x_tolerance: 1e-12,
        };
        let report = levenberg_marquardt(&Line, &x, &y, &[0.0, 0.0], &opts).expect("converge");
        assert!((report.parameters[0] - 2.0).abs() < 1e-8);
        assert!((report.parameters[1] + 0.5).abs() < 1e-8);
    }

    #[test]
    fn lm_reports_budget_exhaustion() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 - 0.5 * v).collect();
        let opts = SolverOpts {
            max_evaluations: 1,
            x_tolerance: 1e-12,
        };
        let err = levenberg_marquardt(&Line, &x, &y, &[0.0, 0.0], &opts).expect_err("budget");
        assert!(matches!(err, EntError::FitDivergence(_)));
    }
}
