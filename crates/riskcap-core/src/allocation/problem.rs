//! Allocation problems bound to their market data.
//!
//! Each problem borrows the mean-return vector and covariance matrix for
//! the duration of one solve and exposes objective, constraints and bounds
//! to the SQP solver. Nothing is captured beyond the borrowed inputs.

use crate::allocation::performance::{
    expected_return, negative_sharpe, portfolio_risk, portfolio_variance, MIN_RISK,
};
use crate::error::RiskcapError;
use crate::linalg::mat_vec_multiply;
use crate::solver::ConstrainedProblem;
use crate::types::{Rate, Weight};
use crate::RiskcapResult;

/// Long-only, fully invested box shared by every problem.
fn long_only_bounds(n: usize) -> Vec<(f64, f64)> {
    vec![(0.0, 1.0); n]
}

fn budget(weights: &[Weight]) -> Vec<f64> {
    vec![weights.iter().sum::<f64>() - 1.0]
}

/// Feasible when non-negative, i.e. risk at or below the ceiling.
fn risk_ceiling(covariance_matrix: &[Vec<f64>], risk_tolerance: Rate, w: &[f64]) -> Vec<f64> {
    vec![risk_tolerance - portfolio_risk(covariance_matrix, w)]
}

/// `-Sw / s`; the risk surface has no gradient at `s = 0`, where zero is
/// used.
fn risk_ceiling_jacobian(covariance_matrix: &[Vec<f64>], w: &[f64]) -> Vec<Vec<f64>> {
    let risk = portfolio_risk(covariance_matrix, w);
    if risk <= MIN_RISK {
        return vec![vec![0.0; w.len()]];
    }
    let sigma_w = mat_vec_multiply(covariance_matrix, w);
    vec![sigma_w.iter().map(|sw| -sw / risk).collect()]
}

// ---------------------------------------------------------------------------
// Maximum Sharpe under a volatility ceiling
// ---------------------------------------------------------------------------

/// Maximise `mu'w / sqrt(w'Sw)` subject to `sum(w) = 1`,
/// `risk_tolerance - sqrt(w'Sw) >= 0` and `0 <= w <= 1`.
#[derive(Debug, Clone, Copy)]
pub struct SharpeProblem<'a> {
    mean_returns: &'a [Rate],
    covariance_matrix: &'a [Vec<f64>],
    risk_tolerance: Rate,
}

impl<'a> SharpeProblem<'a> {
    pub fn new(
        mean_returns: &'a [Rate],
        covariance_matrix: &'a [Vec<f64>],
        risk_tolerance: Rate,
    ) -> Self {
        Self {
            mean_returns,
            covariance_matrix,
            risk_tolerance,
        }
    }
}

impl ConstrainedProblem for SharpeProblem<'_> {
    fn dimension(&self) -> usize {
        self.mean_returns.len()
    }

    fn objective(&self, w: &[f64]) -> RiskcapResult<f64> {
        negative_sharpe(self.mean_returns, self.covariance_matrix, w)
    }

    /// `-mu / s + r * Sw / s^3`
    fn gradient(&self, w: &[f64]) -> RiskcapResult<Vec<f64>> {
        let risk = portfolio_risk(self.covariance_matrix, w);
        if risk <= MIN_RISK {
            return Err(RiskcapError::DivisionByZero {
                context: "negative_sharpe gradient: portfolio risk is zero".into(),
            });
        }
        let ret = expected_return(self.mean_returns, w);
        let sigma_w = mat_vec_multiply(self.covariance_matrix, w);
        let risk_cubed = risk * risk * risk;
        Ok(self
            .mean_returns
            .iter()
            .zip(sigma_w.iter())
            .map(|(m, sw)| -m / risk + ret * sw / risk_cubed)
            .collect())
    }

    fn equality_constraints(&self, w: &[f64]) -> Vec<f64> {
        budget(w)
    }

    fn equality_jacobian(&self, w: &[f64]) -> Vec<Vec<f64>> {
        vec![vec![1.0; w.len()]]
    }

    fn inequality_constraints(&self, w: &[f64]) -> Vec<f64> {
        risk_ceiling(self.covariance_matrix, self.risk_tolerance, w)
    }

    fn inequality_jacobian(&self, w: &[f64]) -> Vec<Vec<f64>> {
        risk_ceiling_jacobian(self.covariance_matrix, w)
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        long_only_bounds(self.dimension())
    }
}

// ---------------------------------------------------------------------------
// Maximum return under a volatility ceiling
// ---------------------------------------------------------------------------

/// Maximise `mu'w` over the same feasible set as [`SharpeProblem`]. Its
/// solution is a restart point for the Sharpe solve.
#[derive(Debug, Clone, Copy)]
pub struct MaxReturnProblem<'a> {
    mean_returns: &'a [Rate],
    covariance_matrix: &'a [Vec<f64>],
    risk_tolerance: Rate,
}

impl<'a> MaxReturnProblem<'a> {
    pub fn new(
        mean_returns: &'a [Rate],
        covariance_matrix: &'a [Vec<f64>],
        risk_tolerance: Rate,
    ) -> Self {
        Self {
            mean_returns,
            covariance_matrix,
            risk_tolerance,
        }
    }
}

impl ConstrainedProblem for MaxReturnProblem<'_> {
    fn dimension(&self) -> usize {
        self.mean_returns.len()
    }

    fn objective(&self, w: &[f64]) -> RiskcapResult<f64> {
        Ok(-expected_return(self.mean_returns, w))
    }

    fn gradient(&self, _w: &[f64]) -> RiskcapResult<Vec<f64>> {
        Ok(self.mean_returns.iter().map(|m| -m).collect())
    }

    fn equality_constraints(&self, w: &[f64]) -> Vec<f64> {
        budget(w)
    }

    fn equality_jacobian(&self, w: &[f64]) -> Vec<Vec<f64>> {
        vec![vec![1.0; w.len()]]
    }

    fn inequality_constraints(&self, w: &[f64]) -> Vec<f64> {
        risk_ceiling(self.covariance_matrix, self.risk_tolerance, w)
    }

    fn inequality_jacobian(&self, w: &[f64]) -> Vec<Vec<f64>> {
        risk_ceiling_jacobian(self.covariance_matrix, w)
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        long_only_bounds(self.dimension())
    }
}

// ---------------------------------------------------------------------------
// Minimum variance
// ---------------------------------------------------------------------------

/// Minimise `w'Sw` subject to `sum(w) = 1` and `0 <= w <= 1`.
#[derive(Debug, Clone, Copy)]
pub struct MinVarianceProblem<'a> {
    covariance_matrix: &'a [Vec<f64>],
}

impl<'a> MinVarianceProblem<'a> {
    pub fn new(covariance_matrix: &'a [Vec<f64>]) -> Self {
        Self { covariance_matrix }
    }
}

impl ConstrainedProblem for MinVarianceProblem<'_> {
    fn dimension(&self) -> usize {
        self.covariance_matrix.len()
    }

    fn objective(&self, w: &[f64]) -> RiskcapResult<f64> {
        Ok(portfolio_variance(self.covariance_matrix, w))
    }

    fn gradient(&self, w: &[f64]) -> RiskcapResult<Vec<f64>> {
        Ok(mat_vec_multiply(self.covariance_matrix, w)
            .into_iter()
            .map(|v| 2.0 * v)
            .collect())
    }

    fn equality_constraints(&self, w: &[f64]) -> Vec<f64> {
        budget(w)
    }

    fn equality_jacobian(&self, w: &[f64]) -> Vec<Vec<f64>> {
        vec![vec![1.0; w.len()]]
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        long_only_bounds(self.dimension())
    }
}
