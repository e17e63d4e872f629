use serde::{Deserialize, Serialize};

use crate::error::RiskcapError;
use crate::linalg::{mat_vec_multiply, vec_dot};
use crate::types::{Rate, Weight};
use crate::RiskcapResult;

/// Risk below this is treated as zero when dividing by it.
pub const MIN_RISK: f64 = 1e-12;

/// Expected return and volatility of one weight vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPerformance {
    /// Weighted average of the per-asset expected returns.
    pub expected_return: Rate,
    /// Annualised standard deviation, `sqrt(w' S w)`.
    pub risk: Rate,
    /// `expected_return / risk`; absent when risk is zero.
    pub sharpe_ratio: Option<f64>,
}

/// Evaluate a weight vector. Defined for any weights, feasible or not.
pub fn evaluate(
    mean_returns: &[Rate],
    covariance_matrix: &[Vec<f64>],
    weights: &[Weight],
) -> RiskcapResult<PortfolioPerformance> {
    let n = mean_returns.len();
    if weights.len() != n {
        return Err(RiskcapError::InvalidInput {
            field: "weights".into(),
            reason: format!("Expected {} weights but got {}", n, weights.len()),
        });
    }
    if covariance_matrix.len() != n || covariance_matrix.iter().any(|row| row.len() != n) {
        return Err(RiskcapError::InvalidInput {
            field: "covariance_matrix".into(),
            reason: format!("Expected a {}x{} matrix", n, n),
        });
    }

    let expected = expected_return(mean_returns, weights);
    let risk = portfolio_risk(covariance_matrix, weights);
    let sharpe_ratio = if risk > MIN_RISK {
        Some(expected / risk)
    } else {
        None
    };

    Ok(PortfolioPerformance {
        expected_return: expected,
        risk,
        sharpe_ratio,
    })
}

/// `mu' w`.
pub fn expected_return(mean_returns: &[Rate], weights: &[Weight]) -> Rate {
    vec_dot(mean_returns, weights)
}

/// `w' S w`, clamped at zero.
pub fn portfolio_variance(covariance_matrix: &[Vec<f64>], weights: &[Weight]) -> f64 {
    vec_dot(weights, &mat_vec_multiply(covariance_matrix, weights)).max(0.0)
}

pub fn portfolio_risk(covariance_matrix: &[Vec<f64>], weights: &[Weight]) -> Rate {
    portfolio_variance(covariance_matrix, weights).sqrt()
}

/// Objective minimised by the allocator: `-(mu' w) / sqrt(w' S w)`.
///
/// Zero risk (all weight on riskless assets, or all-zero weights) has no
/// Sharpe ratio and is reported as `DivisionByZero` rather than an
/// infinite or NaN value.
pub fn negative_sharpe(
    mean_returns: &[Rate],
    covariance_matrix: &[Vec<f64>],
    weights: &[Weight],
) -> RiskcapResult<f64> {
    let risk = portfolio_risk(covariance_matrix, weights);
    if risk <= MIN_RISK {
        return Err(RiskcapError::DivisionByZero {
            context: "negative_sharpe: portfolio risk is zero".into(),
        });
    }
    Ok(-expected_return(mean_returns, weights) / risk)
}
