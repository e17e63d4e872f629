use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::allocation::optimizer::{
    max_asset_volatility, min_variance, optimize, validate_asset_names, OptimizationStatus,
    PortfolioPoint,
};
use crate::allocation::performance::PortfolioPerformance;
use crate::error::RiskcapError;
use crate::solver::SqpSettings;
use crate::types::{with_metadata, ComputationOutput, Rate, Weight};
use crate::RiskcapResult;

const DEFAULT_POINTS: u32 = 10;
const MONOTONICITY_SLACK: f64 = 1e-6;

/// Input to a risk-ceiling sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierInput {
    pub asset_names: Vec<String>,
    pub mean_returns: Vec<Rate>,
    pub covariance_matrix: Vec<Vec<f64>>,
    /// Number of ceilings (default 10).
    #[serde(default)]
    pub points: Option<u32>,
    #[serde(default)]
    pub solver: Option<SqpSettings>,
}

/// Max-Sharpe solution at one risk ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CeilingPoint {
    pub risk_tolerance: Rate,
    pub status: OptimizationStatus,
    pub weights: Vec<Weight>,
    pub performance: PortfolioPerformance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierOutput {
    pub min_variance_portfolio: PortfolioPoint,
    pub points: Vec<CeilingPoint>,
    /// True when the Sharpe ratio never falls as the ceiling rises across
    /// converged points.
    pub sharpe_monotone: bool,
}

/// Solve the max-Sharpe problem for evenly spaced risk ceilings between
/// the minimum-variance risk and the largest single-asset volatility.
///
/// The lowest ceiling admits only the minimum-variance portfolio, which is
/// reported directly.
pub fn trace_frontier(input: &FrontierInput) -> RiskcapResult<ComputationOutput<FrontierOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_asset_names(&input.asset_names, input.mean_returns.len())?;
    let n_points = input.points.unwrap_or(DEFAULT_POINTS);
    if n_points == 0 {
        return Err(RiskcapError::InvalidInput {
            field: "points".into(),
            reason: "At least one frontier point required".into(),
        });
    }
    let settings = input.solver.unwrap_or_default();
    let mu = &input.mean_returns;
    let cov = &input.covariance_matrix;

    let min_var = min_variance(mu, cov, &settings)?;
    if !min_var.status.is_converged() {
        warnings.push(format!(
            "Minimum-variance solve finished with status {}",
            min_var.status
        ));
    }

    let low = min_var.performance.risk;
    let high = max_asset_volatility(cov).max(low);
    let ceilings: Vec<Rate> = if n_points == 1 {
        vec![high]
    } else {
        let step = (high - low) / (n_points - 1) as f64;
        (0..n_points).map(|i| low + step * i as f64).collect()
    };

    let mut points = Vec::with_capacity(ceilings.len());
    for (i, &ceiling) in ceilings.iter().enumerate() {
        let point = if i == 0 && n_points > 1 {
            CeilingPoint {
                risk_tolerance: ceiling,
                status: min_var.status,
                weights: min_var.weights.clone(),
                performance: min_var.performance,
            }
        } else {
            let r = optimize(mu, cov, ceiling, None, &settings)?;
            CeilingPoint {
                risk_tolerance: ceiling,
                status: r.status,
                weights: r.weights,
                performance: r.performance,
            }
        };
        debug!(
            ceiling,
            status = %point.status,
            risk = point.performance.risk,
            "frontier point"
        );
        if !point.status.is_converged() {
            warnings.push(format!(
                "Ceiling {:.4}: status {}",
                ceiling, point.status
            ));
        }
        points.push(point);
    }

    let sharpe_monotone = is_sharpe_monotone(&points);
    if !sharpe_monotone {
        warnings.push("Sharpe ratio decreases between successive ceilings".into());
    }

    let output = FrontierOutput {
        min_variance_portfolio: PortfolioPoint {
            weights: min_var.weights,
            performance: min_var.performance,
        },
        points,
        sharpe_monotone,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Risk-ceiling sweep of the long-only maximum Sharpe portfolio",
        &serde_json::json!({
            "n_assets": input.asset_names.len(),
            "points": n_points,
            "min_ceiling": low,
            "max_ceiling": high,
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn is_sharpe_monotone(points: &[CeilingPoint]) -> bool {
    let sharpes: Vec<f64> = points
        .iter()
        .filter(|p| p.status.is_converged())
        .filter_map(|p| p.performance.sharpe_ratio)
        .collect();
    sharpes
        .windows(2)
        .all(|pair| pair[1] >= pair[0] - MONOTONICITY_SLACK)
}
