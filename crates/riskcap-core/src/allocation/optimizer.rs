use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::allocation::performance::{evaluate, PortfolioPerformance, MIN_RISK};
use crate::allocation::problem::{MaxReturnProblem, MinVarianceProblem, SharpeProblem};
use crate::error::RiskcapError;
use crate::linalg::mat_vec_multiply;
use crate::solver::problem::constraint_violation;
use crate::solver::{minimize, ConstrainedProblem, SqpOutcome, SqpSettings, SqpStatus};
use crate::types::{with_metadata, ComputationOutput, Rate, Weight};
use crate::RiskcapResult;

/// Allowed drift of `sum(w)` from one in a converged result.
pub const BUDGET_TOLERANCE: f64 = 1e-6;
/// Allowed excess of risk over the ceiling in a converged result.
pub const RISK_TOLERANCE_SLACK: f64 = 1e-6;

const SYMMETRY_TOLERANCE: f64 = 1e-8;
const CONCENTRATION_LIMIT: f64 = 0.40;
/// Risk within this distance of the ceiling counts as binding.
const BINDING_BAND: f64 = 1e-5;
/// Minimum-variance risk at or below this share of the largest asset
/// volatility counts as a riskless combination.
const RISKLESS_MIX_RATIO: f64 = 1e-4;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Outcome of an allocation run. Anything but `Converged` means the weights
/// must not be used as an optimal allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStatus {
    Converged,
    /// The risk ceiling is below the minimum achievable portfolio risk.
    Infeasible,
    IterationLimit,
    /// The Sharpe ratio is unbounded or undefined: a riskless asset or
    /// combination earns a positive return, or the solver hit zero risk.
    Degenerate,
    NumericalFailure,
}

impl OptimizationStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, OptimizationStatus::Converged)
    }
}

impl fmt::Display for OptimizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OptimizationStatus::Converged => "converged",
            OptimizationStatus::Infeasible => "infeasible",
            OptimizationStatus::IterationLimit => "iteration_limit",
            OptimizationStatus::Degenerate => "degenerate",
            OptimizationStatus::NumericalFailure => "numerical_failure",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Weights aligned with the input asset order. For `Infeasible`, a
    /// riskless `Degenerate` universe or a ceiling pinned at the minimum
    /// achievable risk these are the minimum-variance weights; otherwise the
    /// solver's last iterate.
    pub weights: Vec<Weight>,
    pub performance: PortfolioPerformance,
    pub status: OptimizationStatus,
    pub iterations: u32,
    /// Budget and risk-ceiling violation at `weights`.
    pub constraint_violation: f64,
    /// True only for `Converged`.
    pub reliable: bool,
}

/// Input to the maximum-Sharpe allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharpeInput {
    /// Asset identifiers, in the order of the vectors below.
    pub asset_names: Vec<String>,
    /// Annualised expected returns.
    pub mean_returns: Vec<Rate>,
    /// Annualised N x N covariance matrix.
    pub covariance_matrix: Vec<Vec<f64>>,
    /// Maximum acceptable annualised volatility.
    pub risk_tolerance: Rate,
    /// Starting weights (default 1/N each).
    #[serde(default)]
    pub initial_weights: Option<Vec<Weight>>,
    #[serde(default)]
    pub solver: Option<SqpSettings>,
}

/// Per-asset slice of the allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetAllocation {
    pub name: String,
    pub weight: Weight,
    /// Weight times expected return.
    pub contribution_to_return: Rate,
    /// Weight times marginal risk; sums to portfolio risk.
    pub contribution_to_risk: Rate,
}

/// A portfolio with its performance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioPoint {
    pub weights: Vec<Weight>,
    pub performance: PortfolioPerformance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharpeOutput {
    pub allocations: Vec<AssetAllocation>,
    pub performance: PortfolioPerformance,
    pub status: OptimizationStatus,
    pub reliable: bool,
    pub iterations: u32,
    pub constraint_violation: f64,
    /// Whether the risk ceiling is active at the solution.
    pub risk_ceiling_binding: bool,
    /// Herfindahl-Hirschman index of the weights.
    pub hhi_concentration: f64,
    /// Lowest-risk long-only portfolio; its risk is the smallest feasible
    /// ceiling.
    pub min_variance_portfolio: PortfolioPoint,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Maximise the Sharpe ratio subject to full investment, long-only bounds
/// and `risk(w) <= risk_tolerance`.
///
/// Invalid inputs are errors. Infeasibility and solver trouble are not:
/// they come back as an [`OptimizationStatus`] alongside the best weights
/// available, with `reliable = false`.
pub fn optimize(
    mean_returns: &[Rate],
    covariance_matrix: &[Vec<f64>],
    risk_tolerance: Rate,
    initial_weights: Option<&[Weight]>,
    settings: &SqpSettings,
) -> RiskcapResult<OptimizationResult> {
    let (result, _) = solve_with_min_variance(
        mean_returns,
        covariance_matrix,
        risk_tolerance,
        initial_weights,
        settings,
    )?;
    Ok(result)
}

/// Long-only, fully invested minimum-variance portfolio.
pub fn min_variance(
    mean_returns: &[Rate],
    covariance_matrix: &[Vec<f64>],
    settings: &SqpSettings,
) -> RiskcapResult<OptimizationResult> {
    validate_market_data(mean_returns, covariance_matrix)?;
    solve_min_variance(mean_returns, covariance_matrix, settings)
}

/// Envelope entry point: solve, then attach per-asset contributions, the
/// minimum-variance reference portfolio and warnings.
pub fn optimize_max_sharpe(
    input: &SharpeInput,
) -> RiskcapResult<ComputationOutput<SharpeOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_asset_names(&input.asset_names, input.mean_returns.len())?;
    let settings = input.solver.unwrap_or_default();

    let (result, min_var) = solve_with_min_variance(
        &input.mean_returns,
        &input.covariance_matrix,
        input.risk_tolerance,
        input.initial_weights.as_deref(),
        &settings,
    )?;

    let risk = result.performance.risk;
    let sigma_w = mat_vec_multiply(&input.covariance_matrix, &result.weights);
    let allocations: Vec<AssetAllocation> = input
        .asset_names
        .iter()
        .zip(result.weights.iter())
        .enumerate()
        .map(|(i, (name, &w))| AssetAllocation {
            name: name.clone(),
            weight: w,
            contribution_to_return: w * input.mean_returns[i],
            contribution_to_risk: if risk > MIN_RISK { w * sigma_w[i] / risk } else { 0.0 },
        })
        .collect();

    let hhi_concentration: f64 = result.weights.iter().map(|w| w * w).sum();
    let risk_ceiling_binding = result.status.is_converged()
        && risk >= input.risk_tolerance - BINDING_BAND;

    // --- Warnings ---
    if !result.status.is_converged() {
        warnings.push(format!(
            "Optimization status is {}: weights are not a reliable optimum",
            result.status
        ));
    }
    if result.status == OptimizationStatus::Infeasible {
        warnings.push(format!(
            "Risk tolerance {:.4} is below the minimum achievable risk {:.4}",
            input.risk_tolerance, min_var.performance.risk
        ));
    }
    for a in &allocations {
        if a.weight > CONCENTRATION_LIMIT {
            warnings.push(format!(
                "Concentrated position: {} has weight {:.4}",
                a.name, a.weight
            ));
        }
    }
    if risk_ceiling_binding {
        warnings.push(format!(
            "Risk ceiling is binding: portfolio risk {:.4} at tolerance {:.4}",
            risk, input.risk_tolerance
        ));
    }
    if result.performance.expected_return < 0.0 {
        warnings.push(format!(
            "Negative expected portfolio return: {:.4}",
            result.performance.expected_return
        ));
    }

    let output = SharpeOutput {
        allocations,
        performance: result.performance,
        status: result.status,
        reliable: result.reliable,
        iterations: result.iterations,
        constraint_violation: result.constraint_violation,
        risk_ceiling_binding,
        hhi_concentration,
        min_variance_portfolio: PortfolioPoint {
            weights: min_var.weights,
            performance: min_var.performance,
        },
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Maximum Sharpe ratio under a volatility ceiling (SQP, long-only, fully invested)",
        &serde_json::json!({
            "n_assets": input.asset_names.len(),
            "risk_tolerance": input.risk_tolerance,
            "risk_free_rate": 0.0,
            "bounds": [0.0, 1.0],
            "max_iterations": settings.max_iterations,
            "tolerance": settings.tolerance,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Core routines
// ---------------------------------------------------------------------------

/// Returns the max-Sharpe result together with the minimum-variance
/// portfolio used as a feasibility check.
fn solve_with_min_variance(
    mean_returns: &[Rate],
    covariance_matrix: &[Vec<f64>],
    risk_tolerance: Rate,
    initial_weights: Option<&[Weight]>,
    settings: &SqpSettings,
) -> RiskcapResult<(OptimizationResult, OptimizationResult)> {
    validate_market_data(mean_returns, covariance_matrix)?;
    validate_risk_tolerance(risk_tolerance)?;
    let n = mean_returns.len();
    if let Some(w) = initial_weights {
        validate_initial_weights(w, n)?;
    }

    let problem = SharpeProblem::new(mean_returns, covariance_matrix, risk_tolerance);
    let min_var = solve_min_variance(mean_returns, covariance_matrix, settings)?;

    if min_var.status.is_converged()
        && min_var.performance.risk > risk_tolerance + RISK_TOLERANCE_SLACK
    {
        warn!(
            risk_tolerance,
            min_risk = min_var.performance.risk,
            "risk tolerance below minimum-variance risk"
        );
        let result = at_min_variance(&problem, &min_var, OptimizationStatus::Infeasible);
        return Ok((result, min_var));
    }

    if has_riskless_gain(mean_returns, covariance_matrix, &min_var) {
        warn!(
            min_risk = min_var.performance.risk,
            "riskless portfolio with positive return: sharpe ratio unbounded"
        );
        let result = at_min_variance(&problem, &min_var, OptimizationStatus::Degenerate);
        return Ok((result, min_var));
    }

    // A ceiling at the minimum achievable risk leaves the minimum-variance
    // portfolio as the only feasible point.
    if min_var.status.is_converged()
        && min_var.performance.risk > MIN_RISK
        && min_var.performance.risk >= risk_tolerance - RISK_TOLERANCE_SLACK
    {
        info!(
            risk_tolerance,
            min_risk = min_var.performance.risk,
            "risk ceiling pinned at minimum-variance risk"
        );
        let result = at_min_variance(&problem, &min_var, OptimizationStatus::Converged);
        return Ok((result, min_var));
    }

    let x0 = match initial_weights {
        Some(w) => w.to_vec(),
        None => uniform_weights(n),
    };
    let mut result = solve_sharpe(&problem, mean_returns, covariance_matrix, &x0, settings)?;
    if !(result.status.is_converged() && result.performance.expected_return > 0.0) {
        result = restart_from_extremes(
            &problem,
            mean_returns,
            covariance_matrix,
            risk_tolerance,
            &min_var,
            result,
            settings,
        )?;
    }

    if result.status.is_converged() {
        info!(
            n_assets = n,
            iterations = result.iterations,
            expected_return = result.performance.expected_return,
            risk = result.performance.risk,
            "max-sharpe allocation converged"
        );
    } else {
        warn!(
            n_assets = n,
            status = %result.status,
            iterations = result.iterations,
            violation = result.constraint_violation,
            "max-sharpe allocation did not converge"
        );
    }
    Ok((result, min_var))
}

/// Report the minimum-variance portfolio as the Sharpe result.
fn at_min_variance(
    problem: &SharpeProblem<'_>,
    min_var: &OptimizationResult,
    status: OptimizationStatus,
) -> OptimizationResult {
    OptimizationResult {
        weights: min_var.weights.clone(),
        performance: min_var.performance,
        status,
        iterations: min_var.iterations,
        constraint_violation: constraint_violation(problem, &min_var.weights),
        reliable: status.is_converged(),
    }
}

fn solve_sharpe(
    problem: &SharpeProblem<'_>,
    mean_returns: &[Rate],
    covariance_matrix: &[Vec<f64>],
    x0: &[Weight],
    settings: &SqpSettings,
) -> RiskcapResult<OptimizationResult> {
    let outcome = minimize(problem, x0, settings)?;
    finish_result(problem, mean_returns, covariance_matrix, outcome)
}

/// The Sharpe ratio is only quasi-concave where returns are positive, so a
/// solve from the user's start can stall or settle on a poor local optimum.
/// Rerun from the maximum-return and minimum-variance portfolios and keep
/// the converged answer with the highest ratio.
fn restart_from_extremes(
    problem: &SharpeProblem<'_>,
    mean_returns: &[Rate],
    covariance_matrix: &[Vec<f64>],
    risk_tolerance: Rate,
    min_var: &OptimizationResult,
    first: OptimizationResult,
    settings: &SqpSettings,
) -> RiskcapResult<OptimizationResult> {
    let mut starts: Vec<Vec<Weight>> = Vec::with_capacity(2);
    let max_return = MaxReturnProblem::new(mean_returns, covariance_matrix, risk_tolerance);
    let outcome = minimize(&max_return, &min_var.weights, settings)?;
    if outcome.converged() {
        starts.push(outcome.x);
    }
    starts.push(min_var.weights.clone());

    let mut best = first;
    for x0 in &starts {
        let candidate = solve_sharpe(problem, mean_returns, covariance_matrix, x0, settings)?;
        if !candidate.status.is_converged() {
            continue;
        }
        if !best.status.is_converged() || sharpe_or_worst(&candidate) > sharpe_or_worst(&best) {
            debug!(
                sharpe_ratio = sharpe_or_worst(&candidate),
                "restart improved max-sharpe allocation"
            );
            best = candidate;
        }
    }
    Ok(best)
}

fn sharpe_or_worst(result: &OptimizationResult) -> f64 {
    result.performance.sharpe_ratio.unwrap_or(f64::NEG_INFINITY)
}

/// A zero-variance asset with a positive mean, or a minimum-variance mix
/// that is riskless to working precision and still earns, makes the Sharpe
/// ratio unbounded.
fn has_riskless_gain(
    mean_returns: &[Rate],
    covariance_matrix: &[Vec<f64>],
    min_var: &OptimizationResult,
) -> bool {
    let n = mean_returns.len();
    let riskless_asset =
        (0..n).any(|i| covariance_matrix[i][i] <= MIN_RISK * MIN_RISK && mean_returns[i] > 0.0);
    let riskless_mix = min_var.status.is_converged()
        && min_var.performance.risk <= RISKLESS_MIX_RATIO * max_asset_volatility(covariance_matrix)
        && min_var.performance.expected_return > 0.0;
    riskless_asset || riskless_mix
}

fn solve_min_variance(
    mean_returns: &[Rate],
    covariance_matrix: &[Vec<f64>],
    settings: &SqpSettings,
) -> RiskcapResult<OptimizationResult> {
    let problem = MinVarianceProblem::new(covariance_matrix);
    let outcome = minimize(&problem, &uniform_weights(problem.dimension()), settings)?;
    finish_result(&problem, mean_returns, covariance_matrix, outcome)
}

/// Map the solver outcome onto an allocation status and verify a
/// converged point against the budget and risk ceiling.
fn finish_result<P: ConstrainedProblem>(
    problem: &P,
    mean_returns: &[Rate],
    covariance_matrix: &[Vec<f64>],
    outcome: SqpOutcome,
) -> RiskcapResult<OptimizationResult> {
    // Infeasibility is decided by the minimum-variance solve alone.
    let mut status = match outcome.status {
        SqpStatus::Converged => OptimizationStatus::Converged,
        SqpStatus::IterationLimit => OptimizationStatus::IterationLimit,
        SqpStatus::DegenerateObjective => OptimizationStatus::Degenerate,
        SqpStatus::IncompatibleConstraints
        | SqpStatus::SubproblemFailed
        | SqpStatus::LineSearchFailed => OptimizationStatus::NumericalFailure,
    };

    if status.is_converged() {
        let budget_error = (outcome.x.iter().sum::<f64>() - 1.0).abs();
        let ceiling_excess = problem
            .inequality_constraints(&outcome.x)
            .iter()
            .fold(0.0_f64, |acc, c| acc.max(-c));
        if budget_error > BUDGET_TOLERANCE || ceiling_excess > RISK_TOLERANCE_SLACK {
            warn!(
                budget_error,
                ceiling_excess, "solver reported convergence at an infeasible point"
            );
            status = OptimizationStatus::NumericalFailure;
        }
    }

    let performance = evaluate(mean_returns, covariance_matrix, &outcome.x)?;
    Ok(OptimizationResult {
        weights: outcome.x,
        performance,
        status,
        iterations: outcome.iterations,
        constraint_violation: outcome.constraint_violation,
        reliable: status.is_converged(),
    })
}

fn uniform_weights(n: usize) -> Vec<Weight> {
    vec![1.0 / n as f64; n]
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Shape and sanity checks on the mean-return vector and covariance matrix.
pub(crate) fn validate_market_data(
    mean_returns: &[Rate],
    covariance_matrix: &[Vec<f64>],
) -> RiskcapResult<()> {
    let n = mean_returns.len();
    if n == 0 {
        return Err(RiskcapError::InsufficientData(
            "At least one asset required".into(),
        ));
    }
    if let Some(i) = mean_returns.iter().position(|m| !m.is_finite()) {
        return Err(RiskcapError::InvalidInput {
            field: "mean_returns".into(),
            reason: format!("Mean return {} is not finite", i),
        });
    }
    validate_covariance_matrix(covariance_matrix, n)
}

#[allow(clippy::needless_range_loop)]
fn validate_covariance_matrix(cov: &[Vec<f64>], n: usize) -> RiskcapResult<()> {
    if cov.len() != n {
        return Err(RiskcapError::InvalidInput {
            field: "covariance_matrix".into(),
            reason: format!("Expected {}x{} matrix but got {} rows", n, n, cov.len()),
        });
    }
    for (i, row) in cov.iter().enumerate() {
        if row.len() != n {
            return Err(RiskcapError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Row {} has {} columns, expected {}", i, row.len(), n),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(RiskcapError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Row {} contains a non-finite entry", i),
            });
        }
    }
    for i in 0..n {
        if cov[i][i] < 0.0 {
            return Err(RiskcapError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Negative variance on diagonal at [{}][{}]", i, i),
            });
        }
        for j in (i + 1)..n {
            let scale = cov[i][j].abs().max(cov[j][i].abs()).max(1.0);
            if (cov[i][j] - cov[j][i]).abs() > SYMMETRY_TOLERANCE * scale {
                return Err(RiskcapError::InvalidInput {
                    field: "covariance_matrix".into(),
                    reason: format!("Matrix is not symmetric at [{}][{}]", i, j),
                });
            }
        }
    }
    Ok(())
}

fn validate_risk_tolerance(risk_tolerance: Rate) -> RiskcapResult<()> {
    if !risk_tolerance.is_finite() || risk_tolerance < 0.0 {
        return Err(RiskcapError::InvalidInput {
            field: "risk_tolerance".into(),
            reason: format!(
                "Must be a finite, non-negative volatility; got {}",
                risk_tolerance
            ),
        });
    }
    Ok(())
}

fn validate_initial_weights(weights: &[Weight], n: usize) -> RiskcapResult<()> {
    if weights.len() != n {
        return Err(RiskcapError::InvalidInput {
            field: "initial_weights".into(),
            reason: format!("Expected {} weights but got {}", n, weights.len()),
        });
    }
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(RiskcapError::InvalidInput {
            field: "initial_weights".into(),
            reason: "Weights must be finite".into(),
        });
    }
    Ok(())
}

pub(crate) fn validate_asset_names(names: &[String], n: usize) -> RiskcapResult<()> {
    if names.len() != n {
        return Err(RiskcapError::InvalidInput {
            field: "asset_names".into(),
            reason: format!("Expected {} names but got {}", n, names.len()),
        });
    }
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(RiskcapError::InvalidInput {
                field: "asset_names".into(),
                reason: format!("Duplicate asset identifier '{}'", name),
            });
        }
    }
    Ok(())
}

/// Largest single-asset volatility, the risk of the riskiest corner.
pub(crate) fn max_asset_volatility(covariance_matrix: &[Vec<f64>]) -> Rate {
    covariance_matrix
        .iter()
        .enumerate()
        .map(|(i, row)| row[i].max(0.0).sqrt())
        .fold(0.0_f64, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_asset() -> (Vec<f64>, Vec<Vec<f64>>) {
        (vec![0.10, 0.20], vec![vec![0.04, 0.0], vec![0.0, 0.09]])
    }

    fn three_asset() -> (Vec<f64>, Vec<Vec<f64>>) {
        (
            vec![0.08, 0.12, 0.20],
            vec![
                vec![0.0225, 0.009, 0.00525],
                vec![0.009, 0.04, 0.014],
                vec![0.00525, 0.014, 0.1225],
            ],
        )
    }

    fn assert_feasible(result: &OptimizationResult, risk_tolerance: f64) {
        let sum: f64 = result.weights.iter().sum();
        assert!((sum - 1.0).abs() <= BUDGET_TOLERANCE, "sum = {}", sum);
        assert!(result.weights.iter().all(|w| (0.0..=1.0).contains(w)));
        assert!(result.performance.risk <= risk_tolerance + RISK_TOLERANCE_SLACK);
    }

    #[test]
    fn test_two_asset_end_to_end() {
        let (mu, cov) = two_asset();
        let r = optimize(&mu, &cov, 0.25, None, &SqpSettings::default()).unwrap();
        assert_eq!(r.status, OptimizationStatus::Converged);
        assert!(r.reliable);
        assert_feasible(&r, 0.25);
        // Tangency portfolio is w ~ (9/17, 8/17): more on asset 2 than the
        // minimum-variance (9/13, 4/13), short of full concentration.
        assert!((r.weights[0] - 9.0 / 17.0).abs() < 1e-3, "{:?}", r.weights);
        assert!((r.weights[1] - 8.0 / 17.0).abs() < 1e-3, "{:?}", r.weights);
        assert!(r.weights[1] > 4.0 / 13.0 && r.weights[1] < 1.0);
    }

    #[test]
    fn test_two_asset_binding_ceiling() {
        let (mu, cov) = two_asset();
        let r = optimize(&mu, &cov, 0.17, None, &SqpSettings::default()).unwrap();
        assert_eq!(r.status, OptimizationStatus::Converged);
        assert_feasible(&r, 0.17);
        assert!((r.performance.risk - 0.17).abs() < 1e-5);
        assert!((r.weights[0] - 0.595923).abs() < 1e-3, "{:?}", r.weights);
    }

    #[test]
    fn test_zero_tolerance_is_infeasible() {
        let (mu, cov) = two_asset();
        let r = optimize(&mu, &cov, 0.0, None, &SqpSettings::default()).unwrap();
        assert_eq!(r.status, OptimizationStatus::Infeasible);
        assert!(!r.reliable);
        // Minimum-variance weights are handed back for inspection.
        assert!((r.weights[0] - 9.0 / 13.0).abs() < 1e-3);
    }

    #[test]
    fn test_single_asset() {
        let mu = vec![0.1];
        let cov = vec![vec![0.04]];
        let r = optimize(&mu, &cov, 0.25, None, &SqpSettings::default()).unwrap();
        assert_eq!(r.status, OptimizationStatus::Converged);
        assert!((r.weights[0] - 1.0).abs() < 1e-12);

        let r = optimize(&mu, &cov, 0.1, None, &SqpSettings::default()).unwrap();
        assert_eq!(r.status, OptimizationStatus::Infeasible);
    }

    #[test]
    fn test_ceiling_at_min_variance_risk_returns_min_variance() {
        let (mu, cov) = two_asset();
        let settings = SqpSettings::default();
        let mv = min_variance(&mu, &cov, &settings).unwrap();
        let r = optimize(&mu, &cov, mv.performance.risk, None, &settings).unwrap();
        assert_eq!(r.status, OptimizationStatus::Converged);
        assert!(r.reliable);
        assert_eq!(r.weights, mv.weights);
        assert!((r.weights[0] - 9.0 / 13.0).abs() < 1e-4);
    }

    #[test]
    fn test_riskless_asset_short_circuits_to_min_variance() {
        let mu = vec![0.05, 0.10];
        let cov = vec![vec![0.0, 0.0], vec![0.0, 0.04]];
        let r = optimize(&mu, &cov, 0.25, None, &SqpSettings::default()).unwrap();
        assert_eq!(r.status, OptimizationStatus::Degenerate);
        assert!(!r.reliable);
        assert!(r.weights[0] > 1.0 - 1e-6, "{:?}", r.weights);
    }

    #[test]
    fn test_explicit_initial_weights() {
        let (mu, cov) = three_asset();
        let start = [0.8, 0.1, 0.1];
        let r = optimize(&mu, &cov, 0.2, Some(&start), &SqpSettings::default()).unwrap();
        assert_eq!(r.status, OptimizationStatus::Converged);
        assert_feasible(&r, 0.2);
        assert!((r.performance.sharpe_ratio.unwrap() - 0.833953).abs() < 1e-4);
    }

    #[test]
    fn test_validation_errors() {
        let (mu, cov) = two_asset();
        let s = SqpSettings::default();

        let err = optimize(&[], &[], 0.2, None, &s).unwrap_err();
        assert!(matches!(err, RiskcapError::InsufficientData(_)));

        let err = optimize(&[0.1], &cov, 0.2, None, &s).unwrap_err();
        assert!(matches!(err, RiskcapError::InvalidInput { .. }));

        let asym = vec![vec![0.04, 0.01], vec![0.02, 0.09]];
        assert!(optimize(&mu, &asym, 0.2, None, &s).is_err());

        let ragged = vec![vec![0.04, 0.0], vec![0.0]];
        assert!(optimize(&mu, &ragged, 0.2, None, &s).is_err());

        let neg_var = vec![vec![-0.04, 0.0], vec![0.0, 0.09]];
        assert!(optimize(&mu, &neg_var, 0.2, None, &s).is_err());

        let nan = vec![vec![0.04, f64::NAN], vec![f64::NAN, 0.09]];
        assert!(optimize(&mu, &nan, 0.2, None, &s).is_err());

        assert!(optimize(&mu, &cov, -0.1, None, &s).is_err());
        assert!(optimize(&mu, &cov, f64::INFINITY, None, &s).is_err());
        assert!(optimize(&mu, &cov, 0.2, Some(&[1.0]), &s).is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let (mu, cov) = two_asset();
        let input = SharpeInput {
            asset_names: vec!["AAA".into(), "AAA".into()],
            mean_returns: mu,
            covariance_matrix: cov,
            risk_tolerance: 0.25,
            initial_weights: None,
            solver: None,
        };
        let err = optimize_max_sharpe(&input).unwrap_err();
        assert!(matches!(err, RiskcapError::InvalidInput { ref field, .. } if field == "asset_names"));
    }

    #[test]
    fn test_envelope_contributions_sum_to_totals() {
        let (mu, cov) = three_asset();
        let input = SharpeInput {
            asset_names: vec!["A".into(), "B".into(), "C".into()],
            mean_returns: mu,
            covariance_matrix: cov,
            risk_tolerance: 0.14,
            initial_weights: None,
            solver: None,
        };
        let out = optimize_max_sharpe(&input).unwrap();
        let res = &out.result;
        assert_eq!(res.status, OptimizationStatus::Converged);
        assert!(res.risk_ceiling_binding);
        let ret: f64 = res.allocations.iter().map(|a| a.contribution_to_return).sum();
        let risk: f64 = res.allocations.iter().map(|a| a.contribution_to_risk).sum();
        assert!((ret - res.performance.expected_return).abs() < 1e-12);
        assert!((risk - res.performance.risk).abs() < 1e-12);
        assert!(out.warnings.iter().any(|w| w.contains("Risk ceiling is binding")));
        assert!(out.warnings.iter().any(|w| w.contains("Concentrated position: A")));
        assert_eq!(out.metadata.precision, "ieee754_f64");
    }

    #[test]
    fn test_envelope_flags_infeasible() {
        let (mu, cov) = three_asset();
        let input = SharpeInput {
            asset_names: vec!["A".into(), "B".into(), "C".into()],
            mean_returns: mu,
            covariance_matrix: cov,
            risk_tolerance: 0.125,
            initial_weights: None,
            solver: None,
        };
        let out = optimize_max_sharpe(&input).unwrap();
        assert_eq!(out.result.status, OptimizationStatus::Infeasible);
        assert!(!out.result.reliable);
        assert!(out.warnings.iter().any(|w| w.contains("below the minimum")));
        assert!((out.result.min_variance_portfolio.performance.risk - 0.132329).abs() < 1e-4);
    }

    #[test]
    fn test_status_display_matches_serde() {
        let s = OptimizationStatus::IterationLimit;
        assert_eq!(s.to_string(), "iteration_limit");
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"iteration_limit\"");
    }

    #[test]
    fn test_max_asset_volatility() {
        let (_, cov) = three_asset();
        assert!((max_asset_volatility(&cov) - 0.35).abs() < 1e-12);
    }
}
