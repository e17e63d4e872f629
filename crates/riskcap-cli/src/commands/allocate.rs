use clap::Args;
use serde_json::{json, Value};

use riskcap_core::allocation::optimizer::{self, OptimizationResult, SharpeInput};
use riskcap_core::reporting::allocation::allocation_report;
use riskcap_core::solver::SqpSettings;

use super::estimate::PriceArgs;

#[derive(Args)]
pub struct AllocateArgs {
    #[command(flatten)]
    pub prices: PriceArgs,

    /// Maximum acceptable annualised volatility (0.2 = 20%)
    #[arg(long)]
    pub risk_tolerance: f64,

    /// Solver iteration budget
    #[arg(long, default_value_t = 100)]
    pub max_iterations: u32,
}

/// Prices to estimates to max-Sharpe weights to a rounded report.
pub fn run_allocate(args: AllocateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let estimates = args.prices.estimate()?;
    let est = &estimates.result;

    let sharpe_input = SharpeInput {
        asset_names: est.tickers.clone(),
        mean_returns: est.mean_returns.clone(),
        covariance_matrix: est.covariance_matrix.clone(),
        risk_tolerance: args.risk_tolerance,
        initial_weights: None,
        solver: Some(SqpSettings {
            max_iterations: args.max_iterations,
            ..SqpSettings::default()
        }),
    };
    let solved = optimizer::optimize_max_sharpe(&sharpe_input)?;
    let out = &solved.result;

    let result = OptimizationResult {
        weights: out.allocations.iter().map(|a| a.weight).collect(),
        performance: out.performance,
        status: out.status,
        iterations: out.iterations,
        constraint_violation: out.constraint_violation,
        reliable: out.reliable,
    };
    let report = allocation_report(&est.tickers, &result)?;
    tracing::debug!("\n{}", report);

    let mut warnings = estimates.warnings.clone();
    warnings.extend(solved.warnings.iter().cloned());

    Ok(json!({
        "result": {
            "report": report,
            "allocation": out,
            "observations": est.observations,
            "dropped_dates": est.dropped_dates,
        },
        "methodology": solved.methodology,
        "assumptions": {
            "estimation": estimates.assumptions,
            "optimisation": solved.assumptions,
        },
        "warnings": warnings,
        "metadata": {
            "version": solved.metadata.version,
            "computation_time_us": estimates.metadata.computation_time_us
                + solved.metadata.computation_time_us,
            "precision": solved.metadata.precision,
        },
    }))
}
