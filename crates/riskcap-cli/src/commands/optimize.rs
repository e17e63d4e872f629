use clap::Args;
use serde_json::Value;

use riskcap_core::allocation::optimizer::{self, SharpeInput};

use crate::input;

#[derive(Args)]
pub struct OptimizeArgs {
    /// JSON or YAML file with mean returns, covariance and risk tolerance
    #[arg(long)]
    pub input: Option<String>,

    /// Override the file's risk tolerance (annualised volatility, 0.2 = 20%)
    #[arg(long)]
    pub risk_tolerance: Option<f64>,

    /// Override the solver's iteration budget
    #[arg(long)]
    pub max_iterations: Option<u32>,
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut sharpe_input: SharpeInput =
        input::load(args.input.as_deref(), "max-Sharpe optimisation")?;
    if let Some(tol) = args.risk_tolerance {
        sharpe_input.risk_tolerance = tol;
    }
    if let Some(max_iterations) = args.max_iterations {
        let mut settings = sharpe_input.solver.unwrap_or_default();
        settings.max_iterations = max_iterations;
        sharpe_input.solver = Some(settings);
    }

    let result = optimizer::optimize_max_sharpe(&sharpe_input)?;
    Ok(serde_json::to_value(result)?)
}
