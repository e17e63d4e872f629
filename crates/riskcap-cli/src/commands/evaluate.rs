use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;

use riskcap_core::allocation::performance;
use riskcap_core::types::{with_metadata, Rate, Weight};

use crate::input;

#[derive(Args)]
pub struct EvaluateArgs {
    /// JSON or YAML file with mean returns, covariance and weights
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EvaluateInput {
    pub mean_returns: Vec<Rate>,
    pub covariance_matrix: Vec<Vec<f64>>,
    pub weights: Vec<Weight>,
}

pub fn run_evaluate(args: EvaluateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let eval_input: EvaluateInput = input::load(args.input.as_deref(), "portfolio evaluation")?;

    let perf = performance::evaluate(
        &eval_input.mean_returns,
        &eval_input.covariance_matrix,
        &eval_input.weights,
    )?;

    let mut warnings = Vec::new();
    let total: f64 = eval_input.weights.iter().sum();
    if (total - 1.0).abs() > 1e-6 {
        warnings.push(format!("Weights sum to {:.6}, not 1", total));
    }
    if perf.sharpe_ratio.is_none() {
        warnings.push("Portfolio has zero risk; Sharpe ratio undefined".to_string());
    }

    let output = with_metadata(
        "Portfolio expected return w'mu, risk sqrt(w'Sigma w), Sharpe ratio with zero risk-free rate",
        &json!({ "assets": eval_input.weights.len() }),
        warnings,
        start.elapsed().as_micros() as u64,
        perf,
    );
    Ok(serde_json::to_value(output)?)
}
