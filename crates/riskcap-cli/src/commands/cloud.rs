use clap::Args;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;

use riskcap_core::allocation::optimizer;
use riskcap_core::reporting::frontier_cloud::{random_portfolios, DEFAULT_PORTFOLIOS};
use riskcap_core::solver::SqpSettings;
use riskcap_core::types::{with_metadata, Rate};

use crate::input;

#[derive(Args)]
pub struct CloudArgs {
    /// JSON or YAML file with mean returns and covariance
    #[arg(long)]
    pub input: Option<String>,

    /// Number of random portfolios
    #[arg(long, default_value_t = DEFAULT_PORTFOLIOS)]
    pub count: usize,

    /// Seed for the portfolio generator
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Also solve and mark the max-Sharpe portfolio under this ceiling
    #[arg(long)]
    pub risk_tolerance: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MarketInput {
    mean_returns: Vec<Rate>,
    covariance_matrix: Vec<Vec<f64>>,
    #[serde(default)]
    risk_tolerance: Option<Rate>,
}

pub fn run_cloud(args: CloudArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let market: MarketInput = input::load(args.input.as_deref(), "frontier cloud")?;
    let mut warnings = Vec::new();

    let optimal = match args.risk_tolerance.or(market.risk_tolerance) {
        Some(tol) => {
            let solved = optimizer::optimize(
                &market.mean_returns,
                &market.covariance_matrix,
                tol,
                None,
                &SqpSettings::default(),
            )?;
            if solved.reliable {
                Some(solved.weights)
            } else {
                warnings.push(format!(
                    "Optimum not marked: solver finished with status {}",
                    solved.status
                ));
                None
            }
        }
        None => None,
    };

    let cloud = random_portfolios(
        &market.mean_returns,
        &market.covariance_matrix,
        args.count,
        args.seed,
        optimal.as_deref(),
    )?;

    let output = with_metadata(
        "Random long-only portfolios: independent uniforms normalised to sum to one",
        &json!({ "count": args.count, "seed": args.seed }),
        warnings,
        start.elapsed().as_micros() as u64,
        cloud,
    );
    Ok(serde_json::to_value(output)?)
}
