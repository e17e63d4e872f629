use clap::Args;
use serde_json::{json, Value};
use std::time::Instant;

use riskcap_core::allocation::optimizer;
use riskcap_core::reporting::evolution::{performance_evolution, DEFAULT_WINDOW};
use riskcap_core::solver::SqpSettings;
use riskcap_core::types::with_metadata;

use super::estimate::PriceArgs;

#[derive(Args)]
pub struct EvolutionArgs {
    #[command(flatten)]
    pub prices: PriceArgs,

    /// Comma-separated weights in ticker column order
    #[arg(long, value_delimiter = ',', conflicts_with = "risk_tolerance")]
    pub weights: Option<Vec<f64>>,

    /// Solve for max-Sharpe weights under this ceiling instead
    #[arg(long)]
    pub risk_tolerance: Option<f64>,

    /// Rolling volatility window, in periods
    #[arg(long, default_value_t = DEFAULT_WINDOW)]
    pub window: usize,
}

pub fn run_evolution(args: EvolutionArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let estimates = args.prices.estimate()?;
    let est = &estimates.result;
    let mut warnings = estimates.warnings.clone();

    let weights = match (args.weights, args.risk_tolerance) {
        (Some(w), _) => w,
        (None, Some(tol)) => {
            let solved = optimizer::optimize(
                &est.mean_returns,
                &est.covariance_matrix,
                tol,
                None,
                &SqpSettings::default(),
            )?;
            if !solved.reliable {
                warnings.push(format!(
                    "Replaying unreliable weights: solver finished with status {}",
                    solved.status
                ));
            }
            solved.weights
        }
        (None, None) => return Err("--weights or --risk-tolerance required".into()),
    };

    let points = performance_evolution(
        &est.return_series,
        &weights,
        args.window,
        est.periods_per_year,
    )?;

    let output = with_metadata(
        "Fixed-weight portfolio replayed over historical period returns",
        &json!({ "window": args.window, "periods_per_year": est.periods_per_year }),
        warnings,
        start.elapsed().as_micros() as u64,
        json!({ "tickers": est.tickers, "weights": weights, "points": points }),
    );
    Ok(serde_json::to_value(output)?)
}
