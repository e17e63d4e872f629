use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::error::RiskcapError;
use crate::estimation::returns::ReturnSeries;
use crate::types::{Rate, Weight};
use crate::RiskcapResult;

/// About one trading month of daily observations.
pub const DEFAULT_WINDOW: usize = 21;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionPoint {
    pub date: NaiveDate,
    /// Period return of the fixed-weight portfolio.
    pub portfolio_return: Rate,
    /// Growth of one unit invested at the start, minus one.
    pub cumulative_return: Rate,
    /// Annualised sample volatility over the trailing window; absent until
    /// the window is full.
    pub rolling_volatility: Option<Rate>,
}

/// Replay a fixed allocation over historical returns.
pub fn performance_evolution(
    series: &ReturnSeries,
    weights: &[Weight],
    window: usize,
    periods_per_year: f64,
) -> RiskcapResult<Vec<EvolutionPoint>> {
    if weights.len() != series.returns.len() {
        return Err(RiskcapError::InvalidInput {
            field: "weights".into(),
            reason: format!(
                "Expected {} weights but got {}",
                series.returns.len(),
                weights.len()
            ),
        });
    }
    if window < 2 {
        return Err(RiskcapError::InvalidInput {
            field: "window".into(),
            reason: "Rolling window needs at least 2 observations".into(),
        });
    }
    if !(periods_per_year.is_finite() && periods_per_year > 0.0) {
        return Err(RiskcapError::InvalidInput {
            field: "periods_per_year".into(),
            reason: format!("Must be positive; got {}", periods_per_year),
        });
    }
    if let Some(bad) = series.returns.iter().find(|r| r.len() != series.dates.len()) {
        return Err(RiskcapError::InvalidInput {
            field: "returns".into(),
            reason: format!(
                "Series has {} returns for {} dates",
                bad.len(),
                series.dates.len()
            ),
        });
    }

    let portfolio: Vec<f64> = (0..series.dates.len())
        .map(|t| {
            weights
                .iter()
                .zip(series.returns.iter())
                .map(|(w, r)| w * r[t])
                .sum()
        })
        .collect();

    let annualise = periods_per_year.sqrt();
    let mut growth = 1.0;
    let points = series
        .dates
        .iter()
        .zip(portfolio.iter())
        .enumerate()
        .map(|(t, (&date, &r))| {
            growth *= 1.0 + r;
            let rolling_volatility = if t + 1 >= window {
                Some(portfolio[t + 1 - window..=t].iter().std_dev() * annualise)
            } else {
                None
            };
            EvolutionPoint {
                date,
                portfolio_return: r,
                cumulative_return: growth - 1.0,
                rolling_volatility,
            }
        })
        .collect();
    Ok(points)
}
