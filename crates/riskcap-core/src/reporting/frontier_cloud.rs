use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::allocation::optimizer::validate_market_data;
use crate::allocation::performance::evaluate;
use crate::error::RiskcapError;
use crate::types::{Rate, Weight};
use crate::RiskcapResult;

pub const DEFAULT_PORTFOLIOS: usize = 1000;

/// A portfolio placed in risk/return space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudPoint {
    pub weights: Vec<Weight>,
    pub risk: Rate,
    pub expected_return: Rate,
    pub sharpe_ratio: Option<f64>,
}

/// Random long-only portfolios and, optionally, the optimum, ready to be
/// drawn as an efficient-frontier scatter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierCloud {
    pub seed: u64,
    pub points: Vec<CloudPoint>,
    pub optimal: Option<CloudPoint>,
}

impl FrontierCloud {
    /// Highest Sharpe ratio among the random portfolios.
    pub fn best_sampled_sharpe(&self) -> Option<f64> {
        self.points
            .iter()
            .filter_map(|p| p.sharpe_ratio)
            .fold(None, |best, s| Some(best.map_or(s, |b: f64| b.max(s))))
    }
}

/// Draw `count` random long-only portfolios, each a vector of independent
/// uniforms normalised to sum to one, from a seeded `StdRng`.
pub fn random_portfolios(
    mean_returns: &[Rate],
    covariance_matrix: &[Vec<f64>],
    count: usize,
    seed: u64,
    optimal_weights: Option<&[Weight]>,
) -> RiskcapResult<FrontierCloud> {
    validate_market_data(mean_returns, covariance_matrix)?;
    if count == 0 {
        return Err(RiskcapError::InvalidInput {
            field: "count".into(),
            reason: "At least one portfolio required".into(),
        });
    }
    let n = mean_returns.len();
    if let Some(w) = optimal_weights {
        if w.len() != n {
            return Err(RiskcapError::InvalidInput {
                field: "optimal_weights".into(),
                reason: format!("Expected {} weights but got {}", n, w.len()),
            });
        }
    }

    let place = |weights: Vec<Weight>| -> RiskcapResult<CloudPoint> {
        let performance = evaluate(mean_returns, covariance_matrix, &weights)?;
        Ok(CloudPoint {
            weights,
            risk: performance.risk,
            expected_return: performance.expected_return,
            sharpe_ratio: performance.sharpe_ratio,
        })
    };

    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(count);
    while points.len() < count {
        let raw: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
        let total: f64 = raw.iter().sum();
        if total <= 0.0 {
            continue;
        }
        points.push(place(raw.into_iter().map(|v| v / total).collect())?);
    }

    Ok(FrontierCloud {
        seed,
        points,
        optimal: optimal_weights.map(|w| place(w.to_vec())).transpose()?,
    })
}
