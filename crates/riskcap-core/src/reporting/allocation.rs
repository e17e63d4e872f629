use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::allocation::optimizer::{OptimizationResult, OptimizationStatus};
use crate::error::RiskcapError;
use crate::RiskcapResult;

/// One asset's line in the allocation summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub asset: String,
    /// Weight rounded to 4 dp.
    pub weight: Decimal,
    /// Weight in percent, rounded to 2 dp.
    pub percentage: Decimal,
}

/// Display-ready summary of an optimisation result. Figures are rounded
/// decimals, so the report is stable to print and compare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationReport {
    pub lines: Vec<AllocationLine>,
    pub expected_return_pct: Decimal,
    pub risk_pct: Decimal,
    pub sharpe_ratio: Option<Decimal>,
    pub status: OptimizationStatus,
    pub reliable: bool,
}

/// Build the allocation summary for `result`, pairing weights with
/// `asset_names` by position.
pub fn allocation_report(
    asset_names: &[String],
    result: &OptimizationResult,
) -> RiskcapResult<AllocationReport> {
    if asset_names.len() != result.weights.len() {
        return Err(RiskcapError::InvalidInput {
            field: "asset_names".into(),
            reason: format!(
                "Expected {} names but got {}",
                result.weights.len(),
                asset_names.len()
            ),
        });
    }

    let lines = asset_names
        .iter()
        .zip(result.weights.iter())
        .map(|(name, &w)| {
            let weight = to_decimal("weights", w)?;
            Ok(AllocationLine {
                asset: name.clone(),
                weight: weight.round_dp(4),
                percentage: (weight * dec!(100)).round_dp(2),
            })
        })
        .collect::<RiskcapResult<Vec<_>>>()?;

    let perf = &result.performance;
    let sharpe_ratio = match perf.sharpe_ratio {
        Some(s) => Some(to_decimal("sharpe_ratio", s)?.round_dp(2)),
        None => None,
    };

    Ok(AllocationReport {
        lines,
        expected_return_pct: (to_decimal("expected_return", perf.expected_return)? * dec!(100))
            .round_dp(2),
        risk_pct: (to_decimal("risk", perf.risk)? * dec!(100)).round_dp(2),
        sharpe_ratio,
        status: result.status,
        reliable: result.reliable,
    })
}

fn to_decimal(field: &str, value: f64) -> RiskcapResult<Decimal> {
    Decimal::from_f64_retain(value).ok_or_else(|| RiskcapError::InvalidInput {
        field: field.into(),
        reason: format!("{} cannot be represented as a decimal", value),
    })
}

impl fmt::Display for AllocationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimal allocation ({})", self.status)?;
        let width = self.lines.iter().map(|l| l.asset.len()).max().unwrap_or(0);
        for line in &self.lines {
            writeln!(f, "  {:<width$}  {:>7}%", line.asset, line.percentage, width = width)?;
        }
        writeln!(f, "Expected annual return: {}%", self.expected_return_pct)?;
        writeln!(f, "Expected volatility:    {}%", self.risk_pct)?;
        match self.sharpe_ratio {
            Some(s) => writeln!(f, "Sharpe ratio:           {}", s)?,
            None => writeln!(f, "Sharpe ratio:           n/a")?,
        }
        if !self.reliable {
            writeln!(f, "WARNING: result is not a converged optimum")?;
        }
        Ok(())
    }
}
