use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::RiskcapError;
use crate::types::{with_metadata, ComputationOutput, Matrix, Rate};
use crate::RiskcapResult;

const THIN_SAMPLE_WARNING: usize = 30;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Frequency of price observations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
}

impl ReturnFrequency {
    /// Number of periods in a year for annualisation
    pub fn periods_per_year(&self) -> f64 {
        match self {
            ReturnFrequency::Daily => 252.0,
            ReturnFrequency::Weekly => 52.0,
            ReturnFrequency::Monthly => 12.0,
            ReturnFrequency::Quarterly => 4.0,
            ReturnFrequency::Annual => 1.0,
        }
    }
}

/// One adjusted close. `None` marks a missing observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub adj_close: Option<f64>,
}

/// Price history of a single asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetPrices {
    pub ticker: String,
    pub prices: Vec<PricePoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistoryInput {
    /// Asset universe in order; output vectors follow this order.
    pub assets: Vec<AssetPrices>,
    /// Inclusive lower date bound.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper date bound.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub frequency: ReturnFrequency,
}

/// Period returns aligned across assets. `returns[i][t]` is asset `i`'s
/// return ending on `dates[t]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub tickers: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub returns: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEstimates {
    pub tickers: Vec<String>,
    /// Annualised mean period return per asset.
    pub mean_returns: Vec<Rate>,
    /// Annualised sample covariance of period returns.
    pub covariance_matrix: Matrix,
    /// Square roots of the covariance diagonal.
    pub volatilities: Vec<Rate>,
    pub observations: usize,
    pub periods_per_year: f64,
    /// Dates discarded because some asset had no usable price.
    pub dropped_dates: Vec<NaiveDate>,
    pub return_series: ReturnSeries,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Estimate annualised mean returns and covariance from adjusted closes.
///
/// Prices are aligned on the union of dates within the requested range. A
/// date where any asset's price is missing, non-finite or non-positive is
/// dropped for every asset before percentage changes are taken.
#[allow(clippy::needless_range_loop)]
pub fn estimate_moments(
    input: &PriceHistoryInput,
) -> RiskcapResult<ComputationOutput<MarketEstimates>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_input(input)?;
    let tickers: Vec<String> = input.assets.iter().map(|a| a.ticker.clone()).collect();
    let ppy = input.frequency.periods_per_year();

    let aligned = align_prices(input)?;
    let mut kept_dates: Vec<NaiveDate> = Vec::with_capacity(aligned.len());
    let mut kept_rows: Vec<Vec<f64>> = Vec::with_capacity(aligned.len());
    let mut dropped_dates = Vec::new();
    for (date, row) in aligned {
        let usable: Option<Vec<f64>> = row
            .into_iter()
            .map(|p| p.filter(|v| v.is_finite() && *v > 0.0))
            .collect();
        match usable {
            Some(prices) => {
                kept_dates.push(date);
                kept_rows.push(prices);
            }
            None => dropped_dates.push(date),
        }
    }
    if !dropped_dates.is_empty() {
        debug!(count = dropped_dates.len(), "dropped dates with missing prices");
        warnings.push(format!(
            "{} date(s) dropped because at least one asset had no usable price",
            dropped_dates.len()
        ));
    }

    let returns: Vec<Vec<f64>> = (0..tickers.len())
        .map(|i| {
            let column: Vec<f64> = kept_rows.iter().map(|row| row[i]).collect();
            pct_change(&column)
        })
        .collect();
    let observations = returns.first().map_or(0, |r| r.len());
    if observations < 2 {
        return Err(RiskcapError::InsufficientData(format!(
            "At least 2 aligned return observations required, got {}",
            observations
        )));
    }
    if observations < THIN_SAMPLE_WARNING {
        warn!(observations, "thin sample for moment estimation");
        warnings.push(format!(
            "Only {} return observations; estimates are noisy",
            observations
        ));
    }

    let mean_returns: Vec<Rate> = returns.iter().map(|r| r.iter().mean() * ppy).collect();
    let n = returns.len();
    let mut covariance_matrix: Matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let c = returns[i].iter().covariance(returns[j].iter()) * ppy;
            covariance_matrix[i][j] = c;
            covariance_matrix[j][i] = c;
        }
    }
    let volatilities: Vec<Rate> = covariance_matrix
        .iter()
        .enumerate()
        .map(|(i, row)| row[i].max(0.0).sqrt())
        .collect();

    for (ticker, vol) in tickers.iter().zip(volatilities.iter()) {
        if *vol == 0.0 {
            warnings.push(format!("{} has zero return variance", ticker));
        }
    }

    let output = MarketEstimates {
        tickers: tickers.clone(),
        mean_returns,
        covariance_matrix,
        volatilities,
        observations,
        periods_per_year: ppy,
        dropped_dates,
        return_series: ReturnSeries {
            tickers,
            dates: kept_dates.into_iter().skip(1).collect(),
            returns,
        },
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Sample moments of simple period returns, annualised",
        &serde_json::json!({
            "n_assets": input.assets.len(),
            "frequency": input.frequency,
            "periods_per_year": ppy,
            "start_date": input.start_date,
            "end_date": input.end_date,
            "covariance": "sample (n - 1)",
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Simple period-over-period returns `p[t] / p[t-1] - 1`. The first period
/// has no return and is dropped.
pub fn pct_change(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn in_range(date: NaiveDate, input: &PriceHistoryInput) -> bool {
    input.start_date.map_or(true, |s| date >= s) && input.end_date.map_or(true, |e| date <= e)
}

/// Rows keyed by date over the union of all in-range dates; `None` where an
/// asset has no observation on that date.
fn align_prices(input: &PriceHistoryInput) -> RiskcapResult<BTreeMap<NaiveDate, Vec<Option<f64>>>> {
    let n = input.assets.len();
    let mut rows: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();

    for (i, asset) in input.assets.iter().enumerate() {
        let mut seen = HashSet::new();
        let mut usable = 0usize;
        for point in asset.prices.iter().filter(|p| in_range(p.date, input)) {
            if !seen.insert(point.date) {
                return Err(RiskcapError::InvalidInput {
                    field: format!("assets[{}].prices", i),
                    reason: format!("Duplicate date {} for {}", point.date, asset.ticker),
                });
            }
            if point.adj_close.is_some_and(|v| v.is_finite() && v > 0.0) {
                usable += 1;
            }
            rows.entry(point.date).or_insert_with(|| vec![None; n])[i] = point.adj_close;
        }
        if usable == 0 {
            return Err(RiskcapError::InputUnavailable {
                ticker: asset.ticker.clone(),
                reason: "no usable prices in the requested date range".into(),
            });
        }
    }
    Ok(rows)
}

fn validate_input(input: &PriceHistoryInput) -> RiskcapResult<()> {
    if input.assets.is_empty() {
        return Err(RiskcapError::InsufficientData(
            "At least one asset required".into(),
        ));
    }
    if let (Some(s), Some(e)) = (input.start_date, input.end_date) {
        if s > e {
            return Err(RiskcapError::DateError(format!(
                "start_date {} is after end_date {}",
                s, e
            )));
        }
    }
    let mut seen = HashSet::new();
    for asset in &input.assets {
        if asset.ticker.trim().is_empty() {
            return Err(RiskcapError::InvalidInput {
                field: "assets.ticker".into(),
                reason: "Ticker must not be empty".into(),
            });
        }
        if !seen.insert(asset.ticker.as_str()) {
            return Err(RiskcapError::InvalidInput {
                field: "assets.ticker".into(),
                reason: format!("Duplicate ticker '{}'", asset.ticker),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn asset(ticker: &str, closes: &[(u32, Option<f64>)]) -> AssetPrices {
        AssetPrices {
            ticker: ticker.into(),
            prices: closes
                .iter()
                .map(|&(day, adj_close)| PricePoint {
                    date: d(day),
                    adj_close,
                })
                .collect(),
        }
    }

    fn input(assets: Vec<AssetPrices>) -> PriceHistoryInput {
        PriceHistoryInput {
            assets,
            start_date: None,
            end_date: None,
            frequency: ReturnFrequency::Daily,
        }
    }

    #[test]
    fn test_pct_change() {
        let r = pct_change(&[100.0, 110.0, 99.0]);
        assert_eq!(r.len(), 2);
        assert!((r[0] - 0.10).abs() < 1e-15);
        assert!((r[1] + 0.10).abs() < 1e-15);
    }

    #[test]
    fn test_annualised_moments() {
        let a = asset("A", &[(2, Some(100.0)), (3, Some(110.0)), (4, Some(99.0)), (5, Some(99.0))]);
        let b = asset("B", &[(2, Some(50.0)), (3, Some(50.0)), (4, Some(55.0)), (5, Some(44.0))]);
        let out = estimate_moments(&input(vec![a, b])).unwrap().result;

        // A returns: 0.1, -0.1, 0.0; B returns: 0.0, 0.1, -0.2
        assert_eq!(out.observations, 3);
        assert!((out.mean_returns[0] - 0.0).abs() < 1e-12);
        assert!((out.mean_returns[1] - (-0.1 / 3.0) * 252.0).abs() < 1e-10);
        // var(A) = (0.01 + 0.01 + 0) / 2 = 0.01
        assert!((out.covariance_matrix[0][0] - 0.01 * 252.0).abs() < 1e-10);
        // cov(A, B) = sum((a - 0)(b + 1/30)) / 2 = (0.1 * 1/30 - 0.1 * 4/30 + 0) / 2 = -0.005
        assert!((out.covariance_matrix[0][1] - (-0.005 * 252.0)).abs() < 1e-10);
        assert_eq!(out.covariance_matrix[0][1], out.covariance_matrix[1][0]);
        assert_eq!(out.return_series.dates, vec![d(3), d(4), d(5)]);
    }

    #[test]
    fn test_missing_and_nan_dates_dropped() {
        let a = asset(
            "A",
            &[(2, Some(100.0)), (3, Some(f64::NAN)), (4, Some(110.0)), (5, Some(121.0)), (8, Some(133.1))],
        );
        let b = asset("B", &[(2, Some(10.0)), (3, Some(11.0)), (4, Some(11.0)), (8, Some(11.0))]);
        let out = estimate_moments(&input(vec![a, b])).unwrap();
        let est = &out.result;
        // Day 3 (NaN for A) and day 5 (absent for B) are dropped.
        assert_eq!(est.dropped_dates, vec![d(3), d(5)]);
        assert_eq!(est.return_series.dates, vec![d(4), d(8)]);
        assert!((est.return_series.returns[0][0] - 0.10).abs() < 1e-12);
        assert!((est.return_series.returns[0][1] - 0.21).abs() < 1e-12);
        assert!(out.warnings.iter().any(|w| w.contains("2 date(s) dropped")));
    }

    #[test]
    fn test_missing_ticker_is_input_unavailable() {
        let a = asset("A", &[(2, Some(100.0)), (3, Some(101.0)), (4, Some(102.0))]);
        let b = asset("GONE", &[]);
        let err = estimate_moments(&input(vec![a, b])).unwrap_err();
        match err {
            RiskcapError::InputUnavailable { ticker, .. } => assert_eq!(ticker, "GONE"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_all_nan_ticker_is_input_unavailable() {
        let a = asset("A", &[(2, Some(100.0)), (3, Some(101.0))]);
        let b = asset("B", &[(2, None), (3, Some(f64::NAN))]);
        assert!(matches!(
            estimate_moments(&input(vec![a, b])),
            Err(RiskcapError::InputUnavailable { .. })
        ));
    }

    #[test]
    fn test_date_range_filter() {
        let a = asset(
            "A",
            &[(2, Some(100.0)), (3, Some(200.0)), (4, Some(210.0)), (5, Some(220.5)), (8, Some(500.0))],
        );
        let mut inp = input(vec![a]);
        inp.start_date = Some(d(3));
        inp.end_date = Some(d(5));
        let est = estimate_moments(&inp).unwrap().result;
        assert_eq!(est.observations, 2);
        assert!((est.return_series.returns[0][0] - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_too_few_returns() {
        let a = asset("A", &[(2, Some(100.0)), (3, Some(101.0))]);
        assert!(matches!(
            estimate_moments(&input(vec![a])),
            Err(RiskcapError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_inverted_range_is_date_error() {
        let a = asset("A", &[(2, Some(100.0))]);
        let mut inp = input(vec![a]);
        inp.start_date = Some(d(9));
        inp.end_date = Some(d(2));
        assert!(matches!(estimate_moments(&inp), Err(RiskcapError::DateError(_))));
    }

    #[test]
    fn test_frequency_defaults_to_daily() {
        let json = r#"{"assets": [{"ticker": "A", "prices": []}]}"#;
        let inp: PriceHistoryInput = serde_json::from_str(json).unwrap();
        assert_eq!(inp.frequency, ReturnFrequency::Daily);
        assert_eq!(inp.frequency.periods_per_year(), 252.0);
    }
}
