#![cfg(feature = "reporting")]

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use riskcap_core::allocation::optimizer::{optimize, OptimizationStatus};
use riskcap_core::estimation::returns::ReturnSeries;
use riskcap_core::reporting::allocation::allocation_report;
use riskcap_core::reporting::evolution::{performance_evolution, DEFAULT_WINDOW};
use riskcap_core::reporting::frontier_cloud::random_portfolios;
use riskcap_core::solver::SqpSettings;
use rust_decimal_macros::dec;

fn market() -> (Vec<String>, Vec<f64>, Vec<Vec<f64>>) {
    (
        vec!["AAPL".into(), "MSFT".into()],
        vec![0.10, 0.20],
        vec![vec![0.04, 0.0], vec![0.0, 0.09]],
    )
}

#[test]
fn test_report_for_two_asset_optimum() {
    let (names, mu, cov) = market();
    let result = optimize(&mu, &cov, 0.25, None, &SqpSettings::default()).unwrap();
    let report = allocation_report(&names, &result).unwrap();

    let pct: Vec<_> = report.lines.iter().map(|l| l.percentage).collect();
    assert_eq!(pct, vec![dec!(52.94), dec!(47.06)]);
    assert_eq!(report.risk_pct, dec!(17.65));
    assert_eq!(report.sharpe_ratio, Some(dec!(0.83)));
    assert_eq!(report.status, OptimizationStatus::Converged);
    assert!(report.to_string().contains("AAPL"));
}

#[test]
fn test_cloud_never_beats_optimum() {
    let (_, mu, cov) = market();
    let result = optimize(&mu, &cov, 0.25, None, &SqpSettings::default()).unwrap();
    let cloud = random_portfolios(&mu, &cov, 500, 42, Some(&result.weights)).unwrap();
    let optimal = cloud.optimal.as_ref().unwrap().sharpe_ratio.unwrap();
    assert!(cloud.best_sampled_sharpe().unwrap() <= optimal + 1e-9);
}

#[test]
fn test_evolution_over_a_month() {
    let dates: Vec<NaiveDate> = (1..=30)
        .map(|d| NaiveDate::from_ymd_opt(2024, 4, d).unwrap())
        .collect();
    let a: Vec<f64> = (0..30).map(|t| if t % 2 == 0 { 0.01 } else { -0.005 }).collect();
    let b: Vec<f64> = vec![0.001; 30];
    let series = ReturnSeries {
        tickers: vec!["A".into(), "B".into()],
        dates: dates.clone(),
        returns: vec![a, b],
    };

    let pts = performance_evolution(&series, &[0.5, 0.5], DEFAULT_WINDOW, 252.0).unwrap();
    assert_eq!(pts.len(), 30);
    assert_eq!(pts[29].date, dates[29]);
    assert_eq!(
        pts.iter().filter(|p| p.rolling_volatility.is_some()).count(),
        30 - DEFAULT_WINDOW + 1
    );
    let growth: f64 = pts.iter().map(|p| 1.0 + p.portfolio_return).product();
    assert!((pts[29].cumulative_return - (growth - 1.0)).abs() < 1e-12);
}
