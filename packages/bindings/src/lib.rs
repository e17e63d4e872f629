use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;

use riskcap_core::allocation::optimizer::OptimizationResult;
use riskcap_core::estimation::returns::ReturnSeries;
use riskcap_core::reporting::evolution::DEFAULT_WINDOW;
use riskcap_core::reporting::frontier_cloud::DEFAULT_PORTFOLIOS;
use riskcap_core::types::{Rate, Weight};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

#[napi]
pub fn optimize_max_sharpe(input_json: String) -> NapiResult<String> {
    let input: riskcap_core::allocation::optimizer::SharpeInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = riskcap_core::allocation::optimizer::optimize_max_sharpe(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[derive(Deserialize)]
struct EvaluateInput {
    mean_returns: Vec<Rate>,
    covariance_matrix: Vec<Vec<f64>>,
    weights: Vec<Weight>,
}

#[napi]
pub fn evaluate_portfolio(input_json: String) -> NapiResult<String> {
    let input: EvaluateInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = riskcap_core::allocation::performance::evaluate(
        &input.mean_returns,
        &input.covariance_matrix,
        &input.weights,
    )
    .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn trace_frontier(input_json: String) -> NapiResult<String> {
    let input: riskcap_core::allocation::frontier::FrontierInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        riskcap_core::allocation::frontier::trace_frontier(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------

#[napi]
pub fn estimate_moments(input_json: String) -> NapiResult<String> {
    let input: riskcap_core::estimation::returns::PriceHistoryInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        riskcap_core::estimation::returns::estimate_moments(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ReportInput {
    asset_names: Vec<String>,
    result: OptimizationResult,
}

#[napi]
pub fn allocation_report(input_json: String) -> NapiResult<String> {
    let input: ReportInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        riskcap_core::reporting::allocation::allocation_report(&input.asset_names, &input.result)
            .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[derive(Deserialize)]
struct CloudInput {
    mean_returns: Vec<Rate>,
    covariance_matrix: Vec<Vec<f64>>,
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    seed: u64,
    #[serde(default)]
    optimal_weights: Option<Vec<Weight>>,
}

#[napi]
pub fn frontier_cloud(input_json: String) -> NapiResult<String> {
    let input: CloudInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = riskcap_core::reporting::frontier_cloud::random_portfolios(
        &input.mean_returns,
        &input.covariance_matrix,
        input.count.unwrap_or(DEFAULT_PORTFOLIOS),
        input.seed,
        input.optimal_weights.as_deref(),
    )
    .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[derive(Deserialize)]
struct EvolutionInput {
    return_series: ReturnSeries,
    weights: Vec<Weight>,
    #[serde(default)]
    window: Option<usize>,
    #[serde(default)]
    periods_per_year: Option<f64>,
}

#[napi]
pub fn performance_evolution(input_json: String) -> NapiResult<String> {
    let input: EvolutionInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = riskcap_core::reporting::evolution::performance_evolution(
        &input.return_series,
        &input.weights,
        input.window.unwrap_or(DEFAULT_WINDOW),
        input.periods_per_year.unwrap_or(252.0),
    )
    .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
