use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use serde_json::Value;

use riskcap_core::estimation::returns::{
    self, MarketEstimates, PriceHistoryInput, ReturnFrequency,
};
use riskcap_core::ComputationOutput;

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FrequencyArg {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
}

impl From<FrequencyArg> for ReturnFrequency {
    fn from(f: FrequencyArg) -> Self {
        match f {
            FrequencyArg::Daily => ReturnFrequency::Daily,
            FrequencyArg::Weekly => ReturnFrequency::Weekly,
            FrequencyArg::Monthly => ReturnFrequency::Monthly,
            FrequencyArg::Quarterly => ReturnFrequency::Quarterly,
            FrequencyArg::Annual => ReturnFrequency::Annual,
        }
    }
}

/// Price history options shared by every command that starts from prices.
#[derive(Args)]
pub struct PriceArgs {
    /// CSV of adjusted closes: a `date` column then one column per ticker
    #[arg(long)]
    pub prices: String,

    /// First date to use (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last date to use (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Spacing of the price observations, used to annualise
    #[arg(long, value_enum, default_value = "daily")]
    pub frequency: FrequencyArg,
}

impl PriceArgs {
    /// Load the CSV and estimate annualised moments.
    pub fn estimate(
        &self,
    ) -> Result<ComputationOutput<MarketEstimates>, Box<dyn std::error::Error>> {
        let history = PriceHistoryInput {
            assets: input::prices::read_prices_csv(&self.prices)?,
            start_date: self.start,
            end_date: self.end,
            frequency: self.frequency.into(),
        };
        tracing::info!(
            assets = history.assets.len(),
            path = %self.prices,
            "loaded price history"
        );
        Ok(returns::estimate_moments(&history)?)
    }
}

#[derive(Args)]
pub struct EstimateArgs {
    #[command(flatten)]
    pub prices: PriceArgs,

    /// Include the aligned period returns in the output
    #[arg(long)]
    pub with_returns: bool,
}

pub fn run_estimate(args: EstimateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut output = args.prices.estimate()?;
    if !args.with_returns {
        output.result.return_series.returns.clear();
        output.result.return_series.dates.clear();
    }
    Ok(serde_json::to_value(output)?)
}
