use clap::Args;
use serde_json::Value;

use riskcap_core::allocation::frontier::{self, FrontierInput};

use crate::input;

#[derive(Args)]
pub struct FrontierArgs {
    /// JSON or YAML file with asset names, mean returns and covariance
    #[arg(long)]
    pub input: Option<String>,

    /// Number of risk ceilings to solve for
    #[arg(long)]
    pub points: Option<u32>,
}

pub fn run_frontier(args: FrontierArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut frontier_input: FrontierInput = input::load(args.input.as_deref(), "frontier sweep")?;
    if args.points.is_some() {
        frontier_input.points = args.points;
    }
    let result = frontier::trace_frontier(&frontier_input)?;
    Ok(serde_json::to_value(result)?)
}
