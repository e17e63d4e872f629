mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::allocate::AllocateArgs;
use commands::cloud::CloudArgs;
use commands::estimate::EstimateArgs;
use commands::evaluate::EvaluateArgs;
use commands::evolution::EvolutionArgs;
use commands::frontier::FrontierArgs;
use commands::optimize::OptimizeArgs;

/// Risk-constrained maximum-Sharpe portfolio allocation
#[derive(Parser)]
#[command(
    name = "riskcap",
    version,
    about = "Risk-constrained maximum-Sharpe portfolio allocation",
    long_about = "Estimates expected returns and covariances from historical prices and \
                  finds the long-only, fully invested portfolio with the highest Sharpe \
                  ratio whose volatility stays under a ceiling."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log solver progress to stderr (overrides RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Maximise the Sharpe ratio under a volatility ceiling
    Optimize(OptimizeArgs),
    /// Expected return, risk and Sharpe ratio of given weights
    Evaluate(EvaluateArgs),
    /// Annualised mean returns and covariance from a prices CSV
    Estimate(EstimateArgs),
    /// Prices CSV to allocation report in one step
    Allocate(AllocateArgs),
    /// Sweep the risk ceiling from minimum variance to the riskiest asset
    Frontier(FrontierArgs),
    /// Random portfolios for an efficient-frontier scatter
    Cloud(CloudArgs),
    /// Replay weights over historical prices
    Evolution(EvolutionArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Optimize(args) => commands::optimize::run_optimize(args),
        Commands::Evaluate(args) => commands::evaluate::run_evaluate(args),
        Commands::Estimate(args) => commands::estimate::run_estimate(args),
        Commands::Allocate(args) => commands::allocate::run_allocate(args),
        Commands::Frontier(args) => commands::frontier::run_frontier(args),
        Commands::Cloud(args) => commands::cloud::run_cloud(args),
        Commands::Evolution(args) => commands::evolution::run_evolution(args),
        Commands::Version => {
            println!("riskcap {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
