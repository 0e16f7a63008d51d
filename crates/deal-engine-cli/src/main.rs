mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::appraisal::AppraiseArgs;
use commands::development::{CapexArgs, TimelineArgs};
use commands::distribution::WaterfallArgs;
use commands::financing::{AmortizeArgs, RatiosArgs};
use commands::returns::{ReturnsArgs, SeriesArgs};

/// Real-estate deal modeling with decimal precision
#[derive(Parser)]
#[command(
    name = "deal",
    version,
    about = "Real-estate deal modeling with decimal precision",
    long_about = "A CLI for modeling real-estate development deals with decimal precision. \
                  Builds loan schedules, computes IRR/NPV, lays out phase timelines and \
                  CAPEX curves, and splits proceeds through promote waterfalls."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Round decimal values in the output to this many places
    #[arg(long, global = true)]
    round: Option<u32>,

    /// Log computation steps to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Monthly loan amortization schedule (constant, in-fine, deferred)
    Amortize(AmortizeArgs),
    /// Net present value of an outlay and periodic flows
    Npv(SeriesArgs),
    /// Internal rate of return of an outlay and periodic flows
    Irr(SeriesArgs),
    /// Returns summary of a cash-flow series (NPV, IRR, multiple, payback)
    Returns(ReturnsArgs),
    /// Leverage ratios (LTV, LTC, DSCR)
    Ratios(RatiosArgs),
    /// Lay project phases out on the calendar
    Timeline(TimelineArgs),
    /// Spread a construction budget over months
    Capex(CapexArgs),
    /// Split proceeds between investor and sponsor
    Waterfall(WaterfallArgs),
    /// Appraise a development deal end to end
    Appraise(AppraiseArgs),
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
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Amortize(args) => commands::financing::run_amortize(args),
        Commands::Npv(args) => commands::returns::run_npv(args),
        Commands::Irr(args) => commands::returns::run_irr(args),
        Commands::Returns(args) => commands::returns::run_returns(args),
        Commands::Ratios(args) => commands::financing::run_ratios(args),
        Commands::Timeline(args) => commands::development::run_timeline(args),
        Commands::Capex(args) => commands::development::run_capex(args),
        Commands::Waterfall(args) => commands::distribution::run_waterfall(args),
        Commands::Appraise(args) => commands::appraisal::run_appraise(args),
        Commands::Version => {
            println!("deal {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(mut value) => {
            if let Some(dp) = cli.round {
                output::round::round_decimals(&mut value, dp);
            }
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
