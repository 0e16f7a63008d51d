use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use deal_engine_core::distribution::waterfall::{self, WaterfallInput, WaterfallTerms};

use crate::input;

/// Arguments for an investor/sponsor waterfall
#[derive(Args)]
pub struct WaterfallArgs {
    /// Path to JSON/YAML input file; required for tiered promotes
    #[arg(long)]
    pub input: Option<String>,

    /// Equity invested
    #[arg(long)]
    pub capital: Option<Decimal>,

    /// Total proceeds to distribute
    #[arg(long)]
    pub proceeds: Option<Decimal>,

    /// Annual preferred return (0.08 = 8%)
    #[arg(long)]
    pub hurdle: Option<Decimal>,

    /// Holding period in years; compounds the hurdle
    #[arg(long)]
    pub years: Option<Decimal>,

    /// Sponsor's share of the surplus above the hurdle
    #[arg(long)]
    pub sponsor_share: Option<Decimal>,
}

pub fn run_waterfall(args: WaterfallArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let waterfall_input: WaterfallInput = match input::load(args.input.as_deref())? {
        Some(data) => data,
        None => {
            let sponsor_share = args
                .sponsor_share
                .ok_or("--sponsor-share is required (or provide --input)")?;
            WaterfallInput::SingleTier(WaterfallTerms {
                invested_capital: args
                    .capital
                    .ok_or("--capital is required (or provide --input)")?,
                total_proceeds: args
                    .proceeds
                    .ok_or("--proceeds is required (or provide --input)")?,
                hurdle_rate: args.hurdle.ok_or("--hurdle is required (or provide --input)")?,
                investment_duration: args.years,
                investor_share_above: Decimal::ONE - sponsor_share,
                sponsor_share_above: sponsor_share,
            })
        }
    };

    let result = waterfall::calculate_waterfall(&waterfall_input)?;
    Ok(serde_json::to_value(result)?)
}
