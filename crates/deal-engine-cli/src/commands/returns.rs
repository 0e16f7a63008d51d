use clap::Args;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

use deal_engine_core::returns::irr;
use deal_engine_core::returns::metrics::{self, ReturnsInput};
use deal_engine_core::with_metadata;

use crate::input;

/// An outlay at t=0 followed by one flow per period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlaySeries {
    pub initial_outlay: Decimal,
    pub cash_flows: Vec<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_rate: Option<Decimal>,
}

/// Arguments shared by `npv` and `irr`
#[derive(Args)]
pub struct SeriesArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Initial outlay, as a positive amount
    #[arg(long)]
    pub outlay: Option<Decimal>,

    /// Periodic cash flows from period 1 (comma-separated, e.g. "300,400,500")
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub cash_flows: Option<Vec<Decimal>>,

    /// Discount rate per period (npv only)
    #[arg(long)]
    pub rate: Option<Decimal>,
}

fn load_series(args: SeriesArgs) -> Result<OutlaySeries, Box<dyn std::error::Error>> {
    match input::load(args.input.as_deref())? {
        Some(series) => Ok(series),
        None => Ok(OutlaySeries {
            initial_outlay: args.outlay.ok_or("--outlay is required (or provide --input)")?,
            cash_flows: args
                .cash_flows
                .ok_or("--cash-flows is required (or provide --input)")?,
            discount_rate: args.rate,
        }),
    }
}

pub fn run_npv(args: SeriesArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let series = load_series(args)?;
    let rate = series
        .discount_rate
        .ok_or("--rate is required for npv (or discount_rate in the input)")?;

    let npv = irr::compute_npv(series.initial_outlay, &series.cash_flows, rate)?;

    let output = with_metadata(
        "Net present value of an outlay and periodic flows",
        &series,
        Vec::new(),
        start.elapsed().as_micros() as u64,
        serde_json::json!({ "npv": npv }),
    );
    Ok(serde_json::to_value(output)?)
}

pub fn run_irr(args: SeriesArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let series = load_series(args)?;

    let rate = irr::compute_irr(series.initial_outlay, &series.cash_flows)?;

    let output = with_metadata(
        "Newton-Raphson internal rate of return (per period)",
        &series,
        Vec::new(),
        start.elapsed().as_micros() as u64,
        serde_json::json!({ "irr": rate }),
    );
    Ok(serde_json::to_value(output)?)
}

/// Arguments for a cash-flow returns summary
#[derive(Args)]
pub struct ReturnsArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Full series, outlay first (comma-separated, e.g. "-1000,300,400,500")
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub cash_flows: Option<Vec<Decimal>>,

    /// Discount rate per period for NPV
    #[arg(long)]
    pub discount_rate: Option<Decimal>,

    /// Periods per year in the series (12 for monthly)
    #[arg(long, default_value_t = 1)]
    pub periods_per_year: u32,
}

pub fn run_returns(args: ReturnsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let returns_input: ReturnsInput = match input::load(args.input.as_deref())? {
        Some(data) => data,
        None => ReturnsInput {
            cash_flows: args
                .cash_flows
                .ok_or("--cash-flows is required (or provide --input)")?,
            discount_rate: args.discount_rate,
            periods_per_year: args.periods_per_year,
            irr_guess: None,
        },
    };

    let result = metrics::calculate_returns(&returns_input)?;
    Ok(serde_json::to_value(result)?)
}
