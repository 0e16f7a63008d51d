use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use deal_engine_core::development::capex::{self, CapexInput, CurveShape};
use deal_engine_core::development::timeline::{
    self, OverlapRule, PhaseSpec, PhasingMode, TimelineInput,
};

use crate::input;

/// `Name:months`, e.g. `Construction:18`.
fn parse_phase(s: &str) -> Result<PhaseSpec, String> {
    let (name, months) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected NAME:MONTHS, got '{s}'"))?;
    let duration_months = months
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("bad month count in '{s}': {e}"))?;
    Ok(PhaseSpec {
        name: name.trim().to_string(),
        duration_months,
    })
}

/// Arguments for a phase timeline
#[derive(Args)]
pub struct TimelineArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Project start date (YYYY-MM-DD)
    #[arg(long)]
    pub start_date: Option<NaiveDate>,

    /// Phases in order (comma-separated NAME:MONTHS, e.g. "Design:6,Build:18,Sales:9")
    #[arg(long, value_delimiter = ',', value_parser = parse_phase)]
    pub phases: Option<Vec<PhaseSpec>>,

    /// Index of the phase that starts inside its predecessor
    #[arg(long)]
    pub overlap_phase: Option<usize>,

    /// Start the overlapping phase this many months into its predecessor
    /// (default: predecessor midpoint)
    #[arg(long, requires = "overlap_phase")]
    pub overlap_months: Option<u32>,
}

pub fn run_timeline(args: TimelineArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let timeline_input: TimelineInput = match input::load(args.input.as_deref())? {
        Some(data) => data,
        None => {
            let mode = match args.overlap_phase {
                Some(phase_index) => PhasingMode::Overlapping {
                    phase_index,
                    rule: args
                        .overlap_months
                        .map(|months| OverlapRule::MonthsIntoPredecessor { months })
                        .unwrap_or_default(),
                },
                None => PhasingMode::Sequential,
            };
            TimelineInput {
                start_date: args
                    .start_date
                    .ok_or("--start-date is required (or provide --input)")?,
                phases: args.phases.ok_or("--phases is required (or provide --input)")?,
                mode,
            }
        }
    };

    let result = timeline::build_timeline(&timeline_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for a CAPEX disbursement curve
#[derive(Args)]
pub struct CapexArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Total budget to disburse
    #[arg(long)]
    pub budget: Option<Decimal>,

    /// Number of months
    #[arg(long)]
    pub months: Option<u32>,

    /// Curve shape: linear, s_curve, front_loaded or back_loaded
    #[arg(long, default_value = "linear")]
    pub shape: CurveShape,

    /// Date of the first month (YYYY-MM-DD); dates every point
    #[arg(long)]
    pub start_date: Option<NaiveDate>,
}

pub fn run_capex(args: CapexArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let capex_input: CapexInput = match input::load(args.input.as_deref())? {
        Some(data) => data,
        None => CapexInput {
            total_budget: args.budget.ok_or("--budget is required (or provide --input)")?,
            duration_months: args.months.ok_or("--months is required (or provide --input)")?,
            shape: args.shape,
            start_date: args.start_date,
        },
    };

    let result = capex::build_capex_curve(&capex_input)?;
    Ok(serde_json::to_value(result)?)
}
