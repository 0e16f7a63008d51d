use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use deal_engine_core::financing::amortization::{self, LoanTerms, RepaymentRegime};
use deal_engine_core::financing::ratios::{self, FinancingRatiosInput};

use crate::input;

/// Arguments for a loan amortization schedule
#[derive(Args)]
pub struct AmortizeArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Amount borrowed
    #[arg(long)]
    pub principal: Option<Decimal>,

    /// Nominal annual rate (0.04 = 4%)
    #[arg(long)]
    pub rate: Option<Decimal>,

    /// Loan term in months
    #[arg(long)]
    pub months: Option<u32>,

    /// Repayment regime: constant, in_fine or deferred
    #[arg(long, default_value = "constant")]
    pub regime: RepaymentRegime,

    /// Grace window in months (deferred loans only)
    #[arg(long, default_value_t = 0)]
    pub deferral_months: u32,

    /// Capitalise interest during the grace window instead of paying it
    #[arg(long)]
    pub capitalize: bool,
}

pub fn run_amortize(args: AmortizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let terms: LoanTerms = match input::load(args.input.as_deref())? {
        Some(terms) => terms,
        None => LoanTerms {
            principal: args
                .principal
                .ok_or("--principal is required (or provide --input)")?,
            annual_rate: args.rate.ok_or("--rate is required (or provide --input)")?,
            duration_months: args.months.ok_or("--months is required (or provide --input)")?,
            regime: args.regime,
            deferral_months: args.deferral_months,
            capitalize_deferred_interest: args.capitalize,
        },
    };

    let result = amortization::amortize_loan(&terms)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for LTV / LTC / DSCR
#[derive(Args)]
pub struct RatiosArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Amount borrowed
    #[arg(long)]
    pub loan_amount: Option<Decimal>,

    /// Appraised or purchase value
    #[arg(long)]
    pub property_value: Option<Decimal>,

    /// All-in project cost, for LTC
    #[arg(long)]
    pub total_cost: Option<Decimal>,

    /// Annual net operating income, for DSCR
    #[arg(long)]
    pub noi: Option<Decimal>,

    /// Annual debt service, for DSCR
    #[arg(long)]
    pub debt_service: Option<Decimal>,
}

pub fn run_ratios(args: RatiosArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let ratios_input: FinancingRatiosInput = match input::load(args.input.as_deref())? {
        Some(data) => data,
        None => FinancingRatiosInput {
            loan_amount: args
                .loan_amount
                .ok_or("--loan-amount is required (or provide --input)")?,
            property_value: args
                .property_value
                .ok_or("--property-value is required (or provide --input)")?,
            total_cost: args.total_cost,
            net_operating_income: args.noi,
            annual_debt_service: args.debt_service,
        },
    };

    let result = ratios::calculate_financing_ratios(&ratios_input)?;
    Ok(serde_json::to_value(result)?)
}
