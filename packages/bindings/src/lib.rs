use napi::Result as NapiResult;
use napi_derive::napi;
use rust_decimal::Decimal;
use serde::Deserialize;

use deal_engine_core::appraisal::{self, DealAppraisalInput};
use deal_engine_core::development::capex::{self, CapexInput};
use deal_engine_core::development::timeline::{self, TimelineInput};
use deal_engine_core::distribution::waterfall::{self, WaterfallInput};
use deal_engine_core::financing::amortization::{self, LoanTerms};
use deal_engine_core::financing::ratios::{self, FinancingRatiosInput};
use deal_engine_core::returns::irr;
use deal_engine_core::returns::metrics::{self, ReturnsInput};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

/// An outlay at t=0 followed by one flow per period.
#[derive(Deserialize)]
struct OutlaySeries {
    initial_outlay: Decimal,
    cash_flows: Vec<Decimal>,
    #[serde(default)]
    discount_rate: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Financing
// ---------------------------------------------------------------------------

#[napi]
pub fn amortize_loan(input_json: String) -> NapiResult<String> {
    let input: LoanTerms = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = amortization::amortize_loan(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn financing_ratios(input_json: String) -> NapiResult<String> {
    let input: FinancingRatiosInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = ratios::calculate_financing_ratios(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Returns
// ---------------------------------------------------------------------------

#[napi]
pub fn compute_npv(input_json: String) -> NapiResult<String> {
    let input: OutlaySeries = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let rate = input
        .discount_rate
        .ok_or_else(|| napi::Error::from_reason("discount_rate is required"))?;
    let npv = irr::compute_npv(input.initial_outlay, &input.cash_flows, rate)
        .map_err(to_napi_error)?;
    serde_json::to_string(&serde_json::json!({ "npv": npv })).map_err(to_napi_error)
}

#[napi]
pub fn compute_irr(input_json: String) -> NapiResult<String> {
    let input: OutlaySeries = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let rate = irr::compute_irr(input.initial_outlay, &input.cash_flows).map_err(to_napi_error)?;
    serde_json::to_string(&serde_json::json!({ "irr": rate })).map_err(to_napi_error)
}

#[napi]
pub fn returns_summary(input_json: String) -> NapiResult<String> {
    let input: ReturnsInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = metrics::calculate_returns(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Development
// ---------------------------------------------------------------------------

#[napi]
pub fn build_timeline(input_json: String) -> NapiResult<String> {
    let input: TimelineInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = timeline::build_timeline(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn capex_curve(input_json: String) -> NapiResult<String> {
    let input: CapexInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = capex::build_capex_curve(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Distribution
// ---------------------------------------------------------------------------

#[napi]
pub fn distribute_waterfall(input_json: String) -> NapiResult<String> {
    let input: WaterfallInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = waterfall::calculate_waterfall(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Appraisal
// ---------------------------------------------------------------------------

#[napi]
pub fn appraise_deal(input_json: String) -> NapiResult<String> {
    let input: DealAppraisalInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = appraisal::appraise_deal(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
