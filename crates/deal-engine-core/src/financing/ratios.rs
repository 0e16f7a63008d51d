use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::DealEngineError;
use crate::types::*;
use crate::DealEngineResult;

const LTV_WARNING: Rate = dec!(0.80);
const LTC_WARNING: Rate = dec!(0.85);
const DSCR_WARNING: Decimal = dec!(1.25);

/// Inputs for the standard leverage ratios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancingRatiosInput {
    /// Amount borrowed
    pub loan_amount: Money,
    /// Appraised or purchase value of the asset
    pub property_value: Money,
    /// All-in project cost (land + works + fees), for LTC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<Money>,
    /// Annual net operating income, for DSCR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_operating_income: Option<Money>,
    /// Annual debt service (interest + principal), for DSCR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annual_debt_service: Option<Money>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancingRatios {
    /// Loan-to-value
    pub ltv: Rate,
    /// Loan-to-cost
    pub ltc: Option<Rate>,
    /// Debt service coverage ratio
    pub dscr: Option<Decimal>,
}

/// LTV, LTC and DSCR by simple division, with the usual leverage warnings.
pub fn calculate_financing_ratios(
    input: &FinancingRatiosInput,
) -> DealEngineResult<ComputationOutput<FinancingRatios>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.loan_amount < Decimal::ZERO {
        return Err(DealEngineError::invalid(
            "loan_amount",
            "Loan amount cannot be negative",
        ));
    }
    if input.property_value <= Decimal::ZERO {
        return Err(DealEngineError::invalid(
            "property_value",
            "Property value must be positive",
        ));
    }

    let ltv = input.loan_amount / input.property_value;
    if ltv > LTV_WARNING {
        warnings.push(format!(
            "LTV of {:.1}% exceeds 80% (high leverage)",
            ltv * dec!(100)
        ));
    }

    let ltc = match input.total_cost {
        Some(cost) if cost <= Decimal::ZERO => {
            return Err(DealEngineError::invalid(
                "total_cost",
                "Total cost must be positive",
            ));
        }
        Some(cost) => {
            let ltc = input.loan_amount / cost;
            if ltc > LTC_WARNING {
                warnings.push(format!(
                    "LTC of {:.1}% exceeds 85% (thin equity cushion)",
                    ltc * dec!(100)
                ));
            }
            Some(ltc)
        }
        None => None,
    };

    let dscr = match (input.net_operating_income, input.annual_debt_service) {
        (Some(_), Some(ds)) if ds <= Decimal::ZERO => {
            return Err(DealEngineError::DivisionByZero {
                context: "DSCR with non-positive annual debt service".into(),
            });
        }
        (Some(noi), Some(ds)) => {
            let dscr = noi / ds;
            if dscr < DSCR_WARNING {
                warnings.push(format!(
                    "DSCR of {:.2}x is below 1.25x lender threshold",
                    dscr
                ));
            }
            Some(dscr)
        }
        (Some(_), None) | (None, Some(_)) => {
            warnings.push("DSCR needs both net_operating_income and annual_debt_service".into());
            None
        }
        (None, None) => None,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Financing ratios (LTV, LTC, DSCR)",
        &serde_json::json!({
            "loan_amount": input.loan_amount.to_string(),
            "property_value": input.property_value.to_string(),
        }),
        warnings,
        elapsed,
        FinancingRatios { ltv, ltc, dscr },
    ))
}
