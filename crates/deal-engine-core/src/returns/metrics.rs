use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::DealEngineError;
use crate::returns::irr::{self, IrrSolver};
use crate::time_value;
use crate::types::*;
use crate::DealEngineResult;

fn default_periods_per_year() -> u32 {
    1
}

/// Input for a cash-flow profitability summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsInput {
    /// Periodic cash flows (index 0 = initial outlay, negative)
    pub cash_flows: Vec<Money>,
    /// Discount rate per period for NPV
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_rate: Option<Rate>,
    /// Periods per year of the series (12 for monthly, 1 for annual)
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: u32,
    /// Starting point for the IRR search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub irr_guess: Option<Rate>,
}

/// Result of the IRR search, kept explicit so a failed search never reads as 0%.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IrrOutcome {
    Converged {
        periodic_rate: Rate,
        annualized_rate: Rate,
    },
    NoSolution {
        reason: String,
    },
}

impl IrrOutcome {
    /// Annualised rate when the search converged.
    pub fn annualized(&self) -> Option<Rate> {
        match self {
            IrrOutcome::Converged {
                annualized_rate, ..
            } => Some(*annualized_rate),
            IrrOutcome::NoSolution { .. } => None,
        }
    }
}

/// Output of the returns summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsOutput {
    /// NPV at the supplied discount rate
    pub npv: Option<Money>,
    /// Internal rate of return outcome
    pub irr: IrrOutcome,
    /// Sum of all outflows (as a positive amount)
    pub total_invested: Money,
    /// Sum of all inflows
    pub total_returned: Money,
    /// Returned minus invested
    pub net_profit: Money,
    /// Returned / invested
    pub equity_multiple: Option<Multiple>,
    /// First period at which cumulative cash flow is non-negative
    pub payback_period: Option<u32>,
    /// Number of flows after the outlay
    pub periods: usize,
}

/// Summarise the profitability of a cash-flow series: NPV, IRR, multiple, payback.
pub fn calculate_returns(
    input: &ReturnsInput,
) -> DealEngineResult<ComputationOutput<ReturnsOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.cash_flows.len() < 2 {
        return Err(DealEngineError::InsufficientData(
            "Returns analysis requires an outlay and at least one period".into(),
        ));
    }
    if input.periods_per_year == 0 {
        return Err(DealEngineError::invalid(
            "periods_per_year",
            "Must be at least 1",
        ));
    }

    let output = summarise_returns(input, &mut warnings)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Cash-flow returns summary (NPV, Newton-Raphson IRR, equity multiple)",
        &serde_json::json!({
            "periods": output.periods,
            "periods_per_year": input.periods_per_year,
            "discount_rate": input.discount_rate.map(|r| r.to_string()),
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Core of [`calculate_returns`] without the envelope, reused by deal appraisal.
pub fn summarise_returns(
    input: &ReturnsInput,
    warnings: &mut Vec<String>,
) -> DealEngineResult<ReturnsOutput> {
    let flows = &input.cash_flows;

    let npv = match input.discount_rate {
        Some(rate) => Some(irr::npv(rate, flows)?),
        None => None,
    };

    let solver = IrrSolver {
        guess: input.irr_guess.unwrap_or(irr::DEFAULT_IRR_GUESS),
        ..IrrSolver::default()
    };
    let irr = match irr::irr(flows, &solver) {
        Ok(periodic_rate) => IrrOutcome::Converged {
            periodic_rate,
            annualized_rate: time_value::annualize_rate(periodic_rate, input.periods_per_year)?,
        },
        Err(e) if e.is_non_convergence() => {
            warnings.push(format!("IRR could not be determined: {e}"));
            IrrOutcome::NoSolution {
                reason: e.to_string(),
            }
        }
        Err(e) => return Err(e),
    };

    let total_invested: Money = flows
        .iter()
        .filter(|cf| cf.is_sign_negative())
        .map(|cf| cf.abs())
        .sum();
    let total_returned: Money = flows
        .iter()
        .filter(|cf| cf.is_sign_positive())
        .copied()
        .sum();

    let equity_multiple = if total_invested.is_zero() {
        warnings.push("No outflows in series; equity multiple undefined".into());
        None
    } else {
        Some(total_returned / total_invested)
    };

    let mut cumulative = Decimal::ZERO;
    let mut payback_period = None;
    for (t, cf) in flows.iter().enumerate() {
        cumulative += cf;
        if t > 0 && cumulative >= Decimal::ZERO {
            payback_period = Some(t as u32);
            break;
        }
    }
    if payback_period.is_none() {
        warnings.push("Cumulative cash flow never recovers the outlay".into());
    }

    Ok(ReturnsOutput {
        npv,
        irr,
        total_invested,
        total_returned,
        net_profit: total_returned - total_invested,
        equity_multiple,
        payback_period,
        periods: flows.len() - 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn annual_input(cash_flows: Vec<Money>) -> ReturnsInput {
        ReturnsInput {
            cash_flows,
            discount_rate: Some(dec!(0.08)),
            periods_per_year: 1,
            irr_guess: None,
        }
    }

    #[test]
    fn test_basic_summary() {
        let input = annual_input(vec![dec!(-1000), dec!(400), dec!(400), dec!(400)]);
        let out = calculate_returns(&input).unwrap().result;

        assert_eq!(out.total_invested, dec!(1000));
        assert_eq!(out.total_returned, dec!(1200));
        assert_eq!(out.net_profit, dec!(200));
        assert_eq!(out.equity_multiple, Some(dec!(1.2)));
        assert_eq!(out.payback_period, Some(3));
        assert_eq!(out.periods, 3);

        let annual = out.irr.annualized().unwrap();
        assert!((annual - dec!(0.0970)).abs() < dec!(0.0001), "got {annual}");
        // 8% discount < IRR => positive NPV
        assert!(out.npv.unwrap() > Decimal::ZERO);
    }

    #[test]
    fn test_monthly_series_annualised() {
        // 1% a month for one month
        let input = ReturnsInput {
            cash_flows: vec![dec!(-100), dec!(101)],
            discount_rate: None,
            periods_per_year: 12,
            irr_guess: None,
        };
        let out = calculate_returns(&input).unwrap().result;
        match out.irr {
            IrrOutcome::Converged {
                periodic_rate,
                annualized_rate,
            } => {
                assert!((periodic_rate - dec!(0.01)).abs() < dec!(0.000001));
                assert!((annualized_rate - dec!(0.126825)).abs() < dec!(0.00001));
            }
            other => panic!("Expected convergence, got {other:?}"),
        }
        assert!(out.npv.is_none());
    }

    #[test]
    fn test_no_solution_is_explicit() {
        let input = annual_input(vec![dec!(-1000), dec!(-100), dec!(-100)]);
        let result = calculate_returns(&input).unwrap();
        assert!(matches!(result.result.irr, IrrOutcome::NoSolution { .. }));
        assert!(result.result.irr.annualized().is_none());
        assert_eq!(result.result.payback_period, None);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("IRR could not be determined")));
    }

    #[test]
    fn test_insufficient_flows_error() {
        let input = annual_input(vec![dec!(-1000)]);
        assert!(calculate_returns(&input).is_err());
    }

    #[test]
    fn test_zero_periods_per_year_error() {
        let mut input = annual_input(vec![dec!(-1000), dec!(1100)]);
        input.periods_per_year = 0;
        assert!(calculate_returns(&input).is_err());
    }

    #[test]
    fn test_outcome_serialises_with_status_tag() {
        let outcome = IrrOutcome::NoSolution {
            reason: "none".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "no_solution");
    }
}
