use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::development::capex::{generate_phase_curve, summarise_curve, CapexCurve, CurveShape};
use crate::development::timeline::{
    add_months, generate_phases, PhaseSpec, PhasingMode, ProjectTimeline,
};
use crate::distribution::waterfall::{distribute, WaterfallResult, WaterfallTerms};
use crate::error::DealEngineError;
use crate::financing::amortization::{amortize_loan, LoanSchedule, LoanTerms};
use crate::financing::ratios::{calculate_financing_ratios, FinancingRatios, FinancingRatiosInput};
use crate::returns::metrics::{summarise_returns, ReturnsInput, ReturnsOutput};
use crate::time_value::{compound_growth, round_currency};
use crate::types::*;
use crate::DealEngineResult;

const MONTHS_PER_YEAR: Decimal = rust_decimal_macros::dec!(12);

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// Promote terms applied to the equity at exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoteTerms {
    /// Annual preferred return on equity
    pub hurdle_rate: Rate,
    pub investor_share_above: Rate,
    pub sponsor_share_above: Rate,
}

/// A development deal from land purchase to sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealAppraisalInput {
    pub deal_name: String,
    pub start_date: NaiveDate,
    pub phases: Vec<PhaseSpec>,
    #[serde(default)]
    pub phasing: PhasingMode,
    /// Purchase price paid at month 0
    pub acquisition_cost: Money,
    /// Works budget spread over the construction phase
    pub construction_budget: Money,
    /// Name of the phase the works budget is spent over
    pub construction_phase: String,
    #[serde(default)]
    pub capex_shape: CurveShape,
    /// Name of the phase whose end is the sale date
    pub exit_phase: String,
    /// Gross sale price
    pub sale_price: Money,
    /// Agency and legal costs on sale, as a fraction of the price
    #[serde(default)]
    pub disposal_cost_rate: Rate,
    /// Acquisition loan, drawn at month 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loan: Option<LoanTerms>,
    /// Annual discount rate for NPV
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_rate: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promote: Option<PromoteTerms>,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// One month of the deal's cash flows. Costs are negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealCashFlow {
    pub month: Months,
    pub date: NaiveDate,
    pub acquisition: Money,
    pub construction: Money,
    pub sale: Money,
    /// Project cash flow before financing
    pub unlevered: Money,
    pub loan_drawdown: Money,
    pub debt_service: Money,
    /// Balance repaid from sale proceeds
    pub loan_repayment: Money,
    /// Cash flow to the equity
    pub equity: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealAppraisal {
    pub deal_name: String,
    pub timeline: ProjectTimeline,
    pub capex: CapexCurve,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan: Option<LoanSchedule>,
    pub cash_flows: Vec<DealCashFlow>,
    /// Acquisition plus construction
    pub total_cost: Money,
    pub net_sale_proceeds: Money,
    pub development_profit: Money,
    /// Development profit / total cost
    pub profit_on_cost: Rate,
    pub unlevered_returns: ReturnsOutput,
    pub equity_returns: ReturnsOutput,
    pub equity_invested: Money,
    pub equity_proceeds: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waterfall: Option<WaterfallResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub financing_ratios: Option<FinancingRatios>,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Appraise a development deal end to end.
///
/// Lays the phases out, spreads the works budget over the construction
/// phase, builds monthly project flows up to the sale, layers the loan on
/// top to get the equity flows, then measures both and splits the equity
/// outcome through the promote.
pub fn appraise_deal(
    input: &DealAppraisalInput,
) -> DealEngineResult<ComputationOutput<DealAppraisal>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_input(input)?;

    // --- Timeline ---
    let timeline = generate_phases(input.start_date, &input.phases, &input.phasing)?;

    let construction = timeline
        .phase(&input.construction_phase)
        .ok_or_else(|| unknown_phase("construction_phase", &input.construction_phase))?
        .clone();
    let exit_month = timeline
        .phase(&input.exit_phase)
        .ok_or_else(|| unknown_phase("exit_phase", &input.exit_phase))?
        .end_month;

    if exit_month == 0 {
        return Err(DealEngineError::invalid(
            "exit_phase",
            "Exit must fall at least one month after the start",
        ));
    }
    if construction.end_month > exit_month {
        return Err(DealEngineError::invalid(
            "exit_phase",
            format!(
                "Sale at month {exit_month} precedes the end of '{}' at month {}",
                construction.name, construction.end_month
            ),
        ));
    }

    // --- Construction spend ---
    let points = generate_phase_curve(input.construction_budget, &construction, input.capex_shape)?;
    let capex = summarise_curve(input.construction_budget, input.capex_shape, points);

    // --- Unlevered flows ---
    let horizon = exit_month as usize + 1;
    let net_sale_proceeds = input.sale_price * (Decimal::ONE - input.disposal_cost_rate);
    let mut cash_flows = Vec::with_capacity(horizon);
    for month in 0..=exit_month {
        cash_flows.push(DealCashFlow {
            month,
            date: add_months(input.start_date, month)?,
            acquisition: Decimal::ZERO,
            construction: Decimal::ZERO,
            sale: Decimal::ZERO,
            unlevered: Decimal::ZERO,
            loan_drawdown: Decimal::ZERO,
            debt_service: Decimal::ZERO,
            loan_repayment: Decimal::ZERO,
            equity: Decimal::ZERO,
        });
    }
    cash_flows[0].acquisition = -input.acquisition_cost;
    for point in &capex.points {
        // Works are paid at the end of each construction month
        let month = (construction.start_month + point.month) as usize;
        cash_flows[month].construction = -point.amount;
    }
    cash_flows[exit_month as usize].sale = net_sale_proceeds;

    // --- Financing ---
    let loan = match &input.loan {
        Some(terms) => {
            let schedule = amortize_loan(terms)?;
            warnings.extend(
                schedule
                    .warnings
                    .iter()
                    .map(|w| format!("Loan schedule: {w}")),
            );
            Some(schedule.result)
        }
        None => None,
    };

    if let Some(schedule) = &loan {
        cash_flows[0].loan_drawdown = input.loan.as_ref().map_or(Decimal::ZERO, |t| t.principal);
        for entry in schedule
            .entries
            .iter()
            .take_while(|e| e.month <= exit_month)
        {
            cash_flows[entry.month as usize].debt_service = -entry.payment;
        }
        let outstanding = schedule
            .entries
            .iter()
            .find(|e| e.month == exit_month)
            .map_or(Decimal::ZERO, |e| e.remaining_balance);
        if outstanding > Decimal::ZERO {
            cash_flows[exit_month as usize].loan_repayment = -outstanding;
            debug!(%outstanding, exit_month, "Loan balance repaid at exit");
        }
    }

    for cf in &mut cash_flows {
        cf.unlevered = cf.acquisition + cf.construction + cf.sale;
        cf.equity = cf.unlevered + cf.loan_drawdown + cf.debt_service + cf.loan_repayment;
    }

    let total_cost = input.acquisition_cost + input.construction_budget;
    let development_profit = net_sale_proceeds - total_cost;
    let profit_on_cost = development_profit / total_cost;

    // --- Returns ---
    let monthly_discount = match input.discount_rate {
        Some(annual) => Some(
            compound_growth(annual, Decimal::ONE / MONTHS_PER_YEAR)? - Decimal::ONE,
        ),
        None => None,
    };
    let unlevered_returns = measure(
        "Unlevered",
        cash_flows.iter().map(|cf| cf.unlevered).collect(),
        monthly_discount,
        &mut warnings,
    )?;
    let equity_returns = measure(
        "Equity",
        cash_flows.iter().map(|cf| cf.equity).collect(),
        monthly_discount,
        &mut warnings,
    )?;

    let equity_invested: Money = cash_flows
        .iter()
        .filter(|cf| cf.equity < Decimal::ZERO)
        .map(|cf| -cf.equity)
        .sum();
    let equity_proceeds: Money = cash_flows
        .iter()
        .filter(|cf| cf.equity > Decimal::ZERO)
        .map(|cf| cf.equity)
        .sum();

    // --- Promote ---
    let waterfall = match &input.promote {
        Some(promote) if equity_invested > Decimal::ZERO => Some(distribute(&WaterfallTerms {
            invested_capital: equity_invested,
            total_proceeds: equity_proceeds,
            hurdle_rate: promote.hurdle_rate,
            investment_duration: Some(Decimal::from(exit_month) / MONTHS_PER_YEAR),
            investor_share_above: promote.investor_share_above,
            sponsor_share_above: promote.sponsor_share_above,
        })?),
        Some(_) => {
            warnings.push("Promote skipped: the loan covers every cost, no equity invested".into());
            None
        }
        None => None,
    };

    // --- Leverage ---
    let financing_ratios = match &input.loan {
        Some(terms) if input.acquisition_cost > Decimal::ZERO => {
            let ratios = calculate_financing_ratios(&FinancingRatiosInput {
                loan_amount: terms.principal,
                property_value: input.acquisition_cost,
                total_cost: Some(total_cost),
                net_operating_income: None,
                annual_debt_service: None,
            })?;
            warnings.extend(ratios.warnings.iter().map(|w| format!("Financing: {w}")));
            Some(ratios.result)
        }
        Some(_) => {
            warnings.push("LTV not computed: acquisition cost is zero".into());
            None
        }
        None => None,
    };

    if development_profit < Decimal::ZERO {
        warnings.push(format!(
            "Deal loses {} before financing",
            round_currency(-development_profit)
        ));
    }

    let appraisal = DealAppraisal {
        deal_name: input.deal_name.clone(),
        timeline,
        capex,
        loan,
        cash_flows,
        total_cost,
        net_sale_proceeds,
        development_profit,
        profit_on_cost,
        unlevered_returns,
        equity_returns,
        equity_invested,
        equity_proceeds,
        waterfall,
        financing_ratios,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Development deal appraisal (timeline, CAPEX, debt, returns, promote)",
        &serde_json::json!({
            "deal_name": input.deal_name,
            "exit_month": exit_month,
            "levered": input.loan.is_some(),
        }),
        warnings,
        elapsed,
        appraisal,
    ))
}

fn measure(
    label: &str,
    cash_flows: Vec<Money>,
    discount_rate: Option<Rate>,
    warnings: &mut Vec<String>,
) -> DealEngineResult<ReturnsOutput> {
    let mut local = Vec::new();
    let output = summarise_returns(
        &ReturnsInput {
            cash_flows,
            discount_rate,
            periods_per_year: 12,
            irr_guess: Some(rust_decimal_macros::dec!(0.01)),
        },
        &mut local,
    )?;
    warnings.extend(local.into_iter().map(|w| format!("{label}: {w}")));
    Ok(output)
}

fn unknown_phase(field: &str, name: &str) -> DealEngineError {
    DealEngineError::invalid(field, format!("No phase named '{name}'"))
}

fn validate_input(input: &DealAppraisalInput) -> DealEngineResult<()> {
    if input.acquisition_cost < Decimal::ZERO {
        return Err(DealEngineError::invalid(
            "acquisition_cost",
            "Acquisition cost cannot be negative",
        ));
    }
    if input.sale_price < Decimal::ZERO {
        return Err(DealEngineError::invalid(
            "sale_price",
            "Sale price cannot be negative",
        ));
    }
    if input.disposal_cost_rate < Decimal::ZERO || input.disposal_cost_rate >= Decimal::ONE {
        return Err(DealEngineError::invalid(
            "disposal_cost_rate",
            "Disposal costs must be between 0 and 100% of the price",
        ));
    }
    if let Some(rate) = input.discount_rate {
        if rate <= Decimal::NEGATIVE_ONE {
            return Err(DealEngineError::invalid(
                "discount_rate",
                "Discount rate must be greater than -100%",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::financing::amortization::RepaymentRegime;
    use rust_decimal_macros::dec;

    fn phase(name: &str, months: Months) -> PhaseSpec {
        PhaseSpec {
            name: name.into(),
            duration_months: months,
        }
    }

    fn sample_deal() -> DealAppraisalInput {
        DealAppraisalInput {
            deal_name: "Riverside".into(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            phases: vec![
                phase("Permitting", 6),
                phase("Construction", 12),
                phase("Sales", 6),
            ],
            phasing: PhasingMode::Sequential,
            acquisition_cost: dec!(1000000),
            construction_budget: dec!(1200000),
            construction_phase: "Construction".into(),
            capex_shape: CurveShape::Linear,
            exit_phase: "Sales".into(),
            sale_price: dec!(3000000),
            disposal_cost_rate: dec!(0.02),
            loan: None,
            discount_rate: Some(dec!(0.08)),
            promote: Some(PromoteTerms {
                hurdle_rate: dec!(0.08),
                investor_share_above: dec!(0.8),
                sponsor_share_above: dec!(0.2),
            }),
        }
    }

    #[test]
    fn test_unlevered_appraisal() {
        let out = appraise_deal(&sample_deal()).unwrap();
        let a = &out.result;
        assert_eq!(a.cash_flows.len(), 25);
        assert_eq!(a.cash_flows[0].unlevered, dec!(-1000000));
        // Works run months 7..=18
        assert_eq!(a.cash_flows[6].construction, Decimal::ZERO);
        assert_eq!(a.cash_flows[7].construction, dec!(-100000));
        assert_eq!(a.cash_flows[18].construction, dec!(-100000));
        assert_eq!(a.cash_flows[24].sale, dec!(2940000));
        assert_eq!(a.development_profit, dec!(740000));
        assert_eq!(a.total_cost, dec!(2200000));
        // Without debt the equity flows are the project flows
        assert_eq!(a.equity_invested, dec!(2200000));
        assert_eq!(a.equity_proceeds, dec!(2940000));
        assert!(a.unlevered_returns.irr.annualized().unwrap() > Decimal::ZERO);
        let w = a.waterfall.as_ref().unwrap();
        assert!((w.investor_total + w.sponsor_total - dec!(2940000)).abs() < dec!(0.01));
        assert!(a.financing_ratios.is_none());
    }

    #[test]
    fn test_levered_appraisal_repays_balance_at_exit() {
        let mut deal = sample_deal();
        deal.loan = Some(LoanTerms {
            principal: dec!(700000),
            annual_rate: dec!(0.05),
            duration_months: 60,
            regime: RepaymentRegime::InFine,
            deferral_months: 0,
            capitalize_deferred_interest: false,
        });
        let out = appraise_deal(&deal).unwrap();
        let a = &out.result;
        assert_eq!(a.cash_flows[0].loan_drawdown, dec!(700000));
        assert_eq!(a.cash_flows[0].equity, dec!(-300000));
        // Interest-only: 700,000 * 0.05 / 12
        assert!((a.cash_flows[1].debt_service + dec!(2916.67)).abs() < dec!(0.01));
        assert!((a.cash_flows[24].loan_repayment + dec!(700000)).abs() < dec!(0.01));
        let ratios = a.financing_ratios.as_ref().unwrap();
        assert_eq!(ratios.ltv, dec!(0.7));
        // Leverage lifts the equity IRR above the project IRR here
        let unlevered = a.unlevered_returns.irr.annualized().unwrap();
        let levered = a.equity_returns.irr.annualized().unwrap();
        assert!(levered > unlevered);
    }

    #[test]
    fn test_unknown_phase_rejected() {
        let mut deal = sample_deal();
        deal.exit_phase = "Marketing".into();
        assert!(appraise_deal(&deal).is_err());
    }

    #[test]
    fn test_exit_before_construction_end_rejected() {
        let mut deal = sample_deal();
        deal.exit_phase = "Permitting".into();
        assert!(appraise_deal(&deal).is_err());
    }

    #[test]
    fn test_loss_making_deal_warns() {
        let mut deal = sample_deal();
        deal.sale_price = dec!(2000000);
        let out = appraise_deal(&deal).unwrap();
        let loss = -out.result.development_profit;
        assert!(loss > Decimal::ZERO);
        let expected = format!("Deal loses {} before financing", round_currency(loss));
        assert!(
            out.warnings.iter().any(|w| w == &expected),
            "warnings: {:?}",
            out.warnings
        );
    }
}
