use deal_engine_core::appraisal::{appraise_deal, DealAppraisalInput};
use deal_engine_core::returns::metrics::IrrOutcome;
use deal_engine_core::Money;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const SCHEME: &str = r#"{
    "deal_name": "Harbour Lofts",
    "start_date": "2025-01-01",
    "phases": [
        {"name": "Acquisition", "duration_months": 3},
        {"name": "Construction", "duration_months": 18},
        {"name": "Sales", "duration_months": 12}
    ],
    "phasing": {"mode": "overlapping", "phase_index": 2, "rule": {"type": "months_into_predecessor", "months": 12}},
    "acquisition_cost": "2000000",
    "construction_budget": "6000000",
    "construction_phase": "Construction",
    "capex_shape": "s_curve",
    "exit_phase": "Sales",
    "sale_price": "10500000",
    "disposal_cost_rate": "0.02",
    "loan": {
        "principal": "1400000",
        "annual_rate": "0.055",
        "duration_months": 36,
        "regime": "DEFERRED",
        "deferral_months": 12,
        "capitalize_deferred_interest": true
    },
    "discount_rate": "0.10",
    "promote": {"hurdle_rate": "0.08", "investor_share_above": "0.7", "sponsor_share_above": "0.3"}
}"#;

fn scheme() -> DealAppraisalInput {
    serde_json::from_str(SCHEME).unwrap()
}

#[test]
fn test_scheme_flows_cover_every_month_to_exit() {
    let a = appraise_deal(&scheme()).unwrap().result;
    // Sales start 12 months into construction (month 15) and run 12 months
    assert_eq!(a.timeline.phase("Sales").unwrap().start_month, 15);
    assert_eq!(a.cash_flows.len(), 28);
    assert_eq!(a.cash_flows.last().unwrap().month, 27);

    let works: Money = a.cash_flows.iter().map(|cf| cf.construction).sum();
    assert_eq!(works, dec!(-6000000));
    assert_eq!(a.net_sale_proceeds, dec!(10290000));
    assert_eq!(a.total_cost, dec!(8000000));
    assert_eq!(a.development_profit, dec!(2290000));
}

#[test]
fn test_equity_flows_reconcile_with_debt() {
    let a = appraise_deal(&scheme()).unwrap().result;
    for cf in &a.cash_flows {
        assert_eq!(
            cf.equity,
            cf.unlevered + cf.loan_drawdown + cf.debt_service + cf.loan_repayment
        );
    }
    // 36-month loan is still open at the month-27 sale
    let exit = a.cash_flows.last().unwrap();
    assert!(exit.loan_repayment < Decimal::ZERO);
    // Capitalising deferral: no debt service during the first year
    assert!(a.cash_flows[1..=12].iter().all(|cf| cf.debt_service.is_zero()));
    let ratios = a.financing_ratios.unwrap();
    assert_eq!(ratios.ltv, dec!(0.7));
    assert_eq!(ratios.ltc, Some(dec!(0.175)));
}

#[test]
fn test_returns_and_promote() {
    let out = appraise_deal(&scheme()).unwrap();
    let a = &out.result;
    assert!(matches!(a.unlevered_returns.irr, IrrOutcome::Converged { .. }));
    assert!(matches!(a.equity_returns.irr, IrrOutcome::Converged { .. }));
    assert!(a.unlevered_returns.npv.is_some());
    let w = a.waterfall.as_ref().unwrap();
    assert!((w.investor_total + w.sponsor_total - a.equity_proceeds).abs() < dec!(0.01));
    assert!(w.sponsor_total > Decimal::ZERO);
    // 27 months is not a whole number of years
    assert!(w.achieved_return.is_none());
    assert_eq!(out.metadata.precision, "rust_decimal_128bit");
}

#[test]
fn test_unlevered_scheme() {
    let mut input = scheme();
    input.loan = None;
    let a = appraise_deal(&input).unwrap().result;
    assert!(a.loan.is_none());
    assert!(a.financing_ratios.is_none());
    assert_eq!(a.equity_invested, dec!(8000000));
    for cf in &a.cash_flows {
        assert_eq!(cf.equity, cf.unlevered);
    }
}
