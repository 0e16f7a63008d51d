use deal_engine_core::financing::amortization::{
    amortize_loan, build_schedule, LoanTerms, RepaymentRegime, SchedulePhase,
};
use deal_engine_core::financing::ratios::{calculate_financing_ratios, FinancingRatiosInput};
use deal_engine_core::{DealEngineError, Money};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn loan(principal: Money, rate: Decimal, months: u32, regime: RepaymentRegime) -> LoanTerms {
    LoanTerms {
        principal,
        annual_rate: rate,
        duration_months: months,
        regime,
        deferral_months: 0,
        capitalize_deferred_interest: false,
    }
}

// ===========================================================================
// Amortization tests
// ===========================================================================

#[test]
fn test_twenty_year_mortgage() {
    let out = amortize_loan(&loan(dec!(100000), dec!(0.04), 240, RepaymentRegime::Constant))
        .unwrap();
    let s = &out.result;
    assert!((s.periodic_payment - dec!(605.98)).abs() < dec!(0.01));
    assert!((s.total_interest - dec!(45435)).abs() < dec!(50));
    assert!((s.total_paid - s.total_interest - dec!(100000)).abs() < dec!(0.01));
    assert_eq!(s.capitalized_interest, Decimal::ZERO);
    assert_eq!(s.balance_after_deferral, None);
    assert!(out.warnings.is_empty());
}

#[test]
fn test_in_fine_pays_interest_then_bullet() {
    let entries =
        build_schedule(&loan(dec!(500000), dec!(0.06), 24, RepaymentRegime::InFine)).unwrap();
    assert_eq!(entries.len(), 24);
    for e in &entries[..23] {
        assert_eq!(e.principal, Decimal::ZERO);
        assert_eq!(e.interest, dec!(2500));
        assert_eq!(e.remaining_balance, dec!(500000));
    }
    let last = &entries[23];
    assert_eq!(last.principal, dec!(500000));
    assert_eq!(last.payment, dec!(502500));
    assert_eq!(last.remaining_balance, Decimal::ZERO);
}

#[test]
fn test_in_fine_periodic_payment_is_the_coupon() {
    // 500,000 * 0.06 / 12 = 2,500 whatever the term, bullet excluded
    for months in [1, 24] {
        let out =
            amortize_loan(&loan(dec!(500000), dec!(0.06), months, RepaymentRegime::InFine)).unwrap();
        assert_eq!(out.result.periodic_payment, dec!(2500), "term {months}");
    }
    let single = amortize_loan(&loan(dec!(500000), dec!(0.06), 1, RepaymentRegime::InFine)).unwrap();
    assert_eq!(single.result.entries[0].payment, dec!(502500));
}

#[test]
fn test_deferred_capitalised_grows_balance() {
    let terms = LoanTerms {
        principal: dec!(200000),
        annual_rate: dec!(0.048),
        duration_months: 60,
        regime: RepaymentRegime::Deferred,
        deferral_months: 6,
        capitalize_deferred_interest: true,
    };
    let s = amortize_loan(&terms).unwrap().result;
    let after = s.balance_after_deferral.unwrap();
    assert!(after > dec!(200000));
    assert_eq!(s.capitalized_interest, after - dec!(200000));
    // Nothing paid while interest accrues
    for e in &s.entries[..6] {
        assert_eq!(e.payment, Decimal::ZERO);
        assert_eq!(e.phase, Some(SchedulePhase::Deferred));
    }
    assert_eq!(s.entries[6].phase, Some(SchedulePhase::Amortization));
    let repaid: Money = s.entries.iter().map(|e| e.principal).sum();
    assert!((repaid - after).abs() < dec!(0.01));
}

#[test]
fn test_deferred_interest_only_keeps_balance() {
    let terms = LoanTerms {
        principal: dec!(200000),
        annual_rate: dec!(0.048),
        duration_months: 60,
        regime: RepaymentRegime::Deferred,
        deferral_months: 6,
        capitalize_deferred_interest: false,
    };
    let s = amortize_loan(&terms).unwrap().result;
    assert_eq!(s.balance_after_deferral, Some(dec!(200000)));
    assert_eq!(s.entries[0].payment, dec!(800));
}

#[test]
fn test_invalid_loans() {
    let zero = loan(Decimal::ZERO, dec!(0.05), 12, RepaymentRegime::Constant);
    match amortize_loan(&zero).unwrap_err() {
        DealEngineError::InvalidInput { field, .. } => assert_eq!(field, "principal"),
        other => panic!("Expected InvalidInput, got: {other:?}"),
    }
    assert!(amortize_loan(&loan(dec!(1000), dec!(-0.01), 12, RepaymentRegime::Constant)).is_err());
    assert!(amortize_loan(&loan(dec!(1000), dec!(0.05), 0, RepaymentRegime::InFine)).is_err());

    let mut deferral_on_constant = loan(dec!(1000), dec!(0.05), 12, RepaymentRegime::Constant);
    deferral_on_constant.deferral_months = 3;
    assert!(amortize_loan(&deferral_on_constant).is_err());
}

#[test]
fn test_regime_parses_from_json() {
    let terms: LoanTerms = serde_json::from_str(
        r#"{"principal":"250000","annual_rate":"0.05","duration_months":36,"regime":"IN_FINE"}"#,
    )
    .unwrap();
    assert_eq!(terms.regime, RepaymentRegime::InFine);
    assert_eq!(terms.deferral_months, 0);
}

// ===========================================================================
// Financing ratio tests
// ===========================================================================

#[test]
fn test_development_leverage() {
    let out = calculate_financing_ratios(&FinancingRatiosInput {
        loan_amount: dec!(6000000),
        property_value: dec!(10000000),
        total_cost: Some(dec!(8000000)),
        net_operating_income: Some(dec!(700000)),
        annual_debt_service: Some(dec!(400000)),
    })
    .unwrap();
    assert_eq!(out.result.ltv, dec!(0.6));
    assert_eq!(out.result.ltc, Some(dec!(0.75)));
    assert_eq!(out.result.dscr, Some(dec!(1.75)));
    assert!(out.warnings.is_empty());
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_constant_repays_principal(
        principal in 1_000u32..5_000_000,
        rate_bps in 0u32..1_500,
        months in 1u32..360,
    ) {
        let principal = Decimal::from(principal);
        let rate = Decimal::new(rate_bps as i64, 4);
        let entries = build_schedule(&loan(principal, rate, months, RepaymentRegime::Constant)).unwrap();
        prop_assert_eq!(entries.len(), months as usize);
        let repaid: Money = entries.iter().map(|e| e.principal).sum();
        prop_assert!((repaid - principal).abs() < dec!(0.01));
        prop_assert!(entries.last().unwrap().remaining_balance.abs() < dec!(0.01));
    }

    #[test]
    fn prop_in_fine_single_bullet(
        principal in 1_000u32..5_000_000,
        rate_bps in 0u32..1_500,
        months in 1u32..120,
    ) {
        let principal = Decimal::from(principal);
        let rate = Decimal::new(rate_bps as i64, 4);
        let entries = build_schedule(&loan(principal, rate, months, RepaymentRegime::InFine)).unwrap();
        let (last, rest) = entries.split_last().unwrap();
        prop_assert!(rest.iter().all(|e| e.principal.is_zero()));
        prop_assert_eq!(last.principal, principal);
    }

    #[test]
    fn prop_deferred_balance_after_window(
        principal in 1_000u32..5_000_000,
        rate_bps in 1u32..1_500,
        deferral in 1u32..24,
        extra in 1u32..120,
        capitalize in any::<bool>(),
    ) {
        let principal = Decimal::from(principal);
        let terms = LoanTerms {
            principal,
            annual_rate: Decimal::new(rate_bps as i64, 4),
            duration_months: deferral + extra,
            regime: RepaymentRegime::Deferred,
            deferral_months: deferral,
            capitalize_deferred_interest: capitalize,
        };
        let s = amortize_loan(&terms).unwrap().result;
        let after = s.balance_after_deferral.unwrap();
        if capitalize {
            prop_assert!(after >= principal);
        } else {
            prop_assert_eq!(after, principal);
        }
    }
}
