use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::error::DealEngineError;
use crate::types::{Money, Rate, Years};
use crate::DealEngineResult;

/// Smallest currency unit the engine ever snaps or compares against.
pub const CURRENCY_TOLERANCE: Decimal = dec!(0.01);

const MONTHS_PER_YEAR: Decimal = dec!(12);

/// Nominal annual rate to its monthly periodic equivalent (annual / 12).
pub fn monthly_rate(annual_rate: Rate) -> Rate {
    annual_rate / MONTHS_PER_YEAR
}

/// (1 + rate)^periods for whole periods, by repeated multiplication.
pub fn compound_factor(rate: Rate, periods: u32) -> DealEngineResult<Decimal> {
    let one_plus_r = Decimal::ONE + rate;
    let mut factor = Decimal::ONE;
    for _ in 0..periods {
        factor = factor
            .checked_mul(one_plus_r)
            .ok_or_else(|| DealEngineError::invalid("rate", "compounding overflowed"))?;
    }
    Ok(factor)
}

/// (1 + rate)^years, accepting fractional years.
pub fn compound_growth(rate: Rate, years: Years) -> DealEngineResult<Decimal> {
    if years < Decimal::ZERO {
        return Err(DealEngineError::invalid(
            "years",
            "Compounding period cannot be negative",
        ));
    }
    if let Some(whole) = whole_periods(years) {
        return compound_factor(rate, whole);
    }
    if rate <= dec!(-1) {
        return Err(DealEngineError::invalid(
            "rate",
            "Fractional compounding requires a rate above -100%",
        ));
    }
    (Decimal::ONE + rate)
        .checked_powd(years)
        .ok_or_else(|| DealEngineError::invalid("rate", "compounding overflowed"))
}

/// Level payment that amortises `principal` over `periods` at `rate` per period:
/// P * r(1+r)^n / ((1+r)^n - 1), or P / n when the rate is zero.
pub fn annuity_payment(principal: Money, rate: Rate, periods: u32) -> DealEngineResult<Money> {
    if periods == 0 {
        return Err(DealEngineError::invalid(
            "periods",
            "Number of periods must be > 0",
        ));
    }

    if rate.is_zero() {
        return Ok(principal / Decimal::from(periods));
    }

    let compound = compound_factor(rate, periods)?;
    let denominator = compound - Decimal::ONE;
    if denominator.is_zero() {
        return Err(DealEngineError::DivisionByZero {
            context: "annuity payment denominator".into(),
        });
    }

    let numerator = principal
        .checked_mul(rate)
        .and_then(|v| v.checked_mul(compound))
        .ok_or_else(|| DealEngineError::invalid("principal", "annuity payment overflowed"))?;
    Ok(numerator / denominator)
}

/// Convert a periodic rate to its effective annual equivalent: (1 + r)^k - 1.
pub fn annualize_rate(periodic_rate: Rate, periods_per_year: u32) -> DealEngineResult<Rate> {
    if periods_per_year == 0 {
        return Err(DealEngineError::invalid(
            "periods_per_year",
            "Must be at least 1",
        ));
    }
    Ok(compound_factor(periodic_rate, periods_per_year)? - Decimal::ONE)
}

/// Round a money amount to cents for presentation (warnings, reports).
pub fn round_currency(amount: Money) -> Money {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `Some(n)` when `years` is a non-negative whole number that fits in u32.
pub fn whole_periods(years: Years) -> Option<u32> {
    if years < Decimal::ZERO || !years.fract().is_zero() {
        return None;
    }
    years.to_u32()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_monthly_rate() {
        assert_eq!(monthly_rate(dec!(0.06)), dec!(0.005));
        assert_eq!(monthly_rate(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_compound_factor_exact() {
        // 1.15^3 = 1.520875
        assert_eq!(compound_factor(dec!(0.15), 3).unwrap(), dec!(1.520875));
        assert_eq!(compound_factor(dec!(0.15), 0).unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_compound_growth_fractional() {
        // 1.21^0.5 = 1.1
        let g = compound_growth(dec!(0.21), dec!(0.5)).unwrap();
        assert!((g - dec!(1.1)).abs() < dec!(0.0000001), "got {g}");
    }

    #[test]
    fn test_compound_growth_whole_matches_factor() {
        assert_eq!(
            compound_growth(dec!(0.08), dec!(4)).unwrap(),
            compound_factor(dec!(0.08), 4).unwrap()
        );
    }

    #[test]
    fn test_compound_growth_negative_years_error() {
        assert!(compound_growth(dec!(0.08), dec!(-1)).is_err());
    }

    #[test]
    fn test_annuity_payment_mortgage() {
        // 100,000 over 240 months at 4% nominal => ~605.98
        let pmt = annuity_payment(dec!(100000), monthly_rate(dec!(0.04)), 240).unwrap();
        assert!((pmt - dec!(605.98)).abs() < dec!(0.01), "got {pmt}");
    }

    #[test]
    fn test_annuity_payment_zero_rate() {
        let pmt = annuity_payment(dec!(1200), Decimal::ZERO, 12).unwrap();
        assert_eq!(pmt, dec!(100));
    }

    #[test]
    fn test_annuity_payment_zero_periods_error() {
        assert!(annuity_payment(dec!(1000), dec!(0.01), 0).is_err());
    }

    #[test]
    fn test_annualize_monthly_rate() {
        // 1% monthly => 12.68% effective annual
        let annual = annualize_rate(dec!(0.01), 12).unwrap();
        assert!((annual - dec!(0.126825)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_round_currency_midpoint() {
        assert_eq!(round_currency(dec!(605.975)), dec!(605.98));
        assert_eq!(round_currency(dec!(-0.005)), dec!(-0.01));
    }

    #[test]
    fn test_whole_periods() {
        assert_eq!(whole_periods(dec!(3)), Some(3));
        assert_eq!(whole_periods(dec!(3.0)), Some(3));
        assert_eq!(whole_periods(dec!(2.5)), None);
        assert_eq!(whole_periods(dec!(-1)), None);
    }
}
