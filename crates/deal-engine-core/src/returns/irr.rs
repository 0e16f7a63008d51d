use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DealEngineError;
use crate::types::{Money, Rate};
use crate::DealEngineResult;

/// Seed for Newton's method when the caller has no better estimate.
pub const DEFAULT_IRR_GUESS: Rate = dec!(0.10);

const CONVERGENCE_THRESHOLD: Decimal = dec!(0.0000001);
const MAX_IRR_ITERATIONS: u32 = 100;
const MIN_RATE: Rate = dec!(-0.9999);
const MAX_RATE: Rate = dec!(100);
const MAX_STEP_HALVINGS: u32 = 40;

/// Newton-Raphson settings for IRR root-finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrSolver {
    /// Starting rate (per period)
    pub guess: Rate,
    /// Absolute NPV below which the rate is accepted
    pub tolerance: Decimal,
    /// Hard cap on Newton steps
    pub max_iterations: u32,
}

impl Default for IrrSolver {
    fn default() -> Self {
        Self {
            guess: DEFAULT_IRR_GUESS,
            tolerance: CONVERGENCE_THRESHOLD,
            max_iterations: MAX_IRR_ITERATIONS,
        }
    }
}

/// Net Present Value of a full series; index 0 is undiscounted.
pub fn npv(rate: Rate, cash_flows: &[Money]) -> DealEngineResult<Money> {
    if rate <= dec!(-1) {
        return Err(DealEngineError::invalid(
            "rate",
            "Discount rate must be greater than -100%",
        ));
    }

    npv_and_derivative(cash_flows, rate)
        .map(|(value, _)| value)
        .ok_or_else(|| DealEngineError::invalid("rate", "NPV overflowed at this discount rate"))
}

/// NPV of an outlay at t=0 followed by one flow per period from t=1:
/// -outlay + sum cf_i / (1+rate)^i.
pub fn compute_npv(
    initial_outlay: Money,
    cash_flows: &[Money],
    discount_rate: Rate,
) -> DealEngineResult<Money> {
    validate_outlay(initial_outlay)?;
    npv(discount_rate, &cash_flow_series(initial_outlay, cash_flows))
}

/// IRR of an outlay at t=0 followed by one flow per period, seeded at 10%.
pub fn compute_irr(initial_outlay: Money, cash_flows: &[Money]) -> DealEngineResult<Rate> {
    validate_outlay(initial_outlay)?;
    irr(
        &cash_flow_series(initial_outlay, cash_flows),
        &IrrSolver::default(),
    )
}

/// Prepend the (negated) outlay to the periodic flows.
pub fn cash_flow_series(initial_outlay: Money, cash_flows: &[Money]) -> Vec<Money> {
    let mut series = Vec::with_capacity(cash_flows.len() + 1);
    series.push(-initial_outlay);
    series.extend_from_slice(cash_flows);
    series
}

/// Internal Rate of Return using Newton-Raphson.
///
/// Fails with `NoRealRoot` when the series never changes sign, and with
/// `ConvergenceFailure` when the derivative vanishes or the iteration budget
/// runs out. A rate of exactly zero is a valid answer and is never used as a
/// fallback.
pub fn irr(cash_flows: &[Money], solver: &IrrSolver) -> DealEngineResult<Rate> {
    if cash_flows.len() < 2 {
        return Err(DealEngineError::InsufficientData(
            "IRR requires at least 2 cash flows".into(),
        ));
    }

    let has_inflow = cash_flows.iter().any(|cf| *cf > Decimal::ZERO);
    let has_outflow = cash_flows.iter().any(|cf| *cf < Decimal::ZERO);
    if !(has_inflow && has_outflow) {
        warn!(periods = cash_flows.len(), "IRR undefined: no sign change");
        return Err(DealEngineError::NoRealRoot(
            "cash flows never change sign, so NPV has no zero".into(),
        ));
    }

    let mut rate = solver.guess.clamp(MIN_RATE, MAX_RATE);
    let mut last_delta = Decimal::MAX;

    for i in 0..solver.max_iterations {
        let (value, slope) =
            npv_and_derivative(cash_flows, rate).ok_or(DealEngineError::ConvergenceFailure {
                function: "IRR".into(),
                iterations: i,
                last_delta,
            })?;
        last_delta = value;

        if value.abs() < solver.tolerance {
            debug!(iterations = i, rate = %rate, "IRR converged");
            return Ok(rate);
        }

        if slope.is_zero() {
            warn!(iterations = i, "IRR derivative vanished");
            return Err(DealEngineError::ConvergenceFailure {
                function: "IRR".into(),
                iterations: i,
                last_delta: value,
            });
        }

        let step = value
            .checked_div(slope)
            .ok_or(DealEngineError::ConvergenceFailure {
                function: "IRR".into(),
                iterations: i,
                last_delta: value,
            })?;
        let mut next = rate
            .checked_sub(step)
            .unwrap_or(if step.is_sign_positive() {
                MIN_RATE
            } else {
                MAX_RATE
            })
            .clamp(MIN_RATE, MAX_RATE);

        // Pull the step back toward the current rate until NPV is representable
        let mut halvings = 0;
        while npv_and_derivative(cash_flows, next).is_none() && halvings < MAX_STEP_HALVINGS {
            next = (rate + next) / dec!(2);
            halvings += 1;
        }

        rate = next;
    }

    warn!(
        iterations = solver.max_iterations,
        last_delta = %last_delta,
        "IRR did not converge"
    );
    Err(DealEngineError::ConvergenceFailure {
        function: "IRR".into(),
        iterations: solver.max_iterations,
        last_delta,
    })
}

/// IRR of an outlay followed by a single payoff after `periods` periods,
/// i.e. `[-outlay, 0, ..., 0, proceeds]`.
///
/// This series has the exact root `(proceeds / outlay)^(1/periods) - 1`, so
/// it is solved in closed form: the answer exists for any proceeds, even far
/// outside the range Newton's method searches. Zero proceeds is a total loss
/// (-100%).
pub fn single_exit_irr(outlay: Money, proceeds: Money, periods: u32) -> DealEngineResult<Rate> {
    if outlay <= Decimal::ZERO {
        return Err(DealEngineError::invalid(
            "initial_outlay",
            "Single-exit IRR needs a positive outlay",
        ));
    }
    if proceeds < Decimal::ZERO {
        return Err(DealEngineError::invalid(
            "proceeds",
            "Single-exit proceeds cannot be negative",
        ));
    }
    if periods == 0 {
        return Err(DealEngineError::InsufficientData(
            "Single-exit IRR needs at least one period".into(),
        ));
    }
    if proceeds.is_zero() {
        return Ok(dec!(-1));
    }

    let multiple = proceeds
        .checked_div(outlay)
        .ok_or_else(|| DealEngineError::invalid("proceeds", "proceeds / outlay overflowed"))?;
    if periods == 1 {
        return Ok(multiple - Decimal::ONE);
    }
    let growth = multiple
        .checked_powd(Decimal::ONE / Decimal::from(periods))
        .ok_or_else(|| DealEngineError::invalid("proceeds", "single-exit IRR overflowed"))?;
    Ok(growth - Decimal::ONE)
}

fn validate_outlay(initial_outlay: Money) -> DealEngineResult<()> {
    if initial_outlay < Decimal::ZERO {
        return Err(DealEngineError::invalid(
            "initial_outlay",
            "Initial outlay is given as a positive amount",
        ));
    }
    Ok(())
}

/// NPV(r) = sum CF_t / (1+r)^t and its derivative d(NPV)/dr.
/// `None` when any term leaves Decimal range.
fn npv_and_derivative(cash_flows: &[Money], rate: Rate) -> Option<(Decimal, Decimal)> {
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }

    let mut value = Decimal::ZERO;
    let mut slope = Decimal::ZERO;
    let mut discount = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        let pv = cf.checked_mul(discount)?;
        value = value.checked_add(pv)?;
        if t > 0 {
            // d/dr of CF_t / (1+r)^t = -t * CF_t / (1+r)^(t+1)
            let term = Decimal::from(t as u64)
                .checked_mul(pv)?
                .checked_div(one_plus_r)?;
            slope = slope.checked_sub(term)?;
        }
        discount = discount.checked_div(one_plus_r)?;
    }

    Some((value, slope))
}
