use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::debug;

use crate::error::DealEngineError;
use crate::time_value::{self, CURRENCY_TOLERANCE};
use crate::types::*;
use crate::DealEngineResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// How the loan principal is repaid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepaymentRegime {
    /// Level monthly payment (French amortisation)
    Constant,
    /// Interest only, full principal at maturity
    InFine,
    /// Grace window, then level payments on the remaining term
    Deferred,
}

impl FromStr for RepaymentRegime {
    type Err = DealEngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "CONSTANT" => Ok(RepaymentRegime::Constant),
            "IN_FINE" | "BULLET" => Ok(RepaymentRegime::InFine),
            "DEFERRED" => Ok(RepaymentRegime::Deferred),
            other => Err(DealEngineError::invalid(
                "regime",
                format!("Unknown repayment regime '{other}' (expected CONSTANT, IN_FINE or DEFERRED)"),
            )),
        }
    }
}

impl fmt::Display for RepaymentRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RepaymentRegime::Constant => "CONSTANT",
            RepaymentRegime::InFine => "IN_FINE",
            RepaymentRegime::Deferred => "DEFERRED",
        };
        f.write_str(label)
    }
}

/// Loan parameters for a monthly schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanTerms {
    /// Amount borrowed
    pub principal: Money,
    /// Nominal annual rate (0.04 = 4%)
    pub annual_rate: Rate,
    /// Loan term in months
    pub duration_months: Months,
    /// Repayment regime
    pub regime: RepaymentRegime,
    /// Grace window length; must be 0 unless the regime is DEFERRED
    #[serde(default)]
    pub deferral_months: Months,
    /// During the grace window, add interest to the balance instead of paying it
    #[serde(default)]
    pub capitalize_deferred_interest: bool,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Which part of a deferred loan a month belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulePhase {
    Deferred,
    Amortization,
}

/// A single month of the loan schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// 1-based month index
    pub month: Months,
    /// Cash paid this month (interest + principal)
    pub payment: Money,
    /// Principal repaid this month
    pub principal: Money,
    /// Interest charged this month
    pub interest: Money,
    /// Balance after this month
    pub remaining_balance: Money,
    /// Principal repaid to date
    pub cumulative_principal: Money,
    /// Interest charged to date (paid or capitalised)
    pub cumulative_interest: Money,
    /// Set for DEFERRED loans only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<SchedulePhase>,
}

/// Full schedule with summary figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanSchedule {
    pub regime: RepaymentRegime,
    /// Level payment once amortisation is running (CONSTANT / DEFERRED),
    /// the interest-only payment for IN_FINE
    pub periodic_payment: Money,
    /// Interest charged over the life of the loan
    pub total_interest: Money,
    /// Sum of all payments
    pub total_paid: Money,
    /// Interest added to principal during the grace window
    pub capitalized_interest: Money,
    /// Balance at the end of the grace window (DEFERRED only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_after_deferral: Option<Money>,
    pub entries: Vec<ScheduleEntry>,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Build a month-by-month schedule for the loan.
pub fn build_schedule(terms: &LoanTerms) -> DealEngineResult<Vec<ScheduleEntry>> {
    validate_terms(terms)?;
    debug!(
        principal = %terms.principal,
        annual_rate = %terms.annual_rate,
        months = terms.duration_months,
        regime = %terms.regime,
        "building loan schedule"
    );

    let r = time_value::monthly_rate(terms.annual_rate);
    let mut tracker = BalanceTracker::new(terms.principal, terms.duration_months as usize);

    match terms.regime {
        RepaymentRegime::Constant => {
            tracker.amortize(r, terms.duration_months, None)?;
        }
        RepaymentRegime::InFine => {
            for month in 1..=terms.duration_months {
                let interest = tracker.balance * r;
                let principal = if month == terms.duration_months {
                    tracker.balance
                } else {
                    Decimal::ZERO
                };
                tracker.record(interest, principal, Decimal::ZERO, None);
            }
        }
        RepaymentRegime::Deferred => {
            for _ in 0..terms.deferral_months {
                let interest = tracker.balance * r;
                if terms.capitalize_deferred_interest {
                    tracker.record(Decimal::ZERO, Decimal::ZERO, interest, Some(SchedulePhase::Deferred));
                } else {
                    tracker.record(interest, Decimal::ZERO, Decimal::ZERO, Some(SchedulePhase::Deferred));
                }
            }
            let remaining = terms.duration_months - terms.deferral_months;
            tracker.amortize(r, remaining, Some(SchedulePhase::Amortization))?;
        }
    }

    Ok(tracker.entries)
}

/// Build the schedule and wrap it with summary figures and metadata.
pub fn amortize_loan(terms: &LoanTerms) -> DealEngineResult<ComputationOutput<LoanSchedule>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if terms.capitalize_deferred_interest && terms.regime != RepaymentRegime::Deferred {
        warnings.push(format!(
            "capitalize_deferred_interest has no effect on a {} loan",
            terms.regime
        ));
    }

    let entries = build_schedule(terms)?;
    let schedule = summarise_schedule(terms, entries);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Monthly loan amortisation schedule",
        &serde_json::json!({
            "principal": terms.principal.to_string(),
            "annual_rate": terms.annual_rate.to_string(),
            "duration_months": terms.duration_months,
            "regime": terms.regime,
            "deferral_months": terms.deferral_months,
            "capitalize_deferred_interest": terms.capitalize_deferred_interest,
        }),
        warnings,
        elapsed,
        schedule,
    ))
}

fn summarise_schedule(terms: &LoanTerms, entries: Vec<ScheduleEntry>) -> LoanSchedule {
    let total_paid: Money = entries.iter().map(|e| e.payment).sum();
    let total_interest = entries
        .last()
        .map(|e| e.cumulative_interest)
        .unwrap_or(Decimal::ZERO);

    let deferral = terms.deferral_months as usize;
    let (capitalized_interest, balance_after_deferral) = match terms.regime {
        RepaymentRegime::Deferred => {
            let balance = entries
                .get(deferral.saturating_sub(1))
                .map(|e| e.remaining_balance)
                .unwrap_or(terms.principal);
            (balance - terms.principal, Some(balance))
        }
        _ => (Decimal::ZERO, None),
    };

    let periodic_payment = match terms.regime {
        RepaymentRegime::Constant => entries.first().map(|e| e.payment),
        // coupon only; the last entry also carries the bullet
        RepaymentRegime::InFine => {
            Some(terms.principal * time_value::monthly_rate(terms.annual_rate))
        }
        RepaymentRegime::Deferred => entries.get(deferral).map(|e| e.payment),
    }
    .unwrap_or(Decimal::ZERO);

    LoanSchedule {
        regime: terms.regime,
        periodic_payment,
        total_interest,
        total_paid,
        capitalized_interest,
        balance_after_deferral,
        entries,
    }
}

fn validate_terms(terms: &LoanTerms) -> DealEngineResult<()> {
    if terms.principal <= Decimal::ZERO {
        return Err(DealEngineError::invalid(
            "principal",
            "Loan principal must be positive",
        ));
    }
    if terms.annual_rate < Decimal::ZERO {
        return Err(DealEngineError::invalid(
            "annual_rate",
            "Interest rate cannot be negative",
        ));
    }
    if terms.duration_months == 0 {
        return Err(DealEngineError::invalid(
            "duration_months",
            "Loan duration must be at least 1 month",
        ));
    }
    match terms.regime {
        RepaymentRegime::Deferred => {
            if terms.deferral_months == 0 || terms.deferral_months >= terms.duration_months {
                return Err(DealEngineError::invalid(
                    "deferral_months",
                    format!(
                        "Deferral must be between 1 and {} months for a {}-month loan",
                        terms.duration_months.saturating_sub(1),
                        terms.duration_months
                    ),
                ));
            }
        }
        _ => {
            if terms.deferral_months != 0 {
                return Err(DealEngineError::invalid(
                    "deferral_months",
                    format!("Deferral only applies to DEFERRED loans, not {}", terms.regime),
                ));
            }
        }
    }
    Ok(())
}

/// Running balance and cumulative totals while the schedule is emitted.
struct BalanceTracker {
    balance: Money,
    cumulative_principal: Money,
    cumulative_interest: Money,
    entries: Vec<ScheduleEntry>,
}

impl BalanceTracker {
    fn new(principal: Money, capacity: usize) -> Self {
        Self {
            balance: principal,
            cumulative_principal: Decimal::ZERO,
            cumulative_interest: Decimal::ZERO,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Push one month. `paid_interest` is settled in cash, `capitalized`
    /// interest is added to the balance.
    fn record(
        &mut self,
        paid_interest: Money,
        principal: Money,
        capitalized: Money,
        phase: Option<SchedulePhase>,
    ) {
        self.balance = self.balance + capitalized - principal;
        self.cumulative_principal += principal;
        self.cumulative_interest += paid_interest + capitalized;
        self.entries.push(ScheduleEntry {
            month: self.entries.len() as Months + 1,
            payment: paid_interest + principal,
            principal,
            interest: paid_interest + capitalized,
            remaining_balance: self.balance,
            cumulative_principal: self.cumulative_principal,
            cumulative_interest: self.cumulative_interest,
            phase,
        });
    }

    /// Level-payment amortisation of the current balance over `months`.
    fn amortize(
        &mut self,
        monthly_rate: Rate,
        months: Months,
        phase: Option<SchedulePhase>,
    ) -> DealEngineResult<()> {
        let payment = time_value::annuity_payment(self.balance, monthly_rate, months)?;
        for month in 1..=months {
            let interest = self.balance * monthly_rate;
            let mut principal = payment - interest;
            if month == months {
                let residual = self.balance - principal;
                if residual.abs() < CURRENCY_TOLERANCE {
                    principal = self.balance;
                }
            }
            self.record(interest, principal, Decimal::ZERO, phase);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
