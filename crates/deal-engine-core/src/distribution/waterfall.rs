use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::error::DealEngineError;
use crate::returns::irr::single_exit_irr;
use crate::time_value::{compound_growth, round_currency, whole_periods};
use crate::types::*;
use crate::DealEngineResult;

const SHARE_TOLERANCE: Decimal = dec!(0.000000001);
/// An achieved return this close to a threshold counts as reaching it.
const THRESHOLD_TOLERANCE: Rate = dec!(0.000000001);

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// Single-hurdle split: capital back, preferred return, then a fixed split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallTerms {
    /// Equity put in by the investor
    pub invested_capital: Money,
    /// Everything available for distribution at exit
    pub total_proceeds: Money,
    /// Annual preferred return
    pub hurdle_rate: Rate,
    /// Holding period in years; compounds the hurdle when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investment_duration: Option<Years>,
    /// Investor's share of the surplus above the hurdle
    pub investor_share_above: Rate,
    /// Sponsor's share of the surplus above the hurdle (the promote)
    pub sponsor_share_above: Rate,
}

/// One rung of a tiered promote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallTier {
    /// Achieved annual return from which this split applies
    pub threshold: Rate,
    pub investor_share: Rate,
    pub sponsor_share: Rate,
}

/// Tiered promote: the achieved return picks one split for the whole surplus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TieredWaterfallTerms {
    pub invested_capital: Money,
    pub total_proceeds: Money,
    /// Holding period in whole years
    pub investment_duration: Years,
    /// Strictly ascending by threshold
    pub tiers: Vec<WaterfallTier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum WaterfallInput {
    SingleTier(WaterfallTerms),
    MultiTier(TieredWaterfallTerms),
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Full distribution of proceeds between investor and sponsor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallResult {
    /// Per-step breakdown, in payment order
    pub steps: Vec<DistributionStep>,
    pub capital_returned: Money,
    /// Preferred return owed on the capital (zero for tiered terms)
    pub hurdle_target: Money,
    pub preferred_return_paid: Money,
    /// Proceeds left after capital and preferred return
    pub surplus: Money,
    pub investor_total: Money,
    pub sponsor_total: Money,
    /// Annual IRR of the single exit, when it can be measured
    pub achieved_return: Option<Rate>,
    /// Sponsor's share of the profit
    pub effective_promote_rate: Option<Rate>,
    /// Capital came back in full with something left over
    pub hurdle_reached: bool,
    /// The preferred return was paid in full with surplus left to split
    /// (tiered terms: a tier was reached)
    pub hurdle_met: bool,
    /// Index into the tier list for tiered terms
    pub selected_tier: Option<usize>,
}

/// Result for a single distribution step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionStep {
    pub step_name: String,
    /// Total amount distributed in this step
    pub amount: Money,
    pub to_investor: Money,
    pub to_sponsor: Money,
    /// Proceeds remaining after this step
    pub remaining: Money,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Distribute proceeds through return of capital, preferred return and a
/// fixed investor/sponsor split of whatever is left.
pub fn distribute(terms: &WaterfallTerms) -> DealEngineResult<WaterfallResult> {
    validate_amounts(terms.invested_capital, terms.total_proceeds)?;
    if terms.hurdle_rate < Decimal::ZERO {
        return Err(DealEngineError::invalid(
            "hurdle_rate",
            "Hurdle rate cannot be negative",
        ));
    }
    validate_shares(
        "investor_share_above",
        terms.investor_share_above,
        terms.sponsor_share_above,
    )?;
    if let Some(d) = terms.investment_duration {
        if d < Decimal::ZERO {
            return Err(DealEngineError::invalid(
                "investment_duration",
                "Investment duration cannot be negative",
            ));
        }
    }

    let capital = terms.invested_capital;
    let proceeds = terms.total_proceeds;
    let hurdle_target = hurdle_target(capital, terms.hurdle_rate, terms.investment_duration)?;

    let achieved_return = match terms.investment_duration.and_then(whole_periods) {
        Some(periods) if periods > 0 && proceeds > Decimal::ZERO => {
            Some(single_exit_irr(capital, proceeds, periods)?)
        }
        _ => None,
    };

    let mut steps = Vec::with_capacity(3);
    let mut remaining = proceeds;

    // --- Return of capital ---
    let capital_returned = remaining.min(capital);
    remaining -= capital_returned;
    steps.push(investor_step("Return of Capital", capital_returned, remaining));

    if remaining <= Decimal::ZERO {
        debug!(%proceeds, %capital, "Waterfall ended at return of capital");
        return Ok(WaterfallResult {
            steps,
            capital_returned,
            hurdle_target,
            preferred_return_paid: Decimal::ZERO,
            surplus: Decimal::ZERO,
            investor_total: capital_returned,
            sponsor_total: Decimal::ZERO,
            achieved_return,
            effective_promote_rate: None,
            hurdle_reached: false,
            hurdle_met: false,
            selected_tier: None,
        });
    }

    // --- Preferred return ---
    let preferred_return_paid = remaining.min(hurdle_target);
    remaining -= preferred_return_paid;
    steps.push(investor_step(
        "Preferred Return",
        preferred_return_paid,
        remaining,
    ));

    if remaining <= Decimal::ZERO {
        debug!(%preferred_return_paid, %hurdle_target, "Waterfall ended at preferred return");
        return Ok(WaterfallResult {
            steps,
            capital_returned,
            hurdle_target,
            preferred_return_paid,
            surplus: Decimal::ZERO,
            investor_total: capital_returned + preferred_return_paid,
            sponsor_total: Decimal::ZERO,
            achieved_return,
            effective_promote_rate: promote_rate(Decimal::ZERO, proceeds, capital),
            hurdle_reached: true,
            hurdle_met: false,
            selected_tier: None,
        });
    }

    // --- Residual split ---
    let surplus = remaining;
    let split = split_step("Residual Split", surplus, terms.sponsor_share_above);
    let to_sponsor = split.to_sponsor;
    let to_investor = split.to_investor;
    steps.push(split);

    let sponsor_total = to_sponsor;
    Ok(WaterfallResult {
        steps,
        capital_returned,
        hurdle_target,
        preferred_return_paid,
        surplus,
        investor_total: capital_returned + preferred_return_paid + to_investor,
        sponsor_total,
        achieved_return,
        effective_promote_rate: promote_rate(sponsor_total, proceeds, capital),
        hurdle_reached: true,
        hurdle_met: true,
        selected_tier: None,
    })
}

/// Tiered promote. The achieved return on the single exit selects the
/// highest tier whose threshold it reaches, and that tier's split applies
/// to the whole surplus over capital. Below the first threshold the investor
/// keeps everything.
pub fn distribute_tiered(terms: &TieredWaterfallTerms) -> DealEngineResult<WaterfallResult> {
    validate_amounts(terms.invested_capital, terms.total_proceeds)?;
    validate_tiers(&terms.tiers)?;

    let periods = whole_periods(terms.investment_duration)
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            DealEngineError::invalid(
                "investment_duration",
                "Tiered waterfall needs a whole number of years, at least one",
            )
        })?;

    let capital = terms.invested_capital;
    let proceeds = terms.total_proceeds;

    let achieved = single_exit_irr(capital, proceeds, periods)?;
    let selected_tier = terms
        .tiers
        .iter()
        .rposition(|t| t.threshold <= achieved + THRESHOLD_TOLERANCE);
    debug!(achieved = %achieved, tier = ?selected_tier, "Tier selected");

    let mut steps = Vec::with_capacity(2);
    let capital_returned = proceeds.min(capital);
    let surplus = proceeds - capital_returned;
    steps.push(investor_step("Return of Capital", capital_returned, surplus));

    let (to_investor, to_sponsor) = if surplus > Decimal::ZERO {
        let step = match selected_tier {
            Some(idx) => split_step(
                &format!("Tier {} Split", idx + 1),
                surplus,
                terms.tiers[idx].sponsor_share,
            ),
            None => investor_step("Below First Tier", surplus, Decimal::ZERO),
        };
        let amounts = (step.to_investor, step.to_sponsor);
        steps.push(step);
        amounts
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };

    Ok(WaterfallResult {
        steps,
        capital_returned,
        hurdle_target: Decimal::ZERO,
        preferred_return_paid: Decimal::ZERO,
        surplus,
        investor_total: capital_returned + to_investor,
        sponsor_total: to_sponsor,
        achieved_return: Some(achieved),
        effective_promote_rate: promote_rate(to_sponsor, proceeds, capital),
        hurdle_reached: surplus > Decimal::ZERO,
        hurdle_met: selected_tier.is_some(),
        selected_tier,
    })
}

/// Run either waterfall variant and wrap it with metadata.
pub fn calculate_waterfall(
    input: &WaterfallInput,
) -> DealEngineResult<ComputationOutput<WaterfallResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let (methodology, result) = match input {
        WaterfallInput::SingleTier(terms) => {
            let result = distribute(terms)?;
            if result.achieved_return.is_none() && terms.total_proceeds > Decimal::ZERO {
                warnings.push(
                    "Achieved return not available: needs a whole-year investment_duration"
                        .into(),
                );
            }
            let shortfall = result.hurdle_target - result.preferred_return_paid;
            if result.hurdle_reached && shortfall > Decimal::ZERO {
                warnings.push(format!(
                    "Preferred return short by {}",
                    round_currency(shortfall)
                ));
            }
            ("Single-hurdle distribution waterfall", result)
        }
        WaterfallInput::MultiTier(terms) => {
            let result = distribute_tiered(terms)?;
            if result.selected_tier.is_none() && result.surplus > Decimal::ZERO {
                warnings.push("Achieved return below the first tier: no promote paid".into());
            }
            ("Tiered promote distribution waterfall", result)
        }
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        methodology,
        &serde_json::json!({
            "investor_total": result.investor_total.to_string(),
            "sponsor_total": result.sponsor_total.to_string(),
        }),
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn hurdle_target(capital: Money, hurdle_rate: Rate, duration: Option<Years>) -> DealEngineResult<Money> {
    match duration {
        Some(d) => {
            let growth = compound_growth(hurdle_rate, d)?;
            Ok(capital * (growth - Decimal::ONE))
        }
        None => Ok(capital * hurdle_rate),
    }
}

fn promote_rate(sponsor_total: Money, proceeds: Money, capital: Money) -> Option<Rate> {
    let profit = proceeds - capital;
    if profit > Decimal::ZERO {
        Some(sponsor_total / profit)
    } else {
        None
    }
}

fn investor_step(name: &str, amount: Money, remaining: Money) -> DistributionStep {
    DistributionStep {
        step_name: name.into(),
        amount,
        to_investor: amount,
        to_sponsor: Decimal::ZERO,
        remaining,
    }
}

fn split_step(name: &str, amount: Money, sponsor_share: Rate) -> DistributionStep {
    let to_sponsor = amount * sponsor_share;
    DistributionStep {
        step_name: name.into(),
        amount,
        to_investor: amount - to_sponsor,
        to_sponsor,
        remaining: Decimal::ZERO,
    }
}

fn validate_amounts(capital: Money, proceeds: Money) -> DealEngineResult<()> {
    if capital <= Decimal::ZERO {
        return Err(DealEngineError::invalid(
            "invested_capital",
            "Invested capital must be positive",
        ));
    }
    if proceeds < Decimal::ZERO {
        return Err(DealEngineError::invalid(
            "total_proceeds",
            "Total proceeds cannot be negative",
        ));
    }
    Ok(())
}

fn validate_shares(field: &str, investor: Rate, sponsor: Rate) -> DealEngineResult<()> {
    let in_range = |s: Rate| s >= Decimal::ZERO && s <= Decimal::ONE;
    if !in_range(investor) || !in_range(sponsor) {
        return Err(DealEngineError::invalid(field, "Shares must be between 0 and 1"));
    }
    if (investor + sponsor - Decimal::ONE).abs() > SHARE_TOLERANCE {
        return Err(DealEngineError::invalid(
            field,
            format!("Investor and sponsor shares sum to {}, not 1", investor + sponsor),
        ));
    }
    Ok(())
}

fn validate_tiers(tiers: &[WaterfallTier]) -> DealEngineResult<()> {
    if tiers.is_empty() {
        return Err(DealEngineError::invalid(
            "tiers",
            "At least one waterfall tier is required",
        ));
    }
    for (i, tier) in tiers.iter().enumerate() {
        validate_shares(&format!("tiers[{i}]"), tier.investor_share, tier.sponsor_share)?;
    }
    if tiers.windows(2).any(|w| w[1].threshold <= w[0].threshold) {
        return Err(DealEngineError::invalid(
            "tiers",
            "Tier thresholds must be strictly ascending",
        ));
    }
    Ok(())
}
