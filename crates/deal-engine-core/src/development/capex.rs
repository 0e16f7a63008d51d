use chrono::NaiveDate;
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::debug;

use crate::development::timeline::{add_months, Phase};
use crate::error::DealEngineError;
use crate::types::*;
use crate::DealEngineResult;

/// The logistic is sampled on [-SCURVE_HALF_WIDTH, +SCURVE_HALF_WIDTH].
const SCURVE_HALF_WIDTH: Decimal = dec!(6);

const FRONT_LOADED_BANDS: [Rate; 3] = [dec!(0.40), dec!(0.35), dec!(0.25)];
const BACK_LOADED_BANDS: [Rate; 3] = [dec!(0.25), dec!(0.35), dec!(0.40)];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Disbursement profile of a budget over time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveShape {
    /// Equal amount every month
    #[default]
    Linear,
    /// Slow start, fast middle, slow finish
    SCurve,
    /// 40% / 35% / 25% across thirds of the duration
    FrontLoaded,
    /// 25% / 35% / 40% across thirds of the duration
    BackLoaded,
}

impl FromStr for CurveShape {
    type Err = DealEngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "linear" => Ok(CurveShape::Linear),
            "s_curve" | "scurve" => Ok(CurveShape::SCurve),
            "front_loaded" => Ok(CurveShape::FrontLoaded),
            "back_loaded" => Ok(CurveShape::BackLoaded),
            other => Err(DealEngineError::invalid(
                "shape",
                format!(
                    "Unknown curve shape '{other}' (expected linear, s_curve, front_loaded or back_loaded)"
                ),
            )),
        }
    }
}

impl fmt::Display for CurveShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CurveShape::Linear => "linear",
            CurveShape::SCurve => "s_curve",
            CurveShape::FrontLoaded => "front_loaded",
            CurveShape::BackLoaded => "back_loaded",
        };
        f.write_str(label)
    }
}

impl CurveShape {
    /// Normalised monthly weights (non-negative, summing to 1) for `months` months.
    pub fn weights(&self, months: Months) -> DealEngineResult<Vec<Decimal>> {
        let raw = self.raw_weights(months)?;
        let total: Decimal = raw.iter().copied().sum();
        Ok(raw.into_iter().map(|w| w / total).collect())
    }

    /// Unnormalised weights; allocation divides by their sum last so that
    /// evenly divisible budgets stay exact.
    fn raw_weights(&self, months: Months) -> DealEngineResult<Vec<Decimal>> {
        if months == 0 {
            return Err(DealEngineError::invalid(
                "duration_months",
                "Curve duration must be at least 1 month",
            ));
        }
        match self {
            CurveShape::Linear => Ok(vec![Decimal::ONE; months as usize]),
            CurveShape::SCurve => logistic_increments(months),
            CurveShape::FrontLoaded => Ok(banded(months, &FRONT_LOADED_BANDS)),
            CurveShape::BackLoaded => Ok(banded(months, &BACK_LOADED_BANDS)),
        }
    }
}

/// Input for a stand-alone CAPEX curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapexInput {
    /// Total budget to disburse
    pub total_budget: Money,
    /// Number of months to spread it over
    pub duration_months: Months,
    pub shape: CurveShape,
    /// Date of month 1; when present every point carries its calendar date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
}

/// A single month of disbursement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapexPoint {
    /// 1-based month within the curve
    pub month: Months,
    pub amount: Money,
    pub cumulative: Money,
    /// cumulative / total budget
    pub pct_complete: Rate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

/// Curve with headline figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapexCurve {
    pub shape: CurveShape,
    pub total_budget: Money,
    pub duration_months: Months,
    /// Month with the largest disbursement (earliest on ties)
    pub peak_month: Months,
    pub peak_amount: Money,
    pub points: Vec<CapexPoint>,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Spread `total_budget` across `duration_months` months following `shape`.
pub fn generate_curve(
    total_budget: Money,
    duration_months: Months,
    shape: CurveShape,
) -> DealEngineResult<Vec<CapexPoint>> {
    if total_budget <= Decimal::ZERO {
        return Err(DealEngineError::invalid(
            "total_budget",
            "Budget must be positive",
        ));
    }
    if duration_months == 0 {
        return Err(DealEngineError::invalid(
            "duration_months",
            "Curve duration must be at least 1 month",
        ));
    }

    let raw = shape.raw_weights(duration_months)?;
    let raw_total: Decimal = raw.iter().copied().sum();
    let last = raw.len() - 1;

    let mut points = Vec::with_capacity(raw.len());
    let mut cumulative = Decimal::ZERO;
    for (i, w) in raw.iter().enumerate() {
        // Final month takes the residue so the curve closes on the budget
        let amount = if i == last {
            total_budget - cumulative
        } else {
            total_budget * w / raw_total
        };
        cumulative += amount;
        points.push(CapexPoint {
            month: i as Months + 1,
            amount,
            cumulative,
            pct_complete: cumulative / total_budget,
            date: None,
        });
    }

    debug!(
        budget = %total_budget,
        months = duration_months,
        shape = %shape,
        "capex curve generated"
    );
    Ok(points)
}

/// Curve covering exactly `phase`, with each month dated from the phase start.
pub fn generate_phase_curve(
    total_budget: Money,
    phase: &Phase,
    shape: CurveShape,
) -> DealEngineResult<Vec<CapexPoint>> {
    let mut points = generate_curve(total_budget, phase.duration_months, shape)?;
    attach_dates(&mut points, phase.start_date)?;
    Ok(points)
}

/// Build a CAPEX curve and wrap it with headline figures and metadata.
pub fn build_capex_curve(input: &CapexInput) -> DealEngineResult<ComputationOutput<CapexCurve>> {
    let start = Instant::now();
    let warnings: Vec<String> = Vec::new();

    let mut points = generate_curve(input.total_budget, input.duration_months, input.shape)?;
    if let Some(start_date) = input.start_date {
        attach_dates(&mut points, start_date)?;
    }
    let curve = summarise_curve(input.total_budget, input.shape, points);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "CAPEX disbursement curve",
        &serde_json::json!({
            "total_budget": input.total_budget.to_string(),
            "duration_months": input.duration_months,
            "shape": input.shape,
        }),
        warnings,
        elapsed,
        curve,
    ))
}

/// Wrap points with peak figures.
pub fn summarise_curve(total_budget: Money, shape: CurveShape, points: Vec<CapexPoint>) -> CapexCurve {
    let (peak_month, peak_amount) = points
        .iter()
        .fold((0, Decimal::ZERO), |(m, a), p| {
            if p.amount > a {
                (p.month, p.amount)
            } else {
                (m, a)
            }
        });
    CapexCurve {
        shape,
        total_budget,
        duration_months: points.len() as Months,
        peak_month,
        peak_amount,
        points,
    }
}

fn attach_dates(points: &mut [CapexPoint], start_date: NaiveDate) -> DealEngineResult<()> {
    for p in points.iter_mut() {
        p.date = Some(add_months(start_date, p.month - 1)?);
    }
    Ok(())
}

/// Increments of the logistic 1/(1+e^-x) between n+1 evenly spaced samples.
fn logistic_increments(months: Months) -> DealEngineResult<Vec<Decimal>> {
    let n = Decimal::from(months);
    let span = SCURVE_HALF_WIDTH * dec!(2);

    let mut samples = Vec::with_capacity(months as usize + 1);
    for k in 0..=months {
        let x = -SCURVE_HALF_WIDTH + span * Decimal::from(k) / n;
        let e = (-x)
            .checked_exp()
            .ok_or_else(|| DealEngineError::invalid("shape", "S-curve sample overflowed"))?;
        samples.push(Decimal::ONE / (Decimal::ONE + e));
    }

    Ok(samples.windows(2).map(|w| w[1] - w[0]).collect())
}

/// Month m (0-based) falls in band floor(3m / n); each band's share is split
/// evenly across its months. Bands with no months drop out and the rest are
/// rescaled when weights are normalised.
fn banded(months: Months, shares: &[Rate; 3]) -> Vec<Decimal> {
    let band_of = |m: Months| ((3 * m) / months) as usize;

    let mut counts = [0u32; 3];
    for m in 0..months {
        counts[band_of(m)] += 1;
    }

    (0..months)
        .map(|m| {
            let band = band_of(m);
            shares[band] / Decimal::from(counts[band])
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
