use chrono::{Months as CalendarMonths, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::error::DealEngineError;
use crate::types::*;
use crate::DealEngineResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// One phase of the project as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// Phase label, e.g. "construction"
    pub name: String,
    /// Phase length in months
    pub duration_months: Months,
}

/// Where an overlapping phase starts inside its predecessor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OverlapRule {
    /// Halfway through the predecessor (rounded down to whole months)
    #[default]
    Midpoint,
    /// A fraction (0..=1) of the way through the predecessor
    FractionOfPredecessor { fraction: Rate },
    /// A fixed number of months after the predecessor starts
    MonthsIntoPredecessor { months: Months },
}

impl OverlapRule {
    /// Months after the predecessor's start at which the next phase begins.
    /// Always within `0..=predecessor_duration`.
    pub fn offset_months(&self, predecessor_duration: Months) -> DealEngineResult<Months> {
        match self {
            OverlapRule::Midpoint => Ok(predecessor_duration / 2),
            OverlapRule::FractionOfPredecessor { fraction } => {
                if *fraction < Decimal::ZERO || *fraction > Decimal::ONE {
                    return Err(DealEngineError::invalid(
                        "fraction",
                        "Overlap fraction must be between 0 and 1",
                    ));
                }
                (Decimal::from(predecessor_duration) * fraction)
                    .floor()
                    .to_u32()
                    .ok_or_else(|| DealEngineError::invalid("fraction", "Offset out of range"))
            }
            OverlapRule::MonthsIntoPredecessor { months } => {
                if *months > predecessor_duration {
                    return Err(DealEngineError::invalid(
                        "months",
                        format!(
                            "Offset of {months} months exceeds the predecessor's {predecessor_duration} months"
                        ),
                    ));
                }
                Ok(*months)
            }
        }
    }
}

/// How consecutive phases are laid out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PhasingMode {
    /// Each phase starts when the previous one ends
    #[default]
    Sequential,
    /// The phase at `phase_index` starts inside its predecessor per `rule`;
    /// every other phase chains after all earlier phases have finished
    Overlapping {
        phase_index: usize,
        #[serde(default)]
        rule: OverlapRule,
    },
}

/// Input for a project timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineInput {
    /// Project start date (first day of the first phase)
    pub start_date: NaiveDate,
    /// Phases in order
    pub phases: Vec<PhaseSpec>,
    #[serde(default)]
    pub mode: PhasingMode,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// A dated phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    pub start_date: NaiveDate,
    /// Exclusive end: the date the phase's last month closes
    pub end_date: NaiveDate,
    pub duration_months: Months,
    /// Months from project start to phase start
    pub start_month: Months,
    /// Months from project start to phase end
    pub end_month: Months,
    /// Months shared with the predecessor
    pub overlap_months: Months,
}

/// Ordered phases with project-level bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectTimeline {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_duration_months: Months,
    pub phases: Vec<Phase>,
}

impl ProjectTimeline {
    /// Look a phase up by name (case-insensitive).
    pub fn phase(&self, name: &str) -> Option<&Phase> {
        self.phases
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Lay phases out from `start_date` according to `mode`.
pub fn generate_phases(
    start_date: NaiveDate,
    specs: &[PhaseSpec],
    mode: &PhasingMode,
) -> DealEngineResult<ProjectTimeline> {
    if specs.is_empty() {
        return Err(DealEngineError::invalid(
            "phases",
            "At least one phase is required",
        ));
    }
    if let Some(spec) = specs.iter().find(|s| s.duration_months == 0) {
        return Err(DealEngineError::invalid(
            "duration_months",
            format!("Phase '{}' must last at least 1 month", spec.name),
        ));
    }
    if let PhasingMode::Overlapping { phase_index, .. } = mode {
        if *phase_index == 0 || *phase_index >= specs.len() {
            return Err(DealEngineError::invalid(
                "phase_index",
                format!(
                    "Overlapping phase index must be between 1 and {}",
                    specs.len() - 1
                ),
            ));
        }
    }

    let mut phases: Vec<Phase> = Vec::with_capacity(specs.len());
    let mut latest_end: Months = 0;

    for (i, spec) in specs.iter().enumerate() {
        let start_month = match mode {
            PhasingMode::Overlapping { phase_index, rule } if *phase_index == i => {
                let predecessor = &phases[i - 1];
                predecessor.start_month + rule.offset_months(predecessor.duration_months)?
            }
            _ => latest_end,
        };
        let end_month = start_month
            .checked_add(spec.duration_months)
            .ok_or_else(|| DealEngineError::DateError("phase end overflows".into()))?;

        let overlap_months = phases
            .last()
            .map(|prev| prev.end_month.saturating_sub(start_month))
            .unwrap_or(0);

        phases.push(Phase {
            name: spec.name.clone(),
            start_date: add_months(start_date, start_month)?,
            end_date: add_months(start_date, end_month)?,
            duration_months: spec.duration_months,
            start_month,
            end_month,
            overlap_months,
        });
        latest_end = latest_end.max(end_month);
    }

    debug!(
        phases = phases.len(),
        total_months = latest_end,
        "timeline generated"
    );

    Ok(ProjectTimeline {
        start_date,
        end_date: add_months(start_date, latest_end)?,
        total_duration_months: latest_end,
        phases,
    })
}

/// Build a project timeline and wrap it with metadata.
pub fn build_timeline(
    input: &TimelineInput,
) -> DealEngineResult<ComputationOutput<ProjectTimeline>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let timeline = generate_phases(input.start_date, &input.phases, &input.mode)?;

    if let PhasingMode::Overlapping { phase_index, .. } = &input.mode {
        let phase = &timeline.phases[*phase_index];
        if phase.overlap_months == 0 {
            warnings.push(format!(
                "Phase '{}' was declared overlapping but starts after its predecessor ends",
                phase.name
            ));
        }
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Project phase timeline",
        &serde_json::json!({
            "start_date": input.start_date.to_string(),
            "num_phases": input.phases.len(),
            "mode": input.mode,
        }),
        warnings,
        elapsed,
        timeline,
    ))
}

/// Calendar-month arithmetic on a date.
pub fn add_months(date: NaiveDate, months: Months) -> DealEngineResult<NaiveDate> {
    date.checked_add_months(CalendarMonths::new(months))
        .ok_or_else(|| DealEngineError::DateError(format!("{date} + {months} months is out of range")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn development_phases() -> Vec<PhaseSpec> {
        vec![
            PhaseSpec {
                name: "acquisition".into(),
                duration_months: 3,
            },
            PhaseSpec {
                name: "construction".into(),
                duration_months: 18,
            },
            PhaseSpec {
                name: "commercialization".into(),
                duration_months: 12,
            },
        ]
    }

    #[test]
    fn test_sequential_chain() {
        let tl = generate_phases(
            date(2025, 1, 1),
            &development_phases(),
            &PhasingMode::Sequential,
        )
        .unwrap();

        assert_eq!(tl.phases[0].start_date, date(2025, 1, 1));
        assert_eq!(tl.phases[0].end_date, date(2025, 4, 1));
        assert_eq!(tl.phases[1].start_date, tl.phases[0].end_date);
        assert_eq!(tl.phases[2].start_date, tl.phases[1].end_date);
        assert_eq!(tl.phases[2].end_date, date(2027, 10, 1));
        assert_eq!(tl.total_duration_months, 33);
        assert_eq!(tl.end_date, date(2027, 10, 1));
        assert!(tl.phases.iter().all(|p| p.overlap_months == 0));
    }

    #[test]
    fn test_midpoint_overlap() {
        let mode = PhasingMode::Overlapping {
            phase_index: 2,
            rule: OverlapRule::Midpoint,
        };
        let tl = generate_phases(date(2025, 1, 1), &development_phases(), &mode).unwrap();

        let construction = tl.phase("construction").unwrap();
        let sales = tl.phase("commercialization").unwrap();
        // Construction runs months 3..21; sales start at month 3 + 9 = 12
        assert_eq!(sales.start_month, 12);
        assert_eq!(sales.start_date, date(2026, 1, 1));
        assert_eq!(sales.overlap_months, 9);
        assert!(sales.start_date < construction.end_date);
        assert_eq!(tl.total_duration_months, 24);
    }

    #[test]
    fn test_phase_after_overlap_waits_for_all_prior() {
        let mut specs = development_phases();
        specs[2].duration_months = 4;
        specs.push(PhaseSpec {
            name: "handover".into(),
            duration_months: 2,
        });
        let mode = PhasingMode::Overlapping {
            phase_index: 2,
            rule: OverlapRule::Midpoint,
        };
        let tl = generate_phases(date(2025, 1, 1), &specs, &mode).unwrap();
        // Sales end at 16, construction at 21: handover starts at 21
        assert_eq!(tl.phases[2].end_month, 16);
        assert_eq!(tl.phases[3].start_month, 21);
        assert_eq!(tl.phases[3].overlap_months, 0);
    }

    #[test]
    fn test_fraction_and_fixed_offsets() {
        assert_eq!(
            OverlapRule::FractionOfPredecessor { fraction: dec!(0.75) }
                .offset_months(18)
                .unwrap(),
            13
        );
        assert_eq!(
            OverlapRule::MonthsIntoPredecessor { months: 18 }
                .offset_months(18)
                .unwrap(),
            18
        );
        assert!(OverlapRule::MonthsIntoPredecessor { months: 19 }
            .offset_months(18)
            .is_err());
        assert!(OverlapRule::FractionOfPredecessor { fraction: dec!(1.5) }
            .offset_months(18)
            .is_err());
        assert_eq!(OverlapRule::Midpoint.offset_months(7).unwrap(), 3);
    }

    #[test]
    fn test_zero_duration_error() {
        let mut specs = development_phases();
        specs[1].duration_months = 0;
        let err = generate_phases(date(2025, 1, 1), &specs, &PhasingMode::Sequential).unwrap_err();
        match err {
            DealEngineError::InvalidInput { field, .. } => assert_eq!(field, "duration_months"),
            other => panic!("Expected InvalidInput, got: {other:?}"),
        }
    }

    #[test]
    fn test_empty_phases_error() {
        assert!(generate_phases(date(2025, 1, 1), &[], &PhasingMode::Sequential).is_err());
    }

    #[test]
    fn test_overlap_index_out_of_range() {
        for idx in [0usize, 3] {
            let mode = PhasingMode::Overlapping {
                phase_index: idx,
                rule: OverlapRule::Midpoint,
            };
            assert!(generate_phases(date(2025, 1, 1), &development_phases(), &mode).is_err());
        }
    }

    #[test]
    fn test_month_end_dates_clamp() {
        let specs = vec![PhaseSpec {
            name: "works".into(),
            duration_months: 1,
        }];
        let tl = generate_phases(date(2025, 1, 31), &specs, &PhasingMode::Sequential).unwrap();
        assert_eq!(tl.end_date, date(2025, 2, 28));
    }

    #[test]
    fn test_build_timeline_warns_on_degenerate_overlap() {
        let input = TimelineInput {
            start_date: date(2025, 1, 1),
            phases: development_phases(),
            mode: PhasingMode::Overlapping {
                phase_index: 2,
                rule: OverlapRule::FractionOfPredecessor { fraction: dec!(1) },
            },
        };
        let result = build_timeline(&input).unwrap();
        assert_eq!(result.result.phases[2].overlap_months, 0);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_mode_deserialises_from_json() {
        let json = r#"{"mode":"overlapping","phase_index":2,"rule":{"type":"midpoint"}}"#;
        let mode: PhasingMode = serde_json::from_str(json).unwrap();
        assert_eq!(
            mode,
            PhasingMode::Overlapping {
                phase_index: 2,
                rule: OverlapRule::Midpoint
            }
        );
    }
}
