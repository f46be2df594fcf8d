use serde::Serialize;
use utoipa::ToSchema;

use crate::utils::time_of_day::TimeOfDay;

/// Anything carrying an entry/exit pair and the hours it was expected to cover.
pub trait TimedShift {
    fn entry(&self) -> Option<TimeOfDay>;
    fn exit(&self) -> Option<TimeOfDay>;
    fn target_hours(&self) -> f64;

    /// Hours between entry and exit, or `None` when the shift counts as absent:
    /// a missing or sentinel time, or an exit before the entry.
    fn worked_hours(&self) -> Option<f64> {
        let (entry, exit) = (self.entry()?, self.exit()?);
        if entry.is_sentinel() || exit.is_sentinel() || exit < entry {
            return None;
        }
        Some(f64::from(exit.seconds() - entry.seconds()) / 3600.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
pub struct HoursSummary {
    #[schema(example = 8.0)]
    pub hours_target: f64,
    #[schema(example = 41.5)]
    pub hours_worked: f64,
    #[schema(example = 2.0)]
    pub hours_overtime: f64,
    #[schema(example = 0.5)]
    pub hours_shortfall: f64,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Sums worked, overtime and shortfall hours over one worker's rows.
///
/// The target is per row and taken from the first row; it is constant for a
/// worker. Each total is rounded to two decimals independently.
pub fn compute_summary<T: TimedShift>(rows: &[T]) -> HoursSummary {
    let Some(first) = rows.first() else {
        return HoursSummary::default();
    };
    let target = first.target_hours();
    let target = if target.is_finite() { target } else { 0.0 };

    let mut worked_total = 0.0;
    let mut overtime = 0.0;
    let mut shortfall = 0.0;

    for row in rows {
        match row.worked_hours() {
            None => shortfall += target,
            Some(worked) => {
                worked_total += worked;
                if worked > target {
                    overtime += worked - target;
                } else {
                    shortfall += target - worked;
                }
            }
        }
    }

    HoursSummary {
        hours_target: round2(target),
        hours_worked: round2(worked_total),
        hours_overtime: round2(overtime),
        hours_shortfall: round2(shortfall),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ShiftRow {
        entry: Option<TimeOfDay>,
        exit: Option<TimeOfDay>,
        target_hours: f64,
    }

    impl TimedShift for ShiftRow {
        fn entry(&self) -> Option<TimeOfDay> {
            self.entry
        }

        fn exit(&self) -> Option<TimeOfDay> {
            self.exit
        }

        fn target_hours(&self) -> f64 {
            self.target_hours
        }
    }

    fn row(entry: Option<&str>, exit: Option<&str>, target: f64) -> ShiftRow {
        ShiftRow {
            entry: entry.map(|t| TimeOfDay::parse(t).unwrap()),
            exit: exit.map(|t| TimeOfDay::parse(t).unwrap()),
            target_hours: target,
        }
    }

    #[test]
    fn empty_input_is_all_zero() {
        let rows: [ShiftRow; 0] = [];
        assert_eq!(compute_summary(&rows), HoursSummary::default());
    }

    #[test]
    fn nine_hours_against_eight_is_one_overtime() {
        let s = compute_summary(&[row(Some("08:00:00"), Some("17:00:00"), 8.0)]);
        assert_eq!(s.hours_target, 8.0);
        assert_eq!(s.hours_worked, 9.0);
        assert_eq!(s.hours_overtime, 1.0);
        assert_eq!(s.hours_shortfall, 0.0);
    }

    #[test]
    fn missing_or_sentinel_times_are_absences() {
        let s = compute_summary(&[
            row(None, Some("17:00:00"), 8.0),
            row(Some("00:00:00"), Some("00:00:00"), 8.0),
            row(Some("08:00:00"), Some("00:00"), 8.0),
        ]);
        assert_eq!(s.hours_worked, 0.0);
        assert_eq!(s.hours_shortfall, 24.0);
        assert_eq!(s.hours_overtime, 0.0);
    }

    #[test]
    fn exit_before_entry_never_goes_negative() {
        let s = compute_summary(&[row(Some("17:00:00"), Some("08:00:00"), 8.0)]);
        assert_eq!(s.hours_worked, 0.0);
        assert_eq!(s.hours_shortfall, 8.0);
    }

    #[test]
    fn short_day_adds_the_gap_to_shortfall() {
        let s = compute_summary(&[
            row(Some("08:00:00"), Some("14:30:00"), 8.0),
            row(Some("08:00:00"), Some("18:00:00"), 8.0),
        ]);
        assert_eq!(s.hours_worked, 16.5);
        assert_eq!(s.hours_overtime, 2.0);
        assert_eq!(s.hours_shortfall, 1.5);
    }

    #[test]
    fn totals_are_rounded_to_two_decimals() {
        // 08:00 -> 08:20 is 0.3333.. hours
        let s = compute_summary(&[row(Some("08:00"), Some("08:20"), 0.0)]);
        assert_eq!(s.hours_worked, 0.33);
        assert_eq!(s.hours_overtime, 0.33);
    }

    #[test]
    fn target_comes_from_the_first_row() {
        let s = compute_summary(&[row(None, None, 6.0), row(None, None, 10.0)]);
        assert_eq!(s.hours_target, 6.0);
        assert_eq!(s.hours_shortfall, 12.0);
    }
}
