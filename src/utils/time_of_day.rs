//! Wall-clock time of day as seconds since midnight.
//!
//! Attendance times carry no date and no zone. Strings are parsed once at the
//! boundary (`HH:MM` or `HH:MM:SS`) and everything after that is integer math.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid time of day {0:?}, expected HH:MM or HH:MM:SS")]
pub struct TimeParseError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeOfDay(u32);

impl TimeOfDay {
    /// Placeholder written into freshly scheduled attendance rows.
    /// Shares its value with a real midnight clock time.
    pub const SENTINEL: TimeOfDay = TimeOfDay(0);

    pub fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Option<Self> {
        if hours > 23 || minutes > 59 || seconds > 59 {
            return None;
        }
        Some(TimeOfDay(hours * 3600 + minutes * 60 + seconds))
    }

    pub fn parse(input: &str) -> Result<Self, TimeParseError> {
        let err = || TimeParseError(input.to_string());

        let mut parts = input.trim().split(':');
        let mut field = |required: bool| -> Result<Option<u32>, TimeParseError> {
            match parts.next() {
                Some(p) if !p.is_empty() && p.len() <= 2 && p.bytes().all(|b| b.is_ascii_digit()) => {
                    p.parse().map(Some).map_err(|_| err())
                }
                None if !required => Ok(None),
                _ => Err(err()),
            }
        };

        let hours = field(true)?.unwrap_or_default();
        let minutes = field(true)?.unwrap_or_default();
        let seconds = field(false)?.unwrap_or_default();

        if parts.next().is_some() {
            return Err(err());
        }

        TimeOfDay::from_hms(hours, minutes, seconds).ok_or_else(err)
    }

    pub fn seconds(self) -> u32 {
        self.0
    }

    pub fn minutes(self) -> u32 {
        self.0 / 60
    }

    pub fn is_sentinel(self) -> bool {
        self == Self::SENTINEL
    }

    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_num_seconds_from_midnight_opt(self.0, 0).unwrap_or_default()
    }
}

impl From<NaiveTime> for TimeOfDay {
    fn from(t: NaiveTime) -> Self {
        TimeOfDay(t.num_seconds_from_midnight())
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeOfDay::parse(s)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;
        write!(f, "{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
    }
}

/// Whole minutes since midnight, or `None` when the value is absent or
/// malformed. Seconds are dropped.
pub fn time_to_minutes(input: &str) -> Option<i64> {
    if input.trim().is_empty() {
        return None;
    }
    TimeOfDay::parse(input).ok().map(|t| i64::from(t.minutes()))
}

/// Formats a signed minute count as `HH:MM:SS`; shortfalls carry a leading `-`.
pub fn minutes_to_time(minutes: i64) -> String {
    let sign = if minutes < 0 { "-" } else { "" };
    let m = minutes.unsigned_abs();
    format!("{}{:02}:{:02}:00", sign, m / 60, m % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_forms() {
        assert_eq!(TimeOfDay::parse("08:30").unwrap().seconds(), 8 * 3600 + 30 * 60);
        assert_eq!(TimeOfDay::parse("17:05:09").unwrap().seconds(), 17 * 3600 + 5 * 60 + 9);
        assert_eq!(TimeOfDay::parse("7:5").unwrap().to_string(), "07:05:00");
    }

    #[test]
    fn rejects_out_of_range_and_garbage() {
        for bad in ["24:00", "12:60", "12:00:60", "", "ab:cd", "12", "1:2:3:4", "-1:00", "123:00"] {
            assert!(TimeOfDay::parse(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn whole_minute_times_round_trip() {
        for t in ["00:00:00", "08:00:00", "12:34:00", "23:59:00"] {
            let minutes = time_to_minutes(t).unwrap();
            assert_eq!(minutes_to_time(minutes), t);
        }
    }

    #[test]
    fn seconds_are_truncated_to_the_minute() {
        assert_eq!(time_to_minutes("12:34:56"), Some(12 * 60 + 34));
        assert_eq!(minutes_to_time(time_to_minutes("12:34:56").unwrap()), "12:34:00");
    }

    #[test]
    fn negative_minutes_keep_sign() {
        assert_eq!(minutes_to_time(-90), "-01:30:00");
        assert_eq!(minutes_to_time(-5), "-00:05:00");
        assert_eq!(minutes_to_time(0), "00:00:00");
    }

    #[test]
    fn long_durations_do_not_roll_over() {
        assert_eq!(minutes_to_time(26 * 60 + 15), "26:15:00");
    }

    #[test]
    fn absent_input_is_none() {
        assert_eq!(time_to_minutes(""), None);
        assert_eq!(time_to_minutes("   "), None);
        assert_eq!(time_to_minutes("not a time"), None);
    }

    #[test]
    fn naive_time_conversion_is_lossless() {
        let t = TimeOfDay::parse("13:14:15").unwrap();
        assert_eq!(TimeOfDay::from(t.to_naive_time()), t);
    }

    #[test]
    fn sentinel_is_midnight() {
        assert!(TimeOfDay::parse("00:00").unwrap().is_sentinel());
        assert!(!TimeOfDay::parse("00:00:01").unwrap().is_sentinel());
    }
}
