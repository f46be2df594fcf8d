use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::attendance::summary::TimedShift;
use crate::error::AppError;
use crate::utils::time_of_day::TimeOfDay;

/// One worker's attendance on one scheduled date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = 501)]
    pub id: u64,
    #[schema(example = 12)]
    pub worker_id: u64,
    #[schema(example = 4)]
    pub sub_warehouse_id: u64,
    #[schema(example = "08:00:00", value_type = Option<String>)]
    pub entry_time: Option<NaiveTime>,
    #[schema(example = "17:00:00", value_type = Option<String>)]
    pub exit_time: Option<NaiveTime>,
    #[schema(example = "No incidents", nullable = true)]
    pub note: Option<String>,
    #[schema(example = 3)]
    pub recorded_by: u64,
    #[schema(example = 31)]
    pub scheduled_date_id: u64,
    /// Date of the owning scheduled date, resolved by join.
    #[schema(example = "2025-03-01", format = "date", value_type = Option<String>)]
    pub scheduled_date: Option<NaiveDate>,
}

/// A validated attendance row ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct NewAttendance {
    pub worker_id: u64,
    pub sub_warehouse_id: u64,
    #[schema(value_type = Option<String>, example = "00:00:00")]
    #[serde(serialize_with = "serialize_time")]
    pub entry_time: Option<TimeOfDay>,
    #[schema(value_type = Option<String>, example = "00:00:00")]
    #[serde(serialize_with = "serialize_time")]
    pub exit_time: Option<TimeOfDay>,
    pub note: Option<String>,
    pub recorded_by: u64,
    pub scheduled_date_id: u64,
}

fn serialize_time<S: serde::Serializer>(t: &Option<TimeOfDay>, s: S) -> Result<S::Ok, S::Error> {
    match t {
        Some(t) => s.collect_str(t),
        None => s.serialize_none(),
    }
}

/// Raw create payload; every id is optional until validated.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AttendanceDraft {
    #[schema(example = 12)]
    pub worker_id: Option<u64>,
    #[schema(example = 4)]
    pub sub_warehouse_id: Option<u64>,
    #[schema(example = "08:00")]
    pub entry_time: Option<String>,
    #[schema(example = "17:00")]
    pub exit_time: Option<String>,
    #[schema(example = "No incidents")]
    pub note: Option<String>,
    #[schema(example = 3)]
    pub recorded_by: Option<u64>,
    #[schema(example = 31)]
    pub scheduled_date_id: Option<u64>,
}

impl AttendanceDraft {
    pub fn validate(self) -> Result<NewAttendance, AppError> {
        fn required(value: Option<u64>, field: &str) -> Result<u64, AppError> {
            match value {
                Some(v) if v > 0 => Ok(v),
                _ => Err(AppError::Validation(format!("Field {} is required", field))),
            }
        }

        Ok(NewAttendance {
            worker_id: required(self.worker_id, "worker_id")?,
            sub_warehouse_id: required(self.sub_warehouse_id, "sub_warehouse_id")?,
            recorded_by: required(self.recorded_by, "recorded_by")?,
            scheduled_date_id: required(self.scheduled_date_id, "scheduled_date_id")?,
            entry_time: parse_optional_time(self.entry_time.as_deref())?,
            exit_time: parse_optional_time(self.exit_time.as_deref())?,
            note: self.note,
        })
    }
}

/// Blank strings count as "not recorded".
pub fn parse_optional_time(input: Option<&str>) -> Result<Option<TimeOfDay>, AppError> {
    match input.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => Ok(Some(TimeOfDay::parse(s)?)),
    }
}

/// Fields editable after creation. Outer `None` leaves a column untouched,
/// `Some(None)` clears it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AttendancePatch {
    pub entry_time: Option<Option<TimeOfDay>>,
    pub exit_time: Option<Option<TimeOfDay>>,
    pub note: Option<Option<String>>,
}

impl AttendancePatch {
    pub fn is_empty(&self) -> bool {
        self.entry_time.is_none() && self.exit_time.is_none() && self.note.is_none()
    }
}

/// One row of a worker's attendance history, as used for summaries and exports.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct WorkerAttendanceRow {
    pub id: u64,
    pub national_id: String,
    pub worker_name: String,
    pub sub_warehouse_name: String,
    pub warehouse_name: String,
    #[schema(example = "2025-03-01", format = "date", value_type = String)]
    pub calendar_date: NaiveDate,
    pub target_hours: i32,
    #[schema(value_type = Option<String>)]
    pub entry_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>)]
    pub exit_time: Option<NaiveTime>,
    pub note: Option<String>,
}

impl TimedShift for WorkerAttendanceRow {
    fn entry(&self) -> Option<TimeOfDay> {
        self.entry_time.map(TimeOfDay::from)
    }

    fn exit(&self) -> Option<TimeOfDay> {
        self.exit_time.map(TimeOfDay::from)
    }

    fn target_hours(&self) -> f64 {
        f64::from(self.target_hours)
    }
}

/// Attendance joined with worker, recorder and location names for listings.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceListRow {
    pub id: u64,
    pub worker_id: u64,
    pub sub_warehouse_id: u64,
    #[schema(value_type = Option<String>)]
    pub entry_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>)]
    pub exit_time: Option<NaiveTime>,
    pub note: Option<String>,
    pub recorded_by: u64,
    pub scheduled_date_id: u64,
    pub worker_name: String,
    pub worker_national_id: String,
    pub recorded_by_name: String,
    pub sub_warehouse_name: String,
    pub warehouse_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> AttendanceDraft {
        AttendanceDraft {
            worker_id: Some(12),
            sub_warehouse_id: Some(4),
            recorded_by: Some(3),
            scheduled_date_id: Some(31),
            ..Default::default()
        }
    }

    #[test]
    fn validation_names_the_missing_field() {
        let err = AttendanceDraft {
            scheduled_date_id: None,
            ..draft()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.to_string(), "Field scheduled_date_id is required");

        let err = AttendanceDraft {
            worker_id: Some(0),
            ..draft()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.to_string(), "Field worker_id is required");
    }

    #[test]
    fn times_are_optional_but_must_parse() {
        let ok = draft().validate().unwrap();
        assert_eq!(ok.entry_time, None);

        let ok = AttendanceDraft {
            entry_time: Some("08:15".into()),
            exit_time: Some("".into()),
            ..draft()
        }
        .validate()
        .unwrap();
        assert_eq!(ok.entry_time.unwrap().to_string(), "08:15:00");
        assert_eq!(ok.exit_time, None);

        let bad = AttendanceDraft {
            exit_time: Some("25:00".into()),
            ..draft()
        }
        .validate();
        assert!(matches!(bad, Err(AppError::Validation(_))));
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(AttendancePatch::default().is_empty());
        assert!(
            !AttendancePatch {
                note: Some(None),
                ..Default::default()
            }
            .is_empty()
        );
    }
}
