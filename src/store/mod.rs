//! Persistence seams for the attendance core.
//!
//! The services depend on these traits only; `MySqlStore` backs them in
//! production and `MemoryStore` in tests.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::attendance::{
    AttendancePatch, AttendanceRecord, NewAttendance, WorkerAttendanceRow,
};
use crate::model::scheduled_date::ScheduledDate;
use crate::model::worker::WorkerRef;

#[cfg(test)]
pub mod memory;
pub mod mysql;

pub use mysql::MySqlStore;

/// Store failures are propagated to callers unchanged.
pub type StoreResult<T> = Result<T, sqlx::Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(u64),
    /// The unique (worker, scheduled date) index rejected the row.
    Duplicate,
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn find_existing(&self, worker_id: u64, scheduled_date_id: u64) -> StoreResult<Option<u64>>;

    async fn insert_attendance(&self, record: &NewAttendance) -> StoreResult<InsertOutcome>;

    /// Single multi-row insert. Rows colliding with the unique index are left
    /// as they are and not counted; returns how many new rows were stored.
    /// Other store errors (foreign keys included) propagate.
    async fn insert_attendance_batch(&self, records: &[NewAttendance]) -> StoreResult<u64>;

    /// Applies a non-empty patch and touches `updated_at`.
    async fn update_attendance(&self, id: u64, patch: &AttendancePatch) -> StoreResult<u64>;

    async fn find_attendance(&self, id: u64) -> StoreResult<Option<AttendanceRecord>>;

    /// Deletes the record and, when its date is known, the rotation row for the
    /// same worker, sub-warehouse and date, atomically.
    async fn remove_attendance(&self, record: &AttendanceRecord) -> StoreResult<u64>;

    async fn worker_attendance(&self, worker_id: u64) -> StoreResult<Vec<WorkerAttendanceRow>>;
}

#[async_trait]
pub trait WorkerDirectory: Send + Sync {
    async fn active_workers_in(&self, sub_warehouse_id: u64) -> StoreResult<Vec<WorkerRef>>;

    async fn rotated_workers_on(
        &self,
        sub_warehouse_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Vec<WorkerRef>>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn insert_scheduled_date(
        &self,
        date: NaiveDate,
        sub_warehouse_id: u64,
    ) -> StoreResult<ScheduledDate>;

    async fn find_scheduled_date(&self, id: u64) -> StoreResult<Option<ScheduledDate>>;

    /// Removes the date together with the attendance and rotation rows of the
    /// same sub-warehouse and day, atomically.
    async fn delete_scheduled_date(&self, id: u64) -> StoreResult<u64>;
}
