use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use super::summary::{HoursSummary, compute_summary};
use crate::auth::access::{Scope, ensure_in_scope};
use crate::error::{AppError, AppResult};
use crate::model::attendance::{
    AttendancePatch, AttendanceRecord, NewAttendance, WorkerAttendanceRow,
};
use crate::store::{AttendanceStore, InsertOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct CreateOutcome {
    #[schema(example = 501)]
    pub id: u64,
    /// True when a row for the same worker and scheduled date was already stored.
    pub already_existed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RowError {
    pub worker_id: u64,
    pub scheduled_date_id: u64,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct BulkCreateResult {
    pub created: u64,
    pub skipped: Vec<NewAttendance>,
    pub errors: Vec<RowError>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WorkerSummary {
    pub records: Vec<WorkerAttendanceRow>,
    pub summary: HoursSummary,
}

/// Record-level operations over an injected attendance store.
#[derive(Clone)]
pub struct AttendanceService {
    store: Arc<dyn AttendanceStore>,
}

impl AttendanceService {
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self { store }
    }

    /// Creates the row, or reports the id already stored for the same worker
    /// and scheduled date.
    #[instrument(skip(self, record), fields(worker_id = record.worker_id, scheduled_date_id = record.scheduled_date_id))]
    pub async fn create(&self, record: NewAttendance) -> AppResult<CreateOutcome> {
        if let Some(id) = self
            .store
            .find_existing(record.worker_id, record.scheduled_date_id)
            .await?
        {
            return Ok(CreateOutcome {
                id,
                already_existed: true,
            });
        }

        match self.store.insert_attendance(&record).await? {
            InsertOutcome::Inserted(id) => {
                info!(id, "Attendance recorded");
                Ok(CreateOutcome {
                    id,
                    already_existed: false,
                })
            }
            InsertOutcome::Duplicate => {
                // a concurrent request won the unique index
                let id = self
                    .store
                    .find_existing(record.worker_id, record.scheduled_date_id)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                Ok(CreateOutcome {
                    id,
                    already_existed: true,
                })
            }
        }
    }

    /// Splits the input into new and already stored rows, then writes the new
    /// ones with a single insert. Rows whose existence check failed are
    /// reported in `errors` and not written.
    #[instrument(skip_all, fields(rows = records.len()))]
    pub async fn bulk_create(&self, records: Vec<NewAttendance>) -> AppResult<BulkCreateResult> {
        let checks = join_all(
            records
                .iter()
                .map(|r| self.store.find_existing(r.worker_id, r.scheduled_date_id)),
        )
        .await;

        let mut result = BulkCreateResult::default();
        let mut fresh = Vec::new();
        let mut seen = HashSet::new();

        for (record, check) in records.into_iter().zip(checks) {
            match check {
                Ok(Some(_)) => result.skipped.push(record),
                Ok(None) if !seen.insert((record.worker_id, record.scheduled_date_id)) => {
                    result.skipped.push(record)
                }
                Ok(None) => fresh.push(record),
                Err(e) => {
                    warn!(worker_id = record.worker_id, error = %e, "Existence check failed");
                    result.errors.push(RowError {
                        worker_id: record.worker_id,
                        scheduled_date_id: record.scheduled_date_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !fresh.is_empty() {
            result.created = self.store.insert_attendance_batch(&fresh).await?;
        }

        info!(
            created = result.created,
            skipped = result.skipped.len(),
            errors = result.errors.len(),
            "Bulk attendance create finished"
        );
        Ok(result)
    }

    /// The record, provided its sub-warehouse lies in the caller's scope.
    pub async fn find_in_scope(&self, id: u64, scope: &Scope) -> AppResult<AttendanceRecord> {
        let record = self
            .store
            .find_attendance(id)
            .await?
            .ok_or(AppError::NotFound("Attendance"))?;
        ensure_in_scope(scope, record.sub_warehouse_id)?;
        Ok(record)
    }

    /// Returns the affected row count; an empty patch touches nothing.
    pub async fn update(&self, id: u64, patch: &AttendancePatch) -> AppResult<u64> {
        if patch.is_empty() {
            return Ok(0);
        }
        Ok(self.store.update_attendance(id, patch).await?)
    }

    /// Deletes the record and its rotation row. Returns 0 for an unknown id.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: u64) -> AppResult<u64> {
        let Some(record) = self.store.find_attendance(id).await? else {
            return Ok(0);
        };
        Ok(self.store.remove_attendance(&record).await?)
    }

    pub async fn worker_summary(&self, worker_id: u64) -> AppResult<WorkerSummary> {
        let records = self.store.worker_attendance(worker_id).await?;
        let summary = compute_summary(&records);
        Ok(WorkerSummary { records, summary })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::store::ScheduleStore;
    use crate::store::memory::MemoryStore;
    use crate::utils::time_of_day::TimeOfDay;

    fn record(worker_id: u64, scheduled_date_id: u64) -> NewAttendance {
        NewAttendance {
            worker_id,
            sub_warehouse_id: 4,
            entry_time: Some(TimeOfDay::SENTINEL),
            exit_time: Some(TimeOfDay::SENTINEL),
            note: Some("No incidents".into()),
            recorded_by: 1,
            scheduled_date_id,
        }
    }

    fn setup() -> (Arc<MemoryStore>, AttendanceService) {
        let store = Arc::new(MemoryStore::default());
        let service = AttendanceService::new(store.clone());
        (store, service)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[actix_web::test]
    async fn create_twice_returns_the_same_id() {
        let (store, service) = setup();

        let first = service.create(record(7, 31)).await.unwrap();
        let second = service.create(record(7, 31)).await.unwrap();

        assert!(!first.already_existed);
        assert!(second.already_existed);
        assert_eq!(first.id, second.id);
        assert_eq!(store.attendance_count().await, 1);
    }

    #[actix_web::test]
    async fn create_losing_the_unique_index_race_returns_the_stored_id() {
        let (store, service) = setup();
        let stored = service.create(record(7, 31)).await.unwrap();
        store.stale_existence_checks.lock().await.insert((7, 31));

        let raced = service.create(record(7, 31)).await.unwrap();

        assert!(raced.already_existed);
        assert_eq!(raced.id, stored.id);
        assert_eq!(store.attendance_count().await, 1);
    }

    #[actix_web::test]
    async fn bulk_create_does_not_count_rows_stored_concurrently() {
        let (store, service) = setup();
        service.create(record(2, 31)).await.unwrap();
        store.stale_existence_checks.lock().await.insert((2, 31));

        let result = service
            .bulk_create((1..=3).map(|w| record(w, 31)).collect())
            .await
            .unwrap();

        assert_eq!(result.created, 2);
        assert!(result.errors.is_empty());
        assert_eq!(store.attendance_count().await, 3);
    }

    #[actix_web::test]
    async fn records_outside_the_scope_are_forbidden() {
        let (_store, service) = setup();
        let created = service.create(record(3, 31)).await.unwrap();

        let found = service
            .find_in_scope(created.id, &Scope::Only(vec![4]))
            .await
            .unwrap();
        assert_eq!(found.worker_id, 3);

        assert!(matches!(
            service.find_in_scope(created.id, &Scope::Only(vec![5])).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.find_in_scope(created.id + 100, &Scope::All).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[actix_web::test]
    async fn bulk_create_skips_existing_rows() {
        let (store, service) = setup();
        service.create(record(1, 31)).await.unwrap();
        service.create(record(2, 31)).await.unwrap();

        let result = service
            .bulk_create((1..=5).map(|w| record(w, 31)).collect())
            .await
            .unwrap();

        assert_eq!(result.created, 3);
        assert_eq!(result.skipped.len(), 2);
        assert!(result.errors.is_empty());
        assert_eq!(store.attendance_count().await, 5);
    }

    #[actix_web::test]
    async fn bulk_create_reports_failed_checks_without_inserting_them() {
        let (store, service) = setup();
        store.failing_existence_checks.lock().await.insert(2);

        let result = service
            .bulk_create(vec![record(1, 31), record(2, 31), record(1, 31)])
            .await
            .unwrap();

        assert_eq!(result.created, 1);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].worker_id, 2);
        assert_eq!(store.attendance_count().await, 1);
    }

    #[actix_web::test]
    async fn update_with_empty_patch_is_a_noop() {
        let (store, service) = setup();
        let created = service.create(record(1, 31)).await.unwrap();

        let affected = service
            .update(created.id, &AttendancePatch::default())
            .await
            .unwrap();
        assert_eq!(affected, 0);
        assert_eq!(store.state.lock().await.updates, 0);

        let patch = AttendancePatch {
            entry_time: Some(Some(TimeOfDay::parse("08:00").unwrap())),
            ..Default::default()
        };
        assert_eq!(service.update(created.id, &patch).await.unwrap(), 1);
        assert_eq!(service.update(9999, &patch).await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn delete_removes_the_matching_rotation() {
        let (store, service) = setup();
        let worker = store.add_worker(9, true).await;
        let date_id = store.insert_scheduled_date(day(1), 4).await.unwrap().id;
        store.add_rotation(worker, 4, day(1)).await;
        store.add_rotation(worker, 4, day(2)).await;

        let created = service.create(record(worker, date_id)).await.unwrap();
        assert_eq!(service.delete(created.id).await.unwrap(), 1);

        let state = store.state.lock().await;
        assert!(state.attendance.is_empty());
        assert_eq!(state.rotations.len(), 1);
        assert!(state.rotations.iter().all(|r| r.date == day(2)));
    }

    #[actix_web::test]
    async fn deleting_an_unknown_id_returns_zero() {
        let (_, service) = setup();
        assert_eq!(service.delete(42).await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn summary_reads_the_worker_history() {
        let (store, service) = setup();
        let worker = store.add_worker(4, true).await;
        let date_id = store.add_scheduled_date(day(3), 4).await;
        let mut r = record(worker, date_id);
        r.entry_time = Some(TimeOfDay::parse("08:00").unwrap());
        r.exit_time = Some(TimeOfDay::parse("17:00").unwrap());
        service.create(r).await.unwrap();

        let summary = service.worker_summary(worker).await.unwrap().summary;
        assert_eq!(summary.hours_worked, 9.0);
        assert_eq!(summary.hours_overtime, 1.0);
    }

    #[actix_web::test]
    async fn store_failures_propagate() {
        let (store, service) = setup();
        store.failing_existence_checks.lock().await.insert(3);
        let err = service.create(record(3, 31)).await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }
}
