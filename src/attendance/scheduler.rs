use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use super::service::{AttendanceService, BulkCreateResult};
use crate::auth::access::{Scope, ensure_in_scope};
use crate::error::{AppError, AppResult};
use crate::model::attendance::NewAttendance;
use crate::model::scheduled_date::ScheduledDate;
use crate::model::worker::WorkerRef;
use crate::store::{ScheduleStore, WorkerDirectory};
use crate::utils::db_utils::is_duplicate_key;
use crate::utils::time_of_day::TimeOfDay;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScheduledDateOutcome {
    pub scheduled_date: ScheduledDate,
    pub attendance: BulkCreateResult,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DateError {
    #[schema(example = "2025-03-01", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct BatchOutcome {
    pub created: Vec<ScheduledDateOutcome>,
    pub errors: Vec<DateError>,
}

/// Opens scheduled dates and fills them with one placeholder attendance row
/// per assigned worker.
#[derive(Clone)]
pub struct BulkScheduler {
    schedule: Arc<dyn ScheduleStore>,
    workers: Arc<dyn WorkerDirectory>,
    attendance: AttendanceService,
    default_note: String,
}

impl BulkScheduler {
    pub fn new(
        schedule: Arc<dyn ScheduleStore>,
        workers: Arc<dyn WorkerDirectory>,
        attendance: AttendanceService,
        default_note: impl Into<String>,
    ) -> Self {
        Self {
            schedule,
            workers,
            attendance,
            default_note: default_note.into(),
        }
    }

    /// Active workers assigned to the sub-warehouse plus those rotated in for
    /// the day. A worker present in both lists appears once.
    pub async fn resolve_workers(
        &self,
        sub_warehouse_id: u64,
        date: NaiveDate,
    ) -> AppResult<Vec<WorkerRef>> {
        let (fixed, rotated) = futures::try_join!(
            self.workers.active_workers_in(sub_warehouse_id),
            self.workers.rotated_workers_on(sub_warehouse_id, date),
        )?;

        let mut seen = HashSet::new();
        Ok(fixed
            .into_iter()
            .chain(rotated)
            .filter(|w| seen.insert(w.id))
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn on_scheduled_date_created(
        &self,
        date: NaiveDate,
        sub_warehouse_id: u64,
        user_id: u64,
    ) -> AppResult<ScheduledDateOutcome> {
        let scheduled_date = self
            .schedule
            .insert_scheduled_date(date, sub_warehouse_id)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    AppError::Conflict(format!("{} is already scheduled for this sub-warehouse", date))
                } else {
                    AppError::Store(e)
                }
            })?;

        let workers = self.resolve_workers(sub_warehouse_id, date).await?;
        let placeholders = workers
            .iter()
            .map(|w| NewAttendance {
                worker_id: w.id,
                sub_warehouse_id,
                entry_time: Some(TimeOfDay::SENTINEL),
                exit_time: Some(TimeOfDay::SENTINEL),
                note: Some(self.default_note.clone()),
                recorded_by: user_id,
                scheduled_date_id: scheduled_date.id,
            })
            .collect();

        let attendance = self.attendance.bulk_create(placeholders).await?;
        info!(
            scheduled_date_id = scheduled_date.id,
            workers = workers.len(),
            created = attendance.created,
            "Scheduled date opened"
        );

        Ok(ScheduledDateOutcome {
            scheduled_date,
            attendance,
        })
    }

    /// Runs every date independently and concurrently; a failing date is
    /// reported without affecting the others.
    #[instrument(skip(self, dates), fields(dates = dates.len()))]
    pub async fn on_scheduled_dates_batch_created(
        &self,
        dates: &[NaiveDate],
        sub_warehouse_id: u64,
        user_id: u64,
    ) -> BatchOutcome {
        let results = join_all(
            dates
                .iter()
                .map(|&date| self.on_scheduled_date_created(date, sub_warehouse_id, user_id)),
        )
        .await;

        let mut outcome = BatchOutcome::default();
        for (&date, result) in dates.iter().zip(results) {
            match result {
                Ok(created) => outcome.created.push(created),
                Err(e) => {
                    warn!(%date, error = %e, "Scheduled date failed");
                    outcome.errors.push(DateError {
                        date,
                        error: e.to_string(),
                    });
                }
            }
        }
        outcome
    }

    /// Removes the date with its attendance and rotation rows. Returns 0 for
    /// an unknown id; a date outside `scope` is forbidden.
    pub async fn delete_scheduled_date(&self, id: u64, scope: &Scope) -> AppResult<u64> {
        let Some(date) = self.schedule.find_scheduled_date(id).await? else {
            return Ok(0);
        };
        ensure_in_scope(scope, date.sub_warehouse_id)?;
        Ok(self.schedule.delete_scheduled_date(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, BulkScheduler) {
        let store = Arc::new(MemoryStore::default());
        let scheduler = BulkScheduler::new(
            store.clone(),
            store.clone(),
            AttendanceService::new(store.clone()),
            "No incidents",
        );
        (store, scheduler)
    }

    #[actix_web::test]
    async fn fixed_and_rotated_workers_each_get_a_placeholder() {
        let (store, scheduler) = setup();
        for _ in 0..3 {
            store.add_worker(4, true).await;
        }
        store.add_worker(4, false).await;
        let visitor = store.add_worker(9, true).await;
        store.add_rotation(visitor, 4, day(1)).await;
        // a rotation on another day does not count
        let other = store.add_worker(9, true).await;
        store.add_rotation(other, 4, day(2)).await;

        let outcome = scheduler
            .on_scheduled_date_created(day(1), 4, 77)
            .await
            .unwrap();

        assert_eq!(outcome.attendance.created, 4);
        let state = store.state.lock().await;
        assert_eq!(state.attendance.len(), 4);
        for row in &state.attendance {
            assert_eq!(row.scheduled_date_id, outcome.scheduled_date.id);
            assert_eq!(row.sub_warehouse_id, 4);
            assert_eq!(row.recorded_by, 77);
            assert_eq!(row.entry_time, Some(TimeOfDay::SENTINEL.to_naive_time()));
            assert_eq!(row.note.as_deref(), Some("No incidents"));
        }
    }

    #[actix_web::test]
    async fn worker_both_fixed_and_rotated_is_resolved_once() {
        let (store, scheduler) = setup();
        let worker = store.add_worker(4, true).await;
        store.add_rotation(worker, 4, day(1)).await;

        let resolved = scheduler.resolve_workers(4, day(1)).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, worker);
    }

    #[actix_web::test]
    async fn one_failing_date_does_not_abort_the_batch() {
        let (store, scheduler) = setup();
        store.add_worker(4, true).await;
        store.failing_dates.lock().await.insert(day(2));

        let outcome = scheduler
            .on_scheduled_dates_batch_created(&[day(1), day(2), day(3)], 4, 1)
            .await;

        assert_eq!(outcome.created.len(), 2);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].date, day(2));
        assert_eq!(store.attendance_count().await, 2);
    }

    #[actix_web::test]
    async fn deleting_a_date_cascades_to_its_rows() {
        let (store, scheduler) = setup();
        let worker = store.add_worker(4, true).await;
        let visitor = store.add_worker(9, true).await;
        store.add_rotation(visitor, 4, day(1)).await;

        let kept = scheduler.on_scheduled_date_created(day(2), 4, 1).await.unwrap();
        let doomed = scheduler.on_scheduled_date_created(day(1), 4, 1).await.unwrap();
        assert_eq!(doomed.attendance.created, 2);

        let deleted = scheduler
            .delete_scheduled_date(doomed.scheduled_date.id, &Scope::All)
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let state = store.state.lock().await;
        assert!(state.rotations.is_empty());
        assert_eq!(state.attendance.len(), 1);
        assert_eq!(state.attendance[0].worker_id, worker);
        assert_eq!(state.attendance[0].scheduled_date_id, kept.scheduled_date.id);
        drop(state);

        let again = scheduler
            .delete_scheduled_date(doomed.scheduled_date.id, &Scope::All)
            .await
            .unwrap();
        assert_eq!(again, 0);
    }

    #[actix_web::test]
    async fn dates_of_ungranted_sub_warehouses_are_not_deleted() {
        let (store, scheduler) = setup();
        store.add_worker(4, true).await;
        let opened = scheduler.on_scheduled_date_created(day(1), 4, 1).await.unwrap();

        let denied = scheduler
            .delete_scheduled_date(opened.scheduled_date.id, &Scope::Only(vec![9]))
            .await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));
        assert_eq!(store.attendance_count().await, 1);

        let deleted = scheduler
            .delete_scheduled_date(opened.scheduled_date.id, &Scope::Only(vec![4]))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.attendance_count().await, 0);
    }
}
