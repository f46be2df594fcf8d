//! In-memory store mirroring the MySQL schema's uniqueness rules, with
//! failure injection for scheduled-date inserts.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use super::{AttendanceStore, InsertOutcome, ScheduleStore, StoreResult, WorkerDirectory};
use crate::model::attendance::{
    AttendancePatch, AttendanceRecord, NewAttendance, WorkerAttendanceRow,
};
use crate::model::scheduled_date::ScheduledDate;
use crate::model::worker::{Worker, WorkerRef};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RotationKey {
    pub worker_id: u64,
    pub sub_warehouse_id: u64,
    pub date: NaiveDate,
}

#[derive(Default)]
pub struct MemoryState {
    pub workers: Vec<Worker>,
    pub rotations: HashSet<RotationKey>,
    pub scheduled_dates: Vec<ScheduledDate>,
    pub attendance: Vec<AttendanceRecord>,
    pub updates: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    pub state: Mutex<MemoryState>,
    pub failing_dates: Mutex<HashSet<NaiveDate>>,
    pub failing_existence_checks: Mutex<HashSet<u64>>,
    /// (worker, scheduled date) pairs whose next existence check misses the
    /// stored row, as when a concurrent insert lands between check and insert.
    pub stale_existence_checks: Mutex<HashSet<(u64, u64)>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub async fn add_worker(&self, sub_warehouse_id: u64, active: bool) -> u64 {
        let id = self.next_id();
        self.state.lock().await.workers.push(Worker {
            id,
            name: format!("worker-{}", id),
            national_id: format!("{:08}", id),
            sub_warehouse_id,
            coordinator_id: None,
            target_hours: 8,
            active,
        });
        id
    }

    pub async fn add_rotation(&self, worker_id: u64, sub_warehouse_id: u64, date: NaiveDate) {
        self.state.lock().await.rotations.insert(RotationKey {
            worker_id,
            sub_warehouse_id,
            date,
        });
    }

    pub async fn add_scheduled_date(&self, date: NaiveDate, sub_warehouse_id: u64) -> u64 {
        self.insert_scheduled_date(date, sub_warehouse_id)
            .await
            .expect("scheduled date")
            .id
    }

    pub async fn attendance_count(&self) -> usize {
        self.state.lock().await.attendance.len()
    }

    fn store_row(state: &mut MemoryState, id: u64, r: &NewAttendance) {
        let scheduled_date = state
            .scheduled_dates
            .iter()
            .find(|d| d.id == r.scheduled_date_id)
            .map(|d| d.calendar_date);
        state.attendance.push(AttendanceRecord {
            id,
            worker_id: r.worker_id,
            sub_warehouse_id: r.sub_warehouse_id,
            entry_time: r.entry_time.map(|t| t.to_naive_time()),
            exit_time: r.exit_time.map(|t| t.to_naive_time()),
            note: r.note.clone(),
            recorded_by: r.recorded_by,
            scheduled_date_id: r.scheduled_date_id,
            scheduled_date,
        });
    }

    fn exists(state: &MemoryState, worker_id: u64, scheduled_date_id: u64) -> bool {
        state
            .attendance
            .iter()
            .any(|a| a.worker_id == worker_id && a.scheduled_date_id == scheduled_date_id)
    }
}

fn injected(what: &str) -> sqlx::Error {
    sqlx::Error::Protocol(format!("injected failure: {}", what))
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn find_existing(&self, worker_id: u64, scheduled_date_id: u64) -> StoreResult<Option<u64>> {
        if self.failing_existence_checks.lock().await.contains(&worker_id) {
            return Err(injected("existence check"));
        }
        if self
            .stale_existence_checks
            .lock()
            .await
            .remove(&(worker_id, scheduled_date_id))
        {
            return Ok(None);
        }
        Ok(self
            .state
            .lock()
            .await
            .attendance
            .iter()
            .find(|a| a.worker_id == worker_id && a.scheduled_date_id == scheduled_date_id)
            .map(|a| a.id))
    }

    async fn insert_attendance(&self, record: &NewAttendance) -> StoreResult<InsertOutcome> {
        let mut state = self.state.lock().await;
        if Self::exists(&state, record.worker_id, record.scheduled_date_id) {
            return Ok(InsertOutcome::Duplicate);
        }
        let id = self.next_id();
        Self::store_row(&mut state, id, record);
        Ok(InsertOutcome::Inserted(id))
    }

    async fn insert_attendance_batch(&self, records: &[NewAttendance]) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let mut inserted = 0;
        for r in records {
            if Self::exists(&state, r.worker_id, r.scheduled_date_id) {
                continue;
            }
            let id = self.next_id();
            Self::store_row(&mut state, id, r);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn update_attendance(&self, id: u64, patch: &AttendancePatch) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let Some(row) = state.attendance.iter_mut().find(|a| a.id == id) else {
            return Ok(0);
        };
        if let Some(entry) = patch.entry_time {
            row.entry_time = entry.map(|t| t.to_naive_time());
        }
        if let Some(exit) = patch.exit_time {
            row.exit_time = exit.map(|t| t.to_naive_time());
        }
        if let Some(note) = &patch.note {
            row.note = note.clone();
        }
        state.updates += 1;
        Ok(1)
    }

    async fn find_attendance(&self, id: u64) -> StoreResult<Option<AttendanceRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .attendance
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn remove_attendance(&self, record: &AttendanceRecord) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.attendance.len();
        state.attendance.retain(|a| a.id != record.id);
        let deleted = (before - state.attendance.len()) as u64;

        if let Some(date) = record.scheduled_date {
            state.rotations.remove(&RotationKey {
                worker_id: record.worker_id,
                sub_warehouse_id: record.sub_warehouse_id,
                date,
            });
        }
        Ok(deleted)
    }

    async fn worker_attendance(&self, worker_id: u64) -> StoreResult<Vec<WorkerAttendanceRow>> {
        let state = self.state.lock().await;
        let Some(worker) = state.workers.iter().find(|w| w.id == worker_id) else {
            return Ok(Vec::new());
        };
        Ok(state
            .attendance
            .iter()
            .filter(|a| a.worker_id == worker_id)
            .map(|a| WorkerAttendanceRow {
                id: a.id,
                national_id: worker.national_id.clone(),
                worker_name: worker.name.clone(),
                sub_warehouse_name: format!("sub-{}", a.sub_warehouse_id),
                warehouse_name: "main".to_string(),
                calendar_date: a.scheduled_date.unwrap_or_default(),
                target_hours: worker.target_hours,
                entry_time: a.entry_time,
                exit_time: a.exit_time,
                note: a.note.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl WorkerDirectory for MemoryStore {
    async fn active_workers_in(&self, sub_warehouse_id: u64) -> StoreResult<Vec<WorkerRef>> {
        Ok(self
            .state
            .lock()
            .await
            .workers
            .iter()
            .filter(|w| w.sub_warehouse_id == sub_warehouse_id && w.active)
            .map(|w| WorkerRef {
                id: w.id,
                name: w.name.clone(),
                sub_warehouse_id: w.sub_warehouse_id,
            })
            .collect())
    }

    async fn rotated_workers_on(
        &self,
        sub_warehouse_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Vec<WorkerRef>> {
        let state = self.state.lock().await;
        let mut rotated: Vec<WorkerRef> = state
            .workers
            .iter()
            .filter(|w| {
                w.active
                    && state.rotations.contains(&RotationKey {
                        worker_id: w.id,
                        sub_warehouse_id,
                        date,
                    })
            })
            .map(|w| WorkerRef {
                id: w.id,
                name: w.name.clone(),
                sub_warehouse_id: w.sub_warehouse_id,
            })
            .collect();
        rotated.sort_by_key(|w| w.id);
        Ok(rotated)
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn insert_scheduled_date(
        &self,
        date: NaiveDate,
        sub_warehouse_id: u64,
    ) -> StoreResult<ScheduledDate> {
        if self.failing_dates.lock().await.contains(&date) {
            return Err(injected("scheduled date insert"));
        }
        let mut state = self.state.lock().await;
        if state
            .scheduled_dates
            .iter()
            .any(|d| d.calendar_date == date && d.sub_warehouse_id == sub_warehouse_id)
        {
            return Err(sqlx::Error::Protocol("duplicate scheduled date".into()));
        }
        let scheduled = ScheduledDate {
            id: self.next_id(),
            calendar_date: date,
            sub_warehouse_id,
            active: true,
        };
        state.scheduled_dates.push(scheduled.clone());
        Ok(scheduled)
    }

    async fn find_scheduled_date(&self, id: u64) -> StoreResult<Option<ScheduledDate>> {
        Ok(self
            .state
            .lock()
            .await
            .scheduled_dates
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }

    async fn delete_scheduled_date(&self, id: u64) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let Some(target) = state.scheduled_dates.iter().find(|d| d.id == id).cloned() else {
            return Ok(0);
        };

        let same_day: HashSet<u64> = state
            .scheduled_dates
            .iter()
            .filter(|d| {
                d.sub_warehouse_id == target.sub_warehouse_id
                    && d.calendar_date == target.calendar_date
            })
            .map(|d| d.id)
            .collect();

        state
            .attendance
            .retain(|a| !same_day.contains(&a.scheduled_date_id));
        state.rotations.retain(|r| {
            !(r.sub_warehouse_id == target.sub_warehouse_id && r.date == target.calendar_date)
        });
        state.scheduled_dates.retain(|d| d.id != id);
        Ok(1)
    }
}
