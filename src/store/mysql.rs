use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::debug;

use super::{AttendanceStore, InsertOutcome, ScheduleStore, StoreResult, WorkerDirectory};
use crate::model::attendance::{
    AttendancePatch, AttendanceRecord, NewAttendance, WorkerAttendanceRow,
};
use crate::model::scheduled_date::ScheduledDate;
use crate::model::worker::WorkerRef;
use crate::utils::db_utils::is_duplicate_key;

#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

/// Counts the batch's rows whose id was generated at or after `first_id`.
fn inserted_rows_query(
    first_id: u64,
    records: &[NewAttendance],
) -> QueryBuilder<'static, MySql> {
    let mut builder: QueryBuilder<MySql> =
        QueryBuilder::new("SELECT COUNT(*) FROM attendance WHERE id >= ");
    builder.push_bind(first_id);
    builder.push(" AND (worker_id, scheduled_date_id) IN (");
    {
        let mut keys = builder.separated(", ");
        for r in records {
            keys.push("(")
                .push_bind_unseparated(r.worker_id)
                .push_unseparated(", ")
                .push_bind_unseparated(r.scheduled_date_id)
                .push_unseparated(")");
        }
    }
    builder.push(")");
    builder
}

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn find_existing(&self, worker_id: u64, scheduled_date_id: u64) -> StoreResult<Option<u64>> {
        sqlx::query_scalar::<_, u64>(
            "SELECT id FROM attendance WHERE worker_id = ? AND scheduled_date_id = ?",
        )
        .bind(worker_id)
        .bind(scheduled_date_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn insert_attendance(&self, record: &NewAttendance) -> StoreResult<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance
                (worker_id, sub_warehouse_id, entry_time, exit_time, note, recorded_by, scheduled_date_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.worker_id)
        .bind(record.sub_warehouse_id)
        .bind(record.entry_time.map(|t| t.to_naive_time()))
        .bind(record.exit_time.map(|t| t.to_naive_time()))
        .bind(record.note.as_deref())
        .bind(record.recorded_by)
        .bind(record.scheduled_date_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(InsertOutcome::Inserted(done.last_insert_id())),
            Err(e) if is_duplicate_key(&e) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(e),
        }
    }

    async fn insert_attendance_batch(&self, records: &[NewAttendance]) -> StoreResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<MySql> = QueryBuilder::new(
            "INSERT INTO attendance \
             (worker_id, sub_warehouse_id, entry_time, exit_time, note, recorded_by, scheduled_date_id) ",
        );
        builder.push_values(records, |mut row, r| {
            row.push_bind(r.worker_id)
                .push_bind(r.sub_warehouse_id)
                .push_bind(r.entry_time.map(|t| t.to_naive_time()))
                .push_bind(r.exit_time.map(|t| t.to_naive_time()))
                .push_bind(r.note.clone())
                .push_bind(r.recorded_by)
                .push_bind(r.scheduled_date_id);
        });
        // rows stored concurrently for the same worker and date are left untouched
        builder.push(" ON DUPLICATE KEY UPDATE id = id");

        let mut tx = self.pool.begin().await?;
        let result = builder.build().execute(&mut *tx).await?;

        // rows_affected() also counts untouched duplicates (CLIENT_FOUND_ROWS)
        let first_id = result.last_insert_id();
        let inserted = if first_id == 0 {
            0
        } else {
            let count: i64 = inserted_rows_query(first_id, records)
                .build_query_scalar::<i64>()
                .fetch_one(&mut *tx)
                .await?;
            count as u64
        };
        tx.commit().await?;

        debug!(rows = records.len(), inserted, "Bulk attendance insert");
        Ok(inserted)
    }

    async fn update_attendance(&self, id: u64, patch: &AttendancePatch) -> StoreResult<u64> {
        let mut builder: QueryBuilder<MySql> = QueryBuilder::new("UPDATE attendance SET ");
        {
            let mut set = builder.separated(", ");
            if let Some(entry) = patch.entry_time {
                set.push("entry_time = ")
                    .push_bind_unseparated(entry.map(|t| t.to_naive_time()));
            }
            if let Some(exit) = patch.exit_time {
                set.push("exit_time = ")
                    .push_bind_unseparated(exit.map(|t| t.to_naive_time()));
            }
            if let Some(note) = &patch.note {
                set.push("note = ").push_bind_unseparated(note.clone());
            }
            set.push("updated_at = NOW()");
        }
        builder.push(" WHERE id = ").push_bind(id).push(" LIMIT 1");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn find_attendance(&self, id: u64) -> StoreResult<Option<AttendanceRecord>> {
        sqlx::query_as::<_, AttendanceRecord>(
            r#"
            SELECT
                a.id, a.worker_id, a.sub_warehouse_id, a.entry_time, a.exit_time,
                a.note, a.recorded_by, a.scheduled_date_id,
                sd.calendar_date AS scheduled_date
            FROM attendance a
            LEFT JOIN scheduled_dates sd ON sd.id = a.scheduled_date_id
            WHERE a.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn remove_attendance(&self, record: &AttendanceRecord) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM attendance WHERE id = ?")
            .bind(record.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if let Some(date) = record.scheduled_date {
            let rotations = sqlx::query(
                "DELETE FROM worker_rotations WHERE worker_id = ? AND sub_warehouse_id = ? AND rotation_date = ?",
            )
            .bind(record.worker_id)
            .bind(record.sub_warehouse_id)
            .bind(date)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            debug!(attendance_id = record.id, rotations, "Removed rotation rows with attendance");
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn worker_attendance(&self, worker_id: u64) -> StoreResult<Vec<WorkerAttendanceRow>> {
        sqlx::query_as::<_, WorkerAttendanceRow>(
            r#"
            SELECT
                a.id,
                w.national_id,
                w.name AS worker_name,
                sw.name AS sub_warehouse_name,
                wh.name AS warehouse_name,
                sd.calendar_date,
                w.target_hours,
                a.entry_time,
                a.exit_time,
                a.note
            FROM attendance a
            INNER JOIN workers w ON a.worker_id = w.id
            INNER JOIN sub_warehouses sw ON a.sub_warehouse_id = sw.id
            INNER JOIN warehouses wh ON sw.warehouse_id = wh.id
            INNER JOIN scheduled_dates sd ON a.scheduled_date_id = sd.id
            WHERE w.id = ?
            ORDER BY sd.calendar_date DESC, a.entry_time ASC
            "#,
        )
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await
    }
}

#[async_trait]
impl WorkerDirectory for MySqlStore {
    async fn active_workers_in(&self, sub_warehouse_id: u64) -> StoreResult<Vec<WorkerRef>> {
        sqlx::query_as::<_, WorkerRef>(
            "SELECT id, name, sub_warehouse_id FROM workers WHERE sub_warehouse_id = ? AND active = 1 ORDER BY id",
        )
        .bind(sub_warehouse_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn rotated_workers_on(
        &self,
        sub_warehouse_id: u64,
        date: NaiveDate,
    ) -> StoreResult<Vec<WorkerRef>> {
        sqlx::query_as::<_, WorkerRef>(
            r#"
            SELECT w.id, w.name, w.sub_warehouse_id
            FROM worker_rotations r
            INNER JOIN workers w ON r.worker_id = w.id
            WHERE r.sub_warehouse_id = ? AND r.rotation_date = ? AND w.active = 1
            ORDER BY w.id
            "#,
        )
        .bind(sub_warehouse_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await
    }
}

#[async_trait]
impl ScheduleStore for MySqlStore {
    async fn insert_scheduled_date(
        &self,
        date: NaiveDate,
        sub_warehouse_id: u64,
    ) -> StoreResult<ScheduledDate> {
        let result = sqlx::query(
            "INSERT INTO scheduled_dates (calendar_date, sub_warehouse_id, active) VALUES (?, ?, 1)",
        )
        .bind(date)
        .bind(sub_warehouse_id)
        .execute(&self.pool)
        .await?;

        Ok(ScheduledDate {
            id: result.last_insert_id(),
            calendar_date: date,
            sub_warehouse_id,
            active: true,
        })
    }

    async fn find_scheduled_date(&self, id: u64) -> StoreResult<Option<ScheduledDate>> {
        sqlx::query_as::<_, ScheduledDate>(
            "SELECT id, calendar_date, sub_warehouse_id, active FROM scheduled_dates WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_scheduled_date(&self, id: u64) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        let target = sqlx::query_as::<_, (NaiveDate, u64)>(
            "SELECT calendar_date, sub_warehouse_id FROM scheduled_dates WHERE id = ? FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((date, sub_warehouse_id)) = target else {
            tx.rollback().await?;
            return Ok(0);
        };

        let attendance = sqlx::query(
            r#"
            DELETE a FROM attendance a
            INNER JOIN scheduled_dates sd ON a.scheduled_date_id = sd.id
            WHERE sd.sub_warehouse_id = ? AND sd.calendar_date = ?
            "#,
        )
        .bind(sub_warehouse_id)
        .bind(date)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let rotations = sqlx::query(
            "DELETE FROM worker_rotations WHERE sub_warehouse_id = ? AND rotation_date = ?",
        )
        .bind(sub_warehouse_id)
        .bind(date)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let deleted = sqlx::query("DELETE FROM scheduled_dates WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        debug!(id, attendance, rotations, "Scheduled date removed with dependents");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time_of_day::TimeOfDay;

    fn placeholder(worker_id: u64) -> NewAttendance {
        NewAttendance {
            worker_id,
            sub_warehouse_id: 2,
            entry_time: Some(TimeOfDay::SENTINEL),
            exit_time: Some(TimeOfDay::SENTINEL),
            note: Some("No incidents".into()),
            recorded_by: 1,
            scheduled_date_id: 9,
        }
    }

    #[test]
    fn inserted_count_is_limited_to_new_ids_of_the_batch_keys() {
        let records = vec![placeholder(1), placeholder(2), placeholder(3)];
        let builder = inserted_rows_query(40, &records);
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM attendance WHERE id >= ? \
             AND (worker_id, scheduled_date_id) IN ((?, ?), (?, ?), (?, ?))"
        );
    }
}
