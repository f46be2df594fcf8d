//! Read-only aggregates for the back-office landing page.

use std::time::Instant;

use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use futures::try_join;
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::{auth::auth::AuthUser, error::AppError, model::role::Role};

const RANKING_LIMIT: usize = 5;

/// Worked hours per worker over attended rows of the last `?` days.
/// Rows still holding the 00:00 placeholder, or with the exit before the
/// entry, are not counted.
const RECENT_HOURS: &str = r#"
    SELECT
        w.id,
        w.name AS worker,
        wh.name AS warehouse,
        sw.name AS sub_warehouse,
        w.target_hours,
        CAST(IFNULL(SUM(TIME_TO_SEC(r.exit_time) - TIME_TO_SEC(r.entry_time)), 0) / 3600 AS DOUBLE)
            AS worked_hours,
        MAX(r.calendar_date) AS last_attendance
    FROM workers w
    INNER JOIN sub_warehouses sw ON w.sub_warehouse_id = sw.id
    INNER JOIN warehouses wh ON sw.warehouse_id = wh.id
    LEFT JOIN (
        SELECT a.worker_id, a.entry_time, a.exit_time, sd.calendar_date
        FROM attendance a
        INNER JOIN scheduled_dates sd ON a.scheduled_date_id = sd.id
        WHERE sd.calendar_date >= CURDATE() - INTERVAL ? DAY
          AND a.entry_time IS NOT NULL
          AND a.exit_time IS NOT NULL
          AND a.entry_time <> '00:00:00'
          AND a.exit_time <> '00:00:00'
          AND a.exit_time > a.entry_time
    ) r ON r.worker_id = w.id
    WHERE w.active = 1
    GROUP BY w.id, w.name, wh.name, sw.name, w.target_hours
"#;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct DashboardTotals {
    pub warehouses: i64,
    pub sub_warehouses: i64,
    pub coordinators: i64,
    pub workers: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct WorkerHours {
    pub id: u64,
    pub worker: String,
    pub warehouse: String,
    pub sub_warehouse: String,
    pub target_hours: i32,
    pub worked_hours: f64,
    #[schema(value_type = Option<String>, format = "date")]
    pub last_attendance: Option<NaiveDate>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RankedWorker {
    #[serde(flatten)]
    pub hours: WorkerHours,
    /// Overtime or shortfall in hours, depending on the ranking.
    pub difference: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardOverview {
    pub totals: DashboardTotals,
    pub week_workers: Vec<WorkerHours>,
    pub overtime: Vec<RankedWorker>,
    pub shortfall: Vec<RankedWorker>,
}

async fn totals(pool: &MySqlPool) -> Result<DashboardTotals, sqlx::Error> {
    sqlx::query_as::<_, DashboardTotals>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM warehouses) AS warehouses,
            (SELECT COUNT(*) FROM sub_warehouses) AS sub_warehouses,
            (SELECT COUNT(*) FROM users WHERE role_id = ? AND active = 1) AS coordinators,
            (SELECT COUNT(*) FROM workers WHERE active = 1) AS workers
        "#,
    )
    .bind(Role::Coordinator.id())
    .fetch_one(pool)
    .await
}

async fn recent_hours(pool: &MySqlPool, days: u32) -> Result<Vec<WorkerHours>, sqlx::Error> {
    sqlx::query_as::<_, WorkerHours>(RECENT_HOURS)
        .bind(days)
        .fetch_all(pool)
        .await
}

/// Workers with the most hours in the last 7 days.
async fn week_workers(pool: &MySqlPool) -> Result<Vec<WorkerHours>, sqlx::Error> {
    let mut rows = recent_hours(pool, 7).await?;
    rows.sort_by(|a, b| {
        b.worked_hours
            .total_cmp(&a.worked_hours)
            .then(b.last_attendance.cmp(&a.last_attendance))
    });
    rows.truncate(RANKING_LIMIT);
    Ok(rows)
}

/// Keeps workers with a positive `difference`, largest first.
fn rank(rows: Vec<WorkerHours>, difference: impl Fn(&WorkerHours) -> f64) -> Vec<RankedWorker> {
    let mut ranked: Vec<RankedWorker> = rows
        .into_iter()
        .map(|hours| RankedWorker {
            difference: difference(&hours),
            hours,
        })
        .filter(|r| r.difference > 0.0)
        .collect();
    ranked.sort_by(|a, b| b.difference.total_cmp(&a.difference));
    ranked.truncate(RANKING_LIMIT);
    ranked
}

async fn overtime(pool: &MySqlPool) -> Result<Vec<RankedWorker>, sqlx::Error> {
    let rows = recent_hours(pool, 30).await?;
    Ok(rank(rows, |w| w.worked_hours - f64::from(w.target_hours)))
}

async fn shortfall(pool: &MySqlPool) -> Result<Vec<RankedWorker>, sqlx::Error> {
    let rows = recent_hours(pool, 30).await?;
    Ok(rank(rows, |w| f64::from(w.target_hours) - w.worked_hours))
}

fn log_failure(what: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| {
        error!(error = %e, what, "Dashboard query failed");
        AppError::from(e)
    }
}

/// Dashboard totals
#[utoipa::path(
    get,
    path = "/api/dashboard/totals",
    responses((status = 200, description = "Entity counts", body = DashboardTotals)),
    tag = "Dashboard",
    security(("bearer_auth" = []))
)]
pub async fn dashboard_totals(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;
    let started = Instant::now();
    let body = totals(pool.get_ref()).await.map_err(log_failure("totals"))?;
    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Dashboard totals");
    Ok(HttpResponse::Ok().json(body))
}

/// Most active workers of the last week
#[utoipa::path(
    get,
    path = "/api/dashboard/week-workers",
    responses((status = 200, description = "Top workers by hours", body = [WorkerHours])),
    tag = "Dashboard",
    security(("bearer_auth" = []))
)]
pub async fn dashboard_week_workers(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;
    let rows = week_workers(pool.get_ref())
        .await
        .map_err(log_failure("week_workers"))?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Overtime ranking over the last 30 days
#[utoipa::path(
    get,
    path = "/api/dashboard/overtime",
    responses((status = 200, description = "Workers above target", body = [RankedWorker])),
    tag = "Dashboard",
    security(("bearer_auth" = []))
)]
pub async fn dashboard_overtime(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;
    let rows = overtime(pool.get_ref()).await.map_err(log_failure("overtime"))?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Shortfall ranking over the last 30 days
#[utoipa::path(
    get,
    path = "/api/dashboard/shortfall",
    responses((status = 200, description = "Workers below target", body = [RankedWorker])),
    tag = "Dashboard",
    security(("bearer_auth" = []))
)]
pub async fn dashboard_shortfall(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;
    let rows = shortfall(pool.get_ref()).await.map_err(log_failure("shortfall"))?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Everything the dashboard shows, in one round trip
#[utoipa::path(
    get,
    path = "/api/dashboard",
    responses((status = 200, description = "Dashboard overview", body = DashboardOverview)),
    tag = "Dashboard",
    security(("bearer_auth" = []))
)]
pub async fn dashboard_overview(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;
    let pool = pool.get_ref();
    let started = Instant::now();

    let (totals, week_workers, overtime, shortfall) = try_join!(
        totals(pool),
        week_workers(pool),
        overtime(pool),
        shortfall(pool),
    )
    .map_err(log_failure("overview"))?;

    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Dashboard overview");
    Ok(HttpResponse::Ok().json(DashboardOverview {
        totals,
        week_workers,
        overtime,
        shortfall,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours(id: u64, target: i32, worked: f64) -> WorkerHours {
        WorkerHours {
            id,
            worker: format!("worker {}", id),
            warehouse: "North".into(),
            sub_warehouse: "Dock".into(),
            target_hours: target,
            worked_hours: worked,
            last_attendance: None,
        }
    }

    #[test]
    fn overtime_ranking_drops_workers_on_or_below_target() {
        let rows = vec![hours(1, 8, 10.0), hours(2, 8, 8.0), hours(3, 8, 12.5), hours(4, 8, 2.0)];
        let ranked = rank(rows, |w| w.worked_hours - f64::from(w.target_hours));
        let ids: Vec<u64> = ranked.iter().map(|r| r.hours.id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(ranked[0].difference, 4.5);
    }

    #[test]
    fn ranking_is_capped() {
        let rows = (1..=9).map(|i| hours(i, 40, i as f64)).collect();
        let ranked = rank(rows, |w| f64::from(w.target_hours) - w.worked_hours);
        assert_eq!(ranked.len(), RANKING_LIMIT);
        assert_eq!(ranked[0].hours.id, 1);
    }

    #[test]
    fn recent_hours_skip_rows_the_summary_counts_as_absent() {
        let sql: String = RECENT_HOURS.split_whitespace().collect::<Vec<_>>().join(" ");
        for filter in [
            "a.entry_time IS NOT NULL",
            "a.exit_time IS NOT NULL",
            "a.entry_time <> '00:00:00'",
            "a.exit_time <> '00:00:00'",
            "a.exit_time > a.entry_time",
        ] {
            assert!(sql.contains(filter), "missing {}", filter);
        }
    }
}
