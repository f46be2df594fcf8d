use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    attendance::{AttendanceService, BulkScheduler},
    auth::auth::AuthUser,
    error::AppError,
    model::worker::Worker,
    utils::db_utils::{build_update_sql, execute_update, is_duplicate_key, is_foreign_key_violation},
};

const UPDATABLE: &[&str] = &[
    "name",
    "national_id",
    "sub_warehouse_id",
    "coordinator_id",
    "target_hours",
];

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWorker {
    #[schema(example = "Juan Perez")]
    pub name: String,
    #[schema(example = "12345678")]
    pub national_id: String,
    #[schema(example = 4)]
    pub sub_warehouse_id: u64,
    #[schema(example = 3)]
    pub coordinator_id: Option<u64>,
    #[schema(example = 8)]
    pub target_hours: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetWorkerActive {
    pub active: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct WorkersByDateQuery {
    pub sub_warehouse_id: u64,
    #[param(value_type = String, format = "date")]
    pub date: NaiveDate,
}

/// Worker with the names of its sub-warehouse, warehouse and coordinator.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct WorkerListRow {
    pub id: u64,
    pub name: String,
    pub national_id: String,
    pub active: bool,
    pub sub_warehouse_id: u64,
    pub warehouse: Option<String>,
    pub sub_warehouse: Option<String>,
    pub coordinator: Option<String>,
    pub target_hours: i32,
}

fn write_error(e: sqlx::Error) -> AppError {
    if is_duplicate_key(&e) {
        AppError::Conflict("A worker with this national id already exists".into())
    } else if is_foreign_key_violation(&e) {
        AppError::Validation("Unknown sub-warehouse or coordinator".into())
    } else {
        AppError::from(e)
    }
}

/// Create worker
#[utoipa::path(
    post,
    path = "/api/workers",
    request_body = CreateWorker,
    responses(
        (status = 201, description = "Worker created", body = Worker),
        (status = 409, description = "National id already registered")
    ),
    tag = "Workers",
    security(("bearer_auth" = []))
)]
pub async fn create_worker(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateWorker>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;
    let payload = payload.into_inner();

    if payload.name.trim().is_empty() || payload.national_id.trim().is_empty() {
        return Err(AppError::Validation("Name and national id are required".into()).into());
    }
    let target_hours = payload.target_hours.unwrap_or(0);

    let result = sqlx::query(
        r#"
        INSERT INTO workers (name, national_id, sub_warehouse_id, coordinator_id, target_hours, active)
        VALUES (?, ?, ?, ?, ?, 1)
        "#,
    )
    .bind(payload.name.trim())
    .bind(payload.national_id.trim())
    .bind(payload.sub_warehouse_id)
    .bind(payload.coordinator_id)
    .bind(target_hours)
    .execute(pool.get_ref())
    .await
    .map_err(write_error)?;

    let worker = Worker {
        id: result.last_insert_id(),
        name: payload.name.trim().to_string(),
        national_id: payload.national_id.trim().to_string(),
        sub_warehouse_id: payload.sub_warehouse_id,
        coordinator_id: payload.coordinator_id,
        target_hours,
        active: true,
    };
    info!(worker_id = worker.id, "Worker created");

    Ok(HttpResponse::Created().json(worker))
}

/// List workers
#[utoipa::path(
    get,
    path = "/api/workers",
    responses((status = 200, description = "Workers by name", body = [WorkerListRow])),
    tag = "Workers",
    security(("bearer_auth" = []))
)]
pub async fn list_workers(pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    let rows = sqlx::query_as::<_, WorkerListRow>(
        r#"
        SELECT
            w.id, w.name, w.national_id, w.active, w.sub_warehouse_id,
            wh.name AS warehouse,
            sw.name AS sub_warehouse,
            u.name AS coordinator,
            w.target_hours
        FROM workers w
        LEFT JOIN sub_warehouses sw ON w.sub_warehouse_id = sw.id
        LEFT JOIN warehouses wh ON sw.warehouse_id = wh.id
        LEFT JOIN users u ON w.coordinator_id = u.id
        ORDER BY w.name ASC
        "#,
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to list workers");
        AppError::from(e)
    })?;

    Ok(HttpResponse::Ok().json(rows))
}

/// Get worker by id
#[utoipa::path(
    get,
    path = "/api/workers/{id}",
    params(("id", Path, description = "Worker id")),
    responses(
        (status = 200, description = "Worker found", body = Worker),
        (status = 404, description = "Worker not found")
    ),
    tag = "Workers",
    security(("bearer_auth" = []))
)]
pub async fn get_worker(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let worker = sqlx::query_as::<_, Worker>(
        "SELECT id, name, national_id, sub_warehouse_id, coordinator_id, target_hours, active FROM workers WHERE id = ?",
    )
    .bind(path.into_inner())
    .fetch_optional(pool.get_ref())
    .await
    .map_err(AppError::from)?
    .ok_or(AppError::NotFound("Worker"))?;

    Ok(HttpResponse::Ok().json(worker))
}

/// Update worker
///
/// Accepts any subset of name, national_id, sub_warehouse_id,
/// coordinator_id and target_hours.
#[utoipa::path(
    put,
    path = "/api/workers/{id}",
    params(("id", Path, description = "Worker id")),
    request_body = Object,
    responses(
        (status = 200, description = "Worker updated"),
        (status = 400, description = "Unknown or empty fields"),
        (status = 404, description = "Worker not found")
    ),
    tag = "Workers",
    security(("bearer_auth" = []))
)]
pub async fn update_worker(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;
    let update = build_update_sql("workers", &body, UPDATABLE, "id", path.into_inner())?;

    let affected = execute_update(pool.get_ref(), update)
        .await
        .map_err(write_error)?;

    if affected == 0 {
        return Err(AppError::NotFound("Worker").into());
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Worker updated" })))
}

/// Activate or deactivate worker
#[utoipa::path(
    patch,
    path = "/api/workers/{id}/active",
    params(("id", Path, description = "Worker id")),
    request_body = SetWorkerActive,
    responses(
        (status = 200, description = "Status changed"),
        (status = 404, description = "Worker not found")
    ),
    tag = "Workers",
    security(("bearer_auth" = []))
)]
pub async fn set_worker_active(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<SetWorkerActive>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;
    let id = path.into_inner();

    let affected = sqlx::query("UPDATE workers SET active = ? WHERE id = ?")
        .bind(payload.active)
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(AppError::from)?
        .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound("Worker").into());
    }

    info!(worker_id = id, active = payload.active, "Worker status changed");
    Ok(HttpResponse::Ok().json(json!({ "message": "Worker status updated" })))
}

/// Delete worker
#[utoipa::path(
    delete,
    path = "/api/workers/{id}",
    params(("id", Path, description = "Worker id")),
    responses(
        (status = 200, description = "Worker deleted"),
        (status = 404, description = "Worker not found"),
        (status = 409, description = "Worker still has attendance rows")
    ),
    tag = "Workers",
    security(("bearer_auth" = []))
)]
pub async fn delete_worker(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM workers WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => Err(AppError::NotFound("Worker").into()),
        Ok(_) => Ok(HttpResponse::Ok().json(json!({ "message": "Worker deleted" }))),
        Err(e) if is_foreign_key_violation(&e) => Err(AppError::Conflict(
            "Worker has attendance records; deactivate it instead".into(),
        )
        .into()),
        Err(e) => Err(AppError::from(e).into()),
    }
}

/// Workers expected on a date
///
/// Active workers of the sub-warehouse plus workers rotated in for that date.
#[utoipa::path(
    get,
    path = "/api/workers/by-date",
    params(WorkersByDateQuery),
    responses(
        (status = 200, description = "Resolved workers", body = [crate::model::worker::WorkerRef])
    ),
    tag = "Workers",
    security(("bearer_auth" = []))
)]
pub async fn workers_by_date(
    scheduler: web::Data<BulkScheduler>,
    query: web::Query<WorkersByDateQuery>,
) -> actix_web::Result<impl Responder> {
    let workers = scheduler
        .resolve_workers(query.sub_warehouse_id, query.date)
        .await?;
    Ok(HttpResponse::Ok().json(workers))
}

/// Attendance history of a worker
///
/// Every attendance row of the worker with the hours summary over them.
#[utoipa::path(
    get,
    path = "/api/workers/{id}/attendance",
    params(("id", Path, description = "Worker id")),
    responses(
        (
            status = 200,
            description = "History and summary",
            body = crate::attendance::service::WorkerSummary
        )
    ),
    tag = "Workers",
    security(("bearer_auth" = []))
)]
pub async fn worker_attendance(
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let summary = service.worker_summary(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(summary))
}
