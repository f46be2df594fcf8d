use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    attendance::BulkScheduler,
    auth::{
        access::{allowed_sub_warehouses, ensure_sub_warehouse_access},
        auth::AuthUser,
    },
    error::AppError,
    model::scheduled_date::ScheduledDate,
    utils::db_utils::is_duplicate_key,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateScheduledDate {
    #[schema(example = "2025-03-01", format = "date", value_type = String)]
    pub calendar_date: NaiveDate,
    #[schema(example = 4)]
    pub sub_warehouse_id: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateScheduledDates {
    #[schema(example = json!(["2025-03-01", "2025-03-02"]), value_type = Vec<String>)]
    pub dates: Vec<NaiveDate>,
    #[schema(example = 4)]
    pub sub_warehouse_id: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateScheduledDate {
    #[schema(example = "2025-03-02", format = "date", value_type = String)]
    pub calendar_date: NaiveDate,
    pub sub_warehouse_id: u64,
    pub active: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ScheduledDateQuery {
    pub sub_warehouse_id: Option<u64>,
}

/// Schedule a date
///
/// Also creates one placeholder attendance row per worker assigned to the
/// sub-warehouse that day.
#[utoipa::path(
    post,
    path = "/api/scheduled-dates",
    request_body = CreateScheduledDate,
    responses(
        (
            status = 201,
            description = "Date scheduled",
            body = crate::attendance::scheduler::ScheduledDateOutcome
        ),
        (status = 409, description = "Date already scheduled for the sub-warehouse")
    ),
    tag = "Scheduled dates",
    security(("bearer_auth" = []))
)]
pub async fn create_scheduled_date(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    scheduler: web::Data<BulkScheduler>,
    payload: web::Json<CreateScheduledDate>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;
    ensure_sub_warehouse_access(pool.get_ref(), &user, payload.sub_warehouse_id).await?;

    let outcome = scheduler
        .on_scheduled_date_created(payload.calendar_date, payload.sub_warehouse_id, user.user_id)
        .await?;

    Ok(HttpResponse::Created().json(outcome))
}

/// Schedule several dates
///
/// Each date is processed independently; failures are listed in `errors`.
#[utoipa::path(
    post,
    path = "/api/scheduled-dates/batch",
    request_body = CreateScheduledDates,
    responses(
        (
            status = 200,
            description = "Per-date results",
            body = crate::attendance::scheduler::BatchOutcome
        ),
        (status = 400, description = "No dates given")
    ),
    tag = "Scheduled dates",
    security(("bearer_auth" = []))
)]
pub async fn create_scheduled_dates(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    scheduler: web::Data<BulkScheduler>,
    payload: web::Json<CreateScheduledDates>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;
    if payload.dates.is_empty() {
        return Err(AppError::Validation("At least one date is required".into()).into());
    }
    ensure_sub_warehouse_access(pool.get_ref(), &user, payload.sub_warehouse_id).await?;

    let outcome = scheduler
        .on_scheduled_dates_batch_created(&payload.dates, payload.sub_warehouse_id, user.user_id)
        .await;

    Ok(HttpResponse::Ok().json(outcome))
}

/// List scheduled dates
#[utoipa::path(
    get,
    path = "/api/scheduled-dates",
    params(ScheduledDateQuery),
    responses((status = 200, description = "Scheduled dates by date", body = [ScheduledDate])),
    tag = "Scheduled dates",
    security(("bearer_auth" = []))
)]
pub async fn list_scheduled_dates(
    pool: web::Data<MySqlPool>,
    query: web::Query<ScheduledDateQuery>,
) -> actix_web::Result<impl Responder> {
    let rows = match query.sub_warehouse_id {
        Some(id) => {
            sqlx::query_as::<_, ScheduledDate>(
                "SELECT id, calendar_date, sub_warehouse_id, active FROM scheduled_dates WHERE sub_warehouse_id = ? ORDER BY calendar_date ASC",
            )
            .bind(id)
            .fetch_all(pool.get_ref())
            .await
        }
        None => {
            sqlx::query_as::<_, ScheduledDate>(
                "SELECT id, calendar_date, sub_warehouse_id, active FROM scheduled_dates ORDER BY calendar_date ASC",
            )
            .fetch_all(pool.get_ref())
            .await
        }
    }
    .map_err(AppError::from)?;

    Ok(HttpResponse::Ok().json(rows))
}

/// Get scheduled date by id
#[utoipa::path(
    get,
    path = "/api/scheduled-dates/{id}",
    params(("id", Path, description = "Scheduled date id")),
    responses(
        (status = 200, description = "Scheduled date found", body = ScheduledDate),
        (status = 404, description = "Scheduled date not found")
    ),
    tag = "Scheduled dates",
    security(("bearer_auth" = []))
)]
pub async fn get_scheduled_date(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let date = sqlx::query_as::<_, ScheduledDate>(
        "SELECT id, calendar_date, sub_warehouse_id, active FROM scheduled_dates WHERE id = ?",
    )
    .bind(path.into_inner())
    .fetch_optional(pool.get_ref())
    .await
    .map_err(AppError::from)?
    .ok_or(AppError::NotFound("Scheduled date"))?;

    Ok(HttpResponse::Ok().json(date))
}

/// Update scheduled date
#[utoipa::path(
    put,
    path = "/api/scheduled-dates/{id}",
    params(("id", Path, description = "Scheduled date id")),
    request_body = UpdateScheduledDate,
    responses(
        (status = 200, description = "Scheduled date updated"),
        (status = 404, description = "Scheduled date not found"),
        (status = 409, description = "Date already scheduled for the sub-warehouse")
    ),
    tag = "Scheduled dates",
    security(("bearer_auth" = []))
)]
pub async fn update_scheduled_date(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateScheduledDate>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;
    let id = path.into_inner();

    let result = sqlx::query(
        "UPDATE scheduled_dates SET calendar_date = ?, sub_warehouse_id = ?, active = ? WHERE id = ?",
    )
    .bind(payload.calendar_date)
    .bind(payload.sub_warehouse_id)
    .bind(payload.active)
    .bind(id)
    .execute(pool.get_ref())
    .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => Err(AppError::NotFound("Scheduled date").into()),
        Ok(_) => Ok(HttpResponse::Ok().json(json!({ "message": "Scheduled date updated" }))),
        Err(e) if is_duplicate_key(&e) => Err(AppError::Conflict(
            "Date already scheduled for this sub-warehouse".into(),
        )
        .into()),
        Err(e) => Err(AppError::from(e).into()),
    }
}

/// Delete scheduled date
///
/// Removes the attendance and rotation rows of the same sub-warehouse and day.
#[utoipa::path(
    delete,
    path = "/api/scheduled-dates/{id}",
    params(("id", Path, description = "Scheduled date id")),
    responses(
        (status = 200, description = "Scheduled date deleted"),
        (status = 403, description = "Sub-warehouse not granted"),
        (status = 404, description = "Scheduled date not found")
    ),
    tag = "Scheduled dates",
    security(("bearer_auth" = []))
)]
pub async fn delete_scheduled_date(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    scheduler: web::Data<BulkScheduler>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;
    let id = path.into_inner();

    let scope = allowed_sub_warehouses(pool.get_ref(), &user).await?;
    if scheduler.delete_scheduled_date(id, &scope).await? == 0 {
        return Err(AppError::NotFound("Scheduled date").into());
    }

    info!(id, user_id = user.user_id, "Scheduled date deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Scheduled date deleted" })))
}
