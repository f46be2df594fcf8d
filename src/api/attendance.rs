use std::time::Instant;

use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    attendance::AttendanceService,
    auth::{
        access::{Scope, allowed_sub_warehouses, ensure_sub_warehouse_access},
        auth::AuthUser,
    },
    error::AppError,
    model::attendance::{
        AttendanceDraft, AttendanceListRow, AttendancePatch, AttendanceRecord, NewAttendance,
        parse_optional_time,
    },
    notifications::{AttendanceEvent, ChangeKind, NotificationHub},
    utils::serde_ext::double_option,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct AttendanceQuery {
    pub scheduled_date_id: Option<u64>,
    pub sub_warehouse_id: Option<u64>,
    /// Calendar date of the scheduled date, `YYYY-MM-DD`.
    #[param(value_type = Option<String>, format = "date")]
    pub date: Option<chrono::NaiveDate>,
}

/// Fields that may change after creation; `null` clears a value.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateAttendance {
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, example = "08:05")]
    pub entry_time: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, example = "17:10")]
    pub exit_time: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, example = "Late bus")]
    pub note: Option<Option<String>>,
}

impl UpdateAttendance {
    pub fn into_patch(self) -> Result<AttendancePatch, AppError> {
        let time = |v: Option<Option<String>>| -> Result<_, AppError> {
            v.map(|inner| parse_optional_time(inner.as_deref())).transpose()
        };
        Ok(AttendancePatch {
            entry_time: time(self.entry_time)?,
            exit_time: time(self.exit_time)?,
            note: self.note,
        })
    }
}

fn push_scope(builder: &mut QueryBuilder<'_, MySql>, scope: &Scope) {
    if let Scope::Only(ids) = scope {
        if ids.is_empty() {
            builder.push(" AND 1 = 0");
            return;
        }
        builder.push(" AND a.sub_warehouse_id IN (");
        let mut list = builder.separated(", ");
        for id in ids {
            list.push_bind(*id);
        }
        list.push_unseparated(")");
    }
}

/// List attendance
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Attendance rows, newest first", body = [AttendanceListRow]),
        (status = 403, description = "Caller has no sub-warehouse access")
    ),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn list_attendance(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceQuery>,
) -> actix_web::Result<impl Responder> {
    let scope = allowed_sub_warehouses(pool.get_ref(), &user).await?;
    let started = Instant::now();

    let mut builder: QueryBuilder<MySql> = QueryBuilder::new(
        r#"
        SELECT
            a.id, a.worker_id, a.sub_warehouse_id, a.entry_time, a.exit_time, a.note,
            a.recorded_by, a.scheduled_date_id,
            w.name AS worker_name,
            w.national_id AS worker_national_id,
            u.name AS recorded_by_name,
            sw.name AS sub_warehouse_name,
            wh.name AS warehouse_name
        FROM attendance a
        INNER JOIN workers w ON a.worker_id = w.id
        INNER JOIN users u ON a.recorded_by = u.id
        INNER JOIN sub_warehouses sw ON a.sub_warehouse_id = sw.id
        INNER JOIN warehouses wh ON sw.warehouse_id = wh.id
        INNER JOIN scheduled_dates sd ON a.scheduled_date_id = sd.id
        WHERE 1 = 1
        "#,
    );

    if let Some(id) = query.scheduled_date_id {
        builder.push(" AND a.scheduled_date_id = ").push_bind(id);
    }
    if let Some(id) = query.sub_warehouse_id {
        builder.push(" AND a.sub_warehouse_id = ").push_bind(id);
    }
    if let Some(date) = query.date {
        builder.push(" AND sd.calendar_date = ").push_bind(date);
    }
    push_scope(&mut builder, &scope);
    builder.push(" ORDER BY a.id DESC");

    let rows = builder
        .build_query_as::<AttendanceListRow>()
        .fetch_all(pool.get_ref())
        .await
        .map_err(AppError::from)?;

    let elapsed = started.elapsed();
    debug!(rows = rows.len(), elapsed_ms = elapsed.as_millis() as u64, "Attendance listed");
    if elapsed.as_secs() >= 1 {
        warn!(elapsed_ms = elapsed.as_millis() as u64, "Slow attendance listing");
    }

    Ok(HttpResponse::Ok().json(rows))
}

/// Get attendance by id
#[utoipa::path(
    get,
    path = "/api/attendance/{id}",
    params(("id", Path, description = "Attendance id")),
    responses(
        (status = 200, description = "Attendance found", body = AttendanceRecord),
        (status = 404, description = "Attendance not found")
    ),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn get_attendance(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();
    let record = sqlx::query_as::<_, AttendanceRecord>(
        r#"
        SELECT a.id, a.worker_id, a.sub_warehouse_id, a.entry_time, a.exit_time, a.note,
               a.recorded_by, a.scheduled_date_id, sd.calendar_date AS scheduled_date
        FROM attendance a
        LEFT JOIN scheduled_dates sd ON sd.id = a.scheduled_date_id
        WHERE a.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(AppError::from)?
    .ok_or(AppError::NotFound("Attendance"))?;

    ensure_sub_warehouse_access(pool.get_ref(), &user, record.sub_warehouse_id).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Create attendance
///
/// Creating a row that already exists for the worker and scheduled date
/// answers 200 with the stored id instead of failing.
#[utoipa::path(
    post,
    path = "/api/attendance",
    request_body = AttendanceDraft,
    responses(
        (status = 201, description = "Attendance recorded", body = Object, example = json!({
            "id": 501, "already_existed": false, "message": "Attendance recorded"
        })),
        (status = 200, description = "Attendance already recorded", body = Object, example = json!({
            "id": 501, "already_existed": true, "message": "Attendance already recorded"
        })),
        (status = 400, description = "Missing field or malformed time")
    ),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn create_attendance(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    service: web::Data<AttendanceService>,
    hub: web::Data<NotificationHub>,
    payload: web::Json<AttendanceDraft>,
) -> actix_web::Result<impl Responder> {
    let mut draft = payload.into_inner();
    // the recorder defaults to the caller
    draft.recorded_by = draft.recorded_by.or(Some(user.user_id));
    let record: NewAttendance = draft.validate()?;

    ensure_sub_warehouse_access(pool.get_ref(), &user, record.sub_warehouse_id).await?;

    let sub_warehouse_id = record.sub_warehouse_id;
    let outcome = service.create(record).await?;

    if outcome.already_existed {
        return Ok(HttpResponse::Ok().json(json!({
            "id": outcome.id,
            "already_existed": true,
            "message": "Attendance already recorded"
        })));
    }

    hub.publish(AttendanceEvent {
        kind: ChangeKind::Created,
        attendance_id: outcome.id,
        sub_warehouse_id: Some(sub_warehouse_id),
        user_id: user.user_id,
    });

    Ok(HttpResponse::Created().json(json!({
        "id": outcome.id,
        "already_existed": false,
        "message": "Attendance recorded"
    })))
}

/// Update attendance
#[utoipa::path(
    put,
    path = "/api/attendance/{id}",
    params(("id", Path, description = "Attendance id")),
    request_body = UpdateAttendance,
    responses(
        (status = 200, description = "Attendance updated"),
        (status = 400, description = "No updatable field or malformed time"),
        (status = 403, description = "Sub-warehouse not granted"),
        (status = 404, description = "Attendance not found")
    ),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn update_attendance(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    service: web::Data<AttendanceService>,
    hub: web::Data<NotificationHub>,
    path: web::Path<u64>,
    payload: web::Json<UpdateAttendance>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;
    let id = path.into_inner();
    let patch = payload.into_inner().into_patch()?;

    if patch.is_empty() {
        return Err(AppError::Validation("No updatable fields provided".into()).into());
    }

    let scope = allowed_sub_warehouses(pool.get_ref(), &user).await?;
    let record = service.find_in_scope(id, &scope).await?;

    if service.update(id, &patch).await? == 0 {
        return Err(AppError::NotFound("Attendance").into());
    }

    hub.publish(AttendanceEvent {
        kind: ChangeKind::Updated,
        attendance_id: id,
        sub_warehouse_id: Some(record.sub_warehouse_id),
        user_id: user.user_id,
    });

    Ok(HttpResponse::Ok().json(json!({ "message": "Attendance updated" })))
}

/// Delete attendance
///
/// Also removes the rotation that brought the worker in for that day.
#[utoipa::path(
    delete,
    path = "/api/attendance/{id}",
    params(("id", Path, description = "Attendance id")),
    responses(
        (status = 200, description = "Attendance deleted"),
        (status = 403, description = "Sub-warehouse not granted"),
        (status = 404, description = "Attendance not found")
    ),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn delete_attendance(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    service: web::Data<AttendanceService>,
    hub: web::Data<NotificationHub>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;
    let id = path.into_inner();

    let scope = allowed_sub_warehouses(pool.get_ref(), &user).await?;
    let record = service.find_in_scope(id, &scope).await?;

    if service.delete(id).await? == 0 {
        return Err(AppError::NotFound("Attendance").into());
    }

    info!(id, user_id = user.user_id, "Attendance deleted");
    hub.publish(AttendanceEvent {
        kind: ChangeKind::Deleted,
        attendance_id: id,
        sub_warehouse_id: Some(record.sub_warehouse_id),
        user_id: user.user_id,
    });

    Ok(HttpResponse::Ok().json(json!({ "message": "Attendance deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_payload_distinguishes_missing_from_null() {
        let body: UpdateAttendance =
            serde_json::from_str(r#"{"entry_time": "08:05", "note": null}"#).unwrap();
        let patch = body.into_patch().unwrap();

        assert_eq!(patch.entry_time.unwrap().unwrap().to_string(), "08:05:00");
        assert_eq!(patch.exit_time, None);
        assert_eq!(patch.note, Some(None));
    }

    #[test]
    fn blank_time_clears_the_column() {
        let body: UpdateAttendance = serde_json::from_str(r#"{"exit_time": ""}"#).unwrap();
        assert_eq!(body.into_patch().unwrap().exit_time, Some(None));
    }

    #[test]
    fn malformed_time_is_a_validation_error() {
        let body: UpdateAttendance = serde_json::from_str(r#"{"exit_time": "7pm"}"#).unwrap();
        assert!(matches!(body.into_patch(), Err(AppError::Validation(_))));
    }

    #[test]
    fn coordinator_scope_is_pushed_as_in_list() {
        let mut builder: QueryBuilder<MySql> = QueryBuilder::new("SELECT 1 FROM attendance a WHERE 1 = 1");
        push_scope(&mut builder, &Scope::Only(vec![3, 4]));
        assert_eq!(
            builder.sql(),
            "SELECT 1 FROM attendance a WHERE 1 = 1 AND a.sub_warehouse_id IN (?, ?)"
        );

        let mut empty: QueryBuilder<MySql> = QueryBuilder::new("SELECT 1 FROM attendance a WHERE 1 = 1");
        push_scope(&mut empty, &Scope::Only(Vec::new()));
        assert!(empty.sql().ends_with("AND 1 = 0"));
    }
}
