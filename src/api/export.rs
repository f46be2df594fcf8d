use actix_web::{
    HttpResponse, Responder,
    http::header::{ContentDisposition, DispositionParam, DispositionType},
    web,
};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::info;
use utoipa::IntoParams;

use crate::{
    api::sub_warehouse::fetch_info,
    auth::{access::ensure_sub_warehouse_access, auth::AuthUser},
    error::AppError,
    export::{
        DateSheetRow, SelectedDatesRequest, XLSX_CONTENT_TYPE, selected_dates_workbook,
        worker_range_workbook,
    },
    model::attendance::WorkerAttendanceRow,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct DateRangeQuery {
    #[param(value_type = String, format = "date")]
    pub start: NaiveDate,
    #[param(value_type = String, format = "date")]
    pub end: NaiveDate,
}

fn attachment(bytes: Vec<u8>, filename: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(XLSX_CONTENT_TYPE)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .body(bytes)
}

fn selected_dates_query(req: &SelectedDatesRequest) -> QueryBuilder<'static, MySql> {
    let mut builder = QueryBuilder::<MySql>::new(
        r#"
        SELECT
            sd.calendar_date,
            w.name AS worker_name,
            w.national_id,
            a.entry_time,
            a.exit_time,
            a.note
        FROM scheduled_dates sd
        LEFT JOIN attendance a ON a.scheduled_date_id = sd.id
        LEFT JOIN workers w ON a.worker_id = w.id
        WHERE sd.id IN ("#,
    );
    let mut ids = builder.separated(", ");
    for id in &req.scheduled_date_ids {
        ids.push_bind(*id);
    }
    builder.push(")");
    if let Some(sub_warehouse_id) = req.sub_warehouse_id {
        builder.push(" AND sd.sub_warehouse_id = ").push_bind(sub_warehouse_id);
    }
    builder.push(" ORDER BY sd.calendar_date ASC, w.name ASC");
    builder
}

/// Attendance workbook of one worker over a date range
#[utoipa::path(
    get,
    path = "/api/export/workers/{id}",
    params(("id", Path, description = "Worker id"), DateRangeQuery),
    responses(
        (status = 200, description = "Excel workbook", content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        (status = 400, description = "Start after end"),
        (status = 404, description = "No attendance in range")
    ),
    tag = "Export",
    security(("bearer_auth" = []))
)]
pub async fn export_worker_range(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    query: web::Query<DateRangeQuery>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;
    let worker_id = path.into_inner();
    if query.start > query.end {
        return Err(AppError::Validation("start must not be after end".into()).into());
    }

    let rows = sqlx::query_as::<_, WorkerAttendanceRow>(
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
        WHERE w.id = ? AND sd.calendar_date BETWEEN ? AND ?
        ORDER BY sd.calendar_date ASC
        "#,
    )
    .bind(worker_id)
    .bind(query.start)
    .bind(query.end)
    .fetch_all(pool.get_ref())
    .await
    .map_err(AppError::from)?;

    if rows.is_empty() {
        return Err(AppError::NotFound("Attendance in the given range").into());
    }

    let bytes = worker_range_workbook(&rows)?;
    info!(worker_id, rows = rows.len(), "Worker workbook exported");

    Ok(attachment(
        bytes,
        format!("attendance_{}_{}_{}.xlsx", rows[0].national_id, query.start, query.end),
    ))
}

/// Attendance workbook of selected scheduled dates
#[utoipa::path(
    post,
    path = "/api/export/scheduled-dates",
    request_body = SelectedDatesRequest,
    responses(
        (status = 200, description = "Excel workbook", content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        (status = 400, description = "No dates selected"),
        (status = 404, description = "None of the dates exist")
    ),
    tag = "Export",
    security(("bearer_auth" = []))
)]
pub async fn export_selected_dates(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<SelectedDatesRequest>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;
    if payload.scheduled_date_ids.is_empty() {
        return Err(AppError::Validation("Select at least one scheduled date".into()).into());
    }

    let info = match payload.sub_warehouse_id {
        Some(id) => {
            ensure_sub_warehouse_access(pool.get_ref(), &user, id).await?;
            fetch_info(pool.get_ref(), id).await?
        }
        None => None,
    };

    let rows: Vec<DateSheetRow> = selected_dates_query(&payload)
        .build_query_as::<DateSheetRow>()
        .fetch_all(pool.get_ref())
        .await
        .map_err(AppError::from)?;

    if rows.is_empty() {
        return Err(AppError::NotFound("Scheduled dates").into());
    }

    let bytes = selected_dates_workbook(info.as_ref(), &rows)?;
    info!(
        dates = payload.scheduled_date_ids.len(),
        rows = rows.len(),
        "Selected dates workbook exported"
    );

    let filename = match &info {
        Some(info) => format!("attendance_{}.xlsx", info.sub_warehouse.replace(' ', "_")),
        None => "attendance_selected_dates.xlsx".to_string(),
    };
    Ok(attachment(bytes, filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selected_dates_query_binds_every_id() {
        let req = SelectedDatesRequest {
            scheduled_date_ids: vec![3, 5, 8],
            sub_warehouse_id: Some(4),
        };
        let builder = selected_dates_query(&req);
        let sql = builder.sql();
        assert!(sql.contains("sd.id IN (?, ?, ?)"));
        assert!(sql.contains("AND sd.sub_warehouse_id = ?"));
    }

    #[test]
    fn attachment_sets_headers() {
        let resp = attachment(vec![1, 2, 3], "a.xlsx".into());
        let headers = resp.headers();
        assert_eq!(headers.get("content-type").unwrap(), XLSX_CONTENT_TYPE);
        assert!(
            headers
                .get("content-disposition")
                .unwrap()
                .to_str()
                .unwrap()
                .contains("a.xlsx")
        );
    }
}
