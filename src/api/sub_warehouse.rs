use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveTime;
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::AppError,
    model::warehouse::{SubWarehouse, SubWarehouseInfo},
    model::attendance::parse_optional_time,
    utils::{db_utils::is_foreign_key_violation, time_of_day::time_to_minutes},
};

const COLUMNS: &str = "id, name, warehouse_id, break_duration, shift_duration";

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubWarehouseReq {
    #[schema(example = "Cold storage A1")]
    pub name: String,
    #[schema(example = 1)]
    pub warehouse_id: u64,
    #[schema(example = "01:00")]
    pub break_duration: Option<String>,
    #[schema(example = "08:00")]
    pub shift_duration: Option<String>,
}

struct ValidSubWarehouse<'a> {
    name: &'a str,
    break_duration: Option<NaiveTime>,
    shift_duration: Option<NaiveTime>,
}

impl SubWarehouseReq {
    fn validate(&self) -> Result<ValidSubWarehouse<'_>, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Sub-warehouse name is required".into()));
        }
        let duration = |v: &Option<String>| -> Result<Option<NaiveTime>, AppError> {
            Ok(parse_optional_time(v.as_deref())?.map(|t| t.to_naive_time()))
        };
        let break_duration = duration(&self.break_duration)?;
        let shift_duration = duration(&self.shift_duration)?;

        let minutes = |v: &Option<String>| v.as_deref().and_then(time_to_minutes);
        if matches!(
            (minutes(&self.break_duration), minutes(&self.shift_duration)),
            (Some(brk), Some(shift)) if brk >= shift
        ) {
            return Err(AppError::Validation("Break must be shorter than the shift".into()));
        }

        Ok(ValidSubWarehouse {
            name,
            break_duration,
            shift_duration,
        })
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SubWarehouseQuery {
    /// Only sub-warehouses of this warehouse.
    pub warehouse_id: Option<u64>,
}

fn write_error(e: sqlx::Error) -> AppError {
    if is_foreign_key_violation(&e) {
        AppError::Validation("Unknown warehouse".into())
    } else {
        AppError::from(e)
    }
}

/// Create sub-warehouse
#[utoipa::path(
    post,
    path = "/api/sub-warehouses",
    request_body = SubWarehouseReq,
    responses(
        (status = 201, description = "Sub-warehouse created", body = SubWarehouse),
        (status = 400, description = "Missing name, bad duration or unknown warehouse")
    ),
    tag = "Sub-warehouses",
    security(("bearer_auth" = []))
)]
pub async fn create_sub_warehouse(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<SubWarehouseReq>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;
    let valid = payload.validate()?;

    let result = sqlx::query(
        "INSERT INTO sub_warehouses (name, warehouse_id, break_duration, shift_duration) VALUES (?, ?, ?, ?)",
    )
    .bind(valid.name)
    .bind(payload.warehouse_id)
    .bind(valid.break_duration)
    .bind(valid.shift_duration)
    .execute(pool.get_ref())
    .await
    .map_err(write_error)?;

    Ok(HttpResponse::Created().json(SubWarehouse {
        id: result.last_insert_id(),
        name: valid.name.to_string(),
        warehouse_id: payload.warehouse_id,
        break_duration: valid.break_duration,
        shift_duration: valid.shift_duration,
    }))
}

/// List sub-warehouses
#[utoipa::path(
    get,
    path = "/api/sub-warehouses",
    params(SubWarehouseQuery),
    responses((status = 200, description = "Sub-warehouses", body = [SubWarehouse])),
    tag = "Sub-warehouses",
    security(("bearer_auth" = []))
)]
pub async fn list_sub_warehouses(
    pool: web::Data<MySqlPool>,
    query: web::Query<SubWarehouseQuery>,
) -> actix_web::Result<impl Responder> {
    let rows = match query.warehouse_id {
        Some(warehouse_id) => {
            sqlx::query_as::<_, SubWarehouse>(&format!(
                "SELECT {} FROM sub_warehouses WHERE warehouse_id = ? ORDER BY id",
                COLUMNS
            ))
            .bind(warehouse_id)
            .fetch_all(pool.get_ref())
            .await
        }
        None => {
            sqlx::query_as::<_, SubWarehouse>(&format!(
                "SELECT {} FROM sub_warehouses ORDER BY id",
                COLUMNS
            ))
            .fetch_all(pool.get_ref())
            .await
        }
    }
    .map_err(AppError::from)?;

    Ok(HttpResponse::Ok().json(rows))
}

/// Sub-warehouses of a warehouse assigned to the caller
#[utoipa::path(
    get,
    path = "/api/sub-warehouses/assigned/{warehouse_id}",
    params(("warehouse_id", Path, description = "Warehouse id")),
    responses((status = 200, description = "Assigned sub-warehouses", body = [SubWarehouse])),
    tag = "Sub-warehouses",
    security(("bearer_auth" = []))
)]
pub async fn list_assigned_sub_warehouses(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;
    let warehouse_id = path.into_inner();

    let rows = if user.is_admin() {
        sqlx::query_as::<_, SubWarehouse>(&format!(
            "SELECT {} FROM sub_warehouses WHERE warehouse_id = ? ORDER BY name",
            COLUMNS
        ))
        .bind(warehouse_id)
        .fetch_all(pool.get_ref())
        .await
    } else {
        sqlx::query_as::<_, SubWarehouse>(
            r#"
            SELECT sw.id, sw.name, sw.warehouse_id, sw.break_duration, sw.shift_duration
            FROM sub_warehouses sw
            INNER JOIN access_grants g ON g.sub_warehouse_id = sw.id
            WHERE g.user_id = ? AND sw.warehouse_id = ?
            ORDER BY sw.name
            "#,
        )
        .bind(user.user_id)
        .bind(warehouse_id)
        .fetch_all(pool.get_ref())
        .await
    }
    .map_err(AppError::from)?;

    Ok(HttpResponse::Ok().json(rows))
}

/// Get sub-warehouse by id
#[utoipa::path(
    get,
    path = "/api/sub-warehouses/{id}",
    params(("id", Path, description = "Sub-warehouse id")),
    responses(
        (status = 200, description = "Sub-warehouse found", body = SubWarehouse),
        (status = 404, description = "Sub-warehouse not found")
    ),
    tag = "Sub-warehouses",
    security(("bearer_auth" = []))
)]
pub async fn get_sub_warehouse(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let row = sqlx::query_as::<_, SubWarehouse>(&format!(
        "SELECT {} FROM sub_warehouses WHERE id = ?",
        COLUMNS
    ))
    .bind(path.into_inner())
    .fetch_optional(pool.get_ref())
    .await
    .map_err(AppError::from)?
    .ok_or(AppError::NotFound("Sub-warehouse"))?;

    Ok(HttpResponse::Ok().json(row))
}

pub async fn fetch_info(pool: &MySqlPool, id: u64) -> Result<Option<SubWarehouseInfo>, AppError> {
    Ok(sqlx::query_as::<_, SubWarehouseInfo>(
        r#"
        SELECT sw.name AS sub_warehouse, wh.name AS warehouse, sw.break_duration, sw.shift_duration
        FROM sub_warehouses sw
        INNER JOIN warehouses wh ON sw.warehouse_id = wh.id
        WHERE sw.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?)
}

/// Sub-warehouse with its warehouse name and shift settings
#[utoipa::path(
    get,
    path = "/api/sub-warehouses/{id}/info",
    params(("id", Path, description = "Sub-warehouse id")),
    responses(
        (status = 200, description = "Sub-warehouse info", body = SubWarehouseInfo),
        (status = 404, description = "Sub-warehouse not found")
    ),
    tag = "Sub-warehouses",
    security(("bearer_auth" = []))
)]
pub async fn sub_warehouse_info(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let info = fetch_info(pool.get_ref(), path.into_inner())
        .await?
        .ok_or(AppError::NotFound("Sub-warehouse"))?;
    Ok(HttpResponse::Ok().json(info))
}

/// Update sub-warehouse
#[utoipa::path(
    put,
    path = "/api/sub-warehouses/{id}",
    params(("id", Path, description = "Sub-warehouse id")),
    request_body = SubWarehouseReq,
    responses(
        (status = 200, description = "Sub-warehouse updated"),
        (status = 404, description = "Sub-warehouse not found")
    ),
    tag = "Sub-warehouses",
    security(("bearer_auth" = []))
)]
pub async fn update_sub_warehouse(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<SubWarehouseReq>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;
    let valid = payload.validate()?;

    let affected = sqlx::query(
        "UPDATE sub_warehouses SET name = ?, warehouse_id = ?, break_duration = ?, shift_duration = ? WHERE id = ?",
    )
    .bind(valid.name)
    .bind(payload.warehouse_id)
    .bind(valid.break_duration)
    .bind(valid.shift_duration)
    .bind(path.into_inner())
    .execute(pool.get_ref())
    .await
    .map_err(write_error)?
    .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound("Sub-warehouse").into());
    }
    Ok(HttpResponse::Ok().json(json!({ "message": "Sub-warehouse updated" })))
}

/// Delete sub-warehouse
#[utoipa::path(
    delete,
    path = "/api/sub-warehouses/{id}",
    params(("id", Path, description = "Sub-warehouse id")),
    responses(
        (status = 200, description = "Sub-warehouse deleted"),
        (status = 404, description = "Sub-warehouse not found"),
        (status = 409, description = "Sub-warehouse still referenced")
    ),
    tag = "Sub-warehouses",
    security(("bearer_auth" = []))
)]
pub async fn delete_sub_warehouse(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;

    let result = sqlx::query("DELETE FROM sub_warehouses WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => Err(AppError::NotFound("Sub-warehouse").into()),
        Ok(_) => Ok(HttpResponse::Ok().json(json!({ "message": "Sub-warehouse deleted" }))),
        Err(e) if is_foreign_key_violation(&e) => Err(AppError::Conflict(
            "Sub-warehouse still has workers or scheduled dates".into(),
        )
        .into()),
        Err(e) => Err(AppError::from(e).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(name: &str, brk: Option<&str>) -> SubWarehouseReq {
        SubWarehouseReq {
            name: name.into(),
            warehouse_id: 1,
            break_duration: brk.map(String::from),
            shift_duration: Some("08:00".into()),
        }
    }

    #[test]
    fn durations_are_parsed_as_times() {
        let r = req(" Dock ", Some("00:45"));
        let v = r.validate().unwrap();
        assert_eq!(v.name, "Dock");
        assert_eq!(v.break_duration, NaiveTime::from_hms_opt(0, 45, 0));
        assert_eq!(v.shift_duration, NaiveTime::from_hms_opt(8, 0, 0));
    }

    #[test]
    fn blank_name_or_bad_duration_is_rejected() {
        assert!(req("  ", None).validate().is_err());
        assert!(req("Dock", Some("1h")).validate().is_err());
    }

    #[test]
    fn break_must_fit_inside_the_shift() {
        assert!(req("Dock", Some("08:00")).validate().is_err());
        assert!(req("Dock", Some("09:30")).validate().is_err());
        assert!(req("Dock", Some("07:59")).validate().is_ok());
        assert!(req("Dock", Some("")).validate().is_ok());
    }
}
