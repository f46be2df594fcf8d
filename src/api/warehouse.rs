use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{auth::auth::AuthUser, error::AppError, model::warehouse::Warehouse};

#[derive(Debug, Deserialize, ToSchema)]
pub struct WarehouseReq {
    #[schema(example = "Central Warehouse")]
    pub name: String,
    #[schema(example = "Main distribution centre")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct WarehouseRef {
    pub id: u64,
    pub name: String,
}

impl WarehouseReq {
    fn validated_name(&self) -> Result<&str, AppError> {
        match self.name.trim() {
            "" => Err(AppError::Validation("Warehouse name is required".into())),
            name => Ok(name),
        }
    }
}

/// Reason a warehouse may not be removed yet, if any.
async fn deletion_blocker(pool: &MySqlPool, id: u64) -> Result<Option<&'static str>, AppError> {
    let sub_warehouses = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sub_warehouses WHERE warehouse_id = ?",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;
    if sub_warehouses > 0 {
        return Ok(Some("Warehouse still has sub-warehouses"));
    }

    let attendance = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM attendance a
        INNER JOIN sub_warehouses sw ON a.sub_warehouse_id = sw.id
        WHERE sw.warehouse_id = ?
        "#,
    )
    .bind(id)
    .fetch_one(pool)
    .await?;
    if attendance > 0 {
        return Ok(Some("Warehouse still has attendance records"));
    }

    Ok(None)
}

/// Create warehouse
#[utoipa::path(
    post,
    path = "/api/warehouses",
    request_body = WarehouseReq,
    responses((status = 201, description = "Warehouse created", body = Warehouse)),
    tag = "Warehouses",
    security(("bearer_auth" = []))
)]
pub async fn create_warehouse(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<WarehouseReq>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;
    let name = payload.validated_name()?;

    let result = sqlx::query("INSERT INTO warehouses (name, description) VALUES (?, ?)")
        .bind(name)
        .bind(payload.description.as_deref())
        .execute(pool.get_ref())
        .await
        .map_err(AppError::from)?;

    Ok(HttpResponse::Created().json(Warehouse {
        id: result.last_insert_id(),
        name: name.to_string(),
        description: payload.description.clone(),
    }))
}

/// List warehouses
#[utoipa::path(
    get,
    path = "/api/warehouses",
    responses((status = 200, description = "All warehouses", body = [Warehouse])),
    tag = "Warehouses",
    security(("bearer_auth" = []))
)]
pub async fn list_warehouses(pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    let rows = sqlx::query_as::<_, Warehouse>("SELECT id, name, description FROM warehouses ORDER BY id")
        .fetch_all(pool.get_ref())
        .await
        .map_err(AppError::from)?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Warehouses assigned to the caller
///
/// Admins get every warehouse; coordinators get those holding at least one
/// granted sub-warehouse.
#[utoipa::path(
    get,
    path = "/api/warehouses/assigned",
    responses((status = 200, description = "Assigned warehouses", body = [WarehouseRef])),
    tag = "Warehouses",
    security(("bearer_auth" = []))
)]
pub async fn list_assigned_warehouses(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;

    let rows = if user.is_admin() {
        sqlx::query_as::<_, WarehouseRef>("SELECT id, name FROM warehouses ORDER BY name")
            .fetch_all(pool.get_ref())
            .await
    } else {
        sqlx::query_as::<_, WarehouseRef>(
            r#"
            SELECT DISTINCT wh.id, wh.name
            FROM warehouses wh
            INNER JOIN sub_warehouses sw ON sw.warehouse_id = wh.id
            INNER JOIN access_grants g ON g.sub_warehouse_id = sw.id
            WHERE g.user_id = ?
            ORDER BY wh.name
            "#,
        )
        .bind(user.user_id)
        .fetch_all(pool.get_ref())
        .await
    }
    .map_err(AppError::from)?;

    Ok(HttpResponse::Ok().json(rows))
}

/// Get warehouse by id
#[utoipa::path(
    get,
    path = "/api/warehouses/{id}",
    params(("id", Path, description = "Warehouse id")),
    responses(
        (status = 200, description = "Warehouse found", body = Warehouse),
        (status = 404, description = "Warehouse not found")
    ),
    tag = "Warehouses",
    security(("bearer_auth" = []))
)]
pub async fn get_warehouse(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let warehouse = sqlx::query_as::<_, Warehouse>(
        "SELECT id, name, description FROM warehouses WHERE id = ?",
    )
    .bind(path.into_inner())
    .fetch_optional(pool.get_ref())
    .await
    .map_err(AppError::from)?
    .ok_or(AppError::NotFound("Warehouse"))?;

    Ok(HttpResponse::Ok().json(warehouse))
}

/// Update warehouse
#[utoipa::path(
    put,
    path = "/api/warehouses/{id}",
    params(("id", Path, description = "Warehouse id")),
    request_body = WarehouseReq,
    responses(
        (status = 200, description = "Warehouse updated"),
        (status = 404, description = "Warehouse not found")
    ),
    tag = "Warehouses",
    security(("bearer_auth" = []))
)]
pub async fn update_warehouse(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<WarehouseReq>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;
    let name = payload.validated_name()?;

    let affected = sqlx::query("UPDATE warehouses SET name = ?, description = ? WHERE id = ?")
        .bind(name)
        .bind(payload.description.as_deref())
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await
        .map_err(AppError::from)?
        .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound("Warehouse").into());
    }
    Ok(HttpResponse::Ok().json(json!({ "message": "Warehouse updated" })))
}

/// Delete warehouse
///
/// Refused while the warehouse has sub-warehouses or attendance.
#[utoipa::path(
    delete,
    path = "/api/warehouses/{id}",
    params(("id", Path, description = "Warehouse id")),
    responses(
        (status = 200, description = "Warehouse deleted"),
        (status = 404, description = "Warehouse not found"),
        (status = 409, description = "Warehouse still in use")
    ),
    tag = "Warehouses",
    security(("bearer_auth" = []))
)]
pub async fn delete_warehouse(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;
    let id = path.into_inner();

    if let Some(reason) = deletion_blocker(pool.get_ref(), id).await? {
        warn!(warehouse_id = id, reason, "Warehouse delete refused");
        return Err(AppError::Conflict(reason.into()).into());
    }

    let affected = sqlx::query("DELETE FROM warehouses WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(AppError::from)?
        .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound("Warehouse").into());
    }

    info!(warehouse_id = id, "Warehouse deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Warehouse deleted" })))
}
