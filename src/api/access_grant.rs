//! Coordinator access grants on sub-warehouses.

use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    auth::{
        access::allowed_sub_warehouses,
        auth::AuthUser,
    },
    error::AppError,
    model::access_grant::{AccessGrant, AccessGrantDetail},
    utils::db_utils::{is_duplicate_key, is_foreign_key_violation},
};

const DETAIL_SELECT: &str = r#"
    SELECT
        g.id, g.user_id, g.sub_warehouse_id, g.entry_limit,
        sw.name AS sub_warehouse_name,
        wh.name AS warehouse_name
    FROM access_grants g
    LEFT JOIN sub_warehouses sw ON g.sub_warehouse_id = sw.id
    LEFT JOIN warehouses wh ON sw.warehouse_id = wh.id
"#;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AccessGrantReq {
    #[schema(example = 3)]
    pub user_id: u64,
    #[schema(example = 4)]
    pub sub_warehouse_id: u64,
    #[schema(example = 20)]
    pub entry_limit: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccessCheck {
    pub sub_warehouse_id: u64,
    pub allowed: bool,
}

fn write_error(e: sqlx::Error) -> AppError {
    if is_duplicate_key(&e) {
        AppError::Conflict("User already has access to this sub-warehouse".into())
    } else if is_foreign_key_violation(&e) {
        AppError::Validation("Unknown user or sub-warehouse".into())
    } else {
        AppError::from(e)
    }
}

/// Grant a user access to a sub-warehouse
#[utoipa::path(
    post,
    path = "/api/access-grants",
    request_body = AccessGrantReq,
    responses(
        (status = 201, description = "Access granted", body = AccessGrant),
        (status = 409, description = "Grant already exists")
    ),
    tag = "Access grants",
    security(("bearer_auth" = []))
)]
pub async fn create_grant(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<AccessGrantReq>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;

    let result = sqlx::query(
        "INSERT INTO access_grants (user_id, sub_warehouse_id, entry_limit) VALUES (?, ?, ?)",
    )
    .bind(payload.user_id)
    .bind(payload.sub_warehouse_id)
    .bind(payload.entry_limit)
    .execute(pool.get_ref())
    .await
    .map_err(write_error)?;

    let grant = AccessGrant {
        id: result.last_insert_id(),
        user_id: payload.user_id,
        sub_warehouse_id: payload.sub_warehouse_id,
        entry_limit: payload.entry_limit,
    };
    info!(
        grant_id = grant.id,
        user_id = grant.user_id,
        sub_warehouse_id = grant.sub_warehouse_id,
        "Access granted"
    );

    Ok(HttpResponse::Created().json(grant))
}

/// List every grant
#[utoipa::path(
    get,
    path = "/api/access-grants",
    responses((status = 200, description = "Grants with names", body = [AccessGrantDetail])),
    tag = "Access grants",
    security(("bearer_auth" = []))
)]
pub async fn list_grants(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;

    let rows =
        sqlx::query_as::<_, AccessGrantDetail>(&format!("{} ORDER BY g.user_id, g.id", DETAIL_SELECT))
            .fetch_all(pool.get_ref())
            .await
            .map_err(AppError::from)?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Grants of the caller
#[utoipa::path(
    get,
    path = "/api/access-grants/mine",
    responses((status = 200, description = "Caller's grants", body = [AccessGrantDetail])),
    tag = "Access grants",
    security(("bearer_auth" = []))
)]
pub async fn my_grants(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    let rows = sqlx::query_as::<_, AccessGrantDetail>(&format!(
        "{} WHERE g.user_id = ? ORDER BY wh.name, sw.name",
        DETAIL_SELECT
    ))
    .bind(user.user_id)
    .fetch_all(pool.get_ref())
    .await
    .map_err(AppError::from)?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Whether the caller may work on a sub-warehouse
#[utoipa::path(
    get,
    path = "/api/access-grants/verify/{sub_warehouse_id}",
    params(("sub_warehouse_id", Path, description = "Sub-warehouse id")),
    responses((status = 200, description = "Access check", body = AccessCheck)),
    tag = "Access grants",
    security(("bearer_auth" = []))
)]
pub async fn verify_access(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let sub_warehouse_id = path.into_inner();
    let allowed = match allowed_sub_warehouses(pool.get_ref(), &user).await {
        Ok(scope) => scope.allows(sub_warehouse_id),
        // workers have no scope at all
        Err(AppError::Forbidden(_)) => false,
        Err(e) => return Err(e.into()),
    };

    Ok(HttpResponse::Ok().json(AccessCheck {
        sub_warehouse_id,
        allowed,
    }))
}

/// Get grant by id
#[utoipa::path(
    get,
    path = "/api/access-grants/{id}",
    params(("id", Path, description = "Grant id")),
    responses(
        (status = 200, description = "Grant found", body = AccessGrantDetail),
        (status = 404, description = "Grant not found")
    ),
    tag = "Access grants",
    security(("bearer_auth" = []))
)]
pub async fn get_grant(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;

    let grant = sqlx::query_as::<_, AccessGrantDetail>(&format!("{} WHERE g.id = ?", DETAIL_SELECT))
        .bind(path.into_inner())
        .fetch_optional(pool.get_ref())
        .await
        .map_err(AppError::from)?
        .ok_or(AppError::NotFound("Access grant"))?;
    Ok(HttpResponse::Ok().json(grant))
}

/// Update grant
#[utoipa::path(
    put,
    path = "/api/access-grants/{id}",
    params(("id", Path, description = "Grant id")),
    request_body = AccessGrantReq,
    responses(
        (status = 200, description = "Grant updated"),
        (status = 404, description = "Grant not found"),
        (status = 409, description = "Grant already exists")
    ),
    tag = "Access grants",
    security(("bearer_auth" = []))
)]
pub async fn update_grant(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<AccessGrantReq>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;

    let affected = sqlx::query(
        "UPDATE access_grants SET user_id = ?, sub_warehouse_id = ?, entry_limit = ? WHERE id = ?",
    )
    .bind(payload.user_id)
    .bind(payload.sub_warehouse_id)
    .bind(payload.entry_limit)
    .bind(path.into_inner())
    .execute(pool.get_ref())
    .await
    .map_err(write_error)?
    .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound("Access grant").into());
    }
    Ok(HttpResponse::Ok().json(json!({ "message": "Access grant updated" })))
}

/// Delete grant
#[utoipa::path(
    delete,
    path = "/api/access-grants/{id}",
    params(("id", Path, description = "Grant id")),
    responses(
        (status = 200, description = "Grant deleted"),
        (status = 404, description = "Grant not found")
    ),
    tag = "Access grants",
    security(("bearer_auth" = []))
)]
pub async fn delete_grant(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;

    let affected = sqlx::query("DELETE FROM access_grants WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await
        .map_err(AppError::from)?
        .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound("Access grant").into());
    }
    Ok(HttpResponse::Ok().json(json!({ "message": "Access grant deleted" })))
}

/// Revoke every grant of a user
#[utoipa::path(
    delete,
    path = "/api/access-grants/user/{user_id}",
    params(("user_id", Path, description = "User id")),
    responses((status = 200, description = "Number of grants removed")),
    tag = "Access grants",
    security(("bearer_auth" = []))
)]
pub async fn delete_user_grants(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;
    let user_id = path.into_inner();

    let deleted = sqlx::query("DELETE FROM access_grants WHERE user_id = ?")
        .bind(user_id)
        .execute(pool.get_ref())
        .await
        .map_err(AppError::from)?
        .rows_affected();

    info!(user_id, deleted, "Access grants revoked");
    Ok(HttpResponse::Ok().json(json!({ "deleted": deleted })))
}
