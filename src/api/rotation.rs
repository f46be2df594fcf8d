use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{access::ensure_sub_warehouse_access, auth::AuthUser},
    error::AppError,
    model::rotation::WorkerRotation,
    utils::db_utils::{is_duplicate_key, is_foreign_key_violation},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRotation {
    #[schema(example = 12)]
    pub worker_id: u64,
    #[schema(example = 4)]
    pub sub_warehouse_id: u64,
    #[schema(example = "2025-03-01", format = "date", value_type = String)]
    pub rotation_date: NaiveDate,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct RotationQuery {
    pub sub_warehouse_id: Option<u64>,
    #[param(value_type = Option<String>, format = "date")]
    pub date: Option<NaiveDate>,
}

fn list_query(query: &RotationQuery) -> QueryBuilder<'static, MySql> {
    let mut builder = QueryBuilder::<MySql>::new(
        "SELECT id, worker_id, sub_warehouse_id, rotation_date FROM worker_rotations WHERE 1=1",
    );
    if let Some(sub_warehouse_id) = query.sub_warehouse_id {
        builder.push(" AND sub_warehouse_id = ").push_bind(sub_warehouse_id);
    }
    if let Some(date) = query.date {
        builder.push(" AND rotation_date = ").push_bind(date);
    }
    builder.push(" ORDER BY rotation_date, id");
    builder
}

/// Rotate a worker into a sub-warehouse for one day
#[utoipa::path(
    post,
    path = "/api/rotations",
    request_body = CreateRotation,
    responses(
        (status = 201, description = "Rotation created", body = WorkerRotation),
        (status = 409, description = "Rotation already exists")
    ),
    tag = "Rotations",
    security(("bearer_auth" = []))
)]
pub async fn create_rotation(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateRotation>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;
    ensure_sub_warehouse_access(pool.get_ref(), &user, payload.sub_warehouse_id).await?;

    let result = sqlx::query(
        "INSERT INTO worker_rotations (worker_id, sub_warehouse_id, rotation_date) VALUES (?, ?, ?)",
    )
    .bind(payload.worker_id)
    .bind(payload.sub_warehouse_id)
    .bind(payload.rotation_date)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        if is_duplicate_key(&e) {
            AppError::Conflict("Worker is already rotated there on that date".into())
        } else if is_foreign_key_violation(&e) {
            AppError::Validation("Unknown worker or sub-warehouse".into())
        } else {
            AppError::from(e)
        }
    })?;

    let rotation = WorkerRotation {
        id: result.last_insert_id(),
        worker_id: payload.worker_id,
        sub_warehouse_id: payload.sub_warehouse_id,
        rotation_date: payload.rotation_date,
    };
    info!(
        rotation_id = rotation.id,
        worker_id = rotation.worker_id,
        sub_warehouse_id = rotation.sub_warehouse_id,
        "Rotation created"
    );

    Ok(HttpResponse::Created().json(rotation))
}

/// List rotations
#[utoipa::path(
    get,
    path = "/api/rotations",
    params(RotationQuery),
    responses((status = 200, description = "Matching rotations", body = [WorkerRotation])),
    tag = "Rotations",
    security(("bearer_auth" = []))
)]
pub async fn list_rotations(
    pool: web::Data<MySqlPool>,
    query: web::Query<RotationQuery>,
) -> actix_web::Result<impl Responder> {
    let rows = list_query(&query)
        .build_query_as::<WorkerRotation>()
        .fetch_all(pool.get_ref())
        .await
        .map_err(AppError::from)?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Delete rotation
#[utoipa::path(
    delete,
    path = "/api/rotations/{id}",
    params(("id", Path, description = "Rotation id")),
    responses(
        (status = 200, description = "Rotation deleted"),
        (status = 404, description = "Rotation not found")
    ),
    tag = "Rotations",
    security(("bearer_auth" = []))
)]
pub async fn delete_rotation(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    user.require_admin_or_coordinator()?;

    let affected = sqlx::query("DELETE FROM worker_rotations WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await
        .map_err(AppError::from)?
        .rows_affected();

    if affected == 0 {
        return Err(AppError::NotFound("Rotation").into());
    }
    Ok(HttpResponse::Ok().json(json!({ "message": "Rotation deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_are_appended_only_when_given() {
        let all = list_query(&RotationQuery::default());
        assert!(!all.sql().contains("sub_warehouse_id ="));
        assert!(!all.sql().contains("rotation_date ="));

        let both = list_query(&RotationQuery {
            sub_warehouse_id: Some(4),
            date: NaiveDate::from_ymd_opt(2025, 3, 1),
        });
        assert!(both.sql().contains("AND sub_warehouse_id = ?"));
        assert!(both.sql().contains("AND rotation_date = ?"));
    }
}
