use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{auth::AuthUser, password::hash_password},
    error::AppError,
    model::{role::Role, user::User},
    utils::{
        db_utils::{is_duplicate_key, is_foreign_key_violation},
        email_cache, email_filter,
    },
};

const COLUMNS: &str = "id, name, email, role_id, active, session_active";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUser {
    #[schema(example = "Coordinator North")]
    pub name: String,
    #[schema(example = "coordinator@example.com")]
    pub email: String,
    #[schema(example = "s3cret-pass")]
    pub password: String,
    #[schema(example = 3)]
    pub role_id: u8,
}

/// Full replacement of a user; the password is only changed when given.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUser {
    pub name: String,
    pub email: String,
    pub role_id: u8,
    pub active: bool,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmailQuery {
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EmailAvailability {
    pub email: String,
    pub available: bool,
}

fn checked_role(role_id: u8) -> Result<Role, AppError> {
    Role::from_id(role_id).ok_or_else(|| AppError::Validation(format!("Unknown role {}", role_id)))
}

fn checked_email(email: &str) -> Result<String, AppError> {
    let email = email_filter::normalize(email);
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("A valid e-mail is required".into()));
    }
    Ok(email)
}

/// true  => e-mail free
/// false => e-mail taken
///
/// The filter answers "definitely free" cheaply, the cache answers "taken"
/// for recently active users, and only the rest reach the database.
pub async fn is_email_available(email: &str, pool: &MySqlPool) -> bool {
    let email = email_filter::normalize(email);

    if !email_filter::might_exist(&email) {
        return true;
    }

    if email_cache::is_taken(&email).await {
        return false;
    }

    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ? LIMIT 1)",
    )
    .bind(&email)
    .fetch_one(pool)
    .await
    .unwrap_or_else(|e| {
        // fail-safe
        warn!(error = %e, "E-mail availability check failed");
        true
    });

    if exists {
        email_cache::mark_taken(&email).await;
    }
    !exists
}

/// Check whether an e-mail can be registered
#[utoipa::path(
    get,
    path = "/api/users/email-available",
    params(EmailQuery),
    responses((status = 200, description = "Availability", body = EmailAvailability)),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn email_available(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmailQuery>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;
    let email = checked_email(&query.email)?;
    let available = is_email_available(&email, pool.get_ref()).await;
    Ok(HttpResponse::Ok().json(EmailAvailability { email, available }))
}

/// Create user
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "E-mail already registered")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
#[instrument(name = "create_user", skip(user, pool, payload), fields(email = %payload.email))]
pub async fn create_user(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateUser>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;
    let payload = payload.into_inner();

    let name = payload.name.trim();
    if name.is_empty() || payload.password.is_empty() {
        return Err(AppError::Validation("Name and password must not be empty".into()).into());
    }
    let email = checked_email(&payload.email)?;
    let role = checked_role(payload.role_id)?;

    if !is_email_available(&email, pool.get_ref()).await {
        return Err(AppError::Conflict("E-mail already registered".into()).into());
    }

    let hashed = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        AppError::Internal("Password hashing failed".into())
    })?;

    let result = sqlx::query(
        "INSERT INTO users (name, email, password, role_id, active, session_active) VALUES (?, ?, ?, ?, 1, 0)",
    )
    .bind(name)
    .bind(&email)
    .bind(&hashed)
    .bind(role.id())
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        if is_duplicate_key(&e) {
            AppError::Conflict("E-mail already registered".into())
        } else {
            AppError::from(e)
        }
    })?;

    email_filter::insert(&email);
    email_cache::mark_taken(&email).await;

    let created = User {
        id: result.last_insert_id(),
        name: name.to_string(),
        email,
        role_id: role.id(),
        active: true,
        session_active: false,
    };
    info!(user_id = created.id, role = %role, "User created");

    Ok(HttpResponse::Created().json(created))
}

/// List users
#[utoipa::path(
    get,
    path = "/api/users",
    responses((status = 200, description = "All users", body = [User])),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;
    let rows = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users ORDER BY name", COLUMNS))
        .fetch_all(pool.get_ref())
        .await
        .map_err(AppError::from)?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Get user by id
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id", Path, description = "User id")),
    responses(
        (status = 200, description = "User found", body = User),
        (status = 404, description = "User not found")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();
    if !user.is_admin() && user.user_id != id {
        return Err(AppError::Forbidden("Admins only".into()).into());
    }

    let found = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(AppError::from)?
        .ok_or(AppError::NotFound("User"))?;
    Ok(HttpResponse::Ok().json(found))
}

/// Update user
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id", Path, description = "User id")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated"),
        (status = 404, description = "User not found"),
        (status = 409, description = "E-mail already registered")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateUser>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;
    let id = path.into_inner();
    let payload = payload.into_inner();

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Name must not be empty".into()).into());
    }
    let email = checked_email(&payload.email)?;
    let role = checked_role(payload.role_id)?;

    let previous: Option<String> = sqlx::query_scalar("SELECT email FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(AppError::from)?;
    let Some(previous) = previous else {
        return Err(AppError::NotFound("User").into());
    };

    let password = match payload.password.as_deref().filter(|p| !p.is_empty()) {
        Some(p) => Some(hash_password(p).map_err(|e| {
            error!(error = %e, "Password hashing failed");
            AppError::Internal("Password hashing failed".into())
        })?),
        None => None,
    };

    sqlx::query(
        r#"
        UPDATE users
        SET name = ?, email = ?, role_id = ?, active = ?, password = COALESCE(?, password)
        WHERE id = ?
        "#,
    )
    .bind(name)
    .bind(&email)
    .bind(role.id())
    .bind(payload.active)
    .bind(password)
    .bind(id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        if is_duplicate_key(&e) {
            AppError::Conflict("E-mail already registered".into())
        } else {
            AppError::from(e)
        }
    })?;

    if previous != email {
        email_cache::release(&previous).await;
        email_filter::insert(&email);
        email_cache::mark_taken(&email).await;
    }

    info!(user_id = id, "User updated");
    Ok(HttpResponse::Ok().json(json!({ "message": "User updated" })))
}

/// Delete user
///
/// Refresh tokens and access grants of the user go with it.
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id", Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 404, description = "User not found"),
        (status = 409, description = "User is still referenced")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    user: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    user.require_admin()?;
    let id = path.into_inner();
    if id == user.user_id {
        return Err(AppError::Conflict("You cannot delete your own account".into()).into());
    }

    let email: Option<String> = sqlx::query_scalar("SELECT email FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(AppError::from)?;
    let Some(email) = email else {
        return Err(AppError::NotFound("User").into());
    };

    let mut tx = pool.begin().await.map_err(AppError::from)?;
    for sql in [
        "DELETE FROM refresh_tokens WHERE user_id = ?",
        "DELETE FROM access_grants WHERE user_id = ?",
    ] {
        sqlx::query(sql)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;
    }
    let deleted = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await;
    match deleted {
        Ok(_) => tx.commit().await.map_err(AppError::from)?,
        Err(e) if is_foreign_key_violation(&e) => {
            return Err(AppError::Conflict(
                "User still recorded attendance or coordinates workers; deactivate it instead".into(),
            )
            .into());
        }
        Err(e) => return Err(AppError::from(e).into()),
    }

    email_filter::remove(&email);
    email_cache::release(&email).await;

    info!(user_id = id, "User deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "User deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized_and_checked() {
        assert_eq!(checked_email("  Boss@Example.COM ").unwrap(), "boss@example.com");
        assert!(checked_email("   ").is_err());
        assert!(checked_email("not-an-email").is_err());
    }

    #[test]
    fn only_known_roles_are_accepted() {
        assert_eq!(checked_role(2).unwrap(), Role::Admin);
        assert!(matches!(checked_role(9), Err(AppError::Validation(_))));
    }
}
