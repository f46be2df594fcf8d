use actix_web::{HttpRequest, HttpResponse, web};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    auth::{
        auth::AuthUser,
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::verify_password,
    },
    config::Config,
    error::{AppError, AppResult},
    models::{Claims, LoginReqDto, TokenPair, TokenType, UserSql},
};

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn token_error(e: jsonwebtoken::errors::Error) -> AppError {
    error!(error = %e, "Failed to sign token");
    AppError::Internal(format!("token signing failed: {}", e))
}

async fn store_refresh_token(pool: &MySqlPool, claims: &Claims) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(claims.user_id)
    .bind(&claims.jti)
    .bind(claims.exp as i64)
    .execute(pool)
    .await?;
    Ok(())
}

async fn set_session_flag(pool: &MySqlPool, user_id: u64, active: bool) -> AppResult<u64> {
    Ok(
        sqlx::query("UPDATE users SET session_active = ? WHERE id = ?")
            .bind(active)
            .bind(user_id)
            .execute(pool)
            .await?
            .rows_affected(),
    )
}

/// Issues an access/refresh pair for valid credentials.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Tokens issued", body = TokenPair),
        (status = 400, description = "Missing credentials"),
        (status = 401, description = "Invalid credentials"),
        (status = 409, description = "User already has an active session")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(email = %user.email)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    info!("Login request received");

    let email = user.email.trim().to_lowercase();
    if email.is_empty() || user.password.is_empty() {
        info!("Validation failed: empty email or password");
        return Err(AppError::Validation("Email and password are required".into()));
    }

    let db_user = sqlx::query_as::<_, UserSql>(
        r#"
        SELECT id, name, email, password, role_id, active, session_active
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await?;

    let Some(db_user) = db_user.filter(|u| u.active) else {
        info!("Invalid credentials: user not found or inactive");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };
    debug!(user_id = db_user.id, "User found");

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    if config.single_session && db_user.session_active {
        warn!(user_id = db_user.id, "Login refused: session already active");
        return Err(AppError::Conflict("User already has an active session".into()));
    }

    let access_token = generate_access_token(
        db_user.id,
        &db_user.email,
        db_user.role_id,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(token_error)?;

    let (refresh_token, refresh_claims) = generate_refresh_token(
        db_user.id,
        &db_user.email,
        db_user.role_id,
        &config.jwt_secret,
        config.refresh_token_ttl,
    )
    .map_err(token_error)?;

    debug!(jti = %refresh_claims.jti, "Storing refresh token");
    store_refresh_token(pool.get_ref(), &refresh_claims).await?;

    set_session_flag(pool.get_ref(), db_user.id, true).await?;

    // non-fatal
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!(user_id = db_user.id, "Login successful");

    Ok(HttpResponse::Ok().json(TokenPair {
        access_token,
        refresh_token,
    }))
}

/// Rotates a refresh token: the presented one is revoked and a new pair issued.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Missing, invalid or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
#[instrument(name = "auth_refresh", skip_all)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let token = bearer(&req).ok_or_else(|| AppError::Unauthorized("No token".into()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;
    if claims.token_type != TokenType::Refresh {
        return Err(AppError::Unauthorized("Refresh token required".into()));
    }

    let record = sqlx::query_as::<_, (u64, u64, bool)>(
        "SELECT id, user_id, revoked FROM refresh_tokens WHERE jti = ?",
    )
    .bind(&claims.jti)
    .fetch_optional(pool.get_ref())
    .await?;

    let (record_id, user_id) = match record {
        Some((id, user_id, false)) => (id, user_id),
        _ => return Err(AppError::Unauthorized("Refresh token revoked".into())),
    };

    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = ?")
        .bind(record_id)
        .execute(pool.get_ref())
        .await?;

    let (new_refresh_token, new_claims) = generate_refresh_token(
        user_id,
        &claims.sub,
        claims.role,
        &config.jwt_secret,
        config.refresh_token_ttl,
    )
    .map_err(token_error)?;
    store_refresh_token(pool.get_ref(), &new_claims).await?;

    let access_token = generate_access_token(
        user_id,
        &claims.sub,
        claims.role,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(token_error)?;

    debug!(user_id, "Refresh token rotated");

    Ok(HttpResponse::Ok().json(TokenPair {
        access_token,
        refresh_token: new_refresh_token,
    }))
}

/// Revokes the presented refresh token and clears the session flag.
/// Always answers 204.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Some(token) = bearer(&req) else {
        return HttpResponse::NoContent().finish();
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
    }

    if let Err(e) = set_session_flag(pool.get_ref(), claims.user_id, false).await {
        error!(error = %e, "Failed to clear session flag");
    }

    info!(user_id = claims.user_id, "Logged out");
    HttpResponse::NoContent().finish()
}

/// Echoes the identity carried by a valid access token.
#[utoipa::path(
    get,
    path = "/auth/validate",
    responses(
        (status = 200, description = "Token is valid"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn validate(user: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "valid": true,
        "user_id": user.user_id,
        "email": user.email,
        "role": user.role,
    }))
}

/// Admin only: clears a user's session flag and revokes their refresh tokens.
#[utoipa::path(
    post,
    path = "/api/users/{id}/disconnect",
    params(("id" = u64, Path, description = "User id")),
    responses(
        (status = 200, description = "Session cleared"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn force_disconnect(
    user: AuthUser,
    path: web::Path<u64>,
    pool: web::Data<MySqlPool>,
) -> AppResult<HttpResponse> {
    user.require_admin()?;
    let target = path.into_inner();

    if set_session_flag(pool.get_ref(), target, false).await? == 0 {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
            .bind(target)
            .fetch_one(pool.get_ref())
            .await?;
        if !exists {
            return Err(AppError::NotFound("User"));
        }
    }

    let revoked = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE user_id = ? AND revoked = 0")
        .bind(target)
        .execute(pool.get_ref())
        .await?
        .rows_affected();

    info!(admin = user.user_id, target, revoked, "Session force-disconnected");
    Ok(HttpResponse::Ok().json(json!({ "message": "Session cleared", "revoked_tokens": revoked })))
}
