use actix_web::{HttpRequest, HttpResponse, Responder, http::header, web};
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;

use crate::{
    auth::jwt::verify_token, config::Config, error::AppError, models::TokenType,
    notifications::NotificationHub,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct StreamQuery {
    /// Access token for clients that cannot send headers (EventSource).
    pub token: Option<String>,
}

fn token_from<'a>(req: &'a HttpRequest, query: &'a StreamQuery) -> Option<&'a str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .or(query.token.as_deref())
}

/// Attendance change stream
///
/// Server-sent events; one `attendance` event per create, update or delete.
#[utoipa::path(
    get,
    path = "/api/notifications/events",
    params(StreamQuery),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream"),
        (status = 401, description = "Missing or invalid token")
    ),
    tag = "Notifications"
)]
pub async fn attendance_events(
    req: HttpRequest,
    query: web::Query<StreamQuery>,
    config: web::Data<Config>,
    hub: web::Data<NotificationHub>,
) -> actix_web::Result<impl Responder> {
    let token = token_from(&req, &query)
        .ok_or_else(|| AppError::Unauthorized("Missing token".into()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .ok()
        .filter(|c| c.token_type == TokenType::Access)
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".into()))?;

    info!(user_id = claims.user_id, "SSE client connected");

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(hub.sse_stream()))
}

#[cfg(test)]
mod tests {
    use actix_web::{App, http::StatusCode, test};

    use super::*;
    use crate::auth::jwt::{generate_access_token, generate_refresh_token};

    fn app_data() -> (web::Data<Config>, web::Data<NotificationHub>) {
        (
            web::Data::new(Config::for_tests()),
            web::Data::new(NotificationHub::new(8)),
        )
    }

    #[actix_web::test]
    async fn stream_requires_an_access_token() {
        let (config, hub) = app_data();
        let (refresh, _) =
            generate_refresh_token(1, "admin@example.com", 2, &config.jwt_secret, 60).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(config)
                .app_data(hub)
                .route("/events", web::get().to(attendance_events)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/events").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri(&format!("/events?token={}", refresh))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn query_token_opens_the_stream() {
        let (config, hub) = app_data();
        let token =
            generate_access_token(1, "admin@example.com", 2, &config.jwt_secret, 60).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(config)
                .app_data(hub)
                .route("/events", web::get().to(attendance_events)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/events?token={}", token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
    }
}
