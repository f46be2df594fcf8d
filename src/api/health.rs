use std::time::{Duration, Instant};

use actix_web::{HttpResponse, Responder, web};
use chrono::{NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::error;
use utoipa::ToSchema;

/// Forced in `main` so uptime counts from startup.
pub static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

const DB_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Serialize, ToSchema)]
pub struct DatabaseHealth {
    pub status: &'static str,
    pub response_ms: u64,
    #[schema(value_type = Option<String>)]
    pub server_time: Option<NaiveDateTime>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    #[schema(value_type = String, format = "date-time")]
    pub timestamp: chrono::DateTime<Utc>,
    pub uptime_secs: u64,
    pub database: DatabaseHealth,
}

async fn ping(pool: &MySqlPool) -> DatabaseHealth {
    let started = Instant::now();
    let result = tokio::time::timeout(
        DB_TIMEOUT,
        sqlx::query_scalar::<_, NaiveDateTime>("SELECT NOW()").fetch_one(pool),
    )
    .await;
    let response_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(server_time)) => DatabaseHealth {
            status: "connected",
            response_ms,
            server_time: Some(server_time),
            error: None,
        },
        Ok(Err(e)) => {
            error!(error = %e, "Health check: database unreachable");
            DatabaseHealth {
                status: "disconnected",
                response_ms,
                server_time: None,
                error: Some(e.to_string()),
            }
        }
        Err(_) => {
            error!(timeout_secs = DB_TIMEOUT.as_secs(), "Health check: database timed out");
            DatabaseHealth {
                status: "disconnected",
                response_ms,
                server_time: None,
                error: Some("timed out".into()),
            }
        }
    }
}

fn report(database: DatabaseHealth) -> HealthReport {
    HealthReport {
        status: if database.error.is_none() { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
        uptime_secs: STARTED_AT.elapsed().as_secs(),
        database,
    }
}

/// Full health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthReport),
        (status = 503, description = "Database unavailable", body = HealthReport)
    ),
    tag = "Health"
)]
pub async fn health(pool: web::Data<MySqlPool>) -> impl Responder {
    let report = report(ping(pool.get_ref()).await);
    if report.database.error.is_none() {
        HttpResponse::Ok().json(report)
    } else {
        HttpResponse::ServiceUnavailable().json(report)
    }
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health/live",
    responses((status = 200, description = "Process is up")),
    tag = "Health"
)]
pub async fn liveness() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "alive",
        "uptime_secs": STARTED_AT.elapsed().as_secs(),
    }))
}

/// Readiness probe
#[utoipa::path(
    get,
    path = "/health/ready",
    responses(
        (status = 200, description = "Ready to serve"),
        (status = 503, description = "Database unavailable")
    ),
    tag = "Health"
)]
pub async fn readiness(pool: web::Data<MySqlPool>) -> impl Responder {
    let database = ping(pool.get_ref()).await;
    match database.error {
        None => HttpResponse::Ok().json(json!({ "status": "ready" })),
        Some(e) => HttpResponse::ServiceUnavailable().json(json!({
            "status": "not_ready",
            "error": e,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, body::to_bytes, test as atest};

    #[actix_web::test]
    async fn liveness_does_not_need_the_database() {
        let app = atest::init_service(App::new().route("/health/live", web::get().to(liveness))).await;
        let resp =
            atest::call_service(&app, atest::TestRequest::get().uri("/health/live").to_request()).await;
        assert!(resp.status().is_success());
        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "alive");
    }

    #[test]
    fn database_error_marks_the_report_unhealthy() {
        let down = report(DatabaseHealth {
            status: "disconnected",
            response_ms: 3000,
            server_time: None,
            error: Some("timed out".into()),
        });
        assert_eq!(down.status, "unhealthy");

        let up = report(DatabaseHealth {
            status: "connected",
            response_ms: 2,
            server_time: None,
            error: None,
        });
        assert_eq!(up.status, "healthy");
    }
}
