use actix_web::middleware::{Logger, NormalizePath};
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context;
use std::sync::Arc;

mod api;
mod attendance;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod export;
mod model;
mod models;
mod notifications;
mod routes;
mod store;
mod utils;

use crate::attendance::{AttendanceService, BulkScheduler};
use crate::docs::ApiDoc;
use crate::notifications::NotificationHub;
use crate::store::MySqlStore;
use crate::utils::{email_cache, email_filter};
use config::Config;
use db::init_db;
use tracing::{error, info};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    once_cell::sync::Lazy::force(&api::health::STARTED_AT);
    info!(addr = %config.server_addr, "Server starting...");

    let pool = init_db(&config).await.context("Database initialisation failed")?;

    let pool_for_filter_warmup = pool.clone();
    let pool_for_cache_warmup = pool.clone();

    actix_web::rt::spawn(async move {
        if let Err(e) = email_filter::warmup_email_filter(&pool_for_filter_warmup, 100).await {
            error!(error = ?e, "Failed to warm up e-mail filter");
        }
    });

    actix_web::rt::spawn(async move {
        // users active in the last 30 days, 250 per batch
        if let Err(e) = email_cache::warmup_email_cache(&pool_for_cache_warmup, 30, 250).await {
            error!(error = ?e, "Failed to warm up e-mail cache");
        }
    });

    let store = Arc::new(MySqlStore::new(pool.clone()));
    let attendance_service = AttendanceService::new(store.clone());
    let scheduler = BulkScheduler::new(
        store.clone(),
        store,
        attendance_service.clone(),
        config.default_attendance_note.clone(),
    );

    let pool_data = Data::new(pool);
    let config_data = Data::new(config.clone());
    let service_data = Data::new(attendance_service);
    let scheduler_data = Data::new(scheduler);
    let hub_data = Data::new(NotificationHub::new(config.notify_capacity));

    let server_addr = config.server_addr.clone();
    let route_config = config;

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                // wildcard needed for the UI's JS/CSS assets
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(pool_data.clone())
            .app_data(config_data.clone())
            .app_data(service_data.clone())
            .app_data(scheduler_data.clone())
            .app_data(hub_data.clone())
            .configure(routes::configure_public)
            .configure(|cfg| routes::configure(cfg, route_config.clone()))
    })
    .bind(&server_addr)
    .with_context(|| format!("Cannot bind {}", server_addr))?
    .run()
    .await?;

    info!("Server stopped");
    Ok(())
}
