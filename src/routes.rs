use crate::{
    api::{
        access_grant, attendance, dashboard, export, health, notifications, role, rotation,
        scheduled_date, sub_warehouse, user, warehouse, worker,
    },
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;
use tracing::warn;

/// Per-IP limiter allowing `requests_per_min` with the same burst.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond((60_000 / u64::from(requests_per_min)).max(1))
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_else(|| {
            warn!(requests_per_min, "Invalid rate limit, using governor defaults");
            GovernorConfig::default()
        });
    Governor::new(&cfg)
}

/// Routes that need neither a token nor the protected limiter.
pub fn configure_public(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/health")
            .route("", web::get().to(health::health))
            .route("/live", web::get().to(health::liveness))
            .route("/ready", web::get().to(health::readiness)),
    );
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            )
            .service(
                web::resource("/validate")
                    .wrap(refresh_limiter)
                    .route(web::get().to(handlers::validate)),
            ),
    );

    // EventSource cannot send headers; the handler checks the token itself.
    // Registered ahead of the protected scope so its middleware never sees it.
    cfg.service(
        web::resource(format!("{}/notifications/events", config.api_prefix))
            .wrap(login_limiter)
            .route(web::get().to(notifications::attendance_events)),
    );

    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(protected_limiter)
            .service(
                web::scope("/users")
                    .service(
                        web::resource("")
                            .route(web::post().to(user::create_user))
                            .route(web::get().to(user::list_users)),
                    )
                    .service(
                        web::resource("/email-available").route(web::get().to(user::email_available)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(user::get_user))
                            .route(web::put().to(user::update_user))
                            .route(web::delete().to(user::delete_user)),
                    )
                    .service(
                        web::resource("/{id}/disconnect")
                            .route(web::post().to(handlers::force_disconnect)),
                    ),
            )
            .service(web::resource("/roles").route(web::get().to(role::list_roles)))
            .service(
                web::scope("/warehouses")
                    .service(
                        web::resource("")
                            .route(web::post().to(warehouse::create_warehouse))
                            .route(web::get().to(warehouse::list_warehouses)),
                    )
                    .service(
                        web::resource("/assigned")
                            .route(web::get().to(warehouse::list_assigned_warehouses)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(warehouse::get_warehouse))
                            .route(web::put().to(warehouse::update_warehouse))
                            .route(web::delete().to(warehouse::delete_warehouse)),
                    ),
            )
            .service(
                web::scope("/sub-warehouses")
                    .service(
                        web::resource("")
                            .route(web::post().to(sub_warehouse::create_sub_warehouse))
                            .route(web::get().to(sub_warehouse::list_sub_warehouses)),
                    )
                    .service(
                        web::resource("/assigned/{warehouse_id}")
                            .route(web::get().to(sub_warehouse::list_assigned_sub_warehouses)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(sub_warehouse::get_sub_warehouse))
                            .route(web::put().to(sub_warehouse::update_sub_warehouse))
                            .route(web::delete().to(sub_warehouse::delete_sub_warehouse)),
                    )
                    .service(
                        web::resource("/{id}/info")
                            .route(web::get().to(sub_warehouse::sub_warehouse_info)),
                    ),
            )
            .service(
                web::scope("/workers")
                    .service(
                        web::resource("")
                            .route(web::post().to(worker::create_worker))
                            .route(web::get().to(worker::list_workers)),
                    )
                    .service(web::resource("/by-date").route(web::get().to(worker::workers_by_date)))
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(worker::get_worker))
                            .route(web::put().to(worker::update_worker))
                            .route(web::delete().to(worker::delete_worker)),
                    )
                    .service(
                        web::resource("/{id}/active")
                            .route(web::patch().to(worker::set_worker_active)),
                    )
                    .service(
                        web::resource("/{id}/attendance")
                            .route(web::get().to(worker::worker_attendance)),
                    ),
            )
            .service(
                web::scope("/rotations")
                    .service(
                        web::resource("")
                            .route(web::post().to(rotation::create_rotation))
                            .route(web::get().to(rotation::list_rotations)),
                    )
                    .service(
                        web::resource("/{id}").route(web::delete().to(rotation::delete_rotation)),
                    ),
            )
            .service(
                web::scope("/access-grants")
                    .service(
                        web::resource("")
                            .route(web::post().to(access_grant::create_grant))
                            .route(web::get().to(access_grant::list_grants)),
                    )
                    .service(web::resource("/mine").route(web::get().to(access_grant::my_grants)))
                    .service(
                        web::resource("/verify/{sub_warehouse_id}")
                            .route(web::get().to(access_grant::verify_access)),
                    )
                    .service(
                        web::resource("/user/{user_id}")
                            .route(web::delete().to(access_grant::delete_user_grants)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(access_grant::get_grant))
                            .route(web::put().to(access_grant::update_grant))
                            .route(web::delete().to(access_grant::delete_grant)),
                    ),
            )
            .service(
                web::scope("/scheduled-dates")
                    .service(
                        web::resource("")
                            .route(web::post().to(scheduled_date::create_scheduled_date))
                            .route(web::get().to(scheduled_date::list_scheduled_dates)),
                    )
                    .service(
                        web::resource("/batch")
                            .route(web::post().to(scheduled_date::create_scheduled_dates)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(scheduled_date::get_scheduled_date))
                            .route(web::put().to(scheduled_date::update_scheduled_date))
                            .route(web::delete().to(scheduled_date::delete_scheduled_date)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    .service(
                        web::resource("")
                            .route(web::get().to(attendance::list_attendance))
                            .route(web::post().to(attendance::create_attendance)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(attendance::get_attendance))
                            .route(web::put().to(attendance::update_attendance))
                            .route(web::delete().to(attendance::delete_attendance)),
                    ),
            )
            .service(
                web::scope("/dashboard")
                    .route("", web::get().to(dashboard::dashboard_overview))
                    .route("/totals", web::get().to(dashboard::dashboard_totals))
                    .route("/week-workers", web::get().to(dashboard::dashboard_week_workers))
                    .route("/overtime", web::get().to(dashboard::dashboard_overtime))
                    .route("/shortfall", web::get().to(dashboard::dashboard_shortfall)),
            )
            .service(
                web::scope("/export")
                    .route("/workers/{id}", web::get().to(export::export_worker_range))
                    .route(
                        "/scheduled-dates",
                        web::post().to(export::export_selected_dates),
                    ),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_still_builds_a_limiter() {
        let _ = build_limiter(0);
        let _ = build_limiter(1000);
    }
}
