//! HTTP handlers and route configuration.

mod health;
mod limits;

use actix_web::web;

use crate::middleware::rate_limit::RateLimitMiddleware;
use crate::state::AppState;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig, state: &AppState) {
    cfg.service(
        web::scope("/api")
            // Public routes
            .route("/health", web::get().to(health::health_check))
            // Admission-controlled routes
            .service(
                web::scope("/limits")
                    .wrap(RateLimitMiddleware::from_state(state))
                    .route("/check", web::post().to(limits::check))
                    .route("/{key}/{plan}", web::get().to(limits::bucket_state)),
            ),
    );
}
