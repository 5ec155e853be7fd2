pub mod auth;
pub mod health;

use actix_web::web;

/// Routes mounted under `/api`. The caller wraps the scope in `AuthMiddleware`.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(auth::login)
            .service(auth::refresh)
            .service(auth::me),
    );
}
