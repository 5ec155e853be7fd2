use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use log::info;
use sqlx::PgPool;
use std::sync::Arc;

use libraryhub::auth::AuthMiddleware;
use libraryhub::models::{PgUserRepository, UserRepository};
use libraryhub::routes::{self, health};
use libraryhub::{Config, KeyStore, TokenService};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().context("invalid configuration")?;
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    // Keys load lazily on the first token operation and stay cached for the process.
    let keys = Arc::new(KeyStore::new());
    let tokens = web::Data::new(TokenService::new(config.jwt.clone(), keys));
    let repository: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(pool));
    let users = web::Data::from(repository);

    info!("Starting LibraryHub server at {}", config.server_url());
    HttpServer::new(move || {
        App::new()
            .app_data(users.clone())
            .app_data(tokens.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .service(health::health)
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware::new(tokens.clone()))
                    .configure(routes::config),
            )
    })
    .bind((config.server_host.clone(), config.server_port))?
    .run()
    .await?;

    Ok(())
}
