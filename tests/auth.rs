mod common;

use actix_cors::Cors;
use actix_web::http::{header, StatusCode};
use actix_web::middleware::Logger;
use actix_web::{test, web, App};
use chrono::{Duration, Utc};
use dotenv::dotenv;
use libraryhub::auth::clock::MockClock;
use libraryhub::auth::{AuthMiddleware, TokenResponse};
use libraryhub::models::{PgUserRepository, UserRepository};
use libraryhub::routes;
use libraryhub::routes::health;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;

use common::READER_PASSWORD;

macro_rules! library_app {
    ($users:expr, $tokens:expr) => {{
        let tokens = web::Data::new($tokens);
        test::init_service(
            App::new()
                .app_data($users)
                .app_data(tokens.clone())
                .wrap(
                    Cors::default()
                        .allow_any_origin()
                        .allow_any_method()
                        .allow_any_header()
                        .max_age(3600),
                )
                .wrap(Logger::default())
                .service(health::health) // health is outside /api and AuthMiddleware
                .service(
                    web::scope("/api")
                        .wrap(AuthMiddleware::new(tokens.clone()))
                        .configure(routes::config),
                ),
        )
        .await
    }};
}

#[actix_rt::test]
async fn test_login_me_refresh_flow() {
    let app = library_app!(common::users(), common::token_service());

    // Login
    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": "reader@library.test", "password": READER_PASSWORD }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    assert_eq!(
        status,
        StatusCode::OK,
        "Login failed. Body: {:?}",
        String::from_utf8_lossy(&body)
    );
    let login: TokenResponse = serde_json::from_slice(&body).expect("Failed to parse login response");
    assert_eq!(login.token_type, "Bearer");
    assert_eq!(login.expires_in, 600);
    let refresh_token = login.refresh_token.expect("login should return a refresh token");

    // Who am I
    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .append_header(("Authorization", format!("Bearer {}", login.access_token)))
        .to_request();
    let me: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(
        me,
        json!({ "userId": 42, "email": "reader@library.test", "role": "Member" })
    );

    // The refresh token is not an access credential
    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .append_header(("Authorization", format!("Bearer {}", refresh_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Refresh
    let req = test::TestRequest::post()
        .uri("/api/auth/refresh")
        .set_json(json!({ "refreshToken": refresh_token }))
        .to_request();
    let refreshed: TokenResponse = test::call_and_read_body_json(&app, req).await;
    assert!(refreshed.refresh_token.is_none());
    assert_ne!(refreshed.access_token, login.access_token);

    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .append_header(("Authorization", format!("bearer {}", refreshed.access_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // An access token is not a refresh token
    let req = test::TestRequest::post()
        .uri("/api/auth/refresh")
        .set_json(json!({ "refreshToken": refreshed.access_token }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_rejections_are_indistinguishable() {
    let tokens = common::token_service();
    let valid = tokens
        .issue_access_token(42, Some("reader@library.test"), Some("Member"), &[])
        .unwrap();
    let mut tampered = valid.clone().into_bytes();
    let last = tampered.len() - 2;
    tampered[last] = if tampered[last] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered).unwrap();

    let app = library_app!(common::users(), tokens);

    let mut bodies = Vec::new();
    for credential in [
        None,
        Some("Bearer ".to_string()),
        Some("Bearer not.a.token".to_string()),
        Some(format!("Bearer {}", tampered)),
    ] {
        let mut req = test::TestRequest::get().uri("/api/auth/me");
        if let Some(credential) = credential {
            req = req.insert_header((header::AUTHORIZATION, credential));
        }
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        bodies.push(test::read_body(resp).await);
    }
    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
}

#[actix_rt::test]
async fn test_access_token_expires() {
    let clock = Arc::new(MockClock::new(Utc::now()));
    let tokens = common::token_service().with_clock(clock.clone());
    let token = tokens.issue_access_token(42, None, None, &[]).unwrap();
    let app = library_app!(common::users(), tokens);

    let me = |token: &str| {
        test::TestRequest::get()
            .uri("/api/auth/me")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
            .to_request()
    };

    clock.advance(Duration::minutes(10));
    let resp = test::call_service(&app, me(&token)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    clock.advance(Duration::seconds(31));
    let resp = test::call_service(&app, me(&token)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_missing_keys_do_not_break_public_routes() {
    let mut settings = common::settings();
    settings.signing_public_key_path = "/nonexistent/signing.pub.pem".into();
    let broken = libraryhub::TokenService::new(settings, Arc::new(libraryhub::KeyStore::new()));
    let token = common::token_service()
        .issue_access_token(42, None, None, &[])
        .unwrap();
    let app = library_app!(common::users(), broken);

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_invalid_login_inputs() {
    let app = library_app!(common::users(), common::token_service());

    let test_cases = vec![
        // Deserialization errors (expect 400 for missing fields)
        (json!({ "email": "reader@library.test" }), StatusCode::BAD_REQUEST),
        (json!({ "password": READER_PASSWORD }), StatusCode::BAD_REQUEST),
        // Validation errors
        (
            json!({ "email": "not-an-email", "password": READER_PASSWORD }),
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        (
            json!({ "email": "reader@library.test", "password": "123" }),
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        // Wrong password
        (
            json!({ "email": "reader@library.test", "password": "WrongPassword1" }),
            StatusCode::UNAUTHORIZED,
        ),
    ];

    for (payload, expected) in test_cases {
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(&payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), expected, "payload: {}", payload);
    }
}

#[ignore]
#[actix_rt::test]
async fn test_login_against_postgres() {
    dotenv().ok(); // Load .env file
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test DB");

    let password_hash = bcrypt::hash(READER_PASSWORD, 4).unwrap();
    let _ = sqlx::query("DELETE FROM users WHERE email = $1")
        .bind("integration@library.test")
        .execute(&pool)
        .await;
    sqlx::query(
        "INSERT INTO users (username, email, role, password_hash) VALUES ($1, $2, $3, $4)",
    )
    .bind("integration_user")
    .bind("integration@library.test")
    .bind("Member")
    .bind(&password_hash)
    .execute(&pool)
    .await
    .expect("Failed to insert test user");

    let repository: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(pool.clone()));
    let app = library_app!(web::Data::from(repository), common::token_service());

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": "integration@library.test", "password": READER_PASSWORD }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Clean up created user
    let _ = sqlx::query("DELETE FROM users WHERE email = $1")
        .bind("integration@library.test")
        .execute(&pool)
        .await;
}
