use crate::{
    auth::{
        verify_password, AuthenticatedUser, CurrentUser, LoginRequest, RefreshRequest,
        TokenResponse, TokenService,
    },
    error::AppError,
    models::UserRepository,
};
use actix_web::{get, post, web, HttpResponse, Responder};
use log::{debug, error, info};
use validator::Validate;

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid credentials".into())
}

fn session_expired() -> AppError {
    AppError::Unauthorized("Session expired, please log in again".into())
}

/// Login user
///
/// Checks email and password and returns a fresh access/refresh token pair.
#[post("/login")]
pub async fn login(
    users: web::Data<dyn UserRepository>,
    tokens: web::Data<TokenService>,
    login_data: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    // Validate input
    login_data.validate()?;

    let user = match users.find_by_email(&login_data.email).await? {
        Some(user) => user,
        None => return Err(invalid_credentials()),
    };
    if !verify_password(&login_data.password, &user.password_hash)? {
        return Err(invalid_credentials());
    }

    let access_token = tokens.issue_access_token(user.id, Some(&user.email), Some(&user.role), &[])?;
    let refresh_token = tokens.issue_refresh_token(user.id, login_data.device_id.as_deref())?;
    info!("user {} logged in", user.id);

    Ok(HttpResponse::Ok().json(TokenResponse::new(
        access_token,
        Some(refresh_token),
        tokens.access_lifetime().num_seconds(),
    )))
}

/// Refresh access token
///
/// Exchanges a refresh token for a new access token. Any problem with the refresh token,
/// or with the account behind it, produces the same 401 telling the client to log in again.
#[post("/refresh")]
pub async fn refresh(
    users: web::Data<dyn UserRepository>,
    tokens: web::Data<TokenService>,
    refresh_data: web::Json<RefreshRequest>,
) -> Result<impl Responder, AppError> {
    let claims = match tokens.validate_refresh_token(&refresh_data.refresh_token) {
        Ok(claims) => claims,
        Err(e) => {
            if e.is_credential_error() {
                debug!("refresh rejected: {}", e);
            } else {
                error!("refresh could not be validated: {}", e);
            }
            return Err(session_expired());
        }
    };

    let user_id = match claims.subject_claim().map(str::parse::<i32>) {
        Some(Ok(id)) => id,
        _ => return Err(session_expired()),
    };
    // Email and role come from the account, so changes apply at the next refresh.
    let user = match users.find_by_id(user_id).await? {
        Some(user) => user,
        None => {
            info!("refresh for unknown user {}", user_id);
            return Err(session_expired());
        }
    };

    let access_token = tokens.issue_access_token(user.id, Some(&user.email), Some(&user.role), &[])?;
    debug!("refreshed access token for user {}", user.id);

    Ok(HttpResponse::Ok().json(TokenResponse::new(
        access_token,
        None,
        tokens.access_lifetime().num_seconds(),
    )))
}

/// Current user
///
/// Echoes the identity carried by the caller's access token.
#[get("/me")]
pub async fn me(user: AuthenticatedUser) -> impl Responder {
    HttpResponse::Ok().json(CurrentUser::from(user.principal()))
}
