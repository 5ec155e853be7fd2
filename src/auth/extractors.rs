use actix_web::dev::Payload;
use actix_web::{Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};

use crate::auth::middleware::{AuthenticationOutcome, Principal};
use crate::error::AppError;

/// Extracts the authenticated caller from request extensions.
///
/// `AuthMiddleware` stores an `AuthenticationOutcome` for every request it sees. This
/// extractor succeeds only for `Authenticated` outcomes. A failed outcome, or none at all
/// because the middleware is not mounted, yields the same generic 401 so clients cannot
/// tell why they were refused.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Principal);

impl AuthenticatedUser {
    pub fn user_id(&self) -> i32 {
        self.0.user_id
    }

    pub fn principal(&self) -> &Principal {
        &self.0
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ActixError; // AppError will be converted into ActixError via ResponseError
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<AuthenticationOutcome>() {
            Some(AuthenticationOutcome::Authenticated(principal)) => {
                ready(Ok(AuthenticatedUser(principal.clone())))
            }
            _ => ready(Err(AppError::Unauthorized("Unauthorized".to_string()).into())),
        }
    }
}
