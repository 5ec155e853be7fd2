//! Request authentication stage.
//!
//! [`AuthMiddleware`] runs [`authenticate`] for every request and stores the resulting
//! [`AuthenticationOutcome`] in the request extensions. It never rejects a request itself:
//! routes that need a caller ask for [`AuthenticatedUser`](super::extractors::AuthenticatedUser),
//! which turns a failed outcome into a plain 401.
//!
//! Only the `Authorization` header is consulted. Cookies and query parameters are ignored.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{self, HeaderMap},
    web, Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use log::{debug, error, info, warn};
use std::fmt;

use crate::auth::claims::ClaimSet;
use crate::auth::token::TokenService;
use crate::error::TokenError;

const BEARER_PREFIX: &str = "bearer ";

/// A verified caller.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: i32,
    pub claims: ClaimSet,
}

impl Principal {
    pub fn email(&self) -> Option<&str> {
        self.claims.email.as_deref()
    }

    pub fn role(&self) -> Option<&str> {
        self.claims.role.as_deref()
    }
}

/// Why a request is unauthenticated. Kept for logs only; clients always see a generic 401.
#[derive(Debug)]
pub enum AuthFailure {
    NoCredential,
    EmptyCredential,
    MissingSubject,
    InvalidSubject,
    /// The validator rejected the credential.
    Rejected(TokenError),
    /// Validation could not run at all, e.g. a key file is missing.
    ValidationFailed(TokenError),
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthFailure::NoCredential => f.write_str("no credential"),
            AuthFailure::EmptyCredential => f.write_str("empty credential"),
            AuthFailure::MissingSubject => f.write_str("missing subject"),
            AuthFailure::InvalidSubject => f.write_str("invalid subject"),
            AuthFailure::Rejected(e) => write!(f, "{}", e),
            AuthFailure::ValidationFailed(_) => f.write_str("token validation failed"),
        }
    }
}

/// Result of authenticating one request.
#[derive(Debug)]
pub enum AuthenticationOutcome {
    Authenticated(Principal),
    Failed(AuthFailure),
}

impl AuthenticationOutcome {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            AuthenticationOutcome::Authenticated(principal) => Some(principal),
            AuthenticationOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&AuthFailure> {
        match self {
            AuthenticationOutcome::Authenticated(_) => None,
            AuthenticationOutcome::Failed(failure) => Some(failure),
        }
    }
}

/// Determines the caller from the `Authorization` header. Never fails; every problem
/// becomes `AuthenticationOutcome::Failed`.
pub fn authenticate(headers: &HeaderMap, tokens: &TokenService) -> AuthenticationOutcome {
    let value = match headers.get(header::AUTHORIZATION) {
        Some(value) => value,
        None => return AuthenticationOutcome::Failed(AuthFailure::NoCredential),
    };
    let value = match value.to_str() {
        Ok(value) => value,
        Err(_) => {
            return AuthenticationOutcome::Failed(AuthFailure::Rejected(TokenError::Malformed(
                "authorization header is not visible ASCII".into(),
            )))
        }
    };

    let token = strip_bearer(value).trim();
    if token.is_empty() {
        return AuthenticationOutcome::Failed(AuthFailure::EmptyCredential);
    }

    match tokens.validate_access_token(token) {
        Ok(claims) => principal_from(claims),
        Err(e) if e.is_credential_error() => AuthenticationOutcome::Failed(AuthFailure::Rejected(e)),
        Err(e) => AuthenticationOutcome::Failed(AuthFailure::ValidationFailed(e)),
    }
}

fn strip_bearer(value: &str) -> &str {
    let value = value.trim();
    // Header parsers drop trailing whitespace, so "Bearer " arrives as "Bearer".
    if value.eq_ignore_ascii_case(BEARER_PREFIX.trim_end()) {
        return "";
    }
    match value.get(..BEARER_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(BEARER_PREFIX) => &value[BEARER_PREFIX.len()..],
        _ => value,
    }
}

fn principal_from(claims: ClaimSet) -> AuthenticationOutcome {
    let user_id = match claims.subject_claim() {
        Some(subject) => match subject.parse::<i32>() {
            Ok(id) => id,
            Err(_) => return AuthenticationOutcome::Failed(AuthFailure::InvalidSubject),
        },
        None => return AuthenticationOutcome::Failed(AuthFailure::MissingSubject),
    };
    AuthenticationOutcome::Authenticated(Principal { user_id, claims })
}

fn log_outcome(path: &str, outcome: &AuthenticationOutcome) {
    match outcome {
        AuthenticationOutcome::Authenticated(principal) => {
            debug!("{}: authenticated user {}", path, principal.user_id)
        }
        AuthenticationOutcome::Failed(AuthFailure::NoCredential) => {
            debug!("{}: no credential presented", path)
        }
        AuthenticationOutcome::Failed(AuthFailure::Rejected(e)) if e.is_suspicious() => {
            warn!("{}: credential rejected: {}", path, e)
        }
        AuthenticationOutcome::Failed(AuthFailure::Rejected(e)) if e.is_expired() => {
            debug!("{}: credential expired", path)
        }
        AuthenticationOutcome::Failed(AuthFailure::ValidationFailed(e)) => {
            error!("{}: token validation failed: {}", path, e)
        }
        AuthenticationOutcome::Failed(failure) => info!("{}: unauthenticated: {}", path, failure),
    }
}

pub struct AuthMiddleware {
    tokens: web::Data<TokenService>,
}

impl AuthMiddleware {
    pub fn new(tokens: web::Data<TokenService>) -> Self {
        Self { tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service,
            tokens: self.tokens.clone(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
    tokens: web::Data<TokenService>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let outcome = authenticate(req.headers(), &self.tokens);
        log_outcome(req.path(), &outcome);
        req.extensions_mut().insert(outcome);

        Box::pin(self.service.call(req))
    }
}
