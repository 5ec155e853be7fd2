//! # Error types
//!
//! `TokenError` is the typed failure of the token core: key loading, issuing and
//! validating nested tokens. Each variant is one failure kind so callers can tell a
//! misconfigured server (`KeyLoad`) apart from a bad credential (`Malformed`,
//! `Decryption`, `Signature`, `ClaimValidation`).
//!
//! `AppError` is what handlers return. It renders as `{"error": "..."}` with the matching
//! status code, and never exposes database or key details to the client.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use validator::ValidationErrors;

use crate::auth::claims::TokenKind;

/// Failure kinds of the token core.
#[derive(Debug, Error)]
pub enum TokenError {
    /// A key file is missing, unreadable, or in no format we can decode.
    /// This is a deployment fault, not a caller problem.
    #[error("failed to load key from {}: {reason}", path.display())]
    KeyLoad { path: PathBuf, reason: String },

    /// The credential is empty or not a compact encrypted token.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The outer encrypted layer could not be opened.
    #[error("token decryption failed: {0}")]
    Decryption(String),

    /// The inner signed token failed verification.
    #[error("token signature rejected: {0}")]
    Signature(String),

    /// Signature was fine but the claims are not acceptable.
    #[error("token claims rejected: {0}")]
    ClaimValidation(ClaimFailure),

    /// Building a token failed (serialization or a crypto primitive refused its input).
    #[error("token construction failed: {0}")]
    Encoding(String),
}

/// Why a verified claim set was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimFailure {
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("issuer mismatch")]
    Issuer,
    #[error("audience mismatch")]
    Audience,
    #[error("expected {expected} token, got {actual}")]
    WrongKind {
        expected: TokenKind,
        actual: TokenKind,
    },
    #[error("missing or invalid claim: {0}")]
    Malformed(String),
}

impl TokenError {
    pub(crate) fn key_load(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        TokenError::KeyLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for the routine "token ran out" case that should trigger a refresh.
    pub fn is_expired(&self) -> bool {
        matches!(self, TokenError::ClaimValidation(ClaimFailure::Expired))
    }

    /// Decryption and signature failures may indicate tampering.
    pub fn is_suspicious(&self) -> bool {
        matches!(self, TokenError::Decryption(_) | TokenError::Signature(_))
    }

    /// True when the error is about the presented credential rather than the server.
    pub fn is_credential_error(&self) -> bool {
        !matches!(self, TokenError::KeyLoad { .. } | TokenError::Encoding(_))
    }
}

/// Handler-level error, rendered as a JSON body by actix.
#[derive(Debug)]
pub enum AppError {
    /// 401. The message is shown to the client as is.
    Unauthorized(String),
    /// 400.
    BadRequest(String),
    /// 404.
    NotFound(String),
    /// 500. The message is shown to the client, so keep it generic.
    InternalServerError(String),
    /// 500. The detail is logged; the client gets a generic message.
    DatabaseError(String),
    /// 422, carrying the `validator` report.
    ValidationError(String),
}

impl AppError {
    fn public_message(&self) -> &str {
        match self {
            AppError::Unauthorized(msg)
            | AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::InternalServerError(msg)
            | AppError::ValidationError(msg) => msg,
            AppError::DatabaseError(_) => "Internal Server Error",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            AppError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database Error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InternalServerError(_) | AppError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.public_message() }))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        match error {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".into()),
            _ => {
                log::error!("database error: {}", error);
                AppError::DatabaseError(error.to_string())
            }
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        AppError::ValidationError(error.to_string())
    }
}

/// Server-side faults become a 500 and every credential fault becomes the same
/// generic 401. The specific kind is logged, never sent to the client.
impl From<TokenError> for AppError {
    fn from(error: TokenError) -> AppError {
        if error.is_credential_error() {
            log::debug!("rejecting credential: {}", error);
            AppError::Unauthorized("Unauthorized".into())
        } else {
            log::error!("token service failure: {}", error);
            AppError::InternalServerError("Internal Server Error".into())
        }
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> AppError {
        log::error!("password hashing failed: {}", error);
        AppError::InternalServerError("Internal Server Error".into())
    }
}
