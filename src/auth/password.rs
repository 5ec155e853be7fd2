use crate::error::AppError;
use bcrypt::verify;

/// Checks a login password against a stored bcrypt hash.
///
/// A stored hash that bcrypt cannot parse is reported as an error, not as a mismatch, so a
/// corrupted user row shows up in the logs instead of as a stream of failed logins.
pub fn verify_password(password: &str, hashed_password: &str) -> Result<bool, AppError> {
    verify(password, hashed_password)
        .map_err(|e| AppError::InternalServerError(format!("Failed to verify password: {}", e)))
}
