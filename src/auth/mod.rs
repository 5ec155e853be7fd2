pub mod claims;
pub mod clock;
pub mod extractors;
pub mod jwe;
pub mod keys;
pub mod middleware;
pub mod password;
pub mod token;

use serde::{Deserialize, Serialize};
use validator::Validate;

// Re-export necessary items
pub use claims::{ClaimSet, TokenKind};
pub use extractors::AuthenticatedUser;
pub use keys::KeyStore;
pub use middleware::{authenticate, AuthMiddleware, AuthenticationOutcome, Principal};
pub use password::verify_password;
pub use token::TokenService;

pub const TOKEN_TYPE: &str = "Bearer";

/// Represents the payload for a user login request.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// User's email address.
    /// Must be a valid email format.
    #[validate(email)]
    pub email: String,
    /// User's password.
    /// Must be at least 6 characters long.
    #[validate(length(min = 6))]
    pub password: String,
    /// Optional client device label, bound into the refresh token.
    #[serde(default, rename = "deviceId")]
    #[validate(length(max = 128))]
    pub device_id: Option<String>,
}

/// Represents the payload for exchanging a refresh token.
///
/// Not validated up front: an empty token is rejected by the token service like any other
/// unusable one.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Tokens handed to the client after login or refresh.
///
/// `expires_in` is the access token lifetime in seconds. A refresh response carries no new
/// refresh token; the client keeps using the one it has until it expires.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenResponse {
    pub fn new(access_token: String, refresh_token: Option<String>, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: TOKEN_TYPE.to_string(),
            expires_in,
        }
    }
}

/// The caller as seen by `GET /api/auth/me`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub user_id: i32,
    pub email: Option<String>,
    pub role: Option<String>,
}

impl From<&Principal> for CurrentUser {
    fn from(principal: &Principal) -> Self {
        Self {
            user_id: principal.user_id,
            email: principal.email().map(str::to_string),
            role: principal.role().map(str::to_string),
        }
    }
}
