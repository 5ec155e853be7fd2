use chrono::Duration;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, Header, Validation};
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;

use crate::auth::claims::{ClaimSet, TokenKind};
use crate::auth::clock::{system_clock, Clock};
use crate::auth::jwe;
use crate::auth::keys::{KeyHandle, KeyRole, KeyStore};
use crate::config::JwtSettings;
use crate::error::{ClaimFailure, TokenError};

/// Tolerance applied to both ends of the validity window to absorb clock drift between hosts.
pub const CLOCK_SKEW_SECONDS: i64 = 30;

const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

/// Issues and validates nested tokens: an RS256-signed JWT encrypted into a compact JWE.
///
/// The service is stateless apart from the shared [`KeyStore`]; nothing it issues is stored.
/// Share one instance across workers (`web::Data<TokenService>`).
pub struct TokenService {
    settings: JwtSettings,
    keys: Arc<KeyStore>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(settings: JwtSettings, keys: Arc<KeyStore>) -> Self {
        Self {
            settings,
            keys,
            clock: system_clock(),
        }
    }

    /// Replaces the wall clock, mostly for tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn access_lifetime(&self) -> Duration {
        self.settings.access_lifetime()
    }

    pub fn refresh_lifetime(&self) -> Duration {
        self.settings.refresh_lifetime()
    }

    /// Issues a short-lived access token.
    ///
    /// Extra claims are flattened into the payload in the given order; names the service owns
    /// (`sub`, `exp`, `typ`, ...) are dropped.
    ///
    /// # Errors
    ///
    /// `KeyLoad` when the signing or encryption key cannot be loaded.
    pub fn issue_access_token(
        &self,
        user_id: i32,
        email: Option<&str>,
        role: Option<&str>,
        extra_claims: &[(String, String)],
    ) -> Result<String, TokenError> {
        let mut claims = ClaimSet::new(
            TokenKind::Access,
            user_id.to_string(),
            &self.settings.issuer,
            &self.settings.audience,
            self.clock.now(),
            self.access_lifetime(),
        )
        .with_extra_claims(extra_claims);
        claims.email = email.map(str::to_string);
        claims.role = role.map(str::to_string);

        self.seal(&claims)
    }

    /// Issues a long-lived refresh token carrying only the subject and an optional device id.
    ///
    /// # Errors
    ///
    /// `KeyLoad` when the signing or encryption key cannot be loaded.
    pub fn issue_refresh_token(
        &self,
        user_id: i32,
        device_id: Option<&str>,
    ) -> Result<String, TokenError> {
        let mut claims = ClaimSet::new(
            TokenKind::Refresh,
            user_id.to_string(),
            &self.settings.issuer,
            &self.settings.audience,
            self.clock.now(),
            self.refresh_lifetime(),
        );
        claims.device_id = device_id.map(str::to_string);

        self.seal(&claims)
    }

    /// Validates an access token. A refresh token is rejected with `ClaimFailure::WrongKind`.
    ///
    /// # Errors
    ///
    /// One of `Malformed`, `Decryption`, `Signature`, `ClaimValidation` for a bad credential,
    /// `KeyLoad` for a server-side key problem.
    pub fn validate_access_token(&self, token: &str) -> Result<ClaimSet, TokenError> {
        self.validate(token, TokenKind::Access)
    }

    /// Validates a refresh token. An access token is rejected with `ClaimFailure::WrongKind`.
    ///
    /// Callers on the refresh path usually collapse every error into "log in again".
    ///
    /// # Errors
    ///
    /// Same kinds as [`validate_access_token`](Self::validate_access_token).
    pub fn validate_refresh_token(&self, token: &str) -> Result<ClaimSet, TokenError> {
        self.validate(token, TokenKind::Refresh)
    }

    // Sign, then encrypt the signed token.
    fn seal(&self, claims: &ClaimSet) -> Result<String, TokenError> {
        let signing = self.key(&self.settings.signing_private_key_path, KeyRole::SigningPrivate)?;
        let encoding_key = signing
            .encoding_key()
            .ok_or_else(|| self.wrong_role(&self.settings.signing_private_key_path))?;

        let mut header = Header::new(SIGNING_ALGORITHM);
        header.kid = Some(self.settings.signing_key_id.clone());
        let signed = encode(&header, claims, encoding_key)
            .map_err(|e| TokenError::Encoding(format!("signing failed: {}", e)))?;

        let encryption = self.key(&self.settings.encryption_public_key_path, KeyRole::EncryptionPublic)?;
        let public_key = encryption
            .rsa_public_key()
            .ok_or_else(|| self.wrong_role(&self.settings.encryption_public_key_path))?;

        jwe::encrypt(signed.as_bytes(), public_key, &self.settings.encryption_key_id)
    }

    // Strictly: structure, decrypt, verify signature, then claims.
    fn validate(&self, token: &str, expected: TokenKind) -> Result<ClaimSet, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Malformed("empty token".into()));
        }
        jwe::decode_header(token)?;

        let decryption = self.key(&self.settings.encryption_private_key_path, KeyRole::EncryptionPrivate)?;
        let private_key = decryption
            .rsa_private_key()
            .ok_or_else(|| self.wrong_role(&self.settings.encryption_private_key_path))?;
        let inner = jwe::decrypt(token, private_key, &self.settings.encryption_key_id)?;
        let inner = String::from_utf8(inner)
            .map_err(|_| TokenError::Signature("inner token is not UTF-8".into()))?;

        let claims = self.verify_signature(&inner)?;
        self.check_claims(&claims, expected)?;

        debug!(
            "validated {} token {} for subject {:?}",
            claims.kind, claims.token_id, claims.subject
        );
        Ok(claims)
    }

    fn verify_signature(&self, inner: &str) -> Result<ClaimSet, TokenError> {
        let header = decode_header(inner)
            .map_err(|e| TokenError::Signature(format!("unreadable inner header: {}", e)))?;
        if header.alg != SIGNING_ALGORITHM {
            return Err(TokenError::Signature(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        if header.kid.as_deref() != Some(self.settings.signing_key_id.as_str()) {
            return Err(TokenError::Signature("unknown signing key id".into()));
        }

        let verification = self.key(&self.settings.signing_public_key_path, KeyRole::SigningPublic)?;
        let decoding_key = verification
            .decoding_key()
            .ok_or_else(|| self.wrong_role(&self.settings.signing_public_key_path))?;

        // Only the signature is checked here; claims get their own pass with our clock.
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        decode::<ClaimSet>(inner, decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::Json(_) => TokenError::ClaimValidation(ClaimFailure::Malformed(e.to_string())),
                _ => TokenError::Signature(e.to_string()),
            })
    }

    fn check_claims(&self, claims: &ClaimSet, expected: TokenKind) -> Result<(), TokenError> {
        let reject = |failure| Err(TokenError::ClaimValidation(failure));

        if claims.issuer != self.settings.issuer {
            return reject(ClaimFailure::Issuer);
        }
        if claims.audience != self.settings.audience {
            return reject(ClaimFailure::Audience);
        }

        let now = self.clock.now().timestamp();
        let valid_from = claims.issued_at.max(claims.not_before);
        if now < valid_from - CLOCK_SKEW_SECONDS {
            return reject(ClaimFailure::NotYetValid);
        }
        if now > claims.expires_at + CLOCK_SKEW_SECONDS {
            return reject(ClaimFailure::Expired);
        }

        if claims.kind != expected {
            return reject(ClaimFailure::WrongKind {
                expected,
                actual: claims.kind,
            });
        }
        Ok(())
    }

    fn key(&self, path: &std::path::Path, role: KeyRole) -> Result<Arc<KeyHandle>, TokenError> {
        self.keys.get(path, role)
    }

    fn wrong_role(&self, path: &std::path::Path) -> TokenError {
        TokenError::key_load(path, "cached key has a different role")
    }
}
