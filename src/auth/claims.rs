use chrono::{DateTime, Duration, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Legacy claim name some clients still use for the user id.
pub const SUBJECT_ALIAS: &str = "nameid";

/// Claim names owned by the token service. Extra claims can never shadow them.
pub const RESERVED_CLAIMS: &[&str] = &[
    "sub", "email", "role", "jti", "iss", "aud", "iat", "nbf", "exp", "typ", "device_id",
];

/// Distinguishes short-lived access tokens from long-lived refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// The payload carried inside the signed inner token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    /// User id as a decimal string.
    #[serde(rename = "sub", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Unique per token. Nothing consumes it yet; it exists for revocation and audit trails.
    #[serde(rename = "jti")]
    pub token_id: String,
    #[serde(rename = "iss")]
    pub issuer: String,
    #[serde(rename = "aud")]
    pub audience: String,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "nbf")]
    pub not_before: i64,
    #[serde(rename = "exp")]
    pub expires_at: i64,
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Caller supplied string claims, in insertion order.
    #[serde(flatten, with = "extra_claims")]
    pub extra: Vec<(String, String)>,
}

impl ClaimSet {
    /// Builds the fixed part of a claim set; `exp` is always `issued_at + lifetime`.
    pub fn new(
        kind: TokenKind,
        subject: String,
        issuer: &str,
        audience: &str,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        let iat = issued_at.timestamp();
        Self {
            subject: Some(subject),
            email: None,
            role: None,
            token_id: uuid::Uuid::new_v4().to_string(),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            issued_at: iat,
            not_before: iat,
            expires_at: iat + lifetime.num_seconds(),
            kind,
            device_id: None,
            extra: Vec::new(),
        }
    }

    /// Appends extra string claims. Reserved names are dropped; a repeated name overwrites.
    pub fn with_extra_claims(mut self, claims: &[(String, String)]) -> Self {
        for (name, value) in claims {
            if RESERVED_CLAIMS.contains(&name.as_str()) {
                warn!("dropping extra claim '{}': name is reserved", name);
                continue;
            }
            match self.extra.iter_mut().find(|(existing, _)| existing == name) {
                Some(entry) => entry.1 = value.clone(),
                None => self.extra.push((name.clone(), value.clone())),
            }
        }
        self
    }

    pub fn extra_claim(&self, name: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(claim, _)| claim == name)
            .map(|(_, value)| value.as_str())
    }

    /// The user id claim: `sub` first, then the legacy alias.
    pub fn subject_claim(&self) -> Option<&str> {
        self.subject
            .as_deref()
            .or_else(|| self.extra_claim(SUBJECT_ALIAS))
    }

    pub fn lifetime(&self) -> Duration {
        Duration::seconds(self.expires_at - self.issued_at)
    }
}

mod extra_claims {
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(
        claims: &[(String, String)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(claims.len()))?;
        for (name, value) in claims {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }

    // Non-string leftovers are ignored.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, String)>, D::Error> {
        let raw = serde_json::Map::<String, Value>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .filter_map(|(name, value)| match value {
                Value::String(s) => Some((name, s)),
                _ => None,
            })
            .collect())
    }
}
