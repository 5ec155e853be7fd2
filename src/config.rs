//! Environment-driven configuration.
//!
//! Everything is read through a lookup function so the parsing can be exercised without
//! mutating the process environment. `Config::from_env` plugs in `std::env::var`.

use chrono::Duration;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_ACCESS_TOKEN_MINUTES: i64 = 10;
pub const DEFAULT_REFRESH_TOKEN_DAYS: i64 = 14;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has an invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
}

pub struct Config {
    pub database_url: String,
    pub server_port: u16,
    pub server_host: String,
    pub jwt: JwtSettings,
}

/// The token service configuration block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwtSettings {
    pub issuer: String,
    pub audience: String,
    pub signing_private_key_path: PathBuf,
    pub signing_public_key_path: PathBuf,
    pub encryption_private_key_path: PathBuf,
    pub encryption_public_key_path: PathBuf,
    pub signing_key_id: String,
    pub encryption_key_id: String,
    /// Cookie names are part of the deployment block; the bearer flow never reads them.
    pub access_cookie_name: String,
    pub refresh_cookie_name: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_port = match lookup("SERVER_PORT") {
            Some(value) => value.parse::<u16>().map_err(|_| ConfigError::Invalid {
                var: "SERVER_PORT",
                value,
            })?,
            None => 8080,
        };

        Ok(Self {
            database_url: required(&lookup, "DATABASE_URL")?,
            server_port,
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            jwt: JwtSettings::from_lookup(&lookup)?,
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}

impl JwtSettings {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key_dir = lookup("JWT_KEY_DIR").map(PathBuf::from);
        let key_path = |var: &'static str| -> Result<PathBuf, ConfigError> {
            Ok(resolve(key_dir.as_deref(), required(lookup, var)?))
        };

        let (access_token_minutes, access) = lifetime(
            lookup,
            "JWT_ACCESS_TOKEN_MINUTES",
            DEFAULT_ACCESS_TOKEN_MINUTES,
            Duration::try_minutes,
        )?;
        let (refresh_token_days, refresh) = lifetime(
            lookup,
            "JWT_REFRESH_TOKEN_DAYS",
            DEFAULT_REFRESH_TOKEN_DAYS,
            Duration::try_days,
        )?;
        if refresh <= access {
            return Err(ConfigError::Invalid {
                var: "JWT_REFRESH_TOKEN_DAYS",
                value: refresh_token_days.to_string(),
            });
        }

        Ok(Self {
            issuer: required(lookup, "JWT_ISSUER")?,
            audience: required(lookup, "JWT_AUDIENCE")?,
            signing_private_key_path: key_path("JWT_SIGNING_PRIVATE_KEY")?,
            signing_public_key_path: key_path("JWT_SIGNING_PUBLIC_KEY")?,
            encryption_private_key_path: key_path("JWT_ENCRYPTION_PRIVATE_KEY")?,
            encryption_public_key_path: key_path("JWT_ENCRYPTION_PUBLIC_KEY")?,
            signing_key_id: required(lookup, "JWT_SIGNING_KEY_ID")?,
            encryption_key_id: required(lookup, "JWT_ENCRYPTION_KEY_ID")?,
            access_cookie_name: lookup("JWT_ACCESS_COOKIE").unwrap_or_else(|| "access_token".to_string()),
            refresh_cookie_name: lookup("JWT_REFRESH_COOKIE").unwrap_or_else(|| "refresh_token".to_string()),
            access_token_minutes,
            refresh_token_days,
        })
    }

    /// Out-of-range values (only possible when the fields are set by hand) count as zero.
    pub fn access_lifetime(&self) -> Duration {
        Duration::try_minutes(self.access_token_minutes).unwrap_or_else(Duration::zero)
    }

    pub fn refresh_lifetime(&self) -> Duration {
        Duration::try_days(self.refresh_token_days).unwrap_or_else(Duration::zero)
    }
}

fn required<F>(lookup: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(var)),
    }
}

// A non-negative count that `to_duration` can represent.
fn lifetime<F>(
    lookup: &F,
    var: &'static str,
    default: i64,
    to_duration: fn(i64) -> Option<Duration>,
) -> Result<(i64, Duration), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = match lookup(var) {
        Some(value) => value,
        None => return Ok((default, to_duration(default).unwrap_or_else(Duration::zero))),
    };
    match value.trim().parse::<i64>() {
        Ok(n) if n >= 0 => match to_duration(n) {
            Some(duration) => Ok((n, duration)),
            None => Err(ConfigError::Invalid { var, value }),
        },
        _ => Err(ConfigError::Invalid { var, value }),
    }
}

fn resolve(base: Option<&Path>, value: String) -> PathBuf {
    let path = PathBuf::from(value);
    match base {
        Some(base) if path.is_relative() => base.join(path),
        _ => path,
    }
}
