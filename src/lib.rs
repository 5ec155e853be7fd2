#![doc = "The `libraryhub` library crate."]
#![doc = ""]
#![doc = "Authentication core of the LibraryHub backend: RSA key loading, nested"]
#![doc = "encrypted tokens (an RS256-signed JWT inside an RSA-OAEP-256/A256GCM JWE),"]
#![doc = "the request authentication middleware and the `/api/auth` routes."]
#![doc = "The main binary (`main.rs`) wires these into an actix-web server."]

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;

#[cfg(test)]
mod testutil;

pub use crate::auth::{KeyStore, TokenService};
pub use crate::config::{Config, JwtSettings};
pub use crate::error::{AppError, TokenError};
