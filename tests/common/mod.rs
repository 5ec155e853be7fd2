//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use actix_web::web;
use chrono::Utc;
use lazy_static::lazy_static;
use libraryhub::auth::keys::{write_key_pair, KeyEncoding};
use libraryhub::models::{InMemoryUserRepository, User, UserRepository};
use libraryhub::{JwtSettings, KeyStore, TokenService};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const READER_PASSWORD: &str = "Password123!";

pub struct TestKeys {
    pub dir: PathBuf,
    _dir: TempDir,
}

lazy_static! {
    static ref TEST_KEYS: TestKeys = {
        let dir = tempfile::tempdir().unwrap();
        for purpose in ["signing", "encryption"] {
            write_key_pair(
                &dir.path().join(format!("{}.pem", purpose)),
                &dir.path().join(format!("{}.pub.pem", purpose)),
                2048,
                KeyEncoding::Pem,
            )
            .unwrap();
        }
        TestKeys {
            dir: dir.path().to_path_buf(),
            _dir: dir,
        }
    };
}

pub fn settings() -> JwtSettings {
    let dir = &TEST_KEYS.dir;
    JwtSettings {
        issuer: "libraryhub-it".into(),
        audience: "libraryhub-spa".into(),
        signing_private_key_path: dir.join("signing.pem"),
        signing_public_key_path: dir.join("signing.pub.pem"),
        encryption_private_key_path: dir.join("encryption.pem"),
        encryption_public_key_path: dir.join("encryption.pub.pem"),
        signing_key_id: "sig-it".into(),
        encryption_key_id: "enc-it".into(),
        access_cookie_name: "access_token".into(),
        refresh_cookie_name: "refresh_token".into(),
        access_token_minutes: 10,
        refresh_token_days: 14,
    }
}

pub fn token_service() -> TokenService {
    TokenService::new(settings(), Arc::new(KeyStore::new()))
}

pub fn users() -> web::Data<dyn UserRepository> {
    let repo = InMemoryUserRepository::new();
    repo.insert(User {
        id: 42,
        username: "reader".into(),
        email: "reader@library.test".into(),
        role: "Member".into(),
        password_hash: bcrypt::hash(READER_PASSWORD, 4).unwrap(),
        created_at: Utc::now(),
    });
    let repo: Arc<dyn UserRepository> = Arc::new(repo);
    web::Data::from(repo)
}
