//! Shared fixtures for unit tests.
//!
//! RSA key generation is slow, so every key pair is generated once per test binary and
//! written to a temporary directory that lives until the process exits.

use lazy_static::lazy_static;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use crate::auth::keys::{write_key_pair, KeyEncoding, KeyStore};
use crate::auth::token::TokenService;
use crate::config::JwtSettings;

pub struct KeyPaths {
    pub signing_private: PathBuf,
    pub signing_public: PathBuf,
    pub encryption_private: PathBuf,
    pub encryption_public: PathBuf,
}

pub struct FixtureKeys {
    /// PKCS#8 / SPKI PEM files.
    pub pem: KeyPaths,
    /// The same keys as `pem`, DER encoded.
    pub der: KeyPaths,
    /// Unrelated key pairs.
    pub foreign: KeyPaths,
    _dir: TempDir,
}

lazy_static! {
    static ref FIXTURE_KEYS: FixtureKeys = generate_fixture_keys();
}

pub fn fixture_keys() -> &'static FixtureKeys {
    &FIXTURE_KEYS
}

fn generate_fixture_keys() -> FixtureKeys {
    let dir = tempfile::tempdir().unwrap();
    let mut pem = Vec::new();
    let mut der = Vec::new();

    for name in ["signing", "encryption"] {
        let private_key = RsaPrivateKey::new(&mut rsa::rand_core::OsRng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);

        let paths = [
            dir.path().join(format!("{}.pem", name)),
            dir.path().join(format!("{}.pub.pem", name)),
            dir.path().join(format!("{}.der", name)),
            dir.path().join(format!("{}.pub.der", name)),
        ];
        fs::write(&paths[0], private_key.to_pkcs8_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();
        fs::write(&paths[1], public_key.to_public_key_pem(LineEnding::LF).unwrap()).unwrap();
        fs::write(&paths[2], private_key.to_pkcs8_der().unwrap().as_bytes()).unwrap();
        fs::write(&paths[3], public_key.to_public_key_der().unwrap().as_bytes()).unwrap();

        let [private_pem, public_pem, private_der, public_der] = paths;
        pem.push((private_pem, public_pem));
        der.push((private_der, public_der));
    }

    let foreign_signing = (dir.path().join("foreign-signing.pem"), dir.path().join("foreign-signing.pub.pem"));
    let foreign_encryption = (
        dir.path().join("foreign-encryption.pem"),
        dir.path().join("foreign-encryption.pub.pem"),
    );
    for (private, public) in [&foreign_signing, &foreign_encryption] {
        write_key_pair(private, public, 2048, KeyEncoding::Pem).unwrap();
    }

    FixtureKeys {
        pem: key_paths(pem),
        der: key_paths(der),
        foreign: key_paths(vec![foreign_signing, foreign_encryption]),
        _dir: dir,
    }
}

fn key_paths(mut pairs: Vec<(PathBuf, PathBuf)>) -> KeyPaths {
    let (encryption_private, encryption_public) = pairs.remove(1);
    let (signing_private, signing_public) = pairs.remove(0);
    KeyPaths {
        signing_private,
        signing_public,
        encryption_private,
        encryption_public,
    }
}

pub fn settings_for(paths: &KeyPaths) -> JwtSettings {
    JwtSettings {
        issuer: "libraryhub-test".into(),
        audience: "libraryhub-test-clients".into(),
        signing_private_key_path: paths.signing_private.clone(),
        signing_public_key_path: paths.signing_public.clone(),
        encryption_private_key_path: paths.encryption_private.clone(),
        encryption_public_key_path: paths.encryption_public.clone(),
        signing_key_id: "sig-test".into(),
        encryption_key_id: "enc-test".into(),
        access_cookie_name: "access_token".into(),
        refresh_cookie_name: "refresh_token".into(),
        access_token_minutes: 10,
        refresh_token_days: 14,
    }
}

pub fn token_service(paths: &KeyPaths) -> TokenService {
    TokenService::new(settings_for(paths), Arc::new(KeyStore::new()))
}

pub fn load_rsa_private(path: &Path) -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs8_pem(&fs::read_to_string(path).unwrap()).unwrap()
}

pub fn load_rsa_public(path: &Path) -> RsaPublicKey {
    RsaPublicKey::from_public_key_pem(&fs::read_to_string(path).unwrap()).unwrap()
}
