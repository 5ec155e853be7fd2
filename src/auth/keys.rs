//! # Token key material
//!
//! Loads the two RSA key pairs behind nested tokens: the signing pair (private half signs the
//! inner token, public half verifies it) and the encryption pair (public half wraps the content
//! key of the outer token, private half unwraps it).
//!
//! Key files may be text-armored (PEM) or binary (DER). The encoding is detected from the file
//! contents: anything carrying a `-----BEGIN` / `-----END` marker is read as PEM, everything
//! else as DER. Private keys are accepted as PKCS#8 or PKCS#1, public keys as
//! SubjectPublicKeyInfo (PEM additionally accepts PKCS#1 `RSA PUBLIC KEY`).
//!
//! Parsed keys are cached in a [`KeyStore`] for the lifetime of the process. There is no
//! rotation: once a path has been loaded for a role, it is never read again.

use anyhow::{Context, Result};
use jsonwebtoken::{DecodingKey, EncodingKey};
use log::{error, info};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::error::TokenError;

const PEM_BEGIN: &[u8] = b"-----BEGIN";
const PEM_END: &[u8] = b"-----END";

/// What a key file is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    SigningPrivate,
    SigningPublic,
    EncryptionPrivate,
    EncryptionPublic,
}

impl KeyRole {
    fn is_private(self) -> bool {
        matches!(self, KeyRole::SigningPrivate | KeyRole::EncryptionPrivate)
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            KeyRole::SigningPrivate => "signing private key",
            KeyRole::SigningPublic => "signing public key",
            KeyRole::EncryptionPrivate => "encryption private key",
            KeyRole::EncryptionPublic => "encryption public key",
        };
        f.write_str(name)
    }
}

/// On-disk key encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    /// Text armored, `-----BEGIN ...-----`.
    Pem,
    /// Raw ASN.1 DER.
    Der,
}

impl KeyEncoding {
    /// Guesses the encoding from file contents.
    ///
    /// This is a heuristic: binary data that happens to contain both markers is treated as PEM
    /// and will then fail to parse as PEM.
    pub fn detect(bytes: &[u8]) -> Self {
        if contains(bytes, PEM_BEGIN) && contains(bytes, PEM_END) {
            KeyEncoding::Pem
        } else {
            KeyEncoding::Der
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// A parsed key, ready for the operation its role implies.
pub enum KeyHandle {
    SigningPrivate(EncodingKey),
    SigningPublic(DecodingKey),
    EncryptionPrivate(RsaPrivateKey),
    EncryptionPublic(RsaPublicKey),
}

// Key material stays out of debug output.
impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self {
            KeyHandle::SigningPrivate(_) => KeyRole::SigningPrivate,
            KeyHandle::SigningPublic(_) => KeyRole::SigningPublic,
            KeyHandle::EncryptionPrivate(_) => KeyRole::EncryptionPrivate,
            KeyHandle::EncryptionPublic(_) => KeyRole::EncryptionPublic,
        };
        f.debug_tuple("KeyHandle").field(&role).finish()
    }
}

impl KeyHandle {
    pub fn encoding_key(&self) -> Option<&EncodingKey> {
        match self {
            KeyHandle::SigningPrivate(key) => Some(key),
            _ => None,
        }
    }

    pub fn decoding_key(&self) -> Option<&DecodingKey> {
        match self {
            KeyHandle::SigningPublic(key) => Some(key),
            _ => None,
        }
    }

    pub fn rsa_private_key(&self) -> Option<&RsaPrivateKey> {
        match self {
            KeyHandle::EncryptionPrivate(key) => Some(key),
            _ => None,
        }
    }

    pub fn rsa_public_key(&self) -> Option<&RsaPublicKey> {
        match self {
            KeyHandle::EncryptionPublic(key) => Some(key),
            _ => None,
        }
    }
}

/// Process-wide cache of parsed keys, keyed by path and role.
///
/// Construct one per process and share it by `Arc` with everything that issues or validates
/// tokens. Loads are serialized behind a single mutex so a given entry is parsed at most once;
/// cache hits only take the read side of an `RwLock`.
#[derive(Debug, Default)]
pub struct KeyStore {
    cache: RwLock<HashMap<(PathBuf, KeyRole), Arc<KeyHandle>>>,
    load_lock: Mutex<()>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the key at `path` parsed for `role`, loading it on first use.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::KeyLoad` if the file cannot be read or decoded.
    pub fn get(&self, path: &Path, role: KeyRole) -> Result<Arc<KeyHandle>, TokenError> {
        if let Some(handle) = self.cached(path, role) {
            return Ok(handle);
        }

        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have loaded it while we waited.
        if let Some(handle) = self.cached(path, role) {
            return Ok(handle);
        }

        let handle = match load_key(path, role) {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                error!("{}", e);
                return Err(e);
            }
        };
        info!("loaded {} from {}", role, path.display());

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((path.to_path_buf(), role), Arc::clone(&handle));
        Ok(handle)
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cached(&self, path: &Path, role: KeyRole) -> Option<Arc<KeyHandle>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(path.to_path_buf(), role))
            .cloned()
    }
}

/// Reads and parses one key file. Not cached; use [`KeyStore::get`].
pub fn load_key(path: &Path, role: KeyRole) -> Result<KeyHandle, TokenError> {
    let bytes = fs::read(path).map_err(|e| TokenError::key_load(path, e))?;
    let encoding = KeyEncoding::detect(&bytes);

    if role.is_private() {
        let key = parse_private_key(&bytes, encoding).map_err(|reason| TokenError::key_load(path, reason))?;
        match role {
            KeyRole::SigningPrivate => {
                let der = key
                    .to_pkcs1_der()
                    .map_err(|e| TokenError::key_load(path, e))?;
                Ok(KeyHandle::SigningPrivate(EncodingKey::from_rsa_der(der.as_bytes())))
            }
            _ => Ok(KeyHandle::EncryptionPrivate(key)),
        }
    } else {
        let key = parse_public_key(&bytes, encoding).map_err(|reason| TokenError::key_load(path, reason))?;
        match role {
            KeyRole::SigningPublic => {
                let der = key
                    .to_pkcs1_der()
                    .map_err(|e| TokenError::key_load(path, e))?;
                Ok(KeyHandle::SigningPublic(DecodingKey::from_rsa_der(der.as_bytes())))
            }
            _ => Ok(KeyHandle::EncryptionPublic(key)),
        }
    }
}

fn armored_text(bytes: &[u8]) -> Result<&str, String> {
    let text = std::str::from_utf8(bytes).map_err(|_| "armored key is not valid UTF-8".to_string())?;
    // Tolerate leading comments or whitespace before the armor.
    let start = text.find("-----BEGIN").unwrap_or(0);
    Ok(text[start..].trim_end())
}

fn parse_private_key(bytes: &[u8], encoding: KeyEncoding) -> Result<RsaPrivateKey, String> {
    match encoding {
        KeyEncoding::Pem => {
            let text = armored_text(bytes)?;
            RsaPrivateKey::from_pkcs8_pem(text)
                .or_else(|_| RsaPrivateKey::from_pkcs1_pem(text))
                .map_err(|e| format!("not a PKCS#8 or PKCS#1 PEM private key ({})", e))
        }
        KeyEncoding::Der => RsaPrivateKey::from_pkcs8_der(bytes)
            .or_else(|_| RsaPrivateKey::from_pkcs1_der(bytes))
            .map_err(|e| format!("not a PKCS#8 or PKCS#1 DER private key ({})", e)),
    }
}

fn parse_public_key(bytes: &[u8], encoding: KeyEncoding) -> Result<RsaPublicKey, String> {
    match encoding {
        KeyEncoding::Pem => {
            let text = armored_text(bytes)?;
            RsaPublicKey::from_public_key_pem(text)
                .or_else(|_| RsaPublicKey::from_pkcs1_pem(text))
                .map_err(|e| format!("not a SubjectPublicKeyInfo or PKCS#1 PEM public key ({})", e))
        }
        KeyEncoding::Der => RsaPublicKey::from_public_key_der(bytes)
            .map_err(|e| format!("not a SubjectPublicKeyInfo DER public key ({})", e)),
    }
}

/// Generates an RSA key pair and writes it as PKCS#8 / SubjectPublicKeyInfo.
pub fn write_key_pair(
    private_path: &Path,
    public_path: &Path,
    bits: usize,
    encoding: KeyEncoding,
) -> Result<()> {
    let mut rng = rsa::rand_core::OsRng;
    let private_key =
        RsaPrivateKey::new(&mut rng, bits).context("Failed to generate RSA private key")?;
    let public_key = RsaPublicKey::from(&private_key);

    let (private_bytes, public_bytes) = match encoding {
        KeyEncoding::Pem => {
            let private_pem = private_key
                .to_pkcs8_pem(LineEnding::LF)
                .context("Failed to encode private key to PEM")?;
            let public_pem = public_key
                .to_public_key_pem(LineEnding::LF)
                .context("Failed to encode public key to PEM")?;
            (private_pem.as_bytes().to_vec(), public_pem.into_bytes())
        }
        KeyEncoding::Der => {
            let private_der = private_key
                .to_pkcs8_der()
                .context("Failed to encode private key to DER")?;
            let public_der = public_key
                .to_public_key_der()
                .context("Failed to encode public key to DER")?;
            (private_der.as_bytes().to_vec(), public_der.as_bytes().to_vec())
        }
    };

    fs::write(private_path, private_bytes)
        .with_context(|| format!("Failed to write private key to {:?}", private_path))?;
    fs::write(public_path, public_bytes)
        .with_context(|| format!("Failed to write public key to {:?}", public_path))?;
    Ok(())
}
