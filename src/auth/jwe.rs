//! Compact JSON Web Encryption for the outer token layer.
//!
//! Only one algorithm pair is produced or accepted: `RSA-OAEP-256` to wrap a fresh 256-bit
//! content key, `A256GCM` to encrypt the payload. The base64url protected header is the
//! additional authenticated data, so header tampering breaks the GCM tag.
//!
//! ```text
//! BASE64URL(header) . BASE64URL(wrapped key) . BASE64URL(iv) . BASE64URL(ciphertext) . BASE64URL(tag)
//! ```

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use rsa::rand_core::OsRng;
use rsa::sha2::Sha256;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::error::TokenError;

pub const KEY_MANAGEMENT_ALGORITHM: &str = "RSA-OAEP-256";
pub const CONTENT_ENCRYPTION_ALGORITHM: &str = "A256GCM";
pub const NESTED_CONTENT_TYPE: &str = "JWT";

const CEK_LEN: usize = 32;
const TAG_LEN: usize = 16;
const SEGMENTS: usize = 5;

/// JOSE protected header of the outer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JweHeader {
    pub alg: String,
    pub enc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cty: Option<String>,
}

impl JweHeader {
    fn nested(kid: &str) -> Self {
        Self {
            alg: KEY_MANAGEMENT_ALGORITHM.to_string(),
            enc: CONTENT_ENCRYPTION_ALGORITHM.to_string(),
            kid: Some(kid.to_string()),
            cty: Some(NESTED_CONTENT_TYPE.to_string()),
        }
    }
}

/// Encrypts `payload` for the holder of the private half of `key`.
///
/// # Errors
///
/// Returns `TokenError::Encoding` if a crypto primitive rejects its input.
pub fn encrypt(payload: &[u8], key: &RsaPublicKey, kid: &str) -> Result<String, TokenError> {
    let rng = SystemRandom::new();
    let mut cek = [0u8; CEK_LEN];
    rng.fill(&mut cek)
        .map_err(|_| TokenError::Encoding("random content key generation failed".into()))?;
    let mut iv = [0u8; NONCE_LEN];
    rng.fill(&mut iv)
        .map_err(|_| TokenError::Encoding("random IV generation failed".into()))?;

    let header = serde_json::to_vec(&JweHeader::nested(kid))
        .map_err(|e| TokenError::Encoding(format!("header serialization failed: {}", e)))?;
    let header_b64 = URL_SAFE_NO_PAD.encode(header);

    let wrapped_key = key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &cek)
        .map_err(|e| TokenError::Encoding(format!("content key wrap failed: {}", e)))?;

    let sealing_key = content_key(&cek).map_err(|_| TokenError::Encoding("invalid content key".into()))?;
    let mut in_out = payload.to_vec();
    let tag = sealing_key
        .seal_in_place_separate_tag(
            Nonce::assume_unique_for_key(iv),
            Aad::from(header_b64.as_bytes()),
            &mut in_out,
        )
        .map_err(|_| TokenError::Encoding("content encryption failed".into()))?;

    Ok(format!(
        "{}.{}.{}.{}.{}",
        header_b64,
        URL_SAFE_NO_PAD.encode(wrapped_key),
        URL_SAFE_NO_PAD.encode(iv),
        URL_SAFE_NO_PAD.encode(&in_out),
        URL_SAFE_NO_PAD.encode(tag.as_ref())
    ))
}

/// Reads the protected header without decrypting anything.
///
/// # Errors
///
/// `Malformed` when the input is not five segments, `Decryption` when the header is unreadable.
pub fn decode_header(token: &str) -> Result<JweHeader, TokenError> {
    let segments = split(token)?;
    parse_header(segments[0])
}

/// Opens a compact token produced by [`encrypt`].
///
/// Rejects any header that names a different algorithm pair or key id than the ones we issue,
/// before touching the key.
///
/// # Errors
///
/// `Malformed` when the input is not five segments; `Decryption` for everything else.
pub fn decrypt(token: &str, key: &RsaPrivateKey, expected_kid: &str) -> Result<Vec<u8>, TokenError> {
    let segments = split(token)?;
    let header = parse_header(segments[0])?;

    if header.alg != KEY_MANAGEMENT_ALGORITHM || header.enc != CONTENT_ENCRYPTION_ALGORITHM {
        return Err(TokenError::Decryption(format!(
            "unsupported algorithms {}/{}",
            header.alg, header.enc
        )));
    }
    if header.kid.as_deref() != Some(expected_kid) {
        return Err(TokenError::Decryption("unknown encryption key id".into()));
    }

    let wrapped_key = decode_segment(segments[1], "encrypted key")?;
    let iv = decode_segment(segments[2], "initialization vector")?;
    let ciphertext = decode_segment(segments[3], "ciphertext")?;
    let tag = decode_segment(segments[4], "authentication tag")?;

    if tag.len() != TAG_LEN {
        return Err(TokenError::Decryption("authentication tag has wrong length".into()));
    }
    let nonce = Nonce::try_assume_unique_for_key(&iv)
        .map_err(|_| TokenError::Decryption("initialization vector has wrong length".into()))?;

    let cek = key
        .decrypt(Oaep::new::<Sha256>(), &wrapped_key)
        .map_err(|_| TokenError::Decryption("content key unwrap failed".into()))?;
    if cek.len() != CEK_LEN {
        return Err(TokenError::Decryption("content key has wrong length".into()));
    }
    let opening_key =
        content_key(&cek).map_err(|_| TokenError::Decryption("invalid content key".into()))?;

    let mut in_out = ciphertext;
    in_out.extend_from_slice(&tag);
    let plaintext_len = opening_key
        .open_in_place(nonce, Aad::from(segments[0].as_bytes()), &mut in_out)
        .map_err(|_| TokenError::Decryption("authentication tag mismatch".into()))?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}

fn split(token: &str) -> Result<Vec<&str>, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != SEGMENTS {
        return Err(TokenError::Malformed(format!(
            "expected {} segments, found {}",
            SEGMENTS,
            segments.len()
        )));
    }
    Ok(segments)
}

fn parse_header(segment: &str) -> Result<JweHeader, TokenError> {
    let bytes = decode_segment(segment, "protected header")?;
    serde_json::from_slice(&bytes)
        .map_err(|e| TokenError::Decryption(format!("unreadable protected header: {}", e)))
}

fn decode_segment(segment: &str, what: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Decryption(format!("{} is not base64url", what)))
}

fn content_key(cek: &[u8]) -> Result<LessSafeKey, ring::error::Unspecified> {
    Ok(LessSafeKey::new(UnboundKey::new(&AES_256_GCM, cek)?))
}
