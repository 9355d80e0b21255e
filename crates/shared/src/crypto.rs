//! Cryptographic utilities for webhook signing and secret generation.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Prefix carried by every generated webhook secret.
pub const WEBHOOK_SECRET_PREFIX: &str = "whsec_";

/// Prefix of the signature header value.
pub const SIGNATURE_SCHEME_PREFIX: &str = "sha256=";

/// Number of random bytes in a generated secret.
const SECRET_BYTES: usize = 32;

/// Errors returned by [`verify_signature`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Signature header is missing the sha256= scheme")]
    MissingScheme,
    #[error("Signature is not valid hex")]
    InvalidEncoding,
    #[error("Signature does not match payload")]
    Mismatch,
}

/// Computes the signature token for an outgoing webhook body.
///
/// The token is `sha256=<hex(HMAC-SHA256(secret, body))>` and covers the exact
/// bytes that are sent on the wire.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    format!("{}{}", SIGNATURE_SCHEME_PREFIX, hex::encode(mac(secret, body).finalize().into_bytes()))
}

/// Verifies a signature header value against a body in constant time.
pub fn verify_signature(secret: &str, body: &[u8], header_value: &str) -> Result<(), SignatureError> {
    let encoded = header_value
        .strip_prefix(SIGNATURE_SCHEME_PREFIX)
        .ok_or(SignatureError::MissingScheme)?;
    let expected = hex::decode(encoded).map_err(|_| SignatureError::InvalidEncoding)?;

    mac(secret, body)
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Generates a new webhook secret from the operating system CSPRNG.
pub fn generate_webhook_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{}{}", WEBHOOK_SECRET_PREFIX, URL_SAFE_NO_PAD.encode(bytes))
}

fn mac(secret: &str, body: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts keys of any length"));
    mac.update(body);
    mac
}
