//! Webhook authentication.
//!
//! Two schemes are supported:
//! - shared secret: the header value must equal the configured secret
//! - HMAC-SHA256: the header carries `sha256=<hex>` of HMAC(secret, raw body)
//!
//! Both comparisons run in constant time.

use std::fmt;
use std::str::FromStr;

use axum::http::{HeaderMap, HeaderName};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::WebhookSecret;
use crate::error::IngestError;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// How the secret header is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    SharedSecret,
    HmacSha256,
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shared-secret" | "secret" => Ok(AuthMode::SharedSecret),
            "hmac-sha256" | "hmac" => Ok(AuthMode::HmacSha256),
            other => Err(format!("unknown auth mode {other}")),
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::SharedSecret => f.write_str("shared-secret"),
            AuthMode::HmacSha256 => f.write_str("hmac-sha256"),
        }
    }
}

/// Proof that a request passed authentication.
///
/// Only [`Authenticator::verify`] can produce one, and a
/// [`WebhookEvent`](crate::event::WebhookEvent) cannot be built without it.
#[derive(Debug)]
pub struct Authenticated {
    _private: (),
}

impl Authenticated {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

/// Verifies the secret header of inbound requests.
#[derive(Debug, Clone)]
pub struct Authenticator {
    secret: WebhookSecret,
    header: HeaderName,
    mode: AuthMode,
}

impl Authenticator {
    pub fn new(secret: WebhookSecret, header: HeaderName, mode: AuthMode) -> Self {
        Self {
            secret,
            header,
            mode,
        }
    }

    /// Check the request headers (and, for HMAC, the raw body).
    pub fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<Authenticated, IngestError> {
        let provided = match headers.get(&self.header) {
            Some(v) => v.as_bytes(),
            None => {
                warn!(header = %self.header, "webhook_auth_missing");
                return Err(IngestError::Authentication("missing secret header"));
            }
        };

        let valid = match self.mode {
            AuthMode::SharedSecret => secrets_match(provided, self.secret.expose()),
            AuthMode::HmacSha256 => verify_signature(self.secret.expose(), body, provided),
        };

        if !valid {
            warn!(header = %self.header, mode = %self.mode, "webhook_auth_invalid");
            return Err(IngestError::Authentication("secret mismatch"));
        }

        Ok(Authenticated::new())
    }
}

/// Constant-time secret comparison.
///
/// Both sides are hashed first so neither the position of the first
/// mismatching byte nor the length of the provided value affects timing.
pub fn secrets_match(provided: &[u8], expected: &[u8]) -> bool {
    let provided = Sha256::digest(provided);
    let expected = Sha256::digest(expected);
    provided.as_slice().ct_eq(expected.as_slice()).into()
}

/// Verify a hex HMAC-SHA256 signature of `body`, with or without the
/// `sha256=` prefix.
pub fn verify_signature(key: &[u8], body: &[u8], header_value: &[u8]) -> bool {
    let header_value = match std::str::from_utf8(header_value) {
        Ok(v) => v.trim(),
        Err(_) => return false,
    };
    let hex_signature = header_value
        .strip_prefix(SIGNATURE_PREFIX)
        .unwrap_or(header_value);

    let signature = match hex::decode(hex_signature) {
        Ok(s) => s,
        Err(_) => {
            warn!(signature_length = hex_signature.len(), "webhook_signature_not_hex");
            return false;
        }
    };

    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);

    // verify_slice compares in constant time
    mac.verify_slice(&signature).is_ok()
}

/// Compute the `sha256=<hex>` signature header value for `body`.
pub fn sign(key: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}
