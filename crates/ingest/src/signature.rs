//! Request body integrity via HMAC-SHA256.
//!
//! Agents sign the exact bytes they send with their shared secret and put
//! the lowercase hex digest in one of [`SIGNATURE_HEADERS`]. Verification
//! recomputes the digest over the raw body and compares in two steps:
//!
//! 1. Length check on the hex strings. A mismatch fails immediately, without
//!    touching the byte comparison.
//! 2. Constant-time comparison of the decoded digests (`subtle`).
//!
//! Verification never panics and never errors; anything that goes wrong
//! (malformed hex, key setup) is a failed verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::IngestConfig;
use crate::{AgentCredential, IngestError, SigningSecret};

type HmacSha256 = Hmac<Sha256>;

/// Header names that may carry the signature, in priority order.
pub const SIGNATURE_HEADERS: [&str; 2] = ["x-bot-signature", "x-hmac-signature"];

/// Computes the hex-encoded HMAC-SHA256 of `body` under `secret`.
///
/// Returns `None` only if the MAC rejects the key, which HMAC does not do
/// for any key length.
pub fn sign_body(secret: &SigningSecret, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Returns `true` if `supplied` is the signature of `body` under `secret`.
pub fn verify_signature(secret: &SigningSecret, body: &[u8], supplied: &str) -> bool {
    let Some(expected) = sign_body(secret, body) else {
        tracing::warn!("signing key rejected by MAC");
        return false;
    };
    signatures_match(&expected, supplied, constant_time_eq)
}

fn signatures_match<F>(expected: &str, supplied: &str, compare: F) -> bool
where
    F: FnOnce(&[u8], &[u8]) -> bool,
{
    if expected.len() != supplied.len() {
        return false;
    }
    match (hex::decode(expected), hex::decode(supplied)) {
        (Ok(expected), Ok(supplied)) => compare(&expected, &supplied),
        _ => {
            tracing::debug!("signature is not valid hex");
            false
        },
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Integrity gate of the admission pipeline.
///
/// Active only when the deployment requires signatures *and* the agent has
/// a signing secret; otherwise the request passes untouched.
///
/// # Errors
///
/// [`IngestError::Integrity`] when the signature is missing or wrong.
pub fn verify_integrity(
    config: &IngestConfig,
    agent: &AgentCredential,
    signature: Option<&str>,
    body: &[u8],
) -> Result<(), IngestError> {
    let secret = match (&agent.signing_secret, config.require_signature) {
        (Some(secret), true) => secret,
        _ => return Ok(()),
    };

    let Some(signature) = signature.filter(|s| !s.is_empty()) else {
        return Err(IngestError::Integrity {
            reason: "Missing HMAC signature",
        });
    };

    if verify_signature(secret, body, signature) {
        Ok(())
    } else {
        tracing::info!(agent_id = %agent.agent_id, "signature mismatch");
        Err(IngestError::Integrity {
            reason: "Invalid HMAC signature",
        })
    }
}
