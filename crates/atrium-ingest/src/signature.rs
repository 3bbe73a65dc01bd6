// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook authenticity checks.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the Meta-style body signature (`sha256=<hex>`).
pub const HUB_SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Header carrying the shared secret for providers without body signing.
pub const SHARED_SECRET_HEADER: &str = "x-atrium-webhook-secret";

/// Checks a `sha256=<hex>` HMAC over the raw body.
///
/// Returns a short reason on mismatch. The MAC comparison is constant time.
pub fn verify_hub_signature(secret: &str, body: &[u8], header: Option<&str>) -> Result<(), &'static str> {
    let header = header.ok_or("missing signature header")?;
    let hex_sig = header
        .strip_prefix("sha256=")
        .ok_or("signature header is not sha256")?;
    let expected = hex::decode(hex_sig).map_err(|_| "signature is not valid hex")?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "unusable secret")?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| "signature mismatch")
}

/// Produces the header value [`verify_hub_signature`] accepts.
pub fn sign_hub(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of a provided shared secret.
pub fn verify_shared_secret(expected: &str, provided: Option<&str>) -> Result<(), &'static str> {
    let provided = provided.ok_or("missing secret header")?;
    if expected.is_empty() {
        return Err("channel has no webhook secret");
    }
    let a = expected.as_bytes();
    let b = provided.as_bytes();
    let diff = a.len() ^ b.len();
    let folded = a
        .iter()
        .zip(b.iter().cycle())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    if diff == 0 && folded == 0 && !b.is_empty() {
        Ok(())
    } else {
        Err("secret mismatch")
    }
}

/// Hex HMAC of a web chat session id, keyed with the channel's webhook
/// secret. The widget backend hands it to the browser alongside the
/// session id; the reply stream only opens when both match.
pub fn session_token(secret: &str, session: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(session.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Checks a session token produced by [`session_token`] in constant time.
pub fn verify_session_token(secret: &str, session: &str, token: Option<&str>) -> Result<(), &'static str> {
    let token = token.ok_or("missing session token")?;
    if secret.is_empty() {
        return Err("channel has no webhook secret");
    }
    let expected = hex::decode(token).map_err(|_| "session token is not valid hex")?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "unusable secret")?;
    mac.update(session.as_bytes());
    mac.verify_slice(&expected).map_err(|_| "session token mismatch")
}
