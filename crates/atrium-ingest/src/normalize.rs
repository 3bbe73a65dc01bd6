// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity and timestamp normalization shared by the channel adapters.
//!
//! Normalized phone numbers and emails are the secondary identity signals
//! the contact unifier matches on, so every adapter must produce them the
//! same way.

use atrium_core::AtriumError;
use atrium_core::types::{ChannelType, format_ts};
use chrono::DateTime;

const MIN_PHONE_DIGITS: usize = 8;
const MAX_PHONE_DIGITS: usize = 15;

/// Reduces a phone number to its E.164 digits (no `+`).
///
/// Accepts the usual punctuation (`+`, spaces, dashes, dots, parentheses)
/// and a `whatsapp:` or `tel:` prefix. Anything else, or a digit count
/// outside the E.164 range, yields `None`.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("whatsapp:")
        .or_else(|| trimmed.strip_prefix("tel:"))
        .unwrap_or(trimmed);
    let mut digits = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        match c {
            '0'..='9' => digits.push(c),
            '+' if i == 0 => {}
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return None,
        }
    }
    (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS)
        .contains(&digits.len())
        .then_some(digits)
}

/// Trims and lowercases an email address. Requires exactly one `@` with a
/// non-empty local part and a dotted domain.
pub fn normalize_email(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    let (local, domain) = lowered.split_once('@')?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || lowered.chars().any(char::is_whitespace)
    {
        return None;
    }
    Some(lowered)
}

/// Extracts the address from a `Name <addr@host>` mailbox string.
pub fn mailbox_address(raw: &str) -> (Option<String>, &str) {
    match (raw.find('<'), raw.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            let name = raw[..open].trim().trim_matches('"').trim();
            let name = (!name.is_empty()).then(|| name.to_string());
            (name, raw[open + 1..close].trim())
        }
        _ => (None, raw.trim()),
    }
}

/// Converts a provider timestamp in unix seconds (numeric or string) into
/// the store's timestamp format.
pub fn unix_seconds(value: &serde_json::Value) -> Option<String> {
    let secs = match value {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    // Meta sends milliseconds on messenger events.
    let secs = if secs > 100_000_000_000 { secs / 1000 } else { secs };
    DateTime::from_timestamp(secs, 0).map(format_ts)
}

/// Parses an RFC 3339 timestamp into the store's format.
pub fn rfc3339(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| format_ts(dt.to_utc()))
}

pub(crate) fn malformed(channel_type: ChannelType, message: impl Into<String>) -> AtriumError {
    AtriumError::Normalization {
        channel_type: channel_type.to_string(),
        message: message.into(),
    }
}

/// Parses the body as JSON, mapping failures to a normalization error.
pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    channel_type: ChannelType,
    body: &[u8],
) -> Result<T, AtriumError> {
    serde_json::from_slice(body).map_err(|e| malformed(channel_type, format!("invalid JSON: {e}")))
}
