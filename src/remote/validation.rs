//! Key and value validation.
//!
//! Runs before any network call. Keys are restricted to a small character set
//! so nothing that reaches the store can be read as command syntax.

use serde::Serialize;

use crate::error::{CacheError, Result};

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-' | '.')
}

fn is_pattern_char(c: char) -> bool {
    is_key_char(c) || matches!(c, '*' | '?')
}

fn check(input: &str, max_len: usize, what: &str, allowed: fn(char) -> bool) -> Result<()> {
    if input.is_empty() {
        return Err(CacheError::InvalidKey(format!("{} cannot be empty", what)));
    }
    if input.len() > max_len {
        return Err(CacheError::InvalidKey(format!(
            "{} exceeds maximum length of {} bytes",
            what, max_len
        )));
    }
    if let Some(bad) = input.chars().find(|c| !allowed(*c)) {
        return Err(CacheError::InvalidKey(format!(
            "{} contains disallowed character {:?}",
            what, bad
        )));
    }
    Ok(())
}

/// Validates a cache key: non-empty, at most `max_len` bytes, `[A-Za-z0-9:_\-.]`.
pub fn validate_key(key: &str, max_len: usize) -> Result<()> {
    check(key, max_len, "Key", is_key_char)
}

/// Validates a bulk-delete pattern: key characters plus `*` and `?` globs.
pub fn validate_pattern(pattern: &str, max_len: usize) -> Result<()> {
    check(pattern, max_len, "Pattern", is_pattern_char)
}

/// Serializes `value` for storage.
///
/// Returns `Ok(None)` for values that encode as JSON `null` (nothing to store)
/// and fails with [`CacheError::ValueTooLarge`] past `max_bytes`.
pub fn encode_value<T: Serialize + ?Sized>(value: &T, max_bytes: usize) -> Result<Option<String>> {
    let encoded = serde_json::to_string(value)?;
    if encoded == "null" {
        return Ok(None);
    }
    if encoded.len() > max_bytes {
        return Err(CacheError::ValueTooLarge {
            size: encoded.len(),
            max: max_bytes,
        });
    }
    Ok(Some(encoded))
}
