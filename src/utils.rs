//! Small helpers shared by the flows, the session guard and the store
//!
//! String truncation respects UTF-8 boundaries so raw provider bodies can be
//! embedded in error messages without panicking on multi-byte characters.

use base64::{Engine, engine::general_purpose::STANDARD, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Maximum number of bytes of a raw response body embedded in an error
pub const MAX_ERROR_BODY_BYTES: usize = 512;

/// Safely truncate a string at a UTF-8 character boundary.
///
/// Returns a slice of at most `max_bytes` bytes, ensuring the result
/// is valid UTF-8 by finding the last valid character boundary.
///
/// # Example
/// ```
/// use minim_auth::utils::safe_truncate;
///
/// // Emoji is 4 bytes - truncating at byte 10 would cut it in half
/// let text = "Status: 🔍 Active";
/// let result = safe_truncate(text, 10);
/// assert_eq!(result, "Status: ");
/// ```
#[inline]
#[must_use]
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut boundary = max_bytes;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }

    &s[..boundary]
}

/// Truncate a string for display with ellipsis.
///
/// # Example
/// ```
/// use minim_auth::utils::truncate_for_display;
///
/// let text = "This is a long message";
/// assert_eq!(truncate_for_display(text, 10), "This is a ...");
/// ```
#[must_use]
pub fn truncate_for_display(s: &str, max_bytes: usize) -> String {
    let truncated = safe_truncate(s, max_bytes);
    if truncated.len() < s.len() {
        format!("{truncated}...")
    } else {
        truncated.to_string()
    }
}

/// Current time as unix seconds
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Base64url (no padding) encoding of `len` bytes from the OS CSPRNG
#[must_use]
pub fn random_urlsafe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex string of `len` random bytes, used for OAuth 1.0a nonces
#[must_use]
pub fn random_hex(len: usize) -> String {
    use std::fmt::Write;
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(len * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// `Basic` authorization header value for a client ID/secret pair
#[must_use]
pub fn basic_auth(client_id: &str, client_secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{client_id}:{client_secret}")))
}

/// URL encode a string for OAuth parameters.
/// Preserves unreserved characters per RFC 3986.
#[must_use]
pub fn urlencoding(s: &str) -> String {
    use std::fmt::Write;
    let mut result = String::with_capacity(s.len() * 3);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                let _ = write!(result, "%{byte:02X}");
            }
        }
    }
    result
}

/// Capitalize a token type the way providers expect it in headers (`bearer` → `Bearer`)
#[must_use]
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_truncate_ascii() {
        let text = "Hello, World!";
        assert_eq!(safe_truncate(text, 7), "Hello, ");
        assert_eq!(safe_truncate(text, 100), text);
        assert_eq!(safe_truncate(text, 0), "");
    }

    #[test]
    fn test_safe_truncate_multibyte() {
        let text = "Café";
        assert_eq!(safe_truncate(text, 4), "Caf");
        assert_eq!(safe_truncate(text, 5), "Café");

        let text = "你好世界";
        assert_eq!(safe_truncate(text, 4), "你");
    }

    #[test]
    fn test_truncate_for_display() {
        let text = "This is a long message";
        assert_eq!(truncate_for_display(text, 100), text);
        assert_eq!(truncate_for_display(text, 10), "This is a ...");
        assert_eq!(truncate_for_display("Hello 🌍 World", 7), "Hello ...");
    }

    #[test]
    fn test_urlencoding() {
        assert_eq!(urlencoding("hello"), "hello");
        assert_eq!(urlencoding("hello world"), "hello%20world");
        assert_eq!(urlencoding("a+b"), "a%2Bb");
        assert_eq!(urlencoding("secret&"), "secret%26");
        assert_eq!(
            urlencoding("http://localhost:8888/callback"),
            "http%3A%2F%2Flocalhost%3A8888%2Fcallback"
        );
    }

    #[test]
    fn test_basic_auth() {
        // "client:secret" in standard base64
        assert_eq!(basic_auth("client", "secret"), "Basic Y2xpZW50OnNlY3JldA==");
    }

    #[test]
    fn test_random_values_differ() {
        let a = random_urlsafe(32);
        let b = random_urlsafe(32);
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
        assert_eq!(random_hex(16).len(), 32);
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("bearer"), "Bearer");
        assert_eq!(capitalize("BEARER"), "Bearer");
        assert_eq!(capitalize(""), "");
    }
}
