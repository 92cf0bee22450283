//! RFC 7617 Basic authentication, used for proxy CONNECT credentials.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Generate Basic Auth header value (RFC 7617).
///
/// # Arguments
/// * `username` - The user ID.
/// * `password` - The password.
///
/// # Returns
/// "Basic " followed by base64-encoded credentials.
pub fn basic_auth(username: &str, password: &str) -> String {
    let plain = format!("{}:{}", username, password);
    let encoded = BASE64.encode(plain);
    format!("Basic {}", encoded)
}

/// Parse a Basic Auth header value.
///
/// Returns (username, password) or None if invalid.
pub fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?.trim();
    let decoded_vec = BASE64.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded_vec).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
