//! Timeout configuration for a browsing session.
//!
//! # Timeout Types
//!
//! - **connect**: TCP dial (to the target, or to the proxy when one is set)
//! - **handshake**: TLS handshake, measured from the end of the dial
//! - **total**: Absolute deadline for one request including every redirect hop
//! - **pool_idle**: How long an idle pooled connection is kept for reuse
//!
//! Every phase is always bounded; there is no "disabled" setting.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mimicry::Timeouts;
//! use std::time::Duration;
//!
//! let timeouts = Timeouts::default()
//!     .connect(Duration::from_secs(5))
//!     .total(Duration::from_secs(60));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeout configuration for a session.
///
/// Serialized with every duration in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Deadline for the TCP dial. Does NOT reset.
    ///
    /// Default: 10s
    #[serde(rename = "connect_ms", with = "duration_ms")]
    pub connect: Duration,

    /// Deadline for the TLS handshake, independent of and additional to
    /// `connect`. On expiry the socket is closed.
    ///
    /// Default: 15s
    #[serde(rename = "handshake_ms", with = "duration_ms")]
    pub handshake: Duration,

    /// Total request deadline: connect, every redirect hop and the response
    /// head. Does not cover reading the body.
    ///
    /// Default: 30s
    #[serde(rename = "total_ms", with = "duration_ms")]
    pub total: Duration,

    /// Idle time after which a pooled connection is dropped.
    ///
    /// Default: 90s
    #[serde(rename = "pool_idle_ms", with = "duration_ms")]
    pub pool_idle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            handshake: Duration::from_secs(15),
            total: Duration::from_secs(30),
            pool_idle: Duration::from_secs(90),
        }
    }
}

impl Timeouts {
    /// Create the default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set dial timeout.
    pub fn connect(mut self, timeout: Duration) -> Self {
        self.connect = timeout;
        self
    }

    /// Set TLS handshake timeout.
    pub fn handshake(mut self, timeout: Duration) -> Self {
        self.handshake = timeout;
        self
    }

    /// Set total request deadline.
    pub fn total(mut self, timeout: Duration) -> Self {
        self.total = timeout;
        self
    }

    /// Set pooled connection idle timeout.
    pub fn pool_idle(mut self, timeout: Duration) -> Self {
        self.pool_idle = timeout;
        self
    }
}

/// `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let t = Timeouts::default();
        assert_eq!(t.connect, Duration::from_secs(10));
        assert_eq!(t.handshake, Duration::from_secs(15));
        assert_eq!(t.total, Duration::from_secs(30));
        assert_eq!(t.pool_idle, Duration::from_secs(90));
    }

    #[test]
    fn test_builder_pattern() {
        let t = Timeouts::new()
            .connect(Duration::from_secs(5))
            .handshake(Duration::from_millis(250));

        assert_eq!(t.connect, Duration::from_secs(5));
        assert_eq!(t.handshake, Duration::from_millis(250));
        assert_eq!(t.total, Duration::from_secs(30));
    }

    #[test]
    fn test_json_uses_milliseconds() {
        let t: Timeouts = serde_json::from_str(r#"{"connect_ms": 1500}"#).unwrap();
        assert_eq!(t.connect, Duration::from_millis(1500));
        assert_eq!(t.handshake, Duration::from_secs(15));

        let json = serde_json::to_value(Timeouts::default()).unwrap();
        assert_eq!(json["total_ms"], 30_000);
    }
}
