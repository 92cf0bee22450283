//! HTTP proxy settings.
//!
//! Every target, plain or TLS, is reached through a `CONNECT` tunnel so the
//! ClientHello is always produced by this crate and never by the proxy.

use std::fmt;

use url::Url;

use crate::auth::basic_auth;
use crate::error::{Error, Result};

/// Parsed proxy URL: `http://[user[:password]@]host[:port]`.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
}

impl ProxyConfig {
    /// Parse a proxy URL. Failures are configuration errors.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)
            .map_err(|e| Error::config("proxy", format!("malformed proxy URL: {e}")))?;
        if url.scheme() != "http" {
            return Err(Error::config(
                "proxy",
                format!("unsupported proxy scheme {:?}", url.scheme()),
            ));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::config("proxy", "proxy URL has no host"))?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(80);
        let credentials = match (url.username(), url.password()) {
            ("", None) => None,
            (user, password) => Some((user.to_string(), password.unwrap_or("").to_string())),
        };
        Ok(Self {
            host,
            port,
            credentials,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` to dial.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `Proxy-Authorization` value for the CONNECT request.
    pub fn authorization(&self) -> Option<String> {
        self.credentials
            .as_ref()
            .map(|(user, password)| basic_auth(user, password))
    }
}

// Credentials stay out of logs.
impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}:{}", self.host, self.port)
    }
}
