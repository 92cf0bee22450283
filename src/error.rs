//! Error types for the mimicry crate.

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring a session or executing requests.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid client configuration (fatal at construction).
    #[error("invalid configuration for {field}: {message}")]
    Config { field: &'static str, message: String },

    /// TCP connect to the target (or proxy) failed.
    #[error("dial {addr} failed: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// TCP connect did not complete within the dial timeout.
    #[error("dial {addr} timed out after {timeout:?}")]
    DialTimeout { addr: String, timeout: Duration },

    /// Proxy refused or broke the CONNECT tunnel.
    #[error("proxy {proxy} could not tunnel to {target}: {message}")]
    ProxyTunnel {
        proxy: String,
        target: String,
        message: String,
    },

    /// Building the TLS context for a connection failed.
    #[error("TLS setup for {addr} failed: {message}")]
    TlsSetup { addr: String, message: String },

    /// TLS handshake failed.
    #[error("TLS handshake with {addr} failed: {message}")]
    Handshake { addr: String, message: String },

    /// TLS handshake did not finish before its deadline.
    #[error("TLS handshake with {addr} timed out after {timeout:?}")]
    HandshakeTimeout { addr: String, timeout: Duration },

    /// Redirect limit exceeded.
    #[error("Redirect limit exceeded ({count} redirects)")]
    RedirectLimit { count: usize },

    /// Invalid redirect URL.
    #[error("Invalid redirect URL: {0}")]
    InvalidRedirectUrl(String),

    /// The pooled HTTP transport failed to deliver the request.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    /// Session-level request deadline exceeded.
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// Server answered with a status the caller treats as failure.
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// Retry wrapper gave up.
    #[error("failed after {retries} retries: {source}")]
    RetriesExhausted {
        retries: u32,
        #[source]
        source: Box<Error>,
    },

    /// Reading a response body failed before end-of-stream.
    #[error("stream read failed after {bytes_read} bytes: {source}")]
    Stream {
        bytes_read: u64,
        #[source]
        source: io::Error,
    },

    /// Cookie parsing error.
    #[error("Cookie parse error: {0}")]
    CookieParse(String),

    /// Malformed request (header name/value, URI).
    #[error("HTTP protocol error: {0}")]
    HttpProtocol(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Coarse error category, usable without inspecting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Connection,
    Redirect,
    Transport,
    Timeout,
    Status,
    Retry,
    Stream,
    Request,
    Io,
}

/// Phase of connection establishment a connection error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectPhase {
    Dial,
    ProxyTunnel,
    TlsSetup,
    Handshake,
}

impl Error {
    /// Create a configuration error.
    pub fn config(field: &'static str, message: impl Into<String>) -> Self {
        Self::Config {
            field,
            message: message.into(),
        }
    }

    /// Create an HTTP status error.
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            message: message.into(),
        }
    }

    /// Create an HTTP protocol error.
    pub fn http_protocol(message: impl Into<String>) -> Self {
        Self::HttpProtocol(message.into())
    }

    /// Classify this error.
    ///
    /// Transport errors caused by the connector report the connector's
    /// category, so a handshake timeout stays a connection error even after
    /// passing through the pooled client.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::Dial { .. }
            | Self::DialTimeout { .. }
            | Self::ProxyTunnel { .. }
            | Self::TlsSetup { .. }
            | Self::Handshake { .. }
            | Self::HandshakeTimeout { .. } => ErrorKind::Connection,
            Self::RedirectLimit { .. } | Self::InvalidRedirectUrl(_) => ErrorKind::Redirect,
            Self::Transport { .. } => self
                .connect_failure()
                .map(Error::kind)
                .unwrap_or(ErrorKind::Transport),
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::HttpStatus { .. } => ErrorKind::Status,
            Self::RetriesExhausted { .. } => ErrorKind::Retry,
            Self::Stream { .. } => ErrorKind::Stream,
            Self::CookieParse(_) | Self::HttpProtocol(_) | Self::UrlParse(_) | Self::Json(_) => {
                ErrorKind::Request
            }
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Connection phase, for connection errors (direct or wrapped by the transport).
    pub fn connect_phase(&self) -> Option<ConnectPhase> {
        match self {
            Self::Dial { .. } | Self::DialTimeout { .. } => Some(ConnectPhase::Dial),
            Self::ProxyTunnel { .. } => Some(ConnectPhase::ProxyTunnel),
            Self::TlsSetup { .. } => Some(ConnectPhase::TlsSetup),
            Self::Handshake { .. } | Self::HandshakeTimeout { .. } => Some(ConnectPhase::Handshake),
            Self::Transport { .. } => self.connect_failure().and_then(Error::connect_phase),
            Self::RetriesExhausted { source, .. } => source.connect_phase(),
            _ => None,
        }
    }

    /// The connector error buried inside a transport error, if any.
    pub fn connect_failure(&self) -> Option<&Error> {
        let Self::Transport { source, .. } = self else {
            return None;
        };
        let mut cause: Option<&(dyn StdError + 'static)> = source.source();
        while let Some(err) = cause {
            if let Some(found) = err.downcast_ref::<Error>() {
                return Some(found);
            }
            cause = err.source();
        }
        None
    }

    /// Whether this is a timeout of any phase.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::DialTimeout { .. } | Self::HandshakeTimeout { .. } | Self::Timeout { .. } => true,
            Self::Transport { .. } => self.connect_failure().is_some_and(Error::is_timeout),
            _ => false,
        }
    }
}
