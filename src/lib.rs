//! # Mimicry
//!
//! HTTP client that presents itself as a real browser.
//!
//! Each session is bound to one browser profile. The profile drives the TLS
//! ClientHello (via BoringSSL), the ALPN list, HTTP/2 settings and the
//! ordered request headers, so every layer tells the same story. On top of
//! that the client keeps cookies and navigation history, follows redirects
//! the way a browser does, retries with backoff and can read bodies with an
//! early exit.

// Identity
pub mod fingerprint;
pub mod headers;
pub mod profile;

// Session state
pub mod cookie;
pub mod history;

// Request execution
pub mod client;
pub mod config;
pub mod response;
pub mod retry;
pub mod stream;

// Transport layer
pub mod auth;
pub mod proxy;
pub mod timeouts;
pub mod transport;

pub mod error;
pub mod rng;

// Re-exports
pub use client::{BrowserClient, ClientFactory, RequestOptions};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use cookie::{Cookie, CookieJar};
pub use error::{ConnectPhase, Error, ErrorKind, Result};
pub use fingerprint::TemplateId;
pub use headers::{HeaderEngine, OrderedHeaders, RequestContext};
pub use profile::{BrowserFamily, BrowserProfile, ProfileStore, SessionId};
pub use response::Response;
pub use retry::Backoff;
pub use stream::{StreamConfig, StreamResult};
pub use timeouts::Timeouts;
