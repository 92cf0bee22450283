//! TLS and HTTP/2 fingerprinting configuration.

pub mod http2;
pub mod selector;
pub mod tls;

pub use http2::Http2Settings;
pub use selector::{alpn_protocols, select_template, TemplateId};
pub use tls::{CertCompression, TlsFingerprint};
