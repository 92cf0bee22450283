//! HTTP transport: hyper's pooled client over the fingerprinting connector.
//!
//! - HTTP/1.1 and HTTP/2 via hyper + tokio-boring
//! - HTTP/2 SETTINGS taken from the profile family

pub mod connector;

use bytes::Bytes;
use http_body_util::Full;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};

use crate::fingerprint::http2::Http2Settings;
use crate::profile::BrowserFamily;
use crate::timeouts::Timeouts;

pub use connector::{
    AlpnProtocol, BrowserConnector, BrowserStream, ConnectionInfo, ConnectorConfig,
    MaybeHttpsStream,
};

/// Pooled client type used by a session.
pub type HttpClient = Client<BrowserConnector, Full<Bytes>>;

/// Build the pooled client for one session.
///
/// Connections are keyed by scheme and authority; each new one goes through
/// the connector and thus through template selection.
pub fn build_client(
    connector: BrowserConnector,
    family: BrowserFamily,
    timeouts: &Timeouts,
) -> HttpClient {
    let h2 = Http2Settings::for_family(family);
    let mut builder = Client::builder(TokioExecutor::new());
    builder
        .pool_timer(TokioTimer::new())
        .pool_idle_timeout(timeouts.pool_idle)
        .http1_title_case_headers(true)
        .http2_initial_stream_window_size(h2.initial_window_size)
        .http2_initial_connection_window_size(h2.initial_connection_window_size)
        .http2_max_frame_size(h2.max_frame_size);
    if let Some(max) = h2.max_header_list_size {
        builder.http2_max_header_list_size(max);
    }
    builder.build(connector)
}
