//! HTTP response wrapper.

use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
use hyper::body::Incoming;
use tokio::io::AsyncReadExt;
use url::Url;

use crate::error::{Error, Result};
use crate::stream::{decoded_reader, read_stream, ContentEncoding, StreamConfig, StreamResult};
use crate::transport::ConnectionInfo;

/// Response of the final hop of a request.
///
/// The body is not read until one of the consuming helpers is called.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    url: Url,
    connection: Option<ConnectionInfo>,
    body: Incoming,
}

impl Response {
    pub(crate) fn from_hyper(response: http::Response<Incoming>, url: Url) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            connection: parts.extensions.get::<ConnectionInfo>().copied(),
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            url,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of `name`, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Final URL after redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Template and protocol of the connection that carried this response.
    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.connection
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection()
    }

    pub fn content_encoding(&self) -> ContentEncoding {
        ContentEncoding::from_header(self.header("content-encoding"))
    }

    /// Decoded body.
    pub async fn bytes(self) -> Result<Bytes> {
        let mut reader = decoded_reader(self.content_encoding(), self.body);
        let mut decoded = Vec::new();
        let read = reader.read_to_end(&mut decoded).await;
        read.map_err(|source| Error::Stream {
            bytes_read: decoded.len() as u64,
            source,
        })?;
        Ok(Bytes::from(decoded))
    }

    /// Decoded body as text; invalid UTF-8 is replaced.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(Error::from)
    }

    /// Bounded, early-exit read of the decoded body.
    pub async fn stream(self, config: &StreamConfig) -> Result<StreamResult> {
        read_stream(self.content_encoding(), self.body, config).await
    }

    /// Raw, still-encoded body.
    pub fn into_body(self) -> Incoming {
        self.body
    }
}
