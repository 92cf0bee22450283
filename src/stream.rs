//! Bounded, early-exit body reading.
//!
//! The body is decoded according to its `Content-Encoding` and consumed line
//! by line until a byte ceiling is reached, a stop substring shows up, or the
//! body ends.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_compression::tokio::bufread::{BrotliDecoder, GzipDecoder, ZlibDecoder, ZstdDecoder};
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body::Body;
use http_body_util::BodyDataStream;
use pin_project_lite::pin_project;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, ReadBuf};
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::error::{Error, Result};

/// Buffer size used when the configured one is zero.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Limits for one streamed read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Read buffer capacity; 0 selects [`DEFAULT_BUFFER_SIZE`].
    pub buffer_size: usize,
    /// Stop once this many decoded bytes have been pulled from the body.
    /// `None` and `Some(0)` both mean unlimited.
    pub max_bytes: Option<u64>,
    /// Stop once this substring appears in the accumulated content.
    pub stop_at: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_bytes: None,
            stop_at: None,
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn max_bytes(mut self, max: u64) -> Self {
        self.max_bytes = Some(max);
        self
    }

    pub fn stop_at(mut self, needle: impl Into<String>) -> Self {
        self.stop_at = Some(needle.into());
        self
    }
}

/// Outcome of a streamed read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamResult {
    /// Decoded bytes pulled from the body (may run ahead of `content`).
    pub bytes_read: u64,
    pub content: String,
    /// Whether the stop substring fired.
    pub found_content: bool,
}

/// Decoding transform selected from `Content-Encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
    Brotli,
    Zstd,
}

impl ContentEncoding {
    /// Unknown encodings pass through unmodified.
    pub fn from_header(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::Identity;
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Self::Gzip,
            "deflate" => Self::Deflate,
            "br" => Self::Brotli,
            "zstd" => Self::Zstd,
            _ => Self::Identity,
        }
    }
}

/// Boxed reader yielding the decoded body.
pub type DecodedReader = Pin<Box<dyn AsyncRead + Send>>;

/// Wrap `body` in the decoder for `encoding`.
pub fn decoded_reader<B>(encoding: ContentEncoding, body: B) -> DecodedReader
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let chunks = BodyDataStream::new(body).map_err(io::Error::other);
    let raw = StreamReader::new(chunks);
    match encoding {
        ContentEncoding::Identity => Box::pin(raw),
        ContentEncoding::Gzip => {
            let mut decoder = GzipDecoder::new(raw);
            decoder.multiple_members(true);
            Box::pin(decoder)
        }
        ContentEncoding::Deflate => Box::pin(ZlibDecoder::new(raw)),
        ContentEncoding::Brotli => Box::pin(BrotliDecoder::new(raw)),
        ContentEncoding::Zstd => Box::pin(ZstdDecoder::new(raw)),
    }
}

pin_project! {
    /// Counts bytes passing through.
    struct CountingReader<R> {
        #[pin]
        inner: R,
        count: u64,
    }
}

impl<R: AsyncRead> AsyncRead for CountingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();
        let poll = this.inner.poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            *this.count += (buf.filled().len() - before) as u64;
        }
        poll
    }
}

/// Consume `body` line by line under `config`'s limits.
///
/// Reaching the byte ceiling or the stop substring is not an error. Any
/// read failure other than end-of-stream is, even though partial content
/// had been read.
pub async fn read_stream<B>(
    encoding: ContentEncoding,
    body: B,
    config: &StreamConfig,
) -> Result<StreamResult>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let buffer_size = match config.buffer_size {
        0 => DEFAULT_BUFFER_SIZE,
        n => n,
    };
    let counting = CountingReader {
        inner: decoded_reader(encoding, body),
        count: 0,
    };
    let mut reader = BufReader::with_capacity(buffer_size, counting);
    let needle = config.stop_at.as_deref().filter(|s| !s.is_empty()).map(str::as_bytes);

    let mut content: Vec<u8> = Vec::new();
    let mut line: Vec<u8> = Vec::new();
    let mut found = false;

    loop {
        if let Some(max) = config.max_bytes.filter(|m| *m > 0) {
            if reader.get_ref().count >= max {
                debug!("Stream stopped at byte ceiling ({} bytes)", max);
                break;
            }
        }
        line.clear();
        let read = reader.read_until(b'\n', &mut line).await;
        let n = read.map_err(|source| Error::Stream {
            bytes_read: reader.get_ref().count,
            source,
        })?;
        if n == 0 {
            break;
        }
        // Re-scan the tail of the previous content so a needle spanning a
        // line boundary is still seen.
        let window_start = match needle {
            Some(needle) => content.len().saturating_sub(needle.len() - 1),
            None => 0,
        };
        content.extend_from_slice(&line);
        if let Some(needle) = needle {
            if contains(&content[window_start..], needle) {
                debug!("Stream stopped on content trigger");
                found = true;
                break;
            }
        }
    }

    Ok(StreamResult {
        bytes_read: reader.get_ref().count,
        content: String::from_utf8_lossy(&content).into_owned(),
        found_content: found,
    })
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
