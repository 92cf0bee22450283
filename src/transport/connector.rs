//! BoringSSL connector presenting the profile's ClientHello.
//!
//! Each new pooled connection: dial (bounded by `Timeouts::connect`),
//! optional proxy `CONNECT` tunnel, template selection, then the TLS
//! handshake bounded by `Timeouts::handshake`.

use std::future::Future;
use std::io;
use std::io::Read;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use boring::ssl::{
    ConnectConfiguration, SslConnector, SslMethod, SslSessionCacheMode, SslVerifyMode, SslVersion,
};
use boring::x509::store::X509StoreBuilder;
use boring::x509::X509;
use http::Uri;
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::TokioIo;
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_boring::SslStream;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::fingerprint::selector::{alpn_protocols, alpn_wire_format, select_template, TemplateId};
use crate::fingerprint::tls::{CertCompression, TlsFingerprint};
use crate::profile::BrowserProfile;
use crate::proxy::ProxyConfig;
use crate::rng::{with_rng, SharedRng};
use crate::timeouts::Timeouts;

// FFI bindings for BoringSSL extension control
use boring_sys::{CRYPTO_BUFFER, SSL, SSL_CTX};
use std::os::raw::c_int;

extern "C" {
    /// Enable GREASE (Generate Random Extensions And Sustain Extensibility)
    pub fn SSL_CTX_set_grease_enabled(ctx: *mut SSL_CTX, enabled: c_int) -> c_int;
    /// Enable extension order permutation (Chrome 110+ behavior)
    pub fn SSL_CTX_set_permute_extensions(ctx: *mut SSL_CTX, enabled: c_int) -> c_int;
}

/// Upper bound on a proxy's CONNECT response head.
const MAX_PROXY_RESPONSE: usize = 8192;

/// Hand a decompressed certificate back to BoringSSL.
///
/// Returns 1 on success, 0 when the size does not match what the peer
/// announced or the buffer cannot be allocated.
unsafe fn emit_cert_buffer(
    out: *mut *mut CRYPTO_BUFFER,
    decompressed: &[u8],
    expected: usize,
) -> c_int {
    if decompressed.len() != expected {
        return 0;
    }
    // CRYPTO_BUFFER_new copies the data.
    let buffer =
        boring_sys::CRYPTO_BUFFER_new(
            decompressed.as_ptr(),
            decompressed.len(),
            std::ptr::null_mut(),
        );
    if buffer.is_null() {
        return 0;
    }
    *out = buffer;
    1
}

/// Brotli certificate decompression callback (RFC 8879).
unsafe extern "C" fn decompress_brotli_cert(
    _ssl: *mut SSL,
    out: *mut *mut CRYPTO_BUFFER,
    uncompressed_len: usize,
    in_: *const u8,
    in_len: usize,
) -> c_int {
    let compressed = std::slice::from_raw_parts(in_, in_len);
    let mut decompressed = Vec::with_capacity(uncompressed_len);
    let mut decoder = brotli::Decompressor::new(compressed, 4096);
    match decoder.read_to_end(&mut decompressed) {
        Ok(_) => emit_cert_buffer(out, &decompressed, uncompressed_len),
        Err(_) => 0,
    }
}

/// Zlib certificate decompression callback (RFC 8879).
unsafe extern "C" fn decompress_zlib_cert(
    _ssl: *mut SSL,
    out: *mut *mut CRYPTO_BUFFER,
    uncompressed_len: usize,
    in_: *const u8,
    in_len: usize,
) -> c_int {
    let compressed = std::slice::from_raw_parts(in_, in_len);
    let mut decompressed = Vec::with_capacity(uncompressed_len);
    let mut decoder = flate2::read::ZlibDecoder::new(compressed);
    match decoder.read_to_end(&mut decompressed) {
        Ok(_) => emit_cert_buffer(out, &decompressed, uncompressed_len),
        Err(_) => 0,
    }
}

/// Negotiated ALPN protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlpnProtocol {
    /// HTTP/2 ("h2")
    H2,
    /// HTTP/1.1 ("http/1.1")
    Http1,
    /// No ALPN negotiated or unknown protocol
    Unknown,
}

impl AlpnProtocol {
    pub fn is_h2(&self) -> bool {
        matches!(self, Self::H2)
    }
}

/// What a pooled connection presented on the wire.
///
/// Attached to every response served over the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// `None` for plain-text connections.
    pub template: Option<TemplateId>,
    pub alpn: AlpnProtocol,
    pub proxied: bool,
}

/// Stream that can be either HTTP (plain TCP) or HTTPS (TLS).
#[derive(Debug)]
pub enum MaybeHttpsStream {
    /// Plain TCP stream for HTTP.
    Http(TcpStream),
    /// TLS-wrapped stream for HTTPS.
    Https(SslStream<TcpStream>),
}

impl MaybeHttpsStream {
    /// Protocol negotiated during the TLS handshake; `Unknown` for plain TCP.
    pub fn alpn_protocol(&self) -> AlpnProtocol {
        match self {
            MaybeHttpsStream::Http(_) => AlpnProtocol::Unknown,
            MaybeHttpsStream::Https(stream) => match stream.ssl().selected_alpn_protocol() {
                Some(b"h2") => AlpnProtocol::H2,
                Some(b"http/1.1") => AlpnProtocol::Http1,
                _ => AlpnProtocol::Unknown,
            },
        }
    }
}

impl AsyncRead for MaybeHttpsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_read(cx, buf),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeHttpsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_write(cx, buf),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_flush(cx),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeHttpsStream::Http(stream) => Pin::new(stream).poll_shutdown(cx),
            MaybeHttpsStream::Https(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

pin_project! {
    /// Established connection handed to the pooled client.
    pub struct BrowserStream {
        #[pin]
        io: TokioIo<MaybeHttpsStream>,
        info: ConnectionInfo,
    }
}

impl BrowserStream {
    pub fn info(&self) -> ConnectionInfo {
        self.info
    }
}

impl hyper::rt::Read for BrowserStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        hyper::rt::Read::poll_read(self.project().io, cx, buf)
    }
}

impl hyper::rt::Write for BrowserStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        hyper::rt::Write::poll_write(self.project().io, cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        hyper::rt::Write::poll_flush(self.project().io, cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        hyper::rt::Write::poll_shutdown(self.project().io, cx)
    }
}

impl Connection for BrowserStream {
    fn connected(&self) -> Connected {
        // A CONNECT tunnel is transparent: requests keep origin-form.
        let connected = Connected::new().extra(self.info);
        if self.info.alpn.is_h2() {
            connected.negotiated_h2()
        } else {
            connected
        }
    }
}

/// Connection settings shared by every connection of one session.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub verify_tls: bool,
    pub randomize_tls: bool,
    pub proxy: Option<ProxyConfig>,
    pub timeouts: Timeouts,
    /// Extra trust anchors (DER or PEM), added to the system store.
    pub root_certificates: Vec<Vec<u8>>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            verify_tls: true,
            randomize_tls: false,
            proxy: None,
            timeouts: Timeouts::default(),
            root_certificates: Vec::new(),
        }
    }
}

/// Connector bound to one browser profile.
///
/// Cloning is cheap; clones share the profile and random source.
#[derive(Clone)]
pub struct BrowserConnector {
    profile: Arc<BrowserProfile>,
    config: Arc<ConnectorConfig>,
    rng: SharedRng,
}

impl BrowserConnector {
    pub fn new(profile: Arc<BrowserProfile>, config: ConnectorConfig, rng: SharedRng) -> Self {
        Self {
            profile,
            config: Arc::new(config),
            rng,
        }
    }

    pub fn profile(&self) -> &Arc<BrowserProfile> {
        &self.profile
    }

    /// Connect to a URI, returning either a plain TCP or TLS stream.
    pub async fn connect(&self, uri: &Uri) -> Result<BrowserStream> {
        let host = uri
            .host()
            .ok_or_else(|| Error::http_protocol(format!("missing host in {uri}")))?;
        let https = uri.scheme_str() == Some("https");
        let port = uri.port_u16().unwrap_or(if https { 443 } else { 80 });
        let target = format!("{}:{}", host, port);

        let tcp = match &self.config.proxy {
            Some(proxy) => {
                let tcp = dial(&proxy.addr(), self.config.timeouts.connect).await?;
                self.tunnel(tcp, proxy, &target).await?
            }
            None => dial(&target, self.config.timeouts.connect).await?,
        };
        let proxied = self.config.proxy.is_some();

        if !https {
            debug!("Connected to {} (plain)", target);
            return Ok(BrowserStream {
                io: TokioIo::new(MaybeHttpsStream::Http(tcp)),
                info: ConnectionInfo {
                    template: None,
                    alpn: AlpnProtocol::Unknown,
                    proxied,
                },
            });
        }

        let family = self.profile.family();
        let (template, fingerprint, alpn) = with_rng(&self.rng, |rng| {
            let template = select_template(&self.profile, self.config.randomize_tls, rng);
            let fingerprint = template.tls_fingerprint(rng);
            (template, fingerprint, alpn_protocols(family, rng))
        });
        debug!(
            "Connecting to {} with template {} (family {}, alpn {:?})",
            target, template, family, alpn
        );

        let ssl = self
            .configure_ssl(&fingerprint, &alpn)
            .and_then(|connector| {
                let mut config = connector.configure()?;
                if !self.config.verify_tls {
                    config.set_verify_hostname(false);
                }
                Ok(config)
            })
            .map_err(|e| Error::TlsSetup {
                addr: target.clone(),
                message: e.to_string(),
            })?;

        let server_name = host.trim_start_matches('[').trim_end_matches(']');
        let stream =
            handshake(ssl, server_name, tcp, &target, self.config.timeouts.handshake).await?;
        let stream = MaybeHttpsStream::Https(stream);
        let negotiated = stream.alpn_protocol();
        debug!("TLS established with {} ({:?})", target, negotiated);

        Ok(BrowserStream {
            io: TokioIo::new(stream),
            info: ConnectionInfo {
                template: Some(template),
                alpn: negotiated,
                proxied,
            },
        })
    }

    fn configure_ssl(
        &self,
        fp: &TlsFingerprint,
        alpn: &[&str],
    ) -> std::result::Result<SslConnector, boring::error::ErrorStack> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())?;

        if !fp.cipher_list.is_empty() {
            builder.set_cipher_list(&fp.cipher_string())?;
        }
        if !fp.curves.is_empty() {
            builder.set_curves_list(&fp.curves_string())?;
        }
        if !fp.sigalgs.is_empty() {
            builder.set_sigalgs_list(&fp.sigalgs_string())?;
        }

        unsafe {
            let ctx = builder.as_ptr() as *mut SSL_CTX;
            SSL_CTX_set_grease_enabled(ctx, fp.grease as c_int);
            SSL_CTX_set_permute_extensions(ctx, fp.permute_extensions as c_int);

            // Only decompression is registered: the client never sends certificates.
            match fp.cert_compression {
                CertCompression::Brotli => {
                    boring_sys::SSL_CTX_add_cert_compression_alg(
                        ctx,
                        boring_sys::TLSEXT_cert_compression_brotli as u16,
                        None,
                        Some(decompress_brotli_cert),
                    );
                }
                CertCompression::Zlib => {
                    boring_sys::SSL_CTX_add_cert_compression_alg(
                        ctx,
                        boring_sys::TLSEXT_cert_compression_zlib as u16,
                        None,
                        Some(decompress_zlib_cert),
                    );
                }
                CertCompression::None => {}
            }
        }

        builder.set_min_proto_version(Some(SslVersion::TLS1_2))?;
        builder.set_max_proto_version(Some(SslVersion::TLS1_3))?;

        // Browsers resume sessions.
        builder.set_session_cache_mode(SslSessionCacheMode::CLIENT);
        builder.set_alpn_protos(&alpn_wire_format(alpn))?;

        if self.config.verify_tls {
            let mut store = X509StoreBuilder::new()?;
            if let Err(e) = store.set_default_paths() {
                warn!("System trust store unavailable, verification will fail: {}", e);
            }
            for cert_bytes in &self.config.root_certificates {
                match X509::from_der(cert_bytes).or_else(|_| X509::from_pem(cert_bytes)) {
                    Ok(cert) => store.add_cert(cert)?,
                    Err(e) => warn!("Ignoring unparseable root certificate: {}", e),
                }
            }
            builder.set_cert_store(store.build());
            builder.set_verify(SslVerifyMode::PEER);
        } else {
            builder.set_verify(SslVerifyMode::NONE);
        }

        Ok(builder.build())
    }

    /// Open a `CONNECT` tunnel to `target` through an established proxy connection.
    async fn tunnel(
        &self,
        mut tcp: TcpStream,
        proxy: &ProxyConfig,
        target: &str,
    ) -> Result<TcpStream> {
        let tunnel_error = |message: String| Error::ProxyTunnel {
            proxy: proxy.to_string(),
            target: target.to_string(),
            message,
        };

        let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
        if let Some(auth) = proxy.authorization() {
            request.push_str(&format!("Proxy-Authorization: {auth}\r\n"));
        }
        request.push_str(&format!("User-Agent: {}\r\n\r\n", self.profile.user_agent()));

        let exchange = async {
            tcp.write_all(request.as_bytes()).await?;
            let mut head = Vec::with_capacity(512);
            let mut chunk = [0u8; 512];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                if head.len() > MAX_PROXY_RESPONSE {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "response head too large",
                    ));
                }
                let n = tcp.read(&mut chunk).await?;
                if n == 0 {
                    return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
                }
                head.extend_from_slice(&chunk[..n]);
            }
            Ok(head)
        };

        let head = match tokio::time::timeout(self.config.timeouts.connect, exchange).await {
            Ok(Ok(head)) => head,
            Ok(Err(e)) => return Err(tunnel_error(e.to_string())),
            Err(_) => return Err(tunnel_error("timed out waiting for CONNECT response".into())),
        };

        let status_line = head
            .split(|b| *b == b'\n')
            .next()
            .map(|line| String::from_utf8_lossy(line).trim().to_string())
            .unwrap_or_default();
        let status = status_line.split_whitespace().nth(1);
        if status != Some("200") {
            return Err(tunnel_error(format!("unexpected response {status_line:?}")));
        }
        debug!("Tunnel to {} established via {}", target, proxy);
        Ok(tcp)
    }
}

impl std::fmt::Debug for BrowserConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserConnector")
            .field("family", &self.profile.family())
            .field("config", &self.config)
            .finish()
    }
}

impl tower_service::Service<Uri> for BrowserConnector {
    type Response = BrowserStream;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<BrowserStream>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let connector = self.clone();
        Box::pin(async move { connector.connect(&uri).await })
    }
}

async fn dial(addr: &str, timeout: Duration) -> Result<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(tcp)) => {
            // Browsers disable Nagle.
            if let Err(e) = tcp.set_nodelay(true) {
                debug!("Failed to set TCP_NODELAY on {}: {}", addr, e);
            }
            Ok(tcp)
        }
        Ok(Err(source)) => Err(Error::Dial {
            addr: addr.to_string(),
            source,
        }),
        Err(_) => Err(Error::DialTimeout {
            addr: addr.to_string(),
            timeout,
        }),
    }
}

/// Run the handshake under `deadline`.
///
/// The handshake future owns the socket; when the deadline wins, the future
/// is dropped and the socket closed with it.
async fn handshake(
    config: ConnectConfiguration,
    server_name: &str,
    tcp: TcpStream,
    addr: &str,
    deadline: Duration,
) -> Result<SslStream<TcpStream>> {
    match tokio::time::timeout(deadline, tokio_boring::connect(config, server_name, tcp)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => {
            debug!("TLS handshake with {} failed: {}", addr, e);
            Err(Error::Handshake {
                addr: addr.to_string(),
                message: e.to_string(),
            })
        }
        Err(_) => {
            warn!("TLS handshake with {} timed out after {:?}", addr, deadline);
            Err(Error::HandshakeTimeout {
                addr: addr.to_string(),
                timeout: deadline,
            })
        }
    }
}
