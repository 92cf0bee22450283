use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{Request, Response, Version};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::TcpListener;

/// One request as hyper's HTTP/2 server decoded it.
#[derive(Debug, Clone)]
pub struct H2Request {
    pub method: String,
    pub path: String,
    pub version: Version,
    /// Regular header fields; pseudo-headers are not included.
    pub headers: Vec<(String, String)>,
}

impl H2Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// TLS server speaking only HTTP/2, answering every request with `body`.
pub struct MockH2Server {
    listener: TcpListener,
    port: u16,
    log: Arc<Mutex<Vec<H2Request>>>,
}

impl MockH2Server {
    pub async fn new() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            port,
            log: Arc::default(),
        })
    }

    pub fn url(&self) -> String {
        format!("https://127.0.0.1:{}", self.port)
    }

    pub fn log(&self) -> Arc<Mutex<Vec<H2Request>>> {
        self.log.clone()
    }

    pub fn start(
        self,
        acceptor: boring::ssl::SslAcceptor,
        body: &'static str,
    ) -> tokio::task::JoinHandle<()> {
        let acceptor = Arc::new(acceptor);
        tokio::spawn(async move {
            while let Ok((stream, _)) = self.listener.accept().await {
                let acceptor = acceptor.clone();
                let log = self.log.clone();
                tokio::spawn(async move {
                    let tls = match tokio_boring::accept(&acceptor, stream).await {
                        Ok(tls) => tls,
                        Err(e) => {
                            tracing::debug!("TLS accept failed: {}", e);
                            return;
                        }
                    };
                    let service = service_fn(move |request: Request<Incoming>| {
                        log.lock().unwrap().push(H2Request {
                            method: request.method().to_string(),
                            path: request.uri().path().to_string(),
                            version: request.version(),
                            headers: request
                                .headers()
                                .iter()
                                .map(|(n, v)| {
                                    (n.to_string(), v.to_str().unwrap_or_default().to_string())
                                })
                                .collect(),
                        });
                        let response = Response::new(Full::new(Bytes::from(body)));
                        async move { Ok::<_, Infallible>(response) }
                    });
                    let served = http2::Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(tls), service)
                        .await;
                    if let Err(e) = served {
                        tracing::debug!("h2 connection ended: {}", e);
                    }
                });
            }
        })
    }
}
