//! Session-scoped request execution.
//!
//! A [`BrowserClient`] owns one profile, the pooled transport built for it,
//! a cookie jar and the navigation history. Every hop of every request gets
//! headers generated from the same profile that drives the connector's
//! template selection, so TLS and HTTP identity cannot drift apart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{Method, Request, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::cookie::{Cookie, SharedCookieJar};
use crate::error::{Error, Result};
use crate::headers::{HeaderEngine, OrderedHeaders, RequestContext};
use crate::history::NavigationHistory;
use crate::profile::{BrowserProfile, ProfileStore};
use crate::response::Response;
use crate::rng::{shared_rng, with_rng, SharedRng};
use crate::stream::{read_stream, ContentEncoding, StreamConfig, StreamResult};
use crate::transport::{build_client, AlpnProtocol, BrowserConnector, ConnectionInfo, HttpClient};

/// Redirects followed when the caller does not say otherwise.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Headers copied from one hop to the next across a redirect.
const REDIRECT_PRESERVED: &[HeaderName] = &[
    header::AUTHORIZATION,
    HeaderName::from_static("x-requested-with"),
];

/// Builds clients whose profiles come from one shared store.
#[derive(Debug, Clone, Default)]
pub struct ClientFactory {
    profiles: Arc<ProfileStore>,
}

impl ClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(profiles: Arc<ProfileStore>) -> Self {
        Self { profiles }
    }

    pub fn profiles(&self) -> &Arc<ProfileStore> {
        &self.profiles
    }

    /// Build a client for `config.session_id`, generating its profile on
    /// first use.
    pub fn client(&self, config: ClientConfig) -> Result<BrowserClient> {
        let profile = self.profiles.get_or_create(config.session_id);
        BrowserClient::with_profile(config, profile)
    }
}

/// Per-call options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Applied last, in order; a caller header replaces a generated one.
    pub headers: Vec<(String, String)>,
    pub is_navigation: bool,
    /// Defaults to the most recent history entry.
    pub referrer: Option<String>,
    pub origin: Option<String>,
    pub follow_redirects: bool,
    pub max_redirects: usize,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            is_navigation: true,
            referrer: None,
            origin: None,
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Treat the request as a sub-resource fetch instead of a navigation.
    pub fn subresource(mut self) -> Self {
        self.is_navigation = false;
        self
    }

    pub fn referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Return 3xx responses instead of following them.
    pub fn no_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }
}

/// Browser session.
///
/// Safe to share between tasks; history updates are serialized.
pub struct BrowserClient {
    config: Arc<ClientConfig>,
    profile: Arc<BrowserProfile>,
    headers: HeaderEngine,
    rng: SharedRng,
    history: Mutex<NavigationHistory>,
    cookies: SharedCookieJar,
    /// Protocol each https origin negotiated on its latest connection.
    protocols: Mutex<HashMap<String, AlpnProtocol>>,
    connector: BrowserConnector,
    transport: ArcSwap<HttpClient>,
}

impl std::fmt::Debug for BrowserClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserClient")
            .field("session", &self.config.session_id)
            .field("family", &self.profile.family())
            .finish()
    }
}

impl BrowserClient {
    /// Build a client bound to an explicit profile.
    pub fn with_profile(config: ClientConfig, profile: Arc<BrowserProfile>) -> Result<Self> {
        config.validate()?;
        let rng = shared_rng(config.seed);
        let headers = HeaderEngine::new(Arc::clone(&profile))?;
        let connector =
            BrowserConnector::new(Arc::clone(&profile), config.connector_config()?, rng.clone());
        let transport = build_client(connector.clone(), profile.family(), &config.timeouts);
        debug!(
            "Created {} client for {} ({})",
            profile.family(),
            config.session_id,
            profile.user_agent()
        );
        Ok(Self {
            config: Arc::new(config),
            profile,
            headers,
            rng,
            history: Mutex::new(NavigationHistory::new()),
            cookies: SharedCookieJar::new(),
            protocols: Mutex::new(HashMap::new()),
            connector,
            transport: ArcSwap::from_pointee(transport),
        })
    }

    pub fn profile(&self) -> &Arc<BrowserProfile> {
        &self.profile
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Snapshot of the navigation history, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).to_vec()
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<Response> {
        let request = Request::get(url)
            .body(Bytes::new())
            .map_err(|e| Error::http_protocol(e.to_string()))?;
        self.execute(request, options).await
    }

    /// POST `body`; the content type travels as a caller header.
    pub async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: impl Into<Bytes>,
        options: RequestOptions,
    ) -> Result<Response> {
        let request = Request::post(url)
            .body(body.into())
            .map_err(|e| Error::http_protocol(e.to_string()))?;
        let options = options.header(header::CONTENT_TYPE.as_str(), content_type);
        self.execute(request, options).await
    }

    /// Execute `request` with browser headers, following redirects per
    /// `options`, under the session's total timeout.
    ///
    /// The request's own headers are discarded: pass extra headers through
    /// `options.headers`. On success the final URL joins the history.
    pub async fn execute(
        &self,
        request: Request<Bytes>,
        options: RequestOptions,
    ) -> Result<Response> {
        let (parts, body) = request.into_parts();
        let url = Url::parse(&parts.uri.to_string())?;
        let total = self.config.timeouts.total;

        let chain = self.run_chain(parts.method, url.clone(), body, &options);
        let response = match tokio::time::timeout(total, chain).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Timeout {
                    url: url.to_string(),
                    timeout: total,
                })
            }
        };

        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(response.url().as_str());
        Ok(response)
    }

    /// GET, retrying on transport failure or a 5xx status with exponential
    /// backoff. Statuses below 500 (4xx included) end the loop.
    pub async fn get_with_retry(
        &self,
        url: &str,
        max_retries: u32,
        options: RequestOptions,
    ) -> Result<Response> {
        let mut last_error = None;
        for attempt in 0..=max_retries {
            match self.get(url, options.clone()).await {
                Ok(response) if response.status().as_u16() < 500 => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    warn!("{} returned {} (attempt {})", url, status, attempt + 1);
                    last_error = Some(Error::http_status(
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Server Error"),
                    ));
                }
                Err(e) => {
                    warn!("{} failed (attempt {}): {}", url, attempt + 1, e);
                    last_error = Some(e);
                }
            }
            if attempt < max_retries {
                let delay = self.config.backoff.delay(attempt + 1);
                debug!("Retrying {} in {:?}", url, delay);
                tokio::time::sleep(delay).await;
            }
        }
        let source = match last_error {
            Some(e) => e,
            None => Error::http_status(0, "no attempt made"),
        };
        Err(Error::RetriesExhausted {
            retries: max_retries,
            source: Box::new(source),
        })
    }

    /// Single-hop GET consumed through the stream reader.
    ///
    /// Redirects are never followed and the history is left untouched.
    pub async fn stream_get(
        &self,
        url: &str,
        stream_config: &StreamConfig,
        options: RequestOptions,
    ) -> Result<StreamResult> {
        let url = Url::parse(url)?;
        let context = self.context_for(&options);
        let overrides = parse_headers(&options.headers)?;
        let headers = self.stamp(&url, &context, &overrides)?;

        let total = self.config.timeouts.total;
        let send = self.send(&Method::GET, &url, &headers, Bytes::new());
        let response = match tokio::time::timeout(total, send).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Timeout {
                    url: url.to_string(),
                    timeout: total,
                })
            }
        };
        self.store_cookies(&response, &url);

        let encoding = ContentEncoding::from_header(
            response
                .headers()
                .get(header::CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok()),
        );
        read_stream(encoding, response.into_body(), stream_config).await
    }

    /// Cookies the jar would send to `url`.
    pub fn cookies(&self, url: &str) -> Result<Vec<Cookie>> {
        Ok(self.cookies.cookies(&Url::parse(url)?))
    }

    /// Store a cookie as if `url` had set it. An empty domain binds it to
    /// the URL's host.
    pub fn set_cookie(&self, url: &str, mut cookie: Cookie) -> Result<()> {
        let url = Url::parse(url)?;
        if cookie.domain.is_empty() {
            cookie.domain = url
                .host_str()
                .ok_or_else(|| Error::CookieParse("No host in URL".to_string()))?
                .to_lowercase();
            cookie.host_only = true;
        }
        self.cookies.set_cookie(cookie);
        Ok(())
    }

    /// Swap in an empty jar.
    pub fn clear_cookies(&self) {
        self.cookies.clear();
    }

    /// Drop idle pooled connections. In-flight requests keep the transport
    /// they started on.
    pub fn close(&self) {
        let fresh = build_client(
            self.connector.clone(),
            self.profile.family(),
            &self.config.timeouts,
        );
        self.transport.store(Arc::new(fresh));
        debug!("Closed idle connections for {}", self.config.session_id);
    }

    async fn run_chain(
        &self,
        mut method: Method,
        mut url: Url,
        mut body: Bytes,
        options: &RequestOptions,
    ) -> Result<Response> {
        let mut context = self.context_for(options);
        let mut overrides = parse_headers(&options.headers)?;
        let mut redirects = 0usize;

        loop {
            let headers = self.stamp(&url, &context, &overrides)?;
            let response = self.send(&method, &url, &headers, body.clone()).await?;
            self.store_cookies(&response, &url);

            let status = response.status();
            if !options.follow_redirects || !status.is_redirection() {
                return Ok(Response::from_hyper(response, url));
            }
            let Some(location) = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
            else {
                return Ok(Response::from_hyper(response, url));
            };

            redirects += 1;
            if redirects > options.max_redirects {
                warn!("Redirect limit {} exceeded at {}", options.max_redirects, url);
                return Err(Error::RedirectLimit {
                    count: options.max_redirects,
                });
            }
            let next = url
                .join(location)
                .map_err(|_| Error::InvalidRedirectUrl(location.to_string()))?;
            debug!("Following {} redirect {} -> {}", status.as_u16(), url, next);

            let keeps_body = rewrite_method(status, &mut method);
            // Every hop is a fresh navigation; only a few headers carry over.
            let mut carried: Vec<(HeaderName, HeaderValue)> = REDIRECT_PRESERVED
                .iter()
                .filter_map(|name| headers.get(name.as_str()).map(|v| (name.clone(), v.clone())))
                .collect();
            if keeps_body {
                if let Some(content_type) = headers.get(header::CONTENT_TYPE.as_str()) {
                    carried.push((header::CONTENT_TYPE, content_type.clone()));
                }
            } else {
                body = Bytes::new();
            }
            overrides = carried;
            context = RequestContext {
                is_navigation: true,
                referrer: Some(url.to_string()),
                origin: None,
            };
            url = next;
        }
    }

    /// Context for the first hop. Without an explicit referrer the most
    /// recent navigation stands in.
    fn context_for(&self, options: &RequestOptions) -> RequestContext {
        let referrer = match &options.referrer {
            Some(referrer) => Some(referrer.clone()),
            None => self
                .history
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .last()
                .map(str::to_string),
        };
        RequestContext {
            is_navigation: options.is_navigation,
            referrer,
            origin: options.origin.clone(),
        }
    }

    /// Whether `url`'s origin speaks HTTP/2. Plain http never does; an https
    /// origin is unknown until one of its connections has finished ALPN.
    fn speaks_h2(&self, url: &Url) -> Option<bool> {
        if url.scheme() != "https" {
            return Some(false);
        }
        self.protocols
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&url.origin().ascii_serialization())
            .map(AlpnProtocol::is_h2)
    }

    fn record_protocol(&self, url: &Url, info: &ConnectionInfo) {
        if url.scheme() != "https" {
            return;
        }
        self.protocols
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.origin().ascii_serialization(), info.alpn);
    }

    /// Generate the header set for one hop: browser headers, jar cookies at
    /// their canonical slot, then caller overrides.
    ///
    /// On HTTP/1.1 `Host` takes its table slot; hyper only appends one when
    /// it is missing. HTTP/2 carries the authority as a pseudo-header and
    /// forbids `Connection`.
    fn stamp(
        &self,
        url: &Url,
        context: &RequestContext,
        overrides: &[(HeaderName, HeaderValue)],
    ) -> Result<OrderedHeaders> {
        let mut headers =
            with_rng(&self.rng, |rng| self.headers.generate(url.path(), context, rng))?;
        match self.speaks_h2(url) {
            Some(false) => headers.insert_canonical(header::HOST, host_header(url)?),
            Some(true) => {
                headers.remove(header::CONNECTION.as_str());
            }
            None => {}
        }
        if let Some(cookie) = self.cookies.cookie_header(url) {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|e| Error::http_protocol(format!("invalid cookie header: {e}")))?;
            headers.insert_canonical(header::COOKIE, value);
        }
        for (name, value) in overrides {
            headers.overlay(name.clone(), value.clone());
        }
        Ok(headers)
    }

    async fn send(
        &self,
        method: &Method,
        url: &Url,
        headers: &OrderedHeaders,
        body: Bytes,
    ) -> Result<http::Response<Incoming>> {
        let mut target = url.clone();
        target.set_fragment(None);
        let mut request = Request::builder()
            .method(method.clone())
            .uri(target.as_str())
            .body(Full::new(body))
            .map_err(|e| Error::http_protocol(e.to_string()))?;
        headers.apply(&mut request);

        debug!("{} {}", method, target);
        let transport = self.transport.load_full();
        let response = transport
            .request(request)
            .await
            .map_err(|source| Error::Transport {
                url: target.to_string(),
                source,
            })?;
        if let Some(info) = response.extensions().get::<ConnectionInfo>() {
            self.record_protocol(url, info);
        }
        Ok(response)
    }

    fn store_cookies(&self, response: &http::Response<Incoming>, url: &Url) {
        let values = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok());
        self.cookies.store_from_headers(values, url);
    }
}

/// Apply redirect method semantics; returns whether the body is kept.
///
/// 301/302 turn POST into GET, 303 turns everything but HEAD into GET,
/// 307/308 keep method and body.
fn rewrite_method(status: StatusCode, method: &mut Method) -> bool {
    match status {
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND if *method == Method::POST => {
            *method = Method::GET;
            false
        }
        StatusCode::SEE_OTHER if *method != Method::HEAD => {
            *method = Method::GET;
            false
        }
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => true,
        _ => *method != Method::GET && *method != Method::HEAD,
    }
}

/// `Host` value for `url`: the host, plus the port when it is not the
/// scheme's default.
fn host_header(url: &Url) -> Result<HeaderValue> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::http_protocol(format!("missing host in {url}")))?;
    let value = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    HeaderValue::from_str(&value)
        .map_err(|e| Error::http_protocol(format!("invalid Host header value: {e}")))
}

fn parse_headers(raw: &[(String, String)]) -> Result<Vec<(HeaderName, HeaderValue)>> {
    raw.iter()
        .map(|(name, value)| {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::http_protocol(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::http_protocol(format!("invalid value for {name}: {e}")))?;
            Ok((name, value))
        })
        .collect()
}
