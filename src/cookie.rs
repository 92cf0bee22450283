//! RFC 6265 cookie handling with public-suffix aware domain scoping.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use url::Url;

use crate::error::{Error, Result};

/// Browsers cap cookie lifetime at 400 days.
const MAX_AGE_CAP_SECS: i64 = 400 * 24 * 60 * 60;

/// RFC 6265 compliant cookie representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    /// Set when the cookie had no `Domain` attribute: it then matches the
    /// origin host exactly and never its subdomains.
    pub host_only: bool,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
    pub expires: Option<DateTime<Utc>>,
}

impl Cookie {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: normalize_domain(&domain.into()),
            host_only: true,
            path: "/".to_string(),
            secure: false,
            http_only: false,
            same_site: None,
            expires: None,
        }
    }

    /// Parse a `Set-Cookie` value received from `request_url`.
    ///
    /// A `Domain` attribute naming a public suffix, or a domain the request
    /// host does not belong to, rejects the cookie.
    pub fn from_set_cookie_header(header: &str, request_url: &Url) -> Result<Self> {
        let request_host = request_url
            .host_str()
            .ok_or_else(|| Error::CookieParse("No host in URL".to_string()))?
            .to_lowercase();

        let mut parts = header.split(';').map(str::trim);
        let (name, value) = match parts.next().and_then(|pair| pair.split_once('=')) {
            Some((n, v)) => (n.trim().to_string(), v.trim().trim_matches('"').to_string()),
            None => return Err(Error::CookieParse("No = in cookie".to_string())),
        };
        if name.is_empty() {
            return Err(Error::CookieParse("Empty cookie name".to_string()));
        }

        let mut cookie = Cookie::new(name, value, request_host.as_str());
        cookie.path = default_path(request_url);
        let mut max_age: Option<i64> = None;

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim().to_lowercase(), v.trim()),
                None => (attr.to_lowercase(), ""),
            };
            match key.as_str() {
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                "domain" if !val.is_empty() => {
                    let domain = normalize_domain(val);
                    if is_public_suffix(&domain) {
                        if domain != request_host {
                            return Err(Error::CookieParse(format!(
                                "Domain {domain} is a public suffix"
                            )));
                        }
                        // Public suffix naming the host itself: host-only.
                    } else if domain_match(&request_host, &domain) {
                        cookie.domain = domain;
                        cookie.host_only = false;
                    } else {
                        return Err(Error::CookieParse(format!(
                            "Domain {domain} does not match host {request_host}"
                        )));
                    }
                }
                "path" if val.starts_with('/') => cookie.path = val.to_string(),
                "expires" => cookie.expires = parse_cookie_date(val),
                "max-age" => max_age = val.parse().ok(),
                "samesite" => cookie.same_site = Some(val.to_string()),
                _ => {}
            }
        }

        // Max-Age wins over Expires.
        if let Some(seconds) = max_age {
            cookie.expires = Some(if seconds <= 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                Utc::now() + ChronoDuration::seconds(seconds.min(MAX_AGE_CAP_SECS))
            });
        }
        Ok(cookie)
    }

    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|expires| expires <= Utc::now())
    }

    pub fn matches_url(&self, url: &Url) -> bool {
        let request_host = match url.host_str() {
            Some(h) => h.to_lowercase(),
            None => return false,
        };
        if self.secure && url.scheme() != "https" {
            return false;
        }
        if self.is_expired() {
            return false;
        }
        let host_ok = if self.host_only {
            request_host == self.domain
        } else {
            domain_match(&request_host, &self.domain)
        };
        host_ok && path_match(url.path(), &self.path)
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Cookie jar keyed by (domain, path, name).
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    cookies: HashMap<(String, String, String), (u64, Cookie)>,
    next_seq: u64,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a cookie, replacing any with the same domain, path and name.
    /// An already-expired cookie deletes its counterpart instead.
    pub fn store(&mut self, cookie: Cookie) {
        let key = (cookie.domain.clone(), cookie.path.clone(), cookie.name.clone());
        if cookie.is_expired() {
            self.cookies.remove(&key);
            return;
        }
        // Replacement keeps the original creation order.
        let seq = match self.cookies.get(&key) {
            Some((seq, _)) => *seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.cookies.insert(key, (seq, cookie));
    }

    /// Cookies to send to `url`: longest path first, then oldest first.
    pub fn cookies_for_url(&self, url: &Url) -> Vec<Cookie> {
        let mut matching: Vec<&(u64, Cookie)> = self
            .cookies
            .values()
            .filter(|(_, c)| c.matches_url(url))
            .collect();
        matching.sort_by(|(sa, a), (sb, b)| b.path.len().cmp(&a.path.len()).then(sa.cmp(sb)));
        matching.into_iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn build_cookie_header(&self, url: &Url) -> Option<String> {
        let cookies = self.cookies_for_url(url);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(Cookie::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Store every parseable `Set-Cookie` value; malformed ones are skipped.
    pub fn store_from_headers<'a>(
        &mut self,
        values: impl IntoIterator<Item = &'a str>,
        request_url: &Url,
    ) {
        for value in values {
            match Cookie::from_set_cookie_header(value, request_url) {
                Ok(cookie) => self.store(cookie),
                Err(e) => tracing::debug!("Ignoring Set-Cookie from {}: {}", request_url, e),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// The jar shared by every request of one client.
///
/// Readers load the current jar reference; `clear` swaps in a fresh jar in
/// one atomic step, so a concurrent reader sees either the old jar or the
/// new one and never a half-cleared state.
#[derive(Debug, Clone, Default)]
pub struct SharedCookieJar {
    inner: Arc<ArcSwap<Mutex<CookieJar>>>,
}

impl SharedCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cookies(&self, url: &Url) -> Vec<Cookie> {
        let jar = self.inner.load();
        let guard = jar.lock().unwrap_or_else(PoisonError::into_inner);
        guard.cookies_for_url(url)
    }

    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        let jar = self.inner.load();
        let guard = jar.lock().unwrap_or_else(PoisonError::into_inner);
        guard.build_cookie_header(url)
    }

    pub fn set_cookie(&self, cookie: Cookie) {
        let jar = self.inner.load();
        jar.lock().unwrap_or_else(PoisonError::into_inner).store(cookie);
    }

    pub fn store_from_headers<'a>(
        &self,
        values: impl IntoIterator<Item = &'a str>,
        request_url: &Url,
    ) {
        let jar = self.inner.load();
        jar.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .store_from_headers(values, request_url);
    }

    pub fn clear(&self) {
        self.inner.store(Arc::new(Mutex::new(CookieJar::new())));
    }

    pub fn len(&self) -> usize {
        let jar = self.inner.load();
        let len = jar.lock().unwrap_or_else(PoisonError::into_inner).len();
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.strip_prefix('.').unwrap_or(domain).to_lowercase()
}

fn is_public_suffix(domain: &str) -> bool {
    psl::suffix_str(domain) == Some(domain)
}

fn domain_match(host: &str, domain: &str) -> bool {
    if host == domain {
        return true;
    }
    // IP addresses only ever match exactly.
    host.parse::<IpAddr>().is_err()
        && host.len() > domain.len()
        && host.ends_with(domain)
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}

fn path_match(request_path: &str, cookie_path: &str) -> bool {
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && (cookie_path.ends_with('/')
                || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/')))
}

/// RFC 6265 §5.1.4 default path: directory of the request path.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

fn parse_cookie_date(date_str: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(date_str) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%a, %d %b %Y %H:%M:%S GMT",
        "%A, %d-%b-%y %H:%M:%S GMT",
        "%a, %d-%b-%Y %H:%M:%S GMT",
    ] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(date_str, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_host_only_cookie() {
        let cookie =
            Cookie::from_set_cookie_header("sid=abc; Path=/", &url("https://www.example.com/"))
                .unwrap();
        assert!(cookie.host_only);
        assert!(cookie.matches_url(&url("https://www.example.com/page")));
        assert!(!cookie.matches_url(&url("https://sub.www.example.com/")));
    }

    #[test]
    fn test_domain_cookie_matches_subdomains() {
        let www = url("https://www.example.com/");
        let cookie = Cookie::from_set_cookie_header("sid=abc; Domain=.example.com", &www).unwrap();
        assert!(!cookie.host_only);
        assert_eq!(cookie.domain, "example.com");
        assert!(cookie.matches_url(&url("https://api.example.com/")));
        assert!(!cookie.matches_url(&url("https://notexample.com/")));
    }

    #[test]
    fn test_public_suffix_domain_rejected() {
        let shop = url("https://shop.example.co.uk/");
        let err = Cookie::from_set_cookie_header("sid=abc; Domain=co.uk", &shop);
        assert!(err.is_err());
        let example = url("https://example.com/");
        let err = Cookie::from_set_cookie_header("sid=abc; Domain=com", &example);
        assert!(err.is_err());
    }

    #[test]
    fn test_foreign_domain_rejected() {
        let example = url("https://example.com/");
        assert!(Cookie::from_set_cookie_header("a=b; Domain=other.com", &example).is_err());
    }

    #[test]
    fn test_secure_and_path_scoping() {
        let example = url("https://example.com/");
        let cookie =
            Cookie::from_set_cookie_header("t=1; Secure; Path=/account", &example).unwrap();
        assert!(!cookie.matches_url(&url("http://example.com/account")));
        assert!(cookie.matches_url(&url("https://example.com/account/settings")));
        assert!(!cookie.matches_url(&url("https://example.com/accounts")));
    }

    #[test]
    fn test_max_age_zero_deletes() {
        let origin = url("https://example.com/");
        let mut jar = CookieJar::new();
        jar.store_from_headers(["a=1"], &origin);
        assert_eq!(jar.len(), 1);
        jar.store_from_headers(["a=1; Max-Age=0"], &origin);
        assert!(jar.is_empty());
    }

    #[test]
    fn test_header_orders_longest_path_first() {
        let origin = url("https://example.com/a/b/page");
        let mut jar = CookieJar::new();
        jar.store_from_headers(["root=1; Path=/", "deep=2; Path=/a/b"], &origin);
        assert_eq!(jar.build_cookie_header(&origin).as_deref(), Some("deep=2; root=1"));
    }

    #[test]
    fn test_expires_attribute() {
        let cookie = Cookie::from_set_cookie_header(
            "old=1; Expires=Wed, 21 Oct 2015 07:28:00 GMT",
            &url("https://example.com/"),
        )
        .unwrap();
        assert!(cookie.is_expired());
    }

    #[test]
    fn test_shared_jar_clear_swaps() {
        let jar = SharedCookieJar::new();
        let other = jar.clone();
        jar.set_cookie(Cookie::new("a", "1", "example.com"));
        assert_eq!(other.len(), 1);
        other.clear();
        assert!(jar.is_empty());
        assert_eq!(jar.cookie_header(&url("https://example.com/")), None);
    }
}
