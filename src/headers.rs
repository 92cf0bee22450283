//! Browser header generation.
//!
//! Every request gets a freshly generated header set: the profile decides
//! the family, the [`RequestContext`] decides the navigation-dependent
//! values, and a per-call random draw decides the optional headers. The set
//! is written in the family's wire order.

use std::sync::Arc;

use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::Request;
use rand::Rng;

use crate::error::{Error, Result};
use crate::profile::{BrowserFamily, BrowserProfile};

/// Chromium wire order (Chrome and Edge).
pub const CHROME_ORDER: &[&str] = &[
    "host",
    "connection",
    "cache-control",
    "sec-ch-ua",
    "sec-ch-ua-mobile",
    "sec-ch-ua-platform",
    "upgrade-insecure-requests",
    "user-agent",
    "accept",
    "sec-fetch-site",
    "sec-fetch-mode",
    "sec-fetch-user",
    "sec-fetch-dest",
    "accept-encoding",
    "accept-language",
    "cookie",
];

pub const FIREFOX_ORDER: &[&str] = &[
    "host",
    "user-agent",
    "accept",
    "accept-language",
    "accept-encoding",
    "connection",
    "upgrade-insecure-requests",
    "sec-fetch-dest",
    "sec-fetch-mode",
    "sec-fetch-site",
    "sec-fetch-user",
    "cache-control",
    "cookie",
];

pub const SAFARI_ORDER: &[&str] = &[
    "host",
    "accept-encoding",
    "accept",
    "user-agent",
    "accept-language",
    "connection",
    "cookie",
];

pub const CHROME_NAVIGATION_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";
pub const FIREFOX_NAVIGATION_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
pub const SAFARI_NAVIGATION_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

pub const SCRIPT_ACCEPT: &str = "*/*";
pub const STYLE_ACCEPT: &str = "text/css,*/*;q=0.1";
pub const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";
pub const DEFAULT_ACCEPT: &str = "*/*";

/// Version assumed when none can be parsed from the user agent.
pub const DEFAULT_BROWSER_VERSION: u32 = 126;
/// First Firefox release sending `Sec-Fetch-*`.
pub const FIREFOX_SEC_FETCH_MIN_VERSION: u32 = 90;

pub const PLATFORM_VERSION_PROBABILITY: f64 = 0.3;
pub const FIREFOX_TE_PROBABILITY: f64 = 0.7;
pub const DNT_PROBABILITY: f64 = 0.3;
pub const NO_CACHE_PROBABILITY: f64 = 0.2;
/// Applied to a second, independent draw when `no-cache` was not chosen.
pub const MAX_AGE_PROBABILITY: f64 = 0.4;

const SEC_CH_UA: HeaderName = HeaderName::from_static("sec-ch-ua");
const SEC_CH_UA_MOBILE: HeaderName = HeaderName::from_static("sec-ch-ua-mobile");
const SEC_CH_UA_PLATFORM: HeaderName = HeaderName::from_static("sec-ch-ua-platform");
const SEC_CH_UA_PLATFORM_VERSION: HeaderName =
    HeaderName::from_static("sec-ch-ua-platform-version");
const SEC_FETCH_SITE: HeaderName = HeaderName::from_static("sec-fetch-site");
const SEC_FETCH_MODE: HeaderName = HeaderName::from_static("sec-fetch-mode");
const SEC_FETCH_USER: HeaderName = HeaderName::from_static("sec-fetch-user");
const SEC_FETCH_DEST: HeaderName = HeaderName::from_static("sec-fetch-dest");
const DNT: HeaderName = HeaderName::from_static("dnt");

/// Per-request context: what kind of load this is and where it came from.
///
/// Built fresh for each header generation and never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub is_navigation: bool,
    pub referrer: Option<String>,
    pub origin: Option<String>,
}

impl RequestContext {
    /// A top-level page load.
    pub fn navigation() -> Self {
        Self {
            is_navigation: true,
            ..Self::default()
        }
    }

    /// An embedded asset fetched by a page.
    pub fn subresource() -> Self {
        Self::default()
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// `Sec-Fetch-Site`: relation between the referrer and the declared origin.
    pub fn fetch_site(&self) -> &'static str {
        match (&self.referrer, &self.origin) {
            (None, _) => "none",
            (Some(referrer), Some(origin)) if referrer.starts_with(origin.as_str()) => {
                "same-origin"
            }
            (Some(_), _) => "cross-site",
        }
    }

    pub fn fetch_mode(&self) -> &'static str {
        if self.is_navigation {
            "navigate"
        } else {
            "no-cors"
        }
    }

    pub fn fetch_dest(&self) -> &'static str {
        if self.is_navigation {
            "document"
        } else {
            "empty"
        }
    }
}

/// Header set in wire order, attributable to one family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedHeaders {
    family: BrowserFamily,
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl OrderedHeaders {
    pub fn family(&self) -> BrowserFamily {
        self.family
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries
            .iter()
            .find(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Header names in wire order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.entries.iter().map(|(n, v)| (n, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert at the header's position in the family order table, replacing
    /// any existing value. Names outside the table are appended.
    pub fn insert_canonical(&mut self, name: HeaderName, value: HeaderValue) {
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
            return;
        }
        let order = order_table(self.family);
        let Some(rank) = order.iter().position(|o| *o == name.as_str()) else {
            self.entries.push((name, value));
            return;
        };
        let at = self
            .entries
            .iter()
            .position(|(n, _)| {
                order
                    .iter()
                    .position(|o| *o == n.as_str())
                    .map_or(true, |r| r > rank)
            })
            .unwrap_or(self.entries.len());
        self.entries.insert(at, (name, value));
    }

    /// Caller override: replace the value in place, or append.
    pub fn overlay(&mut self, name: HeaderName, value: HeaderValue) {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        let idx = self
            .entries
            .iter()
            .position(|(n, _)| n.as_str().eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(idx).1)
    }

    /// Convert into a `HeaderMap`; iteration order of the map follows the
    /// set's order.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            map.append(name.clone(), value.clone());
        }
        map
    }

    /// Replace the request's entire header collection with this set.
    pub fn apply<B>(&self, request: &mut Request<B>) {
        *request.headers_mut() = self.to_header_map();
    }
}

/// Wire order for a family. Edge shares Chromium's order.
pub fn order_table(family: BrowserFamily) -> &'static [&'static str] {
    match family {
        BrowserFamily::Chrome | BrowserFamily::Edge => CHROME_ORDER,
        BrowserFamily::Firefox => FIREFOX_ORDER,
        BrowserFamily::Safari => SAFARI_ORDER,
    }
}

/// `Accept` for a navigation.
pub fn navigation_accept(family: BrowserFamily) -> &'static str {
    match family {
        BrowserFamily::Chrome | BrowserFamily::Edge => CHROME_NAVIGATION_ACCEPT,
        BrowserFamily::Firefox => FIREFOX_NAVIGATION_ACCEPT,
        BrowserFamily::Safari => SAFARI_NAVIGATION_ACCEPT,
    }
}

/// `Accept` for a sub-resource, keyed on the file extension of the last
/// path segment.
pub fn resource_accept(path: &str) -> &'static str {
    let segment = path.rsplit('/').next().unwrap_or(path);
    let ext = match segment.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return DEFAULT_ACCEPT,
    };
    match ext.as_str() {
        "js" => SCRIPT_ACCEPT,
        "css" => STYLE_ACCEPT,
        "jpg" | "jpeg" | "png" | "gif" | "webp" => IMAGE_ACCEPT,
        _ => DEFAULT_ACCEPT,
    }
}

pub fn accept_encoding(family: BrowserFamily) -> &'static str {
    match family {
        BrowserFamily::Safari => "gzip, deflate, br",
        _ => "gzip, deflate, br, zstd",
    }
}

/// Major version following `marker` in the user agent.
fn parse_major_version(user_agent: &str, marker: &str) -> Option<u32> {
    let rest = &user_agent[user_agent.find(marker)? + marker.len()..];
    let digits: &str = &rest[..rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len())];
    digits.parse().ok()
}

fn platform(user_agent: &str) -> &'static str {
    if user_agent.contains("Android") {
        "Android"
    } else if user_agent.contains("Macintosh") {
        "macOS"
    } else if user_agent.contains("X11") || user_agent.contains("Linux") {
        "Linux"
    } else {
        "Windows"
    }
}

fn platform_version(platform: &str) -> &'static str {
    match platform {
        "macOS" => "\"14.5.0\"",
        "Linux" => "\"6.5.0\"",
        "Android" => "\"14.0.0\"",
        _ => "\"10.0.0\"",
    }
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::http_protocol(format!("invalid {name} header value: {e}")))
}

/// Header generator bound to one browser profile.
///
/// Profile-derived values (client hints, versions) are computed once here;
/// everything context- or chance-dependent is computed per call.
#[derive(Debug, Clone)]
pub struct HeaderEngine {
    profile: Arc<BrowserProfile>,
    user_agent: HeaderValue,
    accept_language: HeaderValue,
    version: u32,
    sec_ch_ua: HeaderValue,
    mobile: bool,
    platform: &'static str,
}

impl HeaderEngine {
    /// Fails when the profile's user agent or language is not a valid header value.
    pub fn new(profile: Arc<BrowserProfile>) -> Result<Self> {
        let ua = profile.user_agent();
        let family = profile.family();
        let marker = match family {
            BrowserFamily::Chrome => "Chrome/",
            BrowserFamily::Edge => "Edg/",
            BrowserFamily::Firefox => "Firefox/",
            BrowserFamily::Safari => "Version/",
        };
        let version = parse_major_version(ua, marker).unwrap_or(DEFAULT_BROWSER_VERSION);
        let brand = match family {
            BrowserFamily::Edge => "Microsoft Edge",
            _ => "Google Chrome",
        };
        let sec_ch_ua = format!(
            "\"Not)A;Brand\";v=\"99\", \"{brand}\";v=\"{version}\", \"Chromium\";v=\"{version}\""
        );
        Ok(Self {
            user_agent: header_value("User-Agent", ua)?,
            accept_language: header_value("Accept-Language", profile.accept_language())?,
            version,
            sec_ch_ua: header_value("Sec-Ch-Ua", &sec_ch_ua)?,
            mobile: ua.contains("Mobile") || ua.contains("Android"),
            platform: platform(ua),
            profile,
        })
    }

    pub fn profile(&self) -> &Arc<BrowserProfile> {
        &self.profile
    }

    pub fn family(&self) -> BrowserFamily {
        self.profile.family()
    }

    /// Browser major version the headers claim.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Generate the ordered header set for a request to `path`.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        path: &str,
        context: &RequestContext,
        rng: &mut R,
    ) -> Result<OrderedHeaders> {
        let family = self.family();
        let mut generated: Vec<(HeaderName, HeaderValue)> = Vec::with_capacity(24);

        generated.push((header::USER_AGENT, self.user_agent.clone()));
        generated.push((header::ACCEPT_LANGUAGE, self.accept_language.clone()));
        generated.push((header::CONNECTION, HeaderValue::from_static("keep-alive")));
        let accept = if context.is_navigation {
            navigation_accept(family)
        } else {
            resource_accept(path)
        };
        generated.push((header::ACCEPT, HeaderValue::from_static(accept)));
        generated.push((
            header::ACCEPT_ENCODING,
            HeaderValue::from_static(accept_encoding(family)),
        ));

        match family {
            BrowserFamily::Chrome | BrowserFamily::Edge => {
                self.add_chromium_headers(&mut generated, context, rng)
            }
            BrowserFamily::Firefox => self.add_firefox_headers(&mut generated, context, rng),
            BrowserFamily::Safari => add_safari_headers(&mut generated, context),
        }

        if let Some(referrer) = &context.referrer {
            generated.push((header::REFERER, header_value("Referer", referrer)?));
        }
        if let Some(origin) = context.origin.as_deref().filter(|_| !context.is_navigation) {
            generated.push((header::ORIGIN, header_value("Origin", origin)?));
        }
        if rng.gen_bool(DNT_PROBABILITY) {
            generated.push((DNT, HeaderValue::from_static("1")));
        }
        if rng.gen_bool(NO_CACHE_PROBABILITY) {
            generated.push((header::CACHE_CONTROL, HeaderValue::from_static("no-cache")));
        } else if rng.gen_bool(MAX_AGE_PROBABILITY) {
            generated.push((header::CACHE_CONTROL, HeaderValue::from_static("max-age=0")));
        }

        Ok(order(family, generated))
    }

    /// Generate headers for `request` and replace its header collection.
    pub fn build<B, R: Rng + ?Sized>(
        &self,
        request: &mut Request<B>,
        context: &RequestContext,
        rng: &mut R,
    ) -> Result<OrderedHeaders> {
        let headers = self.generate(request.uri().path(), context, rng)?;
        headers.apply(request);
        Ok(headers)
    }

    fn add_chromium_headers<R: Rng + ?Sized>(
        &self,
        out: &mut Vec<(HeaderName, HeaderValue)>,
        context: &RequestContext,
        rng: &mut R,
    ) {
        out.push((SEC_CH_UA, self.sec_ch_ua.clone()));
        out.push((
            SEC_CH_UA_MOBILE,
            HeaderValue::from_static(if self.mobile { "?1" } else { "?0" }),
        ));
        out.push((SEC_CH_UA_PLATFORM, quoted_platform(self.platform)));
        push_sec_fetch(out, context);
        if context.is_navigation {
            out.push((
                header::UPGRADE_INSECURE_REQUESTS,
                HeaderValue::from_static("1"),
            ));
        }
        if rng.gen_bool(PLATFORM_VERSION_PROBABILITY) {
            out.push((
                SEC_CH_UA_PLATFORM_VERSION,
                HeaderValue::from_static(platform_version(self.platform)),
            ));
        }
    }

    fn add_firefox_headers<R: Rng + ?Sized>(
        &self,
        out: &mut Vec<(HeaderName, HeaderValue)>,
        context: &RequestContext,
        rng: &mut R,
    ) {
        out.push((
            header::UPGRADE_INSECURE_REQUESTS,
            HeaderValue::from_static("1"),
        ));
        if self.version >= FIREFOX_SEC_FETCH_MIN_VERSION {
            push_sec_fetch(out, context);
        }
        if rng.gen_bool(FIREFOX_TE_PROBABILITY) {
            out.push((header::TE, HeaderValue::from_static("trailers")));
        }
    }
}

// Safari never sends Sec-Fetch-*.
fn add_safari_headers(out: &mut Vec<(HeaderName, HeaderValue)>, context: &RequestContext) {
    if context.is_navigation {
        out.push((
            header::UPGRADE_INSECURE_REQUESTS,
            HeaderValue::from_static("1"),
        ));
    }
}

fn push_sec_fetch(out: &mut Vec<(HeaderName, HeaderValue)>, context: &RequestContext) {
    out.push((SEC_FETCH_SITE, HeaderValue::from_static(context.fetch_site())));
    out.push((SEC_FETCH_MODE, HeaderValue::from_static(context.fetch_mode())));
    out.push((SEC_FETCH_DEST, HeaderValue::from_static(context.fetch_dest())));
    if context.is_navigation {
        out.push((SEC_FETCH_USER, HeaderValue::from_static("?1")));
    }
}

fn quoted_platform(platform: &'static str) -> HeaderValue {
    HeaderValue::from_static(match platform {
        "macOS" => "\"macOS\"",
        "Linux" => "\"Linux\"",
        "Android" => "\"Android\"",
        _ => "\"Windows\"",
    })
}

/// Canonical prefix in table order, then everything else in generation order.
fn order(family: BrowserFamily, generated: Vec<(HeaderName, HeaderValue)>) -> OrderedHeaders {
    let table = order_table(family);
    let (mut known, rest): (Vec<_>, Vec<_>) = generated
        .into_iter()
        .partition(|(name, _)| table.contains(&name.as_str()));
    known.sort_by_key(|(name, _)| table.iter().position(|t| *t == name.as_str()));
    known.extend(rest);
    OrderedHeaders {
        family,
        entries: known,
    }
}
