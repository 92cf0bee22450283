//! Template selection: which ClientHello a new connection presents.

use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::profile::{BrowserFamily, BrowserProfile};

use super::tls::TlsFingerprint;

/// Probability that a Safari connection advertises only `http/1.1`.
pub const SAFARI_H1_ONLY_PROBABILITY: f64 = 0.3;

/// Identifier of a ClientHello template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateId {
    Chrome106,
    Chrome120,
    Edge106,
    Edge120,
    Firefox102,
    Firefox120,
    Safari16,
    Safari17,
    IosSafari17,
    /// Belongs to no family; only produced when randomization is requested.
    Randomized,
}

const CHROME_TEMPLATES: &[TemplateId] = &[TemplateId::Chrome106, TemplateId::Chrome120];
const EDGE_TEMPLATES: &[TemplateId] = &[TemplateId::Edge106, TemplateId::Edge120];
const FIREFOX_TEMPLATES: &[TemplateId] = &[TemplateId::Firefox102, TemplateId::Firefox120];
const SAFARI_TEMPLATES: &[TemplateId] = &[
    TemplateId::Safari16,
    TemplateId::Safari17,
    TemplateId::IosSafari17,
];

impl TemplateId {
    /// Every variant registered for `family`. Never fewer than two.
    pub fn variants(family: BrowserFamily) -> &'static [TemplateId] {
        match family {
            BrowserFamily::Chrome => CHROME_TEMPLATES,
            BrowserFamily::Edge => EDGE_TEMPLATES,
            BrowserFamily::Firefox => FIREFOX_TEMPLATES,
            BrowserFamily::Safari => SAFARI_TEMPLATES,
        }
    }

    /// Family this template impersonates; `None` for the randomized template.
    pub fn family(&self) -> Option<BrowserFamily> {
        match self {
            Self::Chrome106 | Self::Chrome120 => Some(BrowserFamily::Chrome),
            Self::Edge106 | Self::Edge120 => Some(BrowserFamily::Edge),
            Self::Firefox102 | Self::Firefox120 => Some(BrowserFamily::Firefox),
            Self::Safari16 | Self::Safari17 | Self::IosSafari17 => Some(BrowserFamily::Safari),
            Self::Randomized => None,
        }
    }

    /// Materialize the template. The randomized template draws fresh
    /// parameters from `rng` each time.
    pub fn tls_fingerprint<R: Rng + ?Sized>(&self, rng: &mut R) -> TlsFingerprint {
        match self {
            // Edge ships Chromium's network stack unchanged.
            Self::Chrome106 | Self::Edge106 => TlsFingerprint::chrome_106(),
            Self::Chrome120 | Self::Edge120 => TlsFingerprint::chrome_120(),
            Self::Firefox102 => TlsFingerprint::firefox_102(),
            Self::Firefox120 => TlsFingerprint::firefox_120(),
            Self::Safari16 => TlsFingerprint::safari_16(),
            Self::Safari17 => TlsFingerprint::safari_17(),
            Self::IosSafari17 => TlsFingerprint::ios_safari_17(),
            Self::Randomized => TlsFingerprint::randomized(rng),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chrome106 => "chrome_106",
            Self::Chrome120 => "chrome_120",
            Self::Edge106 => "edge_106",
            Self::Edge120 => "edge_120",
            Self::Firefox102 => "firefox_102",
            Self::Firefox120 => "firefox_120",
            Self::Safari16 => "safari_16",
            Self::Safari17 => "safari_17",
            Self::IosSafari17 => "ios_safari_17",
            Self::Randomized => "randomized",
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the ClientHello template for a new connection.
///
/// With `randomize` set the family is ignored. Otherwise the pick is uniform
/// over the profile family's variants.
pub fn select_template<R: Rng + ?Sized>(
    profile: &BrowserProfile,
    randomize: bool,
    rng: &mut R,
) -> TemplateId {
    if randomize {
        return TemplateId::Randomized;
    }
    TemplateId::variants(profile.family())
        .choose(rng)
        .copied()
        .unwrap_or(TemplateId::Chrome120)
}

/// ALPN protocols to advertise, in preference order.
pub fn alpn_protocols<R: Rng + ?Sized>(family: BrowserFamily, rng: &mut R) -> Vec<&'static str> {
    match family {
        BrowserFamily::Safari if rng.gen_bool(SAFARI_H1_ONLY_PROBABILITY) => vec!["http/1.1"],
        _ => vec!["h2", "http/1.1"],
    }
}

/// Encode protocol names in ALPN wire format (length-prefixed).
pub fn alpn_wire_format(protocols: &[&str]) -> Vec<u8> {
    let mut wire = Vec::with_capacity(protocols.iter().map(|p| p.len() + 1).sum());
    for proto in protocols {
        wire.push(proto.len() as u8);
        wire.extend_from_slice(proto.as_bytes());
    }
    wire
}
