//! Browser identity: the wire-visible attributes every other component agrees on.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::rng::{shared_rng, with_rng, SharedRng};

/// User agents a generated profile may carry.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.5; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36 Edg/125.0.0.0",
];

/// Accept-Language values a generated profile may carry.
pub const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-US,en;q=0.9,pt-BR;q=0.8",
    "pt-BR,pt;q=0.9,en;q=0.8",
    "pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7",
];

/// Browser family driving both the TLS template and the header shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserFamily {
    Chrome,
    Firefox,
    Safari,
    Edge,
}

impl BrowserFamily {
    /// Resolve the family from a user-agent string.
    ///
    /// Total: anything unrecognised resolves to Chrome. Edge carries the
    /// Chrome and Safari tokens, Chrome carries the Safari token, so the most
    /// specific marker is checked first.
    pub fn from_user_agent(user_agent: &str) -> Self {
        if user_agent.contains("Firefox/") || user_agent.contains("FxiOS") {
            return Self::Firefox;
        }
        if ["Edg/", "EdgA/", "EdgiOS/"]
            .iter()
            .any(|marker| user_agent.contains(marker))
        {
            return Self::Edge;
        }
        if user_agent.contains("Safari")
            && !user_agent.contains("Chrome")
            && !user_agent.contains("Chromium")
            && !user_agent.contains("CriOS")
        {
            return Self::Safari;
        }
        Self::Chrome
    }

    /// Chromium-based families share client hints and wire order.
    pub fn is_chromium(&self) -> bool {
        matches!(self, Self::Chrome | Self::Edge)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chrome => "Chrome",
            Self::Firefox => "Firefox",
            Self::Safari => "Safari",
            Self::Edge => "Edge",
        }
    }
}

impl fmt::Display for BrowserFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable browser identity.
///
/// The family is derived once from the user agent and can never diverge
/// from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserProfile {
    user_agent: String,
    accept_language: String,
    family: BrowserFamily,
}

impl BrowserProfile {
    pub fn new(user_agent: impl Into<String>, accept_language: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        let family = BrowserFamily::from_user_agent(&user_agent);
        Self {
            user_agent,
            accept_language: accept_language.into(),
            family,
        }
    }

    /// Draw a profile from the built-in user-agent and language pools.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let user_agent = USER_AGENTS.choose(rng).copied().unwrap_or(USER_AGENTS[0]);
        let language = ACCEPT_LANGUAGES
            .choose(rng)
            .copied()
            .unwrap_or(ACCEPT_LANGUAGES[0]);
        Self::new(user_agent, language)
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn accept_language(&self) -> &str {
        &self.accept_language
    }

    pub fn family(&self) -> BrowserFamily {
        self.family
    }
}

/// Identifier of a logical browsing thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Session identifier → profile cache.
///
/// Populated at most once per identifier: the first lookup generates and
/// stores, every later lookup returns the same `Arc`. Insertion happens under
/// the write lock through the entry API, so racing first lookups agree on a
/// single profile.
#[derive(Debug)]
pub struct ProfileStore {
    profiles: RwLock<HashMap<SessionId, Arc<BrowserProfile>>>,
    rng: SharedRng,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::with_rng(shared_rng(None))
    }

    /// Store whose generated profiles are drawn from `rng`.
    pub fn with_rng(rng: SharedRng) -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
            rng,
        }
    }

    /// Return the profile bound to `id`, generating it on first use.
    pub fn get_or_create(&self, id: SessionId) -> Arc<BrowserProfile> {
        if let Some(profile) = self.get(id) {
            return profile;
        }
        let mut profiles = self.profiles.write().unwrap_or_else(PoisonError::into_inner);
        let profile = profiles.entry(id).or_insert_with(|| {
            let profile = with_rng(&self.rng, |rng| BrowserProfile::generate(rng));
            tracing::debug!(
                "Generated {} profile for {}: {}",
                profile.family(),
                id,
                profile.user_agent()
            );
            Arc::new(profile)
        });
        Arc::clone(profile)
    }

    /// Bind `profile` to `id` unless a profile is already bound; returns the
    /// profile that ends up bound.
    pub fn insert_if_absent(&self, id: SessionId, profile: BrowserProfile) -> Arc<BrowserProfile> {
        let mut profiles = self.profiles.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(profiles.entry(id).or_insert_with(|| Arc::new(profile)))
    }

    /// Look up without creating.
    pub fn get(&self, id: SessionId) -> Option<Arc<BrowserProfile>> {
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.profiles.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_resolution() {
        assert_eq!(BrowserFamily::from_user_agent(USER_AGENTS[0]), BrowserFamily::Chrome);
        assert_eq!(BrowserFamily::from_user_agent(USER_AGENTS[5]), BrowserFamily::Firefox);
        assert_eq!(BrowserFamily::from_user_agent(USER_AGENTS[7]), BrowserFamily::Safari);
        assert_eq!(BrowserFamily::from_user_agent(USER_AGENTS[8]), BrowserFamily::Edge);
        assert_eq!(BrowserFamily::from_user_agent(""), BrowserFamily::Chrome);
        assert_eq!(BrowserFamily::from_user_agent("curl/8.5.0"), BrowserFamily::Chrome);
    }

    #[test]
    fn test_pool_covers_every_family() {
        let families: Vec<BrowserFamily> = USER_AGENTS
            .iter()
            .map(|ua| BrowserFamily::from_user_agent(ua))
            .collect();
        for family in [
            BrowserFamily::Chrome,
            BrowserFamily::Firefox,
            BrowserFamily::Safari,
            BrowserFamily::Edge,
        ] {
            assert!(families.contains(&family), "no {family} user agent in pool");
        }
    }

    #[test]
    fn test_store_never_regenerates() {
        let store = ProfileStore::with_rng(shared_rng(Some(7)));
        let first = store.get_or_create(SessionId(1));
        for _ in 0..20 {
            assert!(Arc::ptr_eq(&first, &store.get_or_create(SessionId(1))));
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insert_if_absent_keeps_existing() {
        let store = ProfileStore::new();
        let pinned =
            store.insert_if_absent(SessionId(3), BrowserProfile::new(USER_AGENTS[7], "en-US"));
        let again =
            store.insert_if_absent(SessionId(3), BrowserProfile::new(USER_AGENTS[5], "en-US"));
        assert!(Arc::ptr_eq(&pinned, &again));
        assert_eq!(again.family(), BrowserFamily::Safari);
    }
}
