#![allow(dead_code)]

pub mod h2_server;
pub mod mock_server;
pub mod tls;

use std::sync::Arc;

use mimicry::{BrowserClient, BrowserProfile, ClientConfig, ClientConfigBuilder};

pub const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";
pub const FIREFOX_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:126.0) Gecko/20100101 Firefox/126.0";
pub const EDGE_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36 Edg/125.0.0.0";
pub const SAFARI_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("mimicry=debug")
        .with_test_writer()
        .try_init();
}

pub fn profile(user_agent: &str) -> Arc<BrowserProfile> {
    Arc::new(BrowserProfile::new(user_agent, "en-US,en;q=0.9"))
}

/// Seeded client presenting `user_agent`.
pub fn client_with(user_agent: &str, config: ClientConfigBuilder) -> BrowserClient {
    let config: ClientConfig = config.seed(7).build().expect("valid config");
    BrowserClient::with_profile(config, profile(user_agent)).expect("client")
}

pub fn chrome_client() -> BrowserClient {
    client_with(CHROME_UA, ClientConfig::builder())
}
