//! Shared state under concurrent use: profile binding, history, cookie isolation.

use std::sync::Arc;

use mimicry::rng::shared_rng;
use mimicry::{ClientConfig, ClientFactory, ProfileStore, RequestOptions, SessionId};

mod helpers;
use helpers::mock_server::{MockHttpServer, MockResponse};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_lookups_bind_one_profile() {
    let store = Arc::new(ProfileStore::new());
    let mut tasks = Vec::new();
    for _ in 0..64 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move { store.get_or_create(SessionId(5)) }));
    }
    let mut profiles = Vec::new();
    for task in tasks {
        profiles.push(task.await.unwrap());
    }
    assert!(profiles.iter().all(|p| Arc::ptr_eq(p, &profiles[0])));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_seeded_store_is_reproducible() {
    let a = ProfileStore::with_rng(shared_rng(Some(11)));
    let b = ProfileStore::with_rng(shared_rng(Some(11)));
    for id in 0..20 {
        assert_eq!(*a.get_or_create(SessionId(id)), *b.get_or_create(SessionId(id)));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_session() {
    let server = MockHttpServer::new().await.unwrap();
    let url = server.url();
    let log = server.log();
    server.start(|_| MockResponse::ok("ok").header("Set-Cookie", "seen=1; Path=/"));

    let client = Arc::new(helpers::chrome_client());
    let mut tasks = Vec::new();
    for i in 0..24 {
        let client = client.clone();
        let url = format!("{url}/item/{i}");
        tasks.push(tokio::spawn(async move {
            client.get(&url, RequestOptions::default()).await.map(|r| r.status())
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 200);
    }

    assert_eq!(log.len(), 24);
    assert_eq!(client.history().len(), 10);
    assert_eq!(client.cookies(&url).unwrap().len(), 1);
    // Same profile on every request.
    let agents: Vec<String> = log
        .all()
        .iter()
        .map(|r| r.header("user-agent").unwrap().to_string())
        .collect();
    assert!(agents.iter().all(|ua| ua == &agents[0]));
}

#[tokio::test]
async fn test_factory_sessions() {
    let server = MockHttpServer::new().await.unwrap();
    let url = server.url();
    server.start(|r| match r.path.as_str() {
        "/login" => MockResponse::ok("in").header("Set-Cookie", "sid=1; Path=/"),
        _ => MockResponse::ok("page"),
    });

    let factory = ClientFactory::with_store(Arc::new(ProfileStore::with_rng(shared_rng(Some(3)))));
    let first = factory
        .client(ClientConfig::builder().session_id(1u64).build().unwrap())
        .unwrap();
    let again = factory
        .client(ClientConfig::builder().session_id(1u64).build().unwrap())
        .unwrap();
    let other = factory
        .client(ClientConfig::builder().session_id(2u64).build().unwrap())
        .unwrap();

    assert!(Arc::ptr_eq(first.profile(), again.profile()));
    assert_eq!(factory.profiles().len(), 2);

    // Profiles are shared per session; cookie jars belong to each client.
    first.get(&format!("{url}/login"), RequestOptions::default()).await.unwrap();
    assert_eq!(first.cookies(&url).unwrap().len(), 1);
    assert!(again.cookies(&url).unwrap().is_empty());
    assert!(other.cookies(&url).unwrap().is_empty());
}
