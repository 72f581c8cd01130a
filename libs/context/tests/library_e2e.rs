//! End-to-end Library Tests
//!
//! One library served to several peers, each over its own session.

use network::ObjectStream;
use remote_context::{Library, ObjectRef, RemoteLibrary, SessionConfig, SessionEvent, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

const WAIT: Duration = Duration::from_secs(2);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn counter_library() -> Library {
    init_tracing();
    let hits = Arc::new(AtomicUsize::new(0));
    Library::new(SessionConfig::default())
        .unwrap()
        .with("name", "demo")
        .unwrap()
        .with(
            "hit",
            ObjectRef::function("hit", move |_, _| {
                Ok(Value::Number((hits.fetch_add(1, Ordering::SeqCst) + 1) as f64))
            }),
        )
        .unwrap()
        .with("tools", ObjectRef::new_object().with("size", 3))
        .unwrap()
}

fn attach(library: &Library) -> RemoteLibrary {
    let (host, guest) = ObjectStream::pair();
    library.serve(host).unwrap();
    RemoteLibrary::connect(guest, SessionConfig::default()).unwrap()
}

#[tokio::test]
async fn test_library_served_to_two_peers() {
    let library = counter_library();
    let a = attach(&library);
    let b = attach(&library);
    assert_ne!(a.session().unwrap().id(), b.session().unwrap().id());

    for peer in [&a, &b] {
        let name = timeout(WAIT, peer.get("name")).await.unwrap().unwrap();
        assert_eq!(name, Value::from("demo"));
    }

    // both peers reach the same function
    let first = timeout(WAIT, a.call("hit", &[])).await.unwrap().unwrap();
    let second = timeout(WAIT, b.call("hit", &[])).await.unwrap().unwrap();
    assert_eq!(first, Value::from(1));
    assert_eq!(second, Value::from(2));

    // but each holds its own mirror of a shared object
    let tools_a = timeout(WAIT, a.get("tools")).await.unwrap().unwrap();
    let tools_b = timeout(WAIT, b.get("tools")).await.unwrap().unwrap();
    assert!(!tools_a.as_object().unwrap().ptr_eq(tools_b.as_object().unwrap()));
    assert!(a.context().proxy(&tools_a).is_ok());
    assert!(a.context().proxy(&tools_b).is_err());
}

#[tokio::test]
async fn test_destroying_one_peer_leaves_the_other() {
    let library = counter_library();
    let a = attach(&library);
    let b = attach(&library);
    timeout(WAIT, b.get("name")).await.unwrap().unwrap();

    let mut events = a.subscribe().unwrap();
    a.destroy();
    let saw_close = timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Close) => return true,
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
    })
    .await
    .unwrap();
    assert!(saw_close);
    timeout(WAIT, a.closed()).await.unwrap();
    assert!(timeout(WAIT, a.get("name")).await.unwrap().is_err());

    assert!(b.session().unwrap().is_open());
    let hit = timeout(WAIT, b.call("hit", &[])).await.unwrap().unwrap();
    assert_eq!(hit, Value::from(1));
}

#[tokio::test]
async fn test_released_mirror_is_fetched_again() {
    let library = counter_library();
    let peer = attach(&library);

    let tools = timeout(WAIT, peer.get("tools")).await.unwrap().unwrap();
    let proxy = peer.context().proxy(&tools).unwrap();
    assert!(peer.release(&tools));
    assert!(proxy.is_revoked());

    let again = timeout(WAIT, peer.get("tools")).await.unwrap().unwrap();
    assert!(!again.as_object().unwrap().ptr_eq(tools.as_object().unwrap()));
    let size = timeout(WAIT, peer.get("tools").get("size")).await.unwrap().unwrap();
    assert_eq!(size, Value::from(3));
}
