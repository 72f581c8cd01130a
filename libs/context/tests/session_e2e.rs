//! End-to-end Session Tests
//!
//! Two contexts wired back to back:
//! - in-memory object streams and framed byte pipes
//! - pipelined fetches, calls and identity round trips
//! - proxy writes on read-only and writable sessions
//! - timeouts, shutdown propagation and handle release

use network::{ObjectStream, DEFAULT_MAX_FRAME_SIZE};
use parking_lot::Mutex;
use remote_context::{
    symbol_for, ChangeKind, Context, Environment, MutableRemoteHandle, ObjectRef, PropertyKey,
    RemoteContext, RemoteError, Session, SessionConfig, Value,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing_subscriber::EnvFilter;

const WAIT: Duration = Duration::from_secs(2);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Serve `host` over an in-memory stream; returns (host side, guest side)
fn connect(host: &Context, host_config: SessionConfig) -> (RemoteContext, RemoteContext) {
    init_tracing();
    let (host_stream, guest_stream) = ObjectStream::pair();
    let host_side = host.remote(host_stream, host_config).unwrap();
    let guest = Context::new(Environment::empty()).unwrap();
    let guest_side = guest.remote(guest_stream, SessionConfig::default()).unwrap();
    (host_side, guest_side)
}

fn session_of(remote: &RemoteContext) -> Session {
    remote.session().unwrap()
}

async fn eventually<F: Fn() -> bool>(condition: F) {
    timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn sample_host() -> Context {
    let host = Context::new(Environment::empty()).unwrap();
    let identity =
        ObjectRef::function("identity", |_, args| Ok(args.first().cloned().unwrap_or_default()));
    host.set("foo", "bar").unwrap();
    host.set(
        "getRandom",
        ObjectRef::function("getRandom", |_, _| Ok(Value::Number(rand::random::<f64>()))),
    )
    .unwrap();
    host.set("identity", identity.clone()).unwrap();
    host.set("tools", ObjectRef::new_object().with("echo", identity))
        .unwrap();
    host
}

#[tokio::test]
async fn test_fetch_primitive() {
    let host = sample_host();
    let (_host_side, guest) = connect(&host, SessionConfig::default());

    let value = timeout(WAIT, guest.fetch("foo")).await.unwrap().unwrap();
    assert_eq!(value, Value::from("bar"));
}

#[tokio::test]
async fn test_call_remote_function() {
    let host = sample_host();
    let (_host_side, guest) = connect(&host, SessionConfig::default());

    let value = timeout(WAIT, guest.fetch("getRandom").call(&[]))
        .await
        .unwrap()
        .unwrap();
    let n = value.as_number().unwrap();
    assert!((0.0..1.0).contains(&n));
}

#[tokio::test]
async fn test_missing_handle_rejects() {
    let host = sample_host();
    let (_host_side, guest) = connect(&host, SessionConfig::default());

    let err = timeout(WAIT, guest.fetch("nope")).await.unwrap().unwrap_err();
    assert!(matches!(err, RemoteError::Reference { .. }), "{err}");
}

#[tokio::test]
async fn test_identity_survives_round_trip() {
    let host = sample_host();
    let (_host_side, guest) = connect(&host, SessionConfig::default());

    let mine = ObjectRef::new_object().with("x", 1);
    let back = timeout(WAIT, guest.fetch("identity").call(&[Value::from(mine.clone())]))
        .await
        .unwrap()
        .unwrap();
    assert!(back.as_object().unwrap().ptr_eq(&mine));

    // second trip goes by reference and still lands on the same object
    let again = timeout(WAIT, guest.fetch("tools").get("echo").call(&[Value::from(mine.clone())]))
        .await
        .unwrap()
        .unwrap();
    assert!(again.as_object().unwrap().ptr_eq(&mine));
}

#[tokio::test]
async fn test_method_call_binds_remote_receiver() {
    let host = Context::new(Environment::empty()).unwrap();
    let counter = ObjectRef::new_object().with("step", 5).with(
        "add",
        ObjectRef::function("add", |this, args| {
            let step = this.get_property(&"step".into())?.as_number().unwrap_or(0.0);
            let base = args.first().and_then(Value::as_number).unwrap_or(0.0);
            Ok(Value::Number(base + step))
        }),
    );
    host.set("counter", counter).unwrap();
    let (_host_side, guest) = connect(&host, SessionConfig::default());

    let sum = timeout(WAIT, guest.fetch("counter").get("add").call(&[Value::from(10)]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sum, Value::from(15));
}

#[tokio::test]
async fn test_rejected_promise_value_passes_through() {
    let host = Context::new(Environment::empty()).unwrap();
    host.set(
        "fail",
        ObjectRef::function("fail", |_, _| {
            Ok(Value::from(ObjectRef::rejected_promise(Value::from(123))))
        }),
    )
    .unwrap();
    let (_host_side, guest) = connect(&host, SessionConfig::default());

    let err = timeout(WAIT, guest.fetch("fail").call(&[])).await.unwrap().unwrap_err();
    assert_eq!(err, RemoteError::Thrown(Value::from(123)));
}

#[tokio::test]
async fn test_read_only_write_rolls_back_and_rejects() {
    let host = Context::new(Environment::empty()).unwrap();
    let target = ObjectRef::new_object().with("a", 1);
    host.set("obj", target.clone()).unwrap();
    let (_host_side, guest) = connect(&host, SessionConfig::default());

    let mirror = timeout(WAIT, guest.fetch("obj")).await.unwrap().unwrap();
    let proxy = guest.proxy(&mirror).unwrap();

    assert!(proxy.write("a".into(), Value::from(2)).unwrap());
    assert_eq!(proxy.read(&"a".into()).unwrap(), Value::from(2));

    let err = timeout(WAIT, guest.resolve(mirror.clone())).await.unwrap().unwrap_err();
    assert_eq!(
        err.to_string(),
        "TypeError: Can't define property of a read-only object: [object Object]"
    );
    assert_eq!(proxy.read(&"a".into()).unwrap(), Value::from(1));
    assert_eq!(target.get(&"a".into()).unwrap(), Value::from(1));
}

#[tokio::test]
async fn test_writable_session_applies_write_on_host() {
    let host = Context::new(Environment::empty()).unwrap();
    let target = ObjectRef::new_object().with("a", 1);
    host.set("obj", target.clone()).unwrap();
    let (_host_side, guest) = connect(&host, SessionConfig::default().with_writable(true));

    let mirror = timeout(WAIT, guest.fetch("obj")).await.unwrap().unwrap();
    let proxy = guest.proxy(&mirror).unwrap();
    assert!(proxy.write("b".into(), Value::from("new")).unwrap());

    let resolved = timeout(WAIT, guest.resolve(mirror.clone())).await.unwrap().unwrap();
    assert!(resolved.as_object().unwrap().ptr_eq(mirror.as_object().unwrap()));
    assert_eq!(target.get(&"b".into()).unwrap(), Value::from("new"));
}

#[tokio::test]
async fn test_host_changes_reach_observers() {
    let host = Context::new(Environment::empty()).unwrap();
    let target = ObjectRef::new_object().with("count", 1);
    host.set("obj", target.clone()).unwrap();
    let (_host_side, guest) = connect(&host, SessionConfig::default());

    let mirror = timeout(WAIT, guest.fetch("obj")).await.unwrap().unwrap();
    let proxy = guest.proxy(&mirror).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let subscription = proxy.observe(
        move |_, change| sink.lock().push(change.clone()),
        |_| {},
        || {},
    );

    target.set("count".into(), Value::from(2)).unwrap();
    timeout(WAIT, guest.resolve(mirror.clone())).await.unwrap().unwrap();

    assert_eq!(
        seen.lock().as_slice(),
        &[ChangeKind::DefineProperty(PropertyKey::from("count"))]
    );
    assert_eq!(proxy.read(&"count".into()).unwrap(), Value::from(2));

    subscription.unsubscribe();
    assert!(subscription.closed());
}

#[tokio::test]
async fn test_getter_cache() {
    let host = Context::new(Environment::empty()).unwrap();
    let target = ObjectRef::new_object()
        .with_getter("answer", |_| Ok(Value::from(42)))
        .with_getter("_hidden", |_| Ok(Value::from(7)));
    host.set("obj", target).unwrap();
    let (_host_side, guest) = connect(&host, SessionConfig::default());

    let mirror = timeout(WAIT, guest.fetch("obj")).await.unwrap().unwrap();
    let proxy = guest.proxy(&mirror).unwrap();

    assert_eq!(proxy.read(&"answer".into()).unwrap(), Value::from(42));
    let err = proxy.read(&"_hidden".into()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "TypeError: Couldn't find property cache for getter \"_hidden\", please resolve this remote value again."
    );
}

#[tokio::test]
async fn test_registered_symbols_keep_identity() {
    let host = Context::new(Environment::empty()).unwrap();
    let tag = ObjectRef::new_symbol(Some("tag".to_string()));
    host.set("registered", symbol_for("app.key")).unwrap();
    host.set("tag", tag.clone()).unwrap();
    host.set(
        "isTag",
        ObjectRef::function("isTag", move |_, args| {
            let matches = matches!(args.first(), Some(Value::Object(o)) if o.ptr_eq(&tag));
            Ok(Value::Bool(matches))
        }),
    )
    .unwrap();
    let (_host_side, guest) = connect(&host, SessionConfig::default());

    let registered = timeout(WAIT, guest.fetch("registered")).await.unwrap().unwrap();
    assert!(registered.as_object().unwrap().ptr_eq(&symbol_for("app.key")));

    let mirrored = timeout(WAIT, guest.fetch("tag")).await.unwrap().unwrap();
    assert!(mirrored.as_object().unwrap().is_symbol());
    let is_tag = timeout(WAIT, guest.fetch("isTag").call(&[mirrored]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(is_tag, Value::Bool(true));
}

#[tokio::test]
async fn test_environment_values_travel_by_name() {
    let shared = ObjectRef::new_object().with("ratio", 2.5);
    let environment = Environment::builder("shared")
        .with("Shared", shared.clone())
        .build()
        .unwrap();

    let host = Context::new(environment.clone()).unwrap();
    let expected = shared.clone();
    host.set(
        "isShared",
        ObjectRef::function("isShared", move |_, args| {
            Ok(Value::Bool(matches!(args.first(), Some(Value::Object(o)) if o.ptr_eq(&expected))))
        }),
    )
    .unwrap();

    let (host_stream, guest_stream) = ObjectStream::pair();
    let _host_side = host.remote(host_stream, SessionConfig::default()).unwrap();
    let guest = Context::new(environment).unwrap();
    let guest_side = guest.remote(guest_stream, SessionConfig::default()).unwrap();

    let answer = timeout(WAIT, guest_side.fetch("isShared").call(&[Value::from(shared)]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(answer, Value::Bool(true));
}

#[tokio::test(start_paused = true)]
async fn test_request_times_out() {
    let (guest_stream, _silent_peer) = ObjectStream::pair();
    let guest = Context::new(Environment::empty()).unwrap();
    let config = SessionConfig::default().with_timeout_tick(Duration::from_millis(10));
    let remote = guest.remote(guest_stream, config).unwrap();

    let started = Instant::now();
    let err = timeout(WAIT, remote.fetch("anything").with_timeout(Some(Duration::from_millis(50))))
        .await
        .unwrap()
        .unwrap_err();
    let elapsed = started.elapsed();
    assert!(err.is_timeout(), "{err}");
    assert!(elapsed >= Duration::from_millis(50) && elapsed <= Duration::from_millis(150));
    assert_eq!(session_of(&remote).open_requests(), 0);
}

#[tokio::test]
async fn test_end_closes_both_sides() {
    let host = sample_host();
    let (host_side, guest) = connect(&host, SessionConfig::default());
    let host_session = session_of(&host_side);
    let guest_session = session_of(&guest);

    guest.end();
    assert!(guest_session.is_ended());

    timeout(WAIT, host_session.closed()).await.unwrap();
    timeout(WAIT, guest_session.closed()).await.unwrap();
    assert!(host_session.is_closed());
    assert!(guest_session.is_closed());

    let err = guest_session.send(codec::Action::UndefinedValue).unwrap_err();
    assert!(err.is_session_closed());
}

#[tokio::test]
async fn test_destroy_rejects_pending_settlement() {
    let host = Context::new(Environment::empty()).unwrap();
    let (never, _resolver) = ObjectRef::new_promise();
    host.set("never", never).unwrap();
    let (host_side, guest) = connect(&host, SessionConfig::default());
    let host_session = session_of(&host_side);

    let pending = tokio::spawn(guest.fetch("never").resolve());
    let guest_session = session_of(&guest);
    // callbacks registered and the request acknowledged
    eventually(|| guest_session.local().own_size() == 2 && guest_session.open_requests() == 0)
        .await;

    guest.destroy();
    let err = timeout(WAIT, pending).await.unwrap().unwrap().unwrap_err();
    assert_eq!(
        err,
        RemoteError::session_closed("Session closed before promise resolved")
    );
    timeout(WAIT, host_session.closed()).await.unwrap();
}

#[tokio::test]
async fn test_release_deletes_host_handle() {
    let host = Context::new(Environment::empty()).unwrap();
    host.set(
        "make",
        ObjectRef::function("make", |_, _| Ok(Value::from(ObjectRef::new_object().with("n", 1)))),
    )
    .unwrap();
    let (host_side, guest) = connect(&host, SessionConfig::default());
    let host_session = session_of(&host_side);

    let made = timeout(WAIT, guest.fetch("make").call(&[])).await.unwrap().unwrap();
    let proxy = guest.proxy(&made).unwrap();
    let before = host_session.local().own_size();
    assert!(before > 0);

    assert!(guest.release(&made));
    assert!(proxy.is_revoked());
    eventually(|| host_session.local().own_size() < before).await;
}

#[tokio::test]
async fn test_framed_transport() {
    let host = sample_host();
    let (a, b) = tokio::io::duplex(64 * 1024);
    let _host_side = host
        .remote(ObjectStream::framed(a, DEFAULT_MAX_FRAME_SIZE), SessionConfig::default())
        .unwrap();
    let guest = Context::new(Environment::empty()).unwrap();
    let remote = guest
        .remote(ObjectStream::framed(b, DEFAULT_MAX_FRAME_SIZE), SessionConfig::default())
        .unwrap();

    let value = timeout(WAIT, remote.fetch("foo")).await.unwrap().unwrap();
    assert_eq!(value, Value::from("bar"));

    let mine = ObjectRef::new_array([Value::from(1), Value::from(2)]);
    let back = timeout(WAIT, remote.fetch("identity").call(&[Value::from(mine.clone())]))
        .await
        .unwrap()
        .unwrap();
    assert!(back.as_object().unwrap().ptr_eq(&mine));
}
