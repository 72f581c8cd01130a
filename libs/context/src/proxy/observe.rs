//! Change subscriptions on a [`RemoteValue`].

use super::{ChangeKind, ProxyEvent, ProxyInner, RemoteValue};
use crate::error::RemoteError;
use crate::value::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Live observation of one proxy. Closed once unsubscribed or when the proxy
/// is revoked.
pub struct Subscription {
    proxy: Weak<ProxyInner>,
    listener: Option<u64>,
    closed: Arc<AtomicBool>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let (Some(proxy), Some(listener)) = (self.proxy.upgrade(), self.listener) {
            RemoteValue::from_inner(proxy).unsubscribe(listener);
        }
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl RemoteValue {
    /// Watch the mirror: `on_next` gets the stand-in after every change,
    /// `on_error` every rejected mutation, `on_complete` the revocation
    pub fn observe<N, E, C>(&self, on_next: N, on_error: E, on_complete: C) -> Subscription
    where
        N: Fn(&Value, &ChangeKind) + Send + Sync + 'static,
        E: Fn(&RemoteError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        let closed = Arc::new(AtomicBool::new(false));
        if self.is_revoked() {
            closed.store(true, Ordering::SeqCst);
            return Subscription {
                proxy: self.downgrade(),
                listener: None,
                closed,
            };
        }

        let weak = self.downgrade();
        let flag = closed.clone();
        let listener = self.subscribe(Arc::new(move |event: &ProxyEvent| match event {
            ProxyEvent::Change(kind) => {
                if let Some(proxy) = weak.upgrade() {
                    on_next(&RemoteValue::from_inner(proxy).value(), kind);
                }
            }
            ProxyEvent::Error(error) => on_error(error),
            ProxyEvent::Revoke => {
                flag.store(true, Ordering::SeqCst);
                on_complete();
            }
        }));

        Subscription {
            proxy: self.downgrade(),
            listener: Some(listener),
            closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ObjectRef, PropertyDescriptor, PropertyKey};
    use std::sync::Mutex;

    fn proxy() -> RemoteValue {
        RemoteValue::new(Weak::new(), 1.into(), ObjectRef::new_object())
    }

    #[test]
    fn test_changes_reach_observers() {
        let proxy = proxy();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let subscription = proxy.observe(
            move |_, kind| log.lock().unwrap().push(kind.clone()),
            |_| {},
            || {},
        );

        proxy.apply_define_property("a".into(), PropertyDescriptor::data(1));
        proxy.apply_set_cache("size".into(), Value::from(3));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ChangeKind::DefineProperty(PropertyKey::from("a")),
                ChangeKind::Cache("size".into())
            ]
        );

        subscription.unsubscribe();
        assert!(subscription.closed());
        proxy.apply_prevent_extensions();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_revoke_completes_subscription() {
        let proxy = proxy();
        let completed = Arc::new(AtomicBool::new(false));
        let done = completed.clone();
        let subscription = proxy.observe(|_, _| {}, |_| {}, move || {
            done.store(true, Ordering::SeqCst)
        });

        proxy.revoke();
        assert!(subscription.closed());
        assert!(completed.load(Ordering::SeqCst));
        assert!(proxy.observe(|_, _| {}, |_| {}, || {}).closed());
    }
}
