//! # Scoped Registry
//!
//! Bidirectional handle↔value map with an optional parent scope.
//!
//! ## Scoping
//!
//! Reads (`has`, `get`, `exists`, `lookup`, `size`, `count`) fall through to
//! the parent chain when they miss locally. Writes (`set`, `delete`,
//! `release`, `clear`) only ever touch the local scope, so a child can drop
//! its own handles without disturbing any ancestor.
//!
//! ## Release
//!
//! When the last local handle of a value disappears (delete, overwrite or
//! explicit release) the registered release hook is invoked with the value.
//! Hooks run after the scope lock is dropped and may call back into the
//! registry.

use crate::error::{RegistryError, Result};
use crate::Reference;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tracing::trace;

/// Bound on values a registry can hold
pub trait Referable: Clone + Eq + Hash + Send + Sync + 'static {}

impl<T: Clone + Eq + Hash + Send + Sync + 'static> Referable for T {}

/// Callback fired once a value has no local handle left
pub type ReleaseHook<V> = Arc<dyn Fn(&V) + Send + Sync>;

struct Scope<V: Referable> {
    values: HashMap<Reference, V>,
    aliases: HashMap<V, Vec<Reference>>,
}

impl<V: Referable> Scope<V> {
    fn new() -> Self {
        Self {
            values: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Drop `reference` from the alias list of `value`; returns true when it
    /// was the last alias.
    fn unlink(&mut self, value: &V, reference: &Reference) -> bool {
        let Some(refs) = self.aliases.get_mut(value) else {
            return false;
        };
        refs.retain(|r| r != reference);
        if refs.is_empty() {
            self.aliases.remove(value);
            true
        } else {
            false
        }
    }
}

struct Inner<V: Referable> {
    scope: RwLock<Scope<V>>,
    parent: Option<Registry<V>>,
    on_release: RwLock<Option<ReleaseHook<V>>>,
}

/// Cheaply cloneable handle to one registry scope
pub struct Registry<V: Referable> {
    inner: Arc<Inner<V>>,
}

impl<V: Referable> Clone for Registry<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Referable> Default for Registry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Referable> Registry<V> {
    /// Create a root scope
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a scope delegating misses to `parent`
    pub fn with_parent(parent: Registry<V>) -> Self {
        Self::build(Some(parent))
    }

    fn build(parent: Option<Registry<V>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                scope: RwLock::new(Scope::new()),
                parent,
                on_release: RwLock::new(None),
            }),
        }
    }

    /// Nested scope whose parent is this registry
    pub fn closure(&self) -> Self {
        Self::with_parent(self.clone())
    }

    pub fn parent(&self) -> Option<&Registry<V>> {
        self.inner.parent.as_ref()
    }

    /// Install the hook fired when a value loses its last local handle.
    /// Replaces any previous hook.
    pub fn on_release<F>(&self, hook: F)
    where
        F: Fn(&V) + Send + Sync + 'static,
    {
        *self.inner.on_release.write() = Some(Arc::new(hook));
    }

    /// True when both handles point at the same scope
    pub fn same_scope(&self, other: &Registry<V>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of handles in this scope and all ancestors
    pub fn size(&self) -> usize {
        self.own_size() + self.parent().map_or(0, Registry::size)
    }

    pub fn own_size(&self) -> usize {
        self.inner.scope.read().values.len()
    }

    /// Number of distinct values in this scope and all ancestors
    pub fn count(&self) -> usize {
        self.own_count() + self.parent().map_or(0, Registry::count)
    }

    pub fn own_count(&self) -> usize {
        self.inner.scope.read().aliases.len()
    }

    pub fn has(&self, reference: &Reference) -> bool {
        self.has_own(reference) || self.parent().is_some_and(|p| p.has(reference))
    }

    pub fn has_own(&self, reference: &Reference) -> bool {
        self.inner.scope.read().values.contains_key(reference)
    }

    /// Resolve a handle in this scope, then the parent chain
    pub fn get(&self, reference: &Reference) -> Result<V> {
        if let Some(value) = self.inner.scope.read().values.get(reference) {
            return Ok(value.clone());
        }
        match self.parent() {
            Some(parent) => parent.get(reference),
            None => Err(RegistryError::not_found(reference)),
        }
    }

    /// Bind `reference` to `value` in this scope.
    ///
    /// Overwriting a handle that held another value releases that value when
    /// it has no other local alias.
    pub fn set(&self, reference: Reference, value: V) -> Result<()> {
        if !reference.is_valid() {
            return Err(RegistryError::invalid_reference(&reference));
        }

        let released = {
            let mut scope = self.inner.scope.write();
            let previous = scope.values.insert(reference.clone(), value.clone());

            let released = match previous {
                Some(ref old) if *old == value => return Ok(()),
                Some(old) => scope.unlink(&old, &reference).then_some(old),
                None => None,
            };

            scope.aliases.entry(value).or_default().push(reference);
            released
        };

        if let Some(old) = released {
            self.fire_release(&old);
        }
        Ok(())
    }

    /// True when the value has a handle in this scope or any ancestor
    pub fn exists(&self, value: &V) -> bool {
        self.own(value) || self.parent().is_some_and(|p| p.exists(value))
    }

    /// True when the value has a handle in this scope
    pub fn own(&self, value: &V) -> bool {
        self.inner.scope.read().aliases.contains_key(value)
    }

    /// First handle of a value, searching this scope before the parent chain
    pub fn lookup(&self, value: &V) -> Result<Reference> {
        if let Some(reference) = self
            .inner
            .scope
            .read()
            .aliases
            .get(value)
            .and_then(|refs| refs.first().cloned())
        {
            return Ok(reference);
        }
        match self.parent() {
            Some(parent) => parent.lookup(value),
            None => Err(RegistryError::ValueNotFound),
        }
    }

    /// All local handles of a value
    pub fn references_of(&self, value: &V) -> Vec<Reference> {
        self.inner
            .scope
            .read()
            .aliases
            .get(value)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove a local handle. Returns false when the handle is unknown here,
    /// including when only an ancestor has it.
    pub fn delete(&self, reference: &Reference) -> bool {
        let released = {
            let mut scope = self.inner.scope.write();
            let Some(value) = scope.values.remove(reference) else {
                return false;
            };
            scope.unlink(&value, reference).then_some(value)
        };

        if let Some(value) = released {
            self.fire_release(&value);
        }
        true
    }

    /// Remove every local handle of a value. Returns false when the value has
    /// none here.
    pub fn release(&self, value: &V) -> bool {
        {
            let mut scope = self.inner.scope.write();
            let Some(refs) = scope.aliases.remove(value) else {
                return false;
            };
            for reference in &refs {
                scope.values.remove(reference);
            }
        }

        self.fire_release(value);
        true
    }

    /// Drop every local mapping without running the release hook
    pub fn clear(&self) -> Vec<(Reference, V)> {
        let mut scope = self.inner.scope.write();
        scope.aliases.clear();
        scope.values.drain().collect()
    }

    /// Snapshot of the local mappings
    pub fn entries(&self) -> Vec<(Reference, V)> {
        self.inner
            .scope
            .read()
            .values
            .iter()
            .map(|(r, v)| (r.clone(), v.clone()))
            .collect()
    }

    fn fire_release(&self, value: &V) {
        let hook = self.inner.on_release.read().clone();
        if let Some(hook) = hook {
            trace!(own_size = self.own_size(), "releasing registry value");
            hook(value);
        }
    }
}

impl<V: Referable> fmt::Debug for Registry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("own_size", &self.own_size())
            .field("size", &self.size())
            .field("has_parent", &self.parent().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_hook(registry: &Registry<u32>) -> Arc<AtomicUsize> {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        registry.on_release(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        released
    }

    #[test]
    fn test_get_falls_back_to_parent() {
        let parent = Registry::new();
        parent.set("a".into(), 1u32).unwrap();
        let child = parent.closure();
        child.set("b".into(), 2u32).unwrap();

        assert_eq!(child.get(&"a".into()).unwrap(), 1);
        assert_eq!(child.get(&"b".into()).unwrap(), 2);
        assert!(parent.get(&"b".into()).is_err());
        assert_eq!(child.size(), 2);
        assert_eq!(child.own_size(), 1);
    }

    #[test]
    fn test_get_unknown_reference_is_reference_error() {
        let registry: Registry<u32> = Registry::new();
        let err = registry.get(&Reference::Id(7)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Reference);
    }

    #[test]
    fn test_set_rejects_invalid_reference() {
        let registry = Registry::new();
        let err = registry.set(Reference::Id(0), 1u32).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Type);
        assert!(registry.set("".into(), 1u32).is_err());
    }

    #[test]
    fn test_overwrite_releases_unaliased_value() {
        let registry = Registry::new();
        let released = counting_hook(&registry);

        registry.set("a".into(), 1u32).unwrap();
        registry.set("b".into(), 1u32).unwrap();
        registry.set("a".into(), 2u32).unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 0);

        registry.set("b".into(), 3u32).unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(!registry.exists(&1));
    }

    #[test]
    fn test_delete_last_alias_releases() {
        let registry = Registry::new();
        let released = counting_hook(&registry);

        registry.set("a".into(), 1u32).unwrap();
        registry.set("b".into(), 1u32).unwrap();
        assert_eq!(registry.own_count(), 1);

        assert!(registry.delete(&"a".into()));
        assert_eq!(released.load(Ordering::SeqCst), 0);
        assert_eq!(registry.lookup(&1).unwrap(), Reference::from("b"));

        assert!(registry.delete(&"b".into()));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(!registry.delete(&"b".into()));
    }

    #[test]
    fn test_delete_and_release_are_scope_local() {
        let parent = Registry::new();
        parent.set("a".into(), 1u32).unwrap();
        let child = parent.closure();
        let released = counting_hook(&child);

        assert!(!child.delete(&"a".into()));
        assert!(!child.release(&1));
        assert!(child.has(&"a".into()));
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_release_drops_every_alias() {
        let registry = Registry::new();
        let released = counting_hook(&registry);

        registry.set("a".into(), 1u32).unwrap();
        registry.set("b".into(), 1u32).unwrap();
        registry.set("c".into(), 2u32).unwrap();

        assert!(registry.release(&1));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(!registry.has(&"a".into()));
        assert!(!registry.has(&"b".into()));
        assert_eq!(registry.own_size(), 1);
    }

    #[test]
    fn test_lookup_prefers_own_scope() {
        let parent = Registry::new();
        parent.set("outer".into(), 1u32).unwrap();
        let child = parent.closure();
        assert_eq!(child.lookup(&1).unwrap(), Reference::from("outer"));

        child.set("inner".into(), 1u32).unwrap();
        assert_eq!(child.lookup(&1).unwrap(), Reference::from("inner"));
        assert!(child.own(&1));
        assert!(!child.own(&2));
        assert!(child.lookup(&2).is_err());
    }

    #[test]
    fn test_hook_may_reenter_registry() {
        let registry: Registry<u32> = Registry::new();
        let observer = registry.clone();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_hook = seen.clone();
        registry.on_release(move |_| {
            seen_hook.store(observer.own_size(), Ordering::SeqCst);
        });

        registry.set("a".into(), 1u32).unwrap();
        registry.set("b".into(), 2u32).unwrap();
        registry.delete(&"a".into());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_skips_hook() {
        let registry = Registry::new();
        let released = counting_hook(&registry);
        registry.set("a".into(), 1u32).unwrap();

        let dropped = registry.clear();
        assert_eq!(dropped.len(), 1);
        assert_eq!(registry.own_size(), 0);
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }
}
