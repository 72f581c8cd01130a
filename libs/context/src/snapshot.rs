//! # Snapshot Diff
//!
//! ## Purpose
//!
//! Captures what a peer was last told about one object (prototype, own
//! descriptors, extensibility, getter cache) and computes the changes needed
//! to bring the peer's mirror up to date.
//!
//! ## Change order
//!
//! 1. prototype
//! 2. deleted properties
//! 3. added or redefined properties
//! 4. lost extensibility
//! 5. removed getter cache entries
//! 6. added or changed getter cache entries
//!
//! Cache entries of deleted properties are not reported separately; the
//! mirror drops them together with the property.

use crate::value::{ObjectRef, PropertyDescriptor, PropertyKey, Value};
use std::collections::BTreeMap;

/// One update for a peer's mirror
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    SetPrototype(Option<ObjectRef>),
    DeleteProperty(PropertyKey),
    DefineProperty(PropertyKey, PropertyDescriptor),
    PreventExtensions,
    DeleteCache(String),
    SetCache(String, Value),
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    target: ObjectRef,
    prototype: Option<ObjectRef>,
    descriptors: BTreeMap<PropertyKey, PropertyDescriptor>,
    extensible: bool,
    cached: BTreeMap<String, Value>,
}

impl Snapshot {
    /// Runs the object's cachable getters
    pub fn capture(target: &ObjectRef) -> Self {
        let cached = cache_getters(target);
        Self {
            target: target.clone(),
            prototype: target.prototype(),
            descriptors: target.own_properties().into_iter().collect(),
            extensible: target.is_extensible(),
            cached,
        }
    }

    pub fn target(&self) -> &ObjectRef {
        &self.target
    }

    pub fn prototype(&self) -> Option<&ObjectRef> {
        self.prototype.as_ref()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = (&PropertyKey, &PropertyDescriptor)> {
        self.descriptors.iter()
    }

    pub fn is_extensible(&self) -> bool {
        self.extensible
    }

    pub fn cached_getters(&self) -> &BTreeMap<String, Value> {
        &self.cached
    }

    /// Re-capture the target and return what changed since the last capture
    pub fn update(&mut self) -> Vec<Change> {
        let fresh = Self::capture(&self.target);
        self.advance(fresh)
    }

    /// Replace this capture with `fresh`, returning the difference
    pub(crate) fn advance(&mut self, fresh: Snapshot) -> Vec<Change> {
        let old = std::mem::replace(self, fresh);
        let new = &*self;
        let mut changes = Vec::new();

        if old.prototype != new.prototype {
            changes.push(Change::SetPrototype(new.prototype.clone()));
        }

        let mut old_cached = old.cached;
        for key in old.descriptors.keys() {
            if !new.descriptors.contains_key(key) {
                changes.push(Change::DeleteProperty(key.clone()));
                if let PropertyKey::String(name) = key {
                    old_cached.remove(name);
                }
            }
        }

        for (key, descriptor) in &new.descriptors {
            if old.descriptors.get(key) != Some(descriptor) {
                changes.push(Change::DefineProperty(key.clone(), descriptor.clone()));
            }
        }

        if old.extensible && !new.extensible {
            changes.push(Change::PreventExtensions);
        }

        for key in old_cached.keys() {
            if !new.cached.contains_key(key) {
                changes.push(Change::DeleteCache(key.clone()));
            }
        }

        for (key, value) in &new.cached {
            if old_cached.get(key) != Some(value) {
                changes.push(Change::SetCache(key.clone(), value.clone()));
            }
        }

        changes
    }
}

fn is_cachable(key: &PropertyKey, descriptor: &PropertyDescriptor) -> bool {
    matches!(key, PropertyKey::String(name) if !name.starts_with('_'))
        && descriptor.getter().is_some()
}

/// Evaluate every cachable getter visible on `object`. The nearest accessor
/// for a key wins; getters that fail are skipped.
pub fn cache_getters(object: &ObjectRef) -> BTreeMap<String, Value> {
    let mut cache = BTreeMap::new();
    if object.is_prototype_object() {
        return cache;
    }

    let mut seen: BTreeMap<PropertyKey, PropertyDescriptor> = BTreeMap::new();
    let mut cursor = Some(object.clone());
    while let Some(level) = cursor {
        for (key, descriptor) in level.own_properties() {
            seen.entry(key).or_insert(descriptor);
        }
        cursor = level.prototype();
    }

    let receiver = Value::Object(object.clone());
    for (key, descriptor) in seen {
        if !is_cachable(&key, &descriptor) {
            continue;
        }
        let (PropertyKey::String(name), Some(getter)) = (&key, descriptor.getter()) else {
            continue;
        };
        if let Ok(value) = getter.call(&receiver, &[]) {
            cache.insert(name.clone(), value);
        }
    }
    cache
}
