//! Shared object cells and their property operations.
//!
//! Locks guard one object's state at a time and are released before any
//! getter, setter or native function runs.

use super::{PromiseCell, PromiseResolver, PropertyDescriptor, PropertyKey, Value};
use crate::error::{RemoteError, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Largest valid array length (2^32 - 1)
pub const MAX_ARRAY_LENGTH: u32 = u32::MAX;

/// Array elements rendered by `Display` before the rest are elided
const DISPLAY_ELEMENTS: usize = 100;

/// Native function body: `(this, arguments) -> result`
pub type NativeFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value> + Send + Sync>;

#[derive(Clone)]
pub struct Callable {
    name: Option<String>,
    call: NativeFn,
}

impl Callable {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub enum ObjectKind {
    Ordinary,
    Array,
    Error,
    Function(Callable),
    /// `registered` symbols live in the process-wide registry under
    /// `description`
    Symbol {
        description: Option<String>,
        registered: bool,
    },
    Promise(PromiseCell),
}

impl ObjectKind {
    fn name(&self) -> &'static str {
        match self {
            ObjectKind::Ordinary => "Object",
            ObjectKind::Array => "Array",
            ObjectKind::Error => "Error",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Symbol { .. } => "Symbol",
            ObjectKind::Promise(_) => "Promise",
        }
    }
}

struct ObjectState {
    prototype: Option<ObjectRef>,
    properties: BTreeMap<PropertyKey, PropertyDescriptor>,
    extensible: bool,
    /// Getter results computed by the owning peer
    computed: BTreeMap<String, Value>,
}

struct ObjectCell {
    id: u64,
    kind: ObjectKind,
    state: Mutex<ObjectState>,
}

/// Shared handle with identity semantics
#[derive(Clone)]
pub struct ObjectRef(Arc<ObjectCell>);

impl ObjectRef {
    pub(crate) fn create(kind: ObjectKind, prototype: Option<ObjectRef>) -> Self {
        ObjectRef(Arc::new(ObjectCell {
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            state: Mutex::new(ObjectState {
                prototype,
                properties: BTreeMap::new(),
                extensible: true,
                computed: BTreeMap::new(),
            }),
        }))
    }

    pub fn new_object() -> Self {
        Self::create(ObjectKind::Ordinary, None)
    }

    pub fn with_prototype(prototype: Option<ObjectRef>) -> Self {
        Self::create(ObjectKind::Ordinary, prototype)
    }

    pub fn new_array(values: impl IntoIterator<Item = Value>) -> Self {
        let array = Self::create(ObjectKind::Array, None);
        let mut length = 0usize;
        for (index, value) in values.into_iter().enumerate() {
            array.insert_property(index.to_string().into(), PropertyDescriptor::data(value));
            length = index + 1;
        }
        array.insert_property(
            "length".into(),
            PropertyDescriptor::Data {
                value: Value::Number(length as f64),
                writable: true,
                enumerable: false,
                configurable: false,
            },
        );
        array
    }

    pub fn new_error(name: &str, message: &str) -> Self {
        let error = Self::create(ObjectKind::Error, None);
        for (key, value) in [("name", name), ("message", message)] {
            error.insert_property(
                key.into(),
                PropertyDescriptor::Data {
                    value: Value::from(value),
                    writable: true,
                    enumerable: false,
                    configurable: true,
                },
            );
        }
        error
    }

    pub fn function<F>(name: &str, call: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self::create(
            ObjectKind::Function(Callable {
                name: (!name.is_empty()).then(|| name.to_string()),
                call: Arc::new(call),
            }),
            None,
        )
    }

    /// Function paired with a `prototype` object whose `constructor` points
    /// back at it
    pub fn constructor<F>(name: &str, call: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let function = Self::function(name, call);
        let prototype = Self::new_object();
        prototype.insert_property(
            "constructor".into(),
            PropertyDescriptor::Data {
                value: Value::Object(function.clone()),
                writable: true,
                enumerable: false,
                configurable: true,
            },
        );
        function.insert_property(
            "prototype".into(),
            PropertyDescriptor::Data {
                value: Value::Object(prototype),
                writable: true,
                enumerable: false,
                configurable: false,
            },
        );
        function
    }

    /// Unregistered symbol; use [`super::symbol_for`] for registered ones
    pub fn new_symbol(description: Option<String>) -> Self {
        Self::create(
            ObjectKind::Symbol {
                description,
                registered: false,
            },
            None,
        )
    }

    pub fn new_promise() -> (Self, PromiseResolver) {
        let cell = PromiseCell::new();
        let resolver = PromiseResolver::new(cell.clone());
        (Self::create(ObjectKind::Promise(cell), None), resolver)
    }

    pub fn resolved_promise(value: Value) -> Self {
        let (promise, resolver) = Self::new_promise();
        resolver.resolve(value);
        promise
    }

    pub fn rejected_promise(reason: Value) -> Self {
        let (promise, resolver) = Self::new_promise();
        resolver.reject(reason);
        promise
    }

    /// Builder: add an ordinary data property
    pub fn with(self, key: impl Into<PropertyKey>, value: impl Into<Value>) -> Self {
        self.insert_property(key.into(), PropertyDescriptor::data(value));
        self
    }

    /// Builder: add a getter-only accessor
    pub fn with_getter<F>(self, key: &str, getter: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        let get = Self::function(key, move |this, _| getter(this));
        self.insert_property(key.into(), PropertyDescriptor::accessor(Some(get), None));
        self
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.0.kind
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.0.kind, ObjectKind::Function(_))
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self.0.kind, ObjectKind::Symbol { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self.0.kind, ObjectKind::Array)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.0.kind, ObjectKind::Error)
    }

    pub fn as_promise(&self) -> Option<&PromiseCell> {
        match &self.0.kind {
            ObjectKind::Promise(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn prototype(&self) -> Option<ObjectRef> {
        self.0.state.lock().prototype.clone()
    }

    /// Change the prototype link. Fails on non-extensible objects and on
    /// links that would close a cycle.
    pub fn set_prototype_of(&self, prototype: Option<ObjectRef>) -> bool {
        let mut cursor = prototype.clone();
        while let Some(link) = cursor {
            if link == *self {
                return false;
            }
            cursor = link.prototype();
        }

        let mut state = self.0.state.lock();
        if state.prototype == prototype {
            return true;
        }
        if !state.extensible {
            return false;
        }
        state.prototype = prototype;
        true
    }

    /// Unchecked prototype assignment used when mirroring a peer's object
    pub(crate) fn force_prototype(&self, prototype: Option<ObjectRef>) {
        self.0.state.lock().prototype = prototype;
    }

    pub fn is_extensible(&self) -> bool {
        self.0.state.lock().extensible
    }

    pub fn prevent_extensions(&self) -> bool {
        self.0.state.lock().extensible = false;
        true
    }

    pub fn own_property(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        self.0.state.lock().properties.get(key).cloned()
    }

    pub fn has_own_property(&self, key: &PropertyKey) -> bool {
        self.0.state.lock().properties.contains_key(key)
    }

    pub fn own_keys(&self) -> Vec<PropertyKey> {
        self.0.state.lock().properties.keys().cloned().collect()
    }

    pub fn own_properties(&self) -> Vec<(PropertyKey, PropertyDescriptor)> {
        self.0
            .state
            .lock()
            .properties
            .iter()
            .map(|(k, d)| (k.clone(), d.clone()))
            .collect()
    }

    /// First descriptor for `key` along the prototype chain
    pub fn find_property(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        let mut cursor = Some(self.clone());
        while let Some(object) = cursor {
            let (found, next) = {
                let state = object.0.state.lock();
                (state.properties.get(key).cloned(), state.prototype.clone())
            };
            if found.is_some() {
                return found;
            }
            cursor = next;
        }
        None
    }

    /// Property read; getters run with this object as receiver
    pub fn get(&self, key: &PropertyKey) -> Result<Value> {
        match self.find_property(key) {
            Some(PropertyDescriptor::Data { value, .. }) => Ok(value),
            Some(PropertyDescriptor::Accessor { get: Some(get), .. }) => {
                get.call(&Value::Object(self.clone()), &[])
            }
            Some(PropertyDescriptor::Accessor { get: None, .. }) | None => Ok(Value::Undefined),
        }
    }

    /// Assignment. Returns false when a read-only slot, a missing setter or
    /// a non-extensible object refuses the write.
    pub fn set(&self, key: PropertyKey, value: Value) -> Result<bool> {
        match self.find_property(&key) {
            Some(PropertyDescriptor::Accessor { set: Some(set), .. }) => {
                set.call(&Value::Object(self.clone()), &[value])?;
                return Ok(true);
            }
            Some(PropertyDescriptor::Accessor { set: None, .. }) => return Ok(false),
            Some(PropertyDescriptor::Data {
                writable: false, ..
            }) => return Ok(false),
            _ => {}
        }

        let mut state = self.0.state.lock();
        if let Some(PropertyDescriptor::Data { value: slot, .. }) = state.properties.get_mut(&key)
        {
            *slot = value;
            return Ok(true);
        }
        if !state.extensible {
            return Ok(false);
        }
        state.properties.insert(key, PropertyDescriptor::data(value));
        Ok(true)
    }

    /// Define or redefine an own property, refusing changes a
    /// non-configurable slot does not allow
    pub fn define_own_property(&self, key: PropertyKey, descriptor: PropertyDescriptor) -> bool {
        let mut state = self.0.state.lock();
        match state.properties.get(&key) {
            None if !state.extensible => return false,
            None => {}
            Some(current) if !current.configurable() => {
                if descriptor.configurable() || descriptor.enumerable() != current.enumerable() {
                    return false;
                }
                let allowed = match (current, &descriptor) {
                    (
                        PropertyDescriptor::Data {
                            writable: false,
                            value: current_value,
                            ..
                        },
                        PropertyDescriptor::Data {
                            writable, value, ..
                        },
                    ) => !*writable && value == current_value,
                    (PropertyDescriptor::Data { .. }, PropertyDescriptor::Data { .. }) => true,
                    (
                        PropertyDescriptor::Accessor { get, set, .. },
                        PropertyDescriptor::Accessor {
                            get: new_get,
                            set: new_set,
                            ..
                        },
                    ) => get == new_get && set == new_set,
                    _ => false,
                };
                if !allowed {
                    return false;
                }
            }
            Some(_) => {}
        }
        state.properties.insert(key, descriptor);
        true
    }

    /// Unchecked definition used when mirroring a peer's object
    pub(crate) fn insert_property(&self, key: PropertyKey, descriptor: PropertyDescriptor) {
        self.0.state.lock().properties.insert(key, descriptor);
    }

    pub fn delete_property(&self, key: &PropertyKey) -> bool {
        let mut state = self.0.state.lock();
        match state.properties.get(key) {
            None => true,
            Some(current) if !current.configurable() => false,
            Some(_) => {
                state.properties.remove(key);
                true
            }
        }
    }

    /// Unchecked removal used when mirroring a peer's object
    pub(crate) fn remove_property(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        self.0.state.lock().properties.remove(key)
    }

    pub fn cached_getter(&self, key: &str) -> Option<Value> {
        self.0.state.lock().computed.get(key).cloned()
    }

    pub fn cached_getters(&self) -> BTreeMap<String, Value> {
        self.0.state.lock().computed.clone()
    }

    pub(crate) fn set_cached_getter(&self, key: String, value: Value) {
        self.0.state.lock().computed.insert(key, value);
    }

    pub(crate) fn delete_cached_getter(&self, key: &str) {
        self.0.state.lock().computed.remove(key);
    }

    pub fn call(&self, this: &Value, arguments: &[Value]) -> Result<Value> {
        match &self.0.kind {
            ObjectKind::Function(callable) => (callable.call)(this, arguments),
            _ => Err(RemoteError::type_error(format!("{} is not a function", self))),
        }
    }

    /// `new`: a fresh object inheriting from this function's `prototype`
    /// becomes the receiver; an object returned by the body replaces it
    pub fn construct(&self, arguments: &[Value]) -> Result<Value> {
        let ObjectKind::Function(callable) = &self.0.kind else {
            return Err(RemoteError::type_error(format!(
                "{} is not a constructor",
                self
            )));
        };

        let prototype = match self.get(&"prototype".into())? {
            Value::Object(prototype) => Some(prototype),
            _ => None,
        };
        let instance = Value::Object(Self::with_prototype(prototype));
        match (callable.call)(&instance, arguments)? {
            result @ Value::Object(_) => Ok(result),
            _ => Ok(instance),
        }
    }

    /// True for the `prototype` object of its own `constructor`
    pub fn is_prototype_object(&self) -> bool {
        let Some(PropertyDescriptor::Data {
            value: Value::Object(constructor),
            ..
        }) = self.find_property(&"constructor".into())
        else {
            return false;
        };
        matches!(
            constructor.find_property(&"prototype".into()),
            Some(PropertyDescriptor::Data { value: Value::Object(prototype), .. }) if prototype == *self
        )
    }

    /// Objects reachable in one step: prototype, property values, accessor
    /// functions and symbol keys
    pub fn referable_children(&self) -> Vec<ObjectRef> {
        let state = self.0.state.lock();
        let mut children: Vec<ObjectRef> = state.prototype.iter().cloned().collect();
        for (key, descriptor) in &state.properties {
            if let PropertyKey::Symbol(symbol) = key {
                children.push(symbol.clone());
            }
            children.extend(descriptor.referables());
        }
        children
    }

    /// `length` of an array-like object, clamped to `0..=MAX_ARRAY_LENGTH`
    pub fn array_length(&self) -> Result<usize> {
        let length = self.get(&"length".into())?.as_number().unwrap_or(0.0);
        if length.is_nan() || length <= 0.0 {
            return Ok(0);
        }
        Ok(length.min(MAX_ARRAY_LENGTH as f64) as usize)
    }

    /// Leading elements of an array-like object, at most `limit`
    pub fn array_values(&self, limit: usize) -> Result<Vec<Value>> {
        (0..self.array_length()?.min(limit))
            .map(|index| self.get(&index.to_string().into()))
            .collect()
    }

    fn data_string(&self, key: &str) -> Option<String> {
        match self.0.state.lock().properties.get(&PropertyKey::from(key)) {
            Some(PropertyDescriptor::Data {
                value: Value::String(s),
                ..
            }) => Some(s.clone()),
            _ => None,
        }
    }

    fn tag(&self) -> String {
        format!("[object {}]", self.0.kind.name())
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl PartialOrd for ObjectRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.id.cmp(&other.0.id)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef#{}({})", self.0.id, self.0.kind.name())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            ObjectKind::Ordinary | ObjectKind::Promise(_) => write!(f, "{}", self.tag()),
            ObjectKind::Array => {
                let values = self.array_values(DISPLAY_ELEMENTS).unwrap_or_default();
                let mut parts: Vec<String> = values
                    .iter()
                    .map(|value| match value {
                        Value::Undefined | Value::Null => String::new(),
                        Value::Object(object) => object.tag(),
                        primitive => primitive.to_string(),
                    })
                    .collect();
                if self.array_length().unwrap_or(0) > values.len() {
                    parts.push("...".into());
                }
                write!(f, "{}", parts.join(","))
            }
            ObjectKind::Error => {
                let name = self.data_string("name").unwrap_or_else(|| "Error".into());
                match self.data_string("message") {
                    Some(message) if !message.is_empty() => write!(f, "{}: {}", name, message),
                    _ => write!(f, "{}", name),
                }
            }
            ObjectKind::Function(callable) => write!(
                f,
                "function {}() {{ [native code] }}",
                callable.name().unwrap_or("")
            ),
            ObjectKind::Symbol { description, .. } => {
                write!(f, "Symbol({})", description.as_deref().unwrap_or(""))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_walks_prototype_chain() {
        let base = ObjectRef::new_object().with("greeting", "hello");
        let child = ObjectRef::with_prototype(Some(base.clone())).with("own", 1);

        assert_eq!(child.get(&"greeting".into()).unwrap(), Value::from("hello"));
        assert_eq!(child.get(&"own".into()).unwrap(), Value::from(1));
        assert_eq!(child.get(&"missing".into()).unwrap(), Value::Undefined);
        assert!(!child.has_own_property(&"greeting".into()));
    }

    #[test]
    fn test_getter_receives_receiver() {
        let base = ObjectRef::new_object().with_getter("double", |this| {
            let object = this.as_object().cloned().unwrap_or_else(ObjectRef::new_object);
            let n = object.get(&"n".into())?.as_number().unwrap_or(0.0);
            Ok(Value::Number(n * 2.0))
        });
        let child = ObjectRef::with_prototype(Some(base)).with("n", 21);
        assert_eq!(child.get(&"double".into()).unwrap(), Value::from(42));
    }

    #[test]
    fn test_set_respects_writability_and_extensibility() {
        let object = ObjectRef::new_object();
        object.insert_property("fixed".into(), PropertyDescriptor::readonly(1));
        assert!(!object.set("fixed".into(), Value::from(2)).unwrap());
        assert!(object.set("free".into(), Value::from(2)).unwrap());

        object.prevent_extensions();
        assert!(!object.set("late".into(), Value::from(3)).unwrap());
        assert!(object.set("free".into(), Value::from(4)).unwrap());
        assert_eq!(object.get(&"free".into()).unwrap(), Value::from(4));
    }

    #[test]
    fn test_non_configurable_redefinition_rules() {
        let object = ObjectRef::new_object();
        object.insert_property("fixed".into(), PropertyDescriptor::readonly(1));
        assert!(!object.define_own_property("fixed".into(), PropertyDescriptor::data(2)));
        assert!(!object.delete_property(&"fixed".into()));
        assert!(object.delete_property(&"absent".into()));
    }

    #[test]
    fn test_prototype_cycles_refused() {
        let a = ObjectRef::new_object();
        let b = ObjectRef::with_prototype(Some(a.clone()));
        assert!(!a.set_prototype_of(Some(b)));
        assert!(a.set_prototype_of(None));
    }

    #[test]
    fn test_construct_uses_prototype_property() {
        let point = ObjectRef::constructor("Point", |this, args| {
            if let Some(object) = this.as_object() {
                object.set("x".into(), args.first().cloned().unwrap_or_default())?;
            }
            Ok(Value::Undefined)
        });
        let instance = point.construct(&[Value::from(3)]).unwrap();
        let instance = instance.as_object().unwrap();
        assert_eq!(instance.get(&"x".into()).unwrap(), Value::from(3));

        let prototype = instance.prototype().unwrap();
        assert!(prototype.is_prototype_object());
        assert!(!instance.is_prototype_object());
    }

    #[test]
    fn test_calling_non_function_is_type_error() {
        let err = ObjectRef::new_object().call(&Value::Undefined, &[]).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: [object Object] is not a function");
    }

    #[test]
    fn test_array_length_clamped() {
        let array = ObjectRef::new_array([Value::from(1), Value::from(2)]);
        for (length, expected) in [
            (1e300, MAX_ARRAY_LENGTH as usize),
            (f64::INFINITY, MAX_ARRAY_LENGTH as usize),
            (f64::NAN, 0),
            (-5.0, 0),
            (3.0, 3),
        ] {
            assert!(array.set("length".into(), Value::Number(length)).unwrap());
            assert_eq!(array.array_length().unwrap(), expected);
        }
    }

    #[test]
    fn test_calling_huge_array_reports_elided_elements() {
        let array = ObjectRef::new_array([Value::from(1), Value::from(2)]);
        array.set("length".into(), Value::Number(1e300)).unwrap();

        let message = array.call(&Value::Undefined, &[]).unwrap_err().to_string();
        assert!(message.starts_with("TypeError: 1,2,,"), "{message}");
        assert!(message.ends_with(",... is not a function"), "{message}");
        assert!(array.construct(&[]).is_err());
        assert_eq!(array.array_values(4).unwrap().len(), 4);
    }

    #[test]
    fn test_display_of_special_kinds() {
        assert_eq!(
            ObjectRef::new_array([Value::from(1), Value::Null, Value::from("x")]).to_string(),
            "1,,x"
        );
        assert_eq!(ObjectRef::new_error("TypeError", "bad").to_string(), "TypeError: bad");
        assert_eq!(
            ObjectRef::new_symbol(Some("tag".into())).to_string(),
            "Symbol(tag)"
        );
    }

    #[test]
    fn test_referable_children() {
        let proto = ObjectRef::new_object();
        let inner = ObjectRef::new_object();
        let symbol = ObjectRef::new_symbol(None);
        let object = ObjectRef::with_prototype(Some(proto.clone()))
            .with("inner", inner.clone())
            .with("plain", 1)
            .with(PropertyKey::Symbol(symbol.clone()), 2);

        let children = object.referable_children();
        assert_eq!(children.len(), 3);
        assert!(children.contains(&proto));
        assert!(children.contains(&inner));
        assert!(children.contains(&symbol));
    }
}
