use super::{ObjectRef, Value};

/// Own property slot. Equality compares values with SameValue and accessor
/// functions by identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyDescriptor {
    Data {
        value: Value,
        writable: bool,
        enumerable: bool,
        configurable: bool,
    },
    Accessor {
        get: Option<ObjectRef>,
        set: Option<ObjectRef>,
        enumerable: bool,
        configurable: bool,
    },
}

impl PropertyDescriptor {
    /// Plain assignment-style slot: writable, enumerable, configurable
    pub fn data(value: impl Into<Value>) -> Self {
        PropertyDescriptor::Data {
            value: value.into(),
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    pub fn readonly(value: impl Into<Value>) -> Self {
        PropertyDescriptor::Data {
            value: value.into(),
            writable: false,
            enumerable: true,
            configurable: false,
        }
    }

    pub fn accessor(get: Option<ObjectRef>, set: Option<ObjectRef>) -> Self {
        PropertyDescriptor::Accessor {
            get,
            set,
            enumerable: true,
            configurable: true,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, PropertyDescriptor::Data { .. })
    }

    pub fn is_accessor(&self) -> bool {
        matches!(self, PropertyDescriptor::Accessor { .. })
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            PropertyDescriptor::Data { value, .. } => Some(value),
            PropertyDescriptor::Accessor { .. } => None,
        }
    }

    pub fn getter(&self) -> Option<&ObjectRef> {
        match self {
            PropertyDescriptor::Accessor { get, .. } => get.as_ref(),
            PropertyDescriptor::Data { .. } => None,
        }
    }

    pub fn setter(&self) -> Option<&ObjectRef> {
        match self {
            PropertyDescriptor::Accessor { set, .. } => set.as_ref(),
            PropertyDescriptor::Data { .. } => None,
        }
    }

    pub fn writable(&self) -> bool {
        matches!(self, PropertyDescriptor::Data { writable: true, .. })
    }

    pub fn enumerable(&self) -> bool {
        match self {
            PropertyDescriptor::Data { enumerable, .. }
            | PropertyDescriptor::Accessor { enumerable, .. } => *enumerable,
        }
    }

    pub fn configurable(&self) -> bool {
        match self {
            PropertyDescriptor::Data { configurable, .. }
            | PropertyDescriptor::Accessor { configurable, .. } => *configurable,
        }
    }

    /// Same attributes with a new value. Accessors become data slots.
    pub fn with_value(&self, value: Value) -> Self {
        match self {
            PropertyDescriptor::Data {
                writable,
                enumerable,
                configurable,
                ..
            } => PropertyDescriptor::Data {
                value,
                writable: *writable,
                enumerable: *enumerable,
                configurable: *configurable,
            },
            PropertyDescriptor::Accessor {
                enumerable,
                configurable,
                ..
            } => PropertyDescriptor::Data {
                value,
                writable: true,
                enumerable: *enumerable,
                configurable: *configurable,
            },
        }
    }

    /// Values this slot refers to that travel by reference
    pub(crate) fn referables(&self) -> Vec<ObjectRef> {
        match self {
            PropertyDescriptor::Data {
                value: Value::Object(object),
                ..
            } => vec![object.clone()],
            PropertyDescriptor::Data { .. } => Vec::new(),
            PropertyDescriptor::Accessor { get, set, .. } => {
                get.iter().chain(set.iter()).cloned().collect()
            }
        }
    }
}
