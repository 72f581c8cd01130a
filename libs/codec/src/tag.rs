//! # Action Tag Registry
//!
//! ## Purpose
//!
//! One-byte type tags identifying every action on the wire. Both peers share
//! this table verbatim; a tag outside it is a protocol error.
//!
//! ## Tag Ranges
//!
//! | Range | Group |
//! |---|---|
//! | `0x01`–`0x0f` | request/response envelope |
//! | `0x10`–`0x1f` | reference actions |
//! | `0x20`–`0x2f` | mutations of the receiver's own values |
//! | `0x30`–`0x3f` | updates of the receiver's mirrored values |
//! | `0x40`–`0x4f` | reflection (pipelined evaluation) |
//! | `0x50`–`0x5f` | value helpers |

use num_enum::{IntoPrimitive, TryFromPrimitive};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum ActionTag {
    // Envelope
    Request = 0x01,
    Response = 0x02,

    // References
    Get = 0x10,
    RemoteSetFunction = 0x11,
    RemoteSetObject = 0x12,
    RemoteSetSymbol = 0x13,
    Delete = 0x14,
    LocalReference = 0x15,
    RemoteReference = 0x16,

    // Mutations requested on the receiver's values
    LocalDefineProperty = 0x20,
    LocalDeleteProperty = 0x21,
    LocalSetPrototypeOf = 0x22,
    LocalPreventExtensions = 0x23,

    // Updates pushed to the receiver's mirrors
    RemoteDefineProperty = 0x30,
    RemoteDeleteProperty = 0x31,
    RemoteSetPrototypeOf = 0x32,
    RemotePreventExtensions = 0x33,
    RemoteSetPropertyCache = 0x34,
    RemoteDeletePropertyCache = 0x35,

    // Reflection
    ReflectApply = 0x40,
    ReflectConstruct = 0x41,
    ReflectGet = 0x42,
    ReflectPromise = 0x43,

    // Value helpers
    PropertyDescriptor = 0x51,
    UndefinedValue = 0x52,
}

/// Every tag in registration order
pub const ACTION_TABLE: &[ActionTag] = &[
    ActionTag::Request,
    ActionTag::Response,
    ActionTag::Get,
    ActionTag::RemoteSetFunction,
    ActionTag::RemoteSetObject,
    ActionTag::RemoteSetSymbol,
    ActionTag::Delete,
    ActionTag::LocalReference,
    ActionTag::RemoteReference,
    ActionTag::LocalDefineProperty,
    ActionTag::LocalDeleteProperty,
    ActionTag::LocalSetPrototypeOf,
    ActionTag::LocalPreventExtensions,
    ActionTag::RemoteDefineProperty,
    ActionTag::RemoteDeleteProperty,
    ActionTag::RemoteSetPrototypeOf,
    ActionTag::RemotePreventExtensions,
    ActionTag::RemoteSetPropertyCache,
    ActionTag::RemoteDeletePropertyCache,
    ActionTag::ReflectApply,
    ActionTag::ReflectConstruct,
    ActionTag::ReflectGet,
    ActionTag::ReflectPromise,
    ActionTag::PropertyDescriptor,
    ActionTag::UndefinedValue,
];

impl ActionTag {
    pub fn name(&self) -> &'static str {
        match self {
            ActionTag::Request => "RequestAction",
            ActionTag::Response => "ResponseAction",
            ActionTag::Get => "GetAction",
            ActionTag::RemoteSetFunction => "RemoteSetFunctionAction",
            ActionTag::RemoteSetObject => "RemoteSetObjectAction",
            ActionTag::RemoteSetSymbol => "RemoteSetSymbolAction",
            ActionTag::Delete => "DeleteAction",
            ActionTag::LocalReference => "LocalReferenceAction",
            ActionTag::RemoteReference => "RemoteReferenceAction",
            ActionTag::LocalDefineProperty => "LocalDefinePropertyAction",
            ActionTag::LocalDeleteProperty => "LocalDeletePropertyAction",
            ActionTag::LocalSetPrototypeOf => "LocalSetPrototypeOfAction",
            ActionTag::LocalPreventExtensions => "LocalPreventExtensionsAction",
            ActionTag::RemoteDefineProperty => "RemoteDefinePropertyAction",
            ActionTag::RemoteDeleteProperty => "RemoteDeletePropertyAction",
            ActionTag::RemoteSetPrototypeOf => "RemoteSetPrototypeOfAction",
            ActionTag::RemotePreventExtensions => "RemotePreventExtensionsAction",
            ActionTag::RemoteSetPropertyCache => "RemoteSetPropertyCacheAction",
            ActionTag::RemoteDeletePropertyCache => "RemoteDeletePropertyCacheAction",
            ActionTag::ReflectApply => "ReflectApplyAction",
            ActionTag::ReflectConstruct => "ReflectConstructAction",
            ActionTag::ReflectGet => "ReflectGetAction",
            ActionTag::ReflectPromise => "ReflectPromiseAction",
            ActionTag::PropertyDescriptor => "PropertyDescriptorAction",
            ActionTag::UndefinedValue => "UndefinedValueAction",
        }
    }

    /// Tags that may only appear nested inside another action's arguments
    pub fn is_nested_only(&self) -> bool {
        matches!(self, ActionTag::PropertyDescriptor)
    }
}

impl std::fmt::Display for ActionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), u8::from(*self))
    }
}
