//! # Action Taxonomy
//!
//! ## Purpose
//!
//! Typed form of every operation exchanged between peers. Actions are pure
//! data here: the context layer decides what executing one means. Each
//! action converts to and from a positional [`Token`] list, omitting trailing
//! arguments equal to their declared default.
//!
//! ## Perspective
//!
//! Reference actions name handles from the *sender's* point of view:
//! `LocalReference` is a handle in the sender's local scope (the receiver
//! finds it among its mirrors), `RemoteReference` a handle the sender
//! mirrors (the receiver finds it among its own values). `Local*` mutations
//! target the receiver's own values; `Remote*` updates target the receiver's
//! mirrors.

use crate::arguments::{trim_arguments, ArgumentReader, Token};
use crate::error::{ProtocolError, Result};
use crate::tag::ActionTag;
use registry::Reference;

/// Kind marker carried by `RemoteSetObject` so mirrors keep their class
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectClass {
    #[default]
    Ordinary = 0,
    Array = 1,
    Error = 2,
}

impl ObjectClass {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ObjectClass::Ordinary),
            1 => Some(ObjectClass::Array),
            2 => Some(ObjectClass::Error),
            _ => None,
        }
    }
}

/// A value as it travels: a primitive or a nested action (references,
/// `Set*` payloads, the undefined marker, reflection trees)
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Action(Box<Action>),
}

impl WireValue {
    pub fn undefined() -> Self {
        WireValue::Action(Box::new(Action::UndefinedValue))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, WireValue::Action(action) if **action == Action::UndefinedValue)
    }

    pub fn action(action: Action) -> Self {
        WireValue::Action(Box::new(action))
    }

    pub fn as_action(&self) -> Option<&Action> {
        match self {
            WireValue::Action(action) => Some(action),
            _ => None,
        }
    }

    pub fn to_token(&self) -> Token {
        match self {
            WireValue::Null => Token::Null,
            WireValue::Bool(b) => Token::Bool(*b),
            WireValue::Number(n) => Token::Number(*n),
            WireValue::String(s) => Token::String(s.clone()),
            WireValue::Action(action) => action.to_token(),
        }
    }

    pub fn from_token(token: Token) -> Result<Self> {
        match token {
            Token::Null => Ok(WireValue::Null),
            Token::Bool(b) => Ok(WireValue::Bool(b)),
            Token::Number(n) => Ok(WireValue::Number(n)),
            Token::String(s) => Ok(WireValue::String(s)),
            Token::List(items) => Err(ProtocolError::invalid_argument(
                "value",
                0,
                "primitive or action",
                format!("list of {}", items.len()),
            )),
            token @ Token::Action(..) => Ok(WireValue::action(Action::from_token(token)?)),
        }
    }
}

/// Property descriptor as transmitted (tag `0x51`)
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorArgs {
    Data {
        value: WireValue,
        writable: bool,
        enumerable: bool,
        configurable: bool,
    },
    Accessor {
        get: WireValue,
        set: WireValue,
        enumerable: bool,
        configurable: bool,
    },
}

impl DescriptorArgs {
    fn defaults() -> [Option<Token>; 6] {
        [
            Some(Token::undefined()),
            Some(Token::Bool(true)),
            Some(Token::Bool(true)),
            Some(Token::Bool(true)),
            Some(Token::Null),
            Some(Token::Null),
        ]
    }

    pub fn to_token(&self) -> Token {
        let args = match self {
            DescriptorArgs::Data {
                value,
                writable,
                enumerable,
                configurable,
            } => vec![
                value.to_token(),
                Token::Bool(*configurable),
                Token::Bool(*writable),
                Token::Bool(*enumerable),
                Token::Null,
                Token::Null,
            ],
            DescriptorArgs::Accessor {
                get,
                set,
                enumerable,
                configurable,
            } => vec![
                Token::undefined(),
                Token::Bool(*configurable),
                Token::Bool(false),
                Token::Bool(*enumerable),
                get.to_token(),
                set.to_token(),
            ],
        };
        Token::Action(
            ActionTag::PropertyDescriptor.into(),
            trim_arguments(args, &Self::defaults()),
        )
    }

    pub fn from_token(token: Token) -> Result<Self> {
        let args = match token {
            Token::Action(tag, args) if tag == u8::from(ActionTag::PropertyDescriptor) => args,
            other => {
                return Err(ProtocolError::invalid_argument(
                    ActionTag::PropertyDescriptor.name(),
                    0,
                    "property descriptor",
                    other,
                ))
            }
        };

        let mut reader = ArgumentReader::new(ActionTag::PropertyDescriptor, args);
        let value = reader.value_or(Token::undefined())?;
        let configurable = reader.bool_or(true)?;
        let writable = reader.bool_or(true)?;
        let enumerable = reader.bool_or(true)?;
        let get = reader.value_or(Token::Null)?;
        let set = reader.value_or(Token::Null)?;
        reader.finish()?;

        if get != WireValue::Null || set != WireValue::Null {
            if !value.is_undefined() || writable {
                return Err(ProtocolError::invalid_descriptor(
                    "Cannot both specify accessors and a value or writable attribute",
                ));
            }
            return Ok(DescriptorArgs::Accessor {
                get,
                set,
                enumerable,
                configurable,
            });
        }

        Ok(DescriptorArgs::Data {
            value,
            writable,
            enumerable,
            configurable,
        })
    }
}

/// Own properties of a transmitted object, in definition order
pub type DescriptorList = Vec<(WireValue, DescriptorArgs)>;

/// Resolved getter values keyed by property name
pub type CacheList = Vec<(String, WireValue)>;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Envelope asking the receiver to evaluate `action` and answer `id`
    Request { id: u32, action: Box<Action> },
    /// Answer to a request; `rejected` marks `value` as the failure reason
    Response {
        request_id: u32,
        value: WireValue,
        rejected: bool,
    },

    /// The receiver's own value registered under `reference`
    Get { reference: Reference },
    RemoteSetFunction {
        reference: Reference,
        name: Option<String>,
        descriptors: DescriptorList,
        prototype: WireValue,
        extensible: bool,
        cached: CacheList,
    },
    RemoteSetObject {
        reference: Reference,
        descriptors: DescriptorList,
        prototype: WireValue,
        extensible: bool,
        cached: CacheList,
        class: ObjectClass,
    },
    /// `registered` symbols are looked up in the global symbol registry by
    /// `description`
    RemoteSetSymbol {
        reference: Reference,
        description: Option<String>,
        registered: bool,
    },
    /// Sender dropped its mirror of the receiver's `reference`
    Delete { reference: Reference },
    LocalReference { reference: Reference },
    RemoteReference { reference: Reference },

    LocalDefineProperty {
        reference: Reference,
        property: WireValue,
        descriptor: DescriptorArgs,
    },
    LocalDeleteProperty {
        reference: Reference,
        property: WireValue,
    },
    LocalSetPrototypeOf {
        reference: Reference,
        prototype: WireValue,
    },
    LocalPreventExtensions { reference: Reference },

    RemoteDefineProperty {
        reference: Reference,
        property: WireValue,
        descriptor: DescriptorArgs,
    },
    RemoteDeleteProperty {
        reference: Reference,
        property: WireValue,
    },
    RemoteSetPrototypeOf {
        reference: Reference,
        prototype: WireValue,
    },
    RemotePreventExtensions { reference: Reference },
    RemoteSetPropertyCache {
        reference: Reference,
        property: String,
        value: WireValue,
    },
    RemoteDeletePropertyCache {
        reference: Reference,
        property: String,
    },

    ReflectApply {
        target: WireValue,
        this_arg: WireValue,
        arguments: Vec<WireValue>,
    },
    ReflectConstruct {
        target: WireValue,
        arguments: Vec<WireValue>,
    },
    ReflectGet {
        target: WireValue,
        property: WireValue,
    },
    /// Evaluate `target`, then call `resolve` or `reject` with the outcome
    ReflectPromise {
        target: WireValue,
        resolve: WireValue,
        reject: WireValue,
    },

    UndefinedValue,
}

fn descriptors_token(descriptors: &DescriptorList) -> Token {
    Token::List(
        descriptors
            .iter()
            .flat_map(|(key, descriptor)| [key.to_token(), descriptor.to_token()])
            .collect(),
    )
}

fn cached_token(cached: &CacheList) -> Token {
    Token::List(
        cached
            .iter()
            .flat_map(|(key, value)| [Token::String(key.clone()), value.to_token()])
            .collect(),
    )
}

fn values_token(values: &[WireValue]) -> Token {
    Token::List(values.iter().map(WireValue::to_token).collect())
}

impl ArgumentReader {
    pub fn value(&mut self) -> Result<WireValue> {
        let token = self.required()?;
        WireValue::from_token(token)
    }

    pub fn value_or(&mut self, default: Token) -> Result<WireValue> {
        let token = self.optional(default);
        WireValue::from_token(token)
    }

    fn descriptor(&mut self) -> Result<DescriptorArgs> {
        let token = self.required()?;
        DescriptorArgs::from_token(token)
    }

    fn descriptor_list(&mut self) -> Result<DescriptorList> {
        let items = self.list_or_empty()?;
        if items.len() % 2 != 0 {
            return Err(self.invalid("key/descriptor pairs", &Token::List(items)));
        }
        let mut pairs = Vec::with_capacity(items.len() / 2);
        let mut items = items.into_iter();
        while let (Some(key), Some(descriptor)) = (items.next(), items.next()) {
            pairs.push((WireValue::from_token(key)?, DescriptorArgs::from_token(descriptor)?));
        }
        Ok(pairs)
    }

    fn cache_list(&mut self) -> Result<CacheList> {
        let items = self.list_or_empty()?;
        if items.len() % 2 != 0 {
            return Err(self.invalid("key/value pairs", &Token::List(items)));
        }
        let mut pairs = Vec::with_capacity(items.len() / 2);
        let mut items = items.into_iter();
        while let (Some(key), Some(value)) = (items.next(), items.next()) {
            let key = match key {
                Token::String(key) => key,
                other => return Err(self.invalid("string cache key", &other)),
            };
            pairs.push((key, WireValue::from_token(value)?));
        }
        Ok(pairs)
    }

    fn value_list(&mut self) -> Result<Vec<WireValue>> {
        self.list_or_empty()?
            .into_iter()
            .map(WireValue::from_token)
            .collect()
    }

    fn object_class(&mut self) -> Result<ObjectClass> {
        let code = self.u8_or(ObjectClass::Ordinary.code())?;
        ObjectClass::from_code(code)
            .ok_or_else(|| self.invalid("object class", &Token::Number(code as f64)))
    }
}

impl Action {
    pub fn tag(&self) -> ActionTag {
        match self {
            Action::Request { .. } => ActionTag::Request,
            Action::Response { .. } => ActionTag::Response,
            Action::Get { .. } => ActionTag::Get,
            Action::RemoteSetFunction { .. } => ActionTag::RemoteSetFunction,
            Action::RemoteSetObject { .. } => ActionTag::RemoteSetObject,
            Action::RemoteSetSymbol { .. } => ActionTag::RemoteSetSymbol,
            Action::Delete { .. } => ActionTag::Delete,
            Action::LocalReference { .. } => ActionTag::LocalReference,
            Action::RemoteReference { .. } => ActionTag::RemoteReference,
            Action::LocalDefineProperty { .. } => ActionTag::LocalDefineProperty,
            Action::LocalDeleteProperty { .. } => ActionTag::LocalDeleteProperty,
            Action::LocalSetPrototypeOf { .. } => ActionTag::LocalSetPrototypeOf,
            Action::LocalPreventExtensions { .. } => ActionTag::LocalPreventExtensions,
            Action::RemoteDefineProperty { .. } => ActionTag::RemoteDefineProperty,
            Action::RemoteDeleteProperty { .. } => ActionTag::RemoteDeleteProperty,
            Action::RemoteSetPrototypeOf { .. } => ActionTag::RemoteSetPrototypeOf,
            Action::RemotePreventExtensions { .. } => ActionTag::RemotePreventExtensions,
            Action::RemoteSetPropertyCache { .. } => ActionTag::RemoteSetPropertyCache,
            Action::RemoteDeletePropertyCache { .. } => ActionTag::RemoteDeletePropertyCache,
            Action::ReflectApply { .. } => ActionTag::ReflectApply,
            Action::ReflectConstruct { .. } => ActionTag::ReflectConstruct,
            Action::ReflectGet { .. } => ActionTag::ReflectGet,
            Action::ReflectPromise { .. } => ActionTag::ReflectPromise,
            Action::UndefinedValue => ActionTag::UndefinedValue,
        }
    }

    pub fn name(&self) -> &'static str {
        self.tag().name()
    }

    /// Handle named by a plain reference action
    pub fn reference(&self) -> Option<&Reference> {
        match self {
            Action::Get { reference }
            | Action::Delete { reference }
            | Action::LocalReference { reference }
            | Action::RemoteReference { reference }
            | Action::RemoteSetFunction { reference, .. }
            | Action::RemoteSetObject { reference, .. }
            | Action::RemoteSetSymbol { reference, .. } => Some(reference),
            _ => None,
        }
    }

    pub fn to_token(&self) -> Token {
        let (args, defaults): (Vec<Token>, Vec<Option<Token>>) = match self {
            Action::Request { id, action } => (
                vec![Token::Number(*id as f64), action.to_token()],
                vec![None, None],
            ),
            Action::Response {
                request_id,
                value,
                rejected,
            } => (
                vec![
                    Token::Number(*request_id as f64),
                    value.to_token(),
                    Token::Bool(*rejected),
                ],
                vec![None, Some(Token::undefined()), Some(Token::Bool(false))],
            ),
            Action::Get { reference }
            | Action::Delete { reference }
            | Action::LocalReference { reference }
            | Action::RemoteReference { reference }
            | Action::LocalPreventExtensions { reference }
            | Action::RemotePreventExtensions { reference } => {
                (vec![Token::from(reference)], vec![None])
            }
            Action::RemoteSetFunction {
                reference,
                name,
                descriptors,
                prototype,
                extensible,
                cached,
            } => (
                vec![
                    Token::from(reference),
                    name.clone().map_or(Token::Null, Token::String),
                    descriptors_token(descriptors),
                    prototype.to_token(),
                    Token::Bool(*extensible),
                    cached_token(cached),
                ],
                vec![
                    None,
                    Some(Token::Null),
                    Some(Token::empty_list()),
                    Some(Token::Null),
                    Some(Token::Bool(true)),
                    Some(Token::empty_list()),
                ],
            ),
            Action::RemoteSetObject {
                reference,
                descriptors,
                prototype,
                extensible,
                cached,
                class,
            } => (
                vec![
                    Token::from(reference),
                    descriptors_token(descriptors),
                    prototype.to_token(),
                    Token::Bool(*extensible),
                    cached_token(cached),
                    Token::Number(class.code() as f64),
                ],
                vec![
                    None,
                    Some(Token::empty_list()),
                    Some(Token::Null),
                    Some(Token::Bool(true)),
                    Some(Token::empty_list()),
                    Some(Token::Number(ObjectClass::Ordinary.code() as f64)),
                ],
            ),
            Action::RemoteSetSymbol {
                reference,
                description,
                registered,
            } => (
                vec![
                    Token::from(reference),
                    description.clone().map_or(Token::Null, Token::String),
                    Token::Bool(*registered),
                ],
                vec![None, Some(Token::Null), Some(Token::Bool(false))],
            ),
            Action::LocalDefineProperty {
                reference,
                property,
                descriptor,
            }
            | Action::RemoteDefineProperty {
                reference,
                property,
                descriptor,
            } => (
                vec![Token::from(reference), property.to_token(), descriptor.to_token()],
                vec![None, None, None],
            ),
            Action::LocalDeleteProperty {
                reference,
                property,
            }
            | Action::RemoteDeleteProperty {
                reference,
                property,
            } => (
                vec![Token::from(reference), property.to_token()],
                vec![None, None],
            ),
            Action::LocalSetPrototypeOf {
                reference,
                prototype,
            }
            | Action::RemoteSetPrototypeOf {
                reference,
                prototype,
            } => (
                vec![Token::from(reference), prototype.to_token()],
                vec![None, Some(Token::Null)],
            ),
            Action::RemoteSetPropertyCache {
                reference,
                property,
                value,
            } => (
                vec![
                    Token::from(reference),
                    Token::String(property.clone()),
                    value.to_token(),
                ],
                vec![None, None, Some(Token::undefined())],
            ),
            Action::RemoteDeletePropertyCache {
                reference,
                property,
            } => (
                vec![Token::from(reference), Token::String(property.clone())],
                vec![None, None],
            ),
            Action::ReflectApply {
                target,
                this_arg,
                arguments,
            } => (
                vec![target.to_token(), this_arg.to_token(), values_token(arguments)],
                vec![None, Some(Token::Null), Some(Token::empty_list())],
            ),
            Action::ReflectConstruct { target, arguments } => (
                vec![target.to_token(), values_token(arguments)],
                vec![None, Some(Token::empty_list())],
            ),
            Action::ReflectGet { target, property } => (
                vec![target.to_token(), property.to_token()],
                vec![None, None],
            ),
            Action::ReflectPromise {
                target,
                resolve,
                reject,
            } => (
                vec![target.to_token(), resolve.to_token(), reject.to_token()],
                vec![None, None, None],
            ),
            Action::UndefinedValue => (Vec::new(), Vec::new()),
        };

        Token::Action(self.tag().into(), trim_arguments(args, &defaults))
    }

    pub fn from_token(token: Token) -> Result<Self> {
        let (tag, args) = match token {
            Token::Action(tag, args) => (tag, args),
            other => {
                return Err(ProtocolError::invalid_argument(
                    "frame",
                    0,
                    "action",
                    other,
                ))
            }
        };
        let tag = ActionTag::try_from(tag).map_err(|_| ProtocolError::UnknownActionTag { tag })?;
        if tag.is_nested_only() {
            return Err(ProtocolError::UnexpectedAction {
                action: tag.name(),
                context: "value position",
            });
        }

        let mut r = ArgumentReader::new(tag, args);
        let action = match tag {
            ActionTag::Request => {
                let id = r.u32()?;
                let inner = r.required()?;
                Action::Request {
                    id,
                    action: Box::new(Action::from_token(inner)?),
                }
            }
            ActionTag::Response => Action::Response {
                request_id: r.u32()?,
                value: r.value_or(Token::undefined())?,
                rejected: r.bool_or(false)?,
            },
            ActionTag::Get => Action::Get {
                reference: r.reference()?,
            },
            ActionTag::RemoteSetFunction => Action::RemoteSetFunction {
                reference: r.reference()?,
                name: r.nullable_string()?,
                descriptors: r.descriptor_list()?,
                prototype: r.value_or(Token::Null)?,
                extensible: r.bool_or(true)?,
                cached: r.cache_list()?,
            },
            ActionTag::RemoteSetObject => Action::RemoteSetObject {
                reference: r.reference()?,
                descriptors: r.descriptor_list()?,
                prototype: r.value_or(Token::Null)?,
                extensible: r.bool_or(true)?,
                cached: r.cache_list()?,
                class: r.object_class()?,
            },
            ActionTag::RemoteSetSymbol => Action::RemoteSetSymbol {
                reference: r.reference()?,
                description: r.nullable_string()?,
                registered: r.bool_or(false)?,
            },
            ActionTag::Delete => Action::Delete {
                reference: r.reference()?,
            },
            ActionTag::LocalReference => Action::LocalReference {
                reference: r.reference()?,
            },
            ActionTag::RemoteReference => Action::RemoteReference {
                reference: r.reference()?,
            },
            ActionTag::LocalDefineProperty => Action::LocalDefineProperty {
                reference: r.reference()?,
                property: r.value()?,
                descriptor: r.descriptor()?,
            },
            ActionTag::LocalDeleteProperty => Action::LocalDeleteProperty {
                reference: r.reference()?,
                property: r.value()?,
            },
            ActionTag::LocalSetPrototypeOf => Action::LocalSetPrototypeOf {
                reference: r.reference()?,
                prototype: r.value_or(Token::Null)?,
            },
            ActionTag::LocalPreventExtensions => Action::LocalPreventExtensions {
                reference: r.reference()?,
            },
            ActionTag::RemoteDefineProperty => Action::RemoteDefineProperty {
                reference: r.reference()?,
                property: r.value()?,
                descriptor: r.descriptor()?,
            },
            ActionTag::RemoteDeleteProperty => Action::RemoteDeleteProperty {
                reference: r.reference()?,
                property: r.value()?,
            },
            ActionTag::RemoteSetPrototypeOf => Action::RemoteSetPrototypeOf {
                reference: r.reference()?,
                prototype: r.value_or(Token::Null)?,
            },
            ActionTag::RemotePreventExtensions => Action::RemotePreventExtensions {
                reference: r.reference()?,
            },
            ActionTag::RemoteSetPropertyCache => Action::RemoteSetPropertyCache {
                reference: r.reference()?,
                property: r.string()?,
                value: r.value_or(Token::undefined())?,
            },
            ActionTag::RemoteDeletePropertyCache => Action::RemoteDeletePropertyCache {
                reference: r.reference()?,
                property: r.string()?,
            },
            ActionTag::ReflectApply => Action::ReflectApply {
                target: r.value()?,
                this_arg: r.value_or(Token::Null)?,
                arguments: r.value_list()?,
            },
            ActionTag::ReflectConstruct => Action::ReflectConstruct {
                target: r.value()?,
                arguments: r.value_list()?,
            },
            ActionTag::ReflectGet => Action::ReflectGet {
                target: r.value()?,
                property: r.value()?,
            },
            ActionTag::ReflectPromise => Action::ReflectPromise {
                target: r.value()?,
                resolve: r.value()?,
                reject: r.value()?,
            },
            ActionTag::UndefinedValue => Action::UndefinedValue,
            ActionTag::PropertyDescriptor => {
                return Err(ProtocolError::UnexpectedAction {
                    action: tag.name(),
                    context: "value position",
                })
            }
        };
        r.finish()?;
        Ok(action)
    }
}
