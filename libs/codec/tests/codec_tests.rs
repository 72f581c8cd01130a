//! # Codec Integration Tests
//!
//! Public API checks across tags, argument trimming and framing:
//! - every action kind survives a frame encode/decode
//! - defaults are trimmed so common actions stay small
//! - malformed frames fail with protocol errors
//! - generated request/response trees survive the payload encoding

use codec::{
    decode_payload, encode_frame, encode_payload, Action, ActionTag, DescriptorArgs,
    FrameDecoder, ObjectClass, ProtocolError, Token, WireValue, ACTION_TABLE,
    DEFAULT_MAX_FRAME_SIZE,
};
use proptest::prelude::*;
use registry::{Reference, MAX_SAFE_ID};

fn catalog() -> Vec<Action> {
    let r = || Reference::Id(7);
    let name = || WireValue::String("name".into());
    let data = DescriptorArgs::Data {
        value: WireValue::Number(f64::NAN),
        writable: false,
        enumerable: true,
        configurable: false,
    };
    let accessor = DescriptorArgs::Accessor {
        get: WireValue::action(Action::LocalReference {
            reference: Reference::Id(8),
        }),
        set: WireValue::Null,
        enumerable: false,
        configurable: true,
    };

    vec![
        Action::Request {
            id: u32::MAX,
            action: Box::new(Action::Get { reference: r() }),
        },
        Action::Response {
            request_id: 1,
            value: WireValue::Bool(false),
            rejected: true,
        },
        Action::Get { reference: "foo".into() },
        Action::RemoteSetFunction {
            reference: r(),
            name: Some("getRandom".into()),
            descriptors: vec![(name(), accessor.clone())],
            prototype: WireValue::action(Action::RemoteReference {
                reference: "Function".into(),
            }),
            extensible: false,
            cached: vec![("size".into(), WireValue::Number(3.0))],
        },
        Action::RemoteSetObject {
            reference: r(),
            descriptors: vec![(name(), data.clone())],
            prototype: WireValue::Null,
            extensible: true,
            cached: Vec::new(),
            class: ObjectClass::Error,
        },
        Action::RemoteSetSymbol {
            reference: r(),
            description: Some("tag".into()),
            registered: true,
        },
        Action::Delete { reference: r() },
        Action::LocalReference { reference: r() },
        Action::RemoteReference { reference: r() },
        Action::LocalDefineProperty {
            reference: r(),
            property: name(),
            descriptor: accessor.clone(),
        },
        Action::LocalDeleteProperty {
            reference: r(),
            property: name(),
        },
        Action::LocalSetPrototypeOf {
            reference: r(),
            prototype: WireValue::Null,
        },
        Action::LocalPreventExtensions { reference: r() },
        Action::RemoteDefineProperty {
            reference: r(),
            property: name(),
            descriptor: data,
        },
        Action::RemoteDeleteProperty {
            reference: r(),
            property: name(),
        },
        Action::RemoteSetPrototypeOf {
            reference: r(),
            prototype: WireValue::action(Action::LocalReference {
                reference: Reference::Id(2),
            }),
        },
        Action::RemotePreventExtensions { reference: r() },
        Action::RemoteSetPropertyCache {
            reference: r(),
            property: "size".into(),
            value: WireValue::undefined(),
        },
        Action::RemoteDeletePropertyCache {
            reference: r(),
            property: "size".into(),
        },
        Action::ReflectApply {
            target: WireValue::action(Action::Get { reference: r() }),
            this_arg: WireValue::Null,
            arguments: vec![WireValue::String("x".into())],
        },
        Action::ReflectConstruct {
            target: WireValue::action(Action::Get { reference: r() }),
            arguments: Vec::new(),
        },
        Action::ReflectGet {
            target: WireValue::action(Action::Get { reference: r() }),
            property: name(),
        },
        Action::ReflectPromise {
            target: WireValue::action(Action::Get { reference: r() }),
            resolve: WireValue::action(Action::LocalReference {
                reference: Reference::Id(1),
            }),
            reject: WireValue::action(Action::LocalReference {
                reference: Reference::Id(2),
            }),
        },
        Action::UndefinedValue,
    ]
}

fn same_action(a: &Action, b: &Action) -> bool {
    // NaN payloads compare unequal; compare through the token form instead
    format!("{:?}", a.to_token()) == format!("{:?}", b.to_token())
}

#[test]
fn test_every_top_level_tag_travels_through_frames() {
    let actions = catalog();
    let top_level = ACTION_TABLE.iter().filter(|t| !t.is_nested_only()).count();
    assert_eq!(actions.len(), top_level);

    let mut decoder = FrameDecoder::default();
    for action in &actions {
        decoder.extend(&encode_frame(action, DEFAULT_MAX_FRAME_SIZE).unwrap());
    }
    for expected in &actions {
        let decoded = decoder.next_action().unwrap().unwrap();
        assert_eq!(decoded.tag(), expected.tag());
        assert!(same_action(&decoded, expected), "{:?}", expected.tag());
    }
    assert!(decoder.next_action().unwrap().is_none());
}

#[test]
fn test_reference_actions_are_single_argument() {
    for action in [
        Action::Get { reference: "foo".into() },
        Action::LocalReference { reference: Reference::Id(1) },
        Action::RemoteReference { reference: Reference::Id(1) },
    ] {
        match action.to_token() {
            Token::Action(_, args) => assert_eq!(args.len(), 1),
            other => panic!("unexpected token {:?}", other),
        }
    }
}

#[test]
fn test_symbol_set_trims_to_reference() {
    let token = Action::RemoteSetSymbol {
        reference: Reference::Id(3),
        description: None,
        registered: false,
    }
    .to_token();
    assert_eq!(
        token,
        Token::Action(ActionTag::RemoteSetSymbol.into(), vec![Token::Number(3.0)])
    );
}

#[test]
fn test_request_requires_inner_action() {
    let token = Token::Action(ActionTag::Request.into(), vec![Token::Number(1.0)]);
    assert!(matches!(
        Action::from_token(token),
        Err(ProtocolError::MissingArgument { index: 1, .. })
    ));
}

fn reference_strategy() -> impl Strategy<Value = Reference> {
    prop_oneof![
        (1..=MAX_SAFE_ID).prop_map(Reference::Id),
        "[a-zA-Z_][a-zA-Z0-9_]{0,8}".prop_map(Reference::Name),
    ]
}

fn wire_value_strategy() -> impl Strategy<Value = WireValue> {
    let leaf = prop_oneof![
        Just(WireValue::Null),
        Just(WireValue::undefined()),
        any::<bool>().prop_map(WireValue::Bool),
        (-1.0e12..1.0e12f64).prop_map(WireValue::Number),
        ".{0,12}".prop_map(WireValue::String),
        reference_strategy().prop_map(|reference| WireValue::action(Action::Get { reference })),
        reference_strategy()
            .prop_map(|reference| WireValue::action(Action::LocalReference { reference })),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(target, property)| {
                WireValue::action(Action::ReflectGet { target, property })
            }),
            (inner.clone(), inner.clone(), prop::collection::vec(inner, 0..4)).prop_map(
                |(target, this_arg, arguments)| {
                    WireValue::action(Action::ReflectApply {
                        target,
                        this_arg,
                        arguments,
                    })
                }
            ),
        ]
    })
}

proptest! {
    #[test]
    fn prop_requests_survive_payload_encoding(id in any::<u32>(), target in wire_value_strategy(), arguments in prop::collection::vec(wire_value_strategy(), 0..4)) {
        let action = Action::Request {
            id,
            action: Box::new(Action::ReflectApply {
                target,
                this_arg: WireValue::undefined(),
                arguments,
            }),
        };
        let decoded = decode_payload(&encode_payload(&action).unwrap()).unwrap();
        prop_assert_eq!(decoded, action);
    }

    #[test]
    fn prop_responses_survive_payload_encoding(request_id in any::<u32>(), value in wire_value_strategy(), rejected in any::<bool>()) {
        let action = Action::Response { request_id, value, rejected };
        let decoded = decode_payload(&encode_payload(&action).unwrap()).unwrap();
        prop_assert_eq!(decoded, action);
    }
}
