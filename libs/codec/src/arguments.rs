//! # Positional Argument Lists
//!
//! Every action serializes to an ordered list of [`Token`]s. Arguments have
//! declared defaults; trailing arguments equal to their default are dropped
//! on encode and filled back in on decode.

use crate::error::{ProtocolError, Result};
use crate::tag::ActionTag;
use registry::{Reference, MAX_SAFE_ID};
use serde::de::{self, DeserializeSeed, EnumAccess, SeqAccess, Unexpected, VariantAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Deepest list/action nesting accepted in one payload
pub const MAX_NESTING: usize = 256;

/// Serialized shape of an argument list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Token {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Token>),
    Action(u8, Vec<Token>),
}

impl Token {
    pub fn undefined() -> Self {
        Token::Action(ActionTag::UndefinedValue.into(), Vec::new())
    }

    pub fn empty_list() -> Self {
        Token::List(Vec::new())
    }

    /// Nesting depth; a primitive is depth 0
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 0usize)];
        while let Some((token, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let Token::List(items) | Token::Action(_, items) = token {
                stack.extend(items.iter().map(|item| (item, depth + 1)));
            }
        }
        deepest
    }

    fn describe(&self) -> String {
        match self {
            Token::Null => "null".into(),
            Token::Bool(b) => format!("bool {}", b),
            Token::Number(n) => format!("number {}", n),
            Token::String(s) => format!("string {:?}", s),
            Token::List(items) => format!("list of {}", items.len()),
            Token::Action(tag, _) => format!("action {:#04x}", tag),
        }
    }
}

const TOKEN_VARIANTS: &[&str] = &["Null", "Bool", "Number", "String", "List", "Action"];

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        TokenSeed { depth: 0 }.deserialize(deserializer)
    }
}

/// Token decoder that refuses to descend past [`MAX_NESTING`]
#[derive(Clone, Copy)]
struct TokenSeed {
    depth: usize,
}

impl<'de> DeserializeSeed<'de> for TokenSeed {
    type Value = Token;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Token, D::Error> {
        if self.depth > MAX_NESTING {
            return Err(de::Error::custom(format_args!(
                "token nesting exceeds {} levels",
                MAX_NESTING
            )));
        }
        deserializer.deserialize_enum("Token", TOKEN_VARIANTS, self)
    }
}

impl<'de> Visitor<'de> for TokenSeed {
    type Value = Token;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a token")
    }

    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> std::result::Result<Token, A::Error> {
        let nested = self.depth + 1;
        let (index, variant) = data.variant::<u32>()?;
        match index {
            0 => variant.unit_variant().map(|()| Token::Null),
            1 => variant.newtype_variant().map(Token::Bool),
            2 => variant.newtype_variant().map(Token::Number),
            3 => variant.newtype_variant().map(Token::String),
            4 => variant
                .newtype_variant_seed(ListSeed { depth: nested })
                .map(Token::List),
            5 => variant.tuple_variant(2, ActionVisitor { depth: nested }),
            other => Err(de::Error::invalid_value(
                Unexpected::Unsigned(other as u64),
                &"token variant index below 6",
            )),
        }
    }
}

/// Items of a list or action argument list, each at `depth`
struct ListSeed {
    depth: usize,
}

impl<'de> DeserializeSeed<'de> for ListSeed {
    type Value = Vec<Token>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Vec<Token>, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for ListSeed {
    type Value = Vec<Token>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a token list")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Vec<Token>, A::Error> {
        // declared lengths come from the peer
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(1024));
        while let Some(item) = seq.next_element_seed(TokenSeed { depth: self.depth })? {
            items.push(item);
        }
        Ok(items)
    }
}

struct ActionVisitor {
    depth: usize,
}

impl<'de> Visitor<'de> for ActionVisitor {
    type Value = Token;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an action tag and argument list")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Token, A::Error> {
        let tag: u8 = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let args = seq
            .next_element_seed(ListSeed { depth: self.depth })?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        Ok(Token::Action(tag, args))
    }
}

impl From<&Reference> for Token {
    fn from(reference: &Reference) -> Self {
        match reference {
            Reference::Id(id) => Token::Number(*id as f64),
            Reference::Name(name) => Token::String(name.clone()),
        }
    }
}

/// Drop trailing arguments equal to their default. `None` marks a required
/// argument, which stops trimming.
pub fn trim_arguments(mut args: Vec<Token>, defaults: &[Option<Token>]) -> Vec<Token> {
    while let Some(last) = args.last() {
        match defaults.get(args.len() - 1) {
            Some(Some(default)) if default == last => {
                args.pop();
            }
            _ => break,
        }
    }
    args
}

/// Cursor over a decoded argument list
pub struct ArgumentReader {
    tag: ActionTag,
    args: std::vec::IntoIter<Token>,
    index: usize,
    total: usize,
}

impl ArgumentReader {
    pub fn new(tag: ActionTag, args: Vec<Token>) -> Self {
        let total = args.len();
        Self {
            tag,
            args: args.into_iter(),
            index: 0,
            total,
        }
    }

    pub fn tag(&self) -> ActionTag {
        self.tag
    }

    /// Position of the argument returned by the last read
    pub fn position(&self) -> usize {
        self.index.saturating_sub(1)
    }

    pub fn required(&mut self) -> Result<Token> {
        let index = self.index;
        self.index += 1;
        self.args.next().ok_or(ProtocolError::MissingArgument {
            action: self.tag.name(),
            index,
        })
    }

    pub fn optional(&mut self, default: Token) -> Token {
        self.index += 1;
        self.args.next().unwrap_or(default)
    }

    pub fn invalid(&self, expected: &'static str, got: &Token) -> ProtocolError {
        ProtocolError::invalid_argument(self.tag.name(), self.position(), expected, got.describe())
    }

    pub fn reference(&mut self) -> Result<Reference> {
        let token = self.required()?;
        match token {
            Token::Number(n) if n >= 1.0 && n <= MAX_SAFE_ID as f64 && n.fract() == 0.0 => {
                Ok(Reference::Id(n as u64))
            }
            Token::String(ref s) if !s.is_empty() => Ok(Reference::Name(s.clone())),
            other => Err(self.invalid("reference", &other)),
        }
    }

    pub fn bool_or(&mut self, default: bool) -> Result<bool> {
        match self.optional(Token::Bool(default)) {
            Token::Bool(b) => Ok(b),
            other => Err(self.invalid("bool", &other)),
        }
    }

    pub fn u32(&mut self) -> Result<u32> {
        match self.required()? {
            Token::Number(n) if n >= 0.0 && n <= u32::MAX as f64 && n.fract() == 0.0 => {
                Ok(n as u32)
            }
            other => Err(self.invalid("32-bit id", &other)),
        }
    }

    pub fn u8_or(&mut self, default: u8) -> Result<u8> {
        match self.optional(Token::Number(default as f64)) {
            Token::Number(n) if n >= 0.0 && n <= u8::MAX as f64 && n.fract() == 0.0 => {
                Ok(n as u8)
            }
            other => Err(self.invalid("small integer", &other)),
        }
    }

    pub fn string(&mut self) -> Result<String> {
        match self.required()? {
            Token::String(s) => Ok(s),
            other => Err(self.invalid("string", &other)),
        }
    }

    pub fn nullable_string(&mut self) -> Result<Option<String>> {
        match self.optional(Token::Null) {
            Token::Null => Ok(None),
            Token::String(s) => Ok(Some(s)),
            other => Err(self.invalid("string or null", &other)),
        }
    }

    pub fn list_or_empty(&mut self) -> Result<Vec<Token>> {
        match self.optional(Token::empty_list()) {
            Token::List(items) => Ok(items),
            other => Err(self.invalid("list", &other)),
        }
    }

    pub fn list(&mut self) -> Result<Vec<Token>> {
        match self.required()? {
            Token::List(items) => Ok(items),
            other => Err(self.invalid("list", &other)),
        }
    }

    /// Fail when arguments remain unread
    pub fn finish(self) -> Result<()> {
        if self.index < self.total {
            return Err(ProtocolError::TooManyArguments {
                action: self.tag.name(),
                max: self.index,
                got: self.total,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_stops_at_first_non_default() {
        let defaults = [None, Some(Token::Null), Some(Token::Bool(false))];
        let args = vec![Token::Number(1.0), Token::Null, Token::Bool(false)];
        assert_eq!(trim_arguments(args, &defaults), vec![Token::Number(1.0)]);

        let args = vec![Token::Number(1.0), Token::Null, Token::Bool(true)];
        assert_eq!(trim_arguments(args.clone(), &defaults), args);

        let args = vec![Token::Number(1.0), Token::String("x".into()), Token::Bool(false)];
        assert_eq!(
            trim_arguments(args, &defaults),
            vec![Token::Number(1.0), Token::String("x".into())]
        );
    }

    #[test]
    fn test_depth_counts_lists_and_actions() {
        assert_eq!(Token::Null.depth(), 0);
        assert_eq!(Token::empty_list().depth(), 0);
        let nested = Token::List(vec![Token::Null, Token::Action(1, vec![Token::List(vec![Token::Bool(true)])])]);
        assert_eq!(nested.depth(), 3);
    }

    #[test]
    fn test_decode_accepts_nesting_up_to_limit() {
        let mut token = Token::Null;
        for _ in 0..MAX_NESTING {
            token = Token::List(vec![token]);
        }
        let bytes = bincode::serialize(&token).unwrap();
        let decoded: Token = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.depth(), MAX_NESTING);
        assert_eq!(decoded, token);

        let too_deep = bincode::serialize(&Token::Action(3, vec![token])).unwrap();
        let err = bincode::deserialize::<Token>(&too_deep).unwrap_err();
        assert!(err.to_string().contains("nesting"), "{err}");
    }

    #[test]
    fn test_required_arguments_never_trimmed() {
        let defaults = [None, None];
        let args = vec![Token::Null, Token::Null];
        assert_eq!(trim_arguments(args.clone(), &defaults), args);
    }

    #[test]
    fn test_reader_fills_defaults_and_rejects_extras() {
        let mut reader = ArgumentReader::new(ActionTag::Response, vec![Token::Number(3.0)]);
        assert_eq!(reader.u32().unwrap(), 3);
        assert_eq!(reader.optional(Token::undefined()), Token::undefined());
        assert!(!reader.bool_or(false).unwrap());
        reader.finish().unwrap();

        let mut reader = ArgumentReader::new(
            ActionTag::Get,
            vec![Token::String("foo".into()), Token::Null],
        );
        assert_eq!(reader.reference().unwrap(), Reference::from("foo"));
        assert!(matches!(
            reader.finish(),
            Err(ProtocolError::TooManyArguments { max: 1, got: 2, .. })
        ));
    }

    #[test]
    fn test_reader_rejects_bad_references() {
        for token in [Token::Number(0.0), Token::Number(1.5), Token::String(String::new()), Token::Null] {
            let mut reader = ArgumentReader::new(ActionTag::Get, vec![token]);
            assert!(matches!(
                reader.reference(),
                Err(ProtocolError::InvalidArgument { index: 0, .. })
            ));
        }
        let mut reader = ArgumentReader::new(ActionTag::Get, vec![]);
        assert!(matches!(
            reader.reference(),
            Err(ProtocolError::MissingArgument { index: 0, .. })
        ));
    }
}
