//! Process-wide registry of keyed symbols

use super::object::{ObjectKind, ObjectRef};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;

static SYMBOL_REGISTRY: Lazy<Mutex<HashMap<String, ObjectRef>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// The symbol registered under `key`, created on first use
pub fn symbol_for(key: &str) -> ObjectRef {
    SYMBOL_REGISTRY
        .lock()
        .entry(key.to_string())
        .or_insert_with(|| {
            ObjectRef::create(
                ObjectKind::Symbol {
                    description: Some(key.to_string()),
                    registered: true,
                },
                None,
            )
        })
        .clone()
}

/// Registry key of a registered symbol
pub fn symbol_key_for(symbol: &ObjectRef) -> Option<String> {
    match symbol.kind() {
        ObjectKind::Symbol {
            description,
            registered: true,
        } => description.clone(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyed_symbols_are_shared() {
        let a = symbol_for("app.tag");
        let b = symbol_for("app.tag");
        assert!(a.ptr_eq(&b));
        assert_eq!(symbol_key_for(&a).as_deref(), Some("app.tag"));

        let local = ObjectRef::new_symbol(Some("app.tag".into()));
        assert!(!local.ptr_eq(&a));
        assert_eq!(symbol_key_for(&local), None);
    }
}
