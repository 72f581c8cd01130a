//! # Environment
//!
//! Named, read-only registry of values both peers agree on before a session
//! starts. Environment values travel by name, so each side resolves them to
//! its own copy.
//!
//! Build once, share by cloning; contexts never write into it.

use crate::error::Result;
use crate::value::Value;
use once_cell::sync::Lazy;
use registry::{Reference, Registry};
use std::fmt;
use tracing::debug;

static EMPTY: Lazy<Environment> = Lazy::new(|| Environment {
    name: "empty".to_string(),
    registry: Registry::new(),
});

#[derive(Clone)]
pub struct Environment {
    name: String,
    registry: Registry<Value>,
}

impl Environment {
    /// Shared environment without any values
    pub fn empty() -> Environment {
        EMPTY.clone()
    }

    pub fn builder(name: impl Into<String>) -> EnvironmentBuilder {
        EnvironmentBuilder {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, reference: &Reference) -> Result<Value> {
        Ok(self.registry.get(reference)?)
    }

    pub fn exists(&self, value: &Value) -> bool {
        self.registry.exists(value)
    }

    pub fn len(&self) -> usize {
        self.registry.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn registry(&self) -> &Registry<Value> {
        &self.registry
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("size", &self.len())
            .finish()
    }
}

pub struct EnvironmentBuilder {
    name: String,
    entries: Vec<(Reference, Value)>,
}

impl EnvironmentBuilder {
    pub fn with(mut self, reference: impl Into<Reference>, value: impl Into<Value>) -> Self {
        self.entries.push((reference.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<Environment> {
        let registry = Registry::new();
        for (reference, value) in self.entries {
            registry.set(reference, value)?;
        }
        debug!(name = %self.name, size = registry.size(), "environment built");
        Ok(Environment {
            name: self.name,
            registry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectRef;

    #[test]
    fn test_empty_environment_is_shared() {
        let a = Environment::empty();
        let b = Environment::empty();
        assert!(a.registry().same_scope(b.registry()));
        assert!(a.is_empty());
    }

    #[test]
    fn test_builder_registers_names() {
        let math = ObjectRef::new_object();
        let env = Environment::builder("test")
            .with("Math", math.clone())
            .with("version", "1.0")
            .build()
            .unwrap();

        assert_eq!(env.name(), "test");
        assert_eq!(env.get(&"Math".into()).unwrap(), Value::Object(math.clone()));
        assert!(env.exists(&Value::Object(math)));
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_builder_rejects_invalid_names() {
        let err = Environment::builder("bad").with("", 1).build().unwrap_err();
        assert!(err.is_type_error());
    }
}
