//! # Assignable Registry
//!
//! Registry that mints integer handles on demand. Ids come from a counter
//! that wraps at the configured ceiling back to 1; candidates already visible
//! anywhere in the chain are skipped. The number of live handles in the chain
//! is capped by `max_references`.

use crate::error::{RegistryError, Result};
use crate::registry::{Referable, Registry};
use crate::Reference;
use parking_lot::Mutex;
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;

/// Largest integer both peers can represent exactly (2^53 - 1)
pub const MAX_SAFE_ID: u64 = 9_007_199_254_740_991;

/// Default cap on live handles per registry chain
pub const DEFAULT_MAX_REFERENCES: u64 = 256 * 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignOptions {
    /// Live handles allowed in the whole chain before assignment fails
    pub max_references: u64,
    /// Highest id minted before the counter wraps to 1
    pub id_ceiling: u64,
}

impl Default for AssignOptions {
    fn default() -> Self {
        Self {
            max_references: DEFAULT_MAX_REFERENCES,
            id_ceiling: MAX_SAFE_ID,
        }
    }
}

impl AssignOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_references == 0 {
            return Err(RegistryError::invalid_options(
                "max_references must be positive",
            ));
        }
        if self.id_ceiling == 0 || self.id_ceiling > MAX_SAFE_ID {
            return Err(RegistryError::invalid_options(format!(
                "id_ceiling must be within 1..={}",
                MAX_SAFE_ID
            )));
        }
        if self.id_ceiling < self.max_references {
            return Err(RegistryError::invalid_options(
                "id_ceiling must not be lower than max_references",
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct IdGenerator {
    next: u64,
    options: AssignOptions,
}

impl IdGenerator {
    fn advance(&mut self) -> u64 {
        let id = self.next;
        self.next = if id >= self.options.id_ceiling { 1 } else { id + 1 };
        id
    }
}

/// Registry with an id generator. Derefs to the underlying [`Registry`].
pub struct AssignableRegistry<V: Referable> {
    registry: Registry<V>,
    ids: Arc<Mutex<IdGenerator>>,
}

impl<V: Referable> Clone for AssignableRegistry<V> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            ids: self.ids.clone(),
        }
    }
}

impl<V: Referable> AssignableRegistry<V> {
    pub fn new(parent: Option<Registry<V>>, options: AssignOptions) -> Result<Self> {
        Self::starting_at(parent, options, 1)
    }

    fn starting_at(parent: Option<Registry<V>>, options: AssignOptions, next: u64) -> Result<Self> {
        options.validate()?;
        let registry = match parent {
            Some(parent) => Registry::with_parent(parent),
            None => Registry::new(),
        };
        Ok(Self {
            registry,
            ids: Arc::new(Mutex::new(IdGenerator {
                next: next.clamp(1, options.id_ceiling),
                options,
            })),
        })
    }

    /// Child scope over this registry; it continues from this generator's
    /// position with the same limits.
    pub fn closure(&self) -> Self {
        let (options, next) = {
            let ids = self.ids.lock();
            (ids.options, ids.next)
        };
        Self {
            registry: self.registry.closure(),
            ids: Arc::new(Mutex::new(IdGenerator { next, options })),
        }
    }

    pub fn options(&self) -> AssignOptions {
        self.ids.lock().options
    }

    pub fn registry(&self) -> &Registry<V> {
        &self.registry
    }

    /// Next id not visible anywhere in the chain
    pub fn generate_reference(&self) -> Result<Reference> {
        let max = self.ids.lock().options.max_references;
        if self.registry.size() as u64 >= max {
            return Err(RegistryError::LimitReached { max });
        }

        loop {
            let id = self.ids.lock().advance();
            let candidate = Reference::Id(id);
            if !self.registry.has(&candidate) {
                return Ok(candidate);
            }
        }
    }

    /// Handle of `value`, registering it under a fresh id when the chain does
    /// not know it yet
    pub fn assign(&self, value: V) -> Result<Reference> {
        if self.registry.exists(&value) {
            return self.registry.lookup(&value);
        }

        let reference = self.generate_reference()?;
        self.registry.set(reference.clone(), value)?;
        debug!(%reference, "assigned reference");
        Ok(reference)
    }
}

impl<V: Referable> Deref for AssignableRegistry<V> {
    type Target = Registry<V>;

    fn deref(&self) -> &Registry<V> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(max_references: u64, id_ceiling: u64) -> AssignOptions {
        AssignOptions {
            max_references,
            id_ceiling,
        }
    }

    #[test]
    fn test_assign_is_idempotent() {
        let registry = AssignableRegistry::new(None, AssignOptions::default()).unwrap();
        let first = registry.assign("x").unwrap();
        let second = registry.assign("x").unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.own_size(), 1);
    }

    #[test]
    fn test_assign_reuses_parent_handle() {
        let parent = Registry::new();
        parent.set("named".into(), "x").unwrap();
        let registry = AssignableRegistry::new(Some(parent), AssignOptions::default()).unwrap();

        assert_eq!(registry.assign("x").unwrap(), Reference::from("named"));
        assert_eq!(registry.own_size(), 0);
    }

    #[test]
    fn test_generate_skips_ids_visible_in_chain() {
        let parent = Registry::new();
        parent.set(Reference::Id(1), "taken").unwrap();
        parent.set(Reference::Id(2), "also taken").unwrap();
        let registry = AssignableRegistry::new(Some(parent), AssignOptions::default()).unwrap();

        assert_eq!(registry.generate_reference().unwrap(), Reference::Id(3));
    }

    #[test]
    fn test_counter_wraps_to_one() {
        let registry = AssignableRegistry::new(None, small(3, 3)).unwrap();
        let a = registry.assign("a").unwrap();
        let b = registry.assign("b").unwrap();
        assert_eq!((a.clone(), b), (Reference::Id(1), Reference::Id(2)));

        registry.delete(&a);
        assert_eq!(registry.assign("c").unwrap(), Reference::Id(3));
        // wrapped past the ceiling; 1 is free again, 2 is not
        assert_eq!(registry.assign("d").unwrap(), Reference::Id(1));
    }

    #[test]
    fn test_limit_reached() {
        let registry = AssignableRegistry::new(None, small(2, 10)).unwrap();
        registry.assign("a").unwrap();
        registry.assign("b").unwrap();
        let err = registry.assign("c").unwrap_err();
        assert_eq!(err, RegistryError::LimitReached { max: 2 });
        assert_eq!(err.kind(), crate::ErrorKind::Range);
    }

    #[test]
    fn test_invalid_options() {
        assert!(AssignableRegistry::<u8>::new(None, small(0, 10)).is_err());
        assert!(AssignableRegistry::<u8>::new(None, small(10, 5)).is_err());
        assert!(AssignableRegistry::<u8>::new(None, small(1, MAX_SAFE_ID + 1)).is_err());
    }

    #[test]
    fn test_closure_continues_counter() {
        let registry = AssignableRegistry::new(None, AssignOptions::default()).unwrap();
        registry.assign("a").unwrap();
        let child = registry.closure();

        assert_eq!(child.assign("b").unwrap(), Reference::Id(2));
        assert_eq!(child.assign("a").unwrap(), Reference::Id(1));
        assert_eq!(child.own_size(), 1);
        assert_eq!(child.options(), registry.options());
    }
}
