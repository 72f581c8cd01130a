//! # Reference Registry
//!
//! Handle↔value maps used by both peers of a session to name shared values.
//!
//! ## Components
//!
//! - [`Reference`]: opaque integer or string handle
//! - [`Registry`]: scoped map with parent delegation and a release hook
//! - [`AssignableRegistry`]: registry minting fresh integer handles
//!
//! ## Usage
//!
//! ```rust
//! use registry::{AssignOptions, AssignableRegistry, Registry};
//!
//! let env = Registry::new();
//! env.set("answer".into(), 42u32).unwrap();
//!
//! let scope = AssignableRegistry::new(Some(env), AssignOptions::default()).unwrap();
//! let handle = scope.assign(7u32).unwrap();
//! assert_eq!(scope.get(&handle).unwrap(), 7);
//! assert_eq!(scope.get(&"answer".into()).unwrap(), 42);
//! ```

pub mod assignable;
pub mod error;
pub mod reference;
pub mod registry;

pub use assignable::{AssignOptions, AssignableRegistry, DEFAULT_MAX_REFERENCES, MAX_SAFE_ID};
pub use error::{ErrorKind, RegistryError, Result};
pub use reference::Reference;
pub use registry::{Referable, Registry, ReleaseHook};
