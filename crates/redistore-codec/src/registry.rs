//! Process-wide registry of storable types.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{CodecError, Result};
use crate::kind::{self, Kind, Storable};
use crate::value::Value;

/// Type tag written into every encoded value.
pub type Tag = Arc<str>;

/// Rebuilds a concrete value from its JSON payload.
pub(crate) type DecodeFn = fn(serde_json::Value) -> serde_json::Result<Value>;

fn decode_payload<T: Storable>(payload: serde_json::Value) -> serde_json::Result<Value> {
    serde_json::from_value::<T>(payload).map(Value::new)
}

/// A registered type.
struct Registration {
    type_id: TypeId,
    type_name: &'static str,
    kind: Kind,
    decode: DecodeFn,
}

#[derive(Default)]
struct RegistryInner {
    by_tag: HashMap<Tag, Registration>,
    by_type: HashMap<TypeId, Tag>,
}

/// Registry mapping type tags to decoders.
///
/// Append-only and safe to share: registration takes a write lock and is
/// idempotent, lookups take a read lock. Pass it to a [`Codec`] as an
/// `Arc`, either a private instance (tests) or [`TypeRegistry::global`].
///
/// [`Codec`]: crate::Codec
pub struct TypeRegistry {
    inner: RwLock<RegistryInner>,
}

impl TypeRegistry {
    /// Create a registry with every primitive type pre-registered.
    pub fn new() -> Self {
        let registry = Self {
            inner: RwLock::new(RegistryInner::default()),
        };
        kind::seed_primitives(&registry);
        registry
    }

    /// The shared process-wide registry.
    pub fn global() -> Arc<TypeRegistry> {
        static GLOBAL: OnceLock<Arc<TypeRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(TypeRegistry::new())))
    }

    /// Register `T` under its Rust type name.
    ///
    /// Returns the existing tag if `T` is already registered, under any name.
    pub fn register<T: Storable>(&self) -> Result<Tag> {
        if let Some(tag) = self.tag_of::<T>() {
            return Ok(tag);
        }
        self.insert::<T>(type_name::<T>())
    }

    /// Register `T` under an explicit, stable name.
    ///
    /// Names derived from Rust type paths may differ between builds; an
    /// explicit name lets values written by one build be read by another.
    pub fn register_as<T: Storable>(&self, name: &str) -> Result<Tag> {
        self.insert::<T>(name)
    }

    /// The tag `T` is registered under, if any.
    pub fn tag_of<T: Storable>(&self) -> Option<Tag> {
        self.inner.read().by_type.get(&TypeId::of::<T>()).cloned()
    }

    /// Whether `T` has been registered.
    pub fn is_registered<T: Storable>(&self) -> bool {
        self.inner.read().by_type.contains_key(&TypeId::of::<T>())
    }

    /// The family of the type registered under `tag`.
    pub fn kind_of(&self, tag: &str) -> Option<Kind> {
        self.inner.read().by_tag.get(tag).map(|r| r.kind)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.inner.read().by_tag.len()
    }

    /// Whether no types are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_tag.is_empty()
    }

    pub(crate) fn decoder(&self, tag: &str) -> Option<DecodeFn> {
        self.inner.read().by_tag.get(tag).map(|r| r.decode)
    }

    /// Insert a primitive during construction. Primitives have distinct
    /// names and cannot conflict.
    pub(crate) fn seed<T: Storable>(&self) {
        if let Err(e) = self.insert::<T>(type_name::<T>()) {
            debug!(error = %e, "skipping primitive registration");
        }
    }

    fn insert<T: Storable>(&self, name: &str) -> Result<Tag> {
        if T::KIND == Kind::Opaque {
            return Err(CodecError::UnhandledType {
                type_name: type_name::<T>(),
            });
        }

        let type_id = TypeId::of::<T>();
        let mut inner = self.inner.write();

        if let Some((tag, existing)) = inner.by_tag.get_key_value(name) {
            if existing.type_id == type_id {
                return Ok(Arc::clone(tag));
            }
            return Err(CodecError::TagConflict {
                tag: name.to_string(),
                existing: existing.type_name,
            });
        }

        if let Some(tag) = inner.by_type.get(&type_id) {
            return Err(CodecError::TagConflict {
                tag: name.to_string(),
                existing: inner.by_tag.get(tag).map_or("<unknown>", |r| r.type_name),
            });
        }

        let tag: Tag = Arc::from(name);
        inner.by_tag.insert(
            Arc::clone(&tag),
            Registration {
                type_id,
                type_name: type_name::<T>(),
                kind: T::KIND,
                decode: decode_payload::<T>,
            },
        );
        inner.by_type.insert(type_id, Arc::clone(&tag));

        debug!(tag = %tag, kind = %T::KIND, "registered storable type");
        Ok(tag)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::thread;

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    struct Account {
        id: i64,
    }

    impl Storable for Account {}

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    struct Other {
        id: i64,
    }

    impl Storable for Other {}

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    struct Handle;

    impl Storable for Handle {
        const KIND: Kind = Kind::Opaque;
    }

    #[test]
    fn test_primitives_preregistered() {
        let registry = TypeRegistry::new();
        assert!(registry.is_registered::<String>());
        assert!(registry.is_registered::<i64>());
        assert!(registry.is_registered::<bool>());
        assert!(!registry.is_registered::<Vec<String>>());
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = TypeRegistry::new();
        let before = registry.len();

        let first = registry.register::<Box<Account>>().unwrap();
        let second = registry.register::<Box<Account>>().unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len(), before + 1);
    }

    #[test]
    fn test_register_as_custom_name() {
        let registry = TypeRegistry::new();
        let tag = registry.register_as::<Box<Account>>("account").unwrap();
        assert_eq!(&*tag, "account");
        assert_eq!(registry.tag_of::<Box<Account>>().as_deref(), Some("account"));

        // Plain register keeps the existing name.
        assert_eq!(&*registry.register::<Box<Account>>().unwrap(), "account");
        assert_eq!(registry.kind_of("account"), Some(Kind::Pointer));
    }

    #[test]
    fn test_tag_conflict() {
        let registry = TypeRegistry::new();
        registry.register_as::<Box<Account>>("user").unwrap();

        let err = registry.register_as::<Box<Other>>("user").unwrap_err();
        assert!(matches!(err, CodecError::TagConflict { .. }));

        let err = registry.register_as::<Box<Account>>("renamed").unwrap_err();
        assert!(matches!(err, CodecError::TagConflict { .. }));
    }

    #[test]
    fn test_opaque_rejected() {
        let registry = TypeRegistry::new();
        let err = registry.register::<Handle>().unwrap_err();
        assert!(matches!(err, CodecError::UnhandledType { .. }));
        assert!(!registry.is_registered::<Handle>());
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = TypeRegistry::new();
        let before = registry.len();

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    registry.register::<HashMap<String, i64>>().unwrap();
                    registry.register::<Vec<String>>().unwrap();
                    registry.register::<Arc<Account>>().unwrap();
                });
            }
        });

        assert_eq!(registry.len(), before + 3);
    }

    #[test]
    fn test_global_is_shared() {
        let a = TypeRegistry::global();
        let b = TypeRegistry::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
