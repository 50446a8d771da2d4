//! Type families and the [`Storable`] marker trait.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// The family a storable type belongs to.
///
/// The codec uses the family to decide what may be encoded at the top level
/// and what registration must reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Scalars and strings. Always registered.
    Primitive,
    /// Ordered or unordered collections of elements.
    Sequence,
    /// Key/value collections.
    Map,
    /// Owning pointers (`Box`, `Arc`), usually around a struct.
    Pointer,
    /// Plain structs and enums. Only encodable behind a pointer.
    Struct,
    /// Handles without a stable serialized form (channels, callbacks,
    /// sockets). Rejected at registration.
    Opaque,
}

impl Kind {
    /// Whether a value of this family can be encoded at the top level.
    pub fn is_encodable(self) -> bool {
        !matches!(self, Kind::Struct | Kind::Opaque)
    }

    /// Short lowercase name, used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Primitive => "primitive",
            Kind::Sequence => "sequence",
            Kind::Map => "map",
            Kind::Pointer => "pointer",
            Kind::Struct => "struct",
            Kind::Opaque => "opaque",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A type whose values can be stored in a session field.
///
/// Application structs opt in with an empty impl and are then stored behind
/// a `Box` or `Arc`:
///
/// ```rust,ignore
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Cart { items: Vec<String> }
///
/// impl Storable for Cart {}
/// ```
pub trait Storable: Serialize + DeserializeOwned + fmt::Debug + Clone + Send + Sync + 'static {
    /// The family of this type.
    const KIND: Kind = Kind::Struct;
}

macro_rules! primitives {
    ($($t:ty),* $(,)?) => {
        $(
            impl Storable for $t {
                const KIND: Kind = Kind::Primitive;
            }
        )*

        /// Pre-registers every primitive type.
        pub(crate) fn seed_primitives(registry: &crate::TypeRegistry) {
            $( registry.seed::<$t>(); )*
        }
    };
}

primitives!(
    bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, char, String, (),
);

impl<T> Storable for Vec<T>
where
    T: Serialize + DeserializeOwned + fmt::Debug + Clone + Send + Sync + 'static,
{
    const KIND: Kind = Kind::Sequence;
}

impl<T> Storable for VecDeque<T>
where
    T: Serialize + DeserializeOwned + fmt::Debug + Clone + Send + Sync + 'static,
{
    const KIND: Kind = Kind::Sequence;
}

impl<T> Storable for HashSet<T>
where
    T: Serialize + DeserializeOwned + fmt::Debug + Clone + Eq + Hash + Send + Sync + 'static,
{
    const KIND: Kind = Kind::Sequence;
}

impl<T> Storable for BTreeSet<T>
where
    T: Serialize + DeserializeOwned + fmt::Debug + Clone + Ord + Send + Sync + 'static,
{
    const KIND: Kind = Kind::Sequence;
}

impl<K, V> Storable for HashMap<K, V>
where
    K: Serialize + DeserializeOwned + fmt::Debug + Clone + Eq + Hash + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + fmt::Debug + Clone + Send + Sync + 'static,
{
    const KIND: Kind = Kind::Map;
}

impl<K, V> Storable for BTreeMap<K, V>
where
    K: Serialize + DeserializeOwned + fmt::Debug + Clone + Ord + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + fmt::Debug + Clone + Send + Sync + 'static,
{
    const KIND: Kind = Kind::Map;
}

impl<T> Storable for Box<T>
where
    T: Serialize + DeserializeOwned + fmt::Debug + Clone + Send + Sync + 'static,
{
    const KIND: Kind = Kind::Pointer;
}

impl<T> Storable for Arc<T>
where
    T: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static,
{
    const KIND: Kind = Kind::Pointer;
}

/// `None` is the nil value of the wrapped type's family.
///
/// `Some(None)` has no distinct encoding and is rejected by the codec.
impl<T: Storable> Storable for Option<T> {
    const KIND: Kind = T::KIND;
}
