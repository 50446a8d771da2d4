//! Dynamically typed session values.

use std::any::{Any, TypeId, type_name};
use std::fmt;

use crate::codec::Codec;
use crate::error::Result;
use crate::kind::{Kind, Storable};

/// Object-safe view of a [`Storable`] value.
trait Erased: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn clone_box(&self) -> Box<dyn Erased>;
    fn kind(&self) -> Kind;
    fn type_name(&self) -> &'static str;
    fn encode_with(&self, codec: &Codec) -> Result<Vec<u8>>;
}

impl<T: Storable> Erased for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_box(&self) -> Box<dyn Erased> {
        Box::new(self.clone())
    }

    fn kind(&self) -> Kind {
        T::KIND
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn encode_with(&self, codec: &Codec) -> Result<Vec<u8>> {
        codec.encode::<T>(self)
    }
}

/// A session field value whose concrete type is only known at runtime.
///
/// Values come out of [`Codec::decode`] carrying the exact type that was
/// encoded: a stored `Box<User>` decodes to a `Value` that downcasts to
/// `Box<User>`, a `HashMap<String, i32>` to that same map type.
pub struct Value {
    inner: Box<dyn Erased>,
}

impl Value {
    /// Wrap a storable value.
    pub fn new<T: Storable>(value: T) -> Self {
        Self {
            inner: Box::new(value),
        }
    }

    /// The family of the wrapped value.
    pub fn kind(&self) -> Kind {
        self.inner.kind()
    }

    /// Rust name of the wrapped type.
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    /// Whether the wrapped value is a `T`.
    pub fn is<T: Storable>(&self) -> bool {
        self.inner.as_any().type_id() == TypeId::of::<T>()
    }

    /// Borrow the wrapped value as a `T`.
    pub fn downcast_ref<T: Storable>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Take the wrapped value as a `T`, or get the `Value` back unchanged.
    pub fn downcast<T: Storable>(self) -> std::result::Result<T, Value> {
        if !self.is::<T>() {
            return Err(self);
        }
        match self.inner.into_any().downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(_) => unreachable!("type id checked above"),
        }
    }

    pub(crate) fn encode_with(&self, codec: &Codec) -> Result<Vec<u8>> {
        self.inner.encode_with(codec)
    }
}

impl Clone for Value {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("type", &self.type_name())
            .field("value", &self.inner)
            .finish()
    }
}

impl<T: Storable> From<T> for Value {
    fn from(value: T) -> Self {
        Value::new(value)
    }
}
