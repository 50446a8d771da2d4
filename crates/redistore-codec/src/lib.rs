//! Type-preserving value codec for redistore.
//!
//! Session fields hold values of arbitrary application types. This crate
//! turns such values into self-describing bytes and back without the reader
//! naming the type up front:
//! - [`Storable`] marks a type as storable and declares its [`Kind`]
//! - [`TypeRegistry`] maps type tags to decoders (process-wide, append-only)
//! - [`Codec`] writes a tagged envelope and rebuilds a [`Value`] of the
//!   original concrete type on decode
//!
//! # Example
//!
//! ```rust,ignore
//! use redistore_codec::{Codec, Storable, TypeRegistry};
//!
//! #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
//! struct User { id: i64, name: String }
//! impl Storable for User {}
//!
//! let codec = Codec::new(TypeRegistry::global());
//! let bytes = codec.encode(&Box::new(User { id: 1, name: "alice".into() }))?;
//! let value = codec.decode(&bytes)?;
//! assert_eq!(value.downcast_ref::<Box<User>>().unwrap().name, "alice");
//! ```

mod codec;
mod error;
mod kind;
mod registry;
mod repr;
mod value;

pub use codec::{Codec, CodecConfig};
pub use error::{CodecError, Result};
pub use kind::{Kind, Storable};
pub use registry::{Tag, TypeRegistry};
pub use value::Value;
