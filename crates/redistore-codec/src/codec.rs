//! Tagged-envelope encoding of storable values.

use std::any::type_name;
use std::borrow::Cow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{CodecError, Result};
use crate::kind::{Kind, Storable};
use crate::registry::{Tag, TypeRegistry};
use crate::value::Value;

/// Wire form of an encoded value: the type tag next to its payload.
#[derive(Serialize, Deserialize)]
struct Envelope<'a> {
    #[serde(rename = "t", borrow)]
    tag: Cow<'a, str>,
    #[serde(rename = "v")]
    payload: serde_json::Value,
}

/// Configuration for a [`Codec`].
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Register unseen types on first encode.
    ///
    /// When disabled, encoding a non-primitive type that was not registered
    /// up front fails with [`CodecError::UnregisteredType`].
    pub auto_register: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            auto_register: true,
        }
    }
}

impl CodecConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable registration on first encode.
    pub fn with_auto_register(mut self, enabled: bool) -> Self {
        self.auto_register = enabled;
        self
    }
}

/// Encodes storable values into self-describing bytes and back.
///
/// Decoding needs no type annotation: the tag in the envelope selects the
/// registered decoder, which rebuilds a [`Value`] of the original type.
#[derive(Debug, Clone)]
pub struct Codec {
    registry: Arc<TypeRegistry>,
    config: CodecConfig,
}

impl Codec {
    /// Create a codec over `registry` with default configuration.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_config(registry, CodecConfig::default())
    }

    /// Create a codec with explicit configuration.
    pub fn with_config(registry: Arc<TypeRegistry>, config: CodecConfig) -> Self {
        Self { registry, config }
    }

    /// The registry backing this codec.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The codec configuration.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Encode a value.
    ///
    /// Structs must be passed behind a `Box` or `Arc`; a bare struct fails
    /// with [`CodecError::TypeNotEncodable`]. Values that would not read back
    /// as themselves (non-finite floats, `Some(None)`) fail with
    /// [`CodecError::Encode`].
    pub fn encode<T: Storable>(&self, value: &T) -> Result<Vec<u8>> {
        let tag = self.resolve_tag::<T>()?;
        crate::repr::check(value)?;
        let payload = serde_json::to_value(value)?;
        let bytes = serde_json::to_vec(&Envelope {
            tag: Cow::Borrowed(&*tag),
            payload,
        })?;

        trace!(tag = %tag, len = bytes.len(), "encoded value");
        Ok(bytes)
    }

    /// Encode a dynamically typed value, under the same rules as [`encode`].
    ///
    /// [`encode`]: Codec::encode
    pub fn encode_value(&self, value: &Value) -> Result<Vec<u8>> {
        value.encode_with(self)
    }

    /// Decode bytes produced by [`encode`] into a value of the original type.
    ///
    /// [`encode`]: Codec::encode
    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        let envelope: Envelope<'_> =
            serde_json::from_slice(bytes).map_err(|e| CodecError::decode(e.to_string()))?;

        let decode = self.registry.decoder(&envelope.tag).ok_or_else(|| {
            CodecError::decode(format!("unknown type tag '{}'", envelope.tag))
        })?;

        let value = decode(envelope.payload).map_err(|e| {
            CodecError::decode(format!("invalid payload for '{}': {e}", envelope.tag))
        })?;

        trace!(tag = %envelope.tag, "decoded value");
        Ok(value)
    }

    /// Decode bytes that are expected to hold a `T`.
    pub fn decode_as<T: Storable>(&self, bytes: &[u8]) -> Result<T> {
        self.decode(bytes)?.downcast::<T>().map_err(|value| {
            CodecError::decode(format!(
                "expected {}, found {}",
                type_name::<T>(),
                value.type_name()
            ))
        })
    }

    fn resolve_tag<T: Storable>(&self) -> Result<Tag> {
        match T::KIND {
            Kind::Struct => {
                return Err(CodecError::TypeNotEncodable {
                    type_name: type_name::<T>(),
                });
            }
            Kind::Opaque => {
                return Err(CodecError::UnhandledType {
                    type_name: type_name::<T>(),
                });
            }
            _ => {}
        }

        if let Some(tag) = self.registry.tag_of::<T>() {
            return Ok(tag);
        }

        if self.config.auto_register || T::KIND == Kind::Primitive {
            self.registry.register::<T>()
        } else {
            Err(CodecError::UnregisteredType {
                type_name: type_name::<T>(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Test {
        id: i64,
        name: String,
    }

    impl Storable for Test {}

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Socket;

    impl Storable for Socket {
        const KIND: Kind = Kind::Opaque;
    }

    fn codec() -> Codec {
        Codec::new(Arc::new(TypeRegistry::new()))
    }

    #[test]
    fn test_roundtrip_primitives() {
        let codec = codec();

        let bytes = codec.encode(&"1".to_string()).unwrap();
        assert_eq!(codec.decode_as::<String>(&bytes).unwrap(), "1");

        let bytes = codec.encode(&-17_i64).unwrap();
        assert_eq!(codec.decode_as::<i64>(&bytes).unwrap(), -17);

        let bytes = codec.encode(&u64::MAX).unwrap();
        assert_eq!(codec.decode_as::<u64>(&bytes).unwrap(), u64::MAX);

        let bytes = codec.encode(&true).unwrap();
        assert!(codec.decode(&bytes).unwrap().is::<bool>());

        let bytes = codec.encode(&1.5_f32).unwrap();
        assert_eq!(codec.decode_as::<f32>(&bytes).unwrap(), 1.5);
    }

    #[test]
    fn test_roundtrip_slice() {
        let codec = codec();
        let original = vec!["1".to_string(), "2".to_string()];

        let bytes = codec.encode(&original).unwrap();
        let value = codec.decode(&bytes).unwrap();

        assert_eq!(value.kind(), Kind::Sequence);
        assert_eq!(value.downcast_ref::<Vec<String>>(), Some(&original));
    }

    #[test]
    fn test_roundtrip_map() {
        let codec = codec();
        let original: HashMap<String, i32> = [("1".to_string(), 1), ("2".to_string(), 2)].into();

        let bytes = codec.encode(&original).unwrap();
        let value = codec.decode(&bytes).unwrap();

        assert_eq!(value.kind(), Kind::Map);
        assert_eq!(value.downcast::<HashMap<String, i32>>().unwrap(), original);
    }

    #[test]
    fn test_roundtrip_integer_keyed_map() {
        let codec = codec();
        let original: BTreeMap<u32, String> = [(1, "one".to_string()), (20, "twenty".to_string())].into();

        let bytes = codec.encode(&original).unwrap();
        assert_eq!(codec.decode_as::<BTreeMap<u32, String>>(&bytes).unwrap(), original);
    }

    #[test]
    fn test_roundtrip_pointer_to_struct() {
        let codec = codec();
        let original = Box::new(Test {
            id: 1,
            name: "xlw".into(),
        });

        // Same field written repeatedly, as a request loop would.
        for _ in 0..3 {
            let bytes = codec.encode(&original).unwrap();
            let value = codec.decode(&bytes).unwrap();

            assert_eq!(value.kind(), Kind::Pointer);
            let decoded = value.downcast::<Box<Test>>().unwrap();
            assert_eq!(*decoded, *original);
        }
    }

    #[test]
    fn test_roundtrip_arc() {
        let codec = codec();
        let original = Arc::new(Test {
            id: 9,
            name: "shared".into(),
        });

        let bytes = codec.encode(&original).unwrap();
        let decoded = codec.decode_as::<Arc<Test>>(&bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_roundtrip_nil() {
        let codec = codec();
        let bytes = codec.encode(&Option::<Box<Test>>::None).unwrap();
        let value = codec.decode(&bytes).unwrap();

        assert_eq!(value.kind(), Kind::Pointer);
        assert_eq!(value.downcast::<Option<Box<Test>>>().unwrap(), None);
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let codec = codec();

        let err = codec.encode(&f64::NAN).unwrap_err();
        assert!(matches!(err, CodecError::Encode(_)));

        let err = codec.encode(&vec![1.0, f64::INFINITY]).unwrap_err();
        assert!(matches!(err, CodecError::Encode(_)));

        let err = codec.encode(&Some(f32::NAN)).unwrap_err();
        assert!(matches!(err, CodecError::Encode(_)));
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        value: f64,
    }

    impl Storable for Sample {}

    #[test]
    fn test_non_finite_field_behind_pointer_rejected() {
        let codec = codec();
        let err = codec
            .encode(&Box::new(Sample { value: f64::NEG_INFINITY }))
            .unwrap_err();
        assert!(matches!(err, CodecError::Encode(_)));

        let bytes = codec.encode(&Box::new(Sample { value: 0.5 })).unwrap();
        assert_eq!(codec.decode_as::<Box<Sample>>(&bytes).unwrap().value, 0.5);
    }

    #[test]
    fn test_nested_option_none_rejected() {
        let codec = codec();
        let err = codec.encode(&Some(None::<i32>)).unwrap_err();
        assert!(matches!(err, CodecError::Encode(_)));
    }

    #[test]
    fn test_nested_option_roundtrip() {
        let codec = codec();

        let bytes = codec.encode(&Some(Some(3_i32))).unwrap();
        assert_eq!(codec.decode_as::<Option<Option<i32>>>(&bytes).unwrap(), Some(Some(3)));

        let bytes = codec.encode(&None::<Option<i32>>).unwrap();
        assert_eq!(codec.decode_as::<Option<Option<i32>>>(&bytes).unwrap(), None);
    }

    #[test]
    fn test_encode_value_matches_encode() {
        let codec = codec();
        let typed = codec.encode(&vec![1_i32, 2, 3]).unwrap();
        let erased = codec.encode_value(&Value::new(vec![1_i32, 2, 3])).unwrap();
        assert_eq!(typed, erased);
    }

    #[test]
    fn test_struct_by_value_rejected() {
        let codec = codec();
        let err = codec
            .encode(&Test {
                id: 1,
                name: "x".into(),
            })
            .unwrap_err();
        assert!(matches!(err, CodecError::TypeNotEncodable { .. }));

        let err = codec
            .encode_value(&Value::new(Test {
                id: 1,
                name: "x".into(),
            }))
            .unwrap_err();
        assert!(matches!(err, CodecError::TypeNotEncodable { .. }));
    }

    #[test]
    fn test_opaque_rejected() {
        let codec = codec();
        let err = codec.encode(&Socket).unwrap_err();
        assert!(matches!(err, CodecError::UnhandledType { .. }));
    }

    #[test]
    fn test_unregistered_without_auto_register() {
        let registry = Arc::new(TypeRegistry::new());
        let codec = Codec::with_config(
            Arc::clone(&registry),
            CodecConfig::new().with_auto_register(false),
        );

        let err = codec.encode(&vec!["a".to_string()]).unwrap_err();
        assert!(matches!(err, CodecError::UnregisteredType { .. }));

        // Primitives never need registration.
        assert!(codec.encode(&"a".to_string()).is_ok());

        registry.register::<Vec<String>>().unwrap();
        assert!(codec.encode(&vec!["a".to_string()]).is_ok());
    }

    #[test]
    fn test_registration_idempotent_for_encoding() {
        let registry = Arc::new(TypeRegistry::new());
        let codec = Codec::new(Arc::clone(&registry));

        registry.register::<Box<Test>>().unwrap();
        let first = codec.encode(&Box::new(Test { id: 1, name: "a".into() })).unwrap();
        registry.register::<Box<Test>>().unwrap();
        let second = codec.encode(&Box::new(Test { id: 1, name: "a".into() })).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_decode_garbage() {
        let codec = codec();
        let err = codec.decode(b"\x00\xffnot an envelope").unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_decode_truncated() {
        let codec = codec();
        let bytes = codec.encode(&vec![1_u8, 2, 3]).unwrap();
        let err = codec.decode(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_decode_unknown_tag() {
        let producer = codec();
        let bytes = producer.encode(&Box::new(Test { id: 1, name: "a".into() })).unwrap();

        // A fresh registry has never seen Box<Test>.
        let consumer = codec();
        let err = consumer.decode(&bytes).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_decode_payload_mismatch() {
        let codec = codec();
        let err = codec.decode(br#"{"t":"i64","v":"not a number"}"#).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_decode_as_wrong_type() {
        let codec = codec();
        let bytes = codec.encode(&42_i64).unwrap();
        let err = codec.decode_as::<String>(&bytes).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_stable_name_across_registries() {
        let producer_registry = Arc::new(TypeRegistry::new());
        producer_registry.register_as::<Box<Test>>("test.v1").unwrap();
        let producer = Codec::new(producer_registry);

        let consumer_registry = Arc::new(TypeRegistry::new());
        consumer_registry.register_as::<Box<Test>>("test.v1").unwrap();
        let consumer = Codec::new(consumer_registry);

        let bytes = producer.encode(&Box::new(Test { id: 3, name: "c".into() })).unwrap();
        let decoded = consumer.decode_as::<Box<Test>>(&bytes).unwrap();
        assert_eq!(decoded.id, 3);
    }
}
