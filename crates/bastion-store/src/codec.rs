//! Mapping from Rust value types to container storage kinds.
//!
//! Every property value type resolves to exactly one [`Codec`], which pairs
//! the caller-facing [`ValueType`] with the [`PrimitiveType`] the backing
//! container stores. Resolution is a static type match on [`TypeId`]:
//! owned, boxed and borrowed forms of the same shape (`Vec<i32>`,
//! `Box<[i32]>`, `[i32]`) normalize to the same codec, and any type not in
//! the table is rejected with [`StoreError::UnsupportedType`].
//!
//! | Value type | Rust types | Stored as |
//! |------------|------------|-----------|
//! | Byte | `i8` | Byte |
//! | Short | `i16` | Short |
//! | Integer | `i32` | Integer |
//! | Long | `i64` | Long |
//! | Float | `f32` | Float |
//! | Double | `f64` | Double |
//! | Boolean | `bool` | Byte (0 / 1) |
//! | Character | `char` | Integer (code point) |
//! | String | `String`, `Box<str>`, `str` | String |
//! | `ByteArray` | `Vec<i8>`, `Box<[i8]>`, `[i8]` | `ByteArray` |
//! | `IntegerArray` | `Vec<i32>`, `Box<[i32]>`, `[i32]` | `IntegerArray` |
//! | `LongArray` | `Vec<i64>`, `Box<[i64]>`, `[i64]` | `LongArray` |

use std::any::TypeId;

use bastion_types::{PrimitiveType, PropertyKey, RawValue};

use crate::error::StoreError;

/// The caller-facing type of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// `i8`.
    Byte,
    /// `i16`.
    Short,
    /// `i32`.
    Integer,
    /// `i64`.
    Long,
    /// `f32`.
    Float,
    /// `f64`.
    Double,
    /// `bool`.
    Boolean,
    /// `char`.
    Character,
    /// Text.
    String,
    /// Sequence of `i8`.
    ByteArray,
    /// Sequence of `i32`.
    IntegerArray,
    /// Sequence of `i64`.
    LongArray,
}

impl ValueType {
    /// The primitive kind this value type is stored as.
    pub const fn primitive(self) -> PrimitiveType {
        match self {
            Self::Byte | Self::Boolean => PrimitiveType::Byte,
            Self::Short => PrimitiveType::Short,
            Self::Integer | Self::Character => PrimitiveType::Integer,
            Self::Long => PrimitiveType::Long,
            Self::Float => PrimitiveType::Float,
            Self::Double => PrimitiveType::Double,
            Self::String => PrimitiveType::String,
            Self::ByteArray => PrimitiveType::ByteArray,
            Self::IntegerArray => PrimitiveType::IntegerArray,
            Self::LongArray => PrimitiveType::LongArray,
        }
    }
}

/// A resolved (value type, primitive type) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Codec {
    value: ValueType,
    primitive: PrimitiveType,
}

impl Codec {
    /// The codec for a known value type.
    pub const fn of(value: ValueType) -> Self {
        Self {
            value,
            primitive: value.primitive(),
        }
    }

    /// Resolve the codec for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedType`] if `T` has no mapping.
    pub fn resolve<T: ?Sized + 'static>() -> Result<Self, StoreError> {
        normalize(TypeId::of::<T>())
            .map(Self::of)
            .ok_or(StoreError::UnsupportedType {
                type_name: std::any::type_name::<T>(),
            })
    }

    /// The caller-facing value type.
    pub const fn value_type(self) -> ValueType {
        self.value
    }

    /// The primitive kind the container stores.
    pub const fn primitive(self) -> PrimitiveType {
        self.primitive
    }
}

/// Look up the value type for a [`TypeId`], folding equivalent forms.
fn normalize(id: TypeId) -> Option<ValueType> {
    macro_rules! table {
        ($($($ty:ty)|+ => $value:ident),+ $(,)?) => {
            $(
                if $(id == TypeId::of::<$ty>() ||)+ false {
                    return Some(ValueType::$value);
                }
            )+
        };
    }

    table! {
        i8 => Byte,
        i16 => Short,
        i32 => Integer,
        i64 => Long,
        f32 => Float,
        f64 => Double,
        bool => Boolean,
        char => Character,
        String | Box<str> | str => String,
        Vec<i8> | Box<[i8]> | [i8] => ByteArray,
        Vec<i32> | Box<[i32]> | [i32] => IntegerArray,
        Vec<i64> | Box<[i64]> | [i64] => LongArray,
    }

    None
}

// ---------------------------------------------------------------------------
// Persistable
// ---------------------------------------------------------------------------

/// A value type that can be held by a persistent property.
///
/// The default [`codec`](Persistable::codec) resolves through the static
/// table above. A domain type can override it to ride on an existing
/// storage kind, as long as [`to_raw`](Persistable::to_raw) produces that
/// kind.
pub trait Persistable: Clone + Send + Sync + 'static {
    /// The codec this type is stored with.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedType`] when no mapping exists.
    fn codec() -> Result<Codec, StoreError> {
        Codec::resolve::<Self>()
    }

    /// Encode into the container representation.
    fn to_raw(&self) -> RawValue;

    /// Decode from the container representation. `None` if the raw value
    /// does not describe a valid `Self`.
    fn from_raw(raw: RawValue) -> Option<Self>;

    /// Whether this value is blank text. Only textual types return `true`.
    fn is_blank(&self) -> bool {
        false
    }
}

macro_rules! persist_direct {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl Persistable for $ty {
                fn to_raw(&self) -> RawValue {
                    RawValue::$variant(Clone::clone(self))
                }

                fn from_raw(raw: RawValue) -> Option<Self> {
                    match raw {
                        RawValue::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )+
    };
}

persist_direct! {
    i8 => Byte,
    i16 => Short,
    i32 => Integer,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    Vec<i8> => ByteArray,
    Vec<i32> => IntegerArray,
    Vec<i64> => LongArray,
}

impl Persistable for String {
    fn to_raw(&self) -> RawValue {
        RawValue::String(self.clone())
    }

    fn from_raw(raw: RawValue) -> Option<Self> {
        match raw {
            RawValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl Persistable for bool {
    fn to_raw(&self) -> RawValue {
        RawValue::Byte(i8::from(*self))
    }

    fn from_raw(raw: RawValue) -> Option<Self> {
        match raw {
            RawValue::Byte(b) => Some(b != 0),
            _ => None,
        }
    }
}

impl Persistable for char {
    fn to_raw(&self) -> RawValue {
        // Code points are at most 0x10FFFF.
        #[allow(clippy::cast_possible_wrap)]
        let code = u32::from(*self) as i32;
        RawValue::Integer(code)
    }

    fn from_raw(raw: RawValue) -> Option<Self> {
        match raw {
            RawValue::Integer(i) => u32::try_from(i).ok().and_then(Self::from_u32),
            _ => None,
        }
    }
}

/// Decode `raw` read from `key` into `T`, checking it against `codec`.
pub(crate) fn decode<T: Persistable>(
    key: &PropertyKey,
    codec: Codec,
    raw: RawValue,
) -> Result<T, StoreError> {
    let found = raw.primitive_type();
    if found != codec.primitive() {
        return Err(StoreError::TypeMismatch {
            key: key.to_string(),
            expected: codec.primitive(),
            found,
        });
    }
    T::from_raw(raw).ok_or_else(|| StoreError::InvalidStoredValue {
        key: key.to_string(),
        value_type: std::any::type_name::<T>(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use bastion_types::Namespace;

    use super::*;

    fn key() -> PropertyKey {
        Namespace::new("test").unwrap().key("value").unwrap()
    }

    #[test]
    fn scalars_resolve_to_their_codec() {
        let codec = Codec::resolve::<f64>().unwrap();
        assert_eq!(codec.value_type(), ValueType::Double);
        assert_eq!(codec.primitive(), PrimitiveType::Double);
    }

    #[test]
    fn array_forms_normalize_to_one_codec() {
        let owned = Codec::resolve::<Vec<i32>>().unwrap();
        assert_eq!(owned, Codec::resolve::<Box<[i32]>>().unwrap());
        assert_eq!(owned, Codec::resolve::<[i32]>().unwrap());
        assert_eq!(owned.primitive(), PrimitiveType::IntegerArray);
    }

    #[test]
    fn text_forms_normalize_to_one_codec() {
        let owned = Codec::resolve::<String>().unwrap();
        assert_eq!(owned, Codec::resolve::<str>().unwrap());
        assert_eq!(owned, Codec::resolve::<Box<str>>().unwrap());
    }

    #[test]
    fn char_and_bool_ride_on_integer_kinds() {
        let c = Codec::resolve::<char>().unwrap();
        assert_eq!(c.value_type(), ValueType::Character);
        assert_eq!(c.primitive(), PrimitiveType::Integer);

        let b = Codec::resolve::<bool>().unwrap();
        assert_eq!(b.primitive(), PrimitiveType::Byte);
    }

    #[test]
    fn unsupported_types_are_rejected() {
        assert!(matches!(
            Codec::resolve::<u64>(),
            Err(StoreError::UnsupportedType { .. })
        ));
        assert!(Codec::resolve::<Vec<f64>>().is_err());
        assert!(Codec::resolve::<HashMap<String, i32>>().is_err());
    }

    #[test]
    fn unsupported_error_names_the_type() {
        let err = Codec::resolve::<u64>().unwrap_err();
        assert_eq!(err.to_string(), "no codec registered for type u64");
    }

    #[test]
    fn char_round_trips_through_integer() {
        let raw = 'é'.to_raw();
        assert_eq!(raw, RawValue::Integer(0xE9));
        assert_eq!(char::from_raw(raw), Some('é'));
    }

    #[test]
    fn bool_round_trips_through_byte() {
        assert_eq!(true.to_raw(), RawValue::Byte(1));
        assert_eq!(bool::from_raw(RawValue::Byte(0)), Some(false));
    }

    #[test]
    fn decode_reports_type_mismatch() {
        let key = key();
        let codec = Codec::of(ValueType::Double);
        let result = decode::<f64>(&key, codec, RawValue::String(String::from("1.0")));
        assert!(matches!(
            result,
            Err(StoreError::TypeMismatch {
                expected: PrimitiveType::Double,
                found: PrimitiveType::String,
                ..
            })
        ));
    }

    #[test]
    fn decode_reports_invalid_code_point() {
        let key = key();
        let codec = Codec::of(ValueType::Character);
        let result = decode::<char>(&key, codec, RawValue::Integer(-1));
        assert!(matches!(result, Err(StoreError::InvalidStoredValue { .. })));
    }

    #[test]
    fn blank_only_applies_to_text() {
        assert!(String::from("   ").is_blank());
        assert!(String::new().is_blank());
        assert!(!String::from("x").is_blank());
        assert!(!0_i32.is_blank());
    }

    /// A domain type stored on an existing kind.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Coins(i64);

    impl Persistable for Coins {
        fn codec() -> Result<Codec, StoreError> {
            Ok(Codec::of(ValueType::Long))
        }

        fn to_raw(&self) -> RawValue {
            RawValue::Long(self.0)
        }

        fn from_raw(raw: RawValue) -> Option<Self> {
            i64::from_raw(raw).map(Self)
        }
    }

    #[test]
    fn custom_type_can_override_codec() {
        assert!(Codec::resolve::<Coins>().is_err());
        assert_eq!(Coins::codec().unwrap().primitive(), PrimitiveType::Long);
        assert_eq!(Coins::from_raw(Coins(9).to_raw()), Some(Coins(9)));
    }
}
