//! Primitive storage kinds and the raw values a backing container holds.
//!
//! A backing container only understands a small closed set of primitive
//! shapes. Richer value types (booleans, characters) are mapped onto these
//! by the codec layer in `bastion-store`.

use serde::{Deserialize, Serialize};

/// The primitive storage kind of a value inside a backing container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveType {
    /// Signed 8-bit integer.
    Byte,
    /// Signed 16-bit integer.
    Short,
    /// Signed 32-bit integer.
    Integer,
    /// Signed 64-bit integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// UTF-8 string.
    String,
    /// Array of signed 8-bit integers.
    ByteArray,
    /// Array of signed 32-bit integers.
    IntegerArray,
    /// Array of signed 64-bit integers.
    LongArray,
}

impl core::fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Integer => "integer",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::ByteArray => "byte_array",
            Self::IntegerArray => "integer_array",
            Self::LongArray => "long_array",
        };
        f.write_str(name)
    }
}

/// A value as stored in a backing container.
///
/// The variant is the primitive type; containers persist it as-is (the
/// Dragonfly backend stores the serde representation as JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RawValue {
    /// Signed 8-bit integer.
    Byte(i8),
    /// Signed 16-bit integer.
    Short(i16),
    /// Signed 32-bit integer.
    Integer(i32),
    /// Signed 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Array of signed 8-bit integers.
    ByteArray(Vec<i8>),
    /// Array of signed 32-bit integers.
    IntegerArray(Vec<i32>),
    /// Array of signed 64-bit integers.
    LongArray(Vec<i64>),
}

impl RawValue {
    /// The primitive storage kind of this value.
    pub const fn primitive_type(&self) -> PrimitiveType {
        match self {
            Self::Byte(_) => PrimitiveType::Byte,
            Self::Short(_) => PrimitiveType::Short,
            Self::Integer(_) => PrimitiveType::Integer,
            Self::Long(_) => PrimitiveType::Long,
            Self::Float(_) => PrimitiveType::Float,
            Self::Double(_) => PrimitiveType::Double,
            Self::String(_) => PrimitiveType::String,
            Self::ByteArray(_) => PrimitiveType::ByteArray,
            Self::IntegerArray(_) => PrimitiveType::IntegerArray,
            Self::LongArray(_) => PrimitiveType::LongArray,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn primitive_type_matches_variant() {
        assert_eq!(RawValue::Double(1.5).primitive_type(), PrimitiveType::Double);
        assert_eq!(
            RawValue::IntegerArray(vec![1, 2]).primitive_type(),
            PrimitiveType::IntegerArray
        );
        assert_eq!(
            RawValue::String(String::from("x")).primitive_type(),
            PrimitiveType::String
        );
    }

    #[test]
    fn json_shape_is_tagged() {
        let json = serde_json::to_string(&RawValue::Long(7)).unwrap();
        assert_eq!(json, r#"{"type":"long","value":7}"#);
    }
}
