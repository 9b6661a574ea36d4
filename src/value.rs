//! The reflective value model: a tagged union covering every kind of field
//! payload, with strict typed accessors.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

use crate::descriptor::Kind;
use crate::error::WrongKindError;
use crate::message::DynamicMessage;

/// An immutable UTF-8 string backed by [`Bytes`].
///
/// Decoded strings alias the owned storage produced by the decoder; strings
/// built from Rust `&str`/`String` copy once. The UTF-8 invariant is
/// enforced at every construction site, so `as_str` never re-validates.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Str(Bytes);

impl Str {
    pub fn as_str(&self) -> &str {
        // Validated during construction.
        unsafe { std::str::from_utf8_unchecked(&self.0) }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn from_utf8(bytes: Bytes) -> Result<Self, ()> {
        match std::str::from_utf8(&bytes) {
            Ok(_) => Ok(Str(bytes)),
            Err(_) => Err(()),
        }
    }

    /// Wrap bytes without checking. Callers run under a policy that allows
    /// invalid UTF-8 to pass through; `as_str` is then unsound to call, so
    /// policy-exempt strings are only ever re-emitted as raw bytes.
    pub(crate) fn from_unchecked(bytes: Bytes) -> Self {
        Str(bytes)
    }
}

impl core::ops::Deref for Str {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for Str {
    fn from(s: &str) -> Self {
        Str(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Str {
    fn from(s: String) -> Self {
        Str(Bytes::from(s.into_bytes()))
    }
}

impl PartialEq<str> for Str {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl fmt::Debug for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A map key. Within one map every key is the same variant; the derived
/// ordering is the canonical deterministic order for that variant: bools
/// `false < true`, integers numeric, strings lexicographic on raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum MapKey {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    String(Str),
}

impl MapKey {
    pub fn kind_name(&self) -> &'static str {
        match self {
            MapKey::Bool(_) => "bool",
            MapKey::I32(_) => "int32",
            MapKey::I64(_) => "int64",
            MapKey::U32(_) => "uint32",
            MapKey::U64(_) => "uint64",
            MapKey::String(_) => "string",
        }
    }

    /// View this key as a [`Value`], for symmetric entry encoding.
    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(v) => Value::Bool(*v),
            MapKey::I32(v) => Value::I32(*v),
            MapKey::I64(v) => Value::I64(*v),
            MapKey::U32(v) => Value::U32(*v),
            MapKey::U64(v) => Value::U64(*v),
            MapKey::String(v) => Value::String(v.clone()),
        }
    }

    /// The inverse of [`MapKey::to_value`], for keys decoded through the
    /// scalar path.
    pub(crate) fn from_value(value: Value) -> Option<MapKey> {
        Some(match value {
            Value::Bool(v) => MapKey::Bool(v),
            Value::I32(v) => MapKey::I32(v),
            Value::I64(v) => MapKey::I64(v),
            Value::U32(v) => MapKey::U32(v),
            Value::U64(v) => MapKey::U64(v),
            Value::String(v) => MapKey::String(v),
            _ => return None,
        })
    }
}

/// A single field payload.
///
/// Numeric variants keep their declared width; `as_int`/`as_uint`/`as_float`
/// widen on read the way the reflection API merges widths. Absence is not a
/// `Value`: unset fields have no value at all.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    /// An enum number; unknown numbers are representable (open enums).
    EnumNumber(i32),
    String(Str),
    Bytes(Bytes),
    Message(Box<DynamicMessage>),
    List(Vec<Value>),
    Map(BTreeMap<MapKey, Value>),
}

macro_rules! strict_accessor {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty, $name:literal) => {
        pub fn $get(&self) -> Result<&$ty, WrongKindError> {
            match self {
                Value::$variant(v) => Ok(v),
                other => Err(WrongKindError {
                    expected: $name,
                    actual: other.kind_name(),
                }),
            }
        }

        pub fn $get_mut(&mut self) -> Result<&mut $ty, WrongKindError> {
            match self {
                Value::$variant(v) => Ok(v),
                other => Err(WrongKindError {
                    expected: $name,
                    actual: other.kind_name(),
                }),
            }
        }
    };
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I32(_) => "int32",
            Value::I64(_) => "int64",
            Value::U32(_) => "uint32",
            Value::U64(_) => "uint64",
            Value::F32(_) => "float",
            Value::F64(_) => "double",
            Value::EnumNumber(_) => "enum",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Message(_) => "message",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// The zero value for a declared kind. Message and group kinds have no
    /// kind-level zero; their empty value needs a descriptor.
    pub fn default_for(kind: Kind) -> Option<Value> {
        Some(match kind {
            Kind::Bool => Value::Bool(false),
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => Value::I32(0),
            Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => Value::I64(0),
            Kind::Uint32 | Kind::Fixed32 => Value::U32(0),
            Kind::Uint64 | Kind::Fixed64 => Value::U64(0),
            Kind::Float => Value::F32(0.0),
            Kind::Double => Value::F64(0.0),
            Kind::Enum => Value::EnumNumber(0),
            Kind::String => Value::String(Str::default()),
            Kind::Bytes => Value::Bytes(Bytes::new()),
            Kind::Message | Kind::Group => return None,
        })
    }

    pub fn as_bool(&self) -> Result<bool, WrongKindError> {
        match self {
            Value::Bool(v) => Ok(*v),
            other => Err(WrongKindError {
                expected: "bool",
                actual: other.kind_name(),
            }),
        }
    }

    /// Any signed integer, widened to `i64`.
    pub fn as_int(&self) -> Result<i64, WrongKindError> {
        match self {
            Value::I32(v) => Ok(i64::from(*v)),
            Value::I64(v) => Ok(*v),
            other => Err(WrongKindError {
                expected: "int",
                actual: other.kind_name(),
            }),
        }
    }

    /// Any unsigned integer, widened to `u64`.
    pub fn as_uint(&self) -> Result<u64, WrongKindError> {
        match self {
            Value::U32(v) => Ok(u64::from(*v)),
            Value::U64(v) => Ok(*v),
            other => Err(WrongKindError {
                expected: "uint",
                actual: other.kind_name(),
            }),
        }
    }

    /// Any floating point value, widened to `f64`.
    pub fn as_float(&self) -> Result<f64, WrongKindError> {
        match self {
            Value::F32(v) => Ok(f64::from(*v)),
            Value::F64(v) => Ok(*v),
            other => Err(WrongKindError {
                expected: "float",
                actual: other.kind_name(),
            }),
        }
    }

    pub fn as_enum(&self) -> Result<i32, WrongKindError> {
        match self {
            Value::EnumNumber(v) => Ok(*v),
            other => Err(WrongKindError {
                expected: "enum",
                actual: other.kind_name(),
            }),
        }
    }

    pub fn as_str(&self) -> Result<&Str, WrongKindError> {
        match self {
            Value::String(v) => Ok(v),
            other => Err(WrongKindError {
                expected: "string",
                actual: other.kind_name(),
            }),
        }
    }

    pub fn as_bytes(&self) -> Result<&Bytes, WrongKindError> {
        match self {
            Value::Bytes(v) => Ok(v),
            other => Err(WrongKindError {
                expected: "bytes",
                actual: other.kind_name(),
            }),
        }
    }

    strict_accessor!(as_message, as_message_mut, Message, Box<DynamicMessage>, "message");
    strict_accessor!(as_list, as_list_mut, List, Vec<Value>, "list");
    strict_accessor!(as_map, as_map_mut, Map, BTreeMap<MapKey, Value>, "map");

    /// Whether this value is the zero value for implicit-presence purposes.
    pub(crate) fn is_default(&self) -> bool {
        match self {
            Value::Bool(v) => !*v,
            Value::I32(v) => *v == 0,
            Value::I64(v) => *v == 0,
            Value::U32(v) => *v == 0,
            Value::U64(v) => *v == 0,
            Value::F32(v) => v.to_bits() == 0,
            Value::F64(v) => v.to_bits() == 0,
            Value::EnumNumber(v) => *v == 0,
            Value::String(v) => v.is_empty(),
            Value::Bytes(v) => v.is_empty(),
            Value::Message(_) => false,
            Value::List(v) => v.is_empty(),
            Value::Map(v) => v.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_accessors() {
        let v = Value::I32(7);
        assert_eq!(v.as_int().unwrap(), 7);
        let err = v.as_str().unwrap_err();
        assert_eq!(err.expected, "string");
        assert_eq!(err.actual, "int32");

        let v = Value::String(Str::from("hi"));
        assert_eq!(v.as_str().unwrap().as_str(), "hi");
        assert!(v.as_bool().is_err());
    }

    #[test]
    fn test_numeric_widening() {
        assert_eq!(Value::I32(-1).as_int().unwrap(), -1i64);
        assert_eq!(Value::U32(7).as_uint().unwrap(), 7u64);
        assert_eq!(Value::F32(0.5).as_float().unwrap(), 0.5f64);
    }

    #[test]
    fn test_map_key_canonical_order() {
        // Numeric, not lexicographic.
        assert!(MapKey::I32(2) < MapKey::I32(10));
        assert!(MapKey::I32(-1) < MapKey::I32(0));
        // Bool: false < true.
        assert!(MapKey::Bool(false) < MapKey::Bool(true));
        // Strings compare on raw bytes.
        assert!(MapKey::String(Str::from("a")) < MapKey::String(Str::from("ab")));
    }

    #[test]
    fn test_default_detection() {
        assert!(Value::I32(0).is_default());
        assert!(!Value::I32(1).is_default());
        assert!(Value::String(Str::default()).is_default());
        // Negative zero floats are NOT the implicit default.
        assert!(!Value::F64(-0.0).is_default());
        assert!(Value::F64(0.0).is_default());
    }
}
