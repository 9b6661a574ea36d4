//! Error types for the wire codec and the descriptor resolver.

use core::fmt;

/// Reasons a field key can be rejected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InvalidKeyReason {
    /// The field number component was zero.
    ZeroFieldNumber,
    /// The field number component exceeded `2^29 - 1`.
    FieldNumberOutOfRange,
    /// The buffer ended before a key could be read.
    EmptyBuffer,
}

impl InvalidKeyReason {
    fn as_str(self) -> &'static str {
        match self {
            InvalidKeyReason::ZeroFieldNumber => "field number is zero",
            InvalidKeyReason::FieldNumberOutOfRange => "field number out of range",
            InvalidKeyReason::EmptyBuffer => "empty buffer",
        }
    }
}

/// Kinds of failure that can occur while decoding wire data.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeErrorKind {
    /// Input ended in the middle of a field.
    Truncated,
    /// A varint ran past 10 bytes or a value did not fit its target type.
    Overflow,
    /// A wire type incompatible with the declared field kind and not
    /// reinterpretable under packed/unpacked compatibility.
    InvalidWireType { value: u8 },
    /// A field key with a zero or out-of-range field number.
    InvalidTag { reason: InvalidKeyReason },
    /// A proto3 string field carried invalid UTF-8.
    InvalidUtf8 { field: String },
    /// Nested messages exceeded the recursion limit.
    RecursionDepthExceeded,
    /// A group field was opened but its end tag never arrived, or an end
    /// tag arrived with a mismatched field number.
    UnbalancedGroup,
    /// The decoded message left a proto2 required field unset.
    RequiredNotSet { field: String },
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeErrorKind::Truncated => {
                write!(f, "unexpected end of buffer")
            }
            DecodeErrorKind::Overflow => {
                write!(f, "variable-length integer overflow")
            }
            DecodeErrorKind::InvalidWireType { value } => {
                write!(f, "invalid 'wire type' value: {value}")
            }
            DecodeErrorKind::InvalidTag { reason } => {
                write!(f, "invalid field key: {}", reason.as_str())
            }
            DecodeErrorKind::InvalidUtf8 { field } => {
                write!(f, "invalid UTF-8 in string field '{field}'")
            }
            DecodeErrorKind::RecursionDepthExceeded => {
                write!(f, "message nesting exceeds the recursion limit")
            }
            DecodeErrorKind::UnbalancedGroup => {
                write!(f, "group field not terminated by a matching end tag")
            }
            DecodeErrorKind::RequiredNotSet { field } => {
                write!(f, "required field '{field}' not set")
            }
        }
    }
}

/// An error produced while decoding wire-format data.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    kind: DecodeErrorKind,
}

impl DecodeError {
    pub fn kind(&self) -> &DecodeErrorKind {
        &self.kind
    }

    #[cold]
    pub(crate) fn truncated() -> Self {
        DecodeErrorKind::Truncated.into()
    }

    #[cold]
    pub(crate) fn overflow() -> Self {
        DecodeErrorKind::Overflow.into()
    }

    #[cold]
    pub(crate) fn invalid_wire_type(value: u8) -> Self {
        DecodeErrorKind::InvalidWireType { value }.into()
    }

    #[cold]
    pub(crate) fn invalid_tag(reason: InvalidKeyReason) -> Self {
        DecodeErrorKind::InvalidTag { reason }.into()
    }

    #[cold]
    pub(crate) fn invalid_utf8(field: &str) -> Self {
        DecodeErrorKind::InvalidUtf8 {
            field: field.to_owned(),
        }
        .into()
    }

    #[cold]
    pub(crate) fn recursion_depth_exceeded() -> Self {
        DecodeErrorKind::RecursionDepthExceeded.into()
    }

    #[cold]
    pub(crate) fn unbalanced_group() -> Self {
        DecodeErrorKind::UnbalancedGroup.into()
    }

    #[cold]
    pub(crate) fn required_not_set(field: String) -> Self {
        DecodeErrorKind::RequiredNotSet { field }.into()
    }
}

impl From<DecodeErrorKind> for DecodeError {
    fn from(kind: DecodeErrorKind) -> Self {
        DecodeError { kind }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to decode protobuf message: {}", self.kind)
    }
}

impl std::error::Error for DecodeError {}

/// An error produced while encoding a message.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeError {
    /// A proto2 required field was not populated. Carries the full name of
    /// the missing field.
    RequiredNotSet { field: String },
    /// Nested messages exceeded the recursion limit.
    RecursionDepthExceeded,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::RequiredNotSet { field } => {
                write!(f, "required field '{field}' not set")
            }
            EncodeError::RecursionDepthExceeded => {
                write!(f, "message nesting exceeds the recursion limit")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

/// A strict accessor was called on a [`Value`](crate::value::Value) of a
/// different kind, or a reflective setter received a wrong-kind value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WrongKindError {
    pub expected: &'static str,
    pub actual: &'static str,
}

impl fmt::Display for WrongKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected a {} value, found {}", self.expected, self.actual)
    }
}

impl std::error::Error for WrongKindError {}

/// An error raised while resolving a `FileDescriptorProto` into a linked
/// [`FileDescriptor`](crate::descriptor::FileDescriptor).
///
/// Resolver failures are terminal and descriptive; callers match on the
/// message, not on structure.
#[derive(Debug, Clone)]
pub struct DescriptorError {
    message: String,
}

impl DescriptorError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        DescriptorError {
            message: message.into(),
        }
    }
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid descriptor: {}", self.message)
    }
}

impl std::error::Error for DescriptorError {}

impl From<DecodeError> for DescriptorError {
    fn from(e: DecodeError) -> Self {
        DescriptorError::new(format!("malformed descriptor payload: {e}"))
    }
}
