//! The wire codec: size, encode, decode, merge, equal, and the
//! initialization check, all driven by descriptors.
//!
//! Each hot operation has two implementations. The fast path walks the
//! per-type [`MessageInfo`](crate::table::MessageInfo) table of precomputed
//! coder entries; the slow path ranges over fields through the reflective
//! interface alone and exists for the framings the table does not model
//! (message-set) and as the reference the fast path is tested against.

mod decode;
mod encode;
mod equal;
mod init_check;
mod merge;
mod size;

use crate::descriptor::{FieldDescriptor, MessageDescriptor};
use crate::error::{DecodeError, EncodeError};
use crate::message::DynamicMessage;

pub use decode::DecodeOptions;
pub use encode::EncodeOptions;

/// Maximum nesting depth for both encode and decode. Deeper input fails
/// with `RecursionDepthExceeded` rather than overflowing the stack.
pub const RECURSION_LIMIT: usize = 100;

/// Message-set framing: every item is a group under field 1.
pub(crate) const MESSAGE_SET_ITEM_NUMBER: u32 = 1;
/// Message-set framing: the extension number rides as field 2 of the item.
pub(crate) const MESSAGE_SET_TYPE_ID_NUMBER: u32 = 2;
/// Message-set framing: the extension payload rides as field 3 of the item.
pub(crate) const MESSAGE_SET_MESSAGE_NUMBER: u32 = 3;

/// Resolves extension field numbers seen on the wire to extension
/// descriptors. Message-set items resolve their type id through the same
/// lookup.
///
/// Process-global registries are out of scope; implementations carry
/// whatever extensions the caller knows about.
pub trait ExtensionResolver {
    fn find_extension_by_number(
        &self,
        message: &MessageDescriptor,
        number: u32,
    ) -> Option<FieldDescriptor>;
}

/// The empty resolver: every extension lands in unknown fields.
impl ExtensionResolver for () {
    fn find_extension_by_number(
        &self,
        _message: &MessageDescriptor,
        _number: u32,
    ) -> Option<FieldDescriptor> {
        None
    }
}

/// Encode `m` with default options.
pub fn encode(m: &DynamicMessage) -> Result<Vec<u8>, EncodeError> {
    EncodeOptions::default().encode(m)
}

/// The exact length `encode` would produce for `m`.
pub fn encoded_len(m: &DynamicMessage) -> usize {
    EncodeOptions::default().encoded_len(m)
}

/// Decode a message of type `desc` with default options.
pub fn decode(desc: MessageDescriptor, data: &[u8]) -> Result<DynamicMessage, DecodeError> {
    DecodeOptions::default().decode(desc, data)
}

pub use equal::equal;
pub use init_check::check_initialized;
pub use merge::{clone_message, merge};
