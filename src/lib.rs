//! A descriptor-driven Protocol Buffers runtime.
//!
//! `protoflect` marshals, unmarshals, sizes, merges, and compares messages
//! whose schemas are resolved at load time from `FileDescriptorProto`
//! payloads. There is no generated code: [`DynamicMessage`] stores values
//! reflectively, and a per-type dispatch table built on first use drives
//! the hot codec paths.
//!
//! ```no_run
//! use protoflect::descriptor::{proto::FileDescriptorSetProto, FileOptions};
//! use protoflect::DynamicMessage;
//!
//! # fn run(bytes: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let set = FileDescriptorSetProto::decode(bytes)?;
//! let registry = FileOptions::default().new_files(&set)?;
//! let file = registry.find_file_by_path("example.proto").unwrap();
//! let desc = file.messages().next().unwrap();
//!
//! let m = DynamicMessage::new(desc);
//! let encoded = m.encode_to_vec()?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod descriptor;
pub mod error;
pub mod message;
pub mod value;
pub mod varint;
pub mod wire;

mod table;

pub use codec::{
    check_initialized, clone_message, decode, encode, encoded_len, equal, merge, DecodeOptions,
    EncodeOptions, ExtensionResolver,
};
pub use message::DynamicMessage;
pub use value::{MapKey, Str, Value};
