//! An ordered registry of resolved files, keyed by path, with full-name
//! lookup across every registered declaration.

use indexmap::IndexMap;

use crate::codec::ExtensionResolver;
use crate::descriptor::resolve::DescriptorSource;
use crate::descriptor::{AnyDescriptor, FieldDescriptor, FileDescriptor, MessageDescriptor};
use crate::error::DescriptorError;

/// A set of resolved files. Registration order is preserved; paths and
/// declaration full names are unique across the whole registry.
#[derive(Default, Clone)]
pub struct FileRegistry {
    files: IndexMap<String, FileDescriptor>,
}

impl FileRegistry {
    pub fn new() -> Self {
        FileRegistry::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Registered files, in registration order.
    pub fn files(&self) -> impl ExactSizeIterator<Item = &FileDescriptor> {
        self.files.values()
    }

    /// Add a resolved file. Fails when the path or any declared full name
    /// is already taken.
    pub fn register_file(&mut self, file: FileDescriptor) -> Result<(), DescriptorError> {
        if self.files.contains_key(file.path()) {
            return Err(DescriptorError::new(format!(
                "file {:?} is already registered",
                file.path()
            )));
        }
        for name in file.inner.symbols.keys() {
            if let Some(existing) = self.find_file_of_symbol(name) {
                return Err(DescriptorError::new(format!(
                    "conflicting declaration {:?}: already declared in {:?}",
                    name,
                    existing.path()
                )));
            }
        }
        self.files.insert(file.path().to_owned(), file);
        Ok(())
    }

    pub fn find_file_by_path(&self, path: &str) -> Option<&FileDescriptor> {
        self.files.get(path)
    }

    /// Look up any declaration across all registered files.
    pub fn find_descriptor_by_name(&self, full_name: &str) -> Option<AnyDescriptor> {
        self.find_file_of_symbol(full_name)
            .and_then(|file| file.descriptor_by_name(full_name))
    }

    /// Convenience lookup returning only message declarations.
    pub fn find_message_by_name(&self, full_name: &str) -> Option<MessageDescriptor> {
        match self.find_descriptor_by_name(full_name)? {
            AnyDescriptor::Message(m) => Some(m),
            _ => None,
        }
    }

    fn find_file_of_symbol(&self, full_name: &str) -> Option<&FileDescriptor> {
        self.files
            .values()
            .find(|file| file.inner.symbols.contains_key(full_name))
    }
}

/// Extension lookup over every extension declared in registered files,
/// nested declarations included.
impl ExtensionResolver for FileRegistry {
    fn find_extension_by_number(
        &self,
        message: &MessageDescriptor,
        number: u32,
    ) -> Option<FieldDescriptor> {
        for file in self.files.values() {
            for (index, ext) in file.inner.extensions.iter().enumerate() {
                if ext.number != number {
                    continue;
                }
                let field = FieldDescriptor::extension(file.clone(), index as u32);
                if field.containing_message().as_ref() == Some(message) {
                    return Some(field);
                }
            }
        }
        None
    }
}

impl DescriptorSource for FileRegistry {
    fn find_file_by_path(&self, path: &str) -> Option<FileDescriptor> {
        FileRegistry::find_file_by_path(self, path).cloned()
    }

    fn find_descriptor_by_name(&self, full_name: &str) -> Option<AnyDescriptor> {
        FileRegistry::find_descriptor_by_name(self, full_name)
    }
}

impl std::fmt::Debug for FileRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.files.keys()).finish()
    }
}
