//! Resolution of a self-describing `FileDescriptorProto` into a linked
//! [`FileDescriptor`].
//!
//! Resolution runs in three passes:
//!
//! 1. **Declare** — allocate every message, field, enum, oneof, extension,
//!    service and method, deriving full names and catching duplicate
//!    declarations. Cross-reference data (type names, defaults, extendees,
//!    method types) is left untouched.
//! 2. **Resolve** — chase every reference: the local declaration tree
//!    first, then the provided [`DescriptorSource`] restricted to the
//!    file's import closure (public imports transit). A miss is an error
//!    unless unresolvable references are allowed, in which case a named
//!    placeholder is substituted; relative names gain a `*.` prefix to
//!    mark the unknown leading segments.
//! 3. **Validate** — range sanity, collision checks, oneof member shape,
//!    map-entry shape, message-set shape, proto3 restrictions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;

use crate::descriptor::proto::{
    DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    FileDescriptorSetProto, OneofDescriptorProto, ServiceDescriptorProto,
};
use crate::descriptor::ranges::{EnumRanges, FieldRanges, Names};
use crate::descriptor::registry::FileRegistry;
use crate::descriptor::{
    AnyDescriptor, Cardinality, EnumInner, FieldInner, FileDescriptor, FileImport, FileInner,
    Kind, MessageInner, MethodInner, OneofInner, ServiceInner, SourceLocation, Symbol, Syntax,
    TypeRef, MAP_ENTRY_KEY_NUMBER, MAP_ENTRY_VALUE_NUMBER,
};
use crate::error::DescriptorError;
use crate::value::{Str, Value};
use crate::wire::{
    FIRST_RESERVED_NUMBER, LAST_RESERVED_NUMBER, MAX_FIELD_NUMBER, MIN_FIELD_NUMBER,
};

/// Where the resolver looks for files and declarations that are not part
/// of the file being resolved. Implemented by [`FileRegistry`].
pub trait DescriptorSource {
    fn find_file_by_path(&self, path: &str) -> Option<FileDescriptor>;
    fn find_descriptor_by_name(&self, full_name: &str) -> Option<AnyDescriptor>;
}

/// The empty source: every lookup misses.
impl DescriptorSource for () {
    fn find_file_by_path(&self, _path: &str) -> Option<FileDescriptor> {
        None
    }

    fn find_descriptor_by_name(&self, _full_name: &str) -> Option<AnyDescriptor> {
        None
    }
}

/// Configures descriptor resolution.
#[derive(Debug, Default, Clone)]
pub struct FileOptions {
    /// Permit unresolvable file, message, and enum dependencies, replacing
    /// them with named placeholders.
    pub allow_unresolvable: bool,
}

/// Resolve one file with default options.
pub fn new_file(
    fd: &FileDescriptorProto,
    source: &dyn DescriptorSource,
) -> Result<FileDescriptor, DescriptorError> {
    FileOptions::default().new_file(fd, source)
}

/// Resolve a whole `FileDescriptorSet` with default options.
pub fn new_files(set: &FileDescriptorSetProto) -> Result<FileRegistry, DescriptorError> {
    FileOptions::default().new_files(set)
}

fn err(message: impl Into<String>) -> DescriptorError {
    DescriptorError::new(message)
}

/// Original protos aligned with the builder's flattened tables, so the
/// resolve pass can read the cross-reference data the declare pass left
/// untouched.
#[derive(Default)]
struct Declared<'a> {
    messages: Vec<&'a DescriptorProto>,
    extensions: Vec<&'a FieldDescriptorProto>,
    services: Vec<&'a ServiceDescriptorProto>,
}

impl FileOptions {
    /// Transform `fd` into a linked [`FileDescriptor`], resolving imports
    /// and cross-file references through `source`. The result is a deep
    /// copy; `fd` is not retained.
    pub fn new_file(
        &self,
        fd: &FileDescriptorProto,
        source: &dyn DescriptorSource,
    ) -> Result<FileDescriptor, DescriptorError> {
        let syntax = match fd.syntax.as_deref() {
            None | Some("") | Some("proto2") => Syntax::Proto2,
            Some("proto3") => Syntax::Proto3,
            Some(other) => return Err(err(format!("invalid syntax: {other:?}"))),
        };

        let path = fd.name.clone().unwrap_or_default();
        if path.is_empty() {
            return Err(err("file path must be populated"));
        }

        let package = fd.package.clone().unwrap_or_default();
        if !package.is_empty() && !is_valid_full_name(&package) {
            return Err(err(format!("invalid package: {package:?}")));
        }

        let imports = self.resolve_imports(fd, source)?;
        let closure = import_closure(&path, &imports);
        let locations = copy_locations(fd)?;

        let mut builder = FileInner {
            path,
            package,
            syntax,
            imports,
            messages: Vec::new(),
            enums: Vec::new(),
            extensions: Vec::new(),
            services: Vec::new(),
            top_messages: Vec::new(),
            top_enums: Vec::new(),
            top_extensions: Vec::new(),
            symbols: HashMap::new(),
            locations,
        };

        // Pass 1: declare everything and derive full names.
        let mut declared = Declared::default();
        declare_file(&mut builder, &mut declared, fd)?;

        // Pass 2: chase references.
        let resolver = Resolver {
            options: self,
            source,
            closure: &closure,
        };
        resolver.resolve_file(&mut builder, &declared)?;

        // Pass 3: validate the linked result.
        validate_file(&builder)?;

        Ok(FileDescriptor {
            inner: Arc::new(builder),
        })
    }

    /// Resolve every file in `set`, ordering by dependency and detecting
    /// import cycles, into a fresh [`FileRegistry`].
    pub fn new_files(&self, set: &FileDescriptorSetProto) -> Result<FileRegistry, DescriptorError> {
        let mut by_path: HashMap<&str, &FileDescriptorProto> = HashMap::new();
        for fd in &set.file {
            let path = fd.name.as_deref().unwrap_or_default();
            if by_path.insert(path, fd).is_some() {
                return Err(err(format!("file appears multiple times: {path:?}")));
            }
        }

        let mut registry = FileRegistry::new();
        let mut states: HashMap<&str, VisitState> = HashMap::new();
        for fd in &set.file {
            self.add_file_deps(fd, &by_path, &mut states, &mut registry)?;
        }
        Ok(registry)
    }

    fn add_file_deps<'a>(
        &self,
        fd: &'a FileDescriptorProto,
        by_path: &HashMap<&'a str, &'a FileDescriptorProto>,
        states: &mut HashMap<&'a str, VisitState>,
        registry: &mut FileRegistry,
    ) -> Result<(), DescriptorError> {
        let path = fd.name.as_deref().unwrap_or_default();
        match states.get(path) {
            Some(VisitState::Done) => return Ok(()),
            // Revisiting a file currently being descended into is a cycle.
            Some(VisitState::Visiting) => {
                return Err(err(format!("import cycle in file: {path:?}")))
            }
            None => {}
        }
        states.insert(path, VisitState::Visiting);
        for dep in &fd.dependency {
            if let Some(&dep_fd) = by_path.get(dep.as_str()) {
                self.add_file_deps(dep_fd, by_path, states, registry)?;
            }
        }
        states.insert(path, VisitState::Done);
        let file = self.new_file(fd, registry)?;
        registry.register_file(file)
    }

    fn resolve_imports(
        &self,
        fd: &FileDescriptorProto,
        source: &dyn DescriptorSource,
    ) -> Result<Vec<FileImport>, DescriptorError> {
        let mut imports: Vec<FileImport> = fd
            .dependency
            .iter()
            .map(|path| FileImport {
                path: path.clone(),
                is_public: false,
                is_weak: false,
                file: None,
            })
            .collect();

        for &i in &fd.public_dependency {
            let import = usize::try_from(i)
                .ok()
                .and_then(|i| imports.get_mut(i))
                .ok_or_else(|| err(format!("invalid public import index: {i}")))?;
            if import.is_public {
                return Err(err(format!("duplicate public import index: {i}")));
            }
            import.is_public = true;
        }
        for &i in &fd.weak_dependency {
            let import = usize::try_from(i)
                .ok()
                .and_then(|i| imports.get_mut(i))
                .ok_or_else(|| err(format!("invalid weak import index: {i}")))?;
            if import.is_weak {
                return Err(err(format!("duplicate weak import index: {i}")));
            }
            import.is_weak = true;
        }

        for import in &mut imports {
            match source.find_file_by_path(&import.path) {
                Some(file) => import.file = Some(file),
                None if self.allow_unresolvable || import.is_weak => {}
                None => {
                    return Err(err(format!("could not resolve import {:?}", import.path)))
                }
            }
        }

        let mut seen: HashSet<&str> = HashSet::new();
        if let Some(own) = fd.name.as_deref() {
            seen.insert(own);
        }
        for import in &imports {
            if !seen.insert(import.path.as_str()) {
                return Err(err(format!("already imported {:?}", import.path)));
            }
        }
        Ok(imports)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum VisitState {
    Visiting,
    Done,
}

/// The set of file paths visible to name resolution: the file itself, its
/// direct imports, and everything reachable through public imports.
fn import_closure(own_path: &str, imports: &[FileImport]) -> HashSet<String> {
    let mut closure = HashSet::new();
    closure.insert(own_path.to_owned());
    for import in imports {
        closure.insert(import.path.clone());
        if let Some(file) = &import.file {
            add_public_imports(file, &mut closure);
        }
    }
    closure
}

fn add_public_imports(file: &FileDescriptor, closure: &mut HashSet<String>) {
    for import in file.imports() {
        if import.is_public && closure.insert(import.path.clone()) {
            if let Some(dep) = &import.file {
                add_public_imports(dep, closure);
            }
        }
    }
}

fn copy_locations(fd: &FileDescriptorProto) -> Result<Vec<SourceLocation>, DescriptorError> {
    let mut locations = Vec::new();
    let Some(info) = &fd.source_code_info else {
        return Ok(locations);
    };
    for loc in &info.location {
        let mut out = SourceLocation {
            path: loc.path.clone(),
            ..Default::default()
        };
        match loc.span.as_slice() {
            [line, column, end_column] => {
                out.start_line = *line;
                out.start_column = *column;
                out.end_line = *line;
                out.end_column = *end_column;
            }
            [line, column, end_line, end_column] => {
                out.start_line = *line;
                out.start_column = *column;
                out.end_line = *end_line;
                out.end_column = *end_column;
            }
            span => return Err(err(format!("invalid span: {span:?}"))),
        }
        out.leading_comments = loc.leading_comments.clone().unwrap_or_default();
        out.trailing_comments = loc.trailing_comments.clone().unwrap_or_default();
        out.leading_detached_comments = loc.leading_detached_comments.clone();
        locations.push(out);
    }
    Ok(locations)
}

// --- Pass 1: declare --------------------------------------------------------

fn declare_file<'a>(
    builder: &mut FileInner,
    declared: &mut Declared<'a>,
    fd: &'a FileDescriptorProto,
) -> Result<(), DescriptorError> {
    let package = builder.package.clone();
    for ep in &fd.enum_type {
        let index = declare_enum(builder, ep, &package)?;
        builder.top_enums.push(index);
    }
    for mp in &fd.message_type {
        let index = declare_message(builder, declared, mp, None, &package)?;
        builder.top_messages.push(index);
    }
    for xp in &fd.extension {
        let index = declare_extension(builder, declared, xp, &package)?;
        builder.top_extensions.push(index);
    }
    for sp in &fd.service {
        declare_service(builder, declared, sp, &package)?;
    }
    Ok(())
}

fn scoped_name(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_owned()
    } else {
        format!("{scope}.{name}")
    }
}

fn declared_name(proto_name: Option<&str>, what: &str) -> Result<String, DescriptorError> {
    let name = proto_name.unwrap_or_default();
    if name.is_empty() {
        return Err(err(format!("{what} is missing a name")));
    }
    Ok(name.to_owned())
}

fn register_symbol(
    builder: &mut FileInner,
    full_name: &str,
    symbol: Symbol,
) -> Result<(), DescriptorError> {
    if builder
        .symbols
        .insert(full_name.to_owned(), symbol)
        .is_some()
    {
        return Err(err(format!("duplicate declaration: {full_name:?}")));
    }
    Ok(())
}

fn declare_message<'a>(
    builder: &mut FileInner,
    declared: &mut Declared<'a>,
    mp: &'a DescriptorProto,
    parent: Option<u32>,
    scope: &str,
) -> Result<u32, DescriptorError> {
    let name = declared_name(mp.name.as_deref(), "message")?;
    let full_name = scoped_name(scope, &name);

    let options = mp.options.as_ref();
    let is_map_entry = options.and_then(|o| o.map_entry).unwrap_or(false);
    let is_message_set = options
        .and_then(|o| o.message_set_wire_format)
        .unwrap_or(false);

    let extension_ranges = FieldRanges::new(
        mp.extension_range
            .iter()
            .map(|r| range_bounds(r.start, r.end))
            .collect::<Result<_, _>>()?,
    );
    let reserved_ranges = FieldRanges::new(
        mp.reserved_range
            .iter()
            .map(|r| range_bounds(r.start, r.end))
            .collect::<Result<_, _>>()?,
    );
    let reserved_names = Names::new(mp.reserved_name.clone());

    let mut oneofs = Vec::with_capacity(mp.oneof_decl.len());
    for op in &mp.oneof_decl {
        oneofs.push(declare_oneof(op, &full_name)?);
    }

    let mut fields = Vec::with_capacity(mp.field.len());
    for (field_index, fp) in mp.field.iter().enumerate() {
        let mut field = declare_field(fp, &full_name, false)?;
        if let Some(oneof_index) = fp.oneof_index {
            let oneof = usize::try_from(oneof_index)
                .ok()
                .filter(|&i| i < oneofs.len())
                .ok_or_else(|| {
                    err(format!(
                        "field {:?} has an invalid oneof index: {oneof_index}",
                        field.full_name
                    ))
                })?;
            oneofs[oneof].fields.push(field_index as u32);
            field.oneof = Some(oneof as u32);
        }
        fields.push(field);
    }

    let index = builder.messages.len() as u32;
    builder.messages.push(MessageInner {
        name,
        full_name: full_name.clone(),
        parent,
        fields,
        oneofs,
        nested_messages: Vec::new(),
        nested_enums: Vec::new(),
        extension_ranges,
        reserved_ranges,
        reserved_names,
        is_map_entry,
        is_message_set,
        fields_by_number: Default::default(),
        fields_by_name: Default::default(),
        info: Default::default(),
    });
    declared.messages.push(mp);
    debug_assert_eq!(builder.messages.len(), declared.messages.len());
    register_symbol(builder, &full_name, Symbol::Message(index))?;

    for ep in &mp.enum_type {
        let nested = declare_enum(builder, ep, &full_name)?;
        builder.messages[index as usize].nested_enums.push(nested);
    }
    for np in &mp.nested_type {
        let nested = declare_message(builder, declared, np, Some(index), &full_name)?;
        builder.messages[index as usize].nested_messages.push(nested);
    }
    for xp in &mp.extension {
        declare_extension(builder, declared, xp, &full_name)?;
    }
    Ok(index)
}

fn declare_oneof(op: &OneofDescriptorProto, scope: &str) -> Result<OneofInner, DescriptorError> {
    let name = declared_name(op.name.as_deref(), "oneof")?;
    let full_name = scoped_name(scope, &name);
    Ok(OneofInner {
        name,
        full_name,
        fields: Vec::new(),
    })
}

fn declare_field(
    fp: &FieldDescriptorProto,
    scope: &str,
    is_extension: bool,
) -> Result<FieldInner, DescriptorError> {
    let name = declared_name(fp.name.as_deref(), "field")?;
    let full_name = scoped_name(scope, &name);

    let number = fp
        .number
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| err(format!("field {full_name:?} is missing a valid number")))?;

    let cardinality = match fp.label {
        None | Some(1) => Cardinality::Optional,
        Some(2) => Cardinality::Required,
        Some(3) => Cardinality::Repeated,
        Some(other) => {
            return Err(err(format!(
                "field {full_name:?} has an invalid label: {other}"
            )))
        }
    };

    // A missing type with a populated type name is legal; whether it is a
    // message or an enum falls out of reference resolution.
    let kind = match fp.r#type {
        Some(raw) => Kind::from_proto(raw)
            .ok_or_else(|| err(format!("field {full_name:?} has an invalid type: {raw}")))?,
        None if fp.type_name.is_some() => Kind::Message,
        None => return Err(err(format!("field {full_name:?} is missing a type"))),
    };

    let json_name = fp
        .json_name
        .clone()
        .unwrap_or_else(|| json_camel_case(&name));

    Ok(FieldInner {
        name,
        full_name,
        json_name,
        number,
        kind,
        cardinality,
        // Effective packedness needs the final kind; fixed up after the
        // resolve pass.
        packed: false,
        proto3_optional: fp.proto3_optional.unwrap_or(false),
        oneof: None,
        default: None,
        type_ref: TypeRef::None,
        is_extension,
        extendee: TypeRef::None,
    })
}

fn declare_extension<'a>(
    builder: &mut FileInner,
    declared: &mut Declared<'a>,
    xp: &'a FieldDescriptorProto,
    scope: &str,
) -> Result<u32, DescriptorError> {
    let field = declare_field(xp, scope, true)?;
    let full_name = field.full_name.clone();
    let index = builder.extensions.len() as u32;
    builder.extensions.push(field);
    declared.extensions.push(xp);
    register_symbol(builder, &full_name, Symbol::Extension(index))?;
    Ok(index)
}

fn declare_enum(
    builder: &mut FileInner,
    ep: &EnumDescriptorProto,
    scope: &str,
) -> Result<u32, DescriptorError> {
    let name = declared_name(ep.name.as_deref(), "enum")?;
    let full_name = scoped_name(scope, &name);

    // Enum values scope to the enum's parent, mirroring C++ scoping rules.
    let mut values = Vec::with_capacity(ep.value.len());
    for vp in &ep.value {
        let value_name = declared_name(vp.name.as_deref(), "enum value")?;
        let number = vp
            .number
            .ok_or_else(|| err(format!("enum value {value_name:?} is missing a number")))?;
        values.push(crate::descriptor::EnumValueInner {
            full_name: scoped_name(scope, &value_name),
            name: value_name,
            number,
        });
    }

    let reserved_ranges = EnumRanges::new(
        ep.reserved_range
            .iter()
            .map(|r| {
                let start = r.start.ok_or_else(|| err("enum range missing start"))?;
                let end = r.end.ok_or_else(|| err("enum range missing end"))?;
                Ok([start, end])
            })
            .collect::<Result<_, DescriptorError>>()?,
    );

    let index = builder.enums.len() as u32;
    builder.enums.push(EnumInner {
        name,
        full_name: full_name.clone(),
        values,
        reserved_ranges,
        reserved_names: Names::new(ep.reserved_name.clone()),
        by_number: Default::default(),
    });
    register_symbol(builder, &full_name, Symbol::Enum(index))?;
    let value_names: Vec<String> = builder.enums[index as usize]
        .values
        .iter()
        .map(|v| v.full_name.clone())
        .collect();
    for (value_index, value_name) in value_names.into_iter().enumerate() {
        register_symbol(
            builder,
            &value_name,
            Symbol::EnumValue {
                enum_index: index,
                value_index: value_index as u32,
            },
        )?;
    }
    Ok(index)
}

fn declare_service<'a>(
    builder: &mut FileInner,
    declared: &mut Declared<'a>,
    sp: &'a ServiceDescriptorProto,
    scope: &str,
) -> Result<u32, DescriptorError> {
    let name = declared_name(sp.name.as_deref(), "service")?;
    let full_name = scoped_name(scope, &name);
    let mut methods = Vec::with_capacity(sp.method.len());
    for mp in &sp.method {
        let method_name = declared_name(mp.name.as_deref(), "method")?;
        methods.push(MethodInner {
            full_name: scoped_name(&full_name, &method_name),
            name: method_name,
            input: TypeRef::None,
            output: TypeRef::None,
        });
    }
    let index = builder.services.len() as u32;
    builder.services.push(ServiceInner {
        name,
        full_name: full_name.clone(),
        methods,
    });
    declared.services.push(sp);
    register_symbol(builder, &full_name, Symbol::Service(index))?;
    Ok(index)
}

fn range_bounds(start: Option<i32>, end: Option<i32>) -> Result<[u32; 2], DescriptorError> {
    let start = start.ok_or_else(|| err("range missing start"))?;
    let end = end.ok_or_else(|| err("range missing end"))?;
    let start = u32::try_from(start).map_err(|_| err(format!("invalid range start: {start}")))?;
    let end = u32::try_from(end).map_err(|_| err(format!("invalid range end: {end}")))?;
    Ok([start, end])
}

/// Derive the JSON name the way `protoc` does: strip underscores and
/// capitalize the letter following each.
fn json_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn is_valid_full_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
                _ => return false,
            }
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

// --- Pass 2: resolve --------------------------------------------------------

struct Resolver<'a> {
    options: &'a FileOptions,
    source: &'a dyn DescriptorSource,
    closure: &'a HashSet<String>,
}

/// What a type reference resolved to.
enum Resolved {
    LocalMessage(u32),
    LocalEnum(u32),
    ForeignMessage(FileDescriptor, u32),
    ForeignEnum(FileDescriptor, u32),
    /// Unresolvable but permitted; carries the placeholder full name.
    Placeholder(Arc<str>),
}

impl Resolver<'_> {
    fn resolve_file(
        &self,
        builder: &mut FileInner,
        declared: &Declared<'_>,
    ) -> Result<(), DescriptorError> {
        for msg_index in 0..builder.messages.len() {
            let mp = declared.messages[msg_index];
            for (field_index, fp) in mp.field.iter().enumerate() {
                let scope = builder.messages[msg_index].full_name.clone();
                let (type_ref, kind, default) = {
                    let field = &builder.messages[msg_index].fields[field_index];
                    self.resolve_field(builder, field, fp, &scope)?
                };
                let syntax = builder.syntax;
                let field = &mut builder.messages[msg_index].fields[field_index];
                field.type_ref = type_ref;
                field.kind = kind;
                field.default = default;
                finish_packed(field, fp, syntax);
            }
        }

        for ext_index in 0..builder.extensions.len() {
            let xp = declared.extensions[ext_index];
            let scope = parent_scope(&builder.extensions[ext_index].full_name);
            let (type_ref, kind, default) = {
                let field = &builder.extensions[ext_index];
                self.resolve_field(builder, field, xp, &scope)?
            };
            let extendee_name = xp.extendee.as_deref().ok_or_else(|| {
                err(format!(
                    "extension {:?} is missing an extendee",
                    builder.extensions[ext_index].full_name
                ))
            })?;
            let extendee = self.resolve_message_reference(builder, extendee_name, &scope)?;
            let syntax = builder.syntax;
            let field = &mut builder.extensions[ext_index];
            field.type_ref = type_ref;
            field.kind = kind;
            field.default = default;
            field.extendee = extendee;
            finish_packed(field, xp, syntax);
        }

        for svc_index in 0..builder.services.len() {
            let sp = declared.services[svc_index];
            let scope = parent_scope(&builder.services[svc_index].full_name);
            for (m_index, mp) in sp.method.iter().enumerate() {
                let full_name = builder.services[svc_index].methods[m_index].full_name.clone();
                let input_name = mp.input_type.as_deref().ok_or_else(|| {
                    err(format!("method {full_name:?} is missing its input type"))
                })?;
                let output_name = mp.output_type.as_deref().ok_or_else(|| {
                    err(format!("method {full_name:?} is missing its output type"))
                })?;
                let input = self.resolve_message_reference(builder, input_name, &scope)?;
                let output = self.resolve_message_reference(builder, output_name, &scope)?;
                let method = &mut builder.services[svc_index].methods[m_index];
                method.input = input;
                method.output = output;
            }
        }
        Ok(())
    }

    fn resolve_field(
        &self,
        builder: &FileInner,
        field: &FieldInner,
        fp: &FieldDescriptorProto,
        scope: &str,
    ) -> Result<(TypeRef, Kind, Option<Value>), DescriptorError> {
        let declared_kind = fp.r#type.and_then(Kind::from_proto);
        let mut kind = field.kind;
        let type_ref = match fp.type_name.as_deref() {
            None => {
                if matches!(kind, Kind::Message | Kind::Group | Kind::Enum) {
                    return Err(err(format!(
                        "field {:?} of kind {:?} is missing a type name",
                        field.full_name, kind
                    )));
                }
                TypeRef::None
            }
            Some(reference) => match self.resolve_reference(builder, reference, scope)? {
                Resolved::LocalMessage(index) => {
                    if declared_kind == Some(Kind::Enum) {
                        return Err(err(format!(
                            "field {:?} declares enum kind but references message {:?}",
                            field.full_name, builder.messages[index as usize].full_name
                        )));
                    }
                    TypeRef::LocalMessage(index)
                }
                Resolved::LocalEnum(index) => {
                    if matches!(declared_kind, Some(Kind::Message | Kind::Group)) {
                        return Err(err(format!(
                            "field {:?} declares message kind but references enum {:?}",
                            field.full_name, builder.enums[index as usize].full_name
                        )));
                    }
                    kind = Kind::Enum;
                    TypeRef::LocalEnum(index)
                }
                Resolved::ForeignMessage(file, index) => {
                    if declared_kind == Some(Kind::Enum) {
                        return Err(err(format!(
                            "field {:?} declares enum kind but references message {:?}",
                            field.full_name, file.inner.messages[index as usize].full_name
                        )));
                    }
                    TypeRef::ForeignMessage(file, index)
                }
                Resolved::ForeignEnum(file, index) => {
                    if matches!(declared_kind, Some(Kind::Message | Kind::Group)) {
                        return Err(err(format!(
                            "field {:?} declares message kind but references enum {:?}",
                            field.full_name, file.inner.enums[index as usize].full_name
                        )));
                    }
                    kind = Kind::Enum;
                    TypeRef::ForeignEnum(file, index)
                }
                Resolved::Placeholder(name) => {
                    if kind == Kind::Enum {
                        TypeRef::PlaceholderEnum(name)
                    } else {
                        TypeRef::PlaceholderMessage(name)
                    }
                }
            },
        };

        let default = self.parse_default(builder, field, fp, kind, &type_ref)?;
        Ok((type_ref, kind, default))
    }

    fn resolve_message_reference(
        &self,
        builder: &FileInner,
        reference: &str,
        scope: &str,
    ) -> Result<TypeRef, DescriptorError> {
        match self.resolve_reference(builder, reference, scope)? {
            Resolved::LocalMessage(index) => Ok(TypeRef::LocalMessage(index)),
            Resolved::ForeignMessage(file, index) => Ok(TypeRef::ForeignMessage(file, index)),
            Resolved::Placeholder(name) => Ok(TypeRef::PlaceholderMessage(name)),
            _ => Err(err(format!(
                "reference {reference:?} does not name a message"
            ))),
        }
    }

    /// Search the local declaration tree, then the external source
    /// restricted to the import closure.
    fn resolve_reference(
        &self,
        builder: &FileInner,
        reference: &str,
        scope: &str,
    ) -> Result<Resolved, DescriptorError> {
        let relative = !reference.starts_with('.');
        let mut candidates: Vec<String> = Vec::new();
        if relative {
            // Walk outward from the innermost scope, then try the bare name.
            let mut prefix = scope;
            loop {
                candidates.push(scoped_name(prefix, reference));
                match prefix.rfind('.') {
                    Some(dot) => prefix = &prefix[..dot],
                    None => break,
                }
            }
            if !scope.is_empty() {
                candidates.push(reference.to_owned());
            }
        } else {
            candidates.push(reference[1..].to_owned());
        }

        for candidate in &candidates {
            if let Some(symbol) = builder.symbols.get(candidate.as_str()) {
                return match *symbol {
                    Symbol::Message(index) => Ok(Resolved::LocalMessage(index)),
                    Symbol::Enum(index) => Ok(Resolved::LocalEnum(index)),
                    _ => Err(err(format!(
                        "reference {reference:?} resolves to {candidate:?}, which is not a type"
                    ))),
                };
            }
            match self.source.find_descriptor_by_name(candidate) {
                Some(AnyDescriptor::Message(m)) => {
                    let file = m
                        .parent_file()
                        .expect("source descriptors come from real files")
                        .clone();
                    if self.closure.contains(file.path()) {
                        return Ok(Resolved::ForeignMessage(file.clone(), m.index()));
                    }
                }
                Some(AnyDescriptor::Enum(e)) => {
                    if let Some((file, index)) = e.real_parts() {
                        if self.closure.contains(file.path()) {
                            return Ok(Resolved::ForeignEnum(file, index));
                        }
                    }
                }
                _ => {}
            }
        }

        if self.options.allow_unresolvable {
            // A relative placeholder marks its unknown leading segments.
            let name: Arc<str> = if relative {
                Arc::from(format!("*.{reference}"))
            } else {
                Arc::from(&reference[1..])
            };
            return Ok(Resolved::Placeholder(name));
        }
        Err(err(format!("could not resolve reference {reference:?}")))
    }

    fn parse_default(
        &self,
        builder: &FileInner,
        field: &FieldInner,
        fp: &FieldDescriptorProto,
        kind: Kind,
        type_ref: &TypeRef,
    ) -> Result<Option<Value>, DescriptorError> {
        let Some(text) = fp.default_value.as_deref() else {
            return Ok(None);
        };
        if field.cardinality == Cardinality::Repeated {
            return Err(err(format!(
                "repeated field {:?} cannot have a default value",
                field.full_name
            )));
        }
        let value = match kind {
            Kind::Bool => match text {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => return Err(bad_default(field, text)),
            },
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
                Value::I32(text.parse().map_err(|_| bad_default(field, text))?)
            }
            Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
                Value::I64(text.parse().map_err(|_| bad_default(field, text))?)
            }
            Kind::Uint32 | Kind::Fixed32 => {
                Value::U32(text.parse().map_err(|_| bad_default(field, text))?)
            }
            Kind::Uint64 | Kind::Fixed64 => {
                Value::U64(text.parse().map_err(|_| bad_default(field, text))?)
            }
            Kind::Float => {
                Value::F32(parse_float(text).map_err(|()| bad_default(field, text))? as f32)
            }
            Kind::Double => Value::F64(parse_float(text).map_err(|()| bad_default(field, text))?),
            Kind::String => Value::String(Str::from(text)),
            Kind::Bytes => Value::Bytes(Bytes::from(
                unescape_bytes(text).map_err(|()| bad_default(field, text))?,
            )),
            Kind::Enum => {
                let number = match type_ref {
                    TypeRef::LocalEnum(index) => builder.enums[*index as usize]
                        .values
                        .iter()
                        .find(|v| v.name == text)
                        .map(|v| v.number),
                    TypeRef::ForeignEnum(file, index) => file.inner.enums[*index as usize]
                        .values
                        .iter()
                        .find(|v| v.name == text)
                        .map(|v| v.number),
                    // Unresolvable enum: fall back to the zero number, the
                    // best stand-in available.
                    TypeRef::PlaceholderEnum(_) => Some(0),
                    _ => None,
                };
                match number {
                    Some(number) => Value::EnumNumber(number),
                    None if self.options.allow_unresolvable => Value::EnumNumber(0),
                    None => return Err(bad_default(field, text)),
                }
            }
            Kind::Message | Kind::Group => {
                return Err(err(format!(
                    "message field {:?} cannot have a default value",
                    field.full_name
                )))
            }
        };
        Ok(Some(value))
    }
}

fn bad_default(field: &FieldInner, text: &str) -> DescriptorError {
    err(format!(
        "field {:?} has an invalid default value: {text:?}",
        field.full_name
    ))
}

fn parse_float(text: &str) -> Result<f64, ()> {
    match text {
        "inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        "nan" => Ok(f64::NAN),
        _ => text.parse().map_err(|_| ()),
    }
}

/// Undo the C-style escaping `protoc` applies to bytes defaults.
fn unescape_bytes(text: &str) -> Result<Vec<u8>, ()> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.bytes().peekable();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next().ok_or(())? {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'\\' => out.push(b'\\'),
            b'\'' => out.push(b'\''),
            b'"' => out.push(b'"'),
            b'x' => {
                let hi = hex_digit(bytes.next().ok_or(())?)?;
                let lo = hex_digit(bytes.next().ok_or(())?)?;
                out.push(hi << 4 | lo);
            }
            d @ b'0'..=b'7' => {
                let mut value = u32::from(d - b'0');
                for _ in 0..2 {
                    match bytes.peek() {
                        Some(&next @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(next - b'0');
                            bytes.next();
                        }
                        _ => break,
                    }
                }
                out.push(u8::try_from(value).map_err(|_| ())?);
            }
            _ => return Err(()),
        }
    }
    Ok(out)
}

fn hex_digit(b: u8) -> Result<u8, ()> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(()),
    }
}

fn finish_packed(field: &mut FieldInner, fp: &FieldDescriptorProto, syntax: Syntax) {
    let repeated = field.cardinality == Cardinality::Repeated;
    if !repeated || !field.kind.is_packable() {
        field.packed = false;
        return;
    }
    field.packed = match fp.options.as_ref().and_then(|o| o.packed) {
        Some(explicit) => explicit,
        None => syntax == Syntax::Proto3,
    };
}

fn parent_scope(full_name: &str) -> String {
    match full_name.rfind('.') {
        Some(dot) => full_name[..dot].to_owned(),
        None => String::new(),
    }
}

// --- Pass 3: validate -------------------------------------------------------

fn validate_file(builder: &FileInner) -> Result<(), DescriptorError> {
    for message in &builder.messages {
        validate_message(builder, message)?;
    }
    for e in &builder.enums {
        validate_enum(builder, e)?;
    }
    for ext in &builder.extensions {
        validate_extension(builder, ext)?;
    }
    Ok(())
}

fn validate_message(builder: &FileInner, message: &MessageInner) -> Result<(), DescriptorError> {
    let is_message_set = message.is_message_set;
    message
        .extension_ranges
        .check_valid(is_message_set)
        .map_err(|e| in_message(message, e))?;
    message
        .reserved_ranges
        .check_valid(is_message_set)
        .map_err(|e| in_message(message, e))?;
    message
        .reserved_ranges
        .check_overlap(&message.extension_ranges)
        .map_err(|e| in_message(message, e))?;
    message
        .reserved_names
        .check_valid()
        .map_err(|e| in_message(message, e))?;

    if is_message_set {
        if builder.syntax != Syntax::Proto2 {
            return Err(err(format!(
                "message {:?} uses message-set wire format outside proto2",
                message.full_name
            )));
        }
        if !message.fields.is_empty() {
            return Err(err(format!(
                "message-set message {:?} must not declare fields of its own",
                message.full_name
            )));
        }
        if message.extension_ranges.is_empty() {
            return Err(err(format!(
                "message-set message {:?} declares no extension ranges",
                message.full_name
            )));
        }
    }

    let mut numbers: HashMap<u32, String> = HashMap::new();
    let mut names: HashSet<&str> = HashSet::new();
    for field in &message.fields {
        if !(MIN_FIELD_NUMBER..=MAX_FIELD_NUMBER).contains(&field.number) {
            return Err(err(format!(
                "field {:?} has an out-of-range number: {}",
                field.full_name, field.number
            )));
        }
        if (FIRST_RESERVED_NUMBER..=LAST_RESERVED_NUMBER).contains(&field.number) {
            return Err(err(format!(
                "field {:?} uses number {}, which protobuf reserves for itself",
                field.full_name, field.number
            )));
        }
        if let Some(previous) = numbers.insert(field.number, field.name.clone()) {
            return Err(err(format!(
                "message {:?} declares number {} twice, on {:?} and {:?}",
                message.full_name, field.number, previous, field.name
            )));
        }
        if !names.insert(&field.name) {
            return Err(err(format!(
                "message {:?} declares field name {:?} twice",
                message.full_name, field.name
            )));
        }
        if message.reserved_ranges.has(field.number) {
            return Err(err(format!(
                "field {:?} uses reserved number {}",
                field.full_name, field.number
            )));
        }
        if message.reserved_names.has(&field.name) {
            return Err(err(format!(
                "field {:?} uses a reserved name",
                field.full_name
            )));
        }
        if message.extension_ranges.has(field.number) {
            return Err(err(format!(
                "field {:?} collides with an extension range on number {}",
                field.full_name, field.number
            )));
        }
        if builder.syntax == Syntax::Proto3 {
            if field.cardinality == Cardinality::Required {
                return Err(err(format!(
                    "proto3 field {:?} cannot be required",
                    field.full_name
                )));
            }
            if field.kind == Kind::Group {
                return Err(err(format!(
                    "proto3 field {:?} cannot be a group",
                    field.full_name
                )));
            }
        }
    }

    for (oneof_index, oneof) in message.oneofs.iter().enumerate() {
        if oneof.fields.is_empty() {
            return Err(err(format!(
                "oneof {:?} declares no fields",
                oneof.full_name
            )));
        }
        for &field_index in &oneof.fields {
            let field = &message.fields[field_index as usize];
            if field.cardinality == Cardinality::Repeated {
                return Err(err(format!(
                    "oneof member {:?} cannot be repeated",
                    field.full_name
                )));
            }
            if is_map_field(builder, field) {
                return Err(err(format!(
                    "oneof member {:?} cannot be a map",
                    field.full_name
                )));
            }
            if field.oneof != Some(oneof_index as u32) {
                return Err(err(format!(
                    "oneof {:?} references field {:?} with a mismatched index",
                    oneof.full_name, field.full_name
                )));
            }
        }
    }

    if message.is_map_entry {
        validate_map_entry(message)?;
    }
    Ok(())
}

fn validate_map_entry(message: &MessageInner) -> Result<(), DescriptorError> {
    if message.fields.len() != 2 {
        return Err(err(format!(
            "map entry {:?} must have exactly a key and a value field",
            message.full_name
        )));
    }
    let key = message
        .fields
        .iter()
        .find(|f| f.number == MAP_ENTRY_KEY_NUMBER)
        .ok_or_else(|| {
            err(format!(
                "map entry {:?} is missing its key field",
                message.full_name
            ))
        })?;
    let value = message
        .fields
        .iter()
        .find(|f| f.number == MAP_ENTRY_VALUE_NUMBER)
        .ok_or_else(|| {
            err(format!(
                "map entry {:?} is missing its value field",
                message.full_name
            ))
        })?;
    if key.cardinality == Cardinality::Repeated || value.cardinality == Cardinality::Repeated {
        return Err(err(format!(
            "map entry {:?} fields must be singular",
            message.full_name
        )));
    }
    let key_ok = matches!(
        key.kind,
        Kind::Bool
            | Kind::Int32
            | Kind::Int64
            | Kind::Uint32
            | Kind::Uint64
            | Kind::Sint32
            | Kind::Sint64
            | Kind::Fixed32
            | Kind::Fixed64
            | Kind::Sfixed32
            | Kind::Sfixed64
            | Kind::String
    );
    if !key_ok {
        return Err(err(format!(
            "map entry {:?} key has an invalid kind: {:?}",
            message.full_name, key.kind
        )));
    }
    Ok(())
}

fn validate_enum(builder: &FileInner, e: &EnumInner) -> Result<(), DescriptorError> {
    if e.values.is_empty() {
        return Err(err(format!("enum {:?} declares no values", e.full_name)));
    }
    e.reserved_ranges
        .check_valid()
        .map_err(|inner| err(format!("enum {:?}: {inner}", e.full_name)))?;
    e.reserved_names
        .check_valid()
        .map_err(|inner| err(format!("enum {:?}: {inner}", e.full_name)))?;
    if builder.syntax == Syntax::Proto3 && e.values[0].number != 0 {
        return Err(err(format!(
            "proto3 enum {:?} must declare zero as its first value",
            e.full_name
        )));
    }
    for value in &e.values {
        if e.reserved_ranges.has(value.number) {
            return Err(err(format!(
                "enum value {:?} uses reserved number {}",
                value.full_name, value.number
            )));
        }
        if e.reserved_names.has(&value.name) {
            return Err(err(format!(
                "enum value {:?} uses a reserved name",
                value.full_name
            )));
        }
    }
    Ok(())
}

fn validate_extension(builder: &FileInner, ext: &FieldInner) -> Result<(), DescriptorError> {
    match &ext.extendee {
        TypeRef::LocalMessage(index) => {
            let extendee = &builder.messages[*index as usize];
            if !extendee.extension_ranges.has(ext.number) {
                return Err(err(format!(
                    "extension {:?} uses number {} outside the extension ranges of {:?}",
                    ext.full_name, ext.number, extendee.full_name
                )));
            }
        }
        TypeRef::ForeignMessage(file, index) => {
            let extendee = &file.inner.messages[*index as usize];
            if !extendee.extension_ranges.has(ext.number) {
                return Err(err(format!(
                    "extension {:?} uses number {} outside the extension ranges of {:?}",
                    ext.full_name, ext.number, extendee.full_name
                )));
            }
        }
        TypeRef::PlaceholderMessage(_) => {}
        _ => {
            return Err(err(format!(
                "extension {:?} does not extend a message",
                ext.full_name
            )))
        }
    }
    if ext.cardinality == Cardinality::Required {
        return Err(err(format!(
            "extension {:?} cannot be required",
            ext.full_name
        )));
    }
    Ok(())
}

fn is_map_field(builder: &FileInner, field: &FieldInner) -> bool {
    if field.cardinality != Cardinality::Repeated || field.kind != Kind::Message {
        return false;
    }
    match &field.type_ref {
        TypeRef::LocalMessage(index) => builder.messages[*index as usize].is_map_entry,
        TypeRef::ForeignMessage(file, index) => file.inner.messages[*index as usize].is_map_entry,
        _ => false,
    }
}

fn in_message(message: &MessageInner, inner: DescriptorError) -> DescriptorError {
    err(format!("message {:?}: {inner}", message.full_name))
}
