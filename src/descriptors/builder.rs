//! Registry construction.
//!
//! Definitions are added in the shape of `descriptor.proto` messages, either
//! directly or by parsing a serialized `FileDescriptorSet`. Nothing is linked
//! until [`RegistryBuilder::finalize`], which either produces a complete
//! [`Registry`] or fails without leaving anything half-built behind.

use super::{
    defaults::{parse_default, zero_default},
    descriptor_set,
    registry::resolve_symbol,
    DefId, EnumDescriptor, EnumId, FieldDescriptor, Label, MessageDescriptor, MessageId,
    ProtoType, Registry, RegistryError, RegistryResult,
};
use crate::{
    bytestring::ByteString,
    wire::{MAX_FIELD_NUMBER, MIN_FIELD_NUMBER, RESERVED_FIELD_NUMBERS},
    Str,
};
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use tracing::debug;

const MAX_NAME_LEN: usize = 128;
const MAX_NAME_SEGMENT_LEN: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryLimits {
    /// Longest permitted chain of message fields leading back to its start.
    pub max_cycle_len: usize,
    /// Most message types allowed on one path through field links. A group
    /// of mutually recursive types counts as its longest cycle.
    pub max_type_depth: usize,
    pub max_fields: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            max_cycle_len: 16,
            max_type_depth: 64,
            max_fields: 65535,
        }
    }
}

/// A `.proto` file's definitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileProto {
    pub name: String,
    pub package: String,
    /// `"proto2"`, `"proto3"` or empty (proto2).
    pub syntax: String,
    pub messages: Vec<MessageProto>,
    pub enums: Vec<EnumProto>,
    pub extensions: Vec<FieldProto>,
}

impl FileProto {
    pub fn new(name: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            ..Default::default()
        }
    }

    pub fn proto3(mut self) -> Self {
        self.syntax = "proto3".to_owned();
        self
    }

    pub fn message(mut self, message: MessageProto) -> Self {
        self.messages.push(message);
        self
    }

    pub fn enum_type(mut self, enum_type: EnumProto) -> Self {
        self.enums.push(enum_type);
        self
    }

    pub fn extension(mut self, field: FieldProto) -> Self {
        self.extensions.push(field);
        self
    }

    fn is_proto3(&self) -> bool {
        self.syntax == "proto3"
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageProto {
    pub name: String,
    pub fields: Vec<FieldProto>,
    pub nested_messages: Vec<MessageProto>,
    pub enums: Vec<EnumProto>,
    pub extensions: Vec<FieldProto>,
}

impl MessageProto {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn field(mut self, field: FieldProto) -> Self {
        self.fields.push(field);
        self
    }

    pub fn nested(mut self, message: MessageProto) -> Self {
        self.nested_messages.push(message);
        self
    }

    pub fn enum_type(mut self, enum_type: EnumProto) -> Self {
        self.enums.push(enum_type);
        self
    }

    pub fn extension(mut self, field: FieldProto) -> Self {
        self.extensions.push(field);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldProto {
    pub name: String,
    pub number: i32,
    pub label: Option<Label>,
    /// May be left out when `type_name` names a message or enum.
    pub proto_type: Option<ProtoType>,
    pub type_name: Option<String>,
    pub extendee: Option<String>,
    pub default_value: Option<String>,
    pub packed: Option<bool>,
}

impl FieldProto {
    pub fn new(name: impl Into<String>, number: i32, proto_type: ProtoType) -> Self {
        Self {
            name: name.into(),
            number,
            proto_type: Some(proto_type),
            ..Default::default()
        }
    }

    /// A message, group or enum field referring to `type_name`.
    pub fn linked(
        name: impl Into<String>,
        number: i32,
        proto_type: ProtoType,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Self::new(name, number, proto_type)
        }
    }

    pub fn repeated(mut self) -> Self {
        self.label = Some(Label::Repeated);
        self
    }

    pub fn required(mut self) -> Self {
        self.label = Some(Label::Required);
        self
    }

    pub fn packed(mut self, packed: bool) -> Self {
        self.packed = Some(packed);
        self
    }

    pub fn default_value(mut self, text: impl Into<String>) -> Self {
        self.default_value = Some(text.into());
        self
    }

    pub fn extending(mut self, extendee: impl Into<String>) -> Self {
        self.extendee = Some(extendee.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnumProto {
    pub name: String,
    pub values: Vec<EnumValueProto>,
}

impl EnumProto {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn value(mut self, name: impl Into<String>, number: i32) -> Self {
        self.values.push(EnumValueProto {
            name: name.into(),
            number,
        });
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnumValueProto {
    pub name: String,
    pub number: i32,
}

/// Collects file definitions and links them into a [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    files: Vec<FileProto>,
    limits: RegistryLimits,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: RegistryLimits) -> Self {
        Self {
            files: Vec::new(),
            limits,
        }
    }

    pub fn add_file(&mut self, file: FileProto) -> &mut Self {
        self.files.push(file);
        self
    }

    /// Parses a serialized `FileDescriptorSet` and queues its files.
    ///
    /// On error no file from `bytes` is queued.
    pub fn add_file_descriptor_set(&mut self, bytes: impl Into<ByteString>) -> RegistryResult<()> {
        let files = descriptor_set::parse_file_descriptor_set(bytes.into())?;
        debug!(files = files.len(), "parsed file descriptor set");
        self.files.extend(files);
        Ok(())
    }

    pub fn files(&self) -> &[FileProto] {
        &self.files
    }

    /// Resolves every reference and validates the result.
    pub fn finalize(self) -> RegistryResult<Registry> {
        let mut collector = Collector::default();
        for file in &self.files {
            collector.collect_file(file)?;
        }
        let registry = collector.link(&self.limits)?;
        check_type_graph(&registry, &self.limits)?;
        debug!(
            files = self.files.len(),
            messages = registry.messages.len(),
            enums = registry.enums.len(),
            "finalized registry"
        );
        Ok(registry)
    }
}

struct PendingMessage<'a> {
    proto: &'a MessageProto,
    full_name: Str,
    containing: Option<MessageId>,
    proto3: bool,
    nested_messages: Vec<MessageId>,
    nested_enums: Vec<EnumId>,
}

struct PendingEnum<'a> {
    proto: &'a EnumProto,
    full_name: Str,
    containing: Option<MessageId>,
}

struct PendingExtension<'a> {
    proto: &'a FieldProto,
    scope: Str,
    containing: Option<MessageId>,
    proto3: bool,
}

/// First pass: names every definition and assigns ids.
#[derive(Default)]
struct Collector<'a> {
    messages: Vec<PendingMessage<'a>>,
    enums: Vec<PendingEnum<'a>>,
    extensions: Vec<PendingExtension<'a>>,
    symbols: FxHashMap<Str, DefId>,
}

impl<'a> Collector<'a> {
    fn collect_file(&mut self, file: &'a FileProto) -> RegistryResult<()> {
        if !file.package.is_empty() {
            validate_name(&file.package)?;
        }
        let proto3 = file.is_proto3();
        for message in &file.messages {
            self.collect_message(message, &file.package, None, proto3)?;
        }
        for enum_type in &file.enums {
            self.collect_enum(enum_type, &file.package, None)?;
        }
        for extension in &file.extensions {
            self.extensions.push(PendingExtension {
                proto: extension,
                scope: file.package.as_str().into(),
                containing: None,
                proto3,
            });
        }
        Ok(())
    }

    fn collect_message(
        &mut self,
        proto: &'a MessageProto,
        scope: &str,
        containing: Option<MessageId>,
        proto3: bool,
    ) -> RegistryResult<MessageId> {
        let full_name = qualify(scope, &proto.name, "message")?;
        let id = MessageId(self.messages.len() as u32);
        self.define(&full_name, DefId::Message(id))?;
        self.messages.push(PendingMessage {
            proto,
            full_name: full_name.clone(),
            containing,
            proto3,
            nested_messages: Vec::new(),
            nested_enums: Vec::new(),
        });

        for nested in &proto.nested_messages {
            let child = self.collect_message(nested, &full_name, Some(id), proto3)?;
            self.messages[id.index()].nested_messages.push(child);
        }
        for enum_type in &proto.enums {
            let child = self.collect_enum(enum_type, &full_name, Some(id))?;
            self.messages[id.index()].nested_enums.push(child);
        }
        for extension in &proto.extensions {
            self.extensions.push(PendingExtension {
                proto: extension,
                scope: full_name.clone(),
                containing: Some(id),
                proto3,
            });
        }
        Ok(id)
    }

    fn collect_enum(
        &mut self,
        proto: &'a EnumProto,
        scope: &str,
        containing: Option<MessageId>,
    ) -> RegistryResult<EnumId> {
        let full_name = qualify(scope, &proto.name, "enum")?;
        let id = EnumId(self.enums.len() as u32);
        self.define(&full_name, DefId::Enum(id))?;
        self.enums.push(PendingEnum {
            proto,
            full_name,
            containing,
        });
        Ok(id)
    }

    fn define(&mut self, full_name: &Str, def: DefId) -> RegistryResult<()> {
        match self.symbols.entry(full_name.clone()) {
            Entry::Occupied(_) => Err(RegistryError::Redefinition(full_name.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(def);
                Ok(())
            }
        }
    }

    /// Second pass: resolves type names and builds the descriptors.
    fn link(self, limits: &RegistryLimits) -> RegistryResult<Registry> {
        let enums = self
            .enums
            .iter()
            .enumerate()
            .map(|(i, pending)| build_enum(EnumId(i as u32), pending))
            .collect::<RegistryResult<Vec<_>>>()?;

        let linker = Linker {
            symbols: &self.symbols,
            enums: &enums,
        };
        let mut messages = Vec::with_capacity(self.messages.len());
        for (i, pending) in self.messages.iter().enumerate() {
            let id = MessageId(i as u32);
            let fields = pending
                .proto
                .fields
                .iter()
                .map(|field| {
                    linker.build_field(field, &pending.full_name, Some(id), pending.proto3)
                })
                .collect::<RegistryResult<Vec<_>>>()?;
            messages.push(build_message(id, pending, fields, limits)?);
        }

        for pending in &self.extensions {
            let field = linker.build_extension(
                pending.proto,
                &pending.scope,
                pending.containing,
                pending.proto3,
            )?;
            let extendee = match field.extendee {
                Some(extendee) => &mut messages[extendee.index()],
                None => return Err(RegistryError::MissingExtendee(field.full_name.to_string())),
            };
            if extendee.by_number.contains_key(&field.number)
                || extendee.extensions_by_number.contains_key(&field.number)
            {
                return Err(RegistryError::DuplicateFieldNumber {
                    message: extendee.full_name.to_string(),
                    number: field.number,
                });
            }
            extendee
                .extensions_by_number
                .insert(field.number, extendee.extensions.len());
            extendee.extensions.push(field);
        }

        Ok(Registry {
            messages,
            enums,
            symbols: self.symbols,
        })
    }
}

struct Linker<'a> {
    symbols: &'a FxHashMap<Str, DefId>,
    enums: &'a [EnumDescriptor],
}

impl Linker<'_> {
    fn build_extension(
        &self,
        proto: &FieldProto,
        scope: &str,
        containing: Option<MessageId>,
        proto3: bool,
    ) -> RegistryResult<FieldDescriptor> {
        let mut field = self.build_field(proto, scope, containing, proto3)?;
        let extendee = proto
            .extendee
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| RegistryError::MissingExtendee(field.full_name.to_string()))?;
        field.extendee = match self.resolve(scope, extendee, &field.full_name)? {
            DefId::Message(id) => Some(id),
            DefId::Enum(_) => {
                return Err(RegistryError::UnexpectedSymbolKind {
                    field: field.full_name.to_string(),
                    symbol: extendee.to_owned(),
                    expected: "a message",
                })
            }
        };
        Ok(field)
    }

    fn build_field(
        &self,
        proto: &FieldProto,
        scope: &str,
        containing: Option<MessageId>,
        proto3: bool,
    ) -> RegistryResult<FieldDescriptor> {
        let full_name = qualify(scope, &proto.name, "field")?;
        let number = u32::try_from(proto.number)
            .ok()
            .filter(|&number| is_valid_field_number(number))
            .ok_or_else(|| RegistryError::InvalidFieldNumber {
                field: full_name.to_string(),
                number: proto.number,
            })?;

        let link = match proto.type_name.as_deref() {
            Some(type_name) if !type_name.is_empty() => {
                Some(self.resolve(scope, type_name, &full_name)?)
            }
            _ => None,
        };
        let proto_type = match (proto.proto_type, link) {
            (Some(proto_type), _) => proto_type,
            (None, Some(DefId::Message(_))) => ProtoType::Message,
            (None, Some(DefId::Enum(_))) => ProtoType::Enum,
            (None, None) => return Err(RegistryError::MissingFieldType(full_name.to_string())),
        };
        let kind_error = |expected: &'static str| RegistryError::UnexpectedSymbolKind {
            field: full_name.to_string(),
            symbol: proto.type_name.clone().unwrap_or_default(),
            expected,
        };
        match (proto_type, link) {
            (ProtoType::Message | ProtoType::Group, Some(DefId::Message(_)))
            | (ProtoType::Enum, Some(DefId::Enum(_))) => {}
            (ProtoType::Message | ProtoType::Group, _) => return Err(kind_error("a message")),
            (ProtoType::Enum, _) => return Err(kind_error("an enum")),
            (_, Some(_)) => return Err(kind_error("usable by a scalar field")),
            (_, None) => {}
        }

        let label = proto.label.unwrap_or_default();
        let repeated = label == Label::Repeated;
        let packable = repeated && proto_type.is_packable();
        let packed = match proto.packed {
            Some(true) if !packable => {
                return Err(RegistryError::InvalidPacked(full_name.to_string()))
            }
            Some(packed) => packed,
            None => proto3 && packable,
        };

        let enum_type = match link {
            Some(DefId::Enum(id)) => Some(&self.enums[id.index()]),
            _ => None,
        };
        let default = match proto.default_value.as_deref() {
            Some(text) => Some(parse_default(proto_type, text, enum_type).ok_or_else(|| {
                RegistryError::InvalidDefault {
                    field: full_name.to_string(),
                    value: text.to_owned(),
                }
            })?),
            None => zero_default(proto_type, enum_type),
        };

        Ok(FieldDescriptor {
            number,
            name: proto.name.as_str().into(),
            full_name,
            proto_type,
            label,
            packed,
            default,
            link,
            containing_type: containing,
            extendee: None,
            allowed_wire_types: proto_type.allowed_wire_types(repeated),
        })
    }

    fn resolve(&self, scope: &str, symbol: &str, context: &str) -> RegistryResult<DefId> {
        resolve_symbol(self.symbols, scope, symbol).ok_or_else(|| RegistryError::UnresolvedSymbol {
            symbol: symbol.to_owned(),
            context: context.to_owned(),
        })
    }
}

fn build_enum(id: EnumId, pending: &PendingEnum<'_>) -> RegistryResult<EnumDescriptor> {
    let mut values = Vec::with_capacity(pending.proto.values.len());
    let mut by_number = FxHashMap::default();
    let mut by_name = FxHashMap::default();
    for value in &pending.proto.values {
        let name: Str = qualify("", &value.name, "enum value")?;
        if by_name.insert(name.clone(), value.number).is_some() {
            return Err(RegistryError::Redefinition(format!(
                "{}.{}",
                pending.full_name, name
            )));
        }
        by_number.entry(value.number).or_insert(values.len());
        values.push((name, value.number));
    }
    Ok(EnumDescriptor {
        id,
        full_name: pending.full_name.clone(),
        values,
        by_number,
        by_name,
        containing_type: pending.containing,
    })
}

fn build_message(
    id: MessageId,
    pending: &PendingMessage<'_>,
    fields: Vec<FieldDescriptor>,
    limits: &RegistryLimits,
) -> RegistryResult<MessageDescriptor> {
    let message = || pending.full_name.to_string();
    if fields.len() > limits.max_fields {
        return Err(RegistryError::TooManyFields {
            message: message(),
            count: fields.len(),
            limit: limits.max_fields,
        });
    }

    let mut by_number = FxHashMap::default();
    let mut by_name = FxHashMap::default();
    for (i, field) in fields.iter().enumerate() {
        if by_number.insert(field.number, i).is_some() {
            return Err(RegistryError::DuplicateFieldNumber {
                message: message(),
                number: field.number,
            });
        }
        if by_name.insert(field.name.clone(), i).is_some() {
            return Err(RegistryError::DuplicateFieldName {
                message: message(),
                field: field.name.to_string(),
            });
        }
    }

    Ok(MessageDescriptor {
        id,
        full_name: pending.full_name.clone(),
        fields,
        by_number,
        by_name,
        extensions: Vec::new(),
        extensions_by_number: FxHashMap::default(),
        nested_messages: pending.nested_messages.clone(),
        nested_enums: pending.nested_enums.clone(),
        containing_type: pending.containing,
    })
}

/// Joins `scope` and a single-segment `name`, validating the result.
fn qualify(scope: &str, name: &str, kind: &'static str) -> RegistryResult<Str> {
    if name.is_empty() {
        return Err(RegistryError::MissingName(kind));
    }
    if name.contains('.') {
        return Err(RegistryError::InvalidName(name.to_owned()));
    }
    let full_name = if scope.is_empty() {
        name.to_owned()
    } else {
        format!("{scope}.{name}")
    };
    validate_name(&full_name)?;
    Ok(full_name.into())
}

fn validate_name(name: &str) -> RegistryResult<()> {
    if name.len() <= MAX_NAME_LEN && name.split('.').all(is_identifier) {
        Ok(())
    } else {
        Err(RegistryError::InvalidName(name.to_owned()))
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    let starts_well = matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic());
    starts_well
        && segment.len() <= MAX_NAME_SEGMENT_LEN
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

pub(crate) fn is_valid_field_number(number: u32) -> bool {
    (MIN_FIELD_NUMBER..=MAX_FIELD_NUMBER).contains(&number)
        && !RESERVED_FIELD_NUMBERS.contains(&number)
}

/// Checks the graph formed by message- and group-typed fields.
///
/// One depth-first pass finds the strongly connected components (Tarjan's
/// algorithm, run with an explicit stack). Each back edge closes a real
/// cycle, whose length is measured on the search path. Depth is the longest
/// path through the components, where a cyclic component counts as the
/// longest cycle found in it.
fn check_type_graph(registry: &Registry, limits: &RegistryLimits) -> RegistryResult<()> {
    let edges: Vec<Vec<usize>> = registry
        .messages
        .iter()
        .map(|message| {
            let mut targets: Vec<usize> = message
                .fields
                .iter()
                .filter_map(|field| field.message_type().map(MessageId::index))
                .collect();
            targets.sort_unstable();
            targets.dedup();
            targets
        })
        .collect();

    let mut graph = TypeGraph::new(&edges);
    for root in 0..edges.len() {
        if graph.index[root].is_some() {
            continue;
        }
        if let Err(cycle) = graph.search(root, limits.max_cycle_len) {
            return Err(RegistryError::CycleTooLong {
                message: registry.messages[cycle.entry].full_name.to_string(),
                len: cycle.len,
                limit: limits.max_cycle_len,
            });
        }
    }

    for (node, message) in registry.messages.iter().enumerate() {
        let depth = graph.depth(node);
        if depth > limits.max_type_depth {
            return Err(RegistryError::TypeTooDeep {
                message: message.full_name.to_string(),
                depth,
                limit: limits.max_type_depth,
            });
        }
    }
    Ok(())
}

/// A cycle of `len` types, entered at `entry`.
struct LongCycle {
    entry: usize,
    len: usize,
}

struct TypeGraph<'a> {
    edges: &'a [Vec<usize>],
    /// Discovery order; `None` until visited.
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    /// Position on the current search path.
    path_pos: Vec<Option<usize>>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    /// Longest cycle entered at each node.
    cycle_len: Vec<usize>,
    component: Vec<usize>,
    /// Longest path, in types, starting in each component.
    heights: Vec<usize>,
    next_index: usize,
}

impl<'a> TypeGraph<'a> {
    fn new(edges: &'a [Vec<usize>]) -> Self {
        let n = edges.len();
        Self {
            edges,
            index: vec![None; n],
            lowlink: vec![0; n],
            path_pos: vec![None; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            cycle_len: vec![0; n],
            component: vec![usize::MAX; n],
            heights: Vec::new(),
            next_index: 0,
        }
    }

    fn depth(&self, node: usize) -> usize {
        self.heights[self.component[node]]
    }

    fn search(&mut self, root: usize, max_cycle_len: usize) -> Result<(), LongCycle> {
        // (node, next edge to follow)
        let mut path: Vec<(usize, usize)> = Vec::new();
        self.open(root, &mut path);
        while let Some(top) = path.last_mut() {
            let node = top.0;
            if let Some(&next) = self.edges[node].get(top.1) {
                top.1 += 1;
                match self.index[next] {
                    None => self.open(next, &mut path),
                    Some(next_index) if self.on_stack[next] => {
                        if let Some(pos) = self.path_pos[next] {
                            let len = path.len() - pos;
                            if len > max_cycle_len {
                                return Err(LongCycle { entry: next, len });
                            }
                            self.cycle_len[next] = self.cycle_len[next].max(len);
                        }
                        self.lowlink[node] = self.lowlink[node].min(next_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            path.pop();
            self.path_pos[node] = None;
            if let Some(&(parent, _)) = path.last() {
                self.lowlink[parent] = self.lowlink[parent].min(self.lowlink[node]);
            }
            if self.index[node] == Some(self.lowlink[node]) {
                self.close_component(node);
            }
        }
        Ok(())
    }

    fn open(&mut self, node: usize, path: &mut Vec<(usize, usize)>) {
        self.index[node] = Some(self.next_index);
        self.lowlink[node] = self.next_index;
        self.next_index += 1;
        self.stack.push(node);
        self.on_stack[node] = true;
        self.path_pos[node] = Some(path.len());
        path.push((node, 0));
    }

    /// Pops the component rooted at `root`. Every component it links to was
    /// closed earlier, so its height is final.
    fn close_component(&mut self, root: usize) {
        let id = self.heights.len();
        let mut members = Vec::new();
        let mut weight = 1;
        loop {
            let node = self.stack.pop().expect("Component root is on the stack");
            self.on_stack[node] = false;
            self.component[node] = id;
            weight = weight.max(self.cycle_len[node]);
            members.push(node);
            if node == root {
                break;
            }
        }
        let below = members
            .iter()
            .flat_map(|&node| &self.edges[node])
            .filter(|&&next| self.component[next] != id)
            .map(|&next| self.heights[self.component[next]])
            .max()
            .unwrap_or(0);
        self.heights.push(weight + below);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::DefaultValue;
    use crate::wire::WireType;

    fn build(files: Vec<FileProto>) -> RegistryResult<Registry> {
        build_with(files, RegistryLimits::default())
    }

    fn build_with(files: Vec<FileProto>, limits: RegistryLimits) -> RegistryResult<Registry> {
        let mut builder = RegistryBuilder::with_limits(limits);
        for file in files {
            builder.add_file(file);
        }
        builder.finalize()
    }

    /// A file without a package holding just `message`.
    fn single(message: MessageProto) -> FileProto {
        FileProto::new("a.proto", "").message(message)
    }

    fn link(name: &str, number: i32, target: &str) -> FieldProto {
        FieldProto::linked(name, number, ProtoType::Message, target)
    }

    #[test]
    fn links_nested_types_relative_to_scope() {
        let file = FileProto::new("a.proto", "pkg")
            .message(
                MessageProto::new("Outer")
                    .field(FieldProto::linked("inner", 1, ProtoType::Message, "Inner"))
                    .field(FieldProto::linked("kind", 2, ProtoType::Enum, "Kind"))
                    .nested(MessageProto::new("Inner").field(FieldProto::linked(
                        "back",
                        1,
                        ProtoType::Message,
                        "Outer",
                    )))
                    .enum_type(EnumProto::new("Kind").value("A", 0).value("B", 1)),
            )
            .message(
                MessageProto::new("Inner").field(FieldProto::new("x", 1, ProtoType::Int32)),
            );
        let registry = build(vec![file]).unwrap();

        let outer = registry.lookup_message("pkg.Outer").unwrap();
        let nested = registry.lookup_message(".pkg.Outer.Inner").unwrap();
        let inner = outer.field_by_name("inner").unwrap();
        assert_eq!(inner.message_type(), Some(nested.id()));
        assert_eq!(inner.containing_type(), Some(outer.id()));
        assert_eq!(nested.containing_type(), Some(outer.id()));
        assert_eq!(outer.nested_messages(), &[nested.id()]);

        let back = nested.field_by_number(1).unwrap();
        assert_eq!(back.message_type(), Some(outer.id()));

        let kind = outer.field_by_number(2).unwrap();
        let kind_enum = registry.enum_type(kind.enum_type().unwrap());
        assert_eq!(kind_enum.full_name(), "pkg.Outer.Kind");
        assert_eq!(kind.default_value(), Some(&DefaultValue::Enum(0)));
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn type_inferred_from_type_name() {
        let mut field = FieldProto::linked("m", 1, ProtoType::Message, ".M");
        field.proto_type = None;
        let registry = build(vec![single(MessageProto::new("M").field(field))]).unwrap();
        let field = registry.lookup_message("M").unwrap().field_by_number(1).unwrap();
        assert_eq!(field.proto_type(), ProtoType::Message);
        assert_eq!(field.native_wire_type(), WireType::LengthDelimited);
    }

    #[test]
    fn redefinition_is_rejected() {
        let files = vec![
            FileProto::new("a.proto", "pkg").message(MessageProto::new("M")),
            FileProto::new("b.proto", "pkg").enum_type(EnumProto::new("M").value("X", 0)),
        ];
        assert_eq!(
            build(files).unwrap_err(),
            RegistryError::Redefinition("pkg.M".to_owned())
        );
    }

    #[test]
    fn unresolved_and_mismatched_links() {
        let missing = FileProto::new("a.proto", "pkg").message(
            MessageProto::new("M").field(FieldProto::linked("f", 1, ProtoType::Message, "Nope")),
        );
        assert_eq!(
            build(vec![missing]).unwrap_err(),
            RegistryError::UnresolvedSymbol {
                symbol: "Nope".to_owned(),
                context: "pkg.M.f".to_owned(),
            }
        );

        let mismatched = FileProto::new("a.proto", "pkg")
            .message(MessageProto::new("M").field(link("f", 1, "E")))
            .enum_type(EnumProto::new("E").value("A", 0));
        assert!(matches!(
            build(vec![mismatched]).unwrap_err(),
            RegistryError::UnexpectedSymbolKind { expected: "a message", .. }
        ));

        let unlinked = FileProto::new("a.proto", "")
            .message(MessageProto::new("M").field(FieldProto::new("f", 1, ProtoType::Enum)));
        assert!(matches!(
            build(vec![unlinked]).unwrap_err(),
            RegistryError::UnexpectedSymbolKind { expected: "an enum", .. }
        ));
    }

    #[test]
    fn field_numbers_and_names_are_checked() {
        for number in [0, -1, 19000, 19999, 1 << 29] {
            let file = single(
                MessageProto::new("M").field(FieldProto::new("f", number, ProtoType::Bool)),
            );
            assert!(matches!(
                build(vec![file]).unwrap_err(),
                RegistryError::InvalidFieldNumber { .. }
            ));
        }

        let duplicate_number = FileProto::new("a.proto", "").message(
            MessageProto::new("M")
                .field(FieldProto::new("a", 3, ProtoType::Bool))
                .field(FieldProto::new("b", 3, ProtoType::Bool)),
        );
        assert_eq!(
            build(vec![duplicate_number]).unwrap_err(),
            RegistryError::DuplicateFieldNumber {
                message: "M".to_owned(),
                number: 3
            }
        );

        let duplicate_name = FileProto::new("a.proto", "").message(
            MessageProto::new("M")
                .field(FieldProto::new("a", 1, ProtoType::Bool))
                .field(FieldProto::new("a", 2, ProtoType::Bool)),
        );
        assert!(matches!(
            build(vec![duplicate_name]).unwrap_err(),
            RegistryError::DuplicateFieldName { .. }
        ));
    }

    #[test]
    fn names_are_validated() {
        let long = "a".repeat(64);
        for name in ["", "1abc", "a-b", long.as_str()] {
            let result = build(vec![single(MessageProto::new(name))]);
            assert!(result.is_err(), "{name:?} accepted");
        }
        let file = FileProto::new("a.proto", "p.q").message(MessageProto::new("_M1"));
        assert!(build(vec![file]).is_ok());
    }

    #[test]
    fn too_many_fields() {
        let limits = RegistryLimits {
            max_fields: 2,
            ..Default::default()
        };
        let message = (1..=3).fold(MessageProto::new("M"), |message, n| {
            message.field(FieldProto::new(format!("f{n}"), n, ProtoType::Int32))
        });
        assert!(matches!(
            build_with(vec![FileProto::new("a.proto", "").message(message)], limits).unwrap_err(),
            RegistryError::TooManyFields { count: 3, limit: 2, .. }
        ));
    }

    #[test]
    fn packed_rules() {
        let bad = single(MessageProto::new("M").field(
            FieldProto::new("s", 1, ProtoType::String)
                .repeated()
                .packed(true),
        ));
        assert_eq!(
            build(vec![bad]).unwrap_err(),
            RegistryError::InvalidPacked("M.s".to_owned())
        );

        let proto3 = FileProto::new("a.proto", "")
            .proto3()
            .message(
                MessageProto::new("M")
                    .field(FieldProto::new("a", 1, ProtoType::Int32).repeated())
                    .field(FieldProto::new("b", 2, ProtoType::Int32).repeated().packed(false))
                    .field(FieldProto::new("c", 3, ProtoType::String).repeated()),
            );
        let registry = build(vec![proto3]).unwrap();
        let message = registry.lookup_message("M").unwrap();
        assert!(message.field_by_name("a").unwrap().is_packed());
        assert!(!message.field_by_name("b").unwrap().is_packed());
        assert!(!message.field_by_name("c").unwrap().is_packed());
        assert!(message
            .field_by_name("b")
            .unwrap()
            .allowed_wire_types()
            .contains(WireType::LengthDelimited));
    }

    #[test]
    fn defaults_are_typed() {
        let file = FileProto::new("a.proto", "")
            .message(
                MessageProto::new("M")
                    .field(FieldProto::new("i", 1, ProtoType::Int64).default_value("-5"))
                    .field(FieldProto::new("b", 2, ProtoType::Bytes).default_value(r"\001x"))
                    .field(FieldProto::linked("e", 3, ProtoType::Enum, "E").default_value("TWO"))
                    .field(FieldProto::new("s", 4, ProtoType::String))
                    .field(FieldProto::linked("m", 5, ProtoType::Message, "M")),
            )
            .enum_type(EnumProto::new("E").value("ONE", 1).value("TWO", 2));
        let registry = build(vec![file]).unwrap();
        let message = registry.lookup_message("M").unwrap();
        let default = |n| message.field_by_number(n).unwrap().default_value().cloned();
        assert_eq!(default(1), Some(DefaultValue::Int64(-5)));
        assert_eq!(default(2), Some(DefaultValue::Bytes(b"\x01x".to_vec().into())));
        assert_eq!(default(3), Some(DefaultValue::Enum(2)));
        assert_eq!(default(4), Some(DefaultValue::String("".into())));
        assert_eq!(default(5), None);

        let bad = single(
            MessageProto::new("M")
                .field(FieldProto::new("i", 1, ProtoType::Int32).default_value("x")),
        );
        assert!(matches!(
            build(vec![bad]).unwrap_err(),
            RegistryError::InvalidDefault { .. }
        ));
    }

    #[test]
    fn enum_aliases_keep_first_name() {
        let file = FileProto::new("a.proto", "")
            .enum_type(EnumProto::new("E").value("A", 1).value("B", 1).value("C", 5));
        let registry = build(vec![file]).unwrap();
        let enum_type = registry.lookup_enum("E").unwrap();
        assert_eq!(enum_type.name_of(1), Some("A"));
        assert_eq!(enum_type.value_of("B"), Some(1));
        assert_eq!(enum_type.default_number(), 1);
        assert_eq!(
            enum_type.values().collect::<Vec<_>>(),
            vec![("A", 1), ("B", 1), ("C", 5)]
        );
    }

    #[test]
    fn extensions_attach_to_extendee() {
        let file = FileProto::new("a.proto", "pkg")
            .message(MessageProto::new("Base").field(FieldProto::new("x", 1, ProtoType::Int32)))
            .message(
                MessageProto::new("Scope").extension(
                    FieldProto::new("nested_ext", 101, ProtoType::String).extending("Base"),
                ),
            )
            .extension(FieldProto::new("top_ext", 100, ProtoType::Sint32).extending(".pkg.Base"));
        let registry = build(vec![file]).unwrap();
        let base = registry.lookup_message("pkg.Base").unwrap();
        let scope = registry.lookup_message("pkg.Scope").unwrap();

        let top = base.extension_by_number(100).unwrap();
        assert_eq!(top.full_name(), "pkg.top_ext");
        assert_eq!(top.extendee(), Some(base.id()));
        assert_eq!(top.containing_type(), None);

        let nested = base.find_field(101).unwrap();
        assert!(nested.is_extension());
        assert_eq!(nested.containing_type(), Some(scope.id()));
        assert!(base.field_by_number(101).is_none());

        let clash = FileProto::new("a.proto", "")
            .message(MessageProto::new("Base").field(FieldProto::new("x", 1, ProtoType::Int32)))
            .extension(FieldProto::new("ext", 1, ProtoType::Int32).extending("Base"));
        assert!(matches!(
            build(vec![clash]).unwrap_err(),
            RegistryError::DuplicateFieldNumber { number: 1, .. }
        ));

        let orphan = FileProto::new("a.proto", "")
            .extension(FieldProto::new("ext", 1, ProtoType::Int32));
        assert_eq!(
            build(vec![orphan]).unwrap_err(),
            RegistryError::MissingExtendee("ext".to_owned())
        );
    }

    fn ring(len: usize) -> FileProto {
        (0..len).fold(FileProto::new("ring.proto", "r"), |file, i| {
            let next = format!("M{}", (i + 1) % len);
            file.message(
                MessageProto::new(format!("M{i}"))
                    .field(FieldProto::linked("next", 1, ProtoType::Message, next)),
            )
        })
    }

    fn chain(len: usize) -> FileProto {
        (0..len).fold(FileProto::new("chain.proto", ""), |file, i| {
            let message = MessageProto::new(format!("M{i}"));
            let message = if i + 1 < len {
                message.field(link("next", 1, &format!("M{}", i + 1)))
            } else {
                message
            };
            file.message(message)
        })
    }

    /// Every message has a field of every other message type.
    fn dense(len: usize) -> FileProto {
        (0..len).fold(FileProto::new("dense.proto", "d"), |file, i| {
            let message = (0..len)
                .filter(|&j| j != i)
                .fold(MessageProto::new(format!("M{i}")), |message, j| {
                    message.field(FieldProto::linked(
                        format!("m{j}"),
                        j as i32 + 1,
                        ProtoType::Message,
                        format!("M{j}"),
                    ))
                });
            file.message(message)
        })
    }

    #[test]
    fn dense_recursive_schema_is_checked_quickly() {
        let limits = RegistryLimits {
            max_cycle_len: 32,
            ..Default::default()
        };
        let registry = build_with(vec![dense(24)], limits).unwrap();
        assert_eq!(registry.messages().count(), 24);

        assert!(matches!(
            build(vec![dense(24)]).unwrap_err(),
            RegistryError::CycleTooLong { limit: 16, .. }
        ));
    }

    #[test]
    fn wide_recursive_schema_is_accepted() {
        // An expression type with many node kinds that each hold expressions.
        let kinds = 100;
        let expr = (0..kinds).fold(MessageProto::new("Expr"), |expr, i| {
            expr.field(FieldProto::linked(
                format!("k{i}"),
                i + 1,
                ProtoType::Message,
                format!("K{i}"),
            ))
        });
        let file = (0..kinds).fold(FileProto::new("ast.proto", "ast").message(expr), |file, i| {
            file.message(
                MessageProto::new(format!("K{i}"))
                    .field(FieldProto::linked("lhs", 1, ProtoType::Message, "Expr"))
                    .field(FieldProto::linked("rhs", 2, ProtoType::Message, "Expr")),
            )
        });
        assert!(build(vec![file]).is_ok());
    }

    #[test]
    fn self_recursion_is_allowed() {
        let file = FileProto::new("a.proto", "").message(
            MessageProto::new("Tree")
                .field(FieldProto::linked("child", 1, ProtoType::Message, "Tree").repeated()),
        );
        assert!(build(vec![file]).is_ok());
    }

    #[test]
    fn cycle_length_limit() {
        assert!(build(vec![ring(16)]).is_ok());
        assert!(matches!(
            build(vec![ring(17)]).unwrap_err(),
            RegistryError::CycleTooLong { len: 17, limit: 16, .. }
        ));
    }

    #[test]
    fn depth_limit() {
        assert!(build(vec![chain(64)]).is_ok());
        assert_eq!(
            build(vec![chain(65)]).unwrap_err(),
            RegistryError::TypeTooDeep {
                message: "M0".to_owned(),
                depth: 65,
                limit: 64,
            }
        );
    }

    #[test]
    fn depth_through_cycle_counts_distinct_types() {
        let limits = RegistryLimits {
            max_type_depth: 4,
            ..Default::default()
        };
        // A <-> B, B -> C -> D -> E: the path A, B, C, D, E has five types.
        let file = FileProto::new("a.proto", "")
            .message(MessageProto::new("A").field(link("b", 1, "B")))
            .message(
                MessageProto::new("B")
                    .field(link("a", 1, "A"))
                    .field(link("c", 2, "C")),
            )
            .message(MessageProto::new("C").field(link("d", 1, "D")))
            .message(MessageProto::new("D").field(link("e", 1, "E")))
            .message(MessageProto::new("E"));
        assert!(matches!(
            build_with(vec![file], limits).unwrap_err(),
            RegistryError::TypeTooDeep { depth: 5, .. }
        ));
    }
}
