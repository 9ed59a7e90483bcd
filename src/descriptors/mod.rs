mod bootstrap;
mod builder;
mod defaults;
mod descriptor_set;
mod error;
mod registry;

pub use self::builder::{
    EnumProto, EnumValueProto, FieldProto, FileProto, MessageProto, RegistryBuilder,
    RegistryLimits,
};
pub use self::error::{RegistryError, RegistryResult};
pub use self::registry::Registry;

use crate::{
    wire::{WireType, WireTypeSet},
    Str,
};
use prost::bytes::Bytes;
use rustc_hash::FxHashMap;

/// Index of a message type within its [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub(crate) u32);

/// Index of an enum type within its [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnumId(pub(crate) u32);

impl MessageId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl EnumId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A named definition in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefId {
    Message(MessageId),
    Enum(EnumId),
}

/// Declared type of a field. Discriminants match `FieldDescriptorProto.Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtoType {
    Double = 1,
    Float = 2,
    Int64 = 3,
    Uint64 = 4,
    Int32 = 5,
    Fixed64 = 6,
    Fixed32 = 7,
    Bool = 8,
    String = 9,
    Group = 10,
    Message = 11,
    Bytes = 12,
    Uint32 = 13,
    Enum = 14,
    Sfixed32 = 15,
    Sfixed64 = 16,
    Sint32 = 17,
    Sint64 = 18,
}

struct TypeInfo {
    name: &'static str,
    native_wire_type: WireType,
    packable: bool,
}

const fn info(name: &'static str, native_wire_type: WireType, packable: bool) -> TypeInfo {
    TypeInfo {
        name,
        native_wire_type,
        packable,
    }
}

/// Indexed by `ProtoType as usize - 1`.
static TYPE_INFO: [TypeInfo; 18] = [
    info("double", WireType::SixtyFourBit, true),
    info("float", WireType::ThirtyTwoBit, true),
    info("int64", WireType::Varint, true),
    info("uint64", WireType::Varint, true),
    info("int32", WireType::Varint, true),
    info("fixed64", WireType::SixtyFourBit, true),
    info("fixed32", WireType::ThirtyTwoBit, true),
    info("bool", WireType::Varint, true),
    info("string", WireType::LengthDelimited, false),
    info("group", WireType::StartGroup, false),
    info("message", WireType::LengthDelimited, false),
    info("bytes", WireType::LengthDelimited, false),
    info("uint32", WireType::Varint, true),
    info("enum", WireType::Varint, true),
    info("sfixed32", WireType::ThirtyTwoBit, true),
    info("sfixed64", WireType::SixtyFourBit, true),
    info("sint32", WireType::Varint, true),
    info("sint64", WireType::Varint, true),
];

const ALL_PROTO_TYPES: [ProtoType; 18] = [
    ProtoType::Double,
    ProtoType::Float,
    ProtoType::Int64,
    ProtoType::Uint64,
    ProtoType::Int32,
    ProtoType::Fixed64,
    ProtoType::Fixed32,
    ProtoType::Bool,
    ProtoType::String,
    ProtoType::Group,
    ProtoType::Message,
    ProtoType::Bytes,
    ProtoType::Uint32,
    ProtoType::Enum,
    ProtoType::Sfixed32,
    ProtoType::Sfixed64,
    ProtoType::Sint32,
    ProtoType::Sint64,
];

impl ProtoType {
    pub fn from_i32(value: i32) -> Option<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|v| v.checked_sub(1))
            .and_then(|i| ALL_PROTO_TYPES.get(i))
            .copied()
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ALL_PROTO_TYPES
            .into_iter()
            .find(|proto_type| proto_type.name() == name)
    }

    fn info(self) -> &'static TypeInfo {
        &TYPE_INFO[self as usize - 1]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn native_wire_type(self) -> WireType {
        self.info().native_wire_type
    }

    /// Whether repeated fields of this type may use packed encoding.
    pub fn is_packable(self) -> bool {
        self.info().packable
    }

    pub fn is_submessage(self) -> bool {
        matches!(self, ProtoType::Message | ProtoType::Group)
    }

    /// Wire types accepted for a field of this type.
    ///
    /// Packable types additionally accept length-delimited payloads when
    /// `repeated` is set.
    pub fn allowed_wire_types(self, repeated: bool) -> WireTypeSet {
        let set = WireTypeSet::of(self.native_wire_type());
        if repeated && self.is_packable() {
            set.with(WireType::LengthDelimited)
        } else {
            set
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Label {
    #[default]
    Optional = 1,
    Required = 2,
    Repeated = 3,
}

impl Label {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Label::Optional),
            2 => Some(Label::Required),
            3 => Some(Label::Repeated),
            _ => None,
        }
    }
}

/// Typed default of a scalar field.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Float(f32),
    Double(f64),
    String(Str),
    Bytes(Bytes),
    Enum(i32),
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub(crate) number: u32,
    pub(crate) name: Str,
    pub(crate) full_name: Str,
    pub(crate) proto_type: ProtoType,
    pub(crate) label: Label,
    pub(crate) packed: bool,
    pub(crate) default: Option<DefaultValue>,
    pub(crate) link: Option<DefId>,
    pub(crate) containing_type: Option<MessageId>,
    pub(crate) extendee: Option<MessageId>,
    pub(crate) allowed_wire_types: WireTypeSet,
}

impl FieldDescriptor {
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name qualified by the scope the field is declared in.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn proto_type(&self) -> ProtoType {
        self.proto_type
    }

    pub fn native_wire_type(&self) -> WireType {
        self.proto_type.native_wire_type()
    }

    pub fn allowed_wire_types(&self) -> WireTypeSet {
        self.allowed_wire_types
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn is_repeated(&self) -> bool {
        self.label == Label::Repeated
    }

    /// Whether the field prefers packed encoding. The decoder accepts both.
    pub fn is_packed(&self) -> bool {
        self.packed
    }

    /// `None` for message and group fields.
    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub fn message_type(&self) -> Option<MessageId> {
        match self.link {
            Some(DefId::Message(id)) => Some(id),
            _ => None,
        }
    }

    pub fn enum_type(&self) -> Option<EnumId> {
        match self.link {
            Some(DefId::Enum(id)) => Some(id),
            _ => None,
        }
    }

    /// The message that declares this field; `None` for file-level extensions.
    pub fn containing_type(&self) -> Option<MessageId> {
        self.containing_type
    }

    /// The message this extension extends.
    pub fn extendee(&self) -> Option<MessageId> {
        self.extendee
    }

    pub fn is_extension(&self) -> bool {
        self.extendee.is_some()
    }
}

#[derive(Debug)]
pub struct MessageDescriptor {
    pub(crate) id: MessageId,
    pub(crate) full_name: Str,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) by_number: FxHashMap<u32, usize>,
    pub(crate) by_name: FxHashMap<Str, usize>,
    pub(crate) extensions: Vec<FieldDescriptor>,
    pub(crate) extensions_by_number: FxHashMap<u32, usize>,
    pub(crate) nested_messages: Vec<MessageId>,
    pub(crate) nested_enums: Vec<EnumId>,
    pub(crate) containing_type: Option<MessageId>,
}

impl MessageDescriptor {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Last component of the fully-qualified name.
    pub fn name(&self) -> &str {
        short_name(&self.full_name)
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.by_number.get(&number).map(|&i| &self.fields[i])
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    /// Extensions of this message known to the registry.
    pub fn extensions(&self) -> &[FieldDescriptor] {
        &self.extensions
    }

    pub fn extension_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.extensions_by_number
            .get(&number)
            .map(|&i| &self.extensions[i])
    }

    /// Looks `number` up among the fields, then the extensions.
    pub fn find_field(&self, number: u32) -> Option<&FieldDescriptor> {
        self.field_by_number(number)
            .or_else(|| self.extension_by_number(number))
    }

    pub fn nested_messages(&self) -> &[MessageId] {
        &self.nested_messages
    }

    pub fn nested_enums(&self) -> &[EnumId] {
        &self.nested_enums
    }

    pub fn containing_type(&self) -> Option<MessageId> {
        self.containing_type
    }
}

#[derive(Debug)]
pub struct EnumDescriptor {
    pub(crate) id: EnumId,
    pub(crate) full_name: Str,
    pub(crate) values: Vec<(Str, i32)>,
    pub(crate) by_number: FxHashMap<i32, usize>,
    pub(crate) by_name: FxHashMap<Str, i32>,
    pub(crate) containing_type: Option<MessageId>,
}

impl EnumDescriptor {
    pub fn id(&self) -> EnumId {
        self.id
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn name(&self) -> &str {
        short_name(&self.full_name)
    }

    /// Name of `number`. With aliases, the first declared name wins.
    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.by_number
            .get(&number)
            .map(|&i| self.values[i].0.as_ref())
    }

    pub fn value_of(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).copied()
    }

    /// `(name, number)` pairs in declaration order.
    pub fn values(&self) -> impl Iterator<Item = (&str, i32)> + '_ {
        self.values
            .iter()
            .map(|(name, number)| (name.as_ref(), *number))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The first declared value, which is the implicit default.
    pub fn default_number(&self) -> i32 {
        self.values.first().map_or(0, |(_, number)| *number)
    }

    pub fn containing_type(&self) -> Option<MessageId> {
        self.containing_type
    }
}

fn short_name(full_name: &str) -> &str {
    full_name
        .rsplit_once('.')
        .map_or(full_name, |(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_table_matches_discriminants() {
        for (i, proto_type) in ALL_PROTO_TYPES.into_iter().enumerate() {
            assert_eq!(proto_type as usize, i + 1);
            assert_eq!(ProtoType::from_i32(i as i32 + 1), Some(proto_type));
            assert_eq!(ProtoType::from_name(proto_type.name()), Some(proto_type));
        }
        assert_eq!(ProtoType::from_i32(0), None);
        assert_eq!(ProtoType::from_i32(19), None);
    }

    #[test]
    fn native_wire_types() {
        assert_eq!(ProtoType::Sint64.native_wire_type(), WireType::Varint);
        assert_eq!(ProtoType::Double.native_wire_type(), WireType::SixtyFourBit);
        assert_eq!(ProtoType::Float.native_wire_type(), WireType::ThirtyTwoBit);
        assert_eq!(ProtoType::Group.native_wire_type(), WireType::StartGroup);
        assert_eq!(ProtoType::Bytes.native_wire_type(), WireType::LengthDelimited);
    }

    #[test]
    fn repeated_primitives_admit_packed_payloads() {
        let packed = ProtoType::Fixed32.allowed_wire_types(true);
        assert!(packed.contains(WireType::ThirtyTwoBit));
        assert!(packed.contains(WireType::LengthDelimited));

        let single = ProtoType::Fixed32.allowed_wire_types(false);
        assert!(!single.contains(WireType::LengthDelimited));

        let strings = ProtoType::String.allowed_wire_types(true);
        assert_eq!(strings, WireTypeSet::of(WireType::LengthDelimited));
        assert!(!ProtoType::Message.allowed_wire_types(true).contains(WireType::Varint));
    }

    #[test]
    fn short_names() {
        assert_eq!(short_name("a.b.C"), "C");
        assert_eq!(short_name("C"), "C");
    }
}
