//! Reads a serialized `FileDescriptorSet` by running the decoder over the
//! built-in descriptor schema.

use super::{
    bootstrap::{descriptor_registry, FILE_DESCRIPTOR_SET},
    builder::{EnumProto, EnumValueProto, FieldProto, FileProto, MessageProto},
    FieldDescriptor, Label, ProtoType, RegistryError, RegistryResult,
};
use crate::{
    bytestring::ByteString,
    decode::Decoder,
    handlers::{Handlers, Value, Verdict},
    source::SliceSource,
};
use tracing::trace;

pub(crate) fn parse_file_descriptor_set(bytes: ByteString) -> RegistryResult<Vec<FileProto>> {
    let registry = descriptor_registry();
    let message = registry
        .lookup_message(FILE_DESCRIPTOR_SET)
        .expect("Built-in schema defines FileDescriptorSet");
    let mut reader = DescriptorSetReader::default();
    let mut source = SliceSource::new(bytes);
    let result = Decoder::new(registry, message).run(&mut source, &mut reader);
    if let Some(err) = reader.error {
        return Err(err);
    }
    result?;
    Ok(reader.files)
}

/// Partially built definition; the innermost one is on top of the stack.
#[derive(Debug)]
enum Node {
    File(FileProto),
    Message(MessageProto),
    Field(FieldProto),
    FieldOptions(Option<bool>),
    Enum(EnumProto),
    EnumValue(EnumValueProto),
}

#[derive(Debug, Default)]
struct DescriptorSetReader {
    files: Vec<FileProto>,
    stack: Vec<Node>,
    error: Option<RegistryError>,
}

impl DescriptorSetReader {
    fn string(&mut self, value: Value<'_>, what: &'static str) -> Option<String> {
        let text = value.as_bytestring()?.as_str();
        match text {
            Ok(text) => Some(text.to_owned()),
            Err(_) => {
                self.error = Some(RegistryError::InvalidUtf8(what));
                None
            }
        }
    }

    fn child_for(&self, number: u32) -> Option<Node> {
        let node = match (self.stack.last(), number) {
            (None, 1) => Node::File(FileProto::default()),
            (Some(Node::File(_)), 4) | (Some(Node::Message(_)), 3) => {
                Node::Message(MessageProto::default())
            }
            (Some(Node::File(_)), 5) | (Some(Node::Message(_)), 4) => {
                Node::Enum(EnumProto::default())
            }
            (Some(Node::File(_)), 7) | (Some(Node::Message(_)), 2 | 6) => {
                Node::Field(FieldProto::default())
            }
            (Some(Node::Field(_)), 8) => Node::FieldOptions(None),
            (Some(Node::Enum(_)), 2) => Node::EnumValue(EnumValueProto::default()),
            _ => return None,
        };
        Some(node)
    }
}

impl Handlers for DescriptorSetReader {
    fn start_submessage(&mut self, field: &FieldDescriptor) -> Verdict {
        match self.child_for(field.number()) {
            Some(node) => {
                self.stack.push(node);
                Verdict::Continue
            }
            None => {
                trace!(field = field.full_name(), "skipping descriptor submessage");
                Verdict::SkipSubmessage
            }
        }
    }

    fn end_submessage(&mut self, field: &FieldDescriptor) -> Verdict {
        let Some(child) = self.stack.pop() else {
            return Verdict::Break;
        };
        match (self.stack.last_mut(), field.number(), child) {
            (None, 1, Node::File(file)) => self.files.push(file),
            (Some(Node::File(file)), 4, Node::Message(message)) => file.messages.push(message),
            (Some(Node::File(file)), 5, Node::Enum(enum_type)) => file.enums.push(enum_type),
            (Some(Node::File(file)), 7, Node::Field(extension)) => {
                file.extensions.push(extension)
            }
            (Some(Node::Message(parent)), 2, Node::Field(field)) => parent.fields.push(field),
            (Some(Node::Message(parent)), 3, Node::Message(nested)) => {
                parent.nested_messages.push(nested)
            }
            (Some(Node::Message(parent)), 4, Node::Enum(enum_type)) => {
                parent.enums.push(enum_type)
            }
            (Some(Node::Message(parent)), 6, Node::Field(extension)) => {
                parent.extensions.push(extension)
            }
            (Some(Node::Field(field)), 8, Node::FieldOptions(packed)) => field.packed = packed,
            (Some(Node::Enum(enum_type)), 2, Node::EnumValue(value)) => {
                enum_type.values.push(value)
            }
            _ => return Verdict::Break,
        }
        Verdict::Continue
    }

    fn value(&mut self, field: &FieldDescriptor, value: Value<'_>) -> Verdict {
        let number = field.number();
        let what = match (self.stack.last(), number) {
            (Some(Node::File(_)), 1) => "file name",
            (Some(Node::File(_)), 2) => "package",
            (Some(Node::File(_)), 12) => "syntax",
            (Some(Node::Message(_)), 1) => "message name",
            (Some(Node::Enum(_)), 1) => "enum name",
            (Some(Node::EnumValue(_)), 1) => "enum value name",
            (Some(Node::Field(_)), 1) => "field name",
            (Some(Node::Field(_)), 2) => "extendee",
            (Some(Node::Field(_)), 6) => "type name",
            (Some(Node::Field(_)), 7) => "default value",
            _ => "",
        };
        let text = if what.is_empty() {
            None
        } else {
            match self.string(value, what) {
                Some(text) => Some(text),
                None => return Verdict::Break,
            }
        };

        match (self.stack.last_mut(), number, value, text) {
            (Some(Node::File(file)), 1, _, Some(name)) => file.name = name,
            (Some(Node::File(file)), 2, _, Some(package)) => file.package = package,
            (Some(Node::File(file)), 12, _, Some(syntax)) => file.syntax = syntax,
            (Some(Node::Message(message)), 1, _, Some(name)) => message.name = name,
            (Some(Node::Enum(enum_type)), 1, _, Some(name)) => enum_type.name = name,
            (Some(Node::EnumValue(enum_value)), 1, _, Some(name)) => enum_value.name = name,
            (Some(Node::EnumValue(enum_value)), 2, Value::I32(n), _) => enum_value.number = n,
            (Some(Node::FieldOptions(packed)), 2, Value::Bool(flag), _) => *packed = Some(flag),
            (Some(Node::Field(field)), 1, _, Some(name)) => field.name = name,
            (Some(Node::Field(field)), 2, _, Some(extendee)) => field.extendee = Some(extendee),
            (Some(Node::Field(field)), 6, _, Some(type_name)) => field.type_name = Some(type_name),
            (Some(Node::Field(field)), 7, _, Some(default)) => field.default_value = Some(default),
            (Some(Node::Field(field)), 3, Value::I32(n), _) => field.number = n,
            (Some(Node::Field(field)), 4, Value::Enum(n), _) => field.label = Label::from_i32(n),
            (Some(Node::Field(field)), 5, Value::Enum(n), _) => {
                field.proto_type = ProtoType::from_i32(n)
            }
            _ => {}
        }
        Verdict::Continue
    }
}
