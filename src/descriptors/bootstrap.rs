//! The subset of `google/protobuf/descriptor.proto` used to read descriptor
//! sets, built once and shared.

use super::{
    builder::{EnumProto, FieldProto, FileProto, MessageProto, RegistryBuilder},
    ProtoType, Registry,
};
use std::sync::OnceLock;

pub(crate) const FILE_DESCRIPTOR_SET: &str = "google.protobuf.FileDescriptorSet";

pub(crate) fn descriptor_registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut builder = RegistryBuilder::new();
        builder.add_file(descriptor_file());
        builder
            .finalize()
            .expect("Built-in descriptor schema is valid")
    })
}

fn scalar(name: &str, number: i32, proto_type: ProtoType) -> FieldProto {
    FieldProto::new(name, number, proto_type)
}

fn message(name: &str, number: i32, type_name: &str) -> FieldProto {
    FieldProto::linked(name, number, ProtoType::Message, type_name)
}

fn descriptor_file() -> FileProto {
    FileProto::new("google/protobuf/descriptor.proto", "google.protobuf")
        .message(
            MessageProto::new("FileDescriptorSet")
                .field(message("file", 1, "FileDescriptorProto").repeated()),
        )
        .message(
            MessageProto::new("FileDescriptorProto")
                .field(scalar("name", 1, ProtoType::String))
                .field(scalar("package", 2, ProtoType::String))
                .field(scalar("dependency", 3, ProtoType::String).repeated())
                .field(message("message_type", 4, "DescriptorProto").repeated())
                .field(message("enum_type", 5, "EnumDescriptorProto").repeated())
                .field(message("extension", 7, "FieldDescriptorProto").repeated())
                .field(scalar("syntax", 12, ProtoType::String)),
        )
        .message(
            MessageProto::new("DescriptorProto")
                .field(scalar("name", 1, ProtoType::String))
                .field(message("field", 2, "FieldDescriptorProto").repeated())
                .field(message("nested_type", 3, "DescriptorProto").repeated())
                .field(message("enum_type", 4, "EnumDescriptorProto").repeated())
                .field(message("extension", 6, "FieldDescriptorProto").repeated()),
        )
        .message(
            MessageProto::new("FieldDescriptorProto")
                .field(scalar("name", 1, ProtoType::String))
                .field(scalar("extendee", 2, ProtoType::String))
                .field(scalar("number", 3, ProtoType::Int32))
                .field(FieldProto::linked("label", 4, ProtoType::Enum, "Label"))
                .field(FieldProto::linked("type", 5, ProtoType::Enum, "Type"))
                .field(scalar("type_name", 6, ProtoType::String))
                .field(scalar("default_value", 7, ProtoType::String))
                .field(message("options", 8, "FieldOptions"))
                .field(scalar("oneof_index", 9, ProtoType::Int32))
                .field(scalar("json_name", 10, ProtoType::String))
                .field(scalar("proto3_optional", 17, ProtoType::Bool))
                .enum_type(
                    EnumProto::new("Type")
                        .value("TYPE_DOUBLE", 1)
                        .value("TYPE_FLOAT", 2)
                        .value("TYPE_INT64", 3)
                        .value("TYPE_UINT64", 4)
                        .value("TYPE_INT32", 5)
                        .value("TYPE_FIXED64", 6)
                        .value("TYPE_FIXED32", 7)
                        .value("TYPE_BOOL", 8)
                        .value("TYPE_STRING", 9)
                        .value("TYPE_GROUP", 10)
                        .value("TYPE_MESSAGE", 11)
                        .value("TYPE_BYTES", 12)
                        .value("TYPE_UINT32", 13)
                        .value("TYPE_ENUM", 14)
                        .value("TYPE_SFIXED32", 15)
                        .value("TYPE_SFIXED64", 16)
                        .value("TYPE_SINT32", 17)
                        .value("TYPE_SINT64", 18),
                )
                .enum_type(
                    EnumProto::new("Label")
                        .value("LABEL_OPTIONAL", 1)
                        .value("LABEL_REQUIRED", 2)
                        .value("LABEL_REPEATED", 3),
                ),
        )
        .message(MessageProto::new("FieldOptions").field(scalar("packed", 2, ProtoType::Bool)))
        .message(
            MessageProto::new("EnumDescriptorProto")
                .field(scalar("name", 1, ProtoType::String))
                .field(message("value", 2, "EnumValueDescriptorProto").repeated()),
        )
        .message(
            MessageProto::new("EnumValueDescriptorProto")
                .field(scalar("name", 1, ProtoType::String))
                .field(scalar("number", 2, ProtoType::Int32)),
        )
}
