#![allow(dead_code)]

use pbstream::{
    ByteString, FieldDescriptor, FieldProto, FileProto, Handlers, MessageProto, ProtoType,
    Registry, Status, StatusCode, UnknownValue, Value, Verdict,
};
use std::fmt::Write;

/// Records every callback as one line of an indented transcript.
#[derive(Debug, Default)]
pub struct Recorder {
    pub transcript: String,
    depth: usize,
    /// Start of the submessage with this field number returns `SkipSubmessage`.
    pub skip_field: Option<u32>,
    /// Value of the field with this number returns `Break`.
    pub break_on: Option<u32>,
    /// String and bytes payloads, kept alive past their callbacks.
    pub payloads: Vec<ByteString>,
    pub final_status: Option<Status>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skipping(field_number: u32) -> Self {
        Self {
            skip_field: Some(field_number),
            ..Self::default()
        }
    }

    pub fn breaking_on(field_number: u32) -> Self {
        Self {
            break_on: Some(field_number),
            ..Self::default()
        }
    }

    fn line(&mut self, args: std::fmt::Arguments<'_>) {
        for _ in 0..self.depth {
            self.transcript.push_str("  ");
        }
        self.transcript
            .write_fmt(args)
            .expect("writing to a String cannot fail");
        self.transcript.push('\n');
    }

    /// The transcript minus the `start_message`/`end_message` bracket.
    pub fn fields(&self) -> Vec<&str> {
        self.transcript
            .lines()
            .filter(|line| !line.starts_with("start_message") && !line.starts_with("end_message"))
            .collect()
    }

    pub fn final_code(&self) -> Option<StatusCode> {
        self.final_status.as_ref().map(Status::code)
    }
}

impl Handlers for Recorder {
    fn start_message(&mut self) -> Verdict {
        self.line(format_args!("start_message"));
        Verdict::Continue
    }

    fn end_message(&mut self, status: &Status) {
        self.line(format_args!("end_message {:?}", status.code()));
        self.final_status = Some(status.clone());
    }

    fn value(&mut self, field: &FieldDescriptor, value: Value<'_>) -> Verdict {
        self.line(format_args!("value {} = {value:?}", field.number()));
        if let Some(payload) = value.as_bytestring() {
            self.payloads.push(payload.clone());
        }
        if self.break_on == Some(field.number()) {
            return Verdict::Break;
        }
        Verdict::Continue
    }

    fn start_submessage(&mut self, field: &FieldDescriptor) -> Verdict {
        if self.skip_field == Some(field.number()) {
            self.line(format_args!("start_submessage {} -> skip", field.number()));
            return Verdict::SkipSubmessage;
        }
        self.line(format_args!("start_submessage {}", field.number()));
        self.depth += 1;
        Verdict::Continue
    }

    fn end_submessage(&mut self, field: &FieldDescriptor) -> Verdict {
        self.depth -= 1;
        self.line(format_args!("end_submessage {}", field.number()));
        Verdict::Continue
    }

    fn unknown_field(&mut self, field_number: u32, value: UnknownValue<'_>) -> Verdict {
        self.line(format_args!("unknown {field_number} = {value:?}"));
        Verdict::Continue
    }
}

/// ```text
/// message Scalar { int32 x = 1; }
/// message Text { string s = 1; }
/// message Node {
///   int32 x = 1;
///   Node inner = 2;
///   repeated sint64 values = 3 [packed = true];
///   string label = 4;
/// }
/// message Holder { group Item = 4 { int32 id = 1; } }
/// message Wrapper { Holder holder = 1; }
/// message Counter { uint64 n = 1; }
/// ```
pub fn test_registry() -> Registry {
    let file = FileProto::new("test.proto", "test")
        .message(MessageProto::new("Scalar").field(FieldProto::new("x", 1, ProtoType::Int32)))
        .message(MessageProto::new("Text").field(FieldProto::new("s", 1, ProtoType::String)))
        .message(
            MessageProto::new("Node")
                .field(FieldProto::new("x", 1, ProtoType::Int32))
                .field(FieldProto::linked("inner", 2, ProtoType::Message, "Node"))
                .field(FieldProto::new("values", 3, ProtoType::Sint64).repeated().packed(true))
                .field(FieldProto::new("label", 4, ProtoType::String)),
        )
        .message(
            MessageProto::new("Holder")
                .nested(MessageProto::new("Item").field(FieldProto::new("id", 1, ProtoType::Int32)))
                .field(FieldProto::linked("item", 4, ProtoType::Group, "Item")),
        )
        .message(MessageProto::new("Wrapper").field(FieldProto::linked(
            "holder",
            1,
            ProtoType::Message,
            "Holder",
        )))
        .message(MessageProto::new("Counter").field(FieldProto::new("n", 1, ProtoType::Uint64)));
    let mut builder = Registry::builder();
    builder.add_file(file);
    builder.finalize().expect("test schema is valid")
}

/// Splits `bytes` into chunks at each offset in `cuts`.
pub fn split_at(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for &cut in cuts {
        chunks.push(bytes[start..cut].to_vec());
        start = cut;
    }
    chunks.push(bytes[start..].to_vec());
    chunks.retain(|chunk| !chunk.is_empty());
    chunks
}
