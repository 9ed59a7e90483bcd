//! Callbacks driven by the decoder.

use crate::{bytestring::ByteString, descriptors::FieldDescriptor, status::Status};

/// What the decoder should do after a callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verdict {
    #[default]
    Continue,
    /// Skip the rest of the current submessage without dispatching it.
    SkipSubmessage,
    /// Stop decoding with an error status.
    Break,
}

/// A decoded field value, already converted to the field's declared type.
///
/// Payload references are borrowed for the duration of the callback; clone
/// the [`ByteString`] to keep it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Enum numbers are passed through whether or not the enum declares them.
    Enum(i32),
    String(&'a ByteString),
    Bytes(&'a ByteString),
    /// The undecoded payload of a packed repeated field.
    ///
    /// See [`PackedValues`](crate::PackedValues).
    Packed(&'a ByteString),
}

impl<'a> Value<'a> {
    /// The payload of a length-delimited value.
    pub fn as_bytestring(&self) -> Option<&'a ByteString> {
        match *self {
            Value::String(bytes) | Value::Bytes(bytes) | Value::Packed(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// The raw wire value of a field the message descriptor does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Fixed32(u32),
    Delimited(&'a ByteString),
    /// A group; its contents are skipped after the callback.
    Group,
}

/// Receiver for decoder events. Every method defaults to doing nothing and
/// returning [`Verdict::Continue`].
pub trait Handlers {
    fn start_message(&mut self) -> Verdict {
        Verdict::Continue
    }

    /// Called once per run with the final status, including on failure.
    fn end_message(&mut self, _status: &Status) {}

    fn value(&mut self, _field: &FieldDescriptor, _value: Value<'_>) -> Verdict {
        Verdict::Continue
    }

    fn start_submessage(&mut self, _field: &FieldDescriptor) -> Verdict {
        Verdict::Continue
    }

    fn end_submessage(&mut self, _field: &FieldDescriptor) -> Verdict {
        Verdict::Continue
    }

    fn unknown_field(&mut self, _field_number: u32, _value: UnknownValue<'_>) -> Verdict {
        Verdict::Continue
    }
}

impl<H: Handlers + ?Sized> Handlers for &mut H {
    fn start_message(&mut self) -> Verdict {
        (**self).start_message()
    }

    fn end_message(&mut self, status: &Status) {
        (**self).end_message(status)
    }

    fn value(&mut self, field: &FieldDescriptor, value: Value<'_>) -> Verdict {
        (**self).value(field, value)
    }

    fn start_submessage(&mut self, field: &FieldDescriptor) -> Verdict {
        (**self).start_submessage(field)
    }

    fn end_submessage(&mut self, field: &FieldDescriptor) -> Verdict {
        (**self).end_submessage(field)
    }

    fn unknown_field(&mut self, field_number: u32, value: UnknownValue<'_>) -> Verdict {
        (**self).unknown_field(field_number, value)
    }
}

/// Handlers that accept everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandlers;

impl Handlers for NoopHandlers {}
