mod bytestring;
mod decode;
mod descriptors;
mod handlers;
mod source;
mod status;
pub mod wire;

pub use bytestring::ByteString;
pub use decode::{
    DecodeError, DecodeResult, Decoder, DecoderOptions, PackedValues, WireTypePolicy,
};
pub use descriptors::{
    DefId, DefaultValue, EnumDescriptor, EnumId, EnumProto, EnumValueProto, FieldDescriptor,
    FieldProto, FileProto, Label, MessageDescriptor, MessageId, MessageProto, ProtoType, Registry,
    RegistryBuilder, RegistryError, RegistryLimits, RegistryResult,
};
pub use handlers::{Handlers, NoopHandlers, UnknownValue, Value, Verdict};
pub use source::{ByteSource, ChunkedSource, ReadSource, SliceSource};
pub use status::{Status, StatusCode};

use std::sync::Arc;

pub type Str = Arc<str>;

/// Decodes one complete `message` held in memory.
pub fn decode<H: Handlers + ?Sized>(
    registry: &Registry,
    message: &MessageDescriptor,
    bytes: impl Into<ByteString>,
    handlers: &mut H,
) -> DecodeResult<()> {
    let mut source = SliceSource::new(bytes);
    Decoder::new(registry, message).run(&mut source, handlers)
}
