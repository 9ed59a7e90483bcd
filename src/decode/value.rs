use super::DecodeResult;
use crate::{
    descriptors::{FieldDescriptor, ProtoType},
    handlers::Value,
    wire::{zigzag_decode32, zigzag_decode64},
};
use prost::encoding::{self as enc, DecodeContext, WireType};

/// Interprets a raw varint as a value of `proto_type`.
pub(crate) fn from_varint(proto_type: ProtoType, raw: u64) -> Value<'static> {
    match proto_type {
        ProtoType::Bool => Value::Bool(raw != 0),
        ProtoType::Int32 => Value::I32(raw as i32),
        ProtoType::Int64 => Value::I64(raw as i64),
        ProtoType::Uint32 => Value::U32(raw as u32),
        ProtoType::Uint64 => Value::U64(raw),
        ProtoType::Sint32 => Value::I32(zigzag_decode32(raw as u32)),
        ProtoType::Sint64 => Value::I64(zigzag_decode64(raw)),
        ProtoType::Enum => Value::Enum(raw as i32),
        other => unreachable!("{} is not a varint type", other.name()),
    }
}

pub(crate) fn from_fixed32(proto_type: ProtoType, raw: u32) -> Value<'static> {
    match proto_type {
        ProtoType::Fixed32 => Value::U32(raw),
        ProtoType::Sfixed32 => Value::I32(raw as i32),
        ProtoType::Float => Value::F32(f32::from_bits(raw)),
        other => unreachable!("{} is not a 32-bit type", other.name()),
    }
}

pub(crate) fn from_fixed64(proto_type: ProtoType, raw: u64) -> Value<'static> {
    match proto_type {
        ProtoType::Fixed64 => Value::U64(raw),
        ProtoType::Sfixed64 => Value::I64(raw as i64),
        ProtoType::Double => Value::F64(f64::from_bits(raw)),
        other => unreachable!("{} is not a 64-bit type", other.name()),
    }
}

/// Iterates the elements of a packed repeated field's payload.
///
/// ```
/// # use pbstream::{PackedValues, Value, ProtoType};
/// let values: Vec<_> = PackedValues::of_type(ProtoType::Sint32, &[0x01, 0x04])
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(values, vec![Value::I32(-1), Value::I32(2)]);
/// ```
#[derive(Debug, Clone)]
pub struct PackedValues<'a> {
    proto_type: ProtoType,
    buf: &'a [u8],
}

impl<'a> PackedValues<'a> {
    pub fn new(field: &FieldDescriptor, payload: &'a [u8]) -> Self {
        Self::of_type(field.proto_type(), payload)
    }

    /// # Panics
    ///
    /// Panics if `proto_type` cannot be packed.
    pub fn of_type(proto_type: ProtoType, payload: &'a [u8]) -> Self {
        assert!(
            proto_type.is_packable(),
            "{} fields cannot be packed",
            proto_type.name()
        );
        Self {
            proto_type,
            buf: payload,
        }
    }

    fn parse_next(&mut self) -> DecodeResult<Value<'static>> {
        let ctx = DecodeContext::default;
        let buf = &mut self.buf;
        let value = match self.proto_type {
            ProtoType::Bool => {
                let mut value = Default::default();
                enc::bool::merge(WireType::Varint, &mut value, buf, ctx())?;
                Value::Bool(value)
            }
            ProtoType::Double => {
                let mut value = Default::default();
                enc::double::merge(WireType::SixtyFourBit, &mut value, buf, ctx())?;
                Value::F64(value)
            }
            ProtoType::Float => {
                let mut value = Default::default();
                enc::float::merge(WireType::ThirtyTwoBit, &mut value, buf, ctx())?;
                Value::F32(value)
            }
            ProtoType::Fixed32 => {
                let mut value = Default::default();
                enc::fixed32::merge(WireType::ThirtyTwoBit, &mut value, buf, ctx())?;
                Value::U32(value)
            }
            ProtoType::Fixed64 => {
                let mut value = Default::default();
                enc::fixed64::merge(WireType::SixtyFourBit, &mut value, buf, ctx())?;
                Value::U64(value)
            }
            ProtoType::Sfixed32 => {
                let mut value = Default::default();
                enc::sfixed32::merge(WireType::ThirtyTwoBit, &mut value, buf, ctx())?;
                Value::I32(value)
            }
            ProtoType::Sfixed64 => {
                let mut value = Default::default();
                enc::sfixed64::merge(WireType::SixtyFourBit, &mut value, buf, ctx())?;
                Value::I64(value)
            }
            ProtoType::Int32 => {
                let mut value = Default::default();
                enc::int32::merge(WireType::Varint, &mut value, buf, ctx())?;
                Value::I32(value)
            }
            ProtoType::Int64 => {
                let mut value = Default::default();
                enc::int64::merge(WireType::Varint, &mut value, buf, ctx())?;
                Value::I64(value)
            }
            ProtoType::Uint32 => {
                let mut value = Default::default();
                enc::uint32::merge(WireType::Varint, &mut value, buf, ctx())?;
                Value::U32(value)
            }
            ProtoType::Uint64 => {
                let mut value = Default::default();
                enc::uint64::merge(WireType::Varint, &mut value, buf, ctx())?;
                Value::U64(value)
            }
            ProtoType::Sint32 => {
                let mut value = Default::default();
                enc::sint32::merge(WireType::Varint, &mut value, buf, ctx())?;
                Value::I32(value)
            }
            ProtoType::Sint64 => {
                let mut value = Default::default();
                enc::sint64::merge(WireType::Varint, &mut value, buf, ctx())?;
                Value::I64(value)
            }
            ProtoType::Enum => {
                let mut value = Default::default();
                enc::int32::merge(WireType::Varint, &mut value, buf, ctx())?;
                Value::Enum(value)
            }
            ProtoType::String | ProtoType::Bytes | ProtoType::Message | ProtoType::Group => {
                unreachable!("checked in PackedValues::of_type")
            }
        };
        Ok(value)
    }
}

impl Iterator for PackedValues<'_> {
    type Item = DecodeResult<Value<'static>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        let result = self.parse_next();
        if result.is_err() {
            self.buf = &[];
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodeError;

    #[test]
    fn varint_normalization() {
        assert_eq!(from_varint(ProtoType::Int32, u64::MAX), Value::I32(-1));
        assert_eq!(from_varint(ProtoType::Uint32, 1 << 32 | 5), Value::U32(5));
        assert_eq!(from_varint(ProtoType::Sint64, 3), Value::I64(-2));
        assert_eq!(from_varint(ProtoType::Bool, 2), Value::Bool(true));
        assert_eq!(from_varint(ProtoType::Enum, 7), Value::Enum(7));
    }

    #[test]
    fn fixed_normalization() {
        assert_eq!(
            from_fixed32(ProtoType::Float, 1.5f32.to_bits()),
            Value::F32(1.5)
        );
        assert_eq!(from_fixed32(ProtoType::Sfixed32, u32::MAX), Value::I32(-1));
        assert_eq!(
            from_fixed64(ProtoType::Double, (-0.25f64).to_bits()),
            Value::F64(-0.25)
        );
    }

    #[test]
    fn packed_fixed32() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&7u32.to_le_bytes());
        payload.extend_from_slice(&9u32.to_le_bytes());
        let values = PackedValues::of_type(ProtoType::Fixed32, &payload)
            .collect::<DecodeResult<Vec<_>>>()
            .unwrap();
        assert_eq!(values, vec![Value::U32(7), Value::U32(9)]);
    }

    #[test]
    fn truncated_packed_payload() {
        let mut values = PackedValues::of_type(ProtoType::Fixed64, &[1, 2, 3]);
        assert!(matches!(values.next(), Some(Err(DecodeError::Packed(_)))));
        assert!(values.next().is_none());
    }

    #[test]
    #[should_panic]
    fn strings_are_not_packable() {
        PackedValues::of_type(ProtoType::String, b"abc");
    }
}
