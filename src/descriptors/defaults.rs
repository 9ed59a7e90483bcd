//! Parsing of the textual `default_value` carried by field descriptors.

use super::{DefaultValue, EnumDescriptor, ProtoType};
use prost::bytes::Bytes;

/// Parses `text` as a default of `proto_type`. Enum defaults are given by
/// value name and need the enum's descriptor.
pub(crate) fn parse_default(
    proto_type: ProtoType,
    text: &str,
    enum_type: Option<&EnumDescriptor>,
) -> Option<DefaultValue> {
    let value = match proto_type {
        ProtoType::Bool => match text {
            "true" => DefaultValue::Bool(true),
            "false" => DefaultValue::Bool(false),
            _ => return None,
        },
        ProtoType::Int32 | ProtoType::Sint32 | ProtoType::Sfixed32 => {
            DefaultValue::Int32(text.parse().ok()?)
        }
        ProtoType::Int64 | ProtoType::Sint64 | ProtoType::Sfixed64 => {
            DefaultValue::Int64(text.parse().ok()?)
        }
        ProtoType::Uint32 | ProtoType::Fixed32 => DefaultValue::Uint32(text.parse().ok()?),
        ProtoType::Uint64 | ProtoType::Fixed64 => DefaultValue::Uint64(text.parse().ok()?),
        ProtoType::Float => DefaultValue::Float(parse_float(text)? as f32),
        ProtoType::Double => DefaultValue::Double(parse_float(text)?),
        ProtoType::String => DefaultValue::String(text.into()),
        ProtoType::Bytes => DefaultValue::Bytes(Bytes::from(unescape_bytes(text)?)),
        ProtoType::Enum => DefaultValue::Enum(enum_type?.value_of(text)?),
        ProtoType::Message | ProtoType::Group => return None,
    };
    Some(value)
}

/// The default used when a field declares none. `None` for submessages.
pub(crate) fn zero_default(
    proto_type: ProtoType,
    enum_type: Option<&EnumDescriptor>,
) -> Option<DefaultValue> {
    let value = match proto_type {
        ProtoType::Bool => DefaultValue::Bool(false),
        ProtoType::Int32 | ProtoType::Sint32 | ProtoType::Sfixed32 => DefaultValue::Int32(0),
        ProtoType::Int64 | ProtoType::Sint64 | ProtoType::Sfixed64 => DefaultValue::Int64(0),
        ProtoType::Uint32 | ProtoType::Fixed32 => DefaultValue::Uint32(0),
        ProtoType::Uint64 | ProtoType::Fixed64 => DefaultValue::Uint64(0),
        ProtoType::Float => DefaultValue::Float(0.0),
        ProtoType::Double => DefaultValue::Double(0.0),
        ProtoType::String => DefaultValue::String("".into()),
        ProtoType::Bytes => DefaultValue::Bytes(Bytes::new()),
        ProtoType::Enum => DefaultValue::Enum(enum_type.map_or(0, EnumDescriptor::default_number)),
        ProtoType::Message | ProtoType::Group => return None,
    };
    Some(value)
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        "nan" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

/// Reverses C-style escaping as written by protoc for `bytes` defaults.
fn unescape_bytes(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.bytes().peekable();
    while let Some(byte) = bytes.next() {
        if byte != b'\\' {
            out.push(byte);
            continue;
        }
        let escaped = bytes.next()?;
        let value = match escaped {
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'v' => 0x0b,
            b'\\' | b'\'' | b'"' | b'?' => escaped,
            b'0'..=b'7' => {
                let mut value = u32::from(escaped - b'0');
                for _ in 0..2 {
                    match bytes.peek() {
                        Some(&digit @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(digit - b'0');
                            bytes.next();
                        }
                        _ => break,
                    }
                }
                u8::try_from(value).ok()?
            }
            b'x' => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 2 {
                    match bytes.peek().and_then(|&digit| (digit as char).to_digit(16)) {
                        Some(digit) => {
                            value = value * 16 + digit;
                            digits += 1;
                            bytes.next();
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    return None;
                }
                value as u8
            }
            _ => return None,
        };
        out.push(value);
    }
    Some(out)
}
