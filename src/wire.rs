//! Protocol Buffers wire-format primitives.

use std::fmt;

pub use prost::encoding::WireType;

/// Longest valid varint encoding.
pub const MAX_VARINT_LEN: usize = 10;

/// Tags never need more than five bytes since field numbers fit in 29 bits.
pub const MAX_TAG_LEN: usize = 5;

pub const MIN_FIELD_NUMBER: u32 = 1;
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// Field numbers reserved for the protobuf implementation itself.
pub const RESERVED_FIELD_NUMBERS: std::ops::RangeInclusive<u32> = 19000..=19999;

pub const ALL_WIRE_TYPES: [WireType; 6] = [
    WireType::Varint,
    WireType::SixtyFourBit,
    WireType::LengthDelimited,
    WireType::StartGroup,
    WireType::EndGroup,
    WireType::ThirtyTwoBit,
];

/// Maps the low three bits of a tag to a wire type. Values 6 and 7 are invalid.
pub fn wire_type_from_bits(bits: u32) -> Option<WireType> {
    ALL_WIRE_TYPES.get(bits as usize).copied()
}

pub fn wire_type_name(wire_type: WireType) -> &'static str {
    match wire_type {
        WireType::Varint => "varint",
        WireType::SixtyFourBit => "fixed64",
        WireType::LengthDelimited => "length-delimited",
        WireType::StartGroup => "start-group",
        WireType::EndGroup => "end-group",
        WireType::ThirtyTwoBit => "fixed32",
    }
}

/// Splits a tag into `(field_number, wire_type_bits)`.
#[inline]
pub fn split_tag(tag: u32) -> (u32, u32) {
    (tag >> 3, tag & 7)
}

/// A set of wire types, one bit per type.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct WireTypeSet(u8);

impl WireTypeSet {
    pub const EMPTY: Self = Self(0);

    pub const fn of(wire_type: WireType) -> Self {
        Self(1 << wire_type as u8)
    }

    pub const fn with(self, wire_type: WireType) -> Self {
        Self(self.0 | 1 << wire_type as u8)
    }

    pub fn contains(self, wire_type: WireType) -> bool {
        self.0 & (1 << wire_type as u8) != 0
    }

    pub fn iter(self) -> impl Iterator<Item = WireType> {
        ALL_WIRE_TYPES
            .into_iter()
            .filter(move |wire_type| self.contains(*wire_type))
    }
}

impl fmt::Debug for WireTypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.iter().map(wire_type_name))
            .finish()
    }
}

/// Result of scanning a byte slice for a varint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarintScan {
    /// Decoded value and the number of bytes it occupied.
    Complete(u64, usize),
    /// The slice ended before a terminating byte; more input is needed.
    Truncated,
    /// Ten bytes were read and the last still had its continuation bit set.
    Unterminated,
}

/// Decodes a varint from a window of at least [`MAX_VARINT_LEN`] bytes.
///
/// Bits beyond the 64th are discarded. An eleventh byte is never consulted.
#[inline]
pub fn decode_varint_fast(window: &[u8; MAX_VARINT_LEN]) -> VarintScan {
    let mut value = u64::from(window[0] & 0x7f);
    if window[0] < 0x80 {
        return VarintScan::Complete(value, 1);
    }
    value |= u64::from(window[1] & 0x7f) << 7;
    if window[1] < 0x80 {
        return VarintScan::Complete(value, 2);
    }
    for i in 2..MAX_VARINT_LEN {
        let byte = window[i];
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte < 0x80 {
            return VarintScan::Complete(value, i + 1);
        }
    }
    VarintScan::Unterminated
}

/// Decodes a varint from the front of `buf`, which may be shorter than ten
/// bytes.
pub fn scan_varint(buf: &[u8]) -> VarintScan {
    if let Some(window) = buf.first_chunk::<MAX_VARINT_LEN>() {
        return decode_varint_fast(window);
    }
    let mut value = 0u64;
    for (i, &byte) in buf.iter().enumerate() {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte < 0x80 {
            return VarintScan::Complete(value, i + 1);
        }
    }
    VarintScan::Truncated
}

#[inline]
pub fn zigzag_decode32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

#[inline]
pub fn zigzag_decode64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

#[inline]
pub fn zigzag_encode32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

#[inline]
pub fn zigzag_encode64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}
