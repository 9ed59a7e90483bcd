use crate::{
    status::{Status, StatusCode},
    wire::WireType,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("no data available yet")]
    TryAgain,
    #[error("unterminated varint")]
    UnterminatedVarint,
    #[error("unterminated 32-bit varint")]
    Unterminated32BitVarint,
    #[error("unexpected end of stream inside a message")]
    UnexpectedEof,
    #[error("field {field_number} has wrong wire type {wire_type:?}")]
    BadWireType {
        field_number: u32,
        wire_type: WireType,
    },
    #[error("invalid wire type {bits} for field {field_number}")]
    InvalidWireType { field_number: u32, bits: u32 },
    #[error("invalid field number {0}")]
    InvalidFieldNumber(u32),
    #[error("nesting exceeds the limit of {limit}")]
    MaxNestingExceeded { limit: usize },
    #[error("bad submessage end")]
    BadSubmessageEnd,
    #[error("unexpected EndGroup for field {field_number}")]
    UnexpectedEndGroup { field_number: u32 },
    #[error("callback returned break")]
    CallbackBreak,
    #[error("{0}")]
    Source(Status),
    #[error("malformed packed field: {0}")]
    Packed(#[from] prost::DecodeError),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

impl DecodeError {
    pub fn code(&self) -> StatusCode {
        match self {
            DecodeError::TryAgain => StatusCode::TryAgain,
            DecodeError::UnterminatedVarint | DecodeError::Unterminated32BitVarint => {
                StatusCode::UnterminatedVarint
            }
            DecodeError::UnexpectedEof => StatusCode::Eof,
            DecodeError::BadWireType { .. } => StatusCode::BadWireType,
            DecodeError::MaxNestingExceeded { .. } => StatusCode::MaxNestingExceeded,
            DecodeError::Source(status) => status.code(),
            DecodeError::InvalidWireType { .. }
            | DecodeError::InvalidFieldNumber(_)
            | DecodeError::BadSubmessageEnd
            | DecodeError::UnexpectedEndGroup { .. }
            | DecodeError::CallbackBreak
            | DecodeError::Packed(_) => StatusCode::Error,
        }
    }

    /// Maps a failed source read. End of stream here is always premature.
    pub(crate) fn from_source(status: Status) -> Self {
        match status.code() {
            StatusCode::TryAgain => DecodeError::TryAgain,
            StatusCode::Eof => DecodeError::UnexpectedEof,
            _ => DecodeError::Source(status),
        }
    }
}

impl From<&DecodeError> for Status {
    fn from(value: &DecodeError) -> Self {
        match value {
            DecodeError::Source(status) => status.clone(),
            _ => Status::with_message(value.code(), value.to_string()),
        }
    }
}

impl From<DecodeError> for Status {
    fn from(value: DecodeError) -> Self {
        Status::from(&value)
    }
}
