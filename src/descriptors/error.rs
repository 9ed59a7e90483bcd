use crate::{
    decode::DecodeError,
    status::{Status, StatusCode},
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("The descriptor set could not be decoded: {0}")]
    Decode(#[from] DecodeError),
    #[error("The descriptor set contains invalid UTF-8 in a {0}.")]
    InvalidUtf8(&'static str),
    #[error("Encountered a {0} with no name.")]
    MissingName(&'static str),
    #[error("Invalid name `{0}`.")]
    InvalidName(String),
    #[error("Redefinition of symbol `{0}`.")]
    Redefinition(String),
    #[error("Could not resolve symbol `{symbol}` in context `{context}`.")]
    UnresolvedSymbol { symbol: String, context: String },
    #[error("Field `{field}` refers to `{symbol}`, which is not {expected}.")]
    UnexpectedSymbolKind {
        field: String,
        symbol: String,
        expected: &'static str,
    },
    #[error("Field `{0}` has neither a type nor a type name.")]
    MissingFieldType(String),
    #[error("Field `{0}` is an extension without an extendee.")]
    MissingExtendee(String),
    #[error("Field `{field}` has invalid number {number}.")]
    InvalidFieldNumber { field: String, number: i32 },
    #[error("Message `{message}` declares field number {number} more than once.")]
    DuplicateFieldNumber { message: String, number: u32 },
    #[error("Message `{message}` declares field `{field}` more than once.")]
    DuplicateFieldName { message: String, field: String },
    #[error("Message `{message}` has {count} fields, more than the limit of {limit}.")]
    TooManyFields {
        message: String,
        count: usize,
        limit: usize,
    },
    #[error("Field `{0}` is packed but is not a repeated primitive.")]
    InvalidPacked(String),
    #[error("Field `{field}` has invalid default value `{value}`.")]
    InvalidDefault { field: String, value: String },
    #[error(
        "Type `{message}` was involved in a cycle of length {len}, \
         which exceeds the maximum type cycle length of {limit}."
    )]
    CycleTooLong {
        message: String,
        len: usize,
        limit: usize,
    },
    #[error(
        "Type `{message}` was found at depth {depth} in the type graph, \
         which exceeds the maximum type depth of {limit}."
    )]
    TypeTooDeep {
        message: String,
        depth: usize,
        limit: usize,
    },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

impl RegistryError {
    pub fn code(&self) -> StatusCode {
        match self {
            RegistryError::Decode(err) => err.code(),
            _ => StatusCode::Error,
        }
    }
}

impl From<&RegistryError> for Status {
    fn from(value: &RegistryError) -> Self {
        Status::with_message(value.code(), value.to_string())
    }
}

impl From<RegistryError> for Status {
    fn from(value: RegistryError) -> Self {
        Status::from(&value)
    }
}
