use std::fmt;

/// Outcome codes shared by every fallible operation in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatusCode {
    #[default]
    Ok,
    /// The byte source has no data right now; calling again may succeed.
    TryAgain,
    /// A field arrived with a wire type its descriptor does not allow.
    BadWireType,
    Error,
    UnterminatedVarint,
    MaxNestingExceeded,
    /// End of stream. Normal at the top level, fatal inside a message.
    Eof,
}

impl StatusCode {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Ok => "ok",
            StatusCode::TryAgain => "try again",
            StatusCode::BadWireType => "bad wire type",
            StatusCode::Error => "error",
            StatusCode::UnterminatedVarint => "unterminated varint",
            StatusCode::MaxNestingExceeded => "max nesting exceeded",
            StatusCode::Eof => "end of stream",
        }
    }

    /// Whether a decode that hit this code can be resumed.
    pub fn is_resumable(self) -> bool {
        matches!(self, StatusCode::Ok | StatusCode::TryAgain)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status code plus an optional message.
///
/// The first non-OK status recorded wins: once an error is set, later calls
/// to [`Status::set`] are ignored until [`Status::clear`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    code: StatusCode,
    message: Option<String>,
}

impl Status {
    pub const fn new() -> Self {
        Self {
            code: StatusCode::Ok,
            message: None,
        }
    }

    pub fn with_message(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// Records `code` and a formatted message if this status is still OK.
    ///
    /// Returns whether the status was updated.
    pub fn set(&mut self, code: StatusCode, args: fmt::Arguments<'_>) -> bool {
        if !self.is_ok() {
            return false;
        }
        self.code = code;
        self.message = Some(args.to_string());
        true
    }

    /// Copies `other` into `self` under the same first-error-wins rule.
    pub fn set_from(&mut self, other: &Status) -> bool {
        if !self.is_ok() || other.is_ok() {
            return false;
        }
        self.code = other.code;
        self.message = other.message.clone();
        true
    }

    pub fn clear(&mut self) {
        self.code = StatusCode::Ok;
        self.message = None;
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for Status {}
