use crate::descriptors::{FieldDescriptor, MessageDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameEnd {
    /// The top-level message runs to the end of the stream.
    Eof,
    /// A length-delimited submessage ending at this stream offset.
    Offset(u64),
    /// A group closed by an EndGroup tag with this field number.
    Group(u32),
}

/// One level of the submessage stack.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame<'r> {
    pub msg: &'r MessageDescriptor,
    /// The field that opened this frame; `None` at the top level and for
    /// unknown groups.
    pub field: Option<&'r FieldDescriptor>,
    pub end: FrameEnd,
    /// End offset of the innermost length-delimited frame, this one included.
    pub limit: Option<u64>,
    /// Contents are consumed without callbacks, and no `end_submessage` is
    /// delivered when the frame closes.
    pub skipping: bool,
}

impl<'r> Frame<'r> {
    pub fn root(msg: &'r MessageDescriptor) -> Self {
        Self {
            msg,
            field: None,
            end: FrameEnd::Eof,
            limit: None,
            skipping: false,
        }
    }

    pub fn submessage(
        msg: &'r MessageDescriptor,
        field: &'r FieldDescriptor,
        end: FrameEnd,
    ) -> Self {
        Self {
            msg,
            field: Some(field),
            end,
            limit: None,
            skipping: false,
        }
    }

    /// A frame whose contents are discarded.
    pub fn skipped(msg: &'r MessageDescriptor, end: FrameEnd) -> Self {
        Self {
            msg,
            field: None,
            end,
            limit: None,
            skipping: true,
        }
    }
}
