mod error;
mod frame;
mod input;
mod value;

pub use self::error::{DecodeError, DecodeResult};
pub use self::value::PackedValues;

use self::{
    frame::{Frame, FrameEnd},
    input::Input,
    value::{from_fixed32, from_fixed64, from_varint},
};
use crate::{
    descriptors::{FieldDescriptor, MessageDescriptor, ProtoType, Registry},
    handlers::{Handlers, UnknownValue, Value, Verdict},
    source::ByteSource,
    status::{Status, StatusCode},
    wire::{split_tag, wire_type_from_bits, WireType},
};
use tracing::{debug, trace, warn};

/// What to do with a known field that arrives with a wire type its
/// descriptor does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireTypePolicy {
    /// Fail with [`DecodeError::BadWireType`].
    #[default]
    Fatal,
    /// Deliver the field through [`Handlers::unknown_field`] and continue.
    TreatAsUnknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Deepest submessage or group nesting accepted below the top level.
    pub max_nesting: usize,
    pub wire_type_policy: WireTypePolicy,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            max_nesting: 64,
            wire_type_policy: WireTypePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RunState {
    Ready,
    Running,
    Done,
    Failed(DecodeError),
}

/// A resumable pull decoder for one top-level message at a time.
///
/// The byte source and handlers are passed to every [`Decoder::run`] call. A
/// run that returns [`DecodeError::TryAgain`] has left the decoder ready to
/// continue from the same point once the source has more data; every other
/// error is final until the decoder is reset.
pub struct Decoder<'r> {
    registry: &'r Registry,
    message: &'r MessageDescriptor,
    options: DecoderOptions,
    input: Input,
    frames: Vec<Frame<'r>>,
    status: Status,
    state: RunState,
}

impl<'r> Decoder<'r> {
    pub fn new(registry: &'r Registry, message: &'r MessageDescriptor) -> Self {
        Self::with_options(registry, message, DecoderOptions::default())
    }

    /// # Panics
    ///
    /// Panics if `message` does not belong to `registry`.
    pub fn with_options(
        registry: &'r Registry,
        message: &'r MessageDescriptor,
        options: DecoderOptions,
    ) -> Self {
        check_owner(registry, message);
        Self {
            registry,
            message,
            options,
            input: Input::default(),
            frames: vec![Frame::root(message)],
            status: Status::new(),
            state: RunState::Ready,
        }
    }

    /// Prepares to decode a new message of the same type.
    pub fn reset(&mut self) {
        self.reset_to(self.message);
    }

    /// Prepares to decode a new message of type `message`. Internal buffers
    /// are kept.
    pub fn reset_to(&mut self, message: &'r MessageDescriptor) {
        check_owner(self.registry, message);
        if self.state == RunState::Running {
            warn!(
                offset = self.input.offset(),
                "resetting decoder with a message in progress"
            );
        }
        self.message = message;
        self.input.reset();
        self.frames.clear();
        self.frames.push(Frame::root(message));
        self.status.clear();
        self.state = RunState::Ready;
        debug!(message = message.full_name(), "decoder reset");
    }

    pub fn message(&self) -> &'r MessageDescriptor {
        self.message
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    /// Outcome of the latest run.
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Stream offset of the next unread byte.
    pub fn offset(&self) -> u64 {
        self.input.offset()
    }

    /// Current submessage nesting; zero at the top level.
    pub fn depth(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, RunState::Done | RunState::Failed(_))
    }

    /// Decodes from `source`, driving `handlers`, until the top-level
    /// message ends or decoding fails.
    ///
    /// `end_message` is delivered exactly once per message, with the final
    /// status, unless the run stops with `TryAgain`.
    pub fn run<S, H>(&mut self, source: &mut S, handlers: &mut H) -> DecodeResult<()>
    where
        S: ByteSource + ?Sized,
        H: Handlers + ?Sized,
    {
        if let RunState::Failed(err) = &self.state {
            return Err(err.clone());
        }
        match self.state {
            RunState::Done => return Ok(()),
            RunState::Ready => {
                self.state = RunState::Running;
                let verdict = handlers.start_message();
                if let Err(err) = self.apply(verdict) {
                    return self.fail(handlers, err);
                }
            }
            _ => {
                if self.status.code() == StatusCode::TryAgain {
                    self.status.clear();
                }
            }
        }

        match self.parse(source, handlers) {
            Ok(()) => {
                self.state = RunState::Done;
                handlers.end_message(&self.status);
                Ok(())
            }
            Err(DecodeError::TryAgain) => {
                self.input.rewind();
                let err = DecodeError::TryAgain;
                self.status.set(err.code(), format_args!("{err}"));
                trace!(offset = self.input.offset(), "source needs more data");
                Err(err)
            }
            Err(err) => self.fail(handlers, err),
        }
    }

    fn fail<H: Handlers + ?Sized>(
        &mut self,
        handlers: &mut H,
        err: DecodeError,
    ) -> DecodeResult<()> {
        self.status.set_from(&Status::from(&err));
        debug!(offset = self.input.offset(), error = %err, "decode failed");
        handlers.end_message(&self.status);
        self.state = RunState::Failed(err.clone());
        Err(err)
    }

    fn parse<S, H>(&mut self, source: &mut S, handlers: &mut H) -> DecodeResult<()>
    where
        S: ByteSource + ?Sized,
        H: Handlers + ?Sized,
    {
        loop {
            self.input.commit();
            let frame = *self.top();
            match frame.end {
                FrameEnd::Offset(end) => {
                    let offset = self.input.offset();
                    if offset == end {
                        self.pop_frame(handlers)?;
                        continue;
                    }
                    if offset > end {
                        return Err(DecodeError::BadSubmessageEnd);
                    }
                    if frame.skipping {
                        self.input.skip_to(source, end)?;
                        continue;
                    }
                }
                FrameEnd::Eof if frame.skipping => {
                    self.input.skip_all(source)?;
                    return Ok(());
                }
                FrameEnd::Group(_) => {
                    // A group cannot outlive the submessage it was opened in.
                    let offset = self.input.offset();
                    if self.enclosing_end().is_some_and(|end| offset >= end) {
                        return Err(DecodeError::BadSubmessageEnd);
                    }
                }
                FrameEnd::Eof => {}
            }

            let Some(tag) = self.input.read_tag(source)? else {
                return if self.frames.len() == 1 {
                    Ok(())
                } else {
                    Err(DecodeError::UnexpectedEof)
                };
            };
            self.check_bounds()?;
            let (field_number, bits) = split_tag(tag);
            let Some(wire_type) = wire_type_from_bits(bits) else {
                return Err(DecodeError::InvalidWireType { field_number, bits });
            };
            if field_number == 0 {
                return Err(DecodeError::InvalidFieldNumber(0));
            }

            if wire_type == WireType::EndGroup {
                if frame.end != FrameEnd::Group(field_number) {
                    return Err(DecodeError::UnexpectedEndGroup { field_number });
                }
                self.pop_frame(handlers)?;
                continue;
            }
            if frame.skipping {
                self.skip_field(source, field_number, wire_type)?;
                continue;
            }

            let verdict = match frame.msg.find_field(field_number) {
                Some(field) if field.allowed_wire_types().contains(wire_type) => {
                    self.decode_field(source, handlers, field, wire_type)?
                }
                Some(field) if self.options.wire_type_policy == WireTypePolicy::TreatAsUnknown => {
                    trace!(
                        field = field.full_name(),
                        ?wire_type,
                        "treating mistyped field as unknown"
                    );
                    self.decode_unknown(source, handlers, field_number, wire_type)?
                }
                Some(_) => {
                    return Err(DecodeError::BadWireType {
                        field_number,
                        wire_type,
                    })
                }
                None => self.decode_unknown(source, handlers, field_number, wire_type)?,
            };
            self.apply(verdict)?;
        }
    }

    fn decode_field<S, H>(
        &mut self,
        source: &mut S,
        handlers: &mut H,
        field: &'r FieldDescriptor,
        wire_type: WireType,
    ) -> DecodeResult<Verdict>
    where
        S: ByteSource + ?Sized,
        H: Handlers + ?Sized,
    {
        let verdict = match wire_type {
            WireType::Varint => {
                let raw = self.input.read_varint(source)?;
                self.check_bounds()?;
                handlers.value(field, from_varint(field.proto_type(), raw))
            }
            WireType::ThirtyTwoBit => {
                let raw = self.input.read_fixed32(source)?;
                self.check_bounds()?;
                handlers.value(field, from_fixed32(field.proto_type(), raw))
            }
            WireType::SixtyFourBit => {
                let raw = self.input.read_fixed64(source)?;
                self.check_bounds()?;
                handlers.value(field, from_fixed64(field.proto_type(), raw))
            }
            WireType::StartGroup => {
                let msg = self.submessage_type(field);
                self.push(Frame::submessage(msg, field, FrameEnd::Group(field.number())))?;
                handlers.start_submessage(field)
            }
            WireType::LengthDelimited => {
                let len = self.read_length(source)?;
                if field.proto_type() == ProtoType::Message {
                    let msg = self.submessage_type(field);
                    let end = self.input.offset() + len as u64;
                    self.push(Frame::submessage(msg, field, FrameEnd::Offset(end)))?;
                    handlers.start_submessage(field)
                } else {
                    let payload = self.input.read_payload(source, len)?;
                    let value = match field.proto_type() {
                        ProtoType::String => Value::String(payload),
                        ProtoType::Bytes => Value::Bytes(payload),
                        _ => Value::Packed(payload),
                    };
                    handlers.value(field, value)
                }
            }
            WireType::EndGroup => unreachable!("EndGroup is handled before dispatch"),
        };
        Ok(verdict)
    }

    fn decode_unknown<S, H>(
        &mut self,
        source: &mut S,
        handlers: &mut H,
        field_number: u32,
        wire_type: WireType,
    ) -> DecodeResult<Verdict>
    where
        S: ByteSource + ?Sized,
        H: Handlers + ?Sized,
    {
        let verdict = match wire_type {
            WireType::Varint => {
                let raw = self.input.read_varint(source)?;
                self.check_bounds()?;
                handlers.unknown_field(field_number, UnknownValue::Varint(raw))
            }
            WireType::SixtyFourBit => {
                let raw = self.input.read_fixed64(source)?;
                self.check_bounds()?;
                handlers.unknown_field(field_number, UnknownValue::Fixed64(raw))
            }
            WireType::ThirtyTwoBit => {
                let raw = self.input.read_fixed32(source)?;
                self.check_bounds()?;
                handlers.unknown_field(field_number, UnknownValue::Fixed32(raw))
            }
            WireType::LengthDelimited => {
                let len = self.read_length(source)?;
                let payload = self.input.read_payload(source, len)?;
                handlers.unknown_field(field_number, UnknownValue::Delimited(payload))
            }
            WireType::StartGroup => {
                let verdict = handlers.unknown_field(field_number, UnknownValue::Group);
                self.apply(verdict)?;
                let msg = self.top().msg;
                self.push(Frame::skipped(msg, FrameEnd::Group(field_number)))?;
                Verdict::Continue
            }
            WireType::EndGroup => unreachable!("EndGroup is handled before dispatch"),
        };
        Ok(verdict)
    }

    /// Consumes one field inside a skipped group.
    fn skip_field<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        field_number: u32,
        wire_type: WireType,
    ) -> DecodeResult<()> {
        let msg = self.top().msg;
        match wire_type {
            WireType::Varint => {
                self.input.read_varint(source)?;
                self.check_bounds()?;
            }
            WireType::SixtyFourBit => {
                self.input.read_fixed64(source)?;
                self.check_bounds()?;
            }
            WireType::ThirtyTwoBit => {
                self.input.read_fixed32(source)?;
                self.check_bounds()?;
            }
            WireType::LengthDelimited => {
                let len = self.read_length(source)?;
                let end = self.input.offset() + len as u64;
                // Holds no frames of its own, so it is not counted as nesting.
                let frame = self.bounded(Frame::skipped(msg, FrameEnd::Offset(end)));
                self.frames.push(frame);
            }
            WireType::StartGroup => {
                self.push(Frame::skipped(msg, FrameEnd::Group(field_number)))?;
            }
            WireType::EndGroup => unreachable!("EndGroup is handled before dispatch"),
        }
        Ok(())
    }

    /// Reads a length prefix and checks it against the enclosing submessage.
    fn read_length<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> DecodeResult<usize> {
        let len = self.input.read_varint32(source)?;
        let end = self.input.offset() + u64::from(len);
        if self.enclosing_end().is_some_and(|limit| end > limit) {
            return Err(DecodeError::BadSubmessageEnd);
        }
        Ok(len as usize)
    }

    fn enclosing_end(&self) -> Option<u64> {
        self.top().limit
    }

    /// Fails if the last read ran past the end of the enclosing submessage.
    fn check_bounds(&self) -> DecodeResult<()> {
        let offset = self.input.offset();
        if self.enclosing_end().is_some_and(|end| offset > end) {
            return Err(DecodeError::BadSubmessageEnd);
        }
        Ok(())
    }

    /// Groups and the top level inherit the limit of the frame below them.
    fn bounded(&self, mut frame: Frame<'r>) -> Frame<'r> {
        frame.limit = match frame.end {
            FrameEnd::Offset(end) => Some(end),
            FrameEnd::Group(_) | FrameEnd::Eof => self.enclosing_end(),
        };
        frame
    }

    fn push(&mut self, frame: Frame<'r>) -> DecodeResult<()> {
        if self.frames.len() > self.options.max_nesting {
            return Err(DecodeError::MaxNestingExceeded {
                limit: self.options.max_nesting,
            });
        }
        trace!(
            depth = self.frames.len(),
            end = ?frame.end,
            skipping = frame.skipping,
            "push frame"
        );
        let frame = self.bounded(frame);
        self.frames.push(frame);
        Ok(())
    }

    fn pop_frame<H: Handlers + ?Sized>(&mut self, handlers: &mut H) -> DecodeResult<()> {
        let frame = self
            .frames
            .pop()
            .expect("Only submessage frames are popped");
        trace!(depth = self.frames.len(), skipping = frame.skipping, "pop frame");
        match frame.field {
            Some(field) if !frame.skipping => {
                let verdict = handlers.end_submessage(field);
                self.apply(verdict)
            }
            _ => Ok(()),
        }
    }

    /// `SkipSubmessage` marks the innermost open message as skipped: the one
    /// just started, or the one containing the field just delivered.
    fn apply(&mut self, verdict: Verdict) -> DecodeResult<()> {
        match verdict {
            Verdict::Continue => Ok(()),
            Verdict::Break => Err(DecodeError::CallbackBreak),
            Verdict::SkipSubmessage => {
                let depth = self.depth();
                if let Some(top) = self.frames.last_mut() {
                    top.skipping = true;
                }
                trace!(depth, "skipping rest of message");
                Ok(())
            }
        }
    }

    fn top(&self) -> &Frame<'r> {
        self.frames
            .last()
            .expect("The top-level frame is always present")
    }

    fn submessage_type(&self, field: &FieldDescriptor) -> &'r MessageDescriptor {
        let id = field
            .message_type()
            .expect("Finalized submessage fields are linked");
        self.registry.message(id)
    }
}

fn check_owner(registry: &Registry, message: &MessageDescriptor) {
    let owned = registry
        .messages
        .get(message.id().index())
        .is_some_and(|candidate| std::ptr::eq(candidate, message));
    assert!(
        owned,
        "message `{}` belongs to a different registry",
        message.full_name()
    );
}
