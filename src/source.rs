//! Pull-mode byte inputs consumed by the decoder.

use crate::{
    bytestring::ByteString,
    status::{Status, StatusCode},
};
use std::{
    collections::VecDeque,
    io::{self, Read},
    mem,
};

/// A pull-mode byte stream.
///
/// Errors are reported as a [`Status`] whose code distinguishes the end of the
/// stream ([`StatusCode::Eof`]), a temporary lack of data
/// ([`StatusCode::TryAgain`]) and fatal failures.
pub trait ByteSource {
    /// Returns the next chunk of the stream and advances past it.
    ///
    /// The chunk is never empty and holds at least `min_len` bytes unless the
    /// stream ends first. Once nothing is left the call fails with `Eof`.
    fn get(&mut self, min_len: usize) -> Result<ByteString, Status>;

    /// Appends exactly `len` more bytes of the stream to `out`.
    ///
    /// Either all `len` bytes are appended or nothing is consumed, so a caller
    /// that sees `TryAgain` can retry the same request later.
    fn append(&mut self, out: &mut ByteString, len: usize) -> Result<(), Status>;

    /// Outcome of the most recent read.
    fn status(&self) -> &Status;

    /// True only after a read has failed because the stream ended.
    fn at_eof(&self) -> bool;
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn get(&mut self, min_len: usize) -> Result<ByteString, Status> {
        (**self).get(min_len)
    }

    fn append(&mut self, out: &mut ByteString, len: usize) -> Result<(), Status> {
        (**self).append(out, len)
    }

    fn status(&self) -> &Status {
        (**self).status()
    }

    fn at_eof(&self) -> bool {
        (**self).at_eof()
    }
}

/// Tracks the source-side status: end of stream and fatal errors are sticky,
/// `TryAgain` only describes the latest call.
#[derive(Debug, Default)]
struct SourceState {
    status: Status,
    eof: bool,
}

impl SourceState {
    fn ok(&mut self) {
        if self.status.code() == StatusCode::TryAgain {
            self.status.clear();
        }
    }

    fn eof(&mut self) -> Status {
        self.eof = true;
        self.record(StatusCode::Eof, "end of stream")
    }

    fn try_again(&mut self) -> Status {
        self.record(StatusCode::TryAgain, "no data available yet")
    }

    fn record(&mut self, code: StatusCode, message: &str) -> Status {
        if self.status.code() == StatusCode::TryAgain {
            self.status.clear();
        }
        self.status.set(code, format_args!("{message}"));
        self.status.clone()
    }
}

/// A source over one contiguous buffer, handed out as a single chunk.
#[derive(Debug)]
pub struct SliceSource {
    data: ByteString,
    pos: usize,
    state: SourceState,
}

impl SliceSource {
    pub fn new(data: impl Into<ByteString>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            state: SourceState::default(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl ByteSource for SliceSource {
    fn get(&mut self, _min_len: usize) -> Result<ByteString, Status> {
        if self.remaining() == 0 {
            return Err(self.state.eof());
        }
        let chunk = self.data.slice(self.pos, self.remaining());
        self.pos = self.data.len();
        Ok(chunk)
    }

    fn append(&mut self, out: &mut ByteString, len: usize) -> Result<(), Status> {
        if self.remaining() < len {
            return Err(self.state.eof());
        }
        out.extend_from_slice(&self.data[self.pos..self.pos + len]);
        self.pos += len;
        Ok(())
    }

    fn status(&self) -> &Status {
        &self.state.status
    }

    fn at_eof(&self) -> bool {
        self.state.eof
    }
}

/// A source fed with discrete chunks.
///
/// Chunks are handed out as views, without copying, unless a caller asks for
/// more bytes than the front chunk holds. Until [`ChunkedSource::finish`] is
/// called, running out of data yields `TryAgain` instead of `Eof`.
#[derive(Debug, Default)]
pub struct ChunkedSource {
    chunks: VecDeque<ByteString>,
    front_pos: usize,
    available: usize,
    finished: bool,
    state: SourceState,
}

impl ChunkedSource {
    /// Creates an open source with no data yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a finished source holding `chunks`.
    pub fn from_chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ByteString>,
    {
        let mut source = Self::new();
        for chunk in chunks {
            source.push(chunk);
        }
        source.finish();
        source
    }

    /// Queues another chunk at the end of the stream.
    ///
    /// # Panics
    ///
    /// Panics if the source has already been finished.
    pub fn push(&mut self, chunk: impl Into<ByteString>) {
        assert!(!self.finished, "push on a finished ChunkedSource");
        let chunk = chunk.into();
        if !chunk.is_empty() {
            self.available += chunk.len();
            self.chunks.push_back(chunk);
        }
    }

    /// Marks the end of the stream.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Bytes queued but not yet handed out.
    pub fn available(&self) -> usize {
        self.available
    }

    fn starved(&mut self) -> Status {
        if self.finished {
            self.state.eof()
        } else {
            self.state.try_again()
        }
    }

    /// Removes up to `max` bytes from the front chunk.
    fn take_front(&mut self, max: usize) -> ByteString {
        let Some(front) = self.chunks.front() else {
            return ByteString::new();
        };
        let left = front.len() - self.front_pos;
        let n = left.min(max);
        let out = if self.front_pos == 0 && n == front.len() {
            front.clone()
        } else {
            front.slice(self.front_pos, n)
        };
        self.available -= n;
        if n == left {
            self.chunks.pop_front();
            self.front_pos = 0;
        } else {
            self.front_pos += n;
        }
        out
    }
}

impl ByteSource for ChunkedSource {
    fn get(&mut self, min_len: usize) -> Result<ByteString, Status> {
        let want = min_len.max(1);
        if self.available == 0 || (self.available < want && !self.finished) {
            return Err(self.starved());
        }
        self.state.ok();

        let front_left = self
            .chunks
            .front()
            .map_or(0, |front| front.len() - self.front_pos);
        if front_left >= want {
            return Ok(self.take_front(usize::MAX));
        }

        let mut out = ByteString::new();
        while out.len() < want && self.available > 0 {
            let piece = self.take_front(want - out.len());
            out.extend_from_slice(&piece);
        }
        Ok(out)
    }

    fn append(&mut self, out: &mut ByteString, len: usize) -> Result<(), Status> {
        if self.available < len {
            return Err(self.starved());
        }
        self.state.ok();
        let mut copied = 0;
        while copied < len {
            let piece = self.take_front(len - copied);
            out.extend_from_slice(&piece);
            copied += piece.len();
        }
        Ok(())
    }

    fn status(&self) -> &Status {
        &self.state.status
    }

    fn at_eof(&self) -> bool {
        self.state.eof
    }
}

/// Adapts a [`Read`] implementation.
///
/// `WouldBlock` from the reader surfaces as `TryAgain`; bytes read before it
/// are kept for the next call.
#[derive(Debug)]
pub struct ReadSource<R> {
    reader: R,
    chunk_size: usize,
    pending: Vec<u8>,
    state: SourceState,
}

impl<R: Read> ReadSource<R> {
    pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, Self::DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            pending: Vec::new(),
            state: SourceState::default(),
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Reads until at least `want` bytes are pending.
    ///
    /// `pending` grows one chunk per read, so a large `want` taken from the
    /// wire costs nothing until the reader actually supplies the bytes.
    fn fill_to(&mut self, want: usize) -> Result<(), Status> {
        if self.state.status.code() == StatusCode::Error {
            return Err(self.state.status.clone());
        }
        while self.pending.len() < want {
            if self.state.eof {
                return Err(self.state.eof());
            }
            let start = self.pending.len();
            self.pending.resize(start + self.chunk_size, 0);
            let result = self.reader.read(&mut self.pending[start..]);
            match result {
                Ok(0) => {
                    self.pending.truncate(start);
                    return Err(self.state.eof());
                }
                Ok(n) => self.pending.truncate(start + n),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                    self.pending.truncate(start)
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    self.pending.truncate(start);
                    return Err(self.state.try_again());
                }
                Err(err) => {
                    self.pending.truncate(start);
                    let message = format!("read failed: {err}");
                    return Err(self.state.record(StatusCode::Error, &message));
                }
            }
        }
        self.state.ok();
        Ok(())
    }
}

impl<R: Read> ByteSource for ReadSource<R> {
    fn get(&mut self, min_len: usize) -> Result<ByteString, Status> {
        match self.fill_to(min_len.max(1)) {
            Ok(()) => {}
            Err(status) if status.code() == StatusCode::Eof && !self.pending.is_empty() => {}
            Err(status) => return Err(status),
        }
        Ok(ByteString::from_vec(mem::take(&mut self.pending)))
    }

    fn append(&mut self, out: &mut ByteString, len: usize) -> Result<(), Status> {
        self.fill_to(len)?;
        out.extend_from_slice(&self.pending[..len]);
        self.pending.drain(..len);
        Ok(())
    }

    fn status(&self) -> &Status {
        &self.state.status
    }

    fn at_eof(&self) -> bool {
        self.state.eof && self.pending.is_empty()
    }
}
