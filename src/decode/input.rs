//! Buffered input over a [`ByteSource`].
//!
//! The decoder reads from one buffer at a time. Bytes from the last committed
//! position onward are kept until the next commit, so a read that fails with
//! `TryAgain` can be rewound and replayed once the source has more data.

use super::{DecodeError, DecodeResult};
use crate::{
    bytestring::ByteString,
    source::ByteSource,
    status::{Status, StatusCode},
    wire::{scan_varint, VarintScan},
};
use tracing::trace;

#[derive(Debug, Default)]
pub(crate) struct Input {
    buf: ByteString,
    pos: usize,
    checkpoint: usize,
    /// Stream offset of `buf[0]`.
    buf_offset: u64,
    /// Target for payloads that fit in `buf`.
    view: ByteString,
    /// Target for payloads that straddle the end of `buf`.
    scratch: ByteString,
}

impl Input {
    /// Forgets the stream position but keeps the payload buffers.
    pub fn reset(&mut self) {
        self.buf = ByteString::new();
        self.pos = 0;
        self.checkpoint = 0;
        self.buf_offset = 0;
    }

    /// Current stream offset.
    pub fn offset(&self) -> u64 {
        self.buf_offset + self.pos as u64
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Bytes before the read cursor will not be replayed.
    pub fn commit(&mut self) {
        self.checkpoint = self.pos;
    }

    /// Moves the read cursor back to the last commit.
    pub fn rewind(&mut self) {
        self.pos = self.checkpoint;
    }

    /// Pulls from `source` until at least `need` bytes follow the cursor.
    fn fill<S: ByteSource + ?Sized>(&mut self, source: &mut S, need: usize) -> Result<(), Status> {
        while self.remaining() < need {
            let chunk = source.get(need - self.remaining())?;
            self.splice(chunk);
        }
        Ok(())
    }

    /// Makes `chunk` the current buffer, keeping any uncommitted bytes in
    /// front of it.
    fn splice(&mut self, chunk: ByteString) {
        if self.checkpoint == self.buf.len() {
            self.buf_offset += self.buf.len() as u64;
            self.buf = chunk;
        } else {
            let retained = &self.buf[self.checkpoint..];
            let mut joined = Vec::with_capacity(retained.len() + chunk.len());
            joined.extend_from_slice(retained);
            joined.extend_from_slice(&chunk);
            trace!(retained = retained.len(), "joining input across chunks");
            self.buf_offset += self.checkpoint as u64;
            self.buf = ByteString::from_vec(joined);
        }
        self.pos -= self.checkpoint;
        self.checkpoint = 0;
    }

    /// Reads a tag. `None` means the stream ended cleanly before the tag.
    pub fn read_tag<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> DecodeResult<Option<u32>> {
        let rest = &self.buf[self.pos..];
        if let Some(&b0) = rest.first() {
            if b0 < 0x80 {
                self.pos += 1;
                return Ok(Some(u32::from(b0)));
            }
            if let Some(&b1) = rest.get(1) {
                if b1 < 0x80 {
                    self.pos += 2;
                    return Ok(Some(u32::from(b0 & 0x7f) | u32::from(b1) << 7));
                }
            }
        } else {
            match self.fill(source, 1) {
                Ok(()) => {}
                Err(status) if status.code() == StatusCode::Eof => return Ok(None),
                Err(status) => return Err(DecodeError::from_source(status)),
            }
        }
        self.read_varint32(source).map(Some)
    }

    pub fn read_varint<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> DecodeResult<u64> {
        loop {
            match scan_varint(&self.buf[self.pos..]) {
                VarintScan::Complete(value, len) => {
                    self.pos += len;
                    return Ok(value);
                }
                VarintScan::Unterminated => return Err(DecodeError::UnterminatedVarint),
                VarintScan::Truncated => {
                    let need = self.remaining() + 1;
                    self.fill(source, need).map_err(DecodeError::from_source)?;
                }
            }
        }
    }

    /// Reads a varint that must fit in 32 bits, as tags and lengths do.
    pub fn read_varint32<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> DecodeResult<u32> {
        let value = self.read_varint(source)?;
        u32::try_from(value).map_err(|_| DecodeError::Unterminated32BitVarint)
    }

    pub fn read_fixed32<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> DecodeResult<u32> {
        Ok(u32::from_le_bytes(self.read_array(source)?))
    }

    pub fn read_fixed64<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> DecodeResult<u64> {
        Ok(u64::from_le_bytes(self.read_array(source)?))
    }

    fn read_array<const N: usize, S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> DecodeResult<[u8; N]> {
        self.fill(source, N).map_err(DecodeError::from_source)?;
        let mut out = [0; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    /// Reads a `len`-byte payload.
    ///
    /// When the payload lies inside the current buffer the result is a view
    /// into it; otherwise the payload is assembled in the scratch string,
    /// which is recycled on the next call.
    pub fn read_payload<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        len: usize,
    ) -> DecodeResult<&ByteString> {
        if self.remaining() >= len {
            ByteString::recycle(&mut self.view);
            self.view.substr(&self.buf, self.pos, len);
            self.pos += len;
            return Ok(&self.view);
        }

        let have = self.remaining();
        let missing = len - have;
        ByteString::recycle(&mut self.scratch);
        self.scratch
            .fill(have)
            .copy_from_slice(&self.buf[self.pos..]);
        source
            .append(&mut self.scratch, missing)
            .map_err(DecodeError::from_source)?;
        trace!(len, missing, "assembled payload in scratch");

        // The whole buffer and `missing` further bytes are consumed.
        self.buf_offset += (self.buf.len() + missing) as u64;
        ByteString::recycle(&mut self.buf);
        self.pos = 0;
        self.checkpoint = 0;
        Ok(&self.scratch)
    }

    /// Discards input up to stream offset `end`, committing as it goes.
    pub fn skip_to<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        end: u64,
    ) -> DecodeResult<()> {
        loop {
            let left = end.saturating_sub(self.offset());
            if left <= self.remaining() as u64 {
                self.pos += left as usize;
                self.commit();
                return Ok(());
            }
            self.pos = self.buf.len();
            self.commit();
            let chunk = source.get(1).map_err(DecodeError::from_source)?;
            self.splice(chunk);
        }
    }

    /// Discards the rest of the stream.
    pub fn skip_all<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> DecodeResult<()> {
        loop {
            self.pos = self.buf.len();
            self.commit();
            match source.get(1) {
                Ok(chunk) => self.splice(chunk),
                Err(status) if status.code() == StatusCode::Eof => return Ok(()),
                Err(status) => return Err(DecodeError::from_source(status)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ChunkedSource, SliceSource};

    #[test]
    fn tag_fast_path_and_clean_eof() {
        let mut source = SliceSource::new(vec![0x08, 0x96, 0x01]);
        let mut input = Input::default();
        assert_eq!(input.read_tag(&mut source), Ok(Some(0x08)));
        assert_eq!(input.read_tag(&mut source), Ok(Some(150)));
        assert_eq!(input.offset(), 3);
        assert_eq!(input.read_tag(&mut source), Ok(None));
    }

    #[test]
    fn varint_across_chunks() {
        let mut source = ChunkedSource::from_chunks([vec![0xac], vec![0x02]]);
        let mut input = Input::default();
        assert_eq!(input.read_varint(&mut source), Ok(300));
        assert_eq!(input.offset(), 2);
    }

    #[test]
    fn oversized_tag_is_rejected() {
        let mut source = SliceSource::new(vec![0xff, 0xff, 0xff, 0xff, 0x10]);
        let mut input = Input::default();
        assert_eq!(
            input.read_tag(&mut source),
            Err(DecodeError::Unterminated32BitVarint)
        );
    }

    #[test]
    fn truncated_fixed_is_unexpected_eof() {
        let mut source = SliceSource::new(vec![1, 2, 3]);
        let mut input = Input::default();
        assert_eq!(input.read_fixed32(&mut source), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn try_again_then_rewind_replays() {
        let mut source = ChunkedSource::new();
        source.push(vec![0x96]);
        let mut input = Input::default();
        input.commit();
        assert_eq!(input.read_varint(&mut source), Err(DecodeError::TryAgain));
        input.rewind();
        source.push(vec![0x01]);
        assert_eq!(input.read_varint(&mut source), Ok(150));
    }

    #[test]
    fn payload_in_buffer_is_a_view() {
        let mut source = SliceSource::new(b"xhello".to_vec());
        let mut input = Input::default();
        input.fill(&mut source, 1).unwrap();
        input.pos = 1;
        input.commit();
        let payload = input.read_payload(&mut source, 5).unwrap();
        assert_eq!(payload, b"hello");
        assert!(payload.has_parent());
    }

    #[test]
    fn payload_across_chunks_is_copied() {
        let mut source = ChunkedSource::from_chunks([b"he".to_vec(), b"llo!".to_vec()]);
        let mut input = Input::default();
        input.fill(&mut source, 1).unwrap();
        let payload = input.read_payload(&mut source, 5).unwrap().clone();
        assert_eq!(payload, b"hello");
        assert!(!payload.has_parent());
        assert_eq!(input.offset(), 5);
        assert_eq!(input.read_tag(&mut source), Ok(Some(u32::from(b'!'))));
    }

    #[test]
    fn skip_to_crosses_chunks() {
        let mut source = ChunkedSource::from_chunks([vec![0; 3], vec![0; 3], vec![7]]);
        let mut input = Input::default();
        input.skip_to(&mut source, 6).unwrap();
        assert_eq!(input.offset(), 6);
        assert_eq!(input.read_tag(&mut source), Ok(Some(7)));
    }
}
