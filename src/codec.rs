//! Byte-sink / byte-source codec primitives.
//!
//! Every question and answer kind serializes through these two traits.
//! `serialize` must be deterministic: two equal instances must write
//! identical bytes, since a fingerprint is `uuid ‖ serialize(instance)` and
//! is used as a persistent map key.

use crate::error::CodecError;

/// Default ceiling on a single length-prefixed read, overridable via
/// [`crate::config::EngineConfig::max_len_prefix`].
pub const DEFAULT_MAX_LEN_PREFIX: u64 = 16 * 1024 * 1024;

/// Write side of the codec contract.
pub trait ByteSink {
    fn write_u8(&mut self, value: u8);
    fn write_u16be(&mut self, value: u16);
    fn write_u32be(&mut self, value: u32);
    fn write_u64be(&mut self, value: u64);
    fn write_bytes(&mut self, bytes: &[u8]);

    /// Writes `bytes.len()` as a big-endian u64 followed by `bytes` itself.
    fn write_len_prefixed_bytes(&mut self, bytes: &[u8]) {
        self.write_u64be(bytes.len() as u64);
        self.write_bytes(bytes);
    }
}

/// Read side of the codec contract. `max_len_prefix` bounds
/// [`ByteSource::read_len_prefixed_bytes`] so a corrupt or adversarial
/// length prefix cannot force an unbounded allocation.
pub trait ByteSource {
    fn read_u8(&mut self) -> Result<u8, CodecError>;
    fn read_u16be(&mut self) -> Result<u16, CodecError>;
    fn read_u32be(&mut self) -> Result<u32, CodecError>;
    fn read_u64be(&mut self) -> Result<u64, CodecError>;
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, CodecError>;
    fn max_len_prefix(&self) -> u64;

    fn read_len_prefixed_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_u64be()?;
        let max = self.max_len_prefix();
        if len > max {
            return Err(CodecError::Overflow { len, max });
        }
        self.read_bytes(len as usize)
    }

    /// Bytes remaining to be read, used by callers that want to assert a
    /// deserializer consumed exactly its input (round-trip tests).
    fn remaining(&self) -> usize;
}

/// A `ByteSink` backed by an in-memory buffer - what `Question::serialize`
/// and `Answer::serialize` write into when computing a fingerprint or an
/// on-disk answer representation.
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    buf: Vec<u8>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl ByteSink for BufferSink {
    fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn write_u16be(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn write_u32be(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn write_u64be(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }
}

/// A `ByteSource` reading sequentially out of an in-memory slice.
pub struct BufferSource<'a> {
    buf: &'a [u8],
    pos: usize,
    max_len_prefix: u64,
}

impl<'a> BufferSource<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_max_len_prefix(buf, DEFAULT_MAX_LEN_PREFIX)
    }

    pub fn with_max_len_prefix(buf: &'a [u8], max_len_prefix: u64) -> Self {
        Self {
            buf,
            pos: 0,
            max_len_prefix,
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(len).ok_or(CodecError::Short)?;
        if end > self.buf.len() {
            return Err(CodecError::Short);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

impl<'a> ByteSource for BufferSource<'a> {
    fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16be(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u32be(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64be(&mut self) -> Result<u64, CodecError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes(b.try_into().expect("8 bytes")))
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, CodecError> {
        Ok(self.take(len)?.to_vec())
    }

    fn max_len_prefix(&self) -> u64 {
        self.max_len_prefix
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}
