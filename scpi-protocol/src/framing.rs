//! Splitting a byte stream into sentinel terminated units.
//!
//! A unit normally ends at the first occurrence of the sentinel. A unit that starts with an
//! arbitrary block header is binary: its payload may contain the sentinel, so the unit only ends
//! once the declared number of payload bytes followed by the sentinel has arrived.
use std::io::{self, Read, Write};

use bytes::{Bytes, BytesMut};

use crate::{
    block::{HeaderScan, scan_header},
    error::{Error, Result},
};

pub const DEFAULT_SENTINEL: &[u8] = b"\r\n";
/// 10 MiB
pub const DEFAULT_MAX_UNIT_SIZE: usize = 10 * 1024 * 1024;

const READ_CHUNK_SIZE: usize = 4096;

/// Finds unit boundaries in buffered bytes.
#[derive(Clone, Debug)]
pub struct SentinelFramer {
    sentinel: Bytes,
    max_unit_size: usize,
}

impl Default for SentinelFramer {
    fn default() -> Self {
        SentinelFramer::new(DEFAULT_SENTINEL)
    }
}

impl SentinelFramer {
    /// Creates a framer for `sentinel`, which must not be empty.
    pub fn new(sentinel: impl AsRef<[u8]>) -> SentinelFramer {
        SentinelFramer {
            sentinel: Bytes::copy_from_slice(sentinel.as_ref()),
            max_unit_size: DEFAULT_MAX_UNIT_SIZE,
        }
    }

    /// Limits the number of bytes buffered while looking for the end of a unit.
    pub fn with_max_unit_size(mut self, max_unit_size: usize) -> SentinelFramer {
        self.max_unit_size = max_unit_size;
        self
    }

    pub fn sentinel(&self) -> &[u8] {
        &self.sentinel
    }

    pub fn max_unit_size(&self) -> usize {
        self.max_unit_size
    }

    /// Removes the first complete unit from `buf` and returns it without its sentinel.
    ///
    /// Returns `Ok(None)` if more bytes are needed. Bytes following the unit stay in `buf`.
    pub fn split_unit(&self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        if self.sentinel.is_empty() {
            return Err(Error::InvalidFormat("The sentinel must not be empty".to_string()));
        }
        let sentinel_len = self.sentinel.len();
        match scan_header(buf) {
            HeaderScan::Block(header) => {
                if header.payload_len() > self.max_unit_size {
                    return Err(Error::TooManyBytes {
                        max: self.max_unit_size,
                        got: header.payload_len(),
                    });
                }
                let unit_len = header.block_len();
                let expected = unit_len + sentinel_len;
                if buf.len() < expected {
                    return self.need_more(buf);
                }
                if buf[unit_len..expected] == self.sentinel[..] {
                    return Ok(Some(self.take_unit(buf, unit_len)));
                }
                // The declared payload ended, but not with a sentinel.
                if buf.ends_with(&self.sentinel) {
                    return Err(Error::BlockLength {
                        declared: header.payload_len(),
                        observed: buf.len() - header.header_len() - sentinel_len,
                    });
                }
                self.need_more(buf)
            }
            HeaderScan::Incomplete => self.need_more(buf),
            HeaderScan::NotBlock => match buf
                .windows(sentinel_len)
                .position(|window| window == &self.sentinel[..])
            {
                Some(end) if end > self.max_unit_size => Err(Error::TooManyBytes {
                    max: self.max_unit_size,
                    got: end,
                }),
                Some(end) => Ok(Some(self.take_unit(buf, end))),
                None => self.need_more(buf),
            },
        }
    }

    fn need_more(&self, buf: &BytesMut) -> Result<Option<Bytes>> {
        if buf.len() > self.max_unit_size {
            return Err(Error::TooManyBytes {
                max: self.max_unit_size,
                got: buf.len(),
            });
        }
        Ok(None)
    }

    fn take_unit(&self, buf: &mut BytesMut, unit_len: usize) -> Bytes {
        let mut unit = buf.split_to(unit_len + self.sentinel.len());
        unit.truncate(unit_len);
        unit.freeze()
    }

    /// Appends `unit` and the sentinel to `dst`.
    pub fn encode_unit(&self, unit: &[u8], dst: &mut BytesMut) {
        dst.reserve(unit.len() + self.sentinel.len());
        dst.extend_from_slice(unit);
        dst.extend_from_slice(&self.sentinel);
    }
}

/// Reads units from a blocking reader.
///
/// Bytes received after the end of a unit are kept for the next call. After an error the
/// partially received unit is discarded.
#[derive(Debug, Default)]
pub struct UnitReader {
    framer: SentinelFramer,
    buffer: BytesMut,
}

impl UnitReader {
    pub fn new(framer: SentinelFramer) -> UnitReader {
        UnitReader {
            framer,
            buffer: BytesMut::new(),
        }
    }

    pub fn framer(&self) -> &SentinelFramer {
        &self.framer
    }

    /// Number of bytes received but not yet returned as part of a unit.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drops every buffered byte, including a partially received unit.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Reads until a complete unit is available and returns it without its sentinel.
    pub fn read_unit(&mut self, reader: &mut impl Read) -> Result<Bytes> {
        let result = self.read_unit_inner(reader);
        if result.is_err() {
            self.buffer.clear();
        }
        result
    }

    fn read_unit_inner(&mut self, reader: &mut impl Read) -> Result<Bytes> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(unit) = self.framer.split_unit(&mut self.buffer)? {
                return Ok(unit);
            }
            let n = match reader.read(&mut chunk) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "Stream ended before the end of the unit",
                    )
                    .into());
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Writes `unit` followed by `sentinel`.
pub fn write_unit(writer: &mut impl Write, unit: &[u8], sentinel: &[u8]) -> io::Result<()> {
    writer.write_all(unit)?;
    writer.write_all(sentinel)?;
    writer.flush()
}

#[cfg(feature = "tokio")]
mod tokio_codec {
    use bytes::{Bytes, BytesMut};
    use tokio_util::codec::{Decoder, Encoder};

    use super::SentinelFramer;
    use crate::error::Error;

    impl Decoder for SentinelFramer {
        type Item = Bytes;
        type Error = Error;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, Error> {
            self.split_unit(src)
        }
    }

    impl<T: AsRef<[u8]>> Encoder<T> for SentinelFramer {
        type Error = Error;

        fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Error> {
            self.encode_unit(item.as_ref(), dst);
            Ok(())
        }
    }
}
