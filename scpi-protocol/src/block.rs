//! IEEE 488.2 definite length arbitrary blocks.
//!
//! A block is transferred as `#<n><n digit byte count><raw bytes>`, e.g. `#14` followed by four
//! payload bytes. The payload is a little-endian array of fixed width numbers whose element
//! type is declared by the interface definition.
use std::{fmt::Display, str::FromStr};

use crate::error::{Error, Result};

/// First byte of every arbitrary block.
pub const BLOCK_MARKER: u8 = b'#';

/// The byte count field may have at most nine digits.
const MAX_LEN_DIGITS: usize = 9;

macro_rules! block_data_types {
    ($($variant:ident($ty:ty) = $name:literal),* $(,)?) => {
        /// Element type of an arbitrary block payload.
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum BlockDataType {
            $($variant),*
        }

        impl BlockDataType {
            /// Width of a single element in bytes.
            pub fn size(self) -> usize {
                match self {
                    $(BlockDataType::$variant => std::mem::size_of::<$ty>()),*
                }
            }

            /// The name used for this type in interface definitions.
            pub fn name(self) -> &'static str {
                match self {
                    $(BlockDataType::$variant => $name),*
                }
            }
        }

        impl FromStr for BlockDataType {
            type Err = Error;

            fn from_str(s: &str) -> Result<BlockDataType> {
                match s {
                    $($name => Ok(BlockDataType::$variant),)*
                    other => Err(Error::Definition(format!(
                        "Unknown block data type '{}'",
                        other
                    ))),
                }
            }
        }

        /// The decoded samples of an arbitrary block.
        #[derive(Clone, Debug, PartialEq)]
        pub enum BlockData {
            $($variant(Vec<$ty>)),*
        }

        impl BlockData {
            pub fn data_type(&self) -> BlockDataType {
                match self {
                    $(BlockData::$variant(_) => BlockDataType::$variant),*
                }
            }

            /// Number of elements (not bytes).
            pub fn len(&self) -> usize {
                match self {
                    $(BlockData::$variant(values) => values.len()),*
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Decodes a raw payload as a little-endian array of `data_type`.
            pub fn from_le_bytes(data_type: BlockDataType, bytes: &[u8]) -> Result<BlockData> {
                let size = data_type.size();
                if bytes.len() % size != 0 {
                    return Err(Error::InvalidFormat(format!(
                        "Block payload of {} bytes is not a whole number of {} elements",
                        bytes.len(),
                        data_type
                    )));
                }
                Ok(match data_type {
                    $(BlockDataType::$variant => BlockData::$variant(
                        bytes
                            .chunks_exact(size)
                            .map(|chunk| {
                                let chunk = chunk.try_into().map_err(|_| {
                                    Error::InvalidFormat("Truncated block element".to_string())
                                })?;
                                Ok(<$ty>::from_le_bytes(chunk))
                            })
                            .collect::<Result<Vec<$ty>>>()?,
                    )),*
                })
            }

            /// Builds a block of `data_type` from plain numbers, casting each one.
            pub fn from_f64s(data_type: BlockDataType, values: &[f64]) -> BlockData {
                match data_type {
                    $(BlockDataType::$variant => BlockData::$variant(
                        values.iter().map(|value| *value as $ty).collect(),
                    )),*
                }
            }

            /// Encodes the samples as a little-endian payload (without header).
            pub fn to_le_bytes(&self) -> Vec<u8> {
                match self {
                    $(BlockData::$variant(values) => {
                        values.iter().flat_map(|value| value.to_le_bytes()).collect()
                    }),*
                }
            }
        }

        impl Display for BlockData {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(BlockData::$variant(values) => write!(f, "{:?}", values)),*
                }
            }
        }
    };
}

block_data_types! {
    Int8(i8) = "int8",
    UInt8(u8) = "uint8",
    Int16(i16) = "int16",
    UInt16(u16) = "uint16",
    Int32(i32) = "int32",
    UInt32(u32) = "uint32",
    Int64(i64) = "int64",
    UInt64(u64) = "uint64",
    Float32(f32) = "float32",
    Float64(f64) = "float64",
}

impl Display for BlockDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The `#<n><count>` prefix of an arbitrary block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlockHeader {
    len_digits: usize,
    payload_len: usize,
}

impl BlockHeader {
    /// Creates the header announcing `payload_len` bytes.
    pub fn new(payload_len: usize) -> Result<BlockHeader> {
        let len_digits = payload_len.to_string().len();
        if len_digits > MAX_LEN_DIGITS {
            return Err(Error::InvalidFormat(format!(
                "Block payload of {} bytes cannot be described by a definite length header",
                payload_len
            )));
        }
        Ok(BlockHeader {
            len_digits,
            payload_len,
        })
    }

    /// Length of the header itself, including the marker.
    pub fn header_len(&self) -> usize {
        2 + self.len_digits
    }

    /// Number of payload bytes announced by the header.
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Length of header plus payload.
    pub fn block_len(&self) -> usize {
        self.header_len() + self.payload_len
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(BLOCK_MARKER);
        out.extend_from_slice(self.len_digits.to_string().as_bytes());
        out.extend_from_slice(self.payload_len.to_string().as_bytes());
    }
}

/// Outcome of looking for a block header at the start of a buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HeaderScan {
    /// The buffer starts with a complete block header.
    Block(BlockHeader),
    /// The bytes seen so far are a valid header prefix, but the header is not complete yet.
    Incomplete,
    /// The buffer does not start with a block header.
    NotBlock,
}

/// Checks whether `buf` starts with `#`, a digit `d` in 1..=9 and `d` further digits.
pub fn scan_header(buf: &[u8]) -> HeaderScan {
    match buf.first() {
        None => return HeaderScan::Incomplete,
        Some(&BLOCK_MARKER) => {}
        Some(_) => return HeaderScan::NotBlock,
    }
    let len_digits = match buf.get(1) {
        None => return HeaderScan::Incomplete,
        Some(digit @ b'1'..=b'9') => (digit - b'0') as usize,
        Some(_) => return HeaderScan::NotBlock,
    };
    let available = &buf[2..buf.len().min(2 + len_digits)];
    if !available.iter().all(u8::is_ascii_digit) {
        return HeaderScan::NotBlock;
    }
    if available.len() < len_digits {
        return HeaderScan::Incomplete;
    }
    // At most nine ASCII digits, so neither conversion can fail.
    let payload_len = str::from_utf8(available)
        .ok()
        .and_then(|digits| digits.parse().ok())
        .unwrap_or_default();
    HeaderScan::Block(BlockHeader {
        len_digits,
        payload_len,
    })
}

/// Encodes samples as a complete arbitrary block, header included.
pub fn encode_block(data: &BlockData) -> Result<Vec<u8>> {
    let payload = data.to_le_bytes();
    let header = BlockHeader::new(payload.len())?;
    let mut out = Vec::with_capacity(header.block_len());
    header.write_to(&mut out);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decodes the value received for the arbitrary block field `field`.
///
/// The whole value must be exactly one block: a missing marker, a malformed header or a payload
/// whose size differs from the announced byte count are errors.
pub fn decode_block(field: &str, value: &[u8], data_type: BlockDataType) -> Result<BlockData> {
    if value.first() != Some(&BLOCK_MARKER) {
        return Err(Error::BlockMarker {
            field: field.to_string(),
        });
    }
    let header = match scan_header(value) {
        HeaderScan::Block(header) => header,
        HeaderScan::Incomplete | HeaderScan::NotBlock => {
            return Err(Error::InvalidValue {
                field: field.to_string(),
                value: String::from_utf8_lossy(value).to_string(),
                expected: "arbitrary_block".to_string(),
            });
        }
    };
    let payload = &value[header.header_len()..];
    if payload.len() != header.payload_len() {
        return Err(Error::BlockSize {
            field: field.to_string(),
            expected: header.payload_len(),
            received: payload.len(),
        });
    }
    BlockData::from_le_bytes(data_type, payload)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_int16_block() {
        let data = BlockData::Int16(vec![1, -2, 300, i16::MAX]);
        let encoded = encode_block(&data).unwrap();
        assert_eq!(&encoded[..3], b"#18");
        assert_eq!(encoded.len(), 3 + 8);
        assert_eq!(&encoded[3..5], &1_i16.to_le_bytes());
        assert_eq!(
            decode_block("TRAC", &encoded, BlockDataType::Int16).unwrap(),
            data
        );
    }

    #[test]
    fn payload_one_byte_short() {
        let mut encoded = encode_block(&BlockData::Int16(vec![1, 2, 3, 4])).unwrap();
        encoded.pop();
        match decode_block("TRAC", &encoded, BlockDataType::Int16) {
            Err(Error::BlockSize {
                field,
                expected,
                received,
            }) => {
                assert_eq!(field, "TRAC");
                assert_eq!(expected, 8);
                assert_eq!(received, 7);
            }
            other => panic!("expected BlockSize, got {:?}", other),
        }
    }

    #[test]
    fn missing_marker() {
        match decode_block("TRAC", b"18abcdefgh", BlockDataType::UInt8) {
            Err(Error::BlockMarker { field }) => assert_eq!(field, "TRAC"),
            other => panic!("expected BlockMarker, got {:?}", other),
        }
    }

    #[test]
    fn header_scan() {
        assert_eq!(scan_header(b""), HeaderScan::Incomplete);
        assert_eq!(scan_header(b"#"), HeaderScan::Incomplete);
        assert_eq!(scan_header(b"#3"), HeaderScan::Incomplete);
        assert_eq!(scan_header(b"#31"), HeaderScan::Incomplete);
        assert_eq!(scan_header(b"1.0"), HeaderScan::NotBlock);
        assert_eq!(scan_header(b"#0"), HeaderScan::NotBlock);
        assert_eq!(scan_header(b"#2a0"), HeaderScan::NotBlock);
        match scan_header(b"#210abc") {
            HeaderScan::Block(header) => {
                assert_eq!(header.header_len(), 4);
                assert_eq!(header.payload_len(), 10);
            }
            other => panic!("expected a block header, got {:?}", other),
        }
    }

    #[test]
    fn float_block_roundtrip() {
        let data = BlockData::Float32(vec![0.5, -1.25]);
        let encoded = encode_block(&data).unwrap();
        assert_eq!(&encoded[..3], b"#18");
        assert_eq!(
            decode_block("F", &encoded, BlockDataType::Float32).unwrap(),
            data
        );
    }

    #[test]
    fn ragged_payload() {
        assert!(BlockData::from_le_bytes(BlockDataType::Int32, &[0, 1, 2]).is_err());
    }

    #[test]
    fn data_type_names() {
        assert_eq!(
            "uint16".parse::<BlockDataType>().unwrap(),
            BlockDataType::UInt16
        );
        assert_eq!(BlockDataType::Float64.to_string(), "float64");
        assert!("complex64".parse::<BlockDataType>().is_err());
    }
}
