//! # SCPI Protocol Library
//!
//! This crate provides the protocol layers shared by the SCPI attribute client and server:
//! device-independent attribute payloads, interface definitions that map attributes onto SCPI
//! fields, the SCPI text codec and a binary-safe framer for sentinel terminated units.
//!
//! ## Overview
//!
//! Test equipment speaks SCPI: short text commands such as `JUIC 98.7` or `FLAGS?`, terminated by
//! a sentinel (usually `\r\n`). This library lets callers work with named *attributes* instead:
//!
//! - [`AttributeRequest`] / [`AttributeResponse`]: attribute queries, writes and their values
//! - [`InterfaceDefinition`]: how each attribute is read from and written to a SCPI field
//! - [`FieldMap`]: the inverse view of a definition, used to interpret fields
//! - [`ScpiRequest`] / [`ScpiResponse`] and [`ScpiCodec`]: SCPI fields and their text form
//! - [`SentinelFramer`] / [`framing::UnitReader`]: unit boundaries in a byte stream
//!
//! ## Field Types
//!
//! - `bool`: `1` or `0`
//! - `int`, `float`, `str`: plain text values
//! - `bit`: one bit of an integer flag field; several boolean attributes may share a field
//! - `packet_item`: one float of a whitespace separated list of values
//! - `arbitrary_block`: an IEEE 488.2 definite length block of little-endian numbers
//! - no type: a command, e.g. `*RST`
//!
//! ## Basic Usage
//!
//! ### Loading an Interface Definition
//!
//! ```
//! use scpi_protocol::{FieldMap, InterfaceDefinition};
//!
//! let definition = InterfaceDefinition::from_yaml_str(
//!     r#"
//! model: fruit
//! attributes:
//!   overripe:
//!     read_write: {field: FLAGS, field_type: bit, bit: 0}
//!   chilled:
//!     read_write: {field: FLAGS, field_type: bit, bit: 7}
//! "#,
//! )
//! .expect("Definition should load");
//!
//! let fields = FieldMap::from_definitions(&definition.attributes).unwrap();
//! let flags = fields.read("FLAGS").unwrap();
//! assert_eq!(flags.attributes(), vec!["overripe", "chilled"]);
//! ```
//!
//! ### Parsing a Response Unit
//!
//! ```
//! use bytes::Bytes;
//! use scpi_protocol::ScpiCodec;
//!
//! let codec = ScpiCodec::default();
//! let fields = vec!["NAME".to_string(), "JUIC".to_string()];
//! let response = codec
//!     .unmarshal_response(&[Bytes::from_static(b"orange;98.7")], &fields)
//!     .expect("Response should parse");
//! assert_eq!(response.get("JUIC").unwrap(), &Bytes::from_static(b"98.7"));
//! ```
//!
//! ### Reading Units Containing Binary Blocks
//!
//! ```
//! use scpi_protocol::framing::{SentinelFramer, UnitReader};
//! use std::io::Cursor;
//!
//! // The block payload "a\r\nb" contains the sentinel, but the unit does not end there.
//! let mut stream = Cursor::new(b"#14a\r\nb\r\nNAME?\r\n".to_vec());
//! let mut reader = UnitReader::new(SentinelFramer::new("\r\n"));
//! assert_eq!(reader.read_unit(&mut stream).unwrap(), &b"#14a\r\nb"[..]);
//! assert_eq!(reader.read_unit(&mut stream).unwrap(), &b"NAME?"[..]);
//! ```
//!
//! ## Error Handling
//!
//! Every layer reports failures through the single [`error::Error`] type.
//!
//! ## Features
//!
//! - `tokio`: implements `tokio_util::codec::{Decoder, Encoder}` for [`SentinelFramer`]

pub mod attribute;
pub mod block;
pub mod codec;
pub mod definition;
pub mod error;
pub mod field_map;
pub mod framing;
pub mod ordered;
pub mod scpi;

pub use attribute::{AttributeRequest, AttributeResponse, AttributeValue};
pub use block::{BlockData, BlockDataType};
pub use codec::ScpiCodec;
pub use definition::{
    AttributeDefinition, AttributeDefinitions, FieldBinding, FieldType, InterfaceDefinition,
};
pub use error::{Error, Result};
pub use field_map::{FieldEntry, FieldMap};
pub use framing::SentinelFramer;
pub use scpi::{ScpiRequest, ScpiResponse};
