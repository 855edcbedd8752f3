//! # SCPI Attribute Client
//!
//! A client library for reading and writing named attributes of SCPI test equipment.
//!
//! ## Overview
//!
//! This crate stacks three layers on top of a byte [`Transport`]:
//!
//! - [`AttributeClient`]: translates attribute requests into SCPI field queries and set
//!   operations using an interface definition, and field values back into attribute values
//! - [`ScpiClient`]: renders SCPI requests as (optionally chained) units, retries queries that
//!   time out and splits the replies into field values
//! - [`Transport`]: sends a unit and receives the reply unit; [`TcpTransport`] does this over
//!   TCP with binary-safe framing
//!
//! For the payload types and codecs, see the [`scpi_protocol`] crate.
//!
//! ## Basic Usage
//!
//! ### Connecting to an Instrument
//!
//! ```ignore
//! use scpi_client::AttributeClient;
//! use scpi_protocol::{AttributeRequest, InterfaceDefinition};
//!
//! let definition = InterfaceDefinition::from_yaml_file("fruit.yaml")?;
//! let mut client = AttributeClient::connect("127.0.0.1:5025", &definition)?;
//!
//! let mut request = AttributeRequest::new();
//! request.add_setop("chilled", [true]);
//! request.set_queries(["name", "juiciness"]);
//! let response = client.send_receive(&request)?;
//! println!("juiciness: {}", response.get("juiciness").unwrap());
//! ```
//!
//! ### Using a Custom Transport
//!
//! ```
//! use bytes::Bytes;
//! use scpi_client::{ScpiClient, Transport};
//! use scpi_protocol::{Result, ScpiRequest};
//!
//! struct Loopback;
//!
//! impl Transport for Loopback {
//!     fn send_receive(&mut self, _request: &[u8], expect_response: bool) -> Result<Option<Bytes>> {
//!         Ok(expect_response.then(|| Bytes::from_static(b"orange;98.7")))
//!     }
//! }
//!
//! let mut client = ScpiClient::new(Loopback, true, " ", false, 2);
//! let mut request = ScpiRequest::new();
//! request.add_query("NAME");
//! request.add_query("JUIC");
//! let response = client.send_receive(&request).unwrap();
//! assert_eq!(response.get("NAME").unwrap(), &Bytes::from_static(b"orange"));
//! ```
//!
//! ## Timeouts
//!
//! Queries that time out are repeated `timeout_retries` times before the
//! [`Error::Timeout`](scpi_protocol::Error::Timeout) is returned. Set operations and all other
//! errors are never retried.
//!
//! ## Related Crates
//!
//! - [`scpi_server`](https://docs.rs/scpi-server/) - Server implementation and simulator
//! - [`scpi_protocol`](https://docs.rs/scpi-protocol/) - Payloads, codecs and framing
mod attribute_client;
mod scpi_client;
mod transport;

pub use attribute_client::AttributeClient;
pub use scpi_client::ScpiClient;
pub use transport::{TcpTransport, Transport};
