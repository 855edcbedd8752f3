//! # SCPI Attribute Server Library
//!
//! This crate provides the server side of the SCPI attribute stack: it turns SCPI units
//! received from a client into attribute requests, hands them to a backend, and renders the
//! backend's attribute values as the reply unit.
//!
//! ## Overview
//!
//! A backend only deals with named attributes and typed values. Everything that is specific to
//! SCPI (field names, bit flags packed into one integer, packet items, arbitrary blocks) is
//! resolved through an interface definition, the same definition a client of the instrument uses.
//!
//! ## Architecture
//!
//! The crate is built around three components:
//!
//! - **[`AttributeServer`] Trait**: Defines the interface that backends implement to apply set
//!   operations and answer queries on attributes
//! - **[`ScpiServer`] / [`ScpiBytesServer`]**: Translate between SCPI requests and attribute
//!   requests, and between raw units and SCPI requests
//! - **[`server::Server`]**: Accepts TCP connections, frames units and dispatches them
//!
//! [`simulator::Simulator`] is a ready-made backend that stores attribute values in memory.
//!
//! ## How It Works
//!
//! 1. A unit such as `JUIC 50.5;NAME?` arrives and is split into set operations and queries
//! 2. Fields are mapped to attributes; a flag field sets one attribute per registered bit
//! 3. The backend applies the set operations and answers the queries
//! 4. Attribute values are packed back into fields and joined into a reply unit, in the order
//!    in which the fields were queried
//!
//! ## Basic Usage
//!
//! ### Implementing a Backend
//!
//! ```ignore
//! use scpi_protocol::{AttributeRequest, AttributeResponse, Result};
//! use scpi_server::AttributeServer;
//!
//! struct Thermometer;
//!
//! impl AttributeServer for Thermometer {
//!     fn receive_send(&mut self, request: &AttributeRequest) -> Result<AttributeResponse> {
//!         let mut response = AttributeResponse::new();
//!         for query in request.queries() {
//!             response.add_query_response(query, 21.5);
//!         }
//!         Ok(response)
//!     }
//! }
//! ```
//!
//! ### Starting the Server
//!
//! ```ignore
//! use scpi_protocol::InterfaceDefinition;
//! use scpi_server::{server::Server, simulator::Simulator};
//!
//! let definition = InterfaceDefinition::from_yaml_file("fruit.yaml")?;
//! let mut server = Server::from_definition(Simulator::from_definition(&definition), &definition)?;
//! server.listen("127.0.0.1:5025")?;
//! ```
//!
//! ## Error Handling
//!
//! SCPI has no way to report a failed request inline. Requests that cannot be decoded, refer to
//! an unknown attribute or that the backend rejects are logged and produce no reply. Unknown
//! fields within an otherwise valid request are skipped with a warning.
//!
//! ## Configuration
//!
//! Server behavior can be customized via [`server::Config`]:
//!
//! - **sentinel**: Byte sequence terminating every unit (default: `\r\n`)
//! - **read_write_timeout**: Socket I/O timeout duration (default: 30 seconds)
//! - **max_unit_size**: Largest accepted unit (default: 10 MiB)
//! - **argument_separator** and **return_response**: As in the interface definition
//!
//! ## Logging
//!
//! This crate uses the `log` crate for diagnostics: connections, received units and replies,
//! and every request that had to be dropped.
//!
//! ## Thread Model
//!
//! The server processes each client connection sequentially in a single thread.
use scpi_protocol::{AttributeRequest, AttributeResponse, Result};

mod scpi_server;
pub mod server;
pub mod simulator;

pub use scpi_server::{ScpiBytesServer, ScpiServer};
pub use simulator::Simulator;

/// Trait that backends implement to serve attribute requests.
///
/// Implementors apply every set operation of the request, in order, and then answer each query
/// with the current value of the attribute.
pub trait AttributeServer {
    /// Apply the set operations of `request` and answer its queries.
    ///
    /// The response must hold a value for every queried attribute. Returning an error drops the
    /// whole request.
    fn receive_send(&mut self, request: &AttributeRequest) -> Result<AttributeResponse>;
}

impl<T: AttributeServer + ?Sized> AttributeServer for &mut T {
    fn receive_send(&mut self, request: &AttributeRequest) -> Result<AttributeResponse> {
        (**self).receive_send(request)
    }
}

impl<T: AttributeServer + ?Sized> AttributeServer for Box<T> {
    fn receive_send(&mut self, request: &AttributeRequest) -> Result<AttributeResponse> {
        (**self).receive_send(request)
    }
}
