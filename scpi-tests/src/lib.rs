//! Fixtures shared by the cross-crate tests.
use std::{
    collections::VecDeque,
    net::{SocketAddr, TcpListener},
    thread,
    time::Duration,
};

use bytes::Bytes;
use scpi_client::Transport;
use scpi_protocol::{
    AttributeRequest, AttributeResponse, AttributeValue, Error, InterfaceDefinition, Result,
};
use scpi_server::{AttributeServer, ScpiBytesServer, server::Server, simulator::Simulator};

/// Fruit instrument as seen by a client.
pub const FRUIT_CLIENT: &str = r#"
model: fruit
poll_rate: 0.1
timeout: 0.5
supports_chains: true
sentinel_string: "\r\n"
attributes:
  name:
    read: {field: NAME, field_type: str}
  juiciness:
    read_write: {field: JUIC, field_type: float}
  peeled:
    read_write: {field: PEEL, field_type: bool}
  overripe:
    read_write: {field: FLAGS, field_type: bit, bit: 0}
  under-ripe:
    read_write: {field: FLAGS, field_type: bit, bit: 1}
  chilled:
    read_write: {field: FLAGS, field_type: bit, bit: 7}
"#;

/// Fruit instrument with integer, packet and write-only process fields.
pub const FRUIT_SERVER: &str = r#"
model: fruit
poll_rate: 0.1
timeout: 0.5
supports_chains: true
sentinel_string: "\r\n"
argument_separator: " "
return_response: true
attributes:
  name:
    read: {field: NAME, field_type: str}
  juiciness:
    read_write: {field: JUIC, field_type: float}
  rotten:
    read_write: {field: ROTT, field_type: int}
  peeled:
    read_write: {field: PEEL, field_type: bool}
  overripe:
    read_write: {field: FLAGS, field_type: bit, bit: 0}
  under-ripe:
    read_write: {field: FLAGS, field_type: bit, bit: 1}
  chilled:
    read_write: {field: FLAGS, field_type: bit, bit: 7}
  boiled:
    read: {field: PROCESS, field_type: packet_item, packet_item: 0}
    write: {field: BOIL, field_type: float}
  fried:
    read: {field: PROCESS, field_type: packet_item, packet_item: 1}
    write: {field: FRY, field_type: float}
  dried:
    read: {field: PROCESS, field_type: packet_item, packet_item: 2}
    write: {field: DRY, field_type: float}
  fermented:
    read: {field: PROCESS, field_type: packet_item, packet_item: 3}
    write: {field: FERMENT, field_type: float}
"#;

pub fn fruit_client_definition() -> InterfaceDefinition {
    InterfaceDefinition::from_yaml_str(FRUIT_CLIENT).unwrap()
}

pub fn fruit_server_definition() -> InterfaceDefinition {
    InterfaceDefinition::from_yaml_str(FRUIT_SERVER).unwrap()
}

/// Values of every attribute of [`FRUIT_SERVER`].
pub fn fruit_values() -> AttributeResponse {
    let mut response = AttributeResponse::new();
    response.add_query_response("name", "orange");
    response.add_query_response("juiciness", 98.7);
    response.add_query_response("rotten", 30);
    response.add_query_response("peeled", true);
    response.add_query_response("overripe", false);
    response.add_query_response("under-ripe", true);
    response.add_query_response("chilled", true);
    response.add_query_response("boiled", 0.1);
    response.add_query_response("fried", 0.2);
    response.add_query_response("dried", 0.3);
    response.add_query_response("fermented", 0.4);
    response
}

/// Records every unit it is asked to send and replays scripted replies.
///
/// When the script runs out, reads time out.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    pub sent: Vec<Bytes>,
    pub replies: VecDeque<Result<Bytes>>,
}

impl ScriptedTransport {
    pub fn new<I, B>(replies: I) -> ScriptedTransport
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        ScriptedTransport {
            sent: Vec::new(),
            replies: replies.into_iter().map(|reply| Ok(reply.into())).collect(),
        }
    }

    pub fn push_timeout(&mut self) {
        self.replies.push_back(Err(Error::Timeout(Duration::from_millis(500))));
    }

    pub fn sent_units(&self) -> Vec<&[u8]> {
        self.sent.iter().map(|unit| &unit[..]).collect()
    }
}

impl Transport for ScriptedTransport {
    fn send_receive(&mut self, request: &[u8], expect_response: bool) -> Result<Option<Bytes>> {
        self.sent.push(Bytes::copy_from_slice(request));
        if !expect_response {
            return Ok(None);
        }
        self.replies
            .pop_front()
            .unwrap_or_else(|| Err(Error::Timeout(Duration::from_millis(500))))
            .map(Some)
    }
}

/// Answers every request with a fixed response and keeps the requests it saw.
#[derive(Debug, Default)]
pub struct RecordingServer {
    pub requests: Vec<AttributeRequest>,
    pub response: AttributeResponse,
}

impl RecordingServer {
    pub fn new(response: AttributeResponse) -> RecordingServer {
        RecordingServer {
            requests: Vec::new(),
            response,
        }
    }
}

impl AttributeServer for RecordingServer {
    fn receive_send(&mut self, request: &AttributeRequest) -> Result<AttributeResponse> {
        self.requests.push(request.clone());
        Ok(self.response.clone())
    }
}

/// Hands units straight to a server stack, without any sockets in between.
pub struct InProcessTransport<S: AttributeServer> {
    pub server: ScpiBytesServer<S>,
}

impl<S: AttributeServer> Transport for InProcessTransport<S> {
    fn send_receive(&mut self, request: &[u8], expect_response: bool) -> Result<Option<Bytes>> {
        let reply = self.server.receive_send(request)?;
        if expect_response {
            reply
                .map(Some)
                .ok_or(Error::Timeout(Duration::from_millis(500)))
        } else {
            Ok(None)
        }
    }
}

/// A definition with `size` attributes of every scalar type, and `size` bits spread over flag
/// fields of 100 bits each.
pub fn stress_definition(size: usize) -> InterfaceDefinition {
    let mut yaml = String::from(
        "model: TEST\nsupports_chains: true\ntimeout: 3.0\nreturn_response: false\nattributes:\n",
    );
    for i in 1..=size {
        yaml.push_str(&format!(
            "  float{i}:\n    read_write: {{field: FLT{i}, field_type: float}}\n"
        ));
        yaml.push_str(&format!(
            "  string{i}:\n    read_write: {{field: STR{i}, field_type: str}}\n"
        ));
        yaml.push_str(&format!(
            "  boolean{i}:\n    read_write: {{field: BOOL{i}, field_type: bool}}\n"
        ));
        yaml.push_str(&format!(
            "  bit{i}:\n    read_write: {{field: FLGS{}, field_type: bit, bit: {}}}\n",
            1 + (i - 1) / 100,
            (i - 1) % 100
        ));
    }
    InterfaceDefinition::from_yaml_str(&yaml).unwrap()
}

/// Initial values for every attribute of [`stress_definition`].
pub fn stress_values(size: usize) -> Vec<(String, AttributeValue)> {
    let mut values = Vec::with_capacity(4 * size);
    for i in 1..=size {
        values.push((format!("float{i}"), AttributeValue::Float(i as f64)));
        values.push((format!("string{i}"), AttributeValue::Str(i.to_string())));
        values.push((format!("boolean{i}"), AttributeValue::Bool(i % 2 == 0)));
        values.push((format!("bit{i}"), AttributeValue::Bool(i % 2 == 0)));
    }
    values
}

/// Serves `simulator` on an ephemeral localhost port from a background thread.
pub fn spawn_simulator(simulator: Simulator, definition: &InterfaceDefinition) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let mut server = Server::from_definition(simulator, definition).unwrap();
    thread::spawn(move || server.serve(listener));
    addr
}
