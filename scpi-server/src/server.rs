use std::{
    io::ErrorKind,
    net::{TcpListener, TcpStream, ToSocketAddrs},
    time::Duration,
};

use scpi_protocol::{
    AttributeDefinitions, Error, InterfaceDefinition, Result, SentinelFramer,
    framing::{DEFAULT_MAX_UNIT_SIZE, UnitReader, write_unit},
};

use crate::{
    AttributeServer,
    scpi_server::{ScpiBytesServer, ScpiServer},
};

#[derive(Debug, Clone)]
pub struct Config {
    pub sentinel: String,
    pub read_write_timeout: Duration,
    pub max_unit_size: usize,
    pub argument_separator: String,
    pub return_response: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sentinel: "\r\n".to_string(),
            read_write_timeout: Duration::from_secs(30),
            max_unit_size: DEFAULT_MAX_UNIT_SIZE,
            argument_separator: " ".to_string(),
            return_response: false,
        }
    }
}

impl Config {
    /// Takes the sentinel, separator and acknowledgement behaviour from an interface definition.
    pub fn from_definition(definition: &InterfaceDefinition) -> Config {
        Config {
            sentinel: definition.sentinel_string.clone(),
            argument_separator: definition.argument_separator.clone(),
            return_response: definition.return_response,
            ..Config::default()
        }
    }
}

/// Serves an [`AttributeServer`] to SCPI clients over TCP, one connection at a time.
#[derive(Debug)]
pub struct Server<S: AttributeServer> {
    bytes_server: ScpiBytesServer<S>,
    config: Config,
}

/// Builder to create a [Server] instance and modify configuration options
///
/// # Example
///
/// ```ignore
/// use scpi_server::server::Builder;
/// use std::time::Duration;
///
/// let server = Builder::new()
///     .sentinel("\n")
///     .rw_timeout(Duration::from_secs(20))
///     .build(simulator, definition.attributes.clone())?;
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set the byte sequence that terminates every unit.
    pub fn sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.config.sentinel = sentinel.into();
        self
    }

    /// Set the TCP read and write timeout
    pub fn rw_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_write_timeout = timeout;
        self
    }

    /// Set the largest unit this server is expected to receive.
    pub fn max_unit_size(mut self, size: usize) -> Self {
        self.config.max_unit_size = size;
        self
    }

    pub fn argument_separator(mut self, separator: impl Into<String>) -> Self {
        self.config.argument_separator = separator.into();
        self
    }

    /// Acknowledge units that contain no queries with an empty unit.
    pub fn return_response(mut self, return_response: bool) -> Self {
        self.config.return_response = return_response;
        self
    }

    /// Build and return the server
    pub fn build<S: AttributeServer>(
        self,
        attribute_server: S,
        attributes: AttributeDefinitions,
    ) -> Result<Server<S>> {
        Server::new(attribute_server, attributes, self.config)
    }
}

impl<S: AttributeServer> Server<S> {
    pub fn new(
        attribute_server: S,
        attributes: AttributeDefinitions,
        config: Config,
    ) -> Result<Server<S>> {
        let scpi_server = ScpiServer::new(attribute_server, attributes)?;
        let bytes_server = ScpiBytesServer::new(
            scpi_server,
            config.argument_separator.as_str(),
            config.return_response,
        );
        Ok(Server {
            bytes_server,
            config,
        })
    }

    pub fn from_definition(
        attribute_server: S,
        definition: &InterfaceDefinition,
    ) -> Result<Server<S>> {
        Server::new(
            attribute_server,
            definition.attributes.clone(),
            Config::from_definition(definition),
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn attribute_server(&mut self) -> &mut S {
        self.bytes_server.scpi_server().attribute_server()
    }

    pub fn listen(
        &mut self,
        addr: impl ToSocketAddrs,
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr)?;
        log::info!("Server listening on {}", listener.local_addr()?);
        self.serve(listener);
        Ok(())
    }

    /// Accepts connections from `listener` and serves them one after the other.
    pub fn serve(&mut self, listener: TcpListener) {
        for stream in listener.incoming() {
            match stream {
                Ok(tcp) => {
                    if let Ok(addr) = tcp.peer_addr() {
                        log::info!("New client connection from {}", addr);
                    }
                    if let Err(e) = self.handle_client(tcp) {
                        log::error!("Client error: {}", e);
                    }
                }
                Err(e) => log::error!("Connection error: {}", e),
            }
        }
    }

    /// Serves a single connection until the client disconnects or stays silent for longer than
    /// the read timeout.
    pub fn handle_client(&mut self, mut tcp: TcpStream) -> Result<()> {
        tcp.set_read_timeout(Some(self.config.read_write_timeout))?;
        tcp.set_write_timeout(Some(self.config.read_write_timeout))?;

        let framer = SentinelFramer::new(&self.config.sentinel)
            .with_max_unit_size(self.config.max_unit_size);
        let mut reader = UnitReader::new(framer);
        loop {
            match reader.read_unit(&mut tcp) {
                Ok(unit) => self.process_unit(&unit, &mut tcp)?,
                Err(Error::Io(err))
                    if err.kind() == ErrorKind::TimedOut || err.kind() == ErrorKind::WouldBlock =>
                {
                    log::error!("Client read timeout, closing connection");
                    break;
                }
                Err(Error::Io(err))
                    if err.kind() == ErrorKind::ConnectionAborted
                        || err.kind() == ErrorKind::ConnectionReset
                        || err.kind() == ErrorKind::UnexpectedEof =>
                {
                    log::info!("Client disconnected");
                    break;
                }
                Err(e @ (Error::TooManyBytes { .. } | Error::BlockLength { .. })) => {
                    log::error!("Discarding malformed unit: {}", e);
                }
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    /// Answers one unit. Errors in the request itself are logged and do not end the connection.
    fn process_unit(&mut self, unit: &[u8], tcp: &mut TcpStream) -> Result<()> {
        log::debug!("Received unit {}", String::from_utf8_lossy(unit));
        log::trace!("Received unit data: {:02x?}", unit);
        match self.bytes_server.receive_send(unit) {
            Ok(Some(reply)) => {
                log::debug!("Sending reply {}", String::from_utf8_lossy(&reply));
                write_unit(tcp, &reply, self.config.sentinel.as_bytes())?;
            }
            Ok(None) => {}
            Err(e) => log::error!(
                "Failed to process request {}: {}",
                String::from_utf8_lossy(unit),
                e
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{io::Write, thread};

    use scpi_protocol::{AttributeDefinition, AttributeValue, FieldBinding, FieldType};

    use super::*;
    use crate::simulator::Simulator;

    fn attributes() -> AttributeDefinitions {
        [
            (
                "name",
                AttributeDefinition::read_only(FieldBinding::new("NAME", FieldType::Str)),
            ),
            (
                "juiciness",
                AttributeDefinition::read_write(FieldBinding::new("JUIC", FieldType::Float)),
            ),
        ]
        .into_iter()
        .map(|(name, definition)| (name.to_string(), definition))
        .collect()
    }

    #[test]
    fn builder_sets_config() {
        let simulator = Simulator::new();
        let server = Builder::new()
            .sentinel("\n")
            .rw_timeout(Duration::from_secs(1))
            .max_unit_size(64)
            .argument_separator(",")
            .return_response(true)
            .build(simulator, attributes())
            .unwrap();
        let config = server.config();
        assert_eq!(config.sentinel, "\n");
        assert_eq!(config.read_write_timeout, Duration::from_secs(1));
        assert_eq!(config.max_unit_size, 64);
        assert_eq!(config.argument_separator, ",");
        assert!(config.return_response);
    }

    #[test]
    fn serves_a_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut simulator = Simulator::new();
        simulator.set_value("name", "orange");
        simulator.set_value("juiciness", 98.7);
        let mut server = Server::new(simulator, attributes(), Config::default()).unwrap();

        let client = thread::spawn(move || {
            let mut tcp = TcpStream::connect(addr).unwrap();
            let mut reader = UnitReader::default();
            tcp.write_all(b"JUIC 50.5\r\nBOGUS?;\xff\r\nNAME?;JUIC?\r\n").unwrap();
            reader.read_unit(&mut tcp).unwrap()
        });

        let (tcp, _) = listener.accept().unwrap();
        server.handle_client(tcp).unwrap();
        assert_eq!(client.join().unwrap(), &b"orange;50.5"[..]);
        assert_eq!(
            server.attribute_server().value("juiciness"),
            Some(&AttributeValue::Float(50.5))
        );
    }
}
