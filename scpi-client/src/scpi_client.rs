use std::io;

use bytes::Bytes;
use scpi_protocol::{InterfaceDefinition, Result, ScpiCodec, ScpiRequest, ScpiResponse};

use crate::transport::Transport;

/// Sends SCPI requests over a [`Transport`] and parses the replies.
#[derive(Debug)]
pub struct ScpiClient<T> {
    transport: T,
    codec: ScpiCodec,
    return_response: bool,
    timeout_retries: u32,
}

impl<T: Transport> ScpiClient<T> {
    /// Creates a client.
    ///
    /// # Arguments
    ///
    /// * `chain` - Send all set operations (and all queries) of a request in one unit
    /// * `argument_separator` - Text between a field and its arguments
    /// * `return_response` - The instrument answers set operations with a unit that must be read
    /// * `timeout_retries` - How often a timed out query is repeated before the timeout is returned.
    ///   The transport is reset before every repeat, and before a timeout is returned, so a late
    ///   reply never answers a later query.
    pub fn new(
        transport: T,
        chain: bool,
        argument_separator: impl Into<String>,
        return_response: bool,
        timeout_retries: u32,
    ) -> ScpiClient<T> {
        ScpiClient {
            transport,
            codec: ScpiCodec::new(chain, argument_separator),
            return_response,
            timeout_retries,
        }
    }

    pub fn from_definition(transport: T, definition: &InterfaceDefinition) -> ScpiClient<T> {
        ScpiClient::new(
            transport,
            definition.supports_chains,
            definition.argument_separator.as_str(),
            definition.return_response,
            definition.timeout_retries,
        )
    }

    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Writes the set operations of `request`, then queries its fields.
    pub fn send_receive(&mut self, request: &ScpiRequest) -> Result<ScpiResponse> {
        for unit in self.codec.marshal_setops(request) {
            log::debug!("Sending set operations {}", String::from_utf8_lossy(&unit));
            let ack = match self.transport.send_receive(&unit, self.return_response) {
                Err(e) if e.is_timeout() => {
                    self.transport.reset()?;
                    return Err(e);
                }
                other => other?,
            };
            if let Some(ack) = ack {
                log::trace!("Discarding acknowledgement {:02x?}", &ack[..]);
            }
        }

        let fields: Vec<String> = request.queries().map(str::to_string).collect();
        let mut responses = Vec::new();
        for unit in self.codec.marshal_queries(request) {
            log::debug!("Sending queries {}", String::from_utf8_lossy(&unit));
            responses.push(self.query(&unit)?);
        }
        self.codec.unmarshal_response(&responses, &fields)
    }

    fn query(&mut self, unit: &[u8]) -> Result<Bytes> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.send_receive(unit, true) {
                Ok(Some(response)) => return Ok(response),
                Ok(None) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "Transport returned no response to a query",
                    )
                    .into());
                }
                Err(e) if e.is_timeout() => {
                    self.transport.reset()?;
                    if attempt > self.timeout_retries {
                        return Err(e);
                    }
                    log::warn!(
                        "Query timed out (attempt {} of {}), retrying",
                        attempt,
                        self.timeout_retries + 1
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::{collections::VecDeque, time::Duration};

    use scpi_protocol::Error;

    use super::*;

    /// Records sent units and replays canned replies.
    #[derive(Default)]
    pub struct MockTransport {
        pub sent: Vec<Vec<u8>>,
        pub replies: VecDeque<Result<Bytes>>,
        pub resets: usize,
    }

    impl MockTransport {
        pub fn with_replies(replies: impl IntoIterator<Item = Result<Bytes>>) -> MockTransport {
            MockTransport {
                sent: Vec::new(),
                replies: replies.into_iter().collect(),
                resets: 0,
            }
        }
    }

    impl Transport for MockTransport {
        fn send_receive(&mut self, request: &[u8], expect_response: bool) -> Result<Option<Bytes>> {
            self.sent.push(request.to_vec());
            if !expect_response {
                return Ok(None);
            }
            self.replies
                .pop_front()
                .unwrap_or_else(|| Err(Error::Timeout(Duration::from_secs(1))))
                .map(Some)
        }

        fn reset(&mut self) -> Result<()> {
            self.resets += 1;
            Ok(())
        }
    }

    fn timeout() -> Result<Bytes> {
        Err(Error::Timeout(Duration::from_secs(1)))
    }

    fn query_request() -> ScpiRequest {
        let mut request = ScpiRequest::new();
        request.add_query("NAME");
        request
    }

    #[test]
    fn retries_after_timeouts() {
        let transport =
            MockTransport::with_replies([timeout(), timeout(), Ok(Bytes::from_static(b"orange"))]);
        let mut client = ScpiClient::new(transport, true, " ", false, 2);
        let response = client.send_receive(&query_request()).unwrap();
        assert_eq!(
            response.get("NAME").unwrap(),
            &Bytes::from_static(b"orange")
        );
        assert_eq!(client.transport().sent.len(), 3);
        assert_eq!(client.transport().resets, 2);
    }

    #[test]
    fn gives_up_after_retries() {
        let transport = MockTransport::with_replies([
            timeout(),
            timeout(),
            timeout(),
            Ok(Bytes::from_static(b"orange")),
        ]);
        let mut client = ScpiClient::new(transport, true, " ", false, 2);
        assert!(matches!(
            client.send_receive(&query_request()),
            Err(Error::Timeout(_))
        ));
        assert_eq!(client.transport().sent.len(), 3);
        assert_eq!(client.transport().resets, 3);
    }

    #[test]
    fn io_errors_are_not_retried() {
        let transport = MockTransport::with_replies([
            Err(Error::Io(io::Error::from(io::ErrorKind::ConnectionReset))),
            Ok(Bytes::from_static(b"orange")),
        ]);
        let mut client = ScpiClient::new(transport, true, " ", false, 2);
        assert!(matches!(
            client.send_receive(&query_request()),
            Err(Error::Io(_))
        ));
        assert_eq!(client.transport().sent.len(), 1);
        assert_eq!(client.transport().resets, 0);
    }

    #[test]
    fn unacknowledged_setop_resets_the_transport() {
        let mut client = ScpiClient::new(MockTransport::default(), true, " ", true, 2);
        let mut request = ScpiRequest::new();
        request.add_setop("PEEL", vec!["1".into()]);
        assert!(matches!(
            client.send_receive(&request),
            Err(Error::Timeout(_))
        ));
        assert_eq!(client.transport().sent.len(), 1);
        assert_eq!(client.transport().resets, 1);
    }

    #[test]
    fn acknowledged_setops() {
        let transport = MockTransport::with_replies([
            Ok(Bytes::new()),
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"1")),
        ]);
        let mut client = ScpiClient::new(transport, false, " ", true, 0);
        let mut request = ScpiRequest::new();
        request.add_setop("PEEL", vec!["1".into()]);
        request.add_setop("BOIL", vec!["0.5".into()]);
        request.add_query("PEEL");
        let response = client.send_receive(&request).unwrap();
        assert_eq!(response.get("PEEL").unwrap(), &Bytes::from_static(b"1"));
        assert_eq!(
            client.into_transport().sent,
            vec![b"PEEL 1".to_vec(), b"BOIL 0.5".to_vec(), b"PEEL?".to_vec()]
        );
    }

    #[test]
    fn setops_only() {
        let mut client = ScpiClient::new(MockTransport::default(), true, " ", false, 2);
        let mut request = ScpiRequest::new();
        request.add_setop("*RST", vec![]);
        let response = client.send_receive(&request).unwrap();
        assert!(response.is_empty());
        assert_eq!(client.transport().sent, vec![b"*RST".to_vec()]);
    }
}
