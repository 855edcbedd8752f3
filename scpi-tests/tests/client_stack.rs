use std::{io::Write, net::TcpListener, thread, time::Duration};

use bytes::Bytes;
use scpi_client::{AttributeClient, ScpiClient, TcpTransport};
use scpi_protocol::{AttributeRequest, AttributeResponse, Error, ScpiRequest, framing::UnitReader};
use scpi_tests::{ScriptedTransport, fruit_client_definition};

fn fruit_request() -> AttributeRequest {
    let mut request = AttributeRequest::new();
    request.set_queries(["name", "juiciness", "peeled", "overripe", "under-ripe"]);
    request.add_setop("peeled", [true]);
    request.add_setop("chilled", [true]);
    request
}

fn expected_response() -> AttributeResponse {
    let mut response = AttributeResponse::new();
    response.add_query_response("name", "orange");
    response.add_query_response("juiciness", 98.7);
    response.add_query_response("peeled", true);
    response.add_query_response("overripe", false);
    response.add_query_response("under-ripe", true);
    response.add_query_response("chilled", true);
    response
}

#[test]
fn chained_client_stack() {
    let definition = fruit_client_definition();
    let transport = ScriptedTransport::new([&b"orange;98.7;1;130"[..]]);
    let mut client = AttributeClient::from_definition(transport, &definition).unwrap();

    let response = client.send_receive(&fruit_request()).unwrap();

    assert_eq!(response, expected_response());
    assert_eq!(
        client.scpi_client().transport().sent_units(),
        vec![&b"PEEL 1;FLAGS 128"[..], &b"NAME?;JUIC?;PEEL?;FLAGS?"[..]]
    );
}

#[test]
fn unchained_client_stack() {
    let mut definition = fruit_client_definition();
    definition.supports_chains = false;
    let transport = ScriptedTransport::new([
        &b"orange"[..],
        &b"98.7"[..],
        &b"1"[..],
        &b"130"[..],
    ]);
    let mut client = AttributeClient::from_definition(transport, &definition).unwrap();

    let response = client.send_receive(&fruit_request()).unwrap();

    assert_eq!(response, expected_response());
    assert_eq!(
        client.scpi_client().transport().sent_units(),
        vec![
            &b"PEEL 1"[..],
            &b"FLAGS 128"[..],
            &b"NAME?"[..],
            &b"JUIC?"[..],
            &b"PEEL?"[..],
            &b"FLAGS?"[..],
        ]
    );
}

#[test]
fn acknowledged_setops_are_read() {
    let mut definition = fruit_client_definition();
    definition.return_response = true;
    let transport = ScriptedTransport::new([&b""[..], &b"1"[..]]);
    let mut client = AttributeClient::from_definition(transport, &definition).unwrap();

    let mut request = AttributeRequest::new();
    request.add_setop("peeled", [true]);
    request.add_query("peeled");
    let response = client.send_receive(&request).unwrap();

    assert_eq!(
        response.get("peeled").and_then(|value| value.as_bool()),
        Some(true)
    );
    assert!(client.scpi_client().transport().replies.is_empty());
}

#[test]
fn timed_out_queries_are_retried() {
    let definition = fruit_client_definition();
    let mut transport = ScriptedTransport::default();
    transport.push_timeout();
    transport.push_timeout();
    transport.replies.push_back(Ok(Bytes::from_static(b"orange")));
    let mut client = AttributeClient::new(
        ScpiClient::new(transport, true, " ", false, 2),
        definition.attributes.clone(),
    )
    .unwrap();

    let mut request = AttributeRequest::new();
    request.add_query("name");
    let response = client.send_receive(&request).unwrap();

    assert_eq!(
        response.get("name").and_then(|value| value.as_str()),
        Some("orange")
    );
    assert_eq!(client.scpi_client().transport().sent.len(), 3);
}

#[test]
fn retries_are_exhausted() {
    let definition = fruit_client_definition();
    let mut transport = ScriptedTransport::default();
    for _ in 0..3 {
        transport.push_timeout();
    }
    let mut client = AttributeClient::new(
        ScpiClient::new(transport, true, " ", false, 2),
        definition.attributes.clone(),
    )
    .unwrap();

    let mut request = AttributeRequest::new();
    request.add_query("name");
    let result = client.send_receive(&request);

    assert!(matches!(result, Err(Error::Timeout(_))));
    assert_eq!(client.scpi_client().transport().sent.len(), 3);
}

#[test]
fn unknown_attribute_is_rejected_before_sending() {
    let definition = fruit_client_definition();
    let mut client =
        AttributeClient::from_definition(ScriptedTransport::default(), &definition).unwrap();

    let mut request = AttributeRequest::new();
    request.add_query("colour");

    assert!(matches!(
        client.send_receive(&request),
        Err(Error::UnknownAttribute(attribute)) if attribute == "colour"
    ));
    assert!(client.scpi_client().transport().sent.is_empty());
}

#[test]
fn read_only_attribute_cannot_be_written() {
    let definition = fruit_client_definition();
    let mut client =
        AttributeClient::from_definition(ScriptedTransport::default(), &definition).unwrap();

    let mut request = AttributeRequest::new();
    request.add_setop("name", ["apple"]);

    assert!(matches!(
        client.send_receive(&request),
        Err(Error::NotWritable(_))
    ));
}

#[test]
fn late_replies_do_not_answer_later_queries() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let instrument = thread::spawn(move || {
        let (mut slow, _) = listener.accept().unwrap();
        assert_eq!(
            UnitReader::default().read_unit(&mut slow).unwrap(),
            &b"NAME?"[..]
        );
        let (mut fast, _) = listener.accept().unwrap();
        thread::sleep(Duration::from_millis(50));
        // The client has given up on this connection already.
        let _ = slow.write_all(b"NAME-1\r\n");

        let mut reader = UnitReader::default();
        assert_eq!(reader.read_unit(&mut fast).unwrap(), &b"NAME?"[..]);
        fast.write_all(b"NAME-2\r\n").unwrap();
        assert_eq!(reader.read_unit(&mut fast).unwrap(), &b"JUIC?"[..]);
        fast.write_all(b"98.7\r\n").unwrap();
    });

    let transport = TcpTransport::connect(addr, Duration::from_millis(100), "\r\n").unwrap();
    let mut client = ScpiClient::new(transport, true, " ", false, 2);

    let mut name = ScpiRequest::new();
    name.add_query("NAME");
    let response = client.send_receive(&name).unwrap();
    assert_eq!(
        response.get("NAME").unwrap(),
        &Bytes::from_static(b"NAME-2")
    );

    let mut juiciness = ScpiRequest::new();
    juiciness.add_query("JUIC");
    let response = client.send_receive(&juiciness).unwrap();
    assert_eq!(response.get("JUIC").unwrap(), &Bytes::from_static(b"98.7"));

    instrument.join().unwrap();
}
