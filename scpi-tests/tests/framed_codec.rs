use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use scpi_protocol::{BlockData, Error, ScpiCodec, SentinelFramer, block::encode_block};
use scpi_server::{ScpiBytesServer, simulator::Simulator};
use scpi_tests::fruit_server_definition;
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
};
use tokio_util::codec::{Framed, FramedRead, FramedWrite};

#[tokio::test]
async fn units_survive_arbitrary_chunking() {
    let (client, server) = tokio::io::duplex(16);
    let payload = encode_block(&BlockData::UInt8(b"\r\n\r\n".to_vec())).unwrap();

    let writer = tokio::spawn(async move {
        let mut sink = FramedWrite::new(client, SentinelFramer::default());
        sink.send(Bytes::from(payload)).await.unwrap();
        sink.send(&b"NAME?;JUIC?"[..]).await.unwrap();
    });

    let mut units = FramedRead::new(server, SentinelFramer::default());
    assert_eq!(
        units.next().await.unwrap().unwrap(),
        &b"#14\r\n\r\n"[..]
    );
    assert_eq!(units.next().await.unwrap().unwrap(), &b"NAME?;JUIC?"[..]);
    writer.await.unwrap();
    assert!(units.next().await.is_none());
}

#[tokio::test]
async fn oversized_unit_is_an_error() {
    let (mut client, server) = tokio::io::duplex(64);
    client.write_all(b"NAME?;JUIC?;ROTT?;PEEL?\r\n").await.unwrap();
    drop(client);

    let mut units = FramedRead::new(server, SentinelFramer::default().with_max_unit_size(8));
    assert!(matches!(
        units.next().await,
        Some(Err(Error::TooManyBytes { max: 8, .. }))
    ));
}

#[tokio::test]
async fn serves_a_simulator_with_the_async_codec() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let definition = fruit_server_definition();
        let mut simulator = Simulator::from_definition(&definition);
        simulator.set_value("name", "orange");
        simulator.set_value("juiciness", 98.7);
        let mut bytes_server = ScpiBytesServer::from_definition(simulator, &definition).unwrap();

        let (tcp, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(tcp, SentinelFramer::default());
        while let Some(unit) = framed.next().await {
            if let Some(reply) = bytes_server.receive_send(&unit.unwrap()).unwrap() {
                framed.send(reply).await.unwrap();
            }
        }
    });

    let tcp = TcpStream::connect(addr).await.unwrap();
    let mut framed = Framed::new(tcp, SentinelFramer::default());
    framed.send(&b"JUIC 50.5"[..]).await.unwrap();
    assert_eq!(framed.next().await.unwrap().unwrap(), Bytes::new());
    framed.send(&b"NAME?;JUIC?"[..]).await.unwrap();
    let reply = framed.next().await.unwrap().unwrap();

    let fields = ["NAME".to_string(), "JUIC".to_string()];
    let response = ScpiCodec::default()
        .unmarshal_response(&[reply], &fields)
        .unwrap();
    assert_eq!(
        response.get("NAME").unwrap(),
        &Bytes::from_static(b"orange")
    );
    assert_eq!(response.get("JUIC").unwrap(), &Bytes::from_static(b"50.5"));

    drop(framed);
    server.await.unwrap();
}
