//! Wire-level tests for handshake reassembly: the backend's JSON message has
//! no framing, so completeness is determined purely by a successful parse of
//! the accumulated bytes.

use std::time::Duration;

use backend_bootstrap::{error::Error, handshake, rendezvous::RendezvousListener};
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    time::{sleep, timeout},
};

const MESSAGE: &str =
    r#"{"webServerPort": 56123, "webServerCertificatePath": "", "sessionId": "abc-123"}"#;

async fn deliver_in_chunks(chunks: Vec<Vec<u8>>) -> Result<handshake::HandshakeMessage, Error> {
    let listener = RendezvousListener::bind(0).await?;
    let port = listener.port();

    let writer = tokio::spawn(async move {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        for chunk in chunks {
            stream.write_all(&chunk).await.unwrap();
            stream.flush().await.unwrap();
            sleep(Duration::from_millis(10)).await;
        }
        // Keep the connection open until the receiver is done with it.
        sleep(Duration::from_millis(200)).await;
    });

    let mut connection = listener.accept().await?;
    let result = handshake::receive(&mut connection).await;
    writer.abort();
    result
}

#[tokio::test]
async fn single_chunk_parses() {
    let message = deliver_in_chunks(vec![MESSAGE.as_bytes().to_vec()])
        .await
        .unwrap();
    assert_eq!(message.web_server_port, 56123);
}

#[tokio::test]
async fn chunk_boundaries_do_not_change_the_result() {
    let whole = deliver_in_chunks(vec![MESSAGE.as_bytes().to_vec()])
        .await
        .unwrap();

    // Worst case: one byte per chunk.
    let bytes: Vec<Vec<u8>> = MESSAGE.bytes().map(|b| vec![b]).collect();
    let fragmented = deliver_in_chunks(bytes).await.unwrap();

    assert_eq!(whole.web_server_port, fragmented.web_server_port);
    assert_eq!(
        whole.web_server_certificate_path,
        fragmented.web_server_certificate_path
    );
    assert_eq!(whole.extra, fragmented.extra);

    // And an arbitrary two-way split through the middle of a key.
    let (a, b) = MESSAGE.as_bytes().split_at(20);
    let split = deliver_in_chunks(vec![a.to_vec(), b.to_vec()]).await.unwrap();
    assert_eq!(split.web_server_port, whole.web_server_port);
}

#[tokio::test]
async fn passthrough_fields_survive_parsing() {
    let message = deliver_in_chunks(vec![MESSAGE.as_bytes().to_vec()])
        .await
        .unwrap();
    assert_eq!(
        message.extra.get("sessionId"),
        Some(&serde_json::Value::String("abc-123".to_string()))
    );
}

#[tokio::test]
async fn close_before_complete_message_is_a_connection_error() {
    let listener = RendezvousListener::bind(0).await.unwrap();
    let port = listener.port();

    tokio::spawn(async move {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(b"{\"webServerPort\": 56").await.unwrap();
        stream.shutdown().await.unwrap();
    });

    let mut connection = listener.accept().await.unwrap();
    let err = timeout(Duration::from_secs(5), handshake::receive(&mut connection))
        .await
        .expect("receive should fail promptly on close")
        .unwrap_err();
    assert!(matches!(err, Error::Connection { .. }));
}

#[tokio::test]
async fn complete_document_with_wrong_shape_is_a_handshake_error() {
    let err = deliver_in_chunks(vec![br#"{"somethingElse": true}"#.to_vec()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Handshake { .. }));
}
