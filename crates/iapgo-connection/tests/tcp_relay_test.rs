//! Relay tests over real loopback TCP connections

use iapgo_connection::{bind_local, Relay};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::Span;

/// Helper: Start a simple echo server
async fn start_echo_server() -> (u16, tokio::task::JoinHandle<()>) {
    let (listener, port) = bind_local(0).await.unwrap();

    let handle = tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    (port, handle)
}

#[tokio::test]
async fn test_relay_tcp_echo_round_trip() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();

    let (echo_port, echo_handle) = start_echo_server().await;
    let (front, front_port) = bind_local(0).await.unwrap();

    let relay_task = tokio::spawn(async move {
        let (local, _) = front.accept().await.unwrap();
        let tunnel = TcpStream::connect(("127.0.0.1", echo_port)).await.unwrap();
        Relay::new(local, tunnel, &Span::current()).handle().await
    });

    let mut client = TcpStream::connect(("127.0.0.1", front_port)).await.unwrap();
    let payload = vec![0x5au8; 64 * 1024];
    client.write_all(&payload).await.unwrap();
    client.shutdown().await.unwrap();

    let mut echoed = Vec::new();
    client.read_to_end(&mut echoed).await.unwrap();
    assert_eq!(echoed.len(), payload.len());
    assert_eq!(echoed, payload);

    let outcome = relay_task.await.unwrap();
    assert!(outcome.is_clean());
    assert_eq!(*outcome.local_to_tunnel.as_ref().unwrap(), payload.len() as u64);
    assert_eq!(*outcome.tunnel_to_local.as_ref().unwrap(), payload.len() as u64);

    echo_handle.abort();
}
