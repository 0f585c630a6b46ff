#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Once;
use std::time::Duration;

use peerlink::{Client, ClientConfig, Kind, Message, Server, ServerConfig, Status};

static INIT: Once = Once::new();

fn setup_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("peerlink=debug")
            .try_init();
    });
}

fn unique_name(case: &str) -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    format!(
        "peerlink-test-{case}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

async fn server_wait_connected(server: &mut Server) {
    loop {
        match server.read().await.expect("server closed before connecting") {
            Message::StatusChange(Status::Connected) => return,
            Message::StatusChange(_) => continue,
            Message::Error { kind, detail } => panic!("unexpected error: {kind:?} {detail}"),
            Message::Payload { .. } => panic!("unexpected payload before Connected"),
        }
    }
}

async fn client_wait_connected(client: &mut Client) {
    loop {
        match client.read().await.expect("client closed before connecting") {
            Message::StatusChange(Status::Connected) => return,
            Message::StatusChange(_) => continue,
            Message::Error { kind, detail } => panic!("unexpected error: {kind:?} {detail}"),
            Message::Payload { .. } => panic!("unexpected payload before Connected"),
        }
    }
}

async fn server_next_payload(server: &mut Server) -> (i32, Vec<u8>) {
    loop {
        match server
            .read()
            .await
            .expect("server closed while awaiting payload")
        {
            Message::Payload { msg_type, payload } => return (msg_type, payload.to_vec()),
            Message::StatusChange(_) => continue,
            Message::Error { kind, detail } => panic!("unexpected error: {kind:?} {detail}"),
        }
    }
}

async fn client_next_payload(client: &mut Client) -> (i32, Vec<u8>) {
    loop {
        match client
            .read()
            .await
            .expect("client closed while awaiting payload")
        {
            Message::Payload { msg_type, payload } => return (msg_type, payload.to_vec()),
            Message::StatusChange(_) => continue,
            Message::Error { kind, detail } => panic!("unexpected error: {kind:?} {detail}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn round_trip_encrypted() {
    setup_logger();
    let name = unique_name("roundtrip-enc");

    let mut server = Server::start(name.clone(), ServerConfig::default())
        .await
        .unwrap();
    let mut client = Client::start(name, ClientConfig::default()).await.unwrap();

    server_wait_connected(&mut server).await;
    client_wait_connected(&mut client).await;

    server.write(5, b"Hello Client".to_vec()).await.unwrap();
    client.write(7, b"Hello Server".to_vec()).await.unwrap();

    let (ty, body) = client_next_payload(&mut client).await;
    assert_eq!(ty, 5);
    assert_eq!(body, b"Hello Client");

    let (ty, body) = server_next_payload(&mut server).await;
    assert_eq!(ty, 7);
    assert_eq!(body, b"Hello Server");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn round_trip_plaintext() {
    setup_logger();
    let name = unique_name("roundtrip-plain");

    let server_config = ServerConfig {
        encryption: false,
        ..ServerConfig::default()
    };
    let client_config = ClientConfig {
        encryption: false,
        ..ClientConfig::default()
    };

    let mut server = Server::start(name.clone(), server_config).await.unwrap();
    let mut client = Client::start(name, client_config).await.unwrap();

    server_wait_connected(&mut server).await;
    client_wait_connected(&mut client).await;

    server.write(1, b"plain hello".to_vec()).await.unwrap();
    let (ty, body) = client_next_payload(&mut client).await;
    assert_eq!(ty, 1);
    assert_eq!(body, b"plain hello");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reserved_type_is_rejected() {
    setup_logger();
    let name = unique_name("reserved");

    let mut server = Server::start(name.clone(), ServerConfig::default())
        .await
        .unwrap();
    let mut client = Client::start(name, ClientConfig::default()).await.unwrap();

    server_wait_connected(&mut server).await;
    client_wait_connected(&mut client).await;

    let err = client.write(0, Vec::new()).await.unwrap_err();
    assert_eq!(err.kind(), Kind::ReservedType);

    let err = server.write(0, Vec::new()).await.unwrap_err();
    assert_eq!(err.kind(), Kind::ReservedType);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn oversize_payload_is_rejected() {
    setup_logger();
    let name = unique_name("oversize");

    let max = peerlink::MIN_MAX_MESSAGE_SIZE;
    let server_config = ServerConfig {
        max_message_size: max,
        ..ServerConfig::default()
    };
    let mut server = Server::start(name.clone(), server_config).await.unwrap();
    let mut client = Client::start(name, ClientConfig::default()).await.unwrap();

    server_wait_connected(&mut server).await;
    client_wait_connected(&mut client).await;

    client.write(2, vec![0u8; max]).await.unwrap();

    let err = client.write(2, vec![0u8; max + 1]).await.unwrap_err();
    assert_eq!(err.kind(), Kind::TooLarge);
}

#[tokio::test(flavor = "multi_thread")]
async fn start_with_empty_name_is_invalid() {
    let err = Server::start("", ServerConfig::default()).await.unwrap_err();
    assert_eq!(err.kind(), Kind::InvalidName);

    let err = Client::start("", ClientConfig::default()).await.unwrap_err();
    assert_eq!(err.kind(), Kind::InvalidName);
}

#[tokio::test(flavor = "multi_thread")]
async fn client_times_out_with_no_server() {
    setup_logger();
    let name = unique_name("timeout");

    let config = ClientConfig {
        timeout_secs: 2,
        retry_interval_secs: 1,
        ..ClientConfig::default()
    };
    let mut client = Client::start(name, config).await.unwrap();

    let started = std::time::Instant::now();
    let mut saw_timeout = false;
    loop {
        match client.read().await {
            Ok(Message::StatusChange(Status::Timeout)) => {
                saw_timeout = true;
                continue;
            }
            Ok(Message::Error { kind, .. }) => {
                assert_eq!(kind, Kind::Timeout);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                assert_eq!(e.kind(), Kind::Closed);
                break;
            }
        }
    }
    assert!(saw_timeout, "expected a StatusChange(Timeout) before closing");
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn client_reconnects_after_server_restart() {
    setup_logger();
    let name = unique_name("reconnect");

    let mut server = Server::start(name.clone(), ServerConfig::default())
        .await
        .unwrap();
    let client_config = ClientConfig {
        retry_interval_secs: 1,
        ..ClientConfig::default()
    };
    let mut client = Client::start(name.clone(), client_config).await.unwrap();

    server_wait_connected(&mut server).await;
    client_wait_connected(&mut client).await;

    server.close();

    loop {
        match client.read().await.unwrap() {
            Message::StatusChange(Status::ReConnecting) => break,
            _ => continue,
        }
    }

    let mut second_server = Server::start(name, ServerConfig::default()).await.unwrap();

    loop {
        match client.read().await.unwrap() {
            Message::StatusChange(Status::Connected) => break,
            _ => continue,
        }
    }

    server_wait_connected(&mut second_server).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn server_reaccepts_after_client_drop() {
    setup_logger();
    let name = unique_name("reaccept");

    let mut server = Server::start(name.clone(), ServerConfig::default())
        .await
        .unwrap();
    let mut first_client = Client::start(name.clone(), ClientConfig::default())
        .await
        .unwrap();

    server_wait_connected(&mut server).await;
    client_wait_connected(&mut first_client).await;

    first_client.close();
    drop(first_client);

    loop {
        match server.read().await.unwrap() {
            Message::StatusChange(Status::Disconnected) => break,
            _ => continue,
        }
    }

    let mut second_client = Client::start(name, ClientConfig::default()).await.unwrap();

    loop {
        match server.read().await.unwrap() {
            Message::StatusChange(Status::Connected) => break,
            _ => continue,
        }
    }

    client_wait_connected(&mut second_client).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn encryption_policy_mismatch_is_reported_on_both_sides() {
    setup_logger();
    let name = unique_name("enc-policy");

    let server_config = ServerConfig {
        encryption: false,
        ..ServerConfig::default()
    };
    let mut server = Server::start(name.clone(), server_config).await.unwrap();
    let mut client = Client::start(name, ClientConfig::default()).await.unwrap();

    loop {
        match client.read().await.unwrap() {
            Message::Error { kind, .. } => {
                assert_eq!(kind, Kind::EncryptionPolicy);
                break;
            }
            _ => continue,
        }
    }

    loop {
        match server.read().await.unwrap() {
            Message::Error { kind, .. } => {
                assert_eq!(kind, Kind::EncryptionPolicy);
                break;
            }
            _ => continue,
        }
    }

    client.close();
    server.close();
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn protocol_version_mismatch_is_reported() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    setup_logger();
    let name = unique_name("version-mismatch");
    let path = std::env::temp_dir().join(format!("{name}.sock"));
    let _ = std::fs::remove_file(&path);

    let listener = UnixListener::bind(&path).expect("failed to bind fake server socket");

    // Stands in for `Server::start`, speaking just enough of Step 1 to offer a
    // protocol version the client won't accept, then reading back its reply byte.
    let fake_server = tokio::spawn(async move {
        let (mut stream, _addr) = listener.accept().await.expect("fake server accept failed");
        stream
            .write_all(&[99u8, 1u8])
            .await
            .expect("fake server write failed");
        let mut reply = [0u8; 1];
        stream
            .read_exact(&mut reply)
            .await
            .expect("fake server read failed");
        reply[0]
    });

    let client_config = ClientConfig {
        retry_interval_secs: 1,
        ..ClientConfig::default()
    };
    let mut client = Client::start(name, client_config).await.unwrap();

    loop {
        match client.read().await.unwrap() {
            Message::Error { kind, .. } => {
                assert_eq!(kind, Kind::VersionMismatch);
                break;
            }
            _ => continue,
        }
    }
    client.close();

    let reply_byte = fake_server.await.expect("fake server task panicked");
    assert_eq!(
        reply_byte, 1,
        "client must reply with the version-mismatch result byte"
    );

    let _ = std::fs::remove_file(&path);
}
