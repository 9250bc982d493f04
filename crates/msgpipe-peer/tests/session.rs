//! End-to-end session tests: one server, one client, real sockets.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use msgpipe_peer::{Client, ClientConfig, Message, PeerError, Server, ServerConfig, Status};

fn base_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "msgpipe-e2e-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn server_config(base: &PathBuf) -> ServerConfig {
    ServerConfig {
        socket_base_path: base.clone(),
        write_pacing: None,
        ..ServerConfig::default()
    }
}

fn client_config(base: &PathBuf) -> ClientConfig {
    ClientConfig {
        socket_base_path: base.clone(),
        retry_timer: Duration::from_millis(20),
        ..ClientConfig::default()
    }
}

/// Drain lifecycle notices until the peer reports `Connected`.
fn pump_until_connected(recv: impl Fn() -> Result<Message, PeerError>) {
    loop {
        let msg = recv().expect("connection should come up");
        if msg.is_lifecycle() && msg.status == Some(Status::Connected) {
            return;
        }
    }
}

/// Next application message, skipping lifecycle notices.
fn next_application(recv: impl Fn() -> Result<Message, PeerError>) -> Message {
    loop {
        let msg = recv().expect("expected an application message");
        if !msg.is_lifecycle() {
            return msg;
        }
    }
}

fn wait_for_status(current: impl Fn() -> Status, want: Status) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if current() == want {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("status never reached {want:?}, still {:?}", current());
}

#[test]
fn plaintext_echo() {
    let base = base_dir("plain-echo");
    let server = Server::start(
        "echo",
        ServerConfig {
            encryption: false,
            ..server_config(&base)
        },
    )
    .unwrap();
    let client = Client::start(
        "echo",
        ClientConfig {
            encryption: false,
            ..client_config(&base)
        },
    )
    .unwrap();

    pump_until_connected(|| client.recv());
    pump_until_connected(|| server.recv());

    client.send(1, &b"hello"[..]).unwrap();
    let request = next_application(|| server.recv());
    assert_eq!(request.msg_type, 1);
    assert_eq!(request.payload.as_ref(), b"hello");

    server.send(1, &b"world"[..]).unwrap();
    let reply = next_application(|| client.recv());
    assert_eq!(reply.msg_type, 1);
    assert_eq!(reply.payload.as_ref(), b"world");

    let _ = std::fs::remove_dir_all(&base);
}

#[test]
fn encrypted_echo() {
    let base = base_dir("enc-echo");
    let server = Server::start("echo", server_config(&base)).unwrap();
    let client = Client::start("echo", client_config(&base)).unwrap();

    pump_until_connected(|| client.recv());
    pump_until_connected(|| server.recv());

    client.send(2, &b"hello"[..]).unwrap();
    let request = next_application(|| server.recv());
    assert_eq!(request.msg_type, 2);
    assert_eq!(request.payload.as_ref(), b"hello");

    server.send(2, &b"world"[..]).unwrap();
    let reply = next_application(|| client.recv());
    assert_eq!(reply.msg_type, 2);
    assert_eq!(reply.payload.as_ref(), b"world");

    let _ = std::fs::remove_dir_all(&base);
}

#[test]
fn empty_payload_is_delivered() {
    let base = base_dir("empty");
    let server = Server::start("empty", server_config(&base)).unwrap();
    let client = Client::start("empty", client_config(&base)).unwrap();

    pump_until_connected(|| client.recv());
    pump_until_connected(|| server.recv());

    client.send(7, &b""[..]).unwrap();
    let msg = next_application(|| server.recv());
    assert_eq!(msg.msg_type, 7);
    assert!(msg.payload.is_empty());

    let _ = std::fs::remove_dir_all(&base);
}

#[test]
fn version_mismatch_puts_server_in_error() {
    let base = base_dir("version");
    let server = Server::start("vers", server_config(&base)).unwrap();
    let path = base.join("vers.sock");

    // A stub client that rejects the announce with verdict 1.
    let mut stub = std::os::unix::net::UnixStream::connect(&path).unwrap();
    let mut announce = [0u8; 2];
    stub.read_exact(&mut announce).unwrap();
    assert_eq!(announce[0], msgpipe_peer::PROTOCOL_VERSION);
    stub.write_all(&[1u8]).unwrap();

    let first = server.recv().unwrap();
    assert_eq!(first.status, Some(Status::Listening));

    let second = server.recv().unwrap();
    assert_eq!(second.status, Some(Status::Error));

    let err = server.recv().unwrap_err();
    assert!(
        err.to_string().contains("different version number"),
        "got {err}"
    );
    assert_eq!(server.status(), Status::Error);

    let _ = std::fs::remove_dir_all(&base);
}

#[test]
fn encryption_mode_mismatch_fails_both_peers() {
    let base = base_dir("encmismatch");
    let server = Server::start(
        "mismatch",
        ServerConfig {
            encryption: false,
            ..server_config(&base)
        },
    )
    .unwrap();
    let client = Client::start("mismatch", client_config(&base)).unwrap();

    // Client: Connecting lifecycle, then the handshake failure.
    let connecting = client.recv().unwrap();
    assert_eq!(connecting.status, Some(Status::Connecting));
    let client_err = loop {
        match client.recv() {
            Ok(msg) => assert!(msg.is_lifecycle(), "unexpected message {msg:?}"),
            Err(err) => break err,
        }
    };
    assert!(
        client_err.to_string().contains("requires encryption"),
        "got {client_err}"
    );

    // Server: Listening, Error, then its terminal error.
    let listening = server.recv().unwrap();
    assert_eq!(listening.status, Some(Status::Listening));
    let error = server.recv().unwrap();
    assert_eq!(error.status, Some(Status::Error));
    let server_err = server.recv().unwrap_err();
    assert!(
        server_err.to_string().contains("enforcing encryption"),
        "got {server_err}"
    );

    let _ = std::fs::remove_dir_all(&base);
}

#[test]
fn client_reconnects_after_server_restart() {
    let base = base_dir("reconnect");
    let server = Server::start("reborn", server_config(&base)).unwrap();
    let client = Client::start("reborn", client_config(&base)).unwrap();

    pump_until_connected(|| client.recv());
    pump_until_connected(|| server.recv());

    server.close();
    drop(server);

    // The client observes the drop and starts dialing again.
    let mut saw_disconnected = false;
    loop {
        let msg = client.recv().expect("reconnect should not error");
        assert!(msg.is_lifecycle());
        match msg.status {
            Some(Status::Disconnected) => saw_disconnected = true,
            Some(Status::ReConnecting) => break,
            other => panic!("unexpected lifecycle {other:?} while disconnecting"),
        }
    }
    assert!(saw_disconnected, "client never surfaced Disconnected");

    // Bring the server back while the client is retrying.
    let server = Server::start("reborn", server_config(&base)).unwrap();
    pump_until_connected(|| server.recv());
    pump_until_connected(|| client.recv());

    // Traffic flows again over the new connection.
    client.send(3, &b"again"[..]).unwrap();
    let msg = next_application(|| server.recv());
    assert_eq!(msg.payload.as_ref(), b"again");

    let _ = std::fs::remove_dir_all(&base);
}

#[test]
fn client_adopts_server_max_size_and_rejects_oversize() {
    let base = base_dir("oversize");
    let server = Server::start(
        "limits",
        ServerConfig {
            max_msg_size: 1024,
            ..server_config(&base)
        },
    )
    .unwrap();
    let client = Client::start("limits", client_config(&base)).unwrap();

    pump_until_connected(|| client.recv());
    pump_until_connected(|| server.recv());

    // Over the server's limit: rejected before touching the wire.
    let err = client.send(1, vec![0u8; 2000]).unwrap_err();
    assert!(matches!(
        err,
        PeerError::Oversize {
            size: 2000,
            max: 1024
        }
    ));

    // Exactly at the limit: delivered.
    client.send(1, vec![0xABu8; 1024]).unwrap();
    let msg = next_application(|| server.recv());
    assert_eq!(msg.payload.len(), 1024);

    let _ = std::fs::remove_dir_all(&base);
}

#[test]
fn reserved_type_and_disconnected_writes_rejected() {
    let base = base_dir("rejects");
    let server = Server::start("rejects", server_config(&base)).unwrap();
    let client = Client::start("rejects", client_config(&base)).unwrap();

    pump_until_connected(|| client.recv());
    pump_until_connected(|| server.recv());

    assert!(matches!(
        client.send(0, &b"nope"[..]),
        Err(PeerError::ReservedType(0))
    ));
    assert!(matches!(
        server.send(0, &b"nope"[..]),
        Err(PeerError::ReservedType(0))
    ));

    // A client with nothing to dial is not connected; writes report the
    // status they were rejected in.
    let lonely = Client::start("nobody-home", client_config(&base)).unwrap();
    let err = lonely.send(1, &b"x"[..]).unwrap_err();
    assert!(matches!(err, PeerError::NotConnected(_)));
    lonely.close();

    let _ = std::fs::remove_dir_all(&base);
}

#[test]
fn close_walks_to_closed_and_fails_subsequent_reads() {
    let base = base_dir("close");
    let server = Server::start("closing", server_config(&base)).unwrap();
    let client = Client::start("closing", client_config(&base)).unwrap();

    pump_until_connected(|| client.recv());
    pump_until_connected(|| server.recv());

    client.close();

    let closing = client.recv().unwrap();
    assert_eq!(closing.status, Some(Status::Closing));
    let closed = client.recv().unwrap();
    assert_eq!(closed.status, Some(Status::Closed));
    let err = client.recv().unwrap_err();
    assert!(err.to_string().contains("client has closed"), "got {err}");

    assert_eq!(client.status(), Status::Closed);
    assert!(matches!(
        client.send(1, &b"x"[..]),
        Err(PeerError::NotConnected(Status::Closed))
    ));

    // The server sees the peer vanish and goes back to accepting.
    wait_for_status(|| server.status(), Status::Disconnected);

    server.close();
    wait_for_status(|| server.status(), Status::Closed);
    let mut saw_error = false;
    for _ in 0..8 {
        match server.recv() {
            Ok(msg) => assert!(msg.is_lifecycle()),
            Err(_) => {
                saw_error = true;
                break;
            }
        }
    }
    assert!(saw_error, "server recv should fail after close");

    let _ = std::fs::remove_dir_all(&base);
}

#[test]
fn dial_deadline_surfaces_timeout() {
    let base = base_dir("timeout");
    let client = Client::start(
        "absent",
        ClientConfig {
            timeout: Some(Duration::from_millis(80)),
            ..client_config(&base)
        },
    )
    .unwrap();

    let connecting = client.recv().unwrap();
    assert_eq!(connecting.status, Some(Status::Connecting));

    let timeout = client.recv().unwrap();
    assert_eq!(timeout.status, Some(Status::Timeout));

    let err = client.recv().unwrap_err();
    assert!(matches!(err, PeerError::ConnectTimeout));
    assert_eq!(client.status(), Status::Timeout);

    let _ = std::fs::remove_dir_all(&base);
}

#[test]
fn invalid_endpoint_names_fail_start() {
    let base = base_dir("names");
    for name in ["", "a/b", r"a\b", "a b", "a;b"] {
        assert!(
            Server::start(name, server_config(&base)).is_err(),
            "server accepted {name:?}"
        );
        assert!(
            Client::start(name, client_config(&base)).is_err(),
            "client accepted {name:?}"
        );
    }
    let _ = std::fs::remove_dir_all(&base);
}

#[test]
fn second_server_replaces_stale_endpoint() {
    let base = base_dir("stale");
    {
        let server = Server::start("stale", server_config(&base)).unwrap();
        assert_eq!(server.recv().unwrap().status, Some(Status::Listening));
        server.close();
    }
    // The old socket file lingers; the next bind reclaims the path.
    let server = Server::start("stale", server_config(&base)).unwrap();
    assert_eq!(server.recv().unwrap().status, Some(Status::Listening));

    let _ = std::fs::remove_dir_all(&base);
}
