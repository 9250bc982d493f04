use std::sync::{Arc, Mutex};
use std::thread;

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use msgpipe_crypto::SessionCipher;
use msgpipe_frame::{FrameConfig, FrameError, FrameReader};
use msgpipe_transport::{
    endpoint_path, validate_endpoint_name, BindOptions, IpcStream, UnixDomainSocket,
};
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::{PeerError, Result};
use crate::handshake::server_handshake;
use crate::message::{Inbound, Message, Outbound, CONTROL_TYPE};
use crate::runtime::{lock, writer_loop, Shared};
use crate::status::Status;

const CLOSED_BY_SERVER: &str = "server has closed the connection";

/// The server side of a msgpipe channel.
///
/// Listens on a named local endpoint, accepts one client at a time, and
/// re-accepts after a disconnect. Dropping the server closes it.
pub struct Server {
    name: String,
    shared: Arc<Shared>,
    endpoint: Arc<UnixDomainSocket>,
    inbound_rx: Receiver<Inbound>,
    inbound_tx: Mutex<Option<Sender<Inbound>>>,
    outbound_tx: Mutex<Option<Sender<Outbound>>>,
}

impl Server {
    /// Validate the endpoint name, bind the endpoint, and start the
    /// accept and writer tasks.
    ///
    /// `name` is the endpoint name the client must use. Binding errors
    /// and name-validation errors are returned synchronously; everything
    /// after that arrives through [`recv`](Self::recv).
    pub fn start(name: &str, config: ServerConfig) -> Result<Self> {
        validate_endpoint_name(name)?;
        let conf = config.normalized();

        let path = endpoint_path(&conf.socket_base_path, name);
        let endpoint = Arc::new(UnixDomainSocket::bind_with_options(
            &path,
            BindOptions {
                unmask_permissions: conf.unmask_permissions,
            },
        )?);

        let (inbound_tx, inbound_rx) = unbounded();
        let (outbound_tx, outbound_rx) = unbounded();
        let shared = Arc::new(Shared::new(conf.max_msg_size));

        shared.transition(&inbound_tx, Status::Listening);

        {
            let shared = Arc::clone(&shared);
            let pacing = conf.write_pacing;
            thread::spawn(move || writer_loop(shared, outbound_rx, pacing));
        }

        {
            let shared = Arc::clone(&shared);
            let endpoint = Arc::clone(&endpoint);
            let tx = inbound_tx.clone();
            thread::spawn(move || accept_loop(endpoint, shared, tx, conf));
        }

        Ok(Self {
            name: name.to_string(),
            shared,
            endpoint,
            inbound_rx,
            inbound_tx: Mutex::new(Some(inbound_tx)),
            outbound_tx: Mutex::new(Some(outbound_tx)),
        })
    }

    /// Receive the next message, blocking until one is available.
    ///
    /// Lifecycle notices are interleaved with application messages in
    /// emission order. A terminal error is returned as `Err`; after
    /// that, subsequent calls fail with a closed-channel error once the
    /// queue drains.
    pub fn recv(&self) -> Result<Message> {
        match self.inbound_rx.recv() {
            Ok(Inbound::Message(msg)) => Ok(msg),
            Ok(Inbound::Lifecycle(status)) => Ok(Message::lifecycle(status)),
            Ok(Inbound::Terminated(err)) => Err(err),
            Err(_) => Err(PeerError::ChannelClosed),
        }
    }

    /// Queue a message for the connected client.
    ///
    /// Rejects the reserved type `0`, rejects unless the status is
    /// `Connected`, and rejects payloads over the maximum message size.
    pub fn send(&self, msg_type: i32, payload: impl Into<Bytes>) -> Result<()> {
        if msg_type == CONTROL_TYPE {
            return Err(PeerError::ReservedType(msg_type));
        }
        let status = self.shared.status.get();
        if status != Status::Connected {
            return Err(PeerError::NotConnected(status));
        }
        let payload = payload.into();
        let max = self.shared.max_msg_size();
        if payload.len() > max {
            return Err(PeerError::Oversize {
                size: payload.len(),
                max,
            });
        }

        match lock(&self.outbound_tx).as_ref() {
            Some(tx) => tx
                .send(Outbound { msg_type, payload })
                .map_err(|_| PeerError::ChannelClosed),
            None => Err(PeerError::ChannelClosed),
        }
    }

    /// Snapshot of the current connection status.
    pub fn status(&self) -> Status {
        self.shared.status.get()
    }

    /// The endpoint name this server was started with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Close the server: stop listening, drop the connection, and emit
    /// the closing lifecycle plus a terminal error. Idempotent.
    pub fn close(&self) {
        let status = self.shared.status.get();
        if status == Status::Closing || status == Status::Closed {
            return;
        }

        let tx = lock(&self.inbound_tx).take();
        match &tx {
            Some(tx) => self.shared.transition(tx, Status::Closing),
            None => self.shared.status.set(Status::Closing),
        }

        self.endpoint.shutdown();
        let had_conn = self.shared.shutdown_connection();

        if let Some(tx) = tx {
            if !had_conn {
                // No reader task will run the Closing -> Closed step.
                self.shared.transition_closed_once(&tx);
            }
            let _ = tx.send(Inbound::Terminated(PeerError::Closed(
                CLOSED_BY_SERVER.to_string(),
            )));
        }

        lock(&self.outbound_tx).take();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.close();
    }
}

fn accept_loop(
    endpoint: Arc<UnixDomainSocket>,
    shared: Arc<Shared>,
    tx: Sender<Inbound>,
    conf: ServerConfig,
) {
    loop {
        let mut stream = match endpoint.accept() {
            Ok(stream) => stream,
            Err(err) => {
                debug!(error = %err, "accept loop exiting");
                break;
            }
        };

        let status = shared.status.get();
        if status != Status::Listening && status != Status::Disconnected {
            debug!(%status, "dropping connection accepted while not listening");
            continue;
        }

        match server_handshake(&mut stream, conf.encryption, conf.max_msg_size) {
            Err(err) => {
                shared.transition(&tx, Status::Error);
                let _ = tx.send(Inbound::Terminated(err));
                let _ = stream.shutdown();
                endpoint.shutdown();
                break;
            }
            Ok(cipher) => {
                let cipher = cipher.map(Arc::new);
                let reader_stream = match shared.install_connection(stream, cipher.clone()) {
                    Ok(reader_stream) => reader_stream,
                    Err(err) => {
                        shared.transition(&tx, Status::Error);
                        let _ = tx.send(Inbound::Terminated(err));
                        endpoint.shutdown();
                        break;
                    }
                };

                // Connected must be visible (and its notice queued)
                // before the reader can deliver the first message.
                if !shared.transition_unless_closing(&tx, Status::Connected) {
                    // close() raced the handshake; finish its walk.
                    shared.teardown_connection();
                    shared.transition_closed_once(&tx);
                    break;
                }

                {
                    let shared = Arc::clone(&shared);
                    let tx = tx.clone();
                    thread::spawn(move || reader_loop(reader_stream, cipher, shared, tx));
                }
            }
        }
    }
}

fn reader_loop(
    stream: IpcStream,
    cipher: Option<Arc<SessionCipher>>,
    shared: Arc<Shared>,
    tx: Sender<Inbound>,
) {
    let mut reader = FrameReader::with_config(
        stream,
        FrameConfig {
            max_payload_size: shared.max_msg_size(),
        },
    );
    reader.set_cipher(cipher);

    loop {
        match reader.read_frame() {
            Ok(frame) if frame.msg_type == CONTROL_TYPE => {
                debug!("consumed reserved control frame");
            }
            Ok(frame) => {
                let msg = Message::application(frame.msg_type, frame.payload);
                if tx.send(Inbound::Message(msg)).is_err() {
                    shared.teardown_connection();
                    break;
                }
            }
            Err(FrameError::ConnectionClosed) | Err(FrameError::Io(_)) => {
                // Teardown first: the accept loop re-accepts as soon as
                // Disconnected is visible, and must not find the dead
                // connection still installed.
                shared.teardown_connection();
                if shared.status.get() == Status::Closing {
                    shared.transition_closed_once(&tx);
                    let _ = tx.send(Inbound::Terminated(PeerError::Closed(
                        CLOSED_BY_SERVER.to_string(),
                    )));
                } else if !shared.transition_unless_closing(&tx, Status::Disconnected) {
                    // close() landed between the status check and here.
                    shared.transition_closed_once(&tx);
                    let _ = tx.send(Inbound::Terminated(PeerError::Closed(
                        CLOSED_BY_SERVER.to_string(),
                    )));
                }
                break;
            }
            Err(err) => {
                // Decrypt failure or malformed frame: the stream can no
                // longer be trusted to be in sync.
                shared.teardown_connection();
                shared.transition(&tx, Status::Error);
                let _ = tx.send(Inbound::Terminated(err.into()));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_base(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "msgpipe-server-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn test_config(base: &std::path::Path) -> ServerConfig {
        ServerConfig {
            socket_base_path: base.to_path_buf(),
            write_pacing: None,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn start_reports_listening_and_close_walks_to_closed() {
        let base = test_base("lifecycle");
        let server = Server::start("unit", test_config(&base)).unwrap();

        assert_eq!(server.recv().unwrap().status, Some(Status::Listening));
        assert_eq!(server.status(), Status::Listening);

        server.close();
        assert_eq!(server.recv().unwrap().status, Some(Status::Closing));
        assert_eq!(server.recv().unwrap().status, Some(Status::Closed));
        assert!(server.recv().is_err());
        assert_eq!(server.status(), Status::Closed);

        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn close_is_idempotent() {
        let base = test_base("idem");
        let server = Server::start("unit", test_config(&base)).unwrap();
        server.close();
        server.close();
        assert_eq!(server.status(), Status::Closed);
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn send_rejections_before_any_connection() {
        let base = test_base("sendrej");
        let server = Server::start("unit", test_config(&base)).unwrap();

        assert!(matches!(
            server.send(0, &b""[..]),
            Err(PeerError::ReservedType(0))
        ));
        assert!(matches!(
            server.send(1, &b"x"[..]),
            Err(PeerError::NotConnected(Status::Listening))
        ));

        server.close();
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn invalid_name_fails_synchronously() {
        let base = test_base("names");
        let result = Server::start("bad name", test_config(&base));
        assert!(result.is_err());
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn socket_file_appears_under_base_path() {
        let base = test_base("path");
        let server = Server::start("unit", test_config(&base)).unwrap();
        assert!(base.join("unit.sock").exists());
        server.close();
        let _ = std::fs::remove_dir_all(&base);
    }
}
