use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use msgpipe_crypto::SessionCipher;
use msgpipe_frame::{FrameConfig, FrameError, FrameReader};
use msgpipe_transport::{
    endpoint_path, validate_endpoint_name, IpcStream, TransportError, UnixDomainSocket,
};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{PeerError, Result};
use crate::handshake::client_handshake;
use crate::message::{Inbound, Message, Outbound, CONTROL_TYPE};
use crate::runtime::{lock, writer_loop, Shared};
use crate::status::Status;

const CLOSED_BY_CLIENT: &str = "client has closed the connection";

/// The client side of a msgpipe channel.
///
/// Dials the server's endpoint with retries, reconnects after the
/// server goes away, and adopts the server's negotiated limits.
/// Dropping the client closes it.
pub struct Client {
    name: String,
    shared: Arc<Shared>,
    inbound_rx: Receiver<Inbound>,
    inbound_tx: Mutex<Option<Sender<Inbound>>>,
    outbound_tx: Mutex<Option<Sender<Outbound>>>,
}

impl Client {
    /// Validate the endpoint name and start the connector and writer
    /// tasks. Dialing happens in the background; progress arrives as
    /// lifecycle messages through [`recv`](Self::recv).
    pub fn start(name: &str, config: ClientConfig) -> Result<Self> {
        validate_endpoint_name(name)?;
        let conf = config.normalized();

        let (inbound_tx, inbound_rx) = unbounded();
        let (outbound_tx, outbound_rx) = unbounded();
        let shared = Arc::new(Shared::new(conf.max_msg_size));

        {
            let shared = Arc::clone(&shared);
            thread::spawn(move || writer_loop(shared, outbound_rx, None));
        }

        {
            let shared = Arc::clone(&shared);
            let tx = inbound_tx.clone();
            let path = endpoint_path(&conf.socket_base_path, name);
            thread::spawn(move || connector(shared, tx, conf, path));
        }

        Ok(Self {
            name: name.to_string(),
            shared,
            inbound_rx,
            inbound_tx: Mutex::new(Some(inbound_tx)),
            outbound_tx: Mutex::new(Some(outbound_tx)),
        })
    }

    /// Receive the next message, blocking until one is available.
    ///
    /// A terminal error is returned as `Err` and also shuts the
    /// outbound channel.
    pub fn recv(&self) -> Result<Message> {
        match self.inbound_rx.recv() {
            Ok(Inbound::Message(msg)) => Ok(msg),
            Ok(Inbound::Lifecycle(status)) => Ok(Message::lifecycle(status)),
            Ok(Inbound::Terminated(err)) => {
                lock(&self.outbound_tx).take();
                Err(err)
            }
            Err(_) => Err(PeerError::ChannelClosed),
        }
    }

    /// Queue a message for the server.
    ///
    /// Rejects the reserved type `0`, rejects unless the status is
    /// `Connected`, and rejects payloads over the maximum message size
    /// adopted from the server at handshake.
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

    /// The endpoint name this client was started with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Close the client: drop the connection (or abort an in-flight
    /// dial) and emit the closing lifecycle. Idempotent.
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

        let had_conn = self.shared.shutdown_connection();
        let dialing = matches!(status, Status::Connecting | Status::ReConnecting);

        if let Some(tx) = tx {
            if !had_conn && !dialing {
                // No reader task will run the Closing -> Closed step.
                self.shared.transition_closed_once(&tx);
            }
        }
        // While dialing, the dial loop observes Closing and finishes the
        // transition itself.

        lock(&self.outbound_tx).take();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connection halves handed from the dial loop to the reader loop.
struct ReaderParts {
    stream: IpcStream,
    cipher: Option<Arc<SessionCipher>>,
}

fn connector(shared: Arc<Shared>, tx: Sender<Inbound>, conf: ClientConfig, path: PathBuf) {
    // close() may land before this thread gets scheduled.
    if !shared
        .status
        .set_unless(Status::Connecting, &[Status::Closing, Status::Closed])
    {
        return;
    }
    let _ = tx.send(Inbound::Lifecycle(Status::Connecting));

    let parts = match dial(&shared, &tx, &conf, &path) {
        Ok(parts) => parts,
        Err(PeerError::ConnectTimeout) => {
            shared.transition(&tx, Status::Timeout);
            let _ = tx.send(Inbound::Terminated(PeerError::ConnectTimeout));
            return;
        }
        Err(PeerError::Closed(_)) => {
            // close() aborted the dial; finish its walk.
            shared.transition_closed_once(&tx);
            return;
        }
        Err(err) => {
            let _ = tx.send(Inbound::Terminated(err));
            return;
        }
    };

    if !shared.transition_unless_closing(&tx, Status::Connected) {
        shared.teardown_connection();
        shared.transition_closed_once(&tx);
        return;
    }
    read_with_reconnect(parts, shared, tx, conf, path);
}

fn read_with_reconnect(
    mut parts: ReaderParts,
    shared: Arc<Shared>,
    tx: Sender<Inbound>,
    conf: ClientConfig,
    path: PathBuf,
) {
    'session: loop {
        let mut reader = FrameReader::with_config(
            parts.stream,
            FrameConfig {
                max_payload_size: shared.max_msg_size(),
            },
        );
        reader.set_cipher(parts.cipher.clone());

        loop {
            match reader.read_frame() {
                Ok(frame) if frame.msg_type == CONTROL_TYPE => {
                    debug!("consumed reserved control frame");
                }
                Ok(frame) => {
                    let msg = Message::application(frame.msg_type, frame.payload);
                    if tx.send(Inbound::Message(msg)).is_err() {
                        break 'session;
                    }
                }
                Err(FrameError::ConnectionClosed) | Err(FrameError::Io(_)) => {
                    if shared.status.get() == Status::Closing {
                        shared.transition_closed_once(&tx);
                        let _ = tx.send(Inbound::Terminated(PeerError::Closed(
                            CLOSED_BY_CLIENT.to_string(),
                        )));
                        break 'session;
                    }

                    // The server went away: reconnect with a fresh
                    // handshake. The writer keeps draining meanwhile,
                    // dropping frames until a connection is back.
                    shared.teardown_connection();
                    if !shared.transition_unless_closing(&tx, Status::Disconnected) {
                        // close() landed between the status check and here.
                        shared.transition_closed_once(&tx);
                        let _ = tx.send(Inbound::Terminated(PeerError::Closed(
                            CLOSED_BY_CLIENT.to_string(),
                        )));
                        break 'session;
                    }
                    if !shared.transition_unless_closing(&tx, Status::ReConnecting) {
                        shared.transition_closed_once(&tx);
                        break 'session;
                    }

                    match dial(&shared, &tx, &conf, &path) {
                        Ok(new_parts) => {
                            if !shared.transition_unless_closing(&tx, Status::Connected) {
                                shared.teardown_connection();
                                shared.transition_closed_once(&tx);
                                break 'session;
                            }
                            parts = new_parts;
                            continue 'session;
                        }
                        Err(PeerError::ConnectTimeout) => {
                            shared.transition(&tx, Status::Timeout);
                            let _ = tx.send(Inbound::Terminated(PeerError::ConnectTimeout));
                            break 'session;
                        }
                        Err(PeerError::Closed(_)) => {
                            shared.transition_closed_once(&tx);
                            break 'session;
                        }
                        Err(err) => {
                            let _ = tx.send(Inbound::Terminated(err));
                            break 'session;
                        }
                    }
                }
                Err(err) => {
                    shared.transition(&tx, Status::Error);
                    let _ = tx.send(Inbound::Terminated(err.into()));
                    break 'session;
                }
            }
        }
    }

    shared.teardown_connection();
}

/// Dial the endpoint until it answers, the deadline passes, or the
/// client is closed. On success the handshake has completed, the
/// negotiated limits are installed, and the reader halves are returned.
fn dial(
    shared: &Arc<Shared>,
    tx: &Sender<Inbound>,
    conf: &ClientConfig,
    path: &Path,
) -> Result<ReaderParts> {
    let started = Instant::now();

    loop {
        let status = shared.status.get();
        if status == Status::Closing || status == Status::Closed {
            return Err(PeerError::Closed(CLOSED_BY_CLIENT.to_string()));
        }
        if let Some(timeout) = conf.timeout {
            if started.elapsed() > timeout {
                return Err(PeerError::ConnectTimeout);
            }
        }

        match UnixDomainSocket::connect(path) {
            Err(TransportError::Connect { source, .. })
                if matches!(
                    source.kind(),
                    ErrorKind::NotFound | ErrorKind::ConnectionRefused
                ) =>
            {
                // Server not up yet; quiet retry.
            }
            Err(err) => {
                // Unexpected dial failure: surface it, keep retrying.
                debug!(error = %err, "dial attempt failed");
                let _ = tx.send(Inbound::Terminated(err.into()));
            }
            Ok(mut stream) => {
                let negotiated = client_handshake(&mut stream, conf.encryption)?;
                shared
                    .max_msg_size
                    .store(negotiated.max_msg_size, std::sync::atomic::Ordering::Release);
                let cipher = negotiated.cipher.map(Arc::new);
                let reader_stream = shared.install_connection(stream, cipher.clone())?;

                // close() may have raced the handshake; its shutdown can
                // miss a connection installed after the check.
                let status = shared.status.get();
                if status == Status::Closing || status == Status::Closed {
                    shared.teardown_connection();
                    return Err(PeerError::Closed(CLOSED_BY_CLIENT.to_string()));
                }

                return Ok(ReaderParts {
                    stream: reader_stream,
                    cipher,
                });
            }
        }

        thread::sleep(conf.retry_timer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_base(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "msgpipe-client-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn test_config(base: &Path) -> ClientConfig {
        ClientConfig {
            socket_base_path: base.to_path_buf(),
            retry_timer: Duration::from_millis(10),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn close_while_dialing_walks_to_closed() {
        let base = test_base("dialclose");
        let client = Client::start("nobody", test_config(&base)).unwrap();

        assert_eq!(client.recv().unwrap().status, Some(Status::Connecting));
        client.close();

        assert_eq!(client.recv().unwrap().status, Some(Status::Closing));
        assert_eq!(client.recv().unwrap().status, Some(Status::Closed));
        assert_eq!(client.status(), Status::Closed);

        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn send_rejections_while_not_connected() {
        let base = test_base("sendrej");
        let client = Client::start("nobody", test_config(&base)).unwrap();

        assert!(matches!(
            client.send(0, &b""[..]),
            Err(PeerError::ReservedType(0))
        ));
        assert!(matches!(
            client.send(1, &b"x"[..]),
            Err(PeerError::NotConnected(_))
        ));

        client.close();
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn invalid_name_fails_synchronously() {
        let base = test_base("names");
        assert!(Client::start("a/b", test_config(&base)).is_err());
        let _ = std::fs::remove_dir_all(&base);
    }
}
