use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use msgpipe_crypto::SessionCipher;
use msgpipe_frame::{FrameConfig, FrameWriter};
use msgpipe_transport::IpcStream;
use tracing::debug;

use crate::error::Result;
use crate::message::{Inbound, Outbound};
use crate::status::{Status, StatusCell};

/// Lock that shrugs off poisoning: a panicked writer thread must not
/// wedge `close()`.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the user handle and the peer's tasks.
///
/// The write half and the control clone of the active connection live
/// here so that the reconnect/accept paths can swap them while the
/// long-lived writer thread keeps draining the outbound channel.
pub(crate) struct Shared {
    pub status: StatusCell,
    pub writer: Mutex<Option<FrameWriter<IpcStream>>>,
    pub control: Mutex<Option<IpcStream>>,
    pub max_msg_size: AtomicUsize,
}

impl Shared {
    pub fn new(max_msg_size: usize) -> Self {
        Self {
            status: StatusCell::new(Status::NotConnected),
            writer: Mutex::new(None),
            control: Mutex::new(None),
            max_msg_size: AtomicUsize::new(max_msg_size),
        }
    }

    /// Current maximum message size.
    pub fn max_msg_size(&self) -> usize {
        self.max_msg_size.load(Ordering::Acquire)
    }

    /// Set the status and emit the matching lifecycle notice before
    /// returning to the caller.
    pub fn transition(&self, tx: &Sender<Inbound>, status: Status) {
        self.status.set(status);
        let _ = tx.send(Inbound::Lifecycle(status));
    }

    /// Like [`transition`](Self::transition), but refuses to overwrite a
    /// close in progress. Returns whether the transition happened.
    pub fn transition_unless_closing(&self, tx: &Sender<Inbound>, status: Status) -> bool {
        if self
            .status
            .set_unless(status, &[Status::Closing, Status::Closed])
        {
            let _ = tx.send(Inbound::Lifecycle(status));
            true
        } else {
            false
        }
    }

    /// Finish the close walk. `close()` and the reader task can race to
    /// run the `Closing -> Closed` step; only the winner emits the
    /// lifecycle notice.
    pub fn transition_closed_once(&self, tx: &Sender<Inbound>) {
        if self.status.set_unless(Status::Closed, &[Status::Closed]) {
            let _ = tx.send(Inbound::Lifecycle(Status::Closed));
        }
    }

    /// Install a freshly handshaken connection: the write half and a
    /// control clone go into the shared slots, the reader half is
    /// returned for the reader task.
    pub fn install_connection(
        &self,
        stream: IpcStream,
        cipher: Option<Arc<SessionCipher>>,
    ) -> Result<IpcStream> {
        let reader_stream = stream.try_clone()?;
        let control = stream.try_clone()?;

        let mut writer = FrameWriter::with_config(
            stream,
            FrameConfig {
                max_payload_size: self.max_msg_size(),
            },
        );
        writer.set_cipher(cipher);

        *lock(&self.writer) = Some(writer);
        *lock(&self.control) = Some(control);
        Ok(reader_stream)
    }

    /// Shut down the active connection, if any. Returns whether one
    /// existed. Pending reads observe EOF, pending writes fail.
    pub fn shutdown_connection(&self) -> bool {
        match lock(&self.control).as_ref() {
            Some(stream) => {
                let _ = stream.shutdown();
                true
            }
            None => false,
        }
    }

    /// Drop the connection halves after the reader loop exits, so the
    /// writer thread drops frames instead of writing into a dead socket.
    pub fn teardown_connection(&self) {
        if let Some(stream) = lock(&self.control).take() {
            let _ = stream.shutdown();
        }
        *lock(&self.writer) = None;
    }
}

/// Drain the outbound channel into the current connection.
///
/// Runs until every sender is dropped. Encode/write/flush failures are
/// logged and the frame is dropped; the loop itself never dies on them.
pub(crate) fn writer_loop(
    shared: Arc<Shared>,
    outbound_rx: Receiver<Outbound>,
    pacing: Option<Duration>,
) {
    while let Ok(msg) = outbound_rx.recv() {
        let flushed = {
            let mut slot = lock(&shared.writer);
            match slot.as_mut() {
                None => {
                    debug!(msg_type = msg.msg_type, "no active connection, dropping frame");
                    false
                }
                Some(writer) => match writer.send(msg.msg_type, &msg.payload) {
                    Ok(()) => true,
                    Err(err) => {
                        debug!(error = %err, "error writing frame, dropping");
                        false
                    }
                },
            }
        };
        if flushed {
            if let Some(pause) = pacing {
                std::thread::sleep(pause);
            }
        }
    }
    debug!("writer loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn transition_emits_lifecycle_in_order() {
        let shared = Shared::new(1024);
        let (tx, rx) = unbounded();

        shared.transition(&tx, Status::Listening);
        shared.transition(&tx, Status::Connected);

        assert_eq!(shared.status.get(), Status::Connected);
        assert!(matches!(
            rx.try_recv().unwrap(),
            Inbound::Lifecycle(Status::Listening)
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            Inbound::Lifecycle(Status::Connected)
        ));
    }

    #[test]
    fn shutdown_without_connection_reports_none() {
        let shared = Shared::new(1024);
        assert!(!shared.shutdown_connection());
    }

    #[test]
    fn writer_loop_drops_frames_without_connection() {
        let shared = Arc::new(Shared::new(1024));
        let (tx, rx) = unbounded();

        let handle = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || writer_loop(shared, rx, None))
        };

        tx.send(Outbound {
            msg_type: 1,
            payload: bytes::Bytes::from_static(b"dropped"),
        })
        .unwrap();
        drop(tx);

        handle.join().unwrap();
    }

    #[test]
    fn install_connection_wires_writer_to_socket() {
        use msgpipe_frame::FrameReader;
        use std::os::unix::net::UnixStream;

        let shared = Shared::new(1024);
        let (left, right) = UnixStream::pair().unwrap();
        let local = IpcStream::from_unix_stream(left);

        let _reader_half = shared.install_connection(local, None).unwrap();

        lock(&shared.writer)
            .as_mut()
            .unwrap()
            .send(7, b"wired")
            .unwrap();

        let mut remote = FrameReader::new(IpcStream::from_unix_stream(right));
        let frame = remote.read_frame().unwrap();
        assert_eq!(frame.msg_type, 7);
        assert_eq!(frame.payload.as_ref(), b"wired");
    }
}
