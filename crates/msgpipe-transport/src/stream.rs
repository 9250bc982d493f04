use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;

use crate::error::Result;

/// One end of an accepted or dialed connection.
///
/// A plain blocking duplex byte stream that reports peer close as EOF,
/// which is everything the session layer above needs. Backed by a Unix
/// domain socket; a Windows named-pipe handle would slot in behind the
/// same surface.
#[derive(Debug)]
pub struct IpcStream {
    raw: UnixStream,
}

impl IpcStream {
    /// Wrap an already-connected Unix stream, such as one half of
    /// `UnixStream::pair`.
    pub fn from_unix_stream(raw: UnixStream) -> Self {
        Self { raw }
    }

    /// Put the connection on a second file descriptor. Both handles
    /// refer to the same underlying socket.
    pub fn try_clone(&self) -> Result<Self> {
        let raw = self.raw.try_clone()?;
        Ok(Self { raw })
    }

    /// Shut down both directions of the connection.
    ///
    /// Takes effect across every clone: blocked reads return EOF and
    /// blocked writes fail, which is how `close()` cancels in-flight
    /// I/O on the reader and writer tasks.
    pub fn shutdown(&self) -> Result<()> {
        self.raw.shutdown(Shutdown::Both)?;
        Ok(())
    }
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.raw.read(buf)
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.raw.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.raw.flush()
    }
}
