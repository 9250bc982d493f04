use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

/// `sockaddr_un.sun_path` capacity: 108 bytes on Linux, 104 on macOS
/// and the BSDs.
const SUN_PATH_MAX: usize = if cfg!(target_os = "linux") { 108 } else { 104 };

/// Options applied when binding a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct BindOptions {
    /// Clear the process umask around the bind so the socket file is
    /// created accessible to every local user, then restore it. Off by
    /// default: the socket inherits the ambient umask.
    pub unmask_permissions: bool,
}

/// A listening Unix domain socket endpoint.
///
/// The path is cleared of any stale socket a dead server left behind
/// before listening; a path occupied by anything other than a socket is
/// never touched. The socket file itself is left for the next bind to
/// reclaim.
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixDomainSocket {
    /// Bind and listen at `path` with default options.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_options(path, BindOptions::default())
    }

    /// Bind and listen at `path`.
    pub fn bind_with_options(path: impl AsRef<Path>, options: BindOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let len = path.as_os_str().len();
        if len >= SUN_PATH_MAX {
            return Err(TransportError::PathTooLong {
                path,
                len,
                max: SUN_PATH_MAX,
            });
        }

        clear_stale_socket(&path)?;

        let listener = if options.unmask_permissions {
            bind_unmasked(&path)
        } else {
            UnixListener::bind(&path)
        }
        .map_err(|source| TransportError::Bind {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), "endpoint listening");
        Ok(Self { listener, path })
    }

    /// Block until a client connects.
    pub fn accept(&self) -> Result<IpcStream> {
        let (raw, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = %self.path.display(), "client connection accepted");
        Ok(IpcStream::from_unix_stream(raw))
    }

    /// Dial the endpoint listening at `path` (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<IpcStream> {
        let path = path.as_ref();
        let raw = UnixStream::connect(path).map_err(|source| TransportError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "endpoint dialed");
        Ok(IpcStream::from_unix_stream(raw))
    }

    /// Interrupt the listener: a thread parked in
    /// [`accept`](Self::accept) returns with an error and further
    /// accepts fail. This is how `close()` stops the accept loop.
    pub fn shutdown(&self) {
        // SAFETY: the fd stays owned by `self.listener` until drop.
        unsafe {
            libc::shutdown(self.listener.as_raw_fd(), libc::SHUT_RDWR);
        }
    }

    /// The filesystem path this endpoint is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Unlink a leftover socket file so the bind can reuse its path.
/// Anything that is not a socket stays put and fails the bind instead.
fn clear_stale_socket(path: &Path) -> Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(TransportError::Bind {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if !metadata.file_type().is_socket() {
        return Err(TransportError::Bind {
            path: path.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                "path occupied by a non-socket file",
            ),
        });
    }

    debug!(path = %path.display(), "clearing stale socket left by a previous server");
    std::fs::remove_file(path).map_err(|source| TransportError::Bind {
        path: path.to_path_buf(),
        source,
    })
}

/// Bind with the process umask cleared, then put it back.
fn bind_unmasked(path: &Path) -> io::Result<UnixListener> {
    // SAFETY: umask(2) only swaps the process file-creation mask.
    let saved = unsafe { libc::umask(0) };
    let bound = UnixListener::bind(path);
    unsafe { libc::umask(saved) };
    bound
}
