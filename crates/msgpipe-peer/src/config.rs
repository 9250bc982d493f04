use std::path::PathBuf;
use std::time::Duration;

use msgpipe_frame::{DEFAULT_MAX_PAYLOAD, MIN_MAX_PAYLOAD};
use msgpipe_transport::DEFAULT_BASE_PATH;

/// Default client retry interval between dial attempts.
pub const DEFAULT_RETRY_TIMER: Duration = Duration::from_millis(200);

/// Default pause after each flushed server frame.
pub const DEFAULT_WRITE_PACING: Duration = Duration::from_millis(2);

/// Configuration for [`Server::start`](crate::Server::start).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory the endpoint is created under.
    pub socket_base_path: PathBuf,
    /// Reserved for an accept deadline; currently not enforced.
    pub timeout: Option<Duration>,
    /// Maximum payload size in bytes, announced to the client at
    /// handshake. Values below 1024 fall back to the default.
    pub max_msg_size: usize,
    /// Negotiate session encryption with connecting clients.
    pub encryption: bool,
    /// Clear the process umask around the bind so any local user can
    /// connect to the socket.
    pub unmask_permissions: bool,
    /// Pause inserted after each flushed frame. `None` disables pacing.
    pub write_pacing: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_base_path: PathBuf::from(DEFAULT_BASE_PATH),
            timeout: None,
            max_msg_size: DEFAULT_MAX_PAYLOAD,
            encryption: true,
            unmask_permissions: false,
            write_pacing: Some(DEFAULT_WRITE_PACING),
        }
    }
}

impl ServerConfig {
    /// Floor out-of-range values back to their defaults.
    pub(crate) fn normalized(mut self) -> Self {
        if self.max_msg_size < MIN_MAX_PAYLOAD {
            self.max_msg_size = DEFAULT_MAX_PAYLOAD;
        }
        if self.socket_base_path.as_os_str().is_empty() {
            self.socket_base_path = PathBuf::from(DEFAULT_BASE_PATH);
        }
        self
    }
}

/// Configuration for [`Client::start`](crate::Client::start).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Directory the endpoint is looked up under.
    pub socket_base_path: PathBuf,
    /// Deadline for the dial/reconnect loop. `None` retries forever.
    pub timeout: Option<Duration>,
    /// Interval between dial attempts.
    pub retry_timer: Duration,
    /// Maximum payload size in bytes; replaced by the server's announced
    /// value once the handshake completes. Values below 1024 fall back
    /// to the default.
    pub max_msg_size: usize,
    /// Require session encryption. When the server announces plaintext
    /// and this is set, the handshake fails; when unset, the client
    /// adopts whatever the server announces.
    pub encryption: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_base_path: PathBuf::from(DEFAULT_BASE_PATH),
            timeout: None,
            retry_timer: DEFAULT_RETRY_TIMER,
            max_msg_size: DEFAULT_MAX_PAYLOAD,
            encryption: true,
        }
    }
}

impl ClientConfig {
    /// Floor out-of-range values back to their defaults.
    pub(crate) fn normalized(mut self) -> Self {
        if self.retry_timer.is_zero() {
            self.retry_timer = DEFAULT_RETRY_TIMER;
        }
        if self.max_msg_size < MIN_MAX_PAYLOAD {
            self.max_msg_size = DEFAULT_MAX_PAYLOAD;
        }
        if self.socket_base_path.as_os_str().is_empty() {
            self.socket_base_path = PathBuf::from(DEFAULT_BASE_PATH);
        }
        self
    }
}
