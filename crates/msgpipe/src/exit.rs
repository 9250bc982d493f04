use std::fmt;

use msgpipe_peer::PeerError;
use msgpipe_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    let code = match &err {
        PeerError::Transport(TransportError::InvalidName { .. }) => USAGE,
        PeerError::ReservedType(_) | PeerError::Oversize { .. } => USAGE,
        PeerError::ConnectTimeout => TIMEOUT,
        PeerError::Transport(_) | PeerError::Frame(_) => FAILURE,
        PeerError::NotConnected(_) | PeerError::Closed(_) | PeerError::ChannelClosed => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_maps_to_timeout_code() {
        let err = peer_error("connect", PeerError::ConnectTimeout);
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.contains("timed out"));
    }

    #[test]
    fn usage_errors_map_to_usage_code() {
        let err = peer_error("send", PeerError::ReservedType(0));
        assert_eq!(err.code, USAGE);
    }
}
