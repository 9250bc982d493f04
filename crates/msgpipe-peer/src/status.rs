use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Connection status of a peer.
///
/// Transitions are driven by the accept/reader/reconnect tasks and by
/// user `close()` calls; every externally observable transition is
/// mirrored by a lifecycle message on the inbound channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    NotConnected = 0,
    Listening = 1,
    Connecting = 2,
    Connected = 3,
    ReConnecting = 4,
    Closed = 5,
    Closing = 6,
    Error = 7,
    Timeout = 8,
    Disconnected = 9,
}

impl Status {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Status::Listening,
            2 => Status::Connecting,
            3 => Status::Connected,
            4 => Status::ReConnecting,
            5 => Status::Closed,
            6 => Status::Closing,
            7 => Status::Error,
            8 => Status::Timeout,
            9 => Status::Disconnected,
            _ => Status::NotConnected,
        }
    }

    /// True for states the peer never leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Closed | Status::Timeout | Status::Error)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::NotConnected => "Not Connected",
            Status::Listening => "Listening",
            Status::Connecting => "Connecting",
            Status::Connected => "Connected",
            Status::ReConnecting => "Reconnecting",
            Status::Closed => "Closed",
            Status::Closing => "Closing",
            Status::Error => "Error",
            Status::Timeout => "Timeout",
            Status::Disconnected => "Disconnected",
        };
        f.write_str(name)
    }
}

/// Lock-free status cell shared between the user handle and the peer's
/// tasks. The reader loop uses it to discriminate a user-initiated close
/// from a peer disconnect, so it must always be current.
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new(status: Status) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub fn get(&self) -> Status {
        Status::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, status: Status) {
        self.0.store(status as u8, Ordering::Release);
    }

    /// Set the status unless the cell currently holds one of `unless`.
    /// Returns whether the store happened.
    pub fn set_unless(&self, status: Status, unless: &[Status]) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if unless.iter().any(|s| *s as u8 == current) {
                return false;
            }
            match self.0.compare_exchange_weak(
                current,
                status as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_lifecycle_strings() {
        assert_eq!(Status::NotConnected.to_string(), "Not Connected");
        assert_eq!(Status::ReConnecting.to_string(), "Reconnecting");
        assert_eq!(Status::Connected.to_string(), "Connected");
    }

    #[test]
    fn cell_roundtrips_every_state() {
        let cell = StatusCell::new(Status::NotConnected);
        for status in [
            Status::Listening,
            Status::Connecting,
            Status::Connected,
            Status::ReConnecting,
            Status::Closed,
            Status::Closing,
            Status::Error,
            Status::Timeout,
            Status::Disconnected,
        ] {
            cell.set(status);
            assert_eq!(cell.get(), status);
        }
    }

    #[test]
    fn set_unless_respects_guard_states() {
        let cell = StatusCell::new(Status::Closing);
        assert!(!cell.set_unless(Status::Connecting, &[Status::Closing, Status::Closed]));
        assert_eq!(cell.get(), Status::Closing);

        cell.set(Status::NotConnected);
        assert!(cell.set_unless(Status::Connecting, &[Status::Closing, Status::Closed]));
        assert_eq!(cell.get(), Status::Connecting);
    }

    #[test]
    fn terminal_states() {
        assert!(Status::Closed.is_terminal());
        assert!(Status::Timeout.is_terminal());
        assert!(Status::Error.is_terminal());
        assert!(!Status::Connected.is_terminal());
        assert!(!Status::Closing.is_terminal());
    }
}
