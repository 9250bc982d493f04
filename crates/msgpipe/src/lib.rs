//! Encrypted message-oriented IPC between two local peers.
//!
//! msgpipe connects exactly one server and one client on the same host
//! over a named local endpoint, framing discrete typed messages with
//! optional AES-256-GCM encryption keyed by an ephemeral key agreement.
//!
//! # Crate Structure
//!
//! - [`transport`] — named endpoint transport (Unix domain sockets)
//! - [`crypto`] — key agreement and the session cipher
//! - [`frame`] — length-prefixed, type-tagged message framing
//! - [`peer`] — server/client runtimes and the public message API

/// Re-export transport types.
pub mod transport {
    pub use msgpipe_transport::*;
}

/// Re-export crypto types.
pub mod crypto {
    pub use msgpipe_crypto::*;
}

/// Re-export frame types.
pub mod frame {
    pub use msgpipe_frame::*;
}

/// Re-export peer types.
pub mod peer {
    pub use msgpipe_peer::*;
}
