//! Named local endpoints for msgpipe.
//!
//! A server binds a [`UnixDomainSocket`] at a path derived from a
//! validated endpoint name; the client dials the same path. Both ends
//! of an accepted connection are [`IpcStream`]s: blocking duplex byte
//! streams that report peer close as EOF, which is all the session
//! layer above requires of its transport.

pub mod endpoint;
pub mod error;

#[cfg(unix)]
pub mod stream;
#[cfg(unix)]
pub mod uds;

pub use endpoint::{endpoint_path, validate_endpoint_name, DEFAULT_BASE_PATH};
pub use error::{Result, TransportError};

#[cfg(unix)]
pub use stream::IpcStream;
#[cfg(unix)]
pub use uds::{BindOptions, UnixDomainSocket};
