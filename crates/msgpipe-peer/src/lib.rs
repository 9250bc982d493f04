//! Server and client session runtimes for msgpipe.
//!
//! A [`Server`] listens on a named local endpoint and accepts one client
//! at a time; a [`Client`] dials it with retries and reconnects after
//! the server goes away. Both sides expose the same surface: a blocking
//! [`recv`](Server::recv) that interleaves application messages with
//! in-band lifecycle notices, a [`send`](Server::send) that queues typed
//! payloads, a [`status`](Server::status) snapshot, and an idempotent
//! [`close`](Server::close).
//!
//! A four-phase handshake negotiates the protocol version, the
//! encryption mode (the server's choice wins), and the maximum message
//! size (the server's configured value) on every connection.

pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod message;
pub mod server;
pub mod status;

mod runtime;

pub use client::Client;
pub use config::{ClientConfig, ServerConfig, DEFAULT_RETRY_TIMER, DEFAULT_WRITE_PACING};
pub use error::{PeerError, Result};
pub use handshake::{
    client_handshake, server_handshake, HandshakeVerdict, Negotiated, PROTOCOL_VERSION,
};
pub use message::{tags, Message, CONTROL_TYPE, ERROR_TYPE, LIFECYCLE_TYPE};
pub use server::Server;
pub use status::Status;
