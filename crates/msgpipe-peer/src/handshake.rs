use std::io::{Read, Write};

use msgpipe_crypto::{EphemeralKey, SessionCipher};

use crate::error::{PeerError, Result};

/// Protocol version carried in the first handshake byte. Peers of
/// mismatching version reject the connection.
pub const PROTOCOL_VERSION: u8 = 2;

const MODE_PLAIN: u8 = 0;
const MODE_ENCRYPTED: u8 = 1;

/// Largest length prefix accepted for a handshake field. Bounds both
/// the peer public key and the sealed max-size announce.
const MAX_HANDSHAKE_FIELD: usize = 256;

/// The client's one-byte reply to the server's version/mode announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeVerdict {
    /// Version and mode accepted.
    Ok = 0,
    /// The client runs a different protocol version.
    VersionMismatch = 1,
    /// The client requires encryption but the server announced plaintext.
    EncryptionRequired = 2,
    /// The client could not read the announce. Defined for the wire
    /// protocol; this implementation never sends it.
    ReplyFailed = 3,
}

/// Outcome of a completed client-side handshake.
#[derive(Debug)]
pub struct Negotiated {
    /// Session cipher, present when the server announced encryption.
    pub cipher: Option<SessionCipher>,
    /// The server's maximum message size, adopted by the client.
    pub max_msg_size: usize,
    /// Effective encryption mode for the session (the server's choice).
    pub encryption: bool,
}

/// Run the server side of the handshake on a fresh connection.
///
/// Phase 1 announces version and encryption mode, phase 2 reads the
/// client verdict, phase 3 (encrypted sessions only) exchanges ephemeral
/// public keys, phase 4 announces the maximum message size and waits for
/// the client ack. Returns the installed cipher for encrypted sessions.
pub fn server_handshake<S: Read + Write>(
    stream: &mut S,
    encryption: bool,
    max_msg_size: usize,
) -> Result<Option<SessionCipher>> {
    let mode = if encryption { MODE_ENCRYPTED } else { MODE_PLAIN };
    stream
        .write_all(&[PROTOCOL_VERSION, mode])
        .map_err(|err| PeerError::Handshake(format!("unable to send version announce: {err}")))?;

    let mut reply = [0u8; 1];
    stream
        .read_exact(&mut reply)
        .map_err(|err| PeerError::Handshake(format!("failed to read handshake reply: {err}")))?;

    match reply[0] {
        0 => {}
        1 => {
            return Err(PeerError::Handshake(
                "client has a different version number".to_string(),
            ))
        }
        2 => {
            return Err(PeerError::Handshake(
                "client is enforcing encryption".to_string(),
            ))
        }
        3 => {
            return Err(PeerError::Handshake(
                "client failed to read the handshake announce".to_string(),
            ))
        }
        other => {
            return Err(PeerError::Handshake(format!(
                "unknown handshake reply {other}"
            )))
        }
    }

    let cipher = if encryption {
        Some(server_key_exchange(stream)?)
    } else {
        None
    };

    announce_max_size(stream, cipher.as_ref(), max_msg_size)?;

    Ok(cipher)
}

/// Run the client side of the handshake on a fresh connection.
///
/// The server's encryption choice wins: a plaintext announce is only an
/// error when `require_encryption` is set, and an encrypted announce is
/// followed even by a client configured for plaintext.
pub fn client_handshake<S: Read + Write>(
    stream: &mut S,
    require_encryption: bool,
) -> Result<Negotiated> {
    let mut announce = [0u8; 2];
    stream
        .read_exact(&mut announce)
        .map_err(|err| PeerError::Handshake(format!("failed to read version announce: {err}")))?;

    if announce[0] != PROTOCOL_VERSION {
        send_verdict(stream, HandshakeVerdict::VersionMismatch);
        return Err(PeerError::Handshake(
            "server has sent a different version number".to_string(),
        ));
    }

    if announce[1] == MODE_PLAIN && require_encryption {
        send_verdict(stream, HandshakeVerdict::EncryptionRequired);
        return Err(PeerError::Handshake(
            "server communicates in plaintext, client requires encryption".to_string(),
        ));
    }
    let encryption = announce[1] != MODE_PLAIN;

    stream
        .write_all(&[HandshakeVerdict::Ok as u8])
        .map_err(|err| PeerError::Handshake(format!("unable to send handshake reply: {err}")))?;

    let cipher = if encryption {
        Some(client_key_exchange(stream)?)
    } else {
        None
    };

    let max_msg_size = receive_max_size(stream, cipher.as_ref())?;

    stream
        .write_all(&[0u8])
        .map_err(|err| PeerError::Handshake(format!("unable to ack message size: {err}")))?;

    Ok(Negotiated {
        cipher,
        max_msg_size,
        encryption,
    })
}

fn server_key_exchange<S: Read + Write>(stream: &mut S) -> Result<SessionCipher> {
    let key = EphemeralKey::generate();
    write_prefixed(stream, &key.public_bytes())?;
    let peer_public = read_prefixed(stream)?;
    let session_key = key.agree(&peer_public)?;
    Ok(SessionCipher::new(&session_key))
}

fn client_key_exchange<S: Read + Write>(stream: &mut S) -> Result<SessionCipher> {
    let peer_public = read_prefixed(stream)?;
    let key = EphemeralKey::generate();
    write_prefixed(stream, &key.public_bytes())?;
    let session_key = key.agree(&peer_public)?;
    Ok(SessionCipher::new(&session_key))
}

fn announce_max_size<S: Read + Write>(
    stream: &mut S,
    cipher: Option<&SessionCipher>,
    max_msg_size: usize,
) -> Result<()> {
    let body = (max_msg_size as u32).to_be_bytes().to_vec();
    let body = match cipher {
        Some(cipher) => cipher.seal(&body)?,
        None => body,
    };
    write_prefixed(stream, &body)
        .map_err(|_| PeerError::Handshake("unable to send max message size".to_string()))?;

    let mut ack = [0u8; 1];
    stream
        .read_exact(&mut ack)
        .map_err(|_| PeerError::Handshake("no reply to max message size".to_string()))?;
    Ok(())
}

fn receive_max_size<S: Read>(stream: &mut S, cipher: Option<&SessionCipher>) -> Result<usize> {
    let body = read_prefixed(stream)
        .map_err(|_| PeerError::Handshake("failed to read max message size".to_string()))?;
    let body = match cipher {
        Some(cipher) => cipher.open(&body)?,
        None => body,
    };
    if body.len() < 4 {
        return Err(PeerError::Handshake(
            "malformed max message size announce".to_string(),
        ));
    }
    Ok(u32::from_be_bytes(body[0..4].try_into().unwrap()) as usize)
}

/// Best-effort failure verdict; the connection is being abandoned anyway.
fn send_verdict<S: Write>(stream: &mut S, verdict: HandshakeVerdict) {
    let _ = stream.write_all(&[verdict as u8]);
}

fn write_prefixed<S: Write>(stream: &mut S, bytes: &[u8]) -> Result<()> {
    let len = (bytes.len() as u32).to_be_bytes();
    stream
        .write_all(&len)
        .and_then(|()| stream.write_all(bytes))
        .map_err(|err| PeerError::Handshake(format!("unable to send handshake field: {err}")))
}

fn read_prefixed<S: Read>(stream: &mut S) -> Result<Vec<u8>> {
    let mut len = [0u8; 4];
    stream
        .read_exact(&mut len)
        .map_err(|err| PeerError::Handshake(format!("failed to read handshake field: {err}")))?;
    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_HANDSHAKE_FIELD {
        return Err(PeerError::Handshake(format!(
            "handshake field too large: {len} bytes"
        )));
    }
    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .map_err(|err| PeerError::Handshake(format!("failed to read handshake field: {err}")))?;
    Ok(buf)
}
