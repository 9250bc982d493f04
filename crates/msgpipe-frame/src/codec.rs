use bytes::{Buf, BufMut, Bytes, BytesMut};
use msgpipe_crypto::{SessionCipher, SEAL_OVERHEAD};

use crate::error::{FrameError, Result};

/// Wire length prefix: 4 bytes, big-endian, unsigned.
pub const LEN_PREFIX_SIZE: usize = 4;

/// Message-type header inside the body: 4 bytes, big-endian, signed.
pub const TYPE_SIZE: usize = 4;

/// Default maximum payload size: 3 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 3 * 1024 * 1024;

/// Smallest maximum payload size a peer may be configured with.
pub const MIN_MAX_PAYLOAD: usize = 1024;

/// A decoded message frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The message type tag. `0` and negative values are reserved.
    pub msg_type: i32,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(msg_type: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type,
            payload: payload.into(),
        }
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 3 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Largest wire body the decoder will buffer for a given payload limit.
fn max_body_size(max_payload: usize, sealed: bool) -> usize {
    let plain = max_payload + TYPE_SIZE;
    if sealed {
        plain + SEAL_OVERHEAD
    } else {
        plain
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌─────────────┬──────────────────────────────────────┐
/// │ Length (4B) │ Body (Length bytes)                  │
/// │ u32 BE      │ plain:  msgtype_i32_be || payload    │
/// │             │ sealed: nonce || ciphertext || tag   │
/// └─────────────┴──────────────────────────────────────┘
/// ```
pub fn encode_frame(
    msg_type: i32,
    payload: &[u8],
    cipher: Option<&SessionCipher>,
    dst: &mut BytesMut,
) -> Result<()> {
    if payload.len() > u32::MAX as usize - TYPE_SIZE - SEAL_OVERHEAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }

    let mut body = Vec::with_capacity(TYPE_SIZE + payload.len());
    body.extend_from_slice(&msg_type.to_be_bytes());
    body.extend_from_slice(payload);

    let body = match cipher {
        Some(cipher) => cipher.seal(&body)?,
        None => body,
    };

    dst.reserve(LEN_PREFIX_SIZE + body.len());
    dst.put_u32(body.len() as u32);
    dst.put_slice(&body);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(
    src: &mut BytesMut,
    cipher: Option<&SessionCipher>,
    max_payload: usize,
) -> Result<Option<Frame>> {
    if src.len() < LEN_PREFIX_SIZE {
        return Ok(None); // Need more data
    }

    let body_len = u32::from_be_bytes(src[0..4].try_into().unwrap()) as usize;

    let max_body = max_body_size(max_payload, cipher.is_some());
    if body_len > max_body {
        return Err(FrameError::FrameTooLarge {
            size: body_len,
            max: max_body,
        });
    }

    let total = LEN_PREFIX_SIZE + body_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(LEN_PREFIX_SIZE);
    let body = src.split_to(body_len);

    let body = match cipher {
        Some(cipher) => Bytes::from(cipher.open(&body)?),
        None => body.freeze(),
    };

    if body.len() < TYPE_SIZE {
        return Err(FrameError::ShortBody(body.len()));
    }

    let msg_type = i32::from_be_bytes(body[0..4].try_into().unwrap());
    let payload = body.slice(TYPE_SIZE..);

    Ok(Some(Frame { msg_type, payload }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgpipe_crypto::EphemeralKey;

    fn cipher_pair() -> (SessionCipher, SessionCipher) {
        let a = EphemeralKey::generate();
        let b = EphemeralKey::generate();
        let a_pub = a.public_bytes();
        let b_pub = b.public_bytes();
        (
            SessionCipher::new(&a.agree(&b_pub).unwrap()),
            SessionCipher::new(&b.agree(&a_pub).unwrap()),
        )
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        encode_frame(1, b"hello, msgpipe!", None, &mut buf).unwrap();

        assert_eq!(buf.len(), LEN_PREFIX_SIZE + TYPE_SIZE + 15);

        let frame = decode_frame(&mut buf, None, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();

        assert_eq!(frame.msg_type, 1);
        assert_eq!(frame.payload.as_ref(), b"hello, msgpipe!");
        assert!(buf.is_empty());
    }

    #[test]
    fn length_prefix_counts_the_body() {
        let mut buf = BytesMut::new();
        encode_frame(7, b"abc", None, &mut buf).unwrap();

        let len = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
        assert_eq!(len, buf.len() - LEN_PREFIX_SIZE);
        assert_eq!(len, TYPE_SIZE + 3);
    }

    #[test]
    fn negative_types_roundtrip() {
        for msg_type in [-2, -1, 0, 1, i32::MAX, i32::MIN] {
            let mut buf = BytesMut::new();
            encode_frame(msg_type, b"x", None, &mut buf).unwrap();
            let frame = decode_frame(&mut buf, None, DEFAULT_MAX_PAYLOAD)
                .unwrap()
                .unwrap();
            assert_eq!(frame.msg_type, msg_type);
        }
    }

    #[test]
    fn decode_incomplete_prefix() {
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x00][..]);
        let result = decode_frame(&mut buf, None, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn decode_incomplete_body() {
        let mut buf = BytesMut::new();
        encode_frame(1, b"hello", None, &mut buf).unwrap();
        buf.truncate(LEN_PREFIX_SIZE + 2);

        let result = decode_frame(&mut buf, None, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn decode_oversize_length_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(32 * 1024 * 1024);

        let result = decode_frame(&mut buf, None, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));
    }

    #[test]
    fn decode_short_body_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(2);
        buf.put_slice(&[0x00, 0x01]);

        let result = decode_frame(&mut buf, None, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::ShortBody(2))));
    }

    #[test]
    fn multiple_frames_in_one_buffer() {
        let mut buf = BytesMut::new();
        encode_frame(1, b"first", None, &mut buf).unwrap();
        encode_frame(2, b"second", None, &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, None, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!((f1.msg_type, f1.payload.as_ref()), (1, b"first".as_ref()));

        let f2 = decode_frame(&mut buf, None, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!((f2.msg_type, f2.payload.as_ref()), (2, b"second".as_ref()));

        assert!(buf.is_empty());
    }

    #[test]
    fn empty_payload_roundtrips() {
        let mut buf = BytesMut::new();
        encode_frame(5, b"", None, &mut buf).unwrap();

        let frame = decode_frame(&mut buf, None, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(frame.msg_type, 5);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn sealed_roundtrip() {
        let (ours, theirs) = cipher_pair();
        let mut buf = BytesMut::new();
        encode_frame(1, b"hello", Some(&ours), &mut buf).unwrap();

        let frame = decode_frame(&mut buf, Some(&theirs), DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(frame.msg_type, 1);
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn sealed_wire_bytes_hide_payload() {
        let (ours, _) = cipher_pair();
        let mut buf = BytesMut::new();
        encode_frame(1, b"hello", Some(&ours), &mut buf).unwrap();

        assert!(!buf.windows(5).any(|w| w == b"hello"));

        let len = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
        assert_eq!(len, TYPE_SIZE + 5 + msgpipe_crypto::SEAL_OVERHEAD);
    }

    #[test]
    fn tampered_sealed_body_rejected() {
        let (ours, theirs) = cipher_pair();
        let mut buf = BytesMut::new();
        encode_frame(1, b"hello", Some(&ours), &mut buf).unwrap();

        // A tampered body must fail the tag check.
        let last = buf.len() - 1;
        buf[last] ^= 0x01;
        let result = decode_frame(&mut buf, Some(&theirs), DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::Crypto(_))));
    }
}
