//! Backend message framing.
//!
//! Every backend message is framed as:
//!
//! - `Byte1` message type.
//! - `Int32` length of message contents in bytes, including self.
//! - `Byte[n]` the message body, `n` being the length minus 4.
use bytes::{Buf, Bytes, BytesMut};

use super::ProtocolError;

/// Message type plus length.
pub const HEADER_LEN: usize = 1 + 4;

/// Largest message body accepted from the backend.
///
/// Postgres itself never allocate a single value larger than 1GB.
pub const MAX_MESSAGE_LEN: usize = 1 << 30;

/// A single undecoded backend message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The message type.
    pub msgtype: u8,
    /// Message body, excluding message type and length.
    pub body: Bytes,
}

/// Split one complete [`Frame`] from the front of `buf`.
///
/// Returns `Ok(None)` if `buf` does not yet contain a complete message,
/// no bytes are consumed in that case, but capacity for the rest of the
/// message is reserved once the header is known.
pub fn decode_frame(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
    let Some(mut header) = buf.get(..HEADER_LEN) else {
        return Ok(None);
    };

    let msgtype = header.get_u8();
    let len = header.get_i32();

    if len < 4 || len as usize > MAX_MESSAGE_LEN {
        return Err(ProtocolError::InvalidLength { msgtype, len });
    }

    let len = len as usize;

    if buf.len() - 1/*msgtype*/ < len {
        buf.reserve(1 + len - buf.len());
        return Ok(None);
    }

    buf.advance(HEADER_LEN);
    let body = buf.split_to(len - 4).freeze();

    Ok(Some(Frame { msgtype, body }))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_header() {
        let mut buf = BytesMut::from(&b"Z\0\0"[..]);
        assert!(decode_frame(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn partial_body() {
        let mut buf = BytesMut::from(&b"C\0\0\0\x0dSELECT"[..]);
        assert!(decode_frame(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b" 1\0");
        let frame = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(frame.msgtype, b'C');
        assert_eq!(&frame.body[..], b"SELECT 1\0");
        assert!(buf.is_empty());
    }

    #[test]
    fn consecutive_frames() {
        let mut buf = BytesMut::from(&b"Z\0\0\0\x05IZ\0\0\0\x05T"[..]);
        let first = decode_frame(&mut buf).unwrap().unwrap();
        let second = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(&first.body[..], b"I");
        assert_eq!(&second.body[..], b"T");
        assert!(decode_frame(&mut buf).unwrap().is_none());
    }

    #[test]
    fn invalid_length() {
        let mut buf = BytesMut::from(&b"Z\0\0\0\x03I"[..]);
        assert!(matches!(
            decode_frame(&mut buf),
            Err(ProtocolError::InvalidLength { msgtype: b'Z', len: 3 })
        ));

        let mut buf = BytesMut::from(&b"D\xff\xff\xff\xff"[..]);
        assert!(decode_frame(&mut buf).is_err());
    }
}
