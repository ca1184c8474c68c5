//! Postgres Frontend Messages
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>
use bytes::{BufMut, BytesMut};
use std::fmt;

use crate::ext::{BufMutExt, StrExt, UsizeExt};

/// The protocol version number.
///
/// The most significant 16 bits are the major version number (3 for the protocol described here).
/// The least significant 16 bits are the minor version number (0 for the protocol described here).
pub const PROTOCOL_VERSION: u32 = 196_608;

/// Write a frontend message to `buf`.
pub fn write<F: FrontendProtocol>(msg: F, buf: &mut BytesMut) {
    // msgtype + length
    const PREFIX: usize = 1 + 4;

    let size_hint = msg.size_hint();
    buf.reserve(PREFIX + size_hint as usize);

    let offset = buf.len();
    buf.put_u8(F::MSGTYPE);
    buf.put_u32(4 + size_hint);

    msg.encode(&mut *buf);

    assert_eq!(
        buf.len() - offset,
        PREFIX + size_hint as usize,
        "Frontend message body size not equal to size hint"
    );
}

/// Longest string that fits in a message together with its nul and the length field.
///
/// The backend reads message length as `int32`.
pub const MAX_STRING_LEN: usize = i32::MAX as usize - 4 - 1;

/// An error when a string can not be sent as a nul terminated protocol string.
///
/// Checked before anything is written, the connection is still usable afterwards.
pub enum InputError {
    /// The string contains nul byte at `position`.
    Nul {
        field: &'static str,
        position: usize,
    },
    /// The string exceeds [`MAX_STRING_LEN`].
    TooLarge {
        field: &'static str,
        len: usize,
    },
}

/// Check that `string` can be written as a nul terminated string.
pub fn check_nul_string(field: &'static str, string: &str) -> Result<(), InputError> {
    check_len(field, string.len())?;
    match string.bytes().position(|b| b == b'\0') {
        Some(position) => Err(InputError::Nul { field, position }),
        None => Ok(()),
    }
}

fn check_len(field: &'static str, len: usize) -> Result<(), InputError> {
    match len > MAX_STRING_LEN {
        true => Err(InputError::TooLarge { field, len }),
        false => Ok(()),
    }
}

impl std::error::Error for InputError { }

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Nul { field, position } => write!(f, "{field} contains nul byte at {position}"),
            Self::TooLarge { field, len } => write!(f, "{field} length {len} exceeds message limit"),
        }
    }
}

impl fmt::Debug for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// A type which can be encoded into postgres frontend message
pub trait FrontendProtocol {
    /// Message type.
    const MSGTYPE: u8;

    /// Size of the main body.
    ///
    /// Note that this is **only** the size of main body as oppose of actual postgres message which
    /// include the length itself.
    fn size_hint(&self) -> u32;

    /// Write the main body of the message.
    ///
    /// The lenght of body written must be equal to the
    /// length returned by [`size_hint`][FrontendProtocol::size_hint].
    fn encode(self, buf: impl BufMut);
}

/// Postgres Startup frontend message
///
/// For historical reasons, the very first message sent by the client (the [`Startup`] message)
/// has no initial message-type byte, thus [`Startup`] does not implement [`FrontendProtocol`].
///
/// To write startup message, use [`Startup::write`].
#[derive(Debug)]
pub struct Startup<'a> {
    /// The database user name to connect as. Required; there is no default.
    pub user: &'a str,
    /// The database to connect to. Defaults to the user name.
    pub database: Option<&'a str>,
    /// Additional run-time parameters applied at backend start as session defaults.
    pub params: &'a [(&'a str, &'a str)],
}

impl Startup<'_> {
    pub fn write(self, buf: &mut BytesMut) {
        let offset = buf.len();

        // Length of message contents in bytes, including self.
        // reserve 4 bytes for length
        buf.put_u32(0);

        buf.put_u32(PROTOCOL_VERSION);

        // The protocol version number is followed by one or more pairs of parameter name and value strings.

        buf.put_nul_string("user");
        buf.put_nul_string(self.user);

        if let Some(db) = self.database {
            buf.put_nul_string("database");
            buf.put_nul_string(db);
        }

        for (name, value) in self.params {
            buf.put_nul_string(name);
            buf.put_nul_string(value);
        }

        // A zero byte is required as a terminator after the last name/value pair.
        buf.put_u8(b'\0');

        // write the length
        let mut written_buf = &mut buf[offset..];
        let len = written_buf.len().to_u32();
        written_buf.put_u32(len);
    }
}

/// Identifies the message as a password response.
///
/// Also used for MD5 response, in which case the password is already hashed.
///
/// The password must pass [`check_nul_string`].
#[derive(Debug)]
pub struct PasswordMessage<'a> {
    /// The password (encrypted, if requested)
    pub password: &'a str,
}

impl FrontendProtocol for PasswordMessage<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> u32 {
        self.password.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.password);
    }
}

/// Identifies the message as a simple query
///
/// The query string must pass [`check_nul_string`].
#[derive(Debug)]
pub struct Query<'a> {
    /// the query string itself
    pub sql: &'a str,
}

impl FrontendProtocol for Query<'_> {
    const MSGTYPE: u8 = b'Q';

    fn size_hint(&self) -> u32 {
        self.sql.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.sql);
    }
}

/// Identifies the message as a termination.
///
/// No response is expected, the backend close the connection.
#[derive(Debug)]
pub struct Terminate;

impl FrontendProtocol for Terminate {
    const MSGTYPE: u8 = b'X';

    fn size_hint(&self) -> u32 { 0 }

    fn encode(self, _: impl BufMut) { }
}

#[cfg(test)]
mod test {
    use bytes::{Buf, Bytes};

    use super::*;
    use crate::ext::BytesExt;

    /// Parse a startup message back the way the backend does.
    fn parse_startup(mut buf: Bytes) -> (u32, Vec<(String, String)>) {
        let len = buf.get_u32() as usize;
        assert_eq!(len, buf.len() + 4);
        let version = buf.get_u32();
        let mut params = vec![];
        while buf[0] != 0 {
            let name = buf.get_nul_bytestr().unwrap();
            let value = buf.get_nul_bytestr().unwrap();
            params.push((name.into(), value.into()));
        }
        assert_eq!(&buf[..], b"\0");
        (version, params)
    }

    #[test]
    fn startup_roundtrip() {
        let mut buf = BytesMut::new();
        Startup {
            user: "pgq_none",
            database: Some("pgq_test"),
            params: &[("client_encoding", "UTF8")],
        }
        .write(&mut buf);

        let (version, params) = parse_startup(buf.freeze());
        assert_eq!(version, PROTOCOL_VERSION);
        assert_eq!(params, [
            ("user".to_owned(), "pgq_none".to_owned()),
            ("database".to_owned(), "pgq_test".to_owned()),
            ("client_encoding".to_owned(), "UTF8".to_owned()),
        ]);
    }

    #[test]
    fn startup_without_database() {
        let mut buf = BytesMut::new();
        Startup { user: "postgres", database: None, params: &[] }.write(&mut buf);
        assert_eq!(&buf[..], b"\0\0\0\x17\0\x03\0\0user\0postgres\0\0");
    }

    #[test]
    fn tagged_messages() {
        let mut buf = BytesMut::new();
        write(Query { sql: "select 1" }, &mut buf);
        assert_eq!(&buf.split()[..], b"Q\0\0\0\x0dselect 1\0");

        write(PasswordMessage { password: "secret" }, &mut buf);
        assert_eq!(&buf.split()[..], b"p\0\0\0\x0bsecret\0");

        write(Terminate, &mut buf);
        assert_eq!(&buf[..], b"X\0\0\0\x04");
    }

    #[test]
    fn nul_string_input() {
        assert!(check_nul_string("sql", "select 1").is_ok());

        let err = check_nul_string("sql", "select 1\0; drop table users").unwrap_err();
        assert!(matches!(err, InputError::Nul { field: "sql", position: 8 }));
        assert_eq!(err.to_string(), "sql contains nul byte at 8");

        assert!(check_len("sql", MAX_STRING_LEN).is_ok());
        assert!(matches!(
            check_len("password", MAX_STRING_LEN + 1),
            Err(InputError::TooLarge { field: "password", .. })
        ));
    }
}
