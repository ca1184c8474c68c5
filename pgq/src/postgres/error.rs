//! Protocol error
use std::{fmt, str::Utf8Error};

use super::BackendMessage;

/// An error when translating buffer from postgres.
///
/// Protocol error means the connection can no longer be trusted to be in sync
/// with the backend, thus it is always fatal to the connection.
pub enum ProtocolError {
    /// Backend send a message that is not valid in the current phase.
    Unexpected {
        expect: Option<u8>,
        found: u8,
        phase: Option<&'static str>,
    },
    /// Message declared length is less than the length field itself or exceeds the limit.
    InvalidLength {
        msgtype: u8,
        len: i32,
    },
    /// Message body ended before all declared fields are read.
    Truncated,
    /// Stream closed in the middle of a message.
    UnexpectedEof {
        buffered: usize,
    },
    /// `DataRow` received before any `RowDescription`.
    MissingRowDescription,
    /// `DataRow` column count does not match the preceding `RowDescription`.
    ColumnCount {
        expect: usize,
        found: usize,
    },
    /// Message body violate its format.
    Malformed(&'static str),
    /// Backend send non utf8 string.
    Utf8(Utf8Error),
}

impl std::error::Error for ProtocolError { }

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("protocol error, ")?;
        match *self {
            Self::Unexpected { expect, found, phase } => {
                let found = BackendMessage::message_name(found);
                match expect {
                    Some(m) => write!(
                        f,
                        "expected message `{}` found `{found}`",
                        BackendMessage::message_name(m),
                    )?,
                    None => write!(f, "unexpected message `{found}`")?,
                }
                if let Some(phase) = phase {
                    write!(f, " in `{phase}`")?
                }
                Ok(())
            },
            Self::InvalidLength { msgtype, len } => write!(
                f,
                "invalid length {len} for message `{}`",
                BackendMessage::message_name(msgtype),
            ),
            Self::Truncated => f.write_str("message body is truncated"),
            Self::UnexpectedEof { buffered } => write!(
                f,
                "connection closed in the middle of a message ({buffered} bytes buffered)"
            ),
            Self::MissingRowDescription => f.write_str("`DataRow` received before `RowDescription`"),
            Self::ColumnCount { expect, found } => write!(
                f,
                "`DataRow` contains {found} columns while `RowDescription` describe {expect}"
            ),
            Self::Malformed(reason) => f.write_str(reason),
            Self::Utf8(ref e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Debug for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<Utf8Error> for ProtocolError {
    fn from(value: Utf8Error) -> Self {
        Self::Utf8(value)
    }
}

impl ProtocolError {
    pub(crate) fn unknown(found: u8) -> ProtocolError {
        Self::Unexpected {
            expect: None,
            found,
            phase: None,
        }
    }

    pub(crate) fn unexpected(expect: u8, found: u8) -> ProtocolError {
        Self::Unexpected {
            expect: Some(expect),
            found,
            phase: None,
        }
    }

    pub(crate) fn unexpected_phase(found: u8, phase: &'static str) -> ProtocolError {
        Self::Unexpected {
            expect: None,
            found,
            phase: Some(phase),
        }
    }

    pub(crate) fn truncated() -> ProtocolError {
        Self::Truncated
    }

    pub(crate) fn malformed(reason: &'static str) -> ProtocolError {
        Self::Malformed(reason)
    }
}
