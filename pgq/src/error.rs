//! `pgq` error types.
use std::{backtrace::Backtrace, fmt, io};

use crate::{
    coerce::CoerceError,
    connection::{Broken, Closed, ConfigError},
    phase::AuthError,
    postgres::{InputError, PgError, ProtocolError},
    row::{DecodeError, RowNotFound, ShapeError},
};

/// A specialized [`Result`] type for `pgq` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `pgq` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Prefix the error message with `context`.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.context = match self.context.is_empty() {
            true => context,
            false => format!("{context}: {}", self.context),
        };
        self
    }

    /// Returns the backend error, if any.
    pub fn as_database(&self) -> Option<&PgError> {
        match &self.kind {
            ErrorKind::Database(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the SQLSTATE code of backend error, if any.
    pub fn code(&self) -> Option<&str> {
        self.as_database().map(PgError::code)
    }

    /// Returns `true` if the connection can no longer be used after this error.
    ///
    /// Transport and protocol errors are fatal, so is a backend error with `FATAL`
    /// or `PANIC` severity since the backend terminates the session afterwards.
    pub fn is_fatal(&self) -> bool {
        match &self.kind {
            ErrorKind::Io(_) | ErrorKind::Protocol(_) => true,
            ErrorKind::Database(err) => err.is_fatal(),
            _ => false,
        }
    }
}

/// All possible error kind from `pgq` library.
pub enum ErrorKind {
    Config(ConfigError),
    Io(io::Error),
    Input(InputError),
    Protocol(ProtocolError),
    Auth(AuthError),
    Database(PgError),
    Coerce(CoerceError),
    Decode(DecodeError),
    RowNotFound(RowNotFound),
    UnexpectedShape(ShapeError),
    Closed(Closed),
    Broken(Broken),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ConfigError>e => ErrorKind::Config(e));
from!(<io::Error>e => ErrorKind::Io(e));
from!(<InputError>e => ErrorKind::Input(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<AuthError>e => ErrorKind::Auth(e));
from!(<PgError>e => ErrorKind::Database(e));
from!(<CoerceError>e => ErrorKind::Coerce(e));
from!(<DecodeError>e => ErrorKind::Decode(e));
from!(<RowNotFound>e => ErrorKind::RowNotFound(e));
from!(<ShapeError>e => ErrorKind::UnexpectedShape(e));
from!(<Closed>e => ErrorKind::Closed(e));
from!(<Broken>e => ErrorKind::Broken(e));

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(e) => Some(e),
            ErrorKind::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::Input(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Auth(e) => e.fmt(f),
            Self::Database(e) => e.fmt(f),
            Self::Coerce(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
            Self::RowNotFound(e) => e.fmt(f),
            Self::UnexpectedShape(e) => e.fmt(f),
            Self::Closed(e) => e.fmt(f),
            Self::Broken(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
