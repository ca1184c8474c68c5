use bytes::{Buf, Bytes};
use std::fmt;

use super::ProtocolError;
use crate::{common::ByteStr, ext::BytesExt};

/// An error reported by the backend.
///
/// Decoded from the fields of `ErrorResponse` and `NoticeResponse`.
///
/// <https://www.postgresql.org/docs/current/protocol-error-fields.html>
#[derive(Clone, PartialEq, Eq)]
pub struct PgError {
    severity: ByteStr,
    severity_nonlocalized: Option<ByteStr>,
    code: ByteStr,
    message: ByteStr,
    detail: Option<ByteStr>,
    hint: Option<ByteStr>,
    position: Option<u32>,
    where_: Option<ByteStr>,
    schema: Option<ByteStr>,
    table: Option<ByteStr>,
    column: Option<ByteStr>,
    constraint: Option<ByteStr>,
    file: Option<ByteStr>,
    line: Option<u32>,
    routine: Option<ByteStr>,
}

impl PgError {
    /// Decode error fields.
    ///
    /// The body consists of one or more identified fields, followed by a zero byte as a terminator.
    /// Severity, code and message are always present, unknown field types are ignored.
    pub fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let mut severity = None;
        let mut severity_nonlocalized = None;
        let mut code = None;
        let mut message = None;
        let mut detail = None;
        let mut hint = None;
        let mut position = None;
        let mut where_ = None;
        let mut schema = None;
        let mut table = None;
        let mut column = None;
        let mut constraint = None;
        let mut file = None;
        let mut line = None;
        let mut routine = None;

        loop {
            let field = body.get_u8_checked()?;
            if field == b'\0' {
                break;
            }
            let value = body.get_nul_bytestr()?;
            match field {
                b'S' => severity = Some(value),
                b'V' => severity_nonlocalized = Some(value),
                b'C' => code = Some(value),
                b'M' => message = Some(value),
                b'D' => detail = Some(value),
                b'H' => hint = Some(value),
                b'P' => position = value.parse().ok(),
                b'W' => where_ = Some(value),
                b's' => schema = Some(value),
                b't' => table = Some(value),
                b'c' => column = Some(value),
                b'n' => constraint = Some(value),
                b'F' => file = Some(value),
                b'L' => line = value.parse().ok(),
                b'R' => routine = Some(value),
                // Since more field types might be added in future,
                // frontends should silently ignore fields of unrecognized type.
                _ => {}
            }
        }

        if body.has_remaining() {
            return Err(ProtocolError::malformed("trailing bytes after error fields"));
        }

        let (Some(severity), Some(code), Some(message)) = (severity, code, message) else {
            return Err(ProtocolError::malformed("error response missing severity, code or message"));
        };

        Ok(Self {
            severity,
            severity_nonlocalized,
            code,
            message,
            detail,
            hint,
            position,
            where_,
            schema,
            table,
            column,
            constraint,
            file,
            line,
            routine,
        })
    }

    /// The severity, e.g. `ERROR`, `FATAL`, `PANIC`, or `WARNING`, `NOTICE`, `DEBUG`, `INFO`, `LOG`
    /// for notices. Possibly localized.
    pub fn severity(&self) -> &str {
        &self.severity
    }

    /// Non localized severity, present in postgres 9.6 and later.
    pub fn severity_nonlocalized(&self) -> Option<&str> {
        self.severity_nonlocalized.as_deref()
    }

    /// The SQLSTATE code for the error.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The primary human-readable error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// An optional secondary error message carrying more detail about the problem.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// An optional suggestion what to do about the problem.
    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// Error cursor position as an index into the original query string, counted in characters starting from 1.
    pub fn position(&self) -> Option<u32> {
        self.position
    }

    /// The context in which the error occurred.
    pub fn where_(&self) -> Option<&str> {
        self.where_.as_deref()
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn constraint(&self) -> Option<&str> {
        self.constraint.as_deref()
    }

    /// The file name of the source-code location where the error was reported.
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// The line number of the source-code location where the error was reported.
    pub fn line(&self) -> Option<u32> {
        self.line
    }

    /// The name of the source-code routine reporting the error.
    pub fn routine(&self) -> Option<&str> {
        self.routine.as_deref()
    }

    /// Returns `true` if the backend is about to terminate the session.
    pub fn is_fatal(&self) -> bool {
        let severity = self.severity_nonlocalized().unwrap_or(self.severity());
        matches!(severity, "FATAL" | "PANIC")
    }
}

impl std::error::Error for PgError { }

impl fmt::Display for PgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.severity, self.message, self.code)?;
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {detail}")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {hint}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const INVALID_ROLE: &[u8] = b"SFATAL\0VFATAL\0C28000\0Mrole \"nobody\" does not exist\0Fmiscinit.c\0L694\0RInitializeSessionUserId\0\0";

    #[test]
    fn decode_fields() {
        let err = PgError::decode(Bytes::from_static(INVALID_ROLE)).unwrap();
        assert_eq!(err.severity(), "FATAL");
        assert_eq!(err.code(), "28000");
        assert_eq!(err.message(), "role \"nobody\" does not exist");
        assert_eq!(err.file(), Some("miscinit.c"));
        assert_eq!(err.line(), Some(694));
        assert_eq!(err.routine(), Some("InitializeSessionUserId"));
        assert_eq!(err.detail(), None);
        assert!(err.is_fatal());
    }

    #[test]
    fn display_detail_hint() {
        let body = b"SERROR\0C42P01\0Mrelation \"foo\" does not exist\0Dsome detail\0Hsome hint\0P15\0\0";
        let err = PgError::decode(Bytes::from_static(body)).unwrap();
        assert_eq!(err.position(), Some(15));
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "ERROR: relation \"foo\" does not exist (42P01)\nDETAIL: some detail\nHINT: some hint"
        );
    }

    #[test]
    fn ignore_unknown_field() {
        let body = b"SWARNING\0C01000\0Mcareful\0Zfuture field\0\0";
        let err = PgError::decode(Bytes::from_static(body)).unwrap();
        assert_eq!(err.message(), "careful");
    }

    #[test]
    fn missing_required_field() {
        let body = b"SERROR\0Mno code\0\0";
        assert!(matches!(
            PgError::decode(Bytes::from_static(body)),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn unterminated_fields() {
        let body = b"SERROR\0C42601\0Msyntax error";
        assert!(PgError::decode(Bytes::from_static(body)).is_err());

        let body = b"SERROR\0C42601\0Msyntax error\0";
        assert!(matches!(
            PgError::decode(Bytes::from_static(body)),
            Err(ProtocolError::Truncated)
        ));
    }
}
