//! Postgres Backend Messages
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>
use bytes::Bytes;

use super::{Oid, PgError, ProtocolError};
use crate::{common::ByteStr, ext::BytesExt};

/// A type that can be decoded into postgres backend message
pub trait BackendProtocol: Sized {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError>;
}

/// Postgres backend messages spoken in the simple query protocol.
#[derive(Debug)]
pub enum BackendMessage {
    Authentication(Authentication),
    BackendKeyData(BackendKeyData),
    CommandComplete(CommandComplete),
    DataRow(DataRow),
    EmptyQueryResponse(EmptyQueryResponse),
    ErrorResponse(ErrorResponse),
    NegotiateProtocolVersion(NegotiateProtocolVersion),
    NoticeResponse(NoticeResponse),
    NotificationResponse(NotificationResponse),
    ParameterStatus(ParameterStatus),
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription),
}

macro_rules! match_backend {
    ($($name:ident,)*) => {
        impl BackendMessage {
            pub fn msgtype(&self) -> u8 {
                match self {
                    $(Self::$name(_) => $name::MSGTYPE,)*
                }
            }

            /// Get message name from message type.
            ///
            /// Returns `"Unknown"` for unknown message type.
            pub fn message_name(msgtype: u8) -> &'static str {
                match msgtype {
                    $($name::MSGTYPE => stringify!($name),)*
                    _ => "Unknown",
                }
            }
        }
        impl BackendProtocol for BackendMessage {
            fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
                let message = match msgtype {
                    $($name::MSGTYPE => Self::$name(<$name as BackendProtocol>::decode(msgtype, body)?),)*
                    _ => return Err(ProtocolError::unknown(msgtype)),
                };
                Ok(message)
            }
        }
    };
}

match_backend! {
    Authentication,
    BackendKeyData,
    CommandComplete,
    DataRow,
    EmptyQueryResponse,
    ErrorResponse,
    NegotiateProtocolVersion,
    NoticeResponse,
    NotificationResponse,
    ParameterStatus,
    ReadyForQuery,
    RowDescription,
}

impl BackendMessage {
    /// Create [`ProtocolError`] stating this message is not expected in `phase`.
    pub fn unexpected(&self, phase: &'static str) -> ProtocolError {
        ProtocolError::unexpected_phase(self.msgtype(), phase)
    }
}

macro_rules! assert_msgtype {
    ($typ:ident) => {
        if Self::MSGTYPE != $typ {
            return Err(ProtocolError::unexpected(Self::MSGTYPE,$typ))
        }
    };
}

/// Identifies the message as an authentication request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    /// Specifies that the authentication was successful.
    Ok,
    /// Specifies that a clear-text password is required.
    CleartextPassword,
    /// Specifies that an MD5-encrypted password is required.
    MD5Password {
        /// The salt to use when encrypting the password.
        salt: [u8;4],
    },
    /// Any other method, e.g. Kerberos, GSSAPI, SSPI or SASL.
    ///
    /// The remaining body is kept as is.
    Unsupported {
        code: u32,
        data: Bytes,
    },
}

impl Authentication {
    pub const MSGTYPE: u8 = b'R';

    /// Returns the authentication method name.
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::Ok => "Ok",
            Self::CleartextPassword => "CleartextPassword",
            Self::MD5Password { .. } => "MD5Password",
            Self::Unsupported { code, .. } => match code {
                2 => "KerberosV5",
                6 => "SCMCredential",
                7 => "GSS",
                8 => "GSSContinue",
                9 => "SSPI",
                10 => "SASL",
                11 => "SASLContinue",
                12 => "SASLFinal",
                _ => "Unknown",
            },
        }
    }
}

impl BackendProtocol for Authentication {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        let auth = match body.get_u32_checked()? {
            0 => Authentication::Ok,
            3 => Authentication::CleartextPassword,
            5 => {
                let mut salt = [0u8;4];
                salt.copy_from_slice(&body.try_split_to(4)?);
                Authentication::MD5Password { salt }
            },
            code => Authentication::Unsupported { code, data: body },
        };
        Ok(auth)
    }
}

/// Identifies the message as cancellation key data.
///
/// The frontend must save these values if it wishes to be able to issue CancelRequest messages later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendKeyData {
    /// The process ID of this backend.
    pub process_id: u32,
    /// The secret key of this backend.
    pub secret_key: u32,
}

impl BackendKeyData {
    pub const MSGTYPE: u8 = b'K';
}

impl BackendProtocol for BackendKeyData {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            process_id: body.get_u32_checked()?,
            secret_key: body.get_u32_checked()?,
        })
    }
}

/// Identifies the message as a run-time parameter status report
#[derive(Debug, Clone)]
pub struct ParameterStatus {
    /// The name of the run-time parameter being reported
    pub name: ByteStr,
    /// The current value of the parameter
    pub value: ByteStr,
}

impl ParameterStatus {
    pub const MSGTYPE: u8 = b'S';
}

impl BackendProtocol for ParameterStatus {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            name: body.get_nul_bytestr()?,
            value: body.get_nul_bytestr()?,
        })
    }
}

/// Current backend transaction status, reported by [`ReadyForQuery`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Not in a transaction block.
    #[default]
    Idle,
    /// In a transaction block.
    Transaction,
    /// In a failed transaction block, queries will be rejected until block is ended.
    Failed,
}

/// Identifies the message type. ReadyForQuery is sent whenever the backend is ready for a new query cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyForQuery {
    pub status: TransactionStatus,
}

impl ReadyForQuery {
    pub const MSGTYPE: u8 = b'Z';
}

impl BackendProtocol for ReadyForQuery {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        let status = match body.get_u8_checked()? {
            b'I' => TransactionStatus::Idle,
            b'T' => TransactionStatus::Transaction,
            b'E' => TransactionStatus::Failed,
            _ => return Err(ProtocolError::malformed("unknown transaction status")),
        };
        Ok(Self { status })
    }
}

/// A column description inside [`RowDescription`].
#[derive(Debug, Clone)]
pub struct FieldDescription {
    /// The field name.
    pub name: ByteStr,
    /// If the field can be identified as a column of a specific table, the object ID of the table;
    /// otherwise zero.
    pub table_oid: Oid,
    /// If the field can be identified as a column of a specific table, the attribute number of the column;
    /// otherwise zero.
    pub column_id: i16,
    /// The object ID of the field's data type.
    pub type_oid: Oid,
    /// The data type size, negative values denote variable-width types.
    pub type_size: i16,
    /// The type modifier, the meaning of the modifier is type-specific.
    pub type_modifier: i32,
    /// The format code being used for the field, zero (text) in simple query.
    pub format: i16,
}

/// Identifies the message as a row description
#[derive(Debug, Clone)]
pub struct RowDescription {
    pub fields: Vec<FieldDescription>,
}

impl RowDescription {
    pub const MSGTYPE: u8 = b'T';
}

impl BackendProtocol for RowDescription {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        let len = body.get_i16_checked()?;
        if len < 0 {
            return Err(ProtocolError::malformed("negative field count"));
        }
        let mut fields = Vec::with_capacity(len as usize);
        for _ in 0..len {
            fields.push(FieldDescription {
                name: body.get_nul_bytestr()?,
                table_oid: body.get_u32_checked()?,
                column_id: body.get_i16_checked()?,
                type_oid: body.get_u32_checked()?,
                type_size: body.get_i16_checked()?,
                type_modifier: body.get_i32_checked()?,
                format: body.get_i16_checked()?,
            });
        }
        Ok(Self { fields })
    }
}

/// Identifies the message as a data row.
#[derive(Debug, Clone)]
pub struct DataRow {
    /// Column values, `None` for `NULL`.
    pub values: Vec<Option<Bytes>>,
}

impl DataRow {
    pub const MSGTYPE: u8 = b'D';
}

impl BackendProtocol for DataRow {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        let len = body.get_i16_checked()?;
        if len < 0 {
            return Err(ProtocolError::malformed("negative column count"));
        }
        let mut values = Vec::with_capacity(len as usize);
        for _ in 0..len {
            // As a special case, -1 indicates a NULL column value. No value bytes follow in the NULL case.
            let value = match body.get_i32_checked()? {
                -1 => None,
                n if n < 0 => return Err(ProtocolError::malformed("negative column length")),
                n => Some(body.try_split_to(n as usize)?),
            };
            values.push(value);
        }
        Ok(Self { values })
    }
}

/// Identifies the message as a command-completed response
///
/// For a SELECT or CREATE TABLE AS command, the tag is SELECT rows where rows is the number of rows retrieved.
///
/// For an INSERT command, the tag is INSERT oid rows, where oid is always 0.
#[derive(Debug, Clone)]
pub struct CommandComplete {
    /// The command tag. This is usually a single word that identifies which SQL command was completed.
    pub tag: ByteStr,
}

impl CommandComplete {
    pub const MSGTYPE: u8 = b'C';
}

impl BackendProtocol for CommandComplete {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            tag: body.get_nul_bytestr()?,
        })
    }
}

/// Identifies the message as an error
///
/// The message body consists of one or more identified fields, followed by a zero byte as a terminator.
/// See [`PgError`] for the decoded fields.
#[derive(Debug, Clone)]
pub struct ErrorResponse(pub PgError);

impl ErrorResponse {
    pub const MSGTYPE: u8 = b'E';
}

impl BackendProtocol for ErrorResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        PgError::decode(body).map(Self)
    }
}

/// A warning message. The frontend should display the message.
///
/// Shares the field format of [`ErrorResponse`].
#[derive(Debug, Clone)]
pub struct NoticeResponse(pub PgError);

impl NoticeResponse {
    pub const MSGTYPE: u8 = b'N';
}

impl BackendProtocol for NoticeResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        PgError::decode(body).map(Self)
    }
}

/// Identifies the message as a notification response, sent after `LISTEN` on a channel.
#[derive(Debug, Clone)]
pub struct NotificationResponse {
    /// The process ID of the notifying backend process.
    pub process_id: u32,
    /// The name of the channel that the notify has been raised on.
    pub channel: ByteStr,
    /// The "payload" string passed from the notifying process.
    pub payload: ByteStr,
}

impl NotificationResponse {
    pub const MSGTYPE: u8 = b'A';
}

impl BackendProtocol for NotificationResponse {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            process_id: body.get_u32_checked()?,
            channel: body.get_nul_bytestr()?,
            payload: body.get_nul_bytestr()?,
        })
    }
}

/// Identifies the message as a protocol version negotiation message.
#[derive(Debug, Clone)]
pub struct NegotiateProtocolVersion {
    /// Newest minor protocol version supported by the server for the major protocol version requested by the client.
    pub minor: u32,
    /// Protocol options not recognized by the server.
    pub options: Vec<ByteStr>,
}

impl NegotiateProtocolVersion {
    pub const MSGTYPE: u8 = b'v';
}

impl BackendProtocol for NegotiateProtocolVersion {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        let minor = body.get_u32_checked()?;
        let len = body.get_u32_checked()?;
        let mut options = vec![];
        for _ in 0..len {
            options.push(body.get_nul_bytestr()?);
        }
        Ok(Self { minor, options })
    }
}

/// Identifies the message as a response to an empty query string.
///
/// This substitutes for CommandComplete.
#[derive(Debug, Clone, Copy)]
pub struct EmptyQueryResponse;

impl EmptyQueryResponse {
    pub const MSGTYPE: u8 = b'I';
}

impl BackendProtocol for EmptyQueryResponse {
    fn decode(msgtype: u8, _: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn decode(msgtype: u8, body: &'static [u8]) -> Result<BackendMessage, ProtocolError> {
        BackendMessage::decode(msgtype, Bytes::from_static(body))
    }

    #[test]
    fn authentication() {
        let auth = Authentication::decode(b'R', Bytes::from_static(&[0, 0, 0, 0])).unwrap();
        assert_eq!(auth, Authentication::Ok);

        let auth = Authentication::decode(b'R', Bytes::from_static(&[0, 0, 0, 3])).unwrap();
        assert_eq!(auth, Authentication::CleartextPassword);

        let auth = Authentication::decode(b'R', Bytes::from_static(&[0, 0, 0, 5, 1, 2, 3, 4])).unwrap();
        assert_eq!(auth, Authentication::MD5Password { salt: [1, 2, 3, 4] });

        let auth = Authentication::decode(b'R', Bytes::from_static(b"\0\0\0\x0aSCRAM-SHA-256\0\0")).unwrap();
        assert!(matches!(auth, Authentication::Unsupported { code: 10, .. }));
        assert_eq!(auth.method_name(), "SASL");
    }

    #[test]
    fn truncated_md5_salt() {
        let result = Authentication::decode(b'R', Bytes::from_static(&[0, 0, 0, 5, 1, 2]));
        assert!(matches!(result, Err(ProtocolError::Truncated)));
    }

    #[test]
    fn msgtype_missmatch() {
        let result = ReadyForQuery::decode(b'C', Bytes::from_static(b"I"));
        assert!(matches!(result, Err(ProtocolError::Unexpected { expect: Some(b'Z'), found: b'C', .. })));
    }

    #[test]
    fn unknown_message() {
        assert!(matches!(decode(b'!', b""), Err(ProtocolError::Unexpected { expect: None, found: b'!', .. })));
        assert_eq!(BackendMessage::message_name(b'!'), "Unknown");
        assert_eq!(BackendMessage::message_name(b'T'), "RowDescription");
    }

    #[test]
    fn startup_messages() {
        let Ok(BackendMessage::BackendKeyData(key)) = decode(b'K', &[0, 0, 0x30, 0x39, 0xde, 0xad, 0xbe, 0xef]) else {
            panic!("expected BackendKeyData")
        };
        assert_eq!(key.process_id, 12345);
        assert_eq!(key.secret_key, 0xdeadbeef);

        let Ok(BackendMessage::ParameterStatus(param)) = decode(b'S', b"server_version\x0017.2\x00") else {
            panic!("expected ParameterStatus")
        };
        assert_eq!(param.name, "server_version");
        assert_eq!(param.value, "17.2");

        let Ok(BackendMessage::ReadyForQuery(ready)) = decode(b'Z', b"T") else {
            panic!("expected ReadyForQuery")
        };
        assert_eq!(ready.status, TransactionStatus::Transaction);
        assert!(decode(b'Z', b"?").is_err());
    }

    #[test]
    fn row_description() {
        let body = b"\0\x01name\0\0\0\0\0\0\0\0\0\0\x19\xff\xff\xff\xff\xff\xff\0\0";
        let rd = RowDescription::decode(b'T', Bytes::from_static(body)).unwrap();
        assert_eq!(rd.fields.len(), 1);
        assert_eq!(rd.fields[0].name, "name");
        assert_eq!(rd.fields[0].type_oid, 25);
        assert_eq!(rd.fields[0].type_size, -1);
        assert_eq!(rd.fields[0].format, 0);

        let truncated = b"\0\x02name\0\0\0\0\0\0\0\0\0\0\x19\xff\xff\xff\xff\xff\xff\0\0";
        assert!(RowDescription::decode(b'T', Bytes::from_static(truncated)).is_err());
    }

    #[test]
    fn data_row() {
        let body = b"\0\x02\0\0\0\x04Jack\xff\xff\xff\xff";
        let dr = DataRow::decode(b'D', Bytes::from_static(body)).unwrap();
        assert_eq!(dr.values.len(), 2);
        assert_eq!(dr.values[0].as_deref(), Some(&b"Jack"[..]));
        assert_eq!(dr.values[1], None);

        let short = b"\0\x01\0\0\0\x08Jack";
        assert!(DataRow::decode(b'D', Bytes::from_static(short)).is_err());
    }

    #[test]
    fn command_complete() {
        let Ok(BackendMessage::CommandComplete(cmd)) = decode(b'C', b"SELECT 1\0") else {
            panic!("expected CommandComplete")
        };
        assert_eq!(cmd.tag, "SELECT 1");
    }

    #[test]
    fn notification_response() {
        let Ok(BackendMessage::NotificationResponse(n)) = decode(b'A', b"\0\0\x30\x39jobs\0done\0") else {
            panic!("expected NotificationResponse")
        };
        assert_eq!(n.process_id, 12345);
        assert_eq!(n.channel, "jobs");
        assert_eq!(n.payload, "done");
        assert_eq!(BackendMessage::message_name(b'A'), "NotificationResponse");

        assert!(decode(b'A', b"\0\0\x30\x39jobs\0").is_err());
    }
}
