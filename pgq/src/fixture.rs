//! Scripted backend for protocol tests.
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use crate::stream::PgStream;

pub fn message(msgtype: u8, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5 + body.len());
    buf.put_u8(msgtype);
    buf.put_u32(4 + body.len() as u32);
    buf.put_slice(body);
    buf
}

fn nul(buf: &mut Vec<u8>, string: &str) {
    buf.put_slice(string.as_bytes());
    buf.put_u8(0);
}

pub fn auth_ok() -> Vec<u8> {
    message(b'R', &0u32.to_be_bytes())
}

pub fn auth_cleartext() -> Vec<u8> {
    message(b'R', &3u32.to_be_bytes())
}

pub fn auth_md5(salt: [u8; 4]) -> Vec<u8> {
    let mut body = 5u32.to_be_bytes().to_vec();
    body.extend_from_slice(&salt);
    message(b'R', &body)
}

pub fn auth_sasl() -> Vec<u8> {
    let mut body = 10u32.to_be_bytes().to_vec();
    nul(&mut body, "SCRAM-SHA-256");
    body.put_u8(0);
    message(b'R', &body)
}

pub fn parameter_status(name: &str, value: &str) -> Vec<u8> {
    let mut body = vec![];
    nul(&mut body, name);
    nul(&mut body, value);
    message(b'S', &body)
}

pub fn backend_key_data(process_id: u32, secret_key: u32) -> Vec<u8> {
    let mut body = vec![];
    body.put_u32(process_id);
    body.put_u32(secret_key);
    message(b'K', &body)
}

pub fn ready_for_query(status: u8) -> Vec<u8> {
    message(b'Z', &[status])
}

/// Text columns.
pub fn row_description(names: &[&str]) -> Vec<u8> {
    let mut body = vec![];
    body.put_i16(names.len() as i16);
    for name in names {
        nul(&mut body, name);
        body.put_u32(0); // table oid
        body.put_i16(0); // column id
        body.put_u32(25); // text
        body.put_i16(-1);
        body.put_i32(-1);
        body.put_i16(0);
    }
    message(b'T', &body)
}

pub fn data_row(values: &[Option<&str>]) -> Vec<u8> {
    let mut body = vec![];
    body.put_i16(values.len() as i16);
    for value in values {
        match value {
            Some(value) => {
                body.put_i32(value.len() as i32);
                body.put_slice(value.as_bytes());
            },
            None => body.put_i32(-1),
        }
    }
    message(b'D', &body)
}

pub fn command_complete(tag: &str) -> Vec<u8> {
    let mut body = vec![];
    nul(&mut body, tag);
    message(b'C', &body)
}

pub fn empty_query() -> Vec<u8> {
    message(b'I', &[])
}

fn fields(severity: &str, code: &str, msg: &str) -> Vec<u8> {
    let mut body = vec![];
    body.put_u8(b'S');
    nul(&mut body, severity);
    body.put_u8(b'V');
    nul(&mut body, severity);
    body.put_u8(b'C');
    nul(&mut body, code);
    body.put_u8(b'M');
    nul(&mut body, msg);
    body.put_u8(0);
    body
}

pub fn error_response(severity: &str, code: &str, msg: &str) -> Vec<u8> {
    message(b'E', &fields(severity, code, msg))
}

pub fn notice_response(msg: &str) -> Vec<u8> {
    message(b'N', &fields("WARNING", "25P01", msg))
}

pub fn notification_response(process_id: u32, channel: &str, payload: &str) -> Vec<u8> {
    let mut body = vec![];
    body.put_u32(process_id);
    nul(&mut body, channel);
    nul(&mut body, payload);
    message(b'A', &body)
}

/// Everything after `AuthenticationOk` of a successful startup.
pub fn startup_ok() -> Vec<Vec<u8>> {
    vec![
        parameter_status("server_version", "17.2"),
        parameter_status("client_encoding", "UTF8"),
        backend_key_data(4242, 0xdeadbeef),
        ready_for_query(b'I'),
    ]
}

/// The backend end of an in memory connection.
pub struct FakeServer {
    pub io: DuplexStream,
}

impl FakeServer {
    pub fn pair() -> (PgStream<DuplexStream>, FakeServer) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        (PgStream::new(client), FakeServer { io: server })
    }

    /// Read startup message, returns parameter pairs.
    pub async fn read_startup(&mut self) -> Vec<(String, String)> {
        let len = self.io.read_u32().await.unwrap() as usize;
        let mut body = BytesMut::zeroed(len - 4);
        self.io.read_exact(&mut body).await.unwrap();
        let mut body = body.freeze();

        assert_eq!(body.get_u32(), crate::postgres::frontend::PROTOCOL_VERSION);

        let mut params = vec![];
        while body[0] != 0 {
            let name = take_nul(&mut body);
            let value = take_nul(&mut body);
            params.push((name, value));
        }
        params
    }

    /// Read a tagged frontend message.
    pub async fn read_message(&mut self) -> (u8, Bytes) {
        let msgtype = self.io.read_u8().await.unwrap();
        let len = self.io.read_u32().await.unwrap() as usize;
        let mut body = BytesMut::zeroed(len - 4);
        self.io.read_exact(&mut body).await.unwrap();
        (msgtype, body.freeze())
    }

    /// Read `PasswordMessage`, returns the password.
    pub async fn read_password(&mut self) -> String {
        let (msgtype, mut body) = self.read_message().await;
        assert_eq!(msgtype, b'p');
        take_nul(&mut body)
    }

    pub async fn send(&mut self, messages: &[Vec<u8>]) {
        for message in messages {
            self.io.write_all(message).await.unwrap();
        }
    }

    /// Accept startup with trust authentication.
    pub async fn accept(&mut self) {
        self.read_startup().await;
        self.send(&[auth_ok()]).await;
        self.send(&startup_ok()).await;
    }
}

fn take_nul(body: &mut Bytes) -> String {
    let end = body.iter().position(|e| *e == 0).unwrap();
    let string = String::from_utf8(body.split_to(end).to_vec()).unwrap();
    body.advance(1);
    string
}
