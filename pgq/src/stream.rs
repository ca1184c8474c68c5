//! Buffered postgres stream.
use bytes::{Buf, BufMut, BytesMut};
use std::{
    io,
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::{
    Result,
    common::{report, verbose},
    connection::Config,
    net::Socket,
    postgres::{
        BackendProtocol, FrontendProtocol, PgError, ProtocolError,
        backend::{NoticeResponse, NotificationResponse},
        codec::decode_frame,
        frontend,
    },
    transport::PgTransport,
};

#[cfg(feature = "verbose")]
use crate::postgres::BackendMessage;

const DEFAULT_BUF_CAPACITY: usize = 1024;

/// Buffered connection to postgres.
#[derive(Debug)]
pub struct PgStream<IO = Socket> {
    io: IO,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl PgStream<Socket> {
    /// Dial the unix socket or tcp host in `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let socket = match config.socket_path() {
            Some(path) => Socket::connect_unix(path).await?,
            None => Socket::connect_tcp(config.host().unwrap_or("localhost"), config.port()).await?,
        };
        Ok(Self::new(socket))
    }
}

impl<IO> PgStream<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: IO) -> Self {
        Self {
            io,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
        }
    }

    /// Flush remaining buffer and shutdown the write half of the io.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        std::future::poll_fn(|cx| self.poll_flush(cx)).await?;
        self.io.shutdown().await
    }

    fn poll_read_socket(&mut self, cx: &mut Context) -> Poll<io::Result<usize>> {
        if self.read_buf.capacity() == self.read_buf.len() {
            self.read_buf.reserve(DEFAULT_BUF_CAPACITY);
        }

        let n = {
            let dst = self.read_buf.chunk_mut();
            let dst = unsafe { dst.as_uninit_slice_mut() };
            let mut buf = ReadBuf::uninit(dst);
            let ptr = buf.filled().as_ptr();
            ready!(Pin::new(&mut self.io).poll_read(cx, &mut buf)?);

            // Ensure the pointer does not change from under us
            assert_eq!(ptr, buf.filled().as_ptr());
            buf.filled().len()
        };

        // Safety: This is guaranteed to be the number of initialized (and read)
        // bytes due to the invariants provided by `ReadBuf::filled`.
        unsafe {
            self.read_buf.advance_mut(n);
        }

        Poll::Ready(Ok(n))
    }
}

impl<IO> PgTransport for PgStream<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        while !self.write_buf.is_empty() {
            let n = ready!(Pin::new(&mut self.io).poll_write(cx, &self.write_buf)?);
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.write_buf.advance(n);
        }
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        if !self.write_buf.is_empty() {
            ready!(self.poll_flush(cx)?);
        }

        loop {
            let Some(frame) = decode_frame(&mut self.read_buf)? else {
                if ready!(self.poll_read_socket(cx)?) == 0 {
                    let err: crate::Error = match self.read_buf.len() {
                        0 => io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by the server").into(),
                        buffered => ProtocolError::UnexpectedEof { buffered }.into(),
                    };
                    return Poll::Ready(Err(err));
                }
                continue;
            };

            verbose!("(B) {}", BackendMessage::message_name(frame.msgtype));

            // Asynchronous messages, can arrive at any time.
            match frame.msgtype {
                NoticeResponse::MSGTYPE => {
                    let _notice = PgError::decode(frame.body)?;
                    report!(warn, "{_notice}");
                },
                NotificationResponse::MSGTYPE => {
                    let _notification = NotificationResponse::decode(frame.msgtype, frame.body)?;
                    report!(
                        info,
                        "notification from backend {} on {:?}: {:?}",
                        _notification.process_id, _notification.channel, _notification.payload,
                    );
                },
                _ => return Poll::Ready(Ok(B::decode(frame.msgtype, frame.body)?)),
            }
        }
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        verbose!("(F) {}", F::MSGTYPE as char);
        frontend::write(message, &mut self.write_buf);
    }

    fn send_startup(&mut self, startup: frontend::Startup) {
        verbose!("(F) Startup");
        startup.write(&mut self.write_buf);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ErrorKind, fixture::*, postgres::BackendMessage, transport::PgTransportExt};

    #[tokio::test]
    async fn skip_notice() {
        let (mut stream, mut server) = FakeServer::pair();
        server.send(&[
            notice_response("there is no transaction in progress"),
            ready_for_query(b'I'),
        ]).await;

        let msg = stream.recv::<BackendMessage>().await.unwrap();
        assert!(matches!(msg, BackendMessage::ReadyForQuery(_)));
    }

    #[tokio::test]
    async fn skip_notification() {
        let (mut stream, mut server) = FakeServer::pair();
        server.send(&[
            notification_response(4242, "jobs", "done"),
            command_complete("LISTEN"),
        ]).await;

        let Ok(BackendMessage::CommandComplete(cmd)) = stream.recv::<BackendMessage>().await else {
            panic!("expected CommandComplete")
        };
        assert_eq!(cmd.tag, "LISTEN");
    }

    #[tokio::test]
    async fn split_delivery() {
        let (mut stream, mut server) = FakeServer::pair();
        let bytes = command_complete("SELECT 1");
        let (a, b) = bytes.split_at(3);

        let (msg, _) = tokio::join!(stream.recv::<BackendMessage>(), async {
            server.io.write_all(a).await.unwrap();
            tokio::task::yield_now().await;
            server.io.write_all(b).await.unwrap();
        });

        let Ok(BackendMessage::CommandComplete(cmd)) = msg else {
            panic!("expected CommandComplete")
        };
        assert_eq!(cmd.tag, "SELECT 1");
    }

    #[tokio::test]
    async fn send_flushed_on_recv() {
        let (mut stream, mut server) = FakeServer::pair();
        stream.send(frontend::Query { sql: "select 1" });

        let (msg, (msgtype, body)) = tokio::join!(stream.recv::<BackendMessage>(), async {
            let msg = server.read_message().await;
            server.send(&[ready_for_query(b'I')]).await;
            msg
        });

        assert!(msg.is_ok());
        assert_eq!(msgtype, b'Q');
        assert_eq!(&body[..], b"select 1\0");
    }

    #[tokio::test]
    async fn eof_between_messages() {
        let (mut stream, server) = FakeServer::pair();
        drop(server);
        let err = stream.recv::<BackendMessage>().await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn eof_mid_message() {
        let (mut stream, mut server) = FakeServer::pair();
        let bytes = command_complete("SELECT 1");
        server.io.write_all(&bytes[..7]).await.unwrap();
        drop(server);

        let err = stream.recv::<BackendMessage>().await.unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::Protocol(ProtocolError::UnexpectedEof { buffered: 7 })
        ));
    }

    #[tokio::test]
    async fn invalid_length() {
        let (mut stream, mut server) = FakeServer::pair();
        server.io.write_all(b"Z\0\0\0\x02").await.unwrap();
        let err = stream.recv::<BackendMessage>().await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Protocol(ProtocolError::InvalidLength { .. })));
    }
}
