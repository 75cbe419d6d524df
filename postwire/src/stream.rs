//! Buffered postgres message stream.
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::{
    collections::{HashMap, VecDeque},
    io,
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::{
    Result,
    common::{verbose, warning},
    notify::Notification,
    postgres::{
        BackendProtocol, ErrorResponse, FrontendProtocol, NoticeResponse, ProtocolError,
        backend::{NotificationResponse, ParameterStatus},
        frontend,
    },
    transport::PgTransport,
};

const DEFAULT_BUF_CAPACITY: usize = 1024;

/// Message type and length.
const HEADER: usize = 5;

/// Session settings the text format codecs expect, requested at startup.
pub(crate) const SESSION_SETTINGS: [(&str, &str); 3] = [
    ("client_encoding", "UTF8"),
    ("DateStyle", "ISO"),
    ("IntervalStyle", "postgres"),
];

/// Buffered connection to postgres over any byte stream.
///
/// Messages that can arrive at any time are handled here: notices are logged,
/// notifications are queued and parameter status is recorded.
#[derive(Debug)]
pub struct PgStream<S> {
    io: S,
    read_buf: BytesMut,
    write_buf: BytesMut,
    notifications: VecDeque<Notification>,
    parameters: HashMap<String, String>,
}

impl<S> PgStream<S> {
    pub fn new(io: S) -> Self {
        Self {
            io,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            notifications: VecDeque::new(),
            parameters: HashMap::new(),
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.io
    }

    /// Server parameters reported so far, later reports overwrite.
    pub fn parameters(&self) -> &HashMap<String, String> {
        &self.parameters
    }

    /// Received notifications in server order.
    pub fn notifications_mut(&mut self) -> &mut VecDeque<Notification> {
        &mut self.notifications
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> PgStream<S> {
    /// Poll one complete message frame.
    fn poll_frame(&mut self, cx: &mut Context) -> Poll<Result<(u8, Bytes)>> {
        loop {
            match self.read_buf.get(..HEADER) {
                Some(mut header) => {
                    let msgtype = header.get_u8();
                    let len = header.get_i32();
                    if len < 4 {
                        return Poll::Ready(Err(ProtocolError::InvalidLength(len).into()));
                    }
                    let len = len as usize;

                    if self.read_buf.len() - 1/*msgtype*/ >= len {
                        self.read_buf.advance(HEADER);
                        let body = self.read_buf.split_to(len - 4).freeze();
                        return Poll::Ready(Ok((msgtype, body)));
                    }
                    self.read_buf.reserve(1 + len - self.read_buf.len());
                },
                None => self.read_buf.reserve(DEFAULT_BUF_CAPACITY),
            }
            ready!(self.poll_read(cx))?;
        }
    }

    fn poll_read(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
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

        if n == 0 {
            return Poll::Ready(Err(io::ErrorKind::UnexpectedEof.into()));
        }

        // Safety: This is guaranteed to be the number of initialized (and read)
        // bytes due to the invariants provided by `ReadBuf::filled`.
        unsafe {
            self.read_buf.advance_mut(n);
        }

        Poll::Ready(Ok(()))
    }

    /// Handle asynchronous messages, returns any other message back.
    fn intercept(&mut self, msgtype: u8, body: Bytes) -> Result<Option<(u8, Bytes)>> {
        match msgtype {
            NoticeResponse::MSGTYPE => {
                let _notice = NoticeResponse::decode(msgtype, body)?;
                warning!("{_notice}");
            },
            NotificationResponse::MSGTYPE => {
                let notification = NotificationResponse::decode(msgtype, body)?;
                verbose!(channel = %notification.channel, "notification");
                self.notifications.push_back(notification.into());
            },
            ParameterStatus::MSGTYPE => {
                let ParameterStatus { name, value } = ParameterStatus::decode(msgtype, body)?;
                verbose!(%name, %value, "parameter status");
                check_setting(name.as_str(), value.as_str())?;
                self.parameters.insert(name.as_str().into(), value.as_str().into());
            },
            ErrorResponse::MSGTYPE => {
                return Err(ErrorResponse::decode(msgtype, body)?.into());
            },
            _ => return Ok(Some((msgtype, body))),
        }
        Ok(None)
    }

    /// Poll until at least one notification is queued.
    ///
    /// Must only be called between query cycles, any other message is unexpected.
    pub(crate) fn poll_notification(&mut self, cx: &mut Context) -> Poll<Result<()>> {
        loop {
            if !self.notifications.is_empty() {
                return Poll::Ready(Ok(()));
            }
            ready!(self.poll_flush(cx))?;
            let (msgtype, body) = ready!(self.poll_frame(cx))?;
            if let Some((msgtype, _)) = self.intercept(msgtype, body)? {
                return Poll::Ready(Err(ProtocolError::unexpected_phase(msgtype, "idle").into()));
            }
        }
    }

    pub(crate) async fn shutdown(&mut self) -> io::Result<()> {
        self.io.shutdown().await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> PgTransport for PgStream<S> {
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        while !self.write_buf.is_empty() {
            let n = ready!(Pin::new(&mut self.io).poll_write(cx, &self.write_buf))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.write_buf.advance(n);
        }
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        if !self.write_buf.is_empty() {
            ready!(self.poll_flush(cx))?;
        }
        loop {
            let (msgtype, body) = ready!(self.poll_frame(cx))?;
            if let Some((msgtype, body)) = self.intercept(msgtype, body)? {
                verbose!(message = crate::postgres::BackendMessage::message_name(msgtype), "recv");
                return Poll::Ready(B::decode(msgtype, body).map_err(Into::into));
            }
        }
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        verbose!(msgtype = %(F::MSGTYPE as char), "send");
        frontend::write(message, &mut self.write_buf);
    }

    fn send_startup(&mut self, startup: frontend::Startup) {
        startup.write(&mut self.write_buf);
    }

    fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }
}

/// Strings are always decoded as utf8, any other encoding is rejected.
///
/// Dates and intervals in other styles only fail their own values.
fn check_setting(name: &str, value: &str) -> Result<()> {
    match name {
        "client_encoding" if !matches!(value, "UTF8" | "UNICODE") => {
            Err(ProtocolError::UnsupportedSetting { name: "client_encoding", value: value.into() }.into())
        },
        "DateStyle" if !value.starts_with("ISO") => {
            warning!("DateStyle changed to {value:?}, text dates will fail to decode");
            Ok(())
        },
        "IntervalStyle" if value != "postgres" => {
            warning!("IntervalStyle changed to {value:?}, text intervals will fail to decode");
            Ok(())
        },
        _ => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::{
        ErrorKind,
        postgres::backend::ReadyForQuery,
        transport::PgTransportExt,
    };

    fn frame(msgtype: u8, body: &[u8]) -> Vec<u8> {
        let mut buf = vec![msgtype];
        buf.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
        buf.extend_from_slice(body);
        buf
    }

    #[tokio::test]
    async fn intercepts_async_messages() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut stream = PgStream::new(client);

        let mut script = vec![];
        script.extend(frame(b'S', b"TimeZone\0UTC\0"));
        script.extend(frame(b'N', b"SWARNING\0Mcareful\0\0"));
        script.extend(frame(b'A', b"\0\0\0\x07chan\0hello\0"));
        script.extend(frame(b'Z', b"I"));
        let writer = tokio::spawn(async move {
            server.write_all(&script).await.unwrap();
            server
        });

        // frames are split across several reads by the small duplex buffer
        let ready = stream.recv::<ReadyForQuery>().await.unwrap();
        assert_eq!(ready.status, crate::postgres::backend::TransactionStatus::Idle);
        assert_eq!(stream.parameters()["TimeZone"], "UTC");
        let notification = stream.notifications_mut().pop_front().unwrap();
        assert_eq!((notification.process_id, notification.channel.as_str()), (7, "chan"));
        assert_eq!(notification.payload, "hello");
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn error_response_and_eof() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut stream = PgStream::new(client);

        server.write_all(&frame(b'E', b"SERROR\0C42601\0Msyntax error\0\0")).await.unwrap();
        let err = stream.recv::<ReadyForQuery>().await.unwrap_err();
        assert_eq!(err.as_database().unwrap().code(), "42601");

        drop(server);
        let err = stream.recv::<ReadyForQuery>().await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn session_setting_drift() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut stream = PgStream::new(client);

        let mut script = vec![];
        script.extend(frame(b'S', b"DateStyle\0SQL, DMY\0"));
        script.extend(frame(b'Z', b"I"));
        script.extend(frame(b'S', b"client_encoding\0LATIN1\0"));
        server.write_all(&script).await.unwrap();

        // only a warning, dates fail on their own
        stream.recv::<ReadyForQuery>().await.unwrap();
        assert_eq!(stream.parameter("DateStyle"), Some("SQL, DMY"));

        let err = stream.recv::<ReadyForQuery>().await.unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::Protocol(ProtocolError::UnsupportedSetting { name: "client_encoding", .. })
        ));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn invalid_length() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut stream = PgStream::new(client);
        server.write_all(&[b'Z', 0, 0, 0, 2]).await.unwrap();
        let err = stream.recv::<ReadyForQuery>().await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Protocol(ProtocolError::InvalidLength(2))));
    }

    #[tokio::test]
    async fn send_is_buffered() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut stream = PgStream::new(client);
        stream.send(frontend::Sync);
        stream.send(frontend::Terminate);
        stream.flush().await.unwrap();

        let mut buf = [0u8; 10];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [b'S', 0, 0, 0, 4, b'X', 0, 0, 0, 4]);
    }
}
