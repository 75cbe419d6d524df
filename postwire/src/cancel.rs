//! Query cancellation.
//!
//! Cancellation is requested over a new connection which carries only the
//! `CancelRequest`, the server closes it without a response.
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{Result, net::Socket, postgres::frontend::CancelRequest};

/// Handle to cancel the query in progress of a [`Connection`][crate::Connection].
///
/// Best effort, the query may complete before the request arrives.
#[derive(Debug, Clone)]
pub struct CancelToken {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) process_id: i32,
    pub(crate) secret_key: i32,
    pub(crate) connect_timeout: Option<Duration>,
}

impl CancelToken {
    /// Process ID of the target backend.
    pub fn process_id(&self) -> i32 {
        self.process_id
    }

    /// Open a new transport to the server and send the request.
    pub async fn cancel(&self) -> Result<()> {
        let connect = Socket::connect(&self.host, self.port);
        let socket = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect).await??,
            None => connect.await?,
        };
        self.cancel_on(socket).await
    }

    /// Send the request over an already opened transport.
    pub async fn cancel_on<S: AsyncWrite + Unpin>(&self, mut io: S) -> Result<()> {
        let mut buf = BytesMut::with_capacity(16);
        CancelRequest { process_id: self.process_id, secret_key: self.secret_key }.write(&mut buf);
        io.write_all(&buf).await?;
        io.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn cancel_request_layout() {
        let token = CancelToken {
            host: "localhost".into(),
            port: 5432,
            process_id: 1234,
            secret_key: -5,
            connect_timeout: None,
        };
        let (client, mut server) = tokio::io::duplex(64);
        token.cancel_on(client).await.unwrap();

        let mut buf = vec![];
        server.read_to_end(&mut buf).await.unwrap();
        let mut expected = vec![];
        expected.extend_from_slice(&16u32.to_be_bytes());
        expected.extend_from_slice(&80_877_102u32.to_be_bytes());
        expected.extend_from_slice(&1234i32.to_be_bytes());
        expected.extend_from_slice(&(-5i32).to_be_bytes());
        assert_eq!(buf, expected);
    }
}
