//! `COPY` data transfer.
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    Connection, ErrorKind, Result,
    connection::State,
    postgres::{BackendMessage, frontend},
};

/// Size of each `CopyData` sent.
const CHUNK: usize = 8 * 1024;

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    /// Run `COPY .. FROM STDIN`, streaming data from `source`.
    ///
    /// Returns the number of rows copied. When reading `source` fails the copy is
    /// aborted with `CopyFail` and [`ErrorKind::Copy`] is returned.
    pub async fn copy_in<R: AsyncRead + Unpin>(&mut self, sql: &str, source: R) -> Result<u64> {
        self.begin(State::CopyIn)?;
        self.send(frontend::Query { sql });
        let result = self.copy_in_cycle(source).await;
        self.finish(result).await
    }

    async fn copy_in_cycle<R: AsyncRead + Unpin>(&mut self, mut source: R) -> Result<u64> {
        self.flush().await?;
        match self.recv::<BackendMessage>().await? {
            BackendMessage::CopyInResponse(_) => {},
            f => Err(f.unexpected("copy in"))?,
        }

        let mut chunk = vec![0u8; CHUNK];
        let failure = loop {
            match source.read(&mut chunk).await {
                Ok(0) => break None,
                Ok(n) => {
                    self.send(frontend::CopyData { data: &chunk[..n] });
                    self.flush().await?;
                },
                Err(err) => break Some(err),
            }
        };

        let Some(failure) = failure else {
            self.send(frontend::CopyDone);
            self.flush().await?;
            let rows = self.copy_complete().await?;
            self.ready().await?;
            return Ok(rows);
        };

        let message = failure.to_string();
        self.send(frontend::CopyFail { message: &message });
        self.flush().await?;

        // the server answers with an error, then ReadyForQuery
        match self.recv::<BackendMessage>().await {
            Err(err) if err.as_database().is_some() => {},
            Err(err) => return Err(err),
            Ok(f) => Err(f.unexpected("copy fail"))?,
        }
        self.ready().await?;
        Err(ErrorKind::Copy(failure).into())
    }

    /// Run `COPY .. TO STDOUT`, writing data to `sink`.
    ///
    /// Returns the number of rows copied. When writing `sink` fails the remaining
    /// data is discarded and [`ErrorKind::Copy`] is returned.
    pub async fn copy_out<W: AsyncWrite + Unpin>(&mut self, sql: &str, sink: W) -> Result<u64> {
        self.begin(State::CopyOut)?;
        self.send(frontend::Query { sql });
        let result = self.copy_out_cycle(sink).await;
        self.finish(result).await
    }

    async fn copy_out_cycle<W: AsyncWrite + Unpin>(&mut self, mut sink: W) -> Result<u64> {
        self.flush().await?;
        match self.recv::<BackendMessage>().await? {
            BackendMessage::CopyOutResponse(_) => {},
            f => Err(f.unexpected("copy out"))?,
        }

        let mut failure = None;
        let rows = loop {
            match self.recv::<BackendMessage>().await? {
                BackendMessage::CopyData(data) => {
                    if failure.is_none() {
                        if let Err(err) = sink.write_all(&data.data).await {
                            failure = Some(err);
                        }
                    }
                },
                BackendMessage::CopyDone(_) => {},
                BackendMessage::CommandComplete(cmd) => break cmd.rows_affected(),
                f => Err(f.unexpected("copy out"))?,
            }
        };
        self.ready().await?;

        if failure.is_none() {
            failure = sink.flush().await.err();
        }
        match failure {
            Some(err) => Err(ErrorKind::Copy(err).into()),
            None => Ok(rows),
        }
    }

    async fn copy_complete(&mut self) -> Result<u64> {
        match self.recv::<BackendMessage>().await? {
            BackendMessage::CommandComplete(cmd) => Ok(cmd.rows_affected()),
            f => Err(f.unexpected("copy complete"))?,
        }
    }
}
