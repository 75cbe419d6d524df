//! Postgres connection.
//!
//! A [`Connection`] owns one transport and runs one message cycle at a time. Every
//! operation either completes its cycle up to `ReadyForQuery`, or leaves the connection
//! closed.
use lru::LruCache;
use std::{
    collections::HashSet,
    hash::{DefaultHasher, Hash, Hasher},
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Duration,
};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    Error, ErrorKind, Result,
    cancel::CancelToken,
    codec::Codecs,
    common::{debug, verbose, warning},
    net::Socket,
    notify::{Notification, NotificationListener, Notifications, quote_ident},
    postgres::{
        BackendMessage, BackendProtocol, FrontendProtocol,
        backend::{BackendKeyData, ReadyForQuery, TransactionStatus},
        frontend,
    },
    statement::Statement,
    stream::PgStream,
    transport::{PgTransport, PgTransportExt},
    types::Registry,
};

mod catalog;
mod config;
mod query;
mod startup;


pub use config::{Config, ParseError};
pub use query::QueryResult;

/// Phase of the connection.
///
/// Operations start from [`State::Ready`]. An operation that is dropped before its
/// cycle completes leaves the connection in its phase, the next operation closes it
/// because the position in the message stream is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Idle, between message cycles.
    Ready,
    /// Waiting for the response of a `Query` message.
    SimpleQuery,
    /// Waiting for the response up to `Sync`.
    ExtendedQuery,
    /// Sending `COPY FROM STDIN` data.
    CopyIn,
    /// Receiving `COPY TO STDOUT` data.
    CopyOut,
    /// Terminated, or failed fatally.
    Closed,
}

/// A single postgres connection.
pub struct Connection<S = Socket> {
    pub(crate) stream: PgStream<S>,
    state: State,
    status: TransactionStatus,
    key_data: Option<BackendKeyData>,
    protocol_minor: u32,
    codecs: Codecs,
    statements: LruCache<u64, Statement>,
    listening: HashSet<String>,
    listener: Option<Box<dyn NotificationListener>>,
    host: String,
    port: u16,
    connect_timeout: Option<Duration>,
    io_timeout: Option<Duration>,
}

impl Connection {
    /// Connect using configuration from environment variables.
    ///
    /// See [`Config::from_env`].
    pub async fn connect_env() -> Result<Connection> {
        Self::connect(Config::from_env()).await
    }

    /// Connect using url, see [`Config::parse`].
    pub async fn connect_url(url: &str) -> Result<Connection> {
        Self::connect(Config::parse(url)?).await
    }

    /// Open transport to the configured host and perform the startup phase.
    ///
    /// `connect_timeout` bounds opening the transport and the startup phase.
    pub async fn connect(config: Config) -> Result<Connection> {
        let connect = Socket::connect(&config.host, config.port);
        let socket = match config.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect).await??,
            None => connect.await?,
        };
        Self::connect_with(socket, config).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    /// Perform the startup phase over an already opened transport.
    pub async fn connect_with(io: S, config: Config) -> Result<Connection<S>> {
        let mut stream = PgStream::new(io);
        let startup = startup::startup(&config, &mut stream);
        let response = match config.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, startup).await??,
            None => startup.await?,
        };

        let registry = config.registry.clone().unwrap_or_else(|| Arc::new(Registry::new()));
        let codecs = Codecs::with_user_types(registry, config.user_types.clone());

        debug!("connected to {}:{} as {}", config.host, config.port, config.user);

        Ok(Connection {
            stream,
            state: State::Ready,
            status: response.status,
            key_data: response.key_data,
            protocol_minor: response.protocol_minor,
            codecs,
            statements: LruCache::new(config.statement_cache_capacity),
            listening: HashSet::new(),
            listener: None,
            host: config.host,
            port: config.port,
            connect_timeout: config.connect_timeout,
            io_timeout: config.io_timeout,
        })
    }
}

impl<S> Connection<S> {
    /// Current phase.
    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Transaction status reported by the latest `ReadyForQuery`.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.status
    }

    /// Server parameter reported with `ParameterStatus`, e.g. `server_version`.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.stream.parameters().get(name).map(String::as_str)
    }

    /// Minor protocol version, lower than requested when the server negotiated it down.
    pub fn protocol_minor(&self) -> u32 {
        self.protocol_minor
    }

    /// Process ID of the backend, if the server sent its key data.
    pub fn process_id(&self) -> Option<i32> {
        self.key_data.map(|key| key.process_id)
    }

    pub fn codecs(&self) -> &Codecs {
        &self.codecs
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.codecs.registry()
    }

    /// Returns a token to cancel the query in progress from another task.
    ///
    /// [`None`] when the server did not send its key data.
    pub fn cancel_token(&self) -> Option<CancelToken> {
        let key = self.key_data?;
        Some(CancelToken {
            host: self.host.clone(),
            port: self.port,
            process_id: key.process_id,
            secret_key: key.secret_key,
            connect_timeout: self.connect_timeout,
        })
    }

    /// Channels this session listens to.
    pub fn listening(&self) -> impl Iterator<Item = &str> {
        self.listening.iter().map(String::as_str)
    }

    /// Deliver notifications to `listener` after each message cycle.
    ///
    /// Without a listener notifications are queued, see [`Connection::take_notifications`].
    pub fn set_listener(&mut self, listener: impl NotificationListener + 'static) {
        self.listener = Some(Box::new(listener));
    }

    pub fn remove_listener(&mut self) {
        self.listener = None;
    }

    /// Take queued notifications.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.stream.notifications_mut().drain(..).collect()
    }

    pub(crate) fn check_open(&self) -> Result<()> {
        match self.state {
            State::Closed => Err(ErrorKind::Closed.into()),
            _ => Ok(()),
        }
    }

    /// Enter phase of a new message cycle.
    pub(crate) fn begin(&mut self, state: State) -> Result<()> {
        match self.state {
            State::Ready => {
                verbose!(?state, "begin");
                self.state = state;
                Ok(())
            },
            State::Closed => Err(ErrorKind::Closed.into()),
            interrupted => {
                warning!("previous operation interrupted in {interrupted:?}, closing connection");
                self.state = State::Closed;
                Err(Error::from(ErrorKind::Closed).with_context("previous operation was interrupted"))
            },
        }
    }

    /// Record a failure, fatal error closes the connection.
    pub(crate) fn fail(&mut self, err: Error) -> Error {
        if err.is_fatal() && self.state != State::Closed {
            warning!("closing connection: {err}");
            self.state = State::Closed;
        }
        err
    }

    pub(crate) fn send<F: FrontendProtocol>(&mut self, message: F)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.stream.send(message);
    }

    fn deliver_notifications(&mut self) {
        let Some(listener) = &self.listener else {
            return;
        };
        while let Some(notification) = self.stream.notifications_mut().pop_front() {
            let notify = AssertUnwindSafe(|| listener.notify(&notification));
            if std::panic::catch_unwind(notify).is_err() {
                warning!("notification listener panicked on channel {}", notification.channel);
            }
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    /// Flush buffered messages, bounded by `io_timeout`.
    pub(crate) async fn flush(&mut self) -> Result<()> {
        let result = match self.io_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.stream.flush()).await {
                Ok(result) => result.map_err(Error::from),
                Err(elapsed) => Err(elapsed.into()),
            },
            None => self.stream.flush().await.map_err(Error::from),
        };
        result.map_err(|err| self.fail(err))
    }

    /// Receive one message, bounded by `io_timeout`.
    pub(crate) async fn recv<B: BackendProtocol>(&mut self) -> Result<B> {
        let result = match self.io_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.stream.recv()).await {
                Ok(result) => result,
                Err(elapsed) => Err(elapsed.into()),
            },
            None => self.stream.recv().await,
        };
        result.map_err(|err| self.fail(err))
    }

    /// Wait for `ReadyForQuery`, ending the cycle.
    pub(crate) async fn ready(&mut self) -> Result<()> {
        let ReadyForQuery { status } = self.recv::<ReadyForQuery>().await?;
        self.status = status;
        Ok(())
    }

    /// Complete an operation.
    ///
    /// A server error is followed by messages up to `ReadyForQuery`, which are
    /// discarded so the connection is usable again.
    pub(crate) async fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        let result = match result {
            Ok(ok) => {
                self.state = State::Ready;
                Ok(ok)
            },
            Err(err) if self.state == State::Closed => Err(err),
            Err(err) if err.is_fatal() => Err(self.fail(err)),
            Err(err) => {
                if err.as_database().is_some() {
                    self.recover().await?;
                }
                self.state = State::Ready;
                Err(err)
            },
        };
        self.deliver_notifications();
        result
    }

    async fn recover(&mut self) -> Result<()> {
        debug!("recovering from server error");
        loop {
            match self.recv::<BackendMessage>().await {
                Ok(BackendMessage::ReadyForQuery(ready)) => {
                    self.status = ready.status;
                    return Ok(());
                },
                Ok(_message) => {
                    verbose!(message = BackendMessage::message_name(_message.msgtype()), "discarded");
                },
                Err(err) if self.state == State::Closed => return Err(err),
                // another server error before the synchronization point
                Err(_) => {},
            }
        }
    }

    /// Start listening to `channel`.
    pub async fn listen(&mut self, channel: &str) -> Result<()> {
        self.simple_query(&format!("LISTEN {}", quote_ident(channel))).await?;
        self.listening.insert(channel.to_owned());
        Ok(())
    }

    /// Stop listening to `channel`.
    pub async fn unlisten(&mut self, channel: &str) -> Result<()> {
        self.simple_query(&format!("UNLISTEN {}", quote_ident(channel))).await?;
        self.listening.remove(channel);
        Ok(())
    }

    /// Wait for a notification, returns [`None`] when `timeout` elapsed.
    ///
    /// Queued notifications are returned first. Notifications received here are
    /// returned to the caller, not the listener.
    pub async fn wait_for_notification(&mut self, timeout: Duration) -> Result<Option<Notification>> {
        if let Some(notification) = self.stream.notifications_mut().pop_front() {
            return Ok(Some(notification));
        }
        self.begin(State::Ready)?;

        let wait = std::future::poll_fn(|cx| self.stream.poll_notification(cx));
        let result = tokio::time::timeout(timeout, wait).await;
        match result {
            Ok(Ok(())) => Ok(self.stream.notifications_mut().pop_front()),
            Ok(Err(err)) => Err(self.fail(err)),
            Err(_) => Ok(None),
        }
    }

    /// Stream of notifications, ending only with an error.
    pub fn notifications(&mut self) -> Notifications<'_, S> {
        Notifications { conn: self }
    }

    /// Send `Terminate` and shutdown the transport.
    pub async fn close(mut self) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        }
        self.state = State::Closed;
        self.stream.send(frontend::Terminate);
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    pub(crate) fn statement_key(sql: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        sql.hash(&mut hasher);
        hasher.finish()
    }

    /// Major version from `server_version` parameter.
    pub(crate) fn server_major(&self) -> Option<u32> {
        let version = self.parameter("server_version")?;
        let end = version.find(|c: char| !c.is_ascii_digit()).unwrap_or(version.len());
        version[..end].parse().ok()
    }
}

impl<S> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("status", &self.status)
            .field("process_id", &self.process_id())
            .field("statements", &self.statements.len())
            .finish_non_exhaustive()
    }
}
