//! Message level io, the [`PgTransport`] trait.
use std::{
    io,
    task::{Context, Poll},
};

use crate::{
    Result,
    postgres::{BackendProtocol, FrontendProtocol, frontend},
};

/// Buffered message io with the backend.
///
/// Sending only buffers, messages reach the backend on flush. This lets a whole
/// query cycle (`Parse`, `Bind`, `Execute`, `Sync`) go out in one write.
pub trait PgTransport: Unpin {
    /// Poll to write every buffered message.
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>>;

    /// Poll to receive the next message which is not asynchronous.
    ///
    /// Buffered messages are flushed first.
    ///
    /// `NoticeResponse`, `NotificationResponse` and `ParameterStatus` can arrive
    /// at any time, implementors consume them here and never return them.
    /// `ErrorResponse` is returned as [`Err`].
    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>>;

    /// Buffer a message.
    fn send<F: FrontendProtocol>(&mut self, message: F);

    /// Buffer the [`Startup`][1] message, which has no message type byte.
    ///
    /// [1]: frontend::Startup
    fn send_startup(&mut self, startup: frontend::Startup);

    /// Latest value the server reported for a runtime parameter.
    fn parameter(&self, name: &str) -> Option<&str>;
}

impl<P> PgTransport for &mut P where P: PgTransport {
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        P::poll_flush(self, cx)
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        P::poll_recv(self, cx)
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        P::send(self, message);
    }

    fn send_startup(&mut self, startup: frontend::Startup) {
        P::send_startup(self, startup);
    }

    fn parameter(&self, name: &str) -> Option<&str> {
        P::parameter(self, name)
    }
}

/// `async` counterpart of [`PgTransport`] polling methods.
pub trait PgTransportExt: PgTransport {
    /// Write every buffered message.
    fn flush(&mut self) -> impl Future<Output = io::Result<()>> {
        std::future::poll_fn(|cx|self.poll_flush(cx))
    }

    /// Receive the next message which is not asynchronous.
    fn recv<B: BackendProtocol>(&mut self) -> impl Future<Output = Result<B>> {
        std::future::poll_fn(|cx|self.poll_recv(cx))
    }
}

impl<T> PgTransportExt for T where T: PgTransport { }
