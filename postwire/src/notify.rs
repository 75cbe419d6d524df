//! Asynchronous notification, `LISTEN` and `NOTIFY`.
use std::{
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{Connection, Result, postgres::backend::NotificationResponse};

/// A notification raised with `NOTIFY` on a channel this session listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// The process ID of the notifying backend process.
    pub process_id: i32,
    pub channel: String,
    pub payload: String,
}

impl From<NotificationResponse> for Notification {
    fn from(value: NotificationResponse) -> Self {
        Notification {
            process_id: value.process_id,
            channel: value.channel.as_str().into(),
            payload: value.payload.as_str().into(),
        }
    }
}

/// Receiver of notifications, called after each message cycle.
///
/// A panicking listener is logged and otherwise ignored.
pub trait NotificationListener: Send + Sync {
    fn notify(&self, notification: &Notification);
}

impl<F> NotificationListener for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn notify(&self, notification: &Notification) {
        self(&notification.channel, &notification.payload)
    }
}

/// [`Stream`][futures_core::Stream] of notifications, see [`Connection::notifications`].
///
/// Ends only with an error, which also closes the connection.
pub struct Notifications<'a, S> {
    pub(crate) conn: &'a mut Connection<S>,
}

impl<S> futures_core::Stream for Notifications<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Item = Result<Notification>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let conn = &mut *self.conn;
        if let Err(err) = conn.check_open() {
            return Poll::Ready(Some(Err(err)));
        }
        match ready!(conn.stream.poll_notification(cx)) {
            Ok(()) => Poll::Ready(conn.stream.notifications_mut().pop_front().map(Ok)),
            Err(err) => Poll::Ready(Some(Err(conn.fail(err)))),
        }
    }
}

/// Quote identifier, e.g. a channel name.
pub(crate) fn quote_ident(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 2);
    out.push('"');
    for c in ident.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn quoting() {
        assert_eq!(quote_ident("jobs"), r#""jobs""#);
        assert_eq!(quote_ident(r#"a"b"#), r#""a""b""#);
    }

    #[test]
    fn closure_listener() {
        let seen = Mutex::new(vec![]);
        let listener = |channel: &str, payload: &str| seen.lock().unwrap().push(format!("{channel}:{payload}"));
        let notification = Notification { process_id: 1, channel: "jobs".into(), payload: "42".into() };
        NotificationListener::notify(&listener, &notification);
        assert_eq!(seen.lock().unwrap().as_slice(), ["jobs:42"]);
    }
}
