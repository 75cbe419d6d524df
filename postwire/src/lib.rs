//! Postgres wire protocol client.
//!
//! # Examples
//!
//! ```no_run
//! use postwire::{Connection, Value};
//!
//! # async fn app() -> postwire::Result<()> {
//! let mut conn = Connection::connect_env().await?;
//!
//! let row = conn.query_one("SELECT 420, $1::text", &[Value::Text("Foo".into())]).await?;
//! let (num, text): (i32, String) = row.decode()?;
//!
//! assert_eq!(num, 420);
//! assert_eq!(text, "Foo");
//! # Ok(())
//! # }
//! ```
//!
//! Listen for notifications:
//!
//! ```no_run
//! # async fn app(mut conn: postwire::Connection) -> postwire::Result<()> {
//! use std::time::Duration;
//!
//! conn.listen("jobs").await?;
//! while let Some(notification) = conn.wait_for_notification(Duration::from_secs(30)).await? {
//!     println!("{}: {}", notification.channel, notification.payload);
//! }
//! # Ok(())
//! # }
//! ```

pub mod common;
mod net;
mod ext;

// Protocol
pub mod postgres;
pub mod auth;

// Types
pub mod types;
pub mod codec;

// Component
mod statement;
pub mod row;

// Operation
pub mod transport;
mod stream;
mod copy;
pub mod notify;
mod cancel;

// Connection
pub mod connection;

mod error;


pub use codec::{UserType, UserTypes, Value};
pub use row::{Decode, DecodeError, FromRow, Row};
pub use statement::Statement;
pub use types::Registry;

pub use connection::{Config, Connection, QueryResult};
pub use cancel::CancelToken;
pub use notify::{Notification, NotificationListener};
pub use stream::PgStream;
pub use net::Socket;
pub use error::{Error, ErrorKind, Result};
