//! Callback-driven STOMP client.
//!
//! [`Connection`] owns the broker socket, reconnects in reliable mode and
//! replays subscriptions on every new socket. [`Client`] adds a background
//! receive task that hands MESSAGE and RECEIPT frames to registered
//! callbacks, plus local replay of acknowledged messages when a
//! transaction is aborted.
//!
//! ```ignore
//! use stompwire::{Client, ConnectOptions};
//!
//! let client = Client::open(ConnectOptions::default().credentials("guest", "guest")).await?;
//! client
//!     .subscribe("/queue/orders", Vec::new(), |msg| println!("{}", msg))
//!     .await?;
//! client.send("/queue/orders", "hello", Vec::new()).await?;
//! client.close().await?;
//! client.join().await;
//! ```

pub mod client;
pub mod codec;
pub mod connection;
pub mod error;
pub mod frame;
pub mod options;
pub mod parser;

pub use client::{Client, Listener};
pub use codec::{DEFAULT_CONTENT_TYPE, StompCodec, encode_frame};
pub use connection::Connection;
pub use error::ConnError;
pub use frame::{Command, Frame, Headers};
pub use options::{Backoff, ConnectOptions};
