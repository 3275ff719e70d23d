//! Error kinds surfaced at the crate's synchronous entry points.
//!
//! Asynchronous completion failures (a kernel read/write failing mid-stream,
//! a cipher rejecting a buffer) never propagate through these types — they
//! close the owning session and surface through its post-disconnect
//! listeners as a [`DisconnectReason`] instead.

use std::io;

use thiserror::Error;

/// Failures reported synchronously from [`crate::session::Session::connect`].
///
/// A deadline expiring is not among these: `connect` itself only ever runs
/// its pre-flight checks synchronously, so a timed-out handshake is only
/// ever reported through `connect`'s `on_timeout` callback and the
/// resulting [`DisconnectReason::ConnectTimeout`].
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("invalid port 0 / invalid address")]
    InvalidArgument,
    #[error("session is already connected")]
    AlreadyConnected,
    #[error("connect failed: {0}")]
    Io(#[from] io::Error),
}

/// Failures reported synchronously from [`crate::acceptor::Acceptor::bind`].
#[derive(Error, Debug)]
pub enum BindError {
    #[error("invalid port 0 / invalid address")]
    InvalidArgument,
    #[error("bind failed: {0}")]
    Io(#[from] io::Error),
}

/// Failures reported synchronously from the packet builder's string codec.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    #[error("encoded string length {0} exceeds the 65535-byte u16 length prefix")]
    StringTooLong(usize),
}

/// Failures raised by a [`crate::cipher::CipherAdapter`].
///
/// Treated as fatal for the owning session: the writer discards pending
/// buffers and the reader closes the session.
#[derive(Error, Debug)]
pub enum CipherError {
    #[error("encrypt failed: {0}")]
    Encrypt(String),
    #[error("decrypt failed: {0}")]
    Decrypt(String),
}

/// Why a session closed. Delivered to `on_post_disconnect` listeners; never
/// propagated as a `Result` since completion failures are asynchronous by
/// nature.
#[derive(Debug)]
pub enum DisconnectReason {
    /// The application called `Session::close()`.
    ClosedByUser,
    /// A kernel read returned zero meaningful bytes.
    EndOfStream,
    /// A kernel read or write failed mid-stream.
    Io(io::Error),
    /// An encrypt/decrypt adapter raised.
    Cipher(CipherError),
    /// `connect()` did not complete within its deadline.
    ConnectTimeout,
}
