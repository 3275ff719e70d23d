//! `packetline` — an embeddable TCP session layer: length-delimited, typed
//! binary message exchange over many concurrent connections, built around a
//! fluent [`Packet`] builder and a non-blocking, predicate-driven
//! [`Session::read_until`].
//!
//! The acceptor/initiator roles are symmetric: [`Acceptor::bind`] produces a
//! [`Session`] per accepted peer, [`Session::connect`] opens a single
//! outbound one. Both present the same [`Session`] surface for framing,
//! reading, and optional per-direction stream encryption
//! ([`CipherAdapter`]).
//!
//! See `DESIGN.md` in the crate root for the grounding ledger behind each
//! module and the open-question decisions.

pub mod acceptor;
pub mod cipher;
pub mod codec;
pub mod error;
mod listener;
pub mod packet;
pub mod pool;
mod reader;
mod session;
mod sockopt;
mod util;
mod worker;

pub use acceptor::Acceptor;
pub use cipher::CipherAdapter;
pub use codec::{Endian, StringEncoding};
pub use error::{BindError, CipherError, ConnectError, DisconnectReason, PacketError};
pub use packet::Packet;
pub use reader::ReadOrder;
pub use session::Session;
