//! Seam between the channel's state machine and an actual socket.
//!
//! A [`Socket`] behaves like a browser WebSocket: it is created already
//! "connecting" and reports what happened to it as [`TransportEvent`]s when
//! polled.  The supervisor never blocks on a socket except inside
//! `poll_event`, which an implementation may bound with a short read timeout.

#[cfg(test)]
use mockall::automock;

use crate::common::box_error::BoxError;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Error(String),
    Closed,
}

#[cfg_attr(test, automock)]
pub trait Socket {
    /// True once the handshake completed and until the socket closes.
    fn is_open(&self) -> bool;
    fn send_text(&mut self, text: String) -> Result<(), BoxError>;
    /// Next thing that happened on the socket, or None if nothing did.
    fn poll_event(&mut self) -> Option<TransportEvent>;
    /// Close and release the socket.  Must be safe to call more than once.
    fn close(&mut self);
}

/// Opens sockets to an endpoint.  Opening never fails up front; a bad
/// endpoint shows up as an `Error` then `Closed` event on the returned socket.
pub trait Connector {
    fn open(&mut self, url: &str) -> Box<dyn Socket>;
}
