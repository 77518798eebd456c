//! Keeps exactly one socket to the render service alive.
//!
//! The supervisor is a small state machine over [`ConnectionStatus`]:
//!
//! - `connect` opens a socket (`Connecting`) unless one is already open or
//!   still handshaking.
//! - `Opened` -> `Connected`, `Error` -> `Error`, `Closed` -> `Disconnected`.
//! - An error or a close arms the [`ReconnectTimer`]; when it comes due the
//!   next poll calls `connect` again.  The delay never grows and there is no
//!   retry limit: the surface keeps trying for as long as it is alive.
//! - `dispose` cancels the timer and closes the socket.  Nothing happens
//!   after that.
//!
//! All of this runs on the caller's thread.  [`ConnectionSupervisor::poll_event`]
//! is the only place where time passes.
use std::sync::mpsc;

use log::{debug, info, warn};

use crate::channel::reconnect_timer::ReconnectTimer;
use crate::channel::status::ConnectionStatus;
use crate::channel::transport::{Connector, Socket, TransportEvent};

pub struct ConnectionSupervisor {
    url: String,
    connector: Box<dyn Connector>,
    socket: Option<Box<dyn Socket>>,
    status: ConnectionStatus,
    timer: ReconnectTimer,
    watchers: Vec<mpsc::Sender<ConnectionStatus>>,
    disposed: bool,
}

impl ConnectionSupervisor {
    /// `reconnect_delay` is in microseconds, the same clock `poll_event` is fed.
    pub fn new(url: &str, reconnect_delay: u128, connector: Box<dyn Connector>) -> ConnectionSupervisor {
        ConnectionSupervisor {
            url: url.to_string(),
            connector,
            socket: None,
            status: ConnectionStatus::Disconnected,
            timer: ReconnectTimer::build(reconnect_delay),
            watchers: Vec::new(),
            disposed: false,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
    pub fn has_socket(&self) -> bool {
        self.socket.is_some()
    }
    pub fn has_pending_reconnect(&self) -> bool {
        self.timer.is_pending()
    }

    /// Every status transition from now on is sent to the returned receiver.
    pub fn subscribe(&mut self) -> mpsc::Receiver<ConnectionStatus> {
        let (tx, rx) = mpsc::channel();
        self.watchers.push(tx);
        rx
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        debug!("supervisor::set_status - {} -> {}", self.status, status);
        self.status = status;
        // forget watchers that hung up
        self.watchers.retain(|w| w.send(status).is_ok());
    }

    pub fn connect(&mut self) {
        if self.disposed {
            return;
        }
        if let Some(socket) = &self.socket {
            // a socket that reported an error is stale even if it still looks open
            if socket.is_open() && self.status != ConnectionStatus::Error {
                return;
            }
            if self.status == ConnectionStatus::Connecting {
                // handshake still in flight
                return;
            }
        }
        if let Some(mut stale) = self.socket.take() {
            stale.close();
            if self.status == ConnectionStatus::Connected {
                self.set_status(ConnectionStatus::Disconnected);
            }
        }
        self.timer.cancel();
        info!("supervisor::connect - connecting to {}", self.url);
        self.set_status(ConnectionStatus::Connecting);
        self.socket = Some(self.connector.open(&self.url));
    }

    /// The open socket, if the channel is connected.
    pub fn live_socket(&mut self) -> Option<&mut (dyn Socket + 'static)> {
        if !self.status.is_connected() {
            return None;
        }
        match self.socket.as_mut() {
            Some(socket) if socket.is_open() => Some(&mut **socket),
            _ => None,
        }
    }

    /// Fire the reconnect timer if due, then take one event off the socket
    /// and apply it.  The event is returned so the caller can see inbound
    /// messages; lifecycle events have already been handled.
    pub fn poll_event(&mut self, now: u128) -> Option<TransportEvent> {
        if self.disposed {
            return None;
        }
        if self.timer.take_if_due(now) {
            debug!("supervisor::poll_event - reconnect timer fired");
            self.connect();
        }
        let event = self.socket.as_mut()?.poll_event()?;
        self.apply(&event, now);
        Some(event)
    }

    fn apply(&mut self, event: &TransportEvent, now: u128) {
        match event {
            TransportEvent::Opened => {
                info!("supervisor::apply - connected to {}", self.url);
                self.set_status(ConnectionStatus::Connected);
            }
            TransportEvent::Error(e) => {
                warn!("supervisor::apply - transport error: {}", e);
                self.set_status(ConnectionStatus::Error);
                self.timer.arm(now);
            }
            TransportEvent::Closed => {
                if let Some(mut socket) = self.socket.take() {
                    socket.close();
                }
                self.set_status(ConnectionStatus::Disconnected);
                info!(
                    "supervisor::apply - disconnected, retrying in {} ms",
                    self.timer.delay() / 1_000
                );
                self.timer.arm(now);
            }
            TransportEvent::Message(_) => {}
        }
    }

    /// Cancel the reconnect timer and close the socket.  Safe to call twice.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.timer.cancel();
        if let Some(mut socket) = self.socket.take() {
            socket.close();
        }
        info!("supervisor::dispose - channel to {} torn down", self.url);
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.dispose();
    }
}
