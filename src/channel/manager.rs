//! The control channel: latest mix state out, playable audio back.
//!
//! [`ControlChannel`] ties a [`ConnectionSupervisor`], the outbound encoder
//! and an [`InboundDecoder`] together behind a handful of synchronous calls.
//! The caller owns the loop: call [`ControlChannel::pump`] often (every frame
//! of the surface, or in a loop as the console does) and read the results.
use std::sync::mpsc;

use log::{debug, info};

use crate::channel::{
    decoder::{InboundDecoder, LastMessage},
    encoder,
    handle::PlayableHandle,
    settings::ChannelSettings,
    snapshot::ControlSnapshot,
    status::ConnectionStatus,
    supervisor::ConnectionSupervisor,
    transport::{Connector, TransportEvent},
    ws_transport::WsConnector,
};

/// Upper bound on socket events handled by one `pump`.
pub const MAX_EVENTS_PER_PUMP: usize = 64;

pub struct ControlChannel {
    supervisor: ConnectionSupervisor,
    decoder: InboundDecoder,
    playable: Option<PlayableHandle>,
    last_message: Option<LastMessage>,
    sent: u64,
}

impl ControlChannel {
    pub fn new(settings: &ChannelSettings, connector: Box<dyn Connector>) -> ControlChannel {
        ControlChannel {
            supervisor: ConnectionSupervisor::new(&settings.ws_url, settings.reconnect_delay(), connector),
            decoder: InboundDecoder::new(),
            playable: None,
            last_message: None,
            sent: 0,
        }
    }

    /// A channel that talks to `settings.ws_url` over tungstenite.
    pub fn with_websocket(settings: &ChannelSettings) -> ControlChannel {
        let connector = WsConnector::new(settings.ws_timeouts());
        Self::new(settings, Box::new(connector))
    }

    /// Open the connection.  The handshake completes on a later `pump`.
    pub fn start(&mut self) {
        self.supervisor.connect();
    }

    pub fn status(&self) -> ConnectionStatus {
        self.supervisor.status()
    }

    pub fn subscribe(&mut self) -> mpsc::Receiver<ConnectionStatus> {
        self.supervisor.subscribe()
    }

    /// Send `snapshot` if connected.  Otherwise nothing happens: the next
    /// snapshot after reconnecting carries the current state anyway.
    pub fn send(&mut self, snapshot: &ControlSnapshot) -> bool {
        let sent = match self.supervisor.live_socket() {
            Some(socket) => encoder::transmit(socket, snapshot),
            None => {
                debug!("manager::send - not connected, dropping snapshot");
                false
            }
        };
        if sent {
            self.sent += 1;
        }
        sent
    }

    /// Process timer and socket events.  Returns how many socket events were handled.
    ///
    /// This is the one call that can stall on the network.  Over
    /// [`WsConnector`] each pump waits up to the read timeout for the next
    /// frame.  The pump that performs a handshake can take DNS resolution time,
    /// plus up to the connect timeout for each resolved address, plus up to the
    /// connect timeout again for the upgrade exchange.  `send` waits at most the
    /// short write timeout; `status` and `playable` never wait.
    pub fn pump(&mut self, now: u128) -> usize {
        let mut handled = 0;
        while handled < MAX_EVENTS_PER_PUMP {
            let Some(event) = self.supervisor.poll_event(now) else {
                break;
            };
            handled += 1;
            if let TransportEvent::Message(raw) = event {
                self.receive(&raw);
            }
        }
        handled
    }

    fn receive(&mut self, raw: &str) {
        let decoded = self.decoder.decode(raw);
        self.last_message = Some(decoded.last_message);
        if let Some(handle) = decoded.handle {
            info!("manager::receive - new audio at {}", handle.locator());
            self.playable = Some(handle);
        }
    }

    /// The audio to play right now, if the service has sent any.
    pub fn playable(&self) -> Option<&PlayableHandle> {
        self.playable.as_ref()
    }

    pub fn last_message(&self) -> Option<&LastMessage> {
        self.last_message.as_ref()
    }

    /// Number of snapshots handed to the transport so far.
    pub fn sent_count(&self) -> u64 {
        self.sent
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    pub fn decoder(&self) -> &InboundDecoder {
        &self.decoder
    }

    /// Stop reconnecting, close the socket and release local audio.
    pub fn dispose(&mut self) {
        if self.supervisor.is_disposed() {
            return;
        }
        self.supervisor.dispose();
        self.decoder.release();
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.dispose();
    }
}
