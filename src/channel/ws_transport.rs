//! Blocking tungstenite socket that looks non-blocking to the supervisor.
//!
//! The handshake happens on the first poll after `open`, and the read timeout
//! on the TCP stream turns every later poll into a short wait for the next
//! frame.  Writes carry a short timeout as well: when the peer stops
//! reading, the frame that hit the full buffer stays queued in tungstenite
//! and later snapshots are dropped until the queue drains, so `send_text`
//! never stalls the caller.  Only plain `ws://` endpoints are supported.
use std::{
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::{debug, info, trace, warn};
use simple_error::bail;
use tungstenite::{
    client::{self, IntoClientRequest},
    error::{Error, UrlError},
    http::Uri,
    stream::{Mode, NoDelay},
    Message, WebSocket,
};

use crate::channel::transport::{Connector, Socket, TransportEvent};
use crate::common::box_error::BoxError;

enum WsState {
    Pending(String),
    Open(WebSocket<TcpStream>),
    // the handshake or the stream failed, a Closed event is still owed
    Failed,
    Closed,
}

/// Socket timeouts handed to every [`WsSocket`].
#[derive(Debug, Clone, Copy)]
pub struct WsTimeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

pub struct WsConnector {
    timeouts: WsTimeouts,
}

impl WsConnector {
    pub fn new(timeouts: WsTimeouts) -> WsConnector {
        WsConnector { timeouts }
    }
}

impl Connector for WsConnector {
    fn open(&mut self, url: &str) -> Box<dyn Socket> {
        Box::new(WsSocket::new(url, self.timeouts))
    }
}

pub struct WsSocket {
    state: WsState,
    timeouts: WsTimeouts,
    // a frame is stuck in tungstenite's queue behind a peer that is not reading
    backlogged: bool,
}

fn is_timeout(err: &Error) -> bool {
    match err {
        Error::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ),
        _ => false,
    }
}

impl WsSocket {
    pub fn new(url: &str, timeouts: WsTimeouts) -> WsSocket {
        WsSocket {
            state: WsState::Pending(url.to_string()),
            timeouts,
            backlogged: false,
        }
    }

    fn handshake(&self, url: &str) -> Result<WebSocket<TcpStream>, BoxError> {
        let request = url.into_client_request()?;
        let uri = request.uri().clone();
        if let Mode::Tls = client::uri_mode(&uri)? {
            bail!("TLS endpoints are not supported: {}", url);
        }
        let host = uri
            .host()
            .ok_or(Error::Url(UrlError::NoHostName))?
            .trim_start_matches('[')
            .trim_end_matches(']');
        let port = uri.port_u16().unwrap_or(80);
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        let mut stream = Self::connect_to_some(&addrs, &uri, self.timeouts.connect)?;
        NoDelay::set_nodelay(&mut stream, true)?;
        // a server that accepts but never answers fails the handshake instead of hanging it
        stream.set_read_timeout(Some(self.timeouts.connect))?;
        stream.set_write_timeout(Some(self.timeouts.connect))?;
        let (sock, _resp) = client::client(request, stream).map_err(|e| e.to_string())?;
        sock.get_ref().set_read_timeout(Some(self.timeouts.read))?;
        sock.get_ref().set_write_timeout(Some(self.timeouts.write))?;
        Ok(sock)
    }

    fn connect_to_some(addrs: &[SocketAddr], uri: &Uri, timeout: Duration) -> Result<TcpStream, Error> {
        for addr in addrs {
            debug!("ws_transport::connect_to_some - trying {} at {}", uri, addr);
            if let Ok(stream) = TcpStream::connect_timeout(addr, timeout) {
                return Ok(stream);
            }
        }
        Err(Error::Url(UrlError::UnableToConnect(uri.to_string())))
    }
}

impl Socket for WsSocket {
    fn is_open(&self) -> bool {
        matches!(self.state, WsState::Open(_))
    }

    fn send_text(&mut self, text: String) -> Result<(), BoxError> {
        match &mut self.state {
            WsState::Open(sock) => {
                if self.backlogged {
                    match sock.write_pending() {
                        Ok(()) => self.backlogged = false,
                        Err(e) if is_timeout(&e) => {
                            bail!("peer is not reading, snapshot dropped");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                match sock.write_message(Message::Text(text)) {
                    Ok(()) => Ok(()),
                    Err(e) if is_timeout(&e) => {
                        // the frame is queued and goes out once the peer drains
                        debug!("ws_transport::send_text - peer stalled, holding back further snapshots");
                        self.backlogged = true;
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                }
            }
            _ => {
                bail!("socket is not open");
            }
        }
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        match &mut self.state {
            WsState::Pending(url) => {
                let url = url.clone();
                match self.handshake(&url) {
                    Ok(sock) => {
                        info!("ws_transport::poll_event - connected to {}", url);
                        self.state = WsState::Open(sock);
                        Some(TransportEvent::Opened)
                    }
                    Err(e) => {
                        warn!("ws_transport::poll_event - cannot connect to {}: {}", url, e);
                        self.state = WsState::Failed;
                        Some(TransportEvent::Error(e.to_string()))
                    }
                }
            }
            WsState::Failed => {
                self.state = WsState::Closed;
                Some(TransportEvent::Closed)
            }
            WsState::Closed => None,
            WsState::Open(sock) => match sock.read_message() {
                Ok(Message::Text(text)) => Some(TransportEvent::Message(text)),
                Ok(Message::Binary(data)) => Some(TransportEvent::Message(
                    String::from_utf8_lossy(&data).into_owned(),
                )),
                Ok(Message::Close(frame)) => {
                    debug!("ws_transport::poll_event - server closed: {:?}", frame);
                    // push out the close reply tungstenite queued
                    let _ = sock.write_pending();
                    self.state = WsState::Closed;
                    Some(TransportEvent::Closed)
                }
                Ok(_) => None, // ping/pong are answered by tungstenite
                Err(e) if is_timeout(&e) => {
                    // read timeout, nothing arrived
                    None
                }
                Err(Error::ConnectionClosed) | Err(Error::AlreadyClosed) => {
                    self.state = WsState::Closed;
                    Some(TransportEvent::Closed)
                }
                Err(e) => {
                    warn!("ws_transport::poll_event - read failed: {}", e);
                    self.state = WsState::Failed;
                    Some(TransportEvent::Error(e.to_string()))
                }
            },
        }
    }

    fn close(&mut self) {
        if let WsState::Open(sock) = &mut self.state {
            trace!("ws_transport::close - sending close frame");
            let _ = sock.close(None);
            let _ = sock.write_pending();
        }
        self.state = WsState::Closed;
    }
}

impl Drop for WsSocket {
    fn drop(&mut self) {
        self.close();
    }
}
