//! The control channel between the mix surface and the render service.
//!
//! [`manager::ControlChannel`] is the piece callers use.  It is built from a
//! [`supervisor::ConnectionSupervisor`] that owns the socket and reconnects,
//! the [`encoder`] that puts [`snapshot::ControlSnapshot`]s on the wire, and
//! an [`decoder::InboundDecoder`] that turns replies into
//! [`handle::PlayableHandle`]s.
pub mod decoder;
pub mod encoder;
pub mod handle;
pub mod manager;
pub mod reconnect_timer;
pub mod settings;
pub mod snapshot;
pub mod status;
pub mod supervisor;
pub mod transport;
pub mod ws_transport;
