//! fuzzymix - control channel for the FuzzyMix surface
//!
//! Streams the surface's current control state to a remote render service
//! over a WebSocket and hands back whatever audio the service renders, either
//! as a URL or as a locally held WAV buffer.  The connection looks after
//! itself: it reconnects every few seconds for as long as the channel lives.
extern crate json;

pub mod channel;
pub mod common;
pub mod utils;

pub use channel::manager::ControlChannel;
pub use channel::settings::ChannelSettings;
pub use channel::snapshot::ControlSnapshot;
pub use channel::status::ConnectionStatus;
