//! Wire form of a control snapshot and the best-effort send of it.
use log::{trace, warn};
use serde::Serialize;

use crate::channel::snapshot::ControlSnapshot;
use crate::channel::transport::Socket;
use crate::common::box_error::BoxError;

pub const FUZZY_UPDATE: &str = "fuzzy_update";

#[derive(Serialize)]
struct OutboundMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    snapshot: &'a ControlSnapshot,
}

/// The `fuzzy_update` message for `snapshot`, as sent on the wire.
pub fn encode_update(snapshot: &ControlSnapshot) -> Result<String, BoxError> {
    let msg = OutboundMessage {
        kind: FUZZY_UPDATE,
        snapshot,
    };
    Ok(serde_json::to_string(&msg)?)
}

/// Send `snapshot` on `socket`.  Returns whether a frame went out.
///
/// Failures are logged and dropped: the next snapshot replaces this one and
/// the socket reports its own trouble through its events.
pub fn transmit(socket: &mut dyn Socket, snapshot: &ControlSnapshot) -> bool {
    let text = match encode_update(snapshot) {
        Ok(text) => text,
        Err(e) => {
            warn!("encoder::transmit - cannot encode snapshot: {}", e);
            return false;
        }
    };
    trace!("encoder::transmit - {}", text);
    match socket.send_text(text) {
        Ok(()) => true,
        Err(e) => {
            warn!("encoder::transmit - send failed: {}", e);
            false
        }
    }
}
